use cookie::Cookie;
use http::header::{COOKIE, USER_AGENT};
use http::{HeaderMap, Request};

/// Properties of the client connection that sessions can be bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerParams {
    /// The remote address of the client.
    pub remote_addr: String,
    /// The `User-Agent` header of the request, or the empty string if there is none.
    pub user_agent: String,
}

/// A request a session can be retrieved for.
pub trait SessionRequest {
    /// Returns the value of the cookie named `name`, if the request carries one.
    fn cookie(&self, name: &str) -> Option<String>;

    /// Returns the connection properties, if this request type knows them.
    fn server_params(&self) -> Option<ServerParams>;
}

/// Plain requests do not know the remote address of the client.
impl<B> SessionRequest for Request<B> {
    fn cookie(&self, name: &str) -> Option<String> {
        cookie_from_headers(self.headers(), name)
    }

    fn server_params(&self) -> Option<ServerParams> {
        None
    }
}

/// A request together with the remote address of the connection it arrived on.
#[derive(Debug)]
pub struct ServerRequest<B> {
    request: Request<B>,
    remote_addr: String,
}

impl<B> ServerRequest<B> {
    /// Attach the remote address of the client to `request`.
    pub fn new(request: Request<B>, remote_addr: impl Into<String>) -> Self {
        Self {
            request,
            remote_addr: remote_addr.into(),
        }
    }

    /// Returns a reference to the wrapped request.
    pub fn request(&self) -> &Request<B> {
        &self.request
    }

    /// Returns a mutable reference to the wrapped request.
    pub fn request_mut(&mut self) -> &mut Request<B> {
        &mut self.request
    }

    /// Unwrap the wrapped request.
    pub fn into_inner(self) -> Request<B> {
        self.request
    }
}

impl<B> SessionRequest for ServerRequest<B> {
    fn cookie(&self, name: &str) -> Option<String> {
        cookie_from_headers(self.request.headers(), name)
    }

    fn server_params(&self) -> Option<ServerParams> {
        let user_agent = self
            .request
            .headers()
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        Some(ServerParams {
            remote_addr: self.remote_addr.clone(),
            user_agent: user_agent.to_owned(),
        })
    }
}

fn cookie_from_headers(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| Cookie::split_parse(header))
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_owned())
}
