use crate::{
    Error, PersisterConfig, PreviousRecord, Result, Session, SessionOptions, StorageHandler,
};
use chrono::{DateTime, Utc};
use cookie::Cookie;
use http::header::SET_COOKIE;
use http::{HeaderValue, Response};
use log::{debug, trace};
use serde::Deserialize;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

mod metadata;
mod request;
mod session_id_generator;

pub use metadata::SessionMetadata;
pub use request::{ServerParams, ServerRequest, SessionRequest};
pub use session_id_generator::{
    DebugSessionIdGenerator, DefaultSessionIdGenerator, FnSessionIdGenerator, SessionIdGenerator,
};

/// Bridges the session cookie of a request/response cycle and the [`Session`] it identifies.
///
/// On the way in, [`CookiePersister::retrieve`] reads the session id from the request cookie,
/// validates the session against its metadata and rotates its id when required.
/// On the way out, [`CookiePersister::persist`] writes the current id into the response cookie.
///
/// Sessions sharing an id are not locked against each other.
/// If two requests with the same cookie are handled concurrently, the last save wins,
/// and one request may destroy the record the other is still using when both rotate the id.
#[derive(Debug)]
pub struct CookiePersister<Handler, Generator = DefaultSessionIdGenerator> {
    handler: Arc<Handler>,
    config: PersisterConfig,
    generator: Generator,
}

/// Returns true if the window of `window` seconds starting at `since` closed before `now`.
fn has_elapsed(since: i64, window: u64, now: i64) -> bool {
    since.saturating_add(i64::try_from(window).unwrap_or(i64::MAX)) < now
}

fn is_cookie_named(value: &HeaderValue, name: &str) -> bool {
    value
        .to_str()
        .ok()
        .and_then(|value| Cookie::parse(value).ok())
        .is_some_and(|cookie| cookie.name() == name)
}

impl<Handler: StorageHandler> CookiePersister<Handler> {
    /// Create a persister storing sessions in `handler`, with securely generated session ids.
    pub fn new(handler: Handler, config: PersisterConfig) -> Result<Self> {
        Self::new_with_id_generator(handler, config, DefaultSessionIdGenerator)
    }
}

impl<Handler: StorageHandler, Generator: SessionIdGenerator> CookiePersister<Handler, Generator> {
    /// Create a persister storing sessions in `handler`, with ids generated by `generator`.
    /// Fails if the configuration is invalid.
    pub fn new_with_id_generator(
        handler: Handler,
        config: PersisterConfig,
        generator: Generator,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            handler: Arc::new(handler),
            config,
            generator,
        })
    }

    /// Returns the configuration of this persister.
    pub fn config(&self) -> &PersisterConfig {
        &self.config
    }

    /// Returns the storage handler of this persister.
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    fn session_options(&self) -> SessionOptions {
        self.config.session_options()
    }

    /// Generate a fresh session id.
    pub fn generate_session_id(&self, server_params: Option<&ServerParams>) -> Result<String> {
        let id = self.generator.generate_session_id(server_params);
        if id.is_empty() {
            Err(Error::Configuration(
                "the session id generator returned an empty id".into(),
            ))
        } else {
            Ok(id)
        }
    }

    /// Get the session for `request`.
    /// See [`CookiePersister::retrieve_at`].
    pub async fn retrieve<Request: SessionRequest>(
        &self,
        request: &Request,
    ) -> Result<Session<Handler>> {
        self.retrieve_at(request, Utc::now()).await
    }

    /// Get the session for `request` at time `now`.
    ///
    /// If the request carries no session cookie, a new session with a fresh id is created.
    /// Otherwise, the session named by the cookie is loaded and validated.
    /// An invalid session is replaced by an empty session under a fresh id,
    /// and a valid session whose id is due for rotation continues under a fresh id.
    /// In both cases the record under the previous id is destroyed.
    /// Finally, the metadata of the session is updated.
    ///
    /// Fails with [`Error::Configuration`] if ip address or user agent matching is enabled,
    /// but `request` does not expose [`ServerParams`].
    pub async fn retrieve_at<Request: SessionRequest>(
        &self,
        request: &Request,
        now: DateTime<Utc>,
    ) -> Result<Session<Handler>> {
        let server_params = request.server_params();
        if self.config.requires_server_params() && server_params.is_none() {
            return Err(Error::Configuration(
                "matching the ip address or user agent requires a request that exposes server parameters"
                    .into(),
            ));
        }
        let server_params = server_params.as_ref();

        let mut session = match request
            .cookie(&self.config.cookie_name)
            .filter(|id| !id.is_empty())
        {
            Some(id) => Session::resume(Arc::clone(&self.handler), id, self.session_options())?,
            None => Session::new(
                Arc::clone(&self.handler),
                self.generate_session_id(server_params)?,
                self.session_options(),
            )?,
        };

        let mut metadata = self.metadata(&mut session).await?;
        let timestamp = now.timestamp();

        if !self.validate_session(session.is_new(), &metadata, server_params, now) {
            let new_id = self.generate_session_id(server_params)?;
            session = session
                .with_session_id(new_id, false, PreviousRecord::Destroy)
                .await?;
            metadata = SessionMetadata::default();
        } else if metadata
            .last_regenerated_time
            .is_some_and(|regenerated| has_elapsed(regenerated, self.config.regenerate_time, timestamp))
        {
            debug!("Rotating the session id after {}s", self.config.regenerate_time);
            let new_id = self.generate_session_id(server_params)?;
            session = session
                .with_session_id(new_id, true, PreviousRecord::Destroy)
                .await?;
            metadata.last_regenerated_time = Some(timestamp);
        }

        metadata.touch(timestamp, server_params);
        session.set(self.config.metadata.clone(), &metadata).await?;
        Ok(session)
    }

    async fn metadata(&self, session: &mut Session<Handler>) -> Result<SessionMetadata> {
        Ok(match session.get(&self.config.metadata).await? {
            Some(value) => SessionMetadata::deserialize(value).unwrap_or_else(|error| {
                debug!("Ignoring malformed session metadata: {error}");
                SessionMetadata::default()
            }),
            None => SessionMetadata::default(),
        })
    }

    /// Returns true if a session with the given `metadata` may be used at time `now`.
    ///
    /// A session that is not new must carry complete metadata.
    /// Its last activity must lie within both `expire_time` and `expire_anyway_time`,
    /// and if enabled, its remote address and user agent must match `server_params`.
    pub fn validate_session(
        &self,
        is_new: bool,
        metadata: &SessionMetadata,
        server_params: Option<&ServerParams>,
        now: DateTime<Utc>,
    ) -> bool {
        let now = now.timestamp();
        let rejection = if !is_new && !metadata.is_complete() {
            Some("its metadata is incomplete")
        } else if metadata
            .last_activity_time
            .is_some_and(|last_activity| has_elapsed(last_activity, self.config.expire_time, now))
        {
            Some("it was idle for too long")
        } else if metadata.last_activity_time.is_some_and(|last_activity| {
            has_elapsed(last_activity, self.config.expire_anyway_time, now)
        }) {
            Some("it exceeded its maximum lifetime")
        } else if self.config.match_ip
            && matches!(
                (&metadata.ip_address, server_params),
                (Some(ip_address), Some(params)) if *ip_address != params.remote_addr
            )
        {
            Some("the ip address changed")
        } else if self.config.match_useragent
            && matches!(
                (&metadata.user_agent, server_params),
                (Some(user_agent), Some(params)) if *user_agent != params.user_agent
            )
        {
            Some("the user agent changed")
        } else {
            None
        };

        match rejection {
            Some(reason) => {
                debug!("Rejecting session because {reason}");
                false
            }
            None => true,
        }
    }

    /// Build the cookie announcing `session` to the client.
    ///
    /// A destroyed session yields an empty cookie that expired already,
    /// which makes the client drop it.
    pub fn session_cookie(&self, session: &Session<Handler>) -> Cookie<'static> {
        let mut builder = Cookie::build((self.config.cookie_name.clone(), session.id().to_owned()))
            .path(self.config.cookie_path.clone())
            .secure(self.config.cookie_secure)
            .http_only(self.config.cookie_httponly);
        if let Some(domain) = &self.config.cookie_domain {
            builder = builder.domain(domain.clone());
        }

        if session.was_destroyed() {
            let mut cookie = builder.build();
            cookie.make_removal();
            return cookie;
        }

        if self.config.cookie_lifetime > 0 {
            let lifetime =
                Duration::seconds(i64::try_from(self.config.cookie_lifetime).unwrap_or(i64::MAX));
            if let Some(expires) = OffsetDateTime::now_utc().checked_add(lifetime) {
                builder = builder.expires(expires);
            }
        }
        builder.build()
    }

    /// Attach the session cookie for `session` to `response`.
    ///
    /// If `response` sets a cookie with the session cookie name already, it is returned
    /// unchanged, unless `overwrite_existing` is set.
    /// Overwriting replaces only the `Set-Cookie` headers with the session cookie name.
    pub fn persist<B>(
        &self,
        session: &Session<Handler>,
        mut response: Response<B>,
        overwrite_existing: bool,
    ) -> Result<Response<B>> {
        let name = self.config.cookie_name.as_str();
        let exists = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .any(|value| is_cookie_named(value, name));
        if exists && !overwrite_existing {
            trace!("Response sets the session cookie already, leaving it as is");
            return Ok(response);
        }

        let header = HeaderValue::from_str(&self.session_cookie(session).to_string())?;
        let headers = response.headers_mut();
        if exists {
            let kept: Vec<HeaderValue> = headers
                .get_all(SET_COOKIE)
                .iter()
                .filter(|value| !is_cookie_named(value, name))
                .cloned()
                .collect();
            headers.remove(SET_COOKIE);
            for value in kept {
                headers.append(SET_COOKIE, value);
            }
        }
        headers.append(SET_COOKIE, header);

        Ok(response)
    }

    /// Finish the request for `session`.
    ///
    /// A changed session is saved and ended.
    /// The session cookie is attached to `response` if the session was destroyed,
    /// or if it was stored under a new id just now.
    /// Otherwise the client holds the right cookie already, and `response` is returned as is.
    pub async fn commit<B>(
        &self,
        session: &mut Session<Handler>,
        response: Response<B>,
    ) -> Result<Response<B>> {
        if session.was_destroyed() {
            return self.persist(session, response, false);
        }

        let was_new = session.is_new();
        if session.has_changed() {
            session.save(true).await?;
        }

        if was_new && !session.is_new() {
            self.persist(session, response, false)
        } else {
            Ok(response)
        }
    }
}
