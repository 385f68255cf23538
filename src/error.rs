use http::header::InvalidHeaderValue;

/// All errors that can occur in this crate.
///
/// Failures of the [`StorageHandler`](crate::StorageHandler) are not part of this enum.
/// They are logged and swallowed, as storage is treated as best-effort.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An operation was attempted on a session that was destroyed before.
    /// A destroyed session never changes again, so this is never worth retrying.
    #[error("cannot {operation} a destroyed session")]
    DestroyedSessionOperation {
        /// The name of the rejected operation.
        operation: &'static str,
    },

    /// A caller passed an argument that can never be valid, e.g. an empty session id.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The persister was configured in a way that cannot work,
    /// e.g. ip matching against a request that does not expose a remote address.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A session value could not be converted to or from its stored representation.
    #[error("failed to convert session data: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The session cookie could not be rendered into a `Set-Cookie` header.
    #[error("the session cookie is not a valid header value: {0}")]
    InvalidCookieHeader(#[from] InvalidHeaderValue),
}

impl Error {
    pub(crate) fn destroyed(operation: &'static str) -> Self {
        Self::DestroyedSessionOperation { operation }
    }
}

mod expect_impl_error {
    trait ExpectImplError: std::error::Error + Send + Sync + 'static {}

    impl ExpectImplError for super::Error {}
}
