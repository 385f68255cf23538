use crate::{Error, Result, SessionOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The default name of the session cookie.
pub const DEFAULT_COOKIE_NAME: &str = "laasti:session";
/// The default key under which the persister stores its metadata inside the session data.
pub const DEFAULT_METADATA_KEY: &str = "laasti:metadata";

/// Configuration of a [`CookiePersister`](crate::CookiePersister).
///
/// All durations are in seconds.
/// Missing fields take their default when deserializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersisterConfig {
    /// Reject sessions used from a remote address other than the one that created them.
    pub match_ip: bool,
    /// Reject sessions used with a user agent other than the one that created them.
    pub match_useragent: bool,
    /// Sessions idle for longer than this are replaced by a fresh session.
    pub expire_time: u64,
    /// Sessions whose last activity is older than this are replaced by a fresh session.
    ///
    /// Like `expire_time`, this is measured from the last activity, not from the creation
    /// of the session.
    pub expire_anyway_time: u64,
    /// The session id is rotated once it is older than this.
    pub regenerate_time: u64,
    /// The key under which the metadata is stored inside the session data.
    pub metadata: String,
    /// The chance in percent that loading a session triggers garbage collection.
    pub gc_probability: u8,
    /// The name of the session cookie.
    pub cookie_name: String,
    /// The lifetime of the session cookie. Zero makes it last until the browser is closed.
    pub cookie_lifetime: u64,
    /// The `Domain` attribute of the session cookie.
    pub cookie_domain: Option<String>,
    /// The `Path` attribute of the session cookie.
    pub cookie_path: String,
    /// The `Secure` attribute of the session cookie.
    pub cookie_secure: bool,
    /// The `HttpOnly` attribute of the session cookie.
    pub cookie_httponly: bool,
}

impl Default for PersisterConfig {
    fn default() -> Self {
        Self {
            match_ip: false,
            match_useragent: false,
            expire_time: 60 * 60 * 20,
            expire_anyway_time: 60 * 60 * 60 * 24 * 7,
            regenerate_time: 300,
            metadata: DEFAULT_METADATA_KEY.to_owned(),
            gc_probability: 1,
            cookie_name: DEFAULT_COOKIE_NAME.to_owned(),
            cookie_lifetime: 0,
            cookie_domain: None,
            cookie_path: "/".to_owned(),
            cookie_secure: false,
            cookie_httponly: true,
        }
    }
}

impl PersisterConfig {
    /// Check that the configuration can be used.
    pub fn validate(&self) -> Result {
        if self.gc_probability > 100 {
            return Err(Error::Configuration(format!(
                "gc_probability is a percentage, but is {}",
                self.gc_probability
            )));
        }
        if self.cookie_name.is_empty() {
            return Err(Error::Configuration("cookie_name must not be empty".into()));
        }
        if self.metadata.is_empty() {
            return Err(Error::Configuration("metadata must not be empty".into()));
        }
        Ok(())
    }

    /// The settings handed to every session created with this configuration.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            expiration_time: Duration::from_secs(self.expire_time),
            gc_probability: self.gc_probability,
        }
    }

    pub(crate) fn requires_server_params(&self) -> bool {
        self.match_ip || self.match_useragent
    }
}
