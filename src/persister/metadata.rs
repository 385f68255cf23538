use crate::ServerParams;
use serde::{Deserialize, Serialize};

/// Bookkeeping the persister stores inside every session it hands out.
///
/// Timestamps are unix timestamps in seconds.
/// Every field is optional, as the metadata of a stored session may be incomplete if the
/// session was tampered with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionMetadata {
    /// When the session was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<i64>,
    /// When the session was last retrieved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity_time: Option<i64>,
    /// When the session id was last rotated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_regenerated_time: Option<i64>,
    /// The remote address of the client that created the session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// The user agent of the client that created the session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl SessionMetadata {
    /// Returns true if all fields are present.
    pub fn is_complete(&self) -> bool {
        self.creation_time.is_some()
            && self.last_activity_time.is_some()
            && self.last_regenerated_time.is_some()
            && self.ip_address.is_some()
            && self.user_agent.is_some()
    }

    /// Record activity at `now`, filling in every field that is missing.
    /// Without `server_params`, missing client properties are recorded as empty strings.
    pub(crate) fn touch(&mut self, now: i64, server_params: Option<&ServerParams>) {
        self.creation_time.get_or_insert(now);
        self.last_regenerated_time.get_or_insert(now);
        self.last_activity_time = Some(now);
        if self.ip_address.is_none() {
            self.ip_address = Some(
                server_params
                    .map(|params| params.remote_addr.clone())
                    .unwrap_or_default(),
            );
        }
        if self.user_agent.is_none() {
            self.user_agent = Some(
                server_params
                    .map(|params| params.user_agent.clone())
                    .unwrap_or_default(),
            );
        }
    }
}
