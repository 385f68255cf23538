use crate::ServerParams;
use chrono::Utc;
use rand::distributions::{Alphanumeric, DistString};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A type with the ability to generate session ids.
pub trait SessionIdGenerator {
    /// Generate a session id, i.e. a non-empty string that is a valid HTTP cookie value.
    /// `server_params` describe the client, if the request exposes them.
    fn generate_session_id(&self, server_params: Option<&ServerParams>) -> String;
}

/// The default session id generator with focus on security.
///
/// It hashes 32 characters drawn from [rand::thread_rng] with the [Alphanumeric] distribution,
/// together with the current time and the remote address of the client, using blake3.
/// The random part alone gives `32 * log_2(26+26+10) ≥ 190` bits of entropy.
/// The id is the hex encoding of the hash, 64 characters long.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSessionIdGenerator;

impl SessionIdGenerator for DefaultSessionIdGenerator {
    fn generate_session_id(&self, server_params: Option<&ServerParams>) -> String {
        let mut entropy = String::new();
        Alphanumeric.append_string(&mut rand::thread_rng(), &mut entropy, 32);

        let now = Utc::now();
        let mut hasher = blake3::Hasher::new();
        hasher.update(entropy.as_bytes());
        hasher.update(&now.timestamp().to_le_bytes());
        hasher.update(&now.timestamp_subsec_nanos().to_le_bytes());
        if let Some(server_params) = server_params {
            hasher.update(server_params.remote_addr.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// A debug session id generator that generates an ascending sequence of integers,
/// formatted as strings padded with zeroes to 32 characters.
#[derive(Debug, Default)]
pub struct DebugSessionIdGenerator {
    next_index: AtomicUsize,
}

impl DebugSessionIdGenerator {
    /// Create a generator whose first id is `0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id generated by the `index`th call, counting from zero.
    pub fn id_at(index: usize) -> String {
        format!("{index:032}")
    }
}

impl SessionIdGenerator for DebugSessionIdGenerator {
    fn generate_session_id(&self, _server_params: Option<&ServerParams>) -> String {
        Self::id_at(self.next_index.fetch_add(1, Ordering::Relaxed))
    }
}

/// A session id generator delegating to a closure.
pub struct FnSessionIdGenerator<F> {
    generate: F,
}

impl<F: Fn(Option<&ServerParams>) -> String> FnSessionIdGenerator<F> {
    /// Generate session ids by calling `generate`.
    pub fn new(generate: F) -> Self {
        Self { generate }
    }
}

impl<F: Fn(Option<&ServerParams>) -> String> SessionIdGenerator for FnSessionIdGenerator<F> {
    fn generate_session_id(&self, server_params: Option<&ServerParams>) -> String {
        (self.generate)(server_params)
    }
}

impl<F> Debug for FnSessionIdGenerator<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSessionIdGenerator").finish_non_exhaustive()
    }
}
