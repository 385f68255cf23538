//! Cookie-identified server-side sessions.
//!
//! This crate stores arbitrary key-value data per client, keyed by a session id that travels
//! in a cookie.
//! A [`Session`] loads its data lazily from a [`StorageHandler`] and writes it back on
//! [`Session::save`].
//! A [`CookiePersister`] reads the session id from the request cookie, validates the session,
//! rotates its id when required and writes the session cookie into the response.
//!
//! # Flash data
//!
//! Values stored with [`Session::flash`] are readable during the next load cycle of the session
//! only, which is usually the next request.
//! [`Session::reflash`] keeps them alive for one more cycle.
//!
//! # Security
//!
//! Session ids are rotated on a schedule and replaced whenever a session fails validation,
//! i.e. when it was idle for too long, when its metadata is incomplete, or when its
//! remote address or user agent changed (if enabled).
//! This limits the usefulness of fixated or stolen session ids.
//!
//! Sessions are not locked. Concurrent requests presenting the same session id race,
//! and the last one to save wins.
//!
//! # Example
//!
//! ```
//! use cookie_sessions::{CookiePersister, MemoryHandler, PersisterConfig};
//! use http::{Request, Response};
//!
//! # fn main() -> cookie_sessions::Result {
//! # async_std::task::block_on(async {
//! #
//! let persister = CookiePersister::new(MemoryHandler::new(), PersisterConfig::default())?;
//!
//! // A request without a session cookie gets a fresh session.
//! let request = Request::new(());
//! let mut session = persister.retrieve(&request).await?;
//! session.set("user", "alice").await?;
//! session.flash("notice", "Welcome back!").await?;
//!
//! // Saving the session and attaching the cookie happens when the response is ready.
//! let response = persister.commit(&mut session, Response::new(())).await?;
//! assert!(response.headers().contains_key(http::header::SET_COOKIE));
//! #
//! # Ok(()) }) }
//! ```

#![forbid(unsafe_code)]
#![deny(
    future_incompatible,
    missing_debug_implementations,
    nonstandard_style,
    missing_docs,
    unreachable_pub,
    missing_copy_implementations,
    unused_qualifications
)]

pub mod codec;
mod config;
mod error;
mod memory_handler;
mod persister;
mod session;
mod storage_handler;

pub use config::{PersisterConfig, DEFAULT_COOKIE_NAME, DEFAULT_METADATA_KEY};
pub use error::Error;
pub use memory_handler::{MemoryHandler, Operation};
pub use persister::{
    CookiePersister, DebugSessionIdGenerator, DefaultSessionIdGenerator, FnSessionIdGenerator,
    ServerParams, ServerRequest, SessionIdGenerator, SessionMetadata, SessionRequest,
};
pub use session::{FlashBuckets, PreviousRecord, Session, SessionOptions, SessionPayload};
pub use storage_handler::{FileHandler, LogHandler, NullHandler, StorageHandler};

/// A result with this crate's [`Error`] and a default return type of ()
pub type Result<T = (), E = Error> = std::result::Result<T, E>;
