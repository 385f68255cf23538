use crate::{codec, Error, Result, StorageHandler};
use log::{trace, warn};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// A session with a client.
///
/// The session is bound to a session id and a [`StorageHandler`].
/// Its data is loaded lazily: nothing touches the handler until the first operation that
/// needs the data.
/// It is marked `#[must_use]`, as dropping it without calling [`Session::save`] discards all
/// changes.
///
/// Besides plain data, a session holds two flash buckets.
/// Values written with [`Session::flash`] are readable during the next load cycle only,
/// after which they vanish unless [`Session::reflash`] is called.
#[derive(Debug)]
#[must_use]
pub struct Session<Handler> {
    handler: Arc<Handler>,
    id: String,
    options: SessionOptions,
    state: SessionState,
    data: Map<String, Value>,
    flash: FlashBuckets,
    changed: bool,
    new: bool,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum SessionState {
    /// The data was never loaded from the handler.
    Unstarted,
    /// The data is loaded and the handler is open.
    Started,
    /// The handler was closed. The next access reloads the data.
    Ended,
    /// The session was destroyed. Terminal.
    Destroyed,
}

/// Settings a session copies at construction.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SessionOptions {
    /// Records not written for this long are eligible for garbage collection.
    pub expiration_time: Duration,
    /// The chance in percent (`0..=100`) that loading the session triggers a garbage
    /// collection in the handler.
    pub gc_probability: u8,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            expiration_time: Duration::from_secs(60 * 60 * 20),
            gc_probability: 1,
        }
    }
}

/// Whether [`Session::with_session_id`] removes the record stored under the previous id.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PreviousRecord {
    /// Leave the record of the previous id in the storage handler.
    Keep,
    /// Destroy the record of the previous id in the storage handler.
    Destroy,
}

/// The two flash buckets of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlashBuckets {
    /// Flash data readable during the current load cycle.
    pub old: Map<String, Value>,
    /// Flash data that becomes readable in the next load cycle.
    pub new: Map<String, Value>,
}

/// The record a session stores in its handler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPayload {
    /// The plain session data.
    pub data: Map<String, Value>,
    /// The flash buckets.
    pub flash: FlashBuckets,
}

impl SessionPayload {
    /// Create a payload holding `data` and no flash data.
    pub fn from_data(data: Map<String, Value>) -> Self {
        Self {
            data,
            flash: FlashBuckets::default(),
        }
    }

    /// Encode this payload with the [`codec`].
    pub fn encode(&self) -> Result<Vec<u8>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => codec::encode(&map),
            _ => codec::encode(&Map::new()),
        }
    }

    /// Decode a payload produced by [`SessionPayload::encode`].
    /// Malformed input yields an empty payload.
    pub fn decode(bytes: &[u8]) -> Self {
        serde_json::from_value(Value::Object(codec::decode(bytes))).unwrap_or_else(|error| {
            warn!("Discarding session payload of unexpected shape: {error}");
            Self::default()
        })
    }
}

impl<Handler> Session<Handler> {
    /// Create a session for a freshly generated id.
    /// The session is new until it is saved for the first time.
    ///
    /// Does not access the handler.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use cookie_sessions::{NullHandler, Session, SessionOptions};
    /// # use std::sync::Arc;
    /// # fn main() -> cookie_sessions::Result {
    /// let session = Session::new(Arc::new(NullHandler), "3f2a", SessionOptions::default())?;
    /// assert!(session.is_new());
    /// assert!(!session.has_started());
    /// # Ok(()) }
    /// ```
    pub fn new(handler: Arc<Handler>, id: impl Into<String>, options: SessionOptions) -> Result<Self> {
        Self::with_state(handler, id.into(), options, true)
    }

    /// Create a session for an id presented by the client.
    /// Unlike [`Session::new`], the session is not considered new.
    ///
    /// Does not access the handler.
    pub fn resume(
        handler: Arc<Handler>,
        id: impl Into<String>,
        options: SessionOptions,
    ) -> Result<Self> {
        Self::with_state(handler, id.into(), options, false)
    }

    fn with_state(
        handler: Arc<Handler>,
        id: String,
        options: SessionOptions,
        new: bool,
    ) -> Result<Self> {
        if id.is_empty() {
            return Err(Error::InvalidArgument("the session id must not be empty".into()));
        }

        Ok(Self {
            handler,
            id,
            options,
            state: SessionState::Unstarted,
            data: Map::new(),
            flash: FlashBuckets::default(),
            changed: false,
            new,
        })
    }

    /// The id of this session.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The settings this session was created with.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Returns true if neither data nor flash data is loaded.
    /// Does not trigger loading.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.flash.old.is_empty() && self.flash.new.is_empty()
    }

    /// Returns true if this session was never successfully saved under its current id.
    pub fn is_new(&self) -> bool {
        self.new
    }

    /// Returns true if this session was changed since it was last loaded or saved.
    pub fn has_changed(&self) -> bool {
        self.changed
    }

    /// Returns true if the data is currently loaded from the handler.
    pub fn has_started(&self) -> bool {
        self.state == SessionState::Started
    }

    /// Returns true if this session was destroyed.
    pub fn was_destroyed(&self) -> bool {
        self.state == SessionState::Destroyed
    }

    fn ensure_alive(&self, operation: &'static str) -> Result {
        if self.was_destroyed() {
            Err(Error::destroyed(operation))
        } else {
            Ok(())
        }
    }
}

impl<Handler: StorageHandler> Session<Handler> {
    /// Load the data from the handler, unless it is loaded already.
    ///
    /// All data accessors call this implicitly.
    /// Loading moves the flash data written during the previous cycle into the readable bucket.
    /// If that moved or dropped any flash data, the session counts as changed,
    /// so that saving it does not resurrect stale flash data.
    pub async fn start(&mut self) -> Result {
        match self.state {
            SessionState::Started => return Ok(()),
            SessionState::Destroyed => return Err(Error::destroyed("start")),
            SessionState::Unstarted | SessionState::Ended => {}
        }

        let gc_probability = self.options.gc_probability.min(100);
        if gc_probability > 0 && rand::thread_rng().gen_range(0..100u8) < gc_probability {
            if let Err(error) = self.handler.gc(self.options.expiration_time).await {
                warn!("Session garbage collection failed: {error:#}");
            }
        }

        if let Err(error) = self.handler.open().await {
            warn!("Opening the session storage failed: {error:#}");
        }
        let payload = match self.handler.read(&self.id).await {
            Ok(bytes) => SessionPayload::decode(&bytes),
            Err(error) => {
                warn!("Reading session data failed, starting empty: {error:#}");
                SessionPayload::default()
            }
        };

        let SessionPayload { data, flash } = payload;
        let had_flash = !flash.old.is_empty() || !flash.new.is_empty();
        trace!(
            "Loaded session with {} entries and {} flashed entries",
            data.len(),
            flash.new.len()
        );

        self.data = data;
        self.flash = FlashBuckets {
            old: flash.new,
            new: Map::new(),
        };
        self.state = SessionState::Started;
        self.changed = had_flash;
        Ok(())
    }

    /// Returns the value stored under `key`, or `None` if there is none.
    /// Flash data readable in this cycle takes priority over plain data.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use cookie_sessions::{NullHandler, Session, SessionOptions};
    /// # use serde_json::json;
    /// # use std::sync::Arc;
    /// # fn main() -> cookie_sessions::Result { async_std::task::block_on(async {
    /// let mut session = Session::new(Arc::new(NullHandler), "3f2a", SessionOptions::default())?;
    /// assert_eq!(session.get("user").await?, None);
    /// session.set("user", "alice").await?;
    /// assert_eq!(session.get("user").await?, Some(&json!("alice")));
    /// # Ok(()) }) }
    /// ```
    pub async fn get(&mut self, key: &str) -> Result<Option<&Value>> {
        self.start().await?;
        Ok(self.flash.old.get(key).or_else(|| self.data.get(key)))
    }

    /// Returns a copy of the value stored under `key`, or `default` if there is none.
    pub async fn get_or(&mut self, key: &str, default: Value) -> Result<Value> {
        Ok(self.get(key).await?.cloned().unwrap_or(default))
    }

    /// Returns the value stored under `key` deserialized into `T`, or `None` if there is none.
    pub async fn get_as<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(value) => Ok(Some(T::deserialize(value)?)),
            None => Ok(None),
        }
    }

    /// Returns true if a value is stored under `key`, either as data or as readable flash data.
    pub async fn has(&mut self, key: &str) -> Result<bool> {
        self.start().await?;
        Ok(self.flash.old.contains_key(key) || self.data.contains_key(key))
    }

    /// Returns the plain session data, without flash data.
    pub async fn all(&mut self) -> Result<&Map<String, Value>> {
        self.start().await?;
        Ok(&self.data)
    }

    /// Returns both flash buckets.
    pub async fn flash_buckets(&mut self) -> Result<&FlashBuckets> {
        self.start().await?;
        Ok(&self.flash)
    }

    /// Store `value` under `key`.
    pub async fn set(&mut self, key: impl Into<String>, value: impl Serialize) -> Result {
        let value = serde_json::to_value(value)?;
        self.start().await?;
        self.data.insert(key.into(), value);
        self.changed = true;
        Ok(())
    }

    /// Remove the value stored under `key` and return it.
    pub async fn remove(&mut self, key: &str) -> Result<Option<Value>> {
        self.start().await?;
        let removed = self.data.remove(key);
        self.changed = true;
        Ok(removed)
    }

    /// Store all given entries. Later entries overwrite earlier ones.
    pub async fn add(&mut self, entries: impl IntoIterator<Item = (String, Value)>) -> Result {
        self.start().await?;
        self.data.extend(entries);
        self.changed = true;
        Ok(())
    }

    /// Remove all plain data.
    /// Flash data is kept, unless `include_flash` is set.
    pub async fn clear(&mut self, include_flash: bool) -> Result {
        self.start().await?;
        self.data.clear();
        if include_flash {
            self.flash = FlashBuckets::default();
        }
        self.changed = true;
        Ok(())
    }

    /// Store `value` under `key` for the next load cycle only.
    /// The value is not readable in the current cycle.
    pub async fn flash(&mut self, key: impl Into<String>, value: impl Serialize) -> Result {
        let value = serde_json::to_value(value)?;
        self.start().await?;
        self.flash.new.insert(key.into(), value);
        self.changed = true;
        Ok(())
    }

    /// Drop the flash data readable in this cycle under `key`.
    pub async fn unflash(&mut self, key: &str) -> Result {
        self.start().await?;
        self.flash.old.remove(key);
        self.changed = true;
        Ok(())
    }

    /// Keep the flash data readable in this cycle for one more cycle.
    /// Only the given keys are kept, or everything if `keys` is empty.
    pub async fn reflash(&mut self, keys: &[&str]) -> Result {
        self.start().await?;
        if keys.is_empty() {
            self.flash
                .new
                .extend(self.flash.old.iter().map(|(key, value)| (key.clone(), value.clone())));
        } else {
            for key in keys {
                if let Some(value) = self.flash.old.get(*key) {
                    self.flash.new.insert((*key).to_owned(), value.clone());
                }
            }
        }
        self.changed = true;
        Ok(())
    }

    /// Write the session to the handler if it was loaded and changed.
    /// If `end` is set, the session is [ended](Session::end) afterwards.
    ///
    /// A failing write is logged and leaves the session marked as changed.
    pub async fn save(&mut self, end: bool) -> Result {
        self.ensure_alive("save")?;

        if self.state == SessionState::Started && self.changed {
            let payload = SessionPayload {
                data: self.data.clone(),
                flash: self.flash.clone(),
            }
            .encode()?;
            match self.handler.write(&self.id, &payload).await {
                Ok(()) => {
                    self.changed = false;
                    self.new = false;
                }
                Err(error) => warn!("Writing session data failed: {error:#}"),
            }
        }

        if end {
            self.end().await?;
        }
        Ok(())
    }

    /// Close the handler. The next data access loads the data anew.
    pub async fn end(&mut self) -> Result {
        self.ensure_alive("end")?;

        if self.state == SessionState::Started {
            if let Err(error) = self.handler.close().await {
                warn!("Closing the session storage failed: {error:#}");
            }
            self.state = SessionState::Ended;
        }
        Ok(())
    }

    /// Remove this session from the handler and discard its data.
    /// Every later operation on this session fails.
    pub async fn destroy(&mut self) -> Result {
        self.ensure_alive("destroy")?;

        if let Err(error) = self.handler.destroy(&self.id).await {
            warn!("Destroying session data failed: {error:#}");
        }
        if let Err(error) = self.handler.close().await {
            warn!("Closing the session storage failed: {error:#}");
        }
        self.data.clear();
        self.flash = FlashBuckets::default();
        self.changed = false;
        self.state = SessionState::Destroyed;
        Ok(())
    }

    /// Create a copy of this session under `new_id`.
    ///
    /// This session is loaded first, if it is not yet.
    /// The copy keeps the data and flash data if `keep_data` is set, and starts empty
    /// otherwise.
    /// It is new and changed, so saving it writes a record under `new_id`.
    /// With [`PreviousRecord::Destroy`], the record under the current id is destroyed in the
    /// handler.
    /// This session itself is not modified.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use cookie_sessions::{NullHandler, PreviousRecord, Session, SessionOptions};
    /// # use serde_json::json;
    /// # use std::sync::Arc;
    /// # fn main() -> cookie_sessions::Result { async_std::task::block_on(async {
    /// let mut session = Session::new(Arc::new(NullHandler), "old", SessionOptions::default())?;
    /// session.set("user", "alice").await?;
    /// let mut rotated = session.with_session_id("new", true, PreviousRecord::Destroy).await?;
    /// assert_eq!(rotated.id(), "new");
    /// assert_eq!(rotated.get("user").await?, Some(&json!("alice")));
    /// assert_eq!(session.id(), "old");
    /// # Ok(()) }) }
    /// ```
    pub async fn with_session_id(
        &mut self,
        new_id: impl Into<String>,
        keep_data: bool,
        previous: PreviousRecord,
    ) -> Result<Self> {
        let new_id = new_id.into();
        self.ensure_alive("change the id of")?;
        if new_id.is_empty() {
            return Err(Error::InvalidArgument("the session id must not be empty".into()));
        }
        self.start().await?;

        if previous == PreviousRecord::Destroy {
            if let Err(error) = self.handler.destroy(&self.id).await {
                warn!("Destroying the previous session record failed: {error:#}");
            }
        }

        let (data, flash) = if keep_data {
            (self.data.clone(), self.flash.clone())
        } else {
            Default::default()
        };

        Ok(Self {
            handler: Arc::clone(&self.handler),
            id: new_id,
            options: self.options,
            state: SessionState::Started,
            data,
            flash,
            changed: true,
            new: true,
        })
    }
}
