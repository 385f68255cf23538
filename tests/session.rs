use cookie_sessions::{
    Error, FlashBuckets, MemoryHandler, NullHandler, Operation, PreviousRecord, Session,
    SessionOptions, SessionPayload,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

const OPTIONS: SessionOptions = SessionOptions {
    expiration_time: Duration::from_secs(3600),
    gc_probability: 0,
};

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected an object"),
    }
}

fn null_session() -> Session<NullHandler> {
    Session::new(Arc::new(NullHandler), "test-session", OPTIONS).unwrap()
}

fn read(id: &str) -> Operation {
    Operation::Read { id: id.to_owned() }
}

fn write(id: &str) -> Operation {
    Operation::Write { id: id.to_owned() }
}

fn destroy(id: &str) -> Operation {
    Operation::Destroy { id: id.to_owned() }
}

/// Adding a map stores every entry and leaves the flash buckets empty.
#[async_std::test]
async fn test_add_all() {
    let mut session = null_session();
    session
        .add(object(json!({"key1": "some test", "key2": "some other test"})))
        .await
        .unwrap();

    assert_eq!(session.get("key1").await.unwrap(), Some(&json!("some test")));
    assert_eq!(session.get("key2").await.unwrap(), Some(&json!("some other test")));
    let mut keys: Vec<_> = session.all().await.unwrap().keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, ["key1", "key2"]);
    assert_eq!(session.flash_buckets().await.unwrap(), &FlashBuckets::default());
}

/// Later entries win when `add` receives the same key twice.
#[async_std::test]
async fn test_add_overwrites_earlier_entries() {
    let mut session = null_session();
    session.set("key", 1).await.unwrap();
    session
        .add(vec![
            ("key".to_owned(), json!(2)),
            ("key".to_owned(), json!(3)),
        ])
        .await
        .unwrap();
    assert_eq!(session.get("key").await.unwrap(), Some(&json!(3)));
}

/// Basic accessors, defaults and typed reads.
#[async_std::test]
async fn test_has_get_set_remove() {
    let mut session = null_session();

    session.set("key1", "some test").await.unwrap();
    assert!(session.has("key1").await.unwrap());
    assert_eq!(
        session.get_or("key2", json!("default")).await.unwrap(),
        json!("default")
    );
    assert_eq!(session.get("key2").await.unwrap(), None);
    assert_eq!(
        session.get_as::<String>("key1").await.unwrap().as_deref(),
        Some("some test")
    );

    assert_eq!(
        session.remove("key1").await.unwrap(),
        Some(json!("some test"))
    );
    assert!(!session.has("key1").await.unwrap());
    assert_eq!(session.get("key1").await.unwrap(), None);
}

/// Clearing keeps flash data unless asked to remove it too.
#[async_std::test]
async fn test_clear() {
    let mut session = null_session();

    session.add(object(json!({"test": 1}))).await.unwrap();
    session.flash("flash", true).await.unwrap();
    session.clear(false).await.unwrap();
    assert_eq!(session.get_or("test", json!(2)).await.unwrap(), json!(2));
    assert_eq!(
        session.flash_buckets().await.unwrap().new.get("flash"),
        Some(&json!(true))
    );

    session.add(object(json!({"test": 1}))).await.unwrap();
    session.flash("flash", true).await.unwrap();
    session.clear(true).await.unwrap();
    assert_eq!(session.get_or("test", json!(2)).await.unwrap(), json!(2));
    assert!(session.flash_buckets().await.unwrap().new.is_empty());
    assert!(session.is_empty());
}

/// Preloaded flash data is readable and can be reflashed selectively or entirely.
#[async_std::test]
async fn test_flash_session() {
    let payload = SessionPayload {
        data: Map::new(),
        flash: FlashBuckets {
            old: Map::new(),
            new: object(json!({"flashed": true, "flashed2": 123})),
        },
    };
    let handler = MemoryHandler::new().with_payload("id", &payload).unwrap();
    let mut session = Session::resume(Arc::new(handler), "id", OPTIONS).unwrap();

    assert!(session.has("flashed").await.unwrap());
    assert_eq!(session.get("flashed").await.unwrap(), Some(&json!(true)));
    assert_eq!(session.get("flashed2").await.unwrap(), Some(&json!(123)));

    session.reflash(&["flashed"]).await.unwrap();
    let buckets = session.flash_buckets().await.unwrap();
    assert_eq!(buckets.new.get("flashed"), Some(&json!(true)));
    assert!(!buckets.new.contains_key("flashed2"));

    session.reflash(&[]).await.unwrap();
    assert_eq!(
        session.flash_buckets().await.unwrap().new.get("flashed2"),
        Some(&json!(123))
    );
}

/// A flashed value shadows a plain value of the same key until it is unflashed.
#[async_std::test]
async fn test_flash_takes_priority_over_data() {
    let payload = SessionPayload {
        data: object(json!({"message": "plain"})),
        flash: FlashBuckets {
            old: Map::new(),
            new: object(json!({"message": "flashed"})),
        },
    };
    let handler = MemoryHandler::new().with_payload("id", &payload).unwrap();
    let mut session = Session::resume(Arc::new(handler), "id", OPTIONS).unwrap();

    assert_eq!(session.get("message").await.unwrap(), Some(&json!("flashed")));
    session.unflash("message").await.unwrap();
    assert_eq!(session.get("message").await.unwrap(), Some(&json!("plain")));
}

/// Flash data becomes readable on the next load cycle and is gone on the one after.
#[async_std::test]
async fn test_flash_lifecycle() {
    let handler = Arc::new(MemoryHandler::new());

    // Cycle N: the flashed value is not readable yet.
    let mut session = Session::new(Arc::clone(&handler), "id", OPTIONS).unwrap();
    session.flash("notice", "saved").await.unwrap();
    assert_eq!(session.get("notice").await.unwrap(), None);
    session.save(true).await.unwrap();

    // Cycle N+1: readable.
    let mut session = Session::resume(Arc::clone(&handler), "id", OPTIONS).unwrap();
    assert_eq!(session.get("notice").await.unwrap(), Some(&json!("saved")));
    assert!(session.has_changed());
    session.save(true).await.unwrap();

    // Cycle N+2: gone.
    let mut session = Session::resume(Arc::clone(&handler), "id", OPTIONS).unwrap();
    assert_eq!(session.get("notice").await.unwrap(), None);
    session.save(true).await.unwrap();

    let payload = handler.payload("id").unwrap();
    assert_eq!(payload.flash, FlashBuckets::default());
}

/// Reflashing keeps flash data alive for exactly one more cycle.
#[async_std::test]
async fn test_reflash_keeps_flash_data_for_one_more_cycle() {
    let handler = Arc::new(MemoryHandler::new());

    let mut session = Session::new(Arc::clone(&handler), "id", OPTIONS).unwrap();
    session.flash("notice", "saved").await.unwrap();
    session.save(true).await.unwrap();

    let mut session = Session::resume(Arc::clone(&handler), "id", OPTIONS).unwrap();
    session.reflash(&[]).await.unwrap();
    session.save(true).await.unwrap();

    let mut session = Session::resume(Arc::clone(&handler), "id", OPTIONS).unwrap();
    assert_eq!(session.get("notice").await.unwrap(), Some(&json!("saved")));
    session.save(true).await.unwrap();

    let mut session = Session::resume(Arc::clone(&handler), "id", OPTIONS).unwrap();
    assert_eq!(session.get("notice").await.unwrap(), None);
}

/// A session that is never accessed never touches its handler.
#[async_std::test]
async fn test_handler_session_unused() {
    let handler = Arc::new(MemoryHandler::new());
    let session = Session::new(Arc::clone(&handler), "id", OPTIONS).unwrap();
    assert!(!session.has_started());
    drop(session);
    assert!(handler.operations().is_empty());
}

/// Saving a new session opens, reads, writes and closes the handler once.
#[async_std::test]
async fn test_handler_session_created() {
    let handler = Arc::new(MemoryHandler::new());
    let mut session = Session::new(Arc::clone(&handler), "id", OPTIONS).unwrap();
    session.set("test", 123).await.unwrap();
    assert!(session.is_new());
    session.save(true).await.unwrap();

    assert!(!session.is_new());
    assert!(!session.has_changed());
    assert!(!session.has_started());
    assert_eq!(
        handler.operations(),
        [Operation::Open, read("id"), write("id"), Operation::Close]
    );
    assert_eq!(handler.payload("id").unwrap().data, object(json!({"test": 123})));
}

/// A copy under a new id keeps the data and writes only the new record.
#[async_std::test]
async fn test_handler_session_changed_id() {
    let handler = Arc::new(MemoryHandler::new());
    let mut session = Session::new(Arc::clone(&handler), "id", OPTIONS).unwrap();
    session.set("test", 123).await.unwrap();
    let mut session = session
        .with_session_id("new-id", true, PreviousRecord::Keep)
        .await
        .unwrap();
    assert_eq!(session.get("test").await.unwrap(), Some(&json!(123)));
    session.save(true).await.unwrap();

    assert_eq!(
        handler.operations(),
        [Operation::Open, read("id"), write("new-id"), Operation::Close]
    );
}

/// Rotating without the data destroys the previous record, while the original session keeps its value.
#[async_std::test]
async fn test_handler_session_changed_id_old_destroyed() {
    let handler = Arc::new(
        MemoryHandler::new()
            .with_payload("id", &SessionPayload::from_data(object(json!({"test": 123}))))
            .unwrap(),
    );
    let mut session = Session::resume(Arc::clone(&handler), "id", OPTIONS).unwrap();
    let mut rotated = session
        .with_session_id("new-id", false, PreviousRecord::Destroy)
        .await
        .unwrap();
    assert_eq!(rotated.get_or("test", json!(1)).await.unwrap(), json!(1));
    assert!(rotated.is_new());
    rotated.save(true).await.unwrap();

    // The original session is untouched.
    assert_eq!(session.id(), "id");
    assert_eq!(session.get("test").await.unwrap(), Some(&json!(123)));

    assert_eq!(
        handler.operations(),
        [
            Operation::Open,
            read("id"),
            destroy("id"),
            write("new-id"),
            Operation::Close
        ]
    );
    assert!(!handler.contains("id"));
    assert!(handler.contains("new-id"));
}

/// Reading alone does not cause a write.
#[async_std::test]
async fn test_unchanged_session_is_not_written() {
    let handler = Arc::new(
        MemoryHandler::new()
            .with_payload("id", &SessionPayload::from_data(object(json!({"test": 1}))))
            .unwrap(),
    );
    let mut session = Session::resume(Arc::clone(&handler), "id", OPTIONS).unwrap();
    assert_eq!(session.get("test").await.unwrap(), Some(&json!(1)));
    assert!(!session.has_changed());
    session.save(true).await.unwrap();

    assert_eq!(
        handler.operations(),
        [Operation::Open, read("id"), Operation::Close]
    );
}

/// An ended session loads again from the handler on the next access.
#[async_std::test]
async fn test_ended_session_reloads_on_access() {
    let handler = Arc::new(MemoryHandler::new());
    let mut session = Session::new(Arc::clone(&handler), "id", OPTIONS).unwrap();
    session.set("test", 1).await.unwrap();
    session.save(true).await.unwrap();
    assert!(!session.has_started());

    assert_eq!(session.get("test").await.unwrap(), Some(&json!(1)));
    assert!(session.has_started());
    assert_eq!(
        handler.operations(),
        [
            Operation::Open,
            read("id"),
            write("id"),
            Operation::Close,
            Operation::Open,
            read("id")
        ]
    );
}

/// `save(false)` writes without closing the handler.
#[async_std::test]
async fn test_save_without_end_keeps_session_open() {
    let handler = Arc::new(MemoryHandler::new());
    let mut session = Session::new(Arc::clone(&handler), "id", OPTIONS).unwrap();
    session.set("test", 1).await.unwrap();
    session.save(false).await.unwrap();

    assert!(session.has_started());
    assert_eq!(
        handler.operations(),
        [Operation::Open, read("id"), write("id")]
    );
}

/// Every operation on a destroyed session fails, and the handler sees a single destroy.
#[async_std::test]
async fn test_destroyed_session_rejects_operations() {
    let handler = Arc::new(MemoryHandler::new());
    let mut session = Session::new(Arc::clone(&handler), "id", OPTIONS).unwrap();
    session.set("test", 1).await.unwrap();
    session.save(false).await.unwrap();
    session.destroy().await.unwrap();

    assert!(session.was_destroyed());
    assert!(session.is_empty());
    assert!(!handler.contains("id"));
    assert!(matches!(
        session.set("test", 2).await,
        Err(Error::DestroyedSessionOperation { .. })
    ));
    assert!(matches!(
        session.get("test").await,
        Err(Error::DestroyedSessionOperation { .. })
    ));
    assert!(matches!(
        session.save(true).await,
        Err(Error::DestroyedSessionOperation { .. })
    ));
    assert!(matches!(
        session.end().await,
        Err(Error::DestroyedSessionOperation { .. })
    ));
    assert!(matches!(
        session.destroy().await,
        Err(Error::DestroyedSessionOperation { .. })
    ));
    assert!(matches!(
        session
            .with_session_id("other", true, PreviousRecord::Keep)
            .await,
        Err(Error::DestroyedSessionOperation { .. })
    ));
    assert_eq!(
        handler.operations(),
        [
            Operation::Open,
            read("id"),
            write("id"),
            destroy("id"),
            Operation::Close
        ]
    );
}

/// A probability of 100 collects garbage on every load, before opening the handler.
#[async_std::test]
async fn test_gc_is_triggered_by_probability() {
    let handler = Arc::new(MemoryHandler::new());
    let options = SessionOptions {
        expiration_time: Duration::from_secs(60),
        gc_probability: 100,
    };
    let mut session = Session::new(Arc::clone(&handler), "id", options).unwrap();
    session.get("anything").await.unwrap();

    assert_eq!(
        handler.operations(),
        [
            Operation::Gc {
                max_lifetime: Duration::from_secs(60)
            },
            Operation::Open,
            read("id")
        ]
    );
}

/// Unreadable payloads load as an empty session.
#[async_std::test]
async fn test_corrupted_payload_degrades_to_empty_session() {
    let handler = MemoryHandler::new().with_raw_payload("id", "a:1:{s:4:\"test\"");
    let mut session = Session::resume(Arc::new(handler), "id", OPTIONS).unwrap();
    assert_eq!(session.get("test").await.unwrap(), None);
    assert!(session.is_empty());
}

/// Backslashes in values survive a save and a reload.
#[async_std::test]
async fn test_backslashes_survive_storage() {
    let handler = Arc::new(MemoryHandler::new());
    let mut session = Session::new(Arc::clone(&handler), "id", OPTIONS).unwrap();
    session.set("path", "C:\\Users\\\\session\\").await.unwrap();
    session.save(true).await.unwrap();

    let mut session = Session::resume(Arc::clone(&handler), "id", OPTIONS).unwrap();
    assert_eq!(
        session.get("path").await.unwrap(),
        Some(&json!("C:\\Users\\\\session\\"))
    );
}

/// Sessions need a non-empty id.
#[test]
fn test_empty_session_id_is_rejected() {
    assert!(matches!(
        Session::new(Arc::new(NullHandler), "", OPTIONS),
        Err(Error::InvalidArgument(_))
    ));
}
