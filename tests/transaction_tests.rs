//! Commit / rollback semantics of scoped transactions

use persistmap::{
    LockRegistry, PersistentStore, StoreConfig, StoreError, TransactionError, TransactionState,
};
use serde_json::{Value, json};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn on_disk(path: &Path) -> Value {
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

/// Persists S0 = {"count": 0, "items": ["a"]}
fn seed(name: &Path) -> PersistentStore {
    let mut store = PersistentStore::with_config(name, StoreConfig::new().using_locks(true));
    store
        .with_transaction(|tx| {
            tx.insert("count".into(), json!(0));
            tx.insert("items".into(), json!(["a"]));
            Ok::<_, ()>(())
        })
        .unwrap();
    store
}

#[test]
fn test_commit_on_success() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = seed(&temp_dir.path().join("commit"));

    let mut tx = store.transaction().unwrap();
    tx.insert("count".into(), json!(1));
    tx.get_mut("items")
        .and_then(Value::as_array_mut)
        .unwrap()
        .push(json!("b"));
    tx.commit().unwrap();

    let expected = json!({"count": 1, "items": ["a", "b"]});
    assert_eq!(on_disk(store.path()), expected);
    assert_eq!(Value::Object(store.data().clone()), expected);
}

#[test]
fn test_rollback_on_failure() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = seed(&temp_dir.path().join("rollback"));

    let mut tx = store.transaction().unwrap();
    tx.insert("count".into(), json!(99));
    tx.remove("items");
    tx.insert("extra".into(), json!(true));
    tx.rollback().unwrap();

    let expected = json!({"count": 0, "items": ["a"]});
    assert_eq!(on_disk(store.path()), expected);
    assert_eq!(Value::Object(store.data().clone()), expected);
    assert!(!store.in_transaction());
    assert!(!store.has_snapshot());
}

#[test]
fn test_snapshot_is_deep() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = seed(&temp_dir.path().join("deep"));

    store.begin().unwrap();
    store
        .get_mut("items")
        .and_then(Value::as_array_mut)
        .unwrap()
        .clear();
    store.end(true).unwrap();

    assert_eq!(store.get("items"), Some(&json!(["a"])));
}

#[test]
fn test_low_level_begin_end() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = seed(&temp_dir.path().join("manual"));

    store.begin().unwrap().insert("count".into(), json!(5));
    assert!(store.in_transaction());
    assert!(store.has_snapshot());
    store.end(false).unwrap();

    assert_eq!(on_disk(store.path())["count"], json!(5));
    assert!(!store.in_transaction());
}

#[test]
fn test_nested_begin_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = seed(&temp_dir.path().join("nested"));

    store.begin().unwrap();
    store.insert("count".into(), json!(3));
    assert!(matches!(store.begin(), Err(StoreError::NestedTransaction(_))));
    // Nothing was reloaded or re-snapshotted
    assert_eq!(store.get("count"), Some(&json!(3)));

    store.end(true).unwrap();
    assert_eq!(store.get("count"), Some(&json!(0)));
}

#[test]
fn test_end_releases_lock_for_next_transaction() {
    let temp_dir = TempDir::new().unwrap();
    let name = temp_dir.path().join("relock");
    let mut store = seed(&name);
    let config = StoreConfig::new()
        .using_locks(true)
        .lock_timeout(Duration::from_millis(100));
    let mut other = PersistentStore::with_config(&name, config);

    store.transaction().unwrap().rollback().unwrap();
    other.transaction().unwrap().commit().unwrap();
    store.transaction().unwrap().commit().unwrap();
}

#[test]
fn test_panic_inside_transaction_rolls_back() {
    let temp_dir = TempDir::new().unwrap();
    let name = temp_dir.path().join("panic");
    let mut store = seed(&name);

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut tx = store.transaction().unwrap();
        tx.insert("count".into(), json!(42));
        if tx.contains_key("count") {
            panic!("unit of work blew up");
        }
        tx.commit()
    }));
    assert!(result.is_err());

    assert!(!store.in_transaction());
    assert_eq!(on_disk(store.path())["count"], json!(0));

    // The lock was released on unwind
    let config = StoreConfig::new()
        .using_locks(true)
        .lock_timeout(Duration::from_millis(200));
    let mut other = PersistentStore::with_config(&name, config);
    other.transaction().unwrap().commit().unwrap();
}

#[test]
fn test_early_return_rolls_back() {
    fn bump(store: &mut PersistentStore, fail: bool) -> Result<(), String> {
        let mut tx = store.transaction().map_err(|e| e.to_string())?;
        tx.insert("count".into(), json!(1));
        if fail {
            return Err("validation failed".into());
        }
        tx.commit().map_err(|e| e.to_string())
    }

    let temp_dir = TempDir::new().unwrap();
    let mut store = seed(&temp_dir.path().join("early"));

    assert!(bump(&mut store, true).is_err());
    assert_eq!(on_disk(store.path())["count"], json!(0));
    bump(&mut store, false).unwrap();
    assert_eq!(on_disk(store.path())["count"], json!(1));
}

#[test]
fn test_with_transaction_result_channels() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = seed(&temp_dir.path().join("channels"));

    let doubled = store
        .with_transaction(|tx| {
            let count = tx.get_as::<i64>("count").map_err(|e| e.to_string())?.unwrap_or(0);
            tx.set("count", count + 2).map_err(|e| e.to_string())?;
            Ok::<_, String>((count + 2) * 2)
        })
        .unwrap();
    assert_eq!(doubled, 4);

    let err = store
        .with_transaction(|tx| {
            tx.insert("count".into(), json!(-1));
            Err::<(), _>("negative counts are not allowed".to_string())
        })
        .unwrap_err();
    assert!(err.is_aborted());
    assert_eq!(err.into_cause().as_deref(), Some("negative counts are not allowed"));
    assert_eq!(on_disk(store.path())["count"], json!(2));
}

#[test]
fn test_guard_state_and_explicit_restore() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = seed(&temp_dir.path().join("restore"));

    let mut tx = store.transaction().unwrap();
    assert_eq!(tx.state(), TransactionState::Active);
    tx.insert("count".into(), json!(10));
    tx.restore().unwrap();
    assert_eq!(tx.get("count"), Some(&json!(0)));
    // restore dumps immediately
    assert_eq!(on_disk(tx.path())["count"], json!(0));

    tx.insert("count".into(), json!(11));
    tx.commit().unwrap();
    assert_eq!(on_disk(store.path())["count"], json!(11));

    // Outside a transaction there is nothing to restore to
    assert!(matches!(store.restore(), Err(StoreError::NoSnapshot)));
}

#[test]
fn test_store_error_inside_with_transaction() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = PersistentStore::new(temp_dir.path().join("bad"));
    fs::write(store.path(), "42").unwrap();

    let err: TransactionError<()> = store.with_transaction(|_| Ok(())).unwrap_err();
    assert!(!err.is_aborted());
    assert!(matches!(err.store_error(), Some(StoreError::Decode { .. })));
}

/// Locked store whose data file is replaced by a directory once the
/// transaction is open, so every dump fails.
fn begin_with_unwritable_file(dir: &TempDir, name: &str) -> (PersistentStore, Arc<LockRegistry>) {
    let registry = Arc::new(LockRegistry::new());
    let mut store = PersistentStore::with_config(
        dir.path().join(name),
        StoreConfig::new()
            .using_locks(true)
            .lock_timeout(Duration::from_secs(5)),
    )
    .with_registry(Arc::clone(&registry));

    store.begin().unwrap();
    store.insert("k".into(), json!("v"));
    fs::create_dir(store.path()).unwrap();
    (store, registry)
}

#[test]
fn test_failed_dump_on_commit_releases_lock() {
    let temp_dir = TempDir::new().unwrap();
    let (mut store, registry) = begin_with_unwritable_file(&temp_dir, "commit-fails");
    let key = std::path::absolute(store.path()).unwrap();

    assert!(matches!(store.end(false), Err(StoreError::Io(_))));
    assert!(!store.in_transaction());
    assert!(!store.has_snapshot());
    assert!(!registry.is_locked(&key).unwrap());

    // Nothing is left held: the next transaction gets the lock straight away
    fs::remove_dir(store.path()).unwrap();
    store.begin().unwrap();
    store.end(false).unwrap();
}

#[test]
fn test_failed_dump_on_rollback_still_restores_and_releases() {
    let temp_dir = TempDir::new().unwrap();
    let (mut store, registry) = begin_with_unwritable_file(&temp_dir, "rollback-fails");
    let key = std::path::absolute(store.path()).unwrap();

    assert!(matches!(store.end(true), Err(StoreError::Io(_))));
    assert!(!store.in_transaction());
    assert!(!registry.is_locked(&key).unwrap());
    // The in-memory mapping is back at the snapshot even though nothing was written
    assert!(store.is_empty());
}

#[test]
fn test_failed_dump_in_with_transaction_is_store_error() {
    let temp_dir = TempDir::new().unwrap();
    let registry = Arc::new(LockRegistry::new());
    let mut store = PersistentStore::with_config(
        temp_dir.path().join("scoped"),
        StoreConfig::new().using_locks(true),
    )
    .with_registry(Arc::clone(&registry));

    let err: TransactionError<()> = store
        .with_transaction(|tx| {
            tx.insert("k".into(), json!(1));
            fs::create_dir(tx.path()).unwrap();
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err.store_error(), Some(StoreError::Io(_))));

    let key = std::path::absolute(store.path()).unwrap();
    assert!(!registry.is_locked(&key).unwrap());
}
