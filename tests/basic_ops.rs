mod common;

use memostore::{
  ConcurrentDataStore, DataStore, ExpiringDataStore, LazyLockingDataStoreAdapter,
  LockingDataStoreDecorator, SimpleDataStore, StoreError, TtlPolicy,
};

use std::time::Duration;

/// Exercises the whole store contract against one implementation.
fn check_contract<S: DataStore<String, i32>>(store: S) {
  assert!(store.is_empty());
  assert!(!store.contains_key(&"a".to_string()));

  // add + duplicate detection
  store.add("a".to_string(), 1).unwrap();
  assert!(store.contains_key(&"a".to_string()));
  assert_eq!(store.len(), 1);
  let err = store.add("a".to_string(), 2).unwrap_err();
  assert!(matches!(err, StoreError::DuplicateKey { .. }));
  assert_eq!(store.get(&"a".to_string()).unwrap(), 1);

  // set overwrites, get round-trips
  store.set("a".to_string(), 10).unwrap();
  assert_eq!(store.get(&"a".to_string()).unwrap(), 10);
  store.set("b".to_string(), 20).unwrap();
  assert_eq!(store.len(), 2);

  // get on an absent key fails; try_get and get_or_default do not
  let err = store.get(&"missing".to_string()).unwrap_err();
  assert!(matches!(err, StoreError::KeyNotFound { .. }));
  assert_eq!(store.try_get(&"missing".to_string()).unwrap(), None);
  assert_eq!(store.get_or_default(&"missing".to_string()).unwrap(), 0);
  assert_eq!(store.get_or_default(&"b".to_string()).unwrap(), 20);

  // get_or_create: computes on miss, short-circuits on hit
  let value = store.get_or_create("c".to_string(), |_| 30).unwrap();
  assert_eq!(value, 30);
  let value = store
    .get_or_create("c".to_string(), |_| panic!("factory must not run for an existing key"))
    .unwrap();
  assert_eq!(value, 30);

  // entries is a snapshot of published pairs; restartable
  let mut entries = store.entries();
  entries.sort();
  assert_eq!(
    entries,
    vec![
      ("a".to_string(), 10),
      ("b".to_string(), 20),
      ("c".to_string(), 30),
    ]
  );
  assert_eq!(store.entries().len(), 3);

  // remove + contains round-trip
  assert!(store.remove(&"a".to_string()).unwrap());
  assert!(!store.contains_key(&"a".to_string()));
  assert!(!store.remove(&"a".to_string()).unwrap());

  store.clear();
  assert!(store.is_empty());
  assert_eq!(store.entries(), vec![]);
}

#[test]
fn simple_store_contract() {
  check_contract(SimpleDataStore::new());
}

#[test]
fn concurrent_store_contract() {
  check_contract(ConcurrentDataStore::new());
}

#[test]
fn locking_decorator_contract() {
  check_contract(LockingDataStoreDecorator::new(SimpleDataStore::new()));
}

#[test]
fn lazy_locking_adapter_contract() {
  check_contract(LazyLockingDataStoreAdapter::new());
}

#[test]
fn expiring_store_contract() {
  // A generous TTL so nothing expires while the contract runs.
  let policy = TtlPolicy::new(Duration::from_secs(3600), Duration::from_secs(3600));
  check_contract(ExpiringDataStore::new(policy));
}

#[test]
fn factory_receives_the_key() {
  let store: SimpleDataStore<String, String> = SimpleDataStore::new();
  let value = store
    .get_or_create("k1".to_string(), |key| format!("value-for-{key}"))
    .unwrap();
  assert_eq!(value, "value-for-k1");
}

#[test]
fn factory_error_propagates_and_key_stays_retryable() {
  let store: ConcurrentDataStore<String, i32> = ConcurrentDataStore::new();

  let err = store
    .try_get_or_create("k".to_string(), |_| Err::<i32, _>("boom"))
    .unwrap_err();
  assert_eq!(err.into_factory_error(), Some("boom"));

  // The failed attempt must not leave a visible or poisoned entry behind.
  assert!(!store.contains_key(&"k".to_string()));
  assert_eq!(store.try_get(&"k".to_string()).unwrap(), None);

  let value = store.get_or_create("k".to_string(), |_| 7).unwrap();
  assert_eq!(value, 7);
  assert!(store.contains_key(&"k".to_string()));
}

#[test]
fn errors_name_the_offending_key() {
  let store: SimpleDataStore<String, i32> = SimpleDataStore::new();
  store.add("alpha".to_string(), 1).unwrap();

  let err = store.add("alpha".to_string(), 2).unwrap_err();
  assert!(err.to_string().contains("alpha"));

  let err = store.get(&"beta".to_string()).unwrap_err();
  assert!(err.to_string().contains("beta"));
}
