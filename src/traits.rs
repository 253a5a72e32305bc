use crate::error::{GetOrCreateError, StoreError};

use core::fmt;
use std::convert::Infallible;
use std::hash::Hash;

/// The common contract of every keyed memoizing data store in this crate.
///
/// A store is an associative collection with unique keys and no ordering
/// guarantee. Its central operation is [`get_or_create`](DataStore::get_or_create):
/// return the existing value for a key, or compute one via a caller-supplied
/// factory, publish it, and return it — with the guarantee that **at most one
/// factory invocation succeeds per key** for any sequence of calls that do
/// not explicitly overwrite the key first, even under concurrency (where the
/// implementation is thread-safe at all).
///
/// All methods take `&self`; each implementation chooses its own interior
/// mutability and synchronization discipline:
///
/// - [`SimpleDataStore`](crate::SimpleDataStore): single-threaded baseline,
///   detects re-entrant access structurally.
/// - [`ConcurrentDataStore`](crate::ConcurrentDataStore): lock-free reads of
///   published values, per-key locked writes.
/// - [`LockingDataStoreDecorator`](crate::LockingDataStoreDecorator): one
///   global reentrant lock around any inner store.
/// - [`LazyLockingDataStoreAdapter`](crate::LazyLockingDataStoreAdapter): a
///   coarse lock over lazily forced per-value cells.
/// - [`ExpiringDataStore`](crate::ExpiringDataStore): policy-driven lazy
///   eviction over the simple baseline.
///
/// Values are returned by clone; stores own their entries exclusively.
pub trait DataStore<K, V>
where
  K: Eq + Hash + Clone + fmt::Debug,
  V: Clone,
{
  /// Returns `true` if a value has been published for `key`.
  ///
  /// Entries whose computation is still in flight (or failed) are invisible
  /// here.
  fn contains_key(&self, key: &K) -> bool;

  /// Inserts a new entry, failing with [`StoreError::DuplicateKey`] if the
  /// key is already present.
  fn add(&self, key: K, value: V) -> Result<(), StoreError>;

  /// Removes the entry for `key`. Returns `true` if a published value was
  /// removed.
  fn remove(&self, key: &K) -> Result<bool, StoreError>;

  /// Removes all entries.
  fn clear(&self);

  /// The number of published entries.
  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Returns the value for `key`, failing with [`StoreError::KeyNotFound`]
  /// if absent.
  fn get(&self, key: &K) -> Result<V, StoreError> {
    match self.try_get(key)? {
      Some(value) => Ok(value),
      None => Err(StoreError::key_not_found(key)),
    }
  }

  /// Inserts or replaces the entry for `key`.
  fn set(&self, key: K, value: V) -> Result<(), StoreError>;

  /// Returns the value for `key`, or `None` if absent.
  ///
  /// Thread-safe implementations block while another thread is computing the
  /// key's value and report [`StoreError::RecursiveAccess`] if the calling
  /// thread *is* that key's computing thread.
  fn try_get(&self, key: &K) -> Result<Option<V>, StoreError>;

  /// Returns the value for `key`, or `V::default()` if absent.
  fn get_or_default(&self, key: &K) -> Result<V, StoreError>
  where
    V: Default,
  {
    Ok(self.try_get(key)?.unwrap_or_default())
  }

  /// Returns the existing value for `key`, or computes one via `factory`,
  /// publishes it, and returns it.
  ///
  /// The factory receives the key by reference and must not touch the same
  /// key on the same store during its own execution; doing so fails with
  /// [`StoreError::RecursiveAccess`] where the implementation can detect it.
  fn get_or_create<F>(&self, key: K, factory: F) -> Result<V, StoreError>
  where
    F: FnOnce(&K) -> V,
  {
    match self.try_get_or_create(key, |k| Ok::<_, Infallible>(factory(k))) {
      Ok(value) => Ok(value),
      Err(GetOrCreateError::Store(e)) => Err(e),
      Err(GetOrCreateError::Factory(never)) => match never {},
    }
  }

  /// Fallible form of [`get_or_create`](DataStore::get_or_create).
  ///
  /// A factory error propagates verbatim as [`GetOrCreateError::Factory`]
  /// and leaves the key retryable: the failed attempt is cleaned up, and a
  /// later `get_or_create` runs its factory again rather than observing a
  /// half-initialized or poisoned value.
  fn try_get_or_create<E, F>(&self, key: K, factory: F) -> Result<V, GetOrCreateError<E>>
  where
    F: FnOnce(&K) -> Result<V, E>;

  /// A snapshot of the published `(key, value)` pairs.
  ///
  /// Each call produces a fresh pass over the store. In-flight and failed
  /// entries are never included.
  fn entries(&self) -> Vec<(K, V)>;
}
