use crate::error::{GetOrCreateError, StoreError};
use crate::traits::DataStore;

use core::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use parking_lot::ReentrantMutex;

/// Wraps any store behind one global mutual-exclusion lock.
///
/// Every operation holds the lock for the call's whole duration — including
/// the time spent running the factory inside `get_or_create`. That is the
/// simplest possible thread-safety and is correct for any wrapped store, but
/// a slow factory blocks all other access to the entire store, not just the
/// one key. [`ConcurrentDataStore`](crate::ConcurrentDataStore) and
/// [`LazyLockingDataStoreAdapter`](crate::LazyLockingDataStoreAdapter) exist
/// to shrink exactly that window.
///
/// The lock is *reentrant*: a factory that re-enters the same decorated
/// store reaches the inner store instead of self-deadlocking, so the inner
/// store's own [`RecursiveAccess`](StoreError::RecursiveAccess) diagnosis
/// still fires for same-key reentry.
pub struct LockingDataStoreDecorator<K, V, D> {
  inner: ReentrantMutex<D>,
  _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, D: fmt::Debug> fmt::Debug for LockingDataStoreDecorator<K, V, D> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LockingDataStoreDecorator").finish_non_exhaustive()
  }
}

impl<K, V, D> LockingDataStoreDecorator<K, V, D>
where
  K: Eq + Hash + Clone + fmt::Debug,
  V: Clone,
  D: DataStore<K, V>,
{
  pub fn new(inner: D) -> Self {
    Self {
      inner: ReentrantMutex::new(inner),
      _marker: PhantomData,
    }
  }

  /// Runs `f` against the inner store while holding the global lock, so a
  /// caller can compose several inner operations into one atomic step.
  pub fn with_inner<R>(&self, f: impl FnOnce(&D) -> R) -> R {
    let guard = self.inner.lock();
    f(&guard)
  }
}

impl<K, V, D> DataStore<K, V> for LockingDataStoreDecorator<K, V, D>
where
  K: Eq + Hash + Clone + fmt::Debug,
  V: Clone,
  D: DataStore<K, V>,
{
  fn contains_key(&self, key: &K) -> bool {
    self.inner.lock().contains_key(key)
  }

  fn add(&self, key: K, value: V) -> Result<(), StoreError> {
    self.inner.lock().add(key, value)
  }

  fn remove(&self, key: &K) -> Result<bool, StoreError> {
    self.inner.lock().remove(key)
  }

  fn clear(&self) {
    self.inner.lock().clear()
  }

  fn len(&self) -> usize {
    self.inner.lock().len()
  }

  fn get(&self, key: &K) -> Result<V, StoreError> {
    self.inner.lock().get(key)
  }

  fn set(&self, key: K, value: V) -> Result<(), StoreError> {
    self.inner.lock().set(key, value)
  }

  fn try_get(&self, key: &K) -> Result<Option<V>, StoreError> {
    self.inner.lock().try_get(key)
  }

  fn get_or_default(&self, key: &K) -> Result<V, StoreError>
  where
    V: Default,
  {
    self.inner.lock().get_or_default(key)
  }

  fn try_get_or_create<E, F>(&self, key: K, factory: F) -> Result<V, GetOrCreateError<E>>
  where
    F: FnOnce(&K) -> Result<V, E>,
  {
    // The factory runs with the global lock held. Simplicity over
    // throughput.
    self.inner.lock().try_get_or_create(key, factory)
  }

  fn entries(&self) -> Vec<(K, V)> {
    self.inner.lock().entries()
  }
}