use crate::error::{GetOrCreateError, StoreError};
use crate::traits::DataStore;

use core::fmt;
use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};

/// The per-key slot of a [`SimpleDataStore`].
///
/// A slot is reserved *before* its factory runs. Because the store is
/// single-threaded, the only way any operation can observe a `Reserved` slot
/// is re-entrantly, from inside the factory that reserved it — which is
/// unambiguously a programming error and is reported as
/// [`StoreError::RecursiveAccess`].
#[derive(Debug)]
enum Slot<V> {
  Reserved,
  Ready(V),
}

/// The non-concurrent baseline store: a plain map plus a sentinel
/// "reserved but uninitialized" slot state used to detect a factory that
/// re-enters the store for the key it is currently populating.
///
/// This store performs no locking at all. It is `!Sync` by construction
/// (interior `RefCell`); concurrent use requires composing it with
/// [`LockingDataStoreDecorator`](crate::LockingDataStoreDecorator).
pub struct SimpleDataStore<K, V, S = ahash::RandomState> {
  map: RefCell<HashMap<K, Slot<V>, S>>,
}

impl<K, V, S: fmt::Debug> fmt::Debug for SimpleDataStore<K, V, S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SimpleDataStore").finish_non_exhaustive()
  }
}

impl<K, V> SimpleDataStore<K, V, ahash::RandomState>
where
  K: Eq + Hash,
{
  pub fn new() -> Self {
    Self::with_hasher(ahash::RandomState::default())
  }
}

impl<K, V> Default for SimpleDataStore<K, V, ahash::RandomState>
where
  K: Eq + Hash,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<K, V, S> SimpleDataStore<K, V, S>
where
  K: Eq + Hash,
  S: BuildHasher,
{
  /// Creates an empty store that uses `hasher` for key lookup.
  pub fn with_hasher(hasher: S) -> Self {
    Self {
      map: RefCell::new(HashMap::with_hasher(hasher)),
    }
  }
}

/// Removes a reserved slot again if the factory fails or unwinds, so the key
/// stays retryable. `complete` replaces the reservation with the computed
/// value instead.
struct Reservation<'a, K, V, S>
where
  K: Eq + Hash,
  S: BuildHasher,
{
  store: &'a SimpleDataStore<K, V, S>,
  key: Option<K>,
}

impl<'a, K, V, S> Reservation<'a, K, V, S>
where
  K: Eq + Hash,
  S: BuildHasher,
{
  fn complete(mut self, value: V) {
    if let Some(key) = self.key.take() {
      self.store.map.borrow_mut().insert(key, Slot::Ready(value));
    }
  }
}

impl<'a, K, V, S> Drop for Reservation<'a, K, V, S>
where
  K: Eq + Hash,
  S: BuildHasher,
{
  fn drop(&mut self) {
    if let Some(key) = self.key.take() {
      self.store.map.borrow_mut().remove(&key);
    }
  }
}

impl<K, V, S> DataStore<K, V> for SimpleDataStore<K, V, S>
where
  K: Eq + Hash + Clone + fmt::Debug,
  V: Clone,
  S: BuildHasher,
{
  fn contains_key(&self, key: &K) -> bool {
    matches!(self.map.borrow().get(key), Some(Slot::Ready(_)))
  }

  fn add(&self, key: K, value: V) -> Result<(), StoreError> {
    let mut map = self.map.borrow_mut();
    match map.get(&key) {
      Some(Slot::Ready(_)) => Err(StoreError::duplicate_key(&key)),
      Some(Slot::Reserved) => Err(StoreError::recursive_access(&key)),
      None => {
        map.insert(key, Slot::Ready(value));
        Ok(())
      }
    }
  }

  fn remove(&self, key: &K) -> Result<bool, StoreError> {
    let mut map = self.map.borrow_mut();
    match map.get(key) {
      Some(Slot::Reserved) => Err(StoreError::recursive_access(key)),
      Some(Slot::Ready(_)) => {
        map.remove(key);
        Ok(true)
      }
      None => Ok(false),
    }
  }

  fn clear(&self) {
    self.map.borrow_mut().clear();
  }

  fn len(&self) -> usize {
    self
      .map
      .borrow()
      .values()
      .filter(|slot| matches!(slot, Slot::Ready(_)))
      .count()
  }

  fn set(&self, key: K, value: V) -> Result<(), StoreError> {
    let mut map = self.map.borrow_mut();
    if matches!(map.get(&key), Some(Slot::Reserved)) {
      // Overwriting a slot we are still computing would corrupt the
      // reservation bookkeeping.
      return Err(StoreError::recursive_access(&key));
    }
    map.insert(key, Slot::Ready(value));
    Ok(())
  }

  fn try_get(&self, key: &K) -> Result<Option<V>, StoreError> {
    match self.map.borrow().get(key) {
      Some(Slot::Ready(value)) => Ok(Some(value.clone())),
      Some(Slot::Reserved) => Err(StoreError::recursive_access(key)),
      None => Ok(None),
    }
  }

  fn try_get_or_create<E, F>(&self, key: K, factory: F) -> Result<V, GetOrCreateError<E>>
  where
    F: FnOnce(&K) -> Result<V, E>,
  {
    {
      let mut map = self.map.borrow_mut();
      match map.get(&key) {
        Some(Slot::Ready(value)) => return Ok(value.clone()),
        Some(Slot::Reserved) => {
          return Err(GetOrCreateError::Store(StoreError::recursive_access(&key)))
        }
        None => {
          // Reserve the slot before running the factory. A cooperative
          // re-entrant call for the same key then observes the reserved
          // slot and fails loudly instead of recursing forever.
          map.insert(key.clone(), Slot::Reserved);
        }
      }
    }

    let reservation = Reservation {
      store: self,
      key: Some(key.clone()),
    };

    // The map borrow is released here, so the factory is free to use the
    // store for *other* keys.
    let value = match factory(&key) {
      Ok(value) => value,
      Err(e) => {
        tracing::debug!(?key, "factory failed; dropping reserved slot");
        drop(reservation);
        return Err(GetOrCreateError::Factory(e));
      }
    };

    reservation.complete(value.clone());
    Ok(value)
  }

  fn entries(&self) -> Vec<(K, V)> {
    self
      .map
      .borrow()
      .iter()
      .filter_map(|(key, slot)| match slot {
        Slot::Ready(value) => Some((key.clone(), value.clone())),
        Slot::Reserved => None,
      })
      .collect()
  }
}
