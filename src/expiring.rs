use crate::error::{GetOrCreateError, StoreError};
use crate::simple::SimpleDataStore;
use crate::traits::DataStore;

use core::fmt;
use std::cell::RefCell;
use std::hash::{BuildHasher, Hash};
use std::time::{Duration, Instant};

/// The eviction capability consumed by [`ExpiringDataStore`].
///
/// The policy produces opaque per-entry `ExpirationInfo` at insertion time
/// and one piece of store-wide `ScanInfo` describing when the next sweep is
/// due. The store consults the policy on every access; it never interprets
/// either piece of state itself.
pub trait ExpirationPolicy<V> {
  /// Per-entry expiration metadata, created when a value is stored.
  type ExpirationInfo;
  /// Store-wide sweep-scheduling state.
  type ScanInfo;

  /// Computes fresh metadata for a value being inserted or replaced.
  fn expiration_info(&self, value: &V) -> Self::ExpirationInfo;

  /// Called on every successful read of an entry, before the expiry check.
  /// Policies that age entries by use (access counts, idle time) update
  /// their metadata here; time-based policies typically do nothing.
  fn on_access(&self, _value: &V, _info: &mut Self::ExpirationInfo) {}

  /// Whether the entry should be treated as no longer present.
  fn is_expired(&self, value: &V, info: &Self::ExpirationInfo) -> bool;

  /// Whether a full sweep is due, given the current scan state.
  fn should_scan(&self, scan_info: &Self::ScanInfo) -> bool;

  /// The scan state for the next cycle, produced when a sweep completes
  /// (and once at store construction).
  fn next_scan_info(&self) -> Self::ScanInfo;
}

/// A ready-made wall-clock policy: entries expire `ttl` after insertion, and
/// a sweep becomes due every `scan_interval`.
#[derive(Debug, Clone)]
pub struct TtlPolicy {
  ttl: Duration,
  scan_interval: Duration,
}

impl TtlPolicy {
  pub fn new(ttl: Duration, scan_interval: Duration) -> Self {
    Self { ttl, scan_interval }
  }
}

impl<V> ExpirationPolicy<V> for TtlPolicy {
  type ExpirationInfo = Instant;
  type ScanInfo = Instant;

  fn expiration_info(&self, _value: &V) -> Instant {
    Instant::now() + self.ttl
  }

  fn is_expired(&self, _value: &V, expires_at: &Instant) -> bool {
    Instant::now() >= *expires_at
  }

  fn should_scan(&self, next_scan_at: &Instant) -> bool {
    Instant::now() >= *next_scan_at
  }

  fn next_scan_info(&self) -> Instant {
    Instant::now() + self.scan_interval
  }
}

/// Wraps a [`SimpleDataStore`] whose values carry policy-defined expiration
/// metadata, and evicts lazily: every operation first asks the policy
/// whether a sweep is due, runs one if so, and only then proceeds against
/// the (possibly smaller) inner store. There is no timer thread.
///
/// Reads additionally consult the policy before returning a value, so an
/// expired-but-unswept entry reads as absent and is removed on sight.
///
/// Like its inner store this layer performs no locking at all; concurrent
/// use requires composing with
/// [`LockingDataStoreDecorator`](crate::LockingDataStoreDecorator). Its
/// responsibility is strictly policy-driven eviction, not synchronization.
pub struct ExpiringDataStore<K, V, P, S = ahash::RandomState>
where
  P: ExpirationPolicy<V>,
{
  inner: SimpleDataStore<K, (V, P::ExpirationInfo), S>,
  scan_info: RefCell<P::ScanInfo>,
  policy: P,
}

impl<K, V, P, S> fmt::Debug for ExpiringDataStore<K, V, P, S>
where
  P: ExpirationPolicy<V>,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ExpiringDataStore").finish_non_exhaustive()
  }
}

impl<K, V, P> ExpiringDataStore<K, V, P, ahash::RandomState>
where
  K: Eq + Hash,
  P: ExpirationPolicy<V>,
{
  pub fn new(policy: P) -> Self {
    Self::with_hasher(policy, ahash::RandomState::default())
  }
}

impl<K, V, P, S> ExpiringDataStore<K, V, P, S>
where
  K: Eq + Hash,
  P: ExpirationPolicy<V>,
  S: BuildHasher,
{
  pub fn with_hasher(policy: P, hasher: S) -> Self {
    let scan_info = RefCell::new(policy.next_scan_info());
    Self {
      inner: SimpleDataStore::with_hasher(hasher),
      scan_info,
      policy,
    }
  }
}

impl<K, V, P, S> ExpiringDataStore<K, V, P, S>
where
  K: Eq + Hash + Clone + fmt::Debug,
  V: Clone,
  P: ExpirationPolicy<V>,
  P::ExpirationInfo: Clone,
  S: BuildHasher,
{
  /// Runs a sweep if the policy says one is due: removes every expired
  /// entry, then recomputes the scan state for the next cycle.
  fn remove_expired_items(&self) {
    if !self.policy.should_scan(&self.scan_info.borrow()) {
      return;
    }

    let mut removed = 0usize;
    for (key, (value, info)) in self.inner.entries() {
      if self.policy.is_expired(&value, &info) {
        let _ = self.inner.remove(&key);
        removed += 1;
      }
    }
    *self.scan_info.borrow_mut() = self.policy.next_scan_info();

    if removed > 0 {
      tracing::debug!(removed, "expiry sweep removed entries");
    }
  }

  /// Reads a live value: touches its metadata, checks expiry, and removes
  /// the entry on sight if it is stale.
  fn read_live(&self, key: &K) -> Result<Option<V>, StoreError> {
    let (value, mut info) = match self.inner.try_get(key)? {
      Some(entry) => entry,
      None => return Ok(None),
    };
    self.policy.on_access(&value, &mut info);
    if self.policy.is_expired(&value, &info) {
      let _ = self.inner.remove(key)?;
      return Ok(None);
    }
    self.inner.set(key.clone(), (value.clone(), info))?;
    Ok(Some(value))
  }
}

impl<K, V, P, S> DataStore<K, V> for ExpiringDataStore<K, V, P, S>
where
  K: Eq + Hash + Clone + fmt::Debug,
  V: Clone,
  P: ExpirationPolicy<V>,
  P::ExpirationInfo: Clone,
  S: BuildHasher,
{
  fn contains_key(&self, key: &K) -> bool {
    self.remove_expired_items();
    match self.inner.try_get(key) {
      Ok(Some((value, info))) => {
        if self.policy.is_expired(&value, &info) {
          let _ = self.inner.remove(key);
          false
        } else {
          true
        }
      }
      _ => false,
    }
  }

  fn add(&self, key: K, value: V) -> Result<(), StoreError> {
    self.remove_expired_items();
    let info = self.policy.expiration_info(&value);
    self.inner.add(key, (value, info))
  }

  fn remove(&self, key: &K) -> Result<bool, StoreError> {
    self.remove_expired_items();
    self.inner.remove(key)
  }

  fn clear(&self) {
    self.inner.clear();
  }

  fn len(&self) -> usize {
    self.remove_expired_items();
    self
      .inner
      .entries()
      .into_iter()
      .filter(|(_, (value, info))| !self.policy.is_expired(value, info))
      .count()
  }

  fn set(&self, key: K, value: V) -> Result<(), StoreError> {
    self.remove_expired_items();
    let info = self.policy.expiration_info(&value);
    self.inner.set(key, (value, info))
  }

  fn try_get(&self, key: &K) -> Result<Option<V>, StoreError> {
    self.remove_expired_items();
    self.read_live(key)
  }

  fn try_get_or_create<E, F>(&self, key: K, factory: F) -> Result<V, GetOrCreateError<E>>
  where
    F: FnOnce(&K) -> Result<V, E>,
  {
    self.remove_expired_items();

    // An expired-but-unswept entry must not short-circuit the factory.
    if let Some(value) = self.read_live(&key)? {
      return Ok(value);
    }

    // Check-then-create against the already-swept inner store. Delegating
    // to the inner get-or-create keeps its reservation discipline, so
    // re-entrant same-key factories are still diagnosed and a failed
    // factory still leaves the key retryable.
    let (value, _info) = self.inner.try_get_or_create(key, |k| match factory(k) {
      Ok(value) => {
        let info = self.policy.expiration_info(&value);
        Ok((value, info))
      }
      Err(e) => Err(e),
    })?;
    Ok(value)
  }

  fn entries(&self) -> Vec<(K, V)> {
    self.remove_expired_items();
    self
      .inner
      .entries()
      .into_iter()
      .filter_map(|(key, (value, info))| {
        if self.policy.is_expired(&value, &info) {
          None
        } else {
          Some((key, value))
        }
      })
      .collect()
  }
}
