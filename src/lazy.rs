use crate::error::{GetOrCreateError, StoreError};
use crate::locking::LockingDataStoreDecorator;
use crate::simple::SimpleDataStore;
use crate::traits::DataStore;

use core::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use once_cell::sync::OnceCell;

/// A deferred-computation cell with its own one-time-publication guarantee,
/// independent of the store that holds it.
///
/// Forcing an unresolved cell blocks concurrent forcers on the cell's
/// internal lock; exactly one closure runs to success.
#[derive(Debug)]
pub(crate) struct LazyValue<V> {
  cell: OnceCell<V>,
}

impl<V> LazyValue<V> {
  fn empty() -> Self {
    Self {
      cell: OnceCell::new(),
    }
  }

  /// A cell that is born resolved, for values already known at call time.
  fn ready(value: V) -> Self {
    let cell = OnceCell::new();
    let _ = cell.set(value);
    Self { cell }
  }

  #[inline]
  fn peek(&self) -> Option<&V> {
    self.cell.get()
  }

  fn force<E>(&self, f: impl FnOnce() -> Result<V, E>) -> Result<&V, E> {
    self.cell.get_or_try_init(f)
  }
}

type LazyStore<K, V, S> =
  LockingDataStoreDecorator<K, Arc<LazyValue<V>>, SimpleDataStore<K, Arc<LazyValue<V>>, S>>;

/// Behaves like [`ConcurrentDataStore`](crate::ConcurrentDataStore) from the
/// caller's point of view — exactly-once factory, no full-store blocking
/// while a factory runs — but is built by composing a
/// [`LockingDataStoreDecorator`] over a [`SimpleDataStore`] of lazy value
/// cells rather than a native per-key lock table.
///
/// The global lock is held only long enough to find or publish a *cell*,
/// never to run the factory: concurrent forcers of the same key block on
/// that cell's own internal lock instead. For `add`/`set` the value is
/// already known, so a pre-resolved cell is stored outright.
pub struct LazyLockingDataStoreAdapter<K, V, S = ahash::RandomState> {
  store: LazyStore<K, V, S>,
}

impl<K, V, S> fmt::Debug for LazyLockingDataStoreAdapter<K, V, S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LazyLockingDataStoreAdapter").finish_non_exhaustive()
  }
}

impl<K, V> LazyLockingDataStoreAdapter<K, V, ahash::RandomState>
where
  K: Eq + Hash + Clone + fmt::Debug,
  V: Clone,
{
  pub fn new() -> Self {
    Self::with_hasher(ahash::RandomState::default())
  }
}

impl<K, V> Default for LazyLockingDataStoreAdapter<K, V, ahash::RandomState>
where
  K: Eq + Hash + Clone + fmt::Debug,
  V: Clone,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<K, V, S> LazyLockingDataStoreAdapter<K, V, S>
where
  K: Eq + Hash + Clone + fmt::Debug,
  V: Clone,
  S: BuildHasher,
{
  /// Creates an empty adapter whose inner store uses `hasher` for key
  /// lookup.
  pub fn with_hasher(hasher: S) -> Self {
    Self {
      store: LockingDataStoreDecorator::new(SimpleDataStore::with_hasher(hasher)),
    }
  }

  /// Atomically finds the cell for `key`, or installs a fresh unresolved
  /// one. The global lock is held only for this step.
  fn find_or_install(&self, key: &K) -> Result<Arc<LazyValue<V>>, StoreError> {
    self.store.with_inner(|inner| {
      if let Some(cell) = inner.try_get(key)? {
        return Ok(cell);
      }
      let cell = Arc::new(LazyValue::empty());
      inner.set(key.clone(), cell.clone())?;
      Ok(cell)
    })
  }

  /// Unlinks `key` only if it still maps to this exact cell *and* the cell
  /// is still unresolved. A concurrent forcer may have resolved the very
  /// cell this thread failed on; its published value must survive.
  fn remove_if_same(&self, key: &K, cell: &Arc<LazyValue<V>>) {
    let _ = self.store.with_inner(|inner| -> Result<(), StoreError> {
      if let Some(current) = inner.try_get(key)? {
        if Arc::ptr_eq(&current, cell) && current.peek().is_none() {
          inner.remove(key)?;
        }
      }
      Ok(())
    });
  }
}

impl<K, V, S> DataStore<K, V> for LazyLockingDataStoreAdapter<K, V, S>
where
  K: Eq + Hash + Clone + fmt::Debug,
  V: Clone,
  S: BuildHasher,
{
  fn contains_key(&self, key: &K) -> bool {
    self
      .store
      .with_inner(|inner| match inner.try_get(key) {
        Ok(Some(cell)) => cell.peek().is_some(),
        _ => false,
      })
  }

  fn add(&self, key: K, value: V) -> Result<(), StoreError> {
    // The value is known at call time; store a pre-resolved cell. If two
    // threads race here, `add` itself arbitrates via DuplicateKey.
    self
      .store
      .add(key, Arc::new(LazyValue::ready(value)))
  }

  fn remove(&self, key: &K) -> Result<bool, StoreError> {
    self.store.with_inner(|inner| {
      match inner.try_get(key)? {
        Some(cell) => {
          inner.remove(key)?;
          // Only a resolved cell counts as a removed *value*.
          Ok(cell.peek().is_some())
        }
        None => Ok(false),
      }
    })
  }

  fn clear(&self) {
    self.store.clear()
  }

  fn len(&self) -> usize {
    self
      .store
      .with_inner(|inner| {
        inner
          .entries()
          .into_iter()
          .filter(|(_, cell)| cell.peek().is_some())
          .count()
      })
  }

  fn set(&self, key: K, value: V) -> Result<(), StoreError> {
    self.store.set(key, Arc::new(LazyValue::ready(value)))
  }

  fn try_get(&self, key: &K) -> Result<Option<V>, StoreError> {
    let cell = match self.store.try_get(key)? {
      Some(cell) => cell,
      None => return Ok(None),
    };
    // An unresolved cell means the winning thread has not published yet (or
    // failed and is about to unlink); a pure reader treats both as absent.
    Ok(cell.peek().cloned())
  }

  fn try_get_or_create<E, F>(&self, key: K, factory: F) -> Result<V, GetOrCreateError<E>>
  where
    F: FnOnce(&K) -> Result<V, E>,
  {
    let cell = self.find_or_install(&key)?;

    // Resolved hit: one global-lock acquisition total.
    if let Some(value) = cell.peek() {
      return Ok(value.clone());
    }

    // Force the cell with the global lock released. If another thread is
    // already forcing it, this blocks on the cell's internal lock and the
    // factory below never runs — the exactly-once guarantee.
    let mut ran_factory = false;
    match cell.force(|| {
      ran_factory = true;
      factory(&key)
    }) {
      Ok(value) => {
        let value = value.clone();
        if ran_factory {
          // This thread computed the value. If a previously failed winner
          // unlinked the cell in the meantime, relink it so the published
          // value is actually stored; a racing overwrite keeps its own cell.
          let _ = self.store.add(key, cell.clone());
        }
        Ok(value)
      }
      Err(e) => {
        tracing::debug!(?key, "factory failed; unlinking lazy cell");
        self.remove_if_same(&key, &cell);
        Err(GetOrCreateError::Factory(e))
      }
    }
  }

  fn entries(&self) -> Vec<(K, V)> {
    self.store.with_inner(|inner| {
      inner
        .entries()
        .into_iter()
        .filter_map(|(key, cell)| cell.peek().map(|value| (key, value.clone())))
        .collect()
    })
  }
}
