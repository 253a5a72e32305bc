use crate::cell::{KeyCell, Resolution};
use crate::error::{GetOrCreateError, StoreError};
use crate::traits::DataStore;

use core::fmt;
use std::collections::{HashMap, VecDeque};
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use parking_lot::RwLock;

#[inline]
fn hash_key<K: Hash, H: BuildHasher>(hasher: &H, key: &K) -> u64 {
  let mut state = hasher.build_hasher();
  key.hash(&mut state);
  state.finish()
}

/// Default shard count: scaled by CPU count, capped, rounded to a power of
/// two.
fn default_shard_count() -> usize {
  (num_cpus::get() * 4).min(64).next_power_of_two()
}

type Shard<K, V, S> = RwLock<HashMap<K, Arc<KeyCell<V>>, S>>;

/// A thread-safe memoizing store with lock-free reads of published values
/// and per-key locked writes.
///
/// The backing map is partitioned into independently locked shards (so
/// distinct keys rarely contend even for the brief map accesses), and each
/// key resolves to a private per-key cell: readers of an already-published
/// value take no lock on the cell at all, while at most one thread runs the
/// factory for a given key and everyone else parks on that key's cell until
/// it resolves. Distinct keys never block each other.
///
/// A failed factory poisons its cell, wakes all waiters, unlinks the cell
/// from the map (compare-and-remove on the exact key/cell pair), and
/// propagates the error — a later `get_or_create` for the key retries.
pub struct ConcurrentDataStore<K, V, S = ahash::RandomState> {
  shards: Box<[CachePadded<Shard<K, V, S>>]>,
  hasher: S,
}

impl<K, V, S> fmt::Debug for ConcurrentDataStore<K, V, S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ConcurrentDataStore")
      .field("num_shards", &self.shards.len())
      .finish()
  }
}

impl<K, V> ConcurrentDataStore<K, V, ahash::RandomState>
where
  K: Eq + Hash,
{
  pub fn new() -> Self {
    Self::with_hasher(ahash::RandomState::default())
  }
}

impl<K, V> Default for ConcurrentDataStore<K, V, ahash::RandomState>
where
  K: Eq + Hash,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<K, V, S> ConcurrentDataStore<K, V, S>
where
  K: Eq + Hash,
  S: BuildHasher + Clone,
{
  /// Creates an empty store that uses `hasher` for key lookup and shard
  /// selection.
  pub fn with_hasher(hasher: S) -> Self {
    Self::with_shards_and_hasher(default_shard_count(), hasher)
  }

  /// Creates an empty store with an explicit shard count (rounded up to a
  /// power of two, minimum 1).
  pub fn with_shards_and_hasher(num_shards: usize, hasher: S) -> Self {
    let num_shards = num_shards.max(1).next_power_of_two();
    let mut shards = Vec::with_capacity(num_shards);
    for _ in 0..num_shards {
      let map = HashMap::with_hasher(hasher.clone());
      shards.push(CachePadded::new(RwLock::new(map)));
    }
    Self {
      shards: shards.into_boxed_slice(),
      hasher,
    }
  }

  #[inline]
  fn shard_for(&self, key: &K) -> &Shard<K, V, S> {
    let hash = hash_key(&self.hasher, key);
    let index = hash as usize & (self.shards.len() - 1);
    &self.shards[index]
  }

  /// Clones out the cell currently mapped to `key`, if any. Holds the shard
  /// read lock only for the lookup itself.
  fn lookup(&self, key: &K) -> Option<Arc<KeyCell<V>>> {
    self.shard_for(key).read().get(key).cloned()
  }

  /// Unlinks `key` only if it still maps to this exact cell. A concurrent
  /// `set`/`remove` may already have replaced it; that entry must survive.
  fn remove_if_same(&self, key: &K, cell: &Arc<KeyCell<V>>) {
    let mut guard = self.shard_for(key).write();
    if let Some(current) = guard.get(key) {
      if Arc::ptr_eq(current, cell) {
        guard.remove(key);
      }
    }
  }

  /// A lazy, restartable iterator over the published `(key, value)` pairs.
  ///
  /// Items are fetched in batches, holding the lock of one shard at a time
  /// for a very brief period. This is not a point-in-time snapshot: entries
  /// inserted behind the cursor are missed, and entries may be removed by
  /// other threads mid-iteration. In-flight and poisoned cells are skipped.
  pub fn iter(&self) -> Iter<'_, K, V, S>
  where
    K: Clone,
    V: Clone,
  {
    Iter::new(self, DEFAULT_ITER_BATCH_SIZE)
  }
}

/// The winner's unwind guard: if the factory panics, the cell is poisoned
/// (unblocking waiters) and unlinked, so the key stays retryable and no
/// thread parks forever.
struct PoisonGuard<'a, K, V, S>
where
  K: Eq + Hash,
  S: BuildHasher + Clone,
{
  store: &'a ConcurrentDataStore<K, V, S>,
  key: &'a K,
  cell: &'a Arc<KeyCell<V>>,
  armed: bool,
}

impl<'a, K, V, S> PoisonGuard<'a, K, V, S>
where
  K: Eq + Hash,
  S: BuildHasher + Clone,
{
  fn disarm(mut self) {
    self.armed = false;
  }
}

impl<'a, K, V, S> Drop for PoisonGuard<'a, K, V, S>
where
  K: Eq + Hash,
  S: BuildHasher + Clone,
{
  fn drop(&mut self) {
    if self.armed {
      self.cell.poison();
      self.store.remove_if_same(self.key, self.cell);
    }
  }
}

impl<K, V, S> DataStore<K, V> for ConcurrentDataStore<K, V, S>
where
  K: Eq + Hash + Clone + fmt::Debug,
  V: Clone,
  S: BuildHasher + Clone,
{
  fn contains_key(&self, key: &K) -> bool {
    match self.lookup(key) {
      Some(cell) => cell.published().is_some(),
      None => false,
    }
  }

  fn add(&self, key: K, value: V) -> Result<(), StoreError> {
    let mut guard = self.shard_for(&key).write();
    // An in-flight cell counts as present: a computation for the key is
    // already underway and will publish.
    if guard.contains_key(&key) {
      return Err(StoreError::duplicate_key(&key));
    }
    guard.insert(key, Arc::new(KeyCell::ready(value)));
    Ok(())
  }

  fn remove(&self, key: &K) -> Result<bool, StoreError> {
    let removed = self.shard_for(key).write().remove(key);
    Ok(match removed {
      Some(cell) => cell.published().is_some(),
      None => false,
    })
  }

  fn clear(&self) {
    // Lock every shard for writing before clearing any of them, so a
    // concurrent reader never observes a half-cleared store.
    let mut guards = Vec::with_capacity(self.shards.len());
    for shard in self.shards.iter() {
      guards.push(shard.write());
    }
    for guard in guards.iter_mut() {
      guard.clear();
    }
  }

  fn len(&self) -> usize {
    self
      .shards
      .iter()
      .map(|shard| {
        shard
          .read()
          .values()
          .filter(|cell| cell.published().is_some())
          .count()
      })
      .sum()
  }

  fn set(&self, key: K, value: V) -> Result<(), StoreError> {
    self
      .shard_for(&key)
      .write()
      .insert(key, Arc::new(KeyCell::ready(value)));
    Ok(())
  }

  fn try_get(&self, key: &K) -> Result<Option<V>, StoreError> {
    let cell = match self.lookup(key) {
      Some(cell) => cell,
      None => return Ok(None),
    };
    // Fast path: published values are readable with no lock at all.
    if let Some(value) = cell.published() {
      return Ok(Some(value.clone()));
    }
    // A reader that observes an in-flight cell blocks on that cell until
    // the slot resolves; it never sees a half-written value. Same-thread
    // reentry is the recursion diagnosis.
    match cell.wait_resolved(key)? {
      Resolution::Ready(value) => Ok(Some(value)),
      Resolution::Gone => Ok(None),
    }
  }

  fn try_get_or_create<E, F>(&self, key: K, factory: F) -> Result<V, GetOrCreateError<E>>
  where
    F: FnOnce(&K) -> Result<V, E>,
  {
    let mut factory = Some(factory);
    loop {
      // 1. Fast path: an already-published value needs no allocation and no
      //    lock beyond the shard read lock.
      if let Some(cell) = self.lookup(&key) {
        if let Some(value) = cell.published() {
          return Ok(value.clone());
        }
        match cell.wait_resolved(&key).map_err(GetOrCreateError::Store)? {
          Resolution::Ready(value) => return Ok(value),
          Resolution::Gone => continue,
        }
      }

      // 2. Miss: race to install a fresh cell owned by this thread.
      let my_cell = Arc::new(KeyCell::computing());
      let existing = {
        let mut guard = self.shard_for(&key).write();
        match guard.get(&key) {
          Some(other) => Some(other.clone()),
          None => {
            guard.insert(key.clone(), my_cell.clone());
            None
          }
        }
      };

      if let Some(other) = existing {
        // Another thread's cell won the insert race; wait for it.
        if let Some(value) = other.published() {
          return Ok(value.clone());
        }
        match other.wait_resolved(&key).map_err(GetOrCreateError::Store)? {
          Resolution::Ready(value) => return Ok(value),
          Resolution::Gone => continue,
        }
      }

      // 3. This thread's cell won: it alone runs the factory, with the
      //    shard lock released so other keys proceed undisturbed.
      let factory = factory
        .take()
        .expect("the install race can be won at most once per call");
      let guard = PoisonGuard {
        store: self,
        key: &key,
        cell: &my_cell,
        armed: true,
      };
      match factory(&key) {
        Ok(value) => {
          my_cell.complete(value.clone());
          guard.disarm();
          return Ok(value);
        }
        Err(e) => {
          tracing::debug!(?key, "factory failed; poisoning and unlinking cell");
          // Publish the poison sentinel first (unblocking waiters), then
          // compare-and-remove the map entry so a later call retries.
          drop(guard);
          return Err(GetOrCreateError::Factory(e));
        }
      }
    }
  }

  fn entries(&self) -> Vec<(K, V)> {
    let mut items = Vec::new();
    for shard in self.shards.iter() {
      let guard = shard.read();
      items.extend(guard.iter().filter_map(|(key, cell)| {
        cell.published().map(|value| (key.clone(), value.clone()))
      }));
    }
    items
  }
}

pub const DEFAULT_ITER_BATCH_SIZE: usize = 64;

/// See [`ConcurrentDataStore::iter`].
pub struct Iter<'a, K, V, S> {
  store: &'a ConcurrentDataStore<K, V, S>,
  buffer: VecDeque<(K, V)>,
  shard_index: usize,
  items_seen_in_shard: usize,
  batch_size: usize,
  finished: bool,
}

impl<'a, K, V, S> Iter<'a, K, V, S>
where
  K: Eq + Hash + Clone,
  V: Clone,
  S: BuildHasher + Clone,
{
  fn new(store: &'a ConcurrentDataStore<K, V, S>, batch_size: usize) -> Self {
    Self {
      store,
      buffer: VecDeque::with_capacity(batch_size),
      shard_index: 0,
      items_seen_in_shard: 0,
      batch_size,
      finished: false,
    }
  }

  fn refill_buffer(&mut self) {
    if self.finished {
      return;
    }

    let num_shards = self.store.shards.len();
    while self.shard_index < num_shards && self.buffer.len() < self.batch_size {
      let guard = self.store.shards[self.shard_index].read();

      let items_in_shard = guard.len();
      if self.items_seen_in_shard >= items_in_shard {
        self.shard_index += 1;
        self.items_seen_in_shard = 0;
        continue;
      }

      let batch = guard
        .iter()
        .skip(self.items_seen_in_shard)
        .take(self.batch_size - self.buffer.len())
        .collect::<Vec<_>>();
      self.items_seen_in_shard += batch.len();

      // Unresolved cells (in-flight or poisoned) are skipped: a value is
      // only visible once it has been published.
      self.buffer.extend(batch.into_iter().filter_map(|(key, cell)| {
        cell.published().map(|value| (key.clone(), value.clone()))
      }));
    } // Lock on shard is released here

    if self.shard_index >= num_shards {
      self.finished = true;
    }
  }
}

impl<'a, K, V, S> Iterator for Iter<'a, K, V, S>
where
  K: Eq + Hash + Clone,
  V: Clone,
  S: BuildHasher + Clone,
{
  type Item = (K, V);

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      if let Some(item) = self.buffer.pop_front() {
        return Some(item);
      }
      if self.finished {
        return None;
      }
      self.refill_buffer();
    }
  }
}
