use crate::error::StoreError;

use core::fmt;
use std::thread::{self, Thread, ThreadId};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

/// The phase of a key's computation, plus the threads parked on it.
#[derive(Debug)]
pub(crate) enum CellState {
  /// Exactly one thread (the `owner`) is running the factory.
  Computing { owner: ThreadId, waiters: Vec<Thread> },
  /// The value has been published into the cell's `OnceCell`.
  Ready,
  /// The factory failed. The cell is about to be (or already has been)
  /// unlinked from the map; waiters retry against the map.
  Poisoned,
}

/// What a waiter observed once a cell left the `Computing` phase.
pub(crate) enum Resolution<V> {
  /// The winner published this value.
  Ready(V),
  /// The winner failed (or the value raced away); the caller should re-read
  /// the map and, for `get_or_create`, retry the computation.
  Gone,
}

/// The per-key unit of state and synchronization in
/// [`ConcurrentDataStore`](crate::ConcurrentDataStore).
///
/// The value lives in a `OnceCell`, which acts as the publication barrier:
/// once `get()` returns `Some`, the value is immutable and safe to read with
/// no lock at all. The `state` mutex is only touched on the slow path, while
/// the computation is still in flight.
pub(crate) struct KeyCell<V> {
  value: OnceCell<V>,
  state: Mutex<CellState>,
}

impl<V> fmt::Debug for KeyCell<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("KeyCell")
      .field("published", &self.value.get().is_some())
      .finish()
  }
}

impl<V> KeyCell<V> {
  /// A cell whose computation is owned by the calling thread.
  pub(crate) fn computing() -> Self {
    Self {
      value: OnceCell::new(),
      state: Mutex::new(CellState::Computing {
        owner: thread::current().id(),
        waiters: Vec::new(),
      }),
    }
  }

  /// A cell that is born resolved, for `add`/`set` where the value is
  /// already known.
  pub(crate) fn ready(value: V) -> Self {
    let cell = OnceCell::new();
    let _ = cell.set(value);
    Self {
      value: cell,
      state: Mutex::new(CellState::Ready),
    }
  }

  /// Lock-free read of the published value, if any.
  #[inline]
  pub(crate) fn published(&self) -> Option<&V> {
    self.value.get()
  }

  /// Publishes `value` and wakes every parked waiter.
  ///
  /// The `OnceCell` is set before the state flips, so a waiter that observes
  /// `Ready` always finds the value.
  pub(crate) fn complete(&self, value: V) {
    let _ = self.value.set(value);
    let waiters = {
      let mut state = self.state.lock();
      let waiters = match &mut *state {
        CellState::Computing { waiters, .. } => std::mem::take(waiters),
        _ => Vec::new(),
      };
      *state = CellState::Ready;
      waiters
    };
    for waiter in waiters {
      waiter.unpark();
    }
  }

  /// Marks the computation as failed and wakes every parked waiter so they
  /// can retry against the map.
  pub(crate) fn poison(&self) {
    let waiters = {
      let mut state = self.state.lock();
      let waiters = match &mut *state {
        CellState::Computing { waiters, .. } => std::mem::take(waiters),
        _ => Vec::new(),
      };
      *state = CellState::Poisoned;
      waiters
    };
    for waiter in waiters {
      waiter.unpark();
    }
  }

  /// Blocks until the cell leaves the `Computing` phase.
  ///
  /// If the calling thread *is* the owner, the wait can never end and the
  /// condition is definitionally re-entrant misuse, reported as
  /// [`StoreError::RecursiveAccess`].
  pub(crate) fn wait_resolved<K: fmt::Debug>(&self, key: &K) -> Result<Resolution<V>, StoreError>
  where
    V: Clone,
  {
    loop {
      {
        let mut state = self.state.lock();
        match &mut *state {
          CellState::Ready => {
            return Ok(match self.value.get() {
              Some(value) => Resolution::Ready(value.clone()),
              None => Resolution::Gone,
            });
          }
          CellState::Poisoned => return Ok(Resolution::Gone),
          CellState::Computing { owner, waiters } => {
            if *owner == thread::current().id() {
              return Err(StoreError::recursive_access(key));
            }
            waiters.push(thread::current());
          }
        }
      }
      // Spurious wakeups and stale park tokens are handled by re-checking
      // the state at the top of the loop.
      thread::park();
    }
  }
}
