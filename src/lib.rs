//! A family of interchangeable keyed memoizing data stores built around one
//! idea: *at most one value computation per key*, safe under concurrent
//! access, with explicit handling of in-flight and failed computations.
//!
//! # Implementations
//! - **[`SimpleDataStore`]**: the non-concurrent baseline; detects a factory
//!   that re-enters the store for the key it is computing.
//! - **[`ConcurrentDataStore`]**: lock-free reads of published values,
//!   per-key locked writes; distinct keys never block each other.
//! - **[`LockingDataStoreDecorator`]**: any store behind one global
//!   reentrant lock; simplest possible thread-safety.
//! - **[`LazyLockingDataStoreAdapter`]**: a coarse lock held only long
//!   enough to publish a lazy cell, not to run the factory.
//! - **[`ExpiringDataStore`]**: policy-driven lazy eviction over the simple
//!   baseline; no timer thread.
//!
//! All five implement the same [`DataStore`] contract and differ only in
//! their thread-safety, contention, and recursion-safety trade-offs. A
//! failed factory always leaves its key retryable; a later `get_or_create`
//! runs the factory again instead of observing a poisoned entry.

// Public modules that form the API
pub mod concurrent;
pub mod error;
pub mod expiring;
pub mod lazy;
pub mod locking;
pub mod simple;
pub mod traits;

// Internal, crate-only modules
mod cell;

// Re-export the primary user-facing types for convenience
pub use concurrent::ConcurrentDataStore;
pub use error::{GetOrCreateError, StoreError};
pub use expiring::{ExpirationPolicy, ExpiringDataStore, TtlPolicy};
pub use lazy::LazyLockingDataStoreAdapter;
pub use locking::LockingDataStoreDecorator;
pub use simple::SimpleDataStore;
pub use traits::DataStore;
