use std::fmt;

use thiserror::Error;

/// Errors raised by the store implementations themselves.
///
/// Failures of a caller-supplied value factory are never folded into this
/// type; they travel through [`GetOrCreateError::Factory`] untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
  /// `add` was called for a key that is already present.
  #[error("an item with key {key} already exists in the store")]
  DuplicateKey { key: String },

  /// An indexer-style `get` was called for an absent key.
  #[error("no item with key {key} exists in the store")]
  KeyNotFound { key: String },

  /// A value factory, while computing the value for a key, re-entered the
  /// store for that same key.
  #[error("the factory for key {key} re-entered the store for the same key during its own computation")]
  RecursiveAccess { key: String },
}

impl StoreError {
  pub(crate) fn duplicate_key<K: fmt::Debug>(key: &K) -> Self {
    StoreError::DuplicateKey {
      key: format!("{key:?}"),
    }
  }

  pub(crate) fn key_not_found<K: fmt::Debug>(key: &K) -> Self {
    StoreError::KeyNotFound {
      key: format!("{key:?}"),
    }
  }

  pub(crate) fn recursive_access<K: fmt::Debug>(key: &K) -> Self {
    StoreError::RecursiveAccess {
      key: format!("{key:?}"),
    }
  }
}

/// The error type of [`DataStore::try_get_or_create`](crate::DataStore::try_get_or_create).
///
/// Either the store itself rejected the call, or the caller's factory failed.
/// In the latter case the key is guaranteed to be left in a state where a
/// subsequent `get_or_create` retries the factory.
#[derive(Debug, Error)]
pub enum GetOrCreateError<E> {
  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("the value factory failed")]
  Factory(E),
}

impl<E> GetOrCreateError<E> {
  /// Returns the factory's own error, if that is what this is.
  pub fn into_factory_error(self) -> Option<E> {
    match self {
      GetOrCreateError::Store(_) => None,
      GetOrCreateError::Factory(e) => Some(e),
    }
  }

  /// Returns the store error, if that is what this is.
  pub fn into_store_error(self) -> Option<StoreError> {
    match self {
      GetOrCreateError::Store(e) => Some(e),
      GetOrCreateError::Factory(_) => None,
    }
  }
}
