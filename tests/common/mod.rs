#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use memostore::ExpirationPolicy;

/// Counts how many times a factory actually ran, across threads.
#[derive(Clone, Default)]
pub struct FactoryCounter {
  runs: Arc<AtomicUsize>,
}

impl FactoryCounter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn record(&self) {
    self.runs.fetch_add(1, Ordering::SeqCst);
  }

  pub fn runs(&self) -> usize {
    self.runs.load(Ordering::SeqCst)
  }
}

/// A policy that expires an entry once it has been read more than
/// `max_accesses` times, and considers a sweep due on every operation.
pub struct AccessCountPolicy {
  pub max_accesses: u32,
}

impl<V> ExpirationPolicy<V> for AccessCountPolicy {
  type ExpirationInfo = u32;
  type ScanInfo = ();

  fn expiration_info(&self, _value: &V) -> u32 {
    0
  }

  fn on_access(&self, _value: &V, accesses: &mut u32) {
    *accesses += 1;
  }

  fn is_expired(&self, _value: &V, accesses: &u32) -> bool {
    *accesses > self.max_accesses
  }

  fn should_scan(&self, _scan_info: &()) -> bool {
    true
  }

  fn next_scan_info(&self) {}
}

/// A policy whose staleness and sweep gate are both flipped by the test.
pub struct GatedPolicy {
  pub expired: Arc<std::sync::atomic::AtomicBool>,
  pub scan_enabled: Arc<std::sync::atomic::AtomicBool>,
}

impl<V> ExpirationPolicy<V> for GatedPolicy {
  type ExpirationInfo = ();
  type ScanInfo = ();

  fn expiration_info(&self, _value: &V) {}

  fn is_expired(&self, _value: &V, _info: &()) -> bool {
    self.expired.load(Ordering::SeqCst)
  }

  fn should_scan(&self, _scan_info: &()) -> bool {
    self.scan_enabled.load(Ordering::SeqCst)
  }

  fn next_scan_info(&self) {}
}
