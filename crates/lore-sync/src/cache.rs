//! A small TTL cache with an injected clock.
//!
//! Entries expire `ttl` after insertion as measured by the [`Clock`], so
//! tests can drive staleness with a `ManualClock`. `invalidate` drops
//! everything at once.

use std::{
  collections::HashMap,
  hash::Hash,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Duration, Utc};
use lore_core::clock::Clock;

pub struct TtlCache<K, V> {
  ttl:     Duration,
  clock:   Arc<dyn Clock>,
  entries: Mutex<HashMap<K, (DateTime<Utc>, V)>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
  pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
    Self { ttl, clock, entries: Mutex::new(HashMap::new()) }
  }

  /// A fresh value for `key`, if any. Expired entries are dropped.
  pub fn get(&self, key: &K) -> Option<V> {
    let now = self.clock.now();
    let mut entries = self.lock();
    let (inserted, value) = entries.get(key)?;
    let expired = inserted
      .checked_add_signed(self.ttl)
      .is_some_and(|expiry| now >= expiry);
    if !expired {
      return Some(value.clone());
    }
    entries.remove(key);
    None
  }

  pub fn insert(&self, key: K, value: V) {
    let now = self.clock.now();
    self.lock().insert(key, (now, value));
  }

  pub fn invalidate(&self) { self.lock().clear(); }

  pub fn len(&self) -> usize { self.lock().len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  fn lock(&self) -> MutexGuard<'_, HashMap<K, (DateTime<Utc>, V)>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }
}
