//! An in-process source with per-kind failure injection.

use std::{
  collections::{BTreeMap, BTreeSet},
  sync::{Mutex, PoisonError},
};

use lore_core::{
  entity::EntityKind,
  source::{Source, SourceRecord},
};

use crate::error::SourceError;

#[derive(Debug, Default)]
struct State {
  records: BTreeMap<EntityKind, Vec<SourceRecord>>,
  failing: BTreeSet<EntityKind>,
}

/// Records held in memory. Kinds marked with [`MemorySource::fail`] return
/// [`SourceError::Unavailable`] until healed.
#[derive(Debug, Default)]
pub struct MemorySource {
  state: Mutex<State>,
}

impl MemorySource {
  pub fn new() -> Self { Self::default() }

  pub fn with_records(self, kind: EntityKind, records: Vec<SourceRecord>) -> Self {
    self.set_records(kind, records);
    self
  }

  /// Replace everything listed for `kind`.
  pub fn set_records(&self, kind: EntityKind, records: Vec<SourceRecord>) {
    self.lock().records.insert(kind, records);
  }

  pub fn fail(&self, kind: EntityKind) { self.lock().failing.insert(kind); }

  pub fn heal(&self, kind: EntityKind) { self.lock().failing.remove(&kind); }

  fn lock(&self) -> std::sync::MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl Source for MemorySource {
  type Error = SourceError;

  async fn list(&self, kind: EntityKind) -> Result<Vec<SourceRecord>, SourceError> {
    let state = self.lock();
    if state.failing.contains(&kind) {
      return Err(SourceError::Unavailable(format!("{kind} listing is failing")));
    }
    Ok(state.records.get(&kind).cloned().unwrap_or_default())
  }
}
