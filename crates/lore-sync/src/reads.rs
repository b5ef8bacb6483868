//! Cached aggregate reads over the mirror.
//!
//! The sociogram and path summary each scan several tables, so they are
//! served read-through from a [`TtlCache`]. The pipeline invalidates both
//! after every successful run; a failed run leaves whatever the last good
//! run produced.

use std::sync::Arc;

use chrono::Duration;
use lore_core::{clock::Clock, compute::paths::PathSummary, entity::CharacterNode};
use lore_store_sqlite::SqliteStore;
use tracing::debug;

use crate::{Result, cache::TtlCache};

/// Cheap to clone; clones share the same cache entries.
#[derive(Clone)]
pub struct CachedReads {
  store:     SqliteStore,
  sociogram: Arc<TtlCache<Option<String>, Vec<CharacterNode>>>,
  paths:     Arc<TtlCache<(), PathSummary>>,
}

impl CachedReads {
  pub fn new(store: SqliteStore, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
    Self {
      store,
      sociogram: Arc::new(TtlCache::new(ttl, clock.clone())),
      paths: Arc::new(TtlCache::new(ttl, clock)),
    }
  }

  /// Characters with their incident links, optionally limited to one tier.
  pub async fn characters_with_links(&self, tier: Option<String>) -> Result<Vec<CharacterNode>> {
    if let Some(hit) = self.sociogram.get(&tier) {
      return Ok(hit);
    }
    debug!(?tier, "sociogram cache miss");
    let nodes = self.store.characters_with_links(tier.clone()).await?;
    self.sociogram.insert(tier, nodes.clone());
    Ok(nodes)
  }

  pub async fn resolution_path_summary(&self) -> Result<PathSummary> {
    if let Some(hit) = self.paths.get(&()) {
      return Ok(hit);
    }
    debug!("path summary cache miss");
    let summary = self.store.resolution_path_summary().await?;
    self.paths.insert((), summary.clone());
    Ok(summary)
  }

  pub fn invalidate(&self) {
    self.sociogram.invalidate();
    self.paths.invalidate();
  }
}
