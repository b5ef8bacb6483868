//! The full sync pipeline.
//!
//! entity synchronizers (concurrently) → barrier → derived pass →
//! relationship rebuild → cache invalidation.

use std::sync::Arc;

use chrono::Duration;
use lore_core::{
  clock::Clock,
  compute::{ComputeEngine, links::LinkWeights},
  entity::EntityKind,
  source::Source,
  sync_log::{SyncLogEntry, SyncStatus},
};
use lore_store_sqlite::SqliteStore;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  Result, reads::CachedReads, relationships::RelationshipSynchronizer,
  synchronizer::EntitySynchronizer,
};

/// The outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
  pub run_id:        Uuid,
  /// One entry per entity kind, in [`EntityKind::ALL`] order.
  pub entries:       Vec<SyncLogEntry>,
  pub links_written: usize,
  /// The worst status among `entries`.
  pub overall:       SyncStatus,
}

pub struct Pipeline<S> {
  source:  S,
  store:   SqliteStore,
  engine:  ComputeEngine,
  weights: LinkWeights,
  clock:   Arc<dyn Clock>,
  reads:   CachedReads,
}

impl<S: Source> Pipeline<S> {
  /// A pipeline with the built-in valuation, path, and weight tables and a
  /// one-minute read cache.
  pub fn new(source: S, store: SqliteStore, clock: Arc<dyn Clock>) -> Self {
    let reads = CachedReads::new(store.clone(), Duration::seconds(60), clock.clone());
    Self {
      source,
      store,
      engine: ComputeEngine::default(),
      weights: LinkWeights::default(),
      clock,
      reads,
    }
  }

  pub fn with_engine(mut self, engine: ComputeEngine) -> Self {
    self.engine = engine;
    self
  }

  pub fn with_link_weights(mut self, weights: LinkWeights) -> Self {
    self.weights = weights;
    self
  }

  pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
    self.reads = CachedReads::new(self.store.clone(), ttl, self.clock.clone());
    self
  }

  pub fn source(&self) -> &S { &self.source }

  pub fn store(&self) -> &SqliteStore { &self.store }

  /// Cached aggregate reads, invalidated by every successful [`run`].
  ///
  /// [`run`]: Self::run
  pub fn reads(&self) -> &CachedReads { &self.reads }

  /// Run one full sync.
  ///
  /// Per-kind failures are reported in the returned entries. Only store
  /// failures outside a synchronizer and a failed relationship rebuild are
  /// returned as errors; in that case the cache is left untouched.
  pub async fn run(&self) -> Result<SyncReport> {
    let run_id = Uuid::new_v4();
    info!(%run_id, "starting sync run");

    let sync = EntitySynchronizer::new(&self.source, &self.store, &self.engine, &*self.clock);
    let (characters, elements, puzzles, events) = tokio::join!(
      sync.sync(EntityKind::Character, run_id),
      sync.sync(EntityKind::Element, run_id),
      sync.sync(EntityKind::Puzzle, run_id),
      sync.sync(EntityKind::TimelineEvent, run_id),
    );
    let entries = vec![characters?, elements?, puzzles?, events?];

    let derived = self.store.refresh_derived(self.engine.clone()).await?;
    if derived.events_without_act > 0 {
      info!(events = derived.events_without_act, "timeline events with no act focus");
    }

    let incomplete: Vec<EntityKind> = entries
      .iter()
      .filter(|e| e.status != SyncStatus::Success)
      .map(|e| e.entity_type)
      .collect();
    let links = RelationshipSynchronizer::new(&self.store, self.weights)
      .rebuild(&incomplete)
      .await?;

    self.reads.invalidate();

    let overall = entries
      .iter()
      .fold(SyncStatus::Success, |acc, e| acc.worst(e.status));
    if overall != SyncStatus::Success {
      warn!(%run_id, %overall, "sync run finished with failures");
    } else {
      info!(%run_id, links = links.len(), "sync run finished");
    }

    Ok(SyncReport { run_id, entries, links_written: links.len(), overall })
  }
}
