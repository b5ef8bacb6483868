//! Per-entity-type synchronizers.
//!
//! One run lists every record of a kind, maps each to its `*Source` type,
//! and mirrors the batch into the store. Mapping and write failures are
//! per-record: the record is skipped and counted, and the rest of the batch
//! continues. A listing failure fails the whole kind. Either way the outcome
//! lands in one sync-log row rather than an error.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use lore_core::{
  clock::Clock,
  compute::{ComputeEngine, Derived},
  entity::{CharacterSource, Element, ElementSource, EntityKind, PuzzleSource, TimelineEventSource},
  source::{Source, SourceRecord},
  sync_log::{RecordFailure, SyncLogEntry, SyncStatus, summarize_failures},
};
use lore_store_sqlite::{MirrorOutcome, SqliteStore};
use tracing::{info, warn};
use uuid::Uuid;

use crate::Result;

/// Keep the first record listed under each id. Every later record with the
/// same id is counted as a failure and never written.
fn first_per_id<'r>(
  records: &'r [SourceRecord],
  failures: &mut Vec<RecordFailure>,
) -> Vec<&'r SourceRecord> {
  let mut seen = HashSet::new();
  records
    .iter()
    .filter(|&record| {
      let id = record.id.trim();
      if id.is_empty() || seen.insert(id) {
        return true;
      }
      warn!(record_id = id, "skipping duplicate record id");
      failures.push(RecordFailure::new(id, "duplicate id"));
      false
    })
    .collect()
}

/// Map every record, collecting failures instead of stopping.
fn map_records<T>(records: &[&SourceRecord], failures: &mut Vec<RecordFailure>) -> Vec<T>
where
  T: for<'r> TryFrom<&'r SourceRecord, Error = lore_core::Error>,
{
  records
    .iter()
    .filter_map(|record| match T::try_from(*record) {
      Ok(mapped) => Some(mapped),
      Err(e) => {
        warn!(record_id = %record.id, error = %e, "skipping unmappable record");
        failures.push(RecordFailure::new(record.id.as_str(), e));
        None
      }
    })
    .collect()
}

/// Ids the source still lists. Records that failed to map are included, so
/// their last good local copy survives the mirror delete.
fn listed_ids(records: &[SourceRecord]) -> BTreeSet<String> {
  records
    .iter()
    .map(|r| r.id.trim())
    .filter(|id| !id.is_empty())
    .map(str::to_owned)
    .collect()
}

pub struct EntitySynchronizer<'a, S> {
  source: &'a S,
  store:  &'a SqliteStore,
  engine: &'a ComputeEngine,
  clock:  &'a dyn Clock,
}

impl<'a, S: Source> EntitySynchronizer<'a, S> {
  pub fn new(
    source: &'a S,
    store: &'a SqliteStore,
    engine: &'a ComputeEngine,
    clock: &'a dyn Clock,
  ) -> Self {
    Self { source, store, engine, clock }
  }

  /// Synchronize one entity kind and append its sync-log row.
  ///
  /// Only a failure to write the log row itself is returned as an error.
  pub async fn sync(&self, kind: EntityKind, run_id: Uuid) -> Result<SyncLogEntry> {
    let started = self.clock.now();

    let entry = match self.source.list(kind).await {
      Ok(records) => self.mirror(kind, &records).await.finish(run_id, kind, started, self.clock),
      Err(e) => {
        warn!(%kind, error = %e, "listing failed");
        SyncLogEntry {
          run_id,
          entity_type: kind,
          run_started_at: started,
          run_finished_at: self.clock.now(),
          status: SyncStatus::Failed,
          records_processed: 0,
          records_failed: 0,
          error_summary: Some(format!("listing failed: {e}")),
        }
      }
    };

    self.store.append_sync_log(&entry).await?;
    info!(
      %kind,
      status = %entry.status,
      processed = entry.records_processed,
      failed = entry.records_failed,
      "synchronized"
    );
    Ok(entry)
  }

  async fn mirror(&self, kind: EntityKind, records: &[SourceRecord]) -> Tally {
    let ids = listed_ids(records);
    let mut duplicates = vec![];
    let unique = first_per_id(records, &mut duplicates);
    let mut failures = vec![];

    let outcome = match kind {
      EntityKind::Character => {
        let rows = map_records::<CharacterSource>(&unique, &mut failures);
        self.store.mirror_characters(rows, ids).await
      }
      EntityKind::Element => {
        let rows = map_records::<ElementSource>(&unique, &mut failures)
          .into_iter()
          .map(|source| self.appraise(source))
          .collect();
        self.store.mirror_elements(rows, ids).await
      }
      EntityKind::Puzzle => {
        let rows = map_records::<PuzzleSource>(&unique, &mut failures);
        self.store.mirror_puzzles(rows, ids).await
      }
      EntityKind::TimelineEvent => {
        let rows = map_records::<TimelineEventSource>(&unique, &mut failures);
        self.store.mirror_timeline_events(rows, ids).await
      }
    };

    let tally = match outcome {
      Ok(MirrorOutcome { written, deleted, failures: write_failures }) => {
        for failure in &write_failures {
          warn!(%kind, record_id = ?failure.record_id, reason = %failure.reason, "write failed");
        }
        failures.extend(write_failures);
        Tally { written, deleted, failures }
      }
      // The mirror transaction never committed: nothing from this batch landed.
      Err(e) => {
        warn!(%kind, error = %e, "mirror transaction failed");
        let reason = format!("store write failed: {e}");
        let unwritten: Vec<_> = unique
          .iter()
          .filter(|r| !r.id.trim().is_empty())
          .filter(|r| !failures.iter().any(|f| f.record_id.as_deref() == Some(r.id.as_str())))
          .map(|r| RecordFailure::new(r.id.as_str(), &reason))
          .collect();
        failures.extend(unwritten);
        Tally { written: 0, deleted: 0, failures }
      }
    };
    tally.with_failures(duplicates)
  }

  /// Inline valuation and paths. A field that cannot be computed is left
  /// unset and logged; the record is still written.
  fn appraise(&self, source: ElementSource) -> Element {
    let Derived { value, issues } = self.engine.element(source);
    for issue in issues {
      warn!(element_id = %value.source.id, error = %issue, "computed field left unset");
    }
    value
  }
}

struct Tally {
  written:  u32,
  deleted:  u32,
  failures: Vec<RecordFailure>,
}

impl Tally {
  fn with_failures(mut self, failures: Vec<RecordFailure>) -> Self {
    self.failures.extend(failures);
    self
  }

  fn finish(
    self,
    run_id: Uuid,
    kind: EntityKind,
    started: DateTime<Utc>,
    clock: &dyn Clock,
  ) -> SyncLogEntry {
    let failed = u32::try_from(self.failures.len()).unwrap_or(u32::MAX);
    if self.deleted > 0 {
      info!(%kind, deleted = self.deleted, "removed records no longer in source");
    }
    SyncLogEntry {
      run_id,
      entity_type: kind,
      run_started_at: started,
      run_finished_at: clock.now(),
      status: SyncStatus::from_counts(self.written, failed),
      records_processed: self.written,
      records_failed: failed,
      error_summary: summarize_failures(&self.failures),
    }
  }
}
