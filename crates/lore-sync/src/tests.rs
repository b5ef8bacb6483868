//! End-to-end pipeline tests over an in-memory source and store.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use lore_core::{
  clock::{ManualClock, SystemClock},
  compute::{ComputeEngine, paths::PathConfig, valuation::ValuationConfig},
  entity::{EntityKind, SharedCounts},
  source::{PropertyValue, SourceRecord},
  sync_log::{SyncLogEntry, SyncStatus},
};
use lore_store_sqlite::SqliteStore;

use crate::{Error, Pipeline, source::MemorySource};

const MIGRATIONS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../lore-store-sqlite/migrations");

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory(MIGRATIONS)
    .await
    .expect("in-memory store")
}

fn text(s: &str) -> PropertyValue { PropertyValue::Text(s.into()) }

fn relation(ids: &[&str]) -> PropertyValue {
  PropertyValue::Relation(ids.iter().map(|s| s.to_string()).collect())
}

fn character(id: &str, name: &str) -> SourceRecord {
  SourceRecord::new(id)
    .with("Name", text(name))
    .with("Tier", PropertyValue::Select("Core".into()))
}

fn element(id: &str, name: &str, owner: &str) -> SourceRecord {
  SourceRecord::new(id)
    .with("Name", text(name))
    .with("Owner", relation(&[owner]))
    .with("Quality Tier", PropertyValue::Number(2.0))
    .with("First Available", PropertyValue::Select("Act 1".into()))
}

fn event(id: &str, characters: &[&str], elements: &[&str]) -> SourceRecord {
  SourceRecord::new(id)
    .with("Description", text(&format!("event {id}")))
    .with("Characters Involved", relation(characters))
    .with("Memory/Evidence", relation(elements))
}

/// Ada and Ben share two events and one puzzle; Cy shares one event with
/// each of them. No element is held by two characters.
fn fixture() -> MemorySource {
  MemorySource::new()
    .with_records(EntityKind::Character, vec![
      character("a", "Ada"),
      character("b", "Ben"),
      character("c", "Cy"),
    ])
    .with_records(EntityKind::Element, vec![
      element("e1", "Diary", "a"),
      element("e2", "Umbrella", "c"),
    ])
    .with_records(EntityKind::Puzzle, vec![
      SourceRecord::new("p1")
        .with("Puzzle", text("Locked safe"))
        .with("Owner", relation(&["a"]))
        .with("Characters", relation(&["b"])),
    ])
    .with_records(EntityKind::TimelineEvent, vec![
      event("t1", &["a", "b"], &["e1"]),
      event("t2", &["a", "b", "c"], &[]),
    ])
}

fn strengths(links: &[lore_core::entity::CharacterLink]) -> Vec<(&str, &str, f64)> {
  links
    .iter()
    .map(|l| (l.character_a_id.as_str(), l.character_b_id.as_str(), l.link_strength))
    .collect()
}

// ─── Full runs ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_run_mirrors_and_derives() {
  let pipeline = Pipeline::new(fixture(), store().await, Arc::new(SystemClock));
  let report = pipeline.run().await.unwrap();

  assert_eq!(report.overall, SyncStatus::Success);
  let kinds: Vec<_> = report.entries.iter().map(|e| e.entity_type).collect();
  assert_eq!(kinds, EntityKind::ALL);
  assert!(report.entries.iter().all(|e| e.run_id == report.run_id));
  assert_eq!(report.entries[0].records_processed, 3);
  assert_eq!(report.links_written, 3);

  let store = pipeline.store();
  let links = store.list_links().await.unwrap();
  assert_eq!(strengths(&links), [("a", "b", 7.0), ("a", "c", 2.0), ("b", "c", 2.0)]);
  assert_eq!(links[0].shared, SharedCounts { timeline_events: 2, puzzles: 1, elements: 0 });

  let characters = store.list_characters().await.unwrap();
  assert_eq!(characters[0].memory_value, 500.0);

  let events = store.list_timeline_events().await.unwrap();
  assert_eq!(events[0].act_focus.as_deref(), Some("Act 1"));
  assert_eq!(events[1].act_focus, None);

  // Kinds sync concurrently, so log rows land in completion order.
  let by_kind = |mut entries: Vec<SyncLogEntry>| {
    entries.sort_by_key(|e| e.entity_type);
    entries
  };
  let logged = store.sync_logs(Some(report.run_id)).await.unwrap();
  assert_eq!(by_kind(logged), report.entries);
  assert_eq!(by_kind(store.latest_run().await.unwrap()), report.entries);
}

#[tokio::test]
async fn empty_source_succeeds_with_zero_counts() {
  let pipeline = Pipeline::new(MemorySource::new(), store().await, Arc::new(SystemClock));
  let report = pipeline.run().await.unwrap();

  assert_eq!(report.overall, SyncStatus::Success);
  assert!(report.entries.iter().all(|e| e.records_processed == 0 && e.records_failed == 0));
  assert_eq!(report.links_written, 0);
}

#[tokio::test]
async fn second_run_removes_records_dropped_upstream() {
  let pipeline = Pipeline::new(fixture(), store().await, Arc::new(SystemClock));
  pipeline.run().await.unwrap();

  pipeline
    .source()
    .set_records(EntityKind::Character, vec![character("a", "Ada"), character("b", "Ben")]);
  let report = pipeline.run().await.unwrap();
  assert_eq!(report.overall, SyncStatus::Success);

  let store = pipeline.store();
  assert_eq!(store.list_characters().await.unwrap().len(), 2);
  assert_eq!(strengths(&store.list_links().await.unwrap()), [("a", "b", 7.0)]);
}

// ─── Failure isolation ───────────────────────────────────────────────────────

#[tokio::test]
async fn one_unmappable_record_makes_the_kind_partial() {
  let source = fixture();
  source.set_records(EntityKind::Element, vec![
    element("e1", "Diary", "a"),
    element("e2", "Umbrella", "c"),
    element("e3", "Cracked tape", "b").with("Quality Tier", PropertyValue::Select("Tier 9".into())),
  ]);
  let pipeline = Pipeline::new(source, store().await, Arc::new(SystemClock));
  let report = pipeline.run().await.unwrap();

  let elements = &report.entries[1];
  assert_eq!(elements.status, SyncStatus::Partial);
  assert_eq!(elements.records_processed, 2);
  assert_eq!(elements.records_failed, 1);
  assert!(elements.error_summary.as_deref().unwrap().starts_with("e3: "));
  assert_eq!(report.overall, SyncStatus::Partial);

  let stored: Vec<_> = pipeline
    .store()
    .list_elements()
    .await
    .unwrap()
    .into_iter()
    .map(|e| e.source.id)
    .collect();
  assert_eq!(stored, ["e1", "e2"]);
}

#[tokio::test]
async fn duplicate_ids_write_the_first_record_once() {
  let source = fixture();
  source.set_records(EntityKind::Character, vec![
    character("a", "Ada"),
    character("b", "Ben"),
    character("a", "Ada Two"),
    character("c", "Cy"),
  ]);
  let pipeline = Pipeline::new(source, store().await, Arc::new(SystemClock));
  let report = pipeline.run().await.unwrap();

  let characters = &report.entries[0];
  assert_eq!(characters.status, SyncStatus::Partial);
  assert_eq!(characters.records_processed, 3);
  assert_eq!(characters.records_failed, 1);
  assert_eq!(characters.error_summary.as_deref(), Some("a: duplicate id"));

  let stored = pipeline.store().list_characters().await.unwrap();
  assert_eq!(stored.len() as u32, characters.records_processed);
  assert_eq!(stored[0].source.name, "Ada");
}

#[tokio::test]
async fn unmappable_record_keeps_its_previous_copy() {
  let pipeline = Pipeline::new(fixture(), store().await, Arc::new(SystemClock));
  pipeline.run().await.unwrap();

  // e2 loses its required name upstream.
  pipeline.source().set_records(EntityKind::Element, vec![
    element("e1", "Diary", "a"),
    SourceRecord::new("e2").with("Owner", relation(&["c"])),
  ]);
  let report = pipeline.run().await.unwrap();
  assert_eq!(report.entries[1].status, SyncStatus::Partial);

  let elements = pipeline.store().list_elements().await.unwrap();
  assert_eq!(elements.len(), 2);
  assert_eq!(elements[1].source.name, "Umbrella");
}

#[tokio::test]
async fn listing_failure_fails_only_that_kind() {
  let pipeline = Pipeline::new(fixture(), store().await, Arc::new(SystemClock));
  pipeline.run().await.unwrap();

  pipeline.source().fail(EntityKind::Puzzle);
  let report = pipeline.run().await.unwrap();

  let puzzles = &report.entries[2];
  assert_eq!(puzzles.status, SyncStatus::Failed);
  assert_eq!(puzzles.records_processed, 0);
  assert!(puzzles.error_summary.as_deref().unwrap().starts_with("listing failed"));
  assert!(
    report
      .entries
      .iter()
      .filter(|e| e.entity_type != EntityKind::Puzzle)
      .all(|e| e.status == SyncStatus::Success)
  );
  assert_eq!(report.overall, SyncStatus::Failed);

  // The puzzle table was left as the last good run wrote it, so links still
  // count the shared puzzle.
  let store = pipeline.store();
  assert_eq!(store.list_puzzles().await.unwrap().len(), 1);
  assert_eq!(strengths(&store.list_links().await.unwrap())[0], ("a", "b", 7.0));
}

#[tokio::test]
async fn unvaluable_tier_still_writes_the_element() {
  let engine = ComputeEngine::new(
    ValuationConfig::default().with_base_values([(1, 100.0)]),
    PathConfig::default(),
  );
  let pipeline =
    Pipeline::new(fixture(), store().await, Arc::new(SystemClock)).with_engine(engine);
  let report = pipeline.run().await.unwrap();
  assert_eq!(report.entries[1].status, SyncStatus::Success);

  let elements = pipeline.store().list_elements().await.unwrap();
  assert_eq!(elements.len(), 2);
  assert!(elements.iter().all(|e| e.valuation.calculated_memory_value.is_none()));
  assert_eq!(elements[0].valuation.quality_tier, 2);

  let characters = pipeline.store().list_characters().await.unwrap();
  assert_eq!(characters[0].memory_value, 0.0);
}

// ─── Cached reads ────────────────────────────────────────────────────────────

#[tokio::test]
async fn cached_reads_expire_and_are_invalidated_by_runs() {
  let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()));
  let pipeline = Pipeline::new(fixture(), store().await, clock.clone())
    .with_cache_ttl(Duration::seconds(60));
  pipeline.run().await.unwrap();

  let reads = pipeline.reads();
  assert_eq!(reads.characters_with_links(None).await.unwrap().len(), 3);
  let summary = reads.resolution_path_summary().await.unwrap();

  // A write behind the cache's back stays invisible until the TTL lapses.
  let store = pipeline.store();
  let kept = store.list_characters().await.unwrap()[..2]
    .iter()
    .map(|c| c.source.clone())
    .collect::<Vec<_>>();
  let ids = kept.iter().map(|c| c.id.clone()).collect();
  store.mirror_characters(kept, ids).await.unwrap();

  clock.advance(Duration::seconds(59));
  assert_eq!(reads.characters_with_links(None).await.unwrap().len(), 3);
  assert_eq!(reads.resolution_path_summary().await.unwrap(), summary);

  clock.advance(Duration::seconds(1));
  assert_eq!(reads.characters_with_links(None).await.unwrap().len(), 2);

  // A successful run invalidates immediately.
  pipeline.run().await.unwrap();
  assert_eq!(reads.characters_with_links(None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn failed_link_rebuild_leaves_edges_and_cache_in_place() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("lore.db");
  let store = SqliteStore::open(&path, MIGRATIONS).await.unwrap();
  let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()));
  let pipeline = Pipeline::new(fixture(), store, clock).with_cache_ttl(Duration::seconds(60));
  pipeline.run().await.unwrap();

  let reads = pipeline.reads();
  let cached = reads.characters_with_links(None).await.unwrap();
  assert_eq!(cached.len(), 3);
  let links = pipeline.store().list_links().await.unwrap();

  rusqlite::Connection::open(&path)
    .unwrap()
    .execute_batch(
      "CREATE TRIGGER reject_links BEFORE INSERT ON character_links
       BEGIN SELECT RAISE(ABORT, 'link rejected'); END;",
    )
    .unwrap();

  // Cy leaves, so a fresh read would see two characters.
  pipeline
    .source()
    .set_records(EntityKind::Character, vec![character("a", "Ada"), character("b", "Ben")]);
  let err = pipeline.run().await.unwrap_err();
  assert!(matches!(err, Error::Relationship(_)));

  assert_eq!(pipeline.store().list_links().await.unwrap(), links);
  assert_eq!(pipeline.store().list_characters().await.unwrap().len(), 2);
  assert_eq!(reads.characters_with_links(None).await.unwrap(), cached);
}
