//! [`SqliteStore`]: the relational mirror and its derived tables.

use std::{
  collections::{BTreeMap, BTreeSet},
  path::Path,
};

use lore_core::{
  compute::{
    ComputeEngine,
    links::{LinkWeights, PairTally},
    paths::{PathSummary, bucket_counts},
  },
  entity::{
    Character, CharacterLink, CharacterNode, CharacterSource, Element, ElementSource,
    EntityKind, Puzzle, PuzzleSource, SchemaMigration, TimelineEvent, TimelineEventSource,
  },
  sync_log::{RecordFailure, SyncLogEntry},
};
use rusqlite::OptionalExtension as _;
use tracing::debug;
use uuid::Uuid;

use crate::{
  Result,
  migrate::{self, Migration, MigrationSet},
  rows::{
    MirrorRow, RawMigration, RawSyncLog, encode_dt, encode_list, load_characters,
    load_elements, load_links, load_puzzles, load_timeline_events, write_links,
  },
};

const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
";

/// Pairs of characters sharing timeline events, grouped by event.
const SHARED_EVENTS_SQL: &str = "
SELECT a.member_id, b.member_id, COUNT(*)
FROM timeline_event_members a
JOIN timeline_event_members b
  ON b.event_id = a.event_id
 AND b.member_kind = 'character'
 AND a.member_id < b.member_id
JOIN characters ca ON ca.id = a.member_id
JOIN characters cb ON cb.id = b.member_id
WHERE a.member_kind = 'character'
GROUP BY a.member_id, b.member_id
";

/// Pairs of characters sharing puzzles, grouped by puzzle.
const SHARED_PUZZLES_SQL: &str = "
SELECT a.target_id, b.target_id, COUNT(*)
FROM puzzle_relations a
JOIN puzzle_relations b
  ON b.puzzle_id = a.puzzle_id
 AND b.relation = 'character'
 AND a.target_id < b.target_id
JOIN characters ca ON ca.id = a.target_id
JOIN characters cb ON cb.id = b.target_id
WHERE a.relation = 'character'
GROUP BY a.target_id, b.target_id
";

/// Pairs of characters whose owned-or-associated element sets intersect.
const SHARED_ELEMENTS_SQL: &str = "
WITH holdings AS (
  SELECT owner_character_id AS character_id, id AS element_id
  FROM elements
  WHERE owner_character_id IS NOT NULL
  UNION
  SELECT character_id, element_id FROM element_associated_characters
)
SELECT a.character_id, b.character_id, COUNT(*)
FROM holdings a
JOIN holdings b
  ON b.element_id = a.element_id
 AND a.character_id < b.character_id
JOIN characters ca ON ca.id = a.character_id
JOIN characters cb ON cb.id = b.character_id
GROUP BY a.character_id, b.character_id
";

const SHARED_COUNT_QUERIES: [(EntityKind, &str); 3] = [
  (EntityKind::TimelineEvent, SHARED_EVENTS_SQL),
  (EntityKind::Puzzle, SHARED_PUZZLES_SQL),
  (EntityKind::Element, SHARED_ELEMENTS_SQL),
];

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// What one mirror pass did to an entity table.
#[derive(Debug, Default)]
pub struct MirrorOutcome {
  pub written:  u32,
  /// Local rows removed because the source no longer lists them.
  pub deleted:  u32,
  /// Rows whose write failed; their savepoint was rolled back.
  pub failures: Vec<RecordFailure>,
}

/// Rows touched by the post-barrier derived pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DerivedOutcome {
  pub characters:         usize,
  pub puzzles:            usize,
  pub timeline_events:    usize,
  /// Events left with a null `act_focus`.
  pub events_without_act: usize,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// The relational mirror, backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) the database at `path` without touching its schema.
  pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_pragmas().await?;
    Ok(store)
  }

  pub async fn connect_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_pragmas().await?;
    Ok(store)
  }

  /// Open the database at `path` and apply every pending migration found in
  /// `migrations_dir`.
  pub async fn open(path: impl AsRef<Path>, migrations_dir: impl AsRef<Path>) -> Result<Self> {
    let store = Self::connect(path).await?;
    store.migrate(MigrationSet::load(migrations_dir)?).await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory(migrations_dir: impl AsRef<Path>) -> Result<Self> {
    let store = Self::connect_in_memory().await?;
    store.migrate(MigrationSet::load(migrations_dir)?).await?;
    Ok(store)
  }

  async fn init_pragmas(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(PRAGMAS)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Migrations ────────────────────────────────────────────────────────────

  /// Apply pending scripts from `set`; returns the newly applied ones.
  pub async fn migrate(&self, set: MigrationSet) -> Result<Vec<SchemaMigration>> {
    let applied = self
      .conn
      .call(move |conn| Ok(migrate::apply_pending(conn, &set)))
      .await??;
    Ok(applied)
  }

  /// The ledger, in version order.
  pub async fn applied_migrations(&self) -> Result<Vec<SchemaMigration>> {
    let raws: Vec<RawMigration> = self
      .conn
      .call(|conn| {
        migrate::applied_versions(conn)?;
        let mut stmt = conn.prepare(
          "SELECT version, name, applied_at FROM schema_migrations ORDER BY version",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawMigration {
              version:    row.get(0)?,
              name:       row.get(1)?,
              applied_at: row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMigration::into_migration).collect()
  }

  /// Scripts in `set` not yet recorded in the ledger.
  pub async fn pending_migrations(&self, set: &MigrationSet) -> Result<Vec<Migration>> {
    let applied = self
      .conn
      .call(|conn| Ok(migrate::applied_versions(conn)?))
      .await?;
    Ok(set.pending(&applied).into_iter().cloned().collect())
  }

  // ── Mirroring ─────────────────────────────────────────────────────────────

  /// Make `R::TABLE` mirror the source, in one transaction.
  ///
  /// Rows whose id is not in `source_ids` are deleted first, then every row
  /// is upserted under its own savepoint so one failed write does not take
  /// the batch down with it.
  async fn mirror<R: MirrorRow>(
    &self,
    rows: Vec<R>,
    source_ids: BTreeSet<String>,
  ) -> Result<MirrorOutcome> {
    let outcome = self
      .conn
      .call(move |conn| {
        let mut tx = conn.transaction()?;

        let existing: Vec<String> = {
          let mut stmt = tx.prepare(&format!("SELECT id FROM {}", R::TABLE))?;
          stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?
        };

        let mut outcome = MirrorOutcome::default();
        {
          let mut stmt = tx.prepare(&format!("DELETE FROM {} WHERE id = ?1", R::TABLE))?;
          for id in existing.iter().filter(|id| !source_ids.contains(*id)) {
            outcome.deleted += stmt.execute([id])? as u32;
          }
        }

        for row in &rows {
          let sp = tx.savepoint()?;
          match row.upsert(&sp) {
            Ok(()) => {
              sp.commit()?;
              outcome.written += 1;
            }
            // Dropping the savepoint rolls the partial write back.
            Err(e) => outcome.failures.push(RecordFailure::new(row.id(), e)),
          }
        }

        tx.commit()?;
        Ok(outcome)
      })
      .await?;

    debug!(
      table = R::TABLE,
      written = outcome.written,
      deleted = outcome.deleted,
      failed = outcome.failures.len(),
      "mirrored table"
    );
    Ok(outcome)
  }

  pub async fn mirror_characters(
    &self,
    rows: Vec<CharacterSource>,
    source_ids: BTreeSet<String>,
  ) -> Result<MirrorOutcome> {
    self.mirror(rows, source_ids).await
  }

  /// Elements arrive with their inline computed fields already attached.
  pub async fn mirror_elements(
    &self,
    rows: Vec<Element>,
    source_ids: BTreeSet<String>,
  ) -> Result<MirrorOutcome> {
    self.mirror(rows, source_ids).await
  }

  pub async fn mirror_puzzles(
    &self,
    rows: Vec<PuzzleSource>,
    source_ids: BTreeSet<String>,
  ) -> Result<MirrorOutcome> {
    self.mirror(rows, source_ids).await
  }

  pub async fn mirror_timeline_events(
    &self,
    rows: Vec<TimelineEventSource>,
    source_ids: BTreeSet<String>,
  ) -> Result<MirrorOutcome> {
    self.mirror(rows, source_ids).await
  }

  // ── Derived fields ────────────────────────────────────────────────────────

  /// Recompute every field that spans entity tables, in one transaction:
  /// character memory value and paths, puzzle paths, and event act focus.
  ///
  /// Inputs are element *source* columns only; stored computed columns are
  /// never read back.
  pub async fn refresh_derived(&self, engine: ComputeEngine) -> Result<DerivedOutcome> {
    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut outcome = DerivedOutcome::default();

        let elements: BTreeMap<String, ElementSource> = load_elements(&tx)?
          .into_iter()
          .map(|e| (e.source.id.clone(), e.source))
          .collect();

        let mut holdings: BTreeMap<&str, Vec<&ElementSource>> = BTreeMap::new();
        for element in elements.values() {
          for holder in element.holders() {
            holdings.entry(holder).or_default().push(element);
          }
        }
        let lookup = |ids: &[String]| -> Vec<&ElementSource> {
          ids.iter().filter_map(|id| elements.get(id)).collect()
        };

        {
          let mut stmt = tx.prepare_cached(
            "UPDATE characters SET resolution_paths = ?2, memory_value = ?3 WHERE id = ?1",
          )?;
          for character in load_characters(&tx)? {
            let held = holdings
              .get(character.source.id.as_str())
              .map(Vec::as_slice)
              .unwrap_or_default();
            let computed = engine.character(character.source, held);
            stmt.execute(rusqlite::params![
              computed.source.id,
              encode_list(&computed.resolution_paths)?,
              computed.memory_value,
            ])?;
            outcome.characters += 1;
          }
        }

        {
          let mut stmt =
            tx.prepare_cached("UPDATE puzzles SET resolution_paths = ?2 WHERE id = ?1")?;
          for puzzle in load_puzzles(&tx)? {
            let rewards = lookup(&puzzle.source.reward_element_ids);
            let computed = engine.puzzle(puzzle.source, &rewards);
            stmt.execute(rusqlite::params![
              computed.source.id,
              encode_list(&computed.resolution_paths)?,
            ])?;
            outcome.puzzles += 1;
          }
        }

        {
          let mut stmt =
            tx.prepare_cached("UPDATE timeline_events SET act_focus = ?2 WHERE id = ?1")?;
          for event in load_timeline_events(&tx)? {
            let members = lookup(&event.source.element_ids);
            let computed = engine.timeline_event(event.source, &members);
            if computed.act_focus.is_none() {
              outcome.events_without_act += 1;
            }
            stmt.execute(rusqlite::params![computed.source.id, computed.act_focus])?;
            outcome.timeline_events += 1;
          }
        }

        tx.commit()?;
        Ok(outcome)
      })
      .await?;
    Ok(outcome)
  }

  // ── Relationships ─────────────────────────────────────────────────────────

  /// Rebuild the whole CharacterLink table from shared membership.
  ///
  /// Shared counts come from grouped self-joins on each membership table, so
  /// only co-occurring pairs are generated. Counting, delete, and insert run
  /// in one transaction; on failure the previous edge set is untouched.
  pub async fn rebuild_links(&self, weights: LinkWeights) -> Result<Vec<CharacterLink>> {
    let links = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let mut tally = PairTally::new();
        for (kind, sql) in SHARED_COUNT_QUERIES {
          let mut stmt = tx.prepare(sql)?;
          let mut rows = stmt.query([])?;
          while let Some(row) = rows.next()? {
            let a: String = row.get(0)?;
            let b: String = row.get(1)?;
            tally.add(kind, &a, &b, row.get(2)?);
          }
        }

        let links = tally.into_links(&weights);
        write_links(&tx, &links)?;
        tx.commit()?;
        Ok(links)
      })
      .await?;
    Ok(links)
  }

  // ── Sync log ──────────────────────────────────────────────────────────────

  pub async fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<()> {
    let run_id = entry.run_id.hyphenated().to_string();
    let entity_type = entry.entity_type.as_ref().to_owned();
    let started = encode_dt(entry.run_started_at);
    let finished = encode_dt(entry.run_finished_at);
    let status = entry.status.as_ref().to_owned();
    let processed = entry.records_processed;
    let failed = entry.records_failed;
    let summary = entry.error_summary.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sync_log (
             run_id, entity_type, run_started_at, run_finished_at,
             status, records_processed, records_failed, error_summary
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            run_id, entity_type, started, finished, status, processed, failed, summary,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Every log row in insertion order, optionally restricted to one run.
  pub async fn sync_logs(&self, run_id: Option<Uuid>) -> Result<Vec<SyncLogEntry>> {
    let run_id = run_id.map(|id| id.hyphenated().to_string());

    let raws: Vec<RawSyncLog> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM sync_log WHERE ?1 IS NULL OR run_id = ?1 ORDER BY log_id",
          RawSyncLog::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([run_id], RawSyncLog::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSyncLog::into_entry).collect()
  }

  /// The log rows of the most recent run; empty if nothing has synced yet.
  pub async fn latest_run(&self) -> Result<Vec<SyncLogEntry>> {
    let latest: Option<String> = self
      .conn
      .call(|conn| {
        Ok(
          conn
            .query_row(
              "SELECT run_id FROM sync_log ORDER BY log_id DESC LIMIT 1",
              [],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    match latest {
      Some(id) => self.sync_logs(Some(Uuid::parse_str(&id)?)).await,
      None => Ok(vec![]),
    }
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  pub async fn list_characters(&self) -> Result<Vec<Character>> {
    Ok(self.conn.call(|conn| Ok(load_characters(conn)?)).await?)
  }

  pub async fn list_elements(&self) -> Result<Vec<Element>> {
    Ok(self.conn.call(|conn| Ok(load_elements(conn)?)).await?)
  }

  pub async fn list_puzzles(&self) -> Result<Vec<Puzzle>> {
    Ok(self.conn.call(|conn| Ok(load_puzzles(conn)?)).await?)
  }

  pub async fn list_timeline_events(&self) -> Result<Vec<TimelineEvent>> {
    Ok(self.conn.call(|conn| Ok(load_timeline_events(conn)?)).await?)
  }

  pub async fn list_links(&self) -> Result<Vec<CharacterLink>> {
    Ok(self.conn.call(|conn| Ok(load_links(conn)?)).await?)
  }

  /// Sociogram data: every character (optionally only one tier) with its
  /// incident links, strongest first. Characters and links are read in one
  /// transaction so the two halves agree.
  pub async fn characters_with_links(&self, tier: Option<String>) -> Result<Vec<CharacterNode>> {
    let (characters, links) = self
      .conn
      .call(|conn| {
        let tx = conn.transaction()?;
        let characters = load_characters(&tx)?;
        let links = load_links(&tx)?;
        tx.commit()?;
        Ok((characters, links))
      })
      .await?;

    let nodes = characters
      .into_iter()
      .filter(|c| tier.is_none() || c.source.tier == tier)
      .map(|character| {
        let mut incident: Vec<CharacterLink> = links
          .iter()
          .filter(|l| l.other(&character.source.id).is_some())
          .cloned()
          .collect();
        incident.sort_by(|x, y| {
          y.link_strength
            .total_cmp(&x.link_strength)
            .then_with(|| x.other(&character.source.id).cmp(&y.other(&character.source.id)))
        });
        CharacterNode { character, links: incident }
      })
      .collect();
    Ok(nodes)
  }

  /// Resolution-path bucket counts for characters, elements, and puzzles.
  pub async fn resolution_path_summary(&self) -> Result<PathSummary> {
    let summary = self
      .conn
      .call(|conn| {
        let tx = conn.transaction()?;
        let characters = load_characters(&tx)?;
        let elements = load_elements(&tx)?;
        let puzzles = load_puzzles(&tx)?;
        tx.commit()?;

        Ok(PathSummary {
          characters: bucket_counts(characters.iter().map(|c| c.resolution_paths.as_slice())),
          elements:   bucket_counts(elements.iter().map(|e| e.resolution_paths.as_slice())),
          puzzles:    bucket_counts(puzzles.iter().map(|p| p.resolution_paths.as_slice())),
        })
      })
      .await?;
    Ok(summary)
  }
}
