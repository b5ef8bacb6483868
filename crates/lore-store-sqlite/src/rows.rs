//! Encoding between domain types and SQLite columns, plus the per-table row
//! writers and loaders that run inside `tokio_rusqlite` closures.
//!
//! Timestamps are RFC 3339 strings, string lists are compact JSON arrays,
//! and enums use their `strum` string forms. Decoding failures inside a
//! closure surface as `rusqlite` conversion errors.

use std::{collections::HashMap, str::FromStr};

use chrono::{DateTime, Utc};
use lore_core::entity::{
  Character, CharacterLink, CharacterSource, Element, ElementSource, Puzzle, PuzzleSource,
  SharedCounts, TimelineEvent, TimelineEventSource, Valuation,
};
use rusqlite::{Connection, Row, types::Type};

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_list(values: &[String]) -> rusqlite::Result<String> {
  serde_json::to_string(values).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn list_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
  let raw: String = row.get(idx)?;
  serde_json::from_str(&raw)
    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parsed_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
  T: FromStr,
  T::Err: std::error::Error + Send + Sync + 'static,
{
  let raw: String = row.get(idx)?;
  T::from_str(&raw)
    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_parsed_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
  T: FromStr,
  T::Err: std::error::Error + Send + Sync + 'static,
{
  let raw: Option<String> = row.get(idx)?;
  raw
    .map(|r| {
      T::from_str(&r)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

// ─── Mirror rows ─────────────────────────────────────────────────────────────

/// A row type the synchronizers mirror into one entity table.
///
/// `upsert` replaces the row's own columns and its relation rows; computed
/// columns owned by the derived pass are left alone.
pub trait MirrorRow: Send + 'static {
  const TABLE: &'static str;

  fn id(&self) -> &str;

  fn upsert(&self, conn: &Connection) -> rusqlite::Result<()>;
}

impl MirrorRow for CharacterSource {
  const TABLE: &'static str = "characters";

  fn id(&self) -> &str { &self.id }

  fn upsert(&self, conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
      "INSERT INTO characters (id, name, tier, type, logline)
       VALUES (?1, ?2, ?3, ?4, ?5)
       ON CONFLICT (id) DO UPDATE SET
         name    = excluded.name,
         tier    = excluded.tier,
         type    = excluded.type,
         logline = excluded.logline",
      rusqlite::params![self.id, self.name, self.tier, self.kind, self.logline],
    )?;
    Ok(())
  }
}

impl MirrorRow for Element {
  const TABLE: &'static str = "elements";

  fn id(&self) -> &str { &self.source.id }

  fn upsert(&self, conn: &Connection) -> rusqlite::Result<()> {
    let s = &self.source;
    let v = &self.valuation;
    conn.execute(
      "INSERT INTO elements (
         id, name, basic_type, status, owner_character_id, container_element_id,
         timeline_event_id, description, notes, rfid_tag, first_available,
         declared_tier, declared_category, declared_paths,
         quality_tier, tier_provenance, category, category_provenance,
         calculated_memory_value, resolution_paths
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                 ?15, ?16, ?17, ?18, ?19, ?20)
       ON CONFLICT (id) DO UPDATE SET
         name                    = excluded.name,
         basic_type              = excluded.basic_type,
         status                  = excluded.status,
         owner_character_id      = excluded.owner_character_id,
         container_element_id    = excluded.container_element_id,
         timeline_event_id       = excluded.timeline_event_id,
         description             = excluded.description,
         notes                   = excluded.notes,
         rfid_tag                = excluded.rfid_tag,
         first_available         = excluded.first_available,
         declared_tier           = excluded.declared_tier,
         declared_category       = excluded.declared_category,
         declared_paths          = excluded.declared_paths,
         quality_tier            = excluded.quality_tier,
         tier_provenance         = excluded.tier_provenance,
         category                = excluded.category,
         category_provenance     = excluded.category_provenance,
         calculated_memory_value = excluded.calculated_memory_value,
         resolution_paths        = excluded.resolution_paths",
      rusqlite::params![
        s.id,
        s.name,
        s.basic_type,
        s.status,
        s.owner_character_id,
        s.container_element_id,
        s.timeline_event_id,
        s.description,
        s.notes,
        s.rfid_tag,
        s.first_available,
        s.declared_tier,
        s.declared_category.map(|c| c.as_ref().to_owned()),
        encode_list(&s.declared_paths)?,
        v.quality_tier,
        v.tier_provenance.as_ref(),
        v.category.as_ref(),
        v.category_provenance.as_ref(),
        v.calculated_memory_value,
        encode_list(&self.resolution_paths)?,
      ],
    )?;

    conn.execute(
      "DELETE FROM element_associated_characters WHERE element_id = ?1",
      [&s.id],
    )?;
    let mut stmt = conn.prepare_cached(
      "INSERT OR IGNORE INTO element_associated_characters (element_id, character_id)
       VALUES (?1, ?2)",
    )?;
    for character_id in &s.associated_character_ids {
      stmt.execute([&s.id, character_id])?;
    }
    Ok(())
  }
}

const PUZZLE_RELATIONS: [&str; 5] = ["required", "reward", "prerequisite", "unlocks", "character"];

fn puzzle_relation_ids<'a>(p: &'a PuzzleSource, relation: &str) -> &'a [String] {
  match relation {
    "required" => &p.required_element_ids,
    "reward" => &p.reward_element_ids,
    "prerequisite" => &p.prerequisite_puzzle_ids,
    "unlocks" => &p.unlocks_puzzle_ids,
    _ => &p.character_ids,
  }
}

impl MirrorRow for PuzzleSource {
  const TABLE: &'static str = "puzzles";

  fn id(&self) -> &str { &self.id }

  fn upsert(&self, conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
      "INSERT INTO puzzles (id, name, description, declared_paths)
       VALUES (?1, ?2, ?3, ?4)
       ON CONFLICT (id) DO UPDATE SET
         name           = excluded.name,
         description    = excluded.description,
         declared_paths = excluded.declared_paths",
      rusqlite::params![self.id, self.name, self.description, encode_list(&self.declared_paths)?],
    )?;

    conn.execute("DELETE FROM puzzle_relations WHERE puzzle_id = ?1", [&self.id])?;
    let mut stmt = conn.prepare_cached(
      "INSERT OR IGNORE INTO puzzle_relations (puzzle_id, relation, target_id, position)
       VALUES (?1, ?2, ?3, ?4)",
    )?;
    for relation in PUZZLE_RELATIONS {
      for (position, target) in puzzle_relation_ids(self, relation).iter().enumerate() {
        stmt.execute(rusqlite::params![self.id, relation, target, position as i64])?;
      }
    }
    Ok(())
  }
}

impl MirrorRow for TimelineEventSource {
  const TABLE: &'static str = "timeline_events";

  fn id(&self) -> &str { &self.id }

  fn upsert(&self, conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
      "INSERT INTO timeline_events (id, description, date)
       VALUES (?1, ?2, ?3)
       ON CONFLICT (id) DO UPDATE SET
         description = excluded.description,
         date        = excluded.date",
      rusqlite::params![self.id, self.description, self.date],
    )?;

    conn.execute("DELETE FROM timeline_event_members WHERE event_id = ?1", [&self.id])?;
    let mut stmt = conn.prepare_cached(
      "INSERT OR IGNORE INTO timeline_event_members (event_id, member_kind, member_id, position)
       VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (kind, ids) in [("character", &self.character_ids), ("element", &self.element_ids)] {
      for (position, member) in ids.iter().enumerate() {
        stmt.execute(rusqlite::params![self.id, kind, member, position as i64])?;
      }
    }
    Ok(())
  }
}

// ─── Loaders ─────────────────────────────────────────────────────────────────

/// `(parent_id, relation, target_id)` rows grouped into
/// `parent_id → relation → [target_id]`, preserving position order.
fn grouped_relations(
  conn: &Connection,
  sql: &str,
) -> rusqlite::Result<HashMap<String, HashMap<String, Vec<String>>>> {
  let mut stmt = conn.prepare(sql)?;
  let mut rows = stmt.query([])?;
  let mut grouped: HashMap<String, HashMap<String, Vec<String>>> = HashMap::new();
  while let Some(row) = rows.next()? {
    let parent: String = row.get(0)?;
    let relation: String = row.get(1)?;
    let target: String = row.get(2)?;
    grouped.entry(parent).or_default().entry(relation).or_default().push(target);
  }
  Ok(grouped)
}

fn take(group: Option<&mut HashMap<String, Vec<String>>>, relation: &str) -> Vec<String> {
  group.and_then(|g| g.remove(relation)).unwrap_or_default()
}

pub fn load_characters(conn: &Connection) -> rusqlite::Result<Vec<Character>> {
  let mut stmt = conn.prepare(
    "SELECT id, name, tier, type, logline, resolution_paths, memory_value
     FROM characters ORDER BY id",
  )?;
  let rows = stmt
    .query_map([], |row| {
      Ok(Character {
        source:           CharacterSource {
          id:      row.get(0)?,
          name:    row.get(1)?,
          tier:    row.get(2)?,
          kind:    row.get(3)?,
          logline: row.get(4)?,
        },
        resolution_paths: list_column(row, 5)?,
        memory_value:     row.get(6)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

pub fn load_elements(conn: &Connection) -> rusqlite::Result<Vec<Element>> {
  let mut associated = grouped_relations(
    conn,
    "SELECT element_id, 'associated', character_id
     FROM element_associated_characters ORDER BY element_id, character_id",
  )?;

  let mut stmt = conn.prepare(
    "SELECT id, name, basic_type, status, owner_character_id, container_element_id,
            timeline_event_id, description, notes, rfid_tag, first_available,
            declared_tier, declared_category, declared_paths,
            quality_tier, tier_provenance, category, category_provenance,
            calculated_memory_value, resolution_paths
     FROM elements ORDER BY id",
  )?;
  let rows = stmt
    .query_map([], |row| {
      let id: String = row.get(0)?;
      let associated_character_ids = take(associated.get_mut(&id), "associated");
      Ok(Element {
        source:           ElementSource {
          name: row.get(1)?,
          basic_type: row.get(2)?,
          status: row.get(3)?,
          owner_character_id: row.get(4)?,
          associated_character_ids,
          container_element_id: row.get(5)?,
          timeline_event_id: row.get(6)?,
          description: row.get(7)?,
          notes: row.get(8)?,
          rfid_tag: row.get(9)?,
          first_available: row.get(10)?,
          declared_tier: row.get(11)?,
          declared_category: opt_parsed_column(row, 12)?,
          declared_paths: list_column(row, 13)?,
          id,
        },
        valuation:        Valuation {
          quality_tier:            row.get(14)?,
          tier_provenance:         parsed_column(row, 15)?,
          category:                parsed_column(row, 16)?,
          category_provenance:     parsed_column(row, 17)?,
          calculated_memory_value: row.get(18)?,
        },
        resolution_paths: list_column(row, 19)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

pub fn load_puzzles(conn: &Connection) -> rusqlite::Result<Vec<Puzzle>> {
  let mut relations = grouped_relations(
    conn,
    "SELECT puzzle_id, relation, target_id
     FROM puzzle_relations ORDER BY puzzle_id, relation, position",
  )?;

  let mut stmt = conn.prepare(
    "SELECT id, name, description, declared_paths, resolution_paths
     FROM puzzles ORDER BY id",
  )?;
  let rows = stmt
    .query_map([], |row| {
      let id: String = row.get(0)?;
      let mut group = relations.remove(&id);
      Ok(Puzzle {
        source:           PuzzleSource {
          name: row.get(1)?,
          description: row.get(2)?,
          required_element_ids: take(group.as_mut(), "required"),
          reward_element_ids: take(group.as_mut(), "reward"),
          prerequisite_puzzle_ids: take(group.as_mut(), "prerequisite"),
          unlocks_puzzle_ids: take(group.as_mut(), "unlocks"),
          character_ids: take(group.as_mut(), "character"),
          declared_paths: list_column(row, 3)?,
          id,
        },
        resolution_paths: list_column(row, 4)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

pub fn load_timeline_events(conn: &Connection) -> rusqlite::Result<Vec<TimelineEvent>> {
  let mut members = grouped_relations(
    conn,
    "SELECT event_id, member_kind, member_id
     FROM timeline_event_members ORDER BY event_id, member_kind, position",
  )?;

  let mut stmt = conn.prepare(
    "SELECT id, description, date, act_focus FROM timeline_events ORDER BY id",
  )?;
  let rows = stmt
    .query_map([], |row| {
      let id: String = row.get(0)?;
      let mut group = members.remove(&id);
      Ok(TimelineEvent {
        source:    TimelineEventSource {
          description: row.get(1)?,
          date: row.get(2)?,
          character_ids: take(group.as_mut(), "character"),
          element_ids: take(group.as_mut(), "element"),
          id,
        },
        act_focus: row.get(3)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

pub fn load_links(conn: &Connection) -> rusqlite::Result<Vec<CharacterLink>> {
  let mut stmt = conn.prepare(
    "SELECT character_a_id, character_b_id, link_type, link_source_id, link_strength,
            shared_timeline_events, shared_puzzles, shared_elements
     FROM character_links ORDER BY character_a_id, character_b_id",
  )?;
  let rows = stmt
    .query_map([], |row| {
      Ok(CharacterLink {
        character_a_id: row.get(0)?,
        character_b_id: row.get(1)?,
        link_type:      row.get(2)?,
        link_source_id: row.get(3)?,
        link_strength:  row.get(4)?,
        shared:         SharedCounts {
          timeline_events: row.get(5)?,
          puzzles:         row.get(6)?,
          elements:        row.get(7)?,
        },
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

/// Replace the whole edge set. Must run inside the caller's transaction.
pub fn write_links(conn: &Connection, links: &[CharacterLink]) -> rusqlite::Result<usize> {
  conn.execute("DELETE FROM character_links", [])?;
  let mut stmt = conn.prepare_cached(
    "INSERT INTO character_links (
       character_a_id, character_b_id, link_type, link_source_id, link_strength,
       shared_timeline_events, shared_puzzles, shared_elements
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
  )?;
  for link in links {
    stmt.execute(rusqlite::params![
      link.character_a_id,
      link.character_b_id,
      link.link_type,
      link.link_source_id,
      link.link_strength,
      link.shared.timeline_events,
      link.shared.puzzles,
      link.shared.elements,
    ])?;
  }
  Ok(links.len())
}

// ─── Sync log ────────────────────────────────────────────────────────────────

/// Raw strings read directly from a `sync_log` row.
pub struct RawSyncLog {
  pub run_id:            String,
  pub entity_type:       String,
  pub run_started_at:    String,
  pub run_finished_at:   String,
  pub status:            String,
  pub records_processed: u32,
  pub records_failed:    u32,
  pub error_summary:     Option<String>,
}

impl RawSyncLog {
  pub const COLUMNS: &'static str = "run_id, entity_type, run_started_at, run_finished_at, \
                                     status, records_processed, records_failed, error_summary";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      run_id:            row.get(0)?,
      entity_type:       row.get(1)?,
      run_started_at:    row.get(2)?,
      run_finished_at:   row.get(3)?,
      status:            row.get(4)?,
      records_processed: row.get(5)?,
      records_failed:    row.get(6)?,
      error_summary:     row.get(7)?,
    })
  }

  pub fn into_entry(self) -> Result<lore_core::sync_log::SyncLogEntry> {
    Ok(lore_core::sync_log::SyncLogEntry {
      run_id:            uuid::Uuid::parse_str(&self.run_id)?,
      entity_type:       self.entity_type.parse().map_err(|_| {
        Error::Decode(format!("unknown entity type: {:?}", self.entity_type))
      })?,
      run_started_at:    decode_dt(&self.run_started_at)?,
      run_finished_at:   decode_dt(&self.run_finished_at)?,
      status:            self
        .status
        .parse()
        .map_err(|_| Error::Decode(format!("unknown sync status: {:?}", self.status)))?,
      records_processed: self.records_processed,
      records_failed:    self.records_failed,
      error_summary:     self.error_summary,
    })
  }
}

/// Raw strings read directly from a `schema_migrations` row.
pub struct RawMigration {
  pub version:    String,
  pub name:       String,
  pub applied_at: String,
}

impl RawMigration {
  pub fn into_migration(self) -> Result<lore_core::entity::SchemaMigration> {
    Ok(lore_core::entity::SchemaMigration {
      version:    self.version,
      name:       self.name,
      applied_at: decode_dt(&self.applied_at)?,
    })
  }
}
