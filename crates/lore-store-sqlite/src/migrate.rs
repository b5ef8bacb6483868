//! Versioned schema migrations.
//!
//! Scripts live in one directory and are named `<version>_<name>.sql`, where
//! `<version>` is all digits and sorts chronologically as a string (e.g. a
//! `YYYYMMDDhhmmss` timestamp). Each pending script runs in its own
//! transaction together with the insert of its `schema_migrations` row, so a
//! script is either applied and recorded or neither. The first failure halts
//! the run.
//!
//! Scripts must not contain their own `BEGIN`/`COMMIT`.

use std::{
  collections::BTreeSet,
  fs,
  path::{Path, PathBuf},
};

use chrono::Utc;
use lore_core::entity::SchemaMigration;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::{error::MigrationError, rows::encode_dt};

const LEDGER_DDL: &str = "
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    applied_at TEXT NOT NULL
);
";

/// One schema-change script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
  pub version: String,
  pub name:    String,
  pub sql:     String,
}

/// An ordered, duplicate-free set of migration scripts.
#[derive(Debug, Clone, Default)]
pub struct MigrationSet {
  migrations: Vec<Migration>,
}

impl MigrationSet {
  /// Read every `.sql` file in `dir`. Other files are ignored.
  pub fn load(dir: impl AsRef<Path>) -> Result<Self, MigrationError> {
    let dir = dir.as_ref();
    let io_err = |source| MigrationError::Io { path: dir.to_path_buf(), source };

    let mut migrations = vec![];
    for entry in fs::read_dir(dir).map_err(io_err)? {
      let path: PathBuf = entry.map_err(io_err)?.path();
      if path.extension().and_then(|e| e.to_str()) != Some("sql") {
        continue;
      }
      let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| MigrationError::BadFileName(path.display().to_string()))?;
      let (version, name) = parse_stem(stem)
        .ok_or_else(|| MigrationError::BadFileName(path.display().to_string()))?;
      let sql = fs::read_to_string(&path).map_err(|source| MigrationError::Io {
        path: path.clone(),
        source,
      })?;
      migrations.push(Migration { version: version.to_owned(), name: name.to_owned(), sql });
    }

    Self::new(migrations)
  }

  /// Order by version and reject duplicates.
  pub fn new(mut migrations: Vec<Migration>) -> Result<Self, MigrationError> {
    migrations.sort_by(|a, b| a.version.cmp(&b.version));
    if let Some(dup) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
      return Err(MigrationError::DuplicateVersion(dup[0].version.clone()));
    }
    Ok(Self { migrations })
  }

  pub fn migrations(&self) -> &[Migration] { &self.migrations }

  /// Scripts whose version is not in `applied`, in version order.
  pub fn pending<'a>(&'a self, applied: &BTreeSet<String>) -> Vec<&'a Migration> {
    self
      .migrations
      .iter()
      .filter(|m| !applied.contains(&m.version))
      .collect()
  }
}

/// Split `20240105090000_initial_schema` into version and name.
fn parse_stem(stem: &str) -> Option<(&str, &str)> {
  let (version, name) = stem.split_once('_')?;
  let valid = !version.is_empty()
    && version.bytes().all(|b| b.is_ascii_digit())
    && !name.is_empty();
  valid.then_some((version, name))
}

pub(crate) fn applied_versions(conn: &Connection) -> rusqlite::Result<BTreeSet<String>> {
  conn.execute_batch(LEDGER_DDL)?;
  let mut stmt = conn.prepare("SELECT version FROM schema_migrations")?;
  let versions = stmt
    .query_map([], |row| row.get::<_, String>(0))?
    .collect::<rusqlite::Result<BTreeSet<_>>>()?;
  Ok(versions)
}

/// Apply every script in `set` that the ledger has not recorded.
///
/// Returns the newly applied migrations. Running it again with no new
/// scripts changes nothing and returns an empty list.
pub fn apply_pending(
  conn: &mut Connection,
  set: &MigrationSet,
) -> Result<Vec<SchemaMigration>, MigrationError> {
  let applied = applied_versions(conn)?;

  let on_disk: BTreeSet<&str> = set.migrations().iter().map(|m| m.version.as_str()).collect();
  for version in applied.iter().filter(|v| !on_disk.contains(v.as_str())) {
    warn!(%version, "ledger records a migration with no script on disk");
  }

  let mut newly_applied = vec![];
  for migration in set.pending(&applied) {
    debug!(version = %migration.version, name = %migration.name, "applying migration");

    let tx = conn.transaction()?;
    tx.execute_batch(&migration.sql)
      .map_err(|source| MigrationError::Script {
        version: migration.version.clone(),
        name: migration.name.clone(),
        source,
      })?;

    let record = SchemaMigration {
      version:    migration.version.clone(),
      name:       migration.name.clone(),
      applied_at: Utc::now(),
    };
    tx.execute(
      "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
      rusqlite::params![record.version, record.name, encode_dt(record.applied_at)],
    )?;
    tx.commit()?;

    info!(version = %record.version, name = %record.name, "applied migration");
    newly_applied.push(record);
  }

  Ok(newly_applied)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stem_parsing() {
    assert_eq!(
      parse_stem("20240105090000_initial_schema"),
      Some(("20240105090000", "initial_schema"))
    );
    assert_eq!(parse_stem("0002_add_links_index"), Some(("0002", "add_links_index")));
    assert_eq!(parse_stem("initial_schema"), None);
    assert_eq!(parse_stem("0003_"), None);
    assert_eq!(parse_stem("0003"), None);
  }

  fn migration(version: &str, name: &str) -> Migration {
    Migration { version: version.into(), name: name.into(), sql: String::new() }
  }

  #[test]
  fn set_orders_by_version_string() {
    let set = MigrationSet::new(vec![
      migration("0010", "c"),
      migration("0002", "b"),
      migration("0001", "a"),
    ])
    .unwrap();
    let versions: Vec<_> = set.migrations().iter().map(|m| m.version.as_str()).collect();
    assert_eq!(versions, ["0001", "0002", "0010"]);
  }

  #[test]
  fn duplicate_versions_are_rejected() {
    let err = MigrationSet::new(vec![migration("0001", "a"), migration("0001", "b")])
      .unwrap_err();
    assert!(matches!(err, MigrationError::DuplicateVersion(v) if v == "0001"));
  }

  #[test]
  fn pending_skips_applied() {
    let set = MigrationSet::new(vec![migration("0001", "a"), migration("0002", "b")]).unwrap();
    let applied = BTreeSet::from(["0001".to_owned()]);
    let pending: Vec<_> = set.pending(&applied).iter().map(|m| m.name.as_str()).collect();
    assert_eq!(pending, ["b"]);
  }
}
