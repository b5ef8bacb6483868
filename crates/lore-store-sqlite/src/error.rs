//! Error types for `lore-store-sqlite`.

use std::path::PathBuf;

use thiserror::Error;

/// A schema migration failed. Always fatal to startup.
#[derive(Debug, Error)]
pub enum MigrationError {
  #[error("cannot read migrations directory {path:?}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("migration file {0:?} is not named <version>_<name>.sql")]
  BadFileName(String),

  #[error("migration version {0} appears more than once")]
  DuplicateVersion(String),

  /// The script errored; its transaction was rolled back and no ledger row
  /// was written.
  #[error("migration {version}_{name} failed: {source}")]
  Script {
    version: String,
    name:    String,
    #[source]
    source:  rusqlite::Error,
  },

  #[error("migration ledger error: {0}")]
  Ledger(#[from] rusqlite::Error),
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("migration error: {0}")]
  Migration(#[from] MigrationError),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("cannot decode column value: {0}")]
  Decode(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
