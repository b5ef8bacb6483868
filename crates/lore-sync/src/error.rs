//! Error types for `lore-sync`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors fatal to a pipeline run or to startup.
///
/// Per-record and per-entity-type failures never surface here; they are
/// recorded in the sync log instead.
#[derive(Debug, Error)]
pub enum Error {
  #[error("store error: {0}")]
  Store(#[from] lore_store_sqlite::Error),

  /// The CharacterLink rebuild transaction failed; the previous edge set is
  /// still in place.
  #[error("relationship rebuild failed: {0}")]
  Relationship(#[source] lore_store_sqlite::Error),

  #[error("configuration error: {0}")]
  Config(#[from] config::ConfigError),

  #[error("invalid configuration: {0}")]
  InvalidConfig(#[source] lore_core::Error),

  #[error("source error: {0}")]
  Source(#[from] SourceError),
}

/// Failures listing records from an upstream source.
#[derive(Debug, Error)]
pub enum SourceError {
  #[error("cannot read snapshot {path:?}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("snapshot {path:?} is not valid: {source}")]
  Snapshot {
    path:   PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("{url} returned {status}")]
  Status {
    url:    String,
    status: reqwest::StatusCode,
  },

  #[error("source unavailable: {0}")]
  Unavailable(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
