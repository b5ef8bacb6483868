//! Concrete [`Source`] implementations.
//!
//! [`ConfiguredSource`] is what the binary builds from `lore.toml`;
//! [`MemorySource`] backs tests and embedding callers.

mod http;
mod memory;
mod snapshot;

pub use http::HttpSource;
pub use memory::MemorySource;
pub use snapshot::{Snapshot, SnapshotSource};

use lore_core::{
  entity::EntityKind,
  source::{Source, SourceRecord},
};

use crate::{config::SourceConfig, error::SourceError};

/// The source selected by configuration.
pub enum ConfiguredSource {
  Snapshot(SnapshotSource),
  Http(HttpSource),
}

impl ConfiguredSource {
  pub fn from_config(config: &SourceConfig) -> Result<Self, SourceError> {
    Ok(match config {
      SourceConfig::Snapshot { path } => Self::Snapshot(SnapshotSource::new(path)),
      SourceConfig::Http { base_url, token, page_size } => {
        Self::Http(HttpSource::new(base_url, token.clone(), *page_size)?)
      }
    })
  }
}

impl Source for ConfiguredSource {
  type Error = SourceError;

  async fn list(&self, kind: EntityKind) -> Result<Vec<SourceRecord>, SourceError> {
    match self {
      Self::Snapshot(s) => s.list(kind).await,
      Self::Http(s) => s.list(kind).await,
    }
  }
}
