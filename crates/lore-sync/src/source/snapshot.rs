//! A source backed by a JSON export of the authoring store.

use std::path::{Path, PathBuf};

use lore_core::{
  entity::EntityKind,
  source::{Source, SourceRecord},
};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// On-disk layout of a snapshot file. Missing kinds are empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
  pub characters:      Vec<SourceRecord>,
  pub elements:        Vec<SourceRecord>,
  pub puzzles:         Vec<SourceRecord>,
  pub timeline_events: Vec<SourceRecord>,
}

impl Snapshot {
  pub fn take(self, kind: EntityKind) -> Vec<SourceRecord> {
    match kind {
      EntityKind::Character => self.characters,
      EntityKind::Element => self.elements,
      EntityKind::Puzzle => self.puzzles,
      EntityKind::TimelineEvent => self.timeline_events,
    }
  }
}

/// Re-reads the file on every listing so a long-lived process picks up new
/// exports.
pub struct SnapshotSource {
  path: PathBuf,
}

impl SnapshotSource {
  pub fn new(path: impl AsRef<Path>) -> Self { Self { path: path.as_ref().to_path_buf() } }
}

impl Source for SnapshotSource {
  type Error = SourceError;

  async fn list(&self, kind: EntityKind) -> Result<Vec<SourceRecord>, SourceError> {
    let bytes = tokio::fs::read(&self.path).await.map_err(|source| SourceError::Io {
      path: self.path.clone(),
      source,
    })?;
    let snapshot: Snapshot =
      serde_json::from_slice(&bytes).map_err(|source| SourceError::Snapshot {
        path: self.path.clone(),
        source,
      })?;
    Ok(snapshot.take(kind))
  }
}
