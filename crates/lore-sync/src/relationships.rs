//! The relationship synchronizer: rebuilds CharacterLink after the barrier.

use lore_core::{
  compute::links::LinkWeights,
  entity::{CharacterLink, EntityKind},
};
use lore_store_sqlite::SqliteStore;
use tracing::{info, warn};

use crate::{Error, Result};

pub struct RelationshipSynchronizer<'a> {
  store:   &'a SqliteStore,
  weights: LinkWeights,
}

impl<'a> RelationshipSynchronizer<'a> {
  pub fn new(store: &'a SqliteStore, weights: LinkWeights) -> Self { Self { store, weights } }

  /// Rebuild every link from the current entity tables.
  ///
  /// `incomplete` names kinds whose synchronizer did not fully succeed this
  /// run; the rebuild still proceeds but their sharing counts may be stale
  /// or missing. A failure here is fatal and leaves the previous edge set in
  /// place.
  pub async fn rebuild(&self, incomplete: &[EntityKind]) -> Result<Vec<CharacterLink>> {
    for kind in incomplete {
      warn!(%kind, "rebuilding links with incomplete input");
    }

    let links = self
      .store
      .rebuild_links(self.weights)
      .await
      .map_err(Error::Relationship)?;

    info!(links = links.len(), "rebuilt character links");
    Ok(links)
  }
}
