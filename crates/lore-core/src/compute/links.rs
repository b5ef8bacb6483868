//! Link scoring for derived character-to-character edges.
//!
//! Shared counts arrive already grouped by shared entity (one row per
//! co-occurring pair and entity kind), so only characters that actually
//! appear together are ever scored. [`PairTally`] folds those rows into one
//! [`SharedCounts`] per pair and [`LinkWeights`] turns each into a strength.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  entity::{CharacterLink, EntityKind, LINK_SOURCE_SYSTEM, LINK_TYPE_COMPUTED, SharedCounts},
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkWeights {
  pub timeline_events: f64,
  pub puzzles:         f64,
  pub elements:        f64,
}

impl Default for LinkWeights {
  fn default() -> Self {
    Self { timeline_events: 2.0, puzzles: 3.0, elements: 1.0 }
  }
}

impl LinkWeights {
  pub fn strength(&self, shared: &SharedCounts) -> f64 {
    self.timeline_events * f64::from(shared.timeline_events)
      + self.puzzles * f64::from(shared.puzzles)
      + self.elements * f64::from(shared.elements)
  }

  /// Weights must keep every strength non-negative.
  pub fn validate(&self) -> Result<()> {
    for (name, value) in [
      ("timeline_events", self.timeline_events),
      ("puzzles", self.puzzles),
      ("elements", self.elements),
    ] {
      if !value.is_finite() || value < 0.0 {
        return Err(Error::InvalidWeight { name, value });
      }
    }
    Ok(())
  }
}

/// Order a pair so that `a < b`. Returns `None` for a self-pair.
pub fn canonical_pair<'a>(x: &'a str, y: &'a str) -> Option<(&'a str, &'a str)> {
  match x.cmp(y) {
    std::cmp::Ordering::Less => Some((x, y)),
    std::cmp::Ordering::Greater => Some((y, x)),
    std::cmp::Ordering::Equal => None,
  }
}

/// Accumulates grouped co-occurrence counts per canonical pair.
#[derive(Debug, Default)]
pub struct PairTally {
  pairs: BTreeMap<(String, String), SharedCounts>,
}

impl PairTally {
  pub fn new() -> Self { Self::default() }

  /// Record that `x` and `y` share `count` entities of `kind`.
  pub fn add(&mut self, kind: EntityKind, x: &str, y: &str, count: u32) {
    let Some((a, b)) = canonical_pair(x, y) else {
      return;
    };
    let shared = self.pairs.entry((a.to_owned(), b.to_owned())).or_default();
    match kind {
      EntityKind::TimelineEvent => shared.timeline_events += count,
      EntityKind::Puzzle => shared.puzzles += count,
      EntityKind::Element => shared.elements += count,
      EntityKind::Character => {}
    }
  }

  pub fn len(&self) -> usize { self.pairs.len() }

  pub fn is_empty(&self) -> bool { self.pairs.is_empty() }

  /// Score every pair, keeping only positive strengths. Output is ordered by
  /// `(character_a_id, character_b_id)`.
  pub fn into_links(self, weights: &LinkWeights) -> Vec<CharacterLink> {
    self
      .pairs
      .into_iter()
      .filter_map(|((a, b), shared)| {
        let link_strength = weights.strength(&shared);
        (link_strength > 0.0).then(|| CharacterLink {
          character_a_id: a,
          character_b_id: b,
          link_type: LINK_TYPE_COMPUTED.to_owned(),
          link_source_id: LINK_SOURCE_SYSTEM.to_owned(),
          link_strength,
          shared,
        })
      })
      .collect()
  }
}
