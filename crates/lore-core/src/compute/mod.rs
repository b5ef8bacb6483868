//! The computed-field engine.
//!
//! Pure functions over synchronized source rows. Nothing here performs I/O,
//! and no computed value is ever an input to another computation: every
//! derivation starts from `*Source` fields.

pub mod act;
pub mod links;
pub mod paths;
pub mod rules;
pub mod valuation;

use serde::{Deserialize, Serialize};

use crate::{
  Error,
  entity::{
    Character, CharacterSource, Element, ElementSource, Puzzle, PuzzleSource,
    TimelineEvent, TimelineEventSource,
  },
};

use paths::PathConfig;
use valuation::ValuationConfig;

/// A computed value together with the field-level failures hit while
/// deriving it. Issues never abort the owning record.
#[derive(Debug)]
pub struct Derived<T> {
  pub value:  T,
  pub issues: Vec<Error>,
}

/// Bundles the configuration every derivation needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputeEngine {
  #[serde(default)]
  pub valuation: ValuationConfig,
  #[serde(default)]
  pub paths:     PathConfig,
}

impl ComputeEngine {
  pub fn new(valuation: ValuationConfig, paths: PathConfig) -> Self {
    Self { valuation, paths }
  }

  /// Resolution paths for an element, from its own source fields.
  pub fn element_paths(&self, element: &ElementSource) -> Vec<String> {
    self.paths.infer(&element.declared_paths, &element.free_text())
  }

  /// Valuation and resolution paths computed inline during element sync.
  pub fn element(&self, source: ElementSource) -> Derived<Element> {
    let Derived { value: valuation, issues } = self.valuation.appraise(&source);
    let resolution_paths = self.element_paths(&source);
    Derived {
      value: Element { source, valuation, resolution_paths },
      issues,
    }
  }

  /// `holdings` are the elements the character owns or is associated with.
  ///
  /// Unvaluable elements contribute nothing; their issue was already
  /// reported when the element itself was synchronized.
  pub fn character(&self, source: CharacterSource, holdings: &[&ElementSource]) -> Character {
    let memory_value = holdings
      .iter()
      .filter_map(|e| self.valuation.appraise(e).value.calculated_memory_value)
      .sum();

    let own_text = [Some(source.name.as_str()), source.logline.as_deref()]
      .into_iter()
      .flatten()
      .collect::<Vec<_>>()
      .join("\n");
    let resolution_paths = paths::normalize(
      self
        .paths
        .infer(&[], &own_text)
        .into_iter()
        .chain(holdings.iter().flat_map(|e| self.element_paths(e))),
    );

    Character { source, resolution_paths, memory_value }
  }

  /// A puzzle's own paths plus the paths of the elements it rewards.
  pub fn puzzle(&self, source: PuzzleSource, rewards: &[&ElementSource]) -> Puzzle {
    let own_text = [Some(source.name.as_str()), source.description.as_deref()]
      .into_iter()
      .flatten()
      .collect::<Vec<_>>()
      .join("\n");
    let resolution_paths = paths::normalize(
      self
        .paths
        .infer(&source.declared_paths, &own_text)
        .into_iter()
        .chain(rewards.iter().flat_map(|e| self.element_paths(e))),
    );
    Puzzle { source, resolution_paths }
  }

  /// `elements` are the event's elements that are currently synchronized.
  pub fn timeline_event(
    &self,
    source: TimelineEventSource,
    elements: &[&ElementSource],
  ) -> TimelineEvent {
    let act_focus = act::act_focus(elements.iter().map(|e| e.first_available.as_deref()));
    TimelineEvent { source, act_focus }
  }
}
