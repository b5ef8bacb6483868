//! Entity types mirrored from the upstream narrative store.
//!
//! Every entity is split into a `*Source` half, which holds exactly what the
//! upstream store said, and the computed fields layered on top. Computed
//! fields are always re-derived from `*Source` values and never read back as
//! inputs.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

// ─── Kinds ───────────────────────────────────────────────────────────────────

/// The four entity types pulled from the upstream store.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
  Character,
  Element,
  Puzzle,
  TimelineEvent,
}

impl EntityKind {
  pub const ALL: [EntityKind; 4] = [
    EntityKind::Character,
    EntityKind::Element,
    EntityKind::Puzzle,
    EntityKind::TimelineEvent,
  ];
}

/// Narrative category of an element; drives the valuation multiplier.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Category {
  #[default]
  Personal,
  Business,
  Technical,
}

/// Where an element's tier or category came from.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Provenance {
  /// Supplied by the upstream record.
  Explicit,
  /// Matched by a keyword rule over the element's free text.
  Keyword,
  /// Parsed from a `T<n>` marker in the physical tag id.
  TagMarker,
  Default,
}

// ─── Characters ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSource {
  pub id:      String,
  pub name:    String,
  pub tier:    Option<String>,
  #[serde(rename = "type")]
  pub kind:    Option<String>,
  pub logline: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
  #[serde(flatten)]
  pub source:           CharacterSource,
  pub resolution_paths: Vec<String>,
  /// Sum of the valuations of every element the character owns or is
  /// associated with.
  pub memory_value:     f64,
}

// ─── Elements ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementSource {
  pub id:                       String,
  pub name:                     String,
  pub basic_type:               Option<String>,
  pub status:                   Option<String>,
  pub owner_character_id:       Option<String>,
  pub associated_character_ids: Vec<String>,
  pub container_element_id:     Option<String>,
  pub timeline_event_id:        Option<String>,
  pub description:              Option<String>,
  pub notes:                    Option<String>,
  /// Physical tag identifier; may embed a `T<n>` tier marker.
  pub rfid_tag:                 Option<String>,
  /// The act in which the element is introduced, e.g. `"Act 1"`.
  pub first_available:          Option<String>,
  pub declared_tier:            Option<u8>,
  pub declared_category:        Option<Category>,
  pub declared_paths:           Vec<String>,
}

impl ElementSource {
  /// Name, description, and notes joined for keyword inference.
  pub fn free_text(&self) -> String {
    [Some(self.name.as_str()), self.description.as_deref(), self.notes.as_deref()]
      .into_iter()
      .flatten()
      .collect::<Vec<_>>()
      .join("\n")
  }

  /// Every character that owns or is associated with this element, each once.
  pub fn holders(&self) -> BTreeSet<&str> {
    self
      .owner_character_id
      .iter()
      .chain(self.associated_character_ids.iter())
      .map(String::as_str)
      .collect()
  }
}

/// The economic appraisal of an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
  pub quality_tier:            u8,
  pub tier_provenance:         Provenance,
  pub category:                Category,
  pub category_provenance:     Provenance,
  /// `None` when the tier has no configured base value.
  pub calculated_memory_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
  #[serde(flatten)]
  pub source:           ElementSource,
  #[serde(flatten)]
  pub valuation:        Valuation,
  pub resolution_paths: Vec<String>,
}

// ─── Puzzles ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PuzzleSource {
  pub id:                      String,
  pub name:                    String,
  pub description:             Option<String>,
  pub required_element_ids:    Vec<String>,
  pub reward_element_ids:      Vec<String>,
  pub prerequisite_puzzle_ids: Vec<String>,
  pub unlocks_puzzle_ids:      Vec<String>,
  pub character_ids:           Vec<String>,
  pub declared_paths:          Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Puzzle {
  #[serde(flatten)]
  pub source:           PuzzleSource,
  pub resolution_paths: Vec<String>,
}

// ─── Timeline ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineEventSource {
  pub id:            String,
  pub description:   String,
  /// Free-text in-fiction date, stored verbatim.
  pub date:          Option<String>,
  pub character_ids: Vec<String>,
  pub element_ids:   Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
  #[serde(flatten)]
  pub source:    TimelineEventSource,
  pub act_focus: Option<String>,
}

// ─── Derived edges ───────────────────────────────────────────────────────────

pub const LINK_TYPE_COMPUTED: &str = "computed";
pub const LINK_SOURCE_SYSTEM: &str = "system";

/// How many entities of each kind two characters share.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedCounts {
  pub timeline_events: u32,
  pub puzzles:         u32,
  pub elements:        u32,
}

/// A derived character-to-character edge. `character_a_id < character_b_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterLink {
  pub character_a_id: String,
  pub character_b_id: String,
  pub link_type:      String,
  pub link_source_id: String,
  pub link_strength:  f64,
  pub shared:         SharedCounts,
}

impl CharacterLink {
  /// The endpoint opposite `character_id`, if the link touches it.
  pub fn other(&self, character_id: &str) -> Option<&str> {
    if self.character_a_id == character_id {
      Some(&self.character_b_id)
    } else if self.character_b_id == character_id {
      Some(&self.character_a_id)
    } else {
      None
    }
  }
}

/// A character together with every link incident to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterNode {
  pub character: Character,
  /// Strongest first.
  pub links:     Vec<CharacterLink>,
}

// ─── Migration ledger ────────────────────────────────────────────────────────

/// One applied schema-change script. Never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMigration {
  pub version:    String,
  pub name:       String,
  pub applied_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use super::*;

  #[test]
  fn entity_kind_strings_are_snake_case() {
    assert_eq!(EntityKind::TimelineEvent.as_ref(), "timeline_event");
    assert_eq!(
      EntityKind::from_str("timeline_event").unwrap(),
      EntityKind::TimelineEvent
    );
  }

  #[test]
  fn category_parses_case_insensitively() {
    assert_eq!(Category::from_str("technical").unwrap(), Category::Technical);
    assert_eq!(Category::from_str("BUSINESS").unwrap(), Category::Business);
    assert!(Category::from_str("Emotional").is_err());
  }

  #[test]
  fn holders_deduplicates_owner_and_associates() {
    let element = ElementSource {
      id: "e1".into(),
      name: "Locket".into(),
      owner_character_id: Some("alex".into()),
      associated_character_ids: vec!["alex".into(), "sarah".into()],
      ..Default::default()
    };
    assert_eq!(
      element.holders().into_iter().collect::<Vec<_>>(),
      vec!["alex", "sarah"]
    );
  }

  #[test]
  fn link_other_endpoint() {
    let link = CharacterLink {
      character_a_id: "a".into(),
      character_b_id: "b".into(),
      link_type:      LINK_TYPE_COMPUTED.into(),
      link_source_id: LINK_SOURCE_SYSTEM.into(),
      link_strength:  1.0,
      shared:         SharedCounts::default(),
    };
    assert_eq!(link.other("a"), Some("b"));
    assert_eq!(link.other("b"), Some("a"));
    assert_eq!(link.other("c"), None);
  }
}
