//! Upstream property names → internal entity fields.
//!
//! Each `*Source` type implements `TryFrom<&SourceRecord>`. A failure here
//! is a per-record mapping error: the synchronizer skips the record and
//! counts it, the rest of the batch proceeds.

use std::str::FromStr;

use tracing::warn;

use crate::{
  Error, Result,
  entity::{
    Category, CharacterSource, ElementSource, PuzzleSource, TimelineEventSource,
  },
  source::{PropertyValue, SourceRecord},
};

/// External property names, per entity kind.
pub mod props {
  pub mod character {
    pub const NAME: &str = "Name";
    pub const TIER: &str = "Tier";
    pub const TYPE: &str = "Type";
    pub const LOGLINE: &str = "Character Logline";
  }

  pub mod element {
    pub const NAME: &str = "Name";
    pub const BASIC_TYPE: &str = "Basic Type";
    pub const STATUS: &str = "Status";
    pub const OWNER: &str = "Owner";
    pub const ASSOCIATED_CHARACTERS: &str = "Associated Characters";
    pub const CONTAINER: &str = "Container";
    pub const TIMELINE_EVENT: &str = "Timeline Event";
    pub const DESCRIPTION: &str = "Description/Text";
    pub const NOTES: &str = "Notes";
    pub const RFID_TAG: &str = "RFID Tag";
    pub const FIRST_AVAILABLE: &str = "First Available";
    pub const QUALITY_TIER: &str = "Quality Tier";
    pub const MEMORY_TYPE: &str = "Memory Type";
    pub const RESOLUTION_PATHS: &str = "Resolution Paths";
  }

  pub mod puzzle {
    pub const NAME: &str = "Puzzle";
    pub const DESCRIPTION: &str = "Description/Solution";
    pub const REQUIRED_ELEMENTS: &str = "Puzzle Elements";
    pub const REWARDS: &str = "Rewards";
    pub const PREREQUISITES: &str = "Prerequisites";
    pub const UNLOCKS: &str = "Unlocks";
    pub const OWNER: &str = "Owner";
    pub const CHARACTERS: &str = "Characters";
    pub const RESOLUTION_PATHS: &str = "Resolution Paths";
  }

  pub mod timeline_event {
    pub const DESCRIPTION: &str = "Description";
    pub const DATE: &str = "Date";
    pub const CHARACTERS: &str = "Characters Involved";
    pub const ELEMENTS: &str = "Memory/Evidence";
  }
}

fn record_id(record: &SourceRecord) -> Result<String> {
  let id = record.id.trim();
  if id.is_empty() {
    return Err(Error::MissingId);
  }
  Ok(id.to_owned())
}

fn owned(value: Option<&str>) -> Option<String> { value.map(str::to_owned) }

/// Parse an explicit quality tier: a number, or a select such as `"Tier 3"`.
pub fn parse_tier(value: &PropertyValue) -> Result<Option<u8>> {
  let raw = match value {
    PropertyValue::Empty => return Ok(None),
    PropertyValue::Number(n) => {
      if n.fract() == 0.0 && (1.0..=5.0).contains(n) {
        return Ok(Some(*n as u8));
      }
      return Err(Error::TierOutOfRange(n.to_string()));
    }
    PropertyValue::Text(s) | PropertyValue::Select(s) => s.trim(),
    other => {
      return Err(Error::PropertyType {
        property: props::element::QUALITY_TIER.to_owned(),
        expected: "number or select",
        found:    other.type_name(),
      });
    }
  };

  if raw.is_empty() {
    return Ok(None);
  }
  let digits = raw
    .get(..4)
    .filter(|p| p.eq_ignore_ascii_case("tier"))
    .map_or(raw, |_| raw[4..].trim());

  match digits.parse::<u8>() {
    Ok(t @ 1..=5) => Ok(Some(t)),
    _ => Err(Error::TierOutOfRange(raw.to_owned())),
  }
}

// ─── Characters ──────────────────────────────────────────────────────────────

impl TryFrom<&SourceRecord> for CharacterSource {
  type Error = Error;

  fn try_from(record: &SourceRecord) -> Result<Self> {
    use props::character::*;

    Ok(Self {
      id:      record_id(record)?,
      name:    record.require_text(NAME)?.to_owned(),
      tier:    owned(record.text(TIER)?),
      kind:    owned(record.text(TYPE)?),
      logline: owned(record.text(LOGLINE)?),
    })
  }
}

// ─── Elements ────────────────────────────────────────────────────────────────

impl TryFrom<&SourceRecord> for ElementSource {
  type Error = Error;

  fn try_from(record: &SourceRecord) -> Result<Self> {
    use props::element::*;

    let declared_tier = match record.property(QUALITY_TIER) {
      Some(value) => parse_tier(value)?,
      None => None,
    };
    let id = record_id(record)?;
    // An unrecognised label counts as not supplied, so inference takes over.
    let declared_category = record.text(MEMORY_TYPE)?.and_then(|label| {
      Category::from_str(label)
        .inspect_err(|_| {
          warn!(
            element_id = %id,
            memory_type = label,
            "unrecognised memory type, inferring category"
          );
        })
        .ok()
    });

    Ok(Self {
      id,
      name: record.require_text(NAME)?.to_owned(),
      basic_type: owned(record.text(BASIC_TYPE)?),
      status: owned(record.text(STATUS)?),
      owner_character_id: record.single_relation(OWNER)?,
      associated_character_ids: record.relation(ASSOCIATED_CHARACTERS)?,
      container_element_id: record.single_relation(CONTAINER)?,
      timeline_event_id: record.single_relation(TIMELINE_EVENT)?,
      description: owned(record.text(DESCRIPTION)?),
      notes: owned(record.text(NOTES)?),
      rfid_tag: owned(record.text(RFID_TAG)?),
      first_available: owned(record.text(FIRST_AVAILABLE)?),
      declared_tier,
      declared_category,
      declared_paths: record.multi_select(RESOLUTION_PATHS)?,
    })
  }
}

// ─── Puzzles ─────────────────────────────────────────────────────────────────

impl TryFrom<&SourceRecord> for PuzzleSource {
  type Error = Error;

  fn try_from(record: &SourceRecord) -> Result<Self> {
    use props::puzzle::*;

    // Owner and Characters both put a character on the puzzle.
    let mut character_ids = record.relation(OWNER)?;
    for id in record.relation(CHARACTERS)? {
      if !character_ids.contains(&id) {
        character_ids.push(id);
      }
    }

    Ok(Self {
      id: record_id(record)?,
      name: record.require_text(NAME)?.to_owned(),
      description: owned(record.text(DESCRIPTION)?),
      required_element_ids: record.relation(REQUIRED_ELEMENTS)?,
      reward_element_ids: record.relation(REWARDS)?,
      prerequisite_puzzle_ids: record.relation(PREREQUISITES)?,
      unlocks_puzzle_ids: record.relation(UNLOCKS)?,
      character_ids,
      declared_paths: record.multi_select(RESOLUTION_PATHS)?,
    })
  }
}

// ─── Timeline ────────────────────────────────────────────────────────────────

impl TryFrom<&SourceRecord> for TimelineEventSource {
  type Error = Error;

  fn try_from(record: &SourceRecord) -> Result<Self> {
    use props::timeline_event::*;

    Ok(Self {
      id:            record_id(record)?,
      description:   record.require_text(DESCRIPTION)?.to_owned(),
      date:          owned(record.text(DATE)?),
      character_ids: record.relation(CHARACTERS)?,
      element_ids:   record.relation(ELEMENTS)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::source::PropertyValue::{MultiSelect, Number, Relation, Select, Text};

  #[test]
  fn maps_element_with_relations_and_declared_fields() {
    let record = SourceRecord::new("el-1")
      .with("Name", Text("Company ledger".into()))
      .with("Owner", Relation(vec!["char-1".into(), "char-9".into()]))
      .with("Associated Characters", Relation(vec!["char-2".into()]))
      .with("Timeline Event", Relation(vec!["ev-1".into()]))
      .with("First Available", Select("Act 1".into()))
      .with("Quality Tier", Select("Tier 4".into()))
      .with("Memory Type", Select("business".into()))
      .with("Resolution Paths", MultiSelect(vec!["Detective".into()]));

    let el = ElementSource::try_from(&record).unwrap();
    assert_eq!(el.owner_character_id.as_deref(), Some("char-1"));
    assert_eq!(el.associated_character_ids, vec!["char-2"]);
    assert_eq!(el.timeline_event_id.as_deref(), Some("ev-1"));
    assert_eq!(el.first_available.as_deref(), Some("Act 1"));
    assert_eq!(el.declared_tier, Some(4));
    assert_eq!(el.declared_category, Some(Category::Business));
    assert_eq!(el.declared_paths, vec!["Detective"]);
  }

  #[test]
  fn element_without_name_fails_to_map() {
    let record = SourceRecord::new("el-2");
    assert!(matches!(
      ElementSource::try_from(&record),
      Err(Error::MissingProperty("Name"))
    ));
  }

  #[test]
  fn blank_id_fails_to_map() {
    let record = SourceRecord::new("  ").with("Name", Text("Alex".into()));
    assert!(matches!(
      CharacterSource::try_from(&record),
      Err(Error::MissingId)
    ));
  }

  #[test]
  fn unknown_memory_type_is_treated_as_undeclared() {
    let record = SourceRecord::new("el-3")
      .with("Name", Text("Napkin".into()))
      .with("Memory Type", Select("Emotional".into()))
      .with("First Available", Select("Act 2".into()));
    let el = ElementSource::try_from(&record).unwrap();
    assert_eq!(el.declared_category, None);
    assert_eq!(el.first_available.as_deref(), Some("Act 2"));
  }

  #[test]
  fn puzzle_unions_owner_and_characters() {
    let record = SourceRecord::new("pz-1")
      .with("Puzzle", Text("Safe combination".into()))
      .with("Owner", Relation(vec!["a".into()]))
      .with("Characters", Relation(vec!["b".into(), "a".into()]))
      .with("Rewards", Relation(vec!["el-1".into()]));
    let pz = PuzzleSource::try_from(&record).unwrap();
    assert_eq!(pz.character_ids, vec!["a", "b"]);
    assert_eq!(pz.reward_element_ids, vec!["el-1"]);
  }

  #[test]
  fn tier_parsing() {
    assert_eq!(parse_tier(&Number(3.0)).unwrap(), Some(3));
    assert_eq!(parse_tier(&Select("tier 5".into())).unwrap(), Some(5));
    assert_eq!(parse_tier(&Text("2".into())).unwrap(), Some(2));
    assert_eq!(parse_tier(&PropertyValue::Empty).unwrap(), None);
    assert!(parse_tier(&Number(7.0)).is_err());
    assert!(parse_tier(&Number(2.5)).is_err());
    assert!(parse_tier(&Select("Tier X".into())).is_err());
  }
}
