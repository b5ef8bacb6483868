//! The upstream record model and the [`Source`] trait.
//!
//! The core only needs one capability from the authoring store: "list every
//! record of kind K with its typed properties and relation fields". Transport,
//! pagination, and query language belong to the implementation.

use std::{collections::BTreeMap, future::Future};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, entity::EntityKind};

// ─── Property values ─────────────────────────────────────────────────────────

/// A single typed property on an upstream record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
  Text(String),
  Number(f64),
  Select(String),
  MultiSelect(Vec<String>),
  /// External ids of related records.
  Relation(Vec<String>),
  Empty,
}

impl PropertyValue {
  pub fn type_name(&self) -> &'static str {
    match self {
      Self::Text(_) => "text",
      Self::Number(_) => "number",
      Self::Select(_) => "select",
      Self::MultiSelect(_) => "multi_select",
      Self::Relation(_) => "relation",
      Self::Empty => "empty",
    }
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// One record as listed by the upstream store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
  pub id:         String,
  #[serde(default)]
  pub properties: BTreeMap<String, PropertyValue>,
}

impl SourceRecord {
  pub fn new(id: impl Into<String>) -> Self {
    Self { id: id.into(), properties: BTreeMap::new() }
  }

  /// Builder-style property setter.
  pub fn with(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
    self.properties.insert(name.into(), value);
    self
  }

  pub fn property(&self, name: &str) -> Option<&PropertyValue> {
    self.properties.get(name)
  }

  /// Text or select value; blank strings read as absent.
  pub fn text(&self, name: &str) -> Result<Option<&str>> {
    match self.property(name) {
      None | Some(PropertyValue::Empty) => Ok(None),
      Some(PropertyValue::Text(s) | PropertyValue::Select(s)) => {
        let s = s.trim();
        Ok((!s.is_empty()).then_some(s))
      }
      Some(other) => Err(type_error(name, "text", other)),
    }
  }

  pub fn require_text(&self, name: &'static str) -> Result<&str> {
    self.text(name)?.ok_or(Error::MissingProperty(name))
  }

  pub fn number(&self, name: &str) -> Result<Option<f64>> {
    match self.property(name) {
      None | Some(PropertyValue::Empty) => Ok(None),
      Some(PropertyValue::Number(n)) => Ok(Some(*n)),
      Some(other) => Err(type_error(name, "number", other)),
    }
  }

  /// Multi-select values; a single select is promoted to a one-element list.
  pub fn multi_select(&self, name: &str) -> Result<Vec<String>> {
    match self.property(name) {
      None | Some(PropertyValue::Empty) => Ok(vec![]),
      Some(PropertyValue::MultiSelect(v)) => Ok(clean(v)),
      Some(PropertyValue::Select(s)) => Ok(clean(std::slice::from_ref(s))),
      Some(other) => Err(type_error(name, "multi_select", other)),
    }
  }

  pub fn relation(&self, name: &str) -> Result<Vec<String>> {
    match self.property(name) {
      None | Some(PropertyValue::Empty) => Ok(vec![]),
      Some(PropertyValue::Relation(ids)) => Ok(clean(ids)),
      Some(other) => Err(type_error(name, "relation", other)),
    }
  }

  /// The first id of a relation used as a single foreign key.
  pub fn single_relation(&self, name: &str) -> Result<Option<String>> {
    Ok(self.relation(name)?.into_iter().next())
  }
}

fn type_error(name: &str, expected: &'static str, found: &PropertyValue) -> Error {
  Error::PropertyType {
    property: name.to_owned(),
    expected,
    found: found.type_name(),
  }
}

/// Trim, drop blanks, and de-duplicate while keeping first-seen order.
fn clean(values: &[String]) -> Vec<String> {
  let mut out: Vec<String> = Vec::with_capacity(values.len());
  for v in values {
    let v = v.trim();
    if !v.is_empty() && !out.iter().any(|o| o == v) {
      out.push(v.to_owned());
    }
  }
  out
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the upstream authoring store.
pub trait Source: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// List every record of `kind`.
  fn list(
    &self,
    kind: EntityKind,
  ) -> impl Future<Output = Result<Vec<SourceRecord>, Self::Error>> + Send + '_;
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record() -> SourceRecord {
    SourceRecord::new("rec-1")
      .with("Name", PropertyValue::Text("  Marcus Blackwood ".into()))
      .with("Blank", PropertyValue::Text("   ".into()))
      .with("Score", PropertyValue::Number(4.0))
      .with(
        "Owners",
        PropertyValue::Relation(vec!["c1".into(), " c2 ".into(), "c1".into()]),
      )
      .with("Path", PropertyValue::Select("Detective".into()))
  }

  #[test]
  fn text_trims_and_treats_blank_as_absent() {
    let r = record();
    assert_eq!(r.text("Name").unwrap(), Some("Marcus Blackwood"));
    assert_eq!(r.text("Blank").unwrap(), None);
    assert_eq!(r.text("Missing").unwrap(), None);
  }

  #[test]
  fn wrong_type_is_an_error() {
    let err = record().text("Score").unwrap_err();
    assert!(matches!(
      err,
      Error::PropertyType { expected: "text", found: "number", .. }
    ));
  }

  #[test]
  fn relation_is_cleaned_and_deduplicated() {
    let r = record();
    assert_eq!(r.relation("Owners").unwrap(), vec!["c1", "c2"]);
    assert_eq!(r.single_relation("Owners").unwrap().as_deref(), Some("c1"));
    assert!(r.relation("Missing").unwrap().is_empty());
  }

  #[test]
  fn single_select_promotes_to_multi() {
    assert_eq!(record().multi_select("Path").unwrap(), vec!["Detective"]);
  }

  #[test]
  fn require_text_reports_property_name() {
    let err = record().require_text("Description").unwrap_err();
    assert!(matches!(err, Error::MissingProperty("Description")));
  }

  #[test]
  fn records_deserialize_from_tagged_json() {
    let json = r#"{
      "id": "el-9",
      "properties": {
        "Name": { "type": "text", "value": "Burner phone" },
        "Owner": { "type": "relation", "value": ["char-2"] },
        "Quality Tier": { "type": "number", "value": 3 },
        "Notes": { "type": "empty" }
      }
    }"#;
    let r: SourceRecord = serde_json::from_str(json).unwrap();
    assert_eq!(r.id, "el-9");
    assert_eq!(r.number("Quality Tier").unwrap(), Some(3.0));
    assert_eq!(r.text("Notes").unwrap(), None);
  }
}
