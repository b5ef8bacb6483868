//! Economic valuation of elements.
//!
//! `calculated_memory_value = base_value(tier) * multiplier(category)`. Both
//! tables are configuration. When the source does not state a tier or
//! category they are inferred, in this order:
//!
//! - tier: explicit → keyword rule → `T<n>` tag marker → default tier
//! - category: explicit → keyword rule (Technical, Business, Personal) →
//!   Personal
//!
//! Keyword inference always outranks the tag marker.

use serde::{Deserialize, Serialize};

use super::{
  Derived,
  rules::{KeywordRule, RuleTable},
};
use crate::{
  Error, Result,
  entity::{Category, ElementSource, Provenance, Valuation},
};

/// One row of the base-value table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierValue {
  pub tier:  u8,
  pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryMultipliers {
  pub personal:  f64,
  pub business:  f64,
  pub technical: f64,
}

impl Default for CategoryMultipliers {
  fn default() -> Self {
    Self { personal: 1.0, business: 3.0, technical: 5.0 }
  }
}

impl CategoryMultipliers {
  pub fn get(&self, category: Category) -> f64 {
    match category {
      Category::Personal => self.personal,
      Category::Business => self.business,
      Category::Technical => self.technical,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuationConfig {
  pub base_values:    Vec<TierValue>,
  pub multipliers:    CategoryMultipliers,
  pub category_rules: RuleTable<Category>,
  /// Highest tier first; the first match wins.
  pub tier_rules:     RuleTable<u8>,
  pub default_tier:   u8,
}

impl Default for ValuationConfig {
  fn default() -> Self {
    Self {
      base_values:    [(1, 100.0), (2, 500.0), (3, 1000.0), (4, 5000.0), (5, 10000.0)]
        .into_iter()
        .map(|(tier, value)| TierValue { tier, value })
        .collect(),
      multipliers:    CategoryMultipliers::default(),
      category_rules: RuleTable::new(vec![
        KeywordRule::new(Category::Technical, &[
          "technical", "prototype", "algorithm", "source code", "schematic",
          "patent", "formula", "research", "lab", "server", "neural",
        ]),
        KeywordRule::new(Category::Business, &[
          "business", "contract", "deal", "investor", "funding", "ledger",
          "merger", "acquisition", "shares", "company", "invoice",
        ]),
        KeywordRule::new(Category::Personal, &[
          "personal", "diary", "letter", "photo", "family", "love",
          "childhood", "friendship", "wedding",
        ]),
      ]),
      tier_rules:     RuleTable::new(vec![
        KeywordRule::new(5, &["legendary", "priceless", "irreplaceable"]),
        KeywordRule::new(4, &["rare", "valuable", "classified"]),
        KeywordRule::new(3, &["important", "significant", "confidential"]),
        KeywordRule::new(2, &["minor", "common", "everyday"]),
      ]),
      default_tier:   1,
    }
  }
}

impl ValuationConfig {
  /// Replace the base-value table.
  pub fn with_base_values(mut self, values: impl IntoIterator<Item = (u8, f64)>) -> Self {
    self.base_values = values
      .into_iter()
      .map(|(tier, value)| TierValue { tier, value })
      .collect();
    self
  }

  pub fn with_multipliers(mut self, multipliers: CategoryMultipliers) -> Self {
    self.multipliers = multipliers;
    self
  }

  /// Every tier the tables can produce must fit the 1..=5 scale.
  pub fn validate(&self) -> Result<()> {
    let tiers = self
      .base_values
      .iter()
      .map(|row| row.tier)
      .chain(self.tier_rules.rules().iter().map(|rule| rule.result))
      .chain([self.default_tier]);
    for tier in tiers {
      if !(1..=5).contains(&tier) {
        return Err(Error::TierOutOfRange(tier.to_string()));
      }
    }
    Ok(())
  }

  pub fn base_value(&self, tier: u8) -> Result<f64> {
    self
      .base_values
      .iter()
      .find(|row| row.tier == tier)
      .map(|row| row.value)
      .ok_or(Error::UnknownTier(tier))
  }

  pub fn memory_value(&self, tier: u8, category: Category) -> Result<f64> {
    Ok(self.base_value(tier)? * self.multipliers.get(category))
  }

  pub fn infer_category(&self, element: &ElementSource) -> (Category, Provenance) {
    if let Some(category) = element.declared_category {
      return (category, Provenance::Explicit);
    }
    match self.category_rules.first_match(&element.free_text()) {
      Some(category) => (*category, Provenance::Keyword),
      None => (Category::Personal, Provenance::Default),
    }
  }

  pub fn infer_tier(&self, element: &ElementSource) -> (u8, Provenance) {
    if let Some(tier) = element.declared_tier {
      return (tier, Provenance::Explicit);
    }
    if let Some(tier) = self.tier_rules.first_match(&element.free_text()) {
      return (*tier, Provenance::Keyword);
    }
    if let Some(tier) = element.rfid_tag.as_deref().and_then(tag_marker_tier) {
      return (tier, Provenance::TagMarker);
    }
    (self.default_tier, Provenance::Default)
  }

  /// Appraise one element. An unknown tier leaves the value unset and is
  /// reported as an issue rather than an error.
  pub fn appraise(&self, element: &ElementSource) -> Derived<Valuation> {
    let (quality_tier, tier_provenance) = self.infer_tier(element);
    let (category, category_provenance) = self.infer_category(element);

    let mut issues = vec![];
    let calculated_memory_value = match self.memory_value(quality_tier, category) {
      Ok(value) => Some(value),
      Err(e) => {
        issues.push(e);
        None
      }
    };

    Derived {
      value: Valuation {
        quality_tier,
        tier_provenance,
        category,
        category_provenance,
        calculated_memory_value,
      },
      issues,
    }
  }
}

/// Extract a `T<n>` tier marker (n in 1..=5) from a physical tag id such as
/// `"MEM-T4-017"`. Tokens are split on `-`, `_`, and whitespace.
pub fn tag_marker_tier(tag: &str) -> Option<u8> {
  tag
    .split(|c: char| c == '-' || c == '_' || c.is_whitespace())
    .find_map(|token| {
      let digits = token.strip_prefix(['T', 't'])?;
      match digits.parse::<u8>() {
        Ok(t @ 1..=5) if digits.len() == 1 => Some(t),
        _ => None,
      }
    })
}
