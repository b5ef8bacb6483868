//! Resolution-path inference and bucket aggregation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::rules::{KeywordRule, RuleTable};

/// Synthetic bucket for entities with no assigned path.
pub const UNASSIGNED: &str = "Unassigned";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
  pub rules: RuleTable<String>,
}

impl Default for PathConfig {
  fn default() -> Self {
    Self {
      rules: RuleTable::new(vec![
        KeywordRule::new("Black Market".to_owned(), &[
          "black market", "memory token", "fence", "sell", "auction",
        ]),
        KeywordRule::new("Detective".to_owned(), &[
          "detective", "evidence", "clue", "investigation", "alibi",
        ]),
        KeywordRule::new("Third Path".to_owned(), &[
          "third path", "community", "restore", "return", "forgive",
        ]),
      ]),
    }
  }
}

impl PathConfig {
  /// Declared paths win outright; otherwise every rule matching `text`
  /// contributes its path.
  pub fn infer(&self, declared: &[String], text: &str) -> Vec<String> {
    if !declared.is_empty() {
      return normalize(declared.iter().cloned());
    }
    normalize(self.rules.all_matches(text).into_iter().cloned())
  }
}

/// Trim, drop blanks, de-duplicate, and sort.
pub fn normalize(paths: impl IntoIterator<Item = String>) -> Vec<String> {
  paths
    .into_iter()
    .map(|p| p.trim().to_owned())
    .filter(|p| !p.is_empty())
    .collect::<BTreeSet<_>>()
    .into_iter()
    .collect()
}

/// Count entities per path bucket.
///
/// An entity with no paths lands once in [`UNASSIGNED`]; an entity with N
/// paths counts once in each of them, so the bucket total may exceed the
/// entity count.
pub fn bucket_counts<'a, I>(memberships: I) -> BTreeMap<String, usize>
where
  I: IntoIterator<Item = &'a [String]>,
{
  let mut buckets: BTreeMap<String, usize> = BTreeMap::new();
  for paths in memberships {
    if paths.is_empty() {
      *buckets.entry(UNASSIGNED.to_owned()).or_default() += 1;
      continue;
    }
    let distinct: BTreeSet<&String> = paths.iter().collect();
    for path in distinct {
      *buckets.entry(path.clone()).or_default() += 1;
    }
  }
  buckets
}

/// Bucket counts for each entity kind that carries resolution paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathSummary {
  pub characters: BTreeMap<String, usize>,
  pub elements:   BTreeMap<String, usize>,
  pub puzzles:    BTreeMap<String, usize>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn paths(v: &[&str]) -> Vec<String> { v.iter().map(|s| s.to_string()).collect() }

  #[test]
  fn empty_membership_counts_as_unassigned_only() {
    let entities = [paths(&[])];
    let buckets = bucket_counts(entities.iter().map(Vec::as_slice));
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[UNASSIGNED], 1);
  }

  #[test]
  fn multi_membership_counts_in_each_bucket() {
    let entities = [paths(&["Detective", "Third Path"]), paths(&["Detective"])];
    let buckets = bucket_counts(entities.iter().map(Vec::as_slice));
    assert_eq!(buckets["Detective"], 2);
    assert_eq!(buckets["Third Path"], 1);
    assert!(!buckets.contains_key(UNASSIGNED));
    assert_eq!(buckets.values().sum::<usize>(), 3);
  }

  #[test]
  fn declared_paths_override_inference() {
    let config = PathConfig::default();
    let inferred = config.infer(&paths(&[" Third Path ", "Detective"]), "black market");
    assert_eq!(inferred, paths(&["Detective", "Third Path"]));
  }

  #[test]
  fn inference_collects_every_matching_path() {
    let config = PathConfig::default();
    let inferred = config.infer(&[], "Evidence that was sold on the black market");
    assert_eq!(inferred, paths(&["Black Market", "Detective"]));
  }

  #[test]
  fn nothing_matching_yields_no_paths() {
    assert!(PathConfig::default().infer(&[], "an umbrella").is_empty());
  }
}
