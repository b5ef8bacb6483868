//! Ordered keyword rule tables.
//!
//! A [`RuleTable`] is a list of `(keywords → result)` rules evaluated in
//! order. Category and tier inference take the first match; resolution-path
//! inference collects every match.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRule<T> {
  pub result:   T,
  /// Matched case-insensitively on word boundaries.
  pub keywords: Vec<String>,
}

impl<T> KeywordRule<T> {
  pub fn new(result: T, keywords: &[&str]) -> Self {
    Self {
      result,
      keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
    }
  }

  /// `haystack` must already be lowercased.
  fn matches(&self, haystack: &str) -> bool {
    self
      .keywords
      .iter()
      .any(|k| contains_word(haystack, &k.to_lowercase()))
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleTable<T>(Vec<KeywordRule<T>>);

impl<T> RuleTable<T> {
  pub fn new(rules: Vec<KeywordRule<T>>) -> Self { Self(rules) }

  pub fn rules(&self) -> &[KeywordRule<T>] { &self.0 }

  /// Result of the first rule with a keyword present in `text`.
  pub fn first_match(&self, text: &str) -> Option<&T> {
    let haystack = text.to_lowercase();
    self.0.iter().find(|r| r.matches(&haystack)).map(|r| &r.result)
  }

  /// Results of every matching rule, in table order.
  pub fn all_matches(&self, text: &str) -> Vec<&T> {
    let haystack = text.to_lowercase();
    self
      .0
      .iter()
      .filter(|r| r.matches(&haystack))
      .map(|r| &r.result)
      .collect()
  }
}

/// `true` if `needle` occurs in `haystack` with no alphanumeric character
/// directly on either side.
pub fn contains_word(haystack: &str, needle: &str) -> bool {
  if needle.is_empty() {
    return false;
  }
  haystack.match_indices(needle).any(|(start, _)| {
    let end = start + needle.len();
    let before = haystack[..start].chars().next_back();
    let after = haystack[end..].chars().next();
    !before.is_some_and(char::is_alphanumeric)
      && !after.is_some_and(char::is_alphanumeric)
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, Clone, Copy, PartialEq)]
  enum Colour {
    Red,
    Blue,
  }

  fn table() -> RuleTable<Colour> {
    RuleTable::new(vec![
      KeywordRule::new(Colour::Red, &["ruby", "crimson"]),
      KeywordRule::new(Colour::Blue, &["sapphire", "ruby"]),
    ])
  }

  #[test]
  fn first_match_respects_table_order() {
    assert_eq!(table().first_match("A RUBY ring"), Some(&Colour::Red));
    assert_eq!(table().first_match("a sapphire"), Some(&Colour::Blue));
    assert_eq!(table().first_match("plain glass"), None);
  }

  #[test]
  fn all_matches_collects_every_rule() {
    assert_eq!(table().all_matches("ruby"), vec![&Colour::Red, &Colour::Blue]);
  }

  #[test]
  fn keywords_match_on_word_boundaries() {
    assert!(contains_word("the lab report", "lab"));
    assert!(!contains_word("a label maker", "lab"));
    assert!(contains_word("memory token.", "memory token"));
    assert!(!contains_word("anything", ""));
  }
}
