//! Act attribution for timeline events.

use std::collections::BTreeMap;

/// Majority act among an event's elements.
///
/// Counts each non-null `first_available` value. The act with the highest
/// count wins; ties go to the lexicographically smallest label. Returns
/// `None` when no element carries an act.
pub fn act_focus<'a, I>(acts: I) -> Option<String>
where
  I: IntoIterator<Item = Option<&'a str>>,
{
  let mut tally: BTreeMap<&str, usize> = BTreeMap::new();
  for act in acts.into_iter().flatten() {
    let act = act.trim();
    if !act.is_empty() {
      *tally.entry(act).or_default() += 1;
    }
  }

  // Ascending key order plus a strict comparison keeps the smallest label on
  // ties.
  let mut best: Option<(&str, usize)> = None;
  for (act, count) in tally {
    if best.is_none_or(|(_, top)| count > top) {
      best = Some((act, count));
    }
  }
  best.map(|(act, _)| act.to_owned())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn majority_wins() {
    let acts = [Some("Act 1"), Some("Act 1"), Some("Act 2")];
    assert_eq!(act_focus(acts).as_deref(), Some("Act 1"));
  }

  #[test]
  fn tie_breaks_lexicographically() {
    assert_eq!(act_focus([Some("Act 2"), Some("Act 1")]).as_deref(), Some("Act 1"));
  }

  #[test]
  fn nulls_are_ignored() {
    let acts = [None, Some("Act 2"), None];
    assert_eq!(act_focus(acts).as_deref(), Some("Act 2"));
  }

  #[test]
  fn no_acts_yields_none() {
    assert_eq!(act_focus([None, None]), None);
    assert_eq!(act_focus(std::iter::empty()), None);
  }
}
