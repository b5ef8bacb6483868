//! Sync-run outcome records.
//!
//! One [`SyncLogEntry`] is appended per synchronizer invocation. The table is
//! append-only and is the operational read surface for "how did the last
//! sync go".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::entity::EntityKind;

/// Outcome of one synchronizer run. Ordered from best to worst.
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
pub enum SyncStatus {
  Success,
  Partial,
  Failed,
}

impl SyncStatus {
  /// `success` with no failures, `failed` with no successes (and at least
  /// one failure), `partial` otherwise.
  pub fn from_counts(succeeded: u32, failed: u32) -> Self {
    match (succeeded, failed) {
      (_, 0) => Self::Success,
      (0, _) => Self::Failed,
      _ => Self::Partial,
    }
  }

  /// The worse of two outcomes.
  pub fn worst(self, other: Self) -> Self { self.max(other) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
  /// Shared by every entry written during one pipeline run.
  pub run_id:            Uuid,
  pub entity_type:       EntityKind,
  pub run_started_at:    DateTime<Utc>,
  pub run_finished_at:   DateTime<Utc>,
  pub status:            SyncStatus,
  /// Records successfully upserted.
  pub records_processed: u32,
  pub records_failed:    u32,
  pub error_summary:     Option<String>,
}

/// A record the synchronizer had to skip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
  pub record_id: Option<String>,
  pub reason:    String,
}

impl RecordFailure {
  pub fn new(record_id: impl Into<String>, reason: impl ToString) -> Self {
    let record_id = record_id.into();
    Self {
      record_id: (!record_id.trim().is_empty()).then_some(record_id),
      reason:    reason.to_string(),
    }
  }
}

const SUMMARY_LIMIT: usize = 5;

/// Human-readable digest of failures: the first few, then a count.
pub fn summarize_failures(failures: &[RecordFailure]) -> Option<String> {
  if failures.is_empty() {
    return None;
  }
  let mut parts: Vec<String> = failures
    .iter()
    .take(SUMMARY_LIMIT)
    .map(|f| match &f.record_id {
      Some(id) => format!("{id}: {}", f.reason),
      None => f.reason.clone(),
    })
    .collect();
  if failures.len() > SUMMARY_LIMIT {
    parts.push(format!("... and {} more", failures.len() - SUMMARY_LIMIT));
  }
  Some(parts.join("; "))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_from_counts() {
    assert_eq!(SyncStatus::from_counts(5, 0), SyncStatus::Success);
    assert_eq!(SyncStatus::from_counts(0, 0), SyncStatus::Success);
    assert_eq!(SyncStatus::from_counts(4, 1), SyncStatus::Partial);
    assert_eq!(SyncStatus::from_counts(0, 3), SyncStatus::Failed);
  }

  #[test]
  fn worst_status_wins() {
    assert_eq!(SyncStatus::Success.worst(SyncStatus::Partial), SyncStatus::Partial);
    assert_eq!(SyncStatus::Failed.worst(SyncStatus::Partial), SyncStatus::Failed);
  }

  #[test]
  fn summary_truncates_after_five() {
    let failures: Vec<_> = (0..7)
      .map(|i| RecordFailure::new(format!("r{i}"), "bad"))
      .collect();
    let summary = summarize_failures(&failures).unwrap();
    assert!(summary.starts_with("r0: bad; r1: bad"));
    assert!(summary.ends_with("... and 2 more"));
    assert!(!summary.contains("r5"));
    assert_eq!(summarize_failures(&[]), None);
  }

  #[test]
  fn blank_record_id_is_dropped() {
    let failure = RecordFailure::new("", "record has no external id");
    assert_eq!(failure.record_id, None);
  }
}
