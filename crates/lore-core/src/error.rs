//! Error types for `lore-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("record has no external id")]
  MissingId,

  #[error("missing required property {0:?}")]
  MissingProperty(&'static str),

  #[error("property {property:?} is {found}, expected {expected}")]
  PropertyType {
    property: String,
    expected: &'static str,
    found:    &'static str,
  },

  #[error("quality tier {0:?} is outside 1..=5")]
  TierOutOfRange(String),

  /// A computed field could not be derived; the field is left unset.
  #[error("quality tier {0} has no configured base value")]
  UnknownTier(u8),

  #[error("link weight {name} must be finite and non-negative, got {value}")]
  InvalidWeight { name: &'static str, value: f64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
