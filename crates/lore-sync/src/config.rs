//! Runtime configuration, layered from `lore.toml` and `LORE__*` variables.

use std::path::{Path, PathBuf};

use lore_core::compute::{
  ComputeEngine, links::LinkWeights, paths::PathConfig, valuation::ValuationConfig,
};
use serde::Deserialize;

use crate::{Error, Result};

/// Where records come from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
  /// A JSON export on disk.
  Snapshot { path: PathBuf },
  /// A paginated HTTP export endpoint.
  Http {
    base_url:  String,
    #[serde(default)]
    token:     Option<String>,
    #[serde(default)]
    page_size: Option<u32>,
  },
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  pub store_path:     PathBuf,
  #[serde(default = "default_migrations_dir")]
  pub migrations_dir: PathBuf,
  pub source:         SourceConfig,
  #[serde(default)]
  pub valuation:      ValuationConfig,
  #[serde(default)]
  pub paths:          PathConfig,
  #[serde(default)]
  pub link_weights:   LinkWeights,
  #[serde(default = "default_cache_ttl_secs")]
  pub cache_ttl_secs: u64,
}

fn default_migrations_dir() -> PathBuf { PathBuf::from("migrations") }

fn default_cache_ttl_secs() -> u64 { 60 }

impl SyncConfig {
  /// Read `file` (optional) and overlay `LORE__*` environment variables,
  /// e.g. `LORE__LINK_WEIGHTS__PUZZLES=4`.
  pub fn load(file: impl AsRef<Path>) -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(file.as_ref()).required(false))
      .add_source(
        config::Environment::with_prefix("LORE")
          .prefix_separator("__")
          .separator("__")
          .try_parsing(true),
      )
      .build()?;

    let config: Self = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<()> {
    self.link_weights.validate().map_err(Error::InvalidConfig)?;
    self.valuation.validate().map_err(Error::InvalidConfig)
  }

  pub fn engine(&self) -> ComputeEngine {
    ComputeEngine::new(self.valuation.clone(), self.paths.clone())
  }

  pub fn cache_ttl(&self) -> chrono::Duration {
    i64::try_from(self.cache_ttl_secs)
      .ok()
      .and_then(chrono::Duration::try_seconds)
      .unwrap_or(chrono::Duration::MAX)
  }
}

#[cfg(test)]
mod tests {
  use lore_core::entity::Category;

  use super::*;

  fn write(contents: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lore.toml");
    std::fs::write(&path, contents).unwrap();
    (dir, path)
  }

  #[test]
  fn defaults_fill_everything_but_store_and_source() {
    let (_dir, path) = write(
      r#"
        store_path = "~/lore/lore.db"

        [source]
        kind = "snapshot"
        path = "export.json"
      "#,
    );
    let config = SyncConfig::load(&path).unwrap();
    assert_eq!(config.source, SourceConfig::Snapshot { path: "export.json".into() });
    assert_eq!(config.migrations_dir, PathBuf::from("migrations"));
    assert_eq!(config.link_weights, LinkWeights::default());
    assert_eq!(config.cache_ttl_secs, 60);
    assert_eq!(config.valuation.base_value(5).unwrap(), 10000.0);
  }

  #[test]
  fn tables_are_overridable() {
    let (_dir, path) = write(
      r#"
        store_path = "lore.db"

        [source]
        kind      = "http"
        base_url  = "https://content.example"
        page_size = 50

        [link_weights]
        puzzles = 4.0

        [valuation]
        base_values = [{ tier = 4, value = 6000.0 }]

        [valuation.multipliers]
        business = 2.0
      "#,
    );
    let config = SyncConfig::load(&path).unwrap();
    assert!(matches!(
      config.source,
      SourceConfig::Http { page_size: Some(50), token: None, .. }
    ));
    assert_eq!(config.link_weights.puzzles, 4.0);
    assert_eq!(config.link_weights.timeline_events, 2.0);
    assert_eq!(config.valuation.memory_value(4, Category::Business).unwrap(), 12000.0);
    assert!(config.valuation.base_value(1).is_err());
  }

  #[test]
  fn negative_weight_is_rejected() {
    let (_dir, path) = write(
      r#"
        store_path = "lore.db"

        [source]
        kind = "snapshot"
        path = "export.json"

        [link_weights]
        elements = -1.0
      "#,
    );
    let err = SyncConfig::load(&path).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
  }

  #[test]
  fn out_of_range_default_tier_is_rejected_at_load() {
    let (_dir, path) = write(
      r#"
        store_path = "lore.db"

        [source]
        kind = "snapshot"
        path = "export.json"

        [valuation]
        default_tier = 0
      "#,
    );
    let err = SyncConfig::load(&path).unwrap_err();
    assert!(matches!(
      err,
      Error::InvalidConfig(lore_core::Error::TierOutOfRange(ref t)) if t == "0"
    ));
  }

  #[test]
  fn out_of_range_tier_rule_is_rejected_at_load() {
    let (_dir, path) = write(
      r#"
        store_path = "lore.db"

        [source]
        kind = "snapshot"
        path = "export.json"

        [[valuation.tier_rules]]
        result   = 7
        keywords = ["mythic"]
      "#,
    );
    let err = SyncConfig::load(&path).unwrap_err();
    assert!(matches!(
      err,
      Error::InvalidConfig(lore_core::Error::TierOutOfRange(ref t)) if t == "7"
    ));
  }

  #[test]
  fn missing_source_is_a_config_error() {
    let (_dir, path) = write("store_path = \"lore.db\"\n");
    assert!(matches!(SyncConfig::load(&path).unwrap_err(), Error::Config(_)));
  }
}
