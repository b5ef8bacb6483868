//! lore-sync binary.
//!
//! Reads `lore.toml` (or the path given with `--config`), opens the SQLite
//! mirror, and runs one command:
//!
//! - `sync`: apply pending migrations, then run the full pipeline and print
//!   the report as JSON.
//! - `migrate`: apply pending migrations and print what was applied.
//! - `status`: print the latest run's sync-log rows and pending migrations.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use lore_core::clock::SystemClock;
use lore_store_sqlite::{MigrationSet, SqliteStore};
use lore_sync::{Pipeline, SyncConfig, source::ConfiguredSource};
use serde_json::json;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Lore content sync")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "lore.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Run the full sync pipeline.
  Sync,
  /// Apply pending schema migrations.
  Migrate,
  /// Show the latest run and any pending migrations.
  Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let config = SyncConfig::load(&cli.config)
    .with_context(|| format!("failed to load config from {:?}", cli.config))?;

  let store_path = expand_tilde(&config.store_path);
  let migrations_dir = expand_tilde(&config.migrations_dir);
  let migrations = MigrationSet::load(&migrations_dir)
    .with_context(|| format!("failed to read migrations from {migrations_dir:?}"))?;

  let store = SqliteStore::connect(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Migrate => {
      let applied = store.migrate(migrations).await.context("migration failed")?;
      println!("{}", serde_json::to_string_pretty(&applied)?);
    }

    Command::Sync => {
      store.migrate(migrations).await.context("migration failed")?;

      let source = ConfiguredSource::from_config(&config.source)
        .context("failed to build source")?;
      let pipeline = Pipeline::new(source, store, Arc::new(SystemClock))
        .with_engine(config.engine())
        .with_link_weights(config.link_weights)
        .with_cache_ttl(config.cache_ttl());

      let report = pipeline.run().await.context("sync failed")?;
      println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Command::Status => {
      let latest = store.latest_run().await.context("failed to read sync log")?;
      let pending: Vec<String> = store
        .pending_migrations(&migrations)
        .await
        .context("failed to read migration ledger")?
        .into_iter()
        .map(|m| format!("{}_{}", m.version, m.name))
        .collect();
      let status = json!({ "latest_run": latest, "pending_migrations": pending });
      println!("{}", serde_json::to_string_pretty(&status)?);
    }
  }

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
