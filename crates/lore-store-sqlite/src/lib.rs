//! SQLite backend for the Lore content mirror.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Schema changes are applied by
//! the [`migrate`] runner from versioned `.sql` scripts.

mod rows;
mod store;

pub mod error;
pub mod migrate;

pub use error::{Error, MigrationError, Result};
pub use migrate::{Migration, MigrationSet};
pub use store::{DerivedOutcome, MirrorOutcome, SqliteStore};
