//! The Lore sync pipeline.
//!
//! Mirrors the four entity kinds from an upstream [`Source`] into a
//! [`SqliteStore`], recomputes derived fields, rebuilds the character link
//! graph, and serves cached aggregate reads over the result.
//!
//! [`Source`]: lore_core::source::Source
//! [`SqliteStore`]: lore_store_sqlite::SqliteStore

pub mod cache;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod reads;
pub mod relationships;
pub mod source;
pub mod synchronizer;

pub use config::{SourceConfig, SyncConfig};
pub use error::{Error, Result, SourceError};
pub use pipeline::{Pipeline, SyncReport};
pub use reads::CachedReads;

#[cfg(test)]
mod tests;
