//! Core types and pure derivations for the Lore narrative-content mirror.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! SQLite backend and the sync pipeline both depend on it; it depends on
//! nothing proprietary.

// Native `async fn` in traits; `Source` spells out its `Send` bounds.
#![allow(async_fn_in_trait)]

pub mod clock;
pub mod compute;
pub mod entity;
pub mod error;
pub mod mapping;
pub mod source;
pub mod sync_log;

pub use error::{Error, Result};
