//! shelf-rs: a reading tracker backend with a lazily materialized catalog.
//!
//! Users keep favorites (books they want to read, are reading, have
//! finished or dropped) with page-level reading progress. Books come from
//! a local catalog that is filled on demand from Open Library the first
//! time someone favorites a work.
//!
//! # Features
//!
//! - User accounts with session tokens
//! - External search and work details through Open Library
//! - Lazy catalog materialization with page count backfill
//! - Reading progress with automatic status transitions
//! - Reading statistics and recommendations

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and user management.
pub mod auth;
/// Local catalog and external source resolution.
pub mod catalog;
/// Configuration and CLI.
pub mod config;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// Favorites and their reconciliation with the catalog.
pub mod favorites;
/// Reading progress model.
pub mod progress;
/// Book recommendations.
pub mod recommend;
/// HTTP server.
pub mod server;
/// External bibliographic sources.
pub mod source;
/// Reading statistics.
pub mod stats;

#[cfg(test)]
mod tests;

pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use server::AppState;
