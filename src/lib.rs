//! Card Sales Sync - incremental sports-card sales and population sync
//!
//! Pulls sold-listing records for a list of search queries from a paginated
//! search service, stores each sale once in SQLite, and stops early when a
//! query has nothing new. Grading population reports for the referenced
//! cards can be pulled into the same store.

// Module declarations
pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod cli;
pub mod commands;

#[cfg(test)]
pub mod test_utils;

pub use cli::Cli;
