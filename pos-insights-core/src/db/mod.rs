//! Database layer for pos-insights
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Repository pattern for record queries and the persistent report cache

pub mod repo;
pub mod schema;

pub use repo::{Database, ImportSummary};
