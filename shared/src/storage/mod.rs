//! Storage backends.
//!
//! Metrics are persisted to SQLite. This module owns connection setup and
//! the relational schema; writing rows is the exporter's job.

pub mod db;
pub mod schema;

pub use db::{ConfigError, Database, DatabaseConfig};
pub use schema::{init_schema, SCHEMA, TABLES};
