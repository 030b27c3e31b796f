//! Tallyspan Shared Library
//!
//! The embedded telemetry capture core: metric batches are persisted to
//! SQLite in one transaction per batch, and completed spans are turned into
//! canonical JSON-ready snapshots.
//!
//! # Modules
//!
//! - [`models`] - Producer-side data models for metrics and spans
//! - [`codec`] - Flat and structured attribute encodings
//! - [`export`] - Transactional SQLite metric exporter
//! - [`snapshot`] - Span canonicalizer
//! - [`storage`] - Database connection and schema
//! - [`otlp`] - OTLP decoding and conversion
//!
//! # Example
//!
//! ```
//! use shared::models::{AttributeSet, SpanData, Status};
//! use shared::snapshot::canonicalize;
//!
//! let span = SpanData::new("checkout")
//!     .with_attributes(AttributeSet::new().with("retries", 3_i64))
//!     .with_status(Status::error("payment declined"));
//!
//! let snapshot = canonicalize(&span);
//! assert_eq!(snapshot.status.code, "Error");
//! assert!(snapshot.events.is_none());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod codec;
pub mod export;
pub mod models;
pub mod otlp;
pub mod snapshot;
pub mod storage;

pub use export::{ExportError, MetricExporter, SqliteMetricExporter};
pub use snapshot::{canonicalize, SpanSnapshot};

/// Re-export common dependencies for convenience.
pub use chrono;
pub use serde;
pub use serde_json;
pub use validator;
