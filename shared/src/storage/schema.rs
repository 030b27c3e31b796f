//! SQLite schema for persisted metrics.
//!
//! Every statement is `IF NOT EXISTS`, so [`init_schema`] can run on every
//! startup. Child tables reference `metrics(id)` with `ON DELETE CASCADE`;
//! the cascade only fires on connections with `PRAGMA foreign_keys = ON`.

use sqlx::SqlitePool;

/// Complete schema SQL.
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL CHECK(length(name) >= 1),
    description TEXT NOT NULL DEFAULT '',
    unit TEXT NOT NULL DEFAULT '',
    type TEXT NOT NULL CHECK(type IN ('counter', 'gauge', 'histogram')),
    timestamp INTEGER NOT NULL,
    value REAL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_metrics_name ON metrics(name);
CREATE INDEX IF NOT EXISTS idx_metrics_timestamp ON metrics(timestamp);
CREATE INDEX IF NOT EXISTS idx_metrics_type ON metrics(type);

CREATE TABLE IF NOT EXISTS metric_attributes (
    metric_id INTEGER NOT NULL REFERENCES metrics(id) ON DELETE CASCADE,
    key TEXT NOT NULL,
    value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_metric_attributes_metric_id ON metric_attributes(metric_id);
CREATE INDEX IF NOT EXISTS idx_metric_attributes_key ON metric_attributes(key);

-- bucket_boundary is NULL for the overflow (+Inf) bucket
CREATE TABLE IF NOT EXISTS metric_histogram_buckets (
    metric_id INTEGER NOT NULL REFERENCES metrics(id) ON DELETE CASCADE,
    bucket_index INTEGER NOT NULL,
    bucket_boundary REAL,
    count INTEGER NOT NULL CHECK(count >= 0)
);

CREATE INDEX IF NOT EXISTS idx_metric_histogram_buckets_metric_id ON metric_histogram_buckets(metric_id);

CREATE TABLE IF NOT EXISTS metric_exemplars (
    metric_id INTEGER NOT NULL REFERENCES metrics(id) ON DELETE CASCADE,
    value REAL,
    timestamp INTEGER NOT NULL,
    trace_id TEXT,
    span_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_metric_exemplars_metric_id ON metric_exemplars(metric_id);
";

/// Names of the tables created by [`SCHEMA`], parents first.
pub const TABLES: [&str; 4] = [
    "metrics",
    "metric_attributes",
    "metric_histogram_buckets",
    "metric_exemplars",
];

/// Creates all tables and indexes that do not exist yet.
///
/// # Errors
///
/// Returns an error if any statement fails.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(SCHEMA).execute(pool).await?;
    tracing::debug!(tables = TABLES.len(), "Metrics schema ready");
    Ok(())
}
