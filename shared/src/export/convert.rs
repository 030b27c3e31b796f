//! Per-aggregation row writers.
//!
//! Each converter walks the data points of one aggregation and, per point,
//! inserts the `metrics` row, its attributes, its exemplars and (for
//! histograms) its buckets. All writes go through the caller's connection,
//! which is always inside the export transaction.

use super::error::WriteStep;
use crate::codec;
use crate::models::{
    AttributeSet, DataPoint, Exemplar, Gauge, Histogram, HistogramDataPoint, Metric, MetricKind,
    Numeric, Sum,
};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use std::ops::AddAssign;

const INSERT_METRIC: &str = "INSERT INTO metrics (name, description, unit, type, timestamp, value) \
     VALUES (?, ?, ?, ?, ?, ?)";
const INSERT_ATTRIBUTE: &str =
    "INSERT INTO metric_attributes (metric_id, key, value) VALUES (?, ?, ?)";
const INSERT_BUCKET: &str = "INSERT INTO metric_histogram_buckets \
     (metric_id, bucket_index, bucket_boundary, count) VALUES (?, ?, ?, ?)";
const INSERT_EXEMPLAR: &str = "INSERT INTO metric_exemplars \
     (metric_id, value, timestamp, trace_id, span_id) VALUES (?, ?, ?, ?, ?)";

/// Number of rows written, per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    /// `metrics` rows.
    pub records: usize,
    /// `metric_attributes` rows.
    pub attributes: usize,
    /// `metric_histogram_buckets` rows.
    pub buckets: usize,
    /// `metric_exemplars` rows.
    pub exemplars: usize,
}

impl AddAssign for RowCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.records += rhs.records;
        self.attributes += rhs.attributes;
        self.buckets += rhs.buckets;
        self.exemplars += rhs.exemplars;
    }
}

/// Failure inside a converter, before it is tied to a metric name.
#[derive(Debug)]
pub(crate) enum ConvertError {
    Write {
        kind: MetricKind,
        step: WriteStep,
        source: sqlx::Error,
    },
    TimestampOutOfRange,
}

impl ConvertError {
    fn write(kind: MetricKind, step: WriteStep) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Write { kind, step, source }
    }
}

/// Descriptive columns shared by every record of one metric.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MetricMeta<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub unit: &'a str,
}

impl<'a> From<&'a Metric> for MetricMeta<'a> {
    fn from(metric: &'a Metric) -> Self {
        Self {
            name: &metric.name,
            description: &metric.description,
            unit: &metric.unit,
        }
    }
}

fn unix_nanos(time: DateTime<Utc>) -> Result<i64, ConvertError> {
    time.timestamp_nanos_opt()
        .ok_or(ConvertError::TimestampOutOfRange)
}

fn saturating_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

async fn insert_record(
    conn: &mut SqliteConnection,
    meta: MetricMeta<'_>,
    kind: MetricKind,
    time: DateTime<Utc>,
    value: f64,
) -> Result<i64, ConvertError> {
    let timestamp = unix_nanos(time)?;
    let result = sqlx::query(INSERT_METRIC)
        .bind(meta.name)
        .bind(meta.description)
        .bind(meta.unit)
        .bind(kind.as_str())
        .bind(timestamp)
        .bind(value)
        .execute(&mut *conn)
        .await
        .map_err(ConvertError::write(kind, WriteStep::Record))?;
    Ok(result.last_insert_rowid())
}

async fn insert_attributes(
    conn: &mut SqliteConnection,
    kind: MetricKind,
    metric_id: i64,
    attributes: &AttributeSet,
) -> Result<usize, ConvertError> {
    let mut written = 0;
    for attr in codec::flatten(attributes) {
        sqlx::query(INSERT_ATTRIBUTE)
            .bind(metric_id)
            .bind(attr.key)
            .bind(attr.value)
            .execute(&mut *conn)
            .await
            .map_err(ConvertError::write(kind, WriteStep::Attribute))?;
        written += 1;
    }
    Ok(written)
}

/// Writes one row per bucket count. Count `i` pairs with `bounds[i]`; any
/// index past the bounds is the overflow bucket and gets a NULL boundary.
async fn insert_buckets(
    conn: &mut SqliteConnection,
    metric_id: i64,
    bounds: &[f64],
    counts: &[u64],
) -> Result<usize, ConvertError> {
    if counts.len() != bounds.len() + 1 {
        tracing::warn!(
            metric_id,
            bounds = bounds.len(),
            counts = counts.len(),
            "Histogram bucket counts do not match bounds"
        );
    }

    for (index, &count) in counts.iter().enumerate() {
        let boundary: Option<f64> = bounds.get(index).copied();
        sqlx::query(INSERT_BUCKET)
            .bind(metric_id)
            .bind(saturating_i64(index as u64))
            .bind(boundary)
            .bind(saturating_i64(count))
            .execute(&mut *conn)
            .await
            .map_err(ConvertError::write(MetricKind::Histogram, WriteStep::Bucket))?;
    }
    Ok(counts.len())
}

async fn insert_exemplars<T: Numeric>(
    conn: &mut SqliteConnection,
    kind: MetricKind,
    metric_id: i64,
    exemplars: &[Exemplar<T>],
) -> Result<usize, ConvertError> {
    for exemplar in exemplars {
        let timestamp = unix_nanos(exemplar.time)?;
        sqlx::query(INSERT_EXEMPLAR)
            .bind(metric_id)
            .bind(exemplar.value.to_f64())
            .bind(timestamp)
            .bind(exemplar.trace_id.map(|id| id.to_string()))
            .bind(exemplar.span_id.map(|id| id.to_string()))
            .execute(&mut *conn)
            .await
            .map_err(ConvertError::write(kind, WriteStep::Exemplar))?;
    }
    Ok(exemplars.len())
}

async fn write_number_points<T: Numeric>(
    conn: &mut SqliteConnection,
    meta: MetricMeta<'_>,
    kind: MetricKind,
    points: &[DataPoint<T>],
) -> Result<RowCounts, ConvertError> {
    let mut rows = RowCounts::default();
    for point in points {
        let metric_id = insert_record(conn, meta, kind, point.time, point.value.to_f64()).await?;
        rows.records += 1;
        rows.attributes += insert_attributes(conn, kind, metric_id, &point.attributes).await?;
        rows.exemplars += insert_exemplars(conn, kind, metric_id, &point.exemplars).await?;
    }
    Ok(rows)
}

async fn write_histogram_point<T: Numeric>(
    conn: &mut SqliteConnection,
    meta: MetricMeta<'_>,
    point: &HistogramDataPoint<T>,
) -> Result<RowCounts, ConvertError> {
    let kind = MetricKind::Histogram;
    let metric_id = insert_record(conn, meta, kind, point.time, point.sum.to_f64()).await?;
    Ok(RowCounts {
        records: 1,
        attributes: insert_attributes(conn, kind, metric_id, &point.attributes).await?,
        buckets: insert_buckets(conn, metric_id, &point.bounds, &point.bucket_counts).await?,
        exemplars: insert_exemplars(conn, kind, metric_id, &point.exemplars).await?,
    })
}

/// Writes a sum as `counter` records. Serves both `Sum<i64>` and `Sum<f64>`.
pub(crate) async fn write_sum<T: Numeric>(
    conn: &mut SqliteConnection,
    meta: MetricMeta<'_>,
    sum: &Sum<T>,
) -> Result<RowCounts, ConvertError> {
    write_number_points(conn, meta, MetricKind::Counter, &sum.data_points).await
}

/// Writes a gauge as `gauge` records. Serves both `Gauge<i64>` and `Gauge<f64>`.
pub(crate) async fn write_gauge<T: Numeric>(
    conn: &mut SqliteConnection,
    meta: MetricMeta<'_>,
    gauge: &Gauge<T>,
) -> Result<RowCounts, ConvertError> {
    write_number_points(conn, meta, MetricKind::Gauge, &gauge.data_points).await
}

/// Writes a histogram as `histogram` records valued at each point's sum,
/// plus one bucket row per bucket count.
pub(crate) async fn write_histogram<T: Numeric>(
    conn: &mut SqliteConnection,
    meta: MetricMeta<'_>,
    histogram: &Histogram<T>,
) -> Result<RowCounts, ConvertError> {
    let mut rows = RowCounts::default();
    for point in &histogram.data_points {
        rows += write_histogram_point(conn, meta, point).await?;
    }
    Ok(rows)
}
