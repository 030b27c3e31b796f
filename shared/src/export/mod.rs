//! Metric exporter.
//!
//! [`SqliteMetricExporter`] persists each [`ResourceMetrics`] batch in a
//! single SQLite transaction: either every row of the batch is committed or
//! none is. The first failure (an unsupported aggregation, an invalid
//! metric, a failed insert) rolls the whole batch back.

pub mod convert;
pub mod error;

pub use convert::RowCounts;
pub use error::{ExportError, TransactionOp, WriteStep};

use crate::models::{
    Aggregation, AggregationSelection, InstrumentKind, Metric, ResourceMetrics, Temporality,
};
use async_trait::async_trait;
use convert::{ConvertError, MetricMeta};
use sqlx::{SqliteConnection, SqlitePool};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use validator::Validate;

/// Trait for metric exporters driven by a periodic reader.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait MetricExporter: Send + Sync {
    /// Persists a batch of metrics.
    ///
    /// # Errors
    ///
    /// Returns an error if any part of the batch cannot be persisted. In
    /// that case nothing from the batch is stored.
    async fn export(&self, batch: &ResourceMetrics) -> Result<(), ExportError>;

    /// Temporality requested for readings of the given instrument kind.
    fn temporality(&self, kind: InstrumentKind) -> Temporality;

    /// Aggregation requested for the given instrument kind.
    fn aggregation(&self, kind: InstrumentKind) -> AggregationSelection;

    /// Flushes buffered data.
    ///
    /// # Errors
    ///
    /// Returns an error if buffered data cannot be flushed.
    async fn force_flush(&self) -> Result<(), ExportError>;

    /// Releases exporter resources.
    ///
    /// # Errors
    ///
    /// Returns an error if shutdown fails.
    async fn shutdown(&self) -> Result<(), ExportError>;
}

/// SQLite-backed metric exporter.
///
/// Exports are serialized: a second `export` call waits until the first
/// one has committed or rolled back.
#[derive(Debug)]
pub struct SqliteMetricExporter {
    pool: SqlitePool,
    export_lock: Mutex<()>,
}

impl SqliteMetricExporter {
    /// Creates an exporter over `pool`, creating the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::SchemaInit`] if the schema cannot be created.
    pub async fn new(pool: SqlitePool) -> Result<Self, ExportError> {
        crate::storage::init_schema(&pool)
            .await
            .map_err(ExportError::SchemaInit)?;
        tracing::info!("SQLite metric exporter ready");
        Ok(Self {
            pool,
            export_lock: Mutex::new(()),
        })
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Persists `batch` and reports how many rows were written.
    ///
    /// # Errors
    ///
    /// Same as [`MetricExporter::export`].
    pub async fn write_batch(&self, batch: &ResourceMetrics) -> Result<RowCounts, ExportError> {
        let _guard = self.export_lock.lock().await;

        if batch.is_empty() {
            tracing::debug!("Skipping empty metrics batch");
            return Ok(RowCounts::default());
        }

        let started = Instant::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|source| ExportError::Transaction {
                op: TransactionOp::Begin,
                source,
            })?;

        match write_all(&mut *tx, batch).await {
            Ok(rows) => {
                tx.commit()
                    .await
                    .map_err(|source| ExportError::Transaction {
                        op: TransactionOp::Commit,
                        source,
                    })?;
                tracing::info!(
                    metrics = batch.metric_count(),
                    records = rows.records,
                    attributes = rows.attributes,
                    buckets = rows.buckets,
                    exemplars = rows.exemplars,
                    elapsed_ms = started.elapsed().as_millis(),
                    "Exported metrics batch"
                );
                Ok(rows)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "Failed to roll back metrics batch");
                }
                tracing::warn!(error = %err, "Metrics batch rolled back");
                Err(err)
            }
        }
    }

    /// Exports `batch` unless `token` is cancelled first.
    ///
    /// A cancelled export drops its open transaction, which rolls it back.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Cancelled`] on cancellation, otherwise the
    /// same errors as [`MetricExporter::export`].
    pub async fn export_with_cancellation(
        &self,
        batch: &ResourceMetrics,
        token: &CancellationToken,
    ) -> Result<RowCounts, ExportError> {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                tracing::warn!("Metrics export cancelled");
                Err(ExportError::Cancelled)
            }
            result = self.write_batch(batch) => result,
        }
    }

    /// Exports `batch`, giving up after `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::DeadlineExceeded`] when the deadline passes,
    /// otherwise the same errors as [`MetricExporter::export`].
    pub async fn export_with_deadline(
        &self,
        batch: &ResourceMetrics,
        deadline: Duration,
    ) -> Result<RowCounts, ExportError> {
        tokio::time::timeout(deadline, self.write_batch(batch))
            .await
            .unwrap_or_else(|_| {
                tracing::warn!(?deadline, "Metrics export exceeded its deadline");
                Err(ExportError::DeadlineExceeded(deadline))
            })
    }
}

#[async_trait]
impl MetricExporter for SqliteMetricExporter {
    async fn export(&self, batch: &ResourceMetrics) -> Result<(), ExportError> {
        self.write_batch(batch).await.map(|_| ())
    }

    fn temporality(&self, _kind: InstrumentKind) -> Temporality {
        Temporality::Cumulative
    }

    fn aggregation(&self, kind: InstrumentKind) -> AggregationSelection {
        kind.default_aggregation()
    }

    async fn force_flush(&self) -> Result<(), ExportError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ExportError> {
        Ok(())
    }
}

async fn write_all(
    conn: &mut SqliteConnection,
    batch: &ResourceMetrics,
) -> Result<RowCounts, ExportError> {
    let mut rows = RowCounts::default();
    for scope_metrics in &batch.scope_metrics {
        for (index, metric) in scope_metrics.metrics.iter().enumerate() {
            metric
                .validate()
                .map_err(|source| ExportError::InvalidMetric {
                    scope: scope_metrics.scope.name.clone(),
                    index,
                    source,
                })?;
            rows += write_metric(conn, metric).await?;
        }
    }
    Ok(rows)
}

async fn write_metric(
    conn: &mut SqliteConnection,
    metric: &Metric,
) -> Result<RowCounts, ExportError> {
    let meta = MetricMeta::from(metric);
    let result = match &metric.data {
        Aggregation::SumI64(sum) => convert::write_sum(conn, meta, sum).await,
        Aggregation::SumF64(sum) => convert::write_sum(conn, meta, sum).await,
        Aggregation::GaugeI64(gauge) => convert::write_gauge(conn, meta, gauge).await,
        Aggregation::GaugeF64(gauge) => convert::write_gauge(conn, meta, gauge).await,
        Aggregation::HistogramI64(histogram) => {
            convert::write_histogram(conn, meta, histogram).await
        }
        Aggregation::HistogramF64(histogram) => {
            convert::write_histogram(conn, meta, histogram).await
        }
        Aggregation::Unsupported { kind } => {
            return Err(ExportError::UnsupportedMetricType {
                metric: metric.name.clone(),
                kind: kind.clone(),
            });
        }
    };

    result.map_err(|err| match err {
        ConvertError::Write { kind, step, source } => ExportError::Persistence {
            metric: metric.name.clone(),
            kind,
            step,
            source,
        },
        ConvertError::TimestampOutOfRange => ExportError::TimestampOutOfRange {
            metric: metric.name.clone(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttributeSet, DataPoint, Gauge, InstrumentationScope, ScopeMetrics, Sum};
    use crate::storage::Database;
    use chrono::Utc;

    async fn exporter() -> SqliteMetricExporter {
        let db = Database::in_memory().await.unwrap();
        SqliteMetricExporter::new(db.pool().clone()).await.unwrap()
    }

    fn batch(metrics: Vec<Metric>) -> ResourceMetrics {
        ResourceMetrics::default().with_scope(ScopeMetrics {
            scope: InstrumentationScope::new("test"),
            metrics,
        })
    }

    fn gauge(name: &str, value: i64) -> Metric {
        let point = DataPoint::new(Utc::now(), value, AttributeSet::new());
        Metric::new(name, Aggregation::GaugeI64(Gauge::new(vec![point])))
    }

    async fn metric_rows(exporter: &SqliteMetricExporter) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM metrics")
            .fetch_one(exporter.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_temporality_is_always_cumulative() {
        let exporter = exporter().await;
        for kind in InstrumentKind::ALL {
            assert_eq!(exporter.temporality(kind), Temporality::Cumulative);
        }
    }

    #[tokio::test]
    async fn test_aggregation_uses_runtime_default() {
        let exporter = exporter().await;
        for kind in InstrumentKind::ALL {
            assert_eq!(exporter.aggregation(kind), kind.default_aggregation());
        }
    }

    #[tokio::test]
    async fn test_flush_and_shutdown_are_noops() {
        let exporter = exporter().await;
        exporter.export(&batch(vec![gauge("g", 1)])).await.unwrap();

        tokio_test::assert_ok!(exporter.force_flush().await);
        tokio_test::assert_ok!(exporter.shutdown().await);
        assert_eq!(metric_rows(&exporter).await, 1);
    }

    #[tokio::test]
    async fn test_empty_batch_writes_nothing() {
        let exporter = exporter().await;
        let rows = exporter
            .write_batch(&ResourceMetrics::default())
            .await
            .unwrap();
        assert_eq!(rows, RowCounts::default());
    }

    #[tokio::test]
    async fn test_gauge_int_widened() {
        let exporter = exporter().await;
        exporter.export(&batch(vec![gauge("g", 42)])).await.unwrap();

        let value: f64 = sqlx::query_scalar("SELECT value FROM metrics")
            .fetch_one(exporter.pool())
            .await
            .unwrap();
        assert!((value - 42.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_unsupported_rolls_back_batch() {
        let exporter = exporter().await;
        let unsupported = Metric::new(
            "rpc.sizes",
            Aggregation::Unsupported {
                kind: "ExponentialHistogram".to_string(),
            },
        );

        let err = exporter
            .export(&batch(vec![gauge("first", 1), unsupported]))
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::UnsupportedMetricType { .. }));
        assert_eq!(err.metric(), Some("rpc.sizes"));
        assert_eq!(metric_rows(&exporter).await, 0);
    }

    #[tokio::test]
    async fn test_empty_name_is_invalid() {
        let exporter = exporter().await;
        let err = exporter
            .export(&batch(vec![gauge("ok", 1), gauge("", 2)]))
            .await
            .unwrap_err();

        match err {
            ExportError::InvalidMetric { scope, index, .. } => {
                assert_eq!(scope, "test");
                assert_eq!(index, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(metric_rows(&exporter).await, 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let exporter = exporter().await;
        let token = CancellationToken::new();
        token.cancel();

        let err = exporter
            .export_with_cancellation(&batch(vec![gauge("g", 1)]), &token)
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::Cancelled));
        assert_eq!(metric_rows(&exporter).await, 0);
    }

    #[tokio::test]
    async fn test_deadline_met() {
        let exporter = exporter().await;
        let sum = Sum::new(vec![DataPoint::new(Utc::now(), 2.5, AttributeSet::new())]);
        let metric = Metric::new("s", Aggregation::SumF64(sum));

        let rows = exporter
            .export_with_deadline(&batch(vec![metric]), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(rows.records, 1);
    }
}
