//! End-to-end tests for the SQLite metric exporter.

use chrono::{DateTime, TimeZone, Utc};
use shared::export::WriteStep;
use shared::models::{
    Aggregation, AttributeSet, DataPoint, Gauge, Histogram, HistogramDataPoint,
    InstrumentationScope, Metric, MetricKind, ResourceMetrics, ScopeMetrics, Sum,
};
use shared::storage::{Database, DatabaseConfig};
use shared::{ExportError, MetricExporter, SqliteMetricExporter};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn batch(metrics: Vec<Metric>) -> ResourceMetrics {
    ResourceMetrics::default().with_scope(ScopeMetrics {
        scope: InstrumentationScope::new("integration"),
        metrics,
    })
}

fn int_gauge(name: &str, value: i64) -> Metric {
    let point = DataPoint::new(at(1), value, AttributeSet::new().with("retries", 3_i64));
    Metric::new(name, Aggregation::GaugeI64(Gauge::new(vec![point])))
}

fn int_sum(name: &str, value: i64) -> Metric {
    let point = DataPoint::new(at(2), value, AttributeSet::new());
    Metric::new(name, Aggregation::SumI64(Sum::new(vec![point])))
}

fn latency_histogram() -> Metric {
    Metric::new(
        "http.server.duration",
        Aggregation::HistogramF64(Histogram::new(vec![HistogramDataPoint {
            attributes: AttributeSet::new().with("route", "/users"),
            start_time: None,
            time: at(3),
            count: 11,
            bounds: vec![10.0, 20.0, 30.0],
            bucket_counts: vec![2, 5, 3, 1],
            min: Some(1.0),
            max: Some(45.0),
            sum: 212.5,
            exemplars: vec![],
        }])),
    )
    .with_unit("ms")
}

async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn in_memory_exporter() -> SqliteMetricExporter {
    let db = Database::in_memory().await.unwrap();
    SqliteMetricExporter::new(db.pool().clone()).await.unwrap()
}

#[tokio::test]
async fn test_mixed_batch_is_persisted() {
    let exporter = in_memory_exporter().await;
    exporter
        .export(&batch(vec![
            int_gauge("queue.depth", 42),
            int_sum("balance", -7),
            latency_histogram(),
        ]))
        .await
        .unwrap();

    let rows: Vec<(String, String, f64)> =
        sqlx::query_as("SELECT name, type, value FROM metrics ORDER BY id")
            .fetch_all(exporter.pool())
            .await
            .unwrap();
    assert_eq!(
        rows,
        vec![
            ("queue.depth".to_string(), "gauge".to_string(), 42.0),
            ("balance".to_string(), "counter".to_string(), -7.0),
            ("http.server.duration".to_string(), "histogram".to_string(), 212.5),
        ]
    );

    let unit: String = sqlx::query_scalar("SELECT unit FROM metrics WHERE type = 'histogram'")
        .fetch_one(exporter.pool())
        .await
        .unwrap();
    assert_eq!(unit, "ms");
}

#[tokio::test]
async fn test_attribute_persisted_as_string() {
    let exporter = in_memory_exporter().await;
    exporter
        .export(&batch(vec![int_gauge("queue.depth", 1)]))
        .await
        .unwrap();

    let (key, value): (String, String) =
        sqlx::query_as("SELECT key, value FROM metric_attributes")
            .fetch_one(exporter.pool())
            .await
            .unwrap();
    assert_eq!(key, "retries");
    assert_eq!(value, "3");
}

#[tokio::test]
async fn test_histogram_buckets() {
    let exporter = in_memory_exporter().await;
    exporter
        .export(&batch(vec![latency_histogram()]))
        .await
        .unwrap();

    let buckets: Vec<(i64, Option<f64>, i64)> = sqlx::query_as(
        "SELECT bucket_index, bucket_boundary, count FROM metric_histogram_buckets ORDER BY bucket_index",
    )
    .fetch_all(exporter.pool())
    .await
    .unwrap();
    assert_eq!(
        buckets,
        vec![
            (0, Some(10.0), 2),
            (1, Some(20.0), 5),
            (2, Some(30.0), 3),
            (3, None, 1)
        ]
    );
}

#[tokio::test]
async fn test_unsupported_metric_leaves_store_untouched() {
    let exporter = in_memory_exporter().await;
    let unsupported = Metric::new(
        "rpc.duration",
        Aggregation::Unsupported {
            kind: "Summary".to_string(),
        },
    );

    let err = exporter
        .export(&batch(vec![
            int_gauge("queue.depth", 1),
            latency_histogram(),
            unsupported,
        ]))
        .await
        .unwrap_err();
    assert_eq!(err.metric(), Some("rpc.duration"));

    for table in shared::storage::TABLES {
        assert_eq!(count(exporter.pool(), table).await, 0, "{table} not empty");
    }
}

#[tokio::test]
async fn test_failed_write_rolls_back_earlier_metrics() {
    let exporter = in_memory_exporter().await;
    let out_of_range = Metric::new(
        "far.future",
        Aggregation::GaugeF64(Gauge::new(vec![DataPoint::new(
            DateTime::<Utc>::MAX_UTC,
            1.0,
            AttributeSet::new(),
        )])),
    );

    let err = exporter
        .export(&batch(vec![int_gauge("queue.depth", 1), out_of_range]))
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::TimestampOutOfRange { .. }));
    assert_eq!(count(exporter.pool(), "metrics").await, 0);
    assert_eq!(count(exporter.pool(), "metric_attributes").await, 0);

    // The exporter stays usable after a rollback.
    exporter
        .export(&batch(vec![int_gauge("queue.depth", 2)]))
        .await
        .unwrap();
    assert_eq!(count(exporter.pool(), "metrics").await, 1);
}

#[tokio::test]
async fn test_bucket_write_failure_names_metric_and_step() {
    let exporter = in_memory_exporter().await;
    sqlx::query(
        "CREATE TRIGGER reject_buckets BEFORE INSERT ON metric_histogram_buckets \
         BEGIN SELECT RAISE(ABORT, 'bucket rejected'); END",
    )
    .execute(exporter.pool())
    .await
    .unwrap();

    let err = exporter
        .export(&batch(vec![int_gauge("queue.depth", 1), latency_histogram()]))
        .await
        .unwrap_err();
    match &err {
        ExportError::Persistence {
            metric, kind, step, ..
        } => {
            assert_eq!(metric, "http.server.duration");
            assert_eq!(*kind, MetricKind::Histogram);
            assert_eq!(*step, WriteStep::Bucket);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("bucket rejected"));

    for table in shared::storage::TABLES {
        assert_eq!(count(exporter.pool(), table).await, 0, "{table} not empty");
    }
}

#[tokio::test]
async fn test_incompatible_schema_fails_exporter_creation() {
    let db = Database::in_memory().await.unwrap();
    sqlx::query("CREATE TABLE metrics (id INTEGER PRIMARY KEY)")
        .execute(db.pool())
        .await
        .unwrap();

    let err = SqliteMetricExporter::new(db.pool().clone())
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::SchemaInit(_)), "{err}");
}

async fn file_exporter(dir: &tempfile::TempDir) -> (SqliteMetricExporter, Database) {
    let config = DatabaseConfig::default().with_path(dir.path().join("metrics.db"));
    let db = Database::connect(&config).await.unwrap();
    let exporter = SqliteMetricExporter::new(db.pool().clone()).await.unwrap();
    (exporter, db)
}

/// Opens a second pool on the same file and takes the write lock.
async fn hold_write_lock(dir: &tempfile::TempDir) -> sqlx::pool::PoolConnection<sqlx::Sqlite> {
    let config = DatabaseConfig::default().with_path(dir.path().join("metrics.db"));
    let other = Database::connect(&config).await.unwrap();
    let mut conn = other.pool().acquire().await.unwrap();
    sqlx::query("BEGIN IMMEDIATE")
        .execute(&mut *conn)
        .await
        .unwrap();
    conn
}

#[tokio::test]
async fn test_deadline_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let (exporter, db) = file_exporter(&dir).await;
    let mut blocker = hold_write_lock(&dir).await;

    let err = exporter
        .export_with_deadline(&batch(vec![int_gauge("slow", 1)]), Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::DeadlineExceeded(_)));

    sqlx::query("ROLLBACK").execute(&mut *blocker).await.unwrap();
    drop(blocker);
    assert_eq!(count(db.pool(), "metrics").await, 0);
}

#[tokio::test]
async fn test_cancellation_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let (exporter, db) = file_exporter(&dir).await;
    let mut blocker = hold_write_lock(&dir).await;

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let err = exporter
        .export_with_cancellation(&batch(vec![int_gauge("slow", 1)]), &token)
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::Cancelled));

    sqlx::query("ROLLBACK").execute(&mut *blocker).await.unwrap();
    drop(blocker);
    assert_eq!(count(db.pool(), "metrics").await, 0);
}

#[tokio::test]
async fn test_concurrent_exports_are_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let (exporter, db) = file_exporter(&dir).await;
    let exporter = Arc::new(exporter);

    let mut handles = Vec::new();
    for task in 0..8_i64 {
        let exporter = Arc::clone(&exporter);
        handles.push(tokio::spawn(async move {
            let metrics = (0..5).map(|i| int_sum(&format!("task{task}.m{i}"), i)).collect();
            exporter.export(&batch(metrics)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(count(db.pool(), "metrics").await, 40);
}
