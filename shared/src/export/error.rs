//! Export error types.

use crate::models::MetricKind;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The row being written when a persistence failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    /// The `metrics` row.
    Record,
    /// A `metric_attributes` row.
    Attribute,
    /// A `metric_histogram_buckets` row.
    Bucket,
    /// A `metric_exemplars` row.
    Exemplar,
}

impl fmt::Display for WriteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Record => write!(f, "metric record"),
            Self::Attribute => write!(f, "attribute"),
            Self::Bucket => write!(f, "histogram bucket"),
            Self::Exemplar => write!(f, "exemplar"),
        }
    }
}

/// Transaction control operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOp {
    /// `BEGIN`.
    Begin,
    /// `COMMIT`.
    Commit,
}

impl fmt::Display for TransactionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Begin => write!(f, "begin"),
            Self::Commit => write!(f, "commit"),
        }
    }
}

/// Errors that can occur while exporting metrics.
///
/// Every variant returned from an export means the transaction was rolled
/// back and the store is unchanged.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The schema could not be prepared; the exporter was not created.
    #[error("Failed to initialize metrics schema: {0}")]
    SchemaInit(#[source] sqlx::Error),

    /// A metric carries an aggregation outside the six persisted variants.
    #[error("Unsupported metric type '{kind}' for metric '{metric}'")]
    UnsupportedMetricType {
        /// Name of the offending metric.
        metric: String,
        /// Name of its aggregation.
        kind: String,
    },

    /// A metric failed validation.
    #[error("Metric #{index} in scope '{scope}' is invalid: {source}")]
    InvalidMetric {
        /// Instrumentation scope name of the metric.
        scope: String,
        /// Position of the metric within its scope group.
        index: usize,
        /// Validation failures.
        #[source]
        source: validator::ValidationErrors,
    },

    /// A data point timestamp cannot be expressed as nanoseconds since the epoch.
    #[error("Timestamp of metric '{metric}' is outside the representable range")]
    TimestampOutOfRange {
        /// Name of the offending metric.
        metric: String,
    },

    /// A row could not be written.
    #[error("Failed to write {step} for {kind} metric '{metric}': {source}")]
    Persistence {
        /// Name of the offending metric.
        metric: String,
        /// Kind of the offending metric.
        kind: MetricKind,
        /// The row being written.
        step: WriteStep,
        /// Underlying database error.
        #[source]
        source: sqlx::Error,
    },

    /// Beginning or committing the transaction failed.
    #[error("Failed to {op} transaction: {source}")]
    Transaction {
        /// The failed operation.
        op: TransactionOp,
        /// Underlying database error.
        #[source]
        source: sqlx::Error,
    },

    /// The caller cancelled the export.
    #[error("Export cancelled")]
    Cancelled,

    /// The export did not finish before its deadline.
    #[error("Export exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),
}

impl ExportError {
    /// Returns the name of the metric the error refers to, if any.
    #[must_use]
    pub fn metric(&self) -> Option<&str> {
        match self {
            Self::UnsupportedMetricType { metric, .. }
            | Self::TimestampOutOfRange { metric }
            | Self::Persistence { metric, .. } => Some(metric),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_display_names_metric() {
        let err = ExportError::UnsupportedMetricType {
            metric: "rpc.latency".to_string(),
            kind: "Summary".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unsupported metric type 'Summary' for metric 'rpc.latency'"
        );
        assert_eq!(err.metric(), Some("rpc.latency"));
    }

    #[test]
    fn test_persistence_display() {
        let err = ExportError::Persistence {
            metric: "queue.depth".to_string(),
            kind: MetricKind::Histogram,
            step: WriteStep::Bucket,
            source: sqlx::Error::RowNotFound,
        };
        let message = err.to_string();
        assert!(message.starts_with("Failed to write histogram bucket for histogram metric 'queue.depth'"));
    }

    #[test]
    fn test_transaction_display() {
        let err = ExportError::Transaction {
            op: TransactionOp::Commit,
            source: sqlx::Error::PoolClosed,
        };
        assert!(err.to_string().starts_with("Failed to commit transaction"));
        assert_eq!(err.metric(), None);
    }
}
