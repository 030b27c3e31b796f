//! Metric data model.
//!
//! Defines the aggregated metric batches an instrumentation runtime hands to
//! the exporter. A batch is a [`ResourceMetrics`]: one resource, several
//! instrumentation scope groups, each carrying a list of [`Metric`]s whose
//! payload is one closed [`Aggregation`] variant.

use super::attribute::AttributeSet;
use super::resource::{InstrumentationScope, Resource};
use super::trace::{SpanId, TraceId};
use chrono::{DateTime, Utc};
use std::fmt;
use validator::Validate;

/// Kind of a persisted metric record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// A sum (monotonic or not) of measurements.
    Counter,
    /// The last observed value.
    Gauge,
    /// A bucketed distribution.
    Histogram,
}

impl MetricKind {
    /// Returns the stored name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How readings relate to previous exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Temporality {
    /// Each reading is the total since the instrument was created.
    #[default]
    Cumulative,
    /// Each reading covers only the interval since the last export.
    Delta,
}

/// The kind of instrument a measurement originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    /// Synchronous monotonic counter.
    Counter,
    /// Synchronous non-monotonic counter.
    UpDownCounter,
    /// Synchronous histogram.
    Histogram,
    /// Synchronous gauge.
    Gauge,
    /// Asynchronous monotonic counter.
    ObservableCounter,
    /// Asynchronous non-monotonic counter.
    ObservableUpDownCounter,
    /// Asynchronous gauge.
    ObservableGauge,
}

impl InstrumentKind {
    /// Every instrument kind.
    pub const ALL: [Self; 7] = [
        Self::Counter,
        Self::UpDownCounter,
        Self::Histogram,
        Self::Gauge,
        Self::ObservableCounter,
        Self::ObservableUpDownCounter,
        Self::ObservableGauge,
    ];

    /// Returns the runtime's default aggregation for this instrument kind.
    #[must_use]
    pub fn default_aggregation(self) -> AggregationSelection {
        match self {
            Self::Counter
            | Self::UpDownCounter
            | Self::ObservableCounter
            | Self::ObservableUpDownCounter => AggregationSelection::Sum,
            Self::Gauge | Self::ObservableGauge => AggregationSelection::LastValue,
            Self::Histogram => AggregationSelection::ExplicitBucketHistogram {
                boundaries: DEFAULT_HISTOGRAM_BOUNDARIES.to_vec(),
                record_min_max: true,
            },
        }
    }
}

/// Default explicit bucket boundaries for histogram instruments.
pub const DEFAULT_HISTOGRAM_BOUNDARIES: [f64; 15] = [
    0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 2500.0, 5000.0, 7500.0,
    10000.0,
];

/// The aggregation the runtime should apply to an instrument.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationSelection {
    /// Measurements are dropped.
    Drop,
    /// Measurements are summed.
    Sum,
    /// The last measurement wins.
    LastValue,
    /// Measurements are bucketed into explicit boundaries.
    ExplicitBucketHistogram {
        /// Upper bucket boundaries in increasing order.
        boundaries: Vec<f64>,
        /// Whether min and max are recorded.
        record_min_max: bool,
    },
}

/// Numeric domain of a metric payload.
///
/// Persisted values live in a single `f64` column, so integer payloads are
/// widened. Integers with a magnitude above 2^53 lose precision here.
pub trait Numeric: Copy + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Widens the value to `f64`.
    fn to_f64(self) -> f64;
}

impl Numeric for i64 {
    #[allow(clippy::cast_precision_loss)]
    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Numeric for f64 {
    fn to_f64(self) -> f64 {
        self
    }
}

/// A raw measurement sampled alongside an aggregate, tied to a trace context.
#[derive(Debug, Clone, PartialEq)]
pub struct Exemplar<T> {
    /// Attributes that were filtered out of the aggregate.
    pub filtered_attributes: AttributeSet,
    /// When the measurement was taken.
    pub time: DateTime<Utc>,
    /// The measured value.
    pub value: T,
    /// Trace the measurement was recorded in, if any.
    pub trace_id: Option<TraceId>,
    /// Span the measurement was recorded in, if any.
    pub span_id: Option<SpanId>,
}

/// A single timestamped reading of a sum or gauge.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint<T> {
    /// Attributes identifying the time series.
    pub attributes: AttributeSet,
    /// Start of the accumulation window.
    pub start_time: Option<DateTime<Utc>>,
    /// Time of the reading.
    pub time: DateTime<Utc>,
    /// The reading.
    pub value: T,
    /// Sampled exemplars.
    pub exemplars: Vec<Exemplar<T>>,
}

impl<T> DataPoint<T> {
    /// Creates a data point without exemplars.
    #[must_use]
    pub fn new(time: DateTime<Utc>, value: T, attributes: AttributeSet) -> Self {
        Self {
            attributes,
            start_time: None,
            time,
            value,
            exemplars: Vec::new(),
        }
    }
}

/// A sum aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct Sum<T> {
    /// Readings, one per attribute set.
    pub data_points: Vec<DataPoint<T>>,
    /// Temporality of the readings.
    pub temporality: Temporality,
    /// Whether the sum only ever increases.
    pub is_monotonic: bool,
}

impl<T> Sum<T> {
    /// Creates a cumulative monotonic sum.
    #[must_use]
    pub fn new(data_points: Vec<DataPoint<T>>) -> Self {
        Self {
            data_points,
            temporality: Temporality::Cumulative,
            is_monotonic: true,
        }
    }
}

/// A gauge aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct Gauge<T> {
    /// Readings, one per attribute set.
    pub data_points: Vec<DataPoint<T>>,
}

impl<T> Gauge<T> {
    /// Creates a gauge.
    #[must_use]
    pub fn new(data_points: Vec<DataPoint<T>>) -> Self {
        Self { data_points }
    }
}

/// A single timestamped histogram reading.
///
/// `bucket_counts` has one more entry than `bounds`; the last count belongs
/// to the overflow bucket above the highest bound.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramDataPoint<T> {
    /// Attributes identifying the time series.
    pub attributes: AttributeSet,
    /// Start of the accumulation window.
    pub start_time: Option<DateTime<Utc>>,
    /// Time of the reading.
    pub time: DateTime<Utc>,
    /// Number of observations.
    pub count: u64,
    /// Upper bucket boundaries in increasing order.
    pub bounds: Vec<f64>,
    /// Observation count per bucket.
    pub bucket_counts: Vec<u64>,
    /// Smallest observation, if recorded.
    pub min: Option<T>,
    /// Largest observation, if recorded.
    pub max: Option<T>,
    /// Sum of all observations.
    pub sum: T,
    /// Sampled exemplars.
    pub exemplars: Vec<Exemplar<T>>,
}

/// A histogram aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram<T> {
    /// Readings, one per attribute set.
    pub data_points: Vec<HistogramDataPoint<T>>,
    /// Temporality of the readings.
    pub temporality: Temporality,
}

impl<T> Histogram<T> {
    /// Creates a cumulative histogram.
    #[must_use]
    pub fn new(data_points: Vec<HistogramDataPoint<T>>) -> Self {
        Self {
            data_points,
            temporality: Temporality::Cumulative,
        }
    }
}

/// The payload of a metric.
///
/// Six variants are persisted; anything else arrives as
/// [`Aggregation::Unsupported`] and is rejected by the exporter.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    /// Integer sum.
    SumI64(Sum<i64>),
    /// Float sum.
    SumF64(Sum<f64>),
    /// Integer gauge.
    GaugeI64(Gauge<i64>),
    /// Float gauge.
    GaugeF64(Gauge<f64>),
    /// Integer histogram.
    HistogramI64(Histogram<i64>),
    /// Float histogram.
    HistogramF64(Histogram<f64>),
    /// An aggregation the exporter cannot persist, named by `kind`.
    Unsupported {
        /// Name of the aggregation, e.g. `ExponentialHistogram`.
        kind: String,
    },
}

impl Aggregation {
    /// Returns a short name of the payload variant.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::SumI64(_) => "Sum<i64>",
            Self::SumF64(_) => "Sum<f64>",
            Self::GaugeI64(_) => "Gauge<i64>",
            Self::GaugeF64(_) => "Gauge<f64>",
            Self::HistogramI64(_) => "Histogram<i64>",
            Self::HistogramF64(_) => "Histogram<f64>",
            Self::Unsupported { kind } => kind,
        }
    }

    /// Returns the persisted kind, or `None` for unsupported payloads.
    #[must_use]
    pub const fn kind(&self) -> Option<MetricKind> {
        match self {
            Self::SumI64(_) | Self::SumF64(_) => Some(MetricKind::Counter),
            Self::GaugeI64(_) | Self::GaugeF64(_) => Some(MetricKind::Gauge),
            Self::HistogramI64(_) | Self::HistogramF64(_) => Some(MetricKind::Histogram),
            Self::Unsupported { .. } => None,
        }
    }
}

/// A named metric with its aggregated payload.
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct Metric {
    /// The metric name (e.g. "`http.server.duration`").
    #[validate(length(min = 1, message = "Metric name cannot be empty"))]
    pub name: String,
    /// Human readable description; may be empty.
    pub description: String,
    /// Unit of measurement; may be empty.
    pub unit: String,
    /// The aggregated payload.
    pub data: Aggregation,
}

impl Metric {
    /// Creates a metric with an empty description and unit.
    #[must_use]
    pub fn new(name: impl Into<String>, data: Aggregation) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            unit: String::new(),
            data,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the unit.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

/// Metrics produced by a single instrumentation scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeMetrics {
    /// The producing scope.
    pub scope: InstrumentationScope,
    /// The metrics in this group.
    pub metrics: Vec<Metric>,
}

/// A batch of metrics produced by one resource.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use shared::models::{
///     Aggregation, AttributeSet, DataPoint, Gauge, InstrumentationScope, Metric,
///     ResourceMetrics, ScopeMetrics,
/// };
///
/// let point = DataPoint::new(Utc::now(), 42_i64, AttributeSet::new().with("host", "a"));
/// let batch = ResourceMetrics::default().with_scope(ScopeMetrics {
///     scope: InstrumentationScope::new("runtime"),
///     metrics: vec![Metric::new("queue.depth", Aggregation::GaugeI64(Gauge::new(vec![point])))],
/// });
///
/// assert_eq!(batch.metric_count(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceMetrics {
    /// The producing resource.
    pub resource: Resource,
    /// Metrics grouped by instrumentation scope.
    pub scope_metrics: Vec<ScopeMetrics>,
}

impl ResourceMetrics {
    /// Appends a scope group.
    #[must_use]
    pub fn with_scope(mut self, scope_metrics: ScopeMetrics) -> Self {
        self.scope_metrics.push(scope_metrics);
        self
    }

    /// Returns the total number of metrics across all scope groups.
    #[must_use]
    pub fn metric_count(&self) -> usize {
        self.scope_metrics.iter().map(|sm| sm.metrics.len()).sum()
    }

    /// Returns true when the batch holds no metrics.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metric_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_kind_display() {
        assert_eq!(MetricKind::Counter.to_string(), "counter");
        assert_eq!(MetricKind::Gauge.to_string(), "gauge");
        assert_eq!(MetricKind::Histogram.to_string(), "histogram");
    }

    #[test]
    fn test_aggregation_kind_mapping() {
        assert_eq!(
            Aggregation::SumI64(Sum::new(vec![])).kind(),
            Some(MetricKind::Counter)
        );
        assert_eq!(
            Aggregation::GaugeF64(Gauge::new(vec![])).kind(),
            Some(MetricKind::Gauge)
        );
        assert_eq!(
            Aggregation::HistogramI64(Histogram::new(vec![])).kind(),
            Some(MetricKind::Histogram)
        );
        let unsupported = Aggregation::Unsupported {
            kind: "Summary".to_string(),
        };
        assert_eq!(unsupported.kind(), None);
        assert_eq!(unsupported.type_name(), "Summary");
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_numeric_widening() {
        assert_eq!(42_i64.to_f64(), 42.0);
        assert_eq!((-7_i64).to_f64(), -7.0);
        // 2^53 + 1 is the first integer f64 cannot hold.
        assert_eq!((9_007_199_254_740_993_i64).to_f64(), 9_007_199_254_740_992.0);
    }

    #[test]
    fn test_default_aggregation() {
        assert_eq!(
            InstrumentKind::Counter.default_aggregation(),
            AggregationSelection::Sum
        );
        assert_eq!(
            InstrumentKind::ObservableGauge.default_aggregation(),
            AggregationSelection::LastValue
        );
        match InstrumentKind::Histogram.default_aggregation() {
            AggregationSelection::ExplicitBucketHistogram { boundaries, .. } => {
                assert_eq!(boundaries.len(), 15);
            }
            other => panic!("unexpected aggregation: {other:?}"),
        }
    }

    #[test]
    fn test_metric_validation_empty_name() {
        let metric = Metric::new("", Aggregation::GaugeF64(Gauge::new(vec![])));
        assert!(metric.validate().is_err());

        let metric = Metric::new("ok", Aggregation::GaugeF64(Gauge::new(vec![])));
        assert!(metric.validate().is_ok());
    }

    #[test]
    fn test_metric_count() {
        let batch = ResourceMetrics::default()
            .with_scope(ScopeMetrics::default())
            .with_scope(ScopeMetrics {
                scope: InstrumentationScope::new("a"),
                metrics: vec![
                    Metric::new("m1", Aggregation::SumF64(Sum::new(vec![]))),
                    Metric::new("m2", Aggregation::SumF64(Sum::new(vec![]))),
                ],
            });
        assert_eq!(batch.metric_count(), 2);
        assert!(!batch.is_empty());
        assert!(ResourceMetrics::default().is_empty());
    }
}
