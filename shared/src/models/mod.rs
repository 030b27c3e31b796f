//! Data models for the Tallyspan telemetry core.
//!
//! These are the in-memory records an instrumentation runtime hands over:
//! aggregated metric batches and completed spans.

pub mod attribute;
pub mod metric;
pub mod resource;
pub mod trace;

pub use attribute::{AttributeSet, KeyValue, Value, ValueType};
pub use metric::{
    Aggregation, AggregationSelection, DataPoint, Exemplar, Gauge, Histogram, HistogramDataPoint,
    InstrumentKind, Metric, MetricKind, Numeric, ResourceMetrics, ScopeMetrics, Sum, Temporality,
    DEFAULT_HISTOGRAM_BOUNDARIES,
};
pub use resource::{InstrumentationScope, Resource};
pub use trace::{
    Event, Link, SpanContext, SpanData, SpanId, SpanKind, Status, StatusCode, TraceFlags, TraceId,
    TraceIdError, TraceState, UnknownStatusCode,
};
