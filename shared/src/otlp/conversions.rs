//! Conversions from OTLP protobuf types into Tallyspan producer types.
//!
//! Metric requests become [`ResourceMetrics`] batches for the exporter;
//! trace requests become [`SpanData`] for the canonicalizer.

use crate::models::{
    self, Aggregation, AttributeSet, DataPoint, Gauge, Histogram, HistogramDataPoint,
    InstrumentationScope, KeyValue, Metric, Resource, ResourceMetrics, ScopeMetrics, SpanContext,
    SpanData, SpanId, SpanKind, Status, StatusCode, Sum, Temporality, TraceFlags, TraceId,
    TraceState, Value,
};
use crate::otlp::proto;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::{Duration, UNIX_EPOCH};

/// Span flag bit telling that the remote bit below is meaningful.
const FLAG_HAS_IS_REMOTE: u32 = 0x100;
/// Span flag bit set when the parent or linked context was remote.
const FLAG_IS_REMOTE: u32 = 0x200;

/// Converts an OTLP timestamp (nanoseconds since epoch) to a `DateTime<Utc>`.
fn timestamp_to_datetime(nanos: u64) -> DateTime<Utc> {
    let duration = Duration::from_nanos(nanos);
    DateTime::<Utc>::from(UNIX_EPOCH + duration)
}

/// Converts OTLP `AnyValue` to `serde_json::Value`.
fn any_value_to_json(value: &proto::common::v1::AnyValue) -> serde_json::Value {
    use proto::common::v1::any_value::Value;

    match &value.value {
        Some(Value::StringValue(s)) => serde_json::Value::String(s.clone()),
        Some(Value::BoolValue(b)) => serde_json::Value::Bool(*b),
        Some(Value::IntValue(i)) => serde_json::Value::Number((*i).into()),
        Some(Value::DoubleValue(d)) => serde_json::Number::from_f64(*d)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Some(Value::ArrayValue(arr)) => {
            serde_json::Value::Array(arr.values.iter().map(any_value_to_json).collect())
        }
        Some(Value::KvlistValue(kv)) => {
            let mut map = serde_json::Map::new();
            for pair in &kv.values {
                if let Some(ref v) = pair.value {
                    map.insert(pair.key.clone(), any_value_to_json(v));
                }
            }
            serde_json::Value::Object(map)
        }
        Some(Value::BytesValue(b)) => serde_json::Value::String(base64_encode(b)),
        None => serde_json::Value::Null,
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Converts a homogeneous OTLP array into a typed array; mixed arrays are
/// rendered as a JSON string.
fn array_to_value(array: &proto::common::v1::ArrayValue) -> Value {
    use proto::common::v1::any_value::Value as Otlp;

    let items: Vec<&Otlp> = array.values.iter().filter_map(|v| v.value.as_ref()).collect();

    let bools: Option<Vec<bool>> = items
        .iter()
        .map(|v| match v {
            Otlp::BoolValue(b) => Some(*b),
            _ => None,
        })
        .collect();
    let ints: Option<Vec<i64>> = items
        .iter()
        .map(|v| match v {
            Otlp::IntValue(i) => Some(*i),
            _ => None,
        })
        .collect();
    let doubles: Option<Vec<f64>> = items
        .iter()
        .map(|v| match v {
            Otlp::DoubleValue(d) => Some(*d),
            _ => None,
        })
        .collect();
    let strings: Option<Vec<String>> = items
        .iter()
        .map(|v| match v {
            Otlp::StringValue(s) => Some(s.clone()),
            _ => None,
        })
        .collect();

    // An empty array matches every variant; it becomes an empty string array.
    match (strings, bools, ints, doubles) {
        (Some(s), ..) => Value::StringArray(s),
        (None, Some(b), ..) => Value::BoolArray(b),
        (None, None, Some(i), _) => Value::I64Array(i),
        (None, None, None, Some(d)) => Value::F64Array(d),
        (None, None, None, None) => {
            let json = serde_json::Value::Array(array.values.iter().map(any_value_to_json).collect());
            Value::String(json.to_string())
        }
    }
}

/// Converts OTLP `AnyValue` to an attribute value. Returns `None` for an
/// empty value.
fn any_value_to_value(value: &proto::common::v1::AnyValue) -> Option<Value> {
    use proto::common::v1::any_value::Value as Otlp;

    let converted = match value.value.as_ref()? {
        Otlp::StringValue(s) => Value::String(s.clone()),
        Otlp::BoolValue(b) => Value::Bool(*b),
        Otlp::IntValue(i) => Value::I64(*i),
        Otlp::DoubleValue(d) => Value::F64(*d),
        Otlp::ArrayValue(arr) => array_to_value(arr),
        Otlp::KvlistValue(_) => Value::String(any_value_to_json(value).to_string()),
        Otlp::BytesValue(b) => Value::String(base64_encode(b)),
    };
    Some(converted)
}

/// Converts OTLP key-value pairs to an ordered attribute set. Pairs without
/// a value are skipped.
fn key_values_to_attributes(attributes: &[proto::common::v1::KeyValue]) -> AttributeSet {
    attributes
        .iter()
        .filter_map(|kv| {
            kv.value
                .as_ref()
                .and_then(any_value_to_value)
                .map(|value| KeyValue::new(kv.key.clone(), value))
        })
        .collect()
}

fn otlp_resource(resource: Option<&proto::resource::v1::Resource>, schema_url: &str) -> Resource {
    let mut converted = Resource::new(
        resource
            .map(|r| key_values_to_attributes(&r.attributes))
            .unwrap_or_default(),
    );
    converted.schema_url = schema_url.to_string();
    converted
}

fn otlp_scope(
    scope: Option<&proto::common::v1::InstrumentationScope>,
    schema_url: &str,
) -> InstrumentationScope {
    let Some(scope) = scope else {
        return InstrumentationScope::default().with_schema_url(schema_url);
    };
    InstrumentationScope::new(scope.name.clone())
        .with_version(scope.version.clone())
        .with_schema_url(schema_url)
        .with_attributes(key_values_to_attributes(&scope.attributes))
}

fn otlp_temporality(temporality: i32) -> Temporality {
    use proto::metrics::v1::AggregationTemporality;

    match AggregationTemporality::try_from(temporality) {
        Ok(AggregationTemporality::Delta) => Temporality::Delta,
        _ => Temporality::Cumulative,
    }
}

fn otlp_exemplars<T>(
    exemplars: &[proto::metrics::v1::Exemplar],
    value_of: impl Fn(&proto::metrics::v1::exemplar::Value) -> T,
) -> Vec<models::Exemplar<T>> {
    exemplars
        .iter()
        .filter_map(|e| {
            let value = value_of(e.value.as_ref()?);
            Some(models::Exemplar {
                filtered_attributes: key_values_to_attributes(&e.filtered_attributes),
                time: timestamp_to_datetime(e.time_unix_nano),
                value,
                trace_id: TraceId::from_slice(&e.trace_id).ok(),
                span_id: SpanId::from_slice(&e.span_id).ok(),
            })
        })
        .collect()
}

fn start_time(nanos: u64) -> Option<DateTime<Utc>> {
    (nanos > 0).then(|| timestamp_to_datetime(nanos))
}

fn exemplar_as_f64(value: &proto::metrics::v1::exemplar::Value) -> f64 {
    use proto::metrics::v1::exemplar::Value;
    match value {
        Value::AsDouble(d) => *d,
        #[allow(clippy::cast_precision_loss)]
        Value::AsInt(i) => *i as f64,
    }
}

fn exemplar_as_i64(value: &proto::metrics::v1::exemplar::Value) -> i64 {
    use proto::metrics::v1::exemplar::Value;
    match value {
        #[allow(clippy::cast_possible_truncation)]
        Value::AsDouble(d) => *d as i64,
        Value::AsInt(i) => *i,
    }
}

/// Number data points in the narrowest domain that holds all of them.
enum NumberPoints {
    Int(Vec<DataPoint<i64>>),
    Float(Vec<DataPoint<f64>>),
}

/// Converts number data points. Returns the i64 form when every point
/// carries an integer, otherwise the f64 form with integers widened.
/// Points without a value are skipped.
fn otlp_number_points(
    metric: &str,
    points: &[proto::metrics::v1::NumberDataPoint],
) -> NumberPoints {
    use proto::metrics::v1::number_data_point::Value as Number;

    let points: Vec<_> = points
        .iter()
        .filter(|p| {
            if p.value.is_none() {
                tracing::warn!(metric, "Skipping number data point without a value");
            }
            p.value.is_some()
        })
        .collect();

    let all_ints = points
        .iter()
        .all(|p| matches!(p.value, Some(Number::AsInt(_))));

    if all_ints {
        let points = points
            .iter()
            .filter_map(|p| {
                let Some(Number::AsInt(value)) = p.value else {
                    return None;
                };
                Some(DataPoint {
                    attributes: key_values_to_attributes(&p.attributes),
                    start_time: start_time(p.start_time_unix_nano),
                    time: timestamp_to_datetime(p.time_unix_nano),
                    value,
                    exemplars: otlp_exemplars(&p.exemplars, exemplar_as_i64),
                })
            })
            .collect();
        return NumberPoints::Int(points);
    }

    let points = points
        .iter()
        .filter_map(|p| {
            let value = match p.value.as_ref()? {
                Number::AsDouble(d) => *d,
                #[allow(clippy::cast_precision_loss)]
                Number::AsInt(i) => *i as f64,
            };
            Some(DataPoint {
                attributes: key_values_to_attributes(&p.attributes),
                start_time: start_time(p.start_time_unix_nano),
                time: timestamp_to_datetime(p.time_unix_nano),
                value,
                exemplars: otlp_exemplars(&p.exemplars, exemplar_as_f64),
            })
        })
        .collect();
    NumberPoints::Float(points)
}

fn otlp_histogram_point(point: &proto::metrics::v1::HistogramDataPoint) -> HistogramDataPoint<f64> {
    HistogramDataPoint {
        attributes: key_values_to_attributes(&point.attributes),
        start_time: start_time(point.start_time_unix_nano),
        time: timestamp_to_datetime(point.time_unix_nano),
        count: point.count,
        bounds: point.explicit_bounds.clone(),
        bucket_counts: point.bucket_counts.clone(),
        min: point.min,
        max: point.max,
        sum: point.sum.unwrap_or(0.0),
        exemplars: otlp_exemplars(&point.exemplars, exemplar_as_f64),
    }
}

/// Converts an OTLP metric payload to an aggregation.
fn otlp_aggregation(metric: &str, data: Option<&proto::metrics::v1::metric::Data>) -> Aggregation {
    use proto::metrics::v1::metric::Data;

    match data {
        Some(Data::Sum(sum)) => {
            let temporality = otlp_temporality(sum.aggregation_temporality);
            match otlp_number_points(metric, &sum.data_points) {
                NumberPoints::Int(points) => Aggregation::SumI64(Sum {
                    data_points: points,
                    temporality,
                    is_monotonic: sum.is_monotonic,
                }),
                NumberPoints::Float(points) => Aggregation::SumF64(Sum {
                    data_points: points,
                    temporality,
                    is_monotonic: sum.is_monotonic,
                }),
            }
        }
        Some(Data::Gauge(gauge)) => match otlp_number_points(metric, &gauge.data_points) {
            NumberPoints::Int(points) => Aggregation::GaugeI64(Gauge::new(points)),
            NumberPoints::Float(points) => Aggregation::GaugeF64(Gauge::new(points)),
        },
        Some(Data::Histogram(histogram)) => Aggregation::HistogramF64(Histogram {
            data_points: histogram
                .data_points
                .iter()
                .map(otlp_histogram_point)
                .collect(),
            temporality: otlp_temporality(histogram.aggregation_temporality),
        }),
        Some(Data::ExponentialHistogram(_)) => Aggregation::Unsupported {
            kind: "ExponentialHistogram".to_string(),
        },
        Some(Data::Summary(_)) => Aggregation::Unsupported {
            kind: "Summary".to_string(),
        },
        None => Aggregation::Unsupported {
            kind: "Empty".to_string(),
        },
    }
}

/// Converts an OTLP metric into a Tallyspan [`Metric`].
#[must_use]
pub fn otlp_metric_to_metric(otlp_metric: &proto::metrics::v1::Metric) -> Metric {
    Metric::new(
        otlp_metric.name.clone(),
        otlp_aggregation(&otlp_metric.name, otlp_metric.data.as_ref()),
    )
    .with_description(otlp_metric.description.clone())
    .with_unit(otlp_metric.unit.clone())
}

/// Converts one OTLP resource group into a metrics batch.
#[must_use]
pub fn otlp_resource_metrics(resource_metrics: &proto::metrics::v1::ResourceMetrics) -> ResourceMetrics {
    ResourceMetrics {
        resource: otlp_resource(
            resource_metrics.resource.as_ref(),
            &resource_metrics.schema_url,
        ),
        scope_metrics: resource_metrics
            .scope_metrics
            .iter()
            .map(|sm| ScopeMetrics {
                scope: otlp_scope(sm.scope.as_ref(), &sm.schema_url),
                metrics: sm.metrics.iter().map(otlp_metric_to_metric).collect(),
            })
            .collect(),
    }
}

/// Converts a metrics export request into one batch per resource.
#[must_use]
pub fn metrics_request_to_batches(
    request: &proto::collector::metrics::v1::ExportMetricsServiceRequest,
) -> Vec<ResourceMetrics> {
    request
        .resource_metrics
        .iter()
        .map(otlp_resource_metrics)
        .collect()
}

/// Converts OTLP span status to [`Status`].
fn otlp_span_status_to_status(status: Option<&proto::trace::v1::Status>) -> Status {
    let Some(status) = status else {
        return Status::default();
    };
    let code = StatusCode::try_from(status.code).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "Treating unknown span status code as unset");
        StatusCode::Unset
    });
    Status {
        code,
        description: status.message.clone(),
    }
}

/// Converts OTLP span kind to [`SpanKind`].
fn otlp_span_kind_to_kind(kind: i32) -> SpanKind {
    use proto::trace::v1::span::SpanKind as OtlpSpanKind;

    match OtlpSpanKind::try_from(kind) {
        Ok(OtlpSpanKind::Server) => SpanKind::Server,
        Ok(OtlpSpanKind::Client) => SpanKind::Client,
        Ok(OtlpSpanKind::Producer) => SpanKind::Producer,
        Ok(OtlpSpanKind::Consumer) => SpanKind::Consumer,
        _ => SpanKind::Internal,
    }
}

fn is_remote(flags: u32) -> bool {
    flags & FLAG_HAS_IS_REMOTE != 0 && flags & FLAG_IS_REMOTE != 0
}

fn trace_flags(flags: u32) -> TraceFlags {
    // Only the low byte carries W3C trace flags.
    TraceFlags::new(flags.to_le_bytes()[0])
}

fn otlp_link(link: &proto::trace::v1::span::Link) -> Option<models::Link> {
    let trace_id = TraceId::from_slice(&link.trace_id).ok()?;
    let span_id = SpanId::from_slice(&link.span_id).ok()?;
    let mut span_context = SpanContext::new(trace_id, span_id, trace_flags(link.flags));
    span_context.trace_state = TraceState::from_header(&link.trace_state);
    span_context.is_remote = is_remote(link.flags);
    Some(models::Link {
        span_context,
        attributes: key_values_to_attributes(&link.attributes),
    })
}

/// Converts an OTLP span to [`SpanData`].
///
/// Returns `None` when the trace or span id is malformed. `child_span_count`
/// is left at zero; [`trace_request_to_spans`] fills it in.
#[must_use]
pub fn otlp_span_to_span_data(
    otlp_span: &proto::trace::v1::Span,
    resource: &Resource,
    scope: &InstrumentationScope,
) -> Option<SpanData> {
    let trace_id = match TraceId::from_slice(&otlp_span.trace_id) {
        Ok(id) => id,
        Err(err) => {
            tracing::warn!(span = %otlp_span.name, error = %err, "Skipping span with malformed trace id");
            return None;
        }
    };
    let span_id = match SpanId::from_slice(&otlp_span.span_id) {
        Ok(id) => id,
        Err(err) => {
            tracing::warn!(span = %otlp_span.name, error = %err, "Skipping span with malformed span id");
            return None;
        }
    };

    let flags = trace_flags(otlp_span.flags);
    let mut span_context = SpanContext::new(trace_id, span_id, flags);
    span_context.trace_state = TraceState::from_header(&otlp_span.trace_state);

    let parent = if otlp_span.parent_span_id.is_empty() {
        SpanContext::empty()
    } else {
        match SpanId::from_slice(&otlp_span.parent_span_id) {
            Ok(parent_id) => {
                let mut parent = SpanContext::new(trace_id, parent_id, flags);
                parent.is_remote = is_remote(otlp_span.flags);
                parent
            }
            Err(err) => {
                tracing::warn!(span = %otlp_span.name, error = %err, "Ignoring malformed parent span id");
                SpanContext::empty()
            }
        }
    };

    Some(SpanData {
        name: otlp_span.name.clone(),
        span_context,
        parent,
        span_kind: otlp_span_kind_to_kind(otlp_span.kind),
        start_time: timestamp_to_datetime(otlp_span.start_time_unix_nano),
        end_time: timestamp_to_datetime(otlp_span.end_time_unix_nano),
        attributes: key_values_to_attributes(&otlp_span.attributes),
        events: otlp_span
            .events
            .iter()
            .map(|e| models::Event {
                name: e.name.clone(),
                time: timestamp_to_datetime(e.time_unix_nano),
                attributes: key_values_to_attributes(&e.attributes),
            })
            .collect(),
        links: otlp_span.links.iter().filter_map(otlp_link).collect(),
        status: otlp_span_status_to_status(otlp_span.status.as_ref()),
        dropped_attributes: otlp_span.dropped_attributes_count,
        dropped_events: otlp_span.dropped_events_count,
        dropped_links: otlp_span.dropped_links_count,
        child_span_count: 0,
        resource: resource.clone(),
        instrumentation_scope: scope.clone(),
    })
}

/// Converts a trace export request into spans, in request order.
///
/// Child span counts are derived from the parent ids of the other spans in
/// the same request.
#[must_use]
pub fn trace_request_to_spans(
    request: &proto::collector::trace::v1::ExportTraceServiceRequest,
) -> Vec<SpanData> {
    let mut spans = Vec::new();
    for resource_spans in &request.resource_spans {
        let resource = otlp_resource(resource_spans.resource.as_ref(), &resource_spans.schema_url);
        for scope_spans in &resource_spans.scope_spans {
            let scope = otlp_scope(scope_spans.scope.as_ref(), &scope_spans.schema_url);
            spans.extend(
                scope_spans
                    .spans
                    .iter()
                    .filter_map(|span| otlp_span_to_span_data(span, &resource, &scope)),
            );
        }
    }

    let mut children: HashMap<(TraceId, SpanId), u32> = HashMap::new();
    for span in spans.iter().filter(|s| !s.is_root()) {
        *children
            .entry((span.parent.trace_id, span.parent.span_id))
            .or_default() += 1;
    }
    for span in &mut spans {
        let key = (span.span_context.trace_id, span.span_context.span_id);
        span.child_span_count = children.get(&key).copied().unwrap_or(0);
    }

    spans
}


#[cfg(test)]
#[path = "conversions_test.rs"]
mod conversions_test;
