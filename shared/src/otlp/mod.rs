//! OpenTelemetry Protocol (OTLP) support.
//!
//! Decodes OTLP export requests (protobuf or JSON) and converts them into the
//! producer types consumed by the metric exporter and the span canonicalizer.
//!
//! # Example
//!
//! ```
//! use shared::otlp::{conversions::metrics_request_to_batches, proto};
//!
//! let request = proto::collector::metrics::v1::ExportMetricsServiceRequest::default();
//! assert!(metrics_request_to_batches(&request).is_empty());
//! ```

pub mod conversions;
pub mod encoding;

pub use encoding::{decode_file, decode_request, DecodeError, OtlpEncoding};

/// Generated OTLP message types.
pub use opentelemetry_proto::tonic as proto;
