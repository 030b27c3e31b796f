//! Trace and span data models.
//!
//! A [`SpanData`] is the read-only view of a completed span handed over by
//! the instrumentation runtime.

use super::attribute::AttributeSet;
use super::resource::{InstrumentationScope, Resource};
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

/// Errors raised when parsing trace identifiers.
#[derive(Debug, Error, PartialEq)]
pub enum TraceIdError {
    /// The input has the wrong number of bytes.
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        actual: usize,
    },

    /// The input is not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// A 16-byte trace identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TraceId([u8; 16]);

impl TraceId {
    /// The all-zero, invalid trace id.
    pub const INVALID: Self = Self([0; 16]);

    /// Creates a trace id from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Creates a trace id from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 16 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TraceIdError> {
        let array: [u8; 16] = bytes.try_into().map_err(|_| TraceIdError::InvalidLength {
            expected: 16,
            actual: bytes.len(),
        })?;
        Ok(Self(array))
    }

    /// Parses a trace id from 32 hex digits.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid hex or has the wrong length.
    pub fn from_hex(s: &str) -> Result<Self, TraceIdError> {
        Self::from_slice(&hex::decode(s)?)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0
    }

    /// Returns true unless this is the all-zero id.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// An 8-byte span identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SpanId([u8; 8]);

impl SpanId {
    /// The all-zero, invalid span id.
    pub const INVALID: Self = Self([0; 8]);

    /// Creates a span id from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Creates a span id from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 8 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TraceIdError> {
        let array: [u8; 8] = bytes.try_into().map_err(|_| TraceIdError::InvalidLength {
            expected: 8,
            actual: bytes.len(),
        })?;
        Ok(Self(array))
    }

    /// Parses a span id from 16 hex digits.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid hex or has the wrong length.
    pub fn from_hex(s: &str) -> Result<Self, TraceIdError> {
        Self::from_slice(&hex::decode(s)?)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn to_bytes(self) -> [u8; 8] {
        self.0
    }

    /// Returns true unless this is the all-zero id.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// W3C trace flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TraceFlags(u8);

impl TraceFlags {
    /// The sampled bit.
    pub const SAMPLED: Self = Self(0x01);

    /// Creates trace flags from their raw byte.
    #[must_use]
    pub const fn new(flags: u8) -> Self {
        Self(flags)
    }

    /// Returns the raw byte.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        self.0
    }

    /// Returns true if the sampled bit is set.
    #[must_use]
    pub const fn is_sampled(self) -> bool {
        self.0 & Self::SAMPLED.0 != 0
    }
}

impl fmt::Display for TraceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}", self.0)
    }
}

/// Vendor-specific trace state as ordered `key=value` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceState(Vec<(String, String)>);

impl TraceState {
    /// Creates trace state from ordered entries.
    #[must_use]
    pub fn from_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Parses the `tracestate` header form. Malformed members are skipped.
    #[must_use]
    pub fn from_header(header: &str) -> Self {
        Self(
            header
                .split(',')
                .filter_map(|member| {
                    let (key, value) = member.trim().split_once('=')?;
                    if key.is_empty() {
                        return None;
                    }
                    Some((key.to_string(), value.to_string()))
                })
                .collect(),
        )
    }

    /// Returns true when no entries are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the value for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for TraceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

/// Identity of a span within a trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanContext {
    /// Trace id.
    pub trace_id: TraceId,
    /// Span id.
    pub span_id: SpanId,
    /// Trace flags.
    pub trace_flags: TraceFlags,
    /// Trace state.
    pub trace_state: TraceState,
    /// Whether the context was propagated from a remote parent.
    pub is_remote: bool,
}

impl SpanContext {
    /// Creates a local span context.
    #[must_use]
    pub fn new(trace_id: TraceId, span_id: SpanId, trace_flags: TraceFlags) -> Self {
        Self {
            trace_id,
            span_id,
            trace_flags,
            trace_state: TraceState::default(),
            is_remote: false,
        }
    }

    /// The zero context used as the parent of root spans.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if both trace and span ids are valid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.trace_id.is_valid() && self.span_id.is_valid()
    }
}

/// Kind of span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpanKind {
    /// Default span kind (internal operation).
    #[default]
    Internal,
    /// The span represents a server handling a request.
    Server,
    /// The span represents a client making a request.
    Client,
    /// The span represents a producer sending a message.
    Producer,
    /// The span represents a consumer receiving a message.
    Consumer,
}

impl SpanKind {
    /// Returns the lowercase name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::Server => "server",
            Self::Client => "client",
            Self::Producer => "producer",
            Self::Consumer => "consumer",
        }
    }
}

impl fmt::Display for SpanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status code of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StatusCode {
    /// No status was set.
    #[default]
    Unset,
    /// The operation completed successfully.
    Ok,
    /// The operation failed.
    Error,
}

impl StatusCode {
    /// Returns the symbolic name of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unset => "Unset",
            Self::Ok => "Ok",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a raw status code is outside the defined range.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown span status code: {0}")]
pub struct UnknownStatusCode(pub i32);

impl TryFrom<i32> for StatusCode {
    type Error = UnknownStatusCode;

    fn try_from(raw: i32) -> Result<Self, UnknownStatusCode> {
        match raw {
            0 => Ok(Self::Unset),
            1 => Ok(Self::Ok),
            2 => Ok(Self::Error),
            other => Err(UnknownStatusCode(other)),
        }
    }
}

/// Final status of a span.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    /// The status code.
    pub code: StatusCode,
    /// Free-text description, usually only set for errors.
    pub description: String,
}

impl Status {
    /// An error status with a description.
    #[must_use]
    pub fn error(description: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Error,
            description: description.into(),
        }
    }

    /// An ok status.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            description: String::new(),
        }
    }
}

/// An event recorded during a span.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// The name of the event.
    pub name: String,
    /// Timestamp when the event occurred.
    pub time: DateTime<Utc>,
    /// Event attributes.
    pub attributes: AttributeSet,
}

/// A causal link to another span.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    /// The linked span.
    pub span_context: SpanContext,
    /// Link attributes.
    pub attributes: AttributeSet,
}

/// A completed span.
///
/// # Example
///
/// ```
/// use shared::models::{SpanData, SpanKind};
///
/// let span = SpanData::new("GET /api/users").with_kind(SpanKind::Server);
///
/// assert!(span.is_root());
/// assert_eq!(span.span_kind, SpanKind::Server);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SpanData {
    /// The operation name.
    pub name: String,
    /// This span's context.
    pub span_context: SpanContext,
    /// The parent's context; the zero context for root spans.
    pub parent: SpanContext,
    /// The kind of span.
    pub span_kind: SpanKind,
    /// Timestamp when the span started.
    pub start_time: DateTime<Utc>,
    /// Timestamp when the span ended.
    pub end_time: DateTime<Utc>,
    /// Span attributes.
    pub attributes: AttributeSet,
    /// Events in recording order.
    pub events: Vec<Event>,
    /// Links in recording order.
    pub links: Vec<Link>,
    /// Final status.
    pub status: Status,
    /// Attributes dropped by span limits.
    pub dropped_attributes: u32,
    /// Events dropped by span limits.
    pub dropped_events: u32,
    /// Links dropped by span limits.
    pub dropped_links: u32,
    /// Number of children started from this span.
    pub child_span_count: u32,
    /// The producing resource.
    pub resource: Resource,
    /// The producing instrumentation scope.
    pub instrumentation_scope: InstrumentationScope,
}

impl SpanData {
    /// Creates a root span with zero ids, starting and ending now.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            span_context: SpanContext::empty(),
            parent: SpanContext::empty(),
            span_kind: SpanKind::default(),
            start_time: now,
            end_time: now,
            attributes: AttributeSet::new(),
            events: Vec::new(),
            links: Vec::new(),
            status: Status::default(),
            dropped_attributes: 0,
            dropped_events: 0,
            dropped_links: 0,
            child_span_count: 0,
            resource: Resource::default(),
            instrumentation_scope: InstrumentationScope::default(),
        }
    }

    /// Sets the span context.
    #[must_use]
    pub fn with_context(mut self, span_context: SpanContext) -> Self {
        self.span_context = span_context;
        self
    }

    /// Sets the parent context.
    #[must_use]
    pub fn with_parent(mut self, parent: SpanContext) -> Self {
        self.parent = parent;
        self
    }

    /// Sets the span kind.
    #[must_use]
    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.span_kind = kind;
        self
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Sets the attributes.
    #[must_use]
    pub fn with_attributes(mut self, attributes: AttributeSet) -> Self {
        self.attributes = attributes;
        self
    }

    /// Appends an event.
    #[must_use]
    pub fn with_event(mut self, event: Event) -> Self {
        self.events.push(event);
        self
    }

    /// Appends a link.
    #[must_use]
    pub fn with_link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    /// Returns true if the span has no valid parent.
    #[must_use]
    pub fn is_root(&self) -> bool {
        !self.parent.span_id.is_valid()
    }
}
