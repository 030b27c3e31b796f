//! Span canonicalizer.
//!
//! [`canonicalize`] turns a completed [`SpanData`] into a [`SpanSnapshot`],
//! a nested structure that serializes directly to JSON with stable
//! PascalCase keys. Attribute values keep their type tag (see
//! [`codec::structure`](crate::codec::structure)).
//!
//! Empty events, links and scope attributes serialize as `null` rather than
//! `[]`.

use crate::codec::{self, AttributeNode};
use crate::models::{Event, InstrumentationScope, Link, SpanContext, SpanData, Status};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Rendered span or parent context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextSnapshot {
    /// 32 lowercase hex digits.
    #[serde(rename = "TraceID")]
    pub trace_id: String,
    /// 16 lowercase hex digits.
    #[serde(rename = "SpanID")]
    pub span_id: String,
    /// Two hex digits.
    #[serde(rename = "TraceFlags")]
    pub trace_flags: String,
    /// `key=value,...` header form.
    #[serde(rename = "TraceState")]
    pub trace_state: String,
    /// Whether the context came from a remote parent.
    #[serde(rename = "Remote")]
    pub remote: bool,
}

impl From<&SpanContext> for ContextSnapshot {
    fn from(ctx: &SpanContext) -> Self {
        Self {
            trace_id: ctx.trace_id.to_string(),
            span_id: ctx.span_id.to_string(),
            trace_flags: ctx.trace_flags.to_string(),
            trace_state: ctx.trace_state.to_string(),
            remote: ctx.is_remote,
        }
    }
}

/// Rendered span event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventSnapshot {
    /// Event name.
    pub name: String,
    /// When the event occurred.
    pub time: DateTime<Utc>,
    /// Event attributes.
    pub attributes: Vec<AttributeNode>,
}

impl From<&Event> for EventSnapshot {
    fn from(event: &Event) -> Self {
        Self {
            name: event.name.clone(),
            time: event.time,
            attributes: codec::structure(&event.attributes),
        }
    }
}

/// Rendered span link.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LinkSnapshot {
    /// The linked span.
    pub span_context: ContextSnapshot,
    /// Link attributes.
    pub attributes: Vec<AttributeNode>,
}

impl From<&Link> for LinkSnapshot {
    fn from(link: &Link) -> Self {
        Self {
            span_context: ContextSnapshot::from(&link.span_context),
            attributes: codec::structure(&link.attributes),
        }
    }
}

/// Rendered status; `code` is the symbolic name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusSnapshot {
    /// `Unset`, `Ok` or `Error`.
    pub code: &'static str,
    /// Free-text description.
    pub description: String,
}

impl From<&Status> for StatusSnapshot {
    fn from(status: &Status) -> Self {
        Self {
            code: status.code.as_str(),
            description: status.description.clone(),
        }
    }
}

/// Rendered instrumentation scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeSnapshot {
    /// Library name.
    #[serde(rename = "Name")]
    pub name: String,
    /// Library version.
    #[serde(rename = "Version")]
    pub version: String,
    /// Schema URL.
    #[serde(rename = "SchemaURL")]
    pub schema_url: String,
    /// `None` when the scope has no attributes.
    #[serde(rename = "Attributes")]
    pub attributes: Option<Vec<AttributeNode>>,
}

impl From<&InstrumentationScope> for ScopeSnapshot {
    fn from(scope: &InstrumentationScope) -> Self {
        Self {
            name: scope.name.clone(),
            version: scope.version.clone(),
            schema_url: scope.schema_url.clone(),
            attributes: non_empty(codec::structure(&scope.attributes)),
        }
    }
}

/// Canonical form of a completed span.
///
/// # Example
///
/// ```
/// use shared::models::{SpanData, Status};
/// use shared::snapshot::canonicalize;
///
/// let span = SpanData::new("charge").with_status(Status::error("card declined"));
/// let json = canonicalize(&span).to_json_value();
///
/// assert_eq!(json["Status"]["Code"], "Error");
/// assert!(json["Events"].is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SpanSnapshot {
    /// Operation name.
    pub name: String,
    /// This span's context.
    pub span_context: ContextSnapshot,
    /// Parent context; all zeros for a root span.
    pub parent: ContextSnapshot,
    /// Lowercase span kind.
    pub span_kind: &'static str,
    /// Start of the span.
    pub start_time: DateTime<Utc>,
    /// End of the span.
    pub end_time: DateTime<Utc>,
    /// Span attributes.
    pub attributes: Vec<AttributeNode>,
    /// `None` when the span recorded no events.
    pub events: Option<Vec<EventSnapshot>>,
    /// `None` when the span has no links.
    pub links: Option<Vec<LinkSnapshot>>,
    /// Final status.
    pub status: StatusSnapshot,
    /// Attributes dropped by span limits.
    pub dropped_attributes: u32,
    /// Events dropped by span limits.
    pub dropped_events: u32,
    /// Links dropped by span limits.
    pub dropped_links: u32,
    /// Number of child spans.
    pub child_span_count: u32,
    /// Resource attributes.
    pub resource: Vec<AttributeNode>,
    /// The producing scope.
    pub instrumentation_scope: ScopeSnapshot,
    /// Same content as `instrumentation_scope`, under the older key.
    pub instrumentation_library: ScopeSnapshot,
}

impl SpanSnapshot {
    /// Serializes the snapshot to a JSON value.
    #[must_use]
    pub fn to_json_value(&self) -> serde_json::Value {
        // Every field is a string, number, bool, sequence or struct of those.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

/// Maps a span into its canonical snapshot.
#[must_use]
pub fn canonicalize(span: &SpanData) -> SpanSnapshot {
    let scope = ScopeSnapshot::from(&span.instrumentation_scope);

    SpanSnapshot {
        name: span.name.clone(),
        span_context: ContextSnapshot::from(&span.span_context),
        parent: ContextSnapshot::from(&span.parent),
        span_kind: span.span_kind.as_str(),
        start_time: span.start_time,
        end_time: span.end_time,
        attributes: codec::structure(&span.attributes),
        events: non_empty(span.events.iter().map(EventSnapshot::from).collect()),
        links: non_empty(span.links.iter().map(LinkSnapshot::from).collect()),
        status: StatusSnapshot::from(&span.status),
        dropped_attributes: span.dropped_attributes,
        dropped_events: span.dropped_events,
        dropped_links: span.dropped_links,
        child_span_count: span.child_span_count,
        resource: codec::structure(&span.resource.attributes),
        instrumentation_library: scope.clone(),
        instrumentation_scope: scope,
    }
}
