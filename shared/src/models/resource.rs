//! Resource and instrumentation scope metadata.

use super::attribute::AttributeSet;

/// The entity (process, service, host) that produced telemetry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resource {
    /// Attributes describing the resource, e.g. `service.name`.
    pub attributes: AttributeSet,
    /// Schema URL of the resource attributes, if any.
    pub schema_url: String,
}

impl Resource {
    /// Creates a resource from an attribute set.
    #[must_use]
    pub fn new(attributes: AttributeSet) -> Self {
        Self {
            attributes,
            schema_url: String::new(),
        }
    }
}

/// The instrumentation library that produced a group of telemetry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstrumentationScope {
    /// Library name, e.g. `tallyspan.http`.
    pub name: String,
    /// Library version; may be empty.
    pub version: String,
    /// Schema URL; may be empty.
    pub schema_url: String,
    /// Scope attributes.
    pub attributes: AttributeSet,
}

impl InstrumentationScope {
    /// Creates a scope with only a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the scope version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets the scope schema URL.
    #[must_use]
    pub fn with_schema_url(mut self, schema_url: impl Into<String>) -> Self {
        self.schema_url = schema_url.into();
        self
    }

    /// Sets the scope attributes.
    #[must_use]
    pub fn with_attributes(mut self, attributes: AttributeSet) -> Self {
        self.attributes = attributes;
        self
    }
}
