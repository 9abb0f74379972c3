//! Protocol-neutral description of one remote call.
//!
//! A generated facade method builds one [`OperationDescriptor`] per call from
//! its typed arguments and hands it to the execution engine. The descriptor is
//! immutable once built: every attempt of a retried call sees exactly the same
//! parameters.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ClientConfig, OperationName, Protocol};

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Where a parameter travels on the wire.
///
/// Adapters interpret placements for their own protocol; for GraphQL every
/// non-header placement becomes a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Substituted into a `{name}` placeholder of the target path.
    Path,
    /// Appended to the request query string.
    Query,
    /// Sent as request metadata (HTTP header or gRPC metadata entry).
    Header,
    /// Part of the request payload (REST body field, GraphQL variable,
    /// gRPC message field).
    Body,
}

/// One named argument of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Wire name of the parameter.
    pub name: String,
    /// Parameter value.
    pub value: Value,
    /// Where the value is placed on the wire.
    pub placement: Placement,
}

impl Parameter {
    /// Renders a scalar value the way it appears in a path, query string or
    /// header: strings without quotes, everything else as compact JSON.
    pub fn value_as_text(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// OperationDescriptor
// ---------------------------------------------------------------------------

/// Protocol-neutral description of one remote call.
///
/// `target` is interpreted by the adapter of `protocol`:
///
/// | Protocol | Target |
/// |----------|--------|
/// | REST | `"<VERB> <path template>"`, e.g. `"GET /pets/{petId}"` |
/// | GraphQL | operation name (document resolved by the adapter) or a document |
/// | gRPC | `"package.Service/Method"` |
#[derive(Debug, Clone, PartialEq)]
pub struct OperationDescriptor {
    name: OperationName,
    protocol: Protocol,
    target: String,
    parameters: Vec<Parameter>,
    timeout: Option<Duration>,
    document: Option<String>,
}

impl OperationDescriptor {
    /// Starts building a descriptor for `name`, carried on `protocol`, aimed
    /// at `target`.
    pub fn builder(
        name: OperationName,
        protocol: Protocol,
        target: impl Into<String>,
    ) -> OperationDescriptorBuilder {
        OperationDescriptorBuilder {
            descriptor: OperationDescriptor {
                name,
                protocol,
                target: target.into(),
                parameters: Vec::new(),
                timeout: None,
                document: None,
            },
        }
    }

    /// Logical operation name; telemetry is aggregated under it.
    pub fn name(&self) -> &OperationName {
        &self.name
    }

    /// Protocol the call is carried on.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Adapter-specific target (path, query name, or rpc method).
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Parameters in the order they were added.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Parameters with the given placement, in insertion order.
    pub fn parameters_in(&self, placement: Placement) -> impl Iterator<Item = &Parameter> {
        self.parameters
            .iter()
            .filter(move |p| p.placement == placement)
    }

    /// Per-attempt timeout override, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// GraphQL document attached to this call, if the facade supplied one.
    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    /// Timeout applied to each attempt: the descriptor's own value, else the
    /// client default.
    pub fn effective_timeout(&self, config: &ClientConfig) -> Duration {
        self.timeout.unwrap_or(config.default_timeout())
    }
}

/// Consuming builder for [`OperationDescriptor`].
#[derive(Debug, Clone)]
pub struct OperationDescriptorBuilder {
    descriptor: OperationDescriptor,
}

impl OperationDescriptorBuilder {
    /// Adds a parameter with an explicit placement.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>, placement: Placement) -> Self {
        self.descriptor.parameters.push(Parameter {
            name: name.into(),
            value: value.into(),
            placement,
        });
        self
    }

    /// Adds a path parameter.
    pub fn path(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.param(name, value, Placement::Path)
    }

    /// Adds a query parameter.
    pub fn query(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.param(name, value, Placement::Query)
    }

    /// Adds a header / metadata parameter.
    pub fn header(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.param(name, value, Placement::Header)
    }

    /// Adds a body parameter (GraphQL variable, gRPC message field).
    pub fn body(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.param(name, value, Placement::Body)
    }

    /// Overrides the client's default per-attempt timeout. A zero timeout is
    /// ignored and the client default applies.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.descriptor.timeout = Some(timeout).filter(|t| !t.is_zero());
        self
    }

    /// Attaches the GraphQL document to send.
    pub fn document(mut self, document: impl Into<String>) -> Self {
        self.descriptor.document = Some(document.into());
        self
    }

    /// Finishes the descriptor.
    pub fn build(self) -> OperationDescriptor {
        self.descriptor
    }
}
