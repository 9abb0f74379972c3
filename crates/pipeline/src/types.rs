//! Shared value types for the execution pipeline.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! behaviour: [`Protocol`] selects both the transport adapter and the
//! classification rules for a call, and [`Timestamp`] stamps telemetry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

/// Wire protocol a remote operation is carried on.
///
/// The execution engine is protocol-neutral; the protocol only decides which
/// [`crate::Transport`] is invoked and which rule set [`crate::classify`]
/// applies to the raw response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Plain HTTP resources addressed by verb and path.
    Rest,
    /// GraphQL documents posted to a single endpoint.
    GraphQl,
    /// Unary gRPC methods on an HTTP/2 channel.
    Grpc,
}

impl Protocol {
    /// Every supported protocol, in a stable order.
    pub const ALL: [Protocol; 3] = [Protocol::Rest, Protocol::GraphQl, Protocol::Grpc];

    /// Returns the lower-case label used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Rest => "rest",
            Protocol::GraphQl => "graphql",
            Protocol::Grpc => "grpc",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
