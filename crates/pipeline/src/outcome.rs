//! What comes back from a transport attempt, before and after classification.
//!
//! A transport adapter produces either a [`RawResponse`] (the backend answered,
//! whatever it said) or a [`TransportError`] (no usable answer). The
//! classifier turns either into exactly one [`Outcome`].

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::{CallError, ErrorKind};

// ---------------------------------------------------------------------------
// Adapter output
// ---------------------------------------------------------------------------

/// Uninterpreted response of one transport attempt.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawResponse {
    /// HTTP status code, or gRPC status code for the gRPC adapter.
    pub status: i32,
    /// Response body (gRPC: the encoded response message).
    pub body: Bytes,
    /// Response metadata with lower-cased names.
    pub headers: BTreeMap<String, String>,
}

impl RawResponse {
    /// Creates a response with the given status and body and no headers.
    pub fn new(status: i32, body: impl Into<Bytes>) -> Self {
        Self { status, body: body.into(), headers: BTreeMap::new() }
    }

    /// Adds a header; the name is stored lower-cased.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Looks a header up by (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Low-level failure of a transport attempt: no response was obtained.
///
/// Distinct from application-level errors, which arrive as a [`RawResponse`]
/// and are judged by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The endpoint could not be reached (refused, DNS, TLS handshake).
    #[error("connect failed: {0}")]
    Connect(String),
    /// No response arrived before the attempt deadline.
    #[error("timed out: {0}")]
    Timeout(String),
    /// The connection failed while the request or response was in flight.
    #[error("i/o failure: {0}")]
    Io(String),
    /// The request could not be built from the descriptor.
    #[error("could not encode request: {0}")]
    Encode(String),
    /// The adapter has no integration for this operation.
    #[error("unimplemented: {0}")]
    Unimplemented(String),
    /// The connection resource was released by closing the client.
    #[error("client closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// Classified outcome
// ---------------------------------------------------------------------------

/// Successful response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Body bytes exactly as received (REST body, gRPC message).
    Bytes(Bytes),
    /// Already-parsed structured data (GraphQL `data`).
    Json(Value),
}

impl Payload {
    /// Decodes the payload into a typed model.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Serialization`] if the payload does not have the
    /// expected shape.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CallError> {
        let decoded = match self {
            Payload::Bytes(bytes) => serde_json::from_slice(bytes),
            Payload::Json(value) => T::deserialize(value),
        };
        decoded.map_err(|e| CallError::Serialization { message: e.to_string() })
    }

    /// Returns the payload as bytes, serialising structured data as JSON.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Payload::Bytes(bytes) => bytes.clone(),
            Payload::Json(value) => Bytes::from(value.to_string()),
        }
    }
}

/// A classified failure of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    /// Protocol-neutral kind.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Whether a retry may succeed.
    pub transient: bool,
    /// HTTP status or gRPC code, when a response was received.
    pub status: Option<i32>,
}

impl Failure {
    /// A failure that may succeed on retry.
    pub fn transient(kind: ErrorKind, message: impl Into<String>, status: Option<i32>) -> Self {
        Self { kind, message: message.into(), transient: true, status }
    }

    /// A failure that will not change on retry.
    pub fn permanent(kind: ErrorKind, message: impl Into<String>, status: Option<i32>) -> Self {
        Self { kind, message: message.into(), transient: false, status }
    }

    /// Converts the failure into the error surfaced to callers.
    pub fn into_error(self) -> CallError {
        CallError::from_kind(self.kind, self.message, self.status)
    }
}

/// Result of classifying one transport attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Payload),
    Failure(Failure),
}

impl Outcome {
    /// Returns `true` for [`Outcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}
