//! Outcome classification: raw transport results into [`Outcome`]s.
//!
//! Every protocol follows the same shape (success, transient failure,
//! permanent failure, undecodable success) with its own predicates. Low-level
//! transport errors are classified identically for all protocols.

use bytes::Bytes;
use serde_json::Value;

use crate::{ErrorKind, Failure, Outcome, Payload, Protocol, RawResponse, TransportError};

/// HTTP statuses that signal a condition worth retrying.
pub const TRANSIENT_HTTP_STATUSES: [i32; 5] = [408, 429, 502, 503, 504];

// ---------------------------------------------------------------------------
// gRPC status codes
// ---------------------------------------------------------------------------

/// Canonical gRPC status codes used by the classification rules.
pub mod grpc_code {
    pub const OK: i32 = 0;
    pub const CANCELLED: i32 = 1;
    pub const UNKNOWN: i32 = 2;
    pub const INVALID_ARGUMENT: i32 = 3;
    pub const DEADLINE_EXCEEDED: i32 = 4;
    pub const NOT_FOUND: i32 = 5;
    pub const PERMISSION_DENIED: i32 = 7;
    pub const RESOURCE_EXHAUSTED: i32 = 8;
    pub const UNIMPLEMENTED: i32 = 12;
    pub const INTERNAL: i32 = 13;
    pub const UNAVAILABLE: i32 = 14;
    pub const UNAUTHENTICATED: i32 = 16;
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Classifies the result of one transport attempt.
///
/// Produces exactly one [`Outcome`] per attempt. Consumes the raw response.
pub fn classify(protocol: Protocol, attempt: Result<RawResponse, TransportError>) -> Outcome {
    match attempt {
        Ok(raw) => match protocol {
            Protocol::Rest => classify_rest(raw),
            Protocol::GraphQl => classify_graphql(raw),
            Protocol::Grpc => classify_grpc(raw),
        },
        Err(err) => Outcome::Failure(classify_transport_error(err)),
    }
}

/// Classifies a low-level transport failure, independent of protocol.
pub fn classify_transport_error(err: TransportError) -> Failure {
    let message = err.to_string();
    match err {
        TransportError::Connect(_) | TransportError::Io(_) => {
            Failure::transient(ErrorKind::Connection, message, None)
        }
        TransportError::Timeout(_) => Failure::transient(ErrorKind::Timeout, message, None),
        TransportError::Encode(_) => Failure::permanent(ErrorKind::Serialization, message, None),
        TransportError::Unimplemented(_) => {
            Failure::permanent(ErrorKind::Unimplemented, message, None)
        }
        // Retrying cannot succeed once the connection resource is gone.
        TransportError::Closed => Failure::permanent(ErrorKind::Connection, message, None),
    }
}

// ---------------------------------------------------------------------------
// REST
// ---------------------------------------------------------------------------

fn classify_rest(raw: RawResponse) -> Outcome {
    let status = raw.status;
    if (200..300).contains(&status) {
        if expects_json(&raw) && !raw.body.is_empty() {
            if let Err(e) = serde_json::from_slice::<serde::de::IgnoredAny>(&raw.body) {
                return Outcome::Failure(Failure::permanent(
                    ErrorKind::Serialization,
                    format!("malformed response body: {e}"),
                    Some(status),
                ));
            }
        }
        return Outcome::Success(Payload::Bytes(raw.body));
    }

    let message = http_error_message(status, &raw.body);
    if TRANSIENT_HTTP_STATUSES.contains(&status) {
        Outcome::Failure(Failure::transient(ErrorKind::Transient, message, Some(status)))
    } else {
        Outcome::Failure(Failure::permanent(ErrorKind::Protocol, message, Some(status)))
    }
}

/// A body is expected to be JSON unless the response declares another type.
fn expects_json(raw: &RawResponse) -> bool {
    match raw.header("content-type") {
        Some(content_type) => content_type.to_ascii_lowercase().contains("json"),
        None => true,
    }
}

fn http_error_message(status: i32, body: &Bytes) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {text}")
    }
}

// ---------------------------------------------------------------------------
// GraphQL
// ---------------------------------------------------------------------------

/// A response carrying both `data` and a non-empty `errors` array is a
/// failure: partial data is discarded.
fn classify_graphql(raw: RawResponse) -> Outcome {
    let status = raw.status;
    if !(200..300).contains(&status) {
        let message = http_error_message(status, &raw.body);
        return if status == 408 || status == 429 || status >= 500 {
            Outcome::Failure(Failure::transient(ErrorKind::Transient, message, Some(status)))
        } else {
            Outcome::Failure(Failure::permanent(ErrorKind::Protocol, message, Some(status)))
        };
    }

    let mut document = match serde_json::from_slice::<Value>(&raw.body) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            return Outcome::Failure(Failure::permanent(
                ErrorKind::Serialization,
                "GraphQL response is not a JSON object",
                Some(status),
            ))
        }
        Err(e) => {
            return Outcome::Failure(Failure::permanent(
                ErrorKind::Serialization,
                format!("malformed GraphQL response: {e}"),
                Some(status),
            ))
        }
    };

    if let Some(Value::Array(errors)) = document.get("errors") {
        if !errors.is_empty() {
            let messages: Vec<String> = errors
                .iter()
                .map(|e| match e.get("message") {
                    Some(Value::String(m)) => m.clone(),
                    _ => e.to_string(),
                })
                .collect();
            return Outcome::Failure(Failure::permanent(
                ErrorKind::Protocol,
                messages.join("; "),
                Some(status),
            ));
        }
    }

    match document.remove("data") {
        Some(Value::Null) | None => Outcome::Failure(Failure::permanent(
            ErrorKind::Serialization,
            "no data in GraphQL response",
            Some(status),
        )),
        Some(data) => Outcome::Success(Payload::Json(data)),
    }
}

// ---------------------------------------------------------------------------
// gRPC
// ---------------------------------------------------------------------------

fn classify_grpc(raw: RawResponse) -> Outcome {
    use grpc_code::*;

    let code = raw.status;
    if code == OK {
        return Outcome::Success(Payload::Bytes(raw.body));
    }

    let message = match raw.header("grpc-message") {
        Some(m) if !m.is_empty() => format!("gRPC status {code}: {m}"),
        _ => format!("gRPC status {code}"),
    };
    let failure = match code {
        UNAVAILABLE | DEADLINE_EXCEEDED | RESOURCE_EXHAUSTED => {
            Failure::transient(ErrorKind::Transient, message, Some(code))
        }
        UNIMPLEMENTED => Failure::permanent(ErrorKind::Unimplemented, message, Some(code)),
        _ => Failure::permanent(ErrorKind::Protocol, message, Some(code)),
    };
    Outcome::Failure(failure)
}
