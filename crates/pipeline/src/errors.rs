//! Error taxonomy for the execution pipeline.
//!
//! [`CallError`] is what a caller of the engine receives when a call fails. It
//! is protocol-neutral: REST status codes, GraphQL `errors` arrays and gRPC
//! status codes are all folded into the same [`ErrorKind`]s by
//! [`crate::classify`].
//!
//! [`ConfigError`] and [`ClientError`] cover construction-time failures; they
//! are never produced by a call.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error kinds
// ---------------------------------------------------------------------------

/// Protocol-neutral classification of a failed attempt or call.
///
/// ## Propagation rules
///
/// - `Connection`, `Timeout`, `Transient`: recovered locally by the retry
///   engine up to the attempt budget.
/// - `Protocol`, `Serialization`, `Unimplemented`, `Cancelled`: never retried.
/// - `RetryExhausted`: synthesised after the attempt budget is spent on a
///   transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The endpoint could not be reached, or the connection broke mid-call.
    Connection,
    /// An attempt exceeded its deadline.
    Timeout,
    /// The backend explicitly signalled that retrying may succeed.
    Transient,
    /// A well-formed response signalling a permanent application failure.
    Protocol,
    /// The request or response could not be encoded/decoded.
    Serialization,
    /// No backend integration exists for the requested operation.
    Unimplemented,
    /// The caller cancelled the call.
    Cancelled,
    /// Transient failures persisted through every permitted attempt.
    RetryExhausted,
}

impl ErrorKind {
    /// Returns `true` for the kinds the default retry predicate accepts.
    pub fn is_retryable_by_default(self) -> bool {
        matches!(self, ErrorKind::Connection | ErrorKind::Timeout | ErrorKind::Transient)
    }

    /// Returns the snake-case label used in logs, telemetry and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Transient => "transient",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Unimplemented => "unimplemented",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::RetryExhausted => "retry_exhausted",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Call errors
// ---------------------------------------------------------------------------

/// Terminal failure of a call through the execution engine.
///
/// Callers never see a bare transport error: every low-level failure has been
/// classified into one of these variants first.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    /// The endpoint could not be reached.
    #[error("connection failed: {message}")]
    Connection {
        /// Description of the connection failure.
        message: String,
    },

    /// An attempt exceeded its per-attempt deadline.
    #[error("attempt timed out: {message}")]
    Timeout {
        /// Description of the timeout.
        message: String,
    },

    /// The backend signalled a transient condition (rate limit, overload).
    #[error("transient failure (status {status:?}): {message}")]
    Transient {
        /// HTTP status or gRPC code that signalled the condition.
        status: Option<i32>,
        /// Message reported by the backend.
        message: String,
    },

    /// The backend rejected the call permanently.
    #[error("request rejected (status {status:?}): {message}")]
    Protocol {
        /// HTTP status or gRPC code of the rejection.
        status: Option<i32>,
        /// Message reported by the backend.
        message: String,
    },

    /// The request or response could not be encoded or decoded.
    #[error("serialization failed: {message}")]
    Serialization {
        /// Description of the decoding problem.
        message: String,
    },

    /// No backend integration exists for this operation.
    #[error("not implemented: {message}")]
    Unimplemented {
        /// Which integration is missing.
        message: String,
    },

    /// The call was cancelled before reaching a terminal outcome.
    #[error("call cancelled after {attempts} attempt(s)")]
    Cancelled {
        /// Attempts started before the cancellation.
        attempts: u32,
    },

    /// Every permitted attempt failed transiently.
    #[error("gave up after {attempts} attempt(s); last error: {last}")]
    RetryExhausted {
        /// Total attempts performed, including the first.
        attempts: u32,
        /// Failure of the final attempt.
        last: Box<CallError>,
    },
}

impl CallError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CallError::Connection { .. } => ErrorKind::Connection,
            CallError::Timeout { .. } => ErrorKind::Timeout,
            CallError::Transient { .. } => ErrorKind::Transient,
            CallError::Protocol { .. } => ErrorKind::Protocol,
            CallError::Serialization { .. } => ErrorKind::Serialization,
            CallError::Unimplemented { .. } => ErrorKind::Unimplemented,
            CallError::Cancelled { .. } => ErrorKind::Cancelled,
            CallError::RetryExhausted { .. } => ErrorKind::RetryExhausted,
        }
    }

    /// Builds the error for a classified failure of the given kind.
    ///
    /// `RetryExhausted` and `Cancelled` are never produced by classification;
    /// they are mapped onto `Transient` here and synthesised elsewhere.
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>, status: Option<i32>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::Connection => CallError::Connection { message },
            ErrorKind::Timeout => CallError::Timeout { message },
            ErrorKind::Protocol => CallError::Protocol { status, message },
            ErrorKind::Serialization => CallError::Serialization { message },
            ErrorKind::Unimplemented => CallError::Unimplemented { message },
            ErrorKind::Transient | ErrorKind::RetryExhausted | ErrorKind::Cancelled => {
                CallError::Transient { status, message }
            }
        }
    }

    /// Attempts performed, when the error records them.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            CallError::RetryExhausted { attempts, .. } | CallError::Cancelled { attempts } => {
                Some(*attempts)
            }
            _ => None,
        }
    }

    /// Kind of the underlying failure: for `RetryExhausted` the kind of the
    /// last attempt, otherwise the error's own kind.
    pub fn last_kind(&self) -> ErrorKind {
        match self {
            CallError::RetryExhausted { last, .. } => last.kind(),
            other => other.kind(),
        }
    }

    /// HTTP status or gRPC code attached to the failure, if any.
    pub fn status(&self) -> Option<i32> {
        match self {
            CallError::Transient { status, .. } | CallError::Protocol { status, .. } => *status,
            CallError::RetryExhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Construction errors
// ---------------------------------------------------------------------------

/// An invalid [`crate::ClientConfig`] or [`crate::RetryPolicy`].
///
/// Produced at construction; a client never starts with an invalid config.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// `max_attempts` must be at least one (the first attempt counts).
    #[error("max_attempts must be at least 1, got {0}")]
    ZeroAttempts(u32),

    /// `base_delay` must not exceed `max_delay`.
    #[error("base_delay ({base:?}) exceeds max_delay ({max:?})")]
    DelayOrder {
        /// Configured base delay.
        base: std::time::Duration,
        /// Configured maximum delay.
        max: std::time::Duration,
    },

    /// `jitter_fraction` must lie in `[0, 1]`.
    #[error("jitter_fraction must be within [0, 1], got {0}")]
    JitterOutOfRange(f64),

    /// The base endpoint is empty.
    #[error("base endpoint must not be empty")]
    EmptyEndpoint,

    /// The default per-attempt timeout is zero.
    #[error("default timeout must be greater than zero")]
    ZeroTimeout,

    /// A configuration document could not be parsed.
    #[error("invalid configuration document: {0}")]
    Malformed(String),
}

/// Failure to construct a [`crate::Client`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The supplied configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
