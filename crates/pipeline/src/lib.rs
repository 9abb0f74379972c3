//! Protocol-agnostic resilient request execution.
//!
//! This crate contains the one execution pipeline shared by REST, GraphQL and
//! gRPC clients: operation descriptors, outcome classification, retry with
//! bounded exponential backoff, per-operation telemetry, and the engine that
//! ties them together for both blocking and suspending call sites.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate contains no wire
//! mechanics. It defines the [`Transport`] port; the `rest-transport`,
//! `graphql-transport` and `grpc-transport` crates implement it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | `OperationName`, `CallId` |
//! | [`types`] | `Protocol`, `Timestamp` |
//! | [`descriptor`] | `OperationDescriptor` and its parameters |
//! | [`config`] | `ClientConfig`, `RetryPolicy`, serialisable settings |
//! | [`errors`] | `ErrorKind`, `CallError`, construction errors |
//! | [`outcome`] | `RawResponse`, `TransportError`, `Outcome`, `Payload` |
//! | [`classify`] | Protocol-specific classification rules |
//! | [`retry`] | Retry decisions and backoff |
//! | [`telemetry`] | Per-operation aggregation and snapshots |
//! | [`transport`] | The `Transport` port and adapter registry |
//! | [`engine`] | The execution engine |
//! | [`client`] | The client instance owning all of the above |
//! | [`observability`] | Subscriber installation for applications |
//!
//! ## Example
//!
//! ```no_run
//! use pipeline::{Client, ClientConfig, OperationDescriptor, OperationName, Protocol, TransportSet};
//!
//! # async fn demo(transports: TransportSet) -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new(ClientConfig::builder("https://api.example.com").build()?, transports);
//! let call = OperationDescriptor::builder(
//!     OperationName::new("getPet").expect("non-empty"),
//!     Protocol::Rest,
//!     "GET /pets/{petId}",
//! )
//! .path("petId", 42)
//! .build();
//! let payload = client.run(&call).await?;
//! # let _ = payload;
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod client;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod errors;
pub mod identifiers;
pub mod observability;
pub mod outcome;
pub mod retry;
pub mod telemetry;
pub mod transport;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use classify::classify;
pub use client::Client;
pub use config::{
    ClientConfig, ClientConfigBuilder, ClientSettings, RetryPolicy, RetrySettings,
    RetryablePredicate, TelemetryConfig,
};
pub use descriptor::{OperationDescriptor, OperationDescriptorBuilder, Parameter, Placement};
pub use engine::Engine;
pub use errors::{CallError, ClientError, ConfigError, ErrorKind};
pub use identifiers::{CallId, OperationName};
pub use outcome::{Failure, Outcome, Payload, RawResponse, TransportError};
pub use retry::{next_attempt, Decision};
pub use telemetry::{
    CallOutcome, DurationDistribution, OperationStats, TelemetryRecorder, TelemetrySample,
    TelemetrySnapshot,
};
pub use transport::{ConnectionSlot, Transport, TransportSet};
pub use types::{Protocol, Timestamp};

// Adapters and callers use these without depending on the crates directly.
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
