//! gRPC adapter for the resilient client pipeline.
//!
//! Performs unary calls over a [`tonic`] channel without generated stubs:
//! a [`Marshaller`] encodes the request message, [`BytesCodec`] frames it, and
//! the response message comes back as raw bytes for the caller to decode.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Status codes are passed through untouched; deciding
//! which codes are transient is the classifier's job.
//!
//! ## Connection lifecycle
//!
//! The channel is created on the first attempt from the client's base
//! endpoint and reused by every later attempt. It connects lazily and
//! reconnects on its own after failures. Its background worker runs on the
//! runtime of the first attempt, so that runtime must outlive the transport.

pub mod codec;
pub mod marshal;
pub mod status;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pipeline::{ClientConfig, ConnectionSlot, OperationDescriptor, Protocol, RawResponse, Transport, TransportError};
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

pub use codec::BytesCodec;
pub use marshal::{JsonMarshaller, Marshaller};

/// Default bound on establishing the HTTP/2 connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A channel created on first use.
#[derive(Debug, Clone, Default)]
struct LazyChannel(Arc<Mutex<Option<Channel>>>);

impl LazyChannel {
    fn get(&self, base_endpoint: &str, connect_timeout: Duration) -> Result<Channel, TransportError> {
        let mut slot = self.0.lock();
        if let Some(channel) = slot.as_ref() {
            return Ok(channel.clone());
        }
        let channel = Endpoint::from_shared(base_endpoint.to_string())
            .map_err(|e| TransportError::Encode(format!("invalid gRPC endpoint {base_endpoint:?}: {e}")))?
            .connect_timeout(connect_timeout)
            .connect_lazy();
        debug!(endpoint = base_endpoint, "gRPC channel created");
        *slot = Some(channel.clone());
        Ok(channel)
    }
}

/// The gRPC [`Transport`].
pub struct GrpcTransport {
    channel: ConnectionSlot<LazyChannel>,
    marshaller: Arc<dyn Marshaller>,
    connect_timeout: Duration,
}

impl GrpcTransport {
    /// Creates an adapter that encodes requests with [`JsonMarshaller`].
    pub fn new() -> Self {
        Self::with_marshaller(JsonMarshaller)
    }

    /// Creates an adapter that encodes requests with `marshaller`.
    pub fn with_marshaller(marshaller: impl Marshaller + 'static) -> Self {
        Self {
            channel: ConnectionSlot::new(LazyChannel::default()),
            marshaller: Arc::new(marshaller),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Sets the bound on establishing the connection.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for GrpcTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GrpcTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcTransport")
            .field("closed", &self.channel.is_released())
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Grpc
    }

    async fn execute(
        &self,
        descriptor: &OperationDescriptor,
        config: &ClientConfig,
    ) -> Result<RawResponse, TransportError> {
        let channel = self
            .channel
            .acquire()?
            .get(config.base_endpoint(), self.connect_timeout)?;
        let path = status::method_path(descriptor.target())?;
        let message = self.marshaller.marshal(descriptor)?;

        let mut request = tonic::Request::new(message);
        *request.metadata_mut() = status::request_metadata(descriptor, config)?;
        request.set_timeout(descriptor.effective_timeout(config));

        let mut grpc = tonic::client::Grpc::new(channel);
        grpc.ready()
            .await
            .map_err(|e| TransportError::Connect(format!("gRPC channel not ready: {e}")))?;

        debug!(path = %path, "sending gRPC request");
        match grpc.unary(request, path, BytesCodec).await {
            Ok(response) => {
                let raw = status::success_response(response.get_ref().clone(), response.metadata());
                debug!(bytes = raw.body.len(), "gRPC response received");
                Ok(raw)
            }
            Err(status) => {
                debug!(code = ?status.code(), message = status.message(), "gRPC call returned status");
                status::status_response(&status)
            }
        }
    }

    fn close(&self) {
        self.channel.release();
    }
}
