//! The client instance: owner of configuration, adapters, telemetry and engine.
//!
//! Generated facade methods hold a [`Client`], build an
//! [`OperationDescriptor`] per call, and call [`Client::run`] or
//! [`Client::run_blocking`]. Everything a client owns lives exactly as long as
//! the client; there is no process-wide state.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::telemetry::{TelemetryRecorder, TelemetrySnapshot};
use crate::{
    CallError, ClientConfig, ClientError, ClientSettings, Engine, OperationDescriptor, Payload,
    TransportSet,
};

/// One configured client.
///
/// `Client` is `Send + Sync`; share it behind an `Arc` to issue calls from
/// many tasks or threads at once.
#[derive(Debug)]
pub struct Client {
    config: Arc<ClientConfig>,
    engine: Engine,
}

impl Client {
    /// Creates a client from a validated configuration.
    pub fn new(config: ClientConfig, transports: TransportSet) -> Self {
        let telemetry = Arc::new(TelemetryRecorder::new(config.telemetry().clone()));
        let engine = Engine::new(transports, telemetry);
        tracing::debug!(endpoint = config.base_endpoint(), engine = ?engine, "client created");
        Self { config: Arc::new(config), engine }
    }

    /// Validates `settings` and creates a client from them.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] for invalid settings.
    pub fn from_settings(settings: ClientSettings, transports: TransportSet) -> Result<Self, ClientError> {
        let config = ClientConfig::try_from(settings)?;
        Ok(Self::new(config, transports))
    }

    /// Runs one call, suspending during backoff waits.
    ///
    /// # Errors
    ///
    /// Returns the classified failure of the call.
    pub async fn run(&self, descriptor: &OperationDescriptor) -> Result<Payload, CallError> {
        self.engine.run(descriptor, &self.config).await
    }

    /// Runs one call that can be cancelled through `cancel`.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Cancelled`] if `cancel` fires first, otherwise as
    /// [`Self::run`].
    pub async fn run_cancellable(
        &self,
        descriptor: &OperationDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Payload, CallError> {
        self.engine.run_cancellable(descriptor, &self.config, cancel).await
    }

    /// Runs one call, blocking the current thread.
    ///
    /// # Errors
    ///
    /// Returns the classified failure of the call.
    ///
    /// # Panics
    ///
    /// Panics when called from within an async runtime.
    pub fn run_blocking(&self, descriptor: &OperationDescriptor) -> Result<Payload, CallError> {
        self.engine.run_blocking(descriptor, &self.config)
    }

    /// The client's configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Snapshot of per-operation telemetry.
    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.engine.telemetry().snapshot()
    }

    /// The client's telemetry recorder, for exporters that poll it.
    pub fn telemetry_recorder(&self) -> Arc<TelemetryRecorder> {
        Arc::clone(self.engine.telemetry())
    }

    /// Releases the client's connections. In-flight calls, including
    /// blocking calls waiting out a backoff, fail with a connection error;
    /// later calls fail immediately. Idempotent; also done on drop.
    pub fn close(&self) {
        if !self.engine.is_closed() {
            tracing::debug!(endpoint = self.config.base_endpoint(), "closing client");
        }
        self.engine.close();
    }

    /// Returns `true` once the client has been closed.
    pub fn is_closed(&self) -> bool {
        self.engine.is_closed()
    }
}
