//! Transport port: the one seam between the engine and the wire.
//!
//! Adapters implement [`Transport`] in their own crates; the engine only sees
//! `Arc<dyn Transport>` values collected in a [`TransportSet`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{ClientConfig, OperationDescriptor, Protocol, RawResponse, TransportError};

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Turns an [`OperationDescriptor`] into one raw response or a low-level
/// failure.
///
/// Implementations are total: every descriptor yields either a
/// [`RawResponse`] or a [`TransportError`] (an operation without a backend
/// integration is [`TransportError::Unimplemented`], never an empty success).
/// They are invoked concurrently by every in-flight call on a client and know
/// nothing about retries.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Protocol this adapter speaks.
    fn protocol(&self) -> Protocol;

    /// Performs one attempt.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no response could be obtained.
    async fn execute(
        &self,
        descriptor: &OperationDescriptor,
        config: &ClientConfig,
    ) -> Result<RawResponse, TransportError>;

    /// Releases the adapter's connection resource. Later attempts fail with
    /// [`TransportError::Closed`].
    fn close(&self) {}
}

// ---------------------------------------------------------------------------
// TransportSet
// ---------------------------------------------------------------------------

/// The adapters available to one client, keyed by protocol.
#[derive(Clone, Default)]
pub struct TransportSet {
    adapters: BTreeMap<Protocol, Arc<dyn Transport>>,
}

impl TransportSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `transport` under its own protocol, replacing any adapter
    /// previously registered for it.
    pub fn with(mut self, transport: impl Transport + 'static) -> Self {
        self.insert(Arc::new(transport));
        self
    }

    /// Registers a shared adapter under its own protocol.
    pub fn insert(&mut self, transport: Arc<dyn Transport>) {
        self.adapters.insert(transport.protocol(), transport);
    }

    /// Adapter for `protocol`, if one is registered.
    pub fn get(&self, protocol: Protocol) -> Option<&Arc<dyn Transport>> {
        self.adapters.get(&protocol)
    }

    /// Closes every registered adapter.
    pub fn close_all(&self) {
        for transport in self.adapters.values() {
            transport.close();
        }
    }
}

impl fmt::Debug for TransportSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.adapters.keys()).finish()
    }
}

// ---------------------------------------------------------------------------
// ConnectionSlot
// ---------------------------------------------------------------------------

/// Holds an adapter's cheaply cloneable connection handle (HTTP client,
/// channel) until it is released.
///
/// Callers clone the handle out under a short read lock, so concurrent
/// attempts never hold the lock across I/O. After [`Self::release`], every
/// [`Self::acquire`] fails with [`TransportError::Closed`]; attempts already
/// holding a clone finish or fail on their own.
#[derive(Debug)]
pub struct ConnectionSlot<T> {
    inner: RwLock<Option<T>>,
}

impl<T: Clone> ConnectionSlot<T> {
    /// Wraps an open connection handle.
    pub fn new(handle: T) -> Self {
        Self { inner: RwLock::new(Some(handle)) }
    }

    /// Returns a clone of the handle.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the slot has been released.
    pub fn acquire(&self) -> Result<T, TransportError> {
        self.inner.read().clone().ok_or(TransportError::Closed)
    }

    /// Drops the held handle. Idempotent.
    pub fn release(&self) {
        self.inner.write().take();
    }

    /// Returns `true` once the slot has been released.
    pub fn is_released(&self) -> bool {
        self.inner.read().is_none()
    }
}
