//! Stub transports shared by the engine tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pipeline::{
    async_trait, ClientConfig, OperationDescriptor, OperationName, Protocol, RawResponse,
    RetryPolicy, Transport, TransportError,
};

pub fn name(s: &str) -> OperationName {
    OperationName::new(s).unwrap()
}

pub fn rest_call(op: &str) -> OperationDescriptor {
    OperationDescriptor::builder(name(op), Protocol::Rest, "GET /pets").build()
}

/// Policy with no jitter so delays are exact.
pub fn policy(max_attempts: u32, base_ms: u64) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(base_ms), Duration::from_secs(10), 0.0).unwrap()
}

pub fn config(policy: RetryPolicy) -> ClientConfig {
    ClientConfig::builder("http://stub.invalid").retry_policy(policy).build().unwrap()
}

pub fn unavailable() -> Result<RawResponse, TransportError> {
    Ok(RawResponse::new(503, "try later"))
}

pub fn ok(body: &'static str) -> Result<RawResponse, TransportError> {
    Ok(RawResponse::new(200, body))
}

// ---------------------------------------------------------------------------
// ScriptedTransport
// ---------------------------------------------------------------------------

/// Replays a fixed list of attempt results; once the script runs out, the
/// last entry repeats.
pub struct ScriptedTransport {
    protocol: Protocol,
    script: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
    last: Mutex<Option<Result<RawResponse, TransportError>>>,
    pub calls: AtomicU32,
    pub call_times: Mutex<Vec<Instant>>,
    pub closed: AtomicBool,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<RawResponse, TransportError>>) -> Arc<Self> {
        Self::for_protocol(Protocol::Rest, script)
    }

    pub fn for_protocol(protocol: Protocol, script: Vec<Result<RawResponse, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            protocol,
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: AtomicU32::new(0),
            call_times: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    async fn execute(&self, _: &OperationDescriptor, _: &ClientConfig) -> Result<RawResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().push(Instant::now());
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let next = self.script.lock().pop_front();
        match next {
            Some(result) => {
                *self.last.lock() = Some(result.clone());
                result
            }
            None => self.last.lock().clone().unwrap_or(Err(TransportError::Unimplemented("empty script".into()))),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Other stubs
// ---------------------------------------------------------------------------

/// Never answers; only a timeout or cancellation ends an attempt.
pub struct HangingTransport {
    pub calls: AtomicU32,
}

impl HangingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { calls: AtomicU32::new(0) })
    }
}

#[async_trait]
impl Transport for HangingTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Rest
    }

    async fn execute(&self, _: &OperationDescriptor, _: &ClientConfig) -> Result<RawResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// Fails each call transiently `fail_first` times (read from the call's
/// `fail_first` body parameter, keyed by its `call` parameter), then succeeds.
pub struct FlakyPerCallTransport {
    attempts: Mutex<HashMap<String, u64>>,
}

impl FlakyPerCallTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { attempts: Mutex::new(HashMap::new()) })
    }
}

#[async_trait]
impl Transport for FlakyPerCallTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Rest
    }

    async fn execute(&self, descriptor: &OperationDescriptor, _: &ClientConfig) -> Result<RawResponse, TransportError> {
        let param = |n: &str| descriptor.parameters().iter().find(|p| p.name == n).map(|p| p.value.clone());
        let key = param("call").map(|v| v.to_string()).unwrap_or_default();
        let fail_first = param("fail_first").and_then(|v| v.as_u64()).unwrap_or(0);

        let seen = {
            let mut attempts = self.attempts.lock();
            let seen = attempts.entry(key).or_insert(0);
            *seen += 1;
            *seen
        };
        tokio::task::yield_now().await;
        if seen <= fail_first {
            Ok(RawResponse::new(429, "slow down"))
        } else {
            Ok(RawResponse::new(200, "{}"))
        }
    }
}
