//! The execution engine: one routine that drives a call through transport,
//! classification, retry and telemetry.
//!
//! ## Entry points
//!
//! | Entry point | Backoff wait | Driven by |
//! |-------------|--------------|-----------|
//! | [`Engine::run`] | `tokio::time::sleep` | the caller's `.await` |
//! | [`Engine::run_cancellable`] | `tokio::time::sleep`, raced with a token | the caller's `.await` |
//! | [`Engine::run_blocking`] | a condition variable woken by [`Engine::close`] | `block_on` on the engine's background runtime |
//!
//! All three share `drive`; nothing but the wait differs. The background
//! runtime is started by the first blocking call.
//!
//! ## Cancellation
//!
//! The suspending forms can be cancelled at any suspension point, either by
//! dropping the future or through a [`CancellationToken`]. Cancelling while a
//! transport call is in flight abandons that call: whether the backend
//! processed it is unknown and nothing is rolled back. Either way the call is
//! recorded once in telemetry with status `"cancelled"`.
//!
//! ## Timeouts
//!
//! Each attempt is bounded by the descriptor's timeout (or the client
//! default). There is no overall deadline across retries; callers needing one
//! cancel externally.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use crate::retry::{next_attempt, Decision};
use crate::telemetry::{CallOutcome, TelemetryRecorder, TelemetrySample};
use crate::{
    classify, CallError, CallId, ClientConfig, OperationDescriptor, Outcome, Payload, Protocol,
    RawResponse, Timestamp, TransportError, TransportSet,
};

// ---------------------------------------------------------------------------
// Wait strategy
// ---------------------------------------------------------------------------

/// How the engine waits out a backoff delay.
#[derive(Debug, Clone, Copy)]
enum Wait<'a> {
    /// Cooperative suspension; other tasks keep running.
    Suspend,
    /// Blocks the calling thread, which is dedicated to this call, until the
    /// delay passes or the latch closes.
    Block(&'a CloseLatch),
}

impl Wait<'_> {
    async fn pause(self, delay: Duration) {
        match self {
            Wait::Suspend => tokio::time::sleep(delay).await,
            Wait::Block(latch) => latch.wait(delay),
        }
    }
}

/// Wakes threads blocked in a backoff wait when the engine closes.
#[derive(Debug, Default)]
struct CloseLatch {
    closed: Mutex<bool>,
    changed: Condvar,
}

impl CloseLatch {
    fn close(&self) {
        *self.closed.lock() = true;
        self.changed.notify_all();
    }

    /// Blocks for up to `delay`, returning early once closed.
    fn wait(&self, delay: Duration) {
        let mut closed = self.closed.lock();
        self.changed.wait_while_for(&mut closed, |closed| !*closed, delay);
    }
}

/// Why a call stopped before reaching a terminal decision.
#[derive(Debug, Clone, Copy)]
enum Interrupt {
    Cancelled,
    Shutdown,
}

async fn interrupted(shutdown: &CancellationToken, cancel: Option<&CancellationToken>) -> Interrupt {
    match cancel {
        Some(token) => tokio::select! {
            () = shutdown.cancelled() => Interrupt::Shutdown,
            () = token.cancelled() => Interrupt::Cancelled,
        },
        None => {
            shutdown.cancelled().await;
            Interrupt::Shutdown
        }
    }
}

// ---------------------------------------------------------------------------
// In-flight call guard
// ---------------------------------------------------------------------------

/// Tracks one top-level call and records its telemetry sample exactly once:
/// explicitly on a terminal decision, or from `Drop` if the call's future is
/// abandoned first.
struct InFlight {
    recorder: Arc<TelemetryRecorder>,
    call_id: CallId,
    operation: String,
    protocol: Protocol,
    started: Instant,
    attempts: u32,
    recorded: bool,
}

impl InFlight {
    fn start(recorder: Arc<TelemetryRecorder>, descriptor: &OperationDescriptor) -> Self {
        Self {
            recorder,
            call_id: CallId::new_random(),
            operation: descriptor.name().to_string(),
            protocol: descriptor.protocol(),
            started: Instant::now(),
            attempts: 0,
            recorded: false,
        }
    }

    fn succeed(mut self, payload: Payload) -> Payload {
        self.record(CallOutcome::Success, "ok".to_string());
        payload
    }

    fn fail(mut self, error: CallError) -> CallError {
        self.record(CallOutcome::Failure, TelemetrySample::failure_status(error.kind()));
        error
    }

    fn record(&mut self, final_outcome: CallOutcome, status: String) {
        if self.recorded {
            return;
        }
        self.recorded = true;
        self.recorder.record(TelemetrySample {
            call_id: self.call_id,
            operation: self.operation.clone(),
            protocol: self.protocol,
            attempt_count: self.attempts,
            total_duration: self.started.elapsed(),
            final_outcome,
            status,
            completed_at: Timestamp::now(),
        });
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.recorded {
            debug!(call_id = %self.call_id, attempts = self.attempts, "call abandoned before completion");
            self.record(CallOutcome::Failure, TelemetrySample::failure_status(crate::ErrorKind::Cancelled));
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Drives calls for one client instance.
///
/// Holds no lock across calls: concurrent calls proceed independently and
/// share only the telemetry recorder.
pub struct Engine {
    transports: TransportSet,
    telemetry: Arc<TelemetryRecorder>,
    shutdown: CancellationToken,
    latch: CloseLatch,
    blocking: OnceLock<Runtime>,
}

impl Engine {
    /// Creates an engine over `transports`, recording into `telemetry`.
    pub fn new(transports: TransportSet, telemetry: Arc<TelemetryRecorder>) -> Self {
        Self {
            transports,
            telemetry,
            shutdown: CancellationToken::new(),
            latch: CloseLatch::default(),
            blocking: OnceLock::new(),
        }
    }

    /// Runs one call, suspending during backoff waits.
    ///
    /// # Errors
    ///
    /// Returns the classified [`CallError`] of the call's terminal attempt.
    pub async fn run(&self, descriptor: &OperationDescriptor, config: &ClientConfig) -> Result<Payload, CallError> {
        self.drive(descriptor, config, Wait::Suspend, None).await
    }

    /// Runs one call that stops with [`CallError::Cancelled`] as soon as
    /// `cancel` fires, whether mid-wait or mid-attempt.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Cancelled`] on cancellation, otherwise as
    /// [`Self::run`].
    pub async fn run_cancellable(
        &self,
        descriptor: &OperationDescriptor,
        config: &ClientConfig,
        cancel: &CancellationToken,
    ) -> Result<Payload, CallError> {
        self.drive(descriptor, config, Wait::Suspend, Some(cancel)).await
    }

    /// Runs one call on the current thread, blocking it during attempts and
    /// backoff waits. Other calls on the same client are unaffected.
    ///
    /// # Errors
    ///
    /// As [`Self::run`]. Fails with [`CallError::Connection`] if the
    /// background runtime cannot be started.
    ///
    /// # Panics
    ///
    /// Panics when called from within an async runtime; use [`Self::run`]
    /// there instead.
    pub fn run_blocking(&self, descriptor: &OperationDescriptor, config: &ClientConfig) -> Result<Payload, CallError> {
        let runtime = self.blocking_runtime()?;
        runtime.block_on(self.drive(descriptor, config, Wait::Block(&self.latch), None))
    }

    fn blocking_runtime(&self) -> Result<&Runtime, CallError> {
        if let Some(runtime) = self.blocking.get() {
            return Ok(runtime);
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("resilient-client-io")
            .enable_all()
            .build()
            .map_err(|e| CallError::Connection { message: format!("failed to start blocking runtime: {e}") })?;
        // A concurrent first call may have won; the spare runtime is shut down.
        if let Err(spare) = self.blocking.set(runtime) {
            spare.shutdown_background();
        }
        self.blocking
            .get()
            .ok_or_else(|| CallError::Connection { message: "blocking runtime unavailable".to_string() })
    }

    /// Releases every adapter's connection and fails in-flight calls with a
    /// connection error, including blocking calls waiting out a backoff.
    pub fn close(&self) {
        self.shutdown.cancel();
        self.latch.close();
        self.transports.close_all();
    }

    /// Returns `true` once [`Self::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// The recorder this engine writes to.
    pub fn telemetry(&self) -> &Arc<TelemetryRecorder> {
        &self.telemetry
    }

    async fn drive(
        &self,
        descriptor: &OperationDescriptor,
        config: &ClientConfig,
        wait: Wait<'_>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Payload, CallError> {
        let call = InFlight::start(Arc::clone(&self.telemetry), descriptor);
        let span = info_span!(
            "call",
            call_id = %call.call_id,
            operation = %descriptor.name(),
            protocol = %descriptor.protocol(),
        );
        self.attempt_loop(call, descriptor, config, wait, cancel)
            .instrument(span)
            .await
    }

    async fn attempt_loop(
        &self,
        mut call: InFlight,
        descriptor: &OperationDescriptor,
        config: &ClientConfig,
        wait: Wait<'_>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Payload, CallError> {
        let policy = config.retry_policy();
        let mut attempt: u32 = 1;

        loop {
            if let Some(interrupt) = self.pending_interrupt(cancel) {
                let error = interrupt_error(interrupt, call.attempts);
                return Err(call.fail(error));
            }
            call.attempts = attempt;
            debug!(attempt, max_attempts = policy.max_attempts(), "starting attempt");

            let result = tokio::select! {
                biased;
                interrupt = interrupted(&self.shutdown, cancel) => {
                    return Err(call.fail(interrupt_error(interrupt, attempt)));
                }
                result = self.attempt(descriptor, config) => result,
            };

            let outcome = classify(descriptor.protocol(), result);
            if let Outcome::Failure(failure) = &outcome {
                debug!(attempt, kind = %failure.kind, transient = failure.transient, message = %failure.message, "attempt failed");
            }

            match next_attempt(policy, attempt, &outcome) {
                Decision::StopSuccess => {
                    debug!(attempt, "attempt succeeded");
                    return match outcome {
                        Outcome::Success(payload) => Ok(call.succeed(payload)),
                        Outcome::Failure(failure) => Err(call.fail(failure.into_error())),
                    };
                }
                Decision::StopFailure(error) => {
                    warn!(attempt, kind = %error.kind(), error = %error, "call failed");
                    return Err(call.fail(error));
                }
                Decision::Retry { after } => {
                    warn!(attempt, delay_ms = u64::try_from(after.as_millis()).unwrap_or(u64::MAX), "retrying after backoff");
                    tokio::select! {
                        biased;
                        interrupt = interrupted(&self.shutdown, cancel) => {
                            return Err(call.fail(interrupt_error(interrupt, attempt)));
                        }
                        () = wait.pause(after) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    fn pending_interrupt(&self, cancel: Option<&CancellationToken>) -> Option<Interrupt> {
        if self.shutdown.is_cancelled() {
            Some(Interrupt::Shutdown)
        } else if cancel.is_some_and(CancellationToken::is_cancelled) {
            Some(Interrupt::Cancelled)
        } else {
            None
        }
    }

    /// One transport attempt, bounded by the per-attempt timeout.
    async fn attempt(&self, descriptor: &OperationDescriptor, config: &ClientConfig) -> Result<RawResponse, TransportError> {
        let protocol = descriptor.protocol();
        let transport = self
            .transports
            .get(protocol)
            .ok_or_else(|| TransportError::Unimplemented(format!("no {protocol} transport registered")))?;

        let timeout = descriptor.effective_timeout(config);
        match tokio::time::timeout(timeout, transport.execute(descriptor, config)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(format!("no response within {timeout:?}"))),
        }
    }
}

fn interrupt_error(interrupt: Interrupt, attempts: u32) -> CallError {
    match interrupt {
        Interrupt::Cancelled => CallError::Cancelled { attempts },
        Interrupt::Shutdown => CallError::Connection { message: "client closed".to_string() },
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.close();
        if let Some(runtime) = self.blocking.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("transports", &self.transports)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
