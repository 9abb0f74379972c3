//! Per-client telemetry aggregation.
//!
//! Every top-level call produces exactly one [`TelemetrySample`] once the retry
//! engine reaches a terminal state. The [`TelemetryRecorder`] folds samples
//! into per-operation aggregates, mirrors them to the `metrics` facade for an
//! external exporter, and hands out owned [`TelemetrySnapshot`]s.
//!
//! Each operation's aggregate is updated under its map entry's lock, so a
//! snapshot never observes half of a sample (attempts counted but duration
//! missing, or the reverse).

use std::collections::BTreeMap;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::{CallId, ErrorKind, Protocol, TelemetryConfig, Timestamp};

/// Upper bounds of the duration histogram buckets. A final overflow bucket
/// counts everything above the last bound.
pub const DURATION_BUCKETS: [Duration; 11] = [
    Duration::from_millis(5),
    Duration::from_millis(10),
    Duration::from_millis(25),
    Duration::from_millis(50),
    Duration::from_millis(100),
    Duration::from_millis(250),
    Duration::from_millis(500),
    Duration::from_secs(1),
    Duration::from_millis(2_500),
    Duration::from_secs(5),
    Duration::from_secs(10),
];

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// Final outcome of a call, as seen by telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Success,
    Failure,
}

/// One completed call: all of its attempts folded into a single record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub call_id: CallId,
    pub operation: String,
    pub protocol: Protocol,
    /// Attempts performed, including the first.
    pub attempt_count: u32,
    /// Wall time from the first attempt to the terminal decision, including
    /// backoff waits.
    pub total_duration: Duration,
    pub final_outcome: CallOutcome,
    /// `"ok"` on success, otherwise the error kind label
    /// (e.g. `"retry_exhausted"`).
    pub status: String,
    pub completed_at: Timestamp,
}

impl TelemetrySample {
    /// Status label recorded for a failure of the given kind.
    pub fn failure_status(kind: ErrorKind) -> String {
        kind.as_str().to_string()
    }
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

/// Distribution of call durations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationDistribution {
    /// Counts per bucket of [`DURATION_BUCKETS`], plus one overflow bucket.
    pub buckets: Vec<u64>,
    pub count: u64,
    pub sum: Duration,
    pub min: Option<Duration>,
    pub max: Option<Duration>,
}

impl Default for DurationDistribution {
    fn default() -> Self {
        Self {
            buckets: vec![0; DURATION_BUCKETS.len() + 1],
            count: 0,
            sum: Duration::ZERO,
            min: None,
            max: None,
        }
    }
}

impl DurationDistribution {
    fn observe(&mut self, d: Duration) {
        let index = DURATION_BUCKETS
            .iter()
            .position(|bound| d <= *bound)
            .unwrap_or(DURATION_BUCKETS.len());
        self.buckets[index] += 1;
        self.count += 1;
        self.sum = self.sum.saturating_add(d);
        self.min = Some(self.min.map_or(d, |m| m.min(d)));
        self.max = Some(self.max.map_or(d, |m| m.max(d)));
    }

    /// Mean duration, if anything was observed.
    pub fn mean(&self) -> Option<Duration> {
        let count = u32::try_from(self.count).ok().filter(|c| *c > 0)?;
        Some(self.sum / count)
    }
}

/// Aggregate of every recorded call for one operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationStats {
    /// Completed top-level calls.
    pub calls: u64,
    /// Sum of the attempt counts of every call.
    pub attempt_count_total: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Calls per status label (`"ok"`, `"protocol"`, `"retry_exhausted"`, ...).
    pub outcome_counts: BTreeMap<String, u64>,
    pub duration: DurationDistribution,
    pub last_completed_at: Option<Timestamp>,
}

impl OperationStats {
    fn absorb(&mut self, sample: &TelemetrySample) {
        self.calls += 1;
        self.attempt_count_total += u64::from(sample.attempt_count);
        match sample.final_outcome {
            CallOutcome::Success => self.success_count += 1,
            CallOutcome::Failure => self.failure_count += 1,
        }
        *self.outcome_counts.entry(sample.status.clone()).or_insert(0) += 1;
        self.duration.observe(sample.total_duration);
        self.last_completed_at = Some(sample.completed_at);
    }
}

/// Read-only copy of every operation's aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub operations: BTreeMap<String, OperationStats>,
}

impl TelemetrySnapshot {
    /// Aggregate for one operation, if it has been called.
    pub fn operation(&self, name: &str) -> Option<&OperationStats> {
        self.operations.get(name)
    }
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// Aggregates telemetry samples for one client instance.
///
/// Safe for concurrent use by every in-flight call on the client.
#[derive(Debug)]
pub struct TelemetryRecorder {
    config: TelemetryConfig,
    operations: DashMap<String, OperationStats>,
}

impl TelemetryRecorder {
    /// Creates an empty recorder.
    pub fn new(config: TelemetryConfig) -> Self {
        Self { config, operations: DashMap::new() }
    }

    /// Folds one completed call into its operation's aggregate.
    pub fn record(&self, sample: TelemetrySample) {
        tracing::info!(
            call_id = %sample.call_id,
            operation = %sample.operation,
            protocol = %sample.protocol,
            attempts = sample.attempt_count,
            duration_ms = u64::try_from(sample.total_duration.as_millis()).unwrap_or(u64::MAX),
            status = %sample.status,
            "call complete"
        );

        if !self.config.enabled {
            return;
        }

        self.export(&sample);

        self.operations
            .entry(sample.operation.clone())
            .or_default()
            .absorb(&sample);
    }

    fn export(&self, sample: &TelemetrySample) {
        let service = self.config.service_name.clone();
        let operation = sample.operation.clone();
        metrics::counter!(
            "client_calls_total",
            "service" => service.clone(),
            "operation" => operation.clone(),
            "status" => sample.status.clone()
        )
        .increment(1);
        metrics::counter!(
            "client_attempts_total",
            "service" => service.clone(),
            "operation" => operation.clone()
        )
        .increment(u64::from(sample.attempt_count));
        metrics::histogram!(
            "client_call_duration_seconds",
            "service" => service,
            "operation" => operation
        )
        .record(sample.total_duration.as_secs_f64());
    }

    /// Returns a copy of every operation's aggregate.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let operations = self
            .operations
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        TelemetrySnapshot { operations }
    }

    /// Returns a copy of one operation's aggregate.
    pub fn operation(&self, name: &str) -> Option<OperationStats> {
        self.operations.get(name).map(|stats| stats.value().clone())
    }
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new(TelemetryConfig::default())
    }
}
