//! Counters, health, and the sticky failure latches.
//!
//! Counters are plain atomics touched by both producers (enqueue, validation
//! drops) and the flusher (sends, outcomes). They are concurrency-safe but
//! not transactionally consistent across counters; a snapshot is a
//! best-effort point-in-time read.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

use serde::Serialize;

use crate::breaker::CircuitState;
use crate::transport::Outcome;

/// Sticky flags raised on unrecoverable remote errors.
///
/// While either flag is set the flusher refuses to send, but `enqueue`
/// keeps accepting records so an operator can fix the credentials and
/// recover without losing logs (up to queue capacity).
#[derive(Debug, Default)]
pub(crate) struct Latches {
    api_key_invalid: AtomicBool,
    project_not_found: AtomicBool,
}

impl Latches {
    pub fn set_api_key_invalid(&self) {
        self.api_key_invalid.store(true, Ordering::Relaxed);
    }

    pub fn set_project_not_found(&self) {
        self.project_not_found.store(true, Ordering::Relaxed);
    }

    pub fn api_key_invalid(&self) -> bool {
        self.api_key_invalid.load(Ordering::Relaxed)
    }

    pub fn project_not_found(&self) -> bool {
        self.project_not_found.load(Ordering::Relaxed)
    }

    pub fn any_set(&self) -> bool {
        self.api_key_invalid() || self.project_not_found()
    }

    pub fn clear(&self) {
        self.api_key_invalid.store(false, Ordering::Relaxed);
        self.project_not_found.store(false, Ordering::Relaxed);
    }
}

/// Per-class outcome counters.
#[derive(Debug, Default)]
pub(crate) struct OutcomeCounters {
    accepted: AtomicU64,
    client_validation: AtomicU64,
    auth_invalid: AtomicU64,
    not_found: AtomicU64,
    throttled: AtomicU64,
    backpressure_full: AtomicU64,
    server_transient: AtomicU64,
    network_error: AtomicU64,
}

/// Shared pipeline counters.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    enqueued: AtomicU64,
    sent: AtomicU64,
    rejected_by_server: AtomicU64,
    dropped_validation: AtomicU64,
    dropped_on_shutdown: AtomicU64,
    batches_sent: AtomicU64,
    attempts: AtomicU64,
    outcomes: OutcomeCounters,
    breaker_state: AtomicU8,
    consecutive_failures: AtomicU32,
    sends_last_minute: AtomicU64,
    sends_last_hour: AtomicU64,
    last_batch_queue_latency_ms: AtomicU64,
}

impl Metrics {
    pub fn inc_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_sent(&self, count: u64) {
        self.sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_rejected_by_server(&self, count: u64) {
        self.rejected_by_server.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_dropped_validation(&self, count: u64) {
        self.dropped_validation.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_dropped_on_shutdown(&self, count: u64) {
        self.dropped_on_shutdown.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_batches_sent(&self) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one transport attempt and its outcome class.
    pub fn record_outcome(&self, outcome: &Outcome) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            Outcome::Accepted { .. } => &self.outcomes.accepted,
            Outcome::ClientValidation { .. } => &self.outcomes.client_validation,
            Outcome::AuthInvalid => &self.outcomes.auth_invalid,
            Outcome::NotFound => &self.outcomes.not_found,
            Outcome::Throttled { .. } => &self.outcomes.throttled,
            Outcome::BackpressureFull { .. } => &self.outcomes.backpressure_full,
            Outcome::ServerTransient { .. } => &self.outcomes.server_transient,
            Outcome::NetworkError { .. } => &self.outcomes.network_error,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Mirrors breaker state so producers can observe it without touching
    /// flusher-owned state.
    pub fn set_breaker(&self, state: CircuitState, consecutive_failures: u32) {
        self.breaker_state.store(state.as_u8(), Ordering::Relaxed);
        self.consecutive_failures.store(consecutive_failures, Ordering::Relaxed);
    }

    pub fn set_window_rates(&self, per_minute: u64, per_hour: u64) {
        self.sends_last_minute.store(per_minute, Ordering::Relaxed);
        self.sends_last_hour.store(per_hour, Ordering::Relaxed);
    }

    pub fn set_queue_latency_ms(&self, latency_ms: u64) {
        self.last_batch_queue_latency_ms.store(latency_ms, Ordering::Relaxed);
    }

    pub fn snapshot(
        &self,
        queue_size: usize,
        queue_capacity: usize,
        dropped_overflow: u64,
        latches: &Latches,
    ) -> MetricsSnapshot {
        MetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            rejected_by_server: self.rejected_by_server.load(Ordering::Relaxed),
            dropped_overflow,
            dropped_validation: self.dropped_validation.load(Ordering::Relaxed),
            dropped_on_shutdown: self.dropped_on_shutdown.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            outcomes: OutcomeSnapshot {
                accepted: self.outcomes.accepted.load(Ordering::Relaxed),
                client_validation: self.outcomes.client_validation.load(Ordering::Relaxed),
                auth_invalid: self.outcomes.auth_invalid.load(Ordering::Relaxed),
                not_found: self.outcomes.not_found.load(Ordering::Relaxed),
                throttled: self.outcomes.throttled.load(Ordering::Relaxed),
                backpressure_full: self.outcomes.backpressure_full.load(Ordering::Relaxed),
                server_transient: self.outcomes.server_transient.load(Ordering::Relaxed),
                network_error: self.outcomes.network_error.load(Ordering::Relaxed),
            },
            queue_size,
            queue_capacity,
            breaker_state: CircuitState::from_u8(self.breaker_state.load(Ordering::Relaxed)),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            sends_last_minute: self.sends_last_minute.load(Ordering::Relaxed),
            sends_last_hour: self.sends_last_hour.load(Ordering::Relaxed),
            last_batch_queue_latency_ms: self.last_batch_queue_latency_ms.load(Ordering::Relaxed),
            api_key_invalid: latches.api_key_invalid(),
            project_not_found: latches.project_not_found(),
        }
    }
}

/// Point-in-time outcome counts by class.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeSnapshot {
    pub accepted: u64,
    pub client_validation: u64,
    pub auth_invalid: u64,
    pub not_found: u64,
    pub throttled: u64,
    pub backpressure_full: u64,
    pub server_transient: u64,
    pub network_error: u64,
}

/// Point-in-time view of every pipeline counter.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Records offered to `enqueue`, including ones that failed validation.
    pub enqueued: u64,
    /// Records that left the pipeline in a committed batch.
    pub sent: u64,
    /// Records the server reported rejecting inside committed batches.
    pub rejected_by_server: u64,
    /// Records evicted by queue overflow.
    pub dropped_overflow: u64,
    /// Records dropped for validation-class reasons, producer-side or
    /// remote (400/401/404 batch drops).
    pub dropped_validation: u64,
    /// Records abandoned when a shutdown deadline expired.
    pub dropped_on_shutdown: u64,
    /// Committed batches.
    pub batches_sent: u64,
    /// Transport attempts, including retries.
    pub attempts: u64,
    /// Attempts by outcome class.
    pub outcomes: OutcomeSnapshot,
    pub queue_size: usize,
    pub queue_capacity: usize,
    pub breaker_state: CircuitState,
    pub consecutive_failures: u32,
    /// Send attempts admitted in the last 60 seconds.
    pub sends_last_minute: u64,
    /// Send attempts admitted in the last hour.
    pub sends_last_hour: u64,
    /// Worst queue-residency of the most recently drained batch.
    pub last_batch_queue_latency_ms: u64,
    pub api_key_invalid: bool,
    pub project_not_found: bool,
}

/// Aggregated health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health status plus the issues that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: HealthStatus,
    pub issues: Vec<String>,
}

impl Health {
    /// Derives health from a metrics snapshot.
    ///
    /// Latches and an open breaker make the client unhealthy; a filling
    /// queue or a failure streak only degrade it.
    pub(crate) fn from_snapshot(snapshot: &MetricsSnapshot) -> Self {
        let mut issues = Vec::new();
        let mut unhealthy = false;

        if snapshot.api_key_invalid {
            issues.push("api key rejected by server, sending halted until credentials refresh".to_string());
            unhealthy = true;
        }
        if snapshot.project_not_found {
            issues.push("project not found at endpoint, sending halted until credentials refresh".to_string());
            unhealthy = true;
        }
        if snapshot.breaker_state == CircuitState::Open {
            issues.push("circuit breaker open".to_string());
            unhealthy = true;
        }
        if snapshot.queue_capacity > 0 {
            let fill = snapshot.queue_size as f64 / snapshot.queue_capacity as f64;
            if fill > 0.8 {
                issues.push(format!(
                    "queue {}% full ({}/{})",
                    (fill * 100.0) as u32,
                    snapshot.queue_size,
                    snapshot.queue_capacity
                ));
            }
        }
        if snapshot.consecutive_failures > 2 {
            issues.push(format!("{} consecutive send failures", snapshot.consecutive_failures));
        }

        let status = if unhealthy {
            HealthStatus::Unhealthy
        } else if issues.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        Health { status, issues }
    }
}
