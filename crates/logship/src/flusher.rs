//! The background flusher: the single worker that drains the queue and
//! dispatches batches.
//!
//! Exactly one flusher runs per client. It owns the rate limiter, the
//! circuit breaker, and all retry state, so none of that needs locks. The
//! loop wakes on the earliest of: flush interval elapsed, queue reaching
//! `flush_size` (via `Notify`), or the shutdown signal.
//!
//! ```text
//!   Idle ──tick/size──▶ Draining ──batch empty──▶ Idle
//!                       │
//!                       ▼
//!                    Sending ──Commit/DropBatch──▶ Idle
//!                       │
//!                       ├──Retry(d)───sleep(d)───▶ Sending
//!                       └──GiveUp────requeue────▶ Idle
//! ```
//!
//! Diagnostics from this module go to the host's tracing subscriber only;
//! the flusher never logs into its own queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::breaker::{CircuitBreaker, CircuitState, Gate};
use crate::config::Config;
use crate::metrics::{Latches, Metrics};
use crate::queue::{BoundedQueue, QueueSlot};
use crate::rate_limiter::DualWindowRateLimiter;
use crate::retry::{self, Action, RetryPolicy};
use crate::transport::{Outcome, Transport};

/// Ceiling for the adaptive flush interval under sustained backpressure.
const MAX_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// Consecutive 503s before the flush cadence is slowed.
const BACKPRESSURE_SLOWDOWN_AFTER: u32 = 3;

/// Everything the flusher needs, wired up by the client facade.
pub(crate) struct FlusherConfig {
    pub queue: Arc<BoundedQueue>,
    pub metrics: Arc<Metrics>,
    pub latches: Arc<Latches>,
    pub transport: Transport,
    pub flush_notify: Arc<Notify>,
    pub shutdown: CancellationToken,
    pub abort: CancellationToken,
}

pub(crate) struct Flusher {
    queue: Arc<BoundedQueue>,
    metrics: Arc<Metrics>,
    latches: Arc<Latches>,
    transport: Transport,
    limiter: DualWindowRateLimiter,
    breaker: CircuitBreaker,
    policy: RetryPolicy,
    base_flush_interval: Duration,
    current_flush_interval: Duration,
    flush_size: usize,
    max_batch_size: usize,
    backpressure_streak: u32,
    flush_notify: Arc<Notify>,
    shutdown: CancellationToken,
    abort: CancellationToken,
}

impl Flusher {
    pub fn new(config: &Config, parts: FlusherConfig) -> Self {
        Self {
            queue: parts.queue,
            metrics: parts.metrics,
            latches: parts.latches,
            transport: parts.transport,
            limiter: DualWindowRateLimiter::new(
                config.rate_limit_per_minute,
                config.rate_limit_per_hour,
                config.rate_limit_buffer,
            ),
            breaker: CircuitBreaker::new(config.breaker_threshold, config.breaker_timeout),
            policy: RetryPolicy {
                max_retries_server: config.max_retries_server,
                max_retries_network: config.max_retries_network,
            },
            base_flush_interval: config.flush_interval,
            current_flush_interval: config.flush_interval,
            flush_size: config.flush_size,
            max_batch_size: config.max_batch_size,
            backpressure_streak: 0,
            flush_notify: parts.flush_notify,
            shutdown: parts.shutdown,
            abort: parts.abort,
        }
    }

    /// Main loop; runs until shutdown, then drains.
    pub async fn run(mut self) {
        debug!("flusher started");
        loop {
            tokio::select! {
                () = tokio::time::sleep(self.current_flush_interval) => {}
                () = self.flush_notify.notified() => {}
                () = self.shutdown.cancelled() => break,
            }
            // Keep flushing while the size trigger stays hot, so a backlog
            // drains without waiting a full interval per batch.
            loop {
                let progressed = self.flush_once().await;
                if !progressed
                    || self.queue.len() < self.flush_size
                    || self.shutdown.is_cancelled()
                {
                    break;
                }
            }
            if self.shutdown.is_cancelled() {
                break;
            }
        }
        self.drain().await;
        debug!("flusher stopped");
    }

    /// Shutdown drain: run the normal pipeline until the queue empties, the
    /// abort signal fires, or progress stalls (latched or breaker open).
    async fn drain(&mut self) {
        let queued = self.queue.len();
        if queued > 0 {
            debug!(queued, "draining queue before shutdown");
        }
        while !self.queue.is_empty() && !self.abort.is_cancelled() {
            if !self.flush_once().await {
                if !self.abort.is_cancelled() {
                    warn!(
                        remaining = self.queue.len(),
                        "shutdown drain stalled, remaining records will be abandoned"
                    );
                }
                break;
            }
        }
    }

    /// One flush iteration. Returns `true` when records left the pipeline
    /// for good (committed or dropped), `false` otherwise.
    async fn flush_once(&mut self) -> bool {
        if self.latches.any_set() {
            return false;
        }
        let batch_limit = match self.breaker.gate() {
            Gate::Blocked => {
                self.publish_breaker();
                return false;
            }
            // A half-open breaker gets a single-record probe.
            Gate::Probe => 1,
            Gate::Allow => self.max_batch_size,
        };
        self.publish_breaker();

        let batch = self.queue.drain_batch(batch_limit);
        if batch.is_empty() {
            return false;
        }
        self.observe_queue_latency(&batch);

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if !self.limiter.acquire(&self.abort).await {
                self.queue.requeue_front(batch);
                return false;
            }
            let (per_minute, per_hour) = self.limiter.window_usage();
            self.metrics.set_window_rates(per_minute, per_hour);

            debug!(batch_size = batch.len(), attempt, "sending batch");
            let outcome = tokio::select! {
                outcome = self.transport.send_batch(&batch) => Some(outcome),
                () = self.abort.cancelled() => None,
            };
            let Some(outcome) = outcome else {
                self.queue.requeue_front(batch);
                return false;
            };
            self.metrics.record_outcome(&outcome);
            if outcome.is_accepted() {
                self.breaker.on_success();
            } else {
                self.breaker.on_failure();
            }
            self.publish_breaker();
            self.track_backpressure(&outcome);

            match retry::decide(&outcome, attempt, &self.policy) {
                Action::Commit => {
                    if let Outcome::Accepted { rejected, errors, .. } = &outcome {
                        if *rejected > 0 {
                            warn!(rejected = *rejected, "server rejected records inside committed batch");
                            self.metrics.add_rejected_by_server(*rejected);
                            for message in errors.iter().take(5) {
                                debug!(%message, "record rejection detail");
                            }
                        }
                    }
                    self.metrics.add_sent(batch.len() as u64);
                    self.metrics.inc_batches_sent();
                    debug!(batch_size = batch.len(), attempts = attempt, "batch committed");
                    return true;
                }
                Action::DropBatch => {
                    match &outcome {
                        Outcome::AuthInvalid => {
                            error!("server rejected api key, latching ingestion shut");
                            self.latches.set_api_key_invalid();
                        }
                        Outcome::NotFound => {
                            error!("ingestion endpoint not found, latching ingestion shut");
                            self.latches.set_project_not_found();
                        }
                        Outcome::ClientValidation { message } => {
                            warn!(%message, "batch rejected as invalid, dropping");
                        }
                        _ => {}
                    }
                    self.metrics.add_dropped_validation(batch.len() as u64);
                    return true;
                }
                Action::Retry(delay) => {
                    if self.breaker.state() == CircuitState::Open {
                        // The breaker tripped on this attempt; stop hammering
                        // and hand the batch back for after recovery.
                        self.queue.requeue_front(batch);
                        return false;
                    }
                    debug!(
                        delay_ms = delay.as_millis() as u64,
                        attempt,
                        outcome = outcome.class(),
                        "retrying batch"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = self.abort.cancelled() => {
                            self.queue.requeue_front(batch);
                            return false;
                        }
                    }
                }
                Action::GiveUp => {
                    debug!(
                        attempts = attempt,
                        outcome = outcome.class(),
                        "retry budget exhausted, requeueing batch"
                    );
                    self.queue.requeue_front(batch);
                    return false;
                }
            }
        }
    }

    /// Adaptive slowdown: sustained 503s double the flush interval (capped);
    /// any acceptance restores the configured cadence.
    fn track_backpressure(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::BackpressureFull { .. } => {
                self.backpressure_streak += 1;
                if self.backpressure_streak >= BACKPRESSURE_SLOWDOWN_AFTER {
                    let slowed = (self.current_flush_interval * 2).min(MAX_FLUSH_INTERVAL);
                    if slowed != self.current_flush_interval {
                        warn!(
                            interval_secs = slowed.as_secs(),
                            "sustained backpressure, slowing flush cadence"
                        );
                        self.current_flush_interval = slowed;
                    }
                    self.backpressure_streak = 0;
                }
            }
            Outcome::Accepted { .. } => {
                self.backpressure_streak = 0;
                if self.current_flush_interval != self.base_flush_interval {
                    debug!("backpressure cleared, restoring flush cadence");
                    self.current_flush_interval = self.base_flush_interval;
                }
            }
            _ => self.backpressure_streak = 0,
        }
    }

    fn publish_breaker(&self) {
        self.metrics.set_breaker(self.breaker.state(), self.breaker.consecutive_failures());
    }

    fn observe_queue_latency(&self, batch: &[QueueSlot]) {
        let worst = batch
            .iter()
            .map(|slot| slot.enqueued_at.elapsed().as_millis() as u64)
            .max()
            .unwrap_or(0);
        self.metrics.set_queue_latency_ms(worst);
    }
}
