//! Circuit breaker gating the transport.
//!
//! Three states:
//!
//! ```text
//!   Closed ──≥ threshold consecutive failures──▶ Open
//!   Open ──breaker_timeout elapsed──▶ HalfOpen
//!   HalfOpen ──success──▶ Closed
//!   HalfOpen ──failure──▶ Open (timer restarts)
//! ```
//!
//! A "success" is an `Accepted` outcome; everything else counts as a
//! failure, including throttling and backpressure retries. While open, the
//! flusher performs no transport calls at all; half-open permits exactly one
//! single-record probe.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// What the breaker permits for the next flush iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Gate {
    /// Closed: send a full batch.
    Allow,
    /// Half-open: send exactly one record as a probe.
    Probe,
    /// Open and the recovery timer has not elapsed: send nothing.
    Blocked,
}

/// Consecutive-failure circuit breaker, owned exclusively by the flusher.
#[derive(Debug)]
pub(crate) struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    threshold: u32,
    timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, timeout: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            threshold,
            timeout,
        }
    }

    /// Decides what the next flush iteration may do, transitioning
    /// Open → HalfOpen when the recovery timer has elapsed.
    pub fn gate(&mut self) -> Gate {
        match self.state {
            CircuitState::Closed => Gate::Allow,
            CircuitState::HalfOpen => Gate::Probe,
            CircuitState::Open => {
                let elapsed = self.opened_at.map(|at| at.elapsed()).unwrap_or(self.timeout);
                if elapsed >= self.timeout {
                    debug!("circuit breaker recovery timer elapsed, probing");
                    self.state = CircuitState::HalfOpen;
                    Gate::Probe
                } else {
                    Gate::Blocked
                }
            }
        }
    }

    /// Records an `Accepted` outcome.
    pub fn on_success(&mut self) {
        if self.state != CircuitState::Closed {
            debug!("circuit breaker closing after successful send");
        }
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    /// Records any non-`Accepted` outcome.
    pub fn on_failure(&mut self) {
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.threshold {
                    warn!(
                        consecutive_failures = self.consecutive_failures,
                        timeout_secs = self.timeout.as_secs(),
                        "circuit breaker opening"
                    );
                    self.state = CircuitState::Open;
                    self.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                warn!("probe failed, circuit breaker reopening");
                self.consecutive_failures += 1;
                self.state = CircuitState::Open;
                self.opened_at = Some(Instant::now());
            }
            // Failures cannot be observed while open; the gate blocks sends.
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(5, Duration::from_secs(60))
    }

    #[test]
    fn test_starts_closed() {
        let mut b = breaker();
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.gate(), Gate::Allow);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_failures() {
        let mut b = breaker();
        for _ in 0..4 {
            b.on_failure();
            assert_eq!(b.state(), CircuitState::Closed);
        }
        b.on_failure();
        assert_eq!(b.state(), CircuitState::Open);
        assert_eq!(b.gate(), Gate::Blocked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_streak() {
        let mut b = breaker();
        for _ in 0..4 {
            b.on_failure();
        }
        b.on_success();
        assert_eq!(b.consecutive_failures(), 0);
        for _ in 0..4 {
            b.on_failure();
        }
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_timeout() {
        let mut b = breaker();
        for _ in 0..5 {
            b.on_failure();
        }
        assert_eq!(b.gate(), Gate::Blocked);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(b.gate(), Gate::Probe);
        assert_eq!(b.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_success_closes() {
        let mut b = breaker();
        for _ in 0..5 {
            b.on_failure();
        }
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(b.gate(), Gate::Probe);
        b.on_success();
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.gate(), Gate::Allow);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_reopens_with_fresh_timer() {
        let mut b = breaker();
        for _ in 0..5 {
            b.on_failure();
        }
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(b.gate(), Gate::Probe);
        b.on_failure();
        assert_eq!(b.state(), CircuitState::Open);
        // A fresh full timeout must elapse before the next probe.
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(b.gate(), Gate::Blocked);
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(b.gate(), Gate::Probe);
    }

    #[test]
    fn test_state_round_trips_through_u8() {
        for state in [CircuitState::Closed, CircuitState::Open, CircuitState::HalfOpen] {
            assert_eq!(CircuitState::from_u8(state.as_u8()), state);
        }
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "closed");
        assert_eq!(CircuitState::HalfOpen.to_string(), "half-open");
    }
}
