//! Dual sliding-window admission gate for outbound send attempts.
//!
//! Two windows are enforced simultaneously: one minute and one hour. The
//! limiter applies a configurable fraction of each stated quota (90% by
//! default) so the client stays proactively under the remote's limits
//! instead of waiting to be throttled.
//!
//! The limiter is owned exclusively by the flusher, so no locking is
//! needed; `acquire` is cooperative and cancellable.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const MINUTE_WINDOW: Duration = Duration::from_secs(60);
const HOUR_WINDOW: Duration = Duration::from_secs(3600);

/// Admission gate enforcing per-minute and per-hour send caps.
#[derive(Debug)]
pub(crate) struct DualWindowRateLimiter {
    minute_window: VecDeque<Instant>,
    hour_window: VecDeque<Instant>,
    minute_cap: usize,
    hour_cap: usize,
}

impl DualWindowRateLimiter {
    /// Builds a limiter applying `buffer` (in `(0, 1]`) of each stated cap.
    ///
    /// The effective cap never drops below 1; a limiter that admits nothing
    /// would deadlock the flusher.
    pub fn new(limit_per_minute: u32, limit_per_hour: u32, buffer: f64) -> Self {
        let effective = |limit: u32| ((f64::from(limit) * buffer).ceil() as usize).max(1);
        Self {
            minute_window: VecDeque::new(),
            hour_window: VecDeque::new(),
            minute_cap: effective(limit_per_minute),
            hour_cap: effective(limit_per_hour),
        }
    }

    /// Blocks until both windows admit one send, then records it.
    ///
    /// Sleeps until the binding window's oldest entry ages out (plus 1 ms of
    /// slack so the re-check lands past the boundary), re-checking in a loop.
    /// Returns `false` if cancelled mid-wait; nothing is recorded in that
    /// case.
    pub async fn acquire(&mut self, cancel: &CancellationToken) -> bool {
        loop {
            let now = Instant::now();
            self.prune(now);
            match self.next_admission() {
                None => {
                    self.minute_window.push_back(now);
                    self.hour_window.push_back(now);
                    return true;
                }
                Some(ready_at) => {
                    debug!(
                        wait_ms = (ready_at - now).as_millis() as u64,
                        "rate limiter window full, waiting"
                    );
                    tokio::select! {
                        () = tokio::time::sleep_until(ready_at + Duration::from_millis(1)) => {}
                        () = cancel.cancelled() => return false,
                    }
                }
            }
        }
    }

    /// Entries currently inside each window, after pruning.
    pub fn window_usage(&mut self) -> (u64, u64) {
        self.prune(Instant::now());
        (self.minute_window.len() as u64, self.hour_window.len() as u64)
    }

    /// When the binding window next admits, or `None` if both admit now.
    fn next_admission(&self) -> Option<Instant> {
        let minute_ready = (self.minute_window.len() >= self.minute_cap)
            .then(|| self.minute_window.front().map(|oldest| *oldest + MINUTE_WINDOW))
            .flatten();
        let hour_ready = (self.hour_window.len() >= self.hour_cap)
            .then(|| self.hour_window.front().map(|oldest| *oldest + HOUR_WINDOW))
            .flatten();
        match (minute_ready, hour_ready) {
            (Some(m), Some(h)) => Some(m.max(h)),
            (Some(m), None) => Some(m),
            (None, Some(h)) => Some(h),
            (None, None) => None,
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.minute_window.front() {
            if now.duration_since(*oldest) >= MINUTE_WINDOW {
                self.minute_window.pop_front();
            } else {
                break;
            }
        }
        while let Some(oldest) = self.hour_window.front() {
            if now.duration_since(*oldest) >= HOUR_WINDOW {
                self.hour_window.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_admits_up_to_effective_cap() {
        // 10/minute at 0.9 buffer = 9 effective.
        let mut limiter = DualWindowRateLimiter::new(10, 1000, 0.9);
        let cancel = CancellationToken::new();
        for _ in 0..9 {
            assert!(limiter.acquire(&cancel).await);
        }
        assert_eq!(limiter.window_usage().0, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_minute_window() {
        let mut limiter = DualWindowRateLimiter::new(2, 1000, 1.0);
        let cancel = CancellationToken::new();
        assert!(limiter.acquire(&cancel).await);
        assert!(limiter.acquire(&cancel).await);

        let before = Instant::now();
        // Third acquire must wait for the first entry to age out (~60 s,
        // which the paused clock auto-advances through).
        assert!(limiter.acquire(&cancel).await);
        let waited = Instant::now() - before;
        assert!(waited >= Duration::from_secs(59), "waited only {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hour_window_binds_when_tighter() {
        // Minute window is generous; hour cap of 2 binds.
        let mut limiter = DualWindowRateLimiter::new(1000, 2, 1.0);
        let cancel = CancellationToken::new();
        assert!(limiter.acquire(&cancel).await);
        assert!(limiter.acquire(&cancel).await);

        let before = Instant::now();
        assert!(limiter.acquire(&cancel).await);
        let waited = Instant::now() - before;
        assert!(waited >= Duration::from_secs(3599), "waited only {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_wait() {
        let mut limiter = DualWindowRateLimiter::new(1, 1000, 1.0);
        let cancel = CancellationToken::new();
        assert!(limiter.acquire(&cancel).await);

        cancel.cancel();
        assert!(!limiter.acquire(&cancel).await);
        // The cancelled attempt recorded nothing.
        assert_eq!(limiter.window_usage().0, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_age_out() {
        let mut limiter = DualWindowRateLimiter::new(5, 1000, 1.0);
        let cancel = CancellationToken::new();
        for _ in 0..5 {
            assert!(limiter.acquire(&cancel).await);
        }
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(limiter.window_usage().0, 0);
        // Hour window still holds them.
        assert_eq!(limiter.window_usage().1, 5);
    }

    #[test]
    fn test_effective_cap_never_zero() {
        let limiter = DualWindowRateLimiter::new(1, 1, 0.1);
        assert_eq!(limiter.minute_cap, 1);
        assert_eq!(limiter.hour_cap, 1);
    }

    #[test]
    fn test_buffer_applied_with_ceiling() {
        let limiter = DualWindowRateLimiter::new(100, 3600, 0.9);
        assert_eq!(limiter.minute_cap, 90);
        assert_eq!(limiter.hour_cap, 3240);
        // 0.9 * 15 = 13.5 rounds up.
        let limiter = DualWindowRateLimiter::new(15, 15, 0.9);
        assert_eq!(limiter.minute_cap, 14);
    }
}
