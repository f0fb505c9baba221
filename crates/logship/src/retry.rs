//! Retry/backoff policy: a pure function over (outcome, attempt).
//!
//! The flusher consults this after every transport attempt. Bounded
//! exponential backoff for transient server and network failures; unbounded
//! server-directed delays for throttling and backpressure; immediate drop
//! for non-retryable outcomes.

use std::time::Duration;

use crate::transport::Outcome;

/// Bounded retry counts, taken from the client configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub max_retries_server: u32,
    pub max_retries_network: u32,
}

/// What the flusher does with the in-flight batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    /// Batch delivered; dismiss it and update metrics.
    Commit,
    /// Batch is unsalvageable; dismiss it and count the drop.
    DropBatch,
    /// Sleep for the given delay, then reattempt the same batch.
    Retry(Duration),
    /// Stop attempting this iteration; requeue the batch at the head so the
    /// next flush tick reattempts it.
    GiveUp,
}

/// Network-error backoff ceiling.
const NETWORK_DELAY_CAP: Duration = Duration::from_secs(40);

/// Minimum honored server-directed delay.
const SERVER_DIRECTED_FLOOR: Duration = Duration::from_secs(1);

/// Decides the next action for a batch whose `attempt`-th transport attempt
/// (1-based) produced `outcome`.
pub(crate) fn decide(outcome: &Outcome, attempt: u32, policy: &RetryPolicy) -> Action {
    match outcome {
        Outcome::Accepted { .. } => Action::Commit,

        Outcome::ClientValidation { .. } => Action::DropBatch,

        // The flusher also latches ingestion shut on these; see the flusher.
        Outcome::AuthInvalid | Outcome::NotFound => Action::DropBatch,

        // Server-directed delay, unlimited retries of the same batch.
        Outcome::Throttled { retry_after } | Outcome::BackpressureFull { retry_after } => {
            Action::Retry((*retry_after).max(SERVER_DIRECTED_FLOOR))
        }

        // 1 s, 2 s, 4 s, ... doubling until the attempt budget runs out.
        Outcome::ServerTransient { .. } => {
            if attempt >= policy.max_retries_server {
                Action::GiveUp
            } else {
                Action::Retry(Duration::from_secs(1u64 << (attempt - 1).min(6)))
            }
        }

        // 5 s, 10 s, 20 s, capped at 40 s thereafter.
        Outcome::NetworkError { .. } => {
            if attempt >= policy.max_retries_network {
                Action::GiveUp
            } else {
                let delay = Duration::from_secs(5u64 << (attempt - 1).min(6));
                Action::Retry(delay.min(NETWORK_DELAY_CAP))
            }
        }
    }
}
