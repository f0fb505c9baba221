//! Client facade: lifecycle owner of the ingestion pipeline.
//!
//! A [`Client`] validates its configuration, wires the queue, metrics, and
//! transport together, and spawns the single background flusher. Producers
//! interact only with the facade: [`Client::enqueue`] is synchronous,
//! performs no I/O, and never blocks on the network.
//!
//! Construction and shutdown are explicit. `Client` is an ordinary value;
//! wrap it in an `Arc` to share it across tasks or threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{Config, API_KEY_PREFIX};
use crate::error::{ConfigError, ShutdownError, ValidationError};
use crate::flusher::{Flusher, FlusherConfig};
use crate::metrics::{Health, Latches, Metrics, MetricsSnapshot};
use crate::queue::BoundedQueue;
use crate::record::LogRecord;
use crate::transport::Transport;
use crate::validator;

/// Handle to a running ingestion pipeline.
///
/// All methods are safe to call from any number of concurrent callers.
pub struct Client {
    config: Config,
    queue: Arc<BoundedQueue>,
    metrics: Arc<Metrics>,
    latches: Arc<Latches>,
    api_key: Arc<RwLock<String>>,
    flush_notify: Arc<Notify>,
    shutdown: CancellationToken,
    abort: CancellationToken,
    flusher_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    shutdown_started: AtomicBool,
}

impl Client {
    /// Validates the configuration, builds the pipeline, and spawns the
    /// flusher.
    ///
    /// Fails fast with every violated constraint if the configuration is
    /// invalid. Must be called within a tokio runtime.
    pub fn start(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let queue = Arc::new(BoundedQueue::new(config.max_queue_size));
        let metrics = Arc::new(Metrics::default());
        let latches = Arc::new(Latches::default());
        let api_key = Arc::new(RwLock::new(config.api_key.clone()));
        let flush_notify = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();
        let abort = CancellationToken::new();

        let transport = Transport::new(&config, Arc::clone(&api_key))?;
        let flusher = Flusher::new(
            &config,
            FlusherConfig {
                queue: Arc::clone(&queue),
                metrics: Arc::clone(&metrics),
                latches: Arc::clone(&latches),
                transport,
                flush_notify: Arc::clone(&flush_notify),
                shutdown: shutdown.clone(),
                abort: abort.clone(),
            },
        );
        let flusher_handle = tokio::spawn(flusher.run());
        debug!(base_url = %config.base_url, "ingestion client started");

        Ok(Self {
            config,
            queue,
            metrics,
            latches,
            api_key,
            flush_notify,
            shutdown,
            abort,
            flusher_handle: tokio::sync::Mutex::new(Some(flusher_handle)),
            shutdown_started: AtomicBool::new(false),
        })
    }

    /// Validates and queues one record.
    ///
    /// Synchronous and allocation-light: validation, a mutex push, and at
    /// most one `Notify` wake. Returns immediately; the only failure a
    /// producer ever sees is a validation failure. When the queue is full
    /// the oldest record is evicted and this call still succeeds.
    pub fn enqueue(&self, record: LogRecord) -> Result<(), ValidationError> {
        self.metrics.inc_enqueued();
        let validated = match validator::validate(record) {
            Ok(validated) => validated,
            Err(e) => {
                self.metrics.add_dropped_validation(1);
                return Err(e);
            }
        };
        let queued = self.queue.enqueue(validated);
        if queued >= self.config.flush_size {
            self.flush_notify.notify_one();
        }
        Ok(())
    }

    /// Point-in-time snapshot of every pipeline counter.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(
            self.queue.len(),
            self.queue.capacity(),
            self.queue.dropped_overflow(),
            &self.latches,
        )
    }

    /// Aggregated health derived from the current metrics.
    pub fn health(&self) -> Health {
        Health::from_snapshot(&self.metrics())
    }

    /// Clears the auth latches, optionally swapping in a new API key, and
    /// kicks the flusher so queued records start moving again.
    pub fn refresh_credentials(&self, new_key: Option<String>) -> Result<(), ConfigError> {
        if let Some(key) = new_key {
            if key.is_empty() || !key.starts_with(API_KEY_PREFIX) {
                return Err(ConfigError::Invalid {
                    violations: vec![format!(
                        "api_key must be non-empty and start with {API_KEY_PREFIX:?}"
                    )],
                });
            }
            match self.api_key.write() {
                Ok(mut guard) => *guard = key,
                Err(poisoned) => *poisoned.into_inner() = key,
            }
        }
        self.latches.clear();
        self.flush_notify.notify_one();
        debug!("credentials refreshed, ingestion latches cleared");
        Ok(())
    }

    /// Raises the shutdown signal and waits up to `timeout` for the flusher
    /// to drain the queue through the normal pipeline.
    ///
    /// On timeout the flusher is aborted and the remaining records are
    /// abandoned and counted as `dropped_on_shutdown`. Idempotent: later
    /// calls (including concurrent ones) return `Ok` without further
    /// effect.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), ShutdownError> {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            // Another caller already drove the shutdown; serialize on the
            // handle lock so we return only once it finished.
            let _guard = self.flusher_handle.lock().await;
            return Ok(());
        }
        self.shutdown.cancel();

        let mut guard = self.flusher_handle.lock().await;
        let Some(mut handle) = guard.take() else {
            return Ok(());
        };

        let timed_out = tokio::time::timeout(timeout, &mut handle).await.is_err();
        if timed_out {
            warn!("shutdown drain deadline expired, aborting flusher");
            self.abort.cancel();
            // The flusher unwinds at its next suspension point.
            let _ = tokio::time::timeout(Duration::from_secs(5), &mut handle).await;
        }

        let abandoned = self.queue.clear() as u64;
        if abandoned > 0 {
            self.metrics.add_dropped_on_shutdown(abandoned);
            warn!(abandoned, "records abandoned at shutdown");
        }
        debug!("ingestion client stopped");

        if timed_out {
            Err(ShutdownError::TimeoutExceeded { abandoned })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::HealthStatus;
    use crate::record::LogLevel;
    use crate::validator::MAX_ATTRIBUTES_BYTES;
    use serde_json::Value;

    fn test_config() -> Config {
        // Port 9 (discard) is never listened on; transport calls fail fast
        // as network errors, which these tests never reach.
        let mut config = Config::new("lsk_unit_test", "http://127.0.0.1:9");
        config.flush_interval = Duration::from_secs(3600);
        config.flush_size = 1_000_000;
        config
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let config = Config::new("wrong_prefix", "not-a-url");
        let Err(ConfigError::Invalid { violations }) = Client::start(config) else {
            panic!("expected invalid config");
        };
        assert_eq!(violations.len(), 2);
    }

    #[tokio::test]
    async fn test_enqueue_counts_and_queues() {
        let client = Client::start(test_config()).unwrap();
        client.enqueue(LogRecord::new(LogLevel::Info, "one")).unwrap();
        client.enqueue(LogRecord::new(LogLevel::Info, "two")).unwrap();

        let snapshot = client.metrics();
        assert_eq!(snapshot.enqueued, 2);
        assert_eq!(snapshot.queue_size, 2);
        client.shutdown(Duration::from_millis(50)).await.ok();
    }

    #[tokio::test]
    async fn test_enqueue_surfaces_validation_failure() {
        let client = Client::start(test_config()).unwrap();
        let oversized = LogRecord::new(LogLevel::Info, "attrs")
            .with_attribute("blob", Value::String("x".repeat(MAX_ATTRIBUTES_BYTES + 1)));
        let result = client.enqueue(oversized);
        assert!(matches!(result, Err(ValidationError::AttributesTooLarge { .. })));

        let snapshot = client.metrics();
        assert_eq!(snapshot.enqueued, 1);
        assert_eq!(snapshot.dropped_validation, 1);
        assert_eq!(snapshot.queue_size, 0);
        client.shutdown(Duration::from_millis(50)).await.ok();
    }

    #[tokio::test]
    async fn test_fresh_client_is_healthy() {
        let client = Client::start(test_config()).unwrap();
        assert_eq!(client.health().status, HealthStatus::Healthy);
        client.shutdown(Duration::from_millis(50)).await.ok();
    }

    #[tokio::test]
    async fn test_refresh_credentials_validates_key() {
        let client = Client::start(test_config()).unwrap();
        assert!(client.refresh_credentials(Some("bad".to_string())).is_err());
        assert!(client.refresh_credentials(Some("lsk_rotated".to_string())).is_ok());
        assert!(client.refresh_credentials(None).is_ok());
        client.shutdown(Duration::from_millis(50)).await.ok();
    }

    #[tokio::test]
    async fn test_shutdown_idempotent() {
        let client = Client::start(test_config()).unwrap();
        assert!(client.shutdown(Duration::from_secs(1)).await.is_ok());
        assert!(client.shutdown(Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_empty_queue_is_clean() {
        let client = Client::start(test_config()).unwrap();
        let result = client.shutdown(Duration::from_secs(1)).await;
        assert!(result.is_ok());
        assert_eq!(client.metrics().dropped_on_shutdown, 0);
    }
}
