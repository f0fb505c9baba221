//! Client configuration.
//!
//! Construction is fail-fast: [`Config::validate`] collects every violated
//! constraint and [`Client::start`](crate::Client::start) refuses to build a
//! client from an invalid configuration. `from_env` reads `LOGSHIP_*`
//! environment variables, falling back to defaults for anything absent or
//! unparseable.

use std::env;
use std::time::Duration;

use crate::error::ConfigError;

/// Required prefix of project API keys.
pub const API_KEY_PREFIX: &str = "lsk_";

/// Default ingestion endpoint root.
pub const DEFAULT_BASE_URL: &str = "https://ingest.logship.io";

/// Tunable knobs of the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bearer credential; non-empty, must start with [`API_KEY_PREFIX`].
    pub api_key: String,
    /// HTTP(S) endpoint root the batch path is appended to.
    pub base_url: String,
    /// Time between time-triggered flushes.
    pub flush_interval: Duration,
    /// Queue length that forces an immediate flush.
    pub flush_size: usize,
    /// Upper bound of records per request; at most 1000.
    pub max_batch_size: usize,
    /// Hard queue capacity; the oldest record is dropped above this.
    pub max_queue_size: usize,
    /// Per-request transport timeout.
    pub http_timeout: Duration,
    /// Persistent connections kept in the pool.
    pub http_pool_size: usize,
    /// Stated per-minute send quota.
    pub rate_limit_per_minute: u32,
    /// Stated per-hour send quota.
    pub rate_limit_per_hour: u32,
    /// Fraction of each quota actually used; in `(0, 1]`.
    pub rate_limit_buffer: f64,
    /// Attempts per batch for transient 5xx responses.
    pub max_retries_server: u32,
    /// Attempts per batch for network failures.
    pub max_retries_network: u32,
    /// Consecutive failures that open the circuit breaker.
    pub breaker_threshold: u32,
    /// Time the breaker stays open before probing.
    pub breaker_timeout: Duration,
    /// Send request bodies as `Content-Encoding: gzip`.
    pub use_compression: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            flush_interval: Duration::from_secs(5),
            flush_size: 100,
            max_batch_size: 1000,
            max_queue_size: 10_000,
            http_timeout: Duration::from_secs(5),
            http_pool_size: 10,
            rate_limit_per_minute: 300,
            rate_limit_per_hour: 10_000,
            rate_limit_buffer: 0.9,
            max_retries_server: 3,
            max_retries_network: 3,
            breaker_threshold: 5,
            breaker_timeout: Duration::from_secs(60),
            use_compression: false,
        }
    }
}

impl Config {
    /// Builds a configuration with the given credentials and defaults for
    /// everything else.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), base_url: base_url.into(), ..Self::default() }
    }

    /// Builds a configuration from `LOGSHIP_*` environment variables.
    ///
    /// Absent or unparseable values fall back to their defaults; the result
    /// is validated before it is returned.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            api_key: env::var("LOGSHIP_API_KEY").unwrap_or(defaults.api_key),
            base_url: env::var("LOGSHIP_BASE_URL").unwrap_or(defaults.base_url),
            flush_interval: env_secs("LOGSHIP_FLUSH_INTERVAL").unwrap_or(defaults.flush_interval),
            flush_size: env_parse("LOGSHIP_FLUSH_SIZE").unwrap_or(defaults.flush_size),
            max_batch_size: env_parse("LOGSHIP_MAX_BATCH_SIZE").unwrap_or(defaults.max_batch_size),
            max_queue_size: env_parse("LOGSHIP_MAX_QUEUE_SIZE").unwrap_or(defaults.max_queue_size),
            http_timeout: env_secs("LOGSHIP_HTTP_TIMEOUT").unwrap_or(defaults.http_timeout),
            http_pool_size: env_parse("LOGSHIP_HTTP_POOL_SIZE").unwrap_or(defaults.http_pool_size),
            rate_limit_per_minute: env_parse("LOGSHIP_RATE_LIMIT_PER_MINUTE")
                .unwrap_or(defaults.rate_limit_per_minute),
            rate_limit_per_hour: env_parse("LOGSHIP_RATE_LIMIT_PER_HOUR")
                .unwrap_or(defaults.rate_limit_per_hour),
            rate_limit_buffer: env_parse("LOGSHIP_RATE_LIMIT_BUFFER")
                .unwrap_or(defaults.rate_limit_buffer),
            max_retries_server: env_parse("LOGSHIP_MAX_RETRIES_SERVER")
                .unwrap_or(defaults.max_retries_server),
            max_retries_network: env_parse("LOGSHIP_MAX_RETRIES_NETWORK")
                .unwrap_or(defaults.max_retries_network),
            breaker_threshold: env_parse("LOGSHIP_BREAKER_THRESHOLD")
                .unwrap_or(defaults.breaker_threshold),
            breaker_timeout: env_secs("LOGSHIP_BREAKER_TIMEOUT").unwrap_or(defaults.breaker_timeout),
            use_compression: env::var("LOGSHIP_USE_COMPRESSION")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(defaults.use_compression),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks every constraint, returning the full list of violations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut violations = Vec::new();

        if self.api_key.is_empty() {
            violations.push("api_key must not be empty".to_string());
        } else if !self.api_key.starts_with(API_KEY_PREFIX) {
            violations.push(format!("api_key must start with {API_KEY_PREFIX:?}"));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            violations.push("base_url must be an http(s) URL".to_string());
        }
        if self.flush_interval.is_zero() {
            violations.push("flush_interval must be > 0".to_string());
        }
        if self.flush_size == 0 {
            violations.push("flush_size must be > 0".to_string());
        }
        if self.max_batch_size == 0 || self.max_batch_size > 1000 {
            violations.push("max_batch_size must be in 1..=1000".to_string());
        }
        if self.max_queue_size == 0 {
            violations.push("max_queue_size must be > 0".to_string());
        }
        if self.http_timeout.is_zero() {
            violations.push("http_timeout must be > 0".to_string());
        }
        if self.http_pool_size == 0 {
            violations.push("http_pool_size must be > 0".to_string());
        }
        if self.rate_limit_per_minute == 0 {
            violations.push("rate_limit_per_minute must be > 0".to_string());
        }
        if self.rate_limit_per_hour == 0 {
            violations.push("rate_limit_per_hour must be > 0".to_string());
        }
        if !(self.rate_limit_buffer > 0.0 && self.rate_limit_buffer <= 1.0) {
            violations.push("rate_limit_buffer must be in (0, 1]".to_string());
        }
        if self.max_retries_server == 0 {
            violations.push("max_retries_server must be > 0".to_string());
        }
        if self.max_retries_network == 0 {
            violations.push("max_retries_network must be > 0".to_string());
        }
        if self.breaker_threshold == 0 {
            violations.push("breaker_threshold must be > 0".to_string());
        }
        if self.breaker_timeout.is_zero() {
            violations.push("breaker_timeout must be > 0".to_string());
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { violations })
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|value| value.trim().parse().ok())
}

fn env_secs(name: &str) -> Option<Duration> {
    env_parse::<f64>(name)
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}
