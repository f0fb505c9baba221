//! Non-blocking log ingestion client.
//!
//! This crate embeds in a web-service process and delivers structured log
//! records to a remote ingestion endpoint in batches, while keeping the
//! producer path synchronous, allocation-light, and free of I/O.
//!
//! # Architecture
//!
//! ```text
//!   Producers (request handlers, middleware)
//!        │  enqueue(): validate + push, never blocks on the network
//!        v
//!   ┌──────────────┐
//!   │ BoundedQueue │  hard capacity, head-drop overflow
//!   └──────┬───────┘
//!          │  time / size trigger
//!          v
//!   ┌──────────────┐
//!   │   Flusher    │  single background worker
//!   └──────┬───────┘
//!          │  rate limiter ─▶ circuit breaker ─▶ transport
//!          v
//!   POST /api/v1/ingest/batch ──▶ outcome ──▶ retry policy
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use logship::{Client, Config, LogLevel, LogRecord};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::new("lsk_your_project_key", "https://ingest.example.com");
//!     let client = Client::start(config)?;
//!
//!     client.enqueue(LogRecord::new(LogLevel::Info, "checkout completed"))?;
//!
//!     client.shutdown(Duration::from_secs(10)).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Failure semantics
//!
//! The only error a producer ever sees is a validation failure from
//! [`Client::enqueue`]. Transport failures are retried, counted, and
//! surfaced through [`Client::metrics`] and [`Client::health`]; a remote
//! outage manifests as a growing queue and a degraded health status while
//! the host application keeps serving traffic. Unrecoverable responses
//! (invalid key, unknown project) latch ingestion shut until
//! [`Client::refresh_credentials`] clears them.

pub mod breaker;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod record;
pub mod validator;

mod flusher;
mod queue;
mod rate_limiter;
mod retry;
mod transport;

pub use breaker::CircuitState;
pub use client::Client;
pub use config::{Config, API_KEY_PREFIX};
pub use error::{ConfigError, ShutdownError, ValidationError};
pub use metrics::{Health, HealthStatus, MetricsSnapshot, OutcomeSnapshot};
pub use record::{Importance, LogLevel, LogRecord, LogType};
pub use transport::IngestResponse;
