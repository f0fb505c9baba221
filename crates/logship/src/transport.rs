//! HTTP transport: turns one batch into a classified outcome.
//!
//! One `POST {base_url}/api/v1/ingest/batch` per batch, body
//! `{"logs": [...]}`, bearer auth, per-request timeout, connection pooling.
//! Every transport result, network failures included, is folded into the
//! [`Outcome`] enum, which is the sole input to the retry policy. The
//! transport itself never retries and never panics.

use std::io::Write;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{HeaderMap, CONTENT_ENCODING, CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::ConfigError;
use crate::queue::QueueSlot;
use crate::record::LogRecord;

/// Path of the batch ingestion endpoint, relative to the base URL.
pub(crate) const INGEST_PATH: &str = "/api/v1/ingest/batch";

/// Applied when a 429/503 response carries no parseable `Retry-After`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// How much of an error response body is kept for diagnostics.
const BODY_SNIPPET_LIMIT: usize = 512;

/// Parsed body of a 202 response.
///
/// Partial rejections are counted but the batch is still considered
/// committed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestResponse {
    #[serde(default)]
    pub accepted: u64,
    #[serde(default)]
    pub rejected: u64,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Classified result of one transport attempt.
#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    /// HTTP 202; the batch is committed even if some records were rejected.
    Accepted { accepted: u64, rejected: u64, errors: Vec<String> },
    /// HTTP 400 (or another unrecognized 4xx): the batch is malformed and
    /// will never be accepted.
    ClientValidation { message: String },
    /// HTTP 401: the API key was rejected.
    AuthInvalid,
    /// HTTP 404: the project does not exist at this endpoint.
    NotFound,
    /// HTTP 429 with a server-directed delay.
    Throttled { retry_after: Duration },
    /// HTTP 503 with a server-directed delay.
    BackpressureFull { retry_after: Duration },
    /// Any other 5xx.
    ServerTransient { status: u16 },
    /// Timeout, DNS failure, connection refused, TLS failure.
    NetworkError { message: String },
}

impl Outcome {
    /// Stable class name used in metrics and diagnostics.
    pub fn class(&self) -> &'static str {
        match self {
            Outcome::Accepted { .. } => "accepted",
            Outcome::ClientValidation { .. } => "client_validation",
            Outcome::AuthInvalid => "auth_invalid",
            Outcome::NotFound => "not_found",
            Outcome::Throttled { .. } => "throttled",
            Outcome::BackpressureFull { .. } => "backpressure_full",
            Outcome::ServerTransient { .. } => "server_transient",
            Outcome::NetworkError { .. } => "network_error",
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted { .. })
    }
}

#[derive(Serialize)]
struct BatchBody<'a> {
    logs: Vec<&'a LogRecord>,
}

/// Connection-pooled HTTP client for the ingestion endpoint.
///
/// The API key sits behind an `RwLock` shared with the client facade so
/// `refresh_credentials` can swap it while the flusher keeps sending.
pub(crate) struct Transport {
    client: reqwest::Client,
    ingest_url: String,
    api_key: Arc<RwLock<String>>,
    request_timeout: Duration,
    use_compression: bool,
}

impl Transport {
    pub fn new(config: &Config, api_key: Arc<RwLock<String>>) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .pool_max_idle_per_host(config.http_pool_size)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .tcp_keepalive(Some(Duration::from_secs(120)))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            ingest_url: format!("{}{}", config.base_url.trim_end_matches('/'), INGEST_PATH),
            api_key,
            request_timeout: config.http_timeout,
            use_compression: config.use_compression,
        })
    }

    /// Sends one batch and classifies whatever happened.
    pub async fn send_batch(&self, batch: &[QueueSlot]) -> Outcome {
        let body = BatchBody { logs: batch.iter().map(|slot| &slot.record).collect() };
        let payload = match serde_json::to_vec(&body) {
            Ok(payload) => payload,
            Err(e) => {
                return Outcome::ClientValidation {
                    message: format!("failed to serialize batch: {e}"),
                }
            }
        };

        // Only claim gzip when encoding actually succeeded.
        let (payload, compressed) = if self.use_compression {
            match gzip(&payload) {
                Ok(encoded) => (encoded, true),
                Err(e) => {
                    debug!(error = %e, "gzip encoding failed, sending uncompressed");
                    (payload, false)
                }
            }
        } else {
            (payload, false)
        };

        let api_key = match self.api_key.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        let mut request = self
            .client
            .post(&self.ingest_url)
            .timeout(self.request_timeout)
            .bearer_auth(api_key)
            .header(CONTENT_TYPE, "application/json");
        if compressed {
            request = request.header(CONTENT_ENCODING, "gzip");
        }

        match request.body(payload).send().await {
            Ok(response) => classify_response(response).await,
            Err(e) => Outcome::NetworkError { message: describe_network_error(&e) },
        }
    }
}

async fn classify_response(response: reqwest::Response) -> Outcome {
    let status = response.status();
    let retry_after = parse_retry_after(response.headers());
    match status {
        StatusCode::UNAUTHORIZED => Outcome::AuthInvalid,
        StatusCode::NOT_FOUND => Outcome::NotFound,
        StatusCode::TOO_MANY_REQUESTS => Outcome::Throttled { retry_after },
        StatusCode::SERVICE_UNAVAILABLE => Outcome::BackpressureFull { retry_after },
        s if s.is_success() => {
            // 202 in practice; any 2xx means the batch is committed.
            let parsed = response.json::<IngestResponse>().await.unwrap_or_default();
            Outcome::Accepted {
                accepted: parsed.accepted,
                rejected: parsed.rejected,
                errors: parsed.errors,
            }
        }
        s if s.is_server_error() => Outcome::ServerTransient { status: s.as_u16() },
        s => {
            let body = response.text().await.unwrap_or_default();
            Outcome::ClientValidation { message: body_snippet(s.as_u16(), &body) }
        }
    }
}

/// Reads `Retry-After` as integer seconds; missing or unparseable → 60 s.
fn parse_retry_after(headers: &HeaderMap) -> Duration {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

fn body_snippet(status: u16, body: &str) -> String {
    let mut cut = body.len().min(BODY_SNIPPET_LIMIT);
    while cut > 0 && !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("HTTP {status}: {}", &body[..cut])
}

fn describe_network_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("request timed out: {error}")
    } else if error.is_connect() {
        format!("connection failed: {error}")
    } else {
        error.to_string()
    }
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
