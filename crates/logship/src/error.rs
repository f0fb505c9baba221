//! Error types for the ingestion client.
//!
//! Only [`ValidationError`] is ever surfaced to producers; every other
//! failure inside the pipeline is absorbed by the flusher and becomes a
//! metric counter and a health issue.

use thiserror::Error;

/// Construction-time configuration failure.
///
/// Validation is fail-fast and exhaustive: every violated constraint is
/// collected before the error is returned, so a misconfigured deployment
/// surfaces all of its problems at once.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more configuration constraints were violated.
    #[error("invalid configuration: {}", .violations.join("; "))]
    Invalid {
        /// Every violated constraint, in declaration order.
        violations: Vec<String>,
    },

    /// The HTTP client could not be constructed from the given settings.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Record-level validation failure, returned synchronously from
/// [`Client::enqueue`](crate::Client::enqueue).
///
/// The producer decides whether to retry with a fixed record; the pipeline
/// never sees a record that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field was empty or missing.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// An enum-typed field carried a value outside its allowed set.
    ///
    /// Only reachable when records are built from dynamic data (e.g. a
    /// middleware adapter parsing framework values); the typed constructors
    /// cannot produce it.
    #[error("unknown {field} value: {value:?}")]
    UnknownEnumValue {
        /// Field whose value was not recognized.
        field: &'static str,
        /// The offending input.
        value: String,
    },

    /// The attributes map serializes to more than the allowed size.
    ///
    /// Attributes are never truncated; an oversized map fails validation.
    #[error("attributes serialize to {actual} bytes, limit is {limit}")]
    AttributesTooLarge {
        /// Serialized size of the attributes map.
        actual: usize,
        /// Configured ceiling in bytes.
        limit: usize,
    },

    /// The attributes map could not be serialized to JSON at all.
    #[error("attributes are not JSON-serializable: {0}")]
    AttributesUnserializable(String),
}

/// Failure raised by [`Client::shutdown`](crate::Client::shutdown) when the
/// drain deadline expires before the queue empties.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// The flusher did not finish draining within the allotted time; the
    /// remaining records were abandoned and counted as `dropped_on_shutdown`.
    #[error("shutdown timeout exceeded, {abandoned} records abandoned")]
    TimeoutExceeded {
        /// Number of records still queued when the deadline expired.
        abandoned: u64,
    },
}
