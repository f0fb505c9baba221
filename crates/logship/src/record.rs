//! The unit of ingestion: a single structured log record.
//!
//! Records are opaque to the pipeline except for size accounting; the field
//! set here mirrors the wire schema exactly. Timestamps travel as ISO-8601
//! with a trailing `Z` and millisecond precision.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

/// Log severity levels accepted by the ingestion endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Parses a level from dynamic input, e.g. a middleware adapter mapping
    /// framework severities.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "critical" => Ok(LogLevel::Critical),
            other => Err(ValidationError::UnknownEnumValue {
                field: "level",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warning => write!(f, "warning"),
            LogLevel::Error => write!(f, "error"),
            LogLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Origin of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    Console,
    Logger,
    Exception,
    Custom,
    Http,
}

impl LogType {
    /// Parses a log type from dynamic input.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "console" => Ok(LogType::Console),
            "logger" => Ok(LogType::Logger),
            "exception" => Ok(LogType::Exception),
            "custom" => Ok(LogType::Custom),
            "http" => Ok(LogType::Http),
            other => Err(ValidationError::UnknownEnumValue {
                field: "log_type",
                value: other.to_string(),
            }),
        }
    }
}

/// Delivery importance hint attached to each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    Standard,
    High,
}

impl Importance {
    /// Parses an importance from dynamic input.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "low" => Ok(Importance::Low),
            "standard" => Ok(Importance::Standard),
            "high" => Ok(Importance::High),
            other => Err(ValidationError::UnknownEnumValue {
                field: "importance",
                value: other.to_string(),
            }),
        }
    }
}

/// A single structured log record, the unit of transport.
///
/// The exception fields (`error_type`, `error_message`, `stack_trace`) are
/// expected only on `log_type = exception` records; their presence elsewhere
/// is harmless and they ship as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Instant the record was produced. Millisecond precision on the wire;
    /// excess precision is truncated, not rounded.
    #[serde(with = "wire_time")]
    pub timestamp: DateTime<Utc>,

    /// Severity level.
    pub level: LogLevel,

    /// Origin of the record.
    pub log_type: LogType,

    /// Delivery importance hint.
    pub importance: Importance,

    /// Log message content.
    pub message: String,

    /// Exception class name, present for exception records.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_type: Option<String>,

    /// Exception message, present for exception records.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_message: Option<String>,

    /// Captured stack trace, present for exception records.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stack_trace: Option<String>,

    /// Unordered structured attributes.
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub attributes: HashMap<String, Value>,
}

impl LogRecord {
    /// Creates a record stamped with the current time.
    ///
    /// Defaults: `log_type = logger`, `importance = standard`.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            log_type: LogType::Logger,
            importance: Importance::Standard,
            message: message.into(),
            error_type: None,
            error_message: None,
            stack_trace: None,
            attributes: HashMap::new(),
        }
    }

    /// Sets the record origin.
    pub fn with_log_type(mut self, log_type: LogType) -> Self {
        self.log_type = log_type;
        self
    }

    /// Sets the delivery importance.
    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = importance;
        self
    }

    /// Sets an explicit timestamp, replacing the construction-time default.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attaches exception details and switches the record to
    /// `log_type = exception`.
    pub fn with_exception(
        mut self,
        error_type: impl Into<String>,
        error_message: impl Into<String>,
        stack_trace: impl Into<String>,
    ) -> Self {
        self.log_type = LogType::Exception;
        self.error_type = Some(error_type.into());
        self.error_message = Some(error_message.into());
        self.stack_trace = Some(stack_trace.into());
        self
    }

    /// Adds one structured attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Wire format for timestamps: ISO-8601 with `Z`, millisecond precision.
///
/// Deserialization also accepts timestamps without a timezone, which are
/// treated as UTC.
pub(crate) mod wire_time {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // SecondsFormat::Millis truncates sub-millisecond precision.
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(parsed.with_timezone(&Utc));
        }
        // No timezone designator: treat as UTC.
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Utc.from_utc_datetime(&naive))
            .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
    }
}
