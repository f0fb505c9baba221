//! Per-record validation and truncation.
//!
//! Validation is a pure function over one record: required fields must be
//! non-empty, bounded string fields are truncated (never rejected) with a
//! visible marker, and the attributes map must serialize under its size cap
//! or the record fails.

use crate::error::ValidationError;
use crate::record::LogRecord;

/// Maximum size of the `message` field in bytes.
pub const MAX_MESSAGE_BYTES: usize = 10_000;

/// Maximum size of the `error_type` field in bytes.
pub const MAX_ERROR_TYPE_BYTES: usize = 255;

/// Maximum size of the `error_message` field in bytes.
pub const MAX_ERROR_MESSAGE_BYTES: usize = 5_000;

/// Maximum size of the `stack_trace` field in bytes.
pub const MAX_STACK_TRACE_BYTES: usize = 50_000;

/// Maximum serialized size of the `attributes` map in bytes.
///
/// Attributes are structured data and cannot be truncated without changing
/// their meaning, so exceeding this limit is a validation failure rather
/// than a truncation.
pub const MAX_ATTRIBUTES_BYTES: usize = 100 * 1024;

/// Suffix appended to any field that was cut down to its size limit.
pub const TRUNCATION_MARKER: &str = "... [truncated]";

/// Validates one record, truncating oversized bounded fields in place.
///
/// Returns the validated record, or the first violated invariant. After a
/// successful return every bounded string field is within its limit and any
/// field that was cut ends with [`TRUNCATION_MARKER`].
pub fn validate(mut record: LogRecord) -> Result<LogRecord, ValidationError> {
    if record.message.is_empty() {
        return Err(ValidationError::MissingField("message"));
    }

    truncate_in_place(&mut record.message, MAX_MESSAGE_BYTES);
    if let Some(error_type) = record.error_type.as_mut() {
        truncate_in_place(error_type, MAX_ERROR_TYPE_BYTES);
    }
    if let Some(error_message) = record.error_message.as_mut() {
        truncate_in_place(error_message, MAX_ERROR_MESSAGE_BYTES);
    }
    if let Some(stack_trace) = record.stack_trace.as_mut() {
        truncate_in_place(stack_trace, MAX_STACK_TRACE_BYTES);
    }

    if !record.attributes.is_empty() {
        let serialized = serde_json::to_vec(&record.attributes)
            .map_err(|e| ValidationError::AttributesUnserializable(e.to_string()))?;
        if serialized.len() > MAX_ATTRIBUTES_BYTES {
            return Err(ValidationError::AttributesTooLarge {
                actual: serialized.len(),
                limit: MAX_ATTRIBUTES_BYTES,
            });
        }
    }

    Ok(record)
}

/// Truncates `field` to at most `limit` bytes, appending the marker.
///
/// Keeps the first `limit - marker.len()` bytes, backing off to a UTF-8
/// character boundary so the result remains valid UTF-8.
fn truncate_in_place(field: &mut String, limit: usize) {
    if field.len() <= limit {
        return;
    }
    let mut keep = limit.saturating_sub(TRUNCATION_MARKER.len());
    while keep > 0 && !field.is_char_boundary(keep) {
        keep -= 1;
    }
    field.truncate(keep);
    field.push_str(TRUNCATION_MARKER);
}
