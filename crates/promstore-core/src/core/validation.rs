// crates/promstore-core/src/core/validation.rs
// ============================================================================
// Module: Promstore Input Validation
// Description: Bounds and checks applied to untrusted write-path inputs.
// Purpose: Reject malformed names, labels, and timestamps before any store call.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every value on the write path is client supplied. This module holds the
//! hard limits and the error type used when an input falls outside them.
//! Validation failures are local: the offending sample or series is dropped
//! and counted, and sibling groups in the same request continue.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum metric name length in bytes.
pub const MAX_METRIC_NAME_BYTES: usize = 1024;
/// Maximum label name length in bytes.
pub const MAX_LABEL_NAME_BYTES: usize = 256;
/// Maximum label value length in bytes.
pub const MAX_LABEL_VALUE_BYTES: usize = 4096;
/// Maximum number of labels on a single series.
pub const MAX_LABELS_PER_SERIES: usize = 128;
/// Largest accepted sample timestamp (ms); the JavaScript safe integer bound.
pub const MAX_TIMESTAMP_MS: i64 = 9_007_199_254_740_991;
/// Smallest accepted sample timestamp (ms).
pub const MIN_TIMESTAMP_MS: i64 = -MAX_TIMESTAMP_MS;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Input validation errors.
///
/// # Invariants
/// - Messages never echo full label values or sample payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Metric name is empty.
    #[error("metric name is empty")]
    EmptyMetricName,
    /// Metric name exceeds the byte limit.
    #[error("metric name exceeds {max} bytes ({actual})")]
    MetricNameTooLong {
        /// Maximum permitted bytes.
        max: usize,
        /// Actual bytes supplied.
        actual: usize,
    },
    /// Series carries no metric name label.
    #[error("series has no __name__ label")]
    MissingMetricName,
    /// Label name is malformed.
    #[error("invalid label name: {0}")]
    InvalidLabelName(String),
    /// Label value exceeds the byte limit.
    #[error("label {name} value exceeds {max} bytes")]
    LabelValueTooLong {
        /// Label name.
        name: String,
        /// Maximum permitted bytes.
        max: usize,
    },
    /// Label name appears more than once.
    #[error("duplicate label name: {0}")]
    DuplicateLabel(String),
    /// Series carries too many labels.
    #[error("series has {actual} labels (max {max})")]
    TooManyLabels {
        /// Maximum permitted labels.
        max: usize,
        /// Actual label count.
        actual: usize,
    },
    /// Sample timestamp falls outside the accepted range.
    #[error("timestamp {0} out of range")]
    TimestampOutOfRange(i64),
    /// Time range bounds are inverted.
    #[error("invalid time range: start {start} after end {end}")]
    InvalidTimeRange {
        /// Range start (ms).
        start: i64,
        /// Range end (ms).
        end: i64,
    },
}

// ============================================================================
// SECTION: Checks
// ============================================================================

/// Validates a label name against `[a-zA-Z_][a-zA-Z0-9_]*`.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidLabelName`] when the name is empty, too
/// long, or contains a disallowed character.
pub fn validate_label_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name.len() > MAX_LABEL_NAME_BYTES {
        return Err(ValidationError::InvalidLabelName(truncate_for_message(name)));
    }
    let mut chars = name.chars();
    let valid_first = chars.next().is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_');
    if !valid_first || !chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return Err(ValidationError::InvalidLabelName(truncate_for_message(name)));
    }
    Ok(())
}

/// Validates a sample timestamp against the accepted range.
///
/// # Errors
///
/// Returns [`ValidationError::TimestampOutOfRange`] when out of bounds.
pub const fn validate_timestamp(timestamp_ms: i64) -> Result<(), ValidationError> {
    if timestamp_ms < MIN_TIMESTAMP_MS || timestamp_ms > MAX_TIMESTAMP_MS {
        return Err(ValidationError::TimestampOutOfRange(timestamp_ms));
    }
    Ok(())
}

/// Shortens untrusted text embedded in error messages.
pub(crate) fn truncate_for_message(value: &str) -> String {
    /// Maximum characters echoed back in an error.
    const MAX_ECHO_CHARS: usize = 64;
    value.chars().take(MAX_ECHO_CHARS).collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::MAX_TIMESTAMP_MS;
    use super::MIN_TIMESTAMP_MS;
    use super::validate_label_name;
    use super::validate_timestamp;

    #[test]
    fn label_names_follow_prometheus_charset() {
        assert!(validate_label_name("job").is_ok());
        assert!(validate_label_name("_private").is_ok());
        assert!(validate_label_name("le_2").is_ok());
        assert!(validate_label_name("").is_err());
        assert!(validate_label_name("2xx").is_err());
        assert!(validate_label_name("foo-bar").is_err());
        assert!(validate_label_name("café").is_err());
    }

    #[test]
    fn timestamps_are_bounded() {
        assert!(validate_timestamp(0).is_ok());
        assert!(validate_timestamp(MAX_TIMESTAMP_MS).is_ok());
        assert!(validate_timestamp(MIN_TIMESTAMP_MS).is_ok());
        assert!(validate_timestamp(i64::MAX).is_err());
        assert!(validate_timestamp(i64::MIN).is_err());
    }
}
