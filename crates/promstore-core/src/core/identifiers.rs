// crates/promstore-core/src/core/identifiers.rs
// ============================================================================
// Module: Promstore Identifiers
// Description: Metric names, relation names, series ids, and fencing tokens.
// Purpose: Provide strongly typed identifiers with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Metric names are opaque, case-sensitive, and untrusted. Relation names are
//! the trusted storage addresses the catalog maps them onto. Series
//! identifiers are non-zero, 1-based, and never reused within a metric.
//! Fencing tokens increase monotonically with every leadership term.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU64;

use serde::Deserialize;
use serde::Serialize;

use crate::core::validation::MAX_METRIC_NAME_BYTES;
use crate::core::validation::ValidationError;

// ============================================================================
// SECTION: Namespaces
// ============================================================================

/// Namespace holding per-metric sample relations.
pub const DATA_NAMESPACE: &str = "prom_data";
/// Namespace holding per-metric series relations.
pub const SERIES_NAMESPACE: &str = "prom_data_series";
/// Namespace holding catalog, lock, and lease tables.
pub const CATALOG_NAMESPACE: &str = "_prom_catalog";

// ============================================================================
// SECTION: Metric Names
// ============================================================================

/// Client-supplied metric name.
///
/// # Invariants
/// - Non-empty and at most [`MAX_METRIC_NAME_BYTES`] bytes.
/// - Case-sensitive; never used directly as a storage identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MetricName(String);

impl MetricName {
    /// Creates a metric name after enforcing length bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the name is empty or too long.
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::EmptyMetricName);
        }
        if name.len() > MAX_METRIC_NAME_BYTES {
            return Err(ValidationError::MetricNameTooLong {
                max: MAX_METRIC_NAME_BYTES,
                actual: name.len(),
            });
        }
        Ok(Self(name))
    }

    /// Returns the metric name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MetricName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MetricName> for String {
    fn from(value: MetricName) -> Self {
        value.0
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SECTION: Relation Names
// ============================================================================

/// Fully resolved storage relation (`namespace.identifier`).
///
/// # Invariants
/// - `identifier` is produced by the sanitizer or read from the catalog.
/// - Equality is exact; backends apply their own case rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationName {
    /// Owning namespace (schema).
    pub namespace: String,
    /// Relation identifier inside the namespace.
    pub identifier: String,
}

impl RelationName {
    /// Creates a relation name from raw parts.
    #[must_use]
    pub fn new(namespace: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            identifier: identifier.into(),
        }
    }

    /// Creates a relation in the data namespace.
    #[must_use]
    pub fn data(identifier: impl Into<String>) -> Self {
        Self::new(DATA_NAMESPACE, identifier)
    }

    /// Creates a relation in the series namespace.
    #[must_use]
    pub fn series(identifier: impl Into<String>) -> Self {
        Self::new(SERIES_NAMESPACE, identifier)
    }

    /// Returns the unquoted `namespace.identifier` form.
    #[must_use]
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.namespace, self.identifier)
    }
}

impl fmt::Display for RelationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.identifier)
    }
}

// ============================================================================
// SECTION: Series Identifiers
// ============================================================================

/// Series identifier scoped to a single metric.
///
/// # Invariants
/// - Always >= 1 (non-zero, 1-based).
/// - Stable for the lifetime of the (metric, label set) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesId(NonZeroU64);

impl SeriesId {
    /// Creates a new series identifier from a non-zero value.
    #[must_use]
    pub const fn new(id: NonZeroU64) -> Self {
        Self(id)
    }

    /// Creates a series identifier from a raw value (returns `None` if zero).
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Creates a series identifier from a signed store value.
    #[must_use]
    pub fn from_i64(raw: i64) -> Option<Self> {
        u64::try_from(raw).ok().and_then(Self::from_raw)
    }

    /// Returns the raw identifier value (always >= 1).
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }

    /// Returns the identifier as a signed store value.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        i64::try_from(self.0.get()).unwrap_or(i64::MAX)
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.get(), f)
    }
}

// ============================================================================
// SECTION: Fencing Tokens
// ============================================================================

/// Monotonic leadership term marker.
///
/// # Invariants
/// - Strictly increases whenever a new leadership term begins.
/// - Stores reject schema mutations presenting a token other than the
///   current term's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FencingToken(u64);

impl FencingToken {
    /// Creates a fencing token from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Creates a fencing token from a signed store value (negative clamps to 0).
    #[must_use]
    pub fn from_i64(value: i64) -> Self {
        Self(u64::try_from(value).unwrap_or(0))
    }

    /// Returns the raw token value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the token as a signed store value.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        i64::try_from(self.0).unwrap_or(i64::MAX)
    }

    /// Returns the token for the following term.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for FencingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
