// crates/promstore-core/src/core/labels.rs
// ============================================================================
// Module: Promstore Labels
// Description: Raw labels and canonical series keys.
// Purpose: Turn client label lists into deterministic, comparable series identities.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A series is identified by its canonical label set: unique label names,
//! sorted deterministically, with the metric name label removed (the metric
//! is carried separately) and empty-valued labels dropped. The canonical JSON
//! form is what stores persist and compare.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::MetricName;
use crate::core::validation::MAX_LABEL_VALUE_BYTES;
use crate::core::validation::MAX_LABELS_PER_SERIES;
use crate::core::validation::ValidationError;
use crate::core::validation::truncate_for_message;
use crate::core::validation::validate_label_name;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Reserved label carrying the metric name.
pub const METRIC_NAME_LABEL: &str = "__name__";

// ============================================================================
// SECTION: Labels
// ============================================================================

/// Raw label pair as received on the write path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// Label name.
    pub name: String,
    /// Label value.
    pub value: String,
}

impl Label {
    /// Creates a label pair.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

// ============================================================================
// SECTION: Series Keys
// ============================================================================

/// Canonical label set identifying a series within a metric.
///
/// # Invariants
/// - Keys are unique, valid label names, sorted lexicographically.
/// - Never contains [`METRIC_NAME_LABEL`] or empty values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesKey {
    /// Sorted label map.
    labels: BTreeMap<String, String>,
}

impl SeriesKey {
    /// Splits a raw label list into its metric name and canonical series key.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when a label is malformed, duplicated, or
    /// the metric name label is missing.
    pub fn from_labels(labels: &[Label]) -> Result<(MetricName, Self), ValidationError> {
        if labels.len() > MAX_LABELS_PER_SERIES {
            return Err(ValidationError::TooManyLabels {
                max: MAX_LABELS_PER_SERIES,
                actual: labels.len(),
            });
        }
        let mut map = BTreeMap::new();
        for label in labels {
            validate_label_name(&label.name)?;
            if label.value.len() > MAX_LABEL_VALUE_BYTES {
                return Err(ValidationError::LabelValueTooLong {
                    name: truncate_for_message(&label.name),
                    max: MAX_LABEL_VALUE_BYTES,
                });
            }
            match map.entry(label.name.clone()) {
                Entry::Occupied(_) => {
                    return Err(ValidationError::DuplicateLabel(truncate_for_message(&label.name)));
                }
                Entry::Vacant(slot) => {
                    slot.insert(label.value.clone());
                }
            }
        }
        let name = match map.remove(METRIC_NAME_LABEL) {
            Some(name) if !name.is_empty() => MetricName::new(name)?,
            _ => return Err(ValidationError::MissingMetricName),
        };
        map.retain(|_, value| !value.is_empty());
        Ok((name, Self { labels: map }))
    }

    /// Builds a series key from trusted pairs, dropping empty values.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when a label name is malformed or reserved.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut labels = BTreeMap::new();
        for (name, value) in pairs {
            let name = name.into();
            validate_label_name(&name)?;
            if name == METRIC_NAME_LABEL {
                return Err(ValidationError::InvalidLabelName(name));
            }
            let value = value.into();
            if !value.is_empty() {
                labels.insert(name, value);
            }
        }
        Ok(Self { labels })
    }

    /// Returns the canonical JSON encoding used by stores.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] when serialization fails.
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.labels)
    }

    /// Parses a canonical JSON encoding read back from a store.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] when the payload is not a string map.
    pub fn from_canonical_json(payload: &str) -> Result<Self, serde_json::Error> {
        let labels: BTreeMap<String, String> = serde_json::from_str(payload)?;
        Ok(Self { labels })
    }

    /// Returns the value for a label name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }

    /// Iterates labels in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Returns the number of labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns true when the key carries no labels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
