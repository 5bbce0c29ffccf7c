// crates/promstore-core/src/core/catalog.rs
// ============================================================================
// Module: Promstore Catalog Entries
// Description: Durable metric-to-relation mapping records.
// Purpose: Define the catalog row that is the sole authority for name resolution.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`CatalogEntry`] binds one metric name to exactly one data relation and
//! one series relation. Entries are created once by the leader, persisted
//! durably, and never deleted by the core.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::MetricName;
use crate::core::identifiers::RelationName;

// ============================================================================
// SECTION: Catalog Entry
// ============================================================================

/// Durable catalog row for a metric.
///
/// # Invariants
/// - Exactly one entry exists per metric name.
/// - No two entries share a data or series relation.
/// - `creation_completed` flips to true once finalization indexed the relations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Client-visible metric name.
    pub metric_name: MetricName,
    /// Relation holding samples.
    pub data_relation: RelationName,
    /// Relation holding series label sets.
    pub series_relation: RelationName,
    /// Creation timestamp (unix ms).
    pub created_at_ms: i64,
    /// Whether two-phase creation has been finalized.
    pub creation_completed: bool,
}

impl CatalogEntry {
    /// Creates a tentative (not yet finalized) entry.
    #[must_use]
    pub const fn tentative(
        metric_name: MetricName,
        data_relation: RelationName,
        series_relation: RelationName,
        created_at_ms: i64,
    ) -> Self {
        Self {
            metric_name,
            data_relation,
            series_relation,
            created_at_ms,
            creation_completed: false,
        }
    }

    /// Returns the namespace of the data relation.
    #[must_use]
    pub fn schema_namespace(&self) -> &str {
        &self.data_relation.namespace
    }
}
