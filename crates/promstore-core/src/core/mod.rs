// crates/promstore-core/src/core/mod.rs
// ============================================================================
// Module: Promstore Core Types
// Description: Canonical metric, series, catalog, and lease structures.
// Purpose: Provide stable, serializable types shared by every store backend.
// Dependencies: serde, sha2, thiserror, tokio-util
// ============================================================================

//! ## Overview
//! Promstore core types describe what arrives on the write path (raw
//! samples, labels, metadata), what the catalog persists (catalog entries,
//! relation names, series identifiers), and what leadership arbitration
//! exchanges with the store (leases and fences). These types are the
//! canonical source of truth for every backend.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod catalog;
pub mod context;
pub mod identifiers;
pub mod labels;
pub mod lease;
pub mod samples;
pub mod time;
pub mod validation;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use catalog::CatalogEntry;
pub use context::Interrupted;
pub use context::RequestContext;
pub use identifiers::CATALOG_NAMESPACE;
pub use identifiers::DATA_NAMESPACE;
pub use identifiers::FencingToken;
pub use identifiers::MetricName;
pub use identifiers::RelationName;
pub use identifiers::SERIES_NAMESPACE;
pub use identifiers::SeriesId;
pub use labels::Label;
pub use labels::METRIC_NAME_LABEL;
pub use labels::SeriesKey;
pub use lease::Fence;
pub use lease::LeaderLease;
pub use lease::Leadership;
pub use samples::MetadataEntry;
pub use samples::MetricType;
pub use samples::RawSample;
pub use samples::Sample;
pub use samples::SeriesSamples;
pub use samples::StoredSample;
pub use samples::TimeRange;
pub use samples::TimeSeries;
pub use samples::WriteRequest;
pub use time::Clock;
pub use time::ManualClock;
pub use time::SystemClock;
pub use validation::ValidationError;
