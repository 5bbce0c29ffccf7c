// crates/promstore-core/src/lib.rs
// ============================================================================
// Module: Promstore Core Library
// Description: Public API surface for the Promstore catalog-and-ingestion engine.
// Purpose: Expose core types, store interfaces, and runtime components.
// Dependencies: crate::{core, interfaces, runtime, telemetry}
// ============================================================================

//! ## Overview
//! Promstore core maps untrusted, client-supplied metric names onto
//! dynamically provisioned storage relations, verifies the executing
//! principal may write those relations, caches the resulting catalog, commits
//! sample batches transactionally, and arbitrates leadership so a single
//! instance performs schema mutations at a time. It is backend-agnostic and
//! reaches storage only through the traits in [`interfaces`].
//!
//! The write path is: [`runtime::Ingestor`] partitions a [`WriteRequest`] by
//! metric, resolves each group through [`runtime::CatalogCache`] and
//! [`runtime::Provisioner`], and commits one transaction per group. The read
//! path resolves names through [`runtime::QueryResolver`] and never
//! provisions.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;
pub mod telemetry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::BackingStore;
pub use interfaces::CatalogStore;
pub use interfaces::LeaseStore;
pub use interfaces::SampleStore;
pub use interfaces::StoreError;
pub use runtime::Adapter;
pub use runtime::AdapterConfig;
pub use runtime::AdapterError;
pub use runtime::ArbiterHandle;
pub use runtime::CatalogCache;
pub use runtime::CatalogCacheConfig;
pub use runtime::InMemoryStore;
pub use runtime::IngestConfig;
pub use runtime::IngestError;
pub use runtime::IngestFailure;
pub use runtime::IngestReport;
pub use runtime::Ingestor;
pub use runtime::LeaderArbiter;
pub use runtime::LeaderConfig;
pub use runtime::LeaderError;
pub use runtime::LeaderState;
pub use runtime::PermissionError;
pub use runtime::PermissionVerifier;
pub use runtime::ProvisionError;
pub use runtime::Provisioner;
pub use runtime::ProvisionerConfig;
pub use runtime::QueryError;
pub use runtime::QueryResolver;
pub use runtime::ResolvedMetric;
pub use runtime::RetryPolicy;
pub use telemetry::AdapterMetrics;
pub use telemetry::CacheLogger;
pub use telemetry::FacadeMetrics;
pub use telemetry::NoopMetrics;
pub use telemetry::TracingCacheLogger;
