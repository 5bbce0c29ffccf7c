// crates/promstore-core/src/runtime/mod.rs
// ============================================================================
// Module: Promstore Runtime
// Description: Catalog, provisioning, ingestion, and leadership engine.
// Purpose: Compose the core types and store traits into the running adapter.
// Dependencies: crate::{core, interfaces, telemetry}
// ============================================================================

//! ## Overview
//! Runtime components are synchronous and thread-safe; one instance of each
//! is shared by every request. Store access goes through the traits in
//! [`crate::interfaces`], so the same engine runs over the in-memory store,
//! `SQLite`, or Postgres.

pub mod adapter;
pub mod cache;
pub mod ingest;
pub mod leader;
pub mod permission;
pub mod provision;
pub mod query;
pub mod retry;
pub mod sanitize;
pub mod store;

pub use adapter::Adapter;
pub use adapter::AdapterConfig;
pub use adapter::AdapterError;
pub use cache::CacheStats;
pub use cache::CatalogCache;
pub use cache::CatalogCacheConfig;
pub use ingest::FailureKind;
pub use ingest::IngestConfig;
pub use ingest::IngestError;
pub use ingest::IngestFailure;
pub use ingest::IngestReport;
pub use ingest::Ingestor;
pub use ingest::MetricFailure;
pub use leader::ArbiterHandle;
pub use leader::DEFAULT_GROUP_ID;
pub use leader::LeaderArbiter;
pub use leader::LeaderConfig;
pub use leader::LeaderError;
pub use leader::LeaderState;
pub use permission::PermissionError;
pub use permission::PermissionVerifier;
pub use provision::ProvisionError;
pub use provision::Provisioner;
pub use provision::ProvisionerConfig;
pub use query::QueryError;
pub use query::QueryResolver;
pub use query::ResolvedMetric;
pub use retry::RetryError;
pub use retry::RetryPolicy;
pub use retry::Retryable;
pub use store::InMemoryStore;
