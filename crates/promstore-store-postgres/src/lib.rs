// crates/promstore-store-postgres/src/lib.rs
// ============================================================================
// Module: Promstore Postgres Store Library
// Description: PostgreSQL backend for the Promstore catalog-and-ingestion engine.
// Purpose: Expose the Postgres store, its configuration, and its errors.
// Dependencies: postgres, promstore-core, r2d2, r2d2_postgres
// ============================================================================

//! ## Overview
//! Production backing store. Data relations live in the `prom_data` schema,
//! series relations in `prom_data_series`, and catalog tables in
//! `_prom_catalog`. The driver is the synchronous `postgres` client pooled
//! through `r2d2_postgres`.
//!
//! ## Index
//! - Store: [`PostgresStore`]
//! - Configuration and errors: [`PostgresStoreConfig`], [`PostgresStoreError`]

// ============================================================================
// SECTION: Modules
// ============================================================================

mod config;
mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::PostgresStoreConfig;
pub use config::PostgresStoreError;
pub use store::PostgresStore;
