// crates/promstore-store-sqlite/src/lib.rs
// ============================================================================
// Module: Promstore SQLite Store Library
// Description: SQLite backend for the Promstore catalog-and-ingestion engine.
// Purpose: Expose the SQLite store, its configuration, and its errors.
// Dependencies: promstore-core, r2d2, rusqlite
// ============================================================================

//! ## Overview
//! `SQLite` has no schemas, so a managed relation `ns.name` is the single
//! quoted table `"ns.name"`. Catalog, ownership, lock, lease, and metadata
//! tables live under the `_prom_catalog.` prefix in the same database file.
//! Connections come from an `r2d2` pool; exhausting the pool surfaces as a
//! retryable [`promstore_core::StoreError::Exhausted`].
//!
//! ## Index
//! - Store: [`SqliteStore`], [`SqliteStoreConfig`], [`SqliteStoreError`]
//! - Pragmas: [`SqliteJournalMode`], [`SqliteSyncMode`]

// ============================================================================
// SECTION: Modules
// ============================================================================

mod pool;
mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use pool::SqliteJournalMode;
pub use pool::SqliteSyncMode;
pub use store::DEFAULT_PRINCIPAL;
pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
