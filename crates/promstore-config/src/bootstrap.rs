// crates/promstore-config/src/bootstrap.rs
// ============================================================================
// Module: Adapter Bootstrap
// Description: Opens the configured backing store and wires the adapter.
// Purpose: Turn a validated configuration into a running adapter.
// Dependencies: promstore-core, promstore-store-postgres, promstore-store-sqlite
// ============================================================================

//! ## Overview
//! [`open_adapter`] selects the backend named in `[store]`, then wires the
//! adapter with facade metrics, tracing cache logs, and the system clock.
//! The result is not started; callers invoke [`PromstoreAdapter::start`]
//! once they are ready to campaign for leadership.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use promstore_core::Adapter;
use promstore_core::AdapterError;
use promstore_core::BackingStore;
use promstore_core::FacadeMetrics;
use promstore_core::InMemoryStore;
use promstore_core::IngestFailure;
use promstore_core::IngestReport;
use promstore_core::LeaderState;
use promstore_core::Leadership;
use promstore_core::MetricName;
use promstore_core::ProvisionError;
use promstore_core::QueryError;
use promstore_core::RequestContext;
use promstore_core::ResolvedMetric;
use promstore_core::SeriesSamples;
use promstore_core::StoreError;
use promstore_core::SystemClock;
use promstore_core::TimeRange;
use promstore_core::TracingCacheLogger;
use promstore_core::WriteRequest;
use promstore_store_postgres::PostgresStore;
use promstore_store_sqlite::SqliteStore;
use thiserror::Error;
use tokio::sync::watch;

use crate::config::ConfigError;
use crate::config::PromstoreConfig;
use crate::config::StoreType;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Bootstrap failures.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The backing store could not be opened.
    #[error("store open failed: {0}")]
    Store(#[from] StoreError),
    /// The adapter could not be wired.
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

// ============================================================================
// SECTION: Adapter
// ============================================================================

/// Adapter over whichever backend the configuration selected.
pub enum PromstoreAdapter {
    /// Process-local store.
    Memory(Adapter<InMemoryStore>),
    /// `SQLite` store.
    Sqlite(Adapter<SqliteStore>),
    /// Postgres store.
    Postgres(Adapter<PostgresStore>),
}

impl PromstoreAdapter {
    /// Returns the backend name.
    #[must_use]
    pub const fn backend(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Sqlite(_) => "sqlite",
            Self::Postgres(_) => "postgres",
        }
    }

    /// Warms the cache and starts the leader loop.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] when warm-up or the loop fails.
    pub fn start(&self) -> Result<usize, AdapterError> {
        match self {
            Self::Memory(adapter) => adapter.start(),
            Self::Sqlite(adapter) => adapter.start(),
            Self::Postgres(adapter) => adapter.start(),
        }
    }

    /// Stops the leader loop and releases the lease.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] when the loop cannot be stopped.
    pub fn shutdown(&self) -> Result<(), AdapterError> {
        match self {
            Self::Memory(adapter) => adapter.shutdown(),
            Self::Sqlite(adapter) => adapter.shutdown(),
            Self::Postgres(adapter) => adapter.shutdown(),
        }
    }

    /// Ingests a write request.
    ///
    /// # Errors
    ///
    /// Returns [`IngestFailure`] carrying the partial report.
    pub fn ingest(
        &self,
        ctx: &RequestContext,
        request: WriteRequest,
    ) -> Result<IngestReport, IngestFailure> {
        match self {
            Self::Memory(adapter) => adapter.ingest(ctx, request),
            Self::Sqlite(adapter) => adapter.ingest(ctx, request),
            Self::Postgres(adapter) => adapter.ingest(ctx, request),
        }
    }

    /// Finalizes metric creation for every tentative catalog entry.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when finalization cannot run.
    pub fn complete_metric_creation(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<MetricName>, ProvisionError> {
        match self {
            Self::Memory(adapter) => adapter.complete_metric_creation(ctx),
            Self::Sqlite(adapter) => adapter.complete_metric_creation(ctx),
            Self::Postgres(adapter) => adapter.complete_metric_creation(ctx),
        }
    }

    /// Resolves a metric for reading without provisioning it.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when the catalog lookup or verification fails.
    pub fn resolve_for_read(&self, name: &MetricName) -> Result<Option<ResolvedMetric>, QueryError> {
        match self {
            Self::Memory(adapter) => adapter.resolve_for_read(name),
            Self::Sqlite(adapter) => adapter.resolve_for_read(name),
            Self::Postgres(adapter) => adapter.resolve_for_read(name),
        }
    }

    /// Reads a metric's samples inside `range`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when resolution or the read fails.
    pub fn read_series(
        &self,
        ctx: &RequestContext,
        name: &MetricName,
        range: TimeRange,
    ) -> Result<Vec<SeriesSamples>, QueryError> {
        match self {
            Self::Memory(adapter) => adapter.read_series(ctx, name, range),
            Self::Sqlite(adapter) => adapter.read_series(ctx, name, range),
            Self::Postgres(adapter) => adapter.read_series(ctx, name, range),
        }
    }

    /// Subscribes to leadership transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Leadership> {
        match self {
            Self::Memory(adapter) => adapter.subscribe(),
            Self::Sqlite(adapter) => adapter.subscribe(),
            Self::Postgres(adapter) => adapter.subscribe(),
        }
    }

    /// Returns whether this instance currently leads.
    #[must_use]
    pub fn is_leading(&self) -> bool {
        match self {
            Self::Memory(adapter) => adapter.is_leading(),
            Self::Sqlite(adapter) => adapter.is_leading(),
            Self::Postgres(adapter) => adapter.is_leading(),
        }
    }

    /// Returns the arbiter's state.
    #[must_use]
    pub fn leader_state(&self) -> LeaderState {
        match self {
            Self::Memory(adapter) => adapter.leader_state(),
            Self::Sqlite(adapter) => adapter.leader_state(),
            Self::Postgres(adapter) => adapter.leader_state(),
        }
    }
}

// ============================================================================
// SECTION: Bootstrap
// ============================================================================

/// Opens the configured store and builds an adapter over it.
///
/// # Errors
///
/// Returns [`BootstrapError`] when the configuration is invalid, the store
/// cannot be opened, or the adapter cannot be wired.
pub fn open_adapter(config: &PromstoreConfig) -> Result<PromstoreAdapter, BootstrapError> {
    config.validate()?;
    let adapter = match config.store.store_type {
        StoreType::Memory => PromstoreAdapter::Memory(wire(InMemoryStore::new(), config)?),
        StoreType::Sqlite => {
            let store = SqliteStore::open(config.store.sqlite()?).map_err(StoreError::from)?;
            PromstoreAdapter::Sqlite(wire(store, config)?)
        }
        StoreType::Postgres => {
            let store = PostgresStore::new(config.store.postgres()?).map_err(StoreError::from)?;
            PromstoreAdapter::Postgres(wire(store, config)?)
        }
    };
    tracing::info!(backend = adapter.backend(), "adapter wired");
    Ok(adapter)
}

/// Wires the adapter over an opened store.
fn wire<S>(store: S, config: &PromstoreConfig) -> Result<Adapter<S>, AdapterError>
where
    S: BackingStore + 'static,
{
    Adapter::new(
        Arc::new(store),
        config.adapter_config(),
        Arc::new(FacadeMetrics),
        Arc::new(TracingCacheLogger),
        Arc::new(SystemClock),
    )
}
