// crates/promstore-core/src/runtime/adapter.rs
// ============================================================================
// Module: Promstore Adapter
// Description: Composition root wiring the catalog and ingestion engine.
// Purpose: Build one shared cache, arbiter, provisioner, ingestor, and resolver.
// Dependencies: crate::{core, interfaces, runtime, telemetry}, thiserror, tokio
// ============================================================================

//! ## Overview
//! [`Adapter`] owns one instance of every engine component over a single
//! backing store. The write path and the read path share the catalog cache,
//! so a metric resolved by either is visible to both.
//!
//! Lifecycle: [`Adapter::start`] warms the cache from the durable catalog and
//! starts the leader loop; [`Adapter::shutdown`] stops the loop and releases
//! the lease.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use thiserror::Error;
use tokio::sync::watch;

use crate::core::Clock;
use crate::core::Leadership;
use crate::core::MetadataEntry;
use crate::core::MetricName;
use crate::core::RelationName;
use crate::core::RequestContext;
use crate::core::SeriesSamples;
use crate::core::TimeRange;
use crate::core::WriteRequest;
use crate::interfaces::BackingStore;
use crate::interfaces::StoreError;
use crate::runtime::cache::CacheStats;
use crate::runtime::cache::CatalogCache;
use crate::runtime::cache::CatalogCacheConfig;
use crate::runtime::ingest::IngestConfig;
use crate::runtime::ingest::IngestFailure;
use crate::runtime::ingest::IngestReport;
use crate::runtime::ingest::Ingestor;
use crate::runtime::leader::ArbiterHandle;
use crate::runtime::leader::LeaderArbiter;
use crate::runtime::leader::LeaderConfig;
use crate::runtime::leader::LeaderError;
use crate::runtime::leader::LeaderState;
use crate::runtime::permission::PermissionError;
use crate::runtime::permission::PermissionVerifier;
use crate::runtime::provision::ProvisionError;
use crate::runtime::provision::Provisioner;
use crate::runtime::provision::ProvisionerConfig;
use crate::runtime::query::QueryError;
use crate::runtime::query::QueryResolver;
use crate::runtime::query::ResolvedMetric;
use crate::telemetry::AdapterMetrics;
use crate::telemetry::CacheLogger;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Catalog cache bounds.
    pub cache: CatalogCacheConfig,
    /// Provisioning lock behavior.
    pub provisioner: ProvisionerConfig,
    /// Ingest retry and timeout behavior.
    pub ingest: IngestConfig,
    /// Leader election settings.
    pub leader: LeaderConfig,
}

/// Adapter lifecycle errors.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Leader configuration or loop failure.
    #[error(transparent)]
    Leader(#[from] LeaderError),
    /// Catalog warm-up failed.
    #[error("catalog warm-up failed: {0}")]
    Warmup(#[from] StoreError),
    /// Adapter state could not be updated.
    #[error("adapter state error: {0}")]
    State(String),
}

// ============================================================================
// SECTION: Adapter
// ============================================================================

/// Catalog and ingestion engine over one backing store.
pub struct Adapter<S> {
    /// Backing store.
    store: Arc<S>,
    /// Shared catalog cache.
    cache: Arc<CatalogCache>,
    /// Leader arbiter.
    arbiter: Arc<LeaderArbiter<S>>,
    /// Permission verifier.
    verifier: PermissionVerifier<S>,
    /// Write path.
    ingestor: Ingestor<S>,
    /// Read path.
    resolver: QueryResolver<S>,
    /// Running leader loop, if started.
    handle: Mutex<Option<ArbiterHandle>>,
}

impl<S> Adapter<S>
where
    S: BackingStore + 'static,
{
    /// Wires every component over `store`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Leader`] when the leader configuration is invalid.
    pub fn new(
        store: Arc<S>,
        config: AdapterConfig,
        metrics: Arc<dyn AdapterMetrics>,
        cache_logger: Arc<dyn CacheLogger>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AdapterError> {
        let cache = Arc::new(CatalogCache::new(config.cache, cache_logger));
        let arbiter = Arc::new(LeaderArbiter::new(
            Arc::clone(&store),
            config.leader,
            Arc::clone(&clock),
            Arc::clone(&metrics),
        )?);
        let provisioner = Arc::new(Provisioner::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&arbiter),
            clock,
            config.provisioner,
        ));
        let ingestor =
            Ingestor::new(Arc::clone(&store), provisioner, Arc::clone(&metrics), config.ingest);
        let resolver = QueryResolver::new(Arc::clone(&store), Arc::clone(&cache), metrics);
        Ok(Self {
            verifier: PermissionVerifier::new(Arc::clone(&store)),
            store,
            cache,
            arbiter,
            ingestor,
            resolver,
            handle: Mutex::new(None),
        })
    }

    /// Warms the cache from the durable catalog and starts the leader loop.
    ///
    /// Entries that fail permission verification are skipped and logged;
    /// they are re-verified when first resolved. Calling `start` twice is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] when the catalog cannot be loaded or the loop
    /// cannot start.
    pub fn start(&self) -> Result<usize, AdapterError> {
        let mut handle = self.lock_handle()?;
        if handle.is_some() {
            return Ok(0);
        }
        let entries = self.store.load_catalog()?;
        let verified: Vec<_> = entries
            .into_iter()
            .filter(|entry| match self.verifier.verify_entry(entry) {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(
                        metric = %entry.metric_name,
                        error = %err,
                        "skipping catalog entry during warm-up"
                    );
                    false
                }
            })
            .collect();
        let warmed = self.cache.warm(verified);
        *handle = Some(self.arbiter.start()?);
        tracing::info!(
            warmed,
            group = %self.arbiter.config().group_id,
            holder = %self.arbiter.config().holder_id,
            "adapter started"
        );
        Ok(warmed)
    }

    /// Stops the leader loop and releases the lease.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] when the loop cannot be joined or the lease
    /// cannot be released.
    pub fn shutdown(&self) -> Result<(), AdapterError> {
        let handle = self.lock_handle()?.take();
        match handle {
            Some(handle) => handle.shutdown()?,
            None => self.arbiter.stop()?,
        }
        tracing::info!("adapter stopped");
        Ok(())
    }

    /// Ingests a write request.
    ///
    /// # Errors
    ///
    /// Returns [`IngestFailure`] carrying the exact partial report.
    pub fn ingest(
        &self,
        ctx: &RequestContext,
        request: WriteRequest,
    ) -> Result<IngestReport, IngestFailure> {
        self.ingestor.ingest(ctx, request)
    }

    /// Finalizes creation of every tentative metric.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when this instance is not leading or the
    /// store rejects finalization.
    pub fn complete_metric_creation(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<MetricName>, ProvisionError> {
        self.ingestor.complete_metric_creation(ctx)
    }

    /// Verifies that the adapter may write to a relation.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError`] when the relation is unmanaged or denied.
    pub fn check_permission(&self, relation: &RelationName) -> Result<(), PermissionError> {
        self.verifier.verify(relation)
    }

    /// Resolves a metric for the query collaborator without provisioning.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when resolution fails.
    pub fn resolve_for_read(&self, name: &MetricName) -> Result<Option<ResolvedMetric>, QueryError> {
        self.resolver.resolve_for_read(name)
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
        self.resolver.read_series(ctx, name, range)
    }

    /// Loads stored metadata for a metric.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Store`] when metadata cannot be read.
    pub fn metadata(&self, name: &MetricName) -> Result<Option<MetadataEntry>, QueryError> {
        self.resolver.metadata(name)
    }

    /// Records a read request rejected before resolution.
    pub fn record_invalid_read(&self) {
        self.resolver.record_invalid_request();
    }

    /// Subscribes to leadership changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Leadership> {
        self.arbiter.subscribe()
    }

    /// Returns whether this instance currently leads.
    #[must_use]
    pub fn is_leading(&self) -> bool {
        self.arbiter.is_leading()
    }

    /// Returns the arbiter's state.
    #[must_use]
    pub fn leader_state(&self) -> LeaderState {
        self.arbiter.state()
    }

    /// Returns the shared leader arbiter.
    #[must_use]
    pub const fn arbiter(&self) -> &Arc<LeaderArbiter<S>> {
        &self.arbiter
    }

    /// Returns cache hit, miss, and size counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Locks the loop handle slot.
    fn lock_handle(&self) -> Result<MutexGuard<'_, Option<ArbiterHandle>>, AdapterError> {
        self.handle.lock().map_err(|_| AdapterError::State("adapter mutex poisoned".to_string()))
    }
}
