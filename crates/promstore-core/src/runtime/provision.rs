// crates/promstore-core/src/runtime/provision.rs
// ============================================================================
// Module: Promstore Metric/Series Provisioner
// Description: Creates and registers relations and series for unseen inputs.
// Purpose: Serialize first-write races across instances and keep the catalog authoritative.
// Dependencies: crate::{core, interfaces, runtime}, thiserror, tracing
// ============================================================================

//! ## Overview
//! Provisioning a metric runs, per identifier candidate:
//! sanitize, take the cross-instance lock for that identifier, re-check the
//! durable catalog (adopting an entry another instance registered), create
//! the relations, verify write permission on both, register the catalog
//! entry, release the lock. A candidate owned by a different metric moves
//! on to the next deterministic disambiguation attempt.
//!
//! Creation is two-phase: entries are registered as tentative and
//! [`Provisioner::complete_provisioning`] finalizes every incomplete entry
//! once per batch. Every schema mutation presents the arbiter's current
//! fence; a missing fence means this instance is not leading, and a store
//! rejection means the lease was lost mid-flight.
//!
//! Series resolve through the cache, then the store; only the leader inserts
//! new series, and the store guarantees concurrent inserters observe one id.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use thiserror::Error;

use crate::core::CatalogEntry;
use crate::core::Clock;
use crate::core::Fence;
use crate::core::Interrupted;
use crate::core::MetricName;
use crate::core::RelationName;
use crate::core::RequestContext;
use crate::core::SeriesId;
use crate::core::SeriesKey;
use crate::interfaces::CatalogStore;
use crate::interfaces::LeaseStore;
use crate::interfaces::StoreError;
use crate::runtime::cache::CatalogCache;
use crate::runtime::leader::LeaderArbiter;
use crate::runtime::permission::PermissionError;
use crate::runtime::permission::PermissionVerifier;
use crate::runtime::retry::Retryable;
use crate::runtime::sanitize;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Default wait per provisioning lock attempt.
const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(2);
/// Default provisioning lock attempts.
const DEFAULT_LOCK_ATTEMPTS: u32 = 3;

/// Provisioner configuration.
///
/// # Invariants
/// - `lock_attempts >= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionerConfig {
    /// Wait per lock attempt.
    pub lock_wait: Duration,
    /// Lock attempts before surfacing a timeout for the metric.
    pub lock_attempts: u32,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            lock_wait: DEFAULT_LOCK_WAIT,
            lock_attempts: DEFAULT_LOCK_ATTEMPTS,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Provisioning failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    /// This instance does not hold the lease and the input is unprovisioned.
    #[error("not leader; cannot provision {0}")]
    NotLeader(String),
    /// Lease lost while provisioning.
    #[error("leadership lost while provisioning {0}")]
    LeaseLost(String),
    /// Provisioning lock not obtained within the bounded attempts.
    #[error("provisioning lock timeout for {0}")]
    LockTimeout(String),
    /// Every disambiguation candidate is owned by another metric.
    #[error("no free relation identifier for {0}")]
    IdentifierExhausted(String),
    /// Permission verification failed.
    #[error(transparent)]
    Authorization(#[from] PermissionError),
    /// Store call failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Request stopped.
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl ProvisionError {
    /// Returns true when the caller may resubmit the affected samples later.
    #[must_use]
    pub const fn caller_may_retry(&self) -> bool {
        match self {
            Self::NotLeader(_)
            | Self::LeaseLost(_)
            | Self::LockTimeout(_)
            | Self::Interrupted(_) => true,
            Self::Store(err) => err.is_retryable(),
            Self::Authorization(err) => err.is_retryable(),
            Self::IdentifierExhausted(_) => false,
        }
    }
}

impl Retryable for ProvisionError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_retryable(),
            Self::Authorization(err) => err.is_retryable(),
            Self::NotLeader(_)
            | Self::LeaseLost(_)
            | Self::LockTimeout(_)
            | Self::IdentifierExhausted(_)
            | Self::Interrupted(_) => false,
        }
    }
}

/// Outcome of one identifier candidate.
enum Attempt {
    /// Entry registered or adopted.
    Registered(CatalogEntry),
    /// Candidate belongs to another metric.
    Collision,
}

// ============================================================================
// SECTION: Provisioner
// ============================================================================

/// Metric and series provisioner.
pub struct Provisioner<S> {
    /// Backing store.
    store: Arc<S>,
    /// Shared catalog cache.
    cache: Arc<CatalogCache>,
    /// Permission verifier.
    verifier: PermissionVerifier<S>,
    /// Leader arbiter supplying fences.
    arbiter: Arc<LeaderArbiter<S>>,
    /// Injected time source.
    clock: Arc<dyn Clock>,
    /// Provisioner configuration.
    config: ProvisionerConfig,
    /// Metrics registered but not yet finalized by this instance.
    pending: Mutex<BTreeSet<MetricName>>,
    /// Sequence making lock owners unique per attempt.
    lock_sequence: AtomicU64,
}

impl<S> Provisioner<S>
where
    S: CatalogStore + LeaseStore,
{
    /// Creates a provisioner.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        cache: Arc<CatalogCache>,
        arbiter: Arc<LeaderArbiter<S>>,
        clock: Arc<dyn Clock>,
        config: ProvisionerConfig,
    ) -> Self {
        Self {
            verifier: PermissionVerifier::new(Arc::clone(&store)),
            store,
            cache,
            arbiter,
            clock,
            config,
            pending: Mutex::new(BTreeSet::new()),
            lock_sequence: AtomicU64::new(0),
        }
    }

    /// Resolves a metric through the cache, the durable catalog, and, while
    /// leading, provisioning.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when the metric cannot be resolved or created.
    pub fn resolve_metric(
        &self,
        ctx: &RequestContext,
        name: &MetricName,
    ) -> Result<Arc<CatalogEntry>, ProvisionError> {
        match self.resolve_metric_shared(ctx, name) {
            // A concurrent caller ran the shared resolution under its own
            // context; this caller still has time left, so resolve again.
            Err(ProvisionError::Interrupted(reason)) if ctx.check().is_ok() => {
                tracing::debug!(
                    metric = %name,
                    reason = %reason,
                    "shared metric resolution interrupted; resolving again"
                );
                self.resolve_metric_shared(ctx, name)
            }
            outcome => outcome,
        }
    }

    /// Single-flight resolution; concurrent callers share one result.
    fn resolve_metric_shared(
        &self,
        ctx: &RequestContext,
        name: &MetricName,
    ) -> Result<Arc<CatalogEntry>, ProvisionError> {
        self.cache.get_or_resolve_metric(name, || {
            if let Some(entry) = self.store.get_metric(name)? {
                self.verifier.verify_entry(&entry)?;
                return Ok(entry);
            }
            self.provision_metric(ctx, name)
        })
    }

    /// Creates and registers relations for a metric, adopting any entry
    /// another instance registered first.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when not leading, the lock times out, the
    /// lease is lost, permission is denied, or the store fails.
    pub fn provision_metric(
        &self,
        ctx: &RequestContext,
        name: &MetricName,
    ) -> Result<CatalogEntry, ProvisionError> {
        if self.arbiter.current_fence().is_none() {
            return Err(ProvisionError::NotLeader(name.to_string()));
        }
        for attempt in 0 ..= sanitize::MAX_DISAMBIGUATION_ATTEMPTS {
            let identifier = sanitize::candidate(name, attempt);
            match self.provision_candidate(ctx, name, &identifier)? {
                Attempt::Registered(entry) => {
                    if !entry.creation_completed {
                        self.mark_pending(&entry.metric_name);
                    }
                    return Ok(entry);
                }
                Attempt::Collision => {
                    tracing::debug!(
                        metric = %name,
                        identifier = %identifier,
                        attempt,
                        "relation identifier taken; trying next candidate"
                    );
                }
            }
        }
        Err(ProvisionError::IdentifierExhausted(name.to_string()))
    }

    /// Resolves a series id through the cache and store, inserting it while
    /// leading.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when the series is new and this instance is
    /// not leading, the lease is lost, or the store fails.
    pub fn resolve_series(
        &self,
        entry: &CatalogEntry,
        key: &SeriesKey,
    ) -> Result<SeriesId, ProvisionError> {
        self.cache.get_or_resolve_series(&entry.metric_name, key, || {
            if let Some(id) = self.store.get_series(entry, key)? {
                return Ok(id);
            }
            self.provision_series(entry, key)
        })
    }

    /// Inserts a series when absent and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when not leading, the lease is lost, or the
    /// store fails.
    pub fn provision_series(
        &self,
        entry: &CatalogEntry,
        key: &SeriesKey,
    ) -> Result<SeriesId, ProvisionError> {
        let fence = self
            .arbiter
            .current_fence()
            .ok_or_else(|| ProvisionError::NotLeader(entry.metric_name.to_string()))?;
        self.store
            .get_or_create_series(&fence, entry, key)
            .map_err(|err| self.fenced_error(&fence, entry.metric_name.as_str(), err))
    }

    /// Finalizes every incomplete catalog entry.
    ///
    /// Idempotent: returns an empty list when nothing is pending locally and
    /// this instance is not leading.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when local entries are pending but this
    /// instance is not leading, the lease is lost, or the store fails.
    pub fn complete_provisioning(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<MetricName>, ProvisionError> {
        ctx.check()?;
        let Some(fence) = self.arbiter.current_fence() else {
            if self.has_pending() {
                return Err(ProvisionError::NotLeader("pending metric creation".to_string()));
            }
            return Ok(Vec::new());
        };
        let finalized = self
            .store
            .finalize_metrics(&fence)
            .map_err(|err| self.fenced_error(&fence, "metric finalization", err))?;
        if let Ok(mut pending) = self.pending.lock() {
            for name in &finalized {
                pending.remove(name);
            }
        }
        for name in &finalized {
            if let Some(cached) = self.cache.resolve_metric(name) {
                let mut entry = CatalogEntry::clone(&cached);
                entry.creation_completed = true;
                self.cache.insert(entry);
            }
        }
        if !finalized.is_empty() {
            tracing::info!(count = finalized.len(), "finalized metric creation");
        }
        Ok(finalized)
    }

    /// Returns true when this instance registered entries not yet finalized.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.lock().map_or(true, |pending| !pending.is_empty())
    }

    /// Returns the shared arbiter.
    #[must_use]
    pub const fn arbiter(&self) -> &Arc<LeaderArbiter<S>> {
        &self.arbiter
    }

    /// Runs one identifier candidate under its provisioning lock.
    fn provision_candidate(
        &self,
        ctx: &RequestContext,
        name: &MetricName,
        identifier: &str,
    ) -> Result<Attempt, ProvisionError> {
        let key = sanitize::lock_key(identifier);
        let owner = self.lock_owner();
        self.acquire_lock(ctx, &key, &owner)?;
        let outcome = self.provision_locked(name, identifier);
        if let Err(err) = self.store.release_provision_lock(&key, &owner) {
            tracing::warn!(lock = %key, error = %err, "provisioning lock release failed");
        }
        outcome
    }

    /// Body of the critical section: re-check, create, verify, register.
    fn provision_locked(
        &self,
        name: &MetricName,
        identifier: &str,
    ) -> Result<Attempt, ProvisionError> {
        if let Some(existing) = self.store.get_metric(name)? {
            self.verifier.verify_entry(&existing)?;
            tracing::debug!(metric = %name, "adopted metric registered concurrently");
            return Ok(Attempt::Registered(existing));
        }
        if let Some(owner) = self.store.identifier_owner(identifier)?
            && &owner != name
        {
            return Ok(Attempt::Collision);
        }
        let fence = self
            .arbiter
            .current_fence()
            .ok_or_else(|| ProvisionError::NotLeader(name.to_string()))?;
        let data = RelationName::data(identifier);
        let series = RelationName::series(identifier);
        self.store
            .create_metric_relations(&fence, &data, &series)
            .map_err(|err| self.fenced_error(&fence, name.as_str(), err))?;
        self.verifier.verify(&data)?;
        self.verifier.verify(&series)?;
        let tentative =
            CatalogEntry::tentative(name.clone(), data, series, self.clock.now_millis());
        let registered = self
            .store
            .register_metric(&fence, &tentative)
            .map_err(|err| self.fenced_error(&fence, name.as_str(), err))?;
        if registered != tentative {
            self.verifier.verify_entry(&registered)?;
        }
        tracing::info!(
            metric = %name,
            relation = %registered.data_relation,
            token = fence.token.get(),
            "provisioned metric"
        );
        Ok(Attempt::Registered(registered))
    }

    /// Takes the provisioning lock with bounded attempts.
    fn acquire_lock(
        &self,
        ctx: &RequestContext,
        key: &str,
        owner: &str,
    ) -> Result<(), ProvisionError> {
        let attempts = self.config.lock_attempts.max(1);
        for attempt in 1 ..= attempts {
            ctx.check()?;
            let wait = ctx.clamp(self.config.lock_wait);
            if self.store.acquire_provision_lock(key, owner, wait)? {
                return Ok(());
            }
            tracing::debug!(lock = %key, attempt, "provisioning lock busy");
        }
        Err(ProvisionError::LockTimeout(key.to_string()))
    }

    /// Maps store errors on fenced calls, stepping down on fence rejection.
    fn fenced_error(&self, fence: &Fence, subject: &str, err: StoreError) -> ProvisionError {
        if matches!(err, StoreError::FenceRejected(_)) {
            self.arbiter.fence_rejected(fence);
            return ProvisionError::LeaseLost(subject.to_string());
        }
        ProvisionError::Store(err)
    }

    /// Records a tentative metric awaiting finalization.
    fn mark_pending(&self, name: &MetricName) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(name.clone());
        }
    }

    /// Returns a lock owner unique to this instance and attempt.
    fn lock_owner(&self) -> String {
        let sequence = self.lock_sequence.fetch_add(1, Ordering::Relaxed);
        format!("{}#{sequence}", self.arbiter.config().holder_id)
    }
}
