// crates/promstore-core/src/interfaces/mod.rs
// ============================================================================
// Module: Promstore Interfaces
// Description: Backend-agnostic traits for catalog, sample, and lease storage.
// Purpose: Define the seams every backing store implements.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! The runtime reaches durable state only through these traits. Stores own
//! identifier quoting, transactions, advisory locking, permission checks, and
//! fence validation. Every schema-mutating call takes a [`Fence`] and must
//! fail with [`StoreError::FenceRejected`] when the fence is stale.
//! Security posture: store contents and metric names are untrusted; stores
//! must never splice raw names into statements.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use thiserror::Error;

use crate::core::CatalogEntry;
use crate::core::Fence;
use crate::core::LeaderLease;
use crate::core::MetadataEntry;
use crate::core::MetricName;
use crate::core::RelationName;
use crate::core::Sample;
use crate::core::SeriesId;
use crate::core::SeriesKey;
use crate::core::TimeRange;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Backing store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("store io error: {0}")]
    Io(String),
    /// Store is busy or locked; the operation may succeed on retry.
    #[error("store busy: {0}")]
    Busy(String),
    /// Connection pool could not supply a connection in time.
    #[error("store connections exhausted: {message}")]
    Exhausted {
        /// Failure detail.
        message: String,
        /// Suggested retry delay (ms).
        retry_after_ms: u64,
    },
    /// Concurrent writer conflict (unique violation, serialization failure).
    #[error("store conflict: {0}")]
    Conflict(String),
    /// Fence no longer matches the current lease term.
    #[error("fence rejected: {0}")]
    FenceRejected(String),
    /// Advisory lock could not be taken within the wait budget.
    #[error("lock timeout: {0}")]
    LockTimeout(String),
    /// Referenced relation or row does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Input rejected by the store.
    #[error("invalid data: {0}")]
    Invalid(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// Store schema version is incompatible.
    #[error("store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store reported an error.
    #[error("store error: {0}")]
    Store(String),
}

impl StoreError {
    /// Returns true when retrying the operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Busy(_) | Self::Exhausted { .. } | Self::Conflict(_) | Self::LockTimeout(_)
        )
    }

    /// Returns true for connection pool exhaustion.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// Returns a stable label for the error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Busy(_) => "busy",
            Self::Exhausted { .. } => "exhausted",
            Self::Conflict(_) => "conflict",
            Self::FenceRejected(_) => "fence_rejected",
            Self::LockTimeout(_) => "lock_timeout",
            Self::NotFound(_) => "not_found",
            Self::Invalid(_) => "invalid",
            Self::Corrupt(_) => "corrupt",
            Self::VersionMismatch(_) => "version_mismatch",
            Self::Store(_) => "store",
        }
    }
}

// ============================================================================
// SECTION: Catalog Store
// ============================================================================

/// Durable catalog, series registry, provisioning lock, and permission boundary.
pub trait CatalogStore: Send + Sync {
    /// Loads every catalog entry for cold-start cache population.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the catalog cannot be read.
    fn load_catalog(&self) -> Result<Vec<CatalogEntry>, StoreError>;

    /// Loads the catalog entry for a metric.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the catalog cannot be read.
    fn get_metric(&self, name: &MetricName) -> Result<Option<CatalogEntry>, StoreError>;

    /// Returns the metric that already owns a relation identifier, if any.
    ///
    /// Backends apply their own identifier case rules when comparing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the catalog cannot be read.
    fn identifier_owner(&self, identifier: &str) -> Result<Option<MetricName>, StoreError>;

    /// Takes the cross-instance provisioning lock for `key`, waiting up to `wait`.
    ///
    /// Returns `false` when the lock is still held elsewhere after `wait`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lock state cannot be read or written.
    fn acquire_provision_lock(
        &self,
        key: &str,
        owner: &str,
        wait: Duration,
    ) -> Result<bool, StoreError>;

    /// Releases a provisioning lock held by `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lock cannot be released.
    fn release_provision_lock(&self, key: &str, owner: &str) -> Result<(), StoreError>;

    /// Creates the data and series relations when absent.
    ///
    /// Ownership is recorded only for relations this call created, so tables
    /// created out-of-band never pass [`CatalogStore::check_permission`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FenceRejected`] for stale fences and
    /// [`StoreError`] when creation fails.
    fn create_metric_relations(
        &self,
        fence: &Fence,
        data: &RelationName,
        series: &RelationName,
    ) -> Result<(), StoreError>;

    /// Returns whether the store principal may write `relation`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the privilege check itself fails.
    fn check_permission(&self, relation: &RelationName) -> Result<bool, StoreError>;

    /// Inserts a catalog entry or returns the entry already registered for the
    /// same metric name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FenceRejected`] for stale fences and
    /// [`StoreError::Conflict`] when a relation is owned by another metric.
    fn register_metric(&self, fence: &Fence, entry: &CatalogEntry)
    -> Result<CatalogEntry, StoreError>;

    /// Finalizes every incomplete catalog entry and returns their names.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FenceRejected`] for stale fences and
    /// [`StoreError`] when finalization fails.
    fn finalize_metrics(&self, fence: &Fence) -> Result<Vec<MetricName>, StoreError>;

    /// Looks up an existing series identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the series relation cannot be read.
    fn get_series(
        &self,
        entry: &CatalogEntry,
        key: &SeriesKey,
    ) -> Result<Option<SeriesId>, StoreError>;

    /// Returns the series identifier for `key`, inserting it when absent.
    ///
    /// Concurrent callers for the same key observe one identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FenceRejected`] for stale fences and
    /// [`StoreError`] when the insert fails.
    fn get_or_create_series(
        &self,
        fence: &Fence,
        entry: &CatalogEntry,
        key: &SeriesKey,
    ) -> Result<SeriesId, StoreError>;
}

// ============================================================================
// SECTION: Sample Store
// ============================================================================

/// Durable sample and metadata storage.
pub trait SampleStore: Send + Sync {
    /// Inserts samples into the entry's data relation in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the transaction fails; nothing is committed.
    fn insert_samples(&self, entry: &CatalogEntry, samples: &[Sample]) -> Result<u64, StoreError>;

    /// Upserts metadata entries keyed by metric name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the upsert fails.
    fn upsert_metadata(&self, entries: &[MetadataEntry]) -> Result<u64, StoreError>;

    /// Loads metadata for a metric.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the metadata cannot be read.
    fn get_metadata(&self, name: &MetricName) -> Result<Option<MetadataEntry>, StoreError>;

    /// Lists every series registered for the entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the series relation cannot be read.
    fn list_series(&self, entry: &CatalogEntry) -> Result<Vec<(SeriesId, SeriesKey)>, StoreError>;

    /// Reads samples in `range`, ordered by series then timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the data relation cannot be read.
    fn read_samples(&self, entry: &CatalogEntry, range: TimeRange)
    -> Result<Vec<Sample>, StoreError>;
}

// ============================================================================
// SECTION: Lease Store
// ============================================================================

/// Durable leader lease with compare-and-swap semantics.
pub trait LeaseStore: Send + Sync {
    /// Takes the lease when it is free, expired, or already held by `holder`.
    ///
    /// A new term (token + 1) begins unless `holder` still holds a live lease.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lease row cannot be read or written.
    fn try_acquire_lease(
        &self,
        group_id: &str,
        holder_id: &str,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Result<Option<LeaderLease>, StoreError>;

    /// Extends a live lease held under the same term.
    ///
    /// Returns `None` when the lease expired or moved to another term.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lease row cannot be read or written.
    fn renew_lease(
        &self,
        lease: &LeaderLease,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Result<Option<LeaderLease>, StoreError>;

    /// Releases a lease, keeping its token so terms stay monotonic.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lease row cannot be written.
    fn release_lease(&self, lease: &LeaderLease) -> Result<(), StoreError>;

    /// Reads the lease row for a group.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lease row cannot be read.
    fn current_lease(&self, group_id: &str) -> Result<Option<LeaderLease>, StoreError>;
}

// ============================================================================
// SECTION: Backing Store
// ============================================================================

/// Full backing store required by the adapter.
pub trait BackingStore: CatalogStore + SampleStore + LeaseStore {}

impl<T> BackingStore for T where T: CatalogStore + SampleStore + LeaseStore {}
