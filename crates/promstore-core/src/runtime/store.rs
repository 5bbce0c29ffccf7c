// crates/promstore-core/src/runtime/store.rs
// ============================================================================
// Module: Promstore In-Memory Store
// Description: In-memory backing store for tests and local demos.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! [`InMemoryStore`] implements every store trait with the same observable
//! semantics as the durable backends: fenced schema mutations, adopt-on-
//! conflict registration, insert-if-absent series, lease compare-and-swap,
//! and per-relation ownership for permission checks. It also exposes a few
//! hooks (out-of-band relations, revoked privileges, injected failures) so
//! runtime behavior can be exercised without a database. It is not intended
//! for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;
use std::time::Instant;

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
use crate::interfaces::CatalogStore;
use crate::interfaces::LeaseStore;
use crate::interfaces::SampleStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: State
// ============================================================================

/// Relation bookkeeping.
#[derive(Debug, Clone, Copy)]
struct RelationState {
    /// Whether the adapter created (and therefore owns) the relation.
    managed: bool,
}

/// Series registry for one metric.
#[derive(Debug, Default)]
struct SeriesTable {
    /// Last assigned id.
    last_id: u64,
    /// Canonical key to id.
    by_key: BTreeMap<SeriesKey, SeriesId>,
}

/// Mutable store state.
#[derive(Debug, Default)]
struct MemoryState {
    /// Catalog rows by metric name.
    catalog: BTreeMap<MetricName, CatalogEntry>,
    /// Existing relations.
    relations: BTreeMap<RelationName, RelationState>,
    /// Relations whose privilege has been revoked.
    revoked: BTreeSet<RelationName>,
    /// Series registries keyed by series relation.
    series: BTreeMap<RelationName, SeriesTable>,
    /// Sample rows keyed by data relation.
    samples: BTreeMap<RelationName, Vec<Sample>>,
    /// Metadata by metric name.
    metadata: BTreeMap<MetricName, MetadataEntry>,
    /// Lease rows by group.
    leases: BTreeMap<String, LeaderLease>,
    /// Failures returned by upcoming sample inserts.
    insert_failures: VecDeque<StoreError>,
    /// Relation creations performed.
    relations_created: u64,
}

/// Provisioning lock table.
#[derive(Debug, Default)]
struct LockTable {
    /// Lock key to owner.
    held: Mutex<BTreeMap<String, String>>,
    /// Signalled on release.
    released: Condvar,
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory backing store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    /// Store state protected by a mutex.
    state: Arc<Mutex<MemoryState>>,
    /// Provisioning locks.
    locks: Arc<LockTable>,
}

impl InMemoryStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a relation outside the adapter, as an operator might by hand.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the state mutex is poisoned.
    pub fn create_unmanaged_relation(&self, relation: &RelationName) -> Result<(), StoreError> {
        let mut state = self.lock_state()?;
        state.relations.entry(relation.clone()).or_insert(RelationState {
            managed: false,
        });
        Ok(())
    }

    /// Revokes the store principal's privilege on a relation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the state mutex is poisoned.
    pub fn revoke_permission(&self, relation: &RelationName) -> Result<(), StoreError> {
        self.lock_state()?.revoked.insert(relation.clone());
        Ok(())
    }

    /// Queues errors returned by the next sample inserts, in order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the state mutex is poisoned.
    pub fn inject_insert_failures(&self, failures: Vec<StoreError>) -> Result<(), StoreError> {
        self.lock_state()?.insert_failures.extend(failures);
        Ok(())
    }

    /// Returns how many relations the adapter has created.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the state mutex is poisoned.
    pub fn relations_created(&self) -> Result<u64, StoreError> {
        Ok(self.lock_state()?.relations_created)
    }

    /// Returns the number of stored samples in a data relation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the state mutex is poisoned.
    pub fn sample_count(&self, relation: &RelationName) -> Result<usize, StoreError> {
        Ok(self.lock_state()?.samples.get(relation).map_or(0, Vec::len))
    }

    /// Locks the state, mapping poisoning to a store error.
    fn lock_state(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Store("in-memory store mutex poisoned".to_string()))
    }
}

/// Rejects fences that do not match the current lease term.
fn check_fence(state: &MemoryState, fence: &Fence) -> Result<(), StoreError> {
    let current = state.leases.get(&fence.group_id);
    let valid = current
        .is_some_and(|lease| lease.holder_id == fence.holder_id && lease.fencing_token == fence.token);
    if valid {
        Ok(())
    } else {
        Err(StoreError::FenceRejected(format!(
            "token {} for group {} is not current",
            fence.token, fence.group_id
        )))
    }
}

impl CatalogStore for InMemoryStore {
    fn load_catalog(&self) -> Result<Vec<CatalogEntry>, StoreError> {
        Ok(self.lock_state()?.catalog.values().cloned().collect())
    }

    fn get_metric(&self, name: &MetricName) -> Result<Option<CatalogEntry>, StoreError> {
        Ok(self.lock_state()?.catalog.get(name).cloned())
    }

    fn identifier_owner(&self, identifier: &str) -> Result<Option<MetricName>, StoreError> {
        let state = self.lock_state()?;
        Ok(state
            .catalog
            .values()
            .find(|entry| entry.data_relation.identifier == identifier)
            .map(|entry| entry.metric_name.clone()))
    }

    fn acquire_provision_lock(
        &self,
        key: &str,
        owner: &str,
        wait: Duration,
    ) -> Result<bool, StoreError> {
        let deadline = Instant::now().checked_add(wait);
        let mut held = self
            .locks
            .held
            .lock()
            .map_err(|_| StoreError::Store("lock table mutex poisoned".to_string()))?;
        loop {
            match held.get(key) {
                None => {
                    held.insert(key.to_string(), owner.to_string());
                    return Ok(true);
                }
                Some(current) if current == owner => return Ok(true),
                Some(_) => {}
            }
            let remaining = deadline.map_or(wait, |deadline| {
                deadline.saturating_duration_since(Instant::now())
            });
            if remaining.is_zero() {
                return Ok(false);
            }
            held = self
                .locks
                .released
                .wait_timeout(held, remaining)
                .map_err(|_| StoreError::Store("lock table mutex poisoned".to_string()))?
                .0;
        }
    }

    fn release_provision_lock(&self, key: &str, owner: &str) -> Result<(), StoreError> {
        let mut held = self
            .locks
            .held
            .lock()
            .map_err(|_| StoreError::Store("lock table mutex poisoned".to_string()))?;
        if held.get(key).is_some_and(|current| current == owner) {
            held.remove(key);
            self.locks.released.notify_all();
        }
        Ok(())
    }

    fn create_metric_relations(
        &self,
        fence: &Fence,
        data: &RelationName,
        series: &RelationName,
    ) -> Result<(), StoreError> {
        let mut state = self.lock_state()?;
        check_fence(&state, fence)?;
        for relation in [data, series] {
            if !state.relations.contains_key(relation) {
                state.relations.insert(relation.clone(), RelationState {
                    managed: true,
                });
                state.relations_created += 1;
            }
        }
        Ok(())
    }

    fn check_permission(&self, relation: &RelationName) -> Result<bool, StoreError> {
        let state = self.lock_state()?;
        let managed = state.relations.get(relation).is_some_and(|relation| relation.managed);
        Ok(managed && !state.revoked.contains(relation))
    }

    fn register_metric(
        &self,
        fence: &Fence,
        entry: &CatalogEntry,
    ) -> Result<CatalogEntry, StoreError> {
        let mut state = self.lock_state()?;
        check_fence(&state, fence)?;
        if let Some(existing) = state.catalog.get(&entry.metric_name) {
            return Ok(existing.clone());
        }
        let taken = state.catalog.values().any(|other| {
            other.data_relation == entry.data_relation
                || other.series_relation == entry.series_relation
        });
        if taken {
            return Err(StoreError::Conflict(format!(
                "relation {} already registered",
                entry.data_relation
            )));
        }
        state.catalog.insert(entry.metric_name.clone(), entry.clone());
        Ok(entry.clone())
    }

    fn finalize_metrics(&self, fence: &Fence) -> Result<Vec<MetricName>, StoreError> {
        let mut state = self.lock_state()?;
        check_fence(&state, fence)?;
        let mut finalized = Vec::new();
        for entry in state.catalog.values_mut() {
            if !entry.creation_completed {
                entry.creation_completed = true;
                finalized.push(entry.metric_name.clone());
            }
        }
        Ok(finalized)
    }

    fn get_series(
        &self,
        entry: &CatalogEntry,
        key: &SeriesKey,
    ) -> Result<Option<SeriesId>, StoreError> {
        let state = self.lock_state()?;
        Ok(state
            .series
            .get(&entry.series_relation)
            .and_then(|table| table.by_key.get(key).copied()))
    }

    fn get_or_create_series(
        &self,
        fence: &Fence,
        entry: &CatalogEntry,
        key: &SeriesKey,
    ) -> Result<SeriesId, StoreError> {
        let mut state = self.lock_state()?;
        check_fence(&state, fence)?;
        if !state.relations.contains_key(&entry.series_relation) {
            return Err(StoreError::NotFound(entry.series_relation.qualified()));
        }
        let table = state.series.entry(entry.series_relation.clone()).or_default();
        if let Some(id) = table.by_key.get(key) {
            return Ok(*id);
        }
        let next = table.last_id + 1;
        let id = SeriesId::from_raw(next)
            .ok_or_else(|| StoreError::Invalid("series id overflow".to_string()))?;
        table.last_id = next;
        table.by_key.insert(key.clone(), id);
        Ok(id)
    }
}

impl SampleStore for InMemoryStore {
    fn insert_samples(&self, entry: &CatalogEntry, samples: &[Sample]) -> Result<u64, StoreError> {
        let mut state = self.lock_state()?;
        if let Some(failure) = state.insert_failures.pop_front() {
            return Err(failure);
        }
        if !state.relations.contains_key(&entry.data_relation) {
            return Err(StoreError::NotFound(entry.data_relation.qualified()));
        }
        state.samples.entry(entry.data_relation.clone()).or_default().extend_from_slice(samples);
        Ok(u64::try_from(samples.len()).unwrap_or(u64::MAX))
    }

    fn upsert_metadata(&self, entries: &[MetadataEntry]) -> Result<u64, StoreError> {
        let mut state = self.lock_state()?;
        for entry in entries {
            state.metadata.insert(entry.metric_name.clone(), entry.clone());
        }
        Ok(u64::try_from(entries.len()).unwrap_or(u64::MAX))
    }

    fn get_metadata(&self, name: &MetricName) -> Result<Option<MetadataEntry>, StoreError> {
        Ok(self.lock_state()?.metadata.get(name).cloned())
    }

    fn list_series(&self, entry: &CatalogEntry) -> Result<Vec<(SeriesId, SeriesKey)>, StoreError> {
        let state = self.lock_state()?;
        let mut series: Vec<_> = state
            .series
            .get(&entry.series_relation)
            .map(|table| table.by_key.iter().map(|(key, id)| (*id, key.clone())).collect())
            .unwrap_or_default();
        series.sort_by_key(|(id, _)| *id);
        Ok(series)
    }

    fn read_samples(
        &self,
        entry: &CatalogEntry,
        range: TimeRange,
    ) -> Result<Vec<Sample>, StoreError> {
        let state = self.lock_state()?;
        let mut samples: Vec<Sample> = state
            .samples
            .get(&entry.data_relation)
            .map(|rows| rows.iter().filter(|row| range.contains(row.timestamp_ms)).copied().collect())
            .unwrap_or_default();
        samples.sort_by_key(|sample| (sample.series_id, sample.timestamp_ms));
        Ok(samples)
    }
}

impl LeaseStore for InMemoryStore {
    fn try_acquire_lease(
        &self,
        group_id: &str,
        holder_id: &str,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Result<Option<LeaderLease>, StoreError> {
        let mut state = self.lock_state()?;
        let Some(next) =
            LeaderLease::acquire(state.leases.get(group_id), group_id, holder_id, now_ms, ttl_ms)
        else {
            return Ok(None);
        };
        state.leases.insert(group_id.to_string(), next.clone());
        Ok(Some(next))
    }

    fn renew_lease(
        &self,
        lease: &LeaderLease,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Result<Option<LeaderLease>, StoreError> {
        let mut state = self.lock_state()?;
        let Some(current) = state.leases.get_mut(&lease.group_id) else {
            return Ok(None);
        };
        let same_term = current.holder_id == lease.holder_id
            && current.fencing_token == lease.fencing_token
            && current.is_live(now_ms);
        if !same_term {
            return Ok(None);
        }
        current.expires_at_ms = now_ms.saturating_add(ttl_ms);
        Ok(Some(current.clone()))
    }

    fn release_lease(&self, lease: &LeaderLease) -> Result<(), StoreError> {
        let mut state = self.lock_state()?;
        if let Some(current) = state.leases.get_mut(&lease.group_id)
            && current.holder_id == lease.holder_id
            && current.fencing_token == lease.fencing_token
        {
            current.holder_id.clear();
            current.expires_at_ms = 0;
        }
        Ok(())
    }

    fn current_lease(&self, group_id: &str) -> Result<Option<LeaderLease>, StoreError> {
        Ok(self.lock_state()?.leases.get(group_id).cloned())
    }
}
