// crates/promstore-core/src/runtime/query.rs
// ============================================================================
// Module: Promstore Query Resolver
// Description: Read-side metric resolution and sample retrieval.
// Purpose: Hand verified relation pairs and stored samples to the query collaborator.
// Dependencies: crate::{core, interfaces, runtime, telemetry}, thiserror
// ============================================================================

//! ## Overview
//! Reads resolve metric names through the same cache as writes but never
//! provision: an unknown metric is simply absent. Entries loaded on the read
//! path pass permission verification before they are cached, exactly like
//! entries loaded on the write path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::core::CatalogEntry;
use crate::core::Interrupted;
use crate::core::MetadataEntry;
use crate::core::MetricName;
use crate::core::RelationName;
use crate::core::RequestContext;
use crate::core::SeriesSamples;
use crate::core::StoredSample;
use crate::core::TimeRange;
use crate::interfaces::CatalogStore;
use crate::interfaces::SampleStore;
use crate::interfaces::StoreError;
use crate::runtime::cache::CatalogCache;
use crate::runtime::permission::PermissionError;
use crate::runtime::permission::PermissionVerifier;
use crate::telemetry::AdapterMetrics;
use crate::telemetry::CounterKind;
use crate::telemetry::DurationKind;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Relation pair resolved for a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMetric {
    /// Relation holding samples.
    pub data_relation: RelationName,
    /// Relation holding series label sets.
    pub series_relation: RelationName,
}

/// Read-side failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
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

/// Resolution failure used inside the cache's single-flight path.
#[derive(Debug, Clone)]
enum ReadMiss {
    /// Metric is not in the durable catalog.
    NotFound,
    /// Resolution failed.
    Failed(QueryError),
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Read-side resolver.
pub struct QueryResolver<S> {
    /// Backing store.
    store: Arc<S>,
    /// Shared catalog cache.
    cache: Arc<CatalogCache>,
    /// Permission verifier.
    verifier: PermissionVerifier<S>,
    /// Metrics sink.
    metrics: Arc<dyn AdapterMetrics>,
}

impl<S> QueryResolver<S>
where
    S: CatalogStore + SampleStore,
{
    /// Creates a resolver.
    #[must_use]
    pub fn new(store: Arc<S>, cache: Arc<CatalogCache>, metrics: Arc<dyn AdapterMetrics>) -> Self {
        Self {
            verifier: PermissionVerifier::new(Arc::clone(&store)),
            store,
            cache,
            metrics,
        }
    }

    /// Resolves a metric's relation pair without provisioning.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when the catalog cannot be read or the resolved
    /// relations fail verification.
    pub fn resolve_for_read(&self, name: &MetricName) -> Result<Option<ResolvedMetric>, QueryError> {
        Ok(self.resolve_entry(name)?.map(|entry| ResolvedMetric {
            data_relation: entry.data_relation.clone(),
            series_relation: entry.series_relation.clone(),
        }))
    }

    /// Reads every series of a metric with samples inside `range`.
    ///
    /// Series are ordered by id and samples by timestamp. Unknown metrics
    /// yield an empty result.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when resolution or the store read fails, or the
    /// request stops.
    pub fn read_series(
        &self,
        ctx: &RequestContext,
        name: &MetricName,
        range: TimeRange,
    ) -> Result<Vec<SeriesSamples>, QueryError> {
        let started = Instant::now();
        self.metrics.record_count(CounterKind::ReceivedQueries, 1);
        let result = self.read_series_inner(ctx, name, range);
        match &result {
            Ok(_) => self.metrics.record_count(CounterKind::ExecutedQueries, 1),
            Err(QueryError::Interrupted(Interrupted::DeadlineExceeded)) => {
                self.metrics.record_count(CounterKind::TimedOutQueries, 1);
            }
            Err(_) => self.metrics.record_count(CounterKind::FailedQueries, 1),
        }
        self.metrics.observe_duration(DurationKind::Query, started.elapsed());
        result
    }

    /// Loads stored metadata for a metric.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Store`] when the metadata cannot be read.
    pub fn metadata(&self, name: &MetricName) -> Result<Option<MetadataEntry>, QueryError> {
        Ok(self.store.get_metadata(name)?)
    }

    /// Records a malformed read request rejected before resolution.
    pub fn record_invalid_request(&self) {
        self.metrics.record_count(CounterKind::InvalidReadRequests, 1);
    }

    /// Resolves the verified catalog entry, caching hits.
    fn resolve_entry(&self, name: &MetricName) -> Result<Option<Arc<CatalogEntry>>, QueryError> {
        let resolved = self.cache.get_or_resolve_metric(name, || {
            let entry = self
                .store
                .get_metric(name)
                .map_err(|err| ReadMiss::Failed(err.into()))?
                .ok_or(ReadMiss::NotFound)?;
            self.verifier.verify_entry(&entry).map_err(|err| ReadMiss::Failed(err.into()))?;
            Ok(entry)
        });
        match resolved {
            Ok(entry) => Ok(Some(entry)),
            Err(ReadMiss::NotFound) => Ok(None),
            Err(ReadMiss::Failed(err)) => Err(err),
        }
    }

    /// Body of [`QueryResolver::read_series`].
    fn read_series_inner(
        &self,
        ctx: &RequestContext,
        name: &MetricName,
        range: TimeRange,
    ) -> Result<Vec<SeriesSamples>, QueryError> {
        ctx.check()?;
        let Some(entry) = self.resolve_entry(name)? else {
            return Ok(Vec::new());
        };
        ctx.check()?;
        let series = self.store.list_series(&entry)?;
        ctx.check()?;
        let samples = self.store.read_samples(&entry, range)?;
        let mut grouped: BTreeMap<_, SeriesSamples> = series
            .into_iter()
            .map(|(series_id, key)| {
                (series_id, SeriesSamples {
                    series_id,
                    key,
                    samples: Vec::new(),
                })
            })
            .collect();
        for sample in samples {
            if let Some(slot) = grouped.get_mut(&sample.series_id) {
                slot.samples.push(StoredSample {
                    timestamp_ms: sample.timestamp_ms,
                    value: sample.value,
                });
            }
        }
        Ok(grouped
            .into_values()
            .filter(|series| !series.samples.is_empty())
            .map(|mut series| {
                series.samples.sort_by_key(|sample| sample.timestamp_ms);
                series
            })
            .collect())
    }
}
