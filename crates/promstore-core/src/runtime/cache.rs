// crates/promstore-core/src/runtime/cache.rs
// ============================================================================
// Module: Promstore Catalog Cache
// Description: Bounded in-process cache of metric and series resolutions.
// Purpose: Keep catalog round-trips off the write-hot path.
// Dependencies: crate::{core, telemetry}, moka
// ============================================================================

//! ## Overview
//! Two bounded caches back the write and read paths: metric name to catalog
//! entry, and (metric, canonical labels) to series id. Reads never block on
//! the network. A miss runs the caller's resolver under per-key single
//! flight, so concurrent callers for the same key wait on one resolution
//! while callers for other keys proceed. Failed resolutions are not cached.
//!
//! The cache is write-through only: callers persist to the durable catalog
//! first and install here second. Only entries that passed permission
//! verification are ever installed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use moka::notification::RemovalCause;
use moka::sync::Cache;
use serde::Serialize;

use crate::core::CatalogEntry;
use crate::core::MetricName;
use crate::core::SeriesId;
use crate::core::SeriesKey;
use crate::telemetry::CacheLogger;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Default metric cache capacity (entries).
const DEFAULT_METRIC_CAPACITY: u64 = 10_000;
/// Default series cache capacity (entries).
const DEFAULT_SERIES_CAPACITY: u64 = 1_000_000;

/// Catalog cache sizing.
///
/// # Invariants
/// - Capacities are non-zero (validated by configuration loaders).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogCacheConfig {
    /// Maximum cached metrics.
    pub metric_capacity: u64,
    /// Maximum cached series.
    pub series_capacity: u64,
    /// Optional time-to-live for cached entries.
    pub ttl: Option<Duration>,
}

impl Default for CatalogCacheConfig {
    fn default() -> Self {
        Self {
            metric_capacity: DEFAULT_METRIC_CAPACITY,
            series_capacity: DEFAULT_SERIES_CAPACITY,
            ttl: None,
        }
    }
}

// ============================================================================
// SECTION: Stats
// ============================================================================

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Metric lookups served from cache.
    pub metric_hits: u64,
    /// Metric lookups that missed.
    pub metric_misses: u64,
    /// Series lookups served from cache.
    pub series_hits: u64,
    /// Series lookups that missed.
    pub series_misses: u64,
    /// Cached metric entries.
    pub metric_entries: u64,
    /// Cached series entries.
    pub series_entries: u64,
}

/// Hit/miss counters.
#[derive(Debug, Default)]
struct CacheCounters {
    /// Metric hits.
    metric_hits: AtomicU64,
    /// Metric misses.
    metric_misses: AtomicU64,
    /// Series hits.
    series_hits: AtomicU64,
    /// Series misses.
    series_misses: AtomicU64,
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Series cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SeriesCacheKey {
    /// Owning metric.
    metric: MetricName,
    /// Canonical label set.
    key: SeriesKey,
}

/// Bounded, concurrently readable catalog cache.
pub struct CatalogCache {
    /// Metric name to verified catalog entry.
    metrics: Cache<MetricName, Arc<CatalogEntry>>,
    /// (metric, labels) to series id.
    series: Cache<SeriesCacheKey, SeriesId>,
    /// Hit/miss counters.
    counters: CacheCounters,
    /// Diagnostic hook.
    logger: Arc<dyn CacheLogger>,
}

impl CatalogCache {
    /// Builds a cache with the given sizing and diagnostic hook.
    #[must_use]
    pub fn new(config: CatalogCacheConfig, logger: Arc<dyn CacheLogger>) -> Self {
        let metric_logger = Arc::clone(&logger);
        let mut metrics = Cache::builder().max_capacity(config.metric_capacity).eviction_listener(
            move |name: Arc<MetricName>, _entry: Arc<CatalogEntry>, cause: RemovalCause| {
                if cause.was_evicted() {
                    metric_logger
                        .log(&format!("metric cache dropped {name} ({})", removal_label(cause)));
                }
            },
        );
        let series_logger = Arc::clone(&logger);
        let mut series = Cache::builder().max_capacity(config.series_capacity).eviction_listener(
            move |key: Arc<SeriesCacheKey>, id: SeriesId, cause: RemovalCause| {
                if cause.was_evicted() {
                    series_logger.log(&format!(
                        "series cache dropped {}#{id} ({})",
                        key.metric,
                        removal_label(cause)
                    ));
                }
            },
        );
        if let Some(ttl) = config.ttl {
            metrics = metrics.time_to_live(ttl);
            series = series.time_to_live(ttl);
        }
        Self {
            metrics: metrics.build(),
            series: series.build(),
            counters: CacheCounters::default(),
            logger,
        }
    }

    /// Returns the cached entry for a metric without resolving.
    #[must_use]
    pub fn resolve_metric(&self, name: &MetricName) -> Option<Arc<CatalogEntry>> {
        let found = self.metrics.get(name);
        self.count_metric(found.is_some());
        found
    }

    /// Returns the cached series id without resolving.
    #[must_use]
    pub fn resolve_series(&self, metric: &MetricName, key: &SeriesKey) -> Option<SeriesId> {
        let found = self.series.get(&SeriesCacheKey {
            metric: metric.clone(),
            key: key.clone(),
        });
        self.count_series(found.is_some());
        found
    }

    /// Installs a verified, durably persisted catalog entry.
    pub fn insert(&self, entry: CatalogEntry) -> Arc<CatalogEntry> {
        let entry = Arc::new(entry);
        self.metrics.insert(entry.metric_name.clone(), Arc::clone(&entry));
        entry
    }

    /// Installs a durably persisted series id.
    pub fn insert_series(&self, metric: &MetricName, key: &SeriesKey, id: SeriesId) {
        self.series.insert(
            SeriesCacheKey {
                metric: metric.clone(),
                key: key.clone(),
            },
            id,
        );
    }

    /// Returns the cached entry or runs `resolve` once across concurrent callers.
    ///
    /// # Errors
    ///
    /// Returns the resolver's error; failed resolutions are not cached.
    pub fn get_or_resolve_metric<E, F>(
        &self,
        name: &MetricName,
        resolve: F,
    ) -> Result<Arc<CatalogEntry>, E>
    where
        F: FnOnce() -> Result<CatalogEntry, E>,
        E: Clone + Send + Sync + 'static,
    {
        if let Some(entry) = self.resolve_metric(name) {
            return Ok(entry);
        }
        self.metrics
            .try_get_with(name.clone(), || resolve().map(Arc::new))
            .map_err(|err| E::clone(&err))
    }

    /// Returns the cached series id or runs `resolve` once across concurrent callers.
    ///
    /// # Errors
    ///
    /// Returns the resolver's error; failed resolutions are not cached.
    pub fn get_or_resolve_series<E, F>(
        &self,
        metric: &MetricName,
        key: &SeriesKey,
        resolve: F,
    ) -> Result<SeriesId, E>
    where
        F: FnOnce() -> Result<SeriesId, E>,
        E: Clone + Send + Sync + 'static,
    {
        if let Some(id) = self.resolve_series(metric, key) {
            return Ok(id);
        }
        let cache_key = SeriesCacheKey {
            metric: metric.clone(),
            key: key.clone(),
        };
        self.series.try_get_with(cache_key, resolve).map_err(|err| E::clone(&err))
    }

    /// Populates the metric cache from durable catalog rows.
    pub fn warm(&self, entries: Vec<CatalogEntry>) -> usize {
        let count = entries.len();
        for entry in entries {
            self.insert(entry);
        }
        self.logger.log(&format!("warmed metric cache with {count} entries"));
        count
    }

    /// Drops a metric from the cache.
    pub fn invalidate_metric(&self, name: &MetricName) {
        self.metrics.invalidate(name);
    }

    /// Returns current statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.metrics.run_pending_tasks();
        self.series.run_pending_tasks();
        CacheStats {
            metric_hits: self.counters.metric_hits.load(Ordering::Relaxed),
            metric_misses: self.counters.metric_misses.load(Ordering::Relaxed),
            series_hits: self.counters.series_hits.load(Ordering::Relaxed),
            series_misses: self.counters.series_misses.load(Ordering::Relaxed),
            metric_entries: self.metrics.entry_count(),
            series_entries: self.series.entry_count(),
        }
    }

    /// Counts a metric lookup.
    fn count_metric(&self, hit: bool) {
        let counter =
            if hit { &self.counters.metric_hits } else { &self.counters.metric_misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a series lookup.
    fn count_series(&self, hit: bool) {
        let counter =
            if hit { &self.counters.series_hits } else { &self.counters.series_misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Returns a stable label for a removal cause.
const fn removal_label(cause: RemovalCause) -> &'static str {
    match cause {
        RemovalCause::Expired => "expired",
        RemovalCause::Explicit => "explicit",
        RemovalCause::Replaced => "replaced",
        RemovalCause::Size => "size",
    }
}
