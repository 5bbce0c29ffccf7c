// crates/promstore-core/src/telemetry.rs
// ============================================================================
// Module: Promstore Telemetry
// Description: Narrow metrics sink and cache diagnostic hook.
// Purpose: Emit ingest, query, and leadership signals without process-wide state.
// Dependencies: metrics, tracing
// ============================================================================

//! ## Overview
//! Components receive an [`AdapterMetrics`] sink and a [`CacheLogger`] at
//! construction. [`NoopMetrics`] discards everything; [`FacadeMetrics`]
//! forwards to the `metrics` facade so a host can install any exporter.
//! Exporter installation itself stays outside the core.
//! Security posture: labels are static; metric names and label values from
//! clients never become telemetry labels.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Namespace prefix for every emitted series.
pub const METRIC_NAMESPACE: &str = "promstore";
/// Tracing target used for cache diagnostics.
pub const CACHE_LOG_TARGET: &str = "promstore::cache";

// ============================================================================
// SECTION: Metric Kinds
// ============================================================================

/// Counter classification.
///
/// # Invariants
/// - Variants are stable for telemetry naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterKind {
    /// Samples received on the write path.
    ReceivedSamples,
    /// Metadata entries received on the write path.
    ReceivedMetadata,
    /// Samples rejected or not committed.
    FailedSamples,
    /// Metadata entries not committed.
    FailedMetadata,
    /// Samples committed to storage.
    IngestedSamples,
    /// Metadata entries committed to storage.
    SentMetadata,
    /// Write requests with no valid series.
    InvalidWriteRequests,
    /// Read requests rejected as malformed.
    InvalidReadRequests,
    /// Read requests received.
    ReceivedQueries,
    /// Read requests executed successfully.
    ExecutedQueries,
    /// Read requests that failed.
    FailedQueries,
    /// Read requests that hit their deadline.
    TimedOutQueries,
}

impl CounterKind {
    /// Returns the stable series name (without namespace).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReceivedSamples => "received_samples_total",
            Self::ReceivedMetadata => "received_metadata_total",
            Self::FailedSamples => "failed_samples_total",
            Self::FailedMetadata => "failed_metadata_total",
            Self::IngestedSamples => "ingested_samples_total",
            Self::SentMetadata => "sent_metadata_total",
            Self::InvalidWriteRequests => "invalid_write_requests",
            Self::InvalidReadRequests => "invalid_read_requests",
            Self::ReceivedQueries => "received_queries_total",
            Self::ExecutedQueries => "executed_queries_total",
            Self::FailedQueries => "queries_failed_total",
            Self::TimedOutQueries => "queries_timed_out_total",
        }
    }
}

/// Duration histogram classification.
///
/// # Invariants
/// - Variants are stable for telemetry naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DurationKind {
    /// Time spent committing one write batch.
    SentBatch,
    /// Time spent executing one read.
    Query,
}

impl DurationKind {
    /// Returns the stable series name (without namespace).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SentBatch => "sent_batch_duration_seconds",
            Self::Query => "query_duration_seconds",
        }
    }
}

// ============================================================================
// SECTION: Metrics Sink
// ============================================================================

/// Metrics sink for adapter signals.
pub trait AdapterMetrics: Send + Sync {
    /// Adds `value` to a counter.
    fn record_count(&self, kind: CounterKind, value: u64);
    /// Records a duration observation.
    fn observe_duration(&self, kind: DurationKind, elapsed: Duration);
    /// Publishes whether this instance currently leads.
    fn set_leader(&self, leading: bool);
}

/// No-op metrics sink.
///
/// # Invariants
/// - Metrics are intentionally discarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl AdapterMetrics for NoopMetrics {
    fn record_count(&self, _kind: CounterKind, _value: u64) {}

    fn observe_duration(&self, _kind: DurationKind, _elapsed: Duration) {}

    fn set_leader(&self, _leading: bool) {}
}

/// Metrics sink forwarding to the `metrics` facade.
///
/// Series are named `promstore_<kind>`; the leader gauge is
/// `promstore_current_leader`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FacadeMetrics;

impl AdapterMetrics for FacadeMetrics {
    fn record_count(&self, kind: CounterKind, value: u64) {
        if value == 0 {
            return;
        }
        metrics::counter!(format!("{METRIC_NAMESPACE}_{}", kind.as_str())).increment(value);
    }

    fn observe_duration(&self, kind: DurationKind, elapsed: Duration) {
        metrics::histogram!(format!("{METRIC_NAMESPACE}_{}", kind.as_str()))
            .record(elapsed.as_secs_f64());
    }

    fn set_leader(&self, leading: bool) {
        let value = if leading { 1.0 } else { 0.0 };
        metrics::gauge!(format!("{METRIC_NAMESPACE}_current_leader")).set(value);
    }
}

// ============================================================================
// SECTION: Cache Logger
// ============================================================================

/// Diagnostic hook accepted by the catalog cache.
pub trait CacheLogger: Send + Sync {
    /// Records a cache diagnostic message.
    fn log(&self, message: &str);
}

/// Cache logger routing diagnostics to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCacheLogger;

impl CacheLogger for TracingCacheLogger {
    fn log(&self, message: &str) {
        tracing::debug!(target: CACHE_LOG_TARGET, "{message}");
    }
}
