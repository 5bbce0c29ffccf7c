// crates/promstore-core/tests/ingestion.rs
// ============================================================================
// Module: Ingestion Tests
// Description: Tests for batch ingestion accounting and failure isolation.
// ============================================================================
//! ## Overview
//! Validates exact sample accounting for mixed valid and invalid input,
//! bit-exact storage of special float values, cancellation, connection
//! exhaustion, and per-metric failure isolation.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use promstore_core::Adapter;
use promstore_core::AdapterConfig;
use promstore_core::AdapterMetrics;
use promstore_core::CatalogCacheConfig;
use promstore_core::InMemoryStore;
use promstore_core::IngestConfig;
use promstore_core::IngestError;
use promstore_core::Label;
use promstore_core::LeaderConfig;
use promstore_core::ManualClock;
use promstore_core::MetadataEntry;
use promstore_core::MetricName;
use promstore_core::MetricType;
use promstore_core::ProvisionerConfig;
use promstore_core::RawSample;
use promstore_core::RelationName;
use promstore_core::RequestContext;
use promstore_core::RetryPolicy;
use promstore_core::StoreError;
use promstore_core::TimeRange;
use promstore_core::TimeSeries;
use promstore_core::TracingCacheLogger;
use promstore_core::WriteRequest;
use promstore_core::runtime::FailureKind;
use promstore_core::telemetry::CounterKind;
use promstore_core::telemetry::DurationKind;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Metrics sink that records counter totals.
#[derive(Default)]
struct RecordingMetrics {
    /// Recorded counter increments.
    counts: Mutex<Vec<(CounterKind, u64)>>,
}

impl RecordingMetrics {
    fn total(&self, kind: CounterKind) -> u64 {
        self.counts
            .lock()
            .unwrap()
            .iter()
            .filter(|(recorded, _)| *recorded == kind)
            .map(|(_, value)| value)
            .sum()
    }
}

impl AdapterMetrics for RecordingMetrics {
    fn record_count(&self, kind: CounterKind, value: u64) {
        self.counts.lock().unwrap().push((kind, value));
    }

    fn observe_duration(&self, _kind: DurationKind, _elapsed: Duration) {}

    fn set_leader(&self, _leading: bool) {}
}

fn adapter_with(
    store: &Arc<InMemoryStore>,
    metrics: Arc<dyn AdapterMetrics>,
    retry: RetryPolicy,
) -> Adapter<InMemoryStore> {
    let config = AdapterConfig {
        cache: CatalogCacheConfig::default(),
        provisioner: ProvisionerConfig::default(),
        ingest: IngestConfig {
            retry,
            default_timeout: None,
        },
        leader: LeaderConfig::new("ingestion-tests", "holder-a"),
    };
    let adapter = Adapter::new(
        Arc::clone(store),
        config,
        metrics,
        Arc::new(TracingCacheLogger),
        Arc::new(ManualClock::new(1_700_000_000_000)),
    )
    .unwrap();
    adapter.arbiter().tick().unwrap();
    adapter
}

fn leading_adapter(store: &Arc<InMemoryStore>) -> Adapter<InMemoryStore> {
    adapter_with(store, Arc::new(RecordingMetrics::default()), RetryPolicy::no_retry())
}

fn series(metric: &str, labels: &[(&str, &str)], samples: &[(i64, f64)]) -> TimeSeries {
    let mut all = vec![Label::new("__name__", metric)];
    all.extend(labels.iter().map(|(name, value)| Label::new(*name, *value)));
    TimeSeries {
        labels: all,
        samples: samples.iter().map(|(ts, value)| RawSample::new(*ts, *value)).collect(),
    }
}

fn write(timeseries: Vec<TimeSeries>) -> WriteRequest {
    WriteRequest {
        timeseries,
        metadata: Vec::new(),
    }
}

fn metric(raw: &str) -> MetricName {
    MetricName::new(raw).unwrap()
}

// ============================================================================
// SECTION: Accounting
// ============================================================================

#[test]
fn valid_and_invalid_series_are_counted_exactly() {
    let store = Arc::new(InMemoryStore::new());
    let metrics = Arc::new(RecordingMetrics::default());
    let adapter =
        adapter_with(&store, Arc::clone(&metrics) as Arc<dyn AdapterMetrics>, RetryPolicy::no_retry());

    let missing_name = TimeSeries {
        labels: vec![Label::new("job", "api")],
        samples: vec![RawSample::new(1_000, 1.0), RawSample::new(2_000, 2.0)],
    };
    let duplicate_label = TimeSeries {
        labels: vec![
            Label::new("__name__", "dupes"),
            Label::new("job", "a"),
            Label::new("job", "b"),
        ],
        samples: vec![RawSample::new(1_000, 1.0)],
    };
    let request = write(vec![
        series("requests", &[("code", "200")], &[(1_000, 1.0), (2_000, 2.0), (3_000, 3.0)]),
        missing_name,
        series("latency", &[], &[(1_000, 0.25), (i64::MAX, 0.5)]),
        duplicate_label,
    ]);

    let report = adapter.ingest(&RequestContext::new(), request).unwrap();
    assert_eq!(report.samples_received, 8);
    assert_eq!(report.samples_inserted, 4);
    assert_eq!(report.samples_failed, 4);
    assert!(report.metric_failures.is_empty());
    assert_eq!(metrics.total(CounterKind::ReceivedSamples), 8);
    assert_eq!(metrics.total(CounterKind::IngestedSamples), 4);
    assert_eq!(metrics.total(CounterKind::FailedSamples), 4);
    assert_eq!(metrics.total(CounterKind::InvalidWriteRequests), 0);
}

#[test]
fn fully_invalid_request_is_flagged() {
    let store = Arc::new(InMemoryStore::new());
    let metrics = Arc::new(RecordingMetrics::default());
    let adapter =
        adapter_with(&store, Arc::clone(&metrics) as Arc<dyn AdapterMetrics>, RetryPolicy::no_retry());
    let request = write(vec![TimeSeries {
        labels: vec![Label::new("bad-label", "x")],
        samples: vec![RawSample::new(1_000, 1.0)],
    }]);
    let report = adapter.ingest(&RequestContext::new(), request).unwrap();
    assert_eq!(report.samples_failed, 1);
    assert_eq!(metrics.total(CounterKind::InvalidWriteRequests), 1);
}

#[test]
fn empty_request_is_accepted() {
    let store = Arc::new(InMemoryStore::new());
    let adapter = leading_adapter(&store);
    let report = adapter.ingest(&RequestContext::new(), WriteRequest::default()).unwrap();
    assert_eq!(report.samples_received, 0);
    assert_eq!(report.samples_inserted, 0);
}

#[test]
fn special_float_values_round_trip_bit_exact() {
    let store = Arc::new(InMemoryStore::new());
    let adapter = leading_adapter(&store);
    let payload_nan = f64::from_bits(0x7ff8_0000_0000_0001);
    let values = [f64::NAN, payload_nan, f64::INFINITY, f64::NEG_INFINITY, -0.0, f64::MIN_POSITIVE];
    let samples: Vec<_> = values
        .iter()
        .enumerate()
        .map(|(index, value)| (i64::try_from(index).unwrap() * 1_000, *value))
        .collect();
    adapter
        .ingest(&RequestContext::new(), write(vec![series("weird_values", &[], &samples)]))
        .unwrap();

    let read = adapter
        .read_series(&RequestContext::new(), &metric("weird_values"), TimeRange::all())
        .unwrap();
    let stored: Vec<u64> = read[0].samples.iter().map(|sample| sample.value.to_bits()).collect();
    let expected: Vec<u64> = values.iter().map(|value| value.to_bits()).collect();
    assert_eq!(stored, expected);
}

#[test]
fn reads_respect_time_range() {
    let store = Arc::new(InMemoryStore::new());
    let adapter = leading_adapter(&store);
    adapter
        .ingest(
            &RequestContext::new(),
            write(vec![series("temp", &[], &[(3_000, 3.0), (1_000, 1.0), (2_000, 2.0)])]),
        )
        .unwrap();
    let range = TimeRange::new(1_500, 3_000).unwrap();
    let read = adapter.read_series(&RequestContext::new(), &metric("temp"), range).unwrap();
    let timestamps: Vec<i64> = read[0].samples.iter().map(|sample| sample.timestamp_ms).collect();
    assert_eq!(timestamps, vec![2_000, 3_000]);
    assert!(adapter.read_series(&RequestContext::new(), &metric("never_written"), range).unwrap().is_empty());
}

#[test]
fn metadata_is_upserted() {
    let store = Arc::new(InMemoryStore::new());
    let adapter = leading_adapter(&store);
    let entry = MetadataEntry {
        metric_name: metric("requests_total"),
        metric_type: MetricType::Counter,
        unit: "requests".to_string(),
        help: "Total requests.".to_string(),
    };
    let request = WriteRequest {
        timeseries: Vec::new(),
        metadata: vec![entry.clone()],
    };
    let report = adapter.ingest(&RequestContext::new(), request).unwrap();
    assert_eq!(report.metadata_inserted, 1);
    assert_eq!(adapter.metadata(&metric("requests_total")).unwrap(), Some(entry));
}

// ============================================================================
// SECTION: Failure Handling
// ============================================================================

#[test]
fn cancelled_request_counts_unwritten_samples_as_failed() {
    let store = Arc::new(InMemoryStore::new());
    let adapter = leading_adapter(&store);
    let ctx = RequestContext::new();
    ctx.cancel();
    let failure = adapter
        .ingest(&ctx, write(vec![series("a", &[], &[(1_000, 1.0)]), series("b", &[], &[(1_000, 1.0)])]))
        .unwrap_err();
    assert!(matches!(failure.error, IngestError::Interrupted(_)));
    assert_eq!(failure.report.samples_inserted, 0);
    assert_eq!(failure.report.samples_failed, 2);
}

#[test]
fn expired_deadline_is_reported_as_interrupted() {
    let store = Arc::new(InMemoryStore::new());
    let adapter = leading_adapter(&store);
    let ctx = RequestContext::with_timeout(Duration::ZERO);
    let failure =
        adapter.ingest(&ctx, write(vec![series("a", &[], &[(1_000, 1.0)])])).unwrap_err();
    assert!(matches!(failure.error, IngestError::Interrupted(_)));
    assert_eq!(failure.report.samples_failed, 1);
}

#[test]
fn storage_failure_is_isolated_to_one_metric() {
    let store = Arc::new(InMemoryStore::new());
    let adapter = leading_adapter(&store);
    store.inject_insert_failures(vec![StoreError::Io("disk full".to_string())]).unwrap();

    let failure = adapter
        .ingest(
            &RequestContext::new(),
            write(vec![
                series("alpha", &[], &[(1_000, 1.0), (2_000, 2.0)]),
                series("beta", &[], &[(1_000, 1.0)]),
            ]),
        )
        .unwrap_err();
    assert!(matches!(failure.error, IngestError::MetricGroups { failed: 1 }));
    assert_eq!(failure.report.samples_inserted, 1);
    assert_eq!(failure.report.samples_failed, 2);
    let failed = &failure.report.metric_failures[0];
    assert_eq!(failed.metric, metric("alpha"));
    assert_eq!(failed.kind, FailureKind::Storage);
    assert!(!failed.retryable);
    assert_eq!(store.sample_count(&RelationName::data("beta")).unwrap(), 1);
}

#[test]
fn transient_failures_are_retried() {
    let store = Arc::new(InMemoryStore::new());
    let policy = RetryPolicy {
        max_attempts: 3,
        base_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
    };
    let adapter = adapter_with(&store, Arc::new(RecordingMetrics::default()), policy);
    store
        .inject_insert_failures(vec![
            StoreError::Busy("locked".to_string()),
            StoreError::Busy("locked".to_string()),
        ])
        .unwrap();
    let report = adapter
        .ingest(&RequestContext::new(), write(vec![series("gamma", &[], &[(1_000, 1.0)])]))
        .unwrap();
    assert_eq!(report.samples_inserted, 1);
}

#[test]
fn exhausted_connections_abort_the_request() {
    let store = Arc::new(InMemoryStore::new());
    let adapter = leading_adapter(&store);
    adapter
        .ingest(
            &RequestContext::new(),
            write(vec![series("first", &[], &[(1_000, 1.0)]), series("second", &[], &[(1_000, 1.0)])]),
        )
        .unwrap();
    store
        .inject_insert_failures(vec![StoreError::Exhausted {
            message: "pool empty".to_string(),
            retry_after_ms: 500,
        }])
        .unwrap();

    let failure = adapter
        .ingest(
            &RequestContext::new(),
            write(vec![
                series("first", &[], &[(2_000, 1.0)]),
                series("second", &[], &[(2_000, 1.0), (3_000, 1.0)]),
            ]),
        )
        .unwrap_err();
    assert!(matches!(failure.error, IngestError::ResourceExhausted(_)));
    assert!(failure.error.is_retryable());
    assert_eq!(failure.report.samples_inserted, 0);
    assert_eq!(failure.report.samples_failed, 3);
}
