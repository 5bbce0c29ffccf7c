// crates/promstore-store-sqlite/tests/sqlite_adapter.rs
// ============================================================================
// Module: SQLite Adapter Tests
// Description: End-to-end ingestion through the adapter over SQLite.
// Purpose: Validate provisioning, writes, reads, and restarts on a real database.
// ============================================================================

//! ## Overview
//! Drives the full adapter (cache, provisioner, ingestor, arbiter) against a
//! temporary `SQLite` database, including concurrent first writes, a standby
//! sharing the same file (only the leader creates series), and a cold restart
//! that warms from the catalog.

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

use std::path::Path;
use std::sync::Arc;
use std::thread;

use promstore_core::Adapter;
use promstore_core::AdapterConfig;
use promstore_core::CatalogCacheConfig;
use promstore_core::CatalogStore;
use promstore_core::IngestConfig;
use promstore_core::Label;
use promstore_core::LeaderConfig;
use promstore_core::ManualClock;
use promstore_core::MetricName;
use promstore_core::NoopMetrics;
use promstore_core::ProvisionerConfig;
use promstore_core::RawSample;
use promstore_core::RequestContext;
use promstore_core::RetryPolicy;
use promstore_core::TimeRange;
use promstore_core::TimeSeries;
use promstore_core::TracingCacheLogger;
use promstore_core::WriteRequest;
use promstore_store_sqlite::SqliteStore;
use promstore_store_sqlite::SqliteStoreConfig;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const START_MS: i64 = 1_700_000_000_000;

fn adapter(path: &Path, holder: &str) -> Adapter<SqliteStore> {
    let store = Arc::new(SqliteStore::open(SqliteStoreConfig::new(path)).unwrap());
    let config = AdapterConfig {
        cache: CatalogCacheConfig::default(),
        provisioner: ProvisionerConfig::default(),
        ingest: IngestConfig {
            retry: RetryPolicy::default(),
            default_timeout: None,
        },
        leader: LeaderConfig::new("sqlite-adapter-tests", holder),
    };
    Adapter::new(
        store,
        config,
        Arc::new(NoopMetrics),
        Arc::new(TracingCacheLogger),
        Arc::new(ManualClock::new(START_MS)),
    )
    .unwrap()
}

fn request(metric: &str, host: &str, samples: &[(i64, f64)]) -> WriteRequest {
    WriteRequest {
        timeseries: vec![TimeSeries {
            labels: vec![Label::new("__name__", metric), Label::new("host", host)],
            samples: samples.iter().map(|(ts, value)| RawSample::new(*ts, *value)).collect(),
        }],
        metadata: Vec::new(),
    }
}

fn metric(raw: &str) -> MetricName {
    MetricName::new(raw).unwrap()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn leader_provisions_and_reads_back() {
    let dir = TempDir::new().unwrap();
    let adapter = adapter(&dir.path().join("promstore.db"), "node-a");
    adapter.arbiter().tick().unwrap();

    let report = adapter
        .ingest(&RequestContext::new(), request("node_load1", "h1", &[(1_000, 0.5), (2_000, 0.75)]))
        .unwrap();
    assert_eq!(report.samples_inserted, 2);
    assert_eq!(report.samples_failed, 0);

    let read = adapter
        .read_series(&RequestContext::new(), &metric("node_load1"), TimeRange::all())
        .unwrap();
    assert_eq!(read.len(), 1);
    assert_eq!(read[0].key.get("host"), Some("h1"));
    assert_eq!(read[0].samples.len(), 2);
}

#[test]
fn two_adapters_share_one_catalog() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("promstore.db");
    let leader = adapter(&path, "node-a");
    let standby = adapter(&path, "node-b");
    leader.arbiter().tick().unwrap();
    standby.arbiter().tick().unwrap();
    assert!(leader.is_leading());
    assert!(!standby.is_leading());

    thread::scope(|scope| {
        for index in 0 .. 4_i64 {
            let leader = &leader;
            scope.spawn(move || {
                let host = format!("h{index}");
                let report = leader
                    .ingest(&RequestContext::new(), request("shared_metric", &host, &[(index, 1.0)]))
                    .unwrap();
                assert_eq!(report.samples_inserted, 1);
            });
        }
    });

    let report = standby
        .ingest(&RequestContext::new(), request("shared_metric", "h0", &[(9, 2.0)]))
        .unwrap();
    assert_eq!(report.samples_inserted, 1);

    let store = SqliteStore::open(SqliteStoreConfig::new(&path)).unwrap();
    let catalog = store.load_catalog().unwrap();
    assert_eq!(catalog.len(), 1);
    assert!(catalog[0].creation_completed);
    let read = standby
        .read_series(&RequestContext::new(), &metric("shared_metric"), TimeRange::all())
        .unwrap();
    assert_eq!(read.len(), 4);
    let total: usize = read.iter().map(|series| series.samples.len()).sum();
    assert_eq!(total, 5);
}

#[test]
fn restart_warms_cache_from_catalog() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("promstore.db");
    {
        let first = adapter(&path, "node-a");
        first.arbiter().tick().unwrap();
        first.ingest(&RequestContext::new(), request("alpha", "h1", &[(1, 1.0)])).unwrap();
        first.ingest(&RequestContext::new(), request("beta", "h1", &[(1, 1.0)])).unwrap();
        first.shutdown().unwrap();
    }

    let restarted = adapter(&path, "node-b");
    assert_eq!(restarted.start().unwrap(), 2);
    let report = restarted
        .ingest(&RequestContext::new(), request("alpha", "h1", &[(2, 2.0)]))
        .unwrap();
    assert_eq!(report.samples_inserted, 1);
    restarted.shutdown().unwrap();
}
