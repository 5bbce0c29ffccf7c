// crates/promstore-store-postgres/tests/postgres_store.rs
// ============================================================================
// Module: Postgres Store Tests
// Description: Configuration tests plus live-server store tests.
// Purpose: Validate configuration handling always, and store behavior when a
//          server is available.
// ============================================================================

//! ## Overview
//! Configuration tests run unconditionally. Tests that need a server read
//! `PROMSTORE_TEST_POSTGRES_URL` and return early when it is unset. Live
//! tests use unique group ids and metric names so they can share a database.

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
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use promstore_core::Adapter;
use promstore_core::AdapterConfig;
use promstore_core::CatalogCacheConfig;
use promstore_core::CatalogStore;
use promstore_core::FencingToken;
use promstore_core::IngestConfig;
use promstore_core::Label;
use promstore_core::LeaderConfig;
use promstore_core::LeaseStore;
use promstore_core::MetricName;
use promstore_core::NoopMetrics;
use promstore_core::ProvisionerConfig;
use promstore_core::RawSample;
use promstore_core::RelationName;
use promstore_core::RequestContext;
use promstore_core::RetryPolicy;
use promstore_core::StoreError;
use promstore_core::SystemClock;
use promstore_core::TimeRange;
use promstore_core::TimeSeries;
use promstore_core::TracingCacheLogger;
use promstore_core::WriteRequest;
use promstore_store_postgres::PostgresStore;
use promstore_store_postgres::PostgresStoreConfig;
use promstore_store_postgres::PostgresStoreError;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const URL_ENV: &str = "PROMSTORE_TEST_POSTGRES_URL";

fn live_config() -> Option<PostgresStoreConfig> {
    let connection = std::env::var(URL_ENV).ok()?;
    Some(PostgresStoreConfig {
        connection,
        max_connections: 4,
        ..PostgresStoreConfig::default()
    })
}

fn unique(prefix: &str) -> String {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    format!("{prefix}_{}_{nanos}", std::process::id())
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

#[test]
fn postgres_store_default_config_is_valid_shape() {
    let config = PostgresStoreConfig::default();
    assert!(!config.connection.is_empty());
    assert!(config.max_connections > 0);
    assert!(config.connect_timeout_ms > 0);
    assert!(config.statement_timeout_ms > 0);
    assert!(config.pool_wait_ms > 0);
    config.validate().unwrap();
}

#[test]
fn postgres_store_rejects_zero_limits() {
    let config = PostgresStoreConfig {
        max_connections: 0,
        ..PostgresStoreConfig::default()
    };
    assert!(matches!(config.validate(), Err(PostgresStoreError::Invalid(_))));
}

#[test]
fn postgres_store_invalid_connection_string_fails() {
    let config = PostgresStoreConfig {
        connection: "host=/nonexistent port=notaport".to_string(),
        ..PostgresStoreConfig::default()
    };
    let result = PostgresStore::new(config);
    assert!(matches!(result, Err(PostgresStoreError::Invalid(_))));
}

#[test]
fn postgres_store_config_fills_defaults() {
    let config: PostgresStoreConfig =
        serde_json::from_str(r#"{"connection": "postgres://u:p@db/promstore"}"#).unwrap();
    let defaults = PostgresStoreConfig::default();
    assert_eq!(config.max_connections, defaults.max_connections);
    assert_eq!(config.statement_timeout_ms, defaults.statement_timeout_ms);
    assert_eq!(config.pool_wait_ms, defaults.pool_wait_ms);
}

// ============================================================================
// SECTION: Live Server
// ============================================================================

#[test]
fn live_lease_follows_compare_and_set_rules() {
    let Some(config) = live_config() else {
        return;
    };
    let store = PostgresStore::new(config).unwrap();
    let group = unique("lease");
    assert!(store.current_lease(&group).unwrap().is_none());
    let first = store.try_acquire_lease(&group, "a", 0, 1_000).unwrap().unwrap();
    assert_eq!(first.fencing_token, FencingToken::new(1));
    assert!(store.try_acquire_lease(&group, "b", 500, 1_000).unwrap().is_none());
    let taken = store.try_acquire_lease(&group, "b", 1_000, 1_000).unwrap().unwrap();
    assert_eq!(taken.fencing_token, FencingToken::new(2));
    assert!(store.renew_lease(&first, 1_001, 1_000).unwrap().is_none());

    let err = store
        .create_metric_relations(
            &first.fence(),
            &RelationName::data(unique("fenced")),
            &RelationName::series(unique("fenced")),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::FenceRejected(_)));
}

#[test]
fn live_out_of_band_table_fails_permission() {
    let Some(config) = live_config() else {
        return;
    };
    let mut client = postgres::Client::connect(&config.connection, postgres::NoTls).unwrap();
    let store = PostgresStore::new(config).unwrap();
    let identifier = unique("oob");
    client
        .batch_execute(&format!("CREATE TABLE \"prom_data\".\"{identifier}\" (x INTEGER)"))
        .unwrap();
    assert!(!store.check_permission(&RelationName::data(identifier.as_str())).unwrap());

    let group = unique("oob_group");
    let fence = store.try_acquire_lease(&group, "a", 0, i64::MAX / 2).unwrap().unwrap().fence();
    store
        .create_metric_relations(
            &fence,
            &RelationName::data(identifier.as_str()),
            &RelationName::series(identifier.as_str()),
        )
        .unwrap();
    assert!(!store.check_permission(&RelationName::data(identifier.as_str())).unwrap());
    assert!(store.check_permission(&RelationName::series(identifier.as_str())).unwrap());
}

#[test]
fn live_provision_lock_is_exclusive() {
    let Some(config) = live_config() else {
        return;
    };
    let store = PostgresStore::new(config.clone()).unwrap();
    let other = PostgresStore::new(config).unwrap();
    let key = unique("metric");
    assert!(store.acquire_provision_lock(&key, "a", Duration::from_millis(100)).unwrap());
    assert!(!other.acquire_provision_lock(&key, "b", Duration::from_millis(50)).unwrap());
    store.release_provision_lock(&key, "a").unwrap();
    assert!(other.acquire_provision_lock(&key, "b", Duration::from_millis(100)).unwrap());
    other.release_provision_lock(&key, "b").unwrap();
}

#[test]
fn live_adapter_round_trip() {
    let Some(config) = live_config() else {
        return;
    };
    let store = Arc::new(PostgresStore::new(config).unwrap());
    let adapter = Adapter::new(
        Arc::clone(&store),
        AdapterConfig {
            cache: CatalogCacheConfig::default(),
            provisioner: ProvisionerConfig::default(),
            ingest: IngestConfig {
                retry: RetryPolicy::default(),
                default_timeout: None,
            },
            leader: LeaderConfig::new(unique("adapter"), "node-a"),
        },
        Arc::new(NoopMetrics),
        Arc::new(TracingCacheLogger),
        Arc::new(SystemClock),
    )
    .unwrap();
    adapter.arbiter().tick().unwrap();

    let metric = unique("live_metric");
    let request = WriteRequest {
        timeseries: vec![TimeSeries {
            labels: vec![Label::new("__name__", metric.as_str()), Label::new("job", "x")],
            samples: vec![RawSample::new(1, f64::NAN), RawSample::new(2, -0.0)],
        }],
        metadata: Vec::new(),
    };
    let report = adapter.ingest(&RequestContext::new(), request).unwrap();
    assert_eq!(report.samples_inserted, 2);

    let name = MetricName::new(metric.as_str()).unwrap();
    let entry = store.get_metric(&name).unwrap().unwrap();
    assert!(entry.creation_completed);
    let read = adapter
        .read_series(&RequestContext::new(), &name, TimeRange::all())
        .unwrap();
    assert!(read[0].samples[0].value.is_nan());
    assert_eq!(read[0].samples[1].value.to_bits(), (-0.0_f64).to_bits());
    adapter.shutdown().unwrap();
}
