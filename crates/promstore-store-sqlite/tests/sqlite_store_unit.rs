// crates/promstore-store-sqlite/tests/sqlite_store_unit.rs
// ============================================================================
// Module: SQLite Store Unit Tests
// Description: Targeted tests for the SQLite catalog, sample, and lease store.
// Purpose: Validate path safety, schema versioning, fencing, ownership checks,
//          series stability, and value fidelity.
// ============================================================================

//! ## Overview
//! Unit-level tests for `SQLite` store invariants:
//! - Path safety checks (empty/component/directory rejection)
//! - Schema version validation on reopen
//! - Fence and lease compare-and-set behavior
//! - Relation ownership for out-of-band tables
//! - Series id stability across reopen and bit-exact sample values

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
    reason = "Test-only assertions and helpers are permitted."
)]

use std::path::Path;
use std::time::Duration;

use promstore_core::CatalogEntry;
use promstore_core::CatalogStore;
use promstore_core::Fence;
use promstore_core::FencingToken;
use promstore_core::LeaseStore;
use promstore_core::MetadataEntry;
use promstore_core::MetricName;
use promstore_core::MetricType;
use promstore_core::RelationName;
use promstore_core::Sample;
use promstore_core::SampleStore;
use promstore_core::SeriesKey;
use promstore_core::StoreError;
use promstore_core::TimeRange;
use promstore_store_sqlite::SqliteStore;
use promstore_store_sqlite::SqliteStoreConfig;
use promstore_store_sqlite::SqliteStoreError;
use rusqlite::Connection;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const GROUP: &str = "sqlite-tests";
const TTL_MS: i64 = 30_000;

fn open_store(path: &Path) -> SqliteStore {
    SqliteStore::open(SqliteStoreConfig::new(path)).unwrap()
}

fn temp_store() -> (TempDir, SqliteStore) {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir.path().join("promstore.db"));
    (dir, store)
}

fn lead(store: &SqliteStore, holder: &str, now_ms: i64) -> Fence {
    store.try_acquire_lease(GROUP, holder, now_ms, TTL_MS).unwrap().unwrap().fence()
}

fn provision(store: &SqliteStore, fence: &Fence, name: &str, identifier: &str) -> CatalogEntry {
    let data = RelationName::data(identifier);
    let series = RelationName::series(identifier);
    store.create_metric_relations(fence, &data, &series).unwrap();
    let entry = CatalogEntry::tentative(MetricName::new(name).unwrap(), data, series, 1);
    store.register_metric(fence, &entry).unwrap()
}

fn key(pairs: &[(&str, &str)]) -> SeriesKey {
    SeriesKey::from_pairs(pairs.iter().copied()).unwrap()
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

#[test]
fn empty_path_is_rejected() {
    let err = SqliteStore::open(SqliteStoreConfig::new("")).err().unwrap();
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

#[test]
fn directory_path_is_rejected() {
    let dir = TempDir::new().unwrap();
    let err = SqliteStore::open(SqliteStoreConfig::new(dir.path())).err().unwrap();
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

#[test]
fn overlong_component_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a".repeat(300));
    let err = SqliteStore::open(SqliteStoreConfig::new(path)).err().unwrap();
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

#[test]
fn zero_pool_size_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut config = SqliteStoreConfig::new(dir.path().join("promstore.db"));
    config.pool_size = 0;
    assert!(matches!(config.validate(), Err(SqliteStoreError::Invalid(_))));
}

#[test]
fn config_deserializes_with_defaults() {
    let config: SqliteStoreConfig =
        serde_json::from_str(r#"{"path": "/tmp/promstore.db", "journal_mode": "delete"}"#).unwrap();
    assert_eq!(config.pool_size, SqliteStoreConfig::new("x").pool_size);
    assert_eq!(config.principal, promstore_store_sqlite::DEFAULT_PRINCIPAL);
}

#[test]
fn unknown_schema_version_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("promstore.db");
    drop(open_store(&path));
    let connection = Connection::open(&path).unwrap();
    connection.execute("UPDATE store_meta SET version = 99", []).unwrap();
    drop(connection);
    let err = SqliteStore::open(SqliteStoreConfig::new(&path)).err().unwrap();
    assert!(matches!(err, SqliteStoreError::VersionMismatch(_)));
}

// ============================================================================
// SECTION: Leases and Fencing
// ============================================================================

#[test]
fn lease_follows_compare_and_set_rules() {
    let (_dir, store) = temp_store();
    let first = store.try_acquire_lease(GROUP, "a", 0, TTL_MS).unwrap().unwrap();
    assert_eq!(first.fencing_token, FencingToken::new(1));
    assert!(store.try_acquire_lease(GROUP, "b", 1_000, TTL_MS).unwrap().is_none());

    let renewed = store.renew_lease(&first, 10_000, TTL_MS).unwrap().unwrap();
    assert_eq!(renewed.fencing_token, first.fencing_token);
    assert_eq!(renewed.expires_at_ms, 40_000);

    let taken = store.try_acquire_lease(GROUP, "b", 40_000, TTL_MS).unwrap().unwrap();
    assert_eq!(taken.fencing_token, FencingToken::new(2));
    assert!(store.renew_lease(&renewed, 40_001, TTL_MS).unwrap().is_none());
    assert_eq!(store.current_lease(GROUP).unwrap(), Some(taken));
}

#[test]
fn released_lease_is_immediately_available() {
    let (_dir, store) = temp_store();
    let lease = store.try_acquire_lease(GROUP, "a", 0, TTL_MS).unwrap().unwrap();
    store.release_lease(&lease).unwrap();
    let next = store.try_acquire_lease(GROUP, "b", 1, TTL_MS).unwrap().unwrap();
    assert_eq!(next.fencing_token, FencingToken::new(2));
}

#[test]
fn stale_fence_cannot_mutate_schema() {
    let (_dir, store) = temp_store();
    let stale = lead(&store, "a", 0);
    let _current = lead(&store, "b", TTL_MS + 1);
    let err = store
        .create_metric_relations(&stale, &RelationName::data("cpu"), &RelationName::series("cpu"))
        .unwrap_err();
    assert!(matches!(err, StoreError::FenceRejected(_)));
    assert!(!store.check_permission(&RelationName::data("cpu")).unwrap());
}

#[test]
fn provision_lock_excludes_other_owners() {
    let (_dir, store) = temp_store();
    assert!(store.acquire_provision_lock("metric:cpu", "a", Duration::from_millis(50)).unwrap());
    assert!(store.acquire_provision_lock("metric:cpu", "a", Duration::from_millis(50)).unwrap());
    assert!(!store.acquire_provision_lock("metric:cpu", "b", Duration::from_millis(30)).unwrap());
    store.release_provision_lock("metric:cpu", "a").unwrap();
    assert!(store.acquire_provision_lock("metric:cpu", "b", Duration::from_millis(50)).unwrap());
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

#[test]
fn created_relations_pass_permission_checks() {
    let (_dir, store) = temp_store();
    let fence = lead(&store, "a", 0);
    let entry = provision(&store, &fence, "cpu_seconds", "cpu_seconds");
    assert!(store.check_permission(&entry.data_relation).unwrap());
    assert!(store.check_permission(&entry.series_relation).unwrap());
    assert!(!store.check_permission(&RelationName::data("missing")).unwrap());
}

#[test]
fn out_of_band_table_is_not_owned() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("promstore.db");
    let store = open_store(&path);
    let connection = Connection::open(&path).unwrap();
    connection.execute_batch(r#"CREATE TABLE "prom_data.rogue" (x INTEGER);"#).unwrap();
    drop(connection);

    let fence = lead(&store, "a", 0);
    store
        .create_metric_relations(&fence, &RelationName::data("rogue"), &RelationName::series("rogue"))
        .unwrap();
    assert!(!store.check_permission(&RelationName::data("rogue")).unwrap());
    assert!(store.check_permission(&RelationName::series("rogue")).unwrap());
}

#[test]
fn registration_adopts_existing_entry() {
    let (_dir, store) = temp_store();
    let fence = lead(&store, "a", 0);
    let first = provision(&store, &fence, "http_requests", "http_requests");
    let again = CatalogEntry::tentative(
        MetricName::new("http_requests").unwrap(),
        RelationName::data("other"),
        RelationName::series("other"),
        99,
    );
    assert_eq!(store.register_metric(&fence, &again).unwrap(), first);
    assert_eq!(store.load_catalog().unwrap(), vec![first]);
}

#[test]
fn identifier_ownership_ignores_case() {
    let (_dir, store) = temp_store();
    let fence = lead(&store, "a", 0);
    provision(&store, &fence, "Latency", "Latency");
    let owner = store.identifier_owner("latency").unwrap();
    assert_eq!(owner, Some(MetricName::new("Latency").unwrap()));

    let clash = CatalogEntry::tentative(
        MetricName::new("latency").unwrap(),
        RelationName::data("LATENCY"),
        RelationName::series("LATENCY"),
        1,
    );
    let err = store.register_metric(&fence, &clash).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[test]
fn finalize_completes_pending_entries_once() {
    let (_dir, store) = temp_store();
    let fence = lead(&store, "a", 0);
    provision(&store, &fence, "a_metric", "a_metric");
    provision(&store, &fence, "b_metric", "b_metric");
    let finalized = store.finalize_metrics(&fence).unwrap();
    assert_eq!(finalized.len(), 2);
    assert!(store.finalize_metrics(&fence).unwrap().is_empty());
    assert!(store.load_catalog().unwrap().iter().all(|entry| entry.creation_completed));
}

// ============================================================================
// SECTION: Series and Samples
// ============================================================================

#[test]
fn series_ids_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("promstore.db");
    let store = open_store(&path);
    let fence = lead(&store, "a", 0);
    let entry = provision(&store, &fence, "disk_free", "disk_free");
    let sda = key(&[("device", "sda")]);
    let id = store.get_or_create_series(&fence, &entry, &sda).unwrap();
    assert_eq!(store.get_or_create_series(&fence, &entry, &sda).unwrap(), id);
    drop(store);

    let reopened = open_store(&path);
    assert_eq!(reopened.get_series(&entry, &sda).unwrap(), Some(id));
    let fence = lead(&reopened, "a", 1);
    let sdb = reopened.get_or_create_series(&fence, &entry, &key(&[("device", "sdb")])).unwrap();
    assert!(sdb.get() > id.get());
    let listed = reopened.list_series(&entry).unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0], (id, sda));
}

#[test]
fn sample_values_round_trip_bit_exact() {
    let (_dir, store) = temp_store();
    let fence = lead(&store, "a", 0);
    let entry = provision(&store, &fence, "odd_values", "odd_values");
    let series_id = store.get_or_create_series(&fence, &entry, &key(&[("job", "x")])).unwrap();
    let values = [f64::NAN, -0.0, f64::INFINITY, f64::NEG_INFINITY, 1.5];
    let samples: Vec<Sample> = values
        .iter()
        .zip(1_i64 ..)
        .map(|(value, timestamp_ms)| Sample {
            series_id,
            timestamp_ms,
            value: *value,
        })
        .collect();
    assert_eq!(store.insert_samples(&entry, &samples).unwrap(), 5);

    let read = store.read_samples(&entry, TimeRange::all()).unwrap();
    let bits: Vec<u64> = read.iter().map(|sample| sample.value.to_bits()).collect();
    let expected: Vec<u64> = values.iter().map(|value| value.to_bits()).collect();
    assert_eq!(bits, expected);

    let window = store.read_samples(&entry, TimeRange::new(2, 3).unwrap()).unwrap();
    assert_eq!(window.len(), 2);
}

#[test]
fn inserting_into_missing_relation_is_not_found() {
    let (_dir, store) = temp_store();
    let entry = CatalogEntry::tentative(
        MetricName::new("ghost").unwrap(),
        RelationName::data("ghost"),
        RelationName::series("ghost"),
        1,
    );
    let err = store.insert_samples(&entry, &[]).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn metadata_upsert_replaces_previous_values() {
    let (_dir, store) = temp_store();
    let mut entry = MetadataEntry {
        metric_name: MetricName::new("jobs_total").unwrap(),
        metric_type: MetricType::Counter,
        unit: String::new(),
        help: "Jobs.".to_string(),
    };
    store.upsert_metadata(std::slice::from_ref(&entry)).unwrap();
    entry.help = "Jobs processed.".to_string();
    store.upsert_metadata(std::slice::from_ref(&entry)).unwrap();
    assert_eq!(store.get_metadata(&entry.metric_name).unwrap(), Some(entry));
}
