//! Bootstrap wiring tests for promstore-config.
// crates/promstore-config/tests/bootstrap_wiring.rs
// =============================================================================
// Module: Bootstrap Wiring Tests
// Description: Build adapters from configuration and drive them end to end.
// Purpose: Ensure configuration selects and opens the intended backend.
// =============================================================================

use promstore_config::PromstoreAdapter;
use promstore_config::PromstoreConfig;
use promstore_config::open_adapter;
use promstore_core::Label;
use promstore_core::LeaderState;
use promstore_core::Leadership;
use promstore_core::MetricName;
use promstore_core::RawSample;
use promstore_core::RequestContext;
use promstore_core::TimeRange;
use promstore_core::TimeSeries;
use promstore_core::WriteRequest;

type TestResult = Result<(), String>;

fn write_one(adapter: &PromstoreAdapter, metric: &str) -> TestResult {
    let request = WriteRequest {
        timeseries: vec![TimeSeries {
            labels: vec![Label::new("__name__", metric), Label::new("job", "bootstrap")],
            samples: vec![RawSample::new(1_000, 1.5)],
        }],
        metadata: Vec::new(),
    };
    let report = adapter.ingest(&RequestContext::new(), request).map_err(|err| err.to_string())?;
    if report.samples_inserted != 1 {
        return Err(format!("expected one sample inserted, got {}", report.samples_inserted));
    }
    let name = MetricName::new(metric).map_err(|err| err.to_string())?;
    let read = adapter
        .read_series(&RequestContext::new(), &name, TimeRange::all())
        .map_err(|err| err.to_string())?;
    if read.len() != 1 {
        return Err(format!("expected one series, got {}", read.len()));
    }
    Ok(())
}

fn wait_for_leadership(adapter: &PromstoreAdapter) -> TestResult {
    for _ in 0 .. 200 {
        if adapter.leader_state() == LeaderState::Leader {
            return Ok(());
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    Err("adapter never became leader".to_string())
}

#[test]
fn memory_backend_ingests_after_start() -> TestResult {
    let config = PromstoreConfig::from_toml("[store]\ntype = \"memory\"\n")
        .map_err(|err| err.to_string())?;
    let adapter = open_adapter(&config).map_err(|err| err.to_string())?;
    if adapter.backend() != "memory" {
        return Err("wrong backend selected".to_string());
    }
    adapter.start().map_err(|err| err.to_string())?;
    wait_for_leadership(&adapter)?;
    write_one(&adapter, "bootstrap_memory")?;
    adapter.shutdown().map_err(|err| err.to_string())
}

#[test]
fn sqlite_backend_opens_configured_path() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("nested").join("promstore.db");
    let toml = format!("[store]\ntype = \"sqlite\"\npath = '{}'\n", path.to_string_lossy());
    let config = PromstoreConfig::from_toml(&toml).map_err(|err| err.to_string())?;
    let adapter = open_adapter(&config).map_err(|err| err.to_string())?;
    if adapter.backend() != "sqlite" {
        return Err("wrong backend selected".to_string());
    }
    adapter.start().map_err(|err| err.to_string())?;
    wait_for_leadership(&adapter)?;
    write_one(&adapter, "bootstrap_sqlite")?;
    adapter.shutdown().map_err(|err| err.to_string())?;
    if path.exists() { Ok(()) } else { Err("database file was not created".to_string()) }
}

#[test]
fn wrapper_exposes_leadership_and_catalog_operations() -> TestResult {
    let config = PromstoreConfig::from_toml("[store]\ntype = \"memory\"\n")
        .map_err(|err| err.to_string())?;
    let adapter = open_adapter(&config).map_err(|err| err.to_string())?;
    let leadership = adapter.subscribe();
    if adapter.is_leading() || *leadership.borrow() != Leadership::NotLeading {
        return Err("adapter reported leadership before start".to_string());
    }
    let name = MetricName::new("bootstrap_wrapper").map_err(|err| err.to_string())?;
    if adapter.resolve_for_read(&name).map_err(|err| err.to_string())?.is_some() {
        return Err("unknown metric resolved for read".to_string());
    }

    adapter.start().map_err(|err| err.to_string())?;
    wait_for_leadership(&adapter)?;
    if !adapter.is_leading() || *leadership.borrow() != Leadership::Leading {
        return Err("leadership was not published to subscribers".to_string());
    }
    write_one(&adapter, "bootstrap_wrapper")?;
    if adapter.resolve_for_read(&name).map_err(|err| err.to_string())?.is_none() {
        return Err("provisioned metric did not resolve for read".to_string());
    }
    let finalized =
        adapter.complete_metric_creation(&RequestContext::new()).map_err(|err| err.to_string())?;
    if !finalized.is_empty() {
        return Err(format!("ingest left {} metric(s) unfinalized", finalized.len()));
    }
    adapter.shutdown().map_err(|err| err.to_string())
}
