//! Config load validation tests for promstore-config.
// crates/promstore-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards (path, size, encoding, syntax).
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

use std::io::Write;
use std::path::Path;

use promstore_config::ConfigError;
use promstore_config::PromstoreConfig;
use promstore_config::StoreType;
use tempfile::NamedTempFile;

type TestResult = Result<(), String>;

fn assert_invalid(result: Result<PromstoreConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

fn write_config(contents: &[u8]) -> Result<NamedTempFile, String> {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(contents).map_err(|err| err.to_string())?;
    Ok(file)
}

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    assert_invalid(PromstoreConfig::load(Some(Path::new(&long_path))), "config path exceeds max length")
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    assert_invalid(
        PromstoreConfig::load(Some(Path::new(&long_component))),
        "config path component too long",
    )
}

#[test]
fn load_rejects_missing_file() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("absent.toml");
    assert_invalid(PromstoreConfig::load(Some(&path)), "config io error")
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let file = write_config(&vec![b'#'; 1_048_577])?;
    assert_invalid(PromstoreConfig::load(Some(file.path())), "config file exceeds size limit")
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let file = write_config(&[0xFF, 0xFE, 0xFF])?;
    assert_invalid(PromstoreConfig::load(Some(file.path())), "config file must be utf-8")
}

#[test]
fn load_rejects_malformed_toml() -> TestResult {
    let file = write_config(b"[cache\nmetric_capacity = 1")?;
    assert_invalid(PromstoreConfig::load(Some(file.path())), "config parse error")
}

#[test]
fn load_rejects_unknown_keys() -> TestResult {
    let file = write_config(b"[cache]\nmetric_capacty = 10\n")?;
    assert_invalid(PromstoreConfig::load(Some(file.path())), "config parse error")
}

#[test]
fn load_accepts_empty_file_with_defaults() -> TestResult {
    let file = write_config(b"")?;
    let config = PromstoreConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    if config.store.store_type != StoreType::Sqlite {
        return Err("default store should be sqlite".to_string());
    }
    if config.cache.metric_capacity != 10_000 || config.cache.series_capacity != 1_000_000 {
        return Err("cache defaults changed".to_string());
    }
    if !config.leader.campaign || config.leader.group_id != "promstore" {
        return Err("leader defaults changed".to_string());
    }
    Ok(())
}

#[test]
fn load_reads_full_document() -> TestResult {
    let file = write_config(
        br#"
[store]
type = "sqlite"
path = "data/promstore.db"
journal_mode = "delete"
pool_size = 4

[cache]
metric_capacity = 50
series_capacity = 500
ttl_seconds = 600

[provisioning]
lock_wait_ms = 500
lock_attempts = 5

[ingest]
max_store_attempts = 4
base_backoff_ms = 10
max_backoff_ms = 200
default_timeout_ms = 30000

[leader]
campaign = false
group_id = "east"
holder_id = "node-1"
lease_ttl_ms = 9000
renew_interval_ms = 3000
retry_interval_ms = 3000

[logging]
level = "warn"
format = "json"
"#,
    )?;
    let config = PromstoreConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    let adapter = config.adapter_config();
    if adapter.cache.metric_capacity != 50 || adapter.cache.ttl.map(|ttl| ttl.as_secs()) != Some(600)
    {
        return Err("cache section not applied".to_string());
    }
    if adapter.provisioner.lock_attempts != 5 || adapter.provisioner.lock_wait.as_millis() != 500 {
        return Err("provisioning section not applied".to_string());
    }
    if adapter.ingest.retry.max_attempts != 4
        || adapter.ingest.default_timeout.map(|timeout| timeout.as_secs()) != Some(30)
    {
        return Err("ingest section not applied".to_string());
    }
    if adapter.leader.campaign || adapter.leader.holder_id != "node-1" {
        return Err("leader section not applied".to_string());
    }
    let sqlite = config.store.sqlite().map_err(|err| err.to_string())?;
    if sqlite.pool_size != 4 || !sqlite.path.ends_with("promstore.db") {
        return Err("store section not applied".to_string());
    }
    Ok(())
}
