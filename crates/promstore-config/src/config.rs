// crates/promstore-config/src/config.rs
// ============================================================================
// Module: Promstore Configuration
// Description: Configuration loading and validation for Promstore.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: promstore-core, promstore-store-postgres, promstore-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section is optional and falls back to the runtime defaults, but a
//! value that is present must be in range: missing or invalid configuration
//! fails closed rather than being silently corrected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use promstore_core::AdapterConfig;
use promstore_core::CatalogCacheConfig;
use promstore_core::IngestConfig;
use promstore_core::LeaderConfig;
use promstore_core::ProvisionerConfig;
use promstore_core::RetryPolicy;
use promstore_core::runtime::DEFAULT_GROUP_ID;
use promstore_store_postgres::PostgresStoreConfig;
use promstore_store_sqlite::SqliteJournalMode;
use promstore_store_sqlite::SqliteStoreConfig;
use promstore_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "promstore.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "PROMSTORE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of group and holder identifiers.
pub(crate) const MAX_IDENTITY_LENGTH: usize = 255;
/// Maximum store attempts per metric group.
pub(crate) const MAX_STORE_ATTEMPTS: u32 = 16;
/// Maximum provisioning lock attempts.
pub(crate) const MAX_LOCK_ATTEMPTS: u32 = 64;
/// Maximum interval or timeout accepted anywhere, in milliseconds.
pub(crate) const MAX_INTERVAL_MS: u64 = 3_600_000;
/// Default `SQLite` database path.
const DEFAULT_SQLITE_PATH: &str = "promstore.db";
/// Default `SQLite` pool size.
const DEFAULT_SQLITE_POOL_SIZE: u32 = 8;
/// Default `SQLite` busy timeout.
const DEFAULT_SQLITE_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default pool wait for either backend.
const DEFAULT_POOL_WAIT_MS: u64 = 2_000;
/// Default Postgres pool size.
const DEFAULT_POSTGRES_MAX_CONNECTIONS: u32 = 16;
/// Default Postgres connect timeout.
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
/// Default Postgres statement timeout.
const DEFAULT_STATEMENT_TIMEOUT_MS: u64 = 30_000;

// ============================================================================
// SECTION: Root
// ============================================================================

/// Root Promstore configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PromstoreConfig {
    /// Backing store selection and settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Catalog cache sizing.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Provisioning lock behavior.
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
    /// Ingestion retry and timeout behavior.
    #[serde(default)]
    pub ingest: IngestSettings,
    /// Leader election settings.
    #[serde(default)]
    pub leader: LeaderSettings,
    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PromstoreConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// The path is `path` when given, else `PROMSTORE_CONFIG`, else
    /// `promstore.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.cache.validate()?;
        self.provisioning.validate()?;
        self.ingest.validate()?;
        self.leader.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Builds the runtime adapter configuration.
    #[must_use]
    pub fn adapter_config(&self) -> AdapterConfig {
        AdapterConfig {
            cache: self.cache.to_runtime(),
            provisioner: self.provisioning.to_runtime(),
            ingest: self.ingest.to_runtime(),
            leader: self.leader.to_runtime(),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Backing store type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Process-local store; state is lost on exit.
    Memory,
    /// Embedded `SQLite` database file.
    #[default]
    Sqlite,
    /// `PostgreSQL` server.
    Postgres,
}

/// Backing store configuration.
///
/// # Invariants
/// - `path` is set only for `sqlite`; `connection` is set only for `postgres`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path; `promstore.db` when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// `SQLite` busy timeout in milliseconds.
    #[serde(default = "default_sqlite_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// `SQLite` pool size.
    #[serde(default = "default_sqlite_pool_size")]
    pub pool_size: u32,
    /// Owner recorded for relations the `SQLite` store creates.
    #[serde(default)]
    pub principal: Option<String>,
    /// Postgres connection string.
    #[serde(default)]
    pub connection: Option<String>,
    /// Postgres pool size.
    #[serde(default = "default_postgres_max_connections")]
    pub max_connections: u32,
    /// Postgres connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Postgres statement timeout in milliseconds.
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,
    /// Wait for a pooled connection in milliseconds.
    #[serde(default = "default_pool_wait_ms")]
    pub pool_wait_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_sqlite_busy_timeout_ms(),
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
            pool_size: default_sqlite_pool_size(),
            principal: None,
            connection: None,
            max_connections: default_postgres_max_connections(),
            connect_timeout_ms: default_connect_timeout_ms(),
            statement_timeout_ms: default_statement_timeout_ms(),
            pool_wait_ms: default_pool_wait_ms(),
        }
    }
}

impl StoreConfig {
    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() || self.connection.is_some() {
                    return Err(ConfigError::Invalid(
                        "memory store must not set path or connection".to_string(),
                    ));
                }
                Ok(())
            }
            StoreType::Sqlite => {
                if self.connection.is_some() {
                    return Err(ConfigError::Invalid(
                        "sqlite store must not set connection".to_string(),
                    ));
                }
                self.sqlite()?
                    .validate()
                    .map_err(|err| ConfigError::Invalid(format!("store: {err}")))
            }
            StoreType::Postgres => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid(
                        "postgres store must not set path".to_string(),
                    ));
                }
                check_interval("store.connect_timeout_ms", self.connect_timeout_ms)?;
                check_interval("store.statement_timeout_ms", self.statement_timeout_ms)?;
                self.postgres()?
                    .validate()
                    .map_err(|err| ConfigError::Invalid(format!("store: {err}")))
            }
        }
    }

    /// Builds the `SQLite` store configuration, defaulting the path to
    /// `promstore.db`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the path is empty or too long.
    pub fn sqlite(&self) -> Result<SqliteStoreConfig, ConfigError> {
        let path = self.path.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_SQLITE_PATH));
        validate_path_string("store.path", &path.to_string_lossy())?;
        let mut config = SqliteStoreConfig::new(path);
        config.busy_timeout_ms = self.busy_timeout_ms;
        config.journal_mode = self.journal_mode;
        config.sync_mode = self.sync_mode;
        config.pool_size = self.pool_size;
        config.pool_wait_ms = self.pool_wait_ms;
        if let Some(principal) = &self.principal {
            config.principal.clone_from(principal);
        }
        Ok(config)
    }

    /// Builds the Postgres store configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when no connection string is configured.
    pub fn postgres(&self) -> Result<PostgresStoreConfig, ConfigError> {
        let Some(connection) = &self.connection else {
            return Err(ConfigError::Invalid("postgres store requires connection".to_string()));
        };
        Ok(PostgresStoreConfig {
            connection: connection.clone(),
            max_connections: self.max_connections,
            connect_timeout_ms: self.connect_timeout_ms,
            statement_timeout_ms: self.statement_timeout_ms,
            pool_wait_ms: self.pool_wait_ms,
        })
    }
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Catalog cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Maximum cached metrics.
    #[serde(default = "default_metric_capacity")]
    pub metric_capacity: u64,
    /// Maximum cached series.
    #[serde(default = "default_series_capacity")]
    pub series_capacity: u64,
    /// Optional time-to-live for cached entries, in seconds.
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            metric_capacity: default_metric_capacity(),
            series_capacity: default_series_capacity(),
            ttl_seconds: None,
        }
    }
}

impl CacheConfig {
    /// Validates cache configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.metric_capacity == 0 {
            return Err(ConfigError::Invalid("cache.metric_capacity must be > 0".to_string()));
        }
        if self.series_capacity == 0 {
            return Err(ConfigError::Invalid("cache.series_capacity must be > 0".to_string()));
        }
        if self.ttl_seconds == Some(0) {
            return Err(ConfigError::Invalid("cache.ttl_seconds must be > 0 when set".to_string()));
        }
        Ok(())
    }

    /// Builds the runtime cache configuration.
    fn to_runtime(&self) -> CatalogCacheConfig {
        CatalogCacheConfig {
            metric_capacity: self.metric_capacity,
            series_capacity: self.series_capacity,
            ttl: self.ttl_seconds.map(Duration::from_secs),
        }
    }
}

// ============================================================================
// SECTION: Provisioning
// ============================================================================

/// Provisioning lock configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvisioningConfig {
    /// Wait per lock attempt in milliseconds.
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,
    /// Lock attempts before the metric fails.
    #[serde(default = "default_lock_attempts")]
    pub lock_attempts: u32,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            lock_wait_ms: default_lock_wait_ms(),
            lock_attempts: default_lock_attempts(),
        }
    }
}

impl ProvisioningConfig {
    /// Validates provisioning configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        check_interval("provisioning.lock_wait_ms", self.lock_wait_ms)?;
        if self.lock_attempts == 0 || self.lock_attempts > MAX_LOCK_ATTEMPTS {
            return Err(ConfigError::Invalid(format!(
                "provisioning.lock_attempts must be between 1 and {MAX_LOCK_ATTEMPTS}"
            )));
        }
        Ok(())
    }

    /// Builds the runtime provisioner configuration.
    const fn to_runtime(&self) -> ProvisionerConfig {
        ProvisionerConfig {
            lock_wait: Duration::from_millis(self.lock_wait_ms),
            lock_attempts: self.lock_attempts,
        }
    }
}

// ============================================================================
// SECTION: Ingest
// ============================================================================

/// Ingestion configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestSettings {
    /// Store attempts per metric group, including the first.
    #[serde(default = "default_max_store_attempts")]
    pub max_store_attempts: u32,
    /// Backoff before the second attempt in milliseconds.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    /// Upper bound for a single backoff in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Deadline applied to requests that carry none, in milliseconds.
    #[serde(default)]
    pub default_timeout_ms: Option<u64>,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            max_store_attempts: default_max_store_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            default_timeout_ms: None,
        }
    }
}

impl IngestSettings {
    /// Validates ingestion configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_store_attempts == 0 || self.max_store_attempts > MAX_STORE_ATTEMPTS {
            return Err(ConfigError::Invalid(format!(
                "ingest.max_store_attempts must be between 1 and {MAX_STORE_ATTEMPTS}"
            )));
        }
        check_interval("ingest.base_backoff_ms", self.base_backoff_ms)?;
        check_interval("ingest.max_backoff_ms", self.max_backoff_ms)?;
        if self.base_backoff_ms > self.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "ingest.base_backoff_ms must not exceed ingest.max_backoff_ms".to_string(),
            ));
        }
        if let Some(timeout) = self.default_timeout_ms {
            check_interval("ingest.default_timeout_ms", timeout)?;
        }
        Ok(())
    }

    /// Builds the runtime ingest configuration.
    fn to_runtime(&self) -> IngestConfig {
        IngestConfig {
            retry: RetryPolicy {
                max_attempts: self.max_store_attempts,
                base_backoff: Duration::from_millis(self.base_backoff_ms),
                max_backoff: Duration::from_millis(self.max_backoff_ms),
            },
            default_timeout: self.default_timeout_ms.map(Duration::from_millis),
        }
    }
}

// ============================================================================
// SECTION: Leader
// ============================================================================

/// Leader election configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeaderSettings {
    /// Whether this instance competes for leadership.
    #[serde(default = "default_campaign")]
    pub campaign: bool,
    /// Lease group shared by redundant instances.
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// Holder identity; derived from host name and process id when absent.
    #[serde(default)]
    pub holder_id: Option<String>,
    /// Lease time-to-live in milliseconds.
    #[serde(default = "default_lease_ttl_ms")]
    pub lease_ttl_ms: u64,
    /// Renew cadence while leading, in milliseconds.
    #[serde(default = "default_renew_interval_ms")]
    pub renew_interval_ms: u64,
    /// Acquisition cadence while not leading, in milliseconds.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

impl Default for LeaderSettings {
    fn default() -> Self {
        Self {
            campaign: default_campaign(),
            group_id: default_group_id(),
            holder_id: None,
            lease_ttl_ms: default_lease_ttl_ms(),
            renew_interval_ms: default_renew_interval_ms(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

impl LeaderSettings {
    /// Validates leader configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        check_identity("leader.group_id", &self.group_id)?;
        if let Some(holder) = &self.holder_id {
            check_identity("leader.holder_id", holder)?;
        }
        check_interval("leader.lease_ttl_ms", self.lease_ttl_ms)?;
        self.to_runtime()
            .validate()
            .map_err(|err| ConfigError::Invalid(format!("leader: {err}")))
    }

    /// Returns the configured holder id or one derived from the host.
    #[must_use]
    pub fn resolved_holder_id(&self) -> String {
        self.holder_id.clone().unwrap_or_else(default_holder_id)
    }

    /// Builds the runtime leader configuration.
    fn to_runtime(&self) -> LeaderConfig {
        LeaderConfig {
            group_id: self.group_id.clone(),
            holder_id: self.resolved_holder_id(),
            lease_ttl: Duration::from_millis(self.lease_ttl_ms),
            renew_interval: Duration::from_millis(self.renew_interval_ms),
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            campaign: self.campaign,
        }
    }
}

/// Derives a holder id from `HOSTNAME` and the process id.
fn default_holder_id() -> String {
    let host = env::var("HOSTNAME")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "promstore".to_string());
    format!("{host}-{}", std::process::id())
}

// ============================================================================
// SECTION: Logging
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Minimum level: `debug`, `info`, `warn`, or `error`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Validates logging configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        crate::logging::parse_level(&self.level).map(|_| ())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Rejects zero or oversized intervals.
fn check_interval(field: &str, value_ms: u64) -> Result<(), ConfigError> {
    if value_ms == 0 || value_ms > MAX_INTERVAL_MS {
        return Err(ConfigError::Invalid(format!(
            "{field} must be between 1 and {MAX_INTERVAL_MS}"
        )));
    }
    Ok(())
}

/// Rejects empty, padded, or oversized identities.
fn check_identity(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if value.trim() != value {
        return Err(ConfigError::Invalid(format!("{field} must not have surrounding whitespace")));
    }
    if value.len() > MAX_IDENTITY_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    Ok(())
}

/// Default `SQLite` busy timeout.
const fn default_sqlite_busy_timeout_ms() -> u64 {
    DEFAULT_SQLITE_BUSY_TIMEOUT_MS
}

/// Default `SQLite` pool size.
const fn default_sqlite_pool_size() -> u32 {
    DEFAULT_SQLITE_POOL_SIZE
}

/// Default Postgres pool size.
const fn default_postgres_max_connections() -> u32 {
    DEFAULT_POSTGRES_MAX_CONNECTIONS
}

/// Default Postgres connect timeout.
const fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

/// Default Postgres statement timeout.
const fn default_statement_timeout_ms() -> u64 {
    DEFAULT_STATEMENT_TIMEOUT_MS
}

/// Default pool wait.
const fn default_pool_wait_ms() -> u64 {
    DEFAULT_POOL_WAIT_MS
}

/// Default cached metric capacity.
const fn default_metric_capacity() -> u64 {
    10_000
}

/// Default cached series capacity.
const fn default_series_capacity() -> u64 {
    1_000_000
}

/// Default provisioning lock wait.
const fn default_lock_wait_ms() -> u64 {
    2_000
}

/// Default provisioning lock attempts.
const fn default_lock_attempts() -> u32 {
    3
}

/// Default store attempts.
const fn default_max_store_attempts() -> u32 {
    3
}

/// Default base backoff.
const fn default_base_backoff_ms() -> u64 {
    25
}

/// Default maximum backoff.
const fn default_max_backoff_ms() -> u64 {
    1_000
}

/// Instances campaign unless told otherwise.
const fn default_campaign() -> bool {
    true
}

/// Default lease group.
fn default_group_id() -> String {
    DEFAULT_GROUP_ID.to_string()
}

/// Default lease TTL.
const fn default_lease_ttl_ms() -> u64 {
    15_000
}

/// Default renew cadence.
const fn default_renew_interval_ms() -> u64 {
    5_000
}

/// Default retry cadence.
const fn default_retry_interval_ms() -> u64 {
    5_000
}

/// Default log level.
fn default_log_level() -> String {
    "info".to_string()
}
