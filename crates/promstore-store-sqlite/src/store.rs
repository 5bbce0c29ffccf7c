// crates/promstore-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Promstore Store
// Description: Durable catalog, sample, and lease store backed by SQLite.
// Purpose: Implement the Promstore store traits over a pooled SQLite database.
// Dependencies: promstore-core, r2d2, rusqlite, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! Schema mutations (relation creation, catalog registration, series
//! insertion, finalization) run in `IMMEDIATE` transactions that first compare
//! the presented fence against the lease row. Relations the store creates are
//! recorded in `"_prom_catalog.relation_owner"` under the configured
//! principal; a table without that record (created out of band) never passes
//! a permission check.
//!
//! `SQLite` folds identifier case, so catalog lookups by relation identifier
//! are case-insensitive. Sample values are stored twice: as `REAL` for ad-hoc
//! inspection and as their IEEE-754 bit pattern, which is what reads use,
//! because `SQLite` turns NaN into NULL.
//! Security posture: database contents are untrusted and are validated when
//! mapped back into core types.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use promstore_core::CatalogEntry;
use promstore_core::CatalogStore;
use promstore_core::Fence;
use promstore_core::FencingToken;
use promstore_core::LeaderLease;
use promstore_core::LeaseStore;
use promstore_core::MetadataEntry;
use promstore_core::MetricName;
use promstore_core::MetricType;
use promstore_core::RelationName;
use promstore_core::Sample;
use promstore_core::SampleStore;
use promstore_core::SeriesId;
use promstore_core::SeriesKey;
use promstore_core::StoreError;
use promstore_core::TimeRange;
use promstore_core::runtime::sanitize::quote_ident;
use r2d2::Pool;
use r2d2::PooledConnection;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;

use crate::pool::SqliteConnectionManager;
use crate::pool::SqliteJournalMode;
use crate::pool::SqliteSyncMode;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default connection pool size.
const DEFAULT_POOL_SIZE: u32 = 8;
/// Default wait for a pooled connection in milliseconds.
const DEFAULT_POOL_WAIT_MS: u64 = 2_000;
/// Principal recorded as owner of relations this store creates.
pub const DEFAULT_PRINCIPAL: &str = "promstore";
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Poll cadence while waiting for a provisioning lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Provisioning locks older than this are presumed abandoned.
const LOCK_STALE_AFTER_MS: i64 = 60_000;

/// Catalog table.
const METRIC_TABLE: &str = "\"_prom_catalog.metric\"";
/// Relation ownership table.
const OWNER_TABLE: &str = "\"_prom_catalog.relation_owner\"";
/// Provisioning lock table.
const LOCK_TABLE: &str = "\"_prom_catalog.provision_lock\"";
/// Leader lease table.
const LEASE_TABLE: &str = "\"_prom_catalog.leader_lease\"";
/// Metric metadata table.
const METADATA_TABLE: &str = "\"_prom_catalog.metadata\"";
/// Columns selected for catalog rows.
const METRIC_COLUMNS: &str = "metric_name, data_namespace, data_identifier, series_namespace, \
                              series_identifier, created_at, creation_completed";

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for the `SQLite` store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `pool_size`, `pool_wait_ms`, and `busy_timeout_ms` are greater than zero.
/// - `principal` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Maximum pooled connections.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// Wait for a pooled connection before reporting exhaustion (ms).
    #[serde(default = "default_pool_wait_ms")]
    pub pool_wait_ms: u64,
    /// Owner recorded for relations this store creates.
    #[serde(default = "default_principal")]
    pub principal: String,
}

impl SqliteStoreConfig {
    /// Creates a configuration with default settings for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
            pool_size: DEFAULT_POOL_SIZE,
            pool_wait_ms: DEFAULT_POOL_WAIT_MS,
            principal: default_principal(),
        }
    }

    /// Validates path and limit invariants.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when an invariant does not hold.
    pub fn validate(&self) -> Result<(), SqliteStoreError> {
        validate_store_path(&self.path)?;
        if self.busy_timeout_ms == 0 {
            return Err(SqliteStoreError::Invalid(
                "busy_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.pool_size == 0 {
            return Err(SqliteStoreError::Invalid("pool_size must be greater than zero".to_string()));
        }
        if self.pool_wait_ms == 0 {
            return Err(SqliteStoreError::Invalid(
                "pool_wait_ms must be greater than zero".to_string(),
            ));
        }
        if self.principal.trim().is_empty() {
            return Err(SqliteStoreError::Invalid("principal must be non-empty".to_string()));
        }
        Ok(())
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default connection pool size.
const fn default_pool_size() -> u32 {
    DEFAULT_POOL_SIZE
}

/// Returns the default pool wait in milliseconds.
const fn default_pool_wait_ms() -> u64 {
    DEFAULT_POOL_WAIT_MS
}

/// Returns the default relation owner.
fn default_principal() -> String {
    DEFAULT_PRINCIPAL.to_string()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding label values or sample payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Database busy or locked.
    #[error("sqlite store busy: {0}")]
    Busy(String),
    /// Constraint violation from a concurrent writer.
    #[error("sqlite store conflict: {0}")]
    Conflict(String),
    /// Connection pool exhausted.
    #[error("sqlite store connections exhausted: {message}")]
    Exhausted {
        /// Failure detail.
        message: String,
        /// Suggested retry delay in milliseconds.
        retry_after_ms: u64,
    },
    /// Presented fence does not match the lease row.
    #[error("sqlite store fence rejected: {0}")]
    FenceRejected(String),
    /// Referenced table or row is missing.
    #[error("sqlite store not found: {0}")]
    NotFound(String),
    /// Stored data failed validation.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid configuration or input.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Busy(message) => Self::Busy(message),
            SqliteStoreError::Conflict(message) => Self::Conflict(message),
            SqliteStoreError::Exhausted {
                message,
                retry_after_ms,
            } => Self::Exhausted {
                message,
                retry_after_ms,
            },
            SqliteStoreError::FenceRejected(message) => Self::FenceRejected(message),
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Classifies a `rusqlite` error.
fn db_error(err: rusqlite::Error) -> SqliteStoreError {
    let message = err.to_string();
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => SqliteStoreError::Busy(message),
        Some(ErrorCode::ConstraintViolation) => SqliteStoreError::Conflict(message),
        _ if message.contains("no such table") => SqliteStoreError::NotFound(message),
        _ => SqliteStoreError::Db(message),
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed Promstore store.
///
/// # Invariants
/// - Every schema mutation re-checks the fence inside its transaction.
/// - Series ids come from `AUTOINCREMENT` and are never reused.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Connection pool.
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    /// Opens the store, creating the database and catalog tables if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the configuration is invalid or the
    /// database cannot be opened or initialized.
    pub fn open(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        config.validate()?;
        ensure_parent_dir(&config.path)?;
        let manager = SqliteConnectionManager {
            path: config.path.clone(),
            journal_mode: config.journal_mode,
            sync_mode: config.sync_mode,
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
        };
        let pool = Pool::builder()
            .max_size(config.pool_size)
            .min_idle(Some(1))
            .connection_timeout(Duration::from_millis(config.pool_wait_ms))
            .build(manager)
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let store = Self {
            config,
            pool,
        };
        let mut connection = store.connection()?;
        initialize_schema(&mut connection)?;
        tracing::info!(path = %store.config.path.display(), "sqlite store opened");
        Ok(store)
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Checks out a pooled connection.
    fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>, SqliteStoreError> {
        self.pool.get().map_err(|err| SqliteStoreError::Exhausted {
            message: err.to_string(),
            retry_after_ms: self.config.pool_wait_ms,
        })
    }

    /// Runs `body` inside an `IMMEDIATE` transaction.
    fn with_write_tx<T>(
        &self,
        body: impl FnOnce(&Connection) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let mut connection = self.connection()?;
        let tx =
            connection.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_error)?;
        let value = body(&tx)?;
        tx.commit().map_err(db_error)?;
        Ok(value)
    }

    /// Runs `body` inside a fenced `IMMEDIATE` transaction.
    fn with_fenced_tx<T>(
        &self,
        fence: &Fence,
        body: impl FnOnce(&Connection) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        self.with_write_tx(|tx| {
            check_fence(tx, fence)?;
            body(tx)
        })
    }

    /// Creates `relation` with `columns` unless it exists, recording ownership.
    fn create_relation(
        &self,
        tx: &Connection,
        relation: &RelationName,
        columns: &str,
    ) -> Result<(), SqliteStoreError> {
        let name = relation.qualified();
        if table_exists(tx, &name)? {
            return Ok(());
        }
        tx.execute_batch(&format!("CREATE TABLE {} ({columns});", quote_ident(&name)))
            .map_err(db_error)?;
        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO {OWNER_TABLE} (relation, owner, created_at) VALUES (?1, \
                 ?2, ?3)"
            ),
            params![name, self.config.principal, unix_millis()],
        )
        .map_err(db_error)?;
        tracing::debug!(relation = %name, "created relation");
        Ok(())
    }

    /// Attempts one provisioning lock acquisition.
    fn try_lock(&self, key: &str, owner: &str) -> Result<bool, SqliteStoreError> {
        self.with_write_tx(|tx| {
            let now = unix_millis();
            tx.execute(
                &format!("DELETE FROM {LOCK_TABLE} WHERE lock_key = ?1 AND acquired_at < ?2"),
                params![key, now.saturating_sub(LOCK_STALE_AFTER_MS)],
            )
            .map_err(db_error)?;
            tx.execute(
                &format!(
                    "INSERT OR IGNORE INTO {LOCK_TABLE} (lock_key, owner, acquired_at) VALUES \
                     (?1, ?2, ?3)"
                ),
                params![key, owner, now],
            )
            .map_err(db_error)?;
            let holder: String = tx
                .query_row(
                    &format!("SELECT owner FROM {LOCK_TABLE} WHERE lock_key = ?1"),
                    params![key],
                    |row| row.get(0),
                )
                .map_err(db_error)?;
            Ok(holder == owner)
        })
    }
}

// ============================================================================
// SECTION: Catalog Store
// ============================================================================

impl CatalogStore for SqliteStore {
    fn load_catalog(&self) -> Result<Vec<CatalogEntry>, StoreError> {
        let connection = self.connection()?;
        let mut stmt = connection
            .prepare(&format!("SELECT {METRIC_COLUMNS} FROM {METRIC_TABLE} ORDER BY metric_name"))
            .map_err(db_error)?;
        let rows = stmt
            .query_map([], map_metric_row)
            .map_err(db_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)?;
        Ok(rows.into_iter().map(MetricRow::into_entry).collect::<Result<Vec<_>, _>>()?)
    }

    fn get_metric(&self, name: &MetricName) -> Result<Option<CatalogEntry>, StoreError> {
        let connection = self.connection()?;
        Ok(query_metric(&connection, name)?)
    }

    fn identifier_owner(&self, identifier: &str) -> Result<Option<MetricName>, StoreError> {
        let connection = self.connection()?;
        let owner: Option<String> = connection
            .query_row(
                &format!(
                    "SELECT metric_name FROM {METRIC_TABLE} WHERE data_identifier = ?1 OR \
                     series_identifier = ?1"
                ),
                params![identifier],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;
        Ok(owner.map(|name| parse_metric_name(&name)).transpose()?)
    }

    fn acquire_provision_lock(
        &self,
        key: &str,
        owner: &str,
        wait: Duration,
    ) -> Result<bool, StoreError> {
        let started = Instant::now();
        loop {
            match self.try_lock(key, owner) {
                Ok(true) => return Ok(true),
                Ok(false) | Err(SqliteStoreError::Busy(_)) => {}
                Err(err) => return Err(err.into()),
            }
            let elapsed = started.elapsed();
            if elapsed >= wait {
                return Ok(false);
            }
            thread::sleep(LOCK_POLL_INTERVAL.min(wait.saturating_sub(elapsed)));
        }
    }

    fn release_provision_lock(&self, key: &str, owner: &str) -> Result<(), StoreError> {
        let connection = self.connection()?;
        connection
            .execute(
                &format!("DELETE FROM {LOCK_TABLE} WHERE lock_key = ?1 AND owner = ?2"),
                params![key, owner],
            )
            .map_err(db_error)?;
        Ok(())
    }

    fn create_metric_relations(
        &self,
        fence: &Fence,
        data: &RelationName,
        series: &RelationName,
    ) -> Result<(), StoreError> {
        Ok(self.with_fenced_tx(fence, |tx| {
            self.create_relation(
                tx,
                data,
                "time INTEGER NOT NULL, value REAL, value_bits INTEGER NOT NULL, series_id INTEGER \
                 NOT NULL",
            )?;
            self.create_relation(
                tx,
                series,
                "id INTEGER PRIMARY KEY AUTOINCREMENT, labels TEXT NOT NULL UNIQUE, created_at \
                 INTEGER NOT NULL",
            )
        })?)
    }

    fn check_permission(&self, relation: &RelationName) -> Result<bool, StoreError> {
        let connection = self.connection()?;
        let name = relation.qualified();
        if !table_exists(&connection, &name)? {
            return Ok(false);
        }
        let owner: Option<String> = connection
            .query_row(
                &format!("SELECT owner FROM {OWNER_TABLE} WHERE relation = ?1"),
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;
        Ok(owner.as_deref() == Some(self.config.principal.as_str()))
    }

    fn register_metric(
        &self,
        fence: &Fence,
        entry: &CatalogEntry,
    ) -> Result<CatalogEntry, StoreError> {
        Ok(self.with_fenced_tx(fence, |tx| {
            if let Some(existing) = query_metric(tx, &entry.metric_name)? {
                return Ok(existing);
            }
            tx.execute(
                &format!("INSERT INTO {METRIC_TABLE} ({METRIC_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    entry.metric_name.as_str(),
                    entry.data_relation.namespace,
                    entry.data_relation.identifier,
                    entry.series_relation.namespace,
                    entry.series_relation.identifier,
                    entry.created_at_ms,
                    entry.creation_completed,
                ],
            )
            .map_err(db_error)?;
            Ok(entry.clone())
        })?)
    }

    fn finalize_metrics(&self, fence: &Fence) -> Result<Vec<MetricName>, StoreError> {
        Ok(self.with_fenced_tx(fence, |tx| {
            let mut stmt = tx
                .prepare(&format!(
                    "SELECT {METRIC_COLUMNS} FROM {METRIC_TABLE} WHERE creation_completed = 0 \
                     ORDER BY metric_name"
                ))
                .map_err(db_error)?;
            let pending = stmt
                .query_map([], map_metric_row)
                .map_err(db_error)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_error)?;
            drop(stmt);
            let mut finalized = Vec::with_capacity(pending.len());
            for row in pending {
                let entry = row.into_entry()?;
                let table = entry.data_relation.qualified();
                tx.execute_batch(&format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} (series_id, time);",
                    quote_ident(&format!("{table}_series_time")),
                    quote_ident(&table)
                ))
                .map_err(db_error)?;
                tx.execute(
                    &format!(
                        "UPDATE {METRIC_TABLE} SET creation_completed = 1 WHERE metric_name = ?1"
                    ),
                    params![entry.metric_name.as_str()],
                )
                .map_err(db_error)?;
                finalized.push(entry.metric_name);
            }
            Ok(finalized)
        })?)
    }

    fn get_series(
        &self,
        entry: &CatalogEntry,
        key: &SeriesKey,
    ) -> Result<Option<SeriesId>, StoreError> {
        let labels = canonical_labels(key)?;
        let connection = self.connection()?;
        let id: Option<i64> = connection
            .query_row(
                &format!(
                    "SELECT id FROM {} WHERE labels = ?1",
                    quote_ident(&entry.series_relation.qualified())
                ),
                params![labels],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;
        Ok(id.map(parse_series_id).transpose()?)
    }

    fn get_or_create_series(
        &self,
        fence: &Fence,
        entry: &CatalogEntry,
        key: &SeriesKey,
    ) -> Result<SeriesId, StoreError> {
        let labels = canonical_labels(key)?;
        let table = quote_ident(&entry.series_relation.qualified());
        Ok(self.with_fenced_tx(fence, |tx| {
            tx.execute(
                &format!("INSERT OR IGNORE INTO {table} (labels, created_at) VALUES (?1, ?2)"),
                params![labels, unix_millis()],
            )
            .map_err(db_error)?;
            let id: i64 = tx
                .query_row(&format!("SELECT id FROM {table} WHERE labels = ?1"), params![labels], |row| {
                    row.get(0)
                })
                .map_err(db_error)?;
            parse_series_id(id)
        })?)
    }
}

// ============================================================================
// SECTION: Sample Store
// ============================================================================

impl SampleStore for SqliteStore {
    fn insert_samples(&self, entry: &CatalogEntry, samples: &[Sample]) -> Result<u64, StoreError> {
        let table = quote_ident(&entry.data_relation.qualified());
        Ok(self.with_write_tx(|tx| {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO {table} (time, value, value_bits, series_id) VALUES (?1, ?2, ?3, \
                     ?4)"
                ))
                .map_err(db_error)?;
            for sample in samples {
                stmt.execute(params![
                    sample.timestamp_ms,
                    sample.value,
                    sample.value.to_bits().cast_signed(),
                    sample.series_id.as_i64(),
                ])
                .map_err(db_error)?;
            }
            Ok(u64::try_from(samples.len()).unwrap_or(u64::MAX))
        })?)
    }

    fn upsert_metadata(&self, entries: &[MetadataEntry]) -> Result<u64, StoreError> {
        Ok(self.with_write_tx(|tx| {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO {METADATA_TABLE} (metric_name, metric_type, unit, help) VALUES \
                     (?1, ?2, ?3, ?4) ON CONFLICT(metric_name) DO UPDATE SET metric_type = \
                     excluded.metric_type, unit = excluded.unit, help = excluded.help"
                ))
                .map_err(db_error)?;
            for entry in entries {
                stmt.execute(params![
                    entry.metric_name.as_str(),
                    entry.metric_type.as_str(),
                    entry.unit,
                    entry.help,
                ])
                .map_err(db_error)?;
            }
            Ok(u64::try_from(entries.len()).unwrap_or(u64::MAX))
        })?)
    }

    fn get_metadata(&self, name: &MetricName) -> Result<Option<MetadataEntry>, StoreError> {
        let connection = self.connection()?;
        let row: Option<(String, String, String)> = connection
            .query_row(
                &format!(
                    "SELECT metric_type, unit, help FROM {METADATA_TABLE} WHERE metric_name = ?1"
                ),
                params![name.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(db_error)?;
        Ok(row.map(|(metric_type, unit, help)| MetadataEntry {
            metric_name: name.clone(),
            metric_type: MetricType::parse(&metric_type),
            unit,
            help,
        }))
    }

    fn list_series(&self, entry: &CatalogEntry) -> Result<Vec<(SeriesId, SeriesKey)>, StoreError> {
        let connection = self.connection()?;
        let mut stmt = connection
            .prepare(&format!(
                "SELECT id, labels FROM {} ORDER BY id",
                quote_ident(&entry.series_relation.qualified())
            ))
            .map_err(db_error)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))
            .map_err(db_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)?;
        let mut series = Vec::with_capacity(rows.len());
        for (id, labels) in rows {
            let key = SeriesKey::from_canonical_json(&labels)
                .map_err(|err| SqliteStoreError::Corrupt(format!("series {id} labels: {err}")))?;
            series.push((parse_series_id(id)?, key));
        }
        Ok(series)
    }

    fn read_samples(
        &self,
        entry: &CatalogEntry,
        range: TimeRange,
    ) -> Result<Vec<Sample>, StoreError> {
        let connection = self.connection()?;
        let mut stmt = connection
            .prepare(&format!(
                "SELECT series_id, time, value_bits FROM {} WHERE time >= ?1 AND time <= ?2 ORDER \
                 BY series_id, time",
                quote_ident(&entry.data_relation.qualified())
            ))
            .map_err(db_error)?;
        let rows = stmt
            .query_map(params![range.start_ms(), range.end_ms()], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
            })
            .map_err(db_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)?;
        let mut samples = Vec::with_capacity(rows.len());
        for (series_id, timestamp_ms, bits) in rows {
            samples.push(Sample {
                series_id: parse_series_id(series_id)?,
                timestamp_ms,
                value: f64::from_bits(bits.cast_unsigned()),
            });
        }
        Ok(samples)
    }
}

// ============================================================================
// SECTION: Lease Store
// ============================================================================

impl LeaseStore for SqliteStore {
    fn try_acquire_lease(
        &self,
        group_id: &str,
        holder_id: &str,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Result<Option<LeaderLease>, StoreError> {
        Ok(self.with_write_tx(|tx| {
            let current = query_lease(tx, group_id)?;
            let Some(next) =
                LeaderLease::acquire(current.as_ref(), group_id, holder_id, now_ms, ttl_ms)
            else {
                return Ok(None);
            };
            tx.execute(
                &format!(
                    "INSERT INTO {LEASE_TABLE} (group_id, holder_id, fencing_token, expires_at) \
                     VALUES (?1, ?2, ?3, ?4) ON CONFLICT(group_id) DO UPDATE SET holder_id = \
                     excluded.holder_id, fencing_token = excluded.fencing_token, expires_at = \
                     excluded.expires_at"
                ),
                params![next.group_id, next.holder_id, next.fencing_token.as_i64(), next.expires_at_ms],
            )
            .map_err(db_error)?;
            Ok(Some(next))
        })?)
    }

    fn renew_lease(
        &self,
        lease: &LeaderLease,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Result<Option<LeaderLease>, StoreError> {
        let expires_at_ms = now_ms.saturating_add(ttl_ms);
        let connection = self.connection()?;
        let changed = connection
            .execute(
                &format!(
                    "UPDATE {LEASE_TABLE} SET expires_at = ?1 WHERE group_id = ?2 AND holder_id = \
                     ?3 AND fencing_token = ?4 AND expires_at > ?5"
                ),
                params![
                    expires_at_ms,
                    lease.group_id,
                    lease.holder_id,
                    lease.fencing_token.as_i64(),
                    now_ms
                ],
            )
            .map_err(db_error)?;
        Ok((changed == 1).then(|| LeaderLease {
            expires_at_ms,
            ..lease.clone()
        }))
    }

    fn release_lease(&self, lease: &LeaderLease) -> Result<(), StoreError> {
        let connection = self.connection()?;
        connection
            .execute(
                &format!(
                    "UPDATE {LEASE_TABLE} SET holder_id = '', expires_at = 0 WHERE group_id = ?1 \
                     AND holder_id = ?2 AND fencing_token = ?3"
                ),
                params![lease.group_id, lease.holder_id, lease.fencing_token.as_i64()],
            )
            .map_err(db_error)?;
        Ok(())
    }

    fn current_lease(&self, group_id: &str) -> Result<Option<LeaderLease>, StoreError> {
        let connection = self.connection()?;
        Ok(query_lease(&connection, group_id)?)
    }
}

// ============================================================================
// SECTION: Rows
// ============================================================================

/// Raw catalog row before validation.
struct MetricRow {
    /// Metric name as stored.
    metric_name: String,
    /// Data relation namespace.
    data_namespace: String,
    /// Data relation identifier.
    data_identifier: String,
    /// Series relation namespace.
    series_namespace: String,
    /// Series relation identifier.
    series_identifier: String,
    /// Registration time (unix ms).
    created_at: i64,
    /// Finalization flag.
    creation_completed: bool,
}

impl MetricRow {
    /// Validates the row into a catalog entry.
    fn into_entry(self) -> Result<CatalogEntry, SqliteStoreError> {
        Ok(CatalogEntry {
            metric_name: parse_metric_name(&self.metric_name)?,
            data_relation: RelationName::new(self.data_namespace, self.data_identifier),
            series_relation: RelationName::new(self.series_namespace, self.series_identifier),
            created_at_ms: self.created_at,
            creation_completed: self.creation_completed,
        })
    }
}

/// Maps a `SELECT {METRIC_COLUMNS}` row.
fn map_metric_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MetricRow> {
    Ok(MetricRow {
        metric_name: row.get(0)?,
        data_namespace: row.get(1)?,
        data_identifier: row.get(2)?,
        series_namespace: row.get(3)?,
        series_identifier: row.get(4)?,
        created_at: row.get(5)?,
        creation_completed: row.get(6)?,
    })
}

/// Loads one catalog entry by metric name.
fn query_metric(
    connection: &Connection,
    name: &MetricName,
) -> Result<Option<CatalogEntry>, SqliteStoreError> {
    connection
        .query_row(
            &format!("SELECT {METRIC_COLUMNS} FROM {METRIC_TABLE} WHERE metric_name = ?1"),
            params![name.as_str()],
            map_metric_row,
        )
        .optional()
        .map_err(db_error)?
        .map(MetricRow::into_entry)
        .transpose()
}

/// Loads the lease row for a group.
fn query_lease(
    connection: &Connection,
    group_id: &str,
) -> Result<Option<LeaderLease>, SqliteStoreError> {
    connection
        .query_row(
            &format!(
                "SELECT holder_id, fencing_token, expires_at FROM {LEASE_TABLE} WHERE group_id = ?1"
            ),
            params![group_id],
            |row| {
                Ok(LeaderLease {
                    group_id: group_id.to_string(),
                    holder_id: row.get(0)?,
                    fencing_token: FencingToken::from_i64(row.get(1)?),
                    expires_at_ms: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(db_error)
}

/// Rejects fences that do not match the lease row.
fn check_fence(connection: &Connection, fence: &Fence) -> Result<(), SqliteStoreError> {
    let current = query_lease(connection, &fence.group_id)?;
    let valid = current
        .is_some_and(|lease| lease.holder_id == fence.holder_id && lease.fencing_token == fence.token);
    if valid {
        Ok(())
    } else {
        Err(SqliteStoreError::FenceRejected(format!(
            "token {} for group {} is not current",
            fence.token, fence.group_id
        )))
    }
}

/// Returns true when a table named `name` exists (case-insensitive).
fn table_exists(connection: &Connection, name: &str) -> Result<bool, SqliteStoreError> {
    connection
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            params![name],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .map_err(db_error)
}

/// Encodes a series key for storage.
fn canonical_labels(key: &SeriesKey) -> Result<String, SqliteStoreError> {
    key.to_canonical_json().map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

/// Validates a stored metric name.
fn parse_metric_name(raw: &str) -> Result<MetricName, SqliteStoreError> {
    MetricName::new(raw).map_err(|err| SqliteStoreError::Corrupt(format!("metric name: {err}")))
}

/// Validates a stored series id.
fn parse_series_id(raw: i64) -> Result<SeriesId, SqliteStoreError> {
    SeriesId::from_i64(raw)
        .ok_or_else(|| SqliteStoreError::Corrupt(format!("series id out of range: {raw}")))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Initializes the catalog schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_error)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db_error)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db_error)?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(db_error)?;
            tx.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {METRIC_TABLE} (
                    metric_name TEXT PRIMARY KEY,
                    data_namespace TEXT NOT NULL,
                    data_identifier TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    series_namespace TEXT NOT NULL,
                    series_identifier TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    created_at INTEGER NOT NULL,
                    creation_completed INTEGER NOT NULL DEFAULT 0
                );
                CREATE TABLE IF NOT EXISTS {OWNER_TABLE} (
                    relation TEXT PRIMARY KEY COLLATE NOCASE,
                    owner TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS {LOCK_TABLE} (
                    lock_key TEXT PRIMARY KEY,
                    owner TEXT NOT NULL,
                    acquired_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS {LEASE_TABLE} (
                    group_id TEXT PRIMARY KEY,
                    holder_id TEXT NOT NULL,
                    fencing_token INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS {METADATA_TABLE} (
                    metric_name TEXT PRIMARY KEY,
                    metric_type TEXT NOT NULL,
                    unit TEXT NOT NULL,
                    help TEXT NOT NULL
                );"
            ))
            .map_err(db_error)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(db_error)?;
    Ok(())
}

/// Returns the current wall-clock time in unix milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
