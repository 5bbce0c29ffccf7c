// crates/promstore-store-postgres/src/store.rs
// ============================================================================
// Module: Postgres Promstore Store
// Description: Production catalog, sample, and lease store on PostgreSQL.
// Purpose: Implement the Promstore store traits over pooled Postgres clients.
// Dependencies: postgres, promstore-core, r2d2, r2d2_postgres, sha2, tracing
// ============================================================================

//! ## Overview
//! Managed namespaces are real schemas. Provisioning locks are session-level
//! advisory locks: the pooled client that took the lock is parked until the
//! lock is released, so the lock lives exactly as long as the session.
//! Schema mutations run in transactions that first read the lease row
//! `FOR SHARE`, so a concurrent takeover cannot interleave with a fenced
//! write.
//!
//! Permission checks resolve the relation with `to_regclass`, require an
//! ordinary table in a managed schema that the store registered in
//! `"_prom_catalog".managed_relation`, and ask `has_table_privilege` for
//! `INSERT` as the current user.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::thread;
use std::time::Duration;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use postgres::NoTls;
use postgres::Row;
use postgres::Transaction;
use promstore_core::CATALOG_NAMESPACE;
use promstore_core::CatalogEntry;
use promstore_core::CatalogStore;
use promstore_core::DATA_NAMESPACE;
use promstore_core::Fence;
use promstore_core::FencingToken;
use promstore_core::LeaderLease;
use promstore_core::LeaseStore;
use promstore_core::MetadataEntry;
use promstore_core::MetricName;
use promstore_core::MetricType;
use promstore_core::RelationName;
use promstore_core::SERIES_NAMESPACE;
use promstore_core::Sample;
use promstore_core::SampleStore;
use promstore_core::SeriesId;
use promstore_core::SeriesKey;
use promstore_core::StoreError;
use promstore_core::TimeRange;
use promstore_core::runtime::sanitize::quote_ident;
use r2d2::Pool;
use r2d2::PooledConnection;
use r2d2_postgres::PostgresConnectionManager;
use sha2::Digest;
use sha2::Sha256;

use crate::config::PostgresStoreConfig;
use crate::config::PostgresStoreError;
use crate::config::pg_error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Catalog schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Poll cadence while waiting for an advisory lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Advisory lock key serializing catalog migrations.
const MIGRATION_LOCK_KEY: &str = "promstore:migrate";
/// Columns selected for catalog rows.
const METRIC_COLUMNS: &str = "metric_name, data_namespace, data_identifier, series_namespace, \
                              series_identifier, created_at, creation_completed";

/// Pooled Postgres client.
type PgConnection = PooledConnection<PostgresConnectionManager<NoTls>>;

// ============================================================================
// SECTION: Store
// ============================================================================

/// Advisory lock parked on its session.
struct HeldLock {
    /// Lock owner.
    owner: String,
    /// Advisory key.
    key: i64,
    /// Session holding the lock.
    connection: PgConnection,
}

/// Postgres-backed Promstore store.
///
/// # Invariants
/// - Every schema mutation re-checks the fence inside its transaction.
/// - Series ids come from an identity sequence and are never reused.
pub struct PostgresStore {
    /// Store configuration.
    config: PostgresStoreConfig,
    /// Connection pool for Postgres access.
    pool: Option<Pool<PostgresConnectionManager<NoTls>>>,
    /// Advisory locks held by this process, by lock key.
    locks: Mutex<HashMap<String, HeldLock>>,
}

impl Drop for PostgresStore {
    fn drop(&mut self) {
        let locks = std::mem::take(self.locks.get_mut().unwrap_or_else(PoisonError::into_inner));
        if let Some(pool) = self.pool.take() {
            let _ = thread::spawn(move || {
                drop(locks);
                drop(pool);
            });
        }
    }
}

impl PostgresStore {
    /// Connects, builds the pool, and migrates the catalog schema.
    ///
    /// # Errors
    ///
    /// Returns [`PostgresStoreError`] when the configuration is invalid, the
    /// server is unreachable, or the catalog schema version is unsupported.
    pub fn new(config: PostgresStoreConfig) -> Result<Self, PostgresStoreError> {
        config.validate()?;
        let mut pg_config = config
            .connection
            .parse::<postgres::Config>()
            .map_err(|err| PostgresStoreError::Invalid(err.to_string()))?;
        pg_config.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
        let options = format!("-c statement_timeout={}", config.statement_timeout_ms);
        pg_config.options(&options);
        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .connection_timeout(Duration::from_millis(config.pool_wait_ms))
            .build(manager)
            .map_err(|err| PostgresStoreError::Io(err.to_string()))?;
        let store = Self {
            config,
            pool: Some(pool),
            locks: Mutex::new(HashMap::new()),
        };
        store.migrate()?;
        tracing::info!(max_connections = store.config.max_connections, "postgres store ready");
        Ok(store)
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &PostgresStoreConfig {
        &self.config
    }

    /// Checks out a pooled client.
    fn connection(&self) -> Result<PgConnection, PostgresStoreError> {
        self.pool
            .as_ref()
            .ok_or_else(|| PostgresStoreError::Io("postgres store closed".to_string()))?
            .get()
            .map_err(|err| PostgresStoreError::Exhausted {
                message: err.to_string(),
                retry_after_ms: self.config.pool_wait_ms,
            })
    }

    /// Runs `body` in a transaction on a pooled client.
    fn with_tx<T>(
        &self,
        body: impl FnOnce(&mut Transaction<'_>) -> Result<T, PostgresStoreError>,
    ) -> Result<T, PostgresStoreError> {
        let mut conn = self.connection()?;
        let mut tx = conn.transaction().map_err(|err| pg_error(&err))?;
        let value = body(&mut tx)?;
        tx.commit().map_err(|err| pg_error(&err))?;
        Ok(value)
    }

    /// Runs `body` in a transaction after validating `fence`.
    fn with_fenced_tx<T>(
        &self,
        fence: &Fence,
        body: impl FnOnce(&mut Transaction<'_>) -> Result<T, PostgresStoreError>,
    ) -> Result<T, PostgresStoreError> {
        self.with_tx(|tx| {
            check_fence(tx, fence)?;
            body(tx)
        })
    }

    /// Locks the held-lock table.
    fn held_locks(&self) -> Result<MutexGuard<'_, HashMap<String, HeldLock>>, PostgresStoreError> {
        self.locks
            .lock()
            .map_err(|_| PostgresStoreError::Io("advisory lock table poisoned".to_string()))
    }

    /// Creates catalog schemas and tables, or validates the existing version.
    fn migrate(&self) -> Result<(), PostgresStoreError> {
        self.with_tx(|tx| {
            tx.execute("SELECT pg_advisory_xact_lock($1)", &[&advisory_key(MIGRATION_LOCK_KEY)])
                .map_err(|err| pg_error(&err))?;
            tx.batch_execute(&format!(
                "CREATE SCHEMA IF NOT EXISTS {data};
                CREATE SCHEMA IF NOT EXISTS {series};
                CREATE SCHEMA IF NOT EXISTS {catalog};
                CREATE TABLE IF NOT EXISTS {catalog}.store_meta (version BIGINT NOT NULL);
                CREATE TABLE IF NOT EXISTS {catalog}.metric (
                    metric_name TEXT PRIMARY KEY,
                    data_namespace TEXT NOT NULL,
                    data_identifier TEXT NOT NULL UNIQUE,
                    series_namespace TEXT NOT NULL,
                    series_identifier TEXT NOT NULL UNIQUE,
                    created_at BIGINT NOT NULL,
                    creation_completed BOOLEAN NOT NULL DEFAULT FALSE
                );
                CREATE TABLE IF NOT EXISTS {catalog}.managed_relation (
                    namespace TEXT NOT NULL,
                    identifier TEXT NOT NULL,
                    created_at BIGINT NOT NULL,
                    PRIMARY KEY (namespace, identifier)
                );
                CREATE TABLE IF NOT EXISTS {catalog}.leader_lease (
                    group_id TEXT PRIMARY KEY,
                    holder_id TEXT NOT NULL,
                    fencing_token BIGINT NOT NULL,
                    expires_at BIGINT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS {catalog}.metadata (
                    metric_name TEXT PRIMARY KEY,
                    metric_type TEXT NOT NULL,
                    unit TEXT NOT NULL,
                    help TEXT NOT NULL
                );",
                data = quote_ident(DATA_NAMESPACE),
                series = quote_ident(SERIES_NAMESPACE),
                catalog = catalog(),
            ))
            .map_err(|err| pg_error(&err))?;
            let version = tx
                .query_opt(&format!("SELECT version FROM {}.store_meta LIMIT 1", catalog()), &[])
                .map_err(|err| pg_error(&err))?
                .map(|row| get::<i64>(&row, 0))
                .transpose()?;
            match version {
                None => {
                    tx.execute(
                        &format!("INSERT INTO {}.store_meta (version) VALUES ($1)", catalog()),
                        &[&SCHEMA_VERSION],
                    )
                    .map_err(|err| pg_error(&err))?;
                    Ok(())
                }
                Some(value) if value == SCHEMA_VERSION => Ok(()),
                Some(value) => Err(PostgresStoreError::VersionMismatch(format!(
                    "unsupported schema version: {value}"
                ))),
            }
        })
    }

    /// Polls `pg_try_advisory_lock` on one session until `wait` elapses.
    fn poll_advisory_lock(
        &self,
        key: i64,
        wait: Duration,
    ) -> Result<Option<PgConnection>, PostgresStoreError> {
        let started = Instant::now();
        let mut conn = self.connection()?;
        loop {
            let row = conn
                .query_one("SELECT pg_try_advisory_lock($1)", &[&key])
                .map_err(|err| pg_error(&err))?;
            if get::<bool>(&row, 0)? {
                return Ok(Some(conn));
            }
            let elapsed = started.elapsed();
            if elapsed >= wait {
                return Ok(None);
            }
            thread::sleep(LOCK_POLL_INTERVAL.min(wait.saturating_sub(elapsed)));
        }
    }

    /// Creates `relation` unless it exists, registering it as managed.
    fn create_relation(
        tx: &mut Transaction<'_>,
        relation: &RelationName,
        columns: &str,
    ) -> Result<(), PostgresStoreError> {
        let exists = tx
            .query_one("SELECT to_regclass($1) IS NOT NULL", &[&relation_sql(relation)])
            .map_err(|err| pg_error(&err))?;
        if get::<bool>(&exists, 0)? {
            return Ok(());
        }
        tx.batch_execute(&format!("CREATE TABLE {} ({columns});", relation_sql(relation)))
            .map_err(|err| pg_error(&err))?;
        tx.execute(
            &format!(
                "INSERT INTO {}.managed_relation (namespace, identifier, created_at) VALUES ($1, \
                 $2, $3) ON CONFLICT DO NOTHING",
                catalog()
            ),
            &[&relation.namespace, &relation.identifier, &unix_millis()],
        )
        .map_err(|err| pg_error(&err))?;
        tracing::debug!(relation = %relation, "created relation");
        Ok(())
    }
}

// ============================================================================
// SECTION: Catalog Store
// ============================================================================

impl CatalogStore for PostgresStore {
    fn load_catalog(&self) -> Result<Vec<CatalogEntry>, StoreError> {
        let mut conn = self.connection()?;
        let rows = conn
            .query(
                &format!("SELECT {METRIC_COLUMNS} FROM {}.metric ORDER BY metric_name", catalog()),
                &[],
            )
            .map_err(|err| pg_error(&err))?;
        Ok(rows.iter().map(metric_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    fn get_metric(&self, name: &MetricName) -> Result<Option<CatalogEntry>, StoreError> {
        let mut conn = self.connection()?;
        let row = conn
            .query_opt(
                &format!("SELECT {METRIC_COLUMNS} FROM {}.metric WHERE metric_name = $1", catalog()),
                &[&name.as_str()],
            )
            .map_err(|err| pg_error(&err))?;
        Ok(row.as_ref().map(metric_from_row).transpose()?)
    }

    fn identifier_owner(&self, identifier: &str) -> Result<Option<MetricName>, StoreError> {
        let mut conn = self.connection()?;
        let row = conn
            .query_opt(
                &format!(
                    "SELECT metric_name FROM {}.metric WHERE data_identifier = $1 OR \
                     series_identifier = $1",
                    catalog()
                ),
                &[&identifier],
            )
            .map_err(|err| pg_error(&err))?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(parse_metric_name(&get::<String>(&row, 0)?)?))
    }

    fn acquire_provision_lock(
        &self,
        key: &str,
        owner: &str,
        wait: Duration,
    ) -> Result<bool, StoreError> {
        if let Some(held) = self.held_locks()?.get(key)
            && held.owner == owner
        {
            return Ok(true);
        }
        let advisory = advisory_key(key);
        let Some(connection) = self.poll_advisory_lock(advisory, wait)? else {
            return Ok(false);
        };
        self.held_locks()?.insert(
            key.to_string(),
            HeldLock {
                owner: owner.to_string(),
                key: advisory,
                connection,
            },
        );
        Ok(true)
    }

    fn release_provision_lock(&self, key: &str, owner: &str) -> Result<(), StoreError> {
        let held = {
            let mut locks = self.held_locks()?;
            match locks.get(key) {
                Some(held) if held.owner == owner => locks.remove(key),
                _ => None,
            }
        };
        let Some(mut held) = held else {
            return Ok(());
        };
        if let Err(err) = held.connection.execute("SELECT pg_advisory_unlock($1)", &[&held.key]) {
            tracing::warn!(lock = key, error = %err, "advisory unlock failed");
            return Err(pg_error(&err).into());
        }
        Ok(())
    }

    fn create_metric_relations(
        &self,
        fence: &Fence,
        data: &RelationName,
        series: &RelationName,
    ) -> Result<(), StoreError> {
        Ok(self.with_fenced_tx(fence, |tx| {
            Self::create_relation(
                tx,
                data,
                "time BIGINT NOT NULL, value DOUBLE PRECISION NOT NULL, series_id BIGINT NOT NULL",
            )?;
            Self::create_relation(
                tx,
                series,
                "id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY, labels TEXT NOT NULL UNIQUE, \
                 created_at BIGINT NOT NULL",
            )
        })?)
    }

    fn check_permission(&self, relation: &RelationName) -> Result<bool, StoreError> {
        let mut conn = self.connection()?;
        let row = conn
            .query_opt(
                &format!(
                    "SELECT has_table_privilege(current_user, c.oid, 'INSERT') FROM \
                     pg_catalog.pg_class c JOIN pg_catalog.pg_namespace n ON n.oid = \
                     c.relnamespace JOIN {}.managed_relation m ON m.namespace = n.nspname AND \
                     m.identifier = c.relname WHERE c.oid = to_regclass($1) AND c.relkind = 'r' \
                     AND n.nspname IN ($2, $3)",
                    catalog()
                ),
                &[&relation_sql(relation), &DATA_NAMESPACE, &SERIES_NAMESPACE],
            )
            .map_err(|err| pg_error(&err))?;
        let Some(row) = row else {
            return Ok(false);
        };
        Ok(get::<bool>(&row, 0)?)
    }

    fn register_metric(
        &self,
        fence: &Fence,
        entry: &CatalogEntry,
    ) -> Result<CatalogEntry, StoreError> {
        Ok(self.with_fenced_tx(fence, |tx| {
            tx.execute(
                &format!(
                    "INSERT INTO {}.metric ({METRIC_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) \
                     ON CONFLICT (metric_name) DO NOTHING",
                    catalog()
                ),
                &[
                    &entry.metric_name.as_str(),
                    &entry.data_relation.namespace,
                    &entry.data_relation.identifier,
                    &entry.series_relation.namespace,
                    &entry.series_relation.identifier,
                    &entry.created_at_ms,
                    &entry.creation_completed,
                ],
            )
            .map_err(|err| pg_error(&err))?;
            let row = tx
                .query_one(
                    &format!(
                        "SELECT {METRIC_COLUMNS} FROM {}.metric WHERE metric_name = $1",
                        catalog()
                    ),
                    &[&entry.metric_name.as_str()],
                )
                .map_err(|err| pg_error(&err))?;
            metric_from_row(&row)
        })?)
    }

    fn finalize_metrics(&self, fence: &Fence) -> Result<Vec<MetricName>, StoreError> {
        Ok(self.with_fenced_tx(fence, |tx| {
            let rows = tx
                .query(
                    &format!(
                        "SELECT {METRIC_COLUMNS} FROM {}.metric WHERE NOT creation_completed \
                         ORDER BY metric_name FOR UPDATE",
                        catalog()
                    ),
                    &[],
                )
                .map_err(|err| pg_error(&err))?;
            let mut finalized = Vec::with_capacity(rows.len());
            for row in &rows {
                let entry = metric_from_row(row)?;
                tx.batch_execute(&format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} (series_id, time);",
                    quote_ident(&index_name(&entry.data_relation)),
                    relation_sql(&entry.data_relation)
                ))
                .map_err(|err| pg_error(&err))?;
                tx.execute(
                    &format!(
                        "UPDATE {}.metric SET creation_completed = TRUE WHERE metric_name = $1",
                        catalog()
                    ),
                    &[&entry.metric_name.as_str()],
                )
                .map_err(|err| pg_error(&err))?;
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
        let mut conn = self.connection()?;
        let row = conn
            .query_opt(
                &format!(
                    "SELECT id FROM {} WHERE labels = $1",
                    relation_sql(&entry.series_relation)
                ),
                &[&labels],
            )
            .map_err(|err| pg_error(&err))?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(parse_series_id(get::<i64>(&row, 0)?)?))
    }

    fn get_or_create_series(
        &self,
        fence: &Fence,
        entry: &CatalogEntry,
        key: &SeriesKey,
    ) -> Result<SeriesId, StoreError> {
        let labels = canonical_labels(key)?;
        let table = relation_sql(&entry.series_relation);
        Ok(self.with_fenced_tx(fence, |tx| {
            tx.execute(
                &format!(
                    "INSERT INTO {table} (labels, created_at) VALUES ($1, $2) ON CONFLICT \
                     (labels) DO NOTHING"
                ),
                &[&labels, &unix_millis()],
            )
            .map_err(|err| pg_error(&err))?;
            let row = tx
                .query_one(&format!("SELECT id FROM {table} WHERE labels = $1"), &[&labels])
                .map_err(|err| pg_error(&err))?;
            parse_series_id(get::<i64>(&row, 0)?)
        })?)
    }
}

// ============================================================================
// SECTION: Sample Store
// ============================================================================

impl SampleStore for PostgresStore {
    fn insert_samples(&self, entry: &CatalogEntry, samples: &[Sample]) -> Result<u64, StoreError> {
        let table = relation_sql(&entry.data_relation);
        Ok(self.with_tx(|tx| {
            let statement = tx
                .prepare(&format!(
                    "INSERT INTO {table} (time, value, series_id) VALUES ($1, $2, $3)"
                ))
                .map_err(|err| pg_error(&err))?;
            for sample in samples {
                tx.execute(
                    &statement,
                    &[&sample.timestamp_ms, &sample.value, &sample.series_id.as_i64()],
                )
                .map_err(|err| pg_error(&err))?;
            }
            Ok(u64::try_from(samples.len()).unwrap_or(u64::MAX))
        })?)
    }

    fn upsert_metadata(&self, entries: &[MetadataEntry]) -> Result<u64, StoreError> {
        Ok(self.with_tx(|tx| {
            let statement = tx
                .prepare(&format!(
                    "INSERT INTO {}.metadata (metric_name, metric_type, unit, help) VALUES ($1, \
                     $2, $3, $4) ON CONFLICT (metric_name) DO UPDATE SET metric_type = \
                     EXCLUDED.metric_type, unit = EXCLUDED.unit, help = EXCLUDED.help",
                    catalog()
                ))
                .map_err(|err| pg_error(&err))?;
            for entry in entries {
                tx.execute(
                    &statement,
                    &[
                        &entry.metric_name.as_str(),
                        &entry.metric_type.as_str(),
                        &entry.unit,
                        &entry.help,
                    ],
                )
                .map_err(|err| pg_error(&err))?;
            }
            Ok(u64::try_from(entries.len()).unwrap_or(u64::MAX))
        })?)
    }

    fn get_metadata(&self, name: &MetricName) -> Result<Option<MetadataEntry>, StoreError> {
        let mut conn = self.connection()?;
        let row = conn
            .query_opt(
                &format!(
                    "SELECT metric_type, unit, help FROM {}.metadata WHERE metric_name = $1",
                    catalog()
                ),
                &[&name.as_str()],
            )
            .map_err(|err| pg_error(&err))?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(MetadataEntry {
            metric_name: name.clone(),
            metric_type: MetricType::parse(&get::<String>(&row, 0)?),
            unit: get(&row, 1)?,
            help: get(&row, 2)?,
        }))
    }

    fn list_series(&self, entry: &CatalogEntry) -> Result<Vec<(SeriesId, SeriesKey)>, StoreError> {
        let mut conn = self.connection()?;
        let rows = conn
            .query(
                &format!(
                    "SELECT id, labels FROM {} ORDER BY id",
                    relation_sql(&entry.series_relation)
                ),
                &[],
            )
            .map_err(|err| pg_error(&err))?;
        let mut series = Vec::with_capacity(rows.len());
        for row in &rows {
            let id = get::<i64>(row, 0)?;
            let labels = get::<String>(row, 1)?;
            let key = SeriesKey::from_canonical_json(&labels)
                .map_err(|err| PostgresStoreError::Corrupt(format!("series {id} labels: {err}")))?;
            series.push((parse_series_id(id)?, key));
        }
        Ok(series)
    }

    fn read_samples(
        &self,
        entry: &CatalogEntry,
        range: TimeRange,
    ) -> Result<Vec<Sample>, StoreError> {
        let mut conn = self.connection()?;
        let rows = conn
            .query(
                &format!(
                    "SELECT series_id, time, value FROM {} WHERE time >= $1 AND time <= $2 ORDER \
                     BY series_id, time",
                    relation_sql(&entry.data_relation)
                ),
                &[&range.start_ms(), &range.end_ms()],
            )
            .map_err(|err| pg_error(&err))?;
        let mut samples = Vec::with_capacity(rows.len());
        for row in &rows {
            samples.push(Sample {
                series_id: parse_series_id(get::<i64>(row, 0)?)?,
                timestamp_ms: get(row, 1)?,
                value: get(row, 2)?,
            });
        }
        Ok(samples)
    }
}

// ============================================================================
// SECTION: Lease Store
// ============================================================================

impl LeaseStore for PostgresStore {
    fn try_acquire_lease(
        &self,
        group_id: &str,
        holder_id: &str,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Result<Option<LeaderLease>, StoreError> {
        Ok(self.with_tx(|tx| {
            tx.execute(
                &format!(
                    "INSERT INTO {}.leader_lease (group_id, holder_id, fencing_token, expires_at) \
                     VALUES ($1, '', 0, 0) ON CONFLICT (group_id) DO NOTHING",
                    catalog()
                ),
                &[&group_id],
            )
            .map_err(|err| pg_error(&err))?;
            let current = query_lease(tx, group_id, " FOR UPDATE")?;
            let Some(next) =
                LeaderLease::acquire(current.as_ref(), group_id, holder_id, now_ms, ttl_ms)
            else {
                return Ok(None);
            };
            tx.execute(
                &format!(
                    "UPDATE {}.leader_lease SET holder_id = $2, fencing_token = $3, expires_at = \
                     $4 WHERE group_id = $1",
                    catalog()
                ),
                &[&group_id, &next.holder_id, &next.fencing_token.as_i64(), &next.expires_at_ms],
            )
            .map_err(|err| pg_error(&err))?;
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
        let mut conn = self.connection()?;
        let changed = conn
            .execute(
                &format!(
                    "UPDATE {}.leader_lease SET expires_at = $1 WHERE group_id = $2 AND \
                     holder_id = $3 AND fencing_token = $4 AND expires_at > $5",
                    catalog()
                ),
                &[
                    &expires_at_ms,
                    &lease.group_id,
                    &lease.holder_id,
                    &lease.fencing_token.as_i64(),
                    &now_ms,
                ],
            )
            .map_err(|err| pg_error(&err))?;
        Ok((changed == 1).then(|| LeaderLease {
            expires_at_ms,
            ..lease.clone()
        }))
    }

    fn release_lease(&self, lease: &LeaderLease) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        conn.execute(
            &format!(
                "UPDATE {}.leader_lease SET holder_id = '', expires_at = 0 WHERE group_id = $1 \
                 AND holder_id = $2 AND fencing_token = $3",
                catalog()
            ),
            &[&lease.group_id, &lease.holder_id, &lease.fencing_token.as_i64()],
        )
        .map_err(|err| pg_error(&err))?;
        Ok(())
    }

    fn current_lease(&self, group_id: &str) -> Result<Option<LeaderLease>, StoreError> {
        let mut conn = self.connection()?;
        let mut tx = conn.transaction().map_err(|err| pg_error(&err))?;
        let lease = query_lease(&mut tx, group_id, "")?;
        tx.commit().map_err(|err| pg_error(&err))?;
        Ok(lease.filter(|lease| !lease.holder_id.is_empty() || lease.fencing_token.get() > 0))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the quoted catalog schema.
fn catalog() -> String {
    quote_ident(CATALOG_NAMESPACE)
}

/// Returns the quoted `schema.table` form of a relation.
pub(crate) fn relation_sql(relation: &RelationName) -> String {
    format!("{}.{}", quote_ident(&relation.namespace), quote_ident(&relation.identifier))
}

/// Returns a bounded, collision-resistant index name for a data relation.
pub(crate) fn index_name(relation: &RelationName) -> String {
    let digest = Sha256::digest(relation.qualified().as_bytes());
    let mut name = String::from("series_time_");
    for byte in &digest[.. 12] {
        let _ = write!(name, "{byte:02x}");
    }
    name
}

/// Maps a lock key onto a 64-bit advisory lock id.
pub(crate) fn advisory_key(key: &str) -> i64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&digest[.. 8]);
    i64::from_be_bytes(bytes)
}

/// Reads a typed column, treating type mismatches as corruption.
fn get<T>(row: &Row, index: usize) -> Result<T, PostgresStoreError>
where
    T: for<'a> postgres::types::FromSql<'a>,
{
    row.try_get(index).map_err(|err| PostgresStoreError::Corrupt(err.to_string()))
}

/// Maps a `SELECT {METRIC_COLUMNS}` row.
fn metric_from_row(row: &Row) -> Result<CatalogEntry, PostgresStoreError> {
    Ok(CatalogEntry {
        metric_name: parse_metric_name(&get::<String>(row, 0)?)?,
        data_relation: RelationName::new(get::<String>(row, 1)?, get::<String>(row, 2)?),
        series_relation: RelationName::new(get::<String>(row, 3)?, get::<String>(row, 4)?),
        created_at_ms: get(row, 5)?,
        creation_completed: get(row, 6)?,
    })
}

/// Loads the lease row for a group with an optional locking clause.
fn query_lease(
    tx: &mut Transaction<'_>,
    group_id: &str,
    locking: &str,
) -> Result<Option<LeaderLease>, PostgresStoreError> {
    let row = tx
        .query_opt(
            &format!(
                "SELECT holder_id, fencing_token, expires_at FROM {}.leader_lease WHERE group_id \
                 = $1{locking}",
                catalog()
            ),
            &[&group_id],
        )
        .map_err(|err| pg_error(&err))?;
    let Some(row) = row else {
        return Ok(None);
    };
    Ok(Some(LeaderLease {
        group_id: group_id.to_string(),
        holder_id: get(&row, 0)?,
        fencing_token: FencingToken::from_i64(get(&row, 1)?),
        expires_at_ms: get(&row, 2)?,
    }))
}

/// Rejects fences that do not match the lease row.
fn check_fence(tx: &mut Transaction<'_>, fence: &Fence) -> Result<(), PostgresStoreError> {
    let current = query_lease(tx, &fence.group_id, " FOR SHARE")?;
    let valid = current
        .is_some_and(|lease| lease.holder_id == fence.holder_id && lease.fencing_token == fence.token);
    if valid {
        Ok(())
    } else {
        Err(PostgresStoreError::FenceRejected(format!(
            "token {} for group {} is not current",
            fence.token, fence.group_id
        )))
    }
}

/// Encodes a series key for storage.
fn canonical_labels(key: &SeriesKey) -> Result<String, PostgresStoreError> {
    key.to_canonical_json().map_err(|err| PostgresStoreError::Invalid(err.to_string()))
}

/// Validates a stored metric name.
fn parse_metric_name(raw: &str) -> Result<MetricName, PostgresStoreError> {
    MetricName::new(raw).map_err(|err| PostgresStoreError::Corrupt(format!("metric name: {err}")))
}

/// Validates a stored series id.
fn parse_series_id(raw: i64) -> Result<SeriesId, PostgresStoreError> {
    SeriesId::from_i64(raw)
        .ok_or_else(|| PostgresStoreError::Corrupt(format!("series id out of range: {raw}")))
}

/// Returns the current wall-clock time in unix milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
