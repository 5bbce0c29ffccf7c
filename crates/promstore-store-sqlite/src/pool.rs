// crates/promstore-store-sqlite/src/pool.rs
// ============================================================================
// Module: SQLite Connection Pool
// Description: r2d2 connection manager applying durability pragmas.
// Purpose: Hand out pooled SQLite connections with consistent settings.
// Dependencies: r2d2, rusqlite, serde
// ============================================================================

//! ## Overview
//! Every pooled connection is opened read-write with the full-mutex flag and
//! receives the same journal, sync, and busy-timeout pragmas before use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use serde::Deserialize;

// ============================================================================
// SECTION: Pragmas
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

// ============================================================================
// SECTION: Connection Manager
// ============================================================================

/// Opens `SQLite` connections for the pool.
#[derive(Debug, Clone)]
pub(crate) struct SqliteConnectionManager {
    /// Database file.
    pub(crate) path: PathBuf,
    /// Journal mode pragma.
    pub(crate) journal_mode: SqliteJournalMode,
    /// Sync mode pragma.
    pub(crate) sync_mode: SqliteSyncMode,
    /// Busy timeout applied to every connection.
    pub(crate) busy_timeout: Duration,
}

impl r2d2::ManageConnection for SqliteConnectionManager {
    type Connection = Connection;
    type Error = rusqlite::Error;

    fn connect(&self) -> Result<Connection, rusqlite::Error> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let connection = Connection::open_with_flags(&self.path, flags)?;
        connection.busy_timeout(self.busy_timeout)?;
        connection.execute_batch(&format!(
            "PRAGMA journal_mode = {}; PRAGMA synchronous = {};",
            self.journal_mode.pragma_value(),
            self.sync_mode.pragma_value()
        ))?;
        Ok(connection)
    }

    fn is_valid(&self, connection: &mut Connection) -> Result<(), rusqlite::Error> {
        connection.execute_batch("SELECT 1;")
    }

    fn has_broken(&self, _connection: &mut Connection) -> bool {
        false
    }
}
