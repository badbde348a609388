//! SQLite implementation of the storage contracts.
//!
//! This provides persistent storage that survives service restarts.
//!
//! # Schema Versioning
//!
//! The database has a `schema_version` table that tracks the schema version.
//! When the schema needs to change, increment `CURRENT_SCHEMA_VERSION` and add
//! a migration in `run_migrations()`. Migrations run sequentially from the
//! current version to the target version.
//!
//! # Concurrency
//!
//! A single connection sits behind a mutex and every operation runs on a
//! blocking thread, so writes are serialized. Multi-row writes (create, save,
//! create_team) run inside an immediate transaction.

mod directory;
mod pull_requests;

#[cfg(test)]
mod tests;

use std::os::raw::c_int;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use revassign_core::{User, UserId};
use rusqlite::{ffi, params, Connection, OptionalExtension, Row};
use tracing::warn;

use super::RepositoryError;

/// Current schema version. Increment this when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 1;

/// Columns selected by every user query, in the order `user_from_row` reads them.
const USER_SELECT: &str = "SELECT u.user_id, u.username, u.is_active, t.team_name
     FROM users u LEFT JOIN teams t ON t.team_id = u.team_id";

/// SQLite-backed team directory and pull request store.
pub struct SqliteRepository {
    /// Exposed to tests so they can inspect raw rows.
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Open (or create) the database at `path` and bring its schema up to date.
    ///
    /// # Durability
    ///
    /// The database is configured with:
    /// - `journal_mode = WAL` for better concurrency and crash safety
    /// - `synchronous = FULL` for maximum durability
    /// - `busy_timeout = 5000ms` to handle concurrent access gracefully
    /// - `foreign_keys = ON` so reviewer and author references stay valid
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();

        // Ensure parent directory exists (unless it's :memory: or empty path)
        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";
        if !is_in_memory && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        // SQLite can silently keep DELETE mode on filesystems without shared
        // memory support, so check what we actually got. In-memory databases
        // report "memory".
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;

        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));
        if !journal_mode_ok {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!(
                    "Failed to enable WAL mode: SQLite returned '{}' instead of 'wal'",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            PRAGMA foreign_keys = ON;
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("create schema_version table", e.to_string()))?;

        // 0 means a fresh database
        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create a new in-memory SQLite repository (for testing).
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }

    /// Run migrations from `from_version` to `CURRENT_SCHEMA_VERSION`.
    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "Database schema version {} is newer than supported version {}. \
                     Please upgrade the application.",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS teams (
                    team_id TEXT PRIMARY KEY,
                    team_name TEXT NOT NULL UNIQUE
                );

                CREATE TABLE IF NOT EXISTS users (
                    user_id TEXT PRIMARY KEY,
                    username TEXT NOT NULL UNIQUE,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    team_id TEXT REFERENCES teams(team_id)
                );

                CREATE INDEX IF NOT EXISTS idx_users_team
                    ON users(team_id, is_active);

                CREATE TABLE IF NOT EXISTS pull_requests (
                    pull_request_id TEXT PRIMARY KEY,
                    pull_request_name TEXT NOT NULL,
                    status TEXT NOT NULL CHECK (status IN ('OPEN', 'MERGED')),
                    created_at INTEGER NOT NULL,
                    merged_at INTEGER,
                    author_id TEXT NOT NULL REFERENCES users(user_id),
                    CHECK ((status = 'MERGED') = (merged_at IS NOT NULL))
                );

                CREATE TABLE IF NOT EXISTS pull_request_reviewers (
                    pull_request_id TEXT NOT NULL
                        REFERENCES pull_requests(pull_request_id) ON DELETE CASCADE,
                    user_id TEXT NOT NULL REFERENCES users(user_id),
                    slot INTEGER NOT NULL,
                    PRIMARY KEY (pull_request_id, user_id)
                );

                CREATE INDEX IF NOT EXISTS idx_reviewers_user
                    ON pull_request_reviewers(user_id);
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        Ok(())
    }

    /// Run `f` against the connection on a blocking thread.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut Connection) -> Result<T, RepositoryError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| RepositoryError::storage(operation, "connection mutex poisoned"))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?
    }
}

// =============================================================================
// Row and value helpers
// =============================================================================

/// Extended result code of a constraint violation, if `err` is one.
pub(super) fn constraint_violation(err: &rusqlite::Error) -> Option<c_int> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            Some(e.extended_code)
        }
        _ => None,
    }
}

pub(super) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        constraint_violation(err),
        Some(ffi::SQLITE_CONSTRAINT_UNIQUE) | Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

pub(super) fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    constraint_violation(err) == Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY)
}

/// Read a user from a row produced by `USER_SELECT`.
pub(super) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get(0)?),
        username: row.get(1)?,
        is_active: row.get(2)?,
        team_name: row.get(3)?,
    })
}

pub(super) fn user_exists(conn: &Connection, user_id: &UserId) -> Result<bool, RepositoryError> {
    conn.query_row(
        "SELECT 1 FROM users WHERE user_id = ?1",
        params![user_id.as_str()],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(|e| RepositoryError::storage("check user", e.to_string()))
}

pub(super) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(super) fn from_millis(millis: i64) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| RepositoryError::corruption("timestamp"))
}

/// Convert a reviewer slot index to i64 for SQLite storage.
pub(super) fn slot_to_i64(slot: usize) -> Result<i64, RepositoryError> {
    i64::try_from(slot).map_err(|_| {
        RepositoryError::storage(
            "store reviewer slot",
            format!("slot {} exceeds maximum storable value", slot),
        )
    })
}

pub(super) fn log_constraint(operation: &str, err: &rusqlite::Error) {
    warn!("Constraint violated during {}: {}", operation, err);
}
