//! Database schema migrations for coinsmith.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};
use tracing::{info, warn};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (fresh database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: kv store and session results.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS session_results (
            id                    INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id            TEXT NOT NULL UNIQUE,
            coins                 INTEGER NOT NULL,
            final_score           INTEGER NOT NULL,
            stars                 INTEGER NOT NULL,
            time_bonus            INTEGER NOT NULL,
            speed_tier            TEXT NOT NULL,
            accuracy_tier         TEXT NOT NULL,
            streak_level          INTEGER NOT NULL,
            achievements          TEXT NOT NULL DEFAULT '[]',
            time_saved_percentage REAL NOT NULL,
            completed_at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_session_results_completed_at
            ON session_results(completed_at);",
    )?;
    set_schema_version(&tx, 1)?;
    tx.commit()?;
    info!("applied schema migration v1");
    Ok(())
}

/// Migration v2: track time extensions per stored result.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "ALTER TABLE session_results
            ADD COLUMN time_extensions_used INTEGER NOT NULL DEFAULT 0;",
    )?;
    set_schema_version(&tx, 2)?;
    tx.commit()?;
    info!("applied schema migration v2");
    Ok(())
}
