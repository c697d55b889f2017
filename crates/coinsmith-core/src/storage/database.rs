//! SQLite-based result storage.
//!
//! Provides persistent storage for:
//! - Completed session results (the [`ResultSink`] implementation)
//! - Streak and personal best (the [`ProgressionStore`] implementation)
//! - Key-value store for application state

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::data_dir;
use super::migrations;
use super::progression::{decode_record, encode_record, ProgressionState, ProgressionStore, PROGRESSION_KEY};
use crate::error::{Result, StorageError};
use crate::scoring::FinalPayload;
use crate::sinks::ResultSink;

/// A row of `session_results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResult {
    pub id: i64,
    pub session_id: String,
    pub coins: u32,
    pub final_score: i64,
    pub stars: u8,
    pub time_bonus: i64,
    pub speed_tier: String,
    pub accuracy_tier: String,
    pub streak_level: u32,
    pub achievements: Vec<String>,
    pub time_saved_percentage: f64,
    pub time_extensions_used: u32,
    pub completed_at: DateTime<Utc>,
}

/// SQLite database for results and progression.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/coinsmith/coinsmith.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        Self::open_at(&data_dir()?.join("coinsmith.db"))
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database (tests and throwaway sessions).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        migrations::migrate(&conn).map_err(|e| StorageError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Insert a completed session. Returns the row id.
    pub fn record_result(&self, payload: &FinalPayload) -> Result<i64> {
        let achievements: Vec<&str> = payload.achievements.iter().map(|a| a.key()).collect();
        self.conn.execute(
            "INSERT INTO session_results
                (session_id, coins, final_score, stars, time_bonus, speed_tier, accuracy_tier,
                 streak_level, achievements, time_saved_percentage, time_extensions_used, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                payload.session_id.to_string(),
                payload.coins,
                payload.final_score,
                payload.stars,
                payload.time_bonus,
                payload.speed_tier.label(),
                payload.accuracy_tier.label(),
                payload.streak_level,
                serde_json::to_string(&achievements)?,
                payload.time_saved_percentage,
                payload.time_extensions_used,
                payload.completed_at.to_rfc3339(),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(id, session_id = %payload.session_id, "stored session result");
        Ok(id)
    }

    /// Most recent results first.
    pub fn recent_results(&self, limit: usize) -> Result<Vec<StoredResult>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, coins, final_score, stars, time_bonus, speed_tier,
                    accuracy_tier, streak_level, achievements, time_saved_percentage,
                    time_extensions_used, completed_at
             FROM session_results
             ORDER BY completed_at DESC, id DESC
             LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], |row| {
            Ok((
                StoredResult {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    coins: row.get(2)?,
                    final_score: row.get(3)?,
                    stars: row.get(4)?,
                    time_bonus: row.get(5)?,
                    speed_tier: row.get(6)?,
                    accuracy_tier: row.get(7)?,
                    streak_level: row.get(8)?,
                    achievements: Vec::new(),
                    time_saved_percentage: row.get(10)?,
                    time_extensions_used: row.get(11)?,
                    completed_at: Utc::now(),
                },
                row.get::<_, String>(9)?,
                row.get::<_, String>(12)?,
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (mut result, achievements, completed_at) = row?;
            result.achievements = serde_json::from_str(&achievements)?;
            result.completed_at = DateTime::parse_from_rfc3339(&completed_at)
                .map_err(|e| StorageError::CorruptRecord {
                    record: "session_results".to_string(),
                    message: e.to_string(),
                })?
                .with_timezone(&Utc);
            results.push(result);
        }
        Ok(results)
    }

    pub fn result_count(&self) -> Result<u64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM session_results", [], |row| {
                row.get::<_, u64>(0)
            })?;
        Ok(count)
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

impl ResultSink for Database {
    fn save_final_result(&self, payload: &FinalPayload) -> Result<()> {
        self.record_result(payload).map(|_| ())
    }
}

impl ProgressionStore for Database {
    fn load(&self) -> Result<ProgressionState> {
        match self.kv_get(PROGRESSION_KEY)? {
            Some(raw) => decode_record(&raw),
            None => Ok(ProgressionState::default()),
        }
    }

    fn save(&self, state: &ProgressionState) -> Result<()> {
        self.kv_set(PROGRESSION_KEY, &encode_record(state)?)
    }
}
