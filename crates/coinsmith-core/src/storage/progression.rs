//! Persisted streak level and personal best.
//!
//! The record is stored as versioned JSON. Older shapes are upgraded by
//! explicit per-version functions before use:
//!
//! ```text
//! v1  { "streak": 4, "best": 1200 }
//! v2  { "version": 2, "streak_level": 4, "personal_best_score": 1200 }
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{CoreError, Result, StorageError};
use crate::scoring::MAX_STREAK_LEVEL;

/// kv key the record lives under.
pub const PROGRESSION_KEY: &str = "progression";
pub const CURRENT_RECORD_VERSION: u32 = 2;

/// Time saved required to grow the streak.
const STREAK_THRESHOLD: f64 = 0.50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressionState {
    pub streak_level: u32,
    pub personal_best_score: i64,
}

/// What a completion did to the progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionUpdate {
    pub streak_before: u32,
    pub streak_after: u32,
    pub personal_best_before: i64,
    pub personal_best_after: i64,
    pub new_personal_best: bool,
}

impl ProgressionState {
    /// Streak grows by one (capped) at >= 50% time saved and resets to zero
    /// otherwise. The personal best only ever grows.
    pub fn register_completion(&mut self, final_score: i64, time_saved: f64) -> ProgressionUpdate {
        let streak_before = self.streak_level;
        let personal_best_before = self.personal_best_score;

        self.streak_level = if time_saved >= STREAK_THRESHOLD {
            (self.streak_level + 1).min(MAX_STREAK_LEVEL)
        } else {
            0
        };
        let new_personal_best = final_score > self.personal_best_score;
        if new_personal_best {
            self.personal_best_score = final_score;
        }

        ProgressionUpdate {
            streak_before,
            streak_after: self.streak_level,
            personal_best_before,
            personal_best_after: self.personal_best_score,
            new_personal_best,
        }
    }

    fn clamped(self) -> Self {
        Self {
            streak_level: self.streak_level.min(MAX_STREAK_LEVEL),
            personal_best_score: self.personal_best_score.max(0),
        }
    }
}

// ── Record versions ─────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct ProgressionRecordV1 {
    #[serde(default)]
    streak: i64,
    #[serde(default)]
    best: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProgressionRecordV2 {
    version: u32,
    streak_level: u32,
    personal_best_score: i64,
}

fn migrate_v1(record: ProgressionRecordV1) -> ProgressionRecordV2 {
    ProgressionRecordV2 {
        version: 2,
        streak_level: record.streak.clamp(0, MAX_STREAK_LEVEL as i64) as u32,
        personal_best_score: record.best.max(0),
    }
}

fn corrupt(message: impl ToString) -> StorageError {
    StorageError::CorruptRecord {
        record: PROGRESSION_KEY.to_string(),
        message: message.to_string(),
    }
}

/// Serialize at the current record version.
pub fn encode_record(state: &ProgressionState) -> Result<String> {
    let record = ProgressionRecordV2 {
        version: CURRENT_RECORD_VERSION,
        streak_level: state.streak_level,
        personal_best_score: state.personal_best_score,
    };
    Ok(serde_json::to_string(&record)?)
}

/// Parse a stored record of any known version.
pub fn decode_record(raw: &str) -> Result<ProgressionState> {
    let value: Value = serde_json::from_str(raw).map_err(corrupt)?;

    let record = match value.get("version").map(Value::as_u64) {
        None => {
            let v1: ProgressionRecordV1 = serde_json::from_value(value).map_err(corrupt)?;
            info!(streak = v1.streak, best = v1.best, "migrating progression record v1 -> v2");
            migrate_v1(v1)
        }
        Some(Some(2)) => serde_json::from_value::<ProgressionRecordV2>(value).map_err(corrupt)?,
        Some(Some(version)) => {
            return Err(StorageError::UnsupportedVersion {
                record: PROGRESSION_KEY.to_string(),
                version: u32::try_from(version).unwrap_or(u32::MAX),
            }
            .into())
        }
        Some(None) => return Err(corrupt("version is not an unsigned integer").into()),
    };

    Ok(ProgressionState {
        streak_level: record.streak_level,
        personal_best_score: record.personal_best_score,
    }
    .clamped())
}

// ── Stores ──────────────────────────────────────────────────────────

/// Durable home for [`ProgressionState`].
pub trait ProgressionStore {
    /// Returns the default state when nothing has been saved yet.
    fn load(&self) -> Result<ProgressionState>;
    fn save(&self, state: &ProgressionState) -> Result<()>;
}

impl<T: ProgressionStore + ?Sized> ProgressionStore for Rc<T> {
    fn load(&self) -> Result<ProgressionState> {
        (**self).load()
    }

    fn save(&self, state: &ProgressionState) -> Result<()> {
        (**self).save(state)
    }
}

/// Keeps the encoded record in memory. Used by tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryProgressionStore {
    record: RefCell<Option<String>>,
}

impl MemoryProgressionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with a raw stored record, e.g. a legacy v1 document.
    pub fn with_record(raw: impl Into<String>) -> Self {
        Self {
            record: RefCell::new(Some(raw.into())),
        }
    }

    pub fn raw_record(&self) -> Option<String> {
        self.record.borrow().clone()
    }
}

impl ProgressionStore for MemoryProgressionStore {
    fn load(&self) -> Result<ProgressionState> {
        match self.record.borrow().as_deref() {
            Some(raw) => decode_record(raw),
            None => Ok(ProgressionState::default()),
        }
    }

    fn save(&self, state: &ProgressionState) -> Result<()> {
        *self.record.borrow_mut() = Some(encode_record(state)?);
        Ok(())
    }
}

/// In-memory progression plus the store it is persisted to.
pub struct Progression {
    state: ProgressionState,
    store: Box<dyn ProgressionStore>,
    /// Set when the stored record is from a newer build. Completions then
    /// stay in memory so that record is never downgraded.
    read_only: bool,
}

impl Progression {
    /// Load from `store`. An unreadable record is logged and replaced by the
    /// default state; the next save overwrites it. A record with a newer
    /// version is left untouched: the session plays from defaults and
    /// nothing is saved until an explicit [`Progression::reset`].
    pub fn load(store: Box<dyn ProgressionStore>) -> Self {
        let mut read_only = false;
        let state = match store.load() {
            Ok(state) => state,
            Err(CoreError::Storage(e @ StorageError::UnsupportedVersion { .. })) => {
                error!(error = %e, "progression record is newer than this build, not saving");
                read_only = true;
                ProgressionState::default()
            }
            Err(e) => {
                warn!(error = %e, "could not load progression, starting fresh");
                ProgressionState::default()
            }
        };
        Self {
            state,
            store,
            read_only,
        }
    }

    pub fn in_memory() -> Self {
        Self::load(Box::new(MemoryProgressionStore::new()))
    }

    pub fn state(&self) -> ProgressionState {
        self.state
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Apply a completion and persist immediately. A failed save is logged;
    /// the in-memory state advances regardless.
    pub fn register_completion(&mut self, final_score: i64, time_saved: f64) -> ProgressionUpdate {
        let update = self.state.register_completion(final_score, time_saved);
        if self.read_only {
            error!("progression store holds a newer record, completion not persisted");
            return update;
        }
        if let Err(e) = self.store.save(&self.state) {
            error!(error = %e, "failed to persist progression");
        }
        update
    }

    /// Clear streak and personal best. This also replaces a newer record.
    pub fn reset(&mut self) -> Result<()> {
        self.state = ProgressionState::default();
        self.store.save(&self.state)?;
        self.read_only = false;
        Ok(())
    }
}

impl std::fmt::Debug for Progression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progression")
            .field("state", &self.state)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}
