//! Outbound collaborators: audio playback, result persistence, leaderboard.
//!
//! Every method is best effort from the session's point of view. Callers
//! log failures and carry on.

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::scoring::FinalPayload;

/// Identifies a looping clip so it can be stopped later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoopHandle(pub u64);

pub trait AudioSink {
    fn play_sound(&mut self, clip: &str);
    fn play_looping_sound(&mut self, clip: &str) -> LoopHandle;
    fn stop_looping_sound(&mut self, handle: LoopHandle);
}

pub trait ResultSink {
    fn save_final_result(&self, payload: &FinalPayload) -> Result<()>;
}

pub trait LeaderboardSink {
    fn report_score(&self, score: i64) -> Result<()>;
    fn report_achievement(&self, key: &str) -> Result<()>;
}

impl<T: ResultSink + ?Sized> ResultSink for Rc<T> {
    fn save_final_result(&self, payload: &FinalPayload) -> Result<()> {
        (**self).save_final_result(payload)
    }
}

impl<T: LeaderboardSink + ?Sized> LeaderboardSink for Rc<T> {
    fn report_score(&self, score: i64) -> Result<()> {
        (**self).report_score(score)
    }

    fn report_achievement(&self, key: &str) -> Result<()> {
        (**self).report_achievement(key)
    }
}

// ── Null implementations ────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudioSink;

impl AudioSink for NullAudioSink {
    fn play_sound(&mut self, _clip: &str) {}

    fn play_looping_sound(&mut self, _clip: &str) -> LoopHandle {
        LoopHandle(0)
    }

    fn stop_looping_sound(&mut self, _handle: LoopHandle) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullResultSink;

impl ResultSink for NullResultSink {
    fn save_final_result(&self, _payload: &FinalPayload) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullLeaderboardSink;

impl LeaderboardSink for NullLeaderboardSink {
    fn report_score(&self, _score: i64) -> Result<()> {
        Ok(())
    }

    fn report_achievement(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}

/// Audio sink for headless hosts: every call becomes a `debug!` line.
#[derive(Debug, Default)]
pub struct LoggingAudioSink {
    next_handle: u64,
}

impl AudioSink for LoggingAudioSink {
    fn play_sound(&mut self, clip: &str) {
        debug!(clip, "play sound");
    }

    fn play_looping_sound(&mut self, clip: &str) -> LoopHandle {
        self.next_handle += 1;
        debug!(clip, handle = self.next_handle, "start loop");
        LoopHandle(self.next_handle)
    }

    fn stop_looping_sound(&mut self, handle: LoopHandle) {
        debug!(handle = handle.0, "stop loop");
    }
}

/// Result and leaderboard sinks handed to the score engine.
pub struct ScoreSinks {
    pub results: Box<dyn ResultSink>,
    pub leaderboard: Box<dyn LeaderboardSink>,
}

impl Default for ScoreSinks {
    fn default() -> Self {
        Self {
            results: Box::new(NullResultSink),
            leaderboard: Box::new(NullLeaderboardSink),
        }
    }
}

impl std::fmt::Debug for ScoreSinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoreSinks").finish_non_exhaustive()
    }
}

/// `[audio]` config section: clip ids per cue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_warning_loop")]
    pub warning_loop: String,
    #[serde(default = "default_good_move")]
    pub good_move: String,
    #[serde(default = "default_mistake")]
    pub mistake: String,
    #[serde(default = "default_time_added")]
    pub time_added: String,
    #[serde(default = "default_session_complete")]
    pub session_complete: String,
}

fn default_warning_loop() -> String {
    "timer_warning".to_string()
}
fn default_good_move() -> String {
    "coin_placed".to_string()
}
fn default_mistake() -> String {
    "mistake".to_string()
}
fn default_time_added() -> String {
    "time_added".to_string()
}
fn default_session_complete() -> String {
    "session_complete".to_string()
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            warning_loop: default_warning_loop(),
            good_move: default_good_move(),
            mistake: default_mistake(),
            time_added: default_time_added(),
            session_complete: default_session_complete(),
        }
    }
}
