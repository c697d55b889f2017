//! Session score engine.
//!
//! ```text
//! Uninitialized ── initialize_game ──> Active ── complete_game ──> Completed
//!                                        ^                            │
//!                                        └──── initialize_game ───────┘
//! ```
//!
//! Per-move scoring runs while `Active`. Completion computes the final score
//! once from the tier tables, updates the persisted streak and personal best,
//! and hands the payload to the result and leaderboard sinks.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::rating::{engine_stars, unlocked_achievements, Achievement};
use super::tiers::{streak_multiplier, AccuracyTier, SpeedTier};
use crate::events::GameEvent;
use crate::sinks::ScoreSinks;
use crate::storage::{Progression, ProgressionState};

/// Completion base score per coin.
pub const COIN_VALUE: i64 = 100;

const QUICK_LEARNER_RATIO: f64 = 0.75;
const EFFICIENT_RATIO: f64 = 0.50;

/// Tier multipliers are inexact in binary (300 x 2.3 lands just under 690).
const FLOOR_EPSILON: f64 = 1e-9;

/// `[scoring]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Points per good move before bonuses.
    #[serde(default = "default_base_score")]
    pub base_score: i64,
    #[serde(default = "default_half")]
    pub time_bonus_multiplier: f64,
    #[serde(default = "default_half")]
    pub accuracy_multiplier: f64,
    #[serde(default = "default_xp_per_good_move")]
    pub xp_per_good_move: i64,
    #[serde(default = "default_xp_per_mistake")]
    pub xp_per_mistake: i64,
    /// Speed XP at >= 75% of the time limit remaining.
    #[serde(default = "default_quick_learner_bonus")]
    pub quick_learner_bonus: i64,
    /// Speed XP at >= 50% of the time limit remaining.
    #[serde(default = "default_efficient_bonus")]
    pub efficient_bonus: i64,
}

fn default_base_score() -> i64 {
    100
}
fn default_half() -> f64 {
    0.5
}
fn default_xp_per_good_move() -> i64 {
    10
}
fn default_xp_per_mistake() -> i64 {
    5
}
fn default_quick_learner_bonus() -> i64 {
    15
}
fn default_efficient_bonus() -> i64 {
    5
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_score: default_base_score(),
            time_bonus_multiplier: default_half(),
            accuracy_multiplier: default_half(),
            xp_per_good_move: default_xp_per_good_move(),
            xp_per_mistake: default_xp_per_mistake(),
            quick_learner_bonus: default_quick_learner_bonus(),
            efficient_bonus: default_efficient_bonus(),
        }
    }
}

impl ScoringConfig {
    pub fn sanitized(&self) -> Self {
        let mut cfg = self.clone();
        if cfg.base_score <= 0 {
            warn!(base_score = cfg.base_score, "base_score must be positive, using default");
            cfg.base_score = default_base_score();
        }
        for (name, value) in [
            ("time_bonus_multiplier", &mut cfg.time_bonus_multiplier),
            ("accuracy_multiplier", &mut cfg.accuracy_multiplier),
        ] {
            if !value.is_finite() || *value < 0.0 {
                warn!(field = name, value = *value, "clamping multiplier to 0");
                *value = 0.0;
            }
        }
        for (name, value) in [
            ("xp_per_good_move", &mut cfg.xp_per_good_move),
            ("xp_per_mistake", &mut cfg.xp_per_mistake),
            ("quick_learner_bonus", &mut cfg.quick_learner_bonus),
            ("efficient_bonus", &mut cfg.efficient_bonus),
        ] {
            if *value < 0 {
                warn!(field = name, value = *value, "clamping xp value to 0");
                *value = 0;
            }
        }
        cfg
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Uninitialized,
    Active,
    Completed,
}

/// Counters for the current session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: Uuid,
    pub total_good_moves: u32,
    pub good_moves_completed: u32,
    pub mistakes_made: u32,
    /// Fed by the host; zero means "use good moves".
    pub coins_collected: u32,
    pub current_score: i64,
    pub current_xp: i64,
    pub game_started_at: DateTime<Utc>,
    /// Time limit in seconds; 0 means no limit.
    pub total_time_given: f64,
    /// Active play time accumulated through `advance`.
    pub elapsed: f64,
    pub time_taken: f64,
    pub time_extensions_used: u32,
    pub extension_seconds_granted: f64,
}

impl SessionState {
    fn new(total_good_moves: u32, total_time_given: f64) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            total_good_moves,
            good_moves_completed: 0,
            mistakes_made: 0,
            coins_collected: 0,
            current_score: 0,
            current_xp: 0,
            game_started_at: Utc::now(),
            total_time_given,
            elapsed: 0.0,
            time_taken: 0.0,
            time_extensions_used: 0,
            extension_seconds_granted: 0.0,
        }
    }
}

/// Everything computed at completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: Uuid,
    pub coins: u32,
    pub base_score: i64,
    pub final_score: i64,
    pub stars: u8,
    pub time_bonus: i64,
    pub speed_tier: SpeedTier,
    pub accuracy_tier: AccuracyTier,
    pub streak_multiplier: f64,
    /// Streak level the multiplier was taken from (before this completion).
    pub streak_level_at_completion: u32,
    pub streak_level_after: u32,
    pub personal_best_score: i64,
    pub new_personal_best: bool,
    pub time_saved_percentage: f64,
    pub achievements: BTreeSet<Achievement>,
    pub good_moves: u32,
    pub mistakes: u32,
    pub xp: i64,
    pub time_taken: f64,
    pub time_given: f64,
    pub time_extensions_used: u32,
    /// Replaced by a new session before it finished.
    pub abandoned: bool,
    pub completed_at: DateTime<Utc>,
}

impl SessionResult {
    pub fn payload(&self) -> FinalPayload {
        FinalPayload {
            session_id: self.session_id,
            coins: self.coins,
            final_score: self.final_score,
            stars: self.stars,
            time_bonus: self.time_bonus,
            speed_tier: self.speed_tier,
            accuracy_tier: self.accuracy_tier,
            streak_level: self.streak_level_at_completion,
            achievements: self.achievements.iter().copied().collect(),
            time_saved_percentage: self.time_saved_percentage,
            time_extensions_used: self.time_extensions_used,
            abandoned: self.abandoned,
            completed_at: self.completed_at,
        }
    }
}

/// What the result sink and `SessionCompleted` subscribers receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalPayload {
    pub session_id: Uuid,
    pub coins: u32,
    pub final_score: i64,
    pub stars: u8,
    pub time_bonus: i64,
    pub speed_tier: SpeedTier,
    pub accuracy_tier: AccuracyTier,
    pub streak_level: u32,
    pub achievements: Vec<Achievement>,
    pub time_saved_percentage: f64,
    pub time_extensions_used: u32,
    pub abandoned: bool,
    pub completed_at: DateTime<Utc>,
}

/// Returned by [`ScoreEngine::complete_game`].
#[derive(Debug, Clone)]
pub struct Completion {
    pub result: SessionResult,
    /// Empty when the session had already been completed.
    pub events: Vec<GameEvent>,
}

pub struct ScoreEngine {
    config: ScoringConfig,
    phase: SessionPhase,
    session: SessionState,
    result: Option<SessionResult>,
    progression: Progression,
    sinks: ScoreSinks,
    overflow_warned: bool,
}

impl ScoreEngine {
    pub fn new(config: ScoringConfig, progression: Progression, sinks: ScoreSinks) -> Self {
        Self {
            config: config.sanitized(),
            phase: SessionPhase::Uninitialized,
            session: SessionState::new(1, 0.0),
            result: None,
            progression,
            sinks,
            overflow_warned: false,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    pub fn is_completed(&self) -> bool {
        self.phase == SessionPhase::Completed
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn result(&self) -> Option<&SessionResult> {
        self.result.as_ref()
    }

    pub fn progression(&self) -> ProgressionState {
        self.progression.state()
    }

    pub fn current_score(&self) -> i64 {
        self.session.current_score
    }

    pub fn current_xp(&self) -> i64 {
        self.session.current_xp
    }

    /// Share of the time limit not yet used, 0 when there is no limit.
    pub fn remaining_time_ratio(&self) -> f64 {
        let given = self.session.total_time_given;
        if given <= 0.0 {
            return 0.0;
        }
        ((given - self.session.elapsed).max(0.0) / given).min(1.0)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a session. A still-active session is first closed out as
    /// abandoned with a zero score.
    pub fn initialize_game(&mut self, total_good_moves: i64, time_limit: f64) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if self.is_active() {
            warn!(
                session_id = %self.session.session_id,
                "session restarted while active, abandoning previous session"
            );
            events.push(self.abandon());
        }

        let total = if total_good_moves <= 0 {
            warn!(total_good_moves, "total_good_moves must be positive, using 1");
            1
        } else {
            u32::try_from(total_good_moves).unwrap_or(u32::MAX)
        };
        let limit = if !time_limit.is_finite() || time_limit < 0.0 {
            warn!(time_limit, "invalid time limit, playing without one");
            0.0
        } else {
            time_limit
        };

        self.session = SessionState::new(total, limit);
        self.result = None;
        self.phase = SessionPhase::Active;
        self.overflow_warned = false;

        info!(
            session_id = %self.session.session_id,
            total_good_moves = total,
            time_limit = limit,
            streak = self.progression.state().streak_level,
            "session started"
        );
        events.push(GameEvent::SessionStarted {
            session_id: self.session.session_id,
            total_good_moves: total,
            time_limit_secs: limit,
            at: Utc::now(),
        });
        events
    }

    /// Accumulate active play time.
    pub fn advance(&mut self, delta: f64) {
        if !self.is_active() || !delta.is_finite() || delta <= 0.0 {
            return;
        }
        self.session.elapsed += delta;
    }

    pub fn set_coins_collected(&mut self, coins: u32) {
        if !self.is_active() {
            warn!("set_coins_collected ignored: no active session");
            return;
        }
        self.session.coins_collected = coins;
    }

    pub fn record_good_move(&mut self) -> Vec<GameEvent> {
        if !self.is_active() {
            warn!(phase = ?self.phase, "record_good_move ignored: no active session");
            return Vec::new();
        }

        let ratio = self.remaining_time_ratio();
        let cfg = &self.config;
        let session = &mut self.session;

        // Counted before the accuracy bonus below reads it.
        session.good_moves_completed += 1;
        if session.good_moves_completed > session.total_good_moves && !self.overflow_warned {
            warn!(
                completed = session.good_moves_completed,
                declared = session.total_good_moves,
                "more good moves than declared"
            );
            self.overflow_warned = true;
        }

        let base = cfg.base_score as f64;
        let time_bonus = (ratio * cfg.time_bonus_multiplier * base).round() as i64;
        let progress = session.good_moves_completed as f64 / session.total_good_moves as f64;
        let accuracy_bonus = (progress * cfg.accuracy_multiplier * base).round() as i64;
        let gained = cfg.base_score + time_bonus + accuracy_bonus;

        let speed_xp = if ratio >= QUICK_LEARNER_RATIO {
            cfg.quick_learner_bonus
        } else if ratio >= EFFICIENT_RATIO {
            cfg.efficient_bonus
        } else {
            0
        };

        session.current_score += gained;
        session.current_xp += cfg.xp_per_good_move + speed_xp;

        debug!(
            gained,
            time_bonus,
            accuracy_bonus,
            speed_xp,
            score = session.current_score,
            xp = session.current_xp,
            "good move"
        );

        let at = Utc::now();
        vec![
            GameEvent::ScoreChanged {
                score: session.current_score,
                at,
            },
            GameEvent::XpChanged {
                xp: session.current_xp,
                at,
            },
        ]
    }

    pub fn record_mistake(&mut self) -> Vec<GameEvent> {
        if !self.is_active() {
            warn!(phase = ?self.phase, "record_mistake ignored: no active session");
            return Vec::new();
        }
        let session = &mut self.session;
        session.mistakes_made += 1;
        session.current_xp = (session.current_xp - self.config.xp_per_mistake).max(0);
        debug!(mistakes = session.mistakes_made, xp = session.current_xp, "mistake");

        vec![GameEvent::XpChanged {
            xp: session.current_xp,
            at: Utc::now(),
        }]
    }

    /// Count a granted extension. The scoring time budget stays at the
    /// original limit.
    pub fn record_time_extension(&mut self, seconds: f64) {
        if !self.is_active() {
            warn!("record_time_extension ignored: no active session");
            return;
        }
        self.session.time_extensions_used += 1;
        if seconds.is_finite() && seconds > 0.0 {
            self.session.extension_seconds_granted += seconds;
        }
    }

    /// Finish the session and compute the final result.
    ///
    /// Returns `None` before any session was started. Calling again after
    /// completion returns the stored result with no events and no side
    /// effects.
    pub fn complete_game(&mut self, time_taken: f64) -> Option<Completion> {
        match self.phase {
            SessionPhase::Uninitialized => {
                warn!("complete_game ignored: no session was started");
                return None;
            }
            SessionPhase::Completed => {
                warn!("complete_game ignored: session already completed");
                return self.result.clone().map(|result| Completion {
                    result,
                    events: Vec::new(),
                });
            }
            SessionPhase::Active => {}
        }

        let time_taken = if time_taken.is_finite() && time_taken >= 0.0 {
            time_taken
        } else {
            warn!(time_taken, "invalid time_taken, using tracked elapsed time");
            self.session.elapsed
        };
        self.session.time_taken = time_taken;

        let session = &self.session;
        let coins = if session.coins_collected > 0 {
            session.coins_collected
        } else {
            session.good_moves_completed
        };
        let base_score = coins as i64 * COIN_VALUE;

        let given = session.total_time_given;
        let time_saved = if given > 0.0 {
            ((given - time_taken) / given).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let speed = SpeedTier::from_time_saved(time_saved);
        let accuracy = AccuracyTier::from_mistakes(session.mistakes_made);
        let before = self.progression.state();
        let streak_mult = streak_multiplier(before.streak_level);

        let raw = base_score as f64 * speed.multiplier() * accuracy.multiplier() * streak_mult
            + speed.flat_bonus() as f64;
        let final_score = (raw + FLOOR_EPSILON).floor() as i64;
        let time_bonus = (base_score as f64 * (speed.multiplier() - 1.0)).round() as i64;
        let stars = engine_stars(time_saved, session.mistakes_made);
        let achievements = unlocked_achievements(time_saved);

        let update = self.progression.register_completion(final_score, time_saved);

        let session = &self.session;
        let result = SessionResult {
            session_id: session.session_id,
            coins,
            base_score,
            final_score,
            stars,
            time_bonus,
            speed_tier: speed,
            accuracy_tier: accuracy,
            streak_multiplier: streak_mult,
            streak_level_at_completion: update.streak_before,
            streak_level_after: update.streak_after,
            personal_best_score: update.personal_best_after,
            new_personal_best: update.new_personal_best,
            time_saved_percentage: time_saved,
            achievements,
            good_moves: session.good_moves_completed,
            mistakes: session.mistakes_made,
            xp: session.current_xp,
            time_taken,
            time_given: given,
            time_extensions_used: session.time_extensions_used,
            abandoned: false,
            completed_at: Utc::now(),
        };
        self.phase = SessionPhase::Completed;

        info!(
            session_id = %result.session_id,
            final_score,
            stars,
            speed_tier = %speed,
            accuracy_tier = %accuracy,
            streak = update.streak_after,
            new_personal_best = update.new_personal_best,
            "session completed"
        );

        let payload = result.payload();
        self.deliver(&payload);
        self.result = Some(result.clone());

        Some(Completion {
            result,
            events: vec![GameEvent::SessionCompleted {
                payload,
                at: Utc::now(),
            }],
        })
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Close the active session with a zero score. Progression and sinks are
    /// left alone.
    fn abandon(&mut self) -> GameEvent {
        let session = &self.session;
        let progression = self.progression.state();
        let result = SessionResult {
            session_id: session.session_id,
            coins: session.coins_collected.max(session.good_moves_completed),
            base_score: 0,
            final_score: 0,
            stars: 0,
            time_bonus: 0,
            speed_tier: SpeedTier::Survivor,
            accuracy_tier: AccuracyTier::from_mistakes(session.mistakes_made),
            streak_multiplier: streak_multiplier(progression.streak_level),
            streak_level_at_completion: progression.streak_level,
            streak_level_after: progression.streak_level,
            personal_best_score: progression.personal_best_score,
            new_personal_best: false,
            time_saved_percentage: 0.0,
            achievements: BTreeSet::new(),
            good_moves: session.good_moves_completed,
            mistakes: session.mistakes_made,
            xp: session.current_xp,
            time_taken: session.elapsed,
            time_given: session.total_time_given,
            time_extensions_used: session.time_extensions_used,
            abandoned: true,
            completed_at: Utc::now(),
        };
        self.phase = SessionPhase::Completed;
        let payload = result.payload();
        self.result = Some(result);
        GameEvent::SessionCompleted {
            payload,
            at: Utc::now(),
        }
    }

    fn deliver(&self, payload: &FinalPayload) {
        if let Err(e) = self.sinks.results.save_final_result(payload) {
            error!(error = %e, session_id = %payload.session_id, "failed to save final result");
        }
        if let Err(e) = self.sinks.leaderboard.report_score(payload.final_score) {
            error!(error = %e, "failed to report score");
        }
        for achievement in &payload.achievements {
            if let Err(e) = self.sinks.leaderboard.report_achievement(achievement.key()) {
                error!(error = %e, achievement = %achievement, "failed to report achievement");
            }
        }
    }
}

impl Default for ScoreEngine {
    fn default() -> Self {
        Self::new(
            ScoringConfig::default(),
            Progression::in_memory(),
            ScoreSinks::default(),
        )
    }
}

impl std::fmt::Debug for ScoreEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoreEngine")
            .field("phase", &self.phase)
            .field("session", &self.session)
            .field("progression", &self.progression)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, Result};
    use crate::sinks::{LeaderboardSink, ResultSink};
    use crate::storage::MemoryProgressionStore;
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        results: RefCell<Vec<FinalPayload>>,
        scores: RefCell<Vec<i64>>,
        achievements: RefCell<Vec<String>>,
    }

    impl ResultSink for Recorder {
        fn save_final_result(&self, payload: &FinalPayload) -> Result<()> {
            self.results.borrow_mut().push(payload.clone());
            Ok(())
        }
    }

    impl LeaderboardSink for Recorder {
        fn report_score(&self, score: i64) -> Result<()> {
            self.scores.borrow_mut().push(score);
            Ok(())
        }
        fn report_achievement(&self, key: &str) -> Result<()> {
            self.achievements.borrow_mut().push(key.to_string());
            Ok(())
        }
    }

    struct Broken;

    impl ResultSink for Broken {
        fn save_final_result(&self, _payload: &FinalPayload) -> Result<()> {
            Err(CoreError::Sink {
                sink: "results".into(),
                message: "disk full".into(),
            })
        }
    }

    fn recording_engine() -> (ScoreEngine, Rc<Recorder>) {
        let recorder = Rc::new(Recorder::default());
        let sinks = ScoreSinks {
            results: Box::new(Rc::clone(&recorder)),
            leaderboard: Box::new(Rc::clone(&recorder)),
        };
        let engine = ScoreEngine::new(ScoringConfig::default(), Progression::in_memory(), sinks);
        (engine, recorder)
    }

    fn engine_with_streak(streak: u32) -> ScoreEngine {
        let record = format!(r#"{{"version":2,"streak_level":{streak},"personal_best_score":0}}"#);
        let progression = Progression::load(Box::new(MemoryProgressionStore::with_record(record)));
        ScoreEngine::new(ScoringConfig::default(), progression, ScoreSinks::default())
    }

    #[test]
    fn five_fast_perfect_moves_score_2450() {
        let (mut engine, recorder) = recording_engine();
        engine.initialize_game(5, 60.0);
        for _ in 0..5 {
            engine.advance(1.2);
            engine.record_good_move();
        }
        let completion = engine.complete_game(6.0).unwrap();
        let r = completion.result;

        assert_eq!(r.coins, 5);
        assert_eq!(r.base_score, 500);
        assert_eq!(r.speed_tier, SpeedTier::SpeedDemon);
        assert_eq!(r.accuracy_tier, AccuracyTier::Perfect);
        assert_eq!(r.streak_multiplier, 1.0);
        assert_eq!(r.final_score, 2450);
        assert_eq!(r.time_bonus, 800);
        assert_eq!(r.stars, 3);
        assert!(r.achievements.contains(&Achievement::SpeedDemon));
        assert!(r.achievements.contains(&Achievement::TimeMaster));
        assert_eq!(r.streak_level_after, 1);
        assert!(r.new_personal_best);
        assert_eq!(engine.progression().personal_best_score, 2450);

        assert_eq!(recorder.results.borrow().len(), 1);
        assert_eq!(*recorder.scores.borrow(), vec![2450]);
        assert_eq!(
            *recorder.achievements.borrow(),
            vec!["Speed Demon".to_string(), "Time Master".to_string()]
        );
        assert!(matches!(
            completion.events.as_slice(),
            [GameEvent::SessionCompleted { .. }]
        ));
    }

    #[test]
    fn completion_is_idempotent() {
        let (mut engine, recorder) = recording_engine();
        engine.initialize_game(2, 30.0);
        engine.record_good_move();
        engine.record_good_move();
        let first = engine.complete_game(10.0).unwrap();
        let second = engine.complete_game(2.0).unwrap();

        assert_eq!(first.result, second.result);
        assert!(second.events.is_empty());
        assert_eq!(engine.progression().streak_level, 1);
        assert_eq!(recorder.results.borrow().len(), 1);
    }

    #[test]
    fn repeated_completion_logs_warning() {
        let mut engine = ScoreEngine::default();
        engine.initialize_game(1, 30.0);
        engine.record_good_move();
        engine.complete_game(5.0);

        let logs = crate::testing::capture_logs(|| {
            engine.complete_game(5.0);
        });
        assert!(logs.contains("WARN"));
        assert!(logs.contains("complete_game ignored: session already completed"));
    }

    #[test]
    fn complete_before_start_returns_none() {
        let mut engine = ScoreEngine::default();
        assert!(engine.complete_game(5.0).is_none());
        assert_eq!(engine.phase(), SessionPhase::Uninitialized);
    }

    #[test]
    fn no_time_limit_is_survivor_without_speed_xp() {
        let mut engine = ScoreEngine::default();
        engine.initialize_game(3, 0.0);
        for _ in 0..3 {
            engine.advance(10.0);
            engine.record_good_move();
        }
        // 10 XP per move, no speed XP.
        assert_eq!(engine.current_xp(), 30);

        let r = engine.complete_game(30.0).unwrap().result;
        assert_eq!(r.time_saved_percentage, 0.0);
        assert_eq!(r.speed_tier, SpeedTier::Survivor);
        // 300 x 1.1 x 1.5 + 10
        assert_eq!(r.final_score, 505);
        assert_eq!(r.stars, 1);
        assert_eq!(r.streak_level_after, 0);
    }

    #[test]
    fn accuracy_bonus_counts_the_current_move() {
        let mut engine = ScoreEngine::default();
        engine.initialize_game(2, 0.0);
        engine.record_good_move();
        // 100 base + 0 time bonus + round(1/2 x 0.5 x 100)
        assert_eq!(engine.current_score(), 125);
        engine.record_good_move();
        assert_eq!(engine.current_score(), 125 + 150);
    }

    #[test]
    fn per_move_time_bonus_and_speed_xp() {
        let mut engine = ScoreEngine::default();
        engine.initialize_game(10, 60.0);
        engine.advance(15.0);
        engine.record_good_move();
        // ratio 0.75: round(37.5) = 38 time bonus, round(5) accuracy bonus
        assert_eq!(engine.current_score(), 100 + 38 + 5);
        assert_eq!(engine.current_xp(), 10 + 15);

        engine.advance(15.0);
        engine.record_good_move();
        // ratio 0.5: efficient bonus
        assert_eq!(engine.current_xp(), 25 + 10 + 5);

        engine.advance(30.0);
        engine.record_good_move();
        assert_eq!(engine.current_xp(), 40 + 10);
    }

    #[test]
    fn mistakes_floor_xp_at_zero() {
        let mut engine = ScoreEngine::default();
        engine.initialize_game(5, 0.0);
        engine.record_good_move();
        engine.record_mistake();
        assert_eq!(engine.current_xp(), 5);
        engine.record_mistake();
        engine.record_mistake();
        assert_eq!(engine.current_xp(), 0);
        assert_eq!(engine.session().mistakes_made, 3);
    }

    #[test]
    fn streak_multiplier_uses_level_before_update() {
        let mut engine = engine_with_streak(5);
        engine.initialize_game(1, 10.0);
        engine.record_good_move();
        let r = engine.complete_game(1.0).unwrap().result;
        assert!((r.streak_multiplier - 1.5).abs() < 1e-12);
        assert_eq!(r.streak_level_at_completion, 5);
        assert_eq!(r.streak_level_after, 6);
        // 100 x 2.6 x 1.5 x 1.5 + 500
        assert_eq!(r.final_score, 1085);
    }

    #[test]
    fn restart_abandons_active_session() {
        let (mut engine, recorder) = recording_engine();
        engine.initialize_game(4, 60.0);
        engine.record_good_move();
        engine.record_good_move();
        let first_id = engine.session().session_id;

        let events = engine.initialize_game(4, 60.0);
        assert_eq!(events.len(), 2);
        match &events[0] {
            GameEvent::SessionCompleted { payload, .. } => {
                assert_eq!(payload.session_id, first_id);
                assert_eq!(payload.final_score, 0);
                assert!(payload.abandoned);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(events[1], GameEvent::SessionStarted { .. }));

        assert!(engine.is_active());
        assert_eq!(engine.current_score(), 0);
        assert_eq!(engine.progression(), ProgressionState::default());
        assert!(recorder.results.borrow().is_empty());
        assert!(recorder.scores.borrow().is_empty());
    }

    #[test]
    fn invalid_inputs_are_coerced() {
        let mut engine = ScoreEngine::default();
        engine.initialize_game(0, f64::NAN);
        assert_eq!(engine.session().total_good_moves, 1);
        assert_eq!(engine.session().total_time_given, 0.0);
    }

    #[test]
    fn recording_outside_active_is_ignored() {
        let mut engine = ScoreEngine::default();
        assert!(engine.record_good_move().is_empty());
        assert!(engine.record_mistake().is_empty());

        engine.initialize_game(1, 10.0);
        engine.record_good_move();
        engine.complete_game(2.0);
        assert!(engine.record_good_move().is_empty());
        assert_eq!(engine.session().good_moves_completed, 1);
    }

    #[test]
    fn extensions_do_not_grow_the_time_budget() {
        let mut engine = ScoreEngine::default();
        engine.initialize_game(2, 20.0);
        engine.record_time_extension(15.0);
        assert_eq!(engine.session().total_time_given, 20.0);
        assert_eq!(engine.session().time_extensions_used, 1);
        assert_eq!(engine.session().extension_seconds_granted, 15.0);

        engine.record_good_move();
        let r = engine.complete_game(30.0).unwrap().result;
        assert_eq!(r.time_saved_percentage, 0.0);
        assert_eq!(r.time_extensions_used, 1);
        assert!(r.achievements.contains(&Achievement::LastSecondHero));
    }

    #[test]
    fn external_coin_count_wins() {
        let mut engine = ScoreEngine::default();
        engine.initialize_game(3, 0.0);
        engine.record_good_move();
        engine.set_coins_collected(7);
        assert_eq!(engine.complete_game(1.0).unwrap().result.coins, 7);
    }

    #[test]
    fn failing_sink_does_not_block_completion() {
        let sinks = ScoreSinks {
            results: Box::new(Broken),
            ..ScoreSinks::default()
        };
        let mut engine = ScoreEngine::new(ScoringConfig::default(), Progression::in_memory(), sinks);
        engine.initialize_game(1, 10.0);
        engine.record_good_move();
        assert!(engine.complete_game(1.0).is_some());
        assert!(engine.is_completed());
        assert_eq!(engine.progression().streak_level, 1);
    }

    proptest! {
        #[test]
        fn xp_never_negative(ops in proptest::collection::vec(any::<bool>(), 0..128)) {
            let mut engine = ScoreEngine::default();
            engine.initialize_game(16, 60.0);
            for good in ops {
                if good {
                    engine.record_good_move();
                } else {
                    engine.record_mistake();
                }
                prop_assert!(engine.current_xp() >= 0);
            }
        }

        #[test]
        fn stars_and_time_saved_stay_in_range(moves in 1u32..20, taken in 0.0f64..200.0, mistakes in 0u32..8) {
            let mut engine = ScoreEngine::default();
            engine.initialize_game(moves as i64, 60.0);
            for _ in 0..moves {
                engine.record_good_move();
            }
            for _ in 0..mistakes {
                engine.record_mistake();
            }
            let r = engine.complete_game(taken).unwrap().result;
            prop_assert!((1..=3).contains(&r.stars));
            prop_assert!((0.0..=1.0).contains(&r.time_saved_percentage));
        }
    }
}
