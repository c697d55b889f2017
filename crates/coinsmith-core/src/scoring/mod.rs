//! Session scoring: per-move points and XP, completion tiers, stars and
//! achievements.

mod engine;
mod rating;
mod tiers;

pub use engine::{
    Completion, FinalPayload, ScoreEngine, ScoringConfig, SessionPhase, SessionResult,
    SessionState, COIN_VALUE,
};
pub use rating::{
    engine_stars, presentation_stars, resolve_stars, unlocked_achievements, Achievement,
    PerformanceMetrics, RatingConfig, StarThresholds, MAX_STARS,
};
pub use tiers::{streak_multiplier, AccuracyTier, SpeedTier, MAX_STREAK_LEVEL};
