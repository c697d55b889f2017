//! # Coinsmith Core Library
//!
//! Session scoring and timing for the coin-building mini-game. The core is
//! frame-driven and single-threaded: the host calls `update(delta)` once per
//! frame and forwards player input; everything observable comes back as a
//! [`GameEvent`].
//!
//! ## Architecture
//!
//! - **Timer**: countdown state machine with one-shot warning and expiry
//!   events, plus the ad / purchase time-extension coordinator
//! - **Scoring**: per-move points and XP, completion tiers, stars and
//!   achievements
//! - **Storage**: SQLite result history and progression, TOML configuration
//! - **Session**: composition root wiring the above to audio and the event bus
//!
//! ## Key Components
//!
//! - [`GameSession`]: one session's timer, coordinator, engine and tracker
//! - [`ScoreEngine`]: score, XP and completion
//! - [`CountdownTimer`]: countdown state machine
//! - [`TimeExtensionCoordinator`]: extension offers
//! - [`Database`]: result and progression persistence
//! - [`GameConfig`]: configuration management

pub mod analytics;
pub mod error;
pub mod events;
pub mod scoring;
pub mod session;
pub mod sinks;
pub mod storage;
pub mod timer;

#[cfg(test)]
mod testing;

pub use analytics::PerformanceTracker;
pub use error::{ConfigError, CoreError, StorageError};
pub use events::{EventBus, GameEvent, SubscriptionId};
pub use scoring::{
    Achievement, AccuracyTier, FinalPayload, ScoreEngine, ScoringConfig, SessionPhase,
    SessionResult, SpeedTier,
};
pub use session::GameSession;
pub use sinks::{AudioSink, LeaderboardSink, ResultSink, ScoreSinks};
pub use storage::{Database, GameConfig, Progression, ProgressionState, ProgressionStore};
pub use timer::{
    CountdownTimer, ExtensionConfig, ExtensionKind, OfferState, OfferTrigger,
    TimeExtensionCoordinator, TimerConfig,
};
