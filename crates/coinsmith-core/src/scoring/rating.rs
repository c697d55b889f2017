//! Star rating and achievement derivation.
//!
//! Two independent star paths exist:
//!
//! - the engine path ([`engine_stars`]), derived from time saved and mistakes
//!   at completion;
//! - the presentation path ([`presentation_stars`]), derived from raw
//!   performance metrics against a score threshold table with a bonus and a
//!   penalty rule.
//!
//! [`resolve_stars`] picks between them using `prefer_score_manager_stars`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub const MAX_STARS: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Achievement {
    #[serde(rename = "Speed Demon")]
    SpeedDemon,
    #[serde(rename = "Time Master")]
    TimeMaster,
    #[serde(rename = "Last Second Hero")]
    LastSecondHero,
}

impl Achievement {
    pub fn key(self) -> &'static str {
        match self {
            Achievement::SpeedDemon => "Speed Demon",
            Achievement::TimeMaster => "Time Master",
            Achievement::LastSecondHero => "Last Second Hero",
        }
    }
}

impl fmt::Display for Achievement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// 3 stars for >= 75% time saved with at most 2 mistakes, 2 for >= 50%
/// time saved, otherwise 1.
pub fn engine_stars(time_saved: f64, mistakes: u32) -> u8 {
    if time_saved >= 0.75 && mistakes <= 2 {
        3
    } else if time_saved >= 0.50 {
        2
    } else {
        1
    }
}

pub fn unlocked_achievements(time_saved: f64) -> BTreeSet<Achievement> {
    let mut unlocked = BTreeSet::new();
    if time_saved >= 0.90 {
        unlocked.insert(Achievement::SpeedDemon);
    }
    if time_saved >= 0.80 {
        unlocked.insert(Achievement::TimeMaster);
    }
    if time_saved <= 0.05 {
        unlocked.insert(Achievement::LastSecondHero);
    }
    unlocked
}

/// Raw numbers the presentation layer rates a session by.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub score: i64,
    /// Correct attempts over all attempts, 0..=1.
    pub accuracy: f64,
    /// Fraction of the time limit left unused, 0..=1.
    pub time_efficiency: f64,
    pub mistakes: u32,
}

/// Threshold table for the presentation star path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarThresholds {
    /// Ascending; one star per threshold reached.
    #[serde(default = "default_score_thresholds")]
    pub score_thresholds: Vec<i64>,
    #[serde(default = "default_bonus_accuracy")]
    pub bonus_accuracy: f64,
    #[serde(default = "default_bonus_time_efficiency")]
    pub bonus_time_efficiency: f64,
    #[serde(default = "default_penalty_mistakes")]
    pub penalty_mistakes: u32,
}

fn default_score_thresholds() -> Vec<i64> {
    vec![300, 1000, 2000]
}
fn default_bonus_accuracy() -> f64 {
    0.9
}
fn default_bonus_time_efficiency() -> f64 {
    0.75
}
fn default_penalty_mistakes() -> u32 {
    5
}

impl Default for StarThresholds {
    fn default() -> Self {
        Self {
            score_thresholds: default_score_thresholds(),
            bonus_accuracy: default_bonus_accuracy(),
            bonus_time_efficiency: default_bonus_time_efficiency(),
            penalty_mistakes: default_penalty_mistakes(),
        }
    }
}

/// `[rating]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingConfig {
    /// Use the score engine's own stars whenever it produced a rating.
    #[serde(default = "default_prefer_engine")]
    pub prefer_score_manager_stars: bool,
    #[serde(default)]
    pub thresholds: StarThresholds,
}

fn default_prefer_engine() -> bool {
    true
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            prefer_score_manager_stars: true,
            thresholds: StarThresholds::default(),
        }
    }
}

pub fn presentation_stars(metrics: &PerformanceMetrics, thresholds: &StarThresholds) -> u8 {
    let reached = thresholds
        .score_thresholds
        .iter()
        .filter(|t| metrics.score >= **t)
        .count() as i32;

    let mut stars = reached;
    if metrics.accuracy >= thresholds.bonus_accuracy
        && metrics.time_efficiency >= thresholds.bonus_time_efficiency
    {
        stars += 1;
    }
    if metrics.mistakes >= thresholds.penalty_mistakes {
        stars -= 1;
    }

    stars.clamp(0, MAX_STARS as i32) as u8
}

/// Engine stars win when preferred and present (> 0); otherwise the
/// presentation path decides.
pub fn resolve_stars(engine_stars: u8, metrics: &PerformanceMetrics, config: &RatingConfig) -> u8 {
    if config.prefer_score_manager_stars && engine_stars > 0 {
        engine_stars.min(MAX_STARS)
    } else {
        presentation_stars(metrics, &config.thresholds)
    }
}
