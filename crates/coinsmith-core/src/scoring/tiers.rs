//! Threshold tables for the completion score.
//!
//! | time saved >= | tier        | multiplier | flat bonus |
//! |---------------|-------------|------------|------------|
//! | 0.90          | Speed Demon | 2.6        | 500        |
//! | 0.75          | Swift       | 2.3        | 300        |
//! | 0.50          | Fast        | 2.0        | 150        |
//! | 0.25          | Steady      | 1.5        | 50         |
//! | otherwise     | Survivor    | 1.1        | 10         |

use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_STREAK_LEVEL: u32 = 10;
const STREAK_STEP: f64 = 0.1;
const MAX_STREAK_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpeedTier {
    #[serde(rename = "Speed Demon")]
    SpeedDemon,
    Swift,
    Fast,
    Steady,
    Survivor,
}

/// Descending thresholds; the first match wins.
const SPEED_TIERS: [(f64, SpeedTier); 4] = [
    (0.90, SpeedTier::SpeedDemon),
    (0.75, SpeedTier::Swift),
    (0.50, SpeedTier::Fast),
    (0.25, SpeedTier::Steady),
];

impl SpeedTier {
    pub fn from_time_saved(time_saved: f64) -> Self {
        SPEED_TIERS
            .iter()
            .find(|(threshold, _)| time_saved >= *threshold)
            .map(|(_, tier)| *tier)
            .unwrap_or(SpeedTier::Survivor)
    }

    pub fn multiplier(self) -> f64 {
        match self {
            SpeedTier::SpeedDemon => 2.6,
            SpeedTier::Swift => 2.3,
            SpeedTier::Fast => 2.0,
            SpeedTier::Steady => 1.5,
            SpeedTier::Survivor => 1.1,
        }
    }

    pub fn flat_bonus(self) -> i64 {
        match self {
            SpeedTier::SpeedDemon => 500,
            SpeedTier::Swift => 300,
            SpeedTier::Fast => 150,
            SpeedTier::Steady => 50,
            SpeedTier::Survivor => 10,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SpeedTier::SpeedDemon => "Speed Demon",
            SpeedTier::Swift => "Swift",
            SpeedTier::Fast => "Fast",
            SpeedTier::Steady => "Steady",
            SpeedTier::Survivor => "Survivor",
        }
    }
}

impl fmt::Display for SpeedTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccuracyTier {
    Perfect,
    #[serde(rename = "Near Perfect")]
    NearPerfect,
    Good,
}

impl AccuracyTier {
    pub fn from_mistakes(mistakes: u32) -> Self {
        match mistakes {
            0 => AccuracyTier::Perfect,
            1..=2 => AccuracyTier::NearPerfect,
            _ => AccuracyTier::Good,
        }
    }

    pub fn multiplier(self) -> f64 {
        match self {
            AccuracyTier::Perfect => 1.5,
            AccuracyTier::NearPerfect => 1.2,
            AccuracyTier::Good => 1.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AccuracyTier::Perfect => "Perfect",
            AccuracyTier::NearPerfect => "Near Perfect",
            AccuracyTier::Good => "Good",
        }
    }
}

impl fmt::Display for AccuracyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// `min(1 + level * 0.1, 2.0)`
pub fn streak_multiplier(streak_level: u32) -> f64 {
    (1.0 + streak_level as f64 * STREAK_STEP).min(MAX_STREAK_MULTIPLIER)
}
