//! Per-session performance tracking for the presentation star path.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::scoring::PerformanceMetrics;

/// One answered item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub correct: bool,
    /// Seconds since the previous attempt (or session start).
    pub response_time: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PerformanceTracker {
    declared_items: u32,
    attempts: Vec<Attempt>,
    overflow_warned: bool,
}

impl PerformanceTracker {
    pub fn new(declared_items: u32) -> Self {
        Self {
            declared_items,
            attempts: Vec::new(),
            overflow_warned: false,
        }
    }

    /// Start over for a new session.
    pub fn reset(&mut self, declared_items: u32) {
        *self = Self::new(declared_items);
    }

    pub fn declared_items(&self) -> u32 {
        self.declared_items
    }

    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    /// Every attempt is kept. Mistakes are retries of an item, so only
    /// correct attempts are held against the declared item count; the first
    /// correct attempt past it logs a consistency warning.
    pub fn record_attempt(&mut self, correct: bool, response_time: f64) {
        let response_time = if response_time.is_finite() && response_time > 0.0 {
            response_time
        } else {
            0.0
        };
        self.attempts.push(Attempt {
            correct,
            response_time,
        });

        let correct_count = self.correct_count();
        if correct_count > self.declared_items as usize && !self.overflow_warned {
            warn!(
                correct = correct_count,
                declared = self.declared_items,
                "more correct attempts than declared items"
            );
            self.overflow_warned = true;
        }
    }

    pub fn correct_count(&self) -> usize {
        self.attempts.iter().filter(|a| a.correct).count()
    }

    pub fn incorrect_count(&self) -> usize {
        self.attempts.len() - self.correct_count()
    }

    /// Correct over all attempts; 0 before the first attempt.
    pub fn accuracy(&self) -> f64 {
        if self.attempts.is_empty() {
            return 0.0;
        }
        self.correct_count() as f64 / self.attempts.len() as f64
    }

    pub fn average_response_time(&self) -> Option<f64> {
        if self.attempts.is_empty() {
            return None;
        }
        let total: f64 = self.attempts.iter().map(|a| a.response_time).sum();
        Some(total / self.attempts.len() as f64)
    }

    /// Unused share of the limit, 0..=1. No limit means 0.
    pub fn time_efficiency(time_taken: f64, time_given: f64) -> f64 {
        if time_given <= 0.0 || !time_given.is_finite() {
            return 0.0;
        }
        ((time_given - time_taken) / time_given).clamp(0.0, 1.0)
    }

    pub fn metrics(&self, score: i64, time_taken: f64, time_given: f64) -> PerformanceMetrics {
        PerformanceMetrics {
            score,
            accuracy: self.accuracy(),
            time_efficiency: Self::time_efficiency(time_taken, time_given),
            mistakes: u32::try_from(self.incorrect_count()).unwrap_or(u32::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tracker() {
        let t = PerformanceTracker::new(3);
        assert_eq!(t.accuracy(), 0.0);
        assert!(t.average_response_time().is_none());
    }

    #[test]
    fn accuracy_and_response_time() {
        let mut t = PerformanceTracker::new(3);
        t.record_attempt(true, 2.0);
        t.record_attempt(false, 4.0);
        t.record_attempt(true, 1.0);
        t.record_attempt(true, -5.0);

        assert_eq!(t.correct_count(), 3);
        assert_eq!(t.incorrect_count(), 1);
        assert_eq!(t.accuracy(), 0.75);
        assert_eq!(t.average_response_time(), Some(7.0 / 4.0));
    }

    #[test]
    fn overflow_is_still_counted() {
        let mut t = PerformanceTracker::new(1);
        t.record_attempt(true, 1.0);
        t.record_attempt(true, 1.0);
        t.record_attempt(true, 1.0);
        assert_eq!(t.correct_count(), 3);
        assert_eq!(t.accuracy(), 1.0);
    }

    #[test]
    fn overflow_warns_once_and_ignores_mistakes() {
        let logs = crate::testing::capture_logs(|| {
            let mut t = PerformanceTracker::new(2);
            t.record_attempt(true, 1.0);
            t.record_attempt(false, 1.0);
            t.record_attempt(false, 1.0);
            t.record_attempt(true, 1.0);
            assert_eq!(t.attempts().len(), 4);
            t.record_attempt(true, 1.0);
            t.record_attempt(true, 1.0);
            assert_eq!(t.correct_count(), 4);
        });
        assert_eq!(
            logs.matches("more correct attempts than declared items").count(),
            1
        );
    }

    #[test]
    fn time_efficiency_is_clamped() {
        assert_eq!(PerformanceTracker::time_efficiency(15.0, 60.0), 0.75);
        assert_eq!(PerformanceTracker::time_efficiency(90.0, 60.0), 0.0);
        assert_eq!(PerformanceTracker::time_efficiency(5.0, 0.0), 0.0);
    }

    #[test]
    fn metrics_snapshot() {
        let mut t = PerformanceTracker::new(2);
        t.record_attempt(true, 1.0);
        t.record_attempt(false, 1.0);
        let m = t.metrics(400, 30.0, 60.0);
        assert_eq!(m.score, 400);
        assert_eq!(m.accuracy, 0.5);
        assert_eq!(m.time_efficiency, 0.5);
        assert_eq!(m.mistakes, 1);
    }

    #[test]
    fn reset_clears_attempts() {
        let mut t = PerformanceTracker::new(2);
        t.record_attempt(true, 1.0);
        t.reset(5);
        assert!(t.attempts().is_empty());
        assert_eq!(t.declared_items(), 5);
    }
}
