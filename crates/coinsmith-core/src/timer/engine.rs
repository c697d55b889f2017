//! Countdown timer implementation.
//!
//! The timer is a frame-driven state machine. It does not use internal
//! threads or wall-clock reads - the caller feeds it `tick(delta)` once per
//! frame and forwards the returned events.
//!
//! ## One-shot events
//!
//! ```text
//! running ── remaining <= warning ──> WarningReached (once)
//!         ── remaining <= 0 ────────> TimeExpired (once), running = false
//! ```
//!
//! `start` and `reset` re-arm both events. `add_time` does not; callers that
//! extend a countdown decide when to re-arm via [`CountdownTimer::rearm`].
//!
//! ## Usage
//!
//! ```ignore
//! let mut timer = CountdownTimer::new(TimerConfig::default());
//! timer.start(None);
//! // Once per frame:
//! for event in timer.tick(delta) { bus.publish(event); }
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::events::GameEvent;

pub const DEFAULT_INITIAL_TIME_SECS: f64 = 60.0;
pub const DEFAULT_WARNING_THRESHOLD_SECS: f64 = 10.0;
const MIN_WARNING_SECS: f64 = 5.0;
const WARNING_FRACTION: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
    CountDown,
    /// Stopwatch mode: the value only grows and no events fire.
    CountUp,
}

/// Timer configuration, usually read from the `[timer]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Countdown length in seconds.
    #[serde(default = "default_initial_time")]
    pub initial_time: f64,
    /// Remaining seconds at which `WarningReached` fires.
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,
    /// Run as a stopwatch. No warning or expiry fires; a session with a
    /// time limit still ends once its clock reaches the limit.
    #[serde(default)]
    pub count_up: bool,
}

fn default_initial_time() -> f64 {
    DEFAULT_INITIAL_TIME_SECS
}
fn default_warning_threshold() -> f64 {
    DEFAULT_WARNING_THRESHOLD_SECS
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            initial_time: DEFAULT_INITIAL_TIME_SECS,
            warning_threshold: DEFAULT_WARNING_THRESHOLD_SECS,
            count_up: false,
        }
    }
}

impl TimerConfig {
    /// Clamp out-of-range values to safe defaults.
    ///
    /// A non-positive duration falls back to [`DEFAULT_INITIAL_TIME_SECS`].
    /// A warning threshold that is non-positive or not below the duration
    /// becomes `max(5, 20% of duration)`, kept strictly below the duration.
    pub fn sanitized(&self) -> Self {
        let mut cfg = self.clone();

        if !cfg.initial_time.is_finite() || cfg.initial_time <= 0.0 {
            warn!(
                initial_time = cfg.initial_time,
                "invalid timer duration, using default"
            );
            cfg.initial_time = DEFAULT_INITIAL_TIME_SECS;
        }

        let threshold = warning_threshold_for(cfg.initial_time, cfg.warning_threshold);
        if threshold != cfg.warning_threshold {
            warn!(
                warning_threshold = cfg.warning_threshold,
                fallback = threshold,
                "invalid warning threshold, clamping"
            );
            cfg.warning_threshold = threshold;
        }

        cfg
    }

    pub fn mode(&self) -> TimerMode {
        if self.count_up {
            TimerMode::CountUp
        } else {
            TimerMode::CountDown
        }
    }
}

/// Threshold to use for a countdown of `duration` seconds: `configured` when
/// it is positive and below the duration, else `max(5, 20% of duration)`
/// kept strictly below the duration.
fn warning_threshold_for(duration: f64, configured: f64) -> f64 {
    if configured.is_finite() && configured > 0.0 && configured < duration {
        return configured;
    }
    let fallback = MIN_WARNING_SECS.max(duration * WARNING_FRACTION);
    if fallback >= duration {
        duration * WARNING_FRACTION
    } else {
        fallback
    }
}

/// Countdown timer with one-shot warning and expiry events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountdownTimer {
    config: TimerConfig,
    /// Seconds left (count-down) or seconds elapsed (count-up).
    remaining: f64,
    /// Warning threshold for the current cycle, fitted to its duration.
    warning_threshold: f64,
    running: bool,
    warning_fired: bool,
    expired_fired: bool,
}

impl CountdownTimer {
    /// Create an idle timer. The configuration is sanitized first.
    pub fn new(config: TimerConfig) -> Self {
        let config = config.sanitized();
        let remaining = match config.mode() {
            TimerMode::CountDown => config.initial_time,
            TimerMode::CountUp => 0.0,
        };
        Self {
            warning_threshold: config.warning_threshold,
            config,
            remaining,
            running: false,
            warning_fired: false,
            expired_fired: false,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn mode(&self) -> TimerMode {
        self.config.mode()
    }

    pub fn initial_time(&self) -> f64 {
        self.config.initial_time
    }

    /// Threshold in effect for the current cycle.
    pub fn warning_threshold(&self) -> f64 {
        self.warning_threshold
    }

    pub fn warning_fired(&self) -> bool {
        self.warning_fired
    }

    pub fn expired_fired(&self) -> bool {
        self.expired_fired
    }

    /// True once the countdown hit zero and has not been extended since.
    pub fn has_expired(&self) -> bool {
        self.mode() == TimerMode::CountDown && self.expired_fired && self.remaining <= 0.0
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Begin a new cycle. A positive `custom_duration` overrides the
    /// configured initial time for this cycle only; the warning threshold
    /// is refitted to it the same way the configuration is sanitized.
    pub fn start(&mut self, custom_duration: Option<f64>) {
        let duration = match custom_duration {
            Some(d) if d.is_finite() && d > 0.0 => d,
            _ => self.config.initial_time,
        };
        self.warning_threshold = warning_threshold_for(duration, self.config.warning_threshold);
        if self.warning_threshold != self.config.warning_threshold {
            debug!(
                duration,
                warning_threshold = self.warning_threshold,
                "warning threshold fitted to cycle duration"
            );
        }
        self.remaining = match self.mode() {
            TimerMode::CountUp => 0.0,
            TimerMode::CountDown => duration,
        };
        self.running = true;
        self.warning_fired = false;
        self.expired_fired = false;
    }

    /// Advance by `delta` seconds. Returns the events fired by this tick.
    ///
    /// If a single tick carries the countdown from above the threshold
    /// straight to zero, `WarningReached` is still emitted before
    /// `TimeExpired`.
    pub fn tick(&mut self, delta: f64) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if !self.running {
            return events;
        }
        if !delta.is_finite() || delta < 0.0 {
            warn!(delta, "ignoring invalid tick delta");
            return events;
        }

        if self.mode() == TimerMode::CountUp {
            self.remaining += delta;
            return events;
        }

        self.remaining -= delta;

        if self.remaining <= self.warning_threshold && !self.warning_fired {
            self.warning_fired = true;
            events.push(GameEvent::WarningReached {
                remaining_secs: self.remaining.max(0.0),
                at: Utc::now(),
            });
        }

        if self.remaining <= 0.0 {
            self.remaining = 0.0;
            self.running = false;
            if !self.expired_fired {
                self.expired_fired = true;
                events.push(GameEvent::TimeExpired { at: Utc::now() });
            }
        }

        events
    }

    /// Add seconds to the remaining time. Fired flags are left untouched.
    pub fn add_time(&mut self, seconds: f64) {
        if !seconds.is_finite() || seconds < 0.0 {
            warn!(seconds, "add_time ignored: seconds must be non-negative");
            return;
        }
        self.remaining += seconds;
    }

    /// Remove seconds from the remaining time, clamping at zero.
    pub fn subtract_time(&mut self, seconds: f64) {
        if !seconds.is_finite() || seconds < 0.0 {
            warn!(seconds, "subtract_time ignored: seconds must be non-negative");
            return;
        }
        self.remaining = (self.remaining - seconds).max(0.0);
    }

    /// Clear whichever one-shot flags no longer describe the current time:
    /// the warning once remaining is back above the threshold, the expiry
    /// once remaining is positive again.
    pub fn rearm(&mut self) {
        if self.remaining > self.warning_threshold {
            self.warning_fired = false;
        }
        if self.remaining > 0.0 {
            self.expired_fired = false;
        }
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    pub fn resume(&mut self) {
        if self.mode() == TimerMode::CountDown && self.remaining <= 0.0 {
            warn!("resume ignored: countdown has no time left");
            return;
        }
        self.running = true;
    }

    /// Restore the configured initial time and re-arm both events.
    /// Whether the timer is running is left as it was.
    pub fn reset(&mut self) {
        self.remaining = match self.mode() {
            TimerMode::CountDown => self.config.initial_time,
            TimerMode::CountUp => 0.0,
        };
        self.warning_threshold = self.config.warning_threshold;
        self.warning_fired = false;
        self.expired_fired = false;
    }
}
