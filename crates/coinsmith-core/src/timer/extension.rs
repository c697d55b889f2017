//! Time-extension offers ("watch an ad" / "buy more time").
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Offering -> Resolving(Ad | Purchase) -> Idle      (reward granted)
//!                                              -> Offering  (failed, retry)
//! any  -> Idle                                             (close)
//! ```
//!
//! The simulated ad/purchase wait is a cooperative suspension point: the
//! host keeps calling [`TimeExtensionCoordinator::update`] with the frame
//! delta and the outcome is drawn only once the delay has fully elapsed.
//! The coordinator never owns the timer; it mutates it only through the
//! timer's public operations while resolving.

use chrono::Utc;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::engine::CountdownTimer;
use crate::events::GameEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionKind {
    Ad,
    Purchase,
}

/// Which timer event opened the offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferTrigger {
    Warning,
    Expiry,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OfferState {
    Idle,
    Offering {
        trigger: OfferTrigger,
    },
    Resolving {
        trigger: OfferTrigger,
        kind: ExtensionKind,
        /// Seconds of simulated wait still to go.
        remaining_delay: f64,
    },
}

/// Extension offer configuration (`[extension]` config section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionConfig {
    #[serde(default = "default_true")]
    pub offer_on_warning: bool,
    #[serde(default = "default_true")]
    pub offer_on_expiry: bool,
    #[serde(default = "default_ad_reward")]
    pub ad_reward_seconds: f64,
    #[serde(default = "default_purchase_reward")]
    pub purchase_reward_seconds: f64,
    #[serde(default = "default_ad_chance")]
    pub ad_success_chance: f64,
    #[serde(default = "default_purchase_chance")]
    pub purchase_success_chance: f64,
    #[serde(default = "default_ad_delay")]
    pub ad_delay_seconds: f64,
    #[serde(default = "default_purchase_delay")]
    pub purchase_delay_seconds: f64,
    /// Fixed seed for reproducible outcomes. Drawn from OS entropy when unset.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

fn default_true() -> bool {
    true
}
fn default_ad_reward() -> f64 {
    15.0
}
fn default_purchase_reward() -> f64 {
    30.0
}
fn default_ad_chance() -> f64 {
    0.80
}
fn default_purchase_chance() -> f64 {
    0.95
}
fn default_ad_delay() -> f64 {
    2.0
}
fn default_purchase_delay() -> f64 {
    1.0
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            offer_on_warning: true,
            offer_on_expiry: true,
            ad_reward_seconds: default_ad_reward(),
            purchase_reward_seconds: default_purchase_reward(),
            ad_success_chance: default_ad_chance(),
            purchase_success_chance: default_purchase_chance(),
            ad_delay_seconds: default_ad_delay(),
            purchase_delay_seconds: default_purchase_delay(),
            rng_seed: None,
        }
    }
}

impl ExtensionConfig {
    /// Clamp probabilities into 0..=1 and durations to non-negative values.
    pub fn sanitized(&self) -> Self {
        fn chance(name: &str, v: f64) -> f64 {
            if v.is_finite() && (0.0..=1.0).contains(&v) {
                v
            } else {
                let clamped = if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
                warn!(field = name, value = v, clamped, "success chance out of range");
                clamped
            }
        }
        fn seconds(name: &str, v: f64) -> f64 {
            if v.is_finite() && v >= 0.0 {
                v
            } else {
                warn!(field = name, value = v, "negative duration, using 0");
                0.0
            }
        }

        Self {
            ad_reward_seconds: seconds("ad_reward_seconds", self.ad_reward_seconds),
            purchase_reward_seconds: seconds("purchase_reward_seconds", self.purchase_reward_seconds),
            ad_success_chance: chance("ad_success_chance", self.ad_success_chance),
            purchase_success_chance: chance(
                "purchase_success_chance",
                self.purchase_success_chance,
            ),
            ad_delay_seconds: seconds("ad_delay_seconds", self.ad_delay_seconds),
            purchase_delay_seconds: seconds("purchase_delay_seconds", self.purchase_delay_seconds),
            ..self.clone()
        }
    }

    pub fn reward_for(&self, kind: ExtensionKind) -> f64 {
        match kind {
            ExtensionKind::Ad => self.ad_reward_seconds,
            ExtensionKind::Purchase => self.purchase_reward_seconds,
        }
    }

    pub fn chance_for(&self, kind: ExtensionKind) -> f64 {
        match kind {
            ExtensionKind::Ad => self.ad_success_chance,
            ExtensionKind::Purchase => self.purchase_success_chance,
        }
    }

    pub fn delay_for(&self, kind: ExtensionKind) -> f64 {
        match kind {
            ExtensionKind::Ad => self.ad_delay_seconds,
            ExtensionKind::Purchase => self.purchase_delay_seconds,
        }
    }
}

/// Presents at most one extension offer at a time and resolves it.
#[derive(Debug, Clone)]
pub struct TimeExtensionCoordinator {
    config: ExtensionConfig,
    state: OfferState,
    rng: Pcg64,
}

impl TimeExtensionCoordinator {
    pub fn new(config: ExtensionConfig) -> Self {
        let config = config.sanitized();
        let rng = match config.rng_seed {
            Some(seed) => Pcg64::seed_from_u64(seed),
            None => Pcg64::from_entropy(),
        };
        Self::with_rng(config, rng)
    }

    pub fn with_rng(config: ExtensionConfig, rng: Pcg64) -> Self {
        Self {
            config: config.sanitized(),
            state: OfferState::Idle,
            rng,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> OfferState {
        self.state
    }

    pub fn config(&self) -> &ExtensionConfig {
        &self.config
    }

    pub fn is_idle(&self) -> bool {
        self.state == OfferState::Idle
    }

    /// True while an offer is shown or being resolved (gameplay is paused).
    pub fn is_active(&self) -> bool {
        !self.is_idle()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// React to a timer event. Returns `ExtensionOffered` when an offer opens.
    pub fn on_timer_event(
        &mut self,
        event: &GameEvent,
        timer: &CountdownTimer,
        session_completed: bool,
    ) -> Option<GameEvent> {
        let trigger = match event {
            GameEvent::WarningReached { .. } => OfferTrigger::Warning,
            GameEvent::TimeExpired { .. } => OfferTrigger::Expiry,
            _ => return None,
        };

        if !self.is_idle() {
            debug!(?trigger, "offer already active, ignoring trigger");
            return None;
        }
        if session_completed {
            return None;
        }

        let enabled = match trigger {
            OfferTrigger::Warning => self.config.offer_on_warning,
            OfferTrigger::Expiry => self.config.offer_on_expiry,
        };
        if !enabled {
            return None;
        }

        // The expiry tick stops the timer, so for that trigger the fired
        // expiry itself is the evidence that the countdown was live.
        let timer_live = match trigger {
            OfferTrigger::Warning => timer.is_running(),
            OfferTrigger::Expiry => timer.has_expired(),
        };
        if !timer_live {
            return None;
        }

        info!(?trigger, "presenting time extension offer");
        self.state = OfferState::Offering { trigger };
        Some(GameEvent::ExtensionOffered {
            trigger,
            at: Utc::now(),
        })
    }

    /// Player chose to watch an ad. Returns false when no offer is open.
    pub fn request_ad_reward(&mut self) -> bool {
        self.begin(ExtensionKind::Ad)
    }

    /// Player chose to buy time. Returns false when no offer is open.
    pub fn request_purchase(&mut self) -> bool {
        self.begin(ExtensionKind::Purchase)
    }

    /// Advance the simulated wait and resolve once it has elapsed.
    pub fn update(&mut self, delta: f64, timer: &mut CountdownTimer) -> Vec<GameEvent> {
        let OfferState::Resolving {
            trigger,
            kind,
            remaining_delay,
        } = self.state
        else {
            return Vec::new();
        };

        let left = remaining_delay - delta.max(0.0);
        if left > 0.0 {
            self.state = OfferState::Resolving {
                trigger,
                kind,
                remaining_delay: left,
            };
            return Vec::new();
        }

        let success = self.rng.gen_bool(self.config.chance_for(kind));
        if !success {
            warn!(?kind, "time extension failed, offer stays open");
            self.state = OfferState::Offering { trigger };
            return vec![GameEvent::ExtensionFailed {
                kind,
                at: Utc::now(),
            }];
        }

        let seconds = self.config.reward_for(kind);
        let was_expired = timer.remaining() <= 0.0;
        timer.add_time(seconds);
        timer.rearm();
        if was_expired {
            timer.resume();
        }
        self.state = OfferState::Idle;
        info!(?kind, seconds, "time extension granted");

        vec![GameEvent::TimeAdded {
            seconds,
            source: kind,
            at: Utc::now(),
        }]
    }

    /// Dismiss the offer from any state. An in-flight resolution is
    /// discarded without a reward.
    pub fn close(&mut self) -> Option<GameEvent> {
        if self.is_idle() {
            return None;
        }
        if let OfferState::Resolving { kind, .. } = self.state {
            debug!(?kind, "discarding in-flight extension");
        }
        self.state = OfferState::Idle;
        Some(GameEvent::ExtensionClosed { at: Utc::now() })
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn begin(&mut self, kind: ExtensionKind) -> bool {
        match self.state {
            OfferState::Offering { trigger } => {
                self.state = OfferState::Resolving {
                    trigger,
                    kind,
                    remaining_delay: self.config.delay_for(kind),
                };
                true
            }
            OfferState::Resolving { .. } => {
                warn!(?kind, "extension already resolving, ignoring request");
                false
            }
            OfferState::Idle => {
                warn!(?kind, "no extension offer open, ignoring request");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::TimerConfig;

    fn always(chance: f64) -> ExtensionConfig {
        ExtensionConfig {
            ad_success_chance: chance,
            purchase_success_chance: chance,
            rng_seed: Some(7),
            ..ExtensionConfig::default()
        }
    }

    fn warned_timer() -> (CountdownTimer, GameEvent) {
        let mut timer = CountdownTimer::new(TimerConfig {
            initial_time: 30.0,
            warning_threshold: 10.0,
            count_up: false,
        });
        timer.start(None);
        let warning = timer.tick(21.0).remove(0);
        (timer, warning)
    }

    #[test]
    fn warning_opens_offer() {
        let (timer, warning) = warned_timer();
        let mut c = TimeExtensionCoordinator::new(always(1.0));
        let offered = c.on_timer_event(&warning, &timer, false);
        assert!(matches!(
            offered,
            Some(GameEvent::ExtensionOffered {
                trigger: OfferTrigger::Warning,
                ..
            })
        ));
        assert_eq!(
            c.state(),
            OfferState::Offering {
                trigger: OfferTrigger::Warning
            }
        );
    }

    #[test]
    fn second_trigger_is_ignored_while_offering() {
        let (timer, warning) = warned_timer();
        let mut c = TimeExtensionCoordinator::new(always(1.0));
        assert!(c.on_timer_event(&warning, &timer, false).is_some());
        assert!(c.on_timer_event(&warning, &timer, false).is_none());
        c.request_ad_reward();
        assert!(c.on_timer_event(&warning, &timer, false).is_none());
    }

    #[test]
    fn no_offer_for_completed_session_or_disabled_trigger() {
        let (timer, warning) = warned_timer();
        let mut c = TimeExtensionCoordinator::new(always(1.0));
        assert!(c.on_timer_event(&warning, &timer, true).is_none());

        let mut c = TimeExtensionCoordinator::new(ExtensionConfig {
            offer_on_warning: false,
            ..always(1.0)
        });
        assert!(c.on_timer_event(&warning, &timer, false).is_none());
        assert!(c.is_idle());
    }

    #[test]
    fn no_offer_when_timer_paused() {
        let (mut timer, warning) = warned_timer();
        timer.pause();
        let mut c = TimeExtensionCoordinator::new(always(1.0));
        assert!(c.on_timer_event(&warning, &timer, false).is_none());
    }

    #[test]
    fn successful_ad_adds_exact_reward_after_delay() {
        let (mut timer, warning) = warned_timer();
        let mut c = TimeExtensionCoordinator::new(always(1.0));
        c.on_timer_event(&warning, &timer, false);
        assert!(c.request_ad_reward());

        // Still waiting: the timer must not change yet.
        assert!(c.update(1.5, &mut timer).is_empty());
        assert_eq!(timer.remaining(), 9.0);

        let events = c.update(0.5, &mut timer);
        match events.as_slice() {
            [GameEvent::TimeAdded {
                seconds, source, ..
            }] => {
                assert_eq!(*seconds, 15.0);
                assert_eq!(*source, ExtensionKind::Ad);
            }
            other => panic!("expected TimeAdded, got {other:?}"),
        }
        assert_eq!(timer.remaining(), 24.0);
        assert!(!timer.warning_fired());
        assert!(c.is_idle());
    }

    #[test]
    fn failed_purchase_returns_to_offering() {
        let (mut timer, warning) = warned_timer();
        let mut c = TimeExtensionCoordinator::new(always(0.0));
        c.on_timer_event(&warning, &timer, false);
        assert!(c.request_purchase());

        let events = c.update(5.0, &mut timer);
        assert!(matches!(
            events.as_slice(),
            [GameEvent::ExtensionFailed {
                kind: ExtensionKind::Purchase,
                ..
            }]
        ));
        assert_eq!(timer.remaining(), 9.0);
        assert_eq!(
            c.state(),
            OfferState::Offering {
                trigger: OfferTrigger::Warning
            }
        );
        // Retry is allowed.
        assert!(c.request_ad_reward());
    }

    #[test]
    fn close_discards_in_flight_resolution() {
        let (mut timer, warning) = warned_timer();
        let mut c = TimeExtensionCoordinator::new(always(1.0));
        c.on_timer_event(&warning, &timer, false);
        c.request_purchase();

        assert!(matches!(c.close(), Some(GameEvent::ExtensionClosed { .. })));
        assert!(c.update(10.0, &mut timer).is_empty());
        assert_eq!(timer.remaining(), 9.0);
        assert!(c.close().is_none());
    }

    #[test]
    fn expiry_offer_revives_the_timer() {
        let mut timer = CountdownTimer::new(TimerConfig {
            initial_time: 10.0,
            warning_threshold: 3.0,
            count_up: false,
        });
        timer.start(None);
        let events = timer.tick(10.0);
        let expired = events
            .iter()
            .find(|e| matches!(e, GameEvent::TimeExpired { .. }))
            .cloned()
            .unwrap();

        let mut c = TimeExtensionCoordinator::new(ExtensionConfig {
            offer_on_warning: false,
            ..always(1.0)
        });
        assert!(c.on_timer_event(&expired, &timer, false).is_some());
        c.request_purchase();
        c.update(1.0, &mut timer);

        assert_eq!(timer.remaining(), 30.0);
        assert!(timer.is_running());
        assert!(!timer.has_expired());
    }

    #[test]
    fn requests_without_offer_are_rejected() {
        let mut c = TimeExtensionCoordinator::new(always(1.0));
        assert!(!c.request_ad_reward());
        assert!(!c.request_purchase());
        assert!(c.is_idle());
    }

    #[test]
    fn seeded_outcomes_are_reproducible() {
        let run = || {
            let (mut timer, warning) = warned_timer();
            let mut c = TimeExtensionCoordinator::new(ExtensionConfig {
                ad_success_chance: 0.5,
                rng_seed: Some(42),
                ..ExtensionConfig::default()
            });
            let mut outcomes = Vec::new();
            c.on_timer_event(&warning, &timer, false);
            for _ in 0..8 {
                if c.is_idle() {
                    break;
                }
                c.request_ad_reward();
                let events = c.update(10.0, &mut timer);
                outcomes.push(events[0].name());
            }
            outcomes
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn sanitize_clamps_chances() {
        let cfg = ExtensionConfig {
            ad_success_chance: 1.7,
            purchase_success_chance: -0.2,
            ad_reward_seconds: -5.0,
            ..ExtensionConfig::default()
        }
        .sanitized();
        assert_eq!(cfg.ad_success_chance, 1.0);
        assert_eq!(cfg.purchase_success_chance, 0.0);
        assert_eq!(cfg.ad_reward_seconds, 0.0);
    }
}
