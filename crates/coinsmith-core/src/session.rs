//! Session composition root.
//!
//! [`GameSession`] owns one timer, one extension coordinator, one score
//! engine and one performance tracker, and routes their events to the
//! audio sink and the [`EventBus`]. Hosts drive it with `update(delta)` once
//! per frame and forward player input to the `record_*` / `request_*`
//! methods.
//!
//! While an extension offer is open, gameplay is paused: neither the timer
//! nor the session clock advance, only the coordinator's simulated delay.

use tracing::{debug, info, warn};

use crate::analytics::PerformanceTracker;
use crate::events::{EventBus, GameEvent};
use crate::scoring::{resolve_stars, PerformanceMetrics, RatingConfig, ScoreEngine, SessionResult};
use crate::sinks::{AudioConfig, AudioSink, LoopHandle, NullAudioSink, ScoreSinks};
use crate::storage::{GameConfig, Progression};
use crate::timer::{CountdownTimer, OfferState, TimeExtensionCoordinator, TimerMode};

pub struct GameSession {
    timer: CountdownTimer,
    coordinator: TimeExtensionCoordinator,
    engine: ScoreEngine,
    tracker: PerformanceTracker,
    bus: EventBus,
    audio: Box<dyn AudioSink>,
    clips: AudioConfig,
    rating: RatingConfig,
    warning_loop: Option<LoopHandle>,
    last_attempt_at: f64,
}

impl GameSession {
    pub fn new(
        config: &GameConfig,
        progression: Progression,
        sinks: ScoreSinks,
        audio: Box<dyn AudioSink>,
    ) -> Self {
        Self {
            timer: CountdownTimer::new(config.timer.clone()),
            coordinator: TimeExtensionCoordinator::new(config.extension.clone()),
            engine: ScoreEngine::new(config.scoring.clone(), progression, sinks),
            tracker: PerformanceTracker::default(),
            bus: EventBus::new(),
            audio,
            clips: config.audio.clone(),
            rating: config.rating.clone(),
            warning_loop: None,
            last_attempt_at: 0.0,
        }
    }

    /// In-memory progression, no sinks, no audio.
    pub fn headless(config: &GameConfig) -> Self {
        Self::new(
            config,
            Progression::in_memory(),
            ScoreSinks::default(),
            Box::new(NullAudioSink),
        )
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn timer(&self) -> &CountdownTimer {
        &self.timer
    }

    pub fn engine(&self) -> &ScoreEngine {
        &self.engine
    }

    pub fn tracker(&self) -> &PerformanceTracker {
        &self.tracker
    }

    pub fn offer_state(&self) -> OfferState {
        self.coordinator.state()
    }

    /// True while an extension offer holds gameplay.
    pub fn is_paused(&self) -> bool {
        self.coordinator.is_active()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    pub fn result(&self) -> Option<&SessionResult> {
        self.engine.result()
    }

    pub fn performance_metrics(&self) -> Option<PerformanceMetrics> {
        let result = self.engine.result()?;
        Some(
            self.tracker
                .metrics(result.final_score, result.time_taken, result.time_given),
        )
    }

    /// Stars to show for the completed session, reconciling the engine
    /// rating with the presentation thresholds.
    pub fn star_rating(&self) -> Option<u8> {
        let result = self.engine.result()?;
        let metrics = self.performance_metrics()?;
        Some(resolve_stars(result.stars, &metrics, &self.rating))
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a session. `time_limit` of 0 plays without a countdown.
    pub fn start(&mut self, total_good_moves: i64, time_limit: f64) {
        if let Some(event) = self.coordinator.close() {
            self.bus.publish(event);
        }
        self.stop_warning_loop();

        let events = self.engine.initialize_game(total_good_moves, time_limit);
        self.bus.publish_all(events);

        let session = self.engine.session();
        let limit = session.total_time_given;
        self.tracker.reset(session.total_good_moves);
        self.last_attempt_at = 0.0;

        self.timer.reset();
        match self.timer.mode() {
            TimerMode::CountDown if limit > 0.0 => self.timer.start(Some(limit)),
            TimerMode::CountUp => self.timer.start(None),
            TimerMode::CountDown => self.timer.pause(),
        }
    }

    /// Advance one frame.
    pub fn update(&mut self, delta: f64) {
        if !delta.is_finite() || delta <= 0.0 {
            return;
        }

        if self.coordinator.is_active() {
            let events = self.coordinator.update(delta, &mut self.timer);
            for event in events {
                self.on_extension_event(&event);
                self.bus.publish(event);
            }
            return;
        }

        if !self.engine.is_active() {
            return;
        }

        self.engine.advance(delta);
        for event in self.timer.tick(delta) {
            if matches!(event, GameEvent::WarningReached { .. }) {
                self.start_warning_loop();
            }
            let offer =
                self.coordinator
                    .on_timer_event(&event, &self.timer, self.engine.is_completed());
            self.bus.publish(event);
            if let Some(offer) = offer {
                self.bus.publish(offer);
            }
        }

        self.finish_if_out_of_time();
    }

    pub fn record_good_move(&mut self) {
        if !self.engine.is_active() {
            warn!("good move ignored: no active session");
            return;
        }
        let events = self.engine.record_good_move();
        self.record_attempt(true);
        self.audio.play_sound(&self.clips.good_move);
        self.bus.publish_all(events);
    }

    pub fn record_mistake(&mut self) {
        if !self.engine.is_active() {
            warn!("mistake ignored: no active session");
            return;
        }
        let events = self.engine.record_mistake();
        self.record_attempt(false);
        self.audio.play_sound(&self.clips.mistake);
        self.bus.publish_all(events);
    }

    pub fn set_coins_collected(&mut self, coins: u32) {
        self.engine.set_coins_collected(coins);
    }

    /// Returns false when no offer is open.
    pub fn request_ad_reward(&mut self) -> bool {
        self.coordinator.request_ad_reward()
    }

    /// Returns false when no offer is open.
    pub fn request_purchase(&mut self) -> bool {
        self.coordinator.request_purchase()
    }

    /// Dismiss the offer. If the countdown already ran out, the session
    /// ends as time-up.
    pub fn decline_offer(&mut self) {
        if let Some(event) = self.coordinator.close() {
            self.bus.publish(event);
        }
        self.finish_if_out_of_time();
    }

    /// End the session now, measured by the session clock.
    pub fn complete(&mut self) -> Option<&SessionResult> {
        let taken = self.engine.session().elapsed;
        self.finish(taken);
        self.engine.result()
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn record_attempt(&mut self, correct: bool) {
        let now = self.engine.session().elapsed;
        self.tracker
            .record_attempt(correct, now - self.last_attempt_at);
        self.last_attempt_at = now;
    }

    fn on_extension_event(&mut self, event: &GameEvent) {
        if let GameEvent::TimeAdded { seconds, source, .. } = event {
            debug!(?source, seconds, "extension applied to session");
            self.engine.record_time_extension(*seconds);
            self.stop_warning_loop();
            self.audio.play_sound(&self.clips.time_added);
        }
    }

    fn finish_if_out_of_time(&mut self) {
        if !self.engine.is_active() || !self.coordinator.is_idle() {
            return;
        }
        let session = self.engine.session();
        let out_of_time = match self.timer.mode() {
            TimerMode::CountDown => self.timer.has_expired(),
            // A stopwatch never expires; the session limit still applies.
            TimerMode::CountUp => {
                session.total_time_given > 0.0 && session.elapsed >= session.total_time_given
            }
        };
        if out_of_time {
            info!("time is up");
            let taken = session.elapsed;
            self.finish(taken);
        }
    }

    fn finish(&mut self, time_taken: f64) {
        if let Some(event) = self.coordinator.close() {
            self.bus.publish(event);
        }
        self.timer.pause();
        self.stop_warning_loop();

        if let Some(completion) = self.engine.complete_game(time_taken) {
            if !completion.events.is_empty() {
                self.audio.play_sound(&self.clips.session_complete);
            }
            self.bus.publish_all(completion.events);
        }
    }

    fn start_warning_loop(&mut self) {
        if self.warning_loop.is_none() {
            self.warning_loop = Some(self.audio.play_looping_sound(&self.clips.warning_loop));
        }
    }

    fn stop_warning_loop(&mut self) {
        if let Some(handle) = self.warning_loop.take() {
            self.audio.stop_looping_sound(handle);
        }
    }
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("timer", &self.timer)
            .field("offer", &self.coordinator.state())
            .field("engine", &self.engine)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}
