use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scoring::FinalPayload;
use crate::timer::{ExtensionKind, OfferTrigger};

/// Every observable state change in a session produces a GameEvent.
/// Presentation collaborators subscribe to them through [`EventBus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    SessionStarted {
        session_id: Uuid,
        total_good_moves: u32,
        time_limit_secs: f64,
        at: DateTime<Utc>,
    },
    ScoreChanged {
        score: i64,
        at: DateTime<Utc>,
    },
    XpChanged {
        xp: i64,
        at: DateTime<Utc>,
    },
    /// Remaining time dropped to the warning threshold (one-shot per cycle).
    WarningReached {
        remaining_secs: f64,
        at: DateTime<Utc>,
    },
    /// Countdown reached zero (one-shot per cycle).
    TimeExpired {
        at: DateTime<Utc>,
    },
    TimeAdded {
        seconds: f64,
        source: ExtensionKind,
        at: DateTime<Utc>,
    },
    ExtensionOffered {
        trigger: OfferTrigger,
        at: DateTime<Utc>,
    },
    /// The simulated ad or purchase did not go through; the offer stays open.
    ExtensionFailed {
        kind: ExtensionKind,
        at: DateTime<Utc>,
    },
    ExtensionClosed {
        at: DateTime<Utc>,
    },
    SessionCompleted {
        payload: FinalPayload,
        at: DateTime<Utc>,
    },
}

impl GameEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GameEvent::SessionStarted { .. } => "session_started",
            GameEvent::ScoreChanged { .. } => "score_changed",
            GameEvent::XpChanged { .. } => "xp_changed",
            GameEvent::WarningReached { .. } => "warning_reached",
            GameEvent::TimeExpired { .. } => "time_expired",
            GameEvent::TimeAdded { .. } => "time_added",
            GameEvent::ExtensionOffered { .. } => "extension_offered",
            GameEvent::ExtensionFailed { .. } => "extension_failed",
            GameEvent::ExtensionClosed { .. } => "extension_closed",
            GameEvent::SessionCompleted { .. } => "session_completed",
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&GameEvent)>;

const DEFAULT_LOG_CAPACITY: usize = 256;

/// Observer list for [`GameEvent`]s.
///
/// Every subscriber sees every published event. Delivery order between
/// subscribers is not part of the contract. The bus also keeps a bounded
/// log of the most recent events for hosts that poll instead of subscribing.
pub struct EventBus {
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_id: u64,
    log: VecDeque<GameEvent>,
    log_capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_log_capacity(DEFAULT_LOG_CAPACITY)
    }

    pub fn with_log_capacity(log_capacity: usize) -> Self {
        Self {
            subscribers: Vec::new(),
            next_id: 0,
            log: VecDeque::with_capacity(log_capacity.min(DEFAULT_LOG_CAPACITY)),
            log_capacity,
        }
    }

    pub fn subscribe<F>(&mut self, f: F) -> SubscriptionId
    where
        F: FnMut(&GameEvent) + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(f)));
        id
    }

    /// Returns false when the id was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn publish(&mut self, event: GameEvent) {
        for (_, subscriber) in self.subscribers.iter_mut() {
            subscriber(&event);
        }
        if self.log_capacity == 0 {
            return;
        }
        if self.log.len() == self.log_capacity {
            self.log.pop_front();
        }
        self.log.push_back(event);
    }

    pub fn publish_all<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = GameEvent>,
    {
        for event in events {
            self.publish(event);
        }
    }

    /// Most recent events, oldest first.
    pub fn recent(&self) -> impl Iterator<Item = &GameEvent> {
        self.log.iter()
    }

    pub fn drain_log(&mut self) -> Vec<GameEvent> {
        self.log.drain(..).collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .field("logged", &self.log.len())
            .field("log_capacity", &self.log_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn score(score: i64) -> GameEvent {
        GameEvent::ScoreChanged {
            score,
            at: Utc::now(),
        }
    }

    #[test]
    fn every_subscriber_is_notified() {
        let mut bus = EventBus::new();
        let seen_a = Rc::new(RefCell::new(Vec::new()));
        let seen_b = Rc::new(RefCell::new(Vec::new()));

        let a = Rc::clone(&seen_a);
        bus.subscribe(move |e| a.borrow_mut().push(e.name()));
        let b = Rc::clone(&seen_b);
        bus.subscribe(move |e| b.borrow_mut().push(e.name()));

        bus.publish(score(100));
        bus.publish(GameEvent::TimeExpired { at: Utc::now() });

        assert_eq!(*seen_a.borrow(), vec!["score_changed", "time_expired"]);
        assert_eq!(*seen_b.borrow(), vec!["score_changed", "time_expired"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut bus = EventBus::new();
        let count = Rc::new(RefCell::new(0));
        let c = Rc::clone(&count);
        let id = bus.subscribe(move |_| *c.borrow_mut() += 1);

        bus.publish(score(1));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(score(2));

        assert_eq!(*count.borrow(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn log_is_bounded() {
        let mut bus = EventBus::with_log_capacity(2);
        bus.publish_all([score(1), score(2), score(3)]);

        let scores: Vec<i64> = bus
            .recent()
            .filter_map(|e| match e {
                GameEvent::ScoreChanged { score, .. } => Some(*score),
                _ => None,
            })
            .collect();
        assert_eq!(scores, vec![2, 3]);
        assert_eq!(bus.drain_log().len(), 2);
        assert_eq!(bus.recent().count(), 0);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(GameEvent::TimeAdded {
            seconds: 15.0,
            source: ExtensionKind::Ad,
            at: Utc::now(),
        })
        .unwrap();
        assert_eq!(json["type"], "time_added");
        assert_eq!(json["source"], "ad");
        assert_eq!(json["seconds"], 15.0);
    }
}
