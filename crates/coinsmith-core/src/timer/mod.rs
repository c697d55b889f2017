mod engine;
mod extension;

pub use engine::{
    CountdownTimer, TimerConfig, TimerMode, DEFAULT_INITIAL_TIME_SECS,
    DEFAULT_WARNING_THRESHOLD_SECS,
};
pub use extension::{
    ExtensionConfig, ExtensionKind, OfferState, OfferTrigger, TimeExtensionCoordinator,
};
