use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use clap::Args;
use coinsmith_core::scoring::PerformanceMetrics;
use coinsmith_core::sinks::LoggingAudioSink;
use coinsmith_core::{
    Database, FinalPayload, GameConfig, GameSession, OfferState, OfferTrigger, Progression,
    ProgressionState, ScoreSinks,
};
use serde::Serialize;
use tracing::{debug, info};

use super::CliResult;

/// Failed extension attempts per offer before the script declines it.
const MAX_ATTEMPTS_PER_OFFER: u32 = 3;

#[derive(Args, Debug)]
pub struct PlayArgs {
    /// Good moves the session expects (and the script makes)
    #[arg(long, default_value = "5")]
    pub moves: u32,
    /// Mistakes interleaved with the good moves
    #[arg(long, default_value = "0")]
    pub mistakes: u32,
    /// Time limit in seconds; 0 plays without one. Defaults to timer.initial_time
    #[arg(long)]
    pub time_limit: Option<f64>,
    /// Seconds of play between scripted inputs
    #[arg(long, default_value = "1.0")]
    pub move_interval: f64,
    /// Report this many coins instead of counting good moves
    #[arg(long)]
    pub coins: Option<u32>,
    /// Accept extension offers by watching an ad
    #[arg(long)]
    pub watch_ad: bool,
    /// Accept extension offers by buying time
    #[arg(long)]
    pub buy_time: bool,
    /// Run frames against the wall clock instead of stepping instantly
    #[arg(long)]
    pub realtime: bool,
    /// Seed for extension outcomes
    #[arg(long)]
    pub seed: Option<u64>,
    /// Frame length in seconds
    #[arg(long, default_value = "0.1")]
    pub frame: f64,
    /// Write every event to stderr as a JSON line
    #[arg(long)]
    pub events: bool,
    /// Use an in-memory store; nothing is persisted
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    GoodMove,
    Mistake,
}

#[derive(Serialize)]
struct PlayReport {
    payload: FinalPayload,
    /// Seconds of play on the session clock, extensions included.
    time_taken: f64,
    time_given: f64,
    star_rating: Option<u8>,
    metrics: Option<PerformanceMetrics>,
    progression: ProgressionState,
}

/// Scripted player feeding one session frame by frame.
struct Driver {
    session: GameSession,
    script: VecDeque<Input>,
    frames_per_input: u64,
    frames_since_input: u64,
    frame: f64,
    watch_ad: bool,
    buy_time: bool,
    attempts_this_offer: u32,
}

impl Driver {
    /// Advance one frame. Returns false once the session is over.
    fn step(&mut self) -> bool {
        if self.session.engine().is_completed() {
            return false;
        }

        match self.session.offer_state() {
            OfferState::Offering { trigger } => self.respond_to_offer(trigger),
            OfferState::Resolving { .. } => {}
            OfferState::Idle => {
                self.attempts_this_offer = 0;
                self.frames_since_input += 1;
                if self.frames_since_input >= self.frames_per_input {
                    self.frames_since_input = 0;
                    match self.script.pop_front() {
                        Some(Input::GoodMove) => self.session.record_good_move(),
                        Some(Input::Mistake) => self.session.record_mistake(),
                        None => {
                            self.session.complete();
                            return false;
                        }
                    }
                }
            }
        }

        self.session.update(self.frame);
        !self.session.engine().is_completed()
    }

    fn respond_to_offer(&mut self, trigger: OfferTrigger) {
        if self.attempts_this_offer >= MAX_ATTEMPTS_PER_OFFER {
            info!(?trigger, "giving up on extension offer");
            self.session.decline_offer();
            return;
        }

        // With both enabled, a failed ad falls back to buying time.
        let prefer_ad = self.watch_ad && !(self.buy_time && self.attempts_this_offer > 0);
        let accepted = if prefer_ad {
            self.session.request_ad_reward()
        } else if self.buy_time {
            self.session.request_purchase()
        } else {
            false
        };

        if accepted {
            self.attempts_this_offer += 1;
            debug!(?trigger, attempt = self.attempts_this_offer, "accepted extension offer");
        } else {
            self.session.decline_offer();
        }
    }

    fn run_instant(&mut self) {
        while self.step() {}
    }

    fn run_realtime(&mut self) -> CliResult {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let period = Duration::from_secs_f64(self.frame);
        runtime.block_on(async {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if !self.step() {
                    break;
                }
            }
        });
        Ok(())
    }
}

/// Good moves with mistakes spread evenly between them.
fn build_script(moves: u32, mistakes: u32) -> VecDeque<Input> {
    let total = moves + mistakes;
    let mut script = VecDeque::with_capacity(total as usize);
    let (mut goods_left, mut mistakes_left) = (moves, mistakes);
    for i in 0..total {
        // Place a mistake whenever we are behind the even spread.
        let due = (u64::from(i + 1) * u64::from(mistakes)) / u64::from(total.max(1));
        let placed = u64::from(mistakes - mistakes_left);
        if mistakes_left > 0 && (placed < due || goods_left == 0) {
            script.push_back(Input::Mistake);
            mistakes_left -= 1;
        } else {
            script.push_back(Input::GoodMove);
            goods_left -= 1;
        }
    }
    script
}

pub fn run(args: PlayArgs) -> CliResult {
    if !args.frame.is_finite() || args.frame <= 0.0 {
        return Err("--frame must be a positive number of seconds".into());
    }
    if !args.move_interval.is_finite() || args.move_interval <= 0.0 {
        return Err("--move-interval must be a positive number of seconds".into());
    }

    let mut config = GameConfig::load_or_default();
    if args.seed.is_some() {
        config.extension.rng_seed = args.seed;
    }
    let time_limit = args.time_limit.unwrap_or(config.timer.initial_time);

    let db = Rc::new(if args.dry_run {
        Database::open_memory()?
    } else {
        Database::open()?
    });
    let sinks = ScoreSinks {
        results: Box::new(Rc::clone(&db)),
        ..ScoreSinks::default()
    };
    let mut session = GameSession::new(
        &config,
        Progression::load(Box::new(Rc::clone(&db))),
        sinks,
        Box::new(LoggingAudioSink::default()),
    );

    if args.events {
        session.bus_mut().subscribe(|event| {
            if let Ok(line) = serde_json::to_string(event) {
                eprintln!("{line}");
            }
        });
    }

    session.start(i64::from(args.moves), time_limit);
    if let Some(coins) = args.coins {
        session.set_coins_collected(coins);
    }

    let frames_per_input = (args.move_interval / args.frame).round().max(1.0) as u64;
    let mut driver = Driver {
        session,
        script: build_script(args.moves, args.mistakes),
        frames_per_input,
        frames_since_input: 0,
        frame: args.frame,
        watch_ad: args.watch_ad,
        buy_time: args.buy_time,
        attempts_this_offer: 0,
    };

    if args.realtime {
        driver.run_realtime()?;
    } else {
        driver.run_instant();
    }

    let session = driver.session;
    let result = session
        .result()
        .ok_or("session ended without a result")?;
    let report = PlayReport {
        payload: result.payload(),
        time_taken: result.time_taken,
        time_given: result.time_given,
        star_rating: session.star_rating(),
        metrics: session.performance_metrics(),
        progression: session.engine().progression(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
