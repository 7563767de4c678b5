//! Fixed-cadence clock for Sanguo's background loops.
//!
//! Matches run on their own per-room deadlines. Work that sweeps across
//! rooms, such as forming matchmaking groups, instead runs on a
//! [`TickScheduler`] placed in a `select!` beside the shutdown signal:
//!
//! ```ignore
//! let mut ticker = TickScheduler::every(Duration::from_secs(2));
//! loop {
//!     tokio::select! {
//!         _ = ticker.wait_for_tick() => {
//!             queue.tick().await;
//!             ticker.record_tick_end();
//!         }
//!         _ = shutdown.changed() => break,
//!     }
//! }
//! ```
//!
//! A late tick restarts the cadence from itself; missed ticks are not
//! replayed.

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, trace, warn};

/// Shortest cadence a scheduler accepts.
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Work taking longer than this share of the interval is a slow tick.
const SLOW_FRACTION: f64 = 0.8;

#[derive(Debug, Clone)]
pub struct TickConfig {
    pub interval: Duration,
    /// The first tick is pushed back by a random amount below this, so
    /// loops started together drift apart.
    pub jitter: Duration,
}

impl TickConfig {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            jitter: Duration::ZERO,
        }
    }
}

/// Counters over the scheduler's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub ticks: u64,
    pub slow_ticks: u64,
    pub longest_work: Duration,
}

pub struct TickScheduler {
    interval: Duration,
    timer: Interval,
    work_started: Option<Instant>,
    stats: TickStats,
}

impl TickScheduler {
    pub fn new(config: TickConfig) -> Self {
        let interval = if config.interval < MIN_INTERVAL {
            warn!(requested_ms = config.interval.as_millis() as u64, "tick interval raised to minimum");
            MIN_INTERVAL
        } else {
            config.interval
        };
        let jitter = match config.jitter.as_millis() as u64 {
            0 => Duration::ZERO,
            max_ms => Duration::from_millis(rand::rng().random_range(0..max_ms)),
        };
        let mut timer = time::interval_at(Instant::now() + interval + jitter, interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(
            interval_ms = interval.as_millis() as u64,
            jitter_ms = jitter.as_millis() as u64,
            "tick scheduler armed"
        );
        Self {
            interval,
            timer,
            work_started: None,
            stats: TickStats::default(),
        }
    }

    pub fn every(interval: Duration) -> Self {
        Self::new(TickConfig::every(interval))
    }

    /// Resolves when the next tick is due and returns its number,
    /// starting at 1. Cancel safe.
    pub async fn wait_for_tick(&mut self) -> u64 {
        self.timer.tick().await;
        self.stats.ticks += 1;
        self.work_started = Some(Instant::now());
        trace!(tick = self.stats.ticks, "tick");
        self.stats.ticks
    }

    /// Closes the work opened by the last [`wait_for_tick`](Self::wait_for_tick).
    pub fn record_tick_end(&mut self) {
        let Some(started) = self.work_started.take() else {
            return;
        };
        let worked = started.elapsed();
        self.stats.longest_work = self.stats.longest_work.max(worked);
        if worked.as_secs_f64() > self.interval.as_secs_f64() * SLOW_FRACTION {
            self.stats.slow_ticks += 1;
            warn!(
                tick = self.stats.ticks,
                worked_ms = worked.as_millis() as u64,
                interval_ms = self.interval.as_millis() as u64,
                "slow tick"
            );
        }
    }

    pub fn stats(&self) -> TickStats {
        self.stats
    }
}
