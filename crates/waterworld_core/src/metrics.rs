//! Run metrics and structured logging.
//!
//! [`Metrics`] is shared by reference between the tick loop and whoever
//! reports on it, so every counter is atomic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Counters for one simulation or training run.
pub struct Metrics {
    tick_count: AtomicU64,
    food_eaten: AtomicU64,
    poison_eaten: AtomicU64,
    collisions: AtomicU64,
    /// Cumulative reward, stored as `f64` bits.
    total_reward: AtomicU64,
    log_interval: u64,
    pub counters: Mutex<HashMap<String, AtomicU64>>,
    start_time: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl Metrics {
    /// Creates a collector that logs every `log_interval` ticks.
    #[must_use]
    pub fn new(log_interval: u64) -> Self {
        Self {
            tick_count: AtomicU64::new(0),
            food_eaten: AtomicU64::new(0),
            poison_eaten: AtomicU64::new(0),
            collisions: AtomicU64::new(0),
            total_reward: AtomicU64::new(0f64.to_bits()),
            log_interval: log_interval.max(1),
            counters: Mutex::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Records a completed tick.
    pub fn record_tick(
        &self,
        duration: Duration,
        food: usize,
        poison: usize,
        collisions: usize,
        reward: f64,
    ) {
        self.food_eaten.fetch_add(food as u64, Ordering::Relaxed);
        self.poison_eaten.fetch_add(poison as u64, Ordering::Relaxed);
        self.collisions.fetch_add(collisions as u64, Ordering::Relaxed);
        self.add_reward(reward);
        let tick = self.tick_count.fetch_add(1, Ordering::Relaxed) + 1;

        if tick % self.log_interval == 0 {
            tracing::info!(
                tick = tick,
                food = self.food_eaten(),
                poison = self.poison_eaten(),
                collisions = self.collisions.load(Ordering::Relaxed),
                reward = self.total_reward(),
                duration_us = duration.as_micros() as u64,
                "Simulation tick"
            );
        }
    }

    fn add_reward(&self, reward: f64) {
        let _ = self
            .total_reward
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + reward).to_bits())
            });
    }

    /// Increments a named counter.
    pub fn increment_counter(&self, name: &str) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters
            .get(name)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.tick_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn food_eaten(&self) -> u64 {
        self.food_eaten.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn poison_eaten(&self) -> u64 {
        self.poison_eaten.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total_reward(&self) -> f64 {
        f64::from_bits(self.total_reward.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Logs a run event such as an episode or generation summary.
    pub fn log_event(&self, event_type: &str, details: &str) {
        tracing::info!(
            event_type = event_type,
            details = details,
            "Simulation event"
        );
    }
}

/// Installs the global fmt subscriber. `RUST_LOG` overrides the default
/// `info` level. Safe to call more than once.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .finish(),
    )
    .ok();
}
