//! DQN agents living in the water world.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use waterworld_core::metrics::Metrics;
use waterworld_core::rl::{DqnAgent, DqnOptions};
use waterworld_core::{AppConfig, WaterWorld};
use waterworld_io::{load_dqn, save_brain, Brain};

const FEEDING_TICKS: &str = "feeding_ticks";

#[derive(Debug, Clone, Serialize)]
pub struct WaterRunSummary {
    pub ticks: u64,
    pub food: u64,
    pub poison: u64,
    pub total_reward: f64,
    /// Ticks in which at least one item was eaten.
    pub feeding_ticks: u64,
    pub elapsed_ms: u64,
    pub fingerprint: String,
}

/// One DQN per agent. Agent `i` is seeded with `dqn.seed + i` so agents
/// explore differently under a fixed seed.
pub fn build_agents(config: &AppConfig, world: &WaterWorld) -> Result<Vec<DqnAgent>> {
    (0..world.num_agents())
        .map(|i| {
            let options = DqnOptions {
                seed: config.dqn.seed.map(|s| s.wrapping_add(i as u64)),
                ..config.dqn.clone()
            };
            DqnAgent::new(world.state_size(), world.num_actions(), options)
        })
        .collect()
}

/// Runs `ticks` steps. `load` seeds every agent from one saved brain and
/// `save` writes agent 0 back out.
pub fn run(
    config: &AppConfig,
    ticks: u64,
    load: Option<&Path>,
    save: Option<&Path>,
) -> Result<WaterRunSummary> {
    let mut world = WaterWorld::new(config.clone())?;
    let mut agents = build_agents(config, &world)?;
    let metrics = Metrics::new(config.world.log_interval);
    if let Some(path) = load {
        let snapshot = load_dqn(path)?;
        for agent in &mut agents {
            agent.load(snapshot.clone())?;
        }
        metrics.log_event("brain_loaded", &path.display().to_string());
    }

    tracing::info!(
        agents = world.num_agents(),
        items = world.num_items(),
        strategy = world.strategy_name(),
        fingerprint = %config.fingerprint(),
        "Starting water world"
    );
    for _ in 0..ticks {
        let start = Instant::now();
        let report = world.tick(&mut agents)?;
        metrics.record_tick(
            start.elapsed(),
            report.eaten_food,
            report.eaten_poison,
            report.collisions,
            report.rewards.iter().sum(),
        );
        if report.eaten_food + report.eaten_poison > 0 {
            metrics.increment_counter(FEEDING_TICKS);
        }
    }

    if let (Some(path), Some(agent)) = (save, agents.first()) {
        save_brain(&Brain::Dqn(agent.snapshot()), path)?;
        metrics.log_event("brain_saved", &path.display().to_string());
    }

    Ok(WaterRunSummary {
        ticks: metrics.tick_count(),
        food: metrics.food_eaten(),
        poison: metrics.poison_eaten(),
        total_reward: metrics.total_reward(),
        feeding_ticks: metrics.counter(FEEDING_TICKS),
        elapsed_ms: metrics.elapsed().as_millis() as u64,
        fingerprint: config.fingerprint(),
    })
}
