//! Neuroevolution of water-world controllers.

use super::seeded_rng;
use anyhow::{ensure, Result};
use clap::ValueEnum;
use serde::Serialize;
use std::path::Path;
use waterworld_core::evolution::{EspNet, EspTrainer, GaTrainer};
use waterworld_core::rl::{GreedyNet, Net};
use waterworld_core::{AppConfig, WaterWorld};
use waterworld_io::{save_brain, Brain};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
pub enum Method {
    Ga,
    Esp,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvolveSummary {
    pub method: Method,
    pub generations: u64,
    pub best_fitness: f64,
    pub history: Vec<f64>,
}

/// The arena a candidate is scored in: the configured world cut down to a
/// single agent, always on the same seed so scores are comparable.
pub fn evaluation_config(config: &AppConfig) -> AppConfig {
    let mut eval = config.clone();
    eval.world.num_agents = 1;
    eval.world.seed = Some(config.world.seed.unwrap_or(0));
    eval
}

/// Total reward a greedy controller collects over `ticks`.
/// Worlds that fail to build score negative infinity.
pub fn fitness(eval: &AppConfig, net: &Net, ticks: u64) -> f64 {
    let mut world = match WaterWorld::new(eval.clone()) {
        Ok(world) => world,
        Err(e) => {
            tracing::warn!(error = %e, "Evaluation world failed to build");
            return f64::NEG_INFINITY;
        }
    };
    let mut policies = [GreedyNet::new(net.clone())];
    let mut total = 0.0;
    for _ in 0..ticks {
        match world.tick(&mut policies) {
            Ok(report) => total += report.rewards.iter().sum::<f64>(),
            Err(e) => {
                tracing::warn!(error = %e, "Evaluation tick failed");
                return f64::NEG_INFINITY;
            }
        }
    }
    total
}

pub fn run(
    config: &AppConfig,
    method: Method,
    generations: u64,
    hidden: usize,
    ticks: u64,
    save: Option<&Path>,
) -> Result<EvolveSummary> {
    ensure!(hidden > 0, "hidden layer needs at least one unit");
    let eval = evaluation_config(config);
    let sizing = WaterWorld::new(eval.clone())?;
    let (ns, na) = (sizing.state_size(), sizing.num_actions());
    drop(sizing);

    tracing::info!(?method, generations, hidden, ticks, "Starting evolution");
    let mut history = Vec::with_capacity(generations as usize);
    let (best_fitness, net) = match method {
        Method::Ga => {
            let mut rng = seeded_rng(config.ga.seed);
            let mut net = Net::mlp(ns, hidden, na, 0.1, &mut rng);
            let mut trainer = GaTrainer::new(config.ga.clone(), &net)?;
            for generation in 0..generations {
                let best = trainer.train(&mut net, |n| fitness(&eval, n, ticks))?;
                history.push(best);
                tracing::info!(generation, best, "GA generation");
                if trainer.reached_target() {
                    break;
                }
            }
            (trainer.best_fitness(), net)
        }
        Method::Esp => {
            let mut rng = seeded_rng(config.esp.seed);
            let mut net = EspNet::new(ns, hidden, na, &mut rng);
            let mut trainer = EspTrainer::new(config.esp.clone(), &net)?;
            for generation in 0..generations {
                let best = trainer.train(&mut net, |n: &EspNet| fitness(&eval, n.net(), ticks))?;
                history.push(best);
                tracing::info!(generation, best, "ESP generation");
                if trainer.reached_target() {
                    break;
                }
            }
            (trainer.best_fitness(), net.into_net())
        }
    };

    if let Some(path) = save {
        save_brain(&Brain::Net(net), path)?;
        tracing::info!(path = ?path, "Saved evolved network");
    }
    Ok(EvolveSummary {
        method,
        generations: history.len() as u64,
        best_fitness,
        history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> AppConfig {
        let mut config = AppConfig::default();
        config.world.num_agents = 3;
        config.world.num_items = 10;
        config.world.seed = Some(5);
        config.sensors.num_eyes = 3;
        config.ga.population_size = 4;
        config.ga.seed = Some(5);
        config.esp.population_size = 3;
        config.esp.num_match = 1;
        config.esp.seed = Some(5);
        config
    }

    #[test]
    fn test_evaluation_world_is_single_agent_and_seeded() {
        let mut config = tiny();
        config.world.seed = None;
        let eval = evaluation_config(&config);
        assert_eq!(eval.world.num_agents, 1);
        assert_eq!(eval.world.seed, Some(0));
    }

    #[test]
    fn test_fitness_is_deterministic() {
        let eval = evaluation_config(&tiny());
        let world = WaterWorld::new(eval.clone()).unwrap();
        let mut rng = seeded_rng(Some(9));
        let net = Net::mlp(world.state_size(), 4, world.num_actions(), 0.1, &mut rng);
        assert_eq!(fitness(&eval, &net, 50), fitness(&eval, &net, 50));
    }

    #[test]
    fn test_both_methods_run() {
        for method in [Method::Ga, Method::Esp] {
            let summary = run(&tiny(), method, 2, 4, 20, None).unwrap();
            assert_eq!(summary.generations, 2);
            assert!(summary.best_fitness.is_finite());
        }
    }
}
