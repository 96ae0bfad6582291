//! Tabular agents on a grid world.

use super::seeded_rng;
use anyhow::Result;
use rand::RngCore;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use waterworld_core::mdp::{Environment, GridWorld};
use waterworld_core::rl::{DpAgent, DpOptions, TdAgent, TdOptions};
use waterworld_io::{load_td, save_brain, Brain};

/// Sweeps stop once no state value moves by more than this.
pub const DP_TOLERANCE: f64 = 1e-6;
pub const DP_MAX_SWEEPS: usize = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct GridRunSummary {
    pub episodes: usize,
    /// Mean episode length over the final tenth of the run.
    pub recent_mean_steps: f64,
    /// Length of a greedy rollout from the start state after training,
    /// `None` if it did not reach a terminal state within `max_steps`.
    pub greedy_steps: Option<usize>,
}

/// Plays one episode and returns its length. Hitting `max_steps` ends the
/// episode as if a terminal state had been reached.
pub fn run_episode(
    agent: &mut TdAgent,
    env: &dyn Environment,
    rng: &mut dyn RngCore,
    max_steps: usize,
) -> usize {
    let mut s = env.start_state(rng);
    let mut steps = 0;
    loop {
        let a = agent.act(s);
        let t = env.sample_next_state(s, a);
        agent.learn(t.reward);
        steps += 1;
        if t.reset_episode || steps >= max_steps {
            agent.end_episode();
            return steps;
        }
        s = t.next_state;
    }
}

/// Follows `choose` from the start state until a terminal state or the
/// step cap.
pub fn rollout<F>(
    env: &dyn Environment,
    rng: &mut dyn RngCore,
    max_steps: usize,
    mut choose: F,
) -> Option<usize>
where
    F: FnMut(usize) -> Option<usize>,
{
    let mut s = env.start_state(rng);
    for step in 1..=max_steps {
        let a = choose(s)?;
        let t = env.sample_next_state(s, a);
        if t.reset_episode {
            return Some(step);
        }
        s = t.next_state;
    }
    None
}

fn recent_mean(lengths: &[usize]) -> f64 {
    let tail = (lengths.len() / 10).max(1).min(lengths.len());
    if tail == 0 {
        return 0.0;
    }
    let recent = &lengths[lengths.len() - tail..];
    recent.iter().sum::<usize>() as f64 / tail as f64
}

pub fn run_td(
    env: GridWorld,
    options: TdOptions,
    episodes: usize,
    max_steps: usize,
    load: Option<&Path>,
    save: Option<&Path>,
) -> Result<GridRunSummary> {
    env.validate()?;
    let mut rng = seeded_rng(options.seed);
    let env: Arc<dyn Environment> = Arc::new(env);
    let mut agent = TdAgent::new(env.clone(), options)?;
    if let Some(path) = load {
        agent.load(load_td(path)?)?;
        tracing::info!(path = ?path, "Loaded TD brain");
    }

    tracing::info!(
        states = env.num_states(),
        update = ?agent.options.update,
        episodes,
        "Starting TD run"
    );
    let mut lengths = Vec::with_capacity(episodes);
    let log_every = (episodes / 10).max(1);
    for episode in 0..episodes {
        lengths.push(run_episode(&mut agent, env.as_ref(), &mut rng, max_steps));
        if (episode + 1) % log_every == 0 {
            tracing::info!(
                episode = episode + 1,
                mean_steps = recent_mean(&lengths),
                "TD progress"
            );
        }
    }

    let greedy_steps = rollout(env.as_ref(), &mut rng, max_steps, |s| agent.greedy_action(s));
    if let Some(path) = save {
        save_brain(&Brain::Td(agent.snapshot()), path)?;
        tracing::info!(path = ?path, "Saved TD brain");
    }
    Ok(GridRunSummary {
        episodes,
        recent_mean_steps: recent_mean(&lengths),
        greedy_steps,
    })
}

/// Policy iteration until the values settle, then one rollout under the
/// learned policy. `episodes` reports the sweeps taken.
pub fn run_dp(env: GridWorld, options: DpOptions, max_steps: usize) -> Result<GridRunSummary> {
    env.validate()?;
    let mut rng = seeded_rng(options.seed);
    let env: Arc<dyn Environment> = Arc::new(env);
    let mut agent = DpAgent::new(env.clone(), options)?;

    let mut sweeps = 0;
    let mut delta = f64::INFINITY;
    while sweeps < DP_MAX_SWEEPS && delta >= DP_TOLERANCE {
        delta = agent.learn();
        sweeps += 1;
    }
    if delta >= DP_TOLERANCE {
        tracing::warn!(sweeps, delta, "DP stopped before converging");
    } else {
        tracing::info!(sweeps, "DP converged");
    }

    let greedy_steps = rollout(env.as_ref(), &mut rng, max_steps, |s| Some(agent.act(s)));
    Ok(GridRunSummary {
        episodes: sweeps,
        recent_mean_steps: greedy_steps.map_or(max_steps as f64, |n| n as f64),
        greedy_steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_mean_uses_last_tenth() {
        let lengths: Vec<usize> = (0..90).map(|_| 50).chain((0..10).map(|_| 10)).collect();
        assert_eq!(recent_mean(&lengths), 10.0);
        assert_eq!(recent_mean(&[7]), 7.0);
        assert_eq!(recent_mean(&[]), 0.0);
    }

    #[test]
    fn test_dp_solves_cliff_demo() {
        let summary = run_dp(
            GridWorld::cliff_demo(),
            DpOptions {
                gamma: 0.9,
                seed: Some(3),
            },
            200,
        )
        .unwrap();
        assert!(summary.episodes < DP_MAX_SWEEPS);
        assert!(summary.greedy_steps.is_some());
    }

    #[test]
    fn test_step_cap_ends_episode() {
        let env: Arc<dyn Environment> = Arc::new(GridWorld::new(5, 5).unwrap());
        let mut agent = TdAgent::new(
            env.clone(),
            TdOptions {
                seed: Some(1),
                ..Default::default()
            },
        )
        .unwrap();
        let mut rng = seeded_rng(Some(1));
        assert!(run_episode(&mut agent, env.as_ref(), &mut rng, 3) <= 3);
    }
}
