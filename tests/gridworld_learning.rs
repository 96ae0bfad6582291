mod common;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use waterworld_core::mdp::{Environment, GridWorld};
use waterworld_core::rl::{DpAgent, DpOptions, TdAgent, TdOptions, TdUpdate};
use waterworld_lib::runner::gridworld::{self, rollout, run_episode};

const SHORTEST_PATH: usize = 18;

fn open_grid() -> GridWorld {
    GridWorld::new(10, 10)
        .unwrap()
        .with_goal(9, 9, 1.0)
        .with_step_penalty(0.01)
        .with_start(0, 0)
}

fn train(update: TdUpdate, episodes: usize) -> (TdAgent, Vec<usize>) {
    let env: Arc<dyn Environment> = Arc::new(open_grid());
    let mut agent = TdAgent::new(
        env.clone(),
        TdOptions {
            update,
            gamma: 0.95,
            epsilon: 0.1,
            alpha: 0.1,
            seed: Some(42),
            ..Default::default()
        },
    )
    .unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let lengths = (0..episodes)
        .map(|_| run_episode(&mut agent, env.as_ref(), &mut rng, 10_000))
        .collect();
    (agent, lengths)
}

#[test]
fn test_qlearning_finds_near_shortest_path() {
    let (agent, lengths) = train(TdUpdate::Qlearn, 5000);
    let recent = &lengths[lengths.len() - 500..];
    let mean = recent.iter().sum::<usize>() as f64 / recent.len() as f64;
    assert!(
        mean <= SHORTEST_PATH as f64 * 1.2,
        "mean episode length {} is not within 20% of {}",
        mean,
        SHORTEST_PATH
    );

    let env = open_grid();
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let greedy = rollout(&env, &mut rng, 100, |s| agent.greedy_action(s));
    assert_eq!(greedy, Some(SHORTEST_PATH));
}

#[test]
fn test_sarsa_episodes_get_shorter() {
    let (_, lengths) = train(TdUpdate::Sarsa, 2000);
    let early: usize = lengths[..100].iter().sum();
    let late: usize = lengths[lengths.len() - 100..].iter().sum();
    assert!(late < early, "late {} vs early {}", late, early);
}

#[test]
fn test_dp_values_decrease_with_distance() {
    let env: Arc<dyn Environment> = Arc::new(open_grid());
    let mut agent = DpAgent::new(
        env.clone(),
        DpOptions {
            gamma: 0.95,
            seed: Some(1),
        },
    )
    .unwrap();
    for _ in 0..gridworld::DP_MAX_SWEEPS {
        if agent.learn() < gridworld::DP_TOLERANCE {
            break;
        }
    }
    let grid = open_grid();
    assert!(agent.value(grid.state_of(8, 9)) > agent.value(grid.state_of(0, 0)));
    assert_eq!(agent.value(grid.state_of(9, 9)), 0.0);

    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let steps = rollout(env.as_ref(), &mut rng, 100, |s| Some(agent.act(s)));
    assert_eq!(steps, Some(SHORTEST_PATH));
}

#[test]
fn test_td_runner_saves_loadable_brain() {
    let path = common::temp_path("td_runner");
    let options = TdOptions {
        seed: Some(4),
        alpha: 0.1,
        ..Default::default()
    };
    gridworld::run_td(GridWorld::cliff_demo(), options.clone(), 50, 500, None, Some(&path))
        .unwrap();
    let resumed =
        gridworld::run_td(GridWorld::cliff_demo(), options, 10, 500, Some(&path), None).unwrap();
    assert_eq!(resumed.episodes, 10);
    std::fs::remove_file(&path).ok();
}
