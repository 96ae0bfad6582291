//! Discrete Markov decision processes consumed by the tabular agents.

mod gridworld;

pub use gridworld::{GridWorld, ACTION_DOWN, ACTION_LEFT, ACTION_RIGHT, ACTION_UP};

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Outcome of one sampled step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub next_state: usize,
    pub reward: f64,
    /// The step ended the episode; the caller should flush the agent and
    /// draw a fresh start state.
    pub reset_episode: bool,
}

/// A finite MDP with deterministic transitions.
///
/// State and action counts are fixed for the lifetime of the environment.
/// Agents size their tables from them at construction and on `reset`.
pub trait Environment: Send + Sync {
    fn num_states(&self) -> usize;

    fn max_num_actions(&self) -> usize;

    /// Actions available in `s`. Empty for states the agent can never be in.
    fn allowed_actions(&self, s: usize) -> Vec<usize>;

    fn next_state(&self, s: usize, a: usize) -> usize;

    fn reward(&self, s: usize, a: usize, ns: usize) -> f64;

    fn sample_next_state(&self, s: usize, a: usize) -> Transition {
        let ns = self.next_state(s, a);
        Transition {
            next_state: ns,
            reward: self.reward(s, a, ns),
            reset_episode: self.is_terminal(ns),
        }
    }

    fn start_state(&self, rng: &mut dyn RngCore) -> usize;

    fn is_terminal(&self, _s: usize) -> bool {
        false
    }
}
