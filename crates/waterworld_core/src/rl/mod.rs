//! Reinforcement learning agents and the autodiff they run on.
//!
//! - [`DpAgent`]: policy iteration over a known [`crate::mdp::Environment`]
//! - [`TdAgent`]: Q-learning / SARSA with traces and prioritized sweeping
//! - [`DqnAgent`]: Q-network with experience replay and RMSProp
//!
//! Tabular state lives in [`Table`]s; the DQN trains a [`Net`] through a
//! [`Graph`] tape.

pub mod dp;
pub mod dqn;
pub mod graph;
pub mod policy;
pub mod replay;
pub mod solver;
pub mod table;
pub mod td;
pub mod tensor;

pub use dp::{DpAgent, DpOptions};
pub use dqn::{DqnAgent, DqnOptions, DqnSnapshot};
pub use graph::{mlp_forward, mlp_predict, Graph, Handle};
pub use policy::{ConstantPolicy, ContinuousPolicy, GreedyNet};
pub use replay::{Experience, ReplayBuffer};
pub use solver::{Solver, SolverOptions, SolverStats};
pub use table::Table;
pub use td::{TdAgent, TdOptions, TdSnapshot, TdUpdate};
pub use tensor::{Mat, Net};

use rand::Rng;

/// Index drawn in proportion to `weights`. `None` when empty or all zero.
pub(crate) fn sample_weighted<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Option<usize> {
    let total: f64 = weights.iter().sum();
    if weights.is_empty() || total <= 0.0 {
        return None;
    }
    let r = rng.gen::<f64>() * total;
    let mut acc = 0.0;
    for (i, &w) in weights.iter().enumerate() {
        acc += w;
        if r < acc {
            return Some(i);
        }
    }
    weights.iter().rposition(|&w| w > 0.0)
}
