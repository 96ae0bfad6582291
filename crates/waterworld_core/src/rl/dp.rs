use super::sample_weighted;
use super::table::Table;
use crate::mdp::Environment;
use anyhow::{ensure, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const TIE_EPS: f64 = 1e-12;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DpOptions {
    pub gamma: f64,
    pub seed: Option<u64>,
}

impl Default for DpOptions {
    fn default() -> Self {
        Self {
            gamma: 0.75,
            seed: None,
        }
    }
}

/// Policy iteration over a fully known environment.
///
/// Each `learn` call runs one synchronous Bellman sweep under the current
/// stochastic policy, then makes the policy greedy with respect to the new
/// values. Terminal states keep a value of zero.
pub struct DpAgent {
    env: Arc<dyn Environment>,
    pub options: DpOptions,
    ns: usize,
    na: usize,
    v: Vec<f64>,
    p: Table,
    rng: ChaCha8Rng,
}

impl DpAgent {
    pub fn new(env: Arc<dyn Environment>, options: DpOptions) -> Result<Self> {
        ensure!(
            (0.0..1.0).contains(&options.gamma),
            "DP gamma must be in [0, 1), got {}",
            options.gamma
        );
        let rng = match options.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let mut agent = Self {
            env,
            options,
            ns: 0,
            na: 0,
            v: Vec::new(),
            p: Table::new(0, 0, 0.0),
            rng,
        };
        agent.reset();
        Ok(agent)
    }

    /// Reallocates values and a uniform policy from the environment's
    /// current dimensions.
    pub fn reset(&mut self) {
        self.ns = self.env.num_states();
        self.na = self.env.max_num_actions();
        self.v = vec![0.0; self.ns];
        self.p = Table::new(self.ns, self.na, 0.0);
        for s in 0..self.ns {
            let poss = self.env.allowed_actions(s);
            let prob = 1.0 / poss.len().max(1) as f64;
            for a in poss {
                self.p.set(s, a, prob);
            }
        }
    }

    pub fn env(&self) -> &dyn Environment {
        self.env.as_ref()
    }

    pub fn value(&self, s: usize) -> f64 {
        self.v[s]
    }

    pub fn values(&self) -> &[f64] {
        &self.v
    }

    pub fn policy(&self) -> &Table {
        &self.p
    }

    /// Samples an action from the current policy.
    pub fn act(&mut self, s: usize) -> usize {
        let poss = self.env.allowed_actions(s);
        let probs: Vec<f64> = poss.iter().map(|&a| self.p.get(s, a)).collect();
        match sample_weighted(&probs, &mut self.rng) {
            Some(i) => poss[i],
            None => 0,
        }
    }

    /// One evaluation sweep plus a greedy policy update. Returns the
    /// largest absolute change in any state value.
    pub fn learn(&mut self) -> f64 {
        let delta = self.evaluate_policy();
        self.update_policy();
        delta
    }

    fn backup(&self, s: usize, a: usize) -> f64 {
        let ns = self.env.next_state(s, a);
        self.env.reward(s, a, ns) + self.options.gamma * self.v[ns]
    }

    pub fn evaluate_policy(&mut self) -> f64 {
        let mut v_new = vec![0.0; self.ns];
        for (s, slot) in v_new.iter_mut().enumerate() {
            if self.env.is_terminal(s) {
                continue;
            }
            *slot = self
                .env
                .allowed_actions(s)
                .into_iter()
                .map(|a| self.p.get(s, a) * self.backup(s, a))
                .sum();
        }
        let delta = self
            .v
            .iter()
            .zip(&v_new)
            .map(|(old, new)| (old - new).abs())
            .fold(0.0, f64::max);
        self.v = v_new;
        delta
    }

    /// Greedy policy; ties share probability uniformly.
    pub fn update_policy(&mut self) {
        for s in 0..self.ns {
            if self.env.is_terminal(s) {
                continue;
            }
            let poss = self.env.allowed_actions(s);
            if poss.is_empty() {
                continue;
            }
            let values: Vec<f64> = poss.iter().map(|&a| self.backup(s, a)).collect();
            let vmax = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let nmax = values.iter().filter(|&&v| vmax - v <= TIE_EPS).count();
            for (&a, &v) in poss.iter().zip(&values) {
                let prob = if vmax - v <= TIE_EPS {
                    1.0 / nmax as f64
                } else {
                    0.0
                };
                self.p.set(s, a, prob);
            }
        }
    }

    /// Largest violation of `V(s) = max_a [r + γ V(s')]` over non-terminal
    /// states.
    pub fn bellman_residual(&self) -> f64 {
        (0..self.ns)
            .filter(|&s| !self.env.is_terminal(s))
            .filter_map(|s| {
                let best = self
                    .env
                    .allowed_actions(s)
                    .into_iter()
                    .map(|a| self.backup(s, a))
                    .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))))?;
                Some((best - self.v[s]).abs())
            })
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mdp::GridWorld;

    fn agent(env: GridWorld, gamma: f64) -> DpAgent {
        DpAgent::new(
            Arc::new(env),
            DpOptions {
                gamma,
                seed: Some(1),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_converges_to_bellman_fixed_point() {
        let mut dp = agent(GridWorld::cliff_demo(), 0.9);
        for _ in 0..500 {
            dp.learn();
        }
        assert!(dp.bellman_residual() < 1e-6);
        assert_eq!(dp.value(55), 0.0);
    }

    #[test]
    fn test_values_on_a_line() {
        let env = GridWorld::new(4, 1)
            .unwrap()
            .with_goal(3, 0, 1.0)
            .with_step_penalty(0.0);
        let mut dp = agent(env, 0.5);
        for _ in 0..100 {
            dp.learn();
        }
        assert!((dp.value(2) - 1.0).abs() < 1e-9);
        assert!((dp.value(1) - 0.5).abs() < 1e-9);
        assert!((dp.value(0) - 0.25).abs() < 1e-9);
        // Always walks right.
        assert_eq!(dp.act(1), 3);
    }

    #[test]
    fn test_ties_split_uniformly() {
        let env = GridWorld::new(3, 3).unwrap();
        let mut dp = agent(env, 0.9);
        dp.learn();
        // No rewards anywhere: every allowed action ties.
        assert!((dp.policy().get(4, 0) - 0.25).abs() < 1e-12);
        assert!((dp.policy().get(0, 2) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_bad_gamma() {
        assert!(DpAgent::new(
            Arc::new(GridWorld::new(2, 2).unwrap()),
            DpOptions {
                gamma: 1.5,
                seed: None
            }
        )
        .is_err());
    }
}
