use super::sample_weighted;
use super::table::Table;
use crate::mdp::Environment;
use anyhow::{ensure, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const MIN_UPDATE: f64 = 1e-5;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TdUpdate {
    #[default]
    Qlearn,
    Sarsa,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TdOptions {
    pub update: TdUpdate,
    pub gamma: f64,
    pub epsilon: f64,
    pub alpha: f64,
    /// Move the policy towards the greedy one by `beta` instead of jumping.
    pub smooth_policy_update: bool,
    pub beta: f64,
    /// Eligibility trace decay; `0` disables traces.
    pub lambda: f64,
    pub replacing_traces: bool,
    pub q_init_val: f64,
    /// Prioritized-sweeping planning steps per `learn`; `0` disables the model.
    pub plan_n: usize,
    pub seed: Option<u64>,
}

impl Default for TdOptions {
    fn default() -> Self {
        Self {
            update: TdUpdate::Qlearn,
            gamma: 0.75,
            epsilon: 0.1,
            alpha: 0.01,
            smooth_policy_update: false,
            beta: 0.01,
            lambda: 0.0,
            replacing_traces: true,
            q_init_val: 0.0,
            plan_n: 0,
            seed: None,
        }
    }
}

impl TdOptions {
    pub fn validate(&self) -> Result<()> {
        ensure!((0.0..=1.0).contains(&self.gamma), "TD gamma must be in [0, 1]");
        ensure!((0.0..=1.0).contains(&self.epsilon), "TD epsilon must be in [0, 1]");
        ensure!(self.alpha > 0.0, "TD alpha must be positive");
        ensure!((0.0..=1.0).contains(&self.lambda), "TD lambda must be in [0, 1]");
        ensure!(
            self.beta > 0.0 && self.beta <= 1.0,
            "TD beta must be in (0, 1]"
        );
        Ok(())
    }
}

/// Saved Q and policy tables.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TdSnapshot {
    pub ns: usize,
    pub na: usize,
    pub q: Vec<f64>,
    pub p: Vec<f64>,
}

/// What the target of a backup bootstraps from.
#[derive(Debug, Clone, Copy)]
enum Next {
    Terminal,
    State { s1: usize, a1: Option<usize> },
}

/// Tabular temporal-difference learner.
///
/// `act` and `learn` alternate: `act(s)` picks `a`, the caller steps the
/// environment and reports the reward through `learn(r)`. Learning lags one
/// step behind so the SARSA target can use the next chosen action; call
/// `end_episode` after the final reward to flush the pending transition.
pub struct TdAgent {
    env: Arc<dyn Environment>,
    pub options: TdOptions,
    ns: usize,
    na: usize,
    q: Table,
    p: Table,
    e: Table,
    model_next: Vec<Option<usize>>,
    model_reward: Table,
    priority: Table,
    sa_seen: Vec<usize>,
    explored: bool,
    s0: Option<usize>,
    a0: Option<usize>,
    r0: Option<f64>,
    s1: Option<usize>,
    a1: Option<usize>,
    rng: ChaCha8Rng,
}

impl TdAgent {
    pub fn new(env: Arc<dyn Environment>, options: TdOptions) -> Result<Self> {
        options.validate()?;
        let rng = match options.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let mut agent = Self {
            env,
            options,
            ns: 0,
            na: 0,
            q: Table::new(0, 0, 0.0),
            p: Table::new(0, 0, 0.0),
            e: Table::new(0, 0, 0.0),
            model_next: Vec::new(),
            model_reward: Table::new(0, 0, 0.0),
            priority: Table::new(0, 0, 0.0),
            sa_seen: Vec::new(),
            explored: false,
            s0: None,
            a0: None,
            r0: None,
            s1: None,
            a1: None,
            rng,
        };
        agent.reset();
        Ok(agent)
    }

    pub fn reset(&mut self) {
        self.ns = self.env.num_states();
        self.na = self.env.max_num_actions();
        self.q = Table::new(self.ns, self.na, self.options.q_init_val);
        self.p = Table::new(self.ns, self.na, 0.0);
        for s in 0..self.ns {
            let poss = self.env.allowed_actions(s);
            let prob = 1.0 / poss.len().max(1) as f64;
            for a in poss {
                self.p.set(s, a, prob);
            }
        }
        self.e = Table::new(self.ns, self.na, 0.0);
        self.model_next = vec![None; self.ns * self.na];
        self.model_reward = Table::new(self.ns, self.na, 0.0);
        self.priority = Table::new(self.ns, self.na, 0.0);
        self.sa_seen.clear();
        self.explored = false;
        self.clear_tuple();
    }

    fn clear_tuple(&mut self) {
        self.s0 = None;
        self.a0 = None;
        self.r0 = None;
        self.s1 = None;
        self.a1 = None;
    }

    pub fn env(&self) -> &dyn Environment {
        self.env.as_ref()
    }

    pub fn q(&self) -> &Table {
        &self.q
    }

    pub fn policy(&self) -> &Table {
        &self.p
    }

    /// Epsilon-greedy over the stochastic policy.
    pub fn act(&mut self, s: usize) -> usize {
        let poss = self.env.allowed_actions(s);
        debug_assert!(!poss.is_empty(), "act called in state {} with no actions", s);
        let a = if poss.is_empty() {
            0
        } else if self.rng.gen::<f64>() < self.options.epsilon {
            self.explored = true;
            poss[self.rng.gen_range(0..poss.len())]
        } else {
            self.explored = false;
            let probs: Vec<f64> = poss.iter().map(|&a| self.p.get(s, a)).collect();
            poss[sample_weighted(&probs, &mut self.rng).unwrap_or(0)]
        };
        self.s0 = self.s1;
        self.a0 = self.a1;
        self.s1 = Some(s);
        self.a1 = Some(a);
        a
    }

    /// Reports the reward for the last action and learns from the
    /// transition before it.
    pub fn learn(&mut self, r1: f64) {
        if let (Some(s0), Some(a0), Some(r0), Some(s1)) = (self.s0, self.a0, self.r0, self.s1) {
            let next = Next::State { s1, a1: self.a1 };
            self.learn_from_tuple(s0, a0, r0, next, self.options.lambda);
            if self.options.plan_n > 0 {
                self.update_model(s0, a0, r0, s1);
                self.plan();
            }
        }
        self.r0 = Some(r1);
    }

    /// Learns the final transition of an episode without bootstrapping and
    /// forgets the pending tuple and traces.
    pub fn end_episode(&mut self) {
        if let (Some(s), Some(a), Some(r)) = (self.s1, self.a1, self.r0) {
            self.learn_from_tuple(s, a, r, Next::Terminal, self.options.lambda);
            if self.options.plan_n > 0 {
                self.plan();
            }
        }
        self.e.fill(0.0);
        self.explored = false;
        self.clear_tuple();
    }

    fn max_q(&self, s: usize) -> f64 {
        self.env
            .allowed_actions(s)
            .into_iter()
            .map(|a| self.q.get(s, a))
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))))
            .unwrap_or(0.0)
    }

    fn target(&self, r0: f64, next: Next) -> f64 {
        match next {
            Next::Terminal => r0,
            Next::State { s1, .. } if self.env.is_terminal(s1) => r0,
            Next::State { s1, a1 } => {
                let bootstrap = match (self.options.update, a1) {
                    (TdUpdate::Sarsa, Some(a1)) => self.q.get(s1, a1),
                    (TdUpdate::Sarsa, None) => 0.0,
                    (TdUpdate::Qlearn, _) => self.max_q(s1),
                };
                r0 + self.options.gamma * bootstrap
            }
        }
    }

    fn learn_from_tuple(&mut self, s0: usize, a0: usize, r0: f64, next: Next, lambda: f64) {
        let target = self.target(r0, next);
        let alpha = self.options.alpha;

        if lambda > 0.0 {
            if self.options.replacing_traces {
                self.e.set(s0, a0, 1.0);
            } else {
                self.e.add(s0, a0, 1.0);
            }
            let decay = lambda * self.options.gamma;
            let mut state_update = vec![0.0; self.ns];
            for (s, max_update) in state_update.iter_mut().enumerate() {
                for a in self.env.allowed_actions(s) {
                    let trace = self.e.get(s, a);
                    if trace == 0.0 {
                        continue;
                    }
                    let update = alpha * trace * (target - self.q.get(s, a));
                    self.q.add(s, a, update);
                    self.update_priority(s, update);
                    self.e.scale(s, a, decay);
                    *max_update = f64::max(*max_update, update.abs());
                }
            }
            for (s, &u) in state_update.iter().enumerate() {
                if u > MIN_UPDATE {
                    self.update_policy(s);
                }
            }
            // Watkins cut: an exploratory step breaks the greedy chain.
            if self.explored && self.options.update == TdUpdate::Qlearn {
                self.e.fill(0.0);
            }
        } else {
            let update = alpha * (target - self.q.get(s0, a0));
            self.q.add(s0, a0, update);
            self.update_priority(s0, update);
            self.update_policy(s0);
        }
    }

    /// Raises the priority of every modelled predecessor of `s`.
    fn update_priority(&mut self, s: usize, update: f64) {
        let u = update.abs();
        if u < MIN_UPDATE || self.options.plan_n == 0 {
            return;
        }
        for &idx in &self.sa_seen {
            if self.model_next[idx] == Some(s) {
                let (si, ai) = self.priority.pair(idx);
                self.priority.add(si, ai, u);
            }
        }
    }

    fn update_model(&mut self, s0: usize, a0: usize, r0: f64, s1: usize) {
        let idx = self.q.index(s0, a0);
        if self.model_next[idx].is_none() {
            self.sa_seen.push(idx);
        }
        self.model_next[idx] = Some(s1);
        self.model_reward.set(s0, a0, r0);
    }

    /// Replays the `plan_n` highest-priority modelled pairs.
    fn plan(&mut self) {
        let mut queue: Vec<(usize, f64)> = self
            .sa_seen
            .iter()
            .map(|&idx| {
                let (s, a) = self.priority.pair(idx);
                (idx, self.priority.get(s, a))
            })
            .filter(|&(_, p)| p > MIN_UPDATE)
            .collect();
        queue.sort_by(|a, b| b.1.total_cmp(&a.1));

        for &(idx, _) in queue.iter().take(self.options.plan_n) {
            let (s0, a0) = self.priority.pair(idx);
            self.priority.set(s0, a0, 0.0);
            let Some(s1) = self.model_next[idx] else { continue };
            let r0 = self.model_reward.get(s0, a0);
            let a1 = match self.options.update {
                TdUpdate::Sarsa => {
                    let poss = self.env.allowed_actions(s1);
                    if poss.is_empty() {
                        None
                    } else {
                        Some(poss[self.rng.gen_range(0..poss.len())])
                    }
                }
                TdUpdate::Qlearn => None,
            };
            self.learn_from_tuple(s0, a0, r0, Next::State { s1, a1 }, 0.0);
        }
    }

    /// Moves the policy at `s` towards greedy; ties share probability.
    fn update_policy(&mut self, s: usize) {
        let poss = self.env.allowed_actions(s);
        if poss.is_empty() {
            return;
        }
        let qs: Vec<f64> = poss.iter().map(|&a| self.q.get(s, a)).collect();
        let qmax = qs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let nmax = qs.iter().filter(|&&q| q == qmax).count();

        let mut psum = 0.0;
        for (&a, &q) in poss.iter().zip(&qs) {
            let target = if q == qmax { 1.0 / nmax as f64 } else { 0.0 };
            if self.options.smooth_policy_update {
                let p = self.p.get(s, a);
                let p = p + self.options.beta * (target - p);
                self.p.set(s, a, p);
                psum += p;
            } else {
                self.p.set(s, a, target);
            }
        }
        if self.options.smooth_policy_update && psum > 0.0 {
            for &a in &poss {
                let p = self.p.get(s, a);
                self.p.set(s, a, p / psum);
            }
        }
    }

    /// Greedy action under the current Q table, lowest index on ties.
    pub fn greedy_action(&self, s: usize) -> Option<usize> {
        let poss = self.env.allowed_actions(s);
        let mut best: Option<(usize, f64)> = None;
        for a in poss {
            let q = self.q.get(s, a);
            if best.map_or(true, |(_, bq)| q > bq) {
                best = Some((a, q));
            }
        }
        best.map(|(a, _)| a)
    }

    pub fn snapshot(&self) -> TdSnapshot {
        TdSnapshot {
            ns: self.ns,
            na: self.na,
            q: self.q.as_slice().to_vec(),
            p: self.p.as_slice().to_vec(),
        }
    }

    pub fn load(&mut self, snapshot: TdSnapshot) -> Result<()> {
        ensure!(
            snapshot.ns == self.ns && snapshot.na == self.na,
            "snapshot is {}x{}, agent is {}x{}",
            snapshot.ns,
            snapshot.na,
            self.ns,
            self.na
        );
        self.q = Table::from_raw(snapshot.ns, snapshot.na, snapshot.q)?;
        self.p = Table::from_raw(snapshot.ns, snapshot.na, snapshot.p)?;
        self.e.fill(0.0);
        self.clear_tuple();
        Ok(())
    }
}
