use super::graph::{mlp_forward, mlp_predict, Graph};
use super::policy::ContinuousPolicy;
use super::replay::{Experience, ReplayBuffer};
use super::solver::{Solver, SolverOptions};
use super::tensor::{Mat, Net};
use anyhow::{ensure, Context, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DqnOptions {
    pub gamma: f64,
    pub epsilon: f64,
    pub alpha: f64,
    /// Every n-th online step is also stored for replay.
    pub experience_add_every: usize,
    pub experience_size: usize,
    pub learning_steps_per_iteration: usize,
    pub tderror_clamp: f64,
    pub num_hidden_units: usize,
    pub solver: SolverOptions,
    pub seed: Option<u64>,
}

impl Default for DqnOptions {
    fn default() -> Self {
        Self {
            gamma: 0.75,
            epsilon: 0.1,
            alpha: 0.01,
            experience_add_every: 25,
            experience_size: 5000,
            learning_steps_per_iteration: 10,
            tderror_clamp: 1.0,
            num_hidden_units: 100,
            solver: SolverOptions::default(),
            seed: None,
        }
    }
}

impl DqnOptions {
    pub fn validate(&self) -> Result<()> {
        ensure!((0.0..=1.0).contains(&self.gamma), "DQN gamma must be in [0, 1]");
        ensure!((0.0..=1.0).contains(&self.epsilon), "DQN epsilon must be in [0, 1]");
        ensure!(self.alpha >= 0.0, "DQN alpha must be non-negative");
        ensure!(self.experience_add_every > 0, "experience_add_every must be positive");
        ensure!(self.num_hidden_units > 0, "DQN needs at least one hidden unit");
        ensure!(self.tderror_clamp > 0.0, "tderror_clamp must be positive");
        Ok(())
    }
}

/// Saved network, as `{nh, ns, na, net}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DqnSnapshot {
    pub nh: usize,
    pub ns: usize,
    pub na: usize,
    pub net: Net,
}

/// Q-network agent over continuous state vectors.
///
/// The network is `W2 · tanh(W1 · s + b1) + b2`, one output per action.
/// Learning is one step delayed like [`super::td::TdAgent`].
pub struct DqnAgent {
    pub options: DqnOptions,
    ns: usize,
    na: usize,
    nh: usize,
    net: Net,
    solver: Solver,
    replay: ReplayBuffer<Experience>,
    t: usize,
    tderror: f64,
    s0: Option<Vec<f64>>,
    a0: Option<usize>,
    r0: Option<f64>,
    s1: Option<Vec<f64>>,
    a1: Option<usize>,
    rng: ChaCha8Rng,
}

impl DqnAgent {
    pub fn new(num_states: usize, num_actions: usize, options: DqnOptions) -> Result<Self> {
        options.validate()?;
        ensure!(num_states > 0 && num_actions > 0, "DQN needs states and actions");
        let mut rng = match options.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let nh = options.num_hidden_units;
        let net = Net::mlp(num_states, nh, num_actions, 0.01, &mut rng);
        Ok(Self {
            solver: Solver::new(options.solver),
            replay: ReplayBuffer::new(options.experience_size),
            options,
            ns: num_states,
            na: num_actions,
            nh,
            net,
            t: 0,
            tderror: 0.0,
            s0: None,
            a0: None,
            r0: None,
            s1: None,
            a1: None,
            rng,
        })
    }

    /// Fresh network, empty replay memory.
    pub fn reset(&mut self) {
        self.nh = self.options.num_hidden_units;
        self.net = Net::mlp(self.ns, self.nh, self.na, 0.01, &mut self.rng);
        self.solver = Solver::new(self.options.solver);
        self.replay = ReplayBuffer::new(self.options.experience_size);
        self.t = 0;
        self.tderror = 0.0;
        self.clear_tuple();
    }

    fn clear_tuple(&mut self) {
        self.s0 = None;
        self.a0 = None;
        self.r0 = None;
        self.s1 = None;
        self.a1 = None;
    }

    pub fn net(&self) -> &Net {
        &self.net
    }

    pub fn replay_len(&self) -> usize {
        self.replay.len()
    }

    pub fn last_tderror(&self) -> f64 {
        self.tderror
    }

    /// Q-values for `state` without recording a tape.
    pub fn q_values(&self, state: &[f64]) -> Vec<f64> {
        assert_eq!(state.len(), self.ns, "DQN expects {} inputs", self.ns);
        mlp_predict(&self.net, state)
    }

    pub fn act(&mut self, state: &[f64]) -> usize {
        let a = if self.rng.gen::<f64>() < self.options.epsilon {
            self.rng.gen_range(0..self.na)
        } else {
            Mat::column(&self.q_values(state)).argmax()
        };
        self.s0 = self.s1.take();
        self.a0 = self.a1;
        self.s1 = Some(state.to_vec());
        self.a1 = Some(a);
        a
    }

    /// Online update on the pending transition, replay bookkeeping and
    /// replay updates. Returns the last TD error.
    pub fn learn(&mut self, r1: f64) -> f64 {
        if self.options.alpha > 0.0 {
            if let (Some(s0), Some(a0), Some(r0), Some(s1), Some(a1)) =
                (&self.s0, self.a0, self.r0, &self.s1, self.a1)
            {
                let exp = Experience {
                    s0: s0.clone(),
                    a0,
                    r0,
                    s1: s1.clone(),
                    a1,
                };
                self.tderror =
                    self.learn_from_tuple(&exp.s0, exp.a0, exp.r0, Some(exp.s1.as_slice()));
                if self.t % self.options.experience_add_every == 0 {
                    self.replay.push(exp);
                }
                self.t += 1;

                for _ in 0..self.options.learning_steps_per_iteration {
                    let Some(e) = self.replay.sample(&mut self.rng).cloned() else { break };
                    self.learn_from_tuple(&e.s0, e.a0, e.r0, Some(e.s1.as_slice()));
                }
            }
        }
        self.r0 = Some(r1);
        self.tderror
    }

    /// Learns the last transition of an episode with a non-bootstrapped
    /// target and drops the pending tuple.
    pub fn end_episode(&mut self) -> f64 {
        if self.options.alpha > 0.0 {
            if let (Some(s1), Some(a1), Some(r0)) = (self.s1.take(), self.a1, self.r0) {
                self.tderror = self.learn_from_tuple(&s1, a1, r0, None);
            }
        }
        self.clear_tuple();
        self.tderror
    }

    fn learn_from_tuple(&mut self, s0: &[f64], a0: usize, r0: f64, s1: Option<&[f64]>) -> f64 {
        let target = match s1 {
            Some(s1) => {
                let qmax = self
                    .q_values(s1)
                    .into_iter()
                    .fold(f64::NEG_INFINITY, f64::max);
                r0 + self.options.gamma * qmax
            }
            None => r0,
        };

        let mut graph = Graph::new(true);
        let input = graph.input(Mat::column(s0));
        let pred = mlp_forward(&mut graph, &self.net, input);
        let clamp = self.options.tderror_clamp;
        let raw = graph.value(&self.net, pred).w[a0] - target;
        if !raw.is_finite() {
            tracing::warn!(tderror = raw, "DQN TD error is not finite, skipping update");
            return raw;
        }
        let tderror = raw.clamp(-clamp, clamp);
        graph.grad_mut(pred)[a0] = tderror;
        graph.backward(&mut self.net);
        self.solver.step(&mut self.net, self.options.alpha);
        tderror
    }

    pub fn snapshot(&self) -> DqnSnapshot {
        DqnSnapshot {
            nh: self.nh,
            ns: self.ns,
            na: self.na,
            net: self.net.clone(),
        }
    }

    pub fn load(&mut self, snapshot: DqnSnapshot) -> Result<()> {
        ensure!(
            snapshot.ns == self.ns && snapshot.na == self.na,
            "snapshot has {} inputs and {} actions, agent has {} and {}",
            snapshot.ns,
            snapshot.na,
            self.ns,
            self.na
        );
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let expected = Net::mlp(snapshot.ns, snapshot.nh, snapshot.na, 0.0, &mut rng);
        let net = snapshot.net.arranged_like(&expected).with_context(|| {
            format!("snapshot network does not match nh={}", snapshot.nh)
        })?;
        self.nh = snapshot.nh;
        self.options.num_hidden_units = snapshot.nh;
        self.net = net;
        self.solver.reset();
        self.clear_tuple();
        Ok(())
    }

    pub fn num_states(&self) -> usize {
        self.ns
    }

    pub fn num_actions(&self) -> usize {
        self.na
    }
}

impl ContinuousPolicy for DqnAgent {
    fn act(&mut self, state: &[f64]) -> usize {
        DqnAgent::act(self, state)
    }

    fn learn(&mut self, reward: f64) {
        DqnAgent::learn(self, reward);
    }
}
