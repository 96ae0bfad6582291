use super::graph::mlp_predict;
use super::tensor::Net;

/// Controller for an agent observing a continuous feature vector.
pub trait ContinuousPolicy: Send {
    fn act(&mut self, state: &[f64]) -> usize;

    /// Reward for the action returned by the previous `act`.
    fn learn(&mut self, reward: f64);
}

impl<P: ContinuousPolicy + ?Sized> ContinuousPolicy for Box<P> {
    fn act(&mut self, state: &[f64]) -> usize {
        (**self).act(state)
    }

    fn learn(&mut self, reward: f64) {
        (**self).learn(reward)
    }
}

/// Fixed network that always takes its highest-scoring action. Used to run
/// evolved networks in the water world.
#[derive(Debug, Clone)]
pub struct GreedyNet {
    pub net: Net,
}

impl GreedyNet {
    pub fn new(net: Net) -> Self {
        Self { net }
    }
}

impl ContinuousPolicy for GreedyNet {
    fn act(&mut self, state: &[f64]) -> usize {
        let scores = mlp_predict(&self.net, state);
        let mut best = 0;
        for (i, &v) in scores.iter().enumerate() {
            if v > scores[best] {
                best = i;
            }
        }
        best
    }

    fn learn(&mut self, _reward: f64) {}
}

/// Policy that keeps returning the same action.
#[derive(Debug, Clone, Copy)]
pub struct ConstantPolicy(pub usize);

impl ContinuousPolicy for ConstantPolicy {
    fn act(&mut self, _state: &[f64]) -> usize {
        self.0
    }

    fn learn(&mut self, _reward: f64) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::tensor::Mat;

    #[test]
    fn test_greedy_net_picks_highest_output() {
        let mut net = Net::new();
        net.push("W1", Mat::from_vec(1, 1, vec![0.0]));
        net.push("b1", Mat::new(1, 1));
        net.push("W2", Mat::new(3, 1));
        net.push("b2", Mat::from_vec(3, 1, vec![0.1, 0.7, 0.3]));
        let mut policy = GreedyNet::new(net);
        assert_eq!(policy.act(&[5.0]), 1);
    }
}
