use super::tensor::Net;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct SolverOptions {
    pub decay_rate: f64,
    pub smooth_eps: f64,
    /// L2 weight decay applied on every step.
    pub regc: f64,
    /// Gradients are clipped to `±clipval` before the update.
    pub clipval: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            decay_rate: 0.999,
            smooth_eps: 1e-8,
            regc: 0.0,
            clipval: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SolverStats {
    /// Fraction of gradient entries that hit the clip bound.
    pub ratio_clipped: f64,
}

/// RMSProp with gradient clipping and L2 decay.
///
/// Keeps one running mean-square cache per parameter, aligned with the
/// parameter order of the network it is stepped against.
#[derive(Debug, Clone, Default)]
pub struct Solver {
    pub options: SolverOptions,
    step_cache: Vec<Vec<f64>>,
}

impl Solver {
    pub fn new(options: SolverOptions) -> Self {
        Self {
            options,
            step_cache: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.step_cache.clear();
    }

    /// Applies one update to every parameter of `net` and zeroes its
    /// gradients.
    pub fn step(&mut self, net: &mut Net, step_size: f64) -> SolverStats {
        let SolverOptions {
            decay_rate,
            smooth_eps,
            regc,
            clipval,
        } = self.options;

        if self.step_cache.len() != net.len() {
            self.step_cache = net.iter().map(|(_, m)| vec![0.0; m.len()]).collect();
        }

        let mut num_clipped = 0usize;
        let mut num_total = 0usize;
        for ((_, m), cache) in net.iter_mut().zip(self.step_cache.iter_mut()) {
            if cache.len() != m.len() {
                *cache = vec![0.0; m.len()];
            }
            for i in 0..m.w.len() {
                let mut g = m.dw[i];
                cache[i] = cache[i] * decay_rate + (1.0 - decay_rate) * g * g;
                if g > clipval {
                    g = clipval;
                    num_clipped += 1;
                } else if g < -clipval {
                    g = -clipval;
                    num_clipped += 1;
                }
                num_total += 1;
                m.w[i] += -step_size * g / (cache[i] + smooth_eps).sqrt() - regc * m.w[i];
                m.dw[i] = 0.0;
            }
        }

        SolverStats {
            ratio_clipped: if num_total > 0 {
                num_clipped as f64 / num_total as f64
            } else {
                0.0
            },
        }
    }
}
