//! Neuroevolution: a whole-network genetic algorithm and ESP
//! (enforced sub-populations), which evolves one hidden unit per
//! sub-population.

mod esp;
mod ga;

pub use esp::{CreditMode, EspNet, EspOptions, EspTrainer};
pub use ga::{GaOptions, GaTrainer};

use crate::rl::Net;
use anyhow::{ensure, Result};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Flat weight vector plus its most recent evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chromosome {
    pub gene: Vec<f64>,
    pub fitness: f64,
    pub n_trial: u32,
}

fn gaussian<R: Rng + ?Sized>(rng: &mut R, std: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    z * std
}

impl Chromosome {
    pub fn new(gene: Vec<f64>) -> Self {
        Self {
            gene,
            fitness: 0.0,
            n_trial: 0,
        }
    }

    pub fn from_network(net: &Net) -> Self {
        Self::new(net.flatten())
    }

    pub fn push_to_network(&self, net: &mut Net) -> Result<()> {
        net.load_flat(&self.gene)
    }

    pub fn len(&self) -> usize {
        self.gene.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gene.is_empty()
    }

    /// Replaces every gene with a draw from `N(0, burst²)`.
    pub fn randomize<R: Rng + ?Sized>(&mut self, burst: f64, rng: &mut R) {
        for g in &mut self.gene {
            *g = gaussian(rng, burst);
        }
    }

    /// Adds `N(0, burst²)` noise to every gene.
    pub fn burst_mutate<R: Rng + ?Sized>(&mut self, burst: f64, rng: &mut R) {
        for g in &mut self.gene {
            *g += gaussian(rng, burst);
        }
    }

    /// Each gene mutates with probability `rate` by `N(0, size²)` noise.
    pub fn mutate<R: Rng + ?Sized>(&mut self, rate: f64, size: f64, rng: &mut R) {
        for g in &mut self.gene {
            if rng.gen::<f64>() < rate {
                *g += gaussian(rng, size);
            }
        }
    }

    /// Single-point crossover. The first child takes this chromosome's head
    /// and the partner's tail; the second child the reverse.
    pub fn crossover<R: Rng + ?Sized>(
        &self,
        partner: &Chromosome,
        rng: &mut R,
    ) -> (Chromosome, Chromosome) {
        assert_eq!(self.len(), partner.len(), "crossover between different gene lengths");
        let point = if self.gene.is_empty() {
            0
        } else {
            rng.gen_range(0..self.len())
        };
        let mut kid1 = self.gene[..point].to_vec();
        kid1.extend_from_slice(&partner.gene[point..]);
        let mut kid2 = partner.gene[..point].to_vec();
        kid2.extend_from_slice(&self.gene[point..]);
        (Chromosome::new(kid1), Chromosome::new(kid2))
    }

    pub fn copy_from(&mut self, other: &Chromosome) {
        self.gene.clone_from(&other.gene);
        self.fitness = other.fitness;
        self.n_trial = other.n_trial;
    }
}

/// A network whose weights are split into independently evolvable slots.
pub trait SlotNetwork: Clone {
    fn num_slots(&self) -> usize;

    fn slot_len(&self) -> usize;

    fn slot(&self, i: usize) -> Vec<f64>;

    fn set_slot(&mut self, i: usize, gene: &[f64]) -> Result<()>;
}

/// A plain network is a single slot holding every weight.
impl SlotNetwork for Net {
    fn num_slots(&self) -> usize {
        1
    }

    fn slot_len(&self) -> usize {
        self.num_weights()
    }

    fn slot(&self, _i: usize) -> Vec<f64> {
        self.flatten()
    }

    fn set_slot(&mut self, i: usize, gene: &[f64]) -> Result<()> {
        ensure!(i == 0, "a plain network has a single slot, got {}", i);
        self.load_flat(gene)
    }
}

/// Even elite count, at least two when the population allows it.
pub(crate) fn elite_count(population: usize, elite_percentage: f64) -> usize {
    let raw = (elite_percentage * population as f64).floor() as usize;
    let even = (raw / 2) * 2;
    even.max(2).min(population)
}

pub(crate) fn sort_by_fitness(chromosomes: &mut [Chromosome]) {
    chromosomes.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
}

/// Refills everything after the elite with mutated crossover children of
/// random elite parents. Expects `chromosomes` sorted best first.
pub(crate) fn breed<R: Rng + ?Sized>(
    chromosomes: &mut [Chromosome],
    n_elite: usize,
    mutation_rate: f64,
    mutation_size: f64,
    rng: &mut R,
) {
    let n = chromosomes.len();
    if n_elite == 0 || n_elite >= n {
        return;
    }
    let mut i = n_elite;
    while i < n {
        let p1 = rng.gen_range(0..n_elite);
        let p2 = rng.gen_range(0..n_elite);
        let (kid1, kid2) = chromosomes[p1].crossover(&chromosomes[p2], rng);
        chromosomes[i] = kid1;
        if i + 1 < n {
            chromosomes[i + 1] = kid2;
        }
        i += 2;
    }
    for c in &mut chromosomes[n_elite..] {
        c.mutate(mutation_rate, mutation_size, rng);
    }
}
