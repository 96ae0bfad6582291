use super::{breed, elite_count, sort_by_fitness, Chromosome, SlotNetwork};
use crate::rl::{GreedyNet, Net};
use anyhow::{ensure, Result};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// One-hidden-layer network split by hidden unit.
///
/// Slot `i` holds hidden unit `i`'s input weights (row `i` of `W1`), its
/// bias and its output weights (column `i` of `W2`). The output biases
/// belong to no slot and stay fixed.
#[derive(Debug, Clone, PartialEq)]
pub struct EspNet {
    net: Net,
    ns: usize,
    nh: usize,
    na: usize,
}

impl EspNet {
    pub fn new<R: Rng + ?Sized>(ns: usize, nh: usize, na: usize, rng: &mut R) -> Self {
        Self {
            net: Net::mlp(ns, nh, na, 1.0, rng),
            ns,
            nh,
            na,
        }
    }

    pub fn net(&self) -> &Net {
        &self.net
    }

    pub fn into_net(self) -> Net {
        self.net
    }

    pub fn into_policy(self) -> GreedyNet {
        GreedyNet::new(self.net)
    }
}

impl SlotNetwork for EspNet {
    fn num_slots(&self) -> usize {
        self.nh
    }

    fn slot_len(&self) -> usize {
        self.ns + 1 + self.na
    }

    fn slot(&self, i: usize) -> Vec<f64> {
        let mut gene = Vec::with_capacity(self.slot_len());
        let w1 = self.net.param(0);
        gene.extend_from_slice(&w1.w[i * self.ns..(i + 1) * self.ns]);
        gene.push(self.net.param(1).w[i]);
        let w2 = self.net.param(2);
        for o in 0..self.na {
            gene.push(w2.get(o, i));
        }
        gene
    }

    fn set_slot(&mut self, i: usize, gene: &[f64]) -> Result<()> {
        ensure!(i < self.nh, "slot {} out of {}", i, self.nh);
        ensure!(
            gene.len() == self.slot_len(),
            "slot gene has {} values, expected {}",
            gene.len(),
            self.slot_len()
        );
        let ns = self.ns;
        self.net.param_mut(0).w[i * ns..(i + 1) * ns].copy_from_slice(&gene[..ns]);
        self.net.param_mut(1).w[i] = gene[ns];
        let w2 = self.net.param_mut(2);
        for (o, &g) in gene[ns + 1..].iter().enumerate() {
            w2.set(o, i, g);
        }
        Ok(())
    }
}

/// How a composite's fitness is credited to its participants.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CreditMode {
    #[default]
    Average,
    Best,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EspOptions {
    /// Chromosomes per sub-population.
    pub population_size: usize,
    pub mutation_rate: f64,
    pub elite_percentage: f64,
    pub mutation_size: f64,
    pub target_fitness: f64,
    pub burst_generations: usize,
    /// Permutation rounds per generation; each chromosome joins this many
    /// composites.
    pub num_match: usize,
    pub credit: CreditMode,
    pub initial_burst: f64,
    pub seed: Option<u64>,
}

impl Default for EspOptions {
    fn default() -> Self {
        Self {
            population_size: 20,
            mutation_rate: 0.2,
            elite_percentage: 0.2,
            mutation_size: 0.05,
            target_fitness: 1e20,
            burst_generations: 10,
            num_match: 3,
            credit: CreditMode::Average,
            initial_burst: 1.0,
            seed: None,
        }
    }
}

impl EspOptions {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.population_size >= 2, "ESP sub-populations need at least two chromosomes");
        ensure!(self.num_match >= 1, "num_match must be at least 1");
        ensure!((0.0..=1.0).contains(&self.mutation_rate), "mutation_rate must be in [0, 1]");
        Ok(())
    }
}

/// Enforced sub-populations: one population per slot, evaluated as
/// composites.
pub struct EspTrainer {
    pub options: EspOptions,
    subpops: Vec<Vec<Chromosome>>,
    best_set: Vec<Vec<f64>>,
    best_fitness: f64,
    stagnation: usize,
    generation: u64,
    rng: ChaCha8Rng,
}

impl EspTrainer {
    pub fn new<N: SlotNetwork>(options: EspOptions, net: &N) -> Result<Self> {
        options.validate()?;
        ensure!(net.num_slots() > 0, "network has no slots to evolve");
        let mut rng = match options.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let best_set: Vec<Vec<f64>> = (0..net.num_slots()).map(|i| net.slot(i)).collect();
        let subpops = best_set
            .iter()
            .map(|gene| {
                (0..options.population_size)
                    .map(|k| {
                        let mut c = Chromosome::new(gene.clone());
                        if k > 0 {
                            c.burst_mutate(options.initial_burst, &mut rng);
                        }
                        c
                    })
                    .collect()
            })
            .collect();
        Ok(Self {
            options,
            subpops,
            best_set,
            best_fitness: f64::NEG_INFINITY,
            stagnation: 0,
            generation: 0,
            rng,
        })
    }

    pub fn num_subpops(&self) -> usize {
        self.subpops.len()
    }

    pub fn subpop(&self, i: usize) -> &[Chromosome] {
        &self.subpops[i]
    }

    pub fn best_fitness(&self) -> f64 {
        self.best_fitness
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn reached_target(&self) -> bool {
        self.best_fitness >= self.options.target_fitness
    }

    /// Evaluates `num_match` rounds of composites, evolves every
    /// sub-population and loads the best composite seen so far into `net`.
    /// Returns the best composite fitness of this generation.
    pub fn train<N, F>(&mut self, net: &mut N, mut fitness: F) -> Result<f64>
    where
        N: SlotNetwork,
        F: FnMut(&N) -> f64,
    {
        ensure!(
            net.num_slots() == self.subpops.len(),
            "network has {} slots, trainer has {} sub-populations",
            net.num_slots(),
            self.subpops.len()
        );
        let pop_size = self.options.population_size;
        let credit = self.options.credit;
        for c in self.subpops.iter_mut().flatten() {
            c.n_trial = 0;
            c.fitness = match credit {
                CreditMode::Average => 0.0,
                CreditMode::Best => f64::NEG_INFINITY,
            };
        }

        let mut scratch = net.clone();
        let mut generation_best = f64::NEG_INFINITY;
        let mut generation_set: Vec<Vec<f64>> = Vec::new();
        for _ in 0..self.options.num_match {
            let perms: Vec<Vec<usize>> = (0..self.subpops.len())
                .map(|_| {
                    let mut p: Vec<usize> = (0..pop_size).collect();
                    p.shuffle(&mut self.rng);
                    p
                })
                .collect();

            for k in 0..pop_size {
                for (sp, perm) in perms.iter().enumerate() {
                    scratch.set_slot(sp, &self.subpops[sp][perm[k]].gene)?;
                }
                let f = fitness(&scratch);
                for (sp, perm) in perms.iter().enumerate() {
                    let c = &mut self.subpops[sp][perm[k]];
                    c.n_trial += 1;
                    match credit {
                        CreditMode::Average => c.fitness += f,
                        CreditMode::Best => c.fitness = c.fitness.max(f),
                    }
                }
                if f > generation_best {
                    generation_best = f;
                    generation_set = perms
                        .iter()
                        .enumerate()
                        .map(|(sp, perm)| self.subpops[sp][perm[k]].gene.clone())
                        .collect();
                }
            }
        }
        if credit == CreditMode::Average {
            for c in self.subpops.iter_mut().flatten() {
                if c.n_trial > 0 {
                    c.fitness /= c.n_trial as f64;
                }
            }
        }

        let n_elite = elite_count(pop_size, self.options.elite_percentage);
        for pop in &mut self.subpops {
            sort_by_fitness(pop);
            breed(
                pop,
                n_elite,
                self.options.mutation_rate,
                self.options.mutation_size,
                &mut self.rng,
            );
        }

        if generation_best > self.best_fitness {
            self.best_fitness = generation_best;
            self.best_set = generation_set;
            self.stagnation = 0;
        } else {
            self.stagnation += 1;
        }
        if self.stagnation > self.options.burst_generations {
            for (pop, best) in self.subpops.iter_mut().zip(&self.best_set) {
                let seed = Chromosome::new(best.clone());
                for c in &mut pop[n_elite..] {
                    c.copy_from(&seed);
                    c.burst_mutate(self.options.initial_burst, &mut self.rng);
                }
            }
            self.stagnation = 0;
            tracing::debug!(generation = self.generation, "ESP stagnated, burst mutation");
        }

        for (sp, gene) in self.best_set.iter().enumerate() {
            net.set_slot(sp, gene)?;
        }
        self.generation += 1;
        tracing::debug!(
            generation = self.generation,
            best = generation_best,
            overall = self.best_fitness,
            "ESP generation complete"
        );
        Ok(generation_best)
    }
}
