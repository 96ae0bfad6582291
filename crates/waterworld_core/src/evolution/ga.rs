use super::{breed, elite_count, sort_by_fitness, Chromosome};
use crate::rl::Net;
use anyhow::{ensure, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GaOptions {
    pub population_size: usize,
    pub mutation_rate: f64,
    pub elite_percentage: f64,
    pub mutation_size: f64,
    pub target_fitness: f64,
    /// Generations without improvement before the non-elite population is
    /// reseeded around the best chromosome.
    pub burst_generations: usize,
    /// Evaluations per chromosome; the best one counts.
    pub best_trial: usize,
    /// Noise applied to the initial population and to stagnation bursts.
    pub initial_burst: f64,
    pub seed: Option<u64>,
}

impl Default for GaOptions {
    fn default() -> Self {
        Self {
            population_size: 100,
            mutation_rate: 0.01,
            elite_percentage: 0.2,
            mutation_size: 0.05,
            target_fitness: 1e20,
            burst_generations: 10,
            best_trial: 1,
            initial_burst: 1.0,
            seed: None,
        }
    }
}

impl GaOptions {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.population_size >= 2, "GA population needs at least two chromosomes");
        ensure!((0.0..=1.0).contains(&self.mutation_rate), "mutation_rate must be in [0, 1]");
        ensure!(
            (0.0..=1.0).contains(&self.elite_percentage),
            "elite_percentage must be in [0, 1]"
        );
        ensure!(self.best_trial >= 1, "best_trial must be at least 1");
        Ok(())
    }
}

/// Evolves the full weight vector of a [`Net`].
pub struct GaTrainer {
    pub options: GaOptions,
    chromosomes: Vec<Chromosome>,
    best_fitness: f64,
    stagnation: usize,
    generation: u64,
    rng: ChaCha8Rng,
}

impl GaTrainer {
    /// Seeds the population from `net`: the first chromosome is the network
    /// itself, the rest are burst-mutated copies.
    pub fn new(options: GaOptions, net: &Net) -> Result<Self> {
        options.validate()?;
        let mut rng = match options.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let base = Chromosome::from_network(net);
        let chromosomes = (0..options.population_size)
            .map(|i| {
                let mut c = base.clone();
                if i > 0 {
                    c.burst_mutate(options.initial_burst, &mut rng);
                }
                c
            })
            .collect();
        Ok(Self {
            options,
            chromosomes,
            best_fitness: f64::NEG_INFINITY,
            stagnation: 0,
            generation: 0,
            rng,
        })
    }

    pub fn chromosomes(&self) -> &[Chromosome] {
        &self.chromosomes
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

    /// Runs one generation and loads the best chromosome into `net`.
    /// Returns the best fitness of the generation.
    pub fn train<F>(&mut self, net: &mut Net, mut fitness: F) -> Result<f64>
    where
        F: FnMut(&Net) -> f64,
    {
        let mut scratch = net.clone();
        for c in &mut self.chromosomes {
            c.push_to_network(&mut scratch)?;
            let mut best = f64::NEG_INFINITY;
            for _ in 0..self.options.best_trial {
                best = best.max(fitness(&scratch));
            }
            c.fitness = best;
            c.n_trial += self.options.best_trial as u32;
        }
        sort_by_fitness(&mut self.chromosomes);

        let n_elite = elite_count(self.chromosomes.len(), self.options.elite_percentage);
        let generation_best = self.chromosomes[0].fitness;
        breed(
            &mut self.chromosomes,
            n_elite,
            self.options.mutation_rate,
            self.options.mutation_size,
            &mut self.rng,
        );
        self.chromosomes[0].push_to_network(net)?;

        if generation_best > self.best_fitness {
            self.best_fitness = generation_best;
            self.stagnation = 0;
        } else {
            self.stagnation += 1;
        }
        if self.stagnation > self.options.burst_generations {
            let best = self.chromosomes[0].clone();
            for c in &mut self.chromosomes[n_elite..] {
                c.copy_from(&best);
                c.burst_mutate(self.options.initial_burst, &mut self.rng);
            }
            self.stagnation = 0;
            tracing::debug!(generation = self.generation, "GA stagnated, burst mutation");
        }

        self.generation += 1;
        tracing::debug!(
            generation = self.generation,
            best = generation_best,
            "GA generation complete"
        );
        Ok(generation_best)
    }
}
