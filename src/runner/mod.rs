//! Headless drivers for the three run modes.

pub mod evolve;
pub mod gridworld;
pub mod waterworld;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn seeded_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}
