pub mod macros;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;
use waterworld_core::broadphase::Strategy;
use waterworld_core::{AppConfig, WaterWorld};
use waterworld_data::{Entity, EntityKind, Vec2, Wall};

#[allow(dead_code)]
pub struct WorldBuilder {
    config: AppConfig,
}

#[allow(dead_code)]
impl WorldBuilder {
    /// Small seeded arena with one agent and no items.
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.world.width = 200.0;
        config.world.height = 200.0;
        config.world.num_items = 0;
        config.world.seed = Some(7);
        config.sensors.num_eyes = 5;
        Self { config }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.world.seed = Some(seed);
        self
    }

    pub fn with_agents(mut self, n: usize) -> Self {
        self.config.world.num_agents = n;
        self
    }

    pub fn with_items(mut self, n: usize) -> Self {
        self.config.world.num_items = n;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.config.broadphase.strategy = strategy;
        self
    }

    pub fn with_config<F>(mut self, modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        modifier(&mut self.config);
        self
    }

    pub fn config(&self) -> AppConfig {
        self.config.clone()
    }

    pub fn build(self) -> WaterWorld {
        WaterWorld::new(self.config).expect("Failed to create world in test builder")
    }
}

/// Random bodies of every kind, some straddling the arena border.
#[allow(dead_code)]
pub fn random_bodies(seed: u64, n: usize, size: f64) -> Vec<Entity> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let kind = EntityKind::ALL[rng.gen_range(1..4)];
            let position = Vec2::new(
                rng.gen_range(-5.0..size + 5.0),
                rng.gen_range(-5.0..size + 5.0),
            );
            let velocity = Vec2::new(rng.gen_range(-3.0..3.0), rng.gen_range(-3.0..3.0));
            let mut body =
                Entity::new(kind, position, rng.gen_range(1.0..12.0)).with_velocity(velocity);
            body.old_position = position - velocity;
            body
        })
        .collect()
}

#[allow(dead_code)]
pub fn box_walls(size: f64) -> Vec<Wall> {
    vec![
        Wall::new(Vec2::new(0.0, 0.0), Vec2::new(size, 0.0)),
        Wall::new(Vec2::new(size, 0.0), Vec2::new(size, size)),
        Wall::new(Vec2::new(size, size), Vec2::new(0.0, size)),
        Wall::new(Vec2::new(0.0, size), Vec2::new(0.0, 0.0)),
        Wall::new(Vec2::new(size * 0.3, size * 0.5), Vec2::new(size * 0.7, size * 0.5)),
    ]
}

#[allow(dead_code)]
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "waterworld_test_{}_{}.json",
        name,
        uuid::Uuid::new_v4()
    ))
}
