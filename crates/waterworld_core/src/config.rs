//! Configuration for the arena, the sensors and every learner.
//!
//! All sections map onto a `config.toml` file. Missing sections and
//! missing keys fall back to the `Default` impls.
//!
//! ## Example `config.toml`
//!
//! ```toml
//! [world]
//! width = 700.0
//! height = 500.0
//! num_agents = 2
//! num_items = 40
//! seed = 42
//!
//! [sensors]
//! num_eyes = 9
//! max_range = 120.0
//!
//! [broadphase]
//! strategy = "quadtree"
//!
//! [reward]
//! food = 1.0
//! poison = -1.0
//!
//! [dqn]
//! num_hidden_units = 50
//! ```

use crate::broadphase::BroadPhaseConfig;
use crate::evolution::{EspOptions, GaOptions};
use crate::rl::{DqnOptions, TdOptions};
use serde::{Deserialize, Serialize};
use waterworld_data::Wall;

/// Arena geometry and population.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct WorldConfig {
    pub width: f64,
    pub height: f64,
    pub num_agents: usize,
    /// Items kept alive at all times; consumed or expired items respawn.
    pub num_items: usize,
    pub agent_radius: f64,
    pub item_radius: f64,
    /// Velocity added by one thrust action.
    pub thrust: f64,
    /// Velocity multiplier applied every tick.
    pub drag: f64,
    pub max_speed: f64,
    /// Upper bound of each item velocity component at spawn.
    pub item_speed: f64,
    /// Ticks an item survives before it is despawned.
    pub item_max_age: u64,
    /// Share of spawned items that are poison.
    pub poison_fraction: f64,
    /// Walls placed inside the boundary box.
    pub interior_walls: Vec<Wall>,
    pub seed: Option<u64>,
    /// Ticks between metrics log lines.
    pub log_interval: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 700.0,
            height: 500.0,
            num_agents: 1,
            num_items: 40,
            agent_radius: 10.0,
            item_radius: 10.0,
            thrust: 0.5,
            drag: 0.95,
            max_speed: 2.0,
            item_speed: 1.0,
            item_max_age: 5000,
            poison_fraction: 0.5,
            interior_walls: Vec::new(),
            seed: None,
            log_interval: 1000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SensorConfig {
    pub num_eyes: usize,
    /// Angular spread of the eye fan, in radians.
    pub fov: f64,
    pub max_range: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            num_eyes: 30,
            fov: 0.21 * 29.0,
            max_range: 120.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RewardConfig {
    pub food: f64,
    pub poison: f64,
    /// Added whenever an agent bounces off a wall.
    pub wall: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            food: 1.0,
            poison: -1.0,
            wall: 0.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub world: WorldConfig,
    pub sensors: SensorConfig,
    pub broadphase: BroadPhaseConfig,
    pub reward: RewardConfig,
    pub td: TdOptions,
    pub dqn: DqnOptions,
    pub ga: GaOptions,
    pub esp: EspOptions,
}

impl AppConfig {
    /// Validates all configuration parameters.
    ///
    /// Returns the first failure found. Learner sections are checked with
    /// the same rules their constructors apply.
    pub fn validate(&self) -> anyhow::Result<()> {
        let w = &self.world;
        anyhow::ensure!(
            w.width.is_finite() && w.width > 0.0,
            "World width must be positive"
        );
        anyhow::ensure!(
            w.height.is_finite() && w.height > 0.0,
            "World height must be positive"
        );
        anyhow::ensure!(w.num_agents >= 1, "World needs at least one agent");
        anyhow::ensure!(w.num_agents <= 1000, "Too many agents (max 1000)");
        anyhow::ensure!(w.num_items <= 10_000, "Too many items (max 10000)");
        anyhow::ensure!(w.agent_radius > 0.0, "Agent radius must be positive");
        anyhow::ensure!(w.item_radius > 0.0, "Item radius must be positive");
        anyhow::ensure!(
            2.0 * w.agent_radius.max(w.item_radius) < w.width.min(w.height),
            "Bodies do not fit inside the world"
        );
        anyhow::ensure!(w.thrust >= 0.0, "Thrust must be non-negative");
        anyhow::ensure!(
            w.drag > 0.0 && w.drag <= 1.0,
            "Drag must be in (0, 1]"
        );
        anyhow::ensure!(w.max_speed > 0.0, "Max speed must be positive");
        anyhow::ensure!(w.item_speed >= 0.0, "Item speed must be non-negative");
        anyhow::ensure!(w.item_max_age > 0, "Item max age must be positive");
        anyhow::ensure!(
            (0.0..=1.0).contains(&w.poison_fraction),
            "Poison fraction must be between 0 and 1"
        );
        anyhow::ensure!(
            w.interior_walls
                .iter()
                .all(|wall| wall.p1.is_finite() && wall.p2.is_finite()),
            "Interior walls must have finite endpoints"
        );
        anyhow::ensure!(w.log_interval > 0, "Log interval must be positive");

        let s = &self.sensors;
        anyhow::ensure!(s.num_eyes >= 1, "Agents need at least one eye");
        anyhow::ensure!(s.max_range > 0.0, "Eye range must be positive");
        anyhow::ensure!(
            (0.0..=std::f64::consts::TAU).contains(&s.fov),
            "Eye field of view must be between 0 and 2π"
        );

        let b = &self.broadphase;
        anyhow::ensure!(b.grid_cells >= 1, "Grid needs at least one cell per axis");
        anyhow::ensure!(b.grid_cells <= 1024, "Grid too fine (max 1024 cells per axis)");
        anyhow::ensure!(b.max_children >= 1, "Quadtree max_children must be positive");

        anyhow::ensure!(
            self.reward.food.is_finite()
                && self.reward.poison.is_finite()
                && self.reward.wall.is_finite(),
            "Rewards must be finite"
        );

        self.td.validate()?;
        self.dqn.validate()?;
        self.ga.validate()?;
        self.esp.validate()?;
        Ok(())
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config = toml::from_str::<Self>(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Hash of the sections that change simulation rules. Learner
    /// hyper-parameters are left out so runs stay comparable across them.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(format!("{:?}", self.world).as_bytes());
        hasher.update(format!("{:?}", self.sensors).as_bytes());
        hasher.update(format!("{:?}", self.broadphase).as_bytes());
        hasher.update(format!("{:?}", self.reward).as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadphase::Strategy;

    #[test]
    fn test_default_config_validates() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_world_width() {
        let config = AppConfig {
            world: WorldConfig {
                width: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bodies_must_fit() {
        let config = AppConfig {
            world: WorldConfig {
                width: 15.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_poison_fraction() {
        let config = AppConfig {
            world: WorldConfig {
                poison_fraction: 1.5,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_learner_sections_are_validated() {
        let config = AppConfig {
            td: TdOptions {
                gamma: 1.5,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [world]
            num_agents = 3
            seed = 7

            [broadphase]
            strategy = "quadtree"

            [td]
            update = "sarsa"
            "#,
        )
        .unwrap();
        assert_eq!(config.world.num_agents, 3);
        assert_eq!(config.world.seed, Some(7));
        assert_eq!(config.world.width, 700.0);
        assert_eq!(config.broadphase.strategy, Strategy::Quadtree);
        assert_eq!(config.sensors, SensorConfig::default());
    }

    #[test]
    fn test_from_toml_rejects_invalid_values() {
        assert!(AppConfig::from_toml("[sensors]\nnum_eyes = 0\n").is_err());
    }

    #[test]
    fn test_fingerprint_tracks_rules_only() {
        let base = AppConfig::default();
        assert_eq!(base.fingerprint(), AppConfig::default().fingerprint());

        let mut learner = base.clone();
        learner.dqn.alpha = 0.5;
        assert_eq!(base.fingerprint(), learner.fingerprint());

        let mut rules = base.clone();
        rules.reward.food = 2.0;
        assert_ne!(base.fingerprint(), rules.fingerprint());
    }
}
