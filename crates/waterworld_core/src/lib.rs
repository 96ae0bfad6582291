//! # WaterWorld Core
//!
//! The simulation and learning engine behind the WaterWorld sandbox.
//!
//! This crate contains:
//! - A 2D geometry kernel and three broad-phase collision indices
//! - Ray-cast eye sensors and an elastic collision resolver
//! - Discrete MDPs (`GridWorld`) and the continuous `WaterWorld` arena
//! - Tabular DP and TD agents, a DQN with experience replay, and the
//!   autodiff tape they train on
//! - Neuroevolution trainers (GA and ESP)
//! - Configuration, metrics and structured logging
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use waterworld_core::mdp::{Environment, GridWorld};
//! use waterworld_core::rl::{DpAgent, DpOptions};
//!
//! let env: Arc<dyn Environment> = Arc::new(GridWorld::cliff_demo());
//! let mut agent = DpAgent::new(env, DpOptions::default()).unwrap();
//! for _ in 0..50 {
//!     agent.learn();
//! }
//! assert!(agent.value(0).is_finite());
//! ```

/// Broad-phase collision index: brute force, uniform grid, quadtree
pub mod broadphase;
/// Circle-circle and circle-wall collision response
pub mod collision;
/// Configuration management for the arena and the learners
pub mod config;
/// Neuroevolution: whole-network GA and ESP
pub mod evolution;
/// Segment and circle intersection tests
pub mod geometry;
/// Discrete MDP environments
pub mod mdp;
/// Run metrics and logging setup
pub mod metrics;
/// Reinforcement learning agents
pub mod rl;
/// Ray-cast eyes and state encoding
pub mod sensor;
/// Continuous multi-agent arena
pub mod world;

pub use config::AppConfig;
pub use world::{TickReport, WaterWorld};
