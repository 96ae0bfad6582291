//! Continuous arena: agents with eye fans chasing food and avoiding poison
//! inside a walled box.
//!
//! Bodies are stored agents first, items after. Agents are never removed,
//! so agent `i` is always body `i` and policy `i`.

use crate::broadphase::{BroadPhase, Contact};
use crate::collision::{circle_collision, wall_bounce};
use crate::config::AppConfig;
use crate::geometry::point_segment_distance;
use crate::rl::ContinuousPolicy;
use crate::sensor::{encode_state, state_len, Eye};
use anyhow::{ensure, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use waterworld_data::{Entity, EntityKind, Vec2, Wall, NUM_ENTITY_KINDS};

/// Thrust directions for actions `0..4`; action 4 coasts.
const ACTIONS: [Vec2; 5] = [
    Vec2::new(-1.0, 0.0),
    Vec2::new(1.0, 0.0),
    Vec2::new(0.0, -1.0),
    Vec2::new(0.0, 1.0),
    Vec2::ZERO,
];

const SPAWN_ATTEMPTS: usize = 64;

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    /// Reward per agent, in agent order.
    pub rewards: Vec<f64>,
    pub eaten_food: usize,
    pub eaten_poison: usize,
    /// Contacts recorded across all bodies.
    pub collisions: usize,
}

#[derive(Debug, Clone)]
struct AgentState {
    eyes: Vec<Eye>,
    heading: f64,
    observation: Vec<f64>,
}

pub struct WaterWorld {
    config: AppConfig,
    bodies: Vec<Entity>,
    walls: Vec<Wall>,
    agents: Vec<AgentState>,
    broadphase: BroadPhase,
    rng: ChaCha8Rng,
    tick: u64,
}

impl WaterWorld {
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = match config.world.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let (w, h) = (config.world.width, config.world.height);
        let mut walls = vec![
            Wall::new(Vec2::new(0.0, 0.0), Vec2::new(w, 0.0)),
            Wall::new(Vec2::new(w, 0.0), Vec2::new(w, h)),
            Wall::new(Vec2::new(w, h), Vec2::new(0.0, h)),
            Wall::new(Vec2::new(0.0, h), Vec2::new(0.0, 0.0)),
        ];
        walls.extend(config.world.interior_walls.iter().copied());

        let broadphase = BroadPhase::new(&config.broadphase, w, h);
        let eyes = Eye::fan(
            config.sensors.num_eyes,
            config.sensors.fov,
            config.sensors.max_range,
        );
        let agents = (0..config.world.num_agents)
            .map(|_| AgentState {
                eyes: eyes.clone(),
                heading: rng.gen_range(0.0..std::f64::consts::TAU),
                observation: Vec::new(),
            })
            .collect();

        let mut world = Self {
            config,
            bodies: Vec::new(),
            walls,
            agents,
            broadphase,
            rng,
            tick: 0,
        };
        for _ in 0..world.config.world.num_agents {
            let radius = world.config.world.agent_radius;
            let position = world.free_position(radius);
            let id = world.next_id();
            world
                .bodies
                .push(Entity::with_id(id, EntityKind::Agent, position, radius));
        }
        world.respawn_items();
        tracing::debug!(
            agents = world.num_agents(),
            items = world.num_items(),
            walls = world.walls.len(),
            strategy = world.broadphase.strategy_name(),
            "Water world created"
        );
        Ok(world)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn bodies(&self) -> &[Entity] {
        &self.bodies
    }

    pub fn bodies_mut(&mut self) -> &mut [Entity] {
        &mut self.bodies
    }

    pub fn walls(&self) -> &[Wall] {
        &self.walls
    }

    pub fn eyes(&self, agent: usize) -> &[Eye] {
        &self.agents[agent].eyes
    }

    /// State vector agent `agent` acted on during the last tick.
    pub fn observation(&self, agent: usize) -> &[f64] {
        &self.agents[agent].observation
    }

    pub fn num_agents(&self) -> usize {
        self.agents.len()
    }

    pub fn num_items(&self) -> usize {
        self.bodies.len() - self.agents.len()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn state_size(&self) -> usize {
        state_len(self.config.sensors.num_eyes, NUM_ENTITY_KINDS)
    }

    pub fn num_actions(&self) -> usize {
        ACTIONS.len()
    }

    pub fn strategy_name(&self) -> &'static str {
        self.broadphase.strategy_name()
    }

    /// Adds an item at a fixed position.
    pub fn insert_item(&mut self, kind: EntityKind, position: Vec2, velocity: Vec2) -> Result<()> {
        ensure!(kind.is_item(), "{:?} is not an item kind", kind);
        let id = self.next_id();
        let item = Entity::with_id(id, kind, position, self.config.world.item_radius)
            .with_velocity(velocity);
        self.bodies.push(item);
        Ok(())
    }

    fn next_id(&mut self) -> Uuid {
        Uuid::from_u128(self.rng.gen())
    }

    /// Random position for a body of `radius` that overlaps no body and no
    /// wall. Falls back to the last candidate when the arena is crowded.
    fn free_position(&mut self, radius: f64) -> Vec2 {
        let (w, h) = (self.config.world.width, self.config.world.height);
        let mut candidate = Vec2::new(w / 2.0, h / 2.0);
        for _ in 0..SPAWN_ATTEMPTS {
            candidate = Vec2::new(
                self.rng.gen_range(radius..w - radius),
                self.rng.gen_range(radius..h - radius),
            );
            let clear_of_bodies = self
                .bodies
                .iter()
                .all(|b| b.position.dist_from(candidate) >= b.radius + radius);
            let clear_of_walls = self
                .walls
                .iter()
                .all(|wall| point_segment_distance(wall.p1, wall.p2, candidate) > radius);
            if clear_of_bodies && clear_of_walls {
                return candidate;
            }
        }
        tracing::debug!(radius = radius, "No free spawn position found, placing anyway");
        candidate
    }

    fn respawn_items(&mut self) {
        let radius = self.config.world.item_radius;
        let speed = self.config.world.item_speed;
        while self.num_items() < self.config.world.num_items {
            let kind = if self.rng.gen::<f64>() < self.config.world.poison_fraction {
                EntityKind::Poison
            } else {
                EntityKind::Food
            };
            let position = self.free_position(radius);
            let velocity = if speed > 0.0 {
                Vec2::new(
                    self.rng.gen_range(-speed..=speed),
                    self.rng.gen_range(-speed..=speed),
                )
            } else {
                Vec2::ZERO
            };
            let id = self.next_id();
            self.bodies
                .push(Entity::with_id(id, kind, position, radius).with_velocity(velocity));
        }
    }

    /// Advances the world by one step.
    ///
    /// `policies[i]` controls agent `i`: it receives the sensed state, picks
    /// an action, and learns the reward the action earned.
    pub fn tick<P: ContinuousPolicy>(&mut self, policies: &mut [P]) -> Result<TickReport> {
        ensure!(
            policies.len() == self.agents.len(),
            "Expected {} policies, got {}",
            self.agents.len(),
            policies.len()
        );
        let n_agents = self.agents.len();

        // Age out stale items and top the population back up.
        let max_age = self.config.world.item_max_age;
        for body in &mut self.bodies {
            body.age += 1;
        }
        self.bodies
            .retain(|b| b.kind == EntityKind::Agent || b.age <= max_age);
        self.respawn_items();

        // Sense.
        for body in &mut self.bodies {
            body.collisions.clear();
        }
        {
            let population = self.broadphase.update_population(&self.bodies, &self.walls);
            let max_speed = self.config.world.max_speed;
            for (i, agent) in self.agents.iter_mut().enumerate() {
                for eye in &mut agent.eyes {
                    eye.sense(&population, i, agent.heading);
                }
                agent.observation = encode_state(
                    &agent.eyes,
                    NUM_ENTITY_KINDS,
                    population.bodies()[i].velocity,
                    max_speed,
                );
            }
        }

        // Act and move.
        let (thrust, drag, max_speed) = (
            self.config.world.thrust,
            self.config.world.drag,
            self.config.world.max_speed,
        );
        for (i, policy) in policies.iter_mut().enumerate() {
            let action = policy.act(&self.agents[i].observation);
            let direction = match ACTIONS.get(action) {
                Some(d) => *d,
                None => {
                    tracing::warn!(agent = i, action = action, "Action out of range, coasting");
                    Vec2::ZERO
                }
            };
            let body = &mut self.bodies[i];
            let mut velocity = (body.velocity + direction * thrust) * drag;
            let speed = velocity.length();
            if speed > max_speed {
                velocity = velocity * (max_speed / speed);
            }
            body.velocity = velocity;
            if speed > 1e-9 {
                self.agents[i].heading = velocity.y.atan2(velocity.x);
            }
        }
        for body in &mut self.bodies {
            body.integrate();
        }

        // Resolve contacts against the moved bodies.
        let (contacts, cells): (Vec<Vec<Contact>>, Vec<Option<usize>>) = {
            let population = self.broadphase.update_population(&self.bodies, &self.walls);
            (0..self.bodies.len())
                .map(|i| {
                    (
                        population.check(i),
                        population.cell_of(population.bodies()[i].position),
                    )
                })
                .unzip()
        };

        let mut report = TickReport {
            rewards: vec![0.0; n_agents],
            ..Default::default()
        };
        for (body, (found, cell)) in self.bodies.iter_mut().zip(contacts.iter().zip(cells)) {
            body.collisions = found.iter().map(Contact::collider).collect();
            body.grid_cell = cell;
            report.collisions += found.len();
        }

        for (i, found) in contacts.iter().enumerate() {
            let wall = found.iter().find_map(|c| match *c {
                Contact::Wall { index, .. } => Some(index),
                Contact::Body { .. } => None,
            });
            if let Some(index) = wall {
                let response = wall_bounce(&self.bodies[i], &self.walls[index]);
                self.bodies[i].position = response.position;
                self.bodies[i].velocity = response.velocity;
                if i < n_agents {
                    report.rewards[i] += self.config.reward.wall;
                }
            }
        }

        let mut eaten = vec![false; self.bodies.len()];
        for (i, found) in contacts.iter().enumerate().take(n_agents) {
            for contact in found {
                let Contact::Body { index, kind } = *contact else {
                    continue;
                };
                match kind {
                    EntityKind::Food | EntityKind::Poison if !eaten[index] => {
                        eaten[index] = true;
                        if kind == EntityKind::Food {
                            report.rewards[i] += self.config.reward.food;
                            report.eaten_food += 1;
                        } else {
                            report.rewards[i] += self.config.reward.poison;
                            report.eaten_poison += 1;
                        }
                    }
                    EntityKind::Agent if index > i => {
                        if let Some(response) = circle_collision(&self.bodies[i], &self.bodies[index])
                        {
                            self.bodies[i].velocity = response.velocity_a;
                            self.bodies[index].velocity = response.velocity_b;
                        }
                    }
                    _ => {}
                }
            }
        }
        let mut idx = 0;
        self.bodies.retain(|_| {
            let keep = !eaten[idx];
            idx += 1;
            keep
        });

        for (policy, &reward) in policies.iter_mut().zip(&report.rewards) {
            policy.learn(reward);
        }
        self.tick += 1;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadphase::Strategy;
    use crate::config::WorldConfig;
    use crate::rl::ConstantPolicy;
    use std::sync::{Arc, Mutex};
    use waterworld_data::Collider;

    fn config(num_agents: usize, num_items: usize) -> AppConfig {
        AppConfig {
            world: WorldConfig {
                width: 300.0,
                height: 200.0,
                num_agents,
                num_items,
                seed: Some(11),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn coasting(n: usize) -> Vec<Box<dyn ContinuousPolicy>> {
        (0..n)
            .map(|_| Box::new(ConstantPolicy(4)) as Box<dyn ContinuousPolicy>)
            .collect()
    }

    /// Puts agent `i` at rest at `position`.
    fn park(world: &mut WaterWorld, i: usize, position: Vec2, velocity: Vec2) {
        let body = &mut world.bodies_mut()[i];
        body.position = position;
        body.old_position = position;
        body.velocity = velocity;
    }

    struct Recorder {
        rewards: Arc<Mutex<Vec<f64>>>,
    }

    impl ContinuousPolicy for Recorder {
        fn act(&mut self, _state: &[f64]) -> usize {
            4
        }

        fn learn(&mut self, reward: f64) {
            self.rewards.lock().unwrap().push(reward);
        }
    }

    #[test]
    fn test_new_world_layout() {
        let mut cfg = config(2, 10);
        cfg.world.interior_walls = vec![Wall::new(Vec2::new(150.0, 50.0), Vec2::new(150.0, 150.0))];
        let world = WaterWorld::new(cfg).unwrap();
        assert_eq!(world.walls().len(), 5);
        assert_eq!(world.num_agents(), 2);
        assert_eq!(world.num_items(), 10);
        assert!(world.bodies()[..2].iter().all(|b| b.kind == EntityKind::Agent));
        assert!(world.bodies()[2..].iter().all(|b| b.kind.is_item()));
        assert_eq!(world.state_size(), 30 * NUM_ENTITY_KINDS + 2);
        assert_eq!(world.num_actions(), 5);
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let run = || {
            let mut world = WaterWorld::new(config(2, 15)).unwrap();
            let mut policies = coasting(2);
            for _ in 0..50 {
                world.tick(&mut policies).unwrap();
            }
            world
                .bodies()
                .iter()
                .map(|b| (b.id, b.position))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_agent_eats_food() {
        let mut world = WaterWorld::new(config(1, 0)).unwrap();
        park(&mut world, 0, Vec2::new(100.0, 100.0), Vec2::ZERO);
        world
            .insert_item(EntityKind::Food, Vec2::new(112.0, 100.0), Vec2::ZERO)
            .unwrap();
        let mut policies = coasting(1);
        let report = world.tick(&mut policies).unwrap();
        assert_eq!(report.eaten_food, 1);
        assert_eq!(report.rewards, vec![1.0]);
        assert_eq!(world.num_items(), 0);
        assert!(world.bodies()[0].collisions.contains(&Collider::Body(1)));
    }

    #[test]
    fn test_poison_reward_reaches_policy() {
        let mut world = WaterWorld::new(config(1, 0)).unwrap();
        park(&mut world, 0, Vec2::new(100.0, 100.0), Vec2::ZERO);
        world
            .insert_item(EntityKind::Poison, Vec2::new(100.0, 115.0), Vec2::ZERO)
            .unwrap();
        let rewards = Arc::new(Mutex::new(Vec::new()));
        let mut policies: Vec<Box<dyn ContinuousPolicy>> = vec![Box::new(Recorder {
            rewards: Arc::clone(&rewards),
        })];
        let report = world.tick(&mut policies).unwrap();
        assert_eq!(report.eaten_poison, 1);
        assert_eq!(report.rewards, vec![-1.0]);
        assert_eq!(*rewards.lock().unwrap(), vec![-1.0]);
        assert_eq!(world.observation(0).len(), world.state_size());
    }

    #[test]
    fn test_agent_bounces_off_wall() {
        let mut world = WaterWorld::new(config(1, 0)).unwrap();
        park(&mut world, 0, Vec2::new(11.0, 100.0), Vec2::new(-2.0, 0.0));
        let mut policies = coasting(1);
        world.tick(&mut policies).unwrap();
        let agent = &world.bodies()[0];
        assert!(agent.velocity.x > 0.0);
        assert_eq!(agent.position, Vec2::new(11.0, 100.0));
        assert!(agent.collisions.contains(&Collider::Wall(3)));
    }

    #[test]
    fn test_agents_exchange_momentum() {
        let mut world = WaterWorld::new(config(2, 0)).unwrap();
        park(&mut world, 0, Vec2::new(100.0, 100.0), Vec2::new(1.0, 0.0));
        park(&mut world, 1, Vec2::new(119.0, 100.0), Vec2::new(-1.0, 0.0));
        let mut policies = coasting(2);
        world.tick(&mut policies).unwrap();
        assert!(world.bodies()[0].velocity.x < 0.0);
        assert!(world.bodies()[1].velocity.x > 0.0);
    }

    #[test]
    fn test_items_expire_and_respawn() {
        let mut cfg = config(1, 5);
        cfg.world.item_max_age = 3;
        cfg.world.item_speed = 0.0;
        let mut world = WaterWorld::new(cfg).unwrap();
        let first: Vec<Uuid> = world.bodies()[1..].iter().map(|b| b.id).collect();
        let mut policies = coasting(1);
        for _ in 0..4 {
            world.tick(&mut policies).unwrap();
        }
        assert_eq!(world.num_items(), 5);
        assert!(world.bodies()[1..].iter().all(|b| b.age <= 3));
        assert!(world.bodies()[1..].iter().all(|b| !first.contains(&b.id)));
    }

    #[test]
    fn test_every_strategy_runs() {
        for strategy in [Strategy::BruteForce, Strategy::Grid, Strategy::Quadtree] {
            let mut cfg = config(3, 20);
            cfg.broadphase.strategy = strategy;
            let mut world = WaterWorld::new(cfg).unwrap();
            let mut policies = coasting(3);
            for _ in 0..20 {
                world.tick(&mut policies).unwrap();
            }
            assert_eq!(world.tick_count(), 20);
            assert!(world.bodies().iter().all(|b| b.position.is_finite()));
        }
    }

    #[test]
    fn test_policy_count_must_match() {
        let mut world = WaterWorld::new(config(2, 0)).unwrap();
        let mut policies = coasting(1);
        assert!(world.tick(&mut policies).is_err());
    }
}
