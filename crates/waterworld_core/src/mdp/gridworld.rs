use super::Environment;
use anyhow::{ensure, Result};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

pub const ACTION_LEFT: usize = 0;
pub const ACTION_UP: usize = 1;
pub const ACTION_DOWN: usize = 2;
pub const ACTION_RIGHT: usize = 3;

/// Rectangular grid MDP.
///
/// States are laid out column-major: `s = x * height + y`. Moving into a
/// blocked cell leaves the agent where it was; moves off the grid are not
/// offered at all. Entering a goal cell ends the episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridWorld {
    pub width: usize,
    pub height: usize,
    /// Reward collected on entering each cell.
    rewards: Vec<f64>,
    blocked: Vec<bool>,
    goals: Vec<bool>,
    /// Subtracted from every step's reward.
    pub step_penalty: f64,
    /// Fixed start cell; `None` draws a random free cell per episode.
    pub start: Option<usize>,
}

impl GridWorld {
    /// Checks a grid that did not come from the builders, e.g. one read
    /// from JSON.
    pub fn validate(&self) -> Result<()> {
        let n = self.width * self.height;
        ensure!(n > 0, "GridWorld needs at least one cell");
        ensure!(
            self.rewards.len() == n && self.blocked.len() == n && self.goals.len() == n,
            "GridWorld cell tables must hold {} entries",
            n
        );
        if let Some(s) = self.start {
            ensure!(s < n && !self.blocked[s], "GridWorld start {} is not a free cell", s);
        }
        ensure!(
            (0..n).any(|s| !self.blocked[s] && !self.goals[s]),
            "GridWorld has no free cell to start from"
        );
        Ok(())
    }

    pub fn new(width: usize, height: usize) -> Result<Self> {
        ensure!(width > 0 && height > 0, "GridWorld needs at least one cell");
        let n = width * height;
        Ok(Self {
            width,
            height,
            rewards: vec![0.0; n],
            blocked: vec![false; n],
            goals: vec![false; n],
            step_penalty: 0.0,
            start: Some(0),
        })
    }

    /// The classic 10×10 demo: a wall segment, a field of -1 cliffs and a
    /// +1 goal in the middle.
    pub fn cliff_demo() -> Self {
        let mut grid = Self {
            width: 10,
            height: 10,
            rewards: vec![0.0; 100],
            blocked: vec![false; 100],
            goals: vec![false; 100],
            step_penalty: 0.0,
            start: Some(0),
        };
        for s in [22, 23, 24, 25, 26, 27, 42, 52, 62, 72] {
            grid.blocked[s] = true;
        }
        for s in [33, 37, 54, 57, 63, 64, 65, 67, 85, 86] {
            grid.rewards[s] = -1.0;
        }
        grid.rewards[55] = 1.0;
        grid.goals[55] = true;
        grid
    }

    #[inline]
    pub fn state_of(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width && y < self.height);
        x * self.height + y
    }

    /// State of a builder cell. Panics when `(x, y)` lies outside the grid.
    fn cell(&self, x: usize, y: usize) -> usize {
        assert!(
            x < self.width && y < self.height,
            "cell ({}, {}) is outside the {}x{} grid",
            x,
            y,
            self.width,
            self.height
        );
        x * self.height + y
    }

    #[inline]
    pub fn xy(&self, s: usize) -> (usize, usize) {
        (s / self.height, s % self.height)
    }

    pub fn with_wall(mut self, x: usize, y: usize) -> Self {
        let s = self.cell(x, y);
        self.blocked[s] = true;
        self
    }

    pub fn with_reward(mut self, x: usize, y: usize, reward: f64) -> Self {
        let s = self.cell(x, y);
        self.rewards[s] = reward;
        self
    }

    pub fn with_goal(mut self, x: usize, y: usize, reward: f64) -> Self {
        let s = self.cell(x, y);
        self.rewards[s] = reward;
        self.goals[s] = true;
        self
    }

    pub fn with_step_penalty(mut self, penalty: f64) -> Self {
        self.step_penalty = penalty;
        self
    }

    pub fn with_start(mut self, x: usize, y: usize) -> Self {
        self.start = Some(self.cell(x, y));
        self
    }

    pub fn with_random_start(mut self) -> Self {
        self.start = None;
        self
    }

    pub fn is_blocked(&self, s: usize) -> bool {
        self.blocked[s]
    }

    pub fn cell_reward(&self, s: usize) -> f64 {
        self.rewards[s]
    }
}

impl Environment for GridWorld {
    fn num_states(&self) -> usize {
        self.width * self.height
    }

    fn max_num_actions(&self) -> usize {
        4
    }

    fn allowed_actions(&self, s: usize) -> Vec<usize> {
        if self.blocked[s] {
            return Vec::new();
        }
        let (x, y) = self.xy(s);
        let mut actions = Vec::with_capacity(4);
        if x > 0 {
            actions.push(ACTION_LEFT);
        }
        if y > 0 {
            actions.push(ACTION_UP);
        }
        if y + 1 < self.height {
            actions.push(ACTION_DOWN);
        }
        if x + 1 < self.width {
            actions.push(ACTION_RIGHT);
        }
        actions
    }

    fn next_state(&self, s: usize, a: usize) -> usize {
        if self.blocked[s] || self.goals[s] {
            return s;
        }
        let (x, y) = self.xy(s);
        let (nx, ny) = match a {
            ACTION_LEFT if x > 0 => (x - 1, y),
            ACTION_UP if y > 0 => (x, y - 1),
            ACTION_DOWN if y + 1 < self.height => (x, y + 1),
            ACTION_RIGHT if x + 1 < self.width => (x + 1, y),
            _ => (x, y),
        };
        let ns = self.state_of(nx, ny);
        if self.blocked[ns] {
            s
        } else {
            ns
        }
    }

    fn reward(&self, _s: usize, _a: usize, ns: usize) -> f64 {
        self.rewards[ns] - self.step_penalty
    }

    fn start_state(&self, rng: &mut dyn RngCore) -> usize {
        if let Some(s) = self.start {
            return s;
        }
        let free: Vec<usize> = (0..self.num_states())
            .filter(|&s| !self.blocked[s] && !self.goals[s])
            .collect();
        if free.is_empty() {
            return 0;
        }
        free[rng.gen_range(0..free.len())]
    }

    fn is_terminal(&self, s: usize) -> bool {
        self.goals[s]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_rectangular_indexing() {
        let grid = GridWorld::new(4, 3).unwrap();
        assert_eq!(grid.num_states(), 12);
        for s in 0..12 {
            let (x, y) = grid.xy(s);
            assert!(x < 4 && y < 3);
            assert_eq!(grid.state_of(x, y), s);
        }
        assert_eq!(grid.state_of(3, 2), 11);
    }

    #[test]
    fn test_actions_move_in_the_right_direction() {
        let grid = GridWorld::new(3, 3).unwrap();
        let center = grid.state_of(1, 1);
        assert_eq!(grid.next_state(center, ACTION_LEFT), grid.state_of(0, 1));
        assert_eq!(grid.next_state(center, ACTION_UP), grid.state_of(1, 0));
        assert_eq!(grid.next_state(center, ACTION_DOWN), grid.state_of(1, 2));
        assert_eq!(grid.next_state(center, ACTION_RIGHT), grid.state_of(2, 1));
    }

    #[test]
    fn test_border_actions_are_not_offered() {
        let grid = GridWorld::new(3, 3).unwrap();
        assert_eq!(grid.allowed_actions(0), vec![ACTION_DOWN, ACTION_RIGHT]);
        assert_eq!(
            grid.allowed_actions(grid.state_of(2, 2)),
            vec![ACTION_LEFT, ACTION_UP]
        );
    }

    #[test]
    fn test_blocked_cell_keeps_agent_in_place() {
        let grid = GridWorld::new(3, 3).unwrap().with_wall(1, 0);
        assert_eq!(grid.next_state(0, ACTION_RIGHT), 0);
        assert!(grid.allowed_actions(grid.state_of(1, 0)).is_empty());
    }

    #[test]
    fn test_goal_ends_episode_with_reward() {
        let grid = GridWorld::new(2, 1)
            .unwrap()
            .with_goal(1, 0, 1.0)
            .with_step_penalty(0.01);
        let t = grid.sample_next_state(0, ACTION_RIGHT);
        assert_eq!(t.next_state, 1);
        assert!(t.reset_episode);
        assert!((t.reward - 0.99).abs() < 1e-12);
    }

    #[test]
    fn test_random_start_avoids_walls_and_goals() {
        let grid = GridWorld::new(3, 1)
            .unwrap()
            .with_wall(0, 0)
            .with_goal(2, 0, 1.0)
            .with_random_start();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..20 {
            assert_eq!(grid.start_state(&mut rng), 1);
        }
    }

    #[test]
    fn test_cliff_demo_goal_is_reachable() {
        let grid = GridWorld::cliff_demo();
        assert!(grid.is_terminal(55));
        assert!(!grid.is_blocked(45));
        assert_eq!(grid.next_state(45, ACTION_RIGHT), 55);
    }

    #[test]
    #[should_panic(expected = "outside the 10x10 grid")]
    fn test_goal_outside_grid_panics() {
        let _ = GridWorld::new(10, 10).unwrap().with_goal(0, 12, 1.0);
    }

    #[test]
    #[should_panic(expected = "outside the 4x3 grid")]
    fn test_wall_past_width_panics() {
        let _ = GridWorld::new(4, 3).unwrap().with_wall(4, 0);
    }

    #[test]
    fn test_validate_catches_bad_json() {
        let grid = GridWorld::cliff_demo();
        assert!(grid.validate().is_ok());
        let mut json = serde_json::to_value(&grid).unwrap();
        json["width"] = serde_json::json!(11);
        let broken: GridWorld = serde_json::from_value(json).unwrap();
        assert!(broken.validate().is_err());
        assert!(GridWorld::cliff_demo().with_start(2, 2).validate().is_err());
    }
}
