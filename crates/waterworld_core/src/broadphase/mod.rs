//! Broad-phase collision index.
//!
//! Three interchangeable strategies sit behind the [`SpatialIndex`] trait:
//! - [`BruteForce`]: every collider is a candidate (test oracle)
//! - [`UniformGrid`]: fixed cells with offset-indexed buckets
//! - [`Quadtree`]: recursive partition with split threshold and depth cap
//!
//! The index itself only produces candidates. Narrow-phase tests and the
//! nearest-wall / nearest-hit selection live in [`Population`], so all
//! three strategies answer `check` and `raycast` identically.
//!
//! A [`Population`] is the only way to query. It is returned by
//! [`BroadPhase::update_population`] and borrows the bodies it was built
//! from, so a query against a stale snapshot does not compile.
//!
//! ```
//! use waterworld_core::broadphase::{BroadPhase, BroadPhaseConfig};
//! use waterworld_data::{Entity, EntityKind, Vec2, Wall};
//!
//! let bodies = vec![
//!     Entity::new(EntityKind::Agent, Vec2::new(10.0, 10.0), 5.0),
//!     Entity::new(EntityKind::Food, Vec2::new(14.0, 10.0), 3.0),
//! ];
//! let walls = vec![Wall::new(Vec2::new(0.0, 0.0), Vec2::new(100.0, 0.0))];
//! let mut broadphase = BroadPhase::new(&BroadPhaseConfig::default(), 100.0, 100.0);
//! let population = broadphase.update_population(&bodies, &walls);
//! assert_eq!(population.check(0).len(), 1);
//! ```

mod brute;
mod grid;
mod quadtree;

pub use brute::BruteForce;
pub use grid::{CellScan, UniformGrid};
pub use quadtree::Quadtree;

use crate::geometry::{segment_circle_intersect, segment_intersect};
use serde::{Deserialize, Serialize};
use waterworld_data::{Aabb, Collider, Entity, EntityKind, Vec2, Wall};

/// Candidate generator shared by every broad-phase strategy.
///
/// Collider ids are dense: bodies occupy `0..bodies.len()`, walls follow.
pub trait SpatialIndex: Send {
    fn name(&self) -> &'static str;

    /// Re-buckets every collider. Invalidates all previous query results.
    fn rebuild(&mut self, bodies: &[Aabb], walls: &[Aabb]);

    /// Appends the ids of colliders that may intersect `area`.
    ///
    /// May return false positives, never false negatives (except for the
    /// documented [`CellScan::OwnCell`] approximation). No duplicates.
    fn query(&self, area: &Aabb, out: &mut Vec<usize>);

    /// Cell reference for `point`, for strategies that have cells.
    fn cell_of(&self, _point: Vec2) -> Option<usize> {
        None
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    BruteForce,
    #[default]
    Grid,
    Quadtree,
}

impl std::str::FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "brute" | "brute_force" | "bruteforce" => Ok(Strategy::BruteForce),
            "grid" | "uniform_grid" => Ok(Strategy::Grid),
            "quadtree" | "quad" => Ok(Strategy::Quadtree),
            other => Err(anyhow::anyhow!("Unknown broad-phase strategy: {}", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BroadPhaseConfig {
    pub strategy: Strategy,
    /// Cells per axis for the uniform grid.
    pub grid_cells: usize,
    pub cell_scan: CellScan,
    /// Quadtree split threshold.
    pub max_children: usize,
    /// Quadtree recursion cap.
    pub max_depth: usize,
}

impl Default for BroadPhaseConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Grid,
            grid_cells: 8,
            cell_scan: CellScan::Neighborhood,
            max_children: 8,
            max_depth: 6,
        }
    }
}

/// Body-body or body-wall contact reported by [`Population::check`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Contact {
    Body {
        index: usize,
        kind: EntityKind,
    },
    Wall {
        index: usize,
        /// Parameter along the movement segment; `1.0` for a resting overlap.
        t: f64,
        point: Vec2,
    },
}

impl Contact {
    pub fn collider(&self) -> Collider {
        match *self {
            Contact::Body { index, .. } => Collider::Body(index),
            Contact::Wall { index, .. } => Collider::Wall(index),
        }
    }
}

/// Nearest hit along a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub collider: Collider,
    pub kind: EntityKind,
    /// Parameter along the ray in `(0, 1)`.
    pub t: f64,
    pub point: Vec2,
}

/// Owns the spatial index and the scratch bounds reused every tick.
pub struct BroadPhase {
    index: Box<dyn SpatialIndex>,
    body_bounds: Vec<Aabb>,
    wall_bounds: Vec<Aabb>,
}

impl BroadPhase {
    pub fn new(config: &BroadPhaseConfig, width: f64, height: f64) -> Self {
        let index: Box<dyn SpatialIndex> = match config.strategy {
            Strategy::BruteForce => Box::new(BruteForce::new()),
            Strategy::Grid => Box::new(UniformGrid::new(
                width,
                height,
                config.grid_cells,
                config.cell_scan,
            )),
            Strategy::Quadtree => Box::new(Quadtree::new(
                Aabb::new(Vec2::ZERO, Vec2::new(width, height)),
                config.max_children,
                config.max_depth,
            )),
        };
        Self::from_index(index)
    }

    pub fn from_index(index: Box<dyn SpatialIndex>) -> Self {
        Self {
            index,
            body_bounds: Vec::new(),
            wall_bounds: Vec::new(),
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.index.name()
    }

    /// Rebuilds the index from the current bodies and walls.
    ///
    /// Bodies are bucketed by their swept box so movement-segment tests
    /// against walls and other bodies see every candidate.
    pub fn update_population<'a>(
        &'a mut self,
        bodies: &'a [Entity],
        walls: &'a [Wall],
    ) -> Population<'a> {
        self.body_bounds.clear();
        self.body_bounds.extend(bodies.iter().map(Entity::swept_aabb));
        self.wall_bounds.clear();
        self.wall_bounds.extend(walls.iter().map(Wall::aabb));
        self.index.rebuild(&self.body_bounds, &self.wall_bounds);
        Population {
            index: self.index.as_ref(),
            bodies,
            walls,
        }
    }
}

/// Read-only view over one tick's snapshot.
pub struct Population<'a> {
    index: &'a dyn SpatialIndex,
    bodies: &'a [Entity],
    walls: &'a [Wall],
}

impl<'a> Population<'a> {
    pub fn bodies(&self) -> &'a [Entity] {
        self.bodies
    }

    pub fn walls(&self) -> &'a [Wall] {
        self.walls
    }

    pub fn cell_of(&self, point: Vec2) -> Option<usize> {
        self.index.cell_of(point)
    }

    fn candidates(&self, area: &Aabb) -> Vec<usize> {
        let mut out = Vec::new();
        self.index.query(area, &mut out);
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Every collider overlapping body `target` this tick.
    ///
    /// Body contacts come first in index order. At most one wall contact is
    /// reported: the one met earliest along the movement segment.
    pub fn check(&self, target: usize) -> Vec<Contact> {
        let body = &self.bodies[target];
        let n = self.bodies.len();
        let mut contacts = Vec::new();
        let mut nearest_wall: Option<(usize, f64, Vec2)> = None;

        for id in self.candidates(&body.swept_aabb()) {
            if id < n {
                if id == target {
                    continue;
                }
                let other = &self.bodies[id];
                if body.overlaps(other) {
                    contacts.push(Contact::Body {
                        index: id,
                        kind: other.kind,
                    });
                }
                continue;
            }

            let wall_idx = id - n;
            let wall = &self.walls[wall_idx];
            let crossing = segment_intersect(body.old_position, body.position, wall.p1, wall.p2)
                .map(|hit| (hit.t, hit.point));
            let resting = || {
                segment_circle_intersect(wall.p1, wall.p2, body.position, body.radius)
                    .map(|hit| (1.0, hit.point))
            };
            if let Some((t, point)) = crossing.or_else(resting) {
                let closer = nearest_wall.map_or(true, |(_, best_t, _)| t < best_t);
                if closer {
                    nearest_wall = Some((wall_idx, t, point));
                }
            }
        }

        if let Some((index, t, point)) = nearest_wall {
            contacts.push(Contact::Wall { index, t, point });
        }
        contacts
    }

    /// Nearest collider along `origin → end`, skipping body `exclude`.
    ///
    /// Ties on `t` go to the lower collider id (bodies before walls).
    pub fn raycast(&self, origin: Vec2, end: Vec2, exclude: Option<usize>) -> Option<RayHit> {
        let n = self.bodies.len();
        let mut best: Option<RayHit> = None;

        for id in self.candidates(&Aabb::from_segment(origin, end)) {
            let hit = if id < n {
                if Some(id) == exclude {
                    continue;
                }
                let body = &self.bodies[id];
                segment_circle_intersect(origin, end, body.position, body.radius).map(|h| RayHit {
                    collider: Collider::Body(id),
                    kind: body.kind,
                    t: h.t,
                    point: h.point,
                })
            } else {
                let wall = &self.walls[id - n];
                segment_intersect(origin, end, wall.p1, wall.p2).map(|h| RayHit {
                    collider: Collider::Wall(id - n),
                    kind: EntityKind::Wall,
                    t: h.t,
                    point: h.point,
                })
            };
            if let Some(hit) = hit {
                if best.map_or(true, |b| hit.t < b.t) {
                    best = Some(hit);
                }
            }
        }
        best
    }
}
