use super::geometry::{Aabb, Vec2};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Semantic type of anything an eye can see or a body can hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Wall,
    Food,
    Poison,
    Agent,
}

pub const NUM_ENTITY_KINDS: usize = 4;

impl EntityKind {
    pub const ALL: [EntityKind; NUM_ENTITY_KINDS] = [
        EntityKind::Wall,
        EntityKind::Food,
        EntityKind::Poison,
        EntityKind::Agent,
    ];

    /// Stable index used for one-hot sensor encoding.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            EntityKind::Wall => 0,
            EntityKind::Food => 1,
            EntityKind::Poison => 2,
            EntityKind::Agent => 3,
        }
    }

    pub fn is_item(self) -> bool {
        matches!(self, EntityKind::Food | EntityKind::Poison)
    }
}

/// Reference to something a body collided with this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Collider {
    /// Index into the body list the broad-phase was built from.
    Body(usize),
    /// Index into the wall list.
    Wall(usize),
}

/// A circular body in the arena: an agent or a consumable item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    pub kind: EntityKind,
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f64,
    /// Position before the last integration step.
    pub old_position: Vec2,
    /// Grid cell the body was bucketed into on the last rebuild.
    pub grid_cell: Option<usize>,
    /// Ticks since spawn.
    pub age: u64,
    /// Contacts recorded during the current tick; cleared on rebuild.
    #[serde(skip)]
    pub collisions: Vec<Collider>,
}

impl Entity {
    pub fn new(kind: EntityKind, position: Vec2, radius: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            position,
            velocity: Vec2::ZERO,
            radius,
            old_position: position,
            grid_cell: None,
            age: 0,
            collisions: Vec::new(),
        }
    }

    /// Same as [`Entity::new`] but with a caller-supplied id, used when the
    /// world must stay reproducible under a fixed seed.
    pub fn with_id(id: Uuid, kind: EntityKind, position: Vec2, radius: f64) -> Self {
        Self {
            id,
            ..Self::new(kind, position, radius)
        }
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }

    /// Bounding box of the body at its current position.
    pub fn aabb(&self) -> Aabb {
        Aabb::from_circle(self.position, self.radius)
    }

    /// Bounding box swept from `old_position` to `position`.
    pub fn swept_aabb(&self) -> Aabb {
        Aabb::from_circle(self.old_position, self.radius).union(&self.aabb())
    }

    /// Moves the body by its velocity, remembering where it came from.
    pub fn integrate(&mut self) {
        self.old_position = self.position;
        self.position = self.position + self.velocity;
    }

    pub fn overlaps(&self, other: &Entity) -> bool {
        let r = self.radius + other.radius;
        self.position.sub(other.position).length_squared() < r * r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_indices_are_dense() {
        for (i, kind) in EntityKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn test_integrate_tracks_old_position() {
        let mut e = Entity::new(EntityKind::Agent, Vec2::new(1.0, 1.0), 2.0)
            .with_velocity(Vec2::new(0.5, -0.5));
        e.integrate();
        assert_eq!(e.old_position, Vec2::new(1.0, 1.0));
        assert_eq!(e.position, Vec2::new(1.5, 0.5));
        let swept = e.swept_aabb();
        assert_eq!(swept.min, Vec2::new(-1.0, -1.5));
        assert_eq!(swept.max, Vec2::new(3.5, 3.0));
    }

    #[test]
    fn test_overlap_is_strict() {
        let a = Entity::new(EntityKind::Food, Vec2::new(0.0, 0.0), 1.0);
        let b = Entity::new(EntityKind::Food, Vec2::new(2.0, 0.0), 1.0);
        let c = Entity::new(EntityKind::Food, Vec2::new(1.5, 0.0), 1.0);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
    }
}
