//! Plain data shared by the simulation crates: vectors, walls, bounding
//! boxes and the entities that live in the arena.

pub mod data;

pub use data::entity::{Collider, Entity, EntityKind, NUM_ENTITY_KINDS};
pub use data::geometry::{Aabb, Vec2, Wall};
