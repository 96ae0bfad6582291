//! Collision response for circle-circle and circle-wall contacts.
//!
//! The resolver only computes new kinematic state; callers decide whether to
//! apply it (an agent meeting an item eats it instead of bouncing).

use waterworld_data::{Entity, EntityKind, Vec2, Wall};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleResponse {
    /// Radius-weighted point between the two centres.
    pub point: Vec2,
    pub velocity_a: Vec2,
    pub velocity_b: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallResponse {
    pub position: Vec2,
    pub velocity: Vec2,
}

/// Mass approximation: radius, doubled for agents.
#[inline]
pub fn mass_of(entity: &Entity) -> f64 {
    match entity.kind {
        EntityKind::Agent => entity.radius * 2.0,
        _ => entity.radius,
    }
}

/// Elastic response between two bodies.
///
/// Returns `None` unless the bodies are moving towards each other along the
/// line joining their centres, or when the centres coincide.
pub fn circle_collision(a: &Entity, b: &Entity) -> Option<CircleResponse> {
    let normal = (b.position - a.position).normalize()?;
    let closing = (a.velocity - b.velocity).dot(normal);
    if closing <= 0.0 {
        return None;
    }

    let (ma, mb) = (mass_of(a), mass_of(b));
    let total = ma + mb;
    if total <= 0.0 {
        return None;
    }

    let velocity_a = a.velocity - normal * (2.0 * mb / total * closing);
    let velocity_b = b.velocity + normal * (2.0 * ma / total * closing);

    let radii = a.radius + b.radius;
    let point = if radii > 0.0 {
        (a.position * b.radius + b.position * a.radius) * (1.0 / radii)
    } else {
        (a.position + b.position) * 0.5
    };

    Some(CircleResponse {
        point,
        velocity_a,
        velocity_b,
    })
}

/// Puts `entity` back where it was before the last step and reflects its
/// velocity about the wall normal.
pub fn wall_bounce(entity: &Entity, wall: &Wall) -> WallResponse {
    let velocity = match wall.normal() {
        Some(n) => entity.velocity - n * (2.0 * entity.velocity.dot(n)),
        None => -entity.velocity,
    };
    WallResponse {
        position: entity.old_position,
        velocity,
    }
}
