//! Ray-cast eyes.
//!
//! Each eye casts one segment from its owner's centre and records the
//! nearest collider it meets. Encoding turns a fan of eyes into the flat
//! feature vector the agents consume.

use crate::broadphase::Population;
use serde::{Deserialize, Serialize};
use waterworld_data::{Collider, EntityKind, Vec2};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Eye {
    /// Offset from the owner's heading, in radians.
    pub angle: f64,
    pub max_range: f64,
    pub sensed_kind: Option<EntityKind>,
    pub sensed_proximity: f64,
    pub sensed_velocity: Vec2,
}

impl Eye {
    pub fn new(angle: f64, max_range: f64) -> Self {
        Self {
            angle,
            max_range,
            sensed_kind: None,
            sensed_proximity: max_range,
            sensed_velocity: Vec2::ZERO,
        }
    }

    /// `num_eyes` eyes spread evenly across `fov` radians, centred on the
    /// heading. A single eye looks straight ahead.
    pub fn fan(num_eyes: usize, fov: f64, max_range: f64) -> Vec<Eye> {
        match num_eyes {
            0 => Vec::new(),
            1 => vec![Eye::new(0.0, max_range)],
            n => {
                let step = fov / (n - 1) as f64;
                (0..n)
                    .map(|i| Eye::new(-fov / 2.0 + step * i as f64, max_range))
                    .collect()
            }
        }
    }

    pub fn reset(&mut self) {
        self.sensed_kind = None;
        self.sensed_proximity = self.max_range;
        self.sensed_velocity = Vec2::ZERO;
    }

    /// Casts this eye from body `owner` and stores what it sees.
    pub fn sense(&mut self, population: &Population<'_>, owner: usize, heading: f64) {
        self.reset();
        let origin = population.bodies()[owner].position;
        let end = origin + Vec2::from_angle(heading + self.angle) * self.max_range;
        if let Some(hit) = population.raycast(origin, end, Some(owner)) {
            self.sensed_kind = Some(hit.kind);
            self.sensed_proximity = hit.t * self.max_range;
            if let Collider::Body(idx) = hit.collider {
                self.sensed_velocity = population.bodies()[idx].velocity;
            }
        }
    }
}

/// One block of `num_types` floats per eye: `1.0` everywhere except the
/// sensed kind's slot, which holds `proximity / max_range`.
pub fn encode_eyes(eyes: &[Eye], num_types: usize) -> Vec<f64> {
    let mut out = vec![1.0; eyes.len() * num_types];
    for (i, eye) in eyes.iter().enumerate() {
        if let Some(kind) = eye.sensed_kind {
            let slot = kind.index();
            if slot < num_types && eye.max_range > 0.0 {
                out[i * num_types + slot] = eye.sensed_proximity / eye.max_range;
            }
        }
    }
    out
}

/// [`encode_eyes`] followed by the owner's velocity scaled by `max_speed`.
pub fn encode_state(eyes: &[Eye], num_types: usize, velocity: Vec2, max_speed: f64) -> Vec<f64> {
    let mut out = encode_eyes(eyes, num_types);
    let scale = if max_speed > 0.0 { 1.0 / max_speed } else { 0.0 };
    out.push(velocity.x * scale);
    out.push(velocity.y * scale);
    out
}

/// Length of the vector produced by [`encode_state`].
pub fn state_len(num_eyes: usize, num_types: usize) -> usize {
    num_eyes * num_types + 2
}
