use super::SpatialIndex;
use waterworld_data::Aabb;

/// O(n) candidate scan: every collider is returned for every query.
#[derive(Debug, Default, Clone)]
pub struct BruteForce {
    count: usize,
}

impl BruteForce {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SpatialIndex for BruteForce {
    fn name(&self) -> &'static str {
        "brute_force"
    }

    fn rebuild(&mut self, bodies: &[Aabb], walls: &[Aabb]) {
        self.count = bodies.len() + walls.len();
    }

    fn query(&self, _area: &Aabb, out: &mut Vec<usize>) {
        out.extend(0..self.count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waterworld_data::Vec2;

    #[test]
    fn test_brute_force_returns_everything() {
        let mut index = BruteForce::new();
        let b = Aabb::from_circle(Vec2::new(1.0, 1.0), 1.0);
        index.rebuild(&[b, b], &[b]);
        let mut out = Vec::new();
        index.query(&Aabb::from_circle(Vec2::new(500.0, 500.0), 1.0), &mut out);
        assert_eq!(out, vec![0, 1, 2]);
    }
}
