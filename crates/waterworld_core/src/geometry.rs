//! Intersection kernel shared by the broad-phase, the sensors and the
//! collision resolver.
//!
//! All tests use open intervals: touching an endpoint exactly is not a hit.
//! Parallel segments (`denom == 0`) never intersect.

use waterworld_data::Vec2;

/// Result of an intersection query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Parameter along the first segment, in `(0, 1)`.
    pub t: f64,
    /// World-space intersection point.
    pub point: Vec2,
}

/// Intersection of segment `p1 → p2` with segment `p3 → p4`.
///
/// Uses the parametric determinant form. `t` is measured along `p1 → p2`.
///
/// # Examples
/// ```
/// use waterworld_core::geometry::segment_intersect;
/// use waterworld_data::Vec2;
///
/// let hit = segment_intersect(
///     Vec2::new(0.0, 0.0),
///     Vec2::new(10.0, 0.0),
///     Vec2::new(5.0, -5.0),
///     Vec2::new(5.0, 5.0),
/// )
/// .unwrap();
/// assert!((hit.t - 0.5).abs() < 1e-12);
/// ```
pub fn segment_intersect(p1: Vec2, p2: Vec2, p3: Vec2, p4: Vec2) -> Option<Hit> {
    let denom = (p4.y - p3.y) * (p2.x - p1.x) - (p4.x - p3.x) * (p2.y - p1.y);
    if denom == 0.0 {
        return None;
    }
    let ua = ((p4.x - p3.x) * (p1.y - p3.y) - (p4.y - p3.y) * (p1.x - p3.x)) / denom;
    let ub = ((p2.x - p1.x) * (p1.y - p3.y) - (p2.y - p1.y) * (p1.x - p3.x)) / denom;
    if ua > 0.0 && ua < 1.0 && ub > 0.0 && ub < 1.0 {
        let point = p1 + (p2 - p1) * ua;
        Some(Hit { t: ua, point })
    } else {
        None
    }
}

/// Intersection of segment `p1 → p2` with the circle at `center`.
///
/// Projects `center` onto the segment's supporting line. Reports the foot
/// of the perpendicular when it lies strictly inside the segment and the
/// perpendicular distance is within `radius`.
pub fn segment_circle_intersect(p1: Vec2, p2: Vec2, center: Vec2, radius: f64) -> Option<Hit> {
    let dir = p2 - p1;
    let len_sq = dir.length_squared();
    if len_sq == 0.0 {
        return None;
    }
    let t = (center - p1).dot(dir) / len_sq;
    let foot = p1 + dir * t;
    if foot.dist_from(center) > radius {
        return None;
    }
    if t > 0.0 && t < 1.0 {
        Some(Hit { t, point: foot })
    } else {
        None
    }
}

/// Shortest distance from `point` to the closed segment `p1 → p2`.
pub fn point_segment_distance(p1: Vec2, p2: Vec2, point: Vec2) -> f64 {
    let dir = p2 - p1;
    let len_sq = dir.length_squared();
    if len_sq == 0.0 {
        return point.dist_from(p1);
    }
    let t = ((point - p1).dot(dir) / len_sq).clamp(0.0, 1.0);
    point.dist_from(p1 + dir * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f64, y: f64) -> Vec2 {
        Vec2::new(x, y)
    }

    #[test]
    fn test_crossing_segments() {
        let hit = segment_intersect(v(0.0, 0.0), v(4.0, 4.0), v(0.0, 4.0), v(4.0, 0.0)).unwrap();
        assert!((hit.t - 0.5).abs() < 1e-12);
        assert!((hit.point.x - 2.0).abs() < 1e-12);
        assert!((hit.point.y - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_parallel_segments_never_hit() {
        assert!(segment_intersect(v(0.0, 0.0), v(4.0, 0.0), v(0.0, 1.0), v(4.0, 1.0)).is_none());
        // Collinear overlap is also degenerate.
        assert!(segment_intersect(v(0.0, 0.0), v(4.0, 0.0), v(1.0, 0.0), v(3.0, 0.0)).is_none());
    }

    #[test]
    fn test_endpoint_touch_is_not_a_hit() {
        assert!(segment_intersect(v(0.0, 0.0), v(2.0, 0.0), v(2.0, -1.0), v(2.0, 1.0)).is_none());
    }

    #[test]
    fn test_short_segment_misses() {
        assert!(segment_intersect(v(0.0, 0.0), v(1.0, 0.0), v(5.0, -1.0), v(5.0, 1.0)).is_none());
    }

    #[test]
    fn test_segment_circle_hit_reports_foot() {
        let hit = segment_circle_intersect(v(0.0, 0.0), v(10.0, 0.0), v(3.0, 1.0), 2.0).unwrap();
        assert!((hit.t - 0.3).abs() < 1e-12);
        assert_eq!(hit.point, v(3.0, 0.0));
    }

    #[test]
    fn test_segment_circle_out_of_range() {
        assert!(segment_circle_intersect(v(0.0, 0.0), v(10.0, 0.0), v(3.0, 3.0), 2.0).is_none());
        // Foot beyond the segment end.
        assert!(segment_circle_intersect(v(0.0, 0.0), v(10.0, 0.0), v(11.0, 0.5), 2.0).is_none());
        // Zero-length segment.
        assert!(segment_circle_intersect(v(1.0, 1.0), v(1.0, 1.0), v(1.0, 1.0), 2.0).is_none());
    }

    #[test]
    fn test_point_segment_distance_clamps() {
        assert_eq!(point_segment_distance(v(0.0, 0.0), v(10.0, 0.0), v(5.0, 3.0)), 3.0);
        assert_eq!(point_segment_distance(v(0.0, 0.0), v(10.0, 0.0), v(13.0, 4.0)), 5.0);
    }
}
