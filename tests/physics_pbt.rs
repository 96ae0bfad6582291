use proptest::prelude::*;
use waterworld_core::collision::{circle_collision, mass_of, wall_bounce};
use waterworld_core::geometry::{
    point_segment_distance, segment_circle_intersect, segment_intersect,
};
use waterworld_data::{Entity, EntityKind, Vec2, Wall};

prop_compose! {
    fn arb_point()(x in -100.0f64..100.0, y in -100.0f64..100.0) -> Vec2 {
        Vec2::new(x, y)
    }
}

prop_compose! {
    fn arb_body()(
        position in arb_point(),
        velocity in arb_point(),
        radius in 0.5f64..20.0,
        agent in any::<bool>(),
    ) -> Entity {
        let kind = if agent { EntityKind::Agent } else { EntityKind::Food };
        Entity::new(kind, position, radius).with_velocity(velocity * 0.05)
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn test_segment_intersection_is_symmetric(
        p1 in arb_point(), p2 in arb_point(), p3 in arb_point(), p4 in arb_point()
    ) {
        let ab = segment_intersect(p1, p2, p3, p4);
        let ba = segment_intersect(p3, p4, p1, p2);
        prop_assert_eq!(ab.is_some(), ba.is_some());
        if let (Some(ab), Some(ba)) = (ab, ba) {
            prop_assert!(point_segment_distance(p3, p4, ab.point) < 1e-6);
            prop_assert!(point_segment_distance(p1, p2, ba.point) < 1e-6);
            prop_assert!(ab.t > 0.0 && ab.t < 1.0);
        }
    }

    #[test]
    fn test_segment_circle_hit_lies_within_radius(
        p1 in arb_point(), p2 in arb_point(), center in arb_point(), radius in 0.1f64..50.0
    ) {
        if let Some(hit) = segment_circle_intersect(p1, p2, center, radius) {
            prop_assert!(hit.point.dist_from(center) <= radius + 1e-9);
            prop_assert!(point_segment_distance(p1, p2, center) <= radius + 1e-9);
        }
    }

    #[test]
    fn test_circle_response_conserves_momentum(a in arb_body(), b in arb_body()) {
        let before = a.velocity * mass_of(&a) + b.velocity * mass_of(&b);
        let normal = (b.position - a.position).normalize();
        let approaching = normal.map_or(false, |n| (a.velocity - b.velocity).dot(n) > 0.0);
        match circle_collision(&a, &b) {
            None => prop_assert!(!approaching),
            Some(r) => {
                prop_assert!(approaching);
                let after = r.velocity_a * mass_of(&a) + r.velocity_b * mass_of(&b);
                prop_assert!(after.dist_from(before) < 1e-9 * (1.0 + before.length()));
                // Elastic: the closing speed flips sign.
                let n = normal.unwrap_or(Vec2::ZERO);
                let closing_after = (r.velocity_a - r.velocity_b).dot(n);
                prop_assert!(closing_after <= 1e-9);
            }
        }
    }

    #[test]
    fn test_wall_bounce_keeps_speed(body in arb_body(), p1 in arb_point(), p2 in arb_point()) {
        let response = wall_bounce(&body, &Wall::new(p1, p2));
        prop_assert!((response.velocity.length() - body.velocity.length()).abs() < 1e-9);
        prop_assert_eq!(response.position, body.old_position);
    }
}
