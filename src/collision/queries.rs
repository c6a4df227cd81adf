//! World-level query helpers: overlap tests and ray-cast plumbing.

use glam::Vec2;

use crate::{
    collision::{
        narrowphase::{distance, DistanceInput, SimplexCache},
        shapes::Shape,
    },
    core::types::Transform,
    utils::allocator::EntityId,
};

/// Whether two shape children overlap (including their vertex radii).
pub fn test_overlap(
    shape_a: &Shape,
    child_a: u32,
    xf_a: &Transform,
    shape_b: &Shape,
    child_b: u32,
    xf_b: &Transform,
) -> bool {
    let proxy_a = shape_a.distance_proxy(child_a);
    let proxy_b = shape_b.distance_proxy(child_b);
    let mut cache = SimplexCache::default();
    let out = distance(
        &mut cache,
        &DistanceInput {
            proxy_a: &proxy_a,
            xf_a: *xf_a,
            proxy_b: &proxy_b,
            xf_b: *xf_b,
            use_radii: true,
            max_iterations: 20,
        },
    );
    out.distance < 10.0 * f32::EPSILON
}

/// One ray-cast hit delivered to a world ray-cast callback.
///
/// The callback's return value steers the cast: `0.0` stops it, a negative
/// value ignores the hit, and a positive value clips the ray to that
/// fraction (so `hit.fraction` finds the closest hit and `1.0` visits every
/// fixture along the full ray).
#[derive(Debug, Clone, Copy)]
pub struct RayCastHit {
    pub fixture: EntityId,
    pub child: u32,
    pub point: Vec2,
    pub normal: Vec2,
    pub fraction: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_test_respects_radii() {
        let a = Shape::circle(1.0).unwrap();
        let b = Shape::circle(1.0).unwrap();
        assert!(test_overlap(
            &a,
            0,
            &Transform::IDENTITY,
            &b,
            0,
            &Transform::new(Vec2::new(1.9, 0.0), 0.0)
        ));
        assert!(!test_overlap(
            &a,
            0,
            &Transform::IDENTITY,
            &b,
            0,
            &Transform::new(Vec2::new(2.1, 0.0), 0.0)
        ));
    }
}
