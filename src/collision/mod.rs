//! Collision detection modules: broad-phase tree, GJK distance, contact
//! manifolds, continuous collision, and world queries.

pub mod broadphase;
pub mod ccd;
pub mod clipping;
pub mod contact;
pub mod manifold;
pub mod narrowphase;
pub mod queries;
pub mod shapes;

pub use broadphase::{BroadPhase, DynamicTree};
pub use ccd::{time_of_impact, ToiConf, ToiOutput, ToiState};
pub use contact::{Contact, ContactKey};
pub use manifold::{ContactFeature, Manifold, ManifoldPoint, ManifoldType, WorldManifold};
pub use narrowphase::{distance, DistanceOutput, SimplexCache};
pub use queries::{test_overlap, RayCastHit};
pub use shapes::{DistanceProxy, Shape};

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb {
    /// The additive identity for [`Aabb::union`].
    pub const EMPTY: Self = Self {
        min: Vec2::splat(f32::INFINITY),
        max: Vec2::splat(f32::NEG_INFINITY),
    };

    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn from_points(a: Vec2, b: Vec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn extents(&self) -> Vec2 {
        (self.max - self.min) * 0.5
    }

    pub fn perimeter(&self) -> f32 {
        let d = self.max - self.min;
        2.0 * (d.x + d.y)
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && other.max.x <= self.max.x
            && other.max.y <= self.max.y
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.min.y <= other.max.y
            && other.min.x <= self.max.x
            && other.min.y <= self.max.y
    }

    /// Grows the box by `amount` on every side.
    pub fn fattened(&self, amount: f32) -> Aabb {
        let r = Vec2::splat(amount);
        Aabb {
            min: self.min - r,
            max: self.max + r,
        }
    }

    pub fn translated(&self, delta: Vec2) -> Aabb {
        Aabb {
            min: self.min + delta,
            max: self.max + delta,
        }
    }
}

/// Input for a ray cast: the ray goes from `p1` towards `p2`, truncated at
/// `max_fraction` of that segment.
#[derive(Debug, Clone, Copy)]
pub struct RayCastInput {
    pub p1: Vec2,
    pub p2: Vec2,
    pub max_fraction: f32,
}

/// A ray-cast hit: the surface normal at the hit point and the fraction of
/// the input segment at which it occurs.
#[derive(Debug, Clone, Copy)]
pub struct RayCastOutput {
    pub normal: Vec2,
    pub fraction: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_and_contains_are_consistent() {
        let a = Aabb::from_points(Vec2::ZERO, Vec2::ONE);
        let b = Aabb::from_points(Vec2::new(2.0, 2.0), Vec2::new(3.0, 3.0));
        let u = a.union(&b);
        assert!(u.contains(&a) && u.contains(&b));
        assert!(!a.overlaps(&b));
        assert!(u.overlaps(&a));
    }

    #[test]
    fn empty_is_union_identity() {
        let a = Aabb::from_points(Vec2::new(-1.0, 2.0), Vec2::new(4.0, 5.0));
        assert_eq!(Aabb::EMPTY.union(&a), a);
    }
}
