use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::utils::math::normalize_angle;

/// Common math types re-exported for convenience.
pub use glam::Mat2;

/// Planar rotation stored as cached sine/cosine of the angle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Rot {
    pub s: f32,
    pub c: f32,
}

impl Default for Rot {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Rot {
    pub const IDENTITY: Self = Self { s: 0.0, c: 1.0 };

    pub fn from_angle(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Self { s, c }
    }

    pub fn angle(&self) -> f32 {
        self.s.atan2(self.c)
    }

    pub fn x_axis(&self) -> Vec2 {
        Vec2::new(self.c, self.s)
    }

    pub fn y_axis(&self) -> Vec2 {
        Vec2::new(-self.s, self.c)
    }

    /// Rotates a vector.
    pub fn rotate(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x - self.s * v.y, self.s * v.x + self.c * v.y)
    }

    /// Inverse-rotates a vector.
    pub fn inv_rotate(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }

    /// Composition `self * other`.
    pub fn mul(&self, other: Rot) -> Rot {
        Rot {
            s: self.s * other.c + self.c * other.s,
            c: self.c * other.c - self.s * other.s,
        }
    }

    /// Composition `self^T * other`.
    pub fn inv_mul(&self, other: Rot) -> Rot {
        Rot {
            s: self.c * other.s - self.s * other.c,
            c: self.c * other.c + self.s * other.s,
        }
    }
}

/// Position and orientation of a body frame.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Transform {
    pub p: Vec2,
    pub q: Rot,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        p: Vec2::ZERO,
        q: Rot::IDENTITY,
    };

    pub fn new(position: Vec2, angle: f32) -> Self {
        Self {
            p: position,
            q: Rot::from_angle(angle),
        }
    }

    /// Maps a point from the local frame to world space.
    pub fn transform_point(&self, local: Vec2) -> Vec2 {
        self.q.rotate(local) + self.p
    }

    /// Maps a world point into the local frame.
    pub fn inv_transform_point(&self, world: Vec2) -> Vec2 {
        self.q.inv_rotate(world - self.p)
    }

    /// Composition `self^-1 * other`, mapping other's local frame into this
    /// transform's local frame.
    pub fn inv_mul(&self, other: Transform) -> Transform {
        Transform {
            q: self.q.inv_mul(other.q),
            p: self.q.inv_rotate(other.p - self.p),
        }
    }
}

/// Motion of a body's center of mass over one step: state at the step start
/// time `alpha0` and at the step end, interpolated linearly in between.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Sweep {
    /// Center of mass in the body's local frame.
    pub local_center: Vec2,
    /// World center of mass at `alpha0`.
    pub c0: Vec2,
    /// World center of mass at the step end.
    pub c: Vec2,
    /// Angle at `alpha0`.
    pub a0: f32,
    /// Angle at the step end.
    pub a: f32,
    /// Fraction of the current step already consumed, in [0, 1).
    pub alpha0: f32,
}

impl Sweep {
    /// Interpolated body-origin transform at `beta` within [alpha0, 1].
    pub fn transform(&self, beta: f32) -> Transform {
        let t = (beta - self.alpha0) / (1.0 - self.alpha0);
        let c = self.c0.lerp(self.c, t);
        let a = self.a0 + (self.a - self.a0) * t;
        let q = Rot::from_angle(a);
        Transform {
            p: c - q.rotate(self.local_center),
            q,
        }
    }

    /// Advances the sweep start to `alpha`, keeping the end state.
    pub fn advance(&mut self, alpha: f32) {
        debug_assert!(alpha < 1.0);
        let t = (alpha - self.alpha0) / (1.0 - self.alpha0);
        self.c0 = self.c0.lerp(self.c, t);
        self.a0 += (self.a - self.a0) * t;
        self.alpha0 = alpha;
    }

    /// Wraps the sweep angles into [-pi, pi] to keep the TOI root finder
    /// numerically stable; only the relative angle matters.
    pub fn normalize(&mut self) {
        let delta = self.a0 - normalize_angle(self.a0);
        self.a0 -= delta;
        self.a -= delta;
    }
}

/// Linear and angular velocity of a rigid body.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub linear: Vec2,
    pub angular: f32,
}

/// Positional state (center of mass + angle) used by the island solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct Position {
    pub c: Vec2,
    pub a: f32,
}

/// Mass, center of mass and rotational inertia about the origin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MassData {
    pub mass: f32,
    pub center: Vec2,
    /// Rotational inertia about the shape's local origin.
    pub inertia: f32,
}

impl Default for MassData {
    fn default() -> Self {
        Self {
            mass: 0.0,
            center: Vec2::ZERO,
            inertia: 0.0,
        }
    }
}

/// Geometric mean of the two friction coefficients.
pub fn mix_friction(friction_a: f32, friction_b: f32) -> f32 {
    (friction_a * friction_b).sqrt()
}

/// The bouncier surface wins.
pub fn mix_restitution(restitution_a: f32, restitution_b: f32) -> f32 {
    restitution_a.max(restitution_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn transform_round_trips_points() {
        let xf = Transform::new(Vec2::new(3.0, -2.0), 0.7);
        let p = Vec2::new(-1.5, 4.0);
        let back = xf.inv_transform_point(xf.transform_point(p));
        assert_relative_eq!(back.x, p.x, epsilon = 1e-5);
        assert_relative_eq!(back.y, p.y, epsilon = 1e-5);
    }

    #[test]
    fn sweep_advance_preserves_interpolation() {
        let mut sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: Vec2::ZERO,
            c: Vec2::new(10.0, 0.0),
            a0: 0.0,
            a: 1.0,
            alpha0: 0.0,
        };
        let mid = sweep.transform(0.5);
        sweep.advance(0.5);
        assert_relative_eq!(sweep.alpha0, 0.5);
        let mid_after = sweep.transform(0.5);
        assert_relative_eq!(mid.p.x, mid_after.p.x, epsilon = 1e-5);
        assert_relative_eq!(mid.q.angle(), mid_after.q.angle(), epsilon = 1e-5);
    }

    #[test]
    fn mixing_matches_reference_rules() {
        assert_relative_eq!(mix_friction(0.4, 0.9), (0.4f32 * 0.9).sqrt());
        assert_relative_eq!(mix_restitution(0.2, 0.7), 0.7);
    }
}
