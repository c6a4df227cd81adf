use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::types::{MassData, Rot, Sweep, Transform, Velocity};
use crate::utils::{allocator::EntityId, math::cross};

/// Simulation role of a body.
///
/// Static bodies never move and carry zero inverse mass; kinematic bodies
/// move under user-set velocity but ignore forces; dynamic bodies respond to
/// forces, impulses and contacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BodyType {
    #[default]
    Static,
    Kinematic,
    Dynamic,
}

impl BodyType {
    /// Whether bodies of this type can have non-zero velocity.
    pub fn is_speedable(self) -> bool {
        !matches!(self, BodyType::Static)
    }

    /// Whether bodies of this type respond to forces.
    pub fn is_accelerable(self) -> bool {
        matches!(self, BodyType::Dynamic)
    }
}

/// Edge of the body-contact graph stored on each incident body.
#[derive(Debug, Clone, Copy)]
pub struct ContactEdge {
    pub other: EntityId,
    pub contact: EntityId,
}

/// Edge of the body-joint graph stored on each incident body.
#[derive(Debug, Clone, Copy)]
pub struct JointEdge {
    pub other: EntityId,
    pub joint: EntityId,
}

/// Rigid body state: transform, swept motion, velocity, mass and flags.
#[derive(Debug, Clone)]
pub struct RigidBody {
    body_type: BodyType,
    pub(crate) transform: Transform,
    pub(crate) sweep: Sweep,
    pub(crate) velocity: Velocity,
    /// Force input expressed as accelerations; cleared by the world when
    /// auto-clearing is enabled.
    pub(crate) linear_acceleration: Vec2,
    pub(crate) angular_acceleration: f32,
    pub(crate) inv_mass: f32,
    pub(crate) inv_inertia: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub gravity_scale: f32,
    awake: bool,
    enabled: bool,
    bullet: bool,
    fixed_rotation: bool,
    pub auto_sleep: bool,
    /// Seconds this body has stayed under the sleep velocity tolerances.
    pub(crate) under_active_time: f32,
    pub(crate) fixtures: Vec<EntityId>,
    pub(crate) contact_edges: Vec<ContactEdge>,
    pub(crate) joint_edges: Vec<JointEdge>,
    /// Island-local constraint index, valid only while an island holds this
    /// body during one step.
    pub(crate) island_index: Option<usize>,
}

impl Default for RigidBody {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            transform: Transform::IDENTITY,
            sweep: Sweep::default(),
            velocity: Velocity::default(),
            linear_acceleration: Vec2::ZERO,
            angular_acceleration: 0.0,
            inv_mass: 0.0,
            inv_inertia: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            gravity_scale: 1.0,
            awake: false,
            enabled: true,
            bullet: false,
            fixed_rotation: false,
            auto_sleep: true,
            under_active_time: 0.0,
            fixtures: Vec::new(),
            contact_edges: Vec::new(),
            joint_edges: Vec::new(),
            island_index: None,
        }
    }
}

impl RigidBody {
    pub fn new(body_type: BodyType) -> Self {
        let mut body = Self {
            body_type,
            ..Self::default()
        };
        if body_type == BodyType::Dynamic {
            body.inv_mass = 1.0;
        }
        body.awake = body_type.is_speedable();
        body
    }

    pub fn builder() -> RigidBodyBuilder {
        RigidBodyBuilder::new()
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn position(&self) -> Vec2 {
        self.transform.p
    }

    pub fn angle(&self) -> f32 {
        self.sweep.a
    }

    pub fn world_center(&self) -> Vec2 {
        self.sweep.c
    }

    pub fn local_center(&self) -> Vec2 {
        self.sweep.local_center
    }

    pub fn velocity(&self) -> Velocity {
        self.velocity
    }

    pub fn linear_velocity(&self) -> Vec2 {
        self.velocity.linear
    }

    pub fn angular_velocity(&self) -> f32 {
        self.velocity.angular
    }

    pub fn inv_mass(&self) -> f32 {
        self.inv_mass
    }

    pub fn inv_inertia(&self) -> f32 {
        self.inv_inertia
    }

    pub fn mass(&self) -> f32 {
        if self.inv_mass > 0.0 {
            1.0 / self.inv_mass
        } else {
            0.0
        }
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_bullet(&self) -> bool {
        self.bullet
    }

    pub fn is_fixed_rotation(&self) -> bool {
        self.fixed_rotation
    }

    pub fn under_active_time(&self) -> f32 {
        self.under_active_time
    }

    pub fn fixtures(&self) -> &[EntityId] {
        &self.fixtures
    }

    pub fn contact_edges(&self) -> &[ContactEdge] {
        &self.contact_edges
    }

    pub fn joint_edges(&self) -> &[JointEdge] {
        &self.joint_edges
    }

    pub fn set_bullet(&mut self, bullet: bool) {
        self.bullet = bullet;
    }

    pub(crate) fn set_enabled_flag(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Wakes the body (speedable types only) or puts it to sleep, zeroing its
    /// velocity and pending accelerations.
    pub fn set_awake(&mut self, awake: bool) {
        if awake {
            if self.body_type.is_speedable() && !self.awake {
                self.awake = true;
                self.under_active_time = 0.0;
            }
        } else {
            self.awake = false;
            self.under_active_time = 0.0;
            self.velocity = Velocity::default();
            self.linear_acceleration = Vec2::ZERO;
            self.angular_acceleration = 0.0;
        }
    }

    pub fn set_linear_velocity(&mut self, velocity: Vec2) {
        if !self.body_type.is_speedable() {
            return;
        }
        if velocity != Vec2::ZERO {
            self.set_awake(true);
        }
        self.velocity.linear = velocity;
    }

    pub fn set_angular_velocity(&mut self, omega: f32) {
        if !self.body_type.is_speedable() {
            return;
        }
        if omega != 0.0 {
            self.set_awake(true);
        }
        self.velocity.angular = omega;
    }

    /// Applies a force at a world point, waking the body.
    pub fn apply_force(&mut self, force: Vec2, point: Vec2) {
        if !self.body_type.is_accelerable() {
            return;
        }
        self.set_awake(true);
        self.linear_acceleration += force * self.inv_mass;
        self.angular_acceleration += self.inv_inertia * cross(point - self.sweep.c, force);
    }

    pub fn apply_force_to_center(&mut self, force: Vec2) {
        if !self.body_type.is_accelerable() {
            return;
        }
        self.set_awake(true);
        self.linear_acceleration += force * self.inv_mass;
    }

    pub fn apply_torque(&mut self, torque: f32) {
        if !self.body_type.is_accelerable() {
            return;
        }
        self.set_awake(true);
        self.angular_acceleration += self.inv_inertia * torque;
    }

    /// Applies an impulse at a world point, changing velocity immediately.
    pub fn apply_linear_impulse(&mut self, impulse: Vec2, point: Vec2) {
        if !self.body_type.is_accelerable() {
            return;
        }
        self.set_awake(true);
        self.velocity.linear += impulse * self.inv_mass;
        self.velocity.angular += self.inv_inertia * cross(point - self.sweep.c, impulse);
    }

    pub fn apply_angular_impulse(&mut self, impulse: f32) {
        if !self.body_type.is_accelerable() {
            return;
        }
        self.set_awake(true);
        self.velocity.angular += self.inv_inertia * impulse;
    }

    pub fn clear_forces(&mut self) {
        self.linear_acceleration = Vec2::ZERO;
        self.angular_acceleration = 0.0;
    }

    /// Installs mass properties computed from the body's fixtures. Static and
    /// kinematic bodies keep zero inverse mass; fixed-rotation bodies keep
    /// zero inverse inertia.
    pub(crate) fn set_mass_data(&mut self, data: &MassData) {
        if !self.body_type.is_accelerable() {
            self.inv_mass = 0.0;
            self.inv_inertia = 0.0;
            self.sweep.local_center = Vec2::ZERO;
            let center = self.transform.p;
            self.sweep.c0 = center;
            self.sweep.c = center;
            return;
        }

        let mass = if data.mass > 0.0 { data.mass } else { 1.0 };
        self.inv_mass = 1.0 / mass;

        if data.inertia > 0.0 && !self.fixed_rotation {
            let center_inertia = data.inertia - mass * data.center.length_squared();
            debug_assert!(center_inertia > 0.0);
            self.inv_inertia = 1.0 / center_inertia;
        } else {
            self.inv_inertia = 0.0;
        }

        let old_center = self.sweep.c;
        self.sweep.local_center = data.center;
        let new_center = self.transform.transform_point(data.center);
        self.sweep.c0 = new_center;
        self.sweep.c = new_center;

        // The center moved; update velocity so the motion of the new center
        // is consistent.
        self.velocity.linear += cross_scalar(self.velocity.angular, new_center - old_center);
    }

    /// Writes a new transform and resets the sweep to it.
    pub(crate) fn set_transform_internal(&mut self, position: Vec2, angle: f32) {
        self.transform = Transform::new(position, angle);
        let center = self.transform.transform_point(self.sweep.local_center);
        self.sweep.c0 = center;
        self.sweep.c = center;
        self.sweep.a0 = angle;
        self.sweep.a = angle;
        self.sweep.alpha0 = 0.0;
    }

    /// Rebuilds the transform from the sweep's end state.
    pub(crate) fn synchronize_transform(&mut self) {
        self.transform.q = Rot::from_angle(self.sweep.a);
        self.transform.p = self.sweep.c - self.transform.q.rotate(self.sweep.local_center);
    }

    /// Advances the sweep to `alpha` and snaps the transform there; used by
    /// the TOI sub-step loop.
    pub(crate) fn advance_to(&mut self, alpha: f32) {
        self.sweep.advance(alpha);
        self.sweep.c = self.sweep.c0;
        self.sweep.a = self.sweep.a0;
        self.synchronize_transform();
    }

}

fn cross_scalar(s: f32, v: Vec2) -> Vec2 {
    Vec2::new(-s * v.y, s * v.x)
}

/// Fluent construction of a [`RigidBody`].
pub struct RigidBodyBuilder {
    body: RigidBody,
}

impl Default for RigidBodyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RigidBodyBuilder {
    pub fn new() -> Self {
        Self {
            body: RigidBody::new(BodyType::Static),
        }
    }

    pub fn body_type(mut self, body_type: BodyType) -> Self {
        let position = self.body.transform.p;
        let angle = self.body.sweep.a;
        self.body = RigidBody::new(body_type);
        self.body.set_transform_internal(position, angle);
        self
    }

    pub fn position(mut self, position: Vec2) -> Self {
        let angle = self.body.sweep.a;
        self.body.set_transform_internal(position, angle);
        self
    }

    pub fn angle(mut self, angle: f32) -> Self {
        let position = self.body.transform.p;
        self.body.set_transform_internal(position, angle);
        self
    }

    pub fn linear_velocity(mut self, velocity: Vec2) -> Self {
        self.body.set_linear_velocity(velocity);
        self
    }

    pub fn angular_velocity(mut self, omega: f32) -> Self {
        self.body.set_angular_velocity(omega);
        self
    }

    pub fn bullet(mut self, bullet: bool) -> Self {
        self.body.bullet = bullet;
        self
    }

    pub fn fixed_rotation(mut self, fixed: bool) -> Self {
        self.body.fixed_rotation = fixed;
        self
    }

    pub fn gravity_scale(mut self, scale: f32) -> Self {
        self.body.gravity_scale = scale;
        self
    }

    pub fn linear_damping(mut self, damping: f32) -> Self {
        self.body.linear_damping = damping;
        self
    }

    pub fn angular_damping(mut self, damping: f32) -> Self {
        self.body.angular_damping = damping;
        self
    }

    pub fn auto_sleep(mut self, allowed: bool) -> Self {
        self.body.auto_sleep = allowed;
        self
    }

    pub fn build(self) -> RigidBody {
        self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_bodies_ignore_forces_and_velocity() {
        let mut body = RigidBody::new(BodyType::Static);
        body.apply_force_to_center(Vec2::new(10.0, 0.0));
        body.set_linear_velocity(Vec2::new(5.0, 0.0));
        assert_eq!(body.linear_velocity(), Vec2::ZERO);
        assert_eq!(body.inv_mass(), 0.0);
        assert!(!body.is_awake());
    }

    #[test]
    fn sleeping_zeroes_velocity() {
        let mut body = RigidBody::builder()
            .body_type(BodyType::Dynamic)
            .linear_velocity(Vec2::new(1.0, 2.0))
            .build();
        assert!(body.is_awake());
        body.set_awake(false);
        assert_eq!(body.linear_velocity(), Vec2::ZERO);
        assert_eq!(body.angular_velocity(), 0.0);
    }

    #[test]
    fn mass_data_moves_sweep_center() {
        let mut body = RigidBody::builder()
            .body_type(BodyType::Dynamic)
            .position(Vec2::new(2.0, 0.0))
            .build();
        body.set_mass_data(&MassData {
            mass: 4.0,
            center: Vec2::new(0.5, 0.0),
            inertia: 4.0 * (0.5 + 0.25),
        });
        assert_eq!(body.world_center(), Vec2::new(2.5, 0.0));
        assert!((body.inv_mass() - 0.25).abs() < 1e-6);
        assert!(body.inv_inertia() > 0.0);
    }
}
