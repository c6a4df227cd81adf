//! Joint constraints satisfying the island solver contract:
//! `init_velocity_constraints` once per island solve, then
//! `solve_velocity_constraints` inside the velocity iteration loop, then
//! `solve_position_constraints` inside the position loop (returning whether
//! the joint's position error is within tolerance).

use glam::{Mat2, Vec2};

use crate::{
    config::StepConf,
    core::types::Rot,
    dynamics::solver::BodyConstraint,
    utils::{
        allocator::EntityId,
        math::{cross, cross_sv},
    },
};

/// Pins a point of one body to a point of another, leaving relative rotation
/// free.
#[derive(Debug, Clone)]
pub struct RevoluteJoint {
    pub body_a: EntityId,
    pub body_b: EntityId,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub collide_connected: bool,
    impulse: Vec2,
    // Per-solve scratch state, valid between init and the last position
    // iteration of one island solve.
    index_a: usize,
    index_b: usize,
    r_a: Vec2,
    r_b: Vec2,
    mass: Mat2,
}

impl RevoluteJoint {
    pub fn new(
        body_a: EntityId,
        local_anchor_a: Vec2,
        body_b: EntityId,
        local_anchor_b: Vec2,
    ) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            collide_connected: false,
            impulse: Vec2::ZERO,
            index_a: 0,
            index_b: 0,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: Mat2::ZERO,
        }
    }

    fn effective_mass(
        r_a: Vec2,
        r_b: Vec2,
        body_a: &BodyConstraint,
        body_b: &BodyConstraint,
    ) -> Mat2 {
        let m_a = body_a.inv_mass;
        let m_b = body_b.inv_mass;
        let i_a = body_a.inv_inertia;
        let i_b = body_b.inv_inertia;

        let k11 = m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y;
        let k12 = -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y;
        let k22 = m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x;
        let k = Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22));
        if k.determinant().abs() > f32::EPSILON {
            k.inverse()
        } else {
            Mat2::ZERO
        }
    }
}

/// Holds two anchor points at a fixed distance.
#[derive(Debug, Clone)]
pub struct DistanceJoint {
    pub body_a: EntityId,
    pub body_b: EntityId,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub length: f32,
    pub collide_connected: bool,
    impulse: f32,
    index_a: usize,
    index_b: usize,
    u: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f32,
}

impl DistanceJoint {
    pub fn new(
        body_a: EntityId,
        local_anchor_a: Vec2,
        body_b: EntityId,
        local_anchor_b: Vec2,
        length: f32,
    ) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            length: length.max(crate::config::LINEAR_SLOP),
            collide_connected: false,
            impulse: 0.0,
            index_a: 0,
            index_b: 0,
            u: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: 0.0,
        }
    }
}

/// Supported joint kinds. Dispatch is a plain match; every variant honors
/// the same three-phase solver contract.
#[derive(Debug, Clone)]
pub enum Joint {
    Revolute(RevoluteJoint),
    Distance(DistanceJoint),
}

impl Joint {
    pub fn body_a(&self) -> EntityId {
        match self {
            Joint::Revolute(joint) => joint.body_a,
            Joint::Distance(joint) => joint.body_a,
        }
    }

    pub fn body_b(&self) -> EntityId {
        match self {
            Joint::Revolute(joint) => joint.body_b,
            Joint::Distance(joint) => joint.body_b,
        }
    }

    /// Whether contacts may be created between the two joined bodies.
    pub fn collide_connected(&self) -> bool {
        match self {
            Joint::Revolute(joint) => joint.collide_connected,
            Joint::Distance(joint) => joint.collide_connected,
        }
    }

    /// Caches island indices and effective masses, and warm-starts from the
    /// accumulated impulse.
    pub fn init_velocity_constraints(
        &mut self,
        bodies: &mut [BodyConstraint],
        island_index_a: usize,
        island_index_b: usize,
        conf: &StepConf,
    ) {
        match self {
            Joint::Revolute(joint) => {
                joint.index_a = island_index_a;
                joint.index_b = island_index_b;
                let body_a = bodies[joint.index_a];
                let body_b = bodies[joint.index_b];
                let q_a = Rot::from_angle(body_a.position.a);
                let q_b = Rot::from_angle(body_b.position.a);
                joint.r_a = q_a.rotate(joint.local_anchor_a - body_a.local_center);
                joint.r_b = q_b.rotate(joint.local_anchor_b - body_b.local_center);
                joint.mass = RevoluteJoint::effective_mass(joint.r_a, joint.r_b, &body_a, &body_b);

                if conf.do_warm_start {
                    let p = joint.impulse;
                    let a = &mut bodies[joint.index_a];
                    a.velocity.linear -= a.inv_mass * p;
                    a.velocity.angular -= a.inv_inertia * cross(joint.r_a, p);
                    let b = &mut bodies[joint.index_b];
                    b.velocity.linear += b.inv_mass * p;
                    b.velocity.angular += b.inv_inertia * cross(joint.r_b, p);
                } else {
                    joint.impulse = Vec2::ZERO;
                }
            }
            Joint::Distance(joint) => {
                joint.index_a = island_index_a;
                joint.index_b = island_index_b;
                let body_a = bodies[joint.index_a];
                let body_b = bodies[joint.index_b];
                let q_a = Rot::from_angle(body_a.position.a);
                let q_b = Rot::from_angle(body_b.position.a);
                joint.r_a = q_a.rotate(joint.local_anchor_a - body_a.local_center);
                joint.r_b = q_b.rotate(joint.local_anchor_b - body_b.local_center);
                joint.u = body_b.position.c + joint.r_b - body_a.position.c - joint.r_a;

                let length = joint.u.length();
                joint.u = if length > crate::config::LINEAR_SLOP {
                    joint.u / length
                } else {
                    Vec2::ZERO
                };

                let cr_a = cross(joint.r_a, joint.u);
                let cr_b = cross(joint.r_b, joint.u);
                let inv_mass = body_a.inv_mass
                    + body_a.inv_inertia * cr_a * cr_a
                    + body_b.inv_mass
                    + body_b.inv_inertia * cr_b * cr_b;
                joint.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

                if conf.do_warm_start {
                    let p = joint.impulse * joint.u;
                    let a = &mut bodies[joint.index_a];
                    a.velocity.linear -= a.inv_mass * p;
                    a.velocity.angular -= a.inv_inertia * cross(joint.r_a, p);
                    let b = &mut bodies[joint.index_b];
                    b.velocity.linear += b.inv_mass * p;
                    b.velocity.angular += b.inv_inertia * cross(joint.r_b, p);
                } else {
                    joint.impulse = 0.0;
                }
            }
        }
    }

    pub fn solve_velocity_constraints(&mut self, bodies: &mut [BodyConstraint]) {
        match self {
            Joint::Revolute(joint) => {
                let body_a = bodies[joint.index_a];
                let body_b = bodies[joint.index_b];
                let c_dot = body_b.velocity.linear + cross_sv(body_b.velocity.angular, joint.r_b)
                    - body_a.velocity.linear
                    - cross_sv(body_a.velocity.angular, joint.r_a);
                let impulse = -(joint.mass * c_dot);
                joint.impulse += impulse;

                let a = &mut bodies[joint.index_a];
                a.velocity.linear -= a.inv_mass * impulse;
                a.velocity.angular -= a.inv_inertia * cross(joint.r_a, impulse);
                let b = &mut bodies[joint.index_b];
                b.velocity.linear += b.inv_mass * impulse;
                b.velocity.angular += b.inv_inertia * cross(joint.r_b, impulse);
            }
            Joint::Distance(joint) => {
                let body_a = bodies[joint.index_a];
                let body_b = bodies[joint.index_b];
                let v_a = body_a.velocity.linear + cross_sv(body_a.velocity.angular, joint.r_a);
                let v_b = body_b.velocity.linear + cross_sv(body_b.velocity.angular, joint.r_b);
                let c_dot = joint.u.dot(v_b - v_a);

                let impulse = -joint.mass * c_dot;
                joint.impulse += impulse;
                let p = impulse * joint.u;

                let a = &mut bodies[joint.index_a];
                a.velocity.linear -= a.inv_mass * p;
                a.velocity.angular -= a.inv_inertia * cross(joint.r_a, p);
                let b = &mut bodies[joint.index_b];
                b.velocity.linear += b.inv_mass * p;
                b.velocity.angular += b.inv_inertia * cross(joint.r_b, p);
            }
        }
    }

    /// Returns true when the joint's position error is within tolerance.
    pub fn solve_position_constraints(
        &mut self,
        bodies: &mut [BodyConstraint],
        conf: &StepConf,
    ) -> bool {
        match self {
            Joint::Revolute(joint) => {
                let body_a = bodies[joint.index_a];
                let body_b = bodies[joint.index_b];
                let q_a = Rot::from_angle(body_a.position.a);
                let q_b = Rot::from_angle(body_b.position.a);
                let r_a = q_a.rotate(joint.local_anchor_a - body_a.local_center);
                let r_b = q_b.rotate(joint.local_anchor_b - body_b.local_center);

                let c = body_b.position.c + r_b - body_a.position.c - r_a;
                let error = c.length();

                let mass = RevoluteJoint::effective_mass(r_a, r_b, &body_a, &body_b);
                let impulse = -(mass * c);

                let a = &mut bodies[joint.index_a];
                a.position.c -= a.inv_mass * impulse;
                a.position.a -= a.inv_inertia * cross(r_a, impulse);
                let b = &mut bodies[joint.index_b];
                b.position.c += b.inv_mass * impulse;
                b.position.a += b.inv_inertia * cross(r_b, impulse);

                error <= conf.linear_slop
            }
            Joint::Distance(joint) => {
                let body_a = bodies[joint.index_a];
                let body_b = bodies[joint.index_b];
                let q_a = Rot::from_angle(body_a.position.a);
                let q_b = Rot::from_angle(body_b.position.a);
                let r_a = q_a.rotate(joint.local_anchor_a - body_a.local_center);
                let r_b = q_b.rotate(joint.local_anchor_b - body_b.local_center);

                let mut u = body_b.position.c + r_b - body_a.position.c - r_a;
                let length = u.length();
                u = u.normalize_or_zero();
                let c = (length - joint.length)
                    .clamp(-conf.max_linear_correction, conf.max_linear_correction);

                let impulse = -joint.mass * c;
                let p = impulse * u;

                let a = &mut bodies[joint.index_a];
                a.position.c -= a.inv_mass * p;
                a.position.a -= a.inv_inertia * cross(r_a, p);
                let b = &mut bodies[joint.index_b];
                b.position.c += b.inv_mass * p;
                b.position.a += b.inv_inertia * cross(r_b, p);

                (length - joint.length).abs() < conf.linear_slop
            }
        }
    }

    /// Moves any stored world-space state when the world origin shifts.
    pub fn shift_origin(&mut self, _origin: Vec2) {
        // Both joint kinds store anchors in body-local frames only.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Position, Velocity};
    use approx::assert_relative_eq;

    fn dynamic_body(c: Vec2) -> BodyConstraint {
        BodyConstraint {
            body: EntityId::INVALID,
            inv_mass: 1.0,
            inv_inertia: 1.0,
            local_center: Vec2::ZERO,
            position: Position { c, a: 0.0 },
            velocity: Velocity::default(),
        }
    }

    #[test]
    fn revolute_joint_kills_relative_anchor_velocity() {
        let mut bodies = vec![dynamic_body(Vec2::ZERO), dynamic_body(Vec2::new(1.0, 0.0))];
        bodies[1].velocity.linear = Vec2::new(0.0, 3.0);

        let mut joint = Joint::Revolute(RevoluteJoint::new(
            EntityId::INVALID,
            Vec2::new(0.5, 0.0),
            EntityId::INVALID,
            Vec2::new(-0.5, 0.0),
        ));
        let conf = StepConf::default();
        joint.init_velocity_constraints(&mut bodies, 0, 1, &conf);
        for _ in 0..8 {
            joint.solve_velocity_constraints(&mut bodies);
        }

        let anchor_vel_a =
            bodies[0].velocity.linear + cross_sv(bodies[0].velocity.angular, Vec2::new(0.5, 0.0));
        let anchor_vel_b =
            bodies[1].velocity.linear + cross_sv(bodies[1].velocity.angular, Vec2::new(-0.5, 0.0));
        let relative = anchor_vel_b - anchor_vel_a;
        assert_relative_eq!(relative.x, 0.0, epsilon = 1e-3);
        assert_relative_eq!(relative.y, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn distance_joint_restores_length_in_position_phase() {
        let mut bodies = vec![dynamic_body(Vec2::ZERO), dynamic_body(Vec2::new(2.5, 0.0))];
        let mut joint = Joint::Distance(DistanceJoint::new(
            EntityId::INVALID,
            Vec2::ZERO,
            EntityId::INVALID,
            Vec2::ZERO,
            2.0,
        ));
        let conf = StepConf::default();
        joint.init_velocity_constraints(&mut bodies, 0, 1, &conf);

        let mut satisfied = false;
        for _ in 0..10 {
            satisfied = joint.solve_position_constraints(&mut bodies, &conf);
            if satisfied {
                break;
            }
        }
        assert!(satisfied);
        let length = bodies[0].position.c.distance(bodies[1].position.c);
        assert_relative_eq!(length, 2.0, epsilon = 1e-2);
    }
}
