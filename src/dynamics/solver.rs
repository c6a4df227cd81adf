//! Sequential-impulse contact solver.
//!
//! Built per island: position and velocity constraints are snapshots of the
//! island's contacts against island-local body state. Velocity iterations
//! run the accumulated-impulse scheme (with an optional simultaneous 2x2
//! block solve for two-point manifolds); position iterations push bodies
//! apart directly, outside the velocity level.

use glam::{Mat2, Vec2};

use crate::{
    collision::manifold::{Manifold, ManifoldType},
    config::StepConf,
    core::types::{Position, Rot, Transform, Velocity},
    utils::{
        allocator::EntityId,
        math::{cross, cross_sv, cross_vs},
    },
};

/// Island-local snapshot of one body, mutated by the solvers and written
/// back to the world at island end.
#[derive(Debug, Clone, Copy)]
pub struct BodyConstraint {
    pub body: EntityId,
    pub inv_mass: f32,
    pub inv_inertia: f32,
    pub local_center: Vec2,
    pub position: Position,
    pub velocity: Velocity,
}

impl BodyConstraint {
    pub fn transform(&self) -> Transform {
        let q = Rot::from_angle(self.position.a);
        Transform {
            p: self.position.c - q.rotate(self.local_center),
            q,
        }
    }
}

/// Construction input for one island contact.
#[derive(Debug, Clone)]
pub struct ContactSolverDef {
    pub contact: EntityId,
    pub manifold: Manifold,
    pub index_a: usize,
    pub index_b: usize,
    pub friction: f32,
    pub restitution: f32,
    pub tangent_speed: f32,
    pub radius_a: f32,
    pub radius_b: f32,
}

/// Accumulated impulses reported to `post_solve`, one entry per manifold
/// point.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContactImpulses {
    pub normal: [f32; 2],
    pub tangent: [f32; 2],
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct VelocityConstraintPoint {
    r_a: Vec2,
    r_b: Vec2,
    normal_impulse: f32,
    tangent_impulse: f32,
    normal_mass: f32,
    tangent_mass: f32,
    velocity_bias: f32,
}

#[derive(Debug)]
struct VelocityConstraint {
    contact: EntityId,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_inertia_a: f32,
    inv_inertia_b: f32,
    friction: f32,
    restitution: f32,
    tangent_speed: f32,
    normal: Vec2,
    points: [VelocityConstraintPoint; 2],
    count: usize,
    k: Mat2,
    normal_mass: Mat2,
}

#[derive(Debug)]
struct PositionConstraint {
    index_a: usize,
    index_b: usize,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_inertia_a: f32,
    inv_inertia_b: f32,
    local_center_a: Vec2,
    local_center_b: Vec2,
    radius_a: f32,
    radius_b: f32,
    manifold: Manifold,
}

/// One evaluated contact point for the position solver.
struct PositionSolverManifold {
    normal: Vec2,
    point: Vec2,
    separation: f32,
}

impl PositionSolverManifold {
    fn new(pc: &PositionConstraint, xf_a: &Transform, xf_b: &Transform, index: usize) -> Self {
        debug_assert!(pc.manifold.point_count() > 0);
        match pc.manifold.kind {
            ManifoldType::Circles => {
                let point_a = xf_a.transform_point(pc.manifold.local_point);
                let point_b = xf_b.transform_point(pc.manifold.points()[0].local_point);
                let normal = (point_b - point_a).normalize_or_zero();
                Self {
                    normal,
                    point: (point_a + point_b) * 0.5,
                    separation: (point_b - point_a).dot(normal) - pc.radius_a - pc.radius_b,
                }
            }
            ManifoldType::FaceA => {
                let normal = xf_a.q.rotate(pc.manifold.local_normal);
                let plane_point = xf_a.transform_point(pc.manifold.local_point);
                let clip_point = xf_b.transform_point(pc.manifold.points()[index].local_point);
                Self {
                    normal,
                    point: clip_point,
                    separation: (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b,
                }
            }
            ManifoldType::FaceB => {
                let normal = xf_b.q.rotate(pc.manifold.local_normal);
                let plane_point = xf_b.transform_point(pc.manifold.local_point);
                let clip_point = xf_a.transform_point(pc.manifold.points()[index].local_point);
                Self {
                    // Flip so the reported normal still points from A to B.
                    normal: -normal,
                    point: clip_point,
                    separation: (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b,
                }
            }
        }
    }
}

pub struct ContactSolver {
    velocity_constraints: Vec<VelocityConstraint>,
    position_constraints: Vec<PositionConstraint>,
}

impl ContactSolver {
    /// Builds constraints for the island's contacts. `dt_ratio` scales the
    /// warm-start impulses for variable timesteps (zero disables warm
    /// starting entirely).
    pub fn new(defs: Vec<ContactSolverDef>, bodies: &[BodyConstraint], dt_ratio: f32) -> Self {
        let mut velocity_constraints = Vec::with_capacity(defs.len());
        let mut position_constraints = Vec::with_capacity(defs.len());

        for def in defs {
            debug_assert!(matches!(def.manifold.point_count(), 1 | 2));
            let body_a = &bodies[def.index_a];
            let body_b = &bodies[def.index_b];

            let mut vc = VelocityConstraint {
                contact: def.contact,
                index_a: def.index_a,
                index_b: def.index_b,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                inv_inertia_a: body_a.inv_inertia,
                inv_inertia_b: body_b.inv_inertia,
                friction: def.friction,
                restitution: def.restitution,
                tangent_speed: def.tangent_speed,
                normal: Vec2::ZERO,
                points: [VelocityConstraintPoint::default(); 2],
                count: def.manifold.point_count(),
                k: Mat2::ZERO,
                normal_mass: Mat2::ZERO,
            };
            for (i, point) in def.manifold.points().iter().enumerate() {
                vc.points[i].normal_impulse = dt_ratio * point.normal_impulse;
                vc.points[i].tangent_impulse = dt_ratio * point.tangent_impulse;
            }
            velocity_constraints.push(vc);

            position_constraints.push(PositionConstraint {
                index_a: def.index_a,
                index_b: def.index_b,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                inv_inertia_a: body_a.inv_inertia,
                inv_inertia_b: body_b.inv_inertia,
                local_center_a: body_a.local_center,
                local_center_b: body_b.local_center,
                radius_a: def.radius_a,
                radius_b: def.radius_b,
                manifold: def.manifold,
            });
        }

        Self {
            velocity_constraints,
            position_constraints,
        }
    }

    /// Computes world-space constraint data (normals, anchors, effective
    /// masses, restitution bias) from the current island positions.
    pub fn initialize_velocity_constraints(&mut self, bodies: &[BodyConstraint], conf: &StepConf) {
        for (vc, pc) in self
            .velocity_constraints
            .iter_mut()
            .zip(self.position_constraints.iter())
        {
            let body_a = &bodies[vc.index_a];
            let body_b = &bodies[vc.index_b];
            let xf_a = body_a.transform();
            let xf_b = body_b.transform();

            let world = crate::collision::manifold::WorldManifold::new(
                &pc.manifold,
                &xf_a,
                pc.radius_a,
                &xf_b,
                pc.radius_b,
            );
            vc.normal = world.normal;

            let m_a = vc.inv_mass_a;
            let m_b = vc.inv_mass_b;
            let i_a = vc.inv_inertia_a;
            let i_b = vc.inv_inertia_b;

            for i in 0..vc.count {
                let point = &mut vc.points[i];
                point.r_a = world.points[i] - body_a.position.c;
                point.r_b = world.points[i] - body_b.position.c;

                let rn_a = cross(point.r_a, vc.normal);
                let rn_b = cross(point.r_b, vc.normal);
                let k_normal = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                point.normal_mass = if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 };

                let tangent = cross_vs(vc.normal, 1.0);
                let rt_a = cross(point.r_a, tangent);
                let rt_b = cross(point.r_b, tangent);
                let k_tangent = m_a + m_b + i_a * rt_a * rt_a + i_b * rt_b * rt_b;
                point.tangent_mass = if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 };

                // Restitution bias, only above the bounce threshold.
                point.velocity_bias = 0.0;
                let v_rel = vc.normal.dot(
                    body_b.velocity.linear + cross_sv(body_b.velocity.angular, point.r_b)
                        - body_a.velocity.linear
                        - cross_sv(body_a.velocity.angular, point.r_a),
                );
                if v_rel < -conf.velocity_threshold {
                    point.velocity_bias = -vc.restitution * v_rel;
                }
            }

            // Precompute the 2x2 block mass when both points are active.
            if vc.count == 2 && conf.do_blocksolve {
                let rn1_a = cross(vc.points[0].r_a, vc.normal);
                let rn1_b = cross(vc.points[0].r_b, vc.normal);
                let rn2_a = cross(vc.points[1].r_a, vc.normal);
                let rn2_b = cross(vc.points[1].r_b, vc.normal);

                let k11 = m_a + m_b + i_a * rn1_a * rn1_a + i_b * rn1_b * rn1_b;
                let k22 = m_a + m_b + i_a * rn2_a * rn2_a + i_b * rn2_b * rn2_b;
                let k12 = m_a + m_b + i_a * rn1_a * rn2_a + i_b * rn1_b * rn2_b;

                const MAX_CONDITION: f32 = 1000.0;
                if k11 * k11 < MAX_CONDITION * (k11 * k22 - k12 * k12) {
                    vc.k = Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22));
                    vc.normal_mass = vc.k.inverse();
                } else {
                    // Near-singular block: fall back to point-by-point.
                    vc.count = 1;
                }
            }
        }
    }

    /// Applies the impulses carried over from the previous step.
    pub fn warm_start(&mut self, bodies: &mut [BodyConstraint]) {
        for vc in &self.velocity_constraints {
            let m_a = vc.inv_mass_a;
            let m_b = vc.inv_mass_b;
            let i_a = vc.inv_inertia_a;
            let i_b = vc.inv_inertia_b;
            let tangent = cross_vs(vc.normal, 1.0);

            let mut velocity_a = bodies[vc.index_a].velocity;
            let mut velocity_b = bodies[vc.index_b].velocity;
            for point in &vc.points[..vc.count] {
                let p = point.normal_impulse * vc.normal + point.tangent_impulse * tangent;
                velocity_a.linear -= m_a * p;
                velocity_a.angular -= i_a * cross(point.r_a, p);
                velocity_b.linear += m_b * p;
                velocity_b.angular += i_b * cross(point.r_b, p);
            }
            bodies[vc.index_a].velocity = velocity_a;
            bodies[vc.index_b].velocity = velocity_b;
        }
    }

    /// One velocity iteration over every contact: friction along the
    /// tangent, then the normal impulses (block-solved for two points).
    pub fn solve_velocity_constraints(&mut self, bodies: &mut [BodyConstraint]) {
        for vc in &mut self.velocity_constraints {
            let m_a = vc.inv_mass_a;
            let m_b = vc.inv_mass_b;
            let i_a = vc.inv_inertia_a;
            let i_b = vc.inv_inertia_b;
            let normal = vc.normal;
            let tangent = cross_vs(normal, 1.0);
            let friction = vc.friction;

            let mut v_a = bodies[vc.index_a].velocity.linear;
            let mut w_a = bodies[vc.index_a].velocity.angular;
            let mut v_b = bodies[vc.index_b].velocity.linear;
            let mut w_b = bodies[vc.index_b].velocity.angular;

            // Tangent impulses first so friction uses the freshest normal
            // impulse bound.
            for point in &mut vc.points[..vc.count] {
                let dv = v_b + cross_sv(w_b, point.r_b) - v_a - cross_sv(w_a, point.r_a);
                let vt = dv.dot(tangent) - vc.tangent_speed;
                let lambda = point.tangent_mass * -vt;

                let max_friction = friction * point.normal_impulse;
                let new_impulse = (point.tangent_impulse + lambda).clamp(-max_friction, max_friction);
                let lambda = new_impulse - point.tangent_impulse;
                point.tangent_impulse = new_impulse;

                let p = lambda * tangent;
                v_a -= m_a * p;
                w_a -= i_a * cross(point.r_a, p);
                v_b += m_b * p;
                w_b += i_b * cross(point.r_b, p);
            }

            if vc.count == 1 {
                let point = &mut vc.points[0];
                let dv = v_b + cross_sv(w_b, point.r_b) - v_a - cross_sv(w_a, point.r_a);
                let vn = dv.dot(normal);
                let lambda = -point.normal_mass * (vn - point.velocity_bias);

                let new_impulse = (point.normal_impulse + lambda).max(0.0);
                let lambda = new_impulse - point.normal_impulse;
                point.normal_impulse = new_impulse;

                let p = lambda * normal;
                v_a -= m_a * p;
                w_a -= i_a * cross(point.r_a, p);
                v_b += m_b * p;
                w_b += i_b * cross(point.r_b, p);
            } else {
                // Two-point block solve: a 2-D linear complementarity
                // problem over the accumulated impulses, resolved by
                // enumerating the four active-set cases and committing the
                // first consistent one.
                let (first, rest) = vc.points.split_at_mut(1);
                let cp1 = &mut first[0];
                let cp2 = &mut rest[0];
                let a = Vec2::new(cp1.normal_impulse, cp2.normal_impulse);
                debug_assert!(a.x >= 0.0 && a.y >= 0.0);

                let dv1 = v_b + cross_sv(w_b, cp1.r_b) - v_a - cross_sv(w_a, cp1.r_a);
                let dv2 = v_b + cross_sv(w_b, cp2.r_b) - v_a - cross_sv(w_a, cp2.r_a);
                let vn1 = dv1.dot(normal);
                let vn2 = dv2.dot(normal);

                let mut b = Vec2::new(vn1 - cp1.velocity_bias, vn2 - cp2.velocity_bias);
                b -= vc.k * a;

                let mut apply = |x: Vec2, cp1: &mut VelocityConstraintPoint, cp2: &mut VelocityConstraintPoint| {
                    let d = x - a;
                    let p1 = d.x * normal;
                    let p2 = d.y * normal;
                    v_a -= m_a * (p1 + p2);
                    w_a -= i_a * (cross(cp1.r_a, p1) + cross(cp2.r_a, p2));
                    v_b += m_b * (p1 + p2);
                    w_b += i_b * (cross(cp1.r_b, p1) + cross(cp2.r_b, p2));
                    cp1.normal_impulse = x.x;
                    cp2.normal_impulse = x.y;
                };

                'block: {
                    // Case 1: both points active.
                    let x = -(vc.normal_mass * b);
                    if x.x >= 0.0 && x.y >= 0.0 {
                        apply(x, cp1, cp2);
                        break 'block;
                    }
                    // Case 2: point 1 active, point 2 separating.
                    let x = Vec2::new(-cp1.normal_mass * b.x, 0.0);
                    let vn2 = vc.k.x_axis.y * x.x + b.y;
                    if x.x >= 0.0 && vn2 >= 0.0 {
                        apply(x, cp1, cp2);
                        break 'block;
                    }
                    // Case 3: point 2 active, point 1 separating.
                    let x = Vec2::new(0.0, -cp2.normal_mass * b.y);
                    let vn1 = vc.k.y_axis.x * x.y + b.x;
                    if x.y >= 0.0 && vn1 >= 0.0 {
                        apply(x, cp1, cp2);
                        break 'block;
                    }
                    // Case 4: both separating.
                    let x = Vec2::ZERO;
                    if b.x >= 0.0 && b.y >= 0.0 {
                        apply(x, cp1, cp2);
                        break 'block;
                    }
                    // No consistent case (rare, from severe conditioning):
                    // keep the current impulses.
                }
            }

            bodies[vc.index_a].velocity = Velocity {
                linear: v_a,
                angular: w_a,
            };
            bodies[vc.index_b].velocity = Velocity {
                linear: v_b,
                angular: w_b,
            };
        }
    }

    /// Per-contact accumulated impulses, for manifold store-back and
    /// `post_solve` reporting.
    pub fn impulses(&self) -> Vec<(EntityId, ContactImpulses)> {
        self.velocity_constraints
            .iter()
            .map(|vc| {
                let mut impulses = ContactImpulses {
                    count: vc.count,
                    ..Default::default()
                };
                for i in 0..vc.count {
                    impulses.normal[i] = vc.points[i].normal_impulse;
                    impulses.tangent[i] = vc.points[i].tangent_impulse;
                }
                (vc.contact, impulses)
            })
            .collect()
    }

    /// One position iteration: resolves penetration directly at the position
    /// level. When `toi_pair` is set, only those two island bodies receive
    /// corrections (the mini-island TOI solve). Returns the minimum
    /// separation seen.
    pub fn solve_position_constraints(
        &self,
        bodies: &mut [BodyConstraint],
        baumgarte: f32,
        slop: f32,
        max_correction: f32,
        toi_pair: Option<(usize, usize)>,
    ) -> f32 {
        let mut min_separation = 0.0f32;

        for pc in &self.position_constraints {
            let (m_a, i_a, m_b, i_b) = match toi_pair {
                Some((toi_a, toi_b)) => {
                    let movable_a = pc.index_a == toi_a || pc.index_a == toi_b;
                    let movable_b = pc.index_b == toi_a || pc.index_b == toi_b;
                    (
                        if movable_a { pc.inv_mass_a } else { 0.0 },
                        if movable_a { pc.inv_inertia_a } else { 0.0 },
                        if movable_b { pc.inv_mass_b } else { 0.0 },
                        if movable_b { pc.inv_inertia_b } else { 0.0 },
                    )
                }
                None => (pc.inv_mass_a, pc.inv_inertia_a, pc.inv_mass_b, pc.inv_inertia_b),
            };

            let mut c_a = bodies[pc.index_a].position.c;
            let mut a_a = bodies[pc.index_a].position.a;
            let mut c_b = bodies[pc.index_b].position.c;
            let mut a_b = bodies[pc.index_b].position.a;

            for j in 0..pc.manifold.point_count() {
                let q_a = Rot::from_angle(a_a);
                let q_b = Rot::from_angle(a_b);
                let xf_a = Transform {
                    p: c_a - q_a.rotate(pc.local_center_a),
                    q: q_a,
                };
                let xf_b = Transform {
                    p: c_b - q_b.rotate(pc.local_center_b),
                    q: q_b,
                };

                let psm = PositionSolverManifold::new(pc, &xf_a, &xf_b, j);
                min_separation = min_separation.min(psm.separation);

                let correction =
                    (baumgarte * (psm.separation + slop)).clamp(-max_correction, 0.0);

                let r_a = psm.point - c_a;
                let r_b = psm.point - c_b;
                let rn_a = cross(r_a, psm.normal);
                let rn_b = cross(r_b, psm.normal);
                let k = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                let impulse = if k > 0.0 { -correction / k } else { 0.0 };
                let p = impulse * psm.normal;

                c_a -= m_a * p;
                a_a -= i_a * cross(r_a, p);
                c_b += m_b * p;
                a_b += i_b * cross(r_b, p);
            }

            bodies[pc.index_a].position = Position { c: c_a, a: a_a };
            bodies[pc.index_b].position = Position { c: c_b, a: a_b };
        }

        min_separation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{manifold, shapes::Shape};
    use crate::config::POLYGON_RADIUS;
    use approx::assert_relative_eq;

    fn body(c: Vec2, velocity: Vec2, inv_mass: f32) -> BodyConstraint {
        BodyConstraint {
            body: EntityId::INVALID,
            inv_mass,
            inv_inertia: 0.0,
            local_center: Vec2::ZERO,
            position: Position { c, a: 0.0 },
            velocity: Velocity {
                linear: velocity,
                angular: 0.0,
            },
        }
    }

    fn circle_circle_def(bodies: &[BodyConstraint], restitution: f32) -> ContactSolverDef {
        let shape = Shape::circle(0.5).unwrap();
        let xf_a = Transform::new(bodies[0].position.c, 0.0);
        let xf_b = Transform::new(bodies[1].position.c, 0.0);
        let m = manifold::evaluate(&shape, 0, &xf_a, &shape, 0, &xf_b);
        assert_eq!(m.point_count(), 1);
        ContactSolverDef {
            contact: EntityId::INVALID,
            manifold: m,
            index_a: 0,
            index_b: 1,
            friction: 0.0,
            restitution,
            tangent_speed: 0.0,
            radius_a: 0.5,
            radius_b: 0.5,
        }
    }

    #[test]
    fn head_on_impulse_cancels_approach_velocity() {
        let mut bodies = vec![
            body(Vec2::ZERO, Vec2::new(1.0, 0.0), 1.0),
            body(Vec2::new(0.99, 0.0), Vec2::new(-1.0, 0.0), 1.0),
        ];
        let def = circle_circle_def(&bodies, 0.0);
        let conf = StepConf::default();

        let mut solver = ContactSolver::new(vec![def], &bodies, 1.0);
        solver.initialize_velocity_constraints(&bodies, &conf);
        solver.warm_start(&mut bodies);
        for _ in 0..conf.reg_velocity_iters {
            solver.solve_velocity_constraints(&mut bodies);
        }

        // Equal masses, zero restitution: both bodies stop along the normal.
        assert_relative_eq!(bodies[0].velocity.linear.x, 0.0, epsilon = 1e-3);
        assert_relative_eq!(bodies[1].velocity.linear.x, 0.0, epsilon = 1e-3);

        let impulses = solver.impulses();
        assert_eq!(impulses.len(), 1);
        assert!(impulses[0].1.normal[0] > 0.0);
    }

    #[test]
    fn restitution_bounces_fast_impacts() {
        let mut bodies = vec![
            body(Vec2::ZERO, Vec2::ZERO, 0.0),
            body(Vec2::new(0.99, 0.0), Vec2::new(-4.0, 0.0), 1.0),
        ];
        let def = circle_circle_def(&bodies, 1.0);
        let conf = StepConf::default();

        let mut solver = ContactSolver::new(vec![def], &bodies, 1.0);
        solver.initialize_velocity_constraints(&bodies, &conf);
        for _ in 0..conf.reg_velocity_iters {
            solver.solve_velocity_constraints(&mut bodies);
        }
        // Full restitution reverses the approach speed against the static
        // body.
        assert_relative_eq!(bodies[1].velocity.linear.x, 4.0, epsilon = 1e-2);
    }

    #[test]
    fn two_point_block_solve_stops_a_symmetric_box() {
        // A box falling squarely onto a wide static box: two contact points,
        // solved simultaneously.
        let ground_shape = Shape::rect(2.0, 0.5).unwrap();
        let box_shape = Shape::rect(0.5, 0.5).unwrap();
        let xf_a = Transform::IDENTITY;
        let xf_b = Transform::new(Vec2::new(0.0, 0.99), 0.0);
        let m = manifold::evaluate(&ground_shape, 0, &xf_a, &box_shape, 0, &xf_b);
        assert_eq!(m.point_count(), 2);

        let mut bodies = vec![
            body(Vec2::ZERO, Vec2::ZERO, 0.0),
            BodyConstraint {
                body: EntityId::INVALID,
                inv_mass: 1.0,
                inv_inertia: 6.0,
                local_center: Vec2::ZERO,
                position: Position {
                    c: Vec2::new(0.0, 0.99),
                    a: 0.0,
                },
                velocity: Velocity {
                    linear: Vec2::new(0.0, -2.0),
                    angular: 0.0,
                },
            },
        ];
        let def = ContactSolverDef {
            contact: EntityId::INVALID,
            manifold: m,
            index_a: 0,
            index_b: 1,
            friction: 0.3,
            restitution: 0.0,
            tangent_speed: 0.0,
            radius_a: POLYGON_RADIUS,
            radius_b: POLYGON_RADIUS,
        };
        let conf = StepConf::default();
        let mut solver = ContactSolver::new(vec![def], &bodies, 1.0);
        solver.initialize_velocity_constraints(&bodies, &conf);
        for _ in 0..conf.reg_velocity_iters {
            solver.solve_velocity_constraints(&mut bodies);
        }
        assert_relative_eq!(bodies[1].velocity.linear.y, 0.0, epsilon = 1e-3);
        // Symmetric impact: no spin is introduced.
        assert_relative_eq!(bodies[1].velocity.angular, 0.0, epsilon = 1e-3);

        let impulses = solver.impulses();
        assert!(impulses[0].1.normal[0] > 0.0);
        assert!(impulses[0].1.normal[1] > 0.0);
    }

    #[test]
    fn position_solver_separates_overlapping_circles() {
        let mut bodies = vec![
            body(Vec2::ZERO, Vec2::ZERO, 0.0),
            body(Vec2::new(0.9, 0.0), Vec2::ZERO, 1.0),
        ];
        let def = circle_circle_def(&bodies, 0.0);
        let conf = StepConf::default();
        let solver = ContactSolver::new(vec![def], &bodies, 1.0);

        let mut min_sep = f32::NEG_INFINITY;
        for _ in 0..20 {
            min_sep = solver.solve_position_constraints(
                &mut bodies,
                conf.baumgarte,
                conf.linear_slop,
                conf.max_linear_correction,
                None,
            );
            if min_sep >= -3.0 * conf.linear_slop {
                break;
            }
        }
        assert!(
            min_sep >= -3.0 * conf.linear_slop,
            "min separation {min_sep}"
        );
        // Only the dynamic body moved.
        assert_eq!(bodies[0].position.c, Vec2::ZERO);
        assert!(bodies[1].position.c.x > 0.9);
    }
}
