//! Central simulation container orchestrating all subsystems: broad phase,
//! contact management, island solving, continuous collision, and sleep.

use std::collections::{HashMap, HashSet};

use glam::Vec2;
use log::debug;

use crate::{
    collision::{
        broadphase::BroadPhase,
        ccd::{time_of_impact, ToiConf, ToiState},
        contact::{Contact, ContactKey},
        manifold::{self, Manifold},
        queries::{test_overlap, RayCastHit},
        shapes::Shape,
        Aabb, RayCastInput,
    },
    config::{StepConf, AABB_MULTIPLIER, DEFAULT_GRAVITY},
    core::{
        body::{BodyType, ContactEdge, JointEdge, RigidBody},
        fixture::{Filter, Fixture, FixtureDef},
        types::{MassData, Position, Velocity},
        PhysicsError,
    },
    dynamics::{
        island::Island,
        joints::Joint,
        solver::{BodyConstraint, ContactImpulses, ContactSolver, ContactSolverDef},
    },
    utils::{
        allocator::{Arena, EntityId},
        logging::ScopedTimer,
    },
};

/// Receives contact lifecycle notifications during `World::step`. The world
/// is locked while any of these run; structural mutation must be deferred.
pub trait ContactListener {
    /// A contact gained its first point this step.
    fn begin_contact(&mut self, contact: &Contact) {
        let _ = contact;
    }
    /// A contact lost its last point, or a touching contact was destroyed.
    fn end_contact(&mut self, contact: &Contact) {
        let _ = contact;
    }
    /// Runs before the solver sees the contact; may disable it or override
    /// its friction/restitution for this step.
    fn pre_solve(&mut self, contact: &mut Contact, old_manifold: &Manifold) {
        let _ = (contact, old_manifold);
    }
    /// Runs after an island solve with the accumulated impulses.
    fn post_solve(&mut self, contact: &Contact, impulses: &ContactImpulses) {
        let _ = (contact, impulses);
    }
    /// A fixture is about to go away (body destruction included).
    fn fixture_destroyed(&mut self, fixture: EntityId) {
        let _ = fixture;
    }
    /// A joint is about to go away (body destruction included).
    fn joint_destroyed(&mut self, joint: EntityId) {
        let _ = joint;
    }
}

/// Broad-phase leaf payload: one convex child of one fixture.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ProxyData {
    fixture: EntityId,
    child: u32,
}

/// Per-step accounting returned by [`World::step`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StepStats {
    pub pairs_emitted: usize,
    pub contacts_created: usize,
    pub contacts_destroyed: usize,
    pub contacts_updated: usize,
    pub islands_found: usize,
    pub islands_solved: usize,
    pub bodies_slept: usize,
    pub toi_islands: usize,
    /// Smallest contact separation over all regular island position solves.
    pub min_separation: f32,
    pub proxies_moved: usize,
}

/// Central simulation world. Owns bodies, fixtures, joints and contacts in
/// generational arenas; every cross-reference is an id.
pub struct World {
    gravity: Vec2,
    bodies: Arena<RigidBody>,
    fixtures: Arena<Fixture>,
    joints: Arena<Joint>,
    contacts: Arena<Contact>,
    contact_keys: HashMap<ContactKey, EntityId>,
    broadphase: BroadPhase<ProxyData>,
    listener: Option<Box<dyn ContactListener>>,
    locked: bool,
    auto_clear_forces: bool,
    /// 1/dt of the previous step, for warm-start impulse scaling.
    inv_dt0: f32,
    island: Island,
}

pub struct WorldBuilder {
    gravity: Vec2,
    auto_clear_forces: bool,
}

impl Default for WorldBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldBuilder {
    pub fn new() -> Self {
        Self {
            gravity: Vec2::from_slice(&DEFAULT_GRAVITY),
            auto_clear_forces: true,
        }
    }

    pub fn gravity(mut self, gravity: Vec2) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn auto_clear_forces(mut self, enabled: bool) -> Self {
        self.auto_clear_forces = enabled;
        self
    }

    pub fn build(self) -> World {
        World {
            gravity: self.gravity,
            bodies: Arena::new(),
            fixtures: Arena::new(),
            joints: Arena::new(),
            contacts: Arena::new(),
            contact_keys: HashMap::new(),
            broadphase: BroadPhase::new(),
            listener: None,
            locked: false,
            auto_clear_forces: self.auto_clear_forces,
            inv_dt0: 0.0,
            island: Island::new(),
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl World {
    pub fn new(gravity: Vec2) -> Self {
        Self::builder().gravity(gravity).build()
    }

    pub fn builder() -> WorldBuilder {
        WorldBuilder::new()
    }

    pub fn gravity(&self) -> Vec2 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.gravity = gravity;
    }

    /// Whether a step is currently in progress (listener context).
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn set_contact_listener(&mut self, listener: Box<dyn ContactListener>) {
        self.listener = Some(listener);
    }

    pub fn set_auto_clear_forces(&mut self, enabled: bool) {
        self.auto_clear_forces = enabled;
    }

    // ----- structure ------------------------------------------------------

    pub fn create_body(&mut self, body: RigidBody) -> Result<EntityId, PhysicsError> {
        if self.locked {
            return Err(PhysicsError::Locked);
        }
        Ok(self.bodies.insert(body))
    }

    pub fn destroy_body(&mut self, body_id: EntityId) -> Result<(), PhysicsError> {
        if self.locked {
            return Err(PhysicsError::Locked);
        }
        let body = self
            .bodies
            .get(body_id)
            .ok_or(PhysicsError::InvalidArgument("unknown body"))?;
        let joint_edges = body.joint_edges().to_vec();
        let contact_edges = body.contact_edges().to_vec();
        let fixtures = body.fixtures.clone();

        for edge in joint_edges {
            self.destroy_joint(edge.joint)?;
        }
        for edge in contact_edges {
            self.destroy_contact(edge.contact);
        }
        for fixture_id in fixtures {
            if let Some(listener) = self.listener.as_deref_mut() {
                listener.fixture_destroyed(fixture_id);
            }
            self.destroy_fixture_proxies(fixture_id);
            self.fixtures.remove(fixture_id);
        }
        self.bodies.remove(body_id);
        Ok(())
    }

    pub fn create_fixture(
        &mut self,
        body_id: EntityId,
        def: FixtureDef,
    ) -> Result<EntityId, PhysicsError> {
        if self.locked {
            return Err(PhysicsError::Locked);
        }
        def.validate()?;
        let body = self
            .bodies
            .get(body_id)
            .ok_or(PhysicsError::InvalidArgument("unknown body"))?;
        let enabled = body.is_enabled();

        let fixture_id = self.fixtures.insert(Fixture::new(body_id, &def));
        self.bodies.get_mut(body_id).unwrap().fixtures.push(fixture_id);

        if enabled {
            // Proxies enter the broad-phase move buffer, so the pair pass of
            // the next step will consider the new fixture.
            self.create_fixture_proxies(fixture_id);
        }
        if def.density > 0.0 {
            self.reset_mass_data(body_id);
        }
        Ok(fixture_id)
    }

    pub fn destroy_fixture(&mut self, fixture_id: EntityId) -> Result<(), PhysicsError> {
        if self.locked {
            return Err(PhysicsError::Locked);
        }
        let body_id = self
            .fixtures
            .get(fixture_id)
            .ok_or(PhysicsError::InvalidArgument("unknown fixture"))?
            .body();

        // Contacts referencing this fixture die with it.
        let stale: Vec<EntityId> = self
            .bodies
            .get(body_id)
            .unwrap()
            .contact_edges()
            .iter()
            .map(|edge| edge.contact)
            .filter(|contact_id| {
                self.contacts
                    .get(*contact_id)
                    .is_some_and(|c| c.fixture_a == fixture_id || c.fixture_b == fixture_id)
            })
            .collect();
        for contact_id in stale {
            self.destroy_contact(contact_id);
        }

        if let Some(listener) = self.listener.as_deref_mut() {
            listener.fixture_destroyed(fixture_id);
        }
        self.destroy_fixture_proxies(fixture_id);
        self.fixtures.remove(fixture_id);
        if let Some(body) = self.bodies.get_mut(body_id) {
            body.fixtures.retain(|id| *id != fixture_id);
        }
        self.reset_mass_data(body_id);
        Ok(())
    }

    pub fn create_joint(&mut self, joint: Joint) -> Result<EntityId, PhysicsError> {
        if self.locked {
            return Err(PhysicsError::Locked);
        }
        let body_a = joint.body_a();
        let body_b = joint.body_b();
        if body_a == body_b || !self.bodies.contains(body_a) || !self.bodies.contains(body_b) {
            return Err(PhysicsError::InvalidArgument("joint needs two distinct bodies"));
        }
        let collide_connected = joint.collide_connected();
        let joint_id = self.joints.insert(joint);
        self.bodies.get_mut(body_a).unwrap().joint_edges.push(JointEdge {
            other: body_b,
            joint: joint_id,
        });
        self.bodies.get_mut(body_b).unwrap().joint_edges.push(JointEdge {
            other: body_a,
            joint: joint_id,
        });

        // Existing contacts between the joined bodies become illegal when
        // the joint suppresses collision.
        if !collide_connected {
            let stale: Vec<EntityId> = self
                .bodies
                .get(body_a)
                .unwrap()
                .contact_edges()
                .iter()
                .filter(|edge| edge.other == body_b)
                .map(|edge| edge.contact)
                .collect();
            for contact_id in stale {
                self.destroy_contact(contact_id);
            }
        }
        Ok(joint_id)
    }

    pub fn destroy_joint(&mut self, joint_id: EntityId) -> Result<(), PhysicsError> {
        if self.locked {
            return Err(PhysicsError::Locked);
        }
        let joint = self
            .joints
            .get(joint_id)
            .ok_or(PhysicsError::InvalidArgument("unknown joint"))?;
        let body_a = joint.body_a();
        let body_b = joint.body_b();
        let collide_connected = joint.collide_connected();

        if let Some(listener) = self.listener.as_deref_mut() {
            listener.joint_destroyed(joint_id);
        }
        self.joints.remove(joint_id);
        for body_id in [body_a, body_b] {
            if let Some(body) = self.bodies.get_mut(body_id) {
                body.joint_edges.retain(|edge| edge.joint != joint_id);
                body.set_awake(true);
            }
        }

        // Collision between the bodies may now be allowed again; get their
        // pairs re-evaluated.
        if !collide_connected {
            for body_id in [body_a, body_b] {
                let proxies: Vec<u32> = self
                    .bodies
                    .get(body_id)
                    .map(|body| body.fixtures.clone())
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|fixture_id| self.fixtures.get(*fixture_id))
                    .flat_map(|fixture| fixture.proxies.iter().copied())
                    .collect();
                for proxy in proxies {
                    self.broadphase.touch_proxy(proxy);
                }
            }
        }
        Ok(())
    }

    // ----- accessors ------------------------------------------------------

    pub fn body(&self, id: EntityId) -> Option<&RigidBody> {
        self.bodies.get(id)
    }

    /// Mutable body access; refused while the world is locked.
    pub fn body_mut(&mut self, id: EntityId) -> Result<&mut RigidBody, PhysicsError> {
        if self.locked {
            return Err(PhysicsError::Locked);
        }
        self.bodies
            .get_mut(id)
            .ok_or(PhysicsError::InvalidArgument("unknown body"))
    }

    pub fn fixture(&self, id: EntityId) -> Option<&Fixture> {
        self.fixtures.get(id)
    }

    pub fn joint(&self, id: EntityId) -> Option<&Joint> {
        self.joints.get(id)
    }

    pub fn contact(&self, id: EntityId) -> Option<&Contact> {
        self.contacts.get(id)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (EntityId, &RigidBody)> + '_ {
        self.bodies.iter()
    }

    pub fn contacts(&self) -> impl Iterator<Item = (EntityId, &Contact)> + '_ {
        self.contacts.iter()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    pub fn proxy_count(&self) -> usize {
        self.broadphase.proxy_count()
    }

    /// Fat AABB currently stored for a broad-phase proxy.
    pub fn fat_aabb(&self, proxy: u32) -> Aabb {
        self.broadphase.fat_aabb(proxy)
    }

    // ----- body/fixture mutation helpers ---------------------------------

    /// Teleports a body, resetting its sweep and refreshing its proxies.
    pub fn set_transform(
        &mut self,
        body_id: EntityId,
        position: Vec2,
        angle: f32,
    ) -> Result<(), PhysicsError> {
        if self.locked {
            return Err(PhysicsError::Locked);
        }
        let body = self
            .bodies
            .get_mut(body_id)
            .ok_or(PhysicsError::InvalidArgument("unknown body"))?;
        body.set_transform_internal(position, angle);
        self.synchronize_fixtures(body_id, 0.0);
        Ok(())
    }

    /// Replaces a fixture's collision filter and queues its pairs for
    /// re-evaluation.
    pub fn set_filter(&mut self, fixture_id: EntityId, filter: Filter) -> Result<(), PhysicsError> {
        if self.locked {
            return Err(PhysicsError::Locked);
        }
        let fixture = self
            .fixtures
            .get_mut(fixture_id)
            .ok_or(PhysicsError::InvalidArgument("unknown fixture"))?;
        fixture.set_filter_internal(filter);
        let proxies = fixture.proxies.clone();
        let body_id = fixture.body();

        // Newly-excluded contacts die immediately; newly-allowed pairs are
        // rediscovered through the touched proxies.
        let stale: Vec<EntityId> = self
            .bodies
            .get(body_id)
            .map(|body| {
                body.contact_edges()
                    .iter()
                    .map(|edge| edge.contact)
                    .filter(|id| {
                        self.contacts.get(*id).is_some_and(|contact| {
                            (contact.fixture_a == fixture_id || contact.fixture_b == fixture_id)
                                && !self.fixtures_should_collide(contact.fixture_a, contact.fixture_b)
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        for contact_id in stale {
            self.destroy_contact(contact_id);
        }
        for proxy in proxies {
            self.broadphase.touch_proxy(proxy);
        }
        Ok(())
    }

    pub fn set_sensor(&mut self, fixture_id: EntityId, is_sensor: bool) -> Result<(), PhysicsError> {
        if self.locked {
            return Err(PhysicsError::Locked);
        }
        let fixture = self
            .fixtures
            .get_mut(fixture_id)
            .ok_or(PhysicsError::InvalidArgument("unknown fixture"))?;
        fixture.set_sensor_internal(is_sensor);
        if let Some(body) = self.bodies.get_mut(fixture.body()) {
            body.set_awake(true);
        }
        Ok(())
    }

    pub fn set_body_enabled(
        &mut self,
        body_id: EntityId,
        enabled: bool,
    ) -> Result<(), PhysicsError> {
        if self.locked {
            return Err(PhysicsError::Locked);
        }
        let body = self
            .bodies
            .get(body_id)
            .ok_or(PhysicsError::InvalidArgument("unknown body"))?;
        if body.is_enabled() == enabled {
            return Ok(());
        }
        if enabled {
            self.bodies.get_mut(body_id).unwrap().set_enabled_flag(true);
            let fixtures = self.bodies.get(body_id).unwrap().fixtures.clone();
            for fixture_id in fixtures {
                self.create_fixture_proxies(fixture_id);
            }
        } else {
            let contact_edges = self.bodies.get(body_id).unwrap().contact_edges().to_vec();
            for edge in contact_edges {
                self.destroy_contact(edge.contact);
            }
            let fixtures = self.bodies.get(body_id).unwrap().fixtures.clone();
            for fixture_id in fixtures {
                self.destroy_fixture_proxies(fixture_id);
            }
            self.bodies.get_mut(body_id).unwrap().set_enabled_flag(false);
        }
        Ok(())
    }

    /// Shifts the world origin: `new position = old position - origin`.
    pub fn shift_origin(&mut self, origin: Vec2) -> Result<(), PhysicsError> {
        if self.locked {
            return Err(PhysicsError::Locked);
        }
        for (_, body) in self.bodies.iter_mut() {
            body.transform.p -= origin;
            body.sweep.c0 -= origin;
            body.sweep.c -= origin;
        }
        for (_, joint) in self.joints.iter_mut() {
            joint.shift_origin(origin);
        }
        self.broadphase.shift_origin(origin);
        Ok(())
    }

    // ----- queries --------------------------------------------------------

    /// Visits every fixture child whose fat AABB overlaps `aabb`; the
    /// callback returns false to stop early.
    pub fn query_aabb(&self, aabb: &Aabb, mut callback: impl FnMut(EntityId, u32) -> bool) {
        self.broadphase.query(aabb, |proxy_id| {
            let data = self.broadphase.user_data(proxy_id);
            callback(data.fixture, data.child)
        });
    }

    /// Casts a ray from `p1` to `p2` against every fixture along it. See
    /// [`RayCastHit`] for the callback protocol.
    pub fn ray_cast(&self, p1: Vec2, p2: Vec2, mut callback: impl FnMut(RayCastHit) -> f32) {
        let input = RayCastInput {
            p1,
            p2,
            max_fraction: 1.0,
        };
        self.broadphase.ray_cast(&input, |sub_input, proxy_id| {
            let data = self.broadphase.user_data(proxy_id);
            let Some(fixture) = self.fixtures.get(data.fixture) else {
                return sub_input.max_fraction;
            };
            let Some(body) = self.bodies.get(fixture.body()) else {
                return sub_input.max_fraction;
            };
            let xf = body.transform();
            match fixture.shape().ray_cast(sub_input, &xf, data.child) {
                Some(output) => {
                    let point = sub_input.p1 + output.fraction * (sub_input.p2 - sub_input.p1);
                    callback(RayCastHit {
                        fixture: data.fixture,
                        child: data.child,
                        point,
                        normal: output.normal,
                        fraction: output.fraction,
                    })
                }
                // Miss: keep going with the current clip fraction.
                None => sub_input.max_fraction,
            }
        });
    }

    // ----- stepping -------------------------------------------------------

    /// Advances the world by one timestep: collide, regular island solve,
    /// continuous (TOI) sub-steps, sleep management.
    pub fn step(&mut self, conf: &StepConf) -> Result<StepStats, PhysicsError> {
        if self.locked {
            return Err(PhysicsError::Locked);
        }
        self.locked = true;
        let step_timer = ScopedTimer::new("world::step");
        let mut stats = StepStats::default();
        let mut listener = self.listener.take();

        {
            let _timer = ScopedTimer::new("world::collide");
            self.update_pairs(&mut stats);
            self.collide(&mut stats, &mut listener);
        }

        if conf.delta_time > 0.0 {
            {
                let _timer = ScopedTimer::new("world::solve");
                self.solve(conf, &mut stats, &mut listener);
            }
            if conf.do_toi {
                let _timer = ScopedTimer::new("world::solve_toi");
                self.solve_toi(conf, &mut stats, &mut listener);
            }
            self.inv_dt0 = conf.inv_delta_time();
        }

        if self.auto_clear_forces {
            for (_, body) in self.bodies.iter_mut() {
                body.clear_forces();
            }
        }

        self.listener = listener;
        self.locked = false;
        crate::utils::logging::warn_if_step_budget_exceeded(step_timer.elapsed(), conf.delta_time);

        debug!(
            "step: pairs={} contacts={} islands={}/{} toi_islands={} slept={}",
            stats.pairs_emitted,
            self.contacts.len(),
            stats.islands_solved,
            stats.islands_found,
            stats.toi_islands,
            stats.bodies_slept
        );
        Ok(stats)
    }

    fn update_pairs(&mut self, stats: &mut StepStats) {
        let mut pairs: Vec<(ProxyData, ProxyData)> = Vec::new();
        stats.pairs_emitted += self.broadphase.update_pairs(|a, b| pairs.push((a, b)));
        for (a, b) in pairs {
            self.add_pair(a, b, stats);
        }
    }

    /// Creates a contact for a broad-phase pair unless filtered out.
    fn add_pair(&mut self, a: ProxyData, b: ProxyData, stats: &mut StepStats) {
        if a.fixture == b.fixture {
            return;
        }
        let (Some(fixture_a), Some(fixture_b)) =
            (self.fixtures.get(a.fixture), self.fixtures.get(b.fixture))
        else {
            return;
        };
        if fixture_a.body() == fixture_b.body() {
            return;
        }
        let key = ContactKey::new(a.fixture, a.child, b.fixture, b.child);
        if self.contact_keys.contains_key(&key) {
            return;
        }
        if !self.joints_allow_collision(fixture_a.body(), fixture_b.body()) {
            return;
        }
        if !fixture_a.filter().should_collide(&fixture_b.filter()) {
            return;
        }

        // Canonical dispatch order: the higher-ranked shape becomes A.
        let rank = |shape: &Shape| match shape {
            Shape::Circle { .. } => 0,
            Shape::Polygon(_) => 1,
            Shape::Edge(_) => 2,
            Shape::Chain(_) => 3,
        };
        let (a, b) = if rank(fixture_a.shape()) < rank(fixture_b.shape()) {
            (b, a)
        } else {
            (a, b)
        };
        let fixture_a = self.fixtures.get(a.fixture).unwrap();
        let fixture_b = self.fixtures.get(b.fixture).unwrap();

        let contact = Contact::new(
            a.fixture,
            a.child,
            fixture_a.body(),
            b.fixture,
            b.child,
            fixture_b.body(),
            fixture_a.friction,
            fixture_b.friction,
            fixture_a.restitution,
            fixture_b.restitution,
        );
        let body_a = contact.body_a;
        let body_b = contact.body_b;
        let contact_id = self.contacts.insert(contact);
        self.contact_keys.insert(key, contact_id);
        self.bodies.get_mut(body_a).unwrap().contact_edges.push(ContactEdge {
            other: body_b,
            contact: contact_id,
        });
        self.bodies.get_mut(body_b).unwrap().contact_edges.push(ContactEdge {
            other: body_a,
            contact: contact_id,
        });
        stats.contacts_created += 1;
    }

    fn joints_allow_collision(&self, body_a: EntityId, body_b: EntityId) -> bool {
        self.bodies
            .get(body_a)
            .map(|body| {
                body.joint_edges().iter().all(|edge| {
                    edge.other != body_b
                        || self
                            .joints
                            .get(edge.joint)
                            .is_none_or(|joint| joint.collide_connected())
                })
            })
            .unwrap_or(true)
    }

    fn fixtures_should_collide(&self, fixture_a: EntityId, fixture_b: EntityId) -> bool {
        match (self.fixtures.get(fixture_a), self.fixtures.get(fixture_b)) {
            (Some(a), Some(b)) => a.filter().should_collide(&b.filter()),
            _ => false,
        }
    }

    /// Runs the narrow phase over every contact, destroying ones whose fat
    /// AABBs separated and notifying the listener of state changes.
    fn collide(
        &mut self,
        stats: &mut StepStats,
        listener: &mut Option<Box<dyn ContactListener>>,
    ) {
        let contact_ids: Vec<EntityId> = self.contacts.ids().collect();
        for contact_id in contact_ids {
            let Some(contact) = self.contacts.get(contact_id) else {
                continue;
            };
            let fixture_a_id = contact.fixture_a;
            let fixture_b_id = contact.fixture_b;
            let child_a = contact.child_a;
            let child_b = contact.child_b;
            let (Some(fixture_a), Some(fixture_b)) = (
                self.fixtures.get(fixture_a_id),
                self.fixtures.get(fixture_b_id),
            ) else {
                self.destroy_contact_with(contact_id, listener);
                stats.contacts_destroyed += 1;
                continue;
            };
            let body_a_id = fixture_a.body();
            let body_b_id = fixture_b.body();
            let body_a = self.bodies.get(body_a_id).unwrap();
            let body_b = self.bodies.get(body_b_id).unwrap();

            // Skip pairs with no active participant.
            let active_a = body_a.is_awake() && body_a.body_type() != BodyType::Static;
            let active_b = body_b.is_awake() && body_b.body_type() != BodyType::Static;
            if !active_a && !active_b {
                continue;
            }

            // Fat-AABB separation ends the contact.
            let proxy_a = fixture_a.proxies[child_a as usize];
            let proxy_b = fixture_b.proxies[child_b as usize];
            if !self
                .broadphase
                .fat_aabb(proxy_a)
                .overlaps(&self.broadphase.fat_aabb(proxy_b))
            {
                self.destroy_contact_with(contact_id, listener);
                stats.contacts_destroyed += 1;
                continue;
            }

            let sensor = fixture_a.is_sensor() || fixture_b.is_sensor();
            let shape_a = fixture_a.shared_shape();
            let shape_b = fixture_b.shared_shape();
            let xf_a = body_a.transform();
            let xf_b = body_b.transform();

            let was_touching = self.contacts.get(contact_id).unwrap().is_touching();
            let old_manifold;
            let now_touching;
            if sensor {
                now_touching = test_overlap(&shape_a, child_a, &xf_a, &shape_b, child_b, &xf_b);
                old_manifold = Manifold::default();
                self.contacts.get_mut(contact_id).unwrap().set_touching(now_touching);
            } else {
                let new_manifold =
                    manifold::evaluate(&shape_a, child_a, &xf_a, &shape_b, child_b, &xf_b);
                now_touching = new_manifold.point_count() > 0;
                old_manifold = self
                    .contacts
                    .get_mut(contact_id)
                    .unwrap()
                    .install_manifold(new_manifold);
            }
            stats.contacts_updated += 1;

            if was_touching != now_touching {
                if !sensor {
                    self.bodies.get_mut(body_a_id).unwrap().set_awake(true);
                    self.bodies.get_mut(body_b_id).unwrap().set_awake(true);
                }
                if let Some(listener) = listener.as_deref_mut() {
                    let contact = self.contacts.get(contact_id).unwrap();
                    if now_touching {
                        listener.begin_contact(contact);
                    } else {
                        listener.end_contact(contact);
                    }
                }
            }

            if now_touching && !sensor {
                if let Some(listener) = listener.as_deref_mut() {
                    let contact = self.contacts.get_mut(contact_id).unwrap();
                    listener.pre_solve(contact, &old_manifold);
                }
            }
        }
    }

    fn destroy_contact(&mut self, contact_id: EntityId) {
        let mut listener = self.listener.take();
        self.destroy_contact_with(contact_id, &mut listener);
        self.listener = listener;
    }

    fn destroy_contact_with(
        &mut self,
        contact_id: EntityId,
        listener: &mut Option<Box<dyn ContactListener>>,
    ) {
        let Some(contact) = self.contacts.get(contact_id) else {
            return;
        };
        let body_a = contact.body_a;
        let body_b = contact.body_b;
        let key = contact.key();
        let touching = contact.is_touching();
        let sensor = [contact.fixture_a, contact.fixture_b]
            .iter()
            .any(|id| self.fixtures.get(*id).is_some_and(|f| f.is_sensor()));

        if touching {
            if let Some(listener) = listener.as_deref_mut() {
                listener.end_contact(self.contacts.get(contact_id).unwrap());
            }
            if !sensor {
                if let Some(body) = self.bodies.get_mut(body_a) {
                    body.set_awake(true);
                }
                if let Some(body) = self.bodies.get_mut(body_b) {
                    body.set_awake(true);
                }
            }
        }

        for body_id in [body_a, body_b] {
            if let Some(body) = self.bodies.get_mut(body_id) {
                body.contact_edges.retain(|edge| edge.contact != contact_id);
            }
        }
        self.contact_keys.remove(&key);
        self.contacts.remove(contact_id);
    }

    // ----- regular solve --------------------------------------------------

    fn solve(
        &mut self,
        conf: &StepConf,
        stats: &mut StepStats,
        listener: &mut Option<Box<dyn ContactListener>>,
    ) {
        stats.min_separation = 0.0;

        // Fresh island stamps.
        for (_, body) in self.bodies.iter_mut() {
            body.island_index = None;
        }
        let contact_ids: Vec<EntityId> = self.contacts.ids().collect();
        for contact_id in &contact_ids {
            self.contacts.get_mut(*contact_id).unwrap().island_flag = false;
        }
        let mut islanded_joints: HashSet<EntityId> = HashSet::new();

        let seeds: Vec<EntityId> = self.bodies.ids().collect();
        let mut stack: Vec<EntityId> = Vec::new();
        for seed in seeds {
            {
                let body = self.bodies.get(seed).unwrap();
                if body.island_index.is_some()
                    || !body.is_awake()
                    || !body.is_enabled()
                    || body.body_type() == BodyType::Static
                {
                    continue;
                }
            }

            // Flood-fill one island from this seed.
            let mut island = std::mem::take(&mut self.island);
            island.clear();
            stack.clear();
            stack.push(seed);
            let index = island.add_body(seed);
            self.bodies.get_mut(seed).unwrap().island_index = Some(index);

            while let Some(body_id) = stack.pop() {
                self.bodies.get_mut(body_id).unwrap().set_awake(true);

                // Static bodies anchor islands without growing them.
                if self.bodies.get(body_id).unwrap().body_type() == BodyType::Static {
                    continue;
                }

                let contact_edges = self.bodies.get(body_id).unwrap().contact_edges().to_vec();
                for edge in contact_edges {
                    let Some(contact) = self.contacts.get(edge.contact) else {
                        continue;
                    };
                    if contact.island_flag || !contact.is_touching() || !contact.is_enabled() {
                        continue;
                    }
                    let sensor = [contact.fixture_a, contact.fixture_b]
                        .iter()
                        .any(|id| self.fixtures.get(*id).is_some_and(|f| f.is_sensor()));
                    if sensor {
                        continue;
                    }
                    self.contacts.get_mut(edge.contact).unwrap().island_flag = true;
                    island.add_contact(edge.contact);

                    let other = self.bodies.get_mut(edge.other).unwrap();
                    if other.island_index.is_none() {
                        let index = island.add_body(edge.other);
                        other.island_index = Some(index);
                        stack.push(edge.other);
                    }
                }

                let joint_edges = self.bodies.get(body_id).unwrap().joint_edges().to_vec();
                for edge in joint_edges {
                    if islanded_joints.contains(&edge.joint) || !self.joints.contains(edge.joint) {
                        continue;
                    }
                    let Some(other) = self.bodies.get_mut(edge.other) else {
                        continue;
                    };
                    if !other.is_enabled() {
                        continue;
                    }
                    islanded_joints.insert(edge.joint);
                    island.add_joint(edge.joint);
                    if other.island_index.is_none() {
                        let index = island.add_body(edge.other);
                        other.island_index = Some(index);
                        stack.push(edge.other);
                    }
                }
            }

            stats.islands_found += 1;
            let solved = self.solve_island(&island, conf, stats, listener);
            if solved {
                stats.islands_solved += 1;
            }

            // Static bodies may participate in several islands.
            for body_id in &island.bodies {
                let body = self.bodies.get_mut(*body_id).unwrap();
                if body.body_type() == BodyType::Static {
                    body.island_index = None;
                }
            }

            self.island = island;
        }

        // Refresh the broad phase for everything that moved, then look for
        // pairs entered along the swept paths so the TOI phase can see
        // contacts for fast bodies that crossed something this step.
        let moved: Vec<EntityId> = self
            .bodies
            .iter()
            .filter(|(_, body)| {
                body.island_index.is_some() && body.body_type() != BodyType::Static
            })
            .map(|(id, _)| id)
            .collect();
        for body_id in moved {
            stats.proxies_moved += self.synchronize_fixtures(body_id, conf.aabb_extension);
        }
        self.update_pairs(stats);
    }

    /// Solves one island: velocity integration, joint+contact velocity
    /// iterations, position integration with caps, position iterations,
    /// write-back, listener reporting, sleep. Returns whether the position
    /// solve converged.
    fn solve_island(
        &mut self,
        island: &Island,
        conf: &StepConf,
        stats: &mut StepStats,
        listener: &mut Option<Box<dyn ContactListener>>,
    ) -> bool {
        let dt = conf.delta_time;

        // Snapshot island bodies and integrate velocities.
        let mut bodies: Vec<BodyConstraint> = Vec::with_capacity(island.bodies.len());
        for body_id in &island.bodies {
            let body = self.bodies.get_mut(*body_id).unwrap();
            body.sweep.c0 = body.sweep.c;
            body.sweep.a0 = body.sweep.a;
            body.sweep.alpha0 = 0.0;

            let mut velocity = body.velocity;
            if body.body_type().is_accelerable() {
                velocity.linear +=
                    dt * (body.gravity_scale * self.gravity + body.linear_acceleration);
                velocity.angular += dt * body.angular_acceleration;
                velocity.linear *= 1.0 / (1.0 + dt * body.linear_damping);
                velocity.angular *= 1.0 / (1.0 + dt * body.angular_damping);
            }

            bodies.push(BodyConstraint {
                body: *body_id,
                inv_mass: body.inv_mass,
                inv_inertia: body.inv_inertia,
                local_center: body.sweep.local_center,
                position: Position {
                    c: body.sweep.c,
                    a: body.sweep.a,
                },
                velocity,
            });
        }

        // Contact solver constraints.
        let mut defs: Vec<ContactSolverDef> = Vec::with_capacity(island.contacts.len());
        for contact_id in &island.contacts {
            let contact = self.contacts.get(*contact_id).unwrap();
            let index_a = self.bodies.get(contact.body_a).unwrap().island_index.unwrap();
            let index_b = self.bodies.get(contact.body_b).unwrap().island_index.unwrap();
            let radius_a = self
                .fixtures
                .get(contact.fixture_a)
                .unwrap()
                .shape()
                .vertex_radius();
            let radius_b = self
                .fixtures
                .get(contact.fixture_b)
                .unwrap()
                .shape()
                .vertex_radius();
            defs.push(ContactSolverDef {
                contact: *contact_id,
                manifold: contact.manifold().clone(),
                index_a,
                index_b,
                friction: contact.friction(),
                restitution: contact.restitution(),
                tangent_speed: contact.tangent_speed,
                radius_a,
                radius_b,
            });
        }

        let dt_ratio = if conf.do_warm_start { dt * self.inv_dt0 } else { 0.0 };
        let mut solver = ContactSolver::new(defs, &bodies, dt_ratio);
        solver.initialize_velocity_constraints(&bodies, conf);
        if conf.do_warm_start {
            solver.warm_start(&mut bodies);
        }

        // Joint init (indices resolved through the island stamps).
        let joint_indices: Vec<(EntityId, usize, usize)> = island
            .joints
            .iter()
            .map(|joint_id| {
                let joint = self.joints.get(*joint_id).unwrap();
                let index_a = self.bodies.get(joint.body_a()).unwrap().island_index.unwrap();
                let index_b = self.bodies.get(joint.body_b()).unwrap().island_index.unwrap();
                (*joint_id, index_a, index_b)
            })
            .collect();
        for (joint_id, index_a, index_b) in &joint_indices {
            self.joints
                .get_mut(*joint_id)
                .unwrap()
                .init_velocity_constraints(&mut bodies, *index_a, *index_b, conf);
        }

        for _ in 0..conf.reg_velocity_iters {
            for (joint_id, _, _) in &joint_indices {
                self.joints
                    .get_mut(*joint_id)
                    .unwrap()
                    .solve_velocity_constraints(&mut bodies);
            }
            solver.solve_velocity_constraints(&mut bodies);
        }

        // Impulses feed next step's warm start and the post-solve listener.
        let impulses = solver.impulses();
        for (contact_id, impulse) in &impulses {
            let contact = self.contacts.get_mut(*contact_id).unwrap();
            let manifold = contact.manifold_mut();
            for (i, point) in manifold.points_mut().iter_mut().enumerate() {
                point.normal_impulse = impulse.normal[i];
                point.tangent_impulse = impulse.tangent[i];
            }
        }

        // Integrate positions under the translation/rotation caps.
        for body in &mut bodies {
            let mut velocity = body.velocity;
            let translation = dt * velocity.linear;
            if translation.length_squared() > conf.max_translation * conf.max_translation {
                velocity.linear *= conf.max_translation / translation.length();
            }
            let rotation = dt * velocity.angular;
            if rotation.abs() > conf.max_rotation {
                velocity.angular *= conf.max_rotation / rotation.abs();
            }
            body.velocity = velocity;
            body.position.c += dt * velocity.linear;
            body.position.a += dt * velocity.angular;
        }

        // Position iterations: both contacts and joints must report solved.
        let mut position_solved = false;
        for _ in 0..conf.reg_position_iters {
            let min_separation = solver.solve_position_constraints(
                &mut bodies,
                conf.baumgarte,
                conf.linear_slop,
                conf.max_linear_correction,
                None,
            );
            stats.min_separation = stats.min_separation.min(min_separation);
            let contacts_ok = min_separation >= -3.0 * conf.linear_slop;

            let mut joints_ok = true;
            for (joint_id, _, _) in &joint_indices {
                let ok = self
                    .joints
                    .get_mut(*joint_id)
                    .unwrap()
                    .solve_position_constraints(&mut bodies, conf);
                joints_ok = joints_ok && ok;
            }

            if contacts_ok && joints_ok {
                position_solved = true;
                break;
            }
        }

        // Write back.
        for constraint in &bodies {
            let body = self.bodies.get_mut(constraint.body).unwrap();
            body.sweep.c = constraint.position.c;
            body.sweep.a = constraint.position.a;
            body.velocity = constraint.velocity;
            body.synchronize_transform();
        }

        if let Some(listener) = listener.as_deref_mut() {
            for (contact_id, impulse) in &impulses {
                listener.post_solve(self.contacts.get(*contact_id).unwrap(), impulse);
            }
        }

        // Sleep pass: the island sleeps as a whole or not at all.
        if conf.allow_sleep {
            let mut min_under_active = f32::INFINITY;
            let lin_tol_sq = conf.linear_sleep_tolerance * conf.linear_sleep_tolerance;
            let ang_tol_sq = conf.angular_sleep_tolerance * conf.angular_sleep_tolerance;
            for body_id in &island.bodies {
                let body = self.bodies.get_mut(*body_id).unwrap();
                if !body.body_type().is_speedable() {
                    continue;
                }
                if !body.auto_sleep
                    || body.velocity.angular * body.velocity.angular > ang_tol_sq
                    || body.velocity.linear.length_squared() > lin_tol_sq
                {
                    body.under_active_time = 0.0;
                    min_under_active = 0.0;
                } else {
                    body.under_active_time += dt;
                    min_under_active = min_under_active.min(body.under_active_time);
                }
            }

            if min_under_active >= conf.min_still_time_to_sleep && position_solved {
                for body_id in &island.bodies {
                    let body = self.bodies.get_mut(*body_id).unwrap();
                    if body.body_type().is_speedable() {
                        body.set_awake(false);
                        stats.bodies_slept += 1;
                    }
                }
            }
        }

        position_solved
    }

    // ----- continuous solve -----------------------------------------------

    fn solve_toi(
        &mut self,
        conf: &StepConf,
        stats: &mut StepStats,
        listener: &mut Option<Box<dyn ContactListener>>,
    ) {
        // Fresh sub-step state.
        for (_, body) in self.bodies.iter_mut() {
            body.sweep.alpha0 = 0.0;
            body.island_index = None;
        }
        let all_contacts: Vec<EntityId> = self.contacts.ids().collect();
        for contact_id in &all_contacts {
            let contact = self.contacts.get_mut(*contact_id).unwrap();
            contact.island_flag = false;
            contact.toi_valid = false;
            contact.toi_substep_count = 0;
        }

        for _ in 0..conf.max_substeps {
            // Find the minimum-TOI contact.
            let mut min_contact: Option<EntityId> = None;
            let mut min_alpha = 1.0f32;

            let candidates: Vec<EntityId> = self.contacts.ids().collect();
            for contact_id in candidates {
                let contact = self.contacts.get(contact_id).unwrap();
                if !contact.is_enabled() {
                    continue;
                }
                if contact.toi_substep_count > conf.max_substeps {
                    continue;
                }
                let alpha = if contact.toi_valid {
                    contact.toi
                } else {
                    let Some(alpha) = self.compute_contact_toi(contact_id, conf) else {
                        continue;
                    };
                    alpha
                };
                if alpha < min_alpha {
                    min_alpha = alpha;
                    min_contact = Some(contact_id);
                }
            }

            let Some(contact_id) = min_contact else {
                // No impact in the remainder of the step.
                break;
            };
            if min_alpha >= 1.0 {
                break;
            }

            // Advance the impacting bodies to the TOI and refresh the
            // contact there.
            let contact = self.contacts.get(contact_id).unwrap();
            let body_a_id = contact.body_a;
            let body_b_id = contact.body_b;
            let backup_a = self.bodies.get(body_a_id).unwrap().sweep;
            let backup_b = self.bodies.get(body_b_id).unwrap().sweep;

            self.bodies.get_mut(body_a_id).unwrap().advance_to(min_alpha);
            self.bodies.get_mut(body_b_id).unwrap().advance_to(min_alpha);

            self.update_single_contact(contact_id, listener);
            {
                let contact = self.contacts.get_mut(contact_id).unwrap();
                contact.toi_valid = false;
                contact.toi_substep_count += 1;
            }

            let contact = self.contacts.get(contact_id).unwrap();
            if !contact.is_enabled() || !contact.is_touching() {
                // The TOI was spurious; roll the sweeps back.
                self.contacts.get_mut(contact_id).unwrap().set_enabled(false);
                let body_a = self.bodies.get_mut(body_a_id).unwrap();
                body_a.sweep = backup_a;
                body_a.synchronize_transform();
                let body_b = self.bodies.get_mut(body_b_id).unwrap();
                body_b.sweep = backup_b;
                body_b.synchronize_transform();
                continue;
            }

            self.bodies.get_mut(body_a_id).unwrap().set_awake(true);
            self.bodies.get_mut(body_b_id).unwrap().set_awake(true);

            // Mini island: the impact pair plus everything dragged in
            // through touching contacts (joints do not propagate here).
            let mut island = std::mem::take(&mut self.island);
            island.clear();
            let index_a = island.add_body(body_a_id);
            self.bodies.get_mut(body_a_id).unwrap().island_index = Some(index_a);
            let index_b = island.add_body(body_b_id);
            self.bodies.get_mut(body_b_id).unwrap().island_index = Some(index_b);
            island.add_contact(contact_id);
            self.contacts.get_mut(contact_id).unwrap().island_flag = true;

            for seed in [body_a_id, body_b_id] {
                if self.bodies.get(seed).unwrap().body_type() != BodyType::Dynamic {
                    continue;
                }
                let seed_is_bullet = self.bodies.get(seed).unwrap().is_bullet();
                let seed_edges = self.bodies.get(seed).unwrap().contact_edges().to_vec();
                for edge in seed_edges {
                    let Some(edge_contact) = self.contacts.get(edge.contact) else {
                        continue;
                    };
                    if edge_contact.island_flag {
                        continue;
                    }
                    let other_id = edge.other;
                    let other = self.bodies.get(other_id).unwrap();
                    // Regular dynamic-dynamic pairs are left to the discrete
                    // solver unless a bullet is involved.
                    if other.body_type() == BodyType::Dynamic
                        && !seed_is_bullet
                        && !other.is_bullet()
                    {
                        continue;
                    }
                    let sensor = [edge_contact.fixture_a, edge_contact.fixture_b]
                        .iter()
                        .any(|id| self.fixtures.get(*id).is_some_and(|f| f.is_sensor()));
                    if sensor {
                        continue;
                    }

                    // Tentatively advance the neighbor to the TOI before
                    // re-evaluating the contact.
                    let other_islanded = self.bodies.get(other_id).unwrap().island_index.is_some();
                    let backup_other = self.bodies.get(other_id).unwrap().sweep;
                    if !other_islanded {
                        self.bodies.get_mut(other_id).unwrap().advance_to(min_alpha);
                    }
                    self.update_single_contact(edge.contact, listener);

                    let edge_contact = self.contacts.get(edge.contact).unwrap();
                    if !edge_contact.is_enabled() || !edge_contact.is_touching() {
                        if !other_islanded {
                            let other = self.bodies.get_mut(other_id).unwrap();
                            other.sweep = backup_other;
                            other.synchronize_transform();
                        }
                        continue;
                    }

                    self.contacts.get_mut(edge.contact).unwrap().island_flag = true;
                    island.add_contact(edge.contact);
                    if !other_islanded {
                        let index = island.add_body(other_id);
                        let other = self.bodies.get_mut(other_id).unwrap();
                        other.island_index = Some(index);
                        if other.body_type().is_speedable() {
                            other.set_awake(true);
                        }
                        // Only dynamic neighbors propagate no further; the
                        // mini island stays local to the impact.
                    }
                }
            }

            let sub_dt = (1.0 - min_alpha) * conf.delta_time;
            self.solve_toi_island(&island, (index_a, index_b), sub_dt, conf, listener);
            stats.toi_islands += 1;

            // Reset island membership and invalidate cached TOIs touching
            // the moved bodies.
            for body_id in &island.bodies {
                let body = self.bodies.get_mut(*body_id).unwrap();
                body.island_index = None;
                if body.body_type() != BodyType::Dynamic {
                    continue;
                }
                stats.proxies_moved += self.synchronize_fixtures(*body_id, conf.aabb_extension);
                let edges = self.bodies.get(*body_id).unwrap().contact_edges().to_vec();
                for edge in edges {
                    if let Some(contact) = self.contacts.get_mut(edge.contact) {
                        contact.toi_valid = false;
                        contact.island_flag = false;
                    }
                }
            }
            self.island = island;
        }
    }

    /// TOI for one contact from the bodies' current sweeps; returns the
    /// absolute step fraction, caching it on the contact.
    fn compute_contact_toi(&mut self, contact_id: EntityId, conf: &StepConf) -> Option<f32> {
        let contact = self.contacts.get(contact_id).unwrap();
        let fixture_a = self.fixtures.get(contact.fixture_a)?;
        let fixture_b = self.fixtures.get(contact.fixture_b)?;
        if fixture_a.is_sensor() || fixture_b.is_sensor() {
            return None;
        }
        let body_a = self.bodies.get(contact.body_a)?;
        let body_b = self.bodies.get(contact.body_b)?;
        let type_a = body_a.body_type();
        let type_b = body_b.body_type();

        if type_a != BodyType::Dynamic && type_b != BodyType::Dynamic {
            return None;
        }
        let active_a = body_a.is_awake() && type_a != BodyType::Static;
        let active_b = body_b.is_awake() && type_b != BodyType::Static;
        if !active_a && !active_b {
            return None;
        }
        // CCD only runs against bullets and non-dynamic bodies.
        let ccd_a = body_a.is_bullet() || type_a != BodyType::Dynamic;
        let ccd_b = body_b.is_bullet() || type_b != BodyType::Dynamic;
        if !ccd_a && !ccd_b {
            return None;
        }

        // Line the sweeps up at the later of the two start times.
        let alpha0 = body_a.sweep.alpha0.max(body_b.sweep.alpha0);
        if alpha0 >= 1.0 {
            return None;
        }
        let mut sweep_a = body_a.sweep;
        let mut sweep_b = body_b.sweep;
        if sweep_a.alpha0 < alpha0 {
            sweep_a.advance(alpha0);
        }
        if sweep_b.alpha0 < alpha0 {
            sweep_b.advance(alpha0);
        }

        let proxy_a = fixture_a.shape().distance_proxy(contact.child_a);
        let proxy_b = fixture_b.shape().distance_proxy(contact.child_b);
        let output = time_of_impact(
            &proxy_a,
            &sweep_a,
            &proxy_b,
            &sweep_b,
            ToiConf {
                t_max: 1.0,
                target_depth: conf.target_depth(),
                tolerance: conf.toi_tolerance(),
                max_toi_iters: conf.max_toi_iters,
                max_root_iters: conf.max_root_iters,
                max_dist_iters: conf.max_distance_iters,
            },
        );

        // Unknown/diagnostic states mean "no impact inside this window".
        let alpha = if output.state == ToiState::Touching {
            (alpha0 + (1.0 - alpha0) * output.t).min(1.0)
        } else {
            1.0
        };
        let contact = self.contacts.get_mut(contact_id).unwrap();
        contact.toi = alpha;
        contact.toi_valid = true;
        Some(alpha)
    }

    /// Narrow-phase refresh of one contact outside the main collide pass
    /// (used by the TOI loop after advancing sweeps).
    fn update_single_contact(
        &mut self,
        contact_id: EntityId,
        listener: &mut Option<Box<dyn ContactListener>>,
    ) {
        let Some(contact) = self.contacts.get(contact_id) else {
            return;
        };
        let (fixture_a_id, fixture_b_id) = (contact.fixture_a, contact.fixture_b);
        let (child_a, child_b) = (contact.child_a, contact.child_b);
        let (Some(fixture_a), Some(fixture_b)) = (
            self.fixtures.get(fixture_a_id),
            self.fixtures.get(fixture_b_id),
        ) else {
            return;
        };
        let sensor = fixture_a.is_sensor() || fixture_b.is_sensor();
        let shape_a = fixture_a.shared_shape();
        let shape_b = fixture_b.shared_shape();
        let body_a_id = fixture_a.body();
        let body_b_id = fixture_b.body();
        let xf_a = self.bodies.get(body_a_id).unwrap().transform();
        let xf_b = self.bodies.get(body_b_id).unwrap().transform();

        let was_touching = contact.is_touching();
        let old_manifold;
        let now_touching;
        if sensor {
            now_touching = test_overlap(&shape_a, child_a, &xf_a, &shape_b, child_b, &xf_b);
            old_manifold = Manifold::default();
            self.contacts.get_mut(contact_id).unwrap().set_touching(now_touching);
        } else {
            let new_manifold = manifold::evaluate(&shape_a, child_a, &xf_a, &shape_b, child_b, &xf_b);
            now_touching = new_manifold.point_count() > 0;
            old_manifold = self
                .contacts
                .get_mut(contact_id)
                .unwrap()
                .install_manifold(new_manifold);
        }

        if was_touching != now_touching {
            if !sensor {
                self.bodies.get_mut(body_a_id).unwrap().set_awake(true);
                self.bodies.get_mut(body_b_id).unwrap().set_awake(true);
            }
            if let Some(listener) = listener.as_deref_mut() {
                let contact = self.contacts.get(contact_id).unwrap();
                if now_touching {
                    listener.begin_contact(contact);
                } else {
                    listener.end_contact(contact);
                }
            }
        }
        if now_touching && !sensor {
            if let Some(listener) = listener.as_deref_mut() {
                let contact = self.contacts.get_mut(contact_id).unwrap();
                listener.pre_solve(contact, &old_manifold);
            }
        }
    }

    /// Solves a TOI mini island: position first (pushing the impact apart at
    /// the sub-time), then velocity without warm starting, then integrates
    /// the remainder of the step.
    fn solve_toi_island(
        &mut self,
        island: &Island,
        toi_pair: (usize, usize),
        sub_dt: f32,
        conf: &StepConf,
        listener: &mut Option<Box<dyn ContactListener>>,
    ) {
        let mut bodies: Vec<BodyConstraint> = island
            .bodies
            .iter()
            .map(|body_id| {
                let body = self.bodies.get(*body_id).unwrap();
                BodyConstraint {
                    body: *body_id,
                    inv_mass: body.inv_mass,
                    inv_inertia: body.inv_inertia,
                    local_center: body.sweep.local_center,
                    position: Position {
                        c: body.sweep.c,
                        a: body.sweep.a,
                    },
                    velocity: body.velocity,
                }
            })
            .collect();

        let mut defs: Vec<ContactSolverDef> = Vec::with_capacity(island.contacts.len());
        for contact_id in &island.contacts {
            let contact = self.contacts.get(*contact_id).unwrap();
            let index_a = self.bodies.get(contact.body_a).unwrap().island_index.unwrap();
            let index_b = self.bodies.get(contact.body_b).unwrap().island_index.unwrap();
            defs.push(ContactSolverDef {
                contact: *contact_id,
                manifold: contact.manifold().clone(),
                index_a,
                index_b,
                friction: contact.friction(),
                restitution: contact.restitution(),
                tangent_speed: contact.tangent_speed,
                radius_a: self
                    .fixtures
                    .get(contact.fixture_a)
                    .unwrap()
                    .shape()
                    .vertex_radius(),
                radius_b: self
                    .fixtures
                    .get(contact.fixture_b)
                    .unwrap()
                    .shape()
                    .vertex_radius(),
            });
        }
        let mut solver = ContactSolver::new(defs, &bodies, 0.0);

        // Resolve the penetration at the sub-time.
        for _ in 0..conf.toi_position_iters {
            let min_separation = solver.solve_position_constraints(
                &mut bodies,
                conf.toi_baumgarte,
                conf.linear_slop,
                conf.max_linear_correction,
                Some(toi_pair),
            );
            if min_separation >= -1.5 * conf.linear_slop {
                break;
            }
        }

        // The impact positions become the sweep start for the remainder of
        // the step.
        for constraint in &bodies {
            let body = self.bodies.get_mut(constraint.body).unwrap();
            body.sweep.c0 = constraint.position.c;
            body.sweep.a0 = constraint.position.a;
        }

        // Velocity solve at the impact; warm-start impulses were already
        // spent by the discrete phase.
        solver.initialize_velocity_constraints(&bodies, conf);
        for _ in 0..conf.toi_velocity_iters {
            solver.solve_velocity_constraints(&mut bodies);
        }

        // Integrate out the rest of the step.
        for constraint in &mut bodies {
            let mut velocity = constraint.velocity;
            let translation = sub_dt * velocity.linear;
            if translation.length_squared() > conf.max_translation * conf.max_translation {
                velocity.linear *= conf.max_translation / translation.length();
            }
            let rotation = sub_dt * velocity.angular;
            if rotation.abs() > conf.max_rotation {
                velocity.angular *= conf.max_rotation / rotation.abs();
            }
            constraint.velocity = velocity;
            constraint.position.c += sub_dt * velocity.linear;
            constraint.position.a += sub_dt * velocity.angular;

            let body = self.bodies.get_mut(constraint.body).unwrap();
            body.sweep.c = constraint.position.c;
            body.sweep.a = constraint.position.a;
            body.velocity = constraint.velocity;
            body.synchronize_transform();
        }

        if let Some(listener) = listener.as_deref_mut() {
            for (contact_id, impulse) in solver.impulses() {
                listener.post_solve(self.contacts.get(contact_id).unwrap(), &impulse);
            }
        }
    }

    // ----- proxies --------------------------------------------------------

    fn create_fixture_proxies(&mut self, fixture_id: EntityId) {
        let fixture = self.fixtures.get(fixture_id).unwrap();
        let body = self.bodies.get(fixture.body()).unwrap();
        let xf = body.transform();
        let shape = fixture.shared_shape();
        let mut proxies = Vec::with_capacity(shape.child_count() as usize);
        for child in 0..shape.child_count() {
            let aabb = shape.compute_aabb(&xf, child);
            proxies.push(self.broadphase.create_proxy(
                aabb,
                crate::config::AABB_EXTENSION,
                ProxyData {
                    fixture: fixture_id,
                    child,
                },
            ));
        }
        self.fixtures.get_mut(fixture_id).unwrap().proxies = proxies;
    }

    fn destroy_fixture_proxies(&mut self, fixture_id: EntityId) {
        let Some(fixture) = self.fixtures.get_mut(fixture_id) else {
            return;
        };
        let proxies = std::mem::take(&mut fixture.proxies);
        for proxy in proxies {
            self.broadphase.destroy_proxy(proxy);
        }
    }

    /// Refreshes a body's proxies to cover the swept motion from the sweep
    /// start to the current transform. Returns how many proxies moved.
    fn synchronize_fixtures(&mut self, body_id: EntityId, extension: f32) -> usize {
        let body = self.bodies.get(body_id).unwrap();
        let xf1 = body.sweep.transform(body.sweep.alpha0);
        let xf2 = body.transform();
        let displacement = body.sweep.c - body.sweep.c0;
        let fixtures = body.fixtures.clone();

        let mut moved = 0;
        for fixture_id in fixtures {
            let fixture = self.fixtures.get(fixture_id).unwrap();
            let shape = fixture.shared_shape();
            let proxies = fixture.proxies.clone();
            for (child, proxy) in proxies.iter().enumerate() {
                let aabb1 = shape.compute_aabb(&xf1, child as u32);
                let aabb2 = shape.compute_aabb(&xf2, child as u32);
                let swept = aabb1.union(&aabb2);
                self.broadphase.update_proxy(
                    *proxy,
                    swept,
                    displacement,
                    AABB_MULTIPLIER,
                    extension.max(crate::config::AABB_EXTENSION),
                );
                moved += 1;
            }
        }
        moved
    }

    fn reset_mass_data(&mut self, body_id: EntityId) {
        let body = self.bodies.get(body_id).unwrap();
        let mut total = MassData::default();
        for fixture_id in &body.fixtures {
            let fixture = self.fixtures.get(*fixture_id).unwrap();
            if fixture.density() == 0.0 {
                continue;
            }
            let data = fixture.shape().mass_data(fixture.density());
            let combined_mass = total.mass + data.mass;
            if combined_mass > 0.0 {
                total.center = (total.center * total.mass + data.center * data.mass) / combined_mass;
            }
            total.mass = combined_mass;
            total.inertia += data.inertia;
        }
        self.bodies.get_mut(body_id).unwrap().set_mass_data(&total);
    }

    /// Total kinetic energy of all awake bodies; handy for validation.
    pub fn kinetic_energy(&self) -> f32 {
        self.bodies
            .iter()
            .filter(|(_, body)| body.is_awake())
            .map(|(_, body)| {
                let Velocity { linear, angular } = body.velocity();
                let mass = body.mass();
                let inertia = if body.inv_inertia() > 0.0 {
                    1.0 / body.inv_inertia()
                } else {
                    0.0
                };
                0.5 * mass * linear.length_squared() + 0.5 * inertia * angular * angular
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::body::RigidBody;

    #[test]
    fn structural_mutation_is_rejected_while_locked() {
        let mut world = World::default();
        world.locked = true;
        assert_eq!(
            world.create_body(RigidBody::new(BodyType::Dynamic)),
            Err(PhysicsError::Locked)
        );
        let err = world.shift_origin(Vec2::ONE).unwrap_err();
        assert_eq!(err, PhysicsError::Locked);
        world.locked = false;
        assert!(world.create_body(RigidBody::new(BodyType::Dynamic)).is_ok());
    }

    #[test]
    fn joined_bodies_do_not_collide_by_default() {
        let mut world = World::new(Vec2::ZERO);
        let a = world.create_body(RigidBody::new(BodyType::Dynamic)).unwrap();
        let b = world.create_body(RigidBody::new(BodyType::Dynamic)).unwrap();
        world
            .create_fixture(a, FixtureDef::new(Shape::circle(1.0).unwrap()))
            .unwrap();
        world
            .create_fixture(b, FixtureDef::new(Shape::circle(1.0).unwrap()))
            .unwrap();
        world
            .create_joint(Joint::Revolute(crate::dynamics::joints::RevoluteJoint::new(
                a,
                Vec2::ZERO,
                b,
                Vec2::ZERO,
            )))
            .unwrap();

        world.step(&StepConf::default()).unwrap();
        assert_eq!(world.contact_count(), 0);
    }

    #[test]
    fn fixture_validation_rejects_bad_materials() {
        let mut world = World::default();
        let body = world.create_body(RigidBody::new(BodyType::Dynamic)).unwrap();
        let def = FixtureDef::new(Shape::circle(1.0).unwrap()).density(-1.0);
        assert!(matches!(
            world.create_fixture(body, def),
            Err(PhysicsError::InvalidArgument(_))
        ));
    }
}
