//! Momentum2D – a continuous-collision 2-D rigid body physics engine.
//!
//! The crate is built around a dynamic-AABB-tree broad phase, GJK distance
//! queries with simplex caching, conservative-advancement time-of-impact,
//! and a warm-started sequential-impulse contact solver, orchestrated per
//! step by [`World`].

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod utils;
pub mod world;

pub use glam::{Mat2, Vec2};

pub use collision::{
    broadphase::{BroadPhase, DynamicTree},
    contact::{Contact, ContactKey},
    manifold::{Manifold, ManifoldType, WorldManifold},
    queries::RayCastHit,
    shapes::Shape,
    Aabb,
};
pub use config::StepConf;
pub use crate::core::{
    body::{BodyType, RigidBody, RigidBodyBuilder},
    fixture::{Filter, FixtureDef},
    types::{MassData, Transform, Velocity},
    PhysicsError,
};
pub use dynamics::{
    joints::{DistanceJoint, Joint, RevoluteJoint},
    solver::ContactImpulses,
};
pub use utils::allocator::EntityId;
pub use world::{ContactListener, StepStats, World, WorldBuilder};

/// High-level convenience wrapper that owns a [`World`] and steps it with a
/// fixed configuration.
pub struct PhysicsEngine {
    world: World,
    conf: StepConf,
}

impl PhysicsEngine {
    /// Creates an engine stepping at the provided fixed timestep.
    pub fn new(timestep: f32) -> Self {
        Self {
            world: World::default(),
            conf: StepConf::default().with_delta_time(timestep),
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn conf_mut(&mut self) -> &mut StepConf {
        &mut self.conf
    }

    /// Adds a rigid body and returns its id.
    pub fn add_body(&mut self, body: RigidBody) -> Result<EntityId, PhysicsError> {
        self.world.create_body(body)
    }

    /// Attaches a fixture to a body and returns its id.
    pub fn add_fixture(
        &mut self,
        body: EntityId,
        def: FixtureDef,
    ) -> Result<EntityId, PhysicsError> {
        self.world.create_fixture(body, def)
    }

    /// Advances the simulation by one fixed step.
    pub fn step(&mut self) -> Result<StepStats, PhysicsError> {
        self.world.step(&self.conf)
    }
}
