use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    collision::shapes::Shape,
    core::PhysicsError,
    utils::allocator::EntityId,
};

/// Collision filtering data: two fixtures collide when each one's mask admits
/// the other's category, unless a shared positive group forces collision or a
/// shared negative group forbids it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub category_bits: u16,
    pub mask_bits: u16,
    pub group_index: i16,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            category_bits: 0x0001,
            mask_bits: 0xFFFF,
            group_index: 0,
        }
    }
}

impl Filter {
    pub fn should_collide(&self, other: &Filter) -> bool {
        if self.group_index == other.group_index && self.group_index != 0 {
            return self.group_index > 0;
        }
        (self.mask_bits & other.category_bits) != 0
            && (other.mask_bits & self.category_bits) != 0
    }
}

/// Definition used to create a fixture on a body.
#[derive(Debug, Clone)]
pub struct FixtureDef {
    pub shape: Arc<Shape>,
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
    pub filter: Filter,
    pub is_sensor: bool,
}

impl FixtureDef {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape: Arc::new(shape),
            density: 1.0,
            friction: 0.2,
            restitution: 0.0,
            filter: Filter::default(),
            is_sensor: false,
        }
    }

    pub fn density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    pub fn friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn sensor(mut self, is_sensor: bool) -> Self {
        self.is_sensor = is_sensor;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), PhysicsError> {
        if !(self.density.is_finite() && self.density >= 0.0) {
            return Err(PhysicsError::InvalidArgument("density must be non-negative"));
        }
        if !(self.friction.is_finite() && self.friction >= 0.0) {
            return Err(PhysicsError::InvalidArgument("friction must be non-negative"));
        }
        if !self.restitution.is_finite() {
            return Err(PhysicsError::InvalidArgument("restitution must be finite"));
        }
        Ok(())
    }
}

/// A shape attached to a body with material and filter data. The shape is
/// shared and immutable; the fixture owns one broad-phase proxy per convex
/// child.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub(crate) body: EntityId,
    pub(crate) shape: Arc<Shape>,
    pub(crate) density: f32,
    pub friction: f32,
    pub restitution: f32,
    filter: Filter,
    is_sensor: bool,
    /// Broad-phase proxy id per child, empty while the body is disabled.
    pub(crate) proxies: Vec<u32>,
}

impl Fixture {
    pub(crate) fn new(body: EntityId, def: &FixtureDef) -> Self {
        Self {
            body,
            shape: Arc::clone(&def.shape),
            density: def.density,
            friction: def.friction,
            restitution: def.restitution,
            filter: def.filter,
            is_sensor: def.is_sensor,
            proxies: Vec::new(),
        }
    }

    pub fn body(&self) -> EntityId {
        self.body
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn shared_shape(&self) -> Arc<Shape> {
        Arc::clone(&self.shape)
    }

    pub fn density(&self) -> f32 {
        self.density
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    /// Broad-phase proxy ids, one per convex child of the shape.
    pub fn proxies(&self) -> &[u32] {
        &self.proxies
    }

    pub(crate) fn set_filter_internal(&mut self, filter: Filter) {
        self.filter = filter;
    }

    pub(crate) fn set_sensor_internal(&mut self, is_sensor: bool) {
        self.is_sensor = is_sensor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_groups_override_masks() {
        let mut a = Filter::default();
        let mut b = Filter::default();
        assert!(a.should_collide(&b));

        a.group_index = -3;
        b.group_index = -3;
        assert!(!a.should_collide(&b));

        a.group_index = 3;
        b.group_index = 3;
        a.mask_bits = 0;
        assert!(a.should_collide(&b));
    }

    #[test]
    fn filter_masks_are_symmetric() {
        let a = Filter {
            category_bits: 0x0002,
            mask_bits: 0x0004,
            group_index: 0,
        };
        let b = Filter {
            category_bits: 0x0004,
            mask_bits: 0x0002,
            group_index: 0,
        };
        let c = Filter {
            category_bits: 0x0004,
            mask_bits: 0x0008,
            group_index: 0,
        };
        assert!(a.should_collide(&b));
        assert!(!a.should_collide(&c));
    }
}
