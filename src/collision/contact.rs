//! Contacts: edges of the body-contact graph. Each contact owns the manifold
//! for one pair of fixture children plus solver mixing data and its TOI
//! cache.

use crate::{
    collision::manifold::Manifold,
    core::types::{mix_friction, mix_restitution},
    utils::allocator::EntityId,
};

/// Canonical identity of a contact: the two (fixture, child) halves ordered
/// so that `(a, b)` and `(b, a)` compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContactKey {
    pub fixture_a: EntityId,
    pub child_a: u32,
    pub fixture_b: EntityId,
    pub child_b: u32,
}

impl ContactKey {
    pub fn new(fixture_a: EntityId, child_a: u32, fixture_b: EntityId, child_b: u32) -> Self {
        if (fixture_a, child_a) <= (fixture_b, child_b) {
            Self {
                fixture_a,
                child_a,
                fixture_b,
                child_b,
            }
        } else {
            Self {
                fixture_a: fixture_b,
                child_a: child_b,
                fixture_b: fixture_a,
                child_b: child_a,
            }
        }
    }
}

/// A persistent contact between two fixture children.
///
/// The fixture order is the canonical manifold-dispatch order (reference
/// shape first), fixed at creation; [`ContactKey`] equality is order-free.
#[derive(Debug, Clone)]
pub struct Contact {
    pub(crate) fixture_a: EntityId,
    pub(crate) child_a: u32,
    pub(crate) fixture_b: EntityId,
    pub(crate) child_b: u32,
    pub(crate) body_a: EntityId,
    pub(crate) body_b: EntityId,
    manifold: Manifold,
    touching: bool,
    enabled: bool,
    pub(crate) island_flag: bool,
    /// Cached TOI for the current step, valid until a body in the pair is
    /// moved by a TOI solve.
    pub(crate) toi_valid: bool,
    pub(crate) toi: f32,
    pub(crate) toi_substep_count: u32,
    friction: f32,
    restitution: f32,
    /// Surface translation speed along the tangent (conveyor belts).
    pub tangent_speed: f32,
}

impl Contact {
    pub(crate) fn new(
        fixture_a: EntityId,
        child_a: u32,
        body_a: EntityId,
        fixture_b: EntityId,
        child_b: u32,
        body_b: EntityId,
        friction_a: f32,
        friction_b: f32,
        restitution_a: f32,
        restitution_b: f32,
    ) -> Self {
        Self {
            fixture_a,
            child_a,
            fixture_b,
            child_b,
            body_a,
            body_b,
            manifold: Manifold::default(),
            touching: false,
            enabled: true,
            island_flag: false,
            toi_valid: false,
            toi: 1.0,
            toi_substep_count: 0,
            friction: mix_friction(friction_a, friction_b),
            restitution: mix_restitution(restitution_a, restitution_b),
            tangent_speed: 0.0,
        }
    }

    pub fn key(&self) -> ContactKey {
        ContactKey::new(self.fixture_a, self.child_a, self.fixture_b, self.child_b)
    }

    pub fn fixture_a(&self) -> EntityId {
        self.fixture_a
    }

    pub fn fixture_b(&self) -> EntityId {
        self.fixture_b
    }

    pub fn child_a(&self) -> u32 {
        self.child_a
    }

    pub fn child_b(&self) -> u32 {
        self.child_b
    }

    pub fn body_a(&self) -> EntityId {
        self.body_a
    }

    pub fn body_b(&self) -> EntityId {
        self.body_b
    }

    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    pub(crate) fn manifold_mut(&mut self) -> &mut Manifold {
        &mut self.manifold
    }

    pub fn is_touching(&self) -> bool {
        self.touching
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Listeners may disable a contact from `pre_solve`; the flag is restored
    /// on the next update.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    /// Per-contact friction override, kept until the next `reset_friction`.
    pub fn set_friction(&mut self, friction: f32) {
        self.friction = friction;
    }

    /// Re-mixes friction from the fixtures' current materials.
    pub fn reset_friction(&mut self, friction_a: f32, friction_b: f32) {
        self.friction = mix_friction(friction_a, friction_b);
    }

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    pub fn set_restitution(&mut self, restitution: f32) {
        self.restitution = restitution;
    }

    pub fn reset_restitution(&mut self, restitution_a: f32, restitution_b: f32) {
        self.restitution = mix_restitution(restitution_a, restitution_b);
    }

    pub fn toi(&self) -> f32 {
        self.toi
    }

    /// Installs a freshly generated manifold, carrying accumulated impulses
    /// over from old points with matching contact features, and refreshes the
    /// touching state. Returns the previous manifold.
    pub(crate) fn install_manifold(&mut self, mut new_manifold: Manifold) -> Manifold {
        for new_point in new_manifold.points_mut() {
            if let Some(old_point) = self
                .manifold
                .points()
                .iter()
                .find(|old| old.feature == new_point.feature)
            {
                new_point.normal_impulse = old_point.normal_impulse;
                new_point.tangent_impulse = old_point.tangent_impulse;
            }
        }
        self.touching = new_manifold.point_count() > 0;
        self.enabled = true;
        std::mem::replace(&mut self.manifold, new_manifold)
    }

    /// Overwrites the touching state without touching the manifold; sensors
    /// track overlap but never carry contact points.
    pub(crate) fn set_touching(&mut self, touching: bool) {
        self.touching = touching;
        self.enabled = true;
        self.manifold = Manifold::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::manifold::{ContactFeature, ManifoldPoint, ManifoldType};
    use crate::utils::allocator::EntityId;
    use glam::Vec2;

    fn feature(index_b: u8) -> ContactFeature {
        ContactFeature {
            index_b,
            ..Default::default()
        }
    }

    fn test_contact() -> Contact {
        Contact::new(
            EntityId::new(0, 0),
            0,
            EntityId::new(10, 0),
            EntityId::new(1, 0),
            0,
            EntityId::new(11, 0),
            0.5,
            0.5,
            0.2,
            0.6,
        )
    }

    #[test]
    fn keys_are_order_free() {
        let a = EntityId::new(3, 0);
        let b = EntityId::new(7, 1);
        assert_eq!(ContactKey::new(a, 0, b, 2), ContactKey::new(b, 2, a, 0));
        assert_ne!(ContactKey::new(a, 0, b, 2), ContactKey::new(a, 1, b, 2));
    }

    #[test]
    fn mixing_follows_reference_rules() {
        let contact = test_contact();
        assert!((contact.friction() - 0.5).abs() < 1e-6);
        assert!((contact.restitution() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn impulses_carry_over_matching_features() {
        let mut contact = test_contact();

        let mut first = Manifold::default();
        first.kind = ManifoldType::FaceA;
        first.push_point(ManifoldPoint {
            local_point: Vec2::ZERO,
            normal_impulse: 2.5,
            tangent_impulse: -1.0,
            feature: feature(0),
        });
        first.push_point(ManifoldPoint {
            local_point: Vec2::X,
            normal_impulse: 4.0,
            tangent_impulse: 0.5,
            feature: feature(1),
        });
        contact.install_manifold(first);
        // Simulate the solver having stored impulses.
        contact.manifold_mut().points_mut()[0].normal_impulse = 2.5;

        // Next step: point order flips, one feature survives.
        let mut second = Manifold::default();
        second.kind = ManifoldType::FaceA;
        second.push_point(ManifoldPoint {
            local_point: Vec2::X,
            feature: feature(1),
            ..Default::default()
        });
        second.push_point(ManifoldPoint {
            local_point: Vec2::Y,
            feature: feature(2),
            ..Default::default()
        });
        contact.install_manifold(second);

        let points = contact.manifold().points();
        assert_eq!(points[0].normal_impulse, 4.0);
        assert_eq!(points[0].tangent_impulse, 0.5);
        assert_eq!(points[1].normal_impulse, 0.0);
        assert!(contact.is_touching());
    }

    #[test]
    fn empty_manifold_clears_touching() {
        let mut contact = test_contact();
        let mut touching = Manifold::default();
        touching.push_point(ManifoldPoint::default());
        contact.install_manifold(touching);
        assert!(contact.is_touching());
        contact.install_manifold(Manifold::default());
        assert!(!contact.is_touching());
    }
}
