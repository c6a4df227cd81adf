use crate::utils::allocator::EntityId;

/// A connected set of awake bodies plus the contacts and joints between
/// them, solved as one unit. Rebuilt from scratch every step; the arrays are
/// reused across islands within a step to avoid churn.
#[derive(Debug, Default)]
pub struct Island {
    pub bodies: Vec<EntityId>,
    pub contacts: Vec<EntityId>,
    pub joints: Vec<EntityId>,
}

impl Island {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
        self.joints.clear();
    }

    /// Adds a body and returns its island-local constraint index.
    pub fn add_body(&mut self, body: EntityId) -> usize {
        self.bodies.push(body);
        self.bodies.len() - 1
    }

    pub fn add_contact(&mut self, contact: EntityId) {
        self.contacts.push(contact);
    }

    pub fn add_joint(&mut self, joint: EntityId) {
        self.joints.push(joint);
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}
