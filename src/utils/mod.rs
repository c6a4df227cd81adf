//! Utility helpers: math extensions over glam, the world arena, and logging.

pub mod allocator;
pub mod logging;
pub mod math;

pub use allocator::{Arena, EntityId};
pub use math::Fixed;
