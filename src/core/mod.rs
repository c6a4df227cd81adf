//! Core types describing bodies, fixtures, and shared simulation data.

pub mod body;
pub mod fixture;
pub mod types;

pub use body::{BodyType, RigidBody, RigidBodyBuilder};
pub use fixture::{Filter, Fixture};
pub use types::{MassData, Position, Rot, Sweep, Transform, Velocity};

use thiserror::Error;

/// Errors surfaced by fallible public operations. Everything here is
/// recoverable by the caller; internal invariant violations are debug
/// assertions instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PhysicsError {
    /// Structural mutation was attempted while the world is mid-step.
    #[error("operation not permitted while the world is locked")]
    Locked,
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// A compile-time capacity (polygon vertices, manifold points, ...)
    /// would be exceeded.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(&'static str),
}
