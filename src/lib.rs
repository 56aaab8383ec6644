//! Disk Football - rules and physics core for turn-based table football
//!
//! Core modules:
//! - `sim`: Physics world, collision classification and the rules state machine
//! - `persistence`: Save/load of the rules state with integrity verification
//! - `settings`: Data-driven match configuration
//! - `error`: Error types shared across the crate
//!
//! The field is the horizontal (x, z) plane of the table. It is simulated in
//! 2D, so every `Vec2` in this crate carries `(x, z)` in its `(x, y)` slots.

pub mod error;
pub mod persistence;
pub mod settings;
pub mod sim;

pub use error::{FieldError, PersistenceError, RulesError};
pub use settings::{MatchSettings, PhysicsSettings, PieceSettings, RulesConfig};

use glam::Vec2;

/// Simulation configuration constants
pub mod consts {
    /// Fixed simulation timestep (120 Hz)
    pub const SIM_DT: f32 = 1.0 / 120.0;
    /// Maximum substeps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 8;

    /// Transform change (world units or radians) below which a body counts as resting
    pub const MOVE_TOLERANCE: f32 = 1.0e-4;
    /// Minimum gap between two collisions of one object for the second to count as new
    pub const NEW_COLLISION_THRESHOLD_MS: f64 = 50.0;
    /// Frames `settle` may run before giving up on the physics converging
    pub const SETTLE_STEP_CAP: u32 = 12_000;
    /// Gap kept between a restarted ball and any piece or post
    pub const RESTART_CLEARANCE: f32 = 0.05;

    /// Piece defaults
    pub const BALL_RADIUS: f32 = 0.3;
    pub const DISK_RADIUS: f32 = 0.75;
    pub const GOALKEEPER_RADIUS: f32 = 0.9;

    /// Table friction, applied as damping on the top-down bodies
    pub const LINEAR_DAMPING: f32 = 1.5;
    pub const ANGULAR_DAMPING: f32 = 2.0;
    pub const RESTITUTION: f32 = 0.6;

    /// Regulation half length in minutes
    pub const MINUTES_PER_HALF: u32 = 5;
}

/// Convert a glam vector into rapier's vector type
#[inline]
pub fn to_physics(v: Vec2) -> rapier2d::prelude::Vector<rapier2d::prelude::Real> {
    rapier2d::prelude::vector![v.x, v.y]
}

/// Convert a rapier vector back into glam
#[inline]
pub fn from_physics(v: &rapier2d::prelude::Vector<rapier2d::prelude::Real>) -> Vec2 {
    Vec2::new(v.x, v.y)
}
