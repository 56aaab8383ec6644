//! Match simulation module
//!
//! Everything that decides the outcome of a turn lives here:
//! - Fixed-rate rapier2d stepping with per-object motion tracking
//! - Contact classification into rules events
//! - The rules state machine, committed only once the world is at rest
//!
//! Nothing in here renders, plays audio or touches the network.

pub mod collision;
pub mod events;
pub mod field;
pub mod object;
pub mod rules;
pub mod session;
pub mod stats;
pub mod world;

pub use collision::{
    AreaEdges, ClassifyContext, CollisionClassifier, KEEPER_CONTACT_SNAPS_TO_AREA_EDGE, check_ball_limits,
};
pub use events::{
    CollisionEvent, EffectKind, ReplicationMessage, ReplicationQueue, ReplicationSink, RulesEvent,
};
pub use field::{Aabb, BallExit, Circle, FieldGeometry};
pub use object::{FieldObject, MotionFlags, ObjectId, ObjectKind, Team, TeamId, TeamSetup};
pub use rules::{
    DisallowReason, FirstContact, Half, HalfClock, PlayState, Rules, RulesState, Score, TurnOutcome,
    TurnResolution,
};
pub use session::MatchSession;
pub use stats::{MatchStatistics, NoStatistics, StatisticsSink, TeamStats};
pub use world::{PhysicsWorld, RawContact};
