//! Field objects and teams
//!
//! Objects live in an arena owned by the physics world and are addressed by
//! `ObjectId`. Each one holds the handle of its rapier body, never the body.

use glam::Vec2;
use rapier2d::prelude::RigidBodyHandle;
use serde::{Deserialize, Serialize};

/// One of the two competing sides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TeamId {
    Home,
    Away,
}

impl TeamId {
    pub fn other(self) -> Self {
        match self {
            TeamId::Home => TeamId::Away,
            TeamId::Away => TeamId::Home,
        }
    }

    /// Slot in per-team arrays
    pub fn index(self) -> usize {
        match self {
            TeamId::Home => 0,
            TeamId::Away => 1,
        }
    }
}

/// Stable arena index of a field object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl ObjectId {
    /// Collider `user_data` tag; 0 is reserved for untagged colliders
    pub fn to_user_data(self) -> u128 {
        u128::from(self.0) + 1
    }

    pub fn from_user_data(data: u128) -> Option<Self> {
        data.checked_sub(1)
            .and_then(|raw| u32::try_from(raw).ok())
            .map(ObjectId)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a collider belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Ball,
    Disk { team: TeamId },
    GoalKeeper { team: TeamId },
    /// Goalpost of the upper or lower goal
    Goal { upper: bool },
    GoalNet { upper: bool },
}

impl ObjectKind {
    /// Owning team, for disks and goalkeepers
    pub fn team(&self) -> Option<TeamId> {
        match *self {
            ObjectKind::Disk { team } | ObjectKind::GoalKeeper { team } => Some(team),
            _ => None,
        }
    }

    /// Pieces a team can flick
    pub fn is_playable(&self) -> bool {
        self.team().is_some()
    }

    /// Dynamic objects whose motion gates rules resolution
    pub fn is_tracked(&self) -> bool {
        matches!(
            self,
            ObjectKind::Ball | ObjectKind::Disk { .. } | ObjectKind::GoalKeeper { .. }
        )
    }
}

/// Edge-triggered motion flags, refreshed every physics step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionFlags {
    pub moved_this_step: bool,
    pub moved_last_step: bool,
}

impl MotionFlags {
    pub fn any(&self) -> bool {
        self.moved_this_step || self.moved_last_step
    }
}

/// A ball, disk, goalkeeper or goal part placed on the table
#[derive(Debug, Clone)]
pub struct FieldObject {
    pub id: ObjectId,
    pub kind: ObjectKind,
    /// Bounding circle radius
    pub radius: f32,
    pub body: RigidBodyHandle,
    pub motion: MotionFlags,
    /// World time of the most recent contact
    pub last_collision_ms: Option<f64>,
    /// Transform at the last time motion was detected
    pub(crate) recorded_position: Vec2,
    pub(crate) recorded_rotation: f32,
    /// Cosmetic roll angle of the ball (radians travelled)
    pub roll: f32,
}

impl FieldObject {
    pub fn new(id: ObjectId, kind: ObjectKind, radius: f32, body: RigidBodyHandle, at: Vec2) -> Self {
        Self {
            id,
            kind,
            radius,
            body,
            motion: MotionFlags::default(),
            last_collision_ms: None,
            recorded_position: at,
            recorded_rotation: 0.0,
            roll: 0.0,
        }
    }

    pub fn team(&self) -> Option<TeamId> {
        self.kind.team()
    }

    pub fn is_ball(&self) -> bool {
        self.kind == ObjectKind::Ball
    }

    /// Start of a new step: shift this step's flag into last step's
    pub fn pre_physics_step(&mut self) {
        self.motion.moved_last_step = self.motion.moved_this_step;
        self.motion.moved_this_step = false;
    }

    /// Compare the current transform with the recorded one
    ///
    /// Sets `moved_this_step` (sticky until the next `pre_physics_step`) and
    /// re-records the transform when it changed beyond `tolerance`.
    pub fn observe_transform(&mut self, position: Vec2, rotation: f32, tolerance: f32) -> bool {
        let travelled = position.distance(self.recorded_position);
        let turned = (rotation - self.recorded_rotation).abs();
        if travelled > tolerance || turned > tolerance {
            if self.is_ball() && self.radius > 0.0 {
                self.roll += travelled / self.radius;
            }
            self.recorded_position = position;
            self.recorded_rotation = rotation;
            self.motion.moved_this_step = true;
            return true;
        }
        false
    }

    /// Accept the current transform as resting
    pub(crate) fn rebase(&mut self, position: Vec2, rotation: f32) {
        self.recorded_position = position;
        self.recorded_rotation = rotation;
        self.motion = MotionFlags::default();
    }

    /// Milliseconds since the last contact, `None` if never touched
    pub fn since_last_collision(&self, now_ms: f64) -> Option<f64> {
        self.last_collision_ms.map(|t| now_ms - t)
    }
}

/// Placement of one team's pieces, supplied by the formation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamSetup {
    pub name: String,
    pub disks: Vec<Vec2>,
    pub goalkeeper: Option<Vec2>,
}

/// A competing side: its pieces, referenced by id
#[derive(Debug, Clone)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub disks: Vec<ObjectId>,
    pub goalkeeper: Option<ObjectId>,
}

impl Team {
    /// Disks then goalkeeper
    pub fn pieces(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.disks.iter().copied().chain(self.goalkeeper)
    }

    pub fn owns(&self, id: ObjectId) -> bool {
        self.pieces().any(|p| p == id)
    }
}
