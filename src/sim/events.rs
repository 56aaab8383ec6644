//! Events flowing from the physics world to the rules and out to replication

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::object::{ObjectId, ObjectKind, TeamId};
use super::rules::TurnResolution;

/// Rules-relevant outcome of one tick of physics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RulesEvent {
    DiskCollideDisk { team_a: TeamId, team_b: TeamId, contact: Vec2 },
    BallCollideDisk { team: TeamId, disk: ObjectId },
    BallExitAtSide { x: f32, z: f32 },
    BallExitAtByline { upper: bool, z: f32 },
    BallEnterGoal { upper: bool },
}

/// A classified contact, alive for one tick only
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionEvent {
    pub a: ObjectId,
    pub b: ObjectId,
    pub kinds: (ObjectKind, ObjectKind),
    /// World contact point
    pub point: Vec2,
    /// Enough time passed since either object's previous contact
    pub is_new: bool,
    pub rules: Option<RulesEvent>,
}

/// One-shot effect a remote peer should play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectKind {
    BallHit,
    DiskHit,
    PostHit,
    NetHit,
    Whistle,
    ShotAnnounced,
}

impl EffectKind {
    /// Effect for a new collision between two kinds of object
    pub fn for_contact(a: ObjectKind, b: ObjectKind) -> Self {
        use ObjectKind::*;
        match (a, b) {
            (Goal { .. }, _) | (_, Goal { .. }) => EffectKind::PostHit,
            (GoalNet { .. }, _) | (_, GoalNet { .. }) => EffectKind::NetHit,
            (Ball, _) | (_, Ball) => EffectKind::BallHit,
            _ => EffectKind::DiskHit,
        }
    }
}

/// Message handed to the network layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplicationMessage {
    Transform { id: ObjectId, position: Vec2, rotation: f32 },
    Effect { kind: EffectKind, position: Vec2 },
    Resolution(TurnResolution),
}

/// Outbound replication hooks; the wire format lives elsewhere
pub trait ReplicationSink {
    fn queue_transform(&mut self, id: ObjectId, position: Vec2, rotation: f32);
    fn queue_effect(&mut self, kind: EffectKind, position: Vec2);
    fn queue_rules(&mut self, resolution: &TurnResolution);
}

/// Buffers messages until the protocol layer drains them after a step
#[derive(Debug, Clone, Default)]
pub struct ReplicationQueue {
    messages: Vec<ReplicationMessage>,
}

impl ReplicationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[ReplicationMessage] {
        &self.messages
    }

    /// Take everything queued so far
    pub fn drain(&mut self) -> Vec<ReplicationMessage> {
        std::mem::take(&mut self.messages)
    }
}

impl ReplicationSink for ReplicationQueue {
    fn queue_transform(&mut self, id: ObjectId, position: Vec2, rotation: f32) {
        // Only the latest transform per object matters
        if let Some(ReplicationMessage::Transform { position: p, rotation: r, .. }) = self
            .messages
            .iter_mut()
            .rev()
            .find(|m| matches!(m, ReplicationMessage::Transform { id: other, .. } if *other == id))
        {
            *p = position;
            *r = rotation;
            return;
        }
        self.messages.push(ReplicationMessage::Transform { id, position, rotation });
    }

    fn queue_effect(&mut self, kind: EffectKind, position: Vec2) {
        self.messages.push(ReplicationMessage::Effect { kind, position });
    }

    fn queue_rules(&mut self, resolution: &TurnResolution) {
        self.messages.push(ReplicationMessage::Resolution(resolution.clone()));
    }
}
