//! Match settings
//!
//! Loaded once per match from JSON. Every section falls back to the
//! regulation defaults for keys the file leaves out.

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::sim::PlayState;

/// Touches a team gets when a turn starts in a given state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouchBudget {
    /// Acts the team may make before the turn passes
    pub global: u8,
    /// Consecutive acts a single disk may make
    pub per_disk: u8,
}

impl TouchBudget {
    pub const fn new(global: u8, per_disk: u8) -> Self {
        Self { global, per_disk }
    }
}

/// Rules tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Length of each half
    pub minutes_per_half: u32,
    /// Open play
    pub normal: TouchBudget,
    /// Kickoff, corner kick, free kick and throw-in
    pub set_piece: TouchBudget,
    /// Goal kick and penalty kick
    pub single_shot: TouchBudget,
    /// Goals at the opponent's net only count after `announce_shot`
    pub require_shot_announcement: bool,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            minutes_per_half: MINUTES_PER_HALF,
            normal: TouchBudget::new(3, 2),
            set_piece: TouchBudget::new(3, 1),
            single_shot: TouchBudget::new(1, 1),
            require_shot_announcement: true,
        }
    }
}

impl RulesConfig {
    /// Touch budget granted when a turn starts in `state`
    pub fn budget(&self, state: PlayState) -> TouchBudget {
        match state {
            PlayState::Normal => self.normal,
            PlayState::Middle
            | PlayState::CornerKick
            | PlayState::FreeKick
            | PlayState::ThrowIn => self.set_piece,
            PlayState::GoalKick | PlayState::PenaltyKick => self.single_shot,
        }
    }

    /// Half length in milliseconds
    pub fn half_length_ms(&self) -> f64 {
        f64::from(self.minutes_per_half) * 60_000.0
    }
}

/// Simulation tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsSettings {
    /// Fixed substep length in seconds
    pub sim_dt: f32,
    /// Substep cap per `step` call
    pub max_substeps: u32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub restitution: f32,
    /// Transform change under which a body counts as resting
    pub move_tolerance: f32,
    /// Gap after which a repeated contact counts as a new collision
    pub new_collision_threshold_ms: f64,
    /// Frames `settle` runs before reporting the world as unsettled
    pub settle_step_cap: u32,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self {
            sim_dt: SIM_DT,
            max_substeps: MAX_SUBSTEPS,
            linear_damping: LINEAR_DAMPING,
            angular_damping: ANGULAR_DAMPING,
            restitution: RESTITUTION,
            move_tolerance: MOVE_TOLERANCE,
            new_collision_threshold_ms: NEW_COLLISION_THRESHOLD_MS,
            settle_step_cap: SETTLE_STEP_CAP,
        }
    }
}

/// Piece dimensions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PieceSettings {
    pub ball_radius: f32,
    pub disk_radius: f32,
    pub goalkeeper_radius: f32,
}

impl Default for PieceSettings {
    fn default() -> Self {
        Self {
            ball_radius: BALL_RADIUS,
            disk_radius: DISK_RADIUS,
            goalkeeper_radius: GOALKEEPER_RADIUS,
        }
    }
}

/// Everything a match needs besides the field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchSettings {
    pub rules: RulesConfig,
    pub physics: PhysicsSettings,
    pub pieces: PieceSettings,
}

impl MatchSettings {
    /// Parse settings, filling missing keys with defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let settings: Self = serde_json::from_str(json)?;
        log::info!(
            "Loaded match settings ({} min halves, {} Hz physics)",
            settings.rules.minutes_per_half,
            (1.0 / settings.physics.sim_dt).round()
        );
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Settings with a different half length
    pub fn with_minutes_per_half(mut self, minutes: u32) -> Self {
        self.rules.minutes_per_half = minutes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings =
            MatchSettings::from_json(r#"{ "rules": { "minutes_per_half": 2 } }"#).unwrap();
        assert_eq!(settings.rules.minutes_per_half, 2);
        assert_eq!(settings.rules.normal, TouchBudget::new(3, 2));
        assert_eq!(settings.physics.max_substeps, MAX_SUBSTEPS);
        assert_eq!(settings.pieces.ball_radius, BALL_RADIUS);
    }

    #[test]
    fn test_budget_per_state() {
        let config = RulesConfig::default();
        assert_eq!(config.budget(PlayState::Normal).global, 3);
        assert_eq!(config.budget(PlayState::PenaltyKick), TouchBudget::new(1, 1));
        assert_eq!(config.budget(PlayState::GoalKick), TouchBudget::new(1, 1));
        assert_eq!(config.budget(PlayState::ThrowIn).per_disk, 1);
    }

    #[test]
    fn test_settings_json_roundtrip() {
        let settings = MatchSettings::default().with_minutes_per_half(7);
        let json = settings.to_json().unwrap();
        assert_eq!(MatchSettings::from_json(&json).unwrap(), settings);
    }
}
