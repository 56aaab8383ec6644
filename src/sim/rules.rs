//! Rules state machine
//!
//! Physics events only stamp flags here. The state changes once per act, in
//! `ball_at_final_position`, after every piece has come to rest.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::events::RulesEvent;
use super::field::FieldGeometry;
use super::object::{FieldObject, ObjectId, TeamId};
use super::stats::StatisticsSink;
use crate::error::RulesError;
use crate::settings::RulesConfig;

/// Restart situation the next act is played from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayState {
    Normal,
    /// Kickoff from the centre spot
    Middle,
    CornerKick,
    FreeKick,
    ThrowIn,
    GoalKick,
    PenaltyKick,
}

impl PlayState {
    /// Whether the acting team may score straight from this state
    pub fn allows_direct_goal(self) -> bool {
        !matches!(self, PlayState::Middle | PlayState::ThrowIn | PlayState::GoalKick)
    }
}

/// The first thing the acting piece touched during an act
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FirstContact {
    Ball { team: TeamId },
    OwnDisk { at: Vec2 },
    EnemyDisk { at: Vec2 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Half {
    First,
    Second,
}

/// Running time of the current half
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HalfClock {
    pub minutes_per_half: u32,
    pub elapsed_ms: f64,
    pub half: Half,
    /// The end of this half was already reported
    pub expired: bool,
}

impl HalfClock {
    pub fn new(minutes_per_half: u32) -> Self {
        Self { minutes_per_half, elapsed_ms: 0.0, half: Half::First, expired: false }
    }

    pub fn length_ms(&self) -> f64 {
        f64::from(self.minutes_per_half) * 60_000.0
    }

    /// Add time; true only on the call that reaches the end of the half
    pub fn advance(&mut self, delta_ms: f64) -> bool {
        if self.expired {
            return false;
        }
        self.elapsed_ms += delta_ms.max(0.0);
        if self.elapsed_ms >= self.length_ms() {
            self.expired = true;
            return true;
        }
        false
    }

    pub fn remaining_ms(&self) -> f64 {
        (self.length_ms() - self.elapsed_ms).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    goals: [u32; 2],
}

impl Score {
    pub fn get(&self, team: TeamId) -> u32 {
        self.goals[team.index()]
    }

    fn add(&mut self, team: TeamId) {
        self.goals[team.index()] += 1;
    }
}

/// Why a ball in the net did not count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisallowReason {
    /// The act started with a foul
    Foul,
    /// Scored straight from a kickoff, throw-in or goal kick
    IndirectRestart,
    /// The shot was not announced to the opponent
    ShotNotAnnounced,
}

/// What an act amounted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnOutcome {
    Goal { scorer: TeamId, own_goal: bool },
    GoalDisallowed { reason: DisallowReason },
    Foul { fouled: TeamId, penalty: bool },
    Corner,
    ThrowIn,
    GoalKick,
    /// Plain move; `continues` when the same team acts again
    Move { continues: bool },
}

/// Result of committing an act
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResolution {
    pub outcome: TurnOutcome,
    pub state: PlayState,
    pub team_to_act: TeamId,
    /// Where the ball must be placed for the restart
    pub restart_spot: Option<Vec2>,
}

/// Complete rules state; this is what a save file stores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesState {
    pub state: PlayState,
    pub active_team: TeamId,
    /// Team defending the +x goal
    pub upper_team: TeamId,
    pub current_acting_disk: Option<ObjectId>,
    pub remaining_global_touches: u8,
    pub remaining_disk_touches: u8,
    pub first_contact: Option<FirstContact>,
    pub last_ball_collided: Option<TeamId>,
    /// Pending byline exit: (upper byline, z)
    pub byline_exit: Option<(bool, f32)>,
    /// Pending side exit: (x, clamped z)
    pub side_exit: Option<(f32, f32)>,
    /// Pending goal: true for the upper goal
    pub pending_goal: Option<bool>,
    pub will_shoot: bool,
    /// Teams already credited with a ball touch this act
    pub ball_touchers: [bool; 2],
    pub clock: HalfClock,
    pub score: Score,
    /// Team that kicked off the first half
    pub kickoff_team: TeamId,
}

/// The authoritative turn and restart state of one match
#[derive(Debug, Clone)]
pub struct Rules {
    state: RulesState,
    config: RulesConfig,
    geometry: FieldGeometry,
}

impl Rules {
    pub fn new(
        config: RulesConfig,
        geometry: FieldGeometry,
        kickoff_team: TeamId,
        upper_team: TeamId,
    ) -> Self {
        let budget = config.budget(PlayState::Middle);
        let state = RulesState {
            state: PlayState::Middle,
            active_team: kickoff_team,
            upper_team,
            current_acting_disk: None,
            remaining_global_touches: budget.global,
            remaining_disk_touches: budget.per_disk,
            first_contact: None,
            last_ball_collided: None,
            byline_exit: None,
            side_exit: None,
            pending_goal: None,
            will_shoot: false,
            ball_touchers: [false; 2],
            clock: HalfClock::new(config.minutes_per_half),
            score: Score::default(),
            kickoff_team,
        };
        Self { state, config, geometry }
    }

    // --- Queries ---

    pub fn state(&self) -> PlayState {
        self.state.state
    }

    pub fn active_team(&self) -> TeamId {
        self.state.active_team
    }

    pub fn upper_team(&self) -> TeamId {
        self.state.upper_team
    }

    pub fn current_acting_disk(&self) -> Option<ObjectId> {
        self.state.current_acting_disk
    }

    pub fn remaining_global_touches(&self) -> u8 {
        self.state.remaining_global_touches
    }

    pub fn remaining_disk_touches(&self) -> u8 {
        self.state.remaining_disk_touches
    }

    pub fn first_contact(&self) -> Option<FirstContact> {
        self.state.first_contact
    }

    pub fn last_ball_collided(&self) -> Option<TeamId> {
        self.state.last_ball_collided
    }

    pub fn pending_goal(&self) -> Option<bool> {
        self.state.pending_goal
    }

    pub fn byline_exit(&self) -> Option<(bool, f32)> {
        self.state.byline_exit
    }

    pub fn side_exit(&self) -> Option<(f32, f32)> {
        self.state.side_exit
    }

    pub fn will_shoot(&self) -> bool {
        self.state.will_shoot
    }

    pub fn score(&self) -> Score {
        self.state.score
    }

    pub fn clock(&self) -> &HalfClock {
        &self.state.clock
    }

    pub fn config(&self) -> &RulesConfig {
        &self.config
    }

    /// Whether `team` defends the +x goal
    pub fn defends_upper(&self, team: TeamId) -> bool {
        team == self.state.upper_team
    }

    /// Team defending the given goal
    pub fn defender_of(&self, upper: bool) -> TeamId {
        if upper { self.state.upper_team } else { self.state.upper_team.other() }
    }

    // --- Acting ---

    /// Whether `disk` may act now; returns the touches it keeps afterwards
    pub fn can_act(&self, disk: &FieldObject) -> Result<u8, RulesError> {
        let team = disk.team().ok_or(RulesError::NotAPlayablePiece(disk.id))?;
        if team != self.state.active_team {
            return Err(RulesError::NotYourTurn { team });
        }
        if self.state.remaining_global_touches == 0 {
            return Err(RulesError::NoGlobalTouches);
        }
        let disk_touches = if self.state.current_acting_disk == Some(disk.id) {
            self.state.remaining_disk_touches
        } else {
            self.config.budget(self.state.state).per_disk
        };
        disk_touches.checked_sub(1).ok_or(RulesError::DiskTouchesExhausted(disk.id))
    }

    /// The active team commits `disk` to the next act
    ///
    /// Rejected acts leave the state untouched; the caller must not apply
    /// the move.
    pub fn set_disk_act(&mut self, disk: &FieldObject) -> Result<(), RulesError> {
        let disk_touches = self.can_act(disk)?;
        let team = self.state.active_team;

        self.state.remaining_global_touches -= 1;
        self.state.remaining_disk_touches = disk_touches;
        self.state.current_acting_disk = Some(disk.id);
        log::debug!(
            "{team:?} acts with {:?} ({} touches left, {} for this disk)",
            disk.id,
            self.state.remaining_global_touches,
            disk_touches
        );
        Ok(())
    }

    /// Tell the opponent a shot at goal is coming
    pub fn announce_shot(&mut self) {
        self.state.will_shoot = true;
    }

    /// Begin the active team's turn and hand it to the input layer
    pub fn new_turn(&mut self) -> TeamId {
        self.clear_flags();
        log::debug!("New turn for {:?} in {:?}", self.state.active_team, self.state.state);
        self.state.active_team
    }

    // --- Physics events ---

    /// Record the event's flag; no state transition happens here
    pub fn apply(&mut self, event: RulesEvent, stats: &mut dyn StatisticsSink) {
        match event {
            RulesEvent::DiskCollideDisk { team_a, team_b, contact } => {
                self.disk_collide_disk(team_a, team_b, contact.x, contact.y)
            }
            RulesEvent::BallCollideDisk { team, .. } => self.ball_collide_disk(team, stats),
            RulesEvent::BallExitAtSide { x, z } => self.ball_exit_at_side(x, z),
            RulesEvent::BallExitAtByline { upper, z } => self.ball_exit_at_byline(upper, z),
            RulesEvent::BallEnterGoal { upper } => self.ball_enter_goal(upper),
        }
    }

    fn record_first_contact(&mut self, contact: FirstContact) {
        if self.state.first_contact.is_none() {
            log::debug!("First contact this act: {contact:?}");
            self.state.first_contact = Some(contact);
        }
    }

    pub fn disk_collide_disk(&mut self, team_a: TeamId, team_b: TeamId, x: f32, z: f32) {
        let at = Vec2::new(x, z);
        if team_a == team_b {
            self.record_first_contact(FirstContact::OwnDisk { at });
        } else {
            self.record_first_contact(FirstContact::EnemyDisk { at });
        }
    }

    pub fn ball_collide_disk(&mut self, team: TeamId, stats: &mut dyn StatisticsSink) {
        self.record_first_contact(FirstContact::Ball { team });
        self.state.last_ball_collided = Some(team);
        let credited = &mut self.state.ball_touchers[team.index()];
        if !*credited {
            *credited = true;
            stats.record_ball_touch(team);
        }
    }

    pub fn ball_exit_at_side(&mut self, x: f32, z: f32) {
        if self.state.side_exit.is_none() {
            log::debug!("Ball out at side ({x:.2}, {z:.2})");
            self.state.side_exit = Some((x, z));
        }
    }

    pub fn ball_exit_at_byline(&mut self, upper: bool, z: f32) {
        if self.state.byline_exit.is_none() {
            log::debug!("Ball out at {} byline (z {z:.2})", if upper { "upper" } else { "lower" });
            self.state.byline_exit = Some((upper, z));
        }
    }

    pub fn ball_enter_goal(&mut self, upper: bool) {
        if self.state.pending_goal.is_none() {
            log::debug!("Ball in the {} goal", if upper { "upper" } else { "lower" });
            self.state.pending_goal = Some(upper);
        }
    }

    // --- Commit ---

    /// Commit the act that just came to rest
    ///
    /// Precondition: the physics world is stable. Priority is goal, byline
    /// exit, side exit, foul, plain move.
    pub fn ball_at_final_position(&mut self, stats: &mut dyn StatisticsSink) -> TurnResolution {
        let acting = self.state.active_team;

        let (credited, outcome, restart_spot) = if let Some(upper) = self.state.pending_goal {
            self.resolve_goal(upper)
        } else if let Some((upper, z)) = self.state.byline_exit {
            self.check_corner_or_goal_kick(upper, z)
        } else if let Some((x, z)) = self.state.side_exit {
            self.resolve_throw_in(x, z)
        } else if let Some(at) = self.committed_foul() {
            self.resolve_foul(at)
        } else {
            self.change_team_to_act()
        };

        stats.record_outcome(credited, &outcome);
        self.clear_flags();

        let resolution = TurnResolution {
            outcome,
            state: self.state.state,
            team_to_act: self.state.active_team,
            restart_spot,
        };
        if resolution.state != PlayState::Normal || acting != resolution.team_to_act {
            log::info!(
                "{:?} -> {:?}, {:?} to act",
                outcome,
                resolution.state,
                resolution.team_to_act
            );
        }
        resolution
    }

    /// Foul point, if the act started on an enemy disk
    fn committed_foul(&self) -> Option<Vec2> {
        match self.state.first_contact {
            Some(FirstContact::EnemyDisk { at }) => Some(at),
            _ => None,
        }
    }

    /// Decide whether a ball in the given goal counts
    pub fn verify_goal_valid(&self, upper: bool) -> Result<(), DisallowReason> {
        if self.committed_foul().is_some() {
            return Err(DisallowReason::Foul);
        }
        let scorer = self.defender_of(upper).other();
        if scorer == self.state.active_team {
            if !self.state.state.allows_direct_goal() {
                return Err(DisallowReason::IndirectRestart);
            }
            if self.config.require_shot_announcement && !self.state.will_shoot {
                return Err(DisallowReason::ShotNotAnnounced);
            }
        }
        Ok(())
    }

    fn resolve_goal(&mut self, upper: bool) -> (TeamId, TurnOutcome, Option<Vec2>) {
        let acting = self.state.active_team;
        let defender = self.defender_of(upper);
        let scorer = defender.other();

        match self.verify_goal_valid(upper) {
            Ok(()) => {
                self.state.score.add(scorer);
                log::info!(
                    "GOAL for {scorer:?}! {} - {}",
                    self.state.score.get(TeamId::Home),
                    self.state.score.get(TeamId::Away)
                );
                // Conceding team kicks off
                self.award(PlayState::Middle, defender);
                let outcome = TurnOutcome::Goal { scorer, own_goal: scorer != acting };
                (scorer, outcome, Some(self.geometry.center_spot()))
            }
            Err(DisallowReason::Foul) => {
                log::info!("Goal for {scorer:?} disallowed: foul");
                let at = self.committed_foul().unwrap_or_default();
                self.resolve_foul(at)
            }
            Err(reason) => {
                log::info!("Goal for {scorer:?} disallowed: {reason:?}");
                self.award(PlayState::GoalKick, defender);
                let outcome = TurnOutcome::GoalDisallowed { reason };
                (acting, outcome, Some(self.geometry.goal_kick_spot(upper)))
            }
        }
    }

    /// Ball crossed a byline: corner if the defenders touched it last
    pub fn check_corner_or_goal_kick(
        &mut self,
        upper: bool,
        z: f32,
    ) -> (TeamId, TurnOutcome, Option<Vec2>) {
        let defender = self.defender_of(upper);
        let last = self.state.last_ball_collided.unwrap_or(self.state.active_team);

        if last == defender {
            let attacker = defender.other();
            self.award(PlayState::CornerKick, attacker);
            (attacker, TurnOutcome::Corner, Some(self.geometry.corner_spot(upper, z)))
        } else {
            self.award(PlayState::GoalKick, defender);
            (defender, TurnOutcome::GoalKick, Some(self.geometry.goal_kick_spot(upper)))
        }
    }

    fn resolve_throw_in(&mut self, x: f32, z: f32) -> (TeamId, TurnOutcome, Option<Vec2>) {
        let last = self.state.last_ball_collided.unwrap_or(self.state.active_team);
        let team = last.other();
        self.award(PlayState::ThrowIn, team);
        (team, TurnOutcome::ThrowIn, Some(self.geometry.throw_in_spot(x, z)))
    }

    /// Acting team touched an enemy disk first
    fn resolve_foul(&mut self, at: Vec2) -> (TeamId, TurnOutcome, Option<Vec2>) {
        let fouler = self.state.active_team;
        let fouled = fouler.other();
        let own_goal_upper = self.defends_upper(fouler);
        let penalty = self.geometry.is_inner_penalty_area(own_goal_upper, at);

        let spot = if penalty {
            self.award(PlayState::PenaltyKick, fouled);
            self.geometry.penalty_mark(own_goal_upper)
        } else {
            self.award(PlayState::FreeKick, fouled);
            self.geometry.clamp_to_field(at)
        };
        (fouler, TurnOutcome::Foul { fouled, penalty }, Some(spot))
    }

    /// Plain move: keep the turn after a ball-first act with touches left
    pub fn change_team_to_act(&mut self) -> (TeamId, TurnOutcome, Option<Vec2>) {
        let acting = self.state.active_team;
        let touched_ball = matches!(self.state.first_contact, Some(FirstContact::Ball { .. }));
        let continues = touched_ball && self.state.remaining_global_touches > 0;

        if continues {
            self.state.state = PlayState::Normal;
        } else {
            self.award(PlayState::Normal, acting.other());
        }
        (acting, TurnOutcome::Move { continues }, None)
    }

    /// Hand a fresh turn in `state` to `team`
    fn award(&mut self, state: PlayState, team: TeamId) {
        self.state.state = state;
        self.state.active_team = team;
        self.state.current_acting_disk = None;
        self.set_remaining_touches();
    }

    /// Reset both counters to the budget of the current state
    pub fn set_remaining_touches(&mut self) {
        let budget = self.config.budget(self.state.state);
        self.state.remaining_global_touches = budget.global;
        self.state.remaining_disk_touches = budget.per_disk;
    }

    /// Forget everything recorded during the last act
    pub fn clear_flags(&mut self) {
        self.state.first_contact = None;
        self.state.byline_exit = None;
        self.state.side_exit = None;
        self.state.pending_goal = None;
        self.state.will_shoot = false;
        self.state.ball_touchers = [false; 2];
    }

    // --- Clock ---

    /// Advance the half clock; true exactly once, when the half ends
    pub fn update_clock(&mut self, delta_ms: f64) -> bool {
        let ended = self.state.clock.advance(delta_ms);
        if ended {
            log::info!("End of the {:?} half", self.state.clock.half);
        }
        ended
    }

    /// Swap ends and kick off the second half
    pub fn start_second_half(&mut self) -> Result<(), RulesError> {
        if self.state.clock.half == Half::Second {
            return Err(RulesError::MatchOver);
        }
        self.state.clock = HalfClock {
            half: Half::Second,
            ..HalfClock::new(self.state.clock.minutes_per_half)
        };
        self.state.upper_team = self.state.upper_team.other();
        self.clear_flags();
        self.award(PlayState::Middle, self.state.kickoff_team.other());
        log::info!("Second half, {:?} kicks off", self.state.active_team);
        Ok(())
    }

    // --- Persistence ---

    pub fn snapshot(&self) -> RulesState {
        self.state.clone()
    }

    /// Replace the whole state at once, without replaying a turn
    pub fn restore(&mut self, state: RulesState) -> Result<(), RulesError> {
        let budgets = [self.config.normal, self.config.set_piece, self.config.single_shot];
        let max_global = budgets.iter().map(|b| b.global).max().unwrap_or(0);
        let max_disk = budgets.iter().map(|b| b.per_disk).max().unwrap_or(0);

        let invalid = |reason: String| Err(RulesError::InvalidSnapshot { reason });
        if state.remaining_global_touches > max_global {
            return invalid(format!("{} global touches", state.remaining_global_touches));
        }
        if state.remaining_disk_touches > max_disk {
            return invalid(format!("{} disk touches", state.remaining_disk_touches));
        }
        if !state.clock.elapsed_ms.is_finite() || state.clock.elapsed_ms < 0.0 {
            return invalid(format!("clock at {} ms", state.clock.elapsed_ms));
        }

        self.state = state;
        log::info!(
            "Restored rules: {:?}, {:?} to act",
            self.state.state,
            self.state.active_team
        );
        Ok(())
    }
}
