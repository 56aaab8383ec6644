//! Match statistics
//!
//! Fed once per resolved turn plus once per ball touch. The rules never read
//! anything back from the sink.

use serde::{Deserialize, Serialize};

use super::object::TeamId;
use super::rules::TurnOutcome;

/// Receiver of resolved turn outcomes
pub trait StatisticsSink {
    /// `team` is the team the outcome is credited to
    fn record_outcome(&mut self, team: TeamId, outcome: &TurnOutcome);
    fn record_ball_touch(&mut self, team: TeamId);
}

/// Per-team counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamStats {
    pub goals: u32,
    pub own_goals: u32,
    pub disallowed_goals: u32,
    pub shots: u32,
    pub fouls: u32,
    pub penalties: u32,
    pub corners: u32,
    pub throw_ins: u32,
    pub goal_kicks: u32,
    pub moves: u32,
    pub ball_touches: u32,
}

/// Counters for both teams
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStatistics {
    teams: [TeamStats; 2],
}

impl MatchStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn team(&self, team: TeamId) -> &TeamStats {
        &self.teams[team.index()]
    }

    fn team_mut(&mut self, team: TeamId) -> &mut TeamStats {
        &mut self.teams[team.index()]
    }

    /// Share of ball touches made by `team`, in [0, 1]
    pub fn possession(&self, team: TeamId) -> f32 {
        let total = self.teams[0].ball_touches + self.teams[1].ball_touches;
        if total == 0 {
            return 0.5;
        }
        self.team(team).ball_touches as f32 / total as f32
    }
}

impl StatisticsSink for MatchStatistics {
    fn record_outcome(&mut self, team: TeamId, outcome: &TurnOutcome) {
        let stats = self.team_mut(team);
        match outcome {
            TurnOutcome::Goal { own_goal, .. } => {
                stats.goals += 1;
                if *own_goal {
                    stats.own_goals += 1;
                } else {
                    stats.shots += 1;
                }
            }
            TurnOutcome::GoalDisallowed { .. } => {
                stats.disallowed_goals += 1;
                stats.shots += 1;
            }
            TurnOutcome::Foul { penalty, .. } => {
                stats.fouls += 1;
                if *penalty {
                    stats.penalties += 1;
                }
            }
            TurnOutcome::Corner => stats.corners += 1,
            TurnOutcome::ThrowIn => stats.throw_ins += 1,
            TurnOutcome::GoalKick => stats.goal_kicks += 1,
            TurnOutcome::Move { .. } => stats.moves += 1,
        }
    }

    fn record_ball_touch(&mut self, team: TeamId) {
        self.team_mut(team).ball_touches += 1;
    }
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStatistics;

impl StatisticsSink for NoStatistics {
    fn record_outcome(&mut self, _team: TeamId, _outcome: &TurnOutcome) {}
    fn record_ball_touch(&mut self, _team: TeamId) {}
}
