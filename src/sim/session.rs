//! Match session: one physics world, one rules state, their sinks
//!
//! Owns everything a match needs and drives the per-frame loop:
//! physics substep, contact classification, rules flags, replication.

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::collision::{AreaEdges, ClassifyContext, CollisionClassifier, check_ball_limits};
use super::events::{EffectKind, ReplicationQueue, ReplicationSink};
use super::field::FieldGeometry;
use super::object::{ObjectId, ObjectKind, Team, TeamId, TeamSetup};
use super::rules::{PlayState, Rules, TurnResolution};
use super::stats::{MatchStatistics, StatisticsSink};
use super::world::PhysicsWorld;
use crate::error::{FieldError, PersistenceError, RulesError};
use crate::persistence::SaveEnvelope;
use crate::consts::RESTART_CLEARANCE;
use crate::settings::MatchSettings;

/// Rings searched around a blocked restart spot
const RESTART_RINGS: u32 = 24;
/// Radial step between rings
const RESTART_RING_STEP: f32 = 0.25;
/// Candidate directions per ring
const RESTART_DIRECTIONS: u32 = 16;

pub struct MatchSession<S: StatisticsSink = MatchStatistics, R: ReplicationSink = ReplicationQueue> {
    geometry: FieldGeometry,
    settings: MatchSettings,
    world: PhysicsWorld,
    classifier: CollisionClassifier,
    rules: Rules,
    teams: [Option<Team>; 2],
    ball: ObjectId,
    stats: S,
    replication: R,
}

impl MatchSession {
    /// Session with the in-memory statistics and replication queue
    pub fn new(geometry: FieldGeometry, settings: MatchSettings, seed: u64) -> Result<Self, FieldError> {
        Self::with_sinks(geometry, settings, seed, MatchStatistics::new(), ReplicationQueue::new())
    }
}

impl<S: StatisticsSink, R: ReplicationSink> MatchSession<S, R> {
    /// Build the table, place the ball and toss for kickoff and ends
    pub fn with_sinks(
        geometry: FieldGeometry,
        settings: MatchSettings,
        seed: u64,
        stats: S,
        replication: R,
    ) -> Result<Self, FieldError> {
        geometry.validate()?;

        let mut rng = Pcg32::seed_from_u64(seed);
        let kickoff = if rng.random_bool(0.5) { TeamId::Home } else { TeamId::Away };
        let upper = if rng.random_bool(0.5) { TeamId::Home } else { TeamId::Away };

        let mut world = PhysicsWorld::new(&geometry, settings.physics.clone());
        let ball = world.spawn(ObjectKind::Ball, geometry.center_spot(), settings.pieces.ball_radius);
        let classifier = CollisionClassifier::new(settings.physics.new_collision_threshold_ms);
        let rules = Rules::new(settings.rules.clone(), geometry.clone(), kickoff, upper);

        log::info!("Match created (seed {seed}): {kickoff:?} kicks off, {upper:?} defends +x");
        Ok(Self {
            geometry,
            settings,
            world,
            classifier,
            rules,
            teams: [None, None],
            ball,
            stats,
            replication,
        })
    }

    /// Place a team's disks and goalkeeper
    pub fn spawn_team(&mut self, id: TeamId, setup: &TeamSetup) -> &Team {
        let pieces = &self.settings.pieces;
        let disks = setup
            .disks
            .iter()
            .map(|&at| self.world.spawn(ObjectKind::Disk { team: id }, at, pieces.disk_radius))
            .collect();
        let goalkeeper = setup
            .goalkeeper
            .map(|at| self.world.spawn(ObjectKind::GoalKeeper { team: id }, at, pieces.goalkeeper_radius));

        log::info!("{id:?} ({}) takes the field", setup.name);
        self.teams[id.index()].insert(Team { id, name: setup.name.clone(), disks, goalkeeper })
    }

    // --- Acting ---

    /// Flick a piece; a rejected act applies no impulse
    pub fn shoot(&mut self, disk: ObjectId, impulse: Vec2) -> Result<(), RulesError> {
        let object = self.world.object(disk).ok_or(RulesError::UnknownObject(disk))?;
        if let Err(err) = self.rules.set_disk_act(object) {
            log::warn!("Act with {disk:?} rejected: {err}");
            return Err(err);
        }
        self.world.apply_impulse(disk, impulse)
    }

    pub fn announce_shot(&mut self) {
        self.rules.announce_shot();
        let at = self.world.position(self.ball).unwrap_or_default();
        self.replication.queue_effect(EffectKind::ShotAnnounced, at);
    }

    // --- Stepping ---

    /// Advance one frame; returns the substeps run
    pub fn step(&mut self, delta_ms: f64) -> u32 {
        let classifier = &self.classifier;
        let rules = &mut self.rules;
        let stats = &mut self.stats;
        let replication = &mut self.replication;
        let geometry = &self.geometry;
        let area_edges = AreaEdges::from_geometry(geometry);
        let ball = self.ball;

        let substeps = self.world.step(delta_ms, |world| {
            let ctx = ClassifyContext {
                acting_disk: rules.current_acting_disk(),
                upper_team: rules.upper_team(),
                now_ms: world.now_ms(),
                area_edges,
            };
            let contacts = world.contacts();
            for event in classifier.classify(&contacts, world, &ctx) {
                if let Some(rules_event) = event.rules {
                    rules.apply(rules_event, stats);
                }
                if event.is_new {
                    replication.queue_effect(EffectKind::for_contact(event.kinds.0, event.kinds.1), event.point);
                }
            }

            let ball_moved = world.object(ball).is_some_and(|b| b.motion.moved_this_step);
            if classifier.is_enabled() && ball_moved {
                for limit in check_ball_limits(world, geometry) {
                    rules.apply(limit, stats);
                }
            }
        });

        for object in self.world.objects().iter().filter(|o| o.motion.moved_this_step) {
            if let (Some(position), Some(rotation)) = (self.world.position(object.id), self.world.rotation(object.id)) {
                self.replication.queue_transform(object.id, position, rotation);
            }
        }
        substeps
    }

    /// One physics step with the rules switched off
    pub fn forced_step(&mut self) {
        self.classifier.set_enabled(false);
        self.world.forced_step();
        // Keeps the collision timers current; no events while disabled
        let ctx = ClassifyContext {
            acting_disk: None,
            upper_team: self.rules.upper_team(),
            now_ms: self.world.now_ms(),
            area_edges: AreaEdges::from_geometry(&self.geometry),
        };
        let contacts = self.world.contacts();
        self.classifier.classify(&contacts, &mut self.world, &ctx);
        self.classifier.set_enabled(true);
    }

    pub fn set_position(&mut self, id: ObjectId, position: Vec2) -> Result<(), RulesError> {
        self.world.set_position(id, position)
    }

    pub fn is_world_stable(&self) -> bool {
        self.world.is_world_stable()
    }

    /// Step whole frames until the world is stable
    ///
    /// Runs at most `max_steps` frames, further capped by the configured
    /// settle limit. Returns the frames run.
    pub fn settle(&mut self, max_steps: u32) -> Result<u32, RulesError> {
        let cap = max_steps.min(self.settings.physics.settle_step_cap);
        let frame_ms = self.world.substep_ms();
        for steps in 0..cap {
            if self.world.is_world_stable() {
                return Ok(steps);
            }
            self.step(frame_ms);
        }
        if self.world.is_world_stable() {
            return Ok(cap);
        }
        log::warn!("Physics still moving after {cap} frames");
        Err(RulesError::Unsettled { steps: cap })
    }

    /// Stop all motion where it is
    pub fn freeze(&mut self) {
        self.world.freeze();
    }

    /// Put the ball down for a restart, clear of every piece
    ///
    /// A blocked spot moves to the nearest free point inside the field.
    /// Returns where the ball ended up.
    pub fn place_ball(&mut self, spot: Vec2) -> Result<Vec2, RulesError> {
        let at = self.free_spot_near(spot);
        self.world.set_position(self.ball, at)?;
        self.forced_step();
        Ok(at)
    }

    fn free_spot_near(&self, spot: Vec2) -> Vec2 {
        let fits = |p: Vec2| {
            self.geometry.clamp_to_field(p) == p && self.world.is_clear(self.ball, p, RESTART_CLEARANCE)
        };
        if fits(spot) {
            return spot;
        }
        for ring in 1..=RESTART_RINGS {
            let distance = ring as f32 * RESTART_RING_STEP;
            for step in 0..RESTART_DIRECTIONS {
                let angle = step as f32 * std::f32::consts::TAU / RESTART_DIRECTIONS as f32;
                let candidate = spot + Vec2::from_angle(angle) * distance;
                if fits(candidate) {
                    log::debug!(
                        "Restart spot ({:.2}, {:.2}) blocked, ball placed at ({:.2}, {:.2})",
                        spot.x,
                        spot.y,
                        candidate.x,
                        candidate.y
                    );
                    return candidate;
                }
            }
        }
        log::warn!("No free restart spot near ({:.2}, {:.2})", spot.x, spot.y);
        spot
    }

    /// Commit the act once everything is at rest and set up the restart
    pub fn ball_at_final_position(&mut self, online_mode: bool) -> Result<TurnResolution, RulesError> {
        if !self.world.is_world_stable() {
            return Err(RulesError::WorldNotStable);
        }
        let mut resolution = self.rules.ball_at_final_position(&mut self.stats);

        if let Some(spot) = resolution.restart_spot {
            resolution.restart_spot = Some(self.place_ball(spot)?);
        }
        if resolution.state != PlayState::Normal {
            self.replication.queue_effect(EffectKind::Whistle, resolution.restart_spot.unwrap_or_default());
        }
        if online_mode {
            self.replication.queue_rules(&resolution);
        }
        Ok(resolution)
    }

    pub fn new_turn(&mut self) -> TeamId {
        self.rules.new_turn()
    }

    /// True exactly once, when the running half ends
    pub fn update_clock(&mut self, delta_ms: f64) -> bool {
        self.rules.update_clock(delta_ms)
    }

    /// Swap ends and put the ball on the centre spot
    pub fn start_second_half(&mut self) -> Result<(), RulesError> {
        self.rules.start_second_half()?;
        self.place_ball(self.geometry.center_spot())?;
        Ok(())
    }

    // --- Persistence ---

    /// Rules state as a sealed save string
    pub fn save(&self) -> Result<String, PersistenceError> {
        SaveEnvelope::encode(&self.rules.snapshot())
    }

    /// Replace the rules state from a save string
    pub fn load(&mut self, save: &str) -> Result<(), PersistenceError> {
        let state = SaveEnvelope::decode(save)?;
        self.rules.restore(state)?;
        Ok(())
    }

    // --- Accessors ---

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn geometry(&self) -> &FieldGeometry {
        &self.geometry
    }

    pub fn settings(&self) -> &MatchSettings {
        &self.settings
    }

    pub fn statistics(&self) -> &S {
        &self.stats
    }

    pub fn replication(&self) -> &R {
        &self.replication
    }

    pub fn replication_mut(&mut self) -> &mut R {
        &mut self.replication
    }

    pub fn team(&self, id: TeamId) -> Option<&Team> {
        self.teams[id.index()].as_ref()
    }

    pub fn ball(&self) -> ObjectId {
        self.ball
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::events::ReplicationMessage;
    use crate::sim::rules::{DisallowReason, TurnOutcome};
    use crate::sim::stats::NoStatistics;

    const SETTLE_FRAMES: u32 = 6000;

    fn session() -> MatchSession {
        MatchSession::new(FieldGeometry::standard(), MatchSettings::default(), 7).unwrap()
    }

    /// One disk for the team to act, placed at `at`
    fn striker(session: &mut MatchSession, at: Vec2) -> ObjectId {
        let team = session.rules().active_team();
        let setup = TeamSetup { name: format!("{team:?}"), disks: vec![at], goalkeeper: None };
        session.spawn_team(team, &setup).disks[0]
    }

    #[test]
    fn test_coin_toss_is_seeded() {
        for seed in [1, 2, 3, 99] {
            let a = MatchSession::new(FieldGeometry::standard(), MatchSettings::default(), seed).unwrap();
            let b = MatchSession::new(FieldGeometry::standard(), MatchSettings::default(), seed).unwrap();
            assert_eq!(a.rules().active_team(), b.rules().active_team());
            assert_eq!(a.rules().upper_team(), b.rules().upper_team());
        }
    }

    #[test]
    fn test_invalid_geometry_is_rejected() {
        let mut geometry = FieldGeometry::standard();
        geometry.penalty_area_delta.x = 100.0;
        assert!(MatchSession::new(geometry, MatchSettings::default(), 0).is_err());
    }

    #[test]
    fn test_teleport_then_forced_step() {
        let mut session = session();
        let ball = session.ball();
        assert!(session.is_world_stable());

        session.set_position(ball, Vec2::new(3.0, 3.0)).unwrap();
        assert!(!session.is_world_stable());
        session.forced_step();
        assert!(session.is_world_stable());
        assert!(session.classifier.is_enabled());
    }

    #[test]
    fn test_rejected_shot_applies_no_impulse() {
        let mut session = session();
        let other = session.rules().active_team().other();
        let setup = TeamSetup { name: "Visitors".into(), disks: vec![Vec2::new(-4.0, 4.0)], goalkeeper: None };
        let disk = session.spawn_team(other, &setup).disks[0];

        assert_eq!(session.shoot(disk, Vec2::new(5.0, 0.0)), Err(RulesError::NotYourTurn { team: other }));
        assert!(session.is_world_stable());
        assert_eq!(session.world().velocity(disk), Some(Vec2::ZERO));
    }

    #[test]
    fn test_resolution_waits_for_rest() {
        let mut session = session();
        let disk = striker(&mut session, Vec2::new(-5.0, 5.0));
        session.shoot(disk, Vec2::new(4.0, 0.0)).unwrap();
        session.step(session.world().substep_ms());
        let touches = session.rules().remaining_global_touches();

        assert_eq!(session.ball_at_final_position(false), Err(RulesError::WorldNotStable));
        assert_eq!(session.rules().remaining_global_touches(), touches);
        assert_eq!(session.rules().state(), PlayState::Middle);
    }

    #[test]
    fn test_settle_cap_then_freeze() {
        let mut session = session();
        let disk = striker(&mut session, Vec2::new(-5.0, 5.0));
        session.shoot(disk, Vec2::new(8.0, 0.0)).unwrap();

        assert_eq!(session.settle(1), Err(RulesError::Unsettled { steps: 1 }));
        session.freeze();
        assert!(session.is_world_stable());
        assert_eq!(session.settle(10), Ok(0));
    }

    #[test]
    fn test_kicked_ball_leaves_at_side_line() {
        let mut session = session();
        let ball = session.ball();
        let acting = session.rules().active_team();
        session.set_position(ball, Vec2::new(0.0, 9.0)).unwrap();
        session.forced_step();
        let disk = striker(&mut session, Vec2::new(0.0, 7.4));

        session.shoot(disk, Vec2::new(0.0, 12.0)).unwrap();
        session.settle(SETTLE_FRAMES).unwrap();
        assert!(session.rules().side_exit().is_some());
        assert_eq!(session.rules().last_ball_collided(), Some(acting));

        let resolution = session.ball_at_final_position(true).unwrap();
        assert_eq!(resolution.outcome, TurnOutcome::ThrowIn);
        assert_eq!(resolution.team_to_act, acting.other());
        // On the side line unless a piece rests there
        let spot = resolution.restart_spot.unwrap();
        let sideline = session.geometry().sideline_z();
        assert!(spot.y <= sideline && spot.y > sideline - 1.5);
        assert_eq!(session.world().position(ball), Some(spot));
        assert!(session.world().is_clear(ball, spot, 0.0));
        assert!(session.is_world_stable());
        assert!(
            session
                .replication()
                .messages()
                .iter()
                .any(|m| matches!(m, ReplicationMessage::Resolution(r) if r == &resolution))
        );
        assert_eq!(session.statistics().team(acting).ball_touches, 1);
    }

    /// Ball just outside the goal the acting team attacks, one disk behind it
    fn shot_on_goal(session: &mut MatchSession) -> (ObjectId, Vec2, bool) {
        let acting = session.rules().active_team();
        let attacks_upper = session.rules().upper_team() != acting;
        let sign = if attacks_upper { 1.0 } else { -1.0 };
        let ball = session.ball();
        session.set_position(ball, Vec2::new(sign * 16.5, 0.0)).unwrap();
        session.forced_step();
        let disk = striker(session, Vec2::new(sign * 15.0, 0.0));
        (disk, Vec2::new(sign * 15.0, 0.0), attacks_upper)
    }

    #[test]
    fn test_goal_straight_from_kickoff_is_disallowed() {
        let mut session = session();
        let acting = session.rules().active_team();
        let (disk, impulse, attacks_upper) = shot_on_goal(&mut session);
        assert_eq!(session.rules().state(), PlayState::Middle);

        session.announce_shot();
        session.shoot(disk, impulse).unwrap();
        session.settle(SETTLE_FRAMES).unwrap();
        assert_eq!(session.rules().pending_goal(), Some(attacks_upper));

        let resolution = session.ball_at_final_position(false).unwrap();
        assert_eq!(
            resolution.outcome,
            TurnOutcome::GoalDisallowed { reason: DisallowReason::IndirectRestart }
        );
        assert_eq!(resolution.state, PlayState::GoalKick);
        assert_eq!(resolution.team_to_act, acting.other());
        assert_eq!(session.rules().score().get(acting), 0);
        assert_eq!(session.rules().pending_goal(), None);
    }

    #[test]
    fn test_announced_goal_in_open_play_counts() {
        let mut session = session();
        let acting = session.rules().active_team();
        let mut state = session.rules().snapshot();
        state.state = PlayState::Normal;
        session.load(&SaveEnvelope::encode(&state).unwrap()).unwrap();
        let (disk, impulse, _) = shot_on_goal(&mut session);

        session.announce_shot();
        session.shoot(disk, impulse).unwrap();
        session.settle(SETTLE_FRAMES).unwrap();

        let resolution = session.ball_at_final_position(false).unwrap();
        assert_eq!(resolution.outcome, TurnOutcome::Goal { scorer: acting, own_goal: false });
        assert_eq!(session.rules().score().get(acting), 1);
        assert_eq!(session.rules().score().get(acting.other()), 0);
        // Conceding team kicks off from the centre
        assert_eq!(resolution.state, PlayState::Middle);
        assert_eq!(resolution.team_to_act, acting.other());
        assert_eq!(session.world().position(session.ball()), Some(Vec2::ZERO));
    }

    #[test]
    fn test_ball_placed_on_touching_disks_stays_quiet() {
        let geometry = FieldGeometry::standard();
        let mut session =
            MatchSession::with_sinks(geometry, MatchSettings::default(), 7, NoStatistics, ReplicationQueue::new())
                .unwrap();
        let home = TeamSetup { name: "Home".into(), disks: vec![Vec2::new(2.0, 5.0)], goalkeeper: None };
        let away = TeamSetup { name: "Away".into(), disks: vec![Vec2::new(3.6, 5.0)], goalkeeper: None };
        session.spawn_team(TeamId::Home, &home);
        session.spawn_team(TeamId::Away, &away);
        let ball = session.ball();

        // Right between the two disks, overlapping both
        let spot = session.place_ball(Vec2::new(2.8, 5.0)).unwrap();
        assert_ne!(spot, Vec2::new(2.8, 5.0));
        assert!(session.world().is_clear(ball, spot, 0.0));
        assert!(session.is_world_stable());

        for _ in 0..5 {
            session.step(session.world().substep_ms());
        }
        assert!(session.is_world_stable());
        assert_eq!(session.world().position(ball), Some(spot));
        assert_eq!(session.rules().first_contact(), None);
        assert_eq!(session.rules().last_ball_collided(), None);
    }

    #[test]
    fn test_free_kick_restart_fires_no_events() {
        let mut session = session();
        let acting = session.rules().active_team();
        let disk = striker(&mut session, Vec2::new(0.0, 5.0));
        let setup = TeamSetup { name: "Wall".into(), disks: vec![Vec2::new(2.5, 5.0)], goalkeeper: None };
        session.spawn_team(acting.other(), &setup);

        session.shoot(disk, Vec2::new(6.0, 0.0)).unwrap();
        session.settle(SETTLE_FRAMES).unwrap();
        let resolution = session.ball_at_final_position(false).unwrap();
        assert_eq!(resolution.outcome, TurnOutcome::Foul { fouled: acting.other(), penalty: false });
        assert_eq!(resolution.state, PlayState::FreeKick);
        let spot = resolution.restart_spot.unwrap();
        assert_eq!(session.world().position(session.ball()), Some(spot));

        session.new_turn();
        for _ in 0..5 {
            session.step(session.world().substep_ms());
        }
        assert!(session.is_world_stable());
        assert_eq!(session.rules().first_contact(), None);
        assert_eq!(session.rules().last_ball_collided(), None);
    }

    #[test]
    fn test_step_replicates_moving_pieces() {
        let mut session = session();
        let disk = striker(&mut session, Vec2::new(-5.0, -5.0));
        session.shoot(disk, Vec2::new(0.0, 3.0)).unwrap();
        session.step(session.world().substep_ms() * 2.0);

        let drained = session.replication_mut().drain();
        assert!(
            drained
                .iter()
                .any(|m| matches!(m, ReplicationMessage::Transform { id, .. } if *id == disk))
        );
    }

    #[test]
    fn test_save_and_load_rules() {
        let mut session = session();
        let saved = session.save().unwrap();
        let team = session.rules().active_team();

        let mut other = MatchSession::new(FieldGeometry::standard(), MatchSettings::default(), 1234).unwrap();
        other.load(&saved).unwrap();
        assert_eq!(other.rules().active_team(), team);
        assert_eq!(other.rules().snapshot(), session.rules().snapshot());

        session.update_clock(1000.0);
        assert!(session.load("{\"broken\":true}").is_err());
    }

    #[test]
    fn test_second_half_recentres_ball() {
        let mut session = session();
        let ball = session.ball();
        session.set_position(ball, Vec2::new(4.0, 4.0)).unwrap();
        session.forced_step();
        let half = session.settings().rules.half_length_ms();
        assert!(session.update_clock(half));

        session.start_second_half().unwrap();
        assert_eq!(session.world().position(ball), Some(Vec2::ZERO));
        assert!(session.start_second_half().is_err());
    }
}
