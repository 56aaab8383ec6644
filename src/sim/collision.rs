//! Collision classification: raw rapier contacts to rules events
//!
//! Runs once per substep inside the tick callback. Turns each touching pair
//! of field objects into at most one `CollisionEvent` per tick.

use std::collections::HashSet;

use glam::Vec2;

use super::events::{CollisionEvent, RulesEvent};
use super::field::{BallExit, FieldGeometry};
use super::object::{ObjectId, ObjectKind, TeamId};
use super::world::{PhysicsWorld, RawContact};

/// Goalkeeper contacts are reported at the x of the penalty-area line of the
/// goal the keeper defends. The line counts as inside the area, so a foul by
/// the keeper's team is a penalty whenever the contact z lies within the
/// area, and a foul on the keeper is a free kick on the opponents' area line.
pub const KEEPER_CONTACT_SNAPS_TO_AREA_EDGE: bool = true;

/// Per-tick facts the classifier needs from the rules
#[derive(Debug, Clone, Copy)]
pub struct ClassifyContext {
    pub acting_disk: Option<ObjectId>,
    /// Team defending the +x goal
    pub upper_team: TeamId,
    pub now_ms: f64,
    pub area_edges: AreaEdges,
}

/// X of each penalty-area line facing the field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaEdges {
    pub upper: f32,
    pub lower: f32,
}

impl AreaEdges {
    pub fn from_geometry(geometry: &FieldGeometry) -> Self {
        Self {
            upper: geometry.penalty_area_edge_x(true),
            lower: geometry.penalty_area_edge_x(false),
        }
    }
}

/// Contact filter with the rules-enable latch
#[derive(Debug, Clone)]
pub struct CollisionClassifier {
    enabled: bool,
    new_collision_threshold_ms: f64,
}

impl CollisionClassifier {
    pub fn new(new_collision_threshold_ms: f64) -> Self {
        Self { enabled: true, new_collision_threshold_ms }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Classify one tick of contacts
    ///
    /// Collision timers are stamped for every contact, relevant or not, and
    /// even while the latch is off.
    pub fn classify(
        &self,
        contacts: &[RawContact],
        world: &mut PhysicsWorld,
        ctx: &ClassifyContext,
    ) -> Vec<CollisionEvent> {
        let mut seen = HashSet::new();
        let mut events = Vec::new();

        for contact in contacts {
            let key = (contact.a.min(contact.b), contact.a.max(contact.b));
            if !seen.insert(key) {
                continue;
            }
            let (Some(a), Some(b)) = (world.object(contact.a), world.object(contact.b)) else {
                continue;
            };

            let relevant = ctx.acting_disk.is_some_and(|d| d == a.id || d == b.id)
                || a.motion.any()
                || b.motion.any();
            let threshold = self.new_collision_threshold_ms;
            let is_new = [a, b].iter().any(|o| {
                o.since_last_collision(ctx.now_ms).is_none_or(|gap| gap > threshold)
            });
            let kinds = (a.kind, b.kind);
            let (id_a, id_b) = (a.id, b.id);

            for id in [id_a, id_b] {
                if let Some(object) = world.object_mut(id) {
                    object.last_collision_ms = Some(ctx.now_ms);
                }
            }

            if !self.enabled || !relevant {
                continue;
            }
            let rules = rules_event(kinds, (id_a, id_b), contact.point, ctx);
            if let Some(event) = &rules {
                log::debug!("{id_a:?} x {id_b:?}: {event:?}");
            }
            events.push(CollisionEvent { a: id_a, b: id_b, kinds, point: contact.point, is_new, rules });
        }
        events
    }
}

/// Rules meaning of a contact between two kinds of object
fn rules_event(
    kinds: (ObjectKind, ObjectKind),
    ids: (ObjectId, ObjectId),
    point: Vec2,
    ctx: &ClassifyContext,
) -> Option<RulesEvent> {
    use ObjectKind::*;
    match kinds {
        (Disk { team: team_a }, Disk { team: team_b }) => {
            Some(RulesEvent::DiskCollideDisk { team_a, team_b, contact: point })
        }
        (GoalKeeper { team: keeper }, Disk { team: other } | GoalKeeper { team: other }) => {
            Some(keeper_contact(keeper, other, point, ctx))
        }
        (Disk { team: other }, GoalKeeper { team: keeper }) => {
            Some(keeper_contact(keeper, other, point, ctx))
        }
        (Ball, Disk { team } | GoalKeeper { team }) => {
            Some(RulesEvent::BallCollideDisk { team, disk: ids.1 })
        }
        (Disk { team } | GoalKeeper { team }, Ball) => {
            Some(RulesEvent::BallCollideDisk { team, disk: ids.0 })
        }
        _ => None,
    }
}

fn keeper_contact(keeper: TeamId, other: TeamId, point: Vec2, ctx: &ClassifyContext) -> RulesEvent {
    let mut contact = point;
    if KEEPER_CONTACT_SNAPS_TO_AREA_EDGE {
        contact.x = if keeper == ctx.upper_team {
            ctx.area_edges.upper
        } else {
            ctx.area_edges.lower
        };
    }
    RulesEvent::DiskCollideDisk { team_a: other, team_b: keeper, contact }
}

/// Goal entry and field exits for the ball's current position
///
/// Goal boxes are checked first; a ball inside a goal is also past the byline.
pub fn check_ball_limits(world: &PhysicsWorld, geometry: &FieldGeometry) -> Vec<RulesEvent> {
    let Some(ball) = world.ball() else {
        return Vec::new();
    };
    let Some(center) = world.position(ball.id) else {
        return Vec::new();
    };

    let mut events = Vec::new();
    for upper in [true, false] {
        if geometry.ball_in_goal(upper, center, ball.radius) {
            events.push(RulesEvent::BallEnterGoal { upper });
        }
    }
    match geometry.field_exit(center, ball.radius) {
        Some(BallExit::Byline { upper, z }) => events.push(RulesEvent::BallExitAtByline { upper, z }),
        Some(BallExit::Side { x, z }) => events.push(RulesEvent::BallExitAtSide { x, z }),
        None => {}
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::PhysicsSettings;

    fn setup() -> (PhysicsWorld, FieldGeometry) {
        let geometry = FieldGeometry::standard();
        let world = PhysicsWorld::new(&geometry, PhysicsSettings::default());
        (world, geometry)
    }

    fn ctx(geometry: &FieldGeometry, acting_disk: Option<ObjectId>, now_ms: f64) -> ClassifyContext {
        ClassifyContext {
            acting_disk,
            upper_team: TeamId::Away,
            now_ms,
            area_edges: AreaEdges::from_geometry(geometry),
        }
    }

    fn contact(a: ObjectId, b: ObjectId, point: Vec2) -> RawContact {
        RawContact { a, b, point }
    }

    #[test]
    fn test_resting_pair_is_ignored_but_stamped() {
        let (mut world, geometry) = setup();
        let a = world.spawn(ObjectKind::Disk { team: TeamId::Home }, Vec2::ZERO, 0.75);
        let b = world.spawn(ObjectKind::Disk { team: TeamId::Away }, Vec2::new(1.5, 0.0), 0.75);
        let classifier = CollisionClassifier::new(50.0);

        let events = classifier.classify(&[contact(a, b, Vec2::new(0.75, 0.0))], &mut world, &ctx(&geometry, None, 10.0));
        assert!(events.is_empty());
        assert_eq!(world.object(a).unwrap().last_collision_ms, Some(10.0));
        assert_eq!(world.object(b).unwrap().last_collision_ms, Some(10.0));
    }

    #[test]
    fn test_acting_disk_contact_is_classified_once() {
        let (mut world, geometry) = setup();
        let a = world.spawn(ObjectKind::Disk { team: TeamId::Home }, Vec2::ZERO, 0.75);
        let b = world.spawn(ObjectKind::Disk { team: TeamId::Away }, Vec2::new(1.5, 0.0), 0.75);
        let classifier = CollisionClassifier::new(50.0);
        let point = Vec2::new(0.75, 0.0);

        let events = classifier.classify(
            &[contact(a, b, point), contact(b, a, point)],
            &mut world,
            &ctx(&geometry, Some(a), 0.0),
        );
        assert_eq!(events.len(), 1);
        assert!(events[0].is_new);
        assert_eq!(
            events[0].rules,
            Some(RulesEvent::DiskCollideDisk { team_a: TeamId::Home, team_b: TeamId::Away, contact: point })
        );

        // Same pair 20 ms later is not a new collision
        let events = classifier.classify(&[contact(a, b, point)], &mut world, &ctx(&geometry, Some(a), 20.0));
        assert!(!events[0].is_new);
        let events = classifier.classify(&[contact(a, b, point)], &mut world, &ctx(&geometry, Some(a), 100.0));
        assert!(events[0].is_new);
    }

    #[test]
    fn test_ball_contact_names_the_disk() {
        let (mut world, geometry) = setup();
        let ball = world.spawn(ObjectKind::Ball, Vec2::ZERO, 0.3);
        let disk = world.spawn(ObjectKind::Disk { team: TeamId::Away }, Vec2::new(1.05, 0.0), 0.75);
        let classifier = CollisionClassifier::new(50.0);

        let events = classifier.classify(
            &[contact(ball, disk, Vec2::new(0.3, 0.0))],
            &mut world,
            &ctx(&geometry, Some(disk), 0.0),
        );
        assert_eq!(events[0].rules, Some(RulesEvent::BallCollideDisk { team: TeamId::Away, disk }));
    }

    #[test]
    fn test_keeper_contact_snaps_to_area_line() {
        let (mut world, geometry) = setup();
        // Away defends the upper goal
        let keeper = world.spawn(ObjectKind::GoalKeeper { team: TeamId::Away }, Vec2::new(15.0, 0.0), 0.9);
        let striker = world.spawn(ObjectKind::Disk { team: TeamId::Home }, Vec2::new(13.4, 0.0), 0.75);
        let classifier = CollisionClassifier::new(50.0);

        let events = classifier.classify(
            &[contact(keeper, striker, Vec2::new(14.1, 0.5))],
            &mut world,
            &ctx(&geometry, Some(striker), 0.0),
        );
        let Some(RulesEvent::DiskCollideDisk { team_a, team_b, contact }) = events[0].rules else {
            panic!("expected a disk contact, got {:?}", events[0].rules);
        };
        assert_eq!((team_a, team_b), (TeamId::Home, TeamId::Away));
        assert_eq!(contact.x, geometry.penalty_area_edge_x(true));
        assert_eq!(contact.y, 0.5);
        assert!(geometry.is_inner_penalty_area(true, contact));
    }

    #[test]
    fn test_foul_by_keeper_team_on_area_line_is_penalty() {
        use crate::settings::RulesConfig;
        use crate::sim::rules::{Rules, TurnOutcome};
        use crate::sim::stats::MatchStatistics;

        let (mut world, geometry) = setup();
        let keeper = world.spawn(ObjectKind::GoalKeeper { team: TeamId::Away }, Vec2::new(15.0, 0.0), 0.9);
        let striker = world.spawn(ObjectKind::Disk { team: TeamId::Home }, Vec2::new(13.4, 0.0), 0.75);
        let classifier = CollisionClassifier::new(50.0);
        let events = classifier.classify(
            &[contact(keeper, striker, Vec2::new(14.1, -2.0))],
            &mut world,
            &ctx(&geometry, Some(keeper), 0.0),
        );
        let event = events[0].rules.unwrap();

        // Away acts and defends the upper goal
        let mut stats = MatchStatistics::new();
        let mut rules = Rules::new(RulesConfig::default(), geometry.clone(), TeamId::Away, TeamId::Away);
        rules.apply(event, &mut stats);
        let resolution = rules.ball_at_final_position(&mut stats);
        assert_eq!(resolution.outcome, TurnOutcome::Foul { fouled: TeamId::Home, penalty: true });
        assert_eq!(resolution.restart_spot, Some(geometry.penalty_mark(true)));
    }

    #[test]
    fn test_disabled_latch_emits_nothing() {
        let (mut world, geometry) = setup();
        let a = world.spawn(ObjectKind::Disk { team: TeamId::Home }, Vec2::ZERO, 0.75);
        let b = world.spawn(ObjectKind::Disk { team: TeamId::Home }, Vec2::new(1.5, 0.0), 0.75);
        let mut classifier = CollisionClassifier::new(50.0);
        classifier.set_enabled(false);

        let events = classifier.classify(&[contact(a, b, Vec2::ZERO)], &mut world, &ctx(&geometry, Some(a), 5.0));
        assert!(events.is_empty());
        assert_eq!(world.object(a).unwrap().last_collision_ms, Some(5.0));
    }

    #[test]
    fn test_post_contact_has_no_rules_meaning() {
        let (mut world, geometry) = setup();
        let post = world
            .objects()
            .iter()
            .find(|o| matches!(o.kind, ObjectKind::Goal { .. }))
            .map(|o| o.id)
            .unwrap();
        let ball = world.spawn(ObjectKind::Ball, Vec2::new(16.0, 2.0), 0.3);
        world.set_position(ball, Vec2::new(16.5, 2.2)).unwrap();
        let classifier = CollisionClassifier::new(50.0);

        let events = classifier.classify(&[contact(post, ball, Vec2::new(16.9, 2.5))], &mut world, &ctx(&geometry, None, 0.0));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].rules, None);
    }

    #[test]
    fn test_ball_limits() {
        let (mut world, geometry) = setup();
        let ball = world.spawn(ObjectKind::Ball, Vec2::ZERO, 0.3);
        assert!(check_ball_limits(&world, &geometry).is_empty());

        world.set_position(ball, Vec2::new(0.0, geometry.sideline_z() + 0.5)).unwrap();
        assert!(matches!(
            check_ball_limits(&world, &geometry)[..],
            [RulesEvent::BallExitAtSide { .. }]
        ));

        world.set_position(ball, Vec2::new(geometry.byline_x() + 0.6, 0.0)).unwrap();
        assert_eq!(
            check_ball_limits(&world, &geometry),
            vec![
                RulesEvent::BallEnterGoal { upper: true },
                RulesEvent::BallExitAtByline { upper: true, z: 0.0 },
            ]
        );
    }
}
