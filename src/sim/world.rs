//! Physics world: rapier2d bodies for the table and its pieces
//!
//! The world owns the object arena. Every collider that matters to the rules
//! carries `ObjectId::to_user_data` so contacts can be mapped back; border
//! walls stay untagged.

use glam::Vec2;
use rapier2d::prelude::*;

use super::field::FieldGeometry;
use super::object::{FieldObject, ObjectId, ObjectKind};
use crate::error::RulesError;
use crate::settings::PhysicsSettings;
use crate::{from_physics, to_physics};

/// Goal net wall thickness
const NET_THICKNESS: f32 = 0.1;

/// One touching collider pair, tagged on both sides
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawContact {
    pub a: ObjectId,
    pub b: ObjectId,
    /// World contact point
    pub point: Vec2,
}

pub struct PhysicsWorld {
    pipeline: PhysicsPipeline,
    gravity: Vector<Real>,
    integration_params: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    settings: PhysicsSettings,
    objects: Vec<FieldObject>,
    ball: Option<ObjectId>,
    /// Unsimulated time carried to the next frame
    accumulator_ms: f64,
    /// Simulated time since creation
    now_ms: f64,
}

impl PhysicsWorld {
    /// Build the table: border walls, goalposts and goal nets
    pub fn new(geometry: &FieldGeometry, settings: PhysicsSettings) -> Self {
        let integration_params = IntegrationParameters { dt: settings.sim_dt, ..Default::default() };
        let mut world = Self {
            pipeline: PhysicsPipeline::new(),
            // Top-down table: no gravity in the simulated plane
            gravity: vector![0.0, 0.0],
            integration_params,
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            settings,
            objects: Vec::new(),
            ball: None,
            accumulator_ms: 0.0,
            now_ms: 0.0,
        };
        world.build_walls(geometry);
        world.build_goals(geometry);
        log::debug!("Physics world built with {} static objects", world.objects.len());
        world
    }

    fn build_walls(&mut self, geometry: &FieldGeometry) {
        let half = geometry.half_extents;
        let border = geometry.border;
        let walls = self.bodies.insert(RigidBodyBuilder::fixed().build());

        let x = half.x + border.x * 0.5;
        let z = half.y + border.y * 0.5;
        let shapes = [
            (Vec2::new(x, 0.0), Vec2::new(border.x * 0.5, half.y + border.y)),
            (Vec2::new(-x, 0.0), Vec2::new(border.x * 0.5, half.y + border.y)),
            (Vec2::new(0.0, z), Vec2::new(half.x + border.x, border.y * 0.5)),
            (Vec2::new(0.0, -z), Vec2::new(half.x + border.x, border.y * 0.5)),
        ];
        for (center, half_size) in shapes {
            let collider = ColliderBuilder::cuboid(half_size.x, half_size.y)
                .translation(to_physics(center))
                .restitution(self.settings.restitution)
                .build();
            self.colliders.insert_with_parent(collider, walls, &mut self.bodies);
        }
    }

    fn build_goals(&mut self, geometry: &FieldGeometry) {
        for post in &geometry.goalposts {
            let id = self.next_id();
            let body = self
                .bodies
                .insert(RigidBodyBuilder::fixed().translation(to_physics(post.center)).build());
            let collider = ColliderBuilder::ball(post.radius)
                .restitution(self.settings.restitution)
                .user_data(id.to_user_data())
                .build();
            self.colliders.insert_with_parent(collider, body, &mut self.bodies);
            let kind = ObjectKind::Goal { upper: post.center.x > 0.0 };
            self.objects.push(FieldObject::new(id, kind, post.radius, body, post.center));
        }

        for upper in [true, false] {
            let goal = *geometry.goal(upper);
            let id = self.next_id();
            let center = goal.center();
            let half = goal.half_size();
            let body = self.bodies.insert(RigidBodyBuilder::fixed().build());

            // Back wall plus the two sides; the mouth stays open
            let back_x = if upper { goal.max.x } else { goal.min.x };
            let walls = [
                (Vec2::new(back_x, center.y), Vec2::new(NET_THICKNESS, half.y)),
                (Vec2::new(center.x, goal.max.y), Vec2::new(half.x, NET_THICKNESS)),
                (Vec2::new(center.x, goal.min.y), Vec2::new(half.x, NET_THICKNESS)),
            ];
            for (at, half_size) in walls {
                let collider = ColliderBuilder::cuboid(half_size.x, half_size.y)
                    .translation(to_physics(at))
                    // Nets absorb the ball
                    .restitution(0.0)
                    .user_data(id.to_user_data())
                    .build();
                self.colliders.insert_with_parent(collider, body, &mut self.bodies);
            }
            let kind = ObjectKind::GoalNet { upper };
            self.objects.push(FieldObject::new(id, kind, half.length(), body, center));
        }
    }

    fn next_id(&self) -> ObjectId {
        ObjectId(self.objects.len() as u32)
    }

    /// Add a ball, disk or goalkeeper resting at `at`
    pub fn spawn(&mut self, kind: ObjectKind, at: Vec2, radius: f32) -> ObjectId {
        let id = self.next_id();
        let body = RigidBodyBuilder::dynamic()
            .translation(to_physics(at))
            .linear_damping(self.settings.linear_damping)
            .angular_damping(self.settings.angular_damping)
            .ccd_enabled(true)
            .build();
        let body = self.bodies.insert(body);
        let collider = ColliderBuilder::ball(radius)
            .restitution(self.settings.restitution)
            .user_data(id.to_user_data())
            .build();
        self.colliders.insert_with_parent(collider, body, &mut self.bodies);

        self.objects.push(FieldObject::new(id, kind, radius, body, at));
        if kind == ObjectKind::Ball {
            self.ball = Some(id);
        }
        log::debug!("Spawned {kind:?} as {id:?} at ({:.2}, {:.2})", at.x, at.y);
        id
    }

    // --- Stepping ---

    /// Advance by `delta_ms` in fixed substeps, calling `on_tick` after each
    ///
    /// Moved flags are shifted once per frame, before the first substep, and
    /// stay sticky across the substeps of that frame. Returns the number of
    /// substeps run.
    pub fn step<F>(&mut self, delta_ms: f64, mut on_tick: F) -> u32
    where
        F: FnMut(&mut Self),
    {
        let dt_ms = self.substep_ms();
        let max_substeps = self.settings.max_substeps;
        // Drop backlog beyond what one frame may simulate
        self.accumulator_ms += delta_ms.clamp(0.0, dt_ms * f64::from(max_substeps));

        let mut substeps = 0;
        while self.accumulator_ms >= dt_ms && substeps < max_substeps {
            if substeps == 0 {
                for object in self.objects.iter_mut().filter(|o| o.kind.is_tracked()) {
                    object.pre_physics_step();
                }
            }
            self.substep();
            self.accumulator_ms -= dt_ms;
            self.now_ms += dt_ms;
            substeps += 1;
            self.observe_motion();
            on_tick(self);
        }
        substeps
    }

    /// One substep that leaves the world at rest bookkeeping-wise
    ///
    /// Used after teleports so overlapping pieces separate before play
    /// resumes. Every object's transform becomes its new baseline.
    pub fn forced_step(&mut self) {
        self.substep();
        self.now_ms += self.substep_ms();
        self.rebase_all();
    }

    fn substep(&mut self) {
        self.pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
    }

    fn observe_motion(&mut self) {
        let tolerance = self.settings.move_tolerance;
        for object in self.objects.iter_mut().filter(|o| o.kind.is_tracked()) {
            if let Some(rb) = self.bodies.get(object.body) {
                object.observe_transform(from_physics(rb.translation()), rb.rotation().angle(), tolerance);
            }
        }
    }

    fn rebase_all(&mut self) {
        for object in &mut self.objects {
            if let Some(rb) = self.bodies.get(object.body) {
                object.rebase(from_physics(rb.translation()), rb.rotation().angle());
            }
        }
    }

    /// Touching pairs of tagged colliders, sorted by id pair
    pub fn contacts(&self) -> Vec<RawContact> {
        let mut contacts = Vec::new();
        for pair in self.narrow_phase.contact_pairs() {
            if !pair.has_any_active_contact {
                continue;
            }
            let tag = |handle: ColliderHandle| {
                self.colliders.get(handle).and_then(|c| ObjectId::from_user_data(c.user_data))
            };
            let (Some(a), Some(b)) = (tag(pair.collider1), tag(pair.collider2)) else {
                continue;
            };
            if a == b {
                continue;
            }

            let point = pair
                .manifolds
                .iter()
                .flat_map(|m| m.data.solver_contacts.iter())
                .map(|c| Vec2::new(c.point.x, c.point.y))
                .next()
                .or_else(|| self.surface_point(a, b));
            if let Some(point) = point {
                contacts.push(RawContact { a, b, point });
            }
        }
        contacts.sort_by_key(|c| (c.a.min(c.b), c.a.max(c.b)));
        contacts
    }

    /// Point between two objects on the surface of `a`
    fn surface_point(&self, a: ObjectId, b: ObjectId) -> Option<Vec2> {
        let pa = self.position(a)?;
        let pb = self.position(b)?;
        let radius = self.object(a)?.radius;
        Some(pa + (pb - pa).normalize_or_zero() * radius)
    }

    // --- Object access ---

    pub fn object(&self, id: ObjectId) -> Option<&FieldObject> {
        self.objects.get(id.index())
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut FieldObject> {
        self.objects.get_mut(id.index())
    }

    pub fn objects(&self) -> &[FieldObject] {
        &self.objects
    }

    pub fn ball(&self) -> Option<&FieldObject> {
        self.ball.and_then(|id| self.object(id))
    }

    fn body(&self, id: ObjectId) -> Option<&RigidBody> {
        self.object(id).and_then(|o| self.bodies.get(o.body))
    }

    fn body_mut(&mut self, id: ObjectId) -> Result<&mut RigidBody, RulesError> {
        let handle = self.object(id).ok_or(RulesError::UnknownObject(id))?.body;
        self.bodies.get_mut(handle).ok_or(RulesError::UnknownObject(id))
    }

    pub fn position(&self, id: ObjectId) -> Option<Vec2> {
        self.body(id).map(|rb| from_physics(rb.translation()))
    }

    pub fn rotation(&self, id: ObjectId) -> Option<f32> {
        self.body(id).map(|rb| rb.rotation().angle())
    }

    pub fn velocity(&self, id: ObjectId) -> Option<Vec2> {
        self.body(id).map(|rb| from_physics(rb.linvel()))
    }

    /// Length of one fixed substep in milliseconds
    pub fn substep_ms(&self) -> f64 {
        f64::from(self.settings.sim_dt) * 1000.0
    }

    /// Simulated time in milliseconds
    pub fn now_ms(&self) -> f64 {
        self.now_ms
    }

    pub fn settings(&self) -> &PhysicsSettings {
        &self.settings
    }

    /// Whether `id` could sit at `at` with `clearance` to every piece and post
    ///
    /// Pieces and posts are circles; nets and border walls are ignored.
    pub fn is_clear(&self, id: ObjectId, at: Vec2, clearance: f32) -> bool {
        let Some(radius) = self.object(id).map(|o| o.radius) else {
            return false;
        };
        self.objects
            .iter()
            .filter(|o| o.id != id && !matches!(o.kind, ObjectKind::GoalNet { .. }))
            .all(|o| {
                self.position(o.id)
                    .is_none_or(|p| p.distance(at) >= radius + o.radius + clearance)
            })
    }

    // --- Mutation ---

    /// Teleport a piece and stop it
    ///
    /// The motion baseline is kept, so the world reads as unstable until the
    /// piece has rested through a full step.
    pub fn set_position(&mut self, id: ObjectId, position: Vec2) -> Result<(), RulesError> {
        let rb = self.body_mut(id)?;
        rb.set_translation(to_physics(position), true);
        rb.set_linvel(vector![0.0, 0.0], true);
        rb.set_angvel(0.0, true);
        if let Some(object) = self.object_mut(id) {
            object.motion.moved_this_step = true;
        }
        Ok(())
    }

    /// Kick a piece; it counts as moving from now on
    pub fn apply_impulse(&mut self, id: ObjectId, impulse: Vec2) -> Result<(), RulesError> {
        self.body_mut(id)?.apply_impulse(to_physics(impulse), true);
        if let Some(object) = self.object_mut(id) {
            object.motion.moved_this_step = true;
        }
        Ok(())
    }

    /// No tracked object moved during the latest step
    pub fn is_world_stable(&self) -> bool {
        self.objects
            .iter()
            .filter(|o| o.kind.is_tracked())
            .all(|o| !o.motion.moved_this_step)
    }

    /// Stop every body in place and accept the result as rest
    pub fn freeze(&mut self) {
        for (_, rb) in self.bodies.iter_mut() {
            if rb.is_dynamic() {
                rb.set_linvel(vector![0.0, 0.0], false);
                rb.set_angvel(0.0, false);
            }
        }
        self.accumulator_ms = 0.0;
        self.rebase_all();
        log::debug!("World frozen at {:.0} ms", self.now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::object::TeamId;

    fn world() -> PhysicsWorld {
        PhysicsWorld::new(&FieldGeometry::standard(), PhysicsSettings::default())
    }

    fn frame_ms() -> f64 {
        f64::from(PhysicsSettings::default().sim_dt) * 1000.0
    }

    #[test]
    fn test_static_objects_are_tagged() {
        let world = world();
        let posts = world.objects().iter().filter(|o| matches!(o.kind, ObjectKind::Goal { .. }));
        let nets = world.objects().iter().filter(|o| matches!(o.kind, ObjectKind::GoalNet { .. }));
        assert_eq!(posts.count(), 4);
        assert_eq!(nets.count(), 2);
        assert!(world.ball().is_none());
        assert!(world.is_world_stable());
    }

    #[test]
    fn test_step_runs_fixed_substeps() {
        let mut world = world();
        let mut ticks = 0;
        assert_eq!(world.step(frame_ms() * 0.5, |_| ticks += 1), 0);
        assert_eq!(world.step(frame_ms() * 2.6, |_| ticks += 1), 3);
        assert_eq!(ticks, 3);
        // Backlog past the substep cap is dropped
        let cap = world.settings().max_substeps;
        assert_eq!(world.step(frame_ms() * 100.0, |_| {}), cap);
    }

    #[test]
    fn test_impulse_moves_ball_then_it_settles() {
        let mut world = world();
        let ball = world.spawn(ObjectKind::Ball, Vec2::ZERO, 0.3);
        world.apply_impulse(ball, Vec2::new(0.2, 0.0)).unwrap();

        world.step(frame_ms(), |_| {});
        assert!(!world.is_world_stable());
        assert!(world.position(ball).unwrap().x > 0.0);

        for _ in 0..4000 {
            world.step(frame_ms(), |_| {});
            if world.is_world_stable() {
                break;
            }
        }
        assert!(world.is_world_stable());
    }

    #[test]
    fn test_teleport_is_unstable_until_a_step_passes() {
        let mut world = world();
        let disk = world.spawn(ObjectKind::Disk { team: TeamId::Home }, Vec2::new(-5.0, 0.0), 0.75);
        assert!(world.is_world_stable());

        world.set_position(disk, Vec2::new(-6.0, 2.0)).unwrap();
        assert!(!world.is_world_stable());
        // The next step still sees the jump from the old baseline
        world.step(frame_ms(), |_| {});
        assert!(!world.is_world_stable());
        world.step(frame_ms(), |_| {});
        assert!(world.is_world_stable());
        assert_eq!(world.position(disk), Some(Vec2::new(-6.0, 2.0)));
    }

    #[test]
    fn test_forced_step_accepts_new_positions() {
        let mut world = world();
        let disk = world.spawn(ObjectKind::Disk { team: TeamId::Away }, Vec2::new(3.0, 0.0), 0.75);
        world.set_position(disk, Vec2::new(4.0, 1.0)).unwrap();
        world.forced_step();
        assert!(world.is_world_stable());
    }

    #[test]
    fn test_touching_pieces_report_contact() {
        let mut world = world();
        let a = world.spawn(ObjectKind::Disk { team: TeamId::Home }, Vec2::new(0.0, 0.0), 0.75);
        let b = world.spawn(ObjectKind::Disk { team: TeamId::Away }, Vec2::new(1.4, 0.0), 0.75);
        world.forced_step();

        let contacts = world.contacts();
        assert_eq!(contacts.len(), 1);
        let contact = contacts[0];
        assert_eq!((contact.a.min(contact.b), contact.a.max(contact.b)), (a, b));
        assert!(contact.point.x > 0.0 && contact.point.x < 1.5);
    }

    #[test]
    fn test_freeze_stops_everything() {
        let mut world = world();
        let ball = world.spawn(ObjectKind::Ball, Vec2::ZERO, 0.3);
        world.apply_impulse(ball, Vec2::new(0.0, 1.0)).unwrap();
        world.step(frame_ms(), |_| {});
        world.freeze();

        assert!(world.is_world_stable());
        assert_eq!(world.velocity(ball), Some(Vec2::ZERO));
    }

    #[test]
    fn test_unknown_object_is_rejected() {
        let mut world = world();
        assert_eq!(
            world.set_position(ObjectId(99), Vec2::ZERO),
            Err(RulesError::UnknownObject(ObjectId(99)))
        );
    }
}
