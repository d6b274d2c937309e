//! Rigid-body world
//!
//! Thin wrapper over a rapier3d pipeline. The outer loop drives it with a
//! variable wall-clock delta; internally it only ever advances in fixed
//! `FIXED_DT` sub-steps, at most `MAX_SUBSTEPS` per call.
//!
//! Nothing here returns an error: unknown handles are ignored and reported
//! back as `false` / `None`.

use glam::{Quat, Vec3};
use rapier3d::na::{Point3, Quaternion, UnitQuaternion, Vector3};
use rapier3d::prelude::*;

use crate::consts::*;

/// Handle to a body owned by the world
pub type BodyHandle = RigidBodyHandle;

/// Dynamic bodies integrate; static bodies (mass 0) never move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Dynamic,
    Static,
}

/// Collision shape of a body
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BodyShape {
    Cuboid { half_extents: Vec3 },
    /// Upright capsule along Y
    Capsule { half_height: f32, radius: f32 },
}

/// Everything needed to insert a body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyDesc {
    pub kind: BodyKind,
    pub shape: BodyShape,
    pub position: Vec3,
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub gravity_scale: f32,
    pub lock_rotations: bool,
}

impl BodyDesc {
    pub fn dynamic(shape: BodyShape, position: Vec3) -> Self {
        Self {
            kind: BodyKind::Dynamic,
            shape,
            position,
            density: 1.0,
            friction: 0.5,
            restitution: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            gravity_scale: 1.0,
            lock_rotations: false,
        }
    }

    pub fn fixed(shape: BodyShape, position: Vec3) -> Self {
        Self {
            kind: BodyKind::Static,
            ..Self::dynamic(shape, position)
        }
    }

    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    pub fn with_gravity_scale(mut self, scale: f32) -> Self {
        self.gravity_scale = scale;
        self
    }

    pub fn with_locked_rotations(mut self) -> Self {
        self.lock_rotations = true;
        self
    }
}

/// Full kinematic state of a body, used for undo snapshots
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub position: Vec3,
    pub rotation: Quat,
    pub linvel: Vec3,
    pub angvel: Vec3,
}

/// Result of a ray cast against the world
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub body: BodyHandle,
    pub point: Vec3,
    /// World-space surface normal at the hit
    pub normal: Vec3,
    pub distance: f32,
}

#[inline]
fn to_vector(v: Vec3) -> Vector3<f32> {
    Vector3::new(v.x, v.y, v.z)
}

#[inline]
fn from_vector(v: &Vector3<f32>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

#[inline]
fn to_rotation(q: Quat) -> UnitQuaternion<f32> {
    UnitQuaternion::from_quaternion(Quaternion::new(q.w, q.x, q.y, q.z))
}

#[inline]
fn from_rotation(r: &UnitQuaternion<f32>) -> Quat {
    Quat::from_xyzw(r.i, r.j, r.k, r.w)
}

/// The physics world: bodies, colliders, and the rapier pipeline
pub struct RigidBodyWorld {
    gravity: Vector3<f32>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    /// Unsimulated wall-clock time carried to the next call
    accumulator: f32,
    /// Total fixed steps taken since creation
    steps: u64,
}

impl Default for RigidBodyWorld {
    fn default() -> Self {
        Self::new(UNDERWATER_GRAVITY)
    }
}

impl RigidBodyWorld {
    /// Create an empty world with vertical gravity `gravity_y`
    pub fn new(gravity_y: f32) -> Self {
        let params = IntegrationParameters {
            dt: FIXED_DT,
            ..Default::default()
        };
        Self {
            gravity: Vector3::new(0.0, gravity_y, 0.0),
            params,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            accumulator: 0.0,
            steps: 0,
        }
    }

    pub fn gravity(&self) -> Vec3 {
        from_vector(&self.gravity)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Fixed steps taken since creation
    pub fn step_count(&self) -> u64 {
        self.steps
    }

    /// Advance by a wall-clock delta, returning the number of fixed sub-steps run.
    ///
    /// The delta is clamped to `MAX_FRAME_DT`; backlog beyond `MAX_SUBSTEPS`
    /// is dropped rather than carried, so a hitch never snowballs.
    pub fn step(&mut self, elapsed: f32) -> u32 {
        let elapsed = if elapsed.is_finite() {
            elapsed.clamp(0.0, MAX_FRAME_DT)
        } else {
            0.0
        };
        self.accumulator += elapsed;

        let mut substeps = 0;
        // Small tolerance so 3 * (1/60) in f32 still counts as three steps
        while self.accumulator + 1e-6 >= FIXED_DT && substeps < MAX_SUBSTEPS {
            self.step_fixed();
            self.accumulator = (self.accumulator - FIXED_DT).max(0.0);
            substeps += 1;
        }
        if self.accumulator >= FIXED_DT {
            log::debug!("Dropping {:.3}s of physics backlog", self.accumulator);
            self.accumulator = 0.0;
        }
        substeps
    }

    fn step_fixed(&mut self) {
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );
        self.steps += 1;
    }

    /// Insert a body with a single collider
    pub fn add_body(&mut self, desc: BodyDesc) -> BodyHandle {
        let builder = match desc.kind {
            BodyKind::Dynamic => RigidBodyBuilder::dynamic()
                .linear_damping(desc.linear_damping)
                .angular_damping(desc.angular_damping)
                .gravity_scale(desc.gravity_scale),
            BodyKind::Static => RigidBodyBuilder::fixed(),
        };
        let mut builder = builder.translation(to_vector(desc.position));
        if desc.lock_rotations {
            builder = builder.lock_rotations();
        }
        let handle = self.bodies.insert(builder.build());

        let collider = match desc.shape {
            BodyShape::Cuboid { half_extents } => {
                ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            }
            BodyShape::Capsule {
                half_height,
                radius,
            } => ColliderBuilder::capsule_y(half_height, radius),
        }
        .density(desc.density)
        .friction(desc.friction)
        .restitution(desc.restitution)
        .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);

        handle
    }

    /// Remove a body and its collider. Returns false for unknown handles.
    pub fn remove_body(&mut self, handle: BodyHandle) -> bool {
        self.bodies
            .remove(
                handle,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            )
            .is_some()
    }

    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.bodies.contains(handle)
    }

    pub fn translation(&self, handle: BodyHandle) -> Option<Vec3> {
        self.bodies.get(handle).map(|b| from_vector(b.translation()))
    }

    pub fn linvel(&self, handle: BodyHandle) -> Option<Vec3> {
        self.bodies.get(handle).map(|b| from_vector(b.linvel()))
    }

    pub fn mass(&self, handle: BodyHandle) -> Option<f32> {
        self.bodies.get(handle).map(|b| b.mass())
    }

    pub fn body_state(&self, handle: BodyHandle) -> Option<BodyState> {
        self.bodies.get(handle).map(|b| BodyState {
            position: from_vector(b.translation()),
            rotation: from_rotation(b.rotation()),
            linvel: from_vector(b.linvel()),
            angvel: from_vector(b.angvel()),
        })
    }

    /// Overwrite a body's full kinematic state
    pub fn set_body_state(&mut self, handle: BodyHandle, state: &BodyState) -> bool {
        let Some(body) = self.bodies.get_mut(handle) else {
            return false;
        };
        body.set_translation(to_vector(state.position), true);
        body.set_rotation(to_rotation(state.rotation), true);
        body.set_linvel(to_vector(state.linvel), true);
        body.set_angvel(to_vector(state.angvel), true);
        true
    }

    pub fn set_linvel(&mut self, handle: BodyHandle, linvel: Vec3) -> bool {
        match self.bodies.get_mut(handle) {
            Some(body) => {
                body.set_linvel(to_vector(linvel), true);
                true
            }
            None => false,
        }
    }

    pub fn apply_impulse(&mut self, handle: BodyHandle, impulse: Vec3) -> bool {
        match self.bodies.get_mut(handle) {
            Some(body) => {
                body.apply_impulse(to_vector(impulse), true);
                true
            }
            None => false,
        }
    }

    /// Push every dynamic body with an acceleration-like force scaled by its mass
    pub fn apply_current(&mut self, force: Vec3, dt: f32) {
        if force == Vec3::ZERO || dt <= 0.0 || !force.is_finite() {
            return;
        }
        for (_, body) in self.bodies.iter_mut() {
            if body.is_dynamic() {
                let impulse = force * body.mass() * dt;
                body.apply_impulse(to_vector(impulse), true);
            }
        }
    }

    /// Cast a ray, returning the closest hit body.
    ///
    /// Uses the query structures refreshed by the last step, so bodies added
    /// since then are not yet visible.
    pub fn cast_ray(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        exclude: Option<BodyHandle>,
    ) -> Option<RayHit> {
        let dir = direction.try_normalize()?;
        let ray = Ray::new(Point3::new(origin.x, origin.y, origin.z), to_vector(dir));
        let mut filter = QueryFilter::default();
        if let Some(handle) = exclude {
            filter = filter.exclude_rigid_body(handle);
        }

        let (collider, hit) = self.query_pipeline.cast_ray_and_get_normal(
            &self.bodies,
            &self.colliders,
            &ray,
            max_distance,
            true,
            filter,
        )?;
        let body = self.colliders.get(collider)?.parent()?;
        Some(RayHit {
            body,
            point: origin + dir * hit.time_of_impact,
            normal: from_vector(&hit.normal),
            distance: hit.time_of_impact,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(position: Vec3) -> BodyDesc {
        BodyDesc::dynamic(
            BodyShape::Cuboid {
                half_extents: Vec3::splat(0.5),
            },
            position,
        )
    }

    #[test]
    fn test_step_clamps_and_caps_substeps() {
        let mut world = RigidBodyWorld::default();
        assert_eq!(world.step(0.0), 0);
        assert_eq!(world.step(FIXED_DT), 1);
        assert_eq!(world.step(3.0 * FIXED_DT), 3);
        // A one-second hitch is clamped and capped
        assert_eq!(world.step(1.0), MAX_SUBSTEPS);
        // ...and the dropped backlog does not leak into the next frame
        assert_eq!(world.step(0.0), 0);
        assert_eq!(world.step(f32::NAN), 0);
        assert_eq!(world.step(-1.0), 0);
    }

    #[test]
    fn test_partial_steps_accumulate() {
        let mut world = RigidBodyWorld::default();
        assert_eq!(world.step(FIXED_DT * 0.6), 0);
        assert_eq!(world.step(FIXED_DT * 0.6), 1);
        assert_eq!(world.step_count(), 1);
    }

    #[test]
    fn test_underwater_gravity_is_gentle() {
        let mut world = RigidBodyWorld::default();
        let body = world.add_body(cube(Vec3::new(0.0, 10.0, 0.0)));
        for _ in 0..60 {
            world.step(FIXED_DT);
        }
        let v = world.linvel(body).unwrap();
        assert!((v.y - UNDERWATER_GRAVITY).abs() < 0.1, "vy = {}", v.y);
        assert!(world.translation(body).unwrap().y < 10.0);
    }

    #[test]
    fn test_static_body_never_moves() {
        let mut world = RigidBodyWorld::default();
        let floor = world.add_body(BodyDesc::fixed(
            BodyShape::Cuboid {
                half_extents: Vec3::new(10.0, 0.5, 10.0),
            },
            Vec3::new(0.0, -1.0, 0.0),
        ));
        world.apply_impulse(floor, Vec3::new(100.0, 100.0, 0.0));
        world.apply_current(Vec3::new(5.0, 0.0, 0.0), 0.5);
        for _ in 0..30 {
            world.step(FIXED_DT);
        }
        assert_eq!(world.translation(floor), Some(Vec3::new(0.0, -1.0, 0.0)));
    }

    #[test]
    fn test_add_and_remove_body() {
        let mut world = RigidBodyWorld::default();
        let a = world.add_body(cube(Vec3::ZERO));
        let b = world.add_body(cube(Vec3::X * 3.0));
        assert_eq!(world.body_count(), 2);
        assert!(world.remove_body(a));
        assert!(!world.remove_body(a));
        assert!(!world.contains(a));
        assert!(world.contains(b));
        assert_eq!(world.body_count(), 1);
        assert!(world.translation(a).is_none());
        assert!(!world.apply_impulse(a, Vec3::X));
    }

    #[test]
    fn test_impulse_changes_velocity_by_inverse_mass() {
        let mut world = RigidBodyWorld::new(0.0);
        let body = world.add_body(cube(Vec3::ZERO));
        world.step(FIXED_DT);
        let mass = world.mass(body).unwrap();
        assert!(mass > 0.0);
        world.apply_impulse(body, Vec3::X * mass * 2.0);
        let v = world.linvel(body).unwrap();
        assert!((v.x - 2.0).abs() < 1e-3, "vx = {}", v.x);
    }

    #[test]
    fn test_body_state_roundtrip() {
        let mut world = RigidBodyWorld::default();
        let body = world.add_body(cube(Vec3::ZERO));
        let state = BodyState {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_y(0.5),
            linvel: Vec3::new(0.5, 0.0, -0.5),
            angvel: Vec3::new(0.0, 0.25, 0.0),
        };
        assert!(world.set_body_state(body, &state));
        let read = world.body_state(body).unwrap();
        assert!((read.position - state.position).length() < 1e-5);
        assert!(read.rotation.angle_between(state.rotation) < 1e-4);
        assert!((read.linvel - state.linvel).length() < 1e-5);
        assert!((read.angvel - state.angvel).length() < 1e-5);
    }

    #[test]
    fn test_cast_ray_hits_face() {
        let mut world = RigidBodyWorld::new(0.0);
        let body = world.add_body(cube(Vec3::new(0.0, 0.0, -5.0)));
        world.step(FIXED_DT);

        let hit = world
            .cast_ray(Vec3::ZERO, Vec3::NEG_Z, 20.0, None)
            .expect("ray should hit the cube");
        assert_eq!(hit.body, body);
        assert!((hit.distance - 4.5).abs() < 1e-3);
        assert!((hit.normal - Vec3::Z).length() < 1e-3);

        assert!(world.cast_ray(Vec3::ZERO, Vec3::Z, 20.0, None).is_none());
        assert!(world.cast_ray(Vec3::ZERO, Vec3::NEG_Z, 20.0, Some(body)).is_none());
    }
}
