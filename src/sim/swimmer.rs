//! First-person swimmer
//!
//! One upright capsule body with rotations locked. Mouse-look drives yaw and
//! pitch; the camera is a read-only mirror of the body plus an eye offset.

use std::f32::consts::{FRAC_PI_2, TAU};

use glam::{Quat, Vec3};

use super::physics::{BodyDesc, BodyHandle, BodyShape, BodyState, RigidBodyWorld};
use crate::consts::*;
use crate::error::SimError;
use crate::platform::input::InputGate;

/// Held movement directions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Forward,
    Back,
    Left,
    Right,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveIntents {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

impl MoveIntents {
    pub fn set(&mut self, intent: Intent, active: bool) {
        match intent {
            Intent::Forward => self.forward = active,
            Intent::Back => self.back = active,
            Intent::Left => self.left = active,
            Intent::Right => self.right = active,
            Intent::Up => self.up = active,
            Intent::Down => self.down = active,
        }
    }

    pub fn any(&self) -> bool {
        *self != Self::default()
    }
}

/// Where the view is rendered from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: SWIMMER_SPAWN + EYE_OFFSET,
            orientation: Quat::IDENTITY,
        }
    }
}

impl Camera {
    /// View direction (-Z in camera space)
    pub fn forward(&self) -> Vec3 {
        self.orientation * Vec3::NEG_Z
    }
}

pub struct FirstPersonController {
    body: BodyHandle,
    yaw: f32,
    pitch: f32,
    intents: MoveIntents,
    sensitivity: f32,
    camera: Camera,
}

impl FirstPersonController {
    /// Create the swimmer's capsule at `spawn`
    pub fn new(world: &mut RigidBodyWorld, spawn: Vec3, sensitivity: f32) -> Self {
        let desc = BodyDesc::dynamic(
            BodyShape::Capsule {
                half_height: SWIMMER_HALF_HEIGHT,
                radius: SWIMMER_RADIUS,
            },
            spawn,
        )
        .with_locked_rotations()
        .with_damping(SWIMMER_LINEAR_DAMPING, 0.0)
        .with_gravity_scale(SWIMMER_GRAVITY_SCALE)
        .with_friction(0.0);
        let body = world.add_body(desc);
        Self {
            body,
            yaw: 0.0,
            pitch: 0.0,
            intents: MoveIntents::default(),
            sensitivity,
            camera: Camera {
                position: spawn + EYE_OFFSET,
                orientation: Quat::IDENTITY,
            },
        }
    }

    pub fn body(&self) -> BodyHandle {
        self.body
    }

    pub fn camera(&self) -> Camera {
        self.camera
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn intents(&self) -> MoveIntents {
        self.intents
    }

    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        self.sensitivity = sensitivity;
    }

    pub fn look(&self) -> Quat {
        Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(self.pitch)
    }

    pub fn set_look(&mut self, yaw: f32, pitch: f32) {
        self.yaw = yaw.rem_euclid(TAU);
        self.pitch = pitch.clamp(-FRAC_PI_2, FRAC_PI_2);
    }

    /// Apply relative pointer motion. Inert unless the gate allows look.
    pub fn pointer_look(&mut self, dx: f32, dy: f32, gate: InputGate) -> bool {
        if !gate.look_enabled() || !dx.is_finite() || !dy.is_finite() {
            return false;
        }
        self.set_look(
            self.yaw - dx * self.sensitivity,
            self.pitch - dy * self.sensitivity,
        );
        true
    }

    pub fn set_intent(&mut self, intent: Intent, active: bool) {
        self.intents.set(intent, active);
    }

    /// Release every held direction (modal opened, focus lost)
    pub fn clear_intents(&mut self) {
        self.intents = MoveIntents::default();
    }

    /// Put the swimmer back at `position`, at rest
    pub fn respawn(&mut self, world: &mut RigidBodyWorld, position: Vec3) {
        world.set_body_state(
            self.body,
            &BodyState {
                position,
                rotation: Quat::IDENTITY,
                linvel: Vec3::ZERO,
                angvel: Vec3::ZERO,
            },
        );
        self.camera.position = position + EYE_OFFSET;
    }

    /// Horizontal forward and right vectors of the current look
    fn horizontal_basis(&self, look: Quat) -> (Vec3, Vec3) {
        let yaw_only = Quat::from_rotation_y(self.yaw);
        let flatten = |v: Vec3, fallback: Vec3| {
            Vec3::new(v.x, 0.0, v.z)
                .try_normalize()
                .unwrap_or(fallback)
        };
        let forward = flatten(look * Vec3::NEG_Z, yaw_only * Vec3::NEG_Z);
        let right = flatten(look * Vec3::X, yaw_only * Vec3::X);
        (forward, right)
    }

    /// Drive the body from the held intents and refresh the camera
    pub fn update(&mut self, world: &mut RigidBodyWorld, dt: f32) -> Result<(), SimError> {
        let missing = SimError::MissingBody {
            subsystem: "swimmer",
            body: self.body,
        };
        let velocity = world.linvel(self.body).ok_or(missing.clone())?;

        let look = self.look();
        let (forward, right) = self.horizontal_basis(look);
        let i = self.intents;
        let mut wish = Vec3::ZERO;
        if i.forward {
            wish += forward;
        }
        if i.back {
            wish -= forward;
        }
        if i.right {
            wish += right;
        }
        if i.left {
            wish -= right;
        }
        let horizontal = wish.normalize_or_zero() * SWIM_SPEED;

        let dt = dt.max(0.0);
        let mut vertical = velocity.y;
        if i.up {
            vertical += VERTICAL_ACCEL * dt;
        }
        if i.down {
            vertical -= VERTICAL_ACCEL * dt;
        }
        let vertical = vertical.clamp(-MAX_VERTICAL_SPEED, MAX_VERTICAL_SPEED);

        let new_velocity = Vec3::new(horizontal.x, vertical, horizontal.z);
        if !new_velocity.is_finite() {
            return Err(SimError::NonFinite {
                subsystem: "swimmer",
                what: "velocity",
            });
        }
        world.set_linvel(self.body, new_velocity);

        let position = world.translation(self.body).ok_or(missing)?;
        self.camera = Camera {
            position: position + EYE_OFFSET,
            orientation: look,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPEN: InputGate = InputGate {
        pointer_captured: true,
        modal_open: false,
    };

    fn swimmer() -> (RigidBodyWorld, FirstPersonController) {
        let mut world = RigidBodyWorld::default();
        let swimmer = FirstPersonController::new(&mut world, Vec3::ZERO, LOOK_SENSITIVITY);
        (world, swimmer)
    }

    #[test]
    fn test_look_is_yaw_then_pitch() {
        let (_, mut swimmer) = swimmer();
        swimmer.set_look(FRAC_PI_2, 0.0);
        let forward = swimmer.look() * Vec3::NEG_Z;
        assert!((forward - Vec3::NEG_X).length() < 1e-5);

        swimmer.set_look(0.0, 0.5);
        let forward = swimmer.look() * Vec3::NEG_Z;
        assert!(forward.y > 0.0, "positive pitch looks up");
    }

    #[test]
    fn test_pitch_is_clamped() {
        let (_, mut swimmer) = swimmer();
        assert!(swimmer.pointer_look(0.0, -100_000.0, OPEN));
        assert!((swimmer.pitch() - FRAC_PI_2).abs() < 1e-6);
        assert!(swimmer.pointer_look(0.0, 200_000.0, OPEN));
        assert!((swimmer.pitch() + FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn test_look_gated() {
        let (_, mut swimmer) = swimmer();
        let closed = InputGate {
            pointer_captured: false,
            modal_open: false,
        };
        let modal = InputGate {
            pointer_captured: true,
            modal_open: true,
        };
        assert!(!swimmer.pointer_look(50.0, 50.0, closed));
        assert!(!swimmer.pointer_look(50.0, 50.0, modal));
        assert_eq!((swimmer.yaw(), swimmer.pitch()), (0.0, 0.0));

        assert!(swimmer.pointer_look(100.0, 0.0, OPEN));
        let expected = (-100.0 * LOOK_SENSITIVITY).rem_euclid(TAU);
        assert!((swimmer.yaw() - expected).abs() < 1e-5);
    }

    #[test]
    fn test_horizontal_velocity_is_hard_set() {
        let (mut world, mut swimmer) = swimmer();
        swimmer.set_intent(Intent::Forward, true);
        swimmer.update(&mut world, FIXED_DT).unwrap();
        let v = world.linvel(swimmer.body()).unwrap();
        assert!((v.z + SWIM_SPEED).abs() < 1e-5);
        assert!(v.x.abs() < 1e-5);

        // Diagonal is not faster
        swimmer.set_intent(Intent::Right, true);
        swimmer.update(&mut world, FIXED_DT).unwrap();
        let v = world.linvel(swimmer.body()).unwrap();
        assert!((Vec3::new(v.x, 0.0, v.z).length() - SWIM_SPEED).abs() < 1e-4);

        swimmer.clear_intents();
        assert!(!swimmer.intents().any());
        swimmer.update(&mut world, FIXED_DT).unwrap();
        let v = world.linvel(swimmer.body()).unwrap();
        assert!(v.x.abs() < 1e-6 && v.z.abs() < 1e-6);
    }

    #[test]
    fn test_looking_down_still_swims_forward() {
        let (mut world, mut swimmer) = swimmer();
        swimmer.set_look(0.0, -FRAC_PI_2);
        swimmer.set_intent(Intent::Forward, true);
        swimmer.update(&mut world, FIXED_DT).unwrap();
        let v = world.linvel(swimmer.body()).unwrap();
        assert!((Vec3::new(v.x, 0.0, v.z).length() - SWIM_SPEED).abs() < 1e-4);
    }

    #[test]
    fn test_vertical_accelerates_and_clamps() {
        let (mut world, mut swimmer) = swimmer();
        swimmer.set_intent(Intent::Up, true);
        swimmer.update(&mut world, FIXED_DT).unwrap();
        let vy = world.linvel(swimmer.body()).unwrap().y;
        assert!((vy - VERTICAL_ACCEL * FIXED_DT).abs() < 1e-5);

        for _ in 0..300 {
            world.step(FIXED_DT);
            swimmer.update(&mut world, FIXED_DT).unwrap();
            let vy = world.linvel(swimmer.body()).unwrap().y;
            assert!(vy <= MAX_VERTICAL_SPEED + 1e-5);
        }
    }

    #[test]
    fn test_camera_mirrors_body() {
        let (mut world, mut swimmer) = swimmer();
        swimmer.set_look(1.0, 0.2);
        for _ in 0..10 {
            world.step(FIXED_DT);
        }
        swimmer.update(&mut world, FIXED_DT).unwrap();
        let body_pos = world.translation(swimmer.body()).unwrap();
        let camera = swimmer.camera();
        assert!((camera.position - (body_pos + EYE_OFFSET)).length() < 1e-6);
        assert!(camera.orientation.angle_between(swimmer.look()) < 1e-6);
    }

    #[test]
    fn test_missing_body_is_reported() {
        let (mut world, mut swimmer) = swimmer();
        world.remove_body(swimmer.body());
        assert!(matches!(
            swimmer.update(&mut world, FIXED_DT),
            Err(SimError::MissingBody { subsystem: "swimmer", .. })
        ));
    }
}
