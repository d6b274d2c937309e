//! Abyss Slide - An underwater block-sliding puzzle
//!
//! Core modules:
//! - `sim`: Simulation core (rigid bodies, puzzle grid, flocking, swimmer)
//! - `game`: Frame loop that orders and isolates the subsystems
//! - `services`: Collaborator traits (levels, score, audio, HUD)
//! - `platform`: Input events and frame scheduling
//! - `renderer`: Render boundary and frame snapshots
//! - `persistence`: Level progress save/load

pub mod error;
pub mod game;
pub mod persistence;
pub mod platform;
pub mod renderer;
pub mod services;
pub mod settings;
pub mod sim;

#[cfg(target_arch = "wasm32")]
pub mod audio;

pub use error::{InitError, LevelError, SimError};
pub use game::{GameConfig, SimulationLoop};
pub use settings::Settings;

use glam::Vec3;

/// Game configuration constants
pub mod consts {
    use glam::Vec3;

    /// Fixed physics sub-step (60 Hz)
    pub const FIXED_DT: f32 = 1.0 / 60.0;
    /// Maximum physics sub-steps per frame
    pub const MAX_SUBSTEPS: u32 = 3;
    /// Largest wall-clock delta a single frame may advance (spiral-of-death guard)
    pub const MAX_FRAME_DT: f32 = 0.1;

    /// Buoyant gravity, far weaker than -9.8 so things drift instead of drop
    pub const UNDERWATER_GRAVITY: f32 = -2.0;

    /// Scene layout (world units). Origin is the middle of the water column.
    pub const SURFACE_Y: f32 = 20.0;
    pub const FLOOR_Y: f32 = -12.0;
    pub const FLOOR_HALF_EXTENT: f32 = 60.0;

    /// Blocks
    pub const BLOCK_SPACING: f32 = 1.0;
    pub const BLOCK_HALF_EXTENT: f32 = 0.45;
    pub const BLOCK_DENSITY: f32 = 1.0;
    pub const BLOCK_FRICTION: f32 = 0.1;
    pub const BLOCK_LINEAR_DAMPING: f32 = 2.0;
    pub const BLOCK_ANGULAR_DAMPING: f32 = 4.0;
    /// Impulse applied to every block of a sliding plane
    pub const SLIDE_IMPULSE: f32 = 1.5;
    /// Time a slide is considered in flight before new input is accepted
    pub const SLIDE_SETTLE_SECS: f32 = 0.35;
    /// Points credited when a required gem is relocated
    pub const GEM_POINTS: u32 = 50;

    /// Swimmer
    pub const SWIMMER_RADIUS: f32 = 0.4;
    pub const SWIMMER_HALF_HEIGHT: f32 = 0.5;
    pub const SWIMMER_GRAVITY_SCALE: f32 = 0.25;
    pub const SWIMMER_LINEAR_DAMPING: f32 = 1.5;
    pub const SWIMMER_SPAWN: Vec3 = Vec3::new(0.0, -6.0, 9.0);
    pub const SWIM_SPEED: f32 = 4.0;
    pub const VERTICAL_ACCEL: f32 = 6.0;
    pub const MAX_VERTICAL_SPEED: f32 = 3.0;
    /// Camera sits above the capsule centre
    pub const EYE_OFFSET: Vec3 = Vec3::new(0.0, 0.6, 0.0);
    /// Radians per pixel of pointer movement
    pub const LOOK_SENSITIVITY: f32 = 0.002;
    /// Farthest a pointer ray may reach into the scene
    pub const PICK_DISTANCE: f32 = 40.0;

    /// Flocking
    pub const FISH_COUNT: usize = 30;
    pub const FLOCK_WRAP_RADIUS: f32 = 20.0;
    pub const FLOCK_RESPAWN_RADIUS: f32 = 15.0;
    pub const FLOCK_MAX_SPEED: f32 = 3.0;
    pub const CATCH_RADIUS: f32 = 0.8;

    /// Environmental current
    pub const CURRENT_BASE_STRENGTH: f32 = 0.15;
    /// Extra current per unit of depth below the surface
    pub const CURRENT_DEPTH_FACTOR: f32 = 0.03;
    pub const CURRENT_MAX_STRENGTH: f32 = 1.5;
    pub const CURRENT_MIN_PERIOD: f32 = 3.0;
    pub const CURRENT_MAX_PERIOD: f32 = 5.0;
}

/// World axes a plane of blocks can be selected and slid along
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Component index (x = 0, y = 1, z = 2)
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// Unit vector along this axis
    #[inline]
    pub fn unit(self) -> Vec3 {
        match self {
            Axis::X => Vec3::X,
            Axis::Y => Vec3::Y,
            Axis::Z => Vec3::Z,
        }
    }
}

/// Pick the axis a face normal mostly points along.
///
/// Strict comparisons in x, y, z order: x only wins when it beats both
/// others, y when it beats z, otherwise z.
pub fn dominant_axis(normal: Vec3) -> Axis {
    let a = normal.abs();
    if a.x > a.y && a.x > a.z {
        Axis::X
    } else if a.y > a.z {
        Axis::Y
    } else {
        Axis::Z
    }
}

/// Depth below the water surface (never negative)
#[inline]
pub fn depth_at(position: Vec3) -> f32 {
    (consts::SURFACE_Y - position.y).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dominant_axis_clear_winner() {
        assert_eq!(dominant_axis(Vec3::new(0.9, 0.1, 0.2)), Axis::X);
        assert_eq!(dominant_axis(Vec3::new(0.0, -1.0, 0.0)), Axis::Y);
        assert_eq!(dominant_axis(Vec3::new(0.1, 0.2, -0.8)), Axis::Z);
    }

    #[test]
    fn test_dominant_axis_ties() {
        // x never wins a tie; y beats z only strictly
        assert_eq!(dominant_axis(Vec3::new(1.0, 1.0, 0.0)), Axis::Y);
        assert_eq!(dominant_axis(Vec3::new(1.0, 0.0, 1.0)), Axis::Z);
        assert_eq!(dominant_axis(Vec3::new(0.0, 1.0, 1.0)), Axis::Z);
        assert_eq!(dominant_axis(Vec3::ONE), Axis::Z);
    }

    #[test]
    fn test_depth_at() {
        assert_eq!(depth_at(Vec3::new(0.0, consts::SURFACE_Y + 3.0, 0.0)), 0.0);
        assert!((depth_at(Vec3::new(0.0, 0.0, 0.0)) - consts::SURFACE_Y).abs() < 1e-6);
    }
}
