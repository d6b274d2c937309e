//! Ocean current and depth fog

use std::f32::consts::TAU;

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::consts::*;
use crate::error::SimError;

/// Fog density grows with depth up to this
pub const MAX_FOG_DENSITY: f32 = 0.08;
const SURFACE_FOG_DENSITY: f32 = 0.015;
const FOG_DENSITY_PER_METER: f32 = 0.002;
const SHALLOW_COLOR: Vec3 = Vec3::new(0.12, 0.44, 0.66);
const DEEP_COLOR: Vec3 = Vec3::new(0.01, 0.08, 0.15);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FogParams {
    pub density: f32,
    /// Linear RGB
    pub color: Vec3,
}

/// Fog for a camera `depth` below the surface
pub fn fog(depth: f32) -> FogParams {
    let depth = if depth.is_finite() { depth.max(0.0) } else { 0.0 };
    let t = (depth / (SURFACE_Y - FLOOR_Y)).min(1.0);
    FogParams {
        density: (SURFACE_FOG_DENSITY + depth * FOG_DENSITY_PER_METER).min(MAX_FOG_DENSITY),
        color: SHALLOW_COLOR.lerp(DEEP_COLOR, t),
    }
}

/// Slowly wandering current. It picks a new heading every 3-5 seconds and
/// pushes harder the deeper the swimmer is.
pub struct Environment {
    rng: Pcg32,
    direction: Vec3,
    /// Seconds until the next heading change
    remaining: f32,
    current: Vec3,
}

impl Environment {
    pub fn new(seed: u64) -> Self {
        let mut env = Self {
            rng: Pcg32::seed_from_u64(seed),
            direction: Vec3::X,
            remaining: 0.0,
            current: Vec3::ZERO,
        };
        env.pick_heading();
        env
    }

    fn pick_heading(&mut self) {
        let angle = self.rng.random_range(0.0..TAU);
        let rise = self.rng.random_range(-0.2f32..0.2);
        self.direction = Vec3::new(angle.cos(), rise, angle.sin()).normalize();
        self.remaining = self.rng.random_range(CURRENT_MIN_PERIOD..=CURRENT_MAX_PERIOD);
        log::debug!(
            "Current now heading {:?} for {:.1}s",
            self.direction,
            self.remaining
        );
    }

    /// Current strength at `depth`
    pub fn strength(depth: f32) -> f32 {
        let scaled = CURRENT_BASE_STRENGTH * (1.0 + depth.max(0.0) * CURRENT_DEPTH_FACTOR);
        scaled.min(CURRENT_MAX_STRENGTH)
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    /// Force (acceleration) for this frame
    pub fn current(&self) -> Vec3 {
        self.current
    }

    pub fn update(&mut self, dt: f32, depth: f32) -> Result<(), SimError> {
        if !depth.is_finite() {
            return Err(SimError::NonFinite {
                subsystem: "environment",
                what: "camera depth",
            });
        }
        self.remaining -= dt.max(0.0);
        if self.remaining <= 0.0 {
            self.pick_heading();
        }
        self.current = self.direction * Self::strength(depth);
        Ok(())
    }
}
