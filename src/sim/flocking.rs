//! Boids fish school
//!
//! Fish are kinematic: no physics bodies, just position and velocity. Each
//! frame every fish steers by separation, alignment and cohesion against its
//! neighbours, flees the predator (the swimmer's camera), drifts with the
//! current and wraps back into the school volume when it strays too far.

use glam::{Quat, Vec3};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::spatial::SpatialHash;
use crate::consts::*;
use crate::error::SimError;

/// Species in the school
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FishKind {
    Minnow,
    Clownfish,
    Tang,
    Angelfish,
}

impl FishKind {
    pub const ALL: [FishKind; 4] = [
        FishKind::Minnow,
        FishKind::Clownfish,
        FishKind::Tang,
        FishKind::Angelfish,
    ];

    pub fn scale(self) -> f32 {
        match self {
            FishKind::Minnow => 0.5,
            FishKind::Clownfish => 0.8,
            FishKind::Tang => 1.0,
            FishKind::Angelfish => 1.3,
        }
    }

    /// Fraction of the school's max speed (never above 1)
    pub fn speed_factor(self) -> f32 {
        match self {
            FishKind::Minnow => 1.0,
            FishKind::Clownfish => 0.85,
            FishKind::Tang => 0.9,
            FishKind::Angelfish => 0.7,
        }
    }

    /// Score for catching one
    pub fn points(self) -> u32 {
        match self {
            FishKind::Minnow => 5,
            FishKind::Clownfish => 15,
            FishKind::Tang => 20,
            FishKind::Angelfish => 30,
        }
    }

    pub fn color(self) -> u32 {
        match self {
            FishKind::Minnow => 0xc0d8e0,
            FishKind::Clownfish => 0xff8c1a,
            FishKind::Tang => 0x2f6bff,
            FishKind::Angelfish => 0xf2e35c,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fish {
    pub id: u32,
    pub kind: FishKind,
    pub position: Vec3,
    pub velocity: Vec3,
    /// Swim animation accumulator (radians)
    pub phase: f32,
    pub orientation: Quat,
}

/// How neighbours are found each frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum NeighborSearch {
    /// Test every pair. O(n^2); fine for a few dozen fish.
    #[default]
    BruteForce,
    /// Bucket fish into a uniform grid first
    Grid { cell_size: f32 },
}

/// Steering weights and radii
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlockConfig {
    pub separation_radius: f32,
    pub separation_weight: f32,
    pub max_separation: f32,
    pub alignment_radius: f32,
    pub alignment_weight: f32,
    pub max_alignment: f32,
    pub cohesion_radius: f32,
    pub cohesion_weight: f32,
    pub predator_radius: f32,
    pub predator_weight: f32,
    pub max_speed: f32,
    /// Below this speed a fish keeps its previous heading
    pub min_orient_speed: f32,
    pub center: Vec3,
    pub wrap_radius: f32,
    pub respawn_radius: f32,
    /// Spawn shell around `center`
    pub spawn_min_radius: f32,
    pub spawn_max_radius: f32,
    pub search: NeighborSearch,
}

impl Default for FlockConfig {
    fn default() -> Self {
        Self {
            separation_radius: 2.0,
            separation_weight: 1.5,
            max_separation: 2.0,
            alignment_radius: 5.0,
            alignment_weight: 1.0,
            max_alignment: 1.5,
            cohesion_radius: 8.0,
            cohesion_weight: 1.0,
            predator_radius: 5.0,
            predator_weight: 2.0,
            max_speed: FLOCK_MAX_SPEED,
            min_orient_speed: 0.05,
            center: Vec3::ZERO,
            wrap_radius: FLOCK_WRAP_RADIUS,
            respawn_radius: FLOCK_RESPAWN_RADIUS,
            spawn_min_radius: 5.0,
            spawn_max_radius: 15.0,
            search: NeighborSearch::BruteForce,
        }
    }
}

impl FlockConfig {
    fn neighbor_radius(&self) -> f32 {
        self.separation_radius
            .max(self.alignment_radius)
            .max(self.cohesion_radius)
    }
}

pub struct FlockingSystem {
    fish: Vec<Fish>,
    config: FlockConfig,
    rng: Pcg32,
    next_id: u32,
    grid: SpatialHash,
}

impl FlockingSystem {
    pub fn new(config: FlockConfig, seed: u64) -> Self {
        let cell_size = match config.search {
            NeighborSearch::Grid { cell_size } => cell_size,
            NeighborSearch::BruteForce => config.neighbor_radius(),
        };
        Self {
            fish: Vec::new(),
            config,
            rng: Pcg32::seed_from_u64(seed),
            next_id: 1,
            grid: SpatialHash::new(cell_size),
        }
    }

    pub fn fish(&self) -> &[Fish] {
        &self.fish
    }

    pub fn len(&self) -> usize {
        self.fish.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fish.is_empty()
    }

    pub fn config(&self) -> &FlockConfig {
        &self.config
    }

    pub fn set_search(&mut self, search: NeighborSearch) {
        if let NeighborSearch::Grid { cell_size } = search {
            self.grid.set_cell_size(cell_size);
        }
        self.config.search = search;
    }

    /// Add one fish, returning its id
    pub fn spawn(&mut self, kind: FishKind, position: Vec3, velocity: Vec3) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        let orientation = velocity
            .try_normalize()
            .map_or(Quat::IDENTITY, |dir| Quat::from_rotation_arc(Vec3::Z, dir));
        self.fish.push(Fish {
            id,
            kind,
            position,
            velocity,
            phase: 0.0,
            orientation,
        });
        id
    }

    /// Scatter `count` fish in the spawn shell around the school centre
    pub fn spawn_school(&mut self, count: usize) {
        for _ in 0..count {
            let dir = self.random_direction();
            let radius = self
                .rng
                .random_range(self.config.spawn_min_radius..=self.config.spawn_max_radius);
            let position = self.config.center + dir * radius;
            let velocity = self.random_direction() * self.rng.random_range(0.2f32..1.0);
            let kind = match self.rng.random_range(0..10) {
                0..5 => FishKind::Minnow,
                5..7 => FishKind::Clownfish,
                7..9 => FishKind::Tang,
                _ => FishKind::Angelfish,
            };
            let phase = self.rng.random_range(0.0..std::f32::consts::TAU);
            let id = self.spawn(kind, position, velocity);
            if let Some(fish) = self.fish.iter_mut().find(|f| f.id == id) {
                fish.phase = phase;
            }
        }
        log::info!("Spawned a school of {} fish", count);
    }

    fn random_direction(&mut self) -> Vec3 {
        // Rejection sample the unit ball for an unbiased direction
        loop {
            let v = Vec3::new(
                self.rng.random_range(-1.0..1.0),
                self.rng.random_range(-1.0..1.0),
                self.rng.random_range(-1.0..1.0),
            );
            let len_sq = v.length_squared();
            if len_sq > 1e-4 && len_sq <= 1.0 {
                return v / len_sq.sqrt();
            }
        }
    }

    pub fn remove(&mut self, id: u32) -> Option<Fish> {
        let index = self.fish.iter().position(|f| f.id == id)?;
        Some(self.fish.remove(index))
    }

    pub fn clear(&mut self) {
        self.fish.clear();
    }

    /// Remove and return the nearest fish whose centre lies within
    /// `CATCH_RADIUS` of the ray
    pub fn catch_along_ray(
        &mut self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
    ) -> Option<Fish> {
        let dir = direction.try_normalize()?;
        let mut best: Option<(u32, f32)> = None;
        for fish in &self.fish {
            let t = (fish.position - origin).dot(dir);
            if t < 0.0 || t > max_distance {
                continue;
            }
            let closest = origin + dir * t;
            if closest.distance(fish.position) <= CATCH_RADIUS
                && best.is_none_or(|(_, best_t)| t < best_t)
            {
                best = Some((fish.id, t));
            }
        }
        let (id, _) = best?;
        self.remove(id)
    }

    fn for_each_neighbor(&self, i: usize, mut f: impl FnMut(usize)) {
        match self.config.search {
            NeighborSearch::BruteForce => {
                for j in 0..self.fish.len() {
                    if j != i {
                        f(j);
                    }
                }
            }
            NeighborSearch::Grid { .. } => {
                let radius = self.config.neighbor_radius();
                let mut candidates = Vec::new();
                self.grid
                    .for_each_candidate(self.fish[i].position, radius, |j| {
                        if j != i {
                            candidates.push(j);
                        }
                    });
                // Same summation order as the brute-force scan
                candidates.sort_unstable();
                for j in candidates {
                    f(j);
                }
            }
        }
    }

    /// Separation, alignment and cohesion for fish `i`
    pub(crate) fn steering(&self, i: usize) -> (Vec3, Vec3, Vec3) {
        let cfg = &self.config;
        let me = &self.fish[i];

        let mut separation = Vec3::ZERO;
        let mut velocity_sum = Vec3::ZERO;
        let mut aligned = 0u32;
        let mut position_sum = Vec3::ZERO;
        let mut cohesive = 0u32;

        self.for_each_neighbor(i, |j| {
            let other = &self.fish[j];
            let offset = me.position - other.position;
            let dist = offset.length();
            if dist <= f32::EPSILON {
                return;
            }
            if dist < cfg.separation_radius {
                separation += offset / dist / dist;
            }
            if dist < cfg.alignment_radius {
                velocity_sum += other.velocity;
                aligned += 1;
            }
            if dist < cfg.cohesion_radius {
                position_sum += other.position;
                cohesive += 1;
            }
        });

        let separation = (separation.normalize_or_zero() * cfg.separation_weight)
            .clamp_length_max(cfg.max_separation);
        let alignment = if aligned > 0 {
            ((velocity_sum / aligned as f32).normalize_or_zero() * cfg.alignment_weight)
                .clamp_length_max(cfg.max_alignment)
        } else {
            Vec3::ZERO
        };
        let cohesion = if cohesive > 0 {
            (position_sum / cohesive as f32 - me.position).normalize_or_zero() * cfg.cohesion_weight
        } else {
            Vec3::ZERO
        };
        (separation, alignment, cohesion)
    }

    /// Advance the school by `dt`.
    ///
    /// All new states are computed before any fish is written, so a
    /// non-finite result leaves the school exactly as it was.
    pub fn update(
        &mut self,
        dt: f32,
        predator: Option<Vec3>,
        current: Vec3,
    ) -> Result<(), SimError> {
        if !dt.is_finite() || dt <= 0.0 || self.fish.is_empty() {
            return Ok(());
        }
        if !current.is_finite() {
            return Err(SimError::NonFinite {
                subsystem: "flocking",
                what: "current force",
            });
        }
        if let NeighborSearch::Grid { .. } = self.config.search {
            self.grid.rebuild(self.fish.iter().map(|f| f.position));
        }

        let cfg = self.config;
        let mut next = Vec::with_capacity(self.fish.len());
        for i in 0..self.fish.len() {
            let (separation, alignment, cohesion) = self.steering(i);
            let fish = &self.fish[i];

            let mut velocity = fish.velocity + (separation + alignment + cohesion + current) * dt;
            if let Some(predator) = predator {
                let away = fish.position - predator;
                let dist = away.length();
                if dist < cfg.predator_radius && dist > f32::EPSILON {
                    velocity += away / dist * cfg.predator_weight;
                }
            }
            velocity = velocity.clamp_length_max(cfg.max_speed * fish.kind.speed_factor());

            let mut position = fish.position + velocity * dt;
            let offset = position - cfg.center;
            if offset.length() > cfg.wrap_radius {
                position = cfg.center - offset.normalize_or_zero() * cfg.respawn_radius;
                velocity = -velocity;
            }

            if !position.is_finite() || !velocity.is_finite() {
                return Err(SimError::NonFinite {
                    subsystem: "flocking",
                    what: "fish state",
                });
            }
            next.push((position, velocity));
        }

        for (fish, (position, velocity)) in self.fish.iter_mut().zip(next) {
            fish.position = position;
            fish.velocity = velocity;
            let speed = velocity.length();
            fish.phase = (fish.phase + dt * (4.0 + speed * 3.0)) % std::f32::consts::TAU;
            if speed > cfg.min_orient_speed {
                fish.orientation = Quat::from_rotation_arc(Vec3::Z, velocity / speed);
            }
        }
        Ok(())
    }
}
