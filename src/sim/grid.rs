//! Puzzle grid: block entities, selection, slides, undo and win checks
//!
//! Block coordinates are the source of truth for the puzzle. Physics only
//! supplies the visual transform; a slide pushes the bodies with an impulse
//! and moves the logical coordinates by exactly one cell.

use glam::{IVec3, Quat, UVec3, Vec3};
use serde::{Deserialize, Serialize};

use super::history::{BlockSnapshot, MoveHistory, MoveSnapshot};
use super::level::{
    BlockKind, BlockPlacement, BlockRole, Level, LevelId, PlacementKind, WinCondition,
};
use super::physics::{BodyDesc, BodyHandle, BodyShape, BodyState, RigidBodyWorld};
use super::win::{self, PathRule, WinVerdict};
use crate::consts::*;
use crate::error::SimError;
use crate::services::{CompletionReport, HudEvent, Services, Sound};
use crate::{Axis, dominant_axis};

/// A block in play
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: u32,
    pub body: BodyHandle,
    /// Logical grid cell, only changed by slide and undo
    pub coord: IVec3,
    pub kind: BlockKind,
    pub role: BlockRole,
    pub required: bool,
    /// Transform mirrored from the physics body each frame
    pub position: Vec3,
    pub rotation: Quat,
    pub highlighted: bool,
}

impl Block {
    #[cfg(test)]
    pub(crate) fn detached(
        id: u32,
        coord: IVec3,
        kind: BlockKind,
        role: BlockRole,
        required: bool,
    ) -> Self {
        Self {
            id,
            body: BodyHandle::invalid(),
            coord,
            kind,
            role,
            required,
            position: coord.as_vec3(),
            rotation: Quat::IDENTITY,
            highlighted: false,
        }
    }
}

/// A selected plane of blocks: every block whose coordinate on `axis` is `index`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub axis: Axis,
    pub index: i32,
}

impl Selection {
    pub fn contains(&self, coord: IVec3) -> bool {
        coord[self.axis.index()] == self.index
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PuzzlePhase {
    /// Nothing selected
    Idle,
    RowSelected(Selection),
    /// A slide is in flight; input is refused until it settles
    Sliding { selection: Selection, remaining: f32 },
    LevelComplete,
    /// Budget spent without winning. Undo leaves this state.
    OutOfMoves,
}

/// Per-attempt bookkeeping for the loaded level
#[derive(Debug, Clone, PartialEq)]
pub struct LevelSession {
    pub level: LevelId,
    pub win: WinCondition,
    pub max_moves: u32,
    pub target_score: u32,
    pub moves_used: u32,
    pub score: u32,
}

impl LevelSession {
    fn new(level: &Level) -> Self {
        Self {
            level: level.id,
            win: level.win,
            max_moves: level.max_moves,
            target_score: level.target_score,
            moves_used: 0,
            score: 0,
        }
    }

    pub fn moves_left(&self) -> u32 {
        self.max_moves.saturating_sub(self.moves_used)
    }
}

/// Where a pointer ray met a block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockHit {
    pub block_id: u32,
    pub point: Vec3,
    pub normal: Vec3,
}

pub struct PuzzleGrid {
    blocks: Vec<Block>,
    grid_size: UVec3,
    /// World position of cell (0, 0, 0)
    origin: Vec3,
    phase: PuzzlePhase,
    history: MoveHistory,
    session: Option<LevelSession>,
    path_rule: PathRule,
    next_block_id: u32,
    pending_warned: bool,
}

impl PuzzleGrid {
    pub fn new(undo_capacity: usize, path_rule: PathRule) -> Self {
        Self {
            blocks: Vec::new(),
            grid_size: UVec3::ZERO,
            origin: Vec3::ZERO,
            phase: PuzzlePhase::Idle,
            history: MoveHistory::new(undo_capacity),
            session: None,
            path_rule,
            next_block_id: 1,
            pending_warned: false,
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, id: u32) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn phase(&self) -> PuzzlePhase {
        self.phase
    }

    pub fn selection(&self) -> Option<Selection> {
        match self.phase {
            PuzzlePhase::RowSelected(selection) | PuzzlePhase::Sliding { selection, .. } => {
                Some(selection)
            }
            _ => None,
        }
    }

    pub fn session(&self) -> Option<&LevelSession> {
        self.session.as_ref()
    }

    pub fn history(&self) -> &MoveHistory {
        &self.history
    }

    pub fn grid_size(&self) -> UVec3 {
        self.grid_size
    }

    pub fn is_complete(&self) -> bool {
        self.phase == PuzzlePhase::LevelComplete
    }

    pub fn set_undo_capacity(&mut self, capacity: usize) {
        self.history.set_capacity(capacity);
    }

    pub fn set_path_rule(&mut self, rule: PathRule) {
        self.path_rule = rule;
    }

    /// World-space centre of a grid cell
    pub fn cell_center(&self, coord: IVec3) -> Vec3 {
        self.origin + coord.as_vec3() * BLOCK_SPACING
    }

    /// Replace the current layout with `level`'s
    pub fn load_level(&mut self, world: &mut RigidBodyWorld, level: &Level) {
        self.clear(world);

        self.grid_size = level.grid_size;
        let mut placements = level.blocks.clone();
        if placements.is_empty() {
            log::warn!("Level {} has no blocks, using the test row", level.id);
            placements = vec![
                BlockPlacement::new(0, 0, 0, PlacementKind::Coral),
                BlockPlacement::new(1, 0, 0, PlacementKind::Gem),
                BlockPlacement::new(2, 0, 0, PlacementKind::Coral),
            ];
            self.grid_size = self.grid_size.max(UVec3::new(3, 1, 1));
        }

        // Centre the grid on the origin, resting on the floor
        let half = (self.grid_size.as_vec3() - Vec3::ONE).max(Vec3::ZERO) * 0.5 * BLOCK_SPACING;
        self.origin = Vec3::new(-half.x, FLOOR_Y + BLOCK_HALF_EXTENT + 0.05, -half.z);

        for placement in &placements {
            self.spawn_block(world, placement.coord, placement.kind, placement.required);
        }

        self.history.clear();
        self.session = Some(LevelSession::new(level));
        self.phase = PuzzlePhase::Idle;
        self.pending_warned = false;
        log::info!(
            "Loaded level {} \"{}\" with {} blocks ({} win)",
            level.id,
            level.name,
            self.blocks.len(),
            level.win.name()
        );
    }

    /// Remove every block and its body
    pub fn clear(&mut self, world: &mut RigidBodyWorld) {
        for block in self.blocks.drain(..) {
            world.remove_body(block.body);
        }
        self.session = None;
        self.phase = PuzzlePhase::Idle;
        self.history.clear();
    }

    fn spawn_block(
        &mut self,
        world: &mut RigidBodyWorld,
        coord: IVec3,
        kind: PlacementKind,
        required: bool,
    ) {
        let position = self.cell_center(coord);
        let desc = BodyDesc::dynamic(
            BodyShape::Cuboid {
                half_extents: Vec3::splat(BLOCK_HALF_EXTENT),
            },
            position,
        )
        .with_density(BLOCK_DENSITY)
        .with_friction(BLOCK_FRICTION)
        .with_damping(BLOCK_LINEAR_DAMPING, BLOCK_ANGULAR_DAMPING);
        let body = world.add_body(desc);

        let id = self.next_block_id;
        self.next_block_id += 1;
        self.blocks.push(Block {
            id,
            body,
            coord,
            kind: kind.visual(),
            role: kind.role(),
            required,
            position,
            rotation: Quat::IDENTITY,
            highlighted: false,
        });
    }

    fn accepts_selection(&self) -> bool {
        matches!(self.phase, PuzzlePhase::Idle | PuzzlePhase::RowSelected(_))
    }

    /// Select the plane `axis == index`. Refused mid-slide, after the level
    /// ends, or when no block lies in that plane.
    pub fn select_row(&mut self, axis: Axis, index: i32) -> bool {
        if !self.accepts_selection() {
            return false;
        }
        let selection = Selection { axis, index };
        if !self.blocks.iter().any(|b| selection.contains(b.coord)) {
            return false;
        }
        self.phase = PuzzlePhase::RowSelected(selection);
        self.refresh_highlights();
        true
    }

    /// Select from a hit on a block face: the normal picks the axis, the
    /// block's coordinate on that axis picks the plane.
    pub fn select_from_hit(&mut self, block_id: u32, normal: Vec3) -> bool {
        let Some(block) = self.block(block_id) else {
            return false;
        };
        let axis = dominant_axis(normal);
        let index = block.coord[axis.index()];
        self.select_row(axis, index)
    }

    pub fn clear_selection(&mut self) {
        if let PuzzlePhase::RowSelected(_) = self.phase {
            self.phase = PuzzlePhase::Idle;
            self.refresh_highlights();
        }
    }

    /// Map a ray cast onto the block it hits, if any
    pub fn pick(
        &self,
        world: &RigidBodyWorld,
        origin: Vec3,
        direction: Vec3,
        exclude: Option<BodyHandle>,
    ) -> Option<BlockHit> {
        let hit = world.cast_ray(origin, direction, PICK_DISTANCE, exclude)?;
        self.blocks.iter().find(|b| b.body == hit.body).map(|b| BlockHit {
            block_id: b.id,
            point: hit.point,
            normal: hit.normal,
        })
    }

    fn refresh_highlights(&mut self) {
        let selection = self.selection();
        for block in &mut self.blocks {
            block.highlighted = selection.is_some_and(|s| s.contains(block.coord));
        }
    }

    fn snapshot(&self, world: &RigidBodyWorld, selection: Selection) -> MoveSnapshot {
        let blocks = self
            .blocks
            .iter()
            .map(|b| BlockSnapshot {
                block_id: b.id,
                coord: b.coord,
                required: b.required,
                body: world.body_state(b.body).unwrap_or(BodyState {
                    position: b.position,
                    rotation: b.rotation,
                    linvel: Vec3::ZERO,
                    angvel: Vec3::ZERO,
                }),
            })
            .collect();
        let (moves_used, score) = self
            .session
            .as_ref()
            .map_or((0, 0), |s| (s.moves_used, s.score));
        MoveSnapshot {
            blocks,
            moves_used,
            score,
            selection: Some(selection),
        }
    }

    /// Slide the selected plane one cell along `axis` in the sign of `direction`.
    ///
    /// Returns false (and changes nothing) without a settled selection.
    pub fn slide(
        &mut self,
        world: &mut RigidBodyWorld,
        services: &mut Services,
        axis: Axis,
        direction: i32,
    ) -> bool {
        let PuzzlePhase::RowSelected(mut selection) = self.phase else {
            return false;
        };
        let step = direction.signum();
        if step == 0 || self.session.is_none() {
            return false;
        }

        let snapshot = self.snapshot(world, selection);
        self.history.push(snapshot);

        let impulse = axis.unit() * SLIDE_IMPULSE * step as f32;
        let mut moved = 0u32;
        let mut centroid = Vec3::ZERO;
        let mut gem_points = 0u32;
        for block in self.blocks.iter_mut().filter(|b| selection.contains(b.coord)) {
            world.apply_impulse(block.body, impulse);
            block.coord[axis.index()] += step;
            if block.required && block.kind == BlockKind::Gem {
                block.required = false;
                gem_points += GEM_POINTS;
            }
            centroid += block.position;
            moved += 1;
        }

        if axis == selection.axis {
            selection.index += step;
        }
        if let Some(session) = self.session.as_mut() {
            session.moves_used += 1;
            session.score = session.score.saturating_add(gem_points);
            log::debug!(
                "Slide {:?}{} on {:?}={}: {} block(s), move {}/{}",
                axis,
                if step > 0 { "+" } else { "-" },
                selection.axis,
                selection.index,
                moved,
                session.moves_used,
                session.max_moves
            );
        }

        let at = (moved > 0).then(|| centroid / moved as f32);
        services.audio.play_sound(Sound::Slide, at);
        self.phase = PuzzlePhase::Sliding {
            selection,
            remaining: SLIDE_SETTLE_SECS,
        };
        self.refresh_highlights();

        self.check_win_condition(services);
        true
    }

    /// Evaluate the level's win condition and settle the outcome.
    ///
    /// Once complete this keeps returning true without reporting again.
    pub fn check_win_condition(&mut self, services: &mut Services) -> bool {
        if self.phase == PuzzlePhase::LevelComplete {
            return true;
        }
        let Some(session) = self.session.clone() else {
            return false;
        };

        let verdict = win::evaluate(&session.win, &self.blocks, self.grid_size, self.path_rule);
        if verdict == WinVerdict::Pending && !self.pending_warned {
            log::warn!(
                "Level {} uses the '{}' win condition, which has no rule yet; counting it as met",
                session.level,
                session.win.name()
            );
            self.pending_warned = true;
        }

        if verdict.is_won() {
            self.complete(services, &session);
            return true;
        }

        if session.moves_used >= session.max_moves && self.phase != PuzzlePhase::OutOfMoves {
            log::info!("Level {} out of moves", session.level);
            self.phase = PuzzlePhase::OutOfMoves;
            self.refresh_highlights();
            services.hud.notify(HudEvent::OutOfMoves {
                level: session.level,
                moves_used: session.moves_used,
            });
            services.audio.play_sound(Sound::OutOfMoves, None);
        }
        false
    }

    fn complete(&mut self, services: &mut Services, session: &LevelSession) {
        let stars = win::star_rating(
            session.moves_used,
            session.max_moves,
            session.score,
            session.target_score,
        );

        let best_stars = services
            .levels
            .level_mut(session.level)
            .map_or(stars, |level| level.record_stars(stars));
        let mut unlocked = Vec::new();
        if stars > 0 {
            let next = session.level + 1;
            if let Some(level) = services.levels.level_mut(next) {
                if level.unlock() {
                    unlocked.push(next);
                }
            }
        }
        services.levels.commit();

        let report = CompletionReport {
            level: session.level,
            stars,
            best_stars,
            score: session.score,
            moves_used: session.moves_used,
            unlocked,
        };
        log::info!(
            "Level {} complete in {} move(s): {} star(s)",
            report.level,
            report.moves_used,
            report.stars
        );
        services.score.report_completion(&report);
        services.hud.notify(HudEvent::LevelComplete(report));
        services.audio.play_sound(Sound::LevelComplete, None);

        self.phase = PuzzlePhase::LevelComplete;
        self.refresh_highlights();
    }

    /// Take back the last slide, restoring coordinates, gem flags, the move
    /// counter and every body's transform and velocities.
    pub fn undo(&mut self, world: &mut RigidBodyWorld) -> bool {
        if self.phase == PuzzlePhase::LevelComplete {
            return false;
        }
        let Some(snapshot) = self.history.pop() else {
            return false;
        };

        for saved in &snapshot.blocks {
            if let Some(block) = self.blocks.iter_mut().find(|b| b.id == saved.block_id) {
                block.coord = saved.coord;
                block.required = saved.required;
                block.position = saved.body.position;
                block.rotation = saved.body.rotation;
                if !world.set_body_state(block.body, &saved.body) {
                    log::warn!("Undo: block {} has no body to restore", block.id);
                }
            }
        }
        if let Some(session) = self.session.as_mut() {
            session.moves_used = snapshot.moves_used;
            session.score = snapshot.score;
        }
        self.phase = match snapshot.selection {
            Some(selection) => PuzzlePhase::RowSelected(selection),
            None => PuzzlePhase::Idle,
        };
        self.refresh_highlights();
        true
    }

    /// Mirror body transforms into the blocks and advance the settle timer.
    ///
    /// Fails without touching any block if a body has gone missing.
    pub fn update(&mut self, world: &RigidBodyWorld, dt: f32) -> Result<(), SimError> {
        let mut states = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            let state = world.body_state(block.body).ok_or(SimError::MissingBody {
                subsystem: "puzzle",
                body: block.body,
            })?;
            if !state.position.is_finite() {
                return Err(SimError::NonFinite {
                    subsystem: "puzzle",
                    what: "block position",
                });
            }
            states.push(state);
        }
        for (block, state) in self.blocks.iter_mut().zip(states) {
            block.position = state.position;
            block.rotation = state.rotation;
        }

        if let PuzzlePhase::Sliding {
            selection,
            remaining,
        } = self.phase
        {
            let remaining = remaining - dt.max(0.0);
            self.phase = if remaining <= 0.0 {
                PuzzlePhase::RowSelected(selection)
            } else {
                PuzzlePhase::Sliding {
                    selection,
                    remaining,
                }
            };
        }
        Ok(())
    }

    /// Push a hint describing the current goal
    pub fn hint(&self, services: &mut Services) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let text = match session.win {
            WinCondition::Path => format!(
                "Open a route from the glowing start block to the gem exit ({} move(s) left)",
                session.moves_left()
            ),
            WinCondition::Collect => {
                let left = self
                    .blocks
                    .iter()
                    .filter(|b| b.required && b.kind == BlockKind::Gem)
                    .count();
                format!(
                    "Slide the {} marked gem(s) out of place ({} move(s) left)",
                    left,
                    session.moves_left()
                )
            }
            WinCondition::Align { .. } | WinCondition::Clear { .. } => {
                "No hint for this goal yet".to_string()
            }
        };
        services.hud.notify(HudEvent::Hint(text));
    }

    /// Credit points earned outside of slides (fish catches)
    pub fn add_score(&mut self, points: u32) {
        if let Some(session) = self.session.as_mut() {
            session.score = session.score.saturating_add(points);
        }
    }
}
