//! Level data model
//!
//! Levels are plain serde data so they can ship as JSON packs. Everything
//! except `unlocked` and `stars` is fixed once the level is built.

use glam::{IVec3, UVec3};
use serde::{Deserialize, Serialize};

use crate::Axis;

/// Levels are numbered sequentially from 1
pub type LevelId = u32;

/// Visual block kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Rock,
    Coral,
    Gem,
    Dark,
    Glow,
}

impl BlockKind {
    /// Whether a swimmer route may pass through a cell holding this block
    pub fn is_passable(self) -> bool {
        !matches!(self, BlockKind::Rock | BlockKind::Dark)
    }

    /// Display colour (0xRRGGBB)
    pub fn color(self) -> u32 {
        match self {
            BlockKind::Rock => 0x6b6158,
            BlockKind::Coral => 0xff7f6e,
            BlockKind::Gem => 0x4fe3ff,
            BlockKind::Dark => 0x1c1f2b,
            BlockKind::Glow => 0xb8ff6a,
        }
    }
}

/// Gameplay role of a block on top of its visual kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockRole {
    #[default]
    Plain,
    Start,
    Exit,
}

/// Kind as written in level data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementKind {
    Rock,
    Coral,
    Gem,
    Dark,
    Glow,
    Start,
    Exit,
}

impl PlacementKind {
    /// Start renders as glow, exit as gem
    pub fn visual(self) -> BlockKind {
        match self {
            PlacementKind::Rock => BlockKind::Rock,
            PlacementKind::Coral => BlockKind::Coral,
            PlacementKind::Gem | PlacementKind::Exit => BlockKind::Gem,
            PlacementKind::Dark => BlockKind::Dark,
            PlacementKind::Glow | PlacementKind::Start => BlockKind::Glow,
        }
    }

    pub fn role(self) -> BlockRole {
        match self {
            PlacementKind::Start => BlockRole::Start,
            PlacementKind::Exit => BlockRole::Exit,
            _ => BlockRole::Plain,
        }
    }
}

/// One block in a level layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPlacement {
    pub coord: IVec3,
    pub kind: PlacementKind,
    /// Required gems must be relocated for `collect` levels
    #[serde(default)]
    pub required: bool,
}

impl BlockPlacement {
    pub fn new(x: i32, y: i32, z: i32, kind: PlacementKind) -> Self {
        Self {
            coord: IVec3::new(x, y, z),
            kind,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Per-level win predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WinCondition {
    /// Route from the start block to the exit block
    Path,
    /// Every required gem has been relocated
    Collect,
    /// Reserved: no rule defined yet
    Align { axis: Axis },
    /// Reserved: no rule defined yet
    Clear { block: BlockKind },
}

impl WinCondition {
    pub fn name(&self) -> &'static str {
        match self {
            WinCondition::Path => "path",
            WinCondition::Collect => "collect",
            WinCondition::Align { .. } => "align",
            WinCondition::Clear { .. } => "clear",
        }
    }
}

/// A puzzle level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub id: LevelId,
    pub name: String,
    pub grid_size: UVec3,
    pub blocks: Vec<BlockPlacement>,
    pub win: WinCondition,
    pub max_moves: u32,
    pub target_score: u32,
    #[serde(default)]
    pub unlocked: bool,
    /// Best rating achieved so far (0-3)
    #[serde(default)]
    pub stars: u8,
}

impl Level {
    /// Unlock the level. Returns true if it was locked before.
    pub fn unlock(&mut self) -> bool {
        let was_locked = !self.unlocked;
        self.unlocked = true;
        was_locked
    }

    /// Keep the best of the stored and new rating, returning the best
    pub fn record_stars(&mut self, stars: u8) -> u8 {
        self.stars = self.stars.max(stars.min(3));
        self.stars
    }

    /// Whether a coordinate lies inside the level's grid
    pub fn in_bounds(&self, coord: IVec3) -> bool {
        in_bounds(self.grid_size, coord)
    }
}

pub(crate) fn in_bounds(grid_size: UVec3, coord: IVec3) -> bool {
    coord.cmpge(IVec3::ZERO).all() && coord.cmplt(grid_size.as_ivec3()).all()
}
