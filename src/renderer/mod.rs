//! Rendering boundary
//!
//! The loop hands a borrowed `FrameView` to whatever `Renderer` it was built
//! with. A render error is fatal for the loop: it stops and cancels its
//! pending frame.

#[cfg(target_arch = "wasm32")]
pub mod canvas;

#[cfg(target_arch = "wasm32")]
pub use canvas::CanvasRenderer;

use glam::Vec3;

use crate::sim::environment::FogParams;
use crate::sim::flocking::Fish;
use crate::sim::grid::{Block, LevelSession, PuzzlePhase, Selection};
use crate::sim::swimmer::Camera;

/// Everything visible this frame
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    /// Frame timestamp (ms)
    pub time: f64,
    pub camera: Camera,
    pub fog: FogParams,
    pub blocks: &'a [Block],
    pub fish: &'a [Fish],
    pub selection: Option<Selection>,
    pub phase: PuzzlePhase,
    pub session: Option<&'a LevelSession>,
    pub current: Vec3,
    /// Subsystem faults recorded so far
    pub faults: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// Drawing surface went away (context lost, canvas removed)
    SurfaceLost,
    Backend(String),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::SurfaceLost => write!(f, "Render surface lost"),
            RenderError::Backend(msg) => write!(f, "Render backend error: {}", msg),
        }
    }
}

impl std::error::Error for RenderError {}

pub trait Renderer {
    fn render(&mut self, frame: &FrameView<'_>) -> Result<(), RenderError>;

    fn resize(&mut self, _width: u32, _height: u32) {}
}

/// Renderer that draws nothing and remembers what it was shown
#[derive(Debug, Default, Clone)]
pub struct HeadlessRenderer {
    pub frames: u64,
    pub last_block_count: usize,
    pub last_fish_count: usize,
    pub last_camera: Option<Camera>,
}

impl Renderer for HeadlessRenderer {
    fn render(&mut self, frame: &FrameView<'_>) -> Result<(), RenderError> {
        self.frames += 1;
        self.last_block_count = frame.blocks.len();
        self.last_fish_count = frame.fish.len();
        self.last_camera = Some(frame.camera);
        Ok(())
    }
}
