//! 2D canvas renderer
//!
//! Draws a top-down chart of the dive site: blocks by grid cell, the fish
//! school, the swimmer and a status line. Depth is shown by tinting toward
//! the fog colour.

use glam::{Vec2, Vec3};
use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

use super::{FrameView, RenderError, Renderer};
use crate::consts::*;
use crate::sim::grid::PuzzlePhase;
use crate::sim::level::BlockRole;

/// World units shown across the shorter canvas side
const VIEW_SPAN: f32 = 36.0;

pub struct CanvasRenderer {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
    width: f64,
    height: f64,
    show_fps: bool,
    last_time: Option<f64>,
    fps: f64,
}

impl CanvasRenderer {
    pub fn new(canvas: HtmlCanvasElement) -> Result<Self, RenderError> {
        let ctx = canvas
            .get_context("2d")
            .map_err(|e| RenderError::Backend(format!("{:?}", e)))?
            .ok_or(RenderError::SurfaceLost)?
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(|_| RenderError::Backend("not a 2d context".into()))?;
        let width = f64::from(canvas.width());
        let height = f64::from(canvas.height());
        Ok(Self {
            canvas,
            ctx,
            width,
            height,
            show_fps: false,
            last_time: None,
            fps: 0.0,
        })
    }

    pub fn set_show_fps(&mut self, show: bool) {
        self.show_fps = show;
    }

    fn scale(&self) -> f64 {
        self.width.min(self.height) / f64::from(VIEW_SPAN)
    }

    /// World XZ to canvas pixels, centred on `focus`
    fn to_screen(&self, p: Vec3, focus: Vec2) -> (f64, f64) {
        let s = self.scale();
        (
            self.width / 2.0 + f64::from(p.x - focus.x) * s,
            self.height / 2.0 + f64::from(p.z - focus.y) * s,
        )
    }

    fn fill(&self, color: &str) {
        self.ctx.set_fill_style_str(color);
    }

    fn circle(&self, x: f64, y: f64, r: f64) -> Result<(), RenderError> {
        self.ctx.begin_path();
        self.ctx
            .arc(x, y, r, 0.0, std::f64::consts::TAU)
            .map_err(|e| RenderError::Backend(format!("{:?}", e)))?;
        self.ctx.fill();
        Ok(())
    }

    fn text(&self, text: &str, x: f64, y: f64) -> Result<(), RenderError> {
        self.ctx
            .fill_text(text, x, y)
            .map_err(|e| RenderError::Backend(format!("{:?}", e)))
    }
}

/// `#rrggbb` of a colour mixed toward `fog` by `t`
fn css(color: u32, fog: Vec3, t: f32) -> String {
    let base = Vec3::new(
        ((color >> 16) & 0xff) as f32,
        ((color >> 8) & 0xff) as f32,
        (color & 0xff) as f32,
    ) / 255.0;
    let c = base.lerp(fog, t.clamp(0.0, 1.0)) * 255.0;
    format!("#{:02x}{:02x}{:02x}", c.x as u8, c.y as u8, c.z as u8)
}

impl Renderer for CanvasRenderer {
    fn render(&mut self, frame: &FrameView<'_>) -> Result<(), RenderError> {
        if !self.canvas.is_connected() {
            return Err(RenderError::SurfaceLost);
        }

        if let Some(prev) = self.last_time {
            let dt = frame.time - prev;
            if dt > 0.0 {
                self.fps = self.fps * 0.9 + (1000.0 / dt) * 0.1;
            }
        }
        self.last_time = Some(frame.time);

        let fog = frame.fog;
        let haze = (fog.density * 20.0).min(0.8);
        self.fill(&css(0x000000, fog.color, 1.0));
        self.ctx.fill_rect(0.0, 0.0, self.width, self.height);

        let focus = Vec2::new(frame.camera.position.x, frame.camera.position.z);
        let s = self.scale();
        let cell = f64::from(BLOCK_HALF_EXTENT * 2.0) * s;

        // Blocks, lowest first so upper layers cover them
        let mut order: Vec<usize> = (0..frame.blocks.len()).collect();
        order.sort_by(|&a, &b| frame.blocks[a].position.y.total_cmp(&frame.blocks[b].position.y));
        for &i in &order {
            let block = &frame.blocks[i];
            let (x, y) = self.to_screen(block.position, focus);
            self.fill(&css(block.kind.color(), fog.color, haze));
            self.ctx.fill_rect(x - cell / 2.0, y - cell / 2.0, cell, cell);

            let selected = frame.selection.is_some_and(|sel| sel.contains(block.coord));
            if selected || block.highlighted {
                self.ctx.set_stroke_style_str("#ffffff");
                self.ctx.set_line_width(2.0);
                self.ctx.stroke_rect(x - cell / 2.0, y - cell / 2.0, cell, cell);
            }
            match block.role {
                BlockRole::Start => {
                    self.fill("#7dff9a");
                    self.circle(x, y, cell * 0.18)?;
                }
                BlockRole::Exit => {
                    self.fill("#ffe27d");
                    self.circle(x, y, cell * 0.18)?;
                }
                BlockRole::Plain => {}
            }
        }

        for fish in frame.fish {
            let (x, y) = self.to_screen(fish.position, focus);
            self.fill(&css(fish.kind.color(), fog.color, haze));
            self.circle(x, y, f64::from(0.25 * fish.kind.scale()) * s)?;
        }

        // Swimmer with a heading tick
        let (cx, cy) = self.to_screen(frame.camera.position, focus);
        let heading = frame.camera.forward();
        self.fill("#e8f4ff");
        self.circle(cx, cy, f64::from(SWIMMER_RADIUS) * s)?;
        self.ctx.set_stroke_style_str("#e8f4ff");
        self.ctx.set_line_width(2.0);
        self.ctx.begin_path();
        self.ctx.move_to(cx, cy);
        self.ctx.line_to(
            cx + f64::from(heading.x) * s * 1.5,
            cy + f64::from(heading.z) * s * 1.5,
        );
        self.ctx.stroke();

        // Status line
        self.ctx.set_font("16px monospace");
        self.fill("#d0e8ff");
        if let Some(session) = frame.session {
            let status = match frame.phase {
                PuzzlePhase::LevelComplete => "  COMPLETE - press N",
                PuzzlePhase::OutOfMoves => "  OUT OF MOVES - press Z",
                _ => "",
            };
            let line = format!(
                "Level {}  moves {}/{}  score {}{}",
                session.level, session.moves_used, session.max_moves, session.score, status
            );
            self.text(&line, 12.0, 24.0)?;
        }
        let depth = crate::depth_at(frame.camera.position);
        self.text(&format!("depth {:.1}m", depth), 12.0, 44.0)?;
        if frame.faults > 0 {
            self.fill("#ff8080");
            self.text(&format!("faults {}", frame.faults), 12.0, 64.0)?;
        }
        if self.show_fps {
            self.fill("#d0e8ff");
            self.text(&format!("{:.0} fps", self.fps), self.width - 80.0, 24.0)?;
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.canvas.set_width(width);
        self.canvas.set_height(height);
        self.width = f64::from(width);
        self.height = f64::from(height);
    }
}
