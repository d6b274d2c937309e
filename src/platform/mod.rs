//! Platform abstraction layer
//!
//! Handles browser/native differences for:
//! - Input events and key mapping
//! - Frame scheduling (requestAnimationFrame on web, manual natively)

pub mod input;
pub mod scheduler;

pub use input::{InputEvent, InputGate, Key, Ray};
pub use scheduler::{FrameRequest, FrameScheduler, ManualScheduler};
