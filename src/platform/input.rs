//! Input events and key mapping
//!
//! The browser layer turns DOM events into `InputEvent`s; everything after
//! that is platform independent.

use glam::Vec3;

use crate::Axis;

/// Logical keys the game reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Forward,
    Back,
    Left,
    Right,
    Up,
    Down,
    /// Slide the selected plane towards +axis
    SlidePositive,
    /// Slide the selected plane towards -axis
    SlideNegative,
    /// Slide along a fixed axis instead of the selection's own
    SlideAxis(Axis),
    /// Slide along the selection's axis again
    SlideAlongSelection,
    Undo,
    Hint,
    NextLevel,
    Deselect,
}

impl Key {
    /// Map a DOM `KeyboardEvent.code`
    pub fn from_code(code: &str) -> Option<Key> {
        let key = match code {
            "KeyW" | "ArrowUp" => Key::Forward,
            "KeyS" | "ArrowDown" => Key::Back,
            "KeyA" | "ArrowLeft" => Key::Left,
            "KeyD" | "ArrowRight" => Key::Right,
            "Space" => Key::Up,
            "ShiftLeft" | "ShiftRight" | "KeyC" => Key::Down,
            "KeyE" => Key::SlidePositive,
            "KeyQ" => Key::SlideNegative,
            "Digit1" => Key::SlideAxis(Axis::X),
            "Digit2" => Key::SlideAxis(Axis::Y),
            "Digit3" => Key::SlideAxis(Axis::Z),
            "Digit0" | "Backquote" => Key::SlideAlongSelection,
            "KeyZ" | "Backspace" => Key::Undo,
            "KeyH" => Key::Hint,
            "KeyN" => Key::NextLevel,
            "Escape" => Key::Deselect,
            _ => return None,
        };
        Some(key)
    }
}

/// A world-space ray
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    KeyDown(Key),
    KeyUp(Key),
    /// Relative pointer motion in pixels
    PointerMove { dx: f32, dy: f32 },
    /// Click. `None` aims along the camera's crosshair.
    PointerDown(Option<Ray>),
    /// Pointer lock gained or lost
    PointerCapture(bool),
    /// A UI modal (shop, menus) opened or closed
    ModalChanged(bool),
}

impl InputEvent {
    /// Events that change the gate itself and are always delivered
    pub fn is_gate_event(&self) -> bool {
        matches!(self, InputEvent::PointerCapture(_) | InputEvent::ModalChanged(_))
    }
}

/// What input is currently allowed to reach the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputGate {
    pub pointer_captured: bool,
    pub modal_open: bool,
}

impl InputGate {
    /// Mouse-look needs pointer lock and no modal on top
    pub fn look_enabled(&self) -> bool {
        self.pointer_captured && !self.modal_open
    }

    pub fn accepts(&self, event: &InputEvent) -> bool {
        event.is_gate_event() || !self.modal_open
    }
}
