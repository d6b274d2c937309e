//! Error taxonomy
//!
//! - `InitError`: one-time setup failed, surfaced to whoever started the game
//! - `SimError`: a subsystem faulted during a frame; the loop isolates it
//! - `LevelError`: a level could not be found, started, or parsed
//!
//! Invalid puzzle input (slide with no selection, undo with nothing to undo)
//! is not an error; those operations just return `false`.

use std::fmt;

use crate::sim::level::LevelId;
use crate::sim::physics::BodyHandle;

/// Per-frame subsystem fault
#[derive(Debug, Clone, PartialEq)]
pub enum SimError {
    /// A body the subsystem owns is no longer in the physics world
    MissingBody {
        subsystem: &'static str,
        body: BodyHandle,
    },
    /// An update produced NaN or infinite state
    NonFinite {
        subsystem: &'static str,
        what: &'static str,
    },
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::MissingBody { subsystem, body } => {
                write!(f, "{}: body {:?} missing from physics world", subsystem, body)
            }
            SimError::NonFinite { subsystem, what } => {
                write!(f, "{}: non-finite {}", subsystem, what)
            }
        }
    }
}

impl std::error::Error for SimError {}

/// Level lookup / parse failures
#[derive(Debug)]
pub enum LevelError {
    NotFound(LevelId),
    Locked(LevelId),
    Parse(serde_json::Error),
}

impl From<serde_json::Error> for LevelError {
    fn from(e: serde_json::Error) -> Self {
        LevelError::Parse(e)
    }
}

impl fmt::Display for LevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelError::NotFound(id) => write!(f, "Level {} does not exist", id),
            LevelError::Locked(id) => write!(f, "Level {} is locked", id),
            LevelError::Parse(e) => write!(f, "Level pack parse error: {}", e),
        }
    }
}

impl std::error::Error for LevelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LevelError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

/// One-time initialization failures
#[derive(Debug)]
pub enum InitError {
    /// The level provider has no playable level
    NoLevels,
    Level(LevelError),
    /// Platform surface (window, canvas, storage) unavailable
    Platform(String),
}

impl From<LevelError> for InitError {
    fn from(e: LevelError) -> Self {
        InitError::Level(e)
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::NoLevels => write!(f, "No playable level available"),
            InitError::Level(e) => write!(f, "Level setup failed: {}", e),
            InitError::Platform(msg) => write!(f, "Platform setup failed: {}", msg),
        }
    }
}

impl std::error::Error for InitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InitError::Level(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let e = SimError::NonFinite {
            subsystem: "flocking",
            what: "fish velocity",
        };
        assert_eq!(e.to_string(), "flocking: non-finite fish velocity");
        assert_eq!(LevelError::Locked(4).to_string(), "Level 4 is locked");
        let init: InitError = LevelError::NotFound(9).into();
        assert!(init.to_string().contains("Level 9 does not exist"));
    }
}
