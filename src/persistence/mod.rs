//! Level progress persistence
//!
//! Only `unlocked` and `stars` per level survive a reload. The payload is a
//! small versioned JSON document kept in LocalStorage on the web and in
//! memory everywhere else.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::sim::level::LevelId;

/// Bumped when the stored layout changes incompatibly
pub const PROGRESS_VERSION: u32 = 1;

/// Saved state of one level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LevelProgress {
    pub unlocked: bool,
    pub stars: u8,
}

/// Saved progress across all levels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub version: u32,
    pub levels: BTreeMap<LevelId, LevelProgress>,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            version: PROGRESS_VERSION,
            levels: BTreeMap::new(),
        }
    }
}

impl Progress {
    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PersistError> {
        let progress: Progress = serde_json::from_str(json)?;
        if progress.version != PROGRESS_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: PROGRESS_VERSION,
                found: progress.version,
            });
        }
        Ok(progress)
    }

    pub fn total_stars(&self) -> u32 {
        self.levels.values().map(|p| u32::from(p.stars)).sum()
    }
}

#[derive(Debug)]
pub enum PersistError {
    /// Backing storage missing or refused the operation
    Storage(String),
    Serde(serde_json::Error),
    VersionMismatch { expected: u32, found: u32 },
}

impl From<serde_json::Error> for PersistError {
    fn from(e: serde_json::Error) -> Self {
        PersistError::Serde(e)
    }
}

impl std::fmt::Display for PersistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistError::Storage(msg) => write!(f, "Storage error: {}", msg),
            PersistError::Serde(e) => write!(f, "Serialization error: {}", e),
            PersistError::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Progress version mismatch: expected {}, found {}",
                    expected, found
                )
            }
        }
    }
}

impl std::error::Error for PersistError {}

/// Somewhere to keep progress between sessions
pub trait ProgressStore {
    /// `Ok(None)` when nothing has been saved yet
    fn load(&self) -> Result<Option<Progress>, PersistError>;
    fn save(&mut self, progress: &Progress) -> Result<(), PersistError>;
}

/// In-memory store. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slot: Rc<RefCell<Option<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw JSON last written, if any
    pub fn raw(&self) -> Option<String> {
        self.slot.borrow().clone()
    }
}

impl ProgressStore for MemoryStore {
    fn load(&self) -> Result<Option<Progress>, PersistError> {
        self.slot
            .borrow()
            .as_deref()
            .map(Progress::from_json)
            .transpose()
    }

    fn save(&mut self, progress: &Progress) -> Result<(), PersistError> {
        *self.slot.borrow_mut() = Some(progress.to_json()?);
        Ok(())
    }
}

/// Browser LocalStorage store
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorageStore;

#[cfg(target_arch = "wasm32")]
impl LocalStorageStore {
    const STORAGE_KEY: &'static str = "abyss_slide_progress";

    fn storage() -> Result<web_sys::Storage, PersistError> {
        web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten()
            .ok_or_else(|| PersistError::Storage("LocalStorage unavailable".into()))
    }
}

#[cfg(target_arch = "wasm32")]
impl ProgressStore for LocalStorageStore {
    fn load(&self) -> Result<Option<Progress>, PersistError> {
        let storage = Self::storage()?;
        match storage.get_item(Self::STORAGE_KEY) {
            Ok(Some(json)) => {
                let progress = Progress::from_json(&json)?;
                log::info!("Loaded progress for {} levels", progress.levels.len());
                Ok(Some(progress))
            }
            Ok(None) => Ok(None),
            Err(_) => Err(PersistError::Storage("LocalStorage read failed".into())),
        }
    }

    fn save(&mut self, progress: &Progress) -> Result<(), PersistError> {
        let storage = Self::storage()?;
        let json = progress.to_json()?;
        storage
            .set_item(Self::STORAGE_KEY, &json)
            .map_err(|_| PersistError::Storage("LocalStorage write failed".into()))?;
        log::info!("Progress saved ({} stars)", progress.total_stars());
        Ok(())
    }
}
