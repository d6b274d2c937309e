//! Simulation core
//!
//! Everything that advances the game world lives here. Nothing in this
//! module touches the DOM or a renderer:
//! - Physics advances in fixed sub-steps only
//! - Randomness comes from seeded `Pcg32`s
//! - Collections are iterated in insertion (id) order

pub mod environment;
pub mod flocking;
pub mod grid;
pub mod history;
pub mod level;
pub mod levels;
pub mod physics;
pub mod spatial;
pub mod swimmer;
pub mod win;

pub use environment::{Environment, FogParams, fog};
pub use flocking::{Fish, FishKind, FlockConfig, FlockingSystem, NeighborSearch};
pub use grid::{Block, BlockHit, LevelSession, PuzzleGrid, PuzzlePhase, Selection};
pub use history::{MoveHistory, MoveSnapshot};
pub use level::{BlockKind, BlockPlacement, BlockRole, Level, LevelId, PlacementKind, WinCondition};
pub use levels::{LevelCatalog, generate_level};
pub use physics::{BodyDesc, BodyHandle, BodyKind, BodyShape, BodyState, RayHit, RigidBodyWorld};
pub use swimmer::{Camera, FirstPersonController, Intent};
pub use win::{PathRule, WinVerdict, star_rating};
