//! Level catalog: hand-authored levels followed by generated ones
//!
//! Generated levels are deterministic for a given (id, seed) pair so the
//! same catalog comes back after a reload and saved stars still line up.

use glam::{IVec3, UVec3};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::level::{BlockPlacement, Level, LevelId, PlacementKind, WinCondition};
use crate::consts::GEM_POINTS;
use crate::error::LevelError;
use crate::persistence::{LevelProgress, Progress, ProgressStore};
use crate::services::LevelProvider;

/// Levels in the default catalog (hand-authored + generated)
pub const CATALOG_SIZE: u32 = 12;
/// Seed used for the generated tail of the default catalog
pub const DEFAULT_LEVEL_SEED: u64 = 0x0ab5_5eed;

use PlacementKind::*;

fn level(
    id: LevelId,
    name: &str,
    grid_size: UVec3,
    blocks: Vec<BlockPlacement>,
    win: WinCondition,
    max_moves: u32,
    target_score: u32,
) -> Level {
    Level {
        id,
        name: name.to_string(),
        grid_size,
        blocks,
        win,
        max_moves,
        target_score,
        unlocked: false,
        stars: 0,
    }
}

/// The hand-authored opening levels
pub fn builtin_levels() -> Vec<Level> {
    let p = BlockPlacement::new;
    vec![
        level(
            1,
            "First Dive",
            UVec3::new(3, 1, 3),
            vec![p(0, 0, 0, Start), p(2, 0, 0, Exit), p(1, 0, 1, Coral), p(1, 0, 2, Rock)],
            WinCondition::Path,
            6,
            0,
        ),
        level(
            2,
            "Kelp Corridor",
            UVec3::new(4, 1, 3),
            vec![
                p(0, 0, 1, Start),
                p(3, 0, 1, Exit),
                p(1, 0, 0, Rock),
                p(1, 0, 1, Rock),
                p(2, 0, 1, Rock),
                p(2, 0, 2, Rock),
                p(1, 0, 2, Coral),
            ],
            WinCondition::Path,
            8,
            0,
        ),
        level(
            3,
            "Gem Garden",
            UVec3::new(3, 2, 3),
            vec![
                p(1, 0, 1, Gem).required(),
                p(2, 1, 0, Gem).required(),
                p(0, 0, 0, Rock),
                p(0, 0, 2, Coral),
                p(2, 0, 2, Glow),
            ],
            WinCondition::Collect,
            6,
            2 * GEM_POINTS,
        ),
        level(
            4,
            "Glow Trench",
            UVec3::new(5, 1, 3),
            vec![
                p(0, 0, 0, Start),
                p(4, 0, 2, Exit),
                p(1, 0, 0, Dark),
                p(1, 0, 1, Rock),
                p(3, 0, 1, Rock),
                p(3, 0, 2, Dark),
                p(2, 0, 1, Glow),
                p(2, 0, 2, Coral),
            ],
            WinCondition::Path,
            10,
            0,
        ),
        level(
            5,
            "Coral Vault",
            UVec3::new(4, 2, 4),
            vec![
                p(1, 0, 1, Gem).required(),
                p(2, 0, 2, Gem).required(),
                p(3, 1, 3, Gem).required(),
                p(1, 1, 1, Coral),
                p(2, 1, 2, Coral),
                p(0, 0, 3, Rock),
                p(3, 0, 0, Rock),
                p(0, 1, 0, Dark),
            ],
            WinCondition::Collect,
            9,
            3 * GEM_POINTS,
        ),
    ]
}

/// Build a deterministic level for `id` from `seed`.
///
/// Odd ids are path levels, even ids are collect levels. Grids and block
/// counts grow with the id.
pub fn generate_level(id: LevelId, seed: u64) -> Level {
    let level_seed = (u64::from(id)).wrapping_mul(2654435761).wrapping_add(seed);
    let mut rng = Pcg32::seed_from_u64(level_seed);

    let size = UVec3::new(3 + (id / 3).min(3), 1 + (id / 6).min(2), 3 + (id / 4).min(3));
    let cells = (size.x * size.y * size.z) as usize;
    let mut occupied = vec![false; cells];
    let index = |c: IVec3| (c.x as u32 + size.x * (c.y as u32 + size.y * c.z as u32)) as usize;

    let mut blocks = Vec::new();
    let mut place = |coord: IVec3,
                     kind: PlacementKind,
                     required: bool,
                     blocks: &mut Vec<BlockPlacement>| {
        let slot = index(coord);
        if occupied[slot] {
            return false;
        }
        occupied[slot] = true;
        blocks.push(BlockPlacement { coord, kind, required });
        true
    };

    let is_path = id % 2 == 1;
    let mut gems = 0u32;
    if is_path {
        let mid = (size.z / 2) as i32;
        place(IVec3::new(0, 0, mid), Start, false, &mut blocks);
        place(IVec3::new(size.x as i32 - 1, 0, mid), Exit, false, &mut blocks);
    } else {
        let wanted = 2 + id / 4;
        let mut attempts = 0;
        while gems < wanted && attempts < 64 {
            attempts += 1;
            let coord = random_cell(&mut rng, size);
            if place(coord, Gem, true, &mut blocks) {
                gems += 1;
            }
        }
    }

    // Fill roughly a third of the grid with filler
    let filler = cells / 3;
    for _ in 0..filler {
        let coord = random_cell(&mut rng, size);
        let roll = rng.random_range(0..100);
        let kind = match roll {
            0..30 => Rock,
            30..70 => Coral,
            70..80 => Dark,
            _ => Glow,
        };
        place(coord, kind, false, &mut blocks);
    }

    let max_moves = 4 + blocks.len() as u32 / 2;
    let target_score = gems * GEM_POINTS;
    let name = if is_path {
        format!("Deep Passage {}", id)
    } else {
        format!("Sunken Cache {}", id)
    };
    log::debug!(
        "Generated level {} ({}x{}x{}, {} blocks, {} moves)",
        id,
        size.x,
        size.y,
        size.z,
        blocks.len(),
        max_moves
    );

    level(
        id,
        &name,
        size,
        blocks,
        if is_path { WinCondition::Path } else { WinCondition::Collect },
        max_moves,
        target_score,
    )
}

fn random_cell(rng: &mut Pcg32, size: UVec3) -> IVec3 {
    IVec3::new(
        rng.random_range(0..size.x as i32),
        rng.random_range(0..size.y as i32),
        rng.random_range(0..size.z as i32),
    )
}

/// Ordered set of levels plus optional progress storage
pub struct LevelCatalog {
    levels: Vec<Level>,
    store: Option<Box<dyn ProgressStore>>,
}

impl LevelCatalog {
    /// Wrap a list of levels. They are ordered by id and the first is unlocked.
    pub fn new(mut levels: Vec<Level>) -> Self {
        levels.sort_by_key(|l| l.id);
        if let Some(first) = levels.first_mut() {
            first.unlock();
        }
        Self {
            levels,
            store: None,
        }
    }

    /// Hand-authored levels followed by generated ones up to `CATALOG_SIZE`
    pub fn builtin(seed: u64) -> Self {
        let mut levels = builtin_levels();
        let next = levels.len() as u32 + 1;
        levels.extend((next..=CATALOG_SIZE).map(|id| generate_level(id, seed)));
        Self::new(levels)
    }

    /// Parse a JSON level pack (an array of levels)
    pub fn from_json(json: &str) -> Result<Self, LevelError> {
        let levels: Vec<Level> = serde_json::from_str(json)?;
        log::info!("Loaded level pack with {} levels", levels.len());
        Ok(Self::new(levels))
    }

    /// Attach a store and apply whatever progress it holds
    pub fn with_store(mut self, store: Box<dyn ProgressStore>) -> Self {
        match store.load() {
            Ok(Some(progress)) => self.apply_progress(&progress),
            Ok(None) => log::info!("No saved progress, starting fresh"),
            Err(e) => log::warn!("Ignoring saved progress: {}", e),
        }
        self.store = Some(store);
        self
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Overlay saved unlocks and stars. Saved data never re-locks a level.
    pub fn apply_progress(&mut self, progress: &Progress) {
        for level in &mut self.levels {
            if let Some(saved) = progress.levels.get(&level.id) {
                if saved.unlocked {
                    level.unlock();
                }
                level.record_stars(saved.stars);
            }
        }
    }

    pub fn progress(&self) -> Progress {
        let mut progress = Progress::default();
        for level in &self.levels {
            progress.levels.insert(
                level.id,
                LevelProgress {
                    unlocked: level.unlocked,
                    stars: level.stars,
                },
            );
        }
        progress
    }
}

impl LevelProvider for LevelCatalog {
    fn level(&self, id: LevelId) -> Option<&Level> {
        self.levels.iter().find(|l| l.id == id)
    }

    fn level_mut(&mut self, id: LevelId) -> Option<&mut Level> {
        self.levels.iter_mut().find(|l| l.id == id)
    }

    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn first_unlocked(&self) -> Option<LevelId> {
        self.levels.iter().find(|l| l.unlocked).map(|l| l.id)
    }

    fn commit(&mut self) {
        let progress = self.progress();
        if let Some(store) = self.store.as_mut() {
            if let Err(e) = store.save(&progress) {
                log::warn!("Failed to save progress: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;

    #[test]
    fn test_builtin_ids_are_sequential() {
        let catalog = LevelCatalog::builtin(DEFAULT_LEVEL_SEED);
        assert_eq!(catalog.level_count(), CATALOG_SIZE as usize);
        for (i, level) in catalog.levels().iter().enumerate() {
            assert_eq!(level.id, i as u32 + 1);
            assert!(!level.blocks.is_empty(), "level {} is empty", level.id);
            for block in &level.blocks {
                assert!(level.in_bounds(block.coord), "level {} block out of grid", level.id);
            }
        }
        assert_eq!(catalog.first_unlocked(), Some(1));
        assert!(!catalog.level(2).unwrap().unlocked);
    }

    #[test]
    fn test_first_dive_layout() {
        let catalog = LevelCatalog::builtin(DEFAULT_LEVEL_SEED);
        let first = catalog.level(1).unwrap();
        assert_eq!(first.name, "First Dive");
        assert_eq!(first.win, WinCondition::Path);
        assert!(first.blocks.contains(&BlockPlacement::new(0, 0, 0, Start)));
        assert!(first.blocks.contains(&BlockPlacement::new(2, 0, 0, Exit)));
    }

    #[test]
    fn test_generation_is_deterministic() {
        assert_eq!(generate_level(9, 42), generate_level(9, 42));
        assert_ne!(generate_level(9, 42).blocks, generate_level(9, 43).blocks);

        let collect = generate_level(8, 42);
        assert_eq!(collect.win, WinCondition::Collect);
        let gems = collect.blocks.iter().filter(|b| b.required).count() as u32;
        assert!(gems >= 1);
        assert_eq!(collect.target_score, gems * GEM_POINTS);
    }

    #[test]
    fn test_commit_and_restore_progress() {
        let store = MemoryStore::new();
        let mut catalog =
            LevelCatalog::new(builtin_levels()).with_store(Box::new(store.clone()));
        catalog.level_mut(1).unwrap().record_stars(2);
        catalog.level_mut(2).unwrap().unlock();
        catalog.commit();
        assert!(store.raw().is_some());

        let reloaded = LevelCatalog::new(builtin_levels()).with_store(Box::new(store));
        assert_eq!(reloaded.level(1).unwrap().stars, 2);
        assert!(reloaded.level(2).unwrap().unlocked);
        assert!(!reloaded.level(3).unwrap().unlocked);
    }

    #[test]
    fn test_level_pack_json() {
        let json = serde_json::to_string(&builtin_levels()).unwrap();
        let catalog = LevelCatalog::from_json(&json).unwrap();
        assert_eq!(catalog.level_count(), builtin_levels().len());
        assert!(matches!(
            LevelCatalog::from_json("[{\"id\": 1}]"),
            Err(LevelError::Parse(_))
        ));
    }
}
