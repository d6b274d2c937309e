//! End-to-end scenarios driven through the public API

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use glam::{IVec3, UVec3, Vec3};

use abyss_slide::consts::*;
use abyss_slide::game::Subsystem;
use abyss_slide::platform::{InputEvent, Key, ManualScheduler};
use abyss_slide::renderer::{FrameView, RenderError, Renderer};
use abyss_slide::services::{
    AudioSink, CompletionReport, HudEvent, HudSink, LevelProvider, ScoreSink, Services, Sound,
};
use abyss_slide::sim::{
    BlockPlacement, FlockConfig, FlockingSystem, Level, LevelCatalog, PathRule, PlacementKind,
    PuzzleGrid, PuzzlePhase, RigidBodyWorld, WinCondition,
};
use abyss_slide::sim::levels::DEFAULT_LEVEL_SEED;
use abyss_slide::{Axis, GameConfig, LevelError, SimulationLoop};

const FRAME_MS: f64 = 1000.0 / 60.0;

#[derive(Clone, Default)]
struct Recorder {
    hud: Rc<RefCell<Vec<HudEvent>>>,
    sounds: Rc<RefCell<Vec<Sound>>>,
    reports: Rc<RefCell<Vec<CompletionReport>>>,
}

impl HudSink for Recorder {
    fn notify(&mut self, event: HudEvent) {
        self.hud.borrow_mut().push(event);
    }
}

impl AudioSink for Recorder {
    fn play_sound(&mut self, sound: Sound, _at: Option<Vec3>) {
        self.sounds.borrow_mut().push(sound);
    }
}

impl ScoreSink for Recorder {
    fn report_completion(&mut self, report: &CompletionReport) {
        self.reports.borrow_mut().push(report.clone());
    }
}

/// Counts frames and can be told to fail from a given frame on
#[derive(Clone, Default)]
struct CountingRenderer {
    frames: Rc<Cell<u64>>,
    fail_from: Option<u64>,
    last_fish: Rc<RefCell<Vec<Vec3>>>,
}

impl Renderer for CountingRenderer {
    fn render(&mut self, frame: &FrameView<'_>) -> Result<(), RenderError> {
        let n = self.frames.get() + 1;
        self.frames.set(n);
        *self.last_fish.borrow_mut() = frame.fish.iter().map(|f| f.position).collect();
        match self.fail_from {
            Some(at) if n >= at => Err(RenderError::SurfaceLost),
            _ => Ok(()),
        }
    }
}

fn services(catalog: LevelCatalog, recorder: &Recorder) -> Services {
    Services::new(Box::new(catalog))
        .with_audio(Box::new(recorder.clone()))
        .with_hud(Box::new(recorder.clone()))
        .with_score(Box::new(recorder.clone()))
}

fn build(
    catalog: LevelCatalog,
    config: GameConfig,
    renderer: CountingRenderer,
) -> (SimulationLoop, ManualScheduler, Recorder) {
    let recorder = Recorder::default();
    let scheduler = ManualScheduler::new();
    let sim = SimulationLoop::new(
        config,
        services(catalog, &recorder),
        Box::new(renderer),
        Box::new(scheduler.clone()),
    )
    .unwrap();
    (sim, scheduler, recorder)
}

/// Fire the pending frame and tick `frames` times
fn run(sim: &mut SimulationLoop, scheduler: &ManualScheduler, now: &mut f64, frames: u32) {
    for _ in 0..frames {
        scheduler.fire();
        if !sim.tick(*now) {
            break;
        }
        *now += FRAME_MS;
    }
}

/// A row of three coral blocks along X plus a marked gem off to the side,
/// so sliding the row never finishes the level.
fn row_level() -> Level {
    Level {
        id: 1,
        name: "Row".into(),
        grid_size: UVec3::new(3, 1, 3),
        blocks: vec![
            BlockPlacement::new(0, 0, 0, PlacementKind::Coral),
            BlockPlacement::new(1, 0, 0, PlacementKind::Coral),
            BlockPlacement::new(2, 0, 0, PlacementKind::Coral),
            BlockPlacement::new(1, 0, 2, PlacementKind::Gem).required(),
        ],
        win: WinCondition::Collect,
        max_moves: 10,
        target_score: 0,
        unlocked: true,
        stars: 0,
    }
}

#[test]
fn scenario_a_slide_moves_single_block_row() {
    let (mut sim, _, _) = build(
        LevelCatalog::new(vec![row_level()]),
        GameConfig::default(),
        CountingRenderer::default(),
    );

    assert!(sim.select_row(Axis::X, 1));
    assert!(sim.slide(1));

    let coords: Vec<IVec3> = sim.puzzle().blocks().iter().map(|b| b.coord).collect();
    assert_eq!(coords[0], IVec3::new(0, 0, 0));
    assert_eq!(coords[1], IVec3::new(2, 0, 0));
    assert_eq!(coords[2], IVec3::new(2, 0, 0));
    assert_eq!(coords[3], IVec3::new(1, 0, 2));
    assert_eq!(sim.puzzle().session().unwrap().moves_used, 1);
}

#[test]
fn scenario_b_first_dive_is_won_before_any_move() {
    let catalog = LevelCatalog::builtin(DEFAULT_LEVEL_SEED);
    let first_dive = catalog.level(1).unwrap().clone();
    assert_eq!(first_dive.name, "First Dive");

    let recorder = Recorder::default();
    let mut services = services(catalog, &recorder);
    let mut world = RigidBodyWorld::default();
    let mut grid = PuzzleGrid::new(3, PathRule::EndpointsPresent);
    grid.load_level(&mut world, &first_dive);

    assert!(grid.check_win_condition(&mut services));
    assert_eq!(grid.phase(), PuzzlePhase::LevelComplete);

    let reports = recorder.reports.borrow();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].moves_used, 0);
    // Zero moves and a zero target score rate the top mark
    assert_eq!(reports[0].stars, 3);
    assert_eq!(reports[0].unlocked, vec![2]);
    assert!(services.levels.level(2).unwrap().unlocked);
}

#[test]
fn scenario_b_connected_rule_agrees_on_first_dive() {
    let catalog = LevelCatalog::builtin(DEFAULT_LEVEL_SEED);
    let first_dive = catalog.level(1).unwrap().clone();
    let recorder = Recorder::default();
    let mut services = services(catalog, &recorder);
    let mut world = RigidBodyWorld::default();
    let mut grid = PuzzleGrid::new(3, PathRule::Connected);
    grid.load_level(&mut world, &first_dive);

    assert!(grid.check_win_condition(&mut services));
}

#[test]
fn scenario_c_school_stays_bounded() {
    let mut flock = FlockingSystem::new(FlockConfig::default(), 99);
    flock.spawn_school(30);
    assert_eq!(flock.len(), 30);
    for fish in flock.fish() {
        let r = fish.position.length();
        assert!((5.0 - 1e-3..=15.0 + 1e-3).contains(&r), "spawned at radius {}", r);
    }

    for _ in 0..1000 {
        flock.update(1.0 / 60.0, None, Vec3::ZERO).unwrap();
        for fish in flock.fish() {
            assert!(fish.velocity.length() <= FLOCK_MAX_SPEED + 1e-4);
            assert!(fish.position.length() <= FLOCK_WRAP_RADIUS + 1e-3);
        }
    }
}

#[test]
fn scenario_d_history_keeps_two_most_recent_slides() {
    let mut config = GameConfig::default();
    config.undo_capacity = 2;
    let (mut sim, scheduler, _) = build(
        LevelCatalog::new(vec![row_level()]),
        config,
        CountingRenderer::default(),
    );
    sim.start();
    let mut now = 0.0;
    run(&mut sim, &scheduler, &mut now, 2);

    assert!(sim.select_row(Axis::Z, 0));
    for direction in [1, -1, 1] {
        assert!(sim.slide(direction));
        // Let the slide settle before the next one
        run(&mut sim, &scheduler, &mut now, 30);
        assert!(matches!(sim.puzzle().phase(), PuzzlePhase::RowSelected(_)));
    }

    let history = sim.puzzle().history();
    assert_eq!(history.len(), 2);
    // The first slide's snapshot was evicted
    assert_eq!(history.oldest().unwrap().moves_used, 1);

    assert!(sim.undo());
    assert!(sim.undo());
    assert!(!sim.undo());
    assert_eq!(sim.puzzle().session().unwrap().moves_used, 1);
}

#[test]
fn winning_unlocks_and_advances_to_next_level() {
    let (mut sim, _, recorder) = build(
        LevelCatalog::builtin(DEFAULT_LEVEL_SEED),
        GameConfig::default(),
        CountingRenderer::default(),
    );
    assert!(matches!(sim.start_level(2), Err(LevelError::Locked(2))));

    assert!(sim.select_row(Axis::X, 1));
    assert!(sim.slide(1));
    assert!(sim.puzzle().is_complete());
    assert_eq!(recorder.reports.borrow()[0].stars, 3);
    assert!(recorder.sounds.borrow().contains(&Sound::LevelComplete));

    sim.handle_input(InputEvent::KeyDown(Key::NextLevel));
    assert_eq!(sim.current_level(), Some(2));
    assert!(matches!(
        recorder.hud.borrow().last(),
        Some(HudEvent::LevelStarted { level: 2, .. })
    ));
    assert!(matches!(sim.start_level(3), Err(LevelError::Locked(3))));
    assert!(matches!(sim.start_level(500), Err(LevelError::NotFound(500))));
}

#[test]
fn subsystem_fault_is_isolated() {
    let renderer = CountingRenderer::default();
    let frames = renderer.frames.clone();
    let fish = renderer.last_fish.clone();
    let (mut sim, scheduler, _) = build(
        LevelCatalog::new(vec![row_level()]),
        GameConfig::default(),
        renderer,
    );
    sim.start();
    let mut now = 0.0;
    run(&mut sim, &scheduler, &mut now, 5);

    let body = sim.puzzle().blocks()[0].body;
    assert!(sim.world_mut().remove_body(body));
    let before = fish.borrow().clone();
    run(&mut sim, &scheduler, &mut now, 10);

    assert!(sim.is_running());
    assert_eq!(frames.get(), 15);
    assert_eq!(sim.faults().count(Subsystem::Puzzle), 10);
    assert_eq!(sim.faults().count(Subsystem::Flocking), 0);
    assert_eq!(sim.faults().count(Subsystem::Swimmer), 0);
    assert_ne!(*fish.borrow(), before, "the school kept swimming");
}

#[test]
fn render_failure_stops_the_loop() {
    let renderer = CountingRenderer {
        fail_from: Some(3),
        ..CountingRenderer::default()
    };
    let frames = renderer.frames.clone();
    let (mut sim, scheduler, _) = build(
        LevelCatalog::new(vec![row_level()]),
        GameConfig::default(),
        renderer,
    );
    sim.start();
    let mut now = 0.0;
    run(&mut sim, &scheduler, &mut now, 10);

    assert_eq!(frames.get(), 3);
    assert!(!sim.is_running());
    assert!(sim.pending_frame().is_none());
    assert!(scheduler.pending().is_none());
    assert!(!sim.tick(now));
    assert_eq!(frames.get(), 3);
}

#[test]
fn open_modal_swallows_puzzle_input() {
    let (mut sim, _, _) = build(
        LevelCatalog::new(vec![row_level()]),
        GameConfig::default(),
        CountingRenderer::default(),
    );
    assert!(sim.select_row(Axis::Z, 0));

    sim.handle_input(InputEvent::ModalChanged(true));
    sim.handle_input(InputEvent::KeyDown(Key::SlidePositive));
    assert_eq!(sim.puzzle().session().unwrap().moves_used, 0);

    sim.handle_input(InputEvent::ModalChanged(false));
    sim.handle_input(InputEvent::KeyDown(Key::SlidePositive));
    assert_eq!(sim.puzzle().session().unwrap().moves_used, 1);
}

#[test]
fn axis_key_overrides_slide_direction() {
    let (mut sim, _, _) = build(
        LevelCatalog::new(vec![row_level()]),
        GameConfig::default(),
        CountingRenderer::default(),
    );
    assert!(sim.select_row(Axis::Z, 0));
    sim.handle_input(InputEvent::KeyDown(Key::SlideAxis(Axis::Y)));
    sim.handle_input(InputEvent::KeyDown(Key::SlidePositive));

    let coords: Vec<IVec3> = sim.puzzle().blocks().iter().map(|b| b.coord).collect();
    assert_eq!(&coords[..3], &[IVec3::new(0, 1, 0), IVec3::new(1, 1, 0), IVec3::new(2, 1, 0)]);
    // Sliding across the plane keeps it selected at the same index
    assert_eq!(sim.puzzle().selection().unwrap().index, 0);
}
