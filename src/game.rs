//! Frame loop
//!
//! `SimulationLoop` owns the physics world and every subsystem. Each display
//! frame it steps physics, then updates the swimmer, puzzle, current and
//! fish school in that order. A subsystem that fails is logged and counted
//! but never stops the others; only a render failure stops the loop.

use glam::Vec3;

use crate::consts::*;
use crate::depth_at;
use crate::error::{InitError, LevelError, SimError};
use crate::platform::input::{InputEvent, InputGate, Key, Ray};
use crate::platform::scheduler::{FrameRequest, FrameScheduler};
use crate::renderer::{FrameView, Renderer};
use crate::services::{HudEvent, Services, Sound};
use crate::settings::Settings;
use crate::sim::environment::{Environment, FogParams, fog};
use crate::sim::flocking::{FlockConfig, FlockingSystem};
use crate::sim::grid::PuzzleGrid;
use crate::sim::level::LevelId;
use crate::sim::physics::{BodyDesc, BodyHandle, BodyShape, RigidBodyWorld};
use crate::sim::swimmer::{FirstPersonController, Intent};
use crate::sim::win::PathRule;
use crate::Axis;

/// Runtime parameters assembled once at startup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameConfig {
    pub seed: u64,
    pub gravity: f32,
    pub undo_capacity: usize,
    pub path_rule: PathRule,
    pub fish_count: usize,
    pub flock: FlockConfig,
    /// Radians per pixel
    pub look_rate: f32,
    /// -1 inverts vertical look
    pub pitch_sign: f32,
    pub swimmer_spawn: Vec3,
    /// Silence audio while the page is unfocused
    pub mute_on_blur: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default(), 0x5eed)
    }
}

impl GameConfig {
    pub fn from_settings(settings: &Settings, seed: u64) -> Self {
        Self {
            seed,
            gravity: UNDERWATER_GRAVITY,
            undo_capacity: settings.undo_levels,
            path_rule: settings.path_rule,
            fish_count: settings.fish_count,
            flock: FlockConfig {
                search: settings.neighbor_search,
                ..FlockConfig::default()
            },
            look_rate: settings.look_rate(),
            pitch_sign: settings.pitch_sign(),
            swimmer_spawn: SWIMMER_SPAWN,
            mute_on_blur: settings.mute_on_blur,
        }
    }
}

/// Subsystems isolated by the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Swimmer,
    Puzzle,
    Environment,
    Flocking,
}

impl Subsystem {
    pub const ALL: [Subsystem; 4] = [
        Subsystem::Swimmer,
        Subsystem::Puzzle,
        Subsystem::Environment,
        Subsystem::Flocking,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Subsystem::Swimmer => "swimmer",
            Subsystem::Puzzle => "puzzle",
            Subsystem::Environment => "environment",
            Subsystem::Flocking => "flocking",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Per-subsystem fault counters. The first fault of each subsystem is
/// logged as an error; repeats only at debug level.
#[derive(Debug, Clone, Default)]
pub struct FaultLog {
    counts: [u64; 4],
    last: Option<(Subsystem, SimError)>,
}

impl FaultLog {
    /// Record a fault, returning true if it is the subsystem's first
    pub fn record(&mut self, subsystem: Subsystem, error: SimError) -> bool {
        let count = &mut self.counts[subsystem.index()];
        *count += 1;
        let first = *count == 1;
        if first {
            log::error!("{} update failed: {}", subsystem.name(), error);
        } else {
            log::debug!("{} update failed again (#{}): {}", subsystem.name(), count, error);
        }
        self.last = Some((subsystem, error));
        first
    }

    pub fn count(&self, subsystem: Subsystem) -> u64 {
        self.counts[subsystem.index()]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn last(&self) -> Option<&(Subsystem, SimError)> {
        self.last.as_ref()
    }
}

pub struct SimulationLoop {
    world: RigidBodyWorld,
    floor: BodyHandle,
    swimmer: FirstPersonController,
    puzzle: PuzzleGrid,
    flock: FlockingSystem,
    environment: Environment,
    services: Services,
    renderer: Box<dyn Renderer>,
    scheduler: Box<dyn FrameScheduler>,
    config: GameConfig,
    gate: InputGate,
    faults: FaultLog,
    fog: FogParams,
    pending_frame: Option<FrameRequest>,
    running: bool,
    /// Timestamp of the previous tick; `None` right after `start`
    last_time: Option<f64>,
    /// Axis override for slides; `None` slides along the selection's axis
    slide_axis: Option<Axis>,
    frames: u64,
}

impl SimulationLoop {
    /// Build the world: floor, swimmer, the first unlocked level and the school
    pub fn new(
        config: GameConfig,
        services: Services,
        renderer: Box<dyn Renderer>,
        scheduler: Box<dyn FrameScheduler>,
    ) -> Result<Self, InitError> {
        if services.levels.level_count() == 0 {
            return Err(InitError::NoLevels);
        }
        let first = services.levels.first_unlocked().ok_or(InitError::NoLevels)?;

        let mut world = RigidBodyWorld::new(config.gravity);
        let floor = world.add_body(
            BodyDesc::fixed(
                BodyShape::Cuboid {
                    half_extents: Vec3::new(FLOOR_HALF_EXTENT, 0.5, FLOOR_HALF_EXTENT),
                },
                Vec3::new(0.0, FLOOR_Y - 0.5, 0.0),
            )
            .with_friction(0.8),
        );
        let swimmer =
            FirstPersonController::new(&mut world, config.swimmer_spawn, config.look_rate);
        let puzzle = PuzzleGrid::new(config.undo_capacity, config.path_rule);
        let mut flock = FlockingSystem::new(config.flock, config.seed);
        flock.spawn_school(config.fish_count);
        let environment = Environment::new(config.seed.rotate_left(17) ^ 0xc0ffee);

        let mut sim = Self {
            world,
            floor,
            swimmer,
            puzzle,
            flock,
            environment,
            services,
            renderer,
            scheduler,
            config,
            gate: InputGate::default(),
            faults: FaultLog::default(),
            fog: fog(depth_at(config.swimmer_spawn + EYE_OFFSET)),
            pending_frame: None,
            running: false,
            last_time: None,
            slide_axis: None,
            frames: 0,
        };
        sim.start_level(first)?;
        log::info!(
            "Simulation ready: {} bodies, {} fish, level {}",
            sim.world.body_count(),
            sim.flock.len(),
            first
        );
        Ok(sim)
    }

    pub fn world(&self) -> &RigidBodyWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut RigidBodyWorld {
        &mut self.world
    }

    pub fn floor(&self) -> BodyHandle {
        self.floor
    }

    pub fn puzzle(&self) -> &PuzzleGrid {
        &self.puzzle
    }

    pub fn flock(&self) -> &FlockingSystem {
        &self.flock
    }

    pub fn swimmer(&self) -> &FirstPersonController {
        &self.swimmer
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn faults(&self) -> &FaultLog {
        &self.faults
    }

    pub fn fog(&self) -> FogParams {
        self.fog
    }

    pub fn gate(&self) -> InputGate {
        self.gate
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pending_frame(&self) -> Option<FrameRequest> {
        self.pending_frame
    }

    /// Frames simulated since creation
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn current_level(&self) -> Option<LevelId> {
        self.puzzle.session().map(|s| s.level)
    }

    /// Load level `id` if it exists and is unlocked
    pub fn start_level(&mut self, id: LevelId) -> Result<(), LevelError> {
        let Some(level) = self.services.levels.level(id) else {
            self.services.audio.play_sound(Sound::Refused, None);
            return Err(LevelError::NotFound(id));
        };
        if !level.unlocked {
            self.services.audio.play_sound(Sound::Refused, None);
            return Err(LevelError::Locked(id));
        }

        self.puzzle.load_level(&mut self.world, level);
        let name = level.name.clone();
        self.swimmer.respawn(&mut self.world, self.config.swimmer_spawn);
        self.slide_axis = None;
        self.services.hud.notify(HudEvent::LevelStarted { level: id, name });
        Ok(())
    }

    pub fn next_level(&mut self) -> Result<(), LevelError> {
        let next = self.current_level().map_or(1, |id| id + 1);
        self.start_level(next)
    }

    pub fn restart_level(&mut self) -> Result<(), LevelError> {
        let current = self.current_level().unwrap_or(1);
        self.start_level(current)
    }

    pub fn set_undo_capacity(&mut self, capacity: usize) {
        self.config.undo_capacity = capacity;
        self.puzzle.set_undo_capacity(capacity);
    }

    /// The page gained or lost focus. Held keys never see their key-up
    /// while unfocused, so movement is released on blur.
    pub fn set_focused(&mut self, focused: bool) {
        if !focused {
            self.swimmer.clear_intents();
        }
        if self.config.mute_on_blur {
            self.services.audio.set_paused(!focused);
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.renderer.resize(width, height);
    }

    /// Begin ticking: the next tick re-enters the frame with a zero delta
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        self.last_time = None;
        self.pending_frame = Some(self.scheduler.request_frame());
        log::info!("Simulation started");
    }

    /// Stop ticking and cancel the outstanding frame request
    pub fn stop(&mut self) {
        self.running = false;
        if let Some(request) = self.pending_frame.take() {
            self.scheduler.cancel_frame(request);
        }
        log::info!("Simulation stopped");
    }

    /// Run one display frame at wall-clock time `now_ms`.
    ///
    /// Returns whether the loop is still running afterwards.
    pub fn tick(&mut self, now_ms: f64) -> bool {
        if !self.running {
            return false;
        }
        // The request that brought us here has fired
        self.pending_frame = None;

        let dt = match self.last_time {
            Some(prev) => {
                let dt = ((now_ms - prev) / 1000.0) as f32;
                if dt.is_finite() { dt.clamp(0.0, MAX_FRAME_DT) } else { 0.0 }
            }
            None => 0.0,
        };
        self.last_time = Some(now_ms);

        self.frame(dt, now_ms);

        if self.running {
            self.pending_frame = Some(self.scheduler.request_frame());
        }
        self.running
    }

    fn isolate(&mut self, subsystem: Subsystem, result: Result<(), SimError>) {
        if let Err(e) = result {
            self.faults.record(subsystem, e);
        }
    }

    fn frame(&mut self, dt: f32, now_ms: f64) {
        self.frames += 1;
        self.world.step(dt);

        let result = self.swimmer.update(&mut self.world, dt);
        self.isolate(Subsystem::Swimmer, result);

        let result = self.puzzle.update(&self.world, dt);
        self.isolate(Subsystem::Puzzle, result);

        let camera = self.swimmer.camera();
        let depth = depth_at(camera.position);
        let result = self.environment.update(dt, depth);
        self.isolate(Subsystem::Environment, result);

        let current = self.environment.current();
        let result = self.flock.update(dt, Some(camera.position), current);
        self.isolate(Subsystem::Flocking, result);

        self.world.apply_current(current, dt);
        self.fog = fog(depth);

        let rendered = {
            let view = FrameView {
                time: now_ms,
                camera,
                fog: self.fog,
                blocks: self.puzzle.blocks(),
                fish: self.flock.fish(),
                selection: self.puzzle.selection(),
                phase: self.puzzle.phase(),
                session: self.puzzle.session(),
                current,
                faults: self.faults.total(),
            };
            self.renderer.render(&view)
        };
        if let Err(e) = rendered {
            log::error!("Render failed, stopping the loop: {}", e);
            self.stop();
        }
    }

    /// Route one input event. While a modal is open only gate changes get through.
    pub fn handle_input(&mut self, event: InputEvent) {
        if !self.gate.accepts(&event) {
            return;
        }
        match event {
            InputEvent::ModalChanged(open) => {
                self.gate.modal_open = open;
                if open {
                    self.swimmer.clear_intents();
                }
            }
            InputEvent::PointerCapture(captured) => self.gate.pointer_captured = captured,
            InputEvent::PointerMove { dx, dy } => {
                self.swimmer
                    .pointer_look(dx, dy * self.config.pitch_sign, self.gate);
            }
            InputEvent::KeyDown(key) => self.key_down(key),
            InputEvent::KeyUp(key) => {
                if let Some(intent) = movement_intent(key) {
                    self.swimmer.set_intent(intent, false);
                }
            }
            InputEvent::PointerDown(ray) => self.pointer_down(ray),
        }
    }

    fn key_down(&mut self, key: Key) {
        if let Some(intent) = movement_intent(key) {
            self.swimmer.set_intent(intent, true);
            return;
        }
        match key {
            Key::SlidePositive => {
                self.slide(1);
            }
            Key::SlideNegative => {
                self.slide(-1);
            }
            Key::SlideAxis(axis) => self.slide_axis = Some(axis),
            Key::SlideAlongSelection => self.slide_axis = None,
            Key::Undo => {
                self.undo();
            }
            Key::Hint => self.puzzle.hint(&mut self.services),
            Key::NextLevel => {
                if let Err(e) = self.next_level() {
                    log::warn!("Cannot advance: {}", e);
                }
            }
            Key::Deselect => self.puzzle.clear_selection(),
            _ => {}
        }
    }

    /// Select a plane directly
    pub fn select_row(&mut self, axis: Axis, index: i32) -> bool {
        let selected = self.puzzle.select_row(axis, index);
        let sound = if selected { Sound::Select } else { Sound::Refused };
        self.services.audio.play_sound(sound, None);
        selected
    }

    /// Slide the selected plane along the override axis, or its own axis
    pub fn slide(&mut self, direction: i32) -> bool {
        let axis = self
            .slide_axis
            .or_else(|| self.puzzle.selection().map(|s| s.axis));
        let slid = match axis {
            Some(axis) => self
                .puzzle
                .slide(&mut self.world, &mut self.services, axis, direction),
            None => false,
        };
        if !slid {
            self.services.audio.play_sound(Sound::Refused, None);
        }
        slid
    }

    pub fn undo(&mut self) -> bool {
        let undone = self.puzzle.undo(&mut self.world);
        let sound = if undone { Sound::Undo } else { Sound::Refused };
        self.services.audio.play_sound(sound, None);
        undone
    }

    /// Pick a block under the ray; failing that, try to catch a fish
    fn pointer_down(&mut self, ray: Option<Ray>) {
        let ray = ray.unwrap_or_else(|| {
            let camera = self.swimmer.camera();
            Ray {
                origin: camera.position,
                direction: camera.forward(),
            }
        });

        let hit = self.puzzle.pick(
            &self.world,
            ray.origin,
            ray.direction,
            Some(self.swimmer.body()),
        );
        if let Some(hit) = hit {
            let selected = self.puzzle.select_from_hit(hit.block_id, hit.normal);
            let sound = if selected { Sound::Select } else { Sound::Refused };
            self.services.audio.play_sound(sound, Some(hit.point));
            return;
        }

        if let Some(fish) = self
            .flock
            .catch_along_ray(ray.origin, ray.direction, PICK_DISTANCE)
        {
            let points = fish.kind.points();
            self.puzzle.add_score(points);
            self.services.audio.play_sound(Sound::FishCaught, Some(fish.position));
            self.services.hud.notify(HudEvent::FishCaught {
                kind: fish.kind,
                points,
            });
        }
    }
}

fn movement_intent(key: Key) -> Option<Intent> {
    match key {
        Key::Forward => Some(Intent::Forward),
        Key::Back => Some(Intent::Back),
        Key::Left => Some(Intent::Left),
        Key::Right => Some(Intent::Right),
        Key::Up => Some(Intent::Up),
        Key::Down => Some(Intent::Down),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::scheduler::ManualScheduler;
    use crate::renderer::HeadlessRenderer;
    use crate::sim::levels::{DEFAULT_LEVEL_SEED, LevelCatalog};

    fn sim() -> (SimulationLoop, ManualScheduler) {
        let scheduler = ManualScheduler::new();
        let services = Services::new(Box::new(LevelCatalog::builtin(DEFAULT_LEVEL_SEED)));
        let sim = SimulationLoop::new(
            GameConfig::default(),
            services,
            Box::new(HeadlessRenderer::default()),
            Box::new(scheduler.clone()),
        )
        .unwrap();
        (sim, scheduler)
    }

    #[test]
    fn test_new_builds_world() {
        let (sim, scheduler) = sim();
        assert_eq!(sim.current_level(), Some(1));
        assert_eq!(sim.flock().len(), FISH_COUNT);
        // floor + swimmer + level 1 blocks
        let blocks = sim.puzzle().blocks().len();
        assert_eq!(sim.world().body_count(), blocks + 2);
        assert!(!sim.is_running());
        assert_eq!(scheduler.requested(), 0);
    }

    #[test]
    fn test_no_levels_is_init_error() {
        let services = Services::new(Box::new(LevelCatalog::new(Vec::new())));
        let result = SimulationLoop::new(
            GameConfig::default(),
            services,
            Box::new(HeadlessRenderer::default()),
            Box::new(ManualScheduler::new()),
        );
        assert!(matches!(result, Err(InitError::NoLevels)));
    }

    #[test]
    fn test_first_tick_after_start_uses_zero_dt() {
        let (mut sim, scheduler) = sim();
        sim.start();
        assert!(scheduler.pending().is_some());
        let steps_before = sim.world().step_count();
        scheduler.fire();
        assert!(sim.tick(10_000.0));
        assert_eq!(sim.world().step_count(), steps_before);
        scheduler.fire();
        sim.tick(10_000.0 + 1000.0 / 60.0);
        assert_eq!(sim.world().step_count(), steps_before + 1);
        assert_eq!(sim.frames(), 2);
    }

    #[test]
    fn test_long_pause_is_clamped() {
        let (mut sim, _) = sim();
        sim.start();
        sim.tick(0.0);
        let before = sim.world().step_count();
        sim.tick(60_000.0);
        assert_eq!(sim.world().step_count() - before, u64::from(MAX_SUBSTEPS));
    }

    #[test]
    fn test_stop_cancels_pending_frame() {
        let (mut sim, scheduler) = sim();
        sim.start();
        sim.tick(0.0);
        assert!(sim.pending_frame().is_some());
        sim.stop();
        assert!(sim.pending_frame().is_none());
        assert_eq!(scheduler.cancelled(), 1);
        assert!(!sim.tick(16.0));
    }

    #[test]
    fn test_locked_and_missing_levels_rejected() {
        let (mut sim, _) = sim();
        assert!(matches!(sim.start_level(2), Err(LevelError::Locked(2))));
        assert!(matches!(sim.start_level(999), Err(LevelError::NotFound(999))));
        assert_eq!(sim.current_level(), Some(1));
    }

    #[test]
    fn test_modal_blocks_input_and_clears_intents() {
        let (mut sim, _) = sim();
        sim.handle_input(InputEvent::KeyDown(Key::Forward));
        assert!(sim.swimmer().intents().forward);

        sim.handle_input(InputEvent::ModalChanged(true));
        assert!(!sim.swimmer().intents().any());
        sim.handle_input(InputEvent::KeyDown(Key::Left));
        assert!(!sim.swimmer().intents().left);
        sim.handle_input(InputEvent::PointerCapture(true));
        sim.handle_input(InputEvent::PointerMove { dx: 40.0, dy: 0.0 });
        assert_eq!(sim.swimmer().yaw(), 0.0);

        sim.handle_input(InputEvent::ModalChanged(false));
        sim.handle_input(InputEvent::PointerMove { dx: 40.0, dy: 0.0 });
        assert_ne!(sim.swimmer().yaw(), 0.0);
        sim.handle_input(InputEvent::KeyDown(Key::Left));
        assert!(sim.swimmer().intents().left);
        sim.handle_input(InputEvent::KeyUp(Key::Left));
        assert!(!sim.swimmer().intents().left);
    }

    #[test]
    fn test_game_flock_wraps_around_origin() {
        let mut flock = FlockingSystem::new(GameConfig::default().flock, 1);
        flock.spawn(
            crate::sim::flocking::FishKind::Minnow,
            Vec3::new(0.0, 21.5, 0.0),
            Vec3::ZERO,
        );
        flock.update(FIXED_DT, None, Vec3::ZERO).unwrap();
        let r = flock.fish()[0].position.length();
        assert!(r <= FLOCK_WRAP_RADIUS, "r = {}", r);
        assert!((r - FLOCK_RESPAWN_RADIUS).abs() < 1e-3);
    }

    #[derive(Clone, Default)]
    struct PauseLog(std::rc::Rc<std::cell::RefCell<Vec<bool>>>);

    impl crate::services::AudioSink for PauseLog {
        fn play_sound(&mut self, _sound: Sound, _at: Option<Vec3>) {}

        fn set_paused(&mut self, paused: bool) {
            self.0.borrow_mut().push(paused);
        }
    }

    fn sim_with_audio(config: GameConfig, audio: PauseLog) -> SimulationLoop {
        let services = Services::new(Box::new(LevelCatalog::builtin(DEFAULT_LEVEL_SEED)))
            .with_audio(Box::new(audio));
        SimulationLoop::new(
            config,
            services,
            Box::new(HeadlessRenderer::default()),
            Box::new(ManualScheduler::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_blur_pauses_audio_and_releases_keys() {
        let audio = PauseLog::default();
        let mut sim = sim_with_audio(GameConfig::default(), audio.clone());
        sim.handle_input(InputEvent::KeyDown(Key::Forward));
        sim.set_focused(false);
        assert!(!sim.swimmer().intents().any());
        sim.set_focused(true);
        assert_eq!(*audio.0.borrow(), vec![true, false]);

        let settings = Settings {
            mute_on_blur: false,
            ..Settings::default()
        };
        let audio = PauseLog::default();
        let mut sim = sim_with_audio(GameConfig::from_settings(&settings, 1), audio.clone());
        sim.set_focused(false);
        assert!(audio.0.borrow().is_empty());
    }

    #[test]
    fn test_fault_log_counts_and_logs_once() {
        let mut log = FaultLog::default();
        let err = SimError::NonFinite {
            subsystem: "flocking",
            what: "fish state",
        };
        assert!(log.record(Subsystem::Flocking, err.clone()));
        assert!(!log.record(Subsystem::Flocking, err.clone()));
        assert_eq!(log.count(Subsystem::Flocking), 2);
        assert_eq!(log.count(Subsystem::Swimmer), 0);
        assert_eq!(log.total(), 2);
        assert_eq!(log.last(), Some(&(Subsystem::Flocking, err)));
    }
}
