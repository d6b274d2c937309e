//! Collaborator interfaces
//!
//! The simulation never reaches for globals. Everything outside the core
//! (level data, score bookkeeping, sound, HUD) is handed in as a boxed trait
//! object when the loop is built.

use glam::Vec3;

use crate::sim::flocking::FishKind;
use crate::sim::level::{Level, LevelId};

/// Sound effects the simulation can trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sound {
    Select,
    Slide,
    Undo,
    /// Input rejected (locked level, slide mid-flight)
    Refused,
    LevelComplete,
    OutOfMoves,
    FishCaught,
}

/// Summary handed to the score sink when a level is beaten
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionReport {
    pub level: LevelId,
    /// Rating for this run
    pub stars: u8,
    /// Best rating after this run
    pub best_stars: u8,
    pub score: u32,
    pub moves_used: u32,
    /// Levels that became playable because of this run
    pub unlocked: Vec<LevelId>,
}

/// HUD notifications
#[derive(Debug, Clone, PartialEq)]
pub enum HudEvent {
    LevelStarted { level: LevelId, name: String },
    LevelComplete(CompletionReport),
    OutOfMoves { level: LevelId, moves_used: u32 },
    Hint(String),
    FishCaught { kind: FishKind, points: u32 },
}

/// Source of level data and owner of level progress
pub trait LevelProvider {
    fn level(&self, id: LevelId) -> Option<&Level>;
    fn level_mut(&mut self, id: LevelId) -> Option<&mut Level>;
    fn level_count(&self) -> usize;
    /// Lowest-numbered unlocked level
    fn first_unlocked(&self) -> Option<LevelId>;
    /// Persist `unlocked` / `stars` after they change
    fn commit(&mut self);
}

pub trait ScoreSink {
    fn report_completion(&mut self, report: &CompletionReport);
}

/// Fire-and-forget sound playback
pub trait AudioSink {
    fn play_sound(&mut self, sound: Sound, at: Option<Vec3>);

    /// Hold playback while the page is in the background
    fn set_paused(&mut self, _paused: bool) {}
}

pub trait HudSink {
    fn notify(&mut self, event: HudEvent);
}

/// Audio sink that plays nothing (headless runs, audio unavailable)
#[derive(Debug, Default)]
pub struct SilentAudio;

impl AudioSink for SilentAudio {
    fn play_sound(&mut self, sound: Sound, _at: Option<Vec3>) {
        log::trace!("(silent) {:?}", sound);
    }
}

/// HUD that writes notifications to the log
#[derive(Debug, Default)]
pub struct LogHud;

impl HudSink for LogHud {
    fn notify(&mut self, event: HudEvent) {
        match event {
            HudEvent::LevelStarted { level, name } => {
                log::info!("Level {} \"{}\" started", level, name)
            }
            HudEvent::LevelComplete(report) => log::info!(
                "Level {} complete: {} star(s), score {}, {} move(s)",
                report.level,
                report.stars,
                report.score,
                report.moves_used
            ),
            HudEvent::OutOfMoves { level, moves_used } => {
                log::info!("Level {} out of moves after {}", level, moves_used)
            }
            HudEvent::Hint(text) => log::info!("Hint: {}", text),
            HudEvent::FishCaught { kind, points } => {
                log::info!("Caught a {:?} (+{})", kind, points)
            }
        }
    }
}

/// Score sink that only logs and keeps a running total
#[derive(Debug, Default)]
pub struct LogScoreSink {
    pub total: u64,
}

impl ScoreSink for LogScoreSink {
    fn report_completion(&mut self, report: &CompletionReport) {
        self.total += u64::from(report.score);
        log::info!(
            "Score report: level {} +{} (total {}), unlocked {:?}",
            report.level,
            report.score,
            self.total,
            report.unlocked
        );
    }
}

/// Every collaborator the simulation talks to
pub struct Services {
    pub levels: Box<dyn LevelProvider>,
    pub score: Box<dyn ScoreSink>,
    pub audio: Box<dyn AudioSink>,
    pub hud: Box<dyn HudSink>,
}

impl Services {
    /// Level provider plus the logging / silent defaults
    pub fn new(levels: Box<dyn LevelProvider>) -> Self {
        Self {
            levels,
            score: Box::new(LogScoreSink::default()),
            audio: Box::new(SilentAudio),
            hud: Box::new(LogHud),
        }
    }

    pub fn with_audio(mut self, audio: Box<dyn AudioSink>) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_hud(mut self, hud: Box<dyn HudSink>) -> Self {
        self.hud = hud;
        self
    }

    pub fn with_score(mut self, score: Box<dyn ScoreSink>) -> Self {
        self.score = score;
        self
    }
}
