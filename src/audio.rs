//! Audio system using Web Audio API
//!
//! Procedurally generated tones, no sample files. Sounds played deep in the
//! trench are pitched down a little.

use glam::Vec3;
use web_sys::{AudioContext, GainNode, OscillatorNode, OscillatorType};

use crate::depth_at;
use crate::services::{AudioSink, Sound};
use crate::settings::Settings;

/// Audio manager for the game
pub struct AudioManager {
    ctx: Option<AudioContext>,
    master_volume: f32,
    sfx_volume: f32,
    muted: bool,
    /// Page lost focus
    paused: bool,
}

impl Default for AudioManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioManager {
    pub fn new() -> Self {
        // May fail outside a secure context
        let ctx = AudioContext::new().ok();
        if ctx.is_none() {
            log::warn!("Failed to create AudioContext - audio disabled");
        }
        Self {
            ctx,
            master_volume: 0.8,
            sfx_volume: 1.0,
            muted: false,
            paused: false,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let mut audio = Self::new();
        audio.apply_settings(settings);
        audio
    }

    pub fn is_available(&self) -> bool {
        self.ctx.is_some()
    }

    pub fn apply_settings(&mut self, settings: &Settings) {
        self.set_master_volume(settings.master_volume);
        self.set_sfx_volume(settings.sfx_volume);
        self.set_muted(settings.muted);
    }

    /// Resume audio context (required after user gesture)
    pub fn resume(&self) {
        if let Some(ctx) = &self.ctx {
            let _ = ctx.resume();
        }
    }

    pub fn set_master_volume(&mut self, vol: f32) {
        self.master_volume = vol.clamp(0.0, 1.0);
    }

    pub fn set_sfx_volume(&mut self, vol: f32) {
        self.sfx_volume = vol.clamp(0.0, 1.0);
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn effective_volume(&self) -> f32 {
        if self.muted || self.paused {
            0.0
        } else {
            self.master_volume * self.sfx_volume
        }
    }

    pub fn play(&self, sound: Sound, at: Option<Vec3>) {
        let vol = self.effective_volume();
        if vol <= 0.0 {
            return;
        }
        let Some(ctx) = &self.ctx else { return };

        // Browsers keep the context suspended until a user gesture
        if ctx.state() == web_sys::AudioContextState::Suspended {
            let _ = ctx.resume();
        }

        // One octave down at most, reached 30 units below the surface
        let pitch = at.map_or(1.0, |p| 1.0 - (depth_at(p) / 30.0).clamp(0.0, 0.5));

        match sound {
            Sound::Select => self.play_select(ctx, vol, pitch),
            Sound::Slide => self.play_slide(ctx, vol, pitch),
            Sound::Undo => self.play_undo(ctx, vol),
            Sound::Refused => self.play_refused(ctx, vol),
            Sound::LevelComplete => self.play_level_complete(ctx, vol),
            Sound::OutOfMoves => self.play_out_of_moves(ctx, vol),
            Sound::FishCaught => self.play_fish_caught(ctx, vol, pitch),
        }
    }

    // === Sound generators ===

    /// Oscillator wired through a gain node to the destination
    fn create_osc(
        &self,
        ctx: &AudioContext,
        freq: f32,
        osc_type: OscillatorType,
    ) -> Option<(OscillatorNode, GainNode)> {
        let osc = ctx.create_oscillator().ok()?;
        let gain = ctx.create_gain().ok()?;

        osc.set_type(osc_type);
        osc.frequency().set_value(freq);
        osc.connect_with_audio_node(&gain).ok()?;
        gain.connect_with_audio_node(&ctx.destination()).ok()?;

        Some((osc, gain))
    }

    /// Single decaying tone with an optional pitch glide
    fn blip(
        &self,
        ctx: &AudioContext,
        osc_type: OscillatorType,
        from: f32,
        to: f32,
        gain_level: f32,
        delay: f64,
        length: f64,
    ) {
        let Some((osc, gain)) = self.create_osc(ctx, from, osc_type) else {
            return;
        };
        let t = ctx.current_time() + delay;

        gain.gain().set_value_at_time(gain_level, t).ok();
        gain.gain()
            .exponential_ramp_to_value_at_time(0.01, t + length)
            .ok();
        if (from - to).abs() > f32::EPSILON {
            osc.frequency().set_value_at_time(from, t).ok();
            osc.frequency()
                .exponential_ramp_to_value_at_time(to, t + length)
                .ok();
        }

        osc.start_with_when(t).ok();
        osc.stop_with_when(t + length + 0.05).ok();
    }

    /// Row selected - short bubble pop
    fn play_select(&self, ctx: &AudioContext, vol: f32, pitch: f32) {
        self.blip(ctx, OscillatorType::Sine, 520.0 * pitch, 780.0 * pitch, vol * 0.3, 0.0, 0.08);
    }

    /// Row slides - low grinding rumble
    fn play_slide(&self, ctx: &AudioContext, vol: f32, pitch: f32) {
        self.blip(ctx, OscillatorType::Sawtooth, 90.0 * pitch, 55.0 * pitch, vol * 0.25, 0.0, 0.35);
        self.blip(
            ctx,
            OscillatorType::Triangle,
            180.0 * pitch,
            120.0 * pitch,
            vol * 0.15,
            0.05,
            0.25,
        );
    }

    /// Undo - reverse swoosh
    fn play_undo(&self, ctx: &AudioContext, vol: f32) {
        self.blip(ctx, OscillatorType::Triangle, 300.0, 600.0, vol * 0.25, 0.0, 0.18);
    }

    /// Refused - dull buzz
    fn play_refused(&self, ctx: &AudioContext, vol: f32) {
        self.blip(ctx, OscillatorType::Square, 110.0, 110.0, vol * 0.12, 0.0, 0.12);
    }

    /// Level complete - rising arpeggio
    fn play_level_complete(&self, ctx: &AudioContext, vol: f32) {
        for (i, freq) in [400.0, 500.0, 600.0, 800.0].iter().enumerate() {
            self.blip(ctx, OscillatorType::Triangle, *freq, *freq, vol * 0.3, i as f64 * 0.1, 0.4);
        }
    }

    /// Out of moves - sad descending
    fn play_out_of_moves(&self, ctx: &AudioContext, vol: f32) {
        for (i, freq) in [400.0, 350.0, 300.0, 200.0].iter().enumerate() {
            self.blip(ctx, OscillatorType::Sine, *freq, *freq, vol * 0.3, i as f64 * 0.2, 0.3);
        }
    }

    /// Fish caught - bright sparkle
    fn play_fish_caught(&self, ctx: &AudioContext, vol: f32, pitch: f32) {
        for (i, freq) in [900.0, 1200.0].iter().enumerate() {
            let freq = *freq * pitch;
            let delay = i as f64 * 0.06;
            self.blip(ctx, OscillatorType::Sine, freq, freq * 1.5, vol * 0.2, delay, 0.15);
        }
    }
}

impl AudioSink for AudioManager {
    fn play_sound(&mut self, sound: Sound, at: Option<Vec3>) {
        self.play(sound, at);
    }

    fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }
}
