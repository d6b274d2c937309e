//! Player settings and preferences
//!
//! Persisted separately from level progress in LocalStorage.

use serde::{Deserialize, Serialize};

use crate::consts::{FISH_COUNT, LOOK_SENSITIVITY};
use crate::sim::flocking::NeighborSearch;
use crate::sim::win::PathRule;

/// Quality preset levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum QualityPreset {
    Low,
    #[default]
    Medium,
    High,
}

impl QualityPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityPreset::Low => "Low",
            QualityPreset::Medium => "Medium",
            QualityPreset::High => "High",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(QualityPreset::Low),
            "medium" | "med" => Some(QualityPreset::Medium),
            "high" => Some(QualityPreset::High),
            _ => None,
        }
    }

    /// School size for this preset
    pub fn fish_count(&self) -> usize {
        match self {
            QualityPreset::Low => FISH_COUNT / 2,
            QualityPreset::Medium => FISH_COUNT,
            QualityPreset::High => FISH_COUNT * 3,
        }
    }

    /// Big schools switch to bucketed neighbour search
    pub fn neighbor_search(&self) -> NeighborSearch {
        match self {
            QualityPreset::High => NeighborSearch::Grid { cell_size: 8.0 },
            _ => NeighborSearch::BruteForce,
        }
    }
}

/// Player settings/preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub quality: QualityPreset,

    // === Controls ===
    /// Multiplier on the base mouse-look rate
    pub look_sensitivity: f32,
    pub invert_y: bool,

    // === Puzzle ===
    /// Purchased undo levels (0 disables undo)
    pub undo_levels: usize,
    /// How `path` levels decide start and exit are joined
    pub path_rule: PathRule,

    // === Fish ===
    pub fish_count: usize,
    pub neighbor_search: NeighborSearch,

    // === HUD ===
    pub show_fps: bool,

    // === Audio ===
    /// Master volume (0.0 - 1.0)
    pub master_volume: f32,
    /// Sound effects volume (0.0 - 1.0)
    pub sfx_volume: f32,
    pub muted: bool,
    /// Mute when window loses focus
    pub mute_on_blur: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            quality: QualityPreset::Medium,

            look_sensitivity: 1.0,
            invert_y: false,

            undo_levels: 3,
            path_rule: PathRule::EndpointsPresent,

            fish_count: FISH_COUNT,
            neighbor_search: NeighborSearch::BruteForce,

            show_fps: false,

            master_volume: 0.8,
            sfx_volume: 1.0,
            muted: false,
            mute_on_blur: true,
        }
    }
}

impl Settings {
    /// Create settings from a quality preset (applies preset defaults)
    pub fn from_preset(preset: QualityPreset) -> Self {
        let mut settings = Self::default();
        settings.apply_preset(preset);
        settings
    }

    /// Apply a quality preset (updates quality-dependent settings)
    pub fn apply_preset(&mut self, preset: QualityPreset) {
        self.quality = preset;
        self.fish_count = preset.fish_count();
        self.neighbor_search = preset.neighbor_search();
    }

    /// Radians of look per pixel of pointer movement
    pub fn look_rate(&self) -> f32 {
        LOOK_SENSITIVITY * self.look_sensitivity.clamp(0.1, 5.0)
    }

    /// Vertical look sign
    pub fn pitch_sign(&self) -> f32 {
        if self.invert_y { -1.0 } else { 1.0 }
    }

    /// Gain applied to sound effects
    pub fn effective_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            (self.master_volume * self.sfx_volume).clamp(0.0, 1.0)
        }
    }

    /// LocalStorage key
    #[allow(dead_code)]
    const STORAGE_KEY: &'static str = "abyss_slide_settings";

    /// Load settings from LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(Some(json)) = storage.get_item(Self::STORAGE_KEY) {
                match serde_json::from_str(&json) {
                    Ok(settings) => {
                        log::info!("Loaded settings from LocalStorage");
                        return settings;
                    }
                    Err(e) => log::warn!("Discarding unreadable settings: {}", e),
                }
            }
        }

        log::info!("Using default settings");
        Self::default()
    }

    /// Save settings to LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn save(&self) {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(json) = serde_json::to_string(self) {
                let _ = storage.set_item(Self::STORAGE_KEY, &json);
                log::info!("Settings saved");
            }
        }
    }

    /// Native stubs
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load() -> Self {
        Self::default()
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn save(&self) {
        // No-op for native
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_applies_fish_settings() {
        let high = Settings::from_preset(QualityPreset::High);
        assert_eq!(high.fish_count, FISH_COUNT * 3);
        assert!(matches!(high.neighbor_search, NeighborSearch::Grid { .. }));
        let low = Settings::from_preset(QualityPreset::Low);
        assert_eq!(low.neighbor_search, NeighborSearch::BruteForce);
        assert_eq!(QualityPreset::parse("MED"), Some(QualityPreset::Medium));
    }

    #[test]
    fn test_preset_names_parse_back() {
        for preset in [QualityPreset::Low, QualityPreset::Medium, QualityPreset::High] {
            assert_eq!(QualityPreset::parse(preset.as_str()), Some(preset));
        }
        assert_eq!(QualityPreset::parse("ultra"), None);
        let mut settings = Settings::default();
        settings.apply_preset(QualityPreset::parse("high").unwrap());
        assert_eq!(settings.quality.as_str(), "High");
        settings.save();
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"muted": true, "path_rule": "connected"}"#).unwrap();
        assert!(settings.muted);
        assert_eq!(settings.path_rule, PathRule::Connected);
        assert_eq!(settings.fish_count, FISH_COUNT);
        assert_eq!(settings.effective_volume(), 0.0);
    }

    #[test]
    fn test_look_rate_is_clamped() {
        let mut settings = Settings::default();
        assert!((settings.look_rate() - LOOK_SENSITIVITY).abs() < 1e-9);
        settings.look_sensitivity = 100.0;
        assert!((settings.look_rate() - LOOK_SENSITIVITY * 5.0).abs() < 1e-9);
    }
}
