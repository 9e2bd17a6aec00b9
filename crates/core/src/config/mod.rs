use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::grid::{clamp_cell_size, DEFAULT_CELL_SIZE};
use crate::mapping::Scale;
use crate::Result;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub grid: GridConfig,
    pub sound: SoundConfig,
    pub voices: VoiceConfig,
    pub audio: AudioConfig,
}

impl AppConfig {
    /// Parses a JSON document. Missing fields fall back to their defaults and
    /// out-of-range values are clamped.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(json)?;
        Ok(config.sanitized())
    }

    /// Reads a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Applies the silent clamping policy to every section.
    pub fn sanitized(self) -> Self {
        Self {
            grid: self.grid.sanitized(),
            sound: self.sound.sanitized(),
            voices: self.voices.sanitized(),
            audio: self.audio.sanitized(),
        }
    }
}

/// Inclusive numeric window used by the sound mappings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f32,
    pub max: f32,
}

impl Range {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Linear interpolation, `t` in `[0, 1]`.
    pub fn lerp(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        self.min * (1.0 - t) + self.max * t
    }

    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f32) -> bool {
        (self.min..=self.max).contains(&value)
    }

    fn is_valid_within(&self, floor: f32, ceiling: f32) -> bool {
        self.min.is_finite()
            && self.max.is_finite()
            && self.min <= self.max
            && self.min >= floor
            && self.max <= ceiling
    }

    fn or_default(self, floor: f32, ceiling: f32, fallback: Range) -> Range {
        if self.is_valid_within(floor, ceiling) {
            self
        } else {
            tracing::warn!(range = ?self, ?fallback, "ignoring invalid range");
            fallback
        }
    }
}

/// Image reduction settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Cell edge length in display pixels, `[10, 100]`.
    pub cell_size: u32,
    /// Fixed canvas footprint the image is fitted into.
    pub canvas_width: u32,
    pub canvas_height: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cell_size: DEFAULT_CELL_SIZE,
            canvas_width: 800,
            canvas_height: 600,
        }
    }
}

impl GridConfig {
    pub fn sanitized(self) -> Self {
        Self {
            cell_size: clamp_cell_size(self.cell_size),
            canvas_width: self.canvas_width.max(1),
            canvas_height: self.canvas_height.max(1),
        }
    }
}

/// Colour-to-sound mapping settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundConfig {
    pub scale: Scale,
    pub base_frequency: f32,
    pub frequency_range: Range,
    pub attack_range: Range,
    pub volume_range: Range,
    pub release_range: Range,
    /// Number of octaves the hue wheel is spread across.
    pub octave_span: u32,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            scale: Scale::Pentatonic,
            base_frequency: 220.0,
            frequency_range: Range::new(200.0, 2000.0),
            attack_range: Range::new(0.01, 0.1),
            volume_range: Range::new(0.1, 0.8),
            release_range: Range::new(0.1, 1.0),
            octave_span: 3,
        }
    }
}

impl SoundConfig {
    pub const MIN_BASE_FREQUENCY: f32 = 20.0;
    pub const MAX_BASE_FREQUENCY: f32 = 2000.0;

    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        let base_frequency = if (Self::MIN_BASE_FREQUENCY..=Self::MAX_BASE_FREQUENCY)
            .contains(&self.base_frequency)
        {
            self.base_frequency
        } else {
            tracing::warn!(
                value = self.base_frequency,
                "ignoring base frequency outside the supported range"
            );
            defaults.base_frequency
        };
        let frequency_range = self
            .frequency_range
            .or_default(20.0, 20_000.0, defaults.frequency_range);
        // octave folding needs at least one full octave of room
        let frequency_range = if frequency_range.max >= frequency_range.min * 2.0 {
            frequency_range
        } else {
            tracing::warn!(
                min = frequency_range.min,
                max = frequency_range.max,
                "ignoring frequency range narrower than an octave"
            );
            defaults.frequency_range
        };
        Self {
            scale: self.scale,
            base_frequency,
            frequency_range,
            attack_range: self
                .attack_range
                .or_default(0.0, 10.0, defaults.attack_range),
            volume_range: self
                .volume_range
                .or_default(0.0, 1.0, defaults.volume_range),
            release_range: self
                .release_range
                .or_default(0.0, 10.0, defaults.release_range),
            octave_span: self.octave_span.clamp(1, 8),
        }
    }
}

/// Voice pool settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Maximum number of simultaneously live voices.
    pub max_voices: usize,
    /// Delay between consecutive onsets of a chord, in seconds.
    pub stagger_seconds: f32,
    /// One-shot note length, shortest for the brightest colours.
    pub note_duration_range: Range,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            max_voices: 5,
            stagger_seconds: 0.05,
            note_duration_range: Range::new(0.1, 0.4),
        }
    }
}

impl VoiceConfig {
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        let stagger_seconds = if self.stagger_seconds.is_finite() {
            self.stagger_seconds.clamp(0.0, 1.0)
        } else {
            defaults.stagger_seconds
        };
        Self {
            max_voices: self.max_voices.clamp(1, 64),
            stagger_seconds,
            note_duration_range: self.note_duration_range.or_default(
                0.01,
                10.0,
                defaults.note_duration_range,
            ),
        }
    }
}

/// Configuration specific to the audio output stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Shared gain applied to the mix of all voices.
    pub master_gain: f32,
    /// Wet share of the shared reverb stage.
    pub reverb_mix: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            master_gain: 0.5,
            reverb_mix: 0.2,
        }
    }
}

impl AudioConfig {
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        let unit = |value: f32, fallback: f32| {
            if value.is_finite() {
                value.clamp(0.0, 1.0)
            } else {
                fallback
            }
        };
        Self {
            sample_rate: self.sample_rate.clamp(8_000, 192_000),
            master_gain: unit(self.master_gain, defaults.master_gain),
            reverb_mix: unit(self.reverb_mix, defaults.reverb_mix),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn partial_documents_keep_defaults() {
        let config = AppConfig::from_json_str(r#"{ "grid": { "cell_size": 20 } }"#).unwrap();
        assert_eq!(config.grid.cell_size, 20);
        assert_eq!(config.grid.canvas_width, 800);
        assert_eq!(config.voices, VoiceConfig::default());
        assert_eq!(config.sound.scale, Scale::Pentatonic);
    }

    #[test]
    fn out_of_range_values_are_clamped_or_ignored() {
        let json = r#"{
            "grid": { "cell_size": 3 },
            "sound": { "base_frequency": -5.0, "volume_range": { "min": 0.9, "max": 0.1 }, "scale": "blues" },
            "voices": { "max_voices": 0 },
            "audio": { "master_gain": 4.0 }
        }"#;
        let config = AppConfig::from_json_str(json).unwrap();

        assert_eq!(config.grid.cell_size, 10);
        assert_eq!(config.sound.base_frequency, 220.0);
        assert_eq!(config.sound.volume_range, Range::new(0.1, 0.8));
        assert_eq!(config.sound.scale, Scale::Blues);
        assert_eq!(config.voices.max_voices, 1);
        assert_eq!(config.audio.master_gain, 1.0);
    }

    #[test]
    fn frequency_window_narrower_than_an_octave_is_ignored() {
        let config =
            AppConfig::from_json_str(r#"{ "sound": { "frequency_range": { "min": 300, "max": 400 } } }"#)
                .unwrap();
        assert_eq!(config.sound.frequency_range, SoundConfig::default().frequency_range);

        let config =
            AppConfig::from_json_str(r#"{ "sound": { "frequency_range": { "min": 100, "max": 200 } } }"#)
                .unwrap();
        assert_eq!(config.sound.frequency_range, Range::new(100.0, 200.0));
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = AppConfig::from_json_str("{ not json").unwrap_err();
        assert!(format!("{err}").contains("invalid configuration"));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "voices": {{ "max_voices": 8 }} }}"#).unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.voices.max_voices, 8);
    }

    #[test]
    fn range_interpolates() {
        let range = Range::new(0.1, 0.5);
        assert!((range.lerp(0.0) - 0.1).abs() < 1e-6);
        assert!((range.lerp(1.0) - 0.5).abs() < 1e-6);
        assert!((range.lerp(2.0) - 0.5).abs() < 1e-6);
        assert!(range.contains(0.3));
    }
}
