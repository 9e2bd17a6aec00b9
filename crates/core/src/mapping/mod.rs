//! Maps HSV colours onto synthesis parameters.
//!
//! Hue picks the pitch (quantised to a musical scale) and the stereo
//! position, saturation picks the attack time and timbre, value picks the
//! loudness and the release time.

use std::f32::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::color::{Hsv, Rgb};
use crate::config::SoundConfig;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Musical scales a hue can be quantised to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    #[default]
    Pentatonic,
    Major,
    Minor,
    Blues,
    Chromatic,
    Dorian,
}

impl Scale {
    pub const ALL: [Scale; 6] = [
        Scale::Pentatonic,
        Scale::Major,
        Scale::Minor,
        Scale::Blues,
        Scale::Chromatic,
        Scale::Dorian,
    ];

    /// Semitone offsets within one octave, ascending from the root.
    pub fn semitones(self) -> &'static [u32] {
        match self {
            Scale::Pentatonic => &[0, 2, 4, 7, 9],
            Scale::Major => &[0, 2, 4, 5, 7, 9, 11],
            Scale::Minor => &[0, 2, 3, 5, 7, 8, 10],
            Scale::Blues => &[0, 3, 5, 6, 7, 10],
            Scale::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
            Scale::Dorian => &[0, 2, 3, 5, 7, 9, 10],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Scale::Pentatonic => "pentatonic",
            Scale::Major => "major",
            Scale::Minor => "minor",
            Scale::Blues => "blues",
            Scale::Chromatic => "chromatic",
            Scale::Dorian => "dorian",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Option<Scale> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|scale| scale.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Oscillator timbres ordered from simplest to richest harmonic content.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Triangle,
    Square,
    Sawtooth,
}

impl Waveform {
    pub const ORDERED: [Waveform; 4] = [
        Waveform::Sine,
        Waveform::Triangle,
        Waveform::Square,
        Waveform::Sawtooth,
    ];

    /// Sample of the waveform at `phase` in `[0, 1)`, amplitude in `[-1, 1]`.
    pub fn sample(self, phase: f32) -> f32 {
        let phase = phase.rem_euclid(1.0);
        match self {
            Waveform::Sine => (2.0 * PI * phase).sin(),
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * phase - 1.0,
        }
    }
}

/// Complete parameter set for one voice. Derived data, recomputed per lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioParameters {
    /// Pitch in Hz, inside the configured frequency window.
    pub frequency: f32,
    /// Peak gain in `[0, 1]`.
    pub volume: f32,
    /// Attack time in seconds.
    pub attack: f32,
    /// Release time in seconds.
    pub release: f32,
    pub waveform: Waveform,
    /// Stereo position, `-1` hard left to `1` hard right.
    pub pan: f32,
    /// The colour the parameters were derived from.
    pub hsv: Hsv,
    /// RGB rendition of `hsv` for on-screen readouts.
    pub display_color: Rgb,
    /// Nearest equal-tempered note, e.g. `A3`.
    pub note_name: String,
}

/// Pure colour-to-sound mapper.
#[derive(Debug, Clone, Default)]
pub struct SoundMapper {
    config: SoundConfig,
}

impl SoundMapper {
    pub fn new(config: SoundConfig) -> Self {
        Self {
            config: config.sanitized(),
        }
    }

    pub fn config(&self) -> &SoundConfig {
        &self.config
    }

    pub fn scale(&self) -> Scale {
        self.config.scale
    }

    pub fn base_frequency(&self) -> f32 {
        self.config.base_frequency
    }

    pub fn set_scale(&mut self, scale: Scale) {
        self.config.scale = scale;
    }

    /// Switches to the named scale. Unknown names leave the current scale in
    /// place and return `false`.
    pub fn set_scale_by_name(&mut self, name: &str) -> bool {
        match Scale::from_name(name) {
            Some(scale) => {
                self.set_scale(scale);
                true
            }
            None => {
                tracing::warn!(name, "ignoring unknown scale");
                false
            }
        }
    }

    /// Sets the root frequency. Values outside the supported range are
    /// ignored and `false` is returned.
    pub fn set_base_frequency(&mut self, frequency: f32) -> bool {
        if (SoundConfig::MIN_BASE_FREQUENCY..=SoundConfig::MAX_BASE_FREQUENCY).contains(&frequency)
        {
            self.config.base_frequency = frequency;
            true
        } else {
            tracing::warn!(frequency, "ignoring out-of-range base frequency");
            false
        }
    }

    /// Quantises the hue onto a scale degree, and independently onto an
    /// octave of the configured span.
    pub fn map_hue_to_frequency(&self, hue: f32) -> f32 {
        let normalized = normalize_hue(hue) / 360.0;
        let semitones = self.config.scale.semitones();
        let degrees = semitones.len();
        let span = self.config.octave_span;

        let degree = ((normalized * degrees as f32).floor() as usize).min(degrees - 1);
        let octave = ((normalized * span as f32).floor() as u32).min(span - 1);
        let semitone = semitones[degree];

        let offset = (octave * 12 + semitone) as f32;
        let frequency = self.config.base_frequency * 2f32.powf(offset / 12.0);
        fold_into(frequency, self.config.frequency_range.min, self.config.frequency_range.max)
    }

    /// Higher saturation gives a shorter, more percussive attack.
    pub fn map_saturation_to_attack(&self, saturation: f32) -> f32 {
        self.config
            .attack_range
            .lerp(1.0 - unit_percent(saturation))
    }

    /// Brighter colours play louder.
    pub fn map_value_to_volume(&self, value: f32) -> f32 {
        self.config.volume_range.lerp(unit_percent(value))
    }

    /// Brighter colours ring longer after release.
    pub fn map_value_to_release(&self, value: f32) -> f32 {
        self.config.release_range.lerp(unit_percent(value))
    }

    /// Quantises saturation into one of four timbre classes.
    pub fn map_saturation_to_waveform(&self, saturation: f32) -> Waveform {
        let classes = Waveform::ORDERED.len();
        let index = ((unit_percent(saturation) * classes as f32).floor() as usize).min(classes - 1);
        Waveform::ORDERED[index]
    }

    /// `sin(hue)`: hue 0 is centred, complementary hues sit on opposite sides.
    pub fn map_hue_to_pan(&self, hue: f32) -> f32 {
        normalize_hue(hue).to_radians().sin().clamp(-1.0, 1.0)
    }

    /// Derives the full parameter set for one colour.
    pub fn map_hsv_to_audio(&self, hsv: Hsv) -> AudioParameters {
        let hsv = hsv.clamped();
        let frequency = self.map_hue_to_frequency(hsv.h);
        AudioParameters {
            frequency,
            volume: self.map_value_to_volume(hsv.v),
            attack: self.map_saturation_to_attack(hsv.s),
            release: self.map_value_to_release(hsv.v),
            waveform: self.map_saturation_to_waveform(hsv.s),
            pan: self.map_hue_to_pan(hsv.h),
            hsv,
            display_color: hsv.to_rgb(),
            note_name: note_name(frequency),
        }
    }
}

/// Nearest equal-tempered note name for a frequency (A4 = 440 Hz).
pub fn note_name(frequency: f32) -> String {
    if !(frequency.is_finite() && frequency > 0.0) {
        return String::from("-");
    }
    let midi = (69.0 + 12.0 * (frequency / 440.0).log2()).round() as i32;
    let name = NOTE_NAMES[midi.rem_euclid(12) as usize];
    let octave = midi.div_euclid(12) - 1;
    format!("{name}{octave}")
}

fn normalize_hue(hue: f32) -> f32 {
    if !hue.is_finite() {
        return 0.0;
    }
    let hue = hue.rem_euclid(360.0);
    if hue >= 360.0 {
        0.0
    } else {
        hue
    }
}

fn unit_percent(percent: f32) -> f32 {
    if percent.is_finite() {
        (percent / 100.0).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Moves a frequency by whole octaves until it lies in `[min, max]`, which
/// keeps it on the scale. The window spans at least an octave once the
/// config is sanitized; the final clamp only absorbs rounding.
fn fold_into(frequency: f32, min: f32, max: f32) -> f32 {
    let mut folded = frequency;
    if max >= min * 2.0 && folded > 0.0 {
        while folded < min {
            folded *= 2.0;
        }
        while folded > max {
            folded /= 2.0;
        }
    }
    folded.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Range;

    fn semitone_class(mapper: &SoundMapper, frequency: f32) -> u32 {
        let offset = 12.0 * (frequency / mapper.base_frequency()).log2();
        (offset.round() as i32).rem_euclid(12) as u32
    }

    #[test]
    fn every_hue_lands_on_the_scale_inside_the_window() {
        for scale in Scale::ALL {
            let mut mapper = SoundMapper::default();
            mapper.set_scale(scale);
            let window = mapper.config().frequency_range;

            for tenth in 0..3600 {
                let hue = tenth as f32 / 10.0;
                let frequency = mapper.map_hue_to_frequency(hue);
                assert!(window.contains(frequency), "{scale}: {hue} -> {frequency}");
                let class = semitone_class(&mapper, frequency);
                assert!(scale.semitones().contains(&class), "{scale}: {hue} -> {class}");
            }
        }
    }

    #[test]
    fn folding_keeps_low_roots_on_the_scale() {
        let mut mapper = SoundMapper::default();
        assert!(mapper.set_base_frequency(55.0));

        for degree in 0..360 {
            let frequency = mapper.map_hue_to_frequency(degree as f32);
            assert!((200.0..=2000.0).contains(&frequency));
            let class = semitone_class(&mapper, frequency);
            assert!(Scale::Pentatonic.semitones().contains(&class));
        }
    }

    #[test]
    fn hue_spreads_across_three_octaves() {
        let mapper = SoundMapper::default();
        assert!((mapper.map_hue_to_frequency(0.0) - 220.0).abs() < 0.01);
        // last pentatonic degree (9 semitones) of the third octave
        let top = 220.0 * 2f32.powf(33.0 / 12.0);
        assert!((mapper.map_hue_to_frequency(359.9) - top).abs() < 0.01);
        assert!(mapper.map_hue_to_frequency(180.0) > mapper.map_hue_to_frequency(90.0));
    }

    #[test]
    fn degree_and_octave_are_picked_independently() {
        let mapper = SoundMapper::default();
        // degree floor(0.278 * 5) = 1, octave floor(0.278 * 3) = 0
        assert!((mapper.map_hue_to_frequency(100.0) - 246.94165).abs() < 0.01);
        // degree 2 (4 semitones), octave 1
        let expected = 220.0 * 2f32.powf(16.0 / 12.0);
        assert!((mapper.map_hue_to_frequency(180.0) - expected).abs() < 0.01);
    }

    #[test]
    fn narrow_window_config_still_lands_on_the_scale() {
        let config = crate::config::AppConfig::from_json_str(
            r#"{"sound":{"frequency_range":{"min":300,"max":400}}}"#,
        )
        .unwrap();
        let mapper = SoundMapper::new(config.sound);
        for degree in 0..360 {
            let frequency = mapper.map_hue_to_frequency(degree as f32);
            assert!(mapper.config().frequency_range.contains(frequency));
            let class = semitone_class(&mapper, frequency);
            assert!(Scale::Pentatonic.semitones().contains(&class), "{degree} -> {class}");
        }
    }

    #[test]
    fn saturation_shortens_attack() {
        let mapper = SoundMapper::default();
        assert_eq!(mapper.map_saturation_to_attack(100.0), 0.01);
        assert_eq!(mapper.map_saturation_to_attack(0.0), 0.1);
        assert!(mapper.map_saturation_to_attack(30.0) > mapper.map_saturation_to_attack(60.0));
    }

    #[test]
    fn value_raises_volume_and_release() {
        let mapper = SoundMapper::default();
        assert_eq!(mapper.map_value_to_volume(0.0), 0.1);
        assert_eq!(mapper.map_value_to_volume(100.0), 0.8);
        assert_eq!(mapper.map_value_to_release(0.0), 0.1);
        assert_eq!(mapper.map_value_to_release(100.0), 1.0);
        assert!(mapper.map_value_to_volume(40.0) < mapper.map_value_to_volume(70.0));
    }

    #[test]
    fn saturation_picks_ordered_timbres() {
        let mapper = SoundMapper::default();
        assert_eq!(mapper.map_saturation_to_waveform(0.0), Waveform::Sine);
        assert_eq!(mapper.map_saturation_to_waveform(30.0), Waveform::Triangle);
        assert_eq!(mapper.map_saturation_to_waveform(60.0), Waveform::Square);
        assert_eq!(mapper.map_saturation_to_waveform(100.0), Waveform::Sawtooth);
        assert!(Waveform::Sine < Waveform::Sawtooth);
    }

    #[test]
    fn pan_follows_sine_of_hue() {
        let mapper = SoundMapper::default();
        assert_eq!(mapper.map_hue_to_pan(0.0), 0.0);
        assert!(mapper.map_hue_to_pan(360.0).abs() < 1e-6);
        assert!((mapper.map_hue_to_pan(90.0) - 1.0).abs() < 1e-6);
        for hue in [30.0, 75.0, 120.0, 160.0] {
            let left = mapper.map_hue_to_pan(hue);
            let right = mapper.map_hue_to_pan(hue + 180.0);
            assert!((left + right).abs() < 1e-5);
        }
    }

    #[test]
    fn saturated_bright_red_is_sharp_rich_and_loud() {
        let mapper = SoundMapper::default();
        let params = mapper.map_hsv_to_audio(Hsv::new(0.0, 100.0, 100.0));

        assert_eq!(params.attack, mapper.config().attack_range.min);
        assert_eq!(params.waveform, Waveform::Sawtooth);
        assert_eq!(params.volume, mapper.config().volume_range.max);
        assert_eq!(params.display_color, Rgb::new(255, 0, 0));
        assert_eq!(params.note_name, "A3");
    }

    #[test]
    fn invalid_mutations_are_ignored() {
        let mut mapper = SoundMapper::default();
        assert!(!mapper.set_scale_by_name("lydian-ish"));
        assert_eq!(mapper.scale(), Scale::Pentatonic);
        assert!(mapper.set_scale_by_name("BLUES"));
        assert_eq!(mapper.scale(), Scale::Blues);

        assert!(!mapper.set_base_frequency(0.0));
        assert!(!mapper.set_base_frequency(f32::NAN));
        assert!(!mapper.set_base_frequency(50_000.0));
        assert_eq!(mapper.base_frequency(), 220.0);
    }

    #[test]
    fn custom_windows_are_respected() {
        let mapper = SoundMapper::new(SoundConfig {
            volume_range: Range::new(0.2, 0.4),
            ..SoundConfig::default()
        });
        assert_eq!(mapper.map_value_to_volume(100.0), 0.4);
    }

    #[test]
    fn names_notes() {
        assert_eq!(note_name(440.0), "A4");
        assert_eq!(note_name(261.63), "C4");
        assert_eq!(note_name(0.0), "-");
    }

    #[test]
    fn waveforms_stay_in_unit_range() {
        for waveform in Waveform::ORDERED {
            for step in 0..100 {
                let sample = waveform.sample(step as f32 / 100.0);
                assert!((-1.0..=1.0).contains(&sample));
            }
        }
    }
}
