//! Core library for the pixel instrument.
//!
//! An image is reduced to a grid of averaged colour cells; each cell's hue,
//! saturation and value are mapped to pitch, attack, loudness, waveform and
//! pan, and played through a bounded pool of synthesiser voices. Each module
//! owns one subsystem (colour conversion, grid reduction, sound mapping,
//! voice management, pointer interaction, offline synthesis and analysis)
//! and the [`Instrument`] façade wires them together.

pub mod analysis;
pub mod audio;
pub mod color;
pub mod config;
pub mod error;
pub mod grid;
pub mod instrument;
pub mod interaction;
pub mod mapping;
pub mod timeline;

pub use analysis::{OutputSummary, SpectrumAnalyzer};
pub use audio::{
    BackendCommand, OfflineRenderer, PlayMode, RecordingBackend, StereoBuffer, SynthBackend,
    VoiceId, VoiceKey, VoicePool,
};
pub use color::{hsv_to_rgb, rgb_to_hsv, Hsv, Rgb};
pub use config::{AppConfig, AudioConfig, GridConfig, Range, SoundConfig, VoiceConfig};
pub use error::{InstrumentError, Result};
pub use grid::{Cell, DisplayLayout, PixelGrid, PixelSource};
pub use instrument::Instrument;
pub use interaction::{InteractionController, ScanState};
pub use mapping::{AudioParameters, Scale, SoundMapper, Waveform};
pub use timeline::{PlaybackClock, Scheduler};
