//! Offline synthesis backend
//!
//! Records every voice the pool starts and renders the whole performance
//! into a stereo buffer afterwards: one oscillator per voice, a linear
//! attack/sustain/release envelope, equal-power panning, then the shared
//! output stage (a small Freeverb-style reverb and the master gain).

use std::f32::consts::FRAC_PI_4;
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

use super::{SynthBackend, VoiceId};
use crate::config::AudioConfig;
use crate::{AudioParameters, InstrumentError, Result};

/// Comb filter delay times in samples (at 44100 Hz)
const COMB_DELAYS: [usize; 4] = [1116, 1188, 1277, 1356];

/// Allpass filter delay times in samples (at 44100 Hz)
const ALLPASS_DELAYS: [usize; 2] = [556, 441];

/// Extra delay on the right channel for stereo width
const STEREO_SPREAD: usize = 23;

const REFERENCE_RATE: f32 = 44_100.0;
const ROOM_FEEDBACK: f32 = 0.78;
const DAMPING: f32 = 0.3;
const WET_SCALE: f32 = 0.25;

struct CombFilter {
    buffer: Vec<f32>,
    pos: usize,
    filterstore: f32,
}

impl CombFilter {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            pos: 0,
            filterstore: 0.0,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.pos];
        self.filterstore = output * (1.0 - DAMPING) + self.filterstore * DAMPING;
        self.buffer[self.pos] = input + self.filterstore * ROOM_FEEDBACK;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }
}

struct AllpassFilter {
    buffer: Vec<f32>,
    pos: usize,
}

impl AllpassFilter {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            pos: 0,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.pos];
        let output = delayed - input;
        self.buffer[self.pos] = input + delayed * 0.5;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }
}

/// One reverb channel: parallel combs into serial allpasses.
struct ReverbChannel {
    combs: Vec<CombFilter>,
    allpasses: Vec<AllpassFilter>,
}

impl ReverbChannel {
    fn new(sample_rate: u32, spread: usize) -> Self {
        let scale = sample_rate as f32 / REFERENCE_RATE;
        let scaled = |delay: usize| ((delay + spread) as f32 * scale).round() as usize;
        Self {
            combs: COMB_DELAYS.iter().map(|&d| CombFilter::new(scaled(d))).collect(),
            allpasses: ALLPASS_DELAYS
                .iter()
                .map(|&d| AllpassFilter::new(scaled(d)))
                .collect(),
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let mut out: f32 = self.combs.iter_mut().map(|comb| comb.process(input)).sum();
        for allpass in &mut self.allpasses {
            out = allpass.process(out);
        }
        out * WET_SCALE
    }
}

/// Rendered stereo audio.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StereoBuffer {
    pub sample_rate: u32,
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl StereoBuffer {
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / f64::from(self.sample_rate)
    }

    /// Interleaved samples (L, R, L, R, ...).
    pub fn interleave(&self) -> Vec<f32> {
        self.left
            .iter()
            .zip(&self.right)
            .flat_map(|(l, r)| [*l, *r])
            .collect()
    }

    /// Average of both channels.
    pub fn mono(&self) -> Vec<f32> {
        self.left
            .iter()
            .zip(&self.right)
            .map(|(l, r)| (l + r) * 0.5)
            .collect()
    }
}

#[derive(Debug, Clone)]
struct NoteEvent {
    id: VoiceId,
    params: AudioParameters,
    start: f64,
    release_at: Option<f64>,
}

/// Backend that renders the performance after the fact.
#[derive(Debug, Clone)]
pub struct OfflineRenderer {
    config: AudioConfig,
    notes: Vec<NoteEvent>,
    latest_time: f64,
    running: bool,
}

impl OfflineRenderer {
    pub fn new(config: AudioConfig) -> Self {
        Self {
            config: config.sanitized(),
            notes: Vec::new(),
            latest_time: 0.0,
            running: false,
        }
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Number of voices started so far.
    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Time the last release envelope fades out; notes still held count as
    /// released at the latest command time.
    pub fn tail_end(&self) -> f64 {
        self.notes
            .iter()
            .map(|note| {
                let released = note.release_at.unwrap_or(self.latest_time).max(note.start);
                released + f64::from(note.params.release)
            })
            .fold(0.0, f64::max)
    }

    /// Renders `duration` seconds. Notes never released are held to the end.
    pub fn render(&self, duration: f64) -> StereoBuffer {
        let sample_rate = self.config.sample_rate;
        let rate = f64::from(sample_rate);
        let frames = (duration.max(0.0) * rate).ceil() as usize;
        let mut left = vec![0.0f32; frames];
        let mut right = vec![0.0f32; frames];

        for note in &self.notes {
            let params = &note.params;
            let start_frame = (note.start * rate).round() as usize;
            let hold = (note.release_at.unwrap_or(duration) - note.start).max(0.0) as f32;
            let end = note.start + f64::from(hold) + f64::from(params.release);
            let end_frame = ((end * rate).ceil() as usize).min(frames);

            let angle = (params.pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
            let (gain_l, gain_r) = (angle.cos(), angle.sin());

            for frame in start_frame..end_frame {
                let t = (frame - start_frame) as f32 / sample_rate as f32;
                let level = envelope_at(t, params.attack, hold, params.release);
                if level <= 0.0 {
                    continue;
                }
                let phase = (params.frequency * t).fract();
                let sample = params.waveform.sample(phase) * params.volume * level;
                left[frame] += sample * gain_l;
                right[frame] += sample * gain_r;
            }
        }

        let mix = self.config.reverb_mix;
        let gain = self.config.master_gain;
        let mut reverb_l = ReverbChannel::new(sample_rate, 0);
        let mut reverb_r = ReverbChannel::new(sample_rate, STEREO_SPREAD);
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let wet_l = reverb_l.process(*l);
            let wet_r = reverb_r.process(*r);
            *l = (*l * (1.0 - mix) + wet_l * mix) * gain;
            *r = (*r * (1.0 - mix) + wet_r * mix) * gain;
        }

        StereoBuffer {
            sample_rate,
            left,
            right,
        }
    }

    /// Renders and writes a 16-bit stereo WAV file.
    pub fn write_wav(&self, path: impl AsRef<Path>, duration: f64) -> Result<StereoBuffer> {
        let buffer = self.render(duration);
        let spec = WavSpec {
            channels: 2,
            sample_rate: buffer.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path.as_ref(), spec)?;
        for sample in buffer.interleave() {
            let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16;
            writer.write_sample(value)?;
        }
        writer.finalize()?;
        tracing::info!(
            path = %path.as_ref().display(),
            frames = buffer.len(),
            "wrote wav"
        );
        Ok(buffer)
    }

    fn touch(&mut self, at: f64) {
        if at.is_finite() {
            self.latest_time = self.latest_time.max(at);
        }
    }
}

impl SynthBackend for OfflineRenderer {
    fn initialize(&mut self) -> Result<()> {
        if self.config.sample_rate == 0 {
            return Err(InstrumentError::Backend("sample rate is zero".to_string()));
        }
        self.running = true;
        Ok(())
    }

    fn start_voice(&mut self, id: VoiceId, params: &AudioParameters, at: f64) {
        if !self.running {
            return;
        }
        self.touch(at);
        self.notes.push(NoteEvent {
            id,
            params: params.clone(),
            start: at.max(0.0),
            release_at: None,
        });
    }

    fn release_voice(&mut self, id: VoiceId, at: f64) {
        self.touch(at);
        if let Some(note) = self
            .notes
            .iter_mut()
            .find(|note| note.id == id && note.release_at.is_none())
        {
            note.release_at = Some(at.max(note.start));
        }
    }

    fn shutdown(&mut self) {
        let latest = self.latest_time;
        for note in self.notes.iter_mut().filter(|note| note.release_at.is_none()) {
            note.release_at = Some(latest.max(note.start));
        }
        self.running = false;
    }
}

/// Linear attack to full level, hold, then a linear fade from the level
/// reached at release time.
fn envelope_at(t: f32, attack: f32, hold: f32, release: f32) -> f32 {
    let rise = |x: f32| {
        if attack <= 0.0 {
            1.0
        } else {
            (x / attack).min(1.0)
        }
    };
    if t < hold {
        return rise(t);
    }
    if release <= 0.0 {
        return 0.0;
    }
    rise(hold) * (1.0 - (t - hold) / release).max(0.0)
}
