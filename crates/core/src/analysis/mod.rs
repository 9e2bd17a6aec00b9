use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::audio::StereoBuffer;
use crate::{InstrumentError, Result};

/// Level and pitch summary of a rendered performance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputSummary {
    pub duration_seconds: f64,
    pub rms: f32,
    pub peak: f32,
    /// Strongest spectral peak of the mono mix in Hz, 0 for silence.
    pub dominant_frequency: f32,
}

/// Spectral helper reusing its FFT plan across calls of the same size.
pub struct SpectrumAnalyzer {
    fft_planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        Self {
            fft_planner: RealFftPlanner::new(),
            fft: None,
        }
    }

    /// Frequency of the strongest bin of a Hann-windowed spectrum.
    pub fn dominant_frequency(&mut self, samples: &[f32], sample_rate: u32) -> Result<f32> {
        if samples.len() < 2 {
            return Err(InstrumentError::InvalidInput(
                "spectral analysis requires at least two samples",
            ));
        }

        let len = samples.len();
        let fft = self.prepare_fft(len);
        for (index, value) in samples.iter().enumerate() {
            fft.input[index] = *value * hann_value(index, len);
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)
            .map_err(|err| InstrumentError::msg(format!("fft failed: {err}")))?;

        let bin_hz = sample_rate as f32 / len as f32;
        let strongest = fft
            .spectrum
            .iter()
            .enumerate()
            .skip(1)
            .map(|(index, bin)| (index, bin.norm()))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match strongest {
            Some((index, magnitude)) if magnitude > f32::EPSILON => Ok(index as f32 * bin_hz),
            _ => Ok(0.0),
        }
    }

    /// RMS, peak and dominant frequency of a stereo render.
    pub fn summarize(&mut self, buffer: &StereoBuffer) -> Result<OutputSummary> {
        let mono = buffer.mono();
        let dominant_frequency = if mono.len() >= 2 {
            self.dominant_frequency(&mono, buffer.sample_rate)?
        } else {
            0.0
        };
        Ok(OutputSummary {
            duration_seconds: buffer.duration_seconds(),
            rms: rms(&mono),
            peak: peak(&mono),
            dominant_frequency,
        })
    }

    fn prepare_fft(&mut self, size: usize) -> &mut FftResources {
        let planner = &mut self.fft_planner;
        let fft = self
            .fft
            .get_or_insert_with(|| FftResources::plan(planner, size));
        if fft.size != size {
            *fft = FftResources::plan(planner, size);
        }
        fft
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl FftResources {
    fn plan(planner: &mut RealFftPlanner<f32>, size: usize) -> Self {
        let plan = planner.plan_fft_forward(size);
        Self {
            size,
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        }
    }
}

impl fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("fft", &self.fft)
            .finish()
    }
}

impl fmt::Debug for FftResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftResources")
            .field("size", &self.size)
            .finish()
    }
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|sample| sample * sample).sum();
    (sum / samples.len() as f32).sqrt()
}

pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |max, sample| max.max(sample.abs()))
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}
