use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::Serialize;

use crate::{GuitarError, Result};

/// The string loop passes DC, so bins below this are ignored when looking for
/// the pitch.
const MIN_PITCH_HZ: f32 = 20.0;

/// Level and spectral summary of a rendered note.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NoteAnalysis {
    pub sample_rate: u32,
    pub duration_seconds: f32,
    pub rms: f32,
    pub peak: f32,
    pub spectral_centroid_hz: f32,
    /// Strongest bin at or above 20 Hz.
    pub dominant_hz: f32,
}

/// Reusable FFT front end; plans are cached per block size.
pub struct NoteAnalyser {
    fft_planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl Default for NoteAnalyser {
    fn default() -> Self {
        Self::new()
    }
}

impl NoteAnalyser {
    pub fn new() -> Self {
        Self {
            fft_planner: RealFftPlanner::new(),
            fft: None,
        }
    }

    pub fn analyse(&mut self, samples: &[f32], sample_rate: u32) -> Result<NoteAnalysis> {
        if samples.len() < 2 {
            return Err(GuitarError::InvalidInput(
                "analysis requires blocks with at least two samples",
            ));
        }
        if sample_rate == 0 {
            return Err(GuitarError::InvalidInput("sample rate must be positive"));
        }

        let len = samples.len();
        let fft = self.prepare_fft(len);
        for (index, value) in samples.iter().enumerate() {
            fft.input[index] = *value * hann_value(index, len);
        }
        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        let bin_hz = sample_rate as f32 / len as f32;
        let mut magnitude_sum = 0.0;
        let mut weighted_sum = 0.0;
        let mut dominant = (0.0f32, 0.0f32);
        for (i, bin) in fft.spectrum.iter().enumerate() {
            let magnitude = bin.norm();
            let hz = i as f32 * bin_hz;
            magnitude_sum += magnitude;
            weighted_sum += magnitude * hz;
            if hz >= MIN_PITCH_HZ && magnitude > dominant.1 {
                dominant = (hz, magnitude);
            }
        }

        let spectral_centroid_hz = if magnitude_sum <= f32::EPSILON {
            0.0
        } else {
            weighted_sum / magnitude_sum
        };

        Ok(NoteAnalysis {
            sample_rate,
            duration_seconds: len as f32 / sample_rate as f32,
            rms: compute_rms(samples),
            peak: samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs())),
            spectral_centroid_hz,
            dominant_hz: dominant.0,
        })
    }

    fn prepare_fft(&mut self, size: usize) -> &mut FftResources {
        let stale = self
            .fft
            .as_ref()
            .map(|fft| fft.size != size)
            .unwrap_or(true);
        if stale {
            self.fft = None;
        }

        let planner = &mut self.fft_planner;
        self.fft.get_or_insert_with(|| {
            let plan = planner.plan_fft_forward(size);
            FftResources {
                size,
                scratch: plan.make_scratch_vec(),
                spectrum: plan.make_output_vec(),
                input: plan.make_input_vec(),
                plan,
            }
        })
    }
}

/// One-shot convenience wrapper around [`NoteAnalyser`].
pub fn analyse(samples: &[f32], sample_rate: u32) -> Result<NoteAnalysis> {
    NoteAnalyser::new().analyse(samples, sample_rate)
}

/// Running level of a stream that arrives block by block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelMeter {
    sample_count: u64,
    sum_squares: f64,
    peak: f32,
}

impl LevelMeter {
    pub fn push(&mut self, samples: &[f32]) {
        for sample in samples {
            self.sum_squares += (*sample as f64) * (*sample as f64);
            self.peak = self.peak.max(sample.abs());
        }
        self.sample_count += samples.len() as u64;
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn peak(&self) -> f32 {
        self.peak
    }

    pub fn rms(&self) -> f32 {
        if self.sample_count == 0 {
            return 0.0;
        }
        (self.sum_squares / self.sample_count as f64).sqrt() as f32
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for NoteAnalyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoteAnalyser")
            .field("fft_size", &self.fft.as_ref().map(|fft| fft.size))
            .finish()
    }
}

fn compute_rms(samples: &[f32]) -> f32 {
    let sum: f32 = samples.iter().map(|sample| sample * sample).sum();
    (sum / samples.len() as f32).sqrt()
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(hz: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| (2.0 * PI * hz * n as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn finds_the_pitch_of_a_sine() {
        let samples = sine(440.0, 8_000, 8_000);
        let analysis = analyse(&samples, 8_000).unwrap();
        assert!((analysis.dominant_hz - 440.0).abs() <= 1.0);
        assert!((analysis.rms - 0.7071).abs() < 0.01);
        assert!(analysis.peak <= 1.0 && analysis.peak > 0.99);
        assert!((analysis.duration_seconds - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ignores_dc_when_picking_pitch() {
        let samples: Vec<f32> = sine(200.0, 8_000, 8_000)
            .into_iter()
            .map(|s| 0.2 * s + 0.8)
            .collect();
        let analysis = analyse(&samples, 8_000).unwrap();
        assert!((analysis.dominant_hz - 200.0).abs() <= 1.0);
    }

    #[test]
    fn silence_has_no_centroid() {
        let analysis = analyse(&[0.0; 1024], 48_000).unwrap();
        assert_eq!(analysis.rms, 0.0);
        assert_eq!(analysis.spectral_centroid_hz, 0.0);
    }

    #[test]
    fn reuses_plans_for_equal_sizes() {
        let mut analyser = NoteAnalyser::new();
        analyser.analyse(&sine(100.0, 1_000, 1_000), 1_000).unwrap();
        let analysis = analyser.analyse(&sine(250.0, 1_000, 1_000), 1_000).unwrap();
        assert!((analysis.dominant_hz - 250.0).abs() <= 1.0);
        assert!(format!("{analyser:?}").contains("1000"));
    }

    #[test]
    fn level_meter_matches_whole_block_rms() {
        let samples = sine(50.0, 1_000, 1_000);
        let mut meter = LevelMeter::default();
        for block in samples.chunks(333) {
            meter.push(block);
        }
        meter.push(&[]);

        assert_eq!(meter.sample_count(), 1_000);
        assert!((meter.rms() - compute_rms(&samples)).abs() < 1e-4);
        assert!(meter.peak() > 0.99);
        assert_eq!(LevelMeter::default().rms(), 0.0);
    }

    #[test]
    fn rejects_tiny_blocks() {
        assert!(analyse(&[0.5], 44_100).is_err());
        assert!(analyse(&[0.5, 0.5], 0).is_err());
    }
}
