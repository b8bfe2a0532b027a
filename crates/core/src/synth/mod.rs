//! Karplus-Strong note renderer.
//!
//! A note starts from the string's seed noise (blended with fresh "character"
//! noise and low-passed by a randomised pluck-damping coefficient) for one
//! period, then recirculates the previously rendered period through the
//! string-damping low-pass. The finished mono signal is faded out over its
//! last tenth and split to stereo by the string's position.

pub mod filters;

use std::f64::consts::PI;

use rand::Rng;
use tracing::trace;

use crate::{noise, BodyResonance, GuitarError, Result, StereoBuffer, SynthesisOptions};

use filters::{
    fade_tail, low_pass, pluck_damping_coefficient, stereo_gains, BodyResonator,
    FADE_TAIL_PROPORTION,
};

/// Every note buffer is exactly this long.
pub const NOTE_SECONDS: f64 = 1.0;

/// Per-note parameters computed by the string before rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PluckVoice {
    pub hz: f64,
    /// Feedback low-pass coefficient of the string loop.
    pub smoothing_factor: f64,
    /// Excitation gain, already scaled down from the strum velocity.
    pub velocity: f64,
    /// Fixed pan position of the string in [-1, 1].
    pub stereo_position: f64,
}

/// Renders notes into caller-provided stereo buffers.
///
/// The engine keeps one mono scratch buffer that grows to the largest note it
/// has rendered and is reused afterwards, so steady-state rendering does not
/// allocate.
#[derive(Debug, Default)]
pub struct SynthesisEngine {
    scratch: Vec<f64>,
}

impl SynthesisEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample count of one note at `sample_rate`.
    pub fn note_samples(&self, sample_rate: u32) -> usize {
        (NOTE_SECONDS * sample_rate as f64).round() as usize
    }

    /// Capacity currently held by the scratch buffer.
    pub fn scratch_capacity(&self) -> usize {
        self.scratch.capacity()
    }

    /// Renders a plucked note into `buffer`, overwriting both channels.
    pub fn render_karplus_strong<R: Rng + ?Sized>(
        &mut self,
        buffer: &mut StereoBuffer,
        seed_noise: &[f32],
        voice: &PluckVoice,
        options: &SynthesisOptions,
        rng: &mut R,
    ) -> Result<()> {
        let sample_rate = buffer.sample_rate();
        let period = noise::period_samples(voice.hz, sample_rate)?;
        if period > seed_noise.len() {
            return Err(GuitarError::BufferMismatch {
                expected: period,
                actual: seed_noise.len(),
            });
        }
        let sample_count = buffer.len();
        let scratch = self.prepare(sample_count)?;

        let pluck_coefficient = pluck_damping_coefficient(
            options.pluck_damping,
            options.pluck_damping_variation,
            rng.gen::<f64>(),
        );
        let character = options.character_variation;
        // A tension of exactly 1.0 would read the sample being written.
        let tension_tap = (options.string_tension != 1.0)
            .then(|| (options.string_tension * period as f64).floor() as usize);

        trace!(period, pluck_coefficient, ?tension_tap, "karplus-strong loop");

        let mut excitation = 0.0;
        let mut last_output = 0.0;
        for n in 0..sample_count {
            let input = if n < period {
                let mut sample = seed_noise[n] as f64 * (1.0 - character);
                sample += character * rng.gen_range(-1.0f64..1.0);
                sample *= voice.velocity;
                excitation = low_pass(excitation, sample, pluck_coefficient);
                excitation
            } else if let Some(skip) = tension_tap {
                scratch.get(n - period + skip).copied().unwrap_or(0.0)
            } else {
                0.0
            };

            last_output = low_pass(last_output, input, voice.smoothing_factor);
            scratch[n] = last_output;
        }

        if options.body == BodyResonance::Resonate {
            BodyResonator::new(sample_rate).process(scratch);
        }
        fade_tail(scratch, FADE_TAIL_PROPORTION);

        let (gain_left, gain_right) = stereo_gains(options.stereo_spread, voice.stereo_position);
        buffer.write_mono(scratch, gain_left, gain_right)
    }

    /// Renders `velocity * 2^(-decay * t) * sin(2 pi hz t)` on both channels.
    pub fn render_decayed_sine(
        &mut self,
        buffer: &mut StereoBuffer,
        hz: f64,
        velocity: f64,
        decay_factor: f64,
    ) -> Result<()> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(GuitarError::InvalidFrequency(hz));
        }
        let sample_rate = buffer.sample_rate() as f64;
        let scratch = self.prepare(buffer.len())?;

        for (n, sample) in scratch.iter_mut().enumerate() {
            let t = n as f64 / sample_rate;
            *sample = velocity * 2f64.powf(-decay_factor * t) * (2.0 * PI * hz * t).sin();
        }

        buffer.write_mono(scratch, 1.0, 1.0)
    }

    fn prepare(&mut self, sample_count: usize) -> Result<&mut [f64]> {
        if sample_count == 0 {
            return Err(GuitarError::InvalidInput(
                "synthesis buffer must hold at least one sample",
            ));
        }
        self.scratch.clear();
        self.scratch.resize(sample_count, 0.0);
        Ok(&mut self.scratch[..])
    }
}
