//! Excitation noise for the string loop.

use rand::Rng;

use crate::{GuitarError, Result};

/// Number of samples in one period of `hz` at `sample_rate`, rounded to the
/// nearest whole sample.
pub fn period_samples(hz: f64, sample_rate: u32) -> Result<usize> {
    if !hz.is_finite() || hz <= 0.0 {
        return Err(GuitarError::InvalidFrequency(hz));
    }
    let samples = (sample_rate as f64 / hz).round();
    if samples < 1.0 {
        return Err(GuitarError::InvalidInput(
            "frequency is too high for the sample rate to hold a single period",
        ));
    }
    Ok(samples as usize)
}

/// Uniform white noise in [-1, 1).
pub fn white_noise<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Vec<f32> {
    (0..len)
        .map(|_| rng.gen_range(-1.0f64..1.0) as f32)
        .collect()
}

/// Seed burst covering exactly one period of the open string.
pub fn seed_noise<R: Rng + ?Sized>(hz: f64, sample_rate: u32, rng: &mut R) -> Result<Vec<f32>> {
    let len = period_samples(hz, sample_rate)?;
    Ok(white_noise(len, rng))
}
