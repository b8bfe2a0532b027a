//! Sample-level building blocks of the pluck renderer.
//!
//! Every function here works in `f64`; conversion to `f32` happens only when
//! the finished note is written into a [`crate::StereoBuffer`].

use std::f64::consts::PI;

/// Bounds the pluck-damping draw is spread across.
pub const PLUCK_DAMPING_MIN: f64 = 0.1;
pub const PLUCK_DAMPING_MAX: f64 = 0.9;

/// Share of the buffer faded to silence at the end of every note.
pub const FADE_TAIL_PROPORTION: f64 = 0.1;

/// One-pole low-pass: `y[n] = a * x[n] + (1 - a) * y[n-1]`.
#[inline]
pub fn low_pass(last_output: f64, input: f64, smoothing: f64) -> f64 {
    smoothing * input + (1.0 - smoothing) * last_output
}

/// One-pole high-pass: `y[n] = a * y[n-1] + a * (x[n] - x[n-1])`.
#[inline]
pub fn high_pass(last_output: f64, last_input: f64, input: f64, smoothing: f64) -> f64 {
    smoothing * last_output + smoothing * (input - last_input)
}

/// Range the pluck-damping coefficient is drawn from, centred on
/// `pluck_damping` and widened towards the outer bounds by `variation`.
pub fn pluck_damping_bounds(pluck_damping: f64, variation: f64) -> (f64, f64) {
    let low = pluck_damping - (pluck_damping - PLUCK_DAMPING_MIN) * variation;
    let high = pluck_damping + (PLUCK_DAMPING_MAX - pluck_damping) * variation;
    (low, high)
}

/// Picks the excitation low-pass coefficient for one pluck; `draw` in [0, 1).
pub fn pluck_damping_coefficient(pluck_damping: f64, variation: f64, draw: f64) -> f64 {
    let (low, high) = pluck_damping_bounds(pluck_damping, variation);
    low + draw * (high - low)
}

/// Ramps the last `proportion` of `samples` linearly from unity gain down to
/// exactly zero on the final sample.
pub fn fade_tail(samples: &mut [f64], proportion: f64) {
    let tail = (samples.len() as f64 * proportion).floor() as usize;
    if tail == 0 {
        return;
    }
    let start = samples.len() - tail;
    if tail == 1 {
        samples[start] = 0.0;
        return;
    }

    let last_step = (tail - 1) as f64;
    for (step, sample) in samples[start..].iter_mut().enumerate() {
        *sample *= 1.0 - step as f64 / last_step;
    }
}

/// Left/right gains for a string at `position` in [-1, 1] scaled by `spread`.
/// The two gains always sum to one.
pub fn stereo_gains(spread: f64, position: f64) -> (f64, f64) {
    let pan = spread * position;
    ((1.0 - pan) * 0.5, (1.0 + pan) * 0.5)
}

/// Body model: two soft-clipped resonators at sub-audio rates excited by the
/// string signal, summed back in and stripped of DC.
#[derive(Debug, Clone)]
pub struct BodyResonator {
    coefficients: [f64; 2],
    feedback: [f64; 2],
    velocity: [f64; 2],
    position: [f64; 2],
    last_input: f64,
    dc_input: f64,
    dc_output: f64,
}

impl BodyResonator {
    const FREQUENCIES_HZ: [f64; 2] = [3.4375, 6.124928687214833];
    const FEEDBACK: f64 = 0.98;
    const DC_SMOOTHING: f64 = 0.999;

    pub fn new(sample_rate: u32) -> Self {
        let sample_rate = sample_rate.max(1) as f64;
        Self {
            coefficients: Self::FREQUENCIES_HZ.map(|hz| 2.0 * (PI * hz / sample_rate).sin()),
            feedback: [Self::FEEDBACK; 2],
            velocity: [0.0; 2],
            position: [0.0; 2],
            last_input: 0.0,
            dc_input: 0.0,
            dc_output: 0.0,
        }
    }

    pub fn process(&mut self, samples: &mut [f64]) {
        for sample in samples.iter_mut() {
            for k in 0..2 {
                self.velocity[k] *= self.feedback[k];
                self.velocity[k] += (self.last_input - self.position[k]) * self.coefficients[k];
                self.position[k] += self.velocity[k];
                let p = self.position[k];
                self.position[k] = p - p * p * p / 6.0;
            }
            self.last_input = *sample;

            let resonated = *sample + (self.position[0] + self.position[1]) * 2.0;
            let filtered = high_pass(self.dc_output, self.dc_input, resonated, Self::DC_SMOOTHING);
            self.dc_output = filtered;
            self.dc_input = resonated;
            *sample = filtered;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_pass_settles_on_constant_input() {
        let mut y = 0.0;
        for _ in 0..200 {
            y = low_pass(y, 1.0, 0.3);
        }
        assert!((y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn high_pass_removes_dc() {
        let (mut y, mut x) = (0.0, 0.0);
        for _ in 0..20_000 {
            y = high_pass(y, x, 1.0, 0.999);
            x = 1.0;
        }
        assert!(y.abs() < 1e-3);
    }

    #[test]
    fn pluck_bounds_collapse_without_variation() {
        assert_eq!(pluck_damping_bounds(0.5, 0.0), (0.5, 0.5));
        let (low, high) = pluck_damping_bounds(0.5, 0.5);
        assert!((low - 0.3).abs() < 1e-12);
        assert!((high - 0.7).abs() < 1e-12);
        assert!((pluck_damping_coefficient(0.5, 0.5, 0.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn fade_tail_reaches_zero() {
        let mut samples = vec![1.0; 1000];
        fade_tail(&mut samples, FADE_TAIL_PROPORTION);

        assert_eq!(samples[899], 1.0);
        assert_eq!(samples[900], 1.0);
        assert_eq!(samples[999], 0.0);
        assert!(samples[900..].windows(2).all(|pair| pair[1] <= pair[0]));
    }

    #[test]
    fn fade_tail_handles_tiny_buffers() {
        let mut empty: Vec<f64> = Vec::new();
        fade_tail(&mut empty, FADE_TAIL_PROPORTION);

        let mut short = vec![1.0; 5];
        fade_tail(&mut short, FADE_TAIL_PROPORTION);
        assert_eq!(short, vec![1.0; 5]);

        let mut ten = vec![1.0; 10];
        fade_tail(&mut ten, FADE_TAIL_PROPORTION);
        assert_eq!(ten[9], 0.0);
    }

    #[test]
    fn stereo_gains_sum_to_one() {
        let steps = [-1.0, -0.6, -0.2, 0.0, 0.2, 0.6, 1.0];
        for spread in steps {
            for position in steps {
                let (left, right) = stereo_gains(spread, position);
                assert!((left + right - 1.0).abs() < 1e-12);
            }
        }
        assert_eq!(stereo_gains(1.0, -1.0), (1.0, 0.0));
    }

    #[test]
    fn resonator_output_stays_finite() {
        let mut resonator = BodyResonator::new(44_100);
        let mut samples: Vec<f64> = (0..44_100)
            .map(|n| if n < 400 { ((n * 37 % 17) as f64 / 8.5) - 1.0 } else { 0.0 })
            .collect();
        resonator.process(&mut samples);
        assert!(samples.iter().all(|s| s.is_finite() && s.abs() < 10.0));
    }
}
