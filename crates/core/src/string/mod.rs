use rand::Rng;
use serde::Serialize;
use tracing::trace;

use crate::{
    noise, AudioOutput, GuitarError, PluckVoice, Result, SynthesisEngine, SynthesisOptions,
};

/// Number of strings on the instrument.
pub const STRING_COUNT: usize = 6;

/// Reference pitch A0 in Hz.
const A0_HZ: f64 = 27.5;

/// Rank offset and span that map the playable range onto roughly [0, 1] for
/// the damping curve.
const DAMPING_RANK_OFFSET: f64 = 19.0;
const DAMPING_RANK_SPAN: f64 = 44.0;

/// One open string of the tuning table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Tuning {
    pub string_index: usize,
    pub octave: i32,
    /// Semitones above C in the given octave.
    pub semitone: i32,
}

impl Tuning {
    pub const fn new(string_index: usize, octave: i32, semitone: i32) -> Self {
        Self {
            string_index,
            octave,
            semitone,
        }
    }
}

/// Standard tuning E2 A2 D3 G3 B3 E4.
pub const STANDARD_TUNING: [Tuning; STRING_COUNT] = [
    Tuning::new(0, 2, 4),
    Tuning::new(1, 2, 9),
    Tuning::new(2, 3, 2),
    Tuning::new(3, 3, 7),
    Tuning::new(4, 3, 11),
    Tuning::new(5, 4, 4),
];

/// Frequency of a note in the C-based octave numbering, rounded to 2 decimals.
pub fn tuned_frequency(octave: i32, semitone: i32) -> f64 {
    let c0_hz = A0_HZ * 2f64.powf(-9.0 / 12.0);
    let hz = c0_hz * 2f64.powf(octave as f64 + semitone as f64 / 12.0);
    (hz * 100.0).round() / 100.0
}

/// A single note request for one string.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PluckRequest {
    pub start_time: f64,
    pub velocity: f64,
    /// Semitones above the open string. Muted strings are never plucked.
    pub fret: u8,
}

/// One string of the instrument: fixed pitch, damping rank, stereo place and
/// the noise burst every pluck starts from.
#[derive(Debug, Clone)]
pub struct GuitarString {
    index: usize,
    base_frequency_hz: f64,
    semitone_index: i32,
    stereo_position: f64,
    seed_noise: Box<[f32]>,
}

impl GuitarString {
    /// Builds the string and draws its seed noise once.
    pub fn new<R: Rng + ?Sized>(tuning: Tuning, sample_rate: u32, rng: &mut R) -> Result<Self> {
        if tuning.string_index >= STRING_COUNT {
            return Err(GuitarError::InvalidString(tuning.string_index));
        }
        if !(0..12).contains(&tuning.semitone) {
            return Err(GuitarError::InvalidInput(
                "tuning semitone must lie within the octave (0..12)",
            ));
        }
        if sample_rate == 0 {
            return Err(GuitarError::InvalidInput("sample rate must be positive"));
        }

        let base_frequency_hz = tuned_frequency(tuning.octave, tuning.semitone);
        let seed_noise = noise::seed_noise(base_frequency_hz, sample_rate, rng)?;

        Ok(Self {
            index: tuning.string_index,
            base_frequency_hz,
            semitone_index: tuning.octave * 12 + tuning.semitone - 9,
            stereo_position: (tuning.string_index as f64 - 2.5) * 0.4,
            seed_noise: seed_noise.into_boxed_slice(),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn base_frequency_hz(&self) -> f64 {
        self.base_frequency_hz
    }

    pub fn semitone_index(&self) -> i32 {
        self.semitone_index
    }

    pub fn stereo_position(&self) -> f64 {
        self.stereo_position
    }

    pub fn seed_noise(&self) -> &[f32] {
        &self.seed_noise
    }

    pub fn note_frequency(&self, fret: u8) -> f64 {
        self.base_frequency_hz * 2f64.powf(fret as f64 / 12.0)
    }

    /// Pitch position on the damping curve; roughly [0, 1] across the neck.
    pub fn note_rank(&self, fret: u8) -> f64 {
        (self.semitone_index as f64 + fret as f64 - DAMPING_RANK_OFFSET) / DAMPING_RANK_SPAN
    }

    /// Feedback low-pass coefficient for a note, with a fresh random draw.
    pub fn smoothing_factor<R: Rng + ?Sized>(
        &self,
        fret: u8,
        options: &SynthesisOptions,
        rng: &mut R,
    ) -> f64 {
        self.smoothing_factor_with(fret, options, rng.gen::<f64>())
    }

    /// Damping curve with the random term supplied by the caller (`draw` in [0, 1)).
    pub fn smoothing_factor_with(&self, fret: u8, options: &SynthesisOptions, draw: f64) -> f64 {
        let damping = options.string_damping;
        let rank = self.note_rank(fret).max(0.0);
        damping
            + rank.sqrt() * (1.0 - damping) * 0.5
            + (1.0 - damping) * draw * options.string_damping_variation
    }

    /// Renders one note into a fresh one-second stereo buffer and hands it to
    /// `output` for playback at `request.start_time`.
    pub fn pluck<O, R>(
        &self,
        engine: &mut SynthesisEngine,
        output: &mut O,
        rng: &mut R,
        request: PluckRequest,
        options: &SynthesisOptions,
    ) -> Result<()>
    where
        O: AudioOutput + ?Sized,
        R: Rng + ?Sized,
    {
        let sample_rate = output.sample_rate();
        let sample_count = engine.note_samples(sample_rate);
        let mut buffer = output.create_stereo_buffer(sample_count, sample_rate)?;

        let voice = PluckVoice {
            hz: self.note_frequency(request.fret),
            smoothing_factor: self.smoothing_factor(request.fret, options, rng),
            velocity: request.velocity / 4.0,
            stereo_position: self.stereo_position,
        };
        trace!(
            string = self.index,
            fret = request.fret,
            hz = voice.hz,
            smoothing = voice.smoothing_factor,
            "rendering pluck"
        );

        engine.render_karplus_strong(&mut buffer, &self.seed_noise, &voice, options, rng)?;
        output.schedule(buffer, request.start_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MixerOutput, PlaybackClock};
    use rand::{rngs::StdRng, SeedableRng};

    fn strings(sample_rate: u32) -> Vec<GuitarString> {
        let mut rng = StdRng::seed_from_u64(3);
        STANDARD_TUNING
            .iter()
            .map(|tuning| GuitarString::new(*tuning, sample_rate, &mut rng).unwrap())
            .collect()
    }

    #[test]
    fn base_frequencies_match_standard_tuning() {
        let expected = [82.41, 110.0, 146.83, 196.0, 246.94, 329.63];
        for (string, hz) in strings(44_100).iter().zip(expected) {
            assert!(
                (string.base_frequency_hz() - hz).abs() <= 0.01,
                "string {} is {} Hz, expected {hz}",
                string.index(),
                string.base_frequency_hz()
            );
        }
    }

    #[test]
    fn frequencies_follow_closed_form() {
        for (tuning, string) in STANDARD_TUNING.iter().zip(strings(48_000)) {
            let c0 = 27.5 * 2f64.powf(-9.0 / 12.0);
            let exact = c0 * 2f64.powf(tuning.octave as f64 + tuning.semitone as f64 / 12.0);
            assert!((string.base_frequency_hz() - exact).abs() <= 0.01);
        }
    }

    #[test]
    fn stereo_positions_are_symmetric() {
        let positions: Vec<f64> = strings(44_100).iter().map(|s| s.stereo_position()).collect();
        for (low, high) in positions.iter().zip(positions.iter().rev()) {
            assert!((low + high).abs() < 1e-12);
        }
        assert!((positions[0] + 1.0).abs() < 1e-12);
        assert!((positions[5] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn seed_noise_is_one_open_period() {
        for string in strings(44_100) {
            let expected = (44_100.0 / string.base_frequency_hz()).round() as usize;
            assert_eq!(string.seed_noise().len(), expected);
        }
    }

    #[test]
    fn smoothing_is_monotonic_in_fret() {
        let options = SynthesisOptions::default();
        for string in strings(44_100) {
            let mut last = f64::MIN;
            for fret in 0..=12 {
                let factor = string.smoothing_factor_with(fret, &options, 0.5);
                assert!(factor >= last, "string {} fret {fret}", string.index());
                last = factor;
            }
        }
    }

    #[test]
    fn open_low_e_sits_at_curve_origin() {
        let options = SynthesisOptions::default();
        let low_e = &strings(44_100)[0];
        assert_eq!(low_e.note_rank(0), 0.0);
        assert_eq!(
            low_e.smoothing_factor_with(0, &options, 0.0),
            options.string_damping
        );
    }

    #[test]
    fn rejects_invalid_tuning() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            GuitarString::new(Tuning::new(6, 2, 4), 44_100, &mut rng),
            Err(GuitarError::InvalidString(6))
        ));
        assert!(GuitarString::new(Tuning::new(0, 2, 12), 44_100, &mut rng).is_err());
        assert!(GuitarString::new(Tuning::new(0, 2, 4), 0, &mut rng).is_err());
    }

    #[test]
    fn pluck_schedules_one_buffer() {
        let mut rng = StdRng::seed_from_u64(5);
        let string = GuitarString::new(STANDARD_TUNING[1], 8_000, &mut rng).unwrap();
        let mut engine = SynthesisEngine::new();
        let mut output = MixerOutput::new(8_000, PlaybackClock::manual());
        let request = PluckRequest {
            start_time: 0.25,
            velocity: 1.0,
            fret: 2,
        };

        string
            .pluck(&mut engine, &mut output, &mut rng, request, &SynthesisOptions::default())
            .unwrap();

        let notes = output.scheduled();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].start_time, 0.25);
        assert_eq!(notes[0].buffer.len(), 8_000);
    }
}
