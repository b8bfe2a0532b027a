use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use tracing::debug;

use crate::{
    AudioOutput, Chord, GuitarError, GuitarString, OptionsSource, PluckRequest, Result,
    SynthesisEngine, STANDARD_TUNING,
};

/// Upper bound of the random per-string delay of a strum, in seconds.
const STRUM_JITTER_SECONDS: f64 = 1.0 / 128.0;
/// Extra per-string delay of a slow strum, in seconds.
const SLOW_STRUM_SECONDS: f64 = 0.1;

/// How quickly the hand travels across the strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrumStyle {
    #[default]
    Normal,
    Slow,
}

/// A chord strum request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrumEvent {
    pub time: f64,
    pub downstroke: bool,
    pub velocity: f64,
    pub chord: Chord,
}

/// Record of one note handed to the output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PluckEvent {
    pub string: usize,
    pub fret: u8,
    pub start_time: f64,
    pub velocity: f64,
}

/// Six strings in standard tuning sharing one synthesis engine.
#[derive(Debug)]
pub struct Guitar {
    sample_rate: u32,
    strings: Vec<GuitarString>,
    engine: SynthesisEngine,
    rng: StdRng,
}

impl Guitar {
    /// Builds the instrument with an entropy-seeded random source.
    pub fn new(sample_rate: u32) -> Result<Self> {
        Self::with_rng(sample_rate, StdRng::from_entropy())
    }

    /// Builds the instrument with a reproducible random source.
    pub fn with_seed(sample_rate: u32, seed: u64) -> Result<Self> {
        Self::with_rng(sample_rate, StdRng::seed_from_u64(seed))
    }

    fn with_rng(sample_rate: u32, mut rng: StdRng) -> Result<Self> {
        let strings = STANDARD_TUNING
            .iter()
            .map(|tuning| GuitarString::new(*tuning, sample_rate, &mut rng))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            sample_rate,
            strings,
            engine: SynthesisEngine::new(),
            rng,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn strings(&self) -> &[GuitarString] {
        &self.strings
    }

    pub fn string(&self, index: usize) -> Result<&GuitarString> {
        self.strings
            .get(index)
            .ok_or(GuitarError::InvalidString(index))
    }

    /// Plucks a single string, reading the options at call time.
    pub fn pluck_string<O, S>(
        &mut self,
        output: &mut O,
        index: usize,
        start_time: f64,
        velocity: f64,
        fret: u8,
        options: &S,
    ) -> Result<PluckEvent>
    where
        O: AudioOutput + ?Sized,
        S: OptionsSource + ?Sized,
    {
        if output.sample_rate() != self.sample_rate {
            return Err(GuitarError::msg(format!(
                "guitar tuned for {} Hz cannot play on a {} Hz output",
                self.sample_rate,
                output.sample_rate()
            )));
        }
        let string = self
            .strings
            .get(index)
            .ok_or(GuitarError::InvalidString(index))?;
        let snapshot = options.snapshot()?;
        let request = PluckRequest {
            start_time,
            velocity,
            fret,
        };
        string.pluck(&mut self.engine, output, &mut self.rng, request, &snapshot)?;

        Ok(PluckEvent {
            string: index,
            fret,
            start_time,
            velocity,
        })
    }

    /// Strums `event.chord` across the strings, low to high for a downstroke
    /// and high to low for an upstroke. Muted strings are skipped but still
    /// take up their share of the hand's travel time.
    pub fn strum_chord<O, S>(
        &mut self,
        output: &mut O,
        event: StrumEvent,
        style: StrumStyle,
        options: &S,
    ) -> Result<Vec<PluckEvent>>
    where
        O: AudioOutput + ?Sized,
        S: OptionsSource + ?Sized,
    {
        let order: [usize; 6] = if event.downstroke {
            [0, 1, 2, 3, 4, 5]
        } else {
            [5, 4, 3, 2, 1, 0]
        };

        let mut time = event.time;
        let mut plucks = Vec::with_capacity(order.len());
        for string in order {
            if let Some(fret) = event.chord.fret(string) {
                let pluck =
                    self.pluck_string(output, string, time, event.velocity, fret, options)?;
                plucks.push(pluck);
            }
            time += self.rng.gen_range(0.0..STRUM_JITTER_SECONDS);
            if style == StrumStyle::Slow {
                time += SLOW_STRUM_SECONDS;
            }
        }

        debug!(
            chord = event.chord.name,
            downstroke = event.downstroke,
            time = event.time,
            notes = plucks.len(),
            "strummed chord"
        );
        Ok(plucks)
    }
}
