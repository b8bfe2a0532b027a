//! Core library for the guitar strum synthesiser.
//!
//! Six Karplus-Strong strings in standard tuning render one-second notes on
//! demand, and a lookahead scheduler strums a fixed pattern over a four-chord
//! progression, keeping rendered notes ahead of the playback clock. Audio
//! devices stay outside the crate: everything is handed to an
//! [`AudioOutput`].

pub mod analysis;
pub mod audio;
pub mod chords;
pub mod config;
pub mod error;
pub mod guitar;
pub mod noise;
pub mod options;
pub mod player;
pub mod string;
pub mod synth;
pub mod timeline;

pub use analysis::{LevelMeter, NoteAnalyser, NoteAnalysis};
pub use audio::{AudioOutput, MixerOutput, ScheduledNote, SharedOutput, StereoBuffer};
pub use chords::{Chord, ChordLibrary, MUTED, PROGRESSION};
pub use config::{AppConfig, AudioConfig, ScheduleConfig};
pub use error::{GuitarError, Result};
pub use guitar::{Guitar, PluckEvent, StrumEvent, StrumStyle};
pub use options::{
    BodyResonance, OptionRange, OptionsSource, SharedOptions, SynthesisOptions, OPTION_RANGES,
};
pub use player::{PlaybackSummary, Player};
pub use string::{GuitarString, PluckRequest, Tuning, STANDARD_TUNING, STRING_COUNT};
pub use synth::{PluckVoice, SynthesisEngine, NOTE_SECONDS};
pub use timeline::{
    PlaybackClock, SchedulerState, StepAction, StepReport, StopSignal, StrumScheduler, StrumStep,
    STRUM_PATTERN,
};
