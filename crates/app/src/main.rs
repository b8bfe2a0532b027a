use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use guitar_synth_core::{
    analysis, AppConfig, AudioOutput, ChordLibrary, Guitar, GuitarError, LevelMeter, MixerOutput,
    NoteAnalyser, PlaybackClock, Player, SharedOptions, SharedOutput, SynthesisEngine,
    OPTION_RANGES,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// How often `play` mixes down and releases the notes that have finished.
const DRAIN_INTERVAL: Duration = Duration::from_millis(500);

fn main() -> guitar_synth_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            seconds,
            common,
        } => run_play(seconds, &common),
        Commands::Pluck {
            string,
            fret,
            velocity,
            voice,
            decay,
            common,
        } => run_pluck(string, fret, velocity, voice, decay, &common),
        Commands::Chords => run_chords(),
    }
}

fn run_play(seconds: f64, common: &CommonArgs) -> guitar_synth_core::Result<()> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(GuitarError::InvalidInput("--seconds must be a positive number"));
    }
    let (config, options) = common.load()?;
    let rate = config.audio.sample_rate;
    tracing::info!(seconds, rate, "starting strum playback");

    let guitar = common.guitar(rate)?;
    let output = SharedOutput::new(MixerOutput::new(rate, PlaybackClock::start()));
    let player = Player::start(guitar, output.clone(), options, config.schedule)?;

    let deadline = Instant::now() + Duration::from_secs_f64(seconds);
    let mut left = LevelMeter::default();
    let mut right = LevelMeter::default();
    let mut analyser = NoteAnalyser::new();
    let mut last_block = None;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        std::thread::sleep(remaining.min(DRAIN_INTERVAL));

        let block = {
            let mut mixer = output.lock()?;
            let now = mixer.now();
            mixer.drain_until(now)
        };
        left.push(block.left());
        right.push(block.right());
        if block.len() >= 2 {
            last_block = Some(json!({
                "left": analyser.analyse(block.left(), rate)?,
                "right": analyser.analyse(block.right(), rate)?,
            }));
        }
    }
    let summary = player.stop()?;

    let mixer = output.lock()?;
    tracing::info!(
        notes = mixer.scheduled_total(),
        retained = mixer.scheduled().len(),
        steps = summary.state.sequence_number,
        "playback finished"
    );

    let level = |meter: &LevelMeter| {
        json!({
            "duration_seconds": meter.sample_count() as f64 / rate as f64,
            "rms": meter.rms(),
            "peak": meter.peak(),
        })
    };
    let report = json!({
        "scheduler": summary.state,
        "notes_scheduled": mixer.scheduled_total(),
        "notes_pending": mixer.scheduled().len(),
        "rendered_until": mixer.span().map(|(_, end)| end),
        "played": { "left": level(&left), "right": level(&right) },
        "last_block": last_block,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_pluck(
    string: usize,
    fret: u8,
    velocity: f64,
    voice: Voice,
    decay: f64,
    common: &CommonArgs,
) -> guitar_synth_core::Result<()> {
    let (config, options) = common.load()?;
    let rate = config.audio.sample_rate;
    let mut guitar = common.guitar(rate)?;
    let mut output = MixerOutput::new(rate, PlaybackClock::manual());
    let hz = guitar.string(string)?.note_frequency(fret);
    tracing::info!(string, fret, hz, ?voice, "rendering single note");

    match voice {
        Voice::Karplus => {
            guitar.pluck_string(&mut output, string, 0.0, velocity, fret, &options)?;
        }
        Voice::Sine => {
            let mut engine = SynthesisEngine::new();
            let mut buffer = output.create_stereo_buffer(engine.note_samples(rate), rate)?;
            engine.render_decayed_sine(&mut buffer, hz, velocity / 4.0, decay)?;
            output.schedule(buffer, 0.0)?;
        }
    }

    let note = output
        .scheduled()
        .first()
        .ok_or_else(|| GuitarError::msg("no note was rendered"))?;
    let report = json!({
        "string": string,
        "fret": fret,
        "hz": hz,
        "left": analysis::analyse(note.buffer.left(), rate)?,
        "right": analysis::analyse(note.buffer.right(), rate)?,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_chords() -> guitar_synth_core::Result<()> {
    println!("{}", serde_json::to_string_pretty(ChordLibrary::all())?);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_setting(raw: &str) -> Result<(String, f64), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{raw}`"))?;
    let name = name.trim().replace('-', "_");
    if !OPTION_RANGES.iter().any(|range| range.name == name) {
        let known: Vec<&str> = OPTION_RANGES.iter().map(|range| range.name).collect();
        return Err(format!("unknown option `{name}` (known: {})", known.join(", ")));
    }
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|err| format!("invalid value for `{name}`: {err}"))?;
    Ok((name, value))
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Karplus-Strong guitar strummer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Strum the chord progression in real time for a while, then report.
    Play {
        /// Wall-clock seconds to keep the scheduler running.
        #[arg(short, long, default_value_t = 8.0)]
        seconds: f64,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Render a single note and print its analysis.
    Pluck {
        /// String index, 0 (low E) to 5 (high E).
        #[arg(short, long, default_value_t = 1)]
        string: usize,
        #[arg(short, long, default_value_t = 0)]
        fret: u8,
        #[arg(long, default_value_t = 1.0)]
        velocity: f64,
        #[arg(long, value_enum, default_value_t = Voice::Karplus)]
        voice: Voice,
        /// Decay rate of the sine voice, in octaves of level per second.
        #[arg(long, default_value_t = 3.0)]
        decay: f64,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// List the chord library.
    Chords,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Voice {
    Karplus,
    Sine,
}

#[derive(clap::Args, Debug)]
struct CommonArgs {
    /// JSON preset with audio, synthesis and schedule settings.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Seed for reproducible noise and strum timing.
    #[arg(long)]
    seed: Option<u64>,
    /// Override a synthesis option, e.g. `--set string_damping=0.3`.
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_setting)]
    settings: Vec<(String, f64)>,
}

impl CommonArgs {
    fn load(&self) -> guitar_synth_core::Result<(AppConfig, SharedOptions)> {
        let config = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };
        let options = SharedOptions::new(config.synthesis);
        for (name, value) in &self.settings {
            options.set(name, *value)?;
        }
        Ok((config, options))
    }

    fn guitar(&self, sample_rate: u32) -> guitar_synth_core::Result<Guitar> {
        match self.seed {
            Some(seed) => Guitar::with_seed(sample_rate, seed),
            None => Guitar::new(sample_rate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_settings() {
        assert_eq!(
            parse_setting("string-damping=0.3").unwrap(),
            ("string_damping".to_string(), 0.3)
        );
        assert!(parse_setting("string_damping").is_err());
        assert!(parse_setting("loudness=1").is_err());
        assert!(parse_setting("stereo_spread=wide").is_err());
    }

    #[test]
    fn cli_accepts_repeated_settings() {
        let cli = Cli::try_parse_from([
            "guitar-synth",
            "pluck",
            "--string",
            "3",
            "--set",
            "stereo_spread=1",
            "--set",
            "string_tension=0.5",
        ])
        .unwrap();
        match cli.command {
            Commands::Pluck { string, common, .. } => {
                assert_eq!(string, 3);
                assert_eq!(common.settings.len(), 2);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
