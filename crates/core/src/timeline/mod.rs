//! Playback clock and the lookahead strum scheduler.
//!
//! The scheduler walks a fixed 13-step strum pattern. Every step renders its
//! notes straight away and then sleeps until shortly before the next event is
//! due. The sleep is shortened by a precache budget that grows whenever an
//! event lands close to the clock, so rendering stays ahead of playback.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    AudioOutput, Chord, Guitar, GuitarError, OptionsSource, Result, ScheduleConfig, StrumEvent,
    StrumStyle, PROGRESSION,
};

/// Rhythmic units in one bar of the pattern.
pub const BAR_UNITS: f64 = 32.0;

/// Monotonic clock in seconds. Either follows wall time or only moves when
/// advanced by hand.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    origin: Option<Instant>,
    offset_seconds: f64,
}

impl PlaybackClock {
    /// Clock that follows wall time from now on.
    pub fn start() -> Self {
        Self {
            origin: Some(Instant::now()),
            offset_seconds: 0.0,
        }
    }

    /// Clock frozen at zero until [`PlaybackClock::advance`] is called.
    pub fn manual() -> Self {
        Self {
            origin: None,
            offset_seconds: 0.0,
        }
    }

    pub fn reset(&mut self) {
        if self.origin.is_some() {
            self.origin = Some(Instant::now());
        }
        self.offset_seconds = 0.0;
    }

    pub fn advance(&mut self, delta: f64) {
        self.offset_seconds = (self.offset_seconds + delta).max(0.0);
    }

    pub fn elapsed_seconds(&self) -> f64 {
        let wall = self
            .origin
            .map(|origin| origin.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        wall + self.offset_seconds
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_secs_f64(self.elapsed_seconds())
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::manual()
    }
}

/// What a pattern step plays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepAction {
    /// Full chord strum.
    Strum { downstroke: bool, velocity: f64 },
    /// Individual strings instead of a strum; closes the bar.
    Plucks(&'static [SinglePluck]),
}

/// One string played on its own inside a [`StepAction::Plucks`] step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SinglePluck {
    pub string: usize,
    pub offset_units: f64,
    pub velocity: f64,
}

/// A step of the strum pattern, offset from the start of its bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrumStep {
    pub offset_units: f64,
    pub action: StepAction,
}

impl StrumStep {
    const fn down(offset_units: f64) -> Self {
        Self {
            offset_units,
            action: StepAction::Strum {
                downstroke: true,
                velocity: 1.0,
            },
        }
    }

    const fn up(offset_units: f64) -> Self {
        Self {
            offset_units,
            action: StepAction::Strum {
                downstroke: false,
                velocity: 0.8,
            },
        }
    }
}

const BAR_END_PLUCKS: [SinglePluck; 2] = [
    SinglePluck {
        string: 2,
        offset_units: 31.0,
        velocity: 0.7,
    },
    SinglePluck {
        string: 1,
        offset_units: 31.5,
        velocity: 0.7,
    },
];

/// The one-bar strum pattern.
pub const STRUM_PATTERN: [StrumStep; 13] = [
    StrumStep::down(0.0),
    StrumStep::down(4.0),
    StrumStep::up(6.0),
    StrumStep::up(10.0),
    StrumStep::down(12.0),
    StrumStep::up(14.0),
    StrumStep::down(16.0),
    StrumStep::down(20.0),
    StrumStep::up(22.0),
    StrumStep::up(26.0),
    StrumStep::down(28.0),
    StrumStep::up(30.0),
    StrumStep {
        offset_units: 31.0,
        action: StepAction::Plucks(&BAR_END_PLUCKS),
    },
];

/// State carried from one scheduler activation to the next.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerState {
    pub sequence_number: u64,
    pub block_start_time: f64,
    pub chord_index: usize,
    pub precache_budget: f64,
}

/// Outcome of one scheduler step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub step: usize,
    pub chord: Chord,
    /// Start time of the last note the step scheduled.
    pub event_time: f64,
    pub notes: usize,
    pub next_fire_delay: Duration,
}

/// Seconds to wait before the next activation; never negative.
pub fn next_fire_delay(event_time: f64, now: f64, precache_budget: f64) -> f64 {
    (event_time - now - precache_budget).max(0.0)
}

/// Cyclic strum sequencer over the fixed four-chord progression.
#[derive(Debug, Clone)]
pub struct StrumScheduler {
    state: SchedulerState,
    config: ScheduleConfig,
    progression: [Chord; 4],
}

impl StrumScheduler {
    /// Starts the pattern at step 0 of the first chord, with the bar
    /// beginning at `start_time`.
    pub fn new(start_time: f64, config: ScheduleConfig) -> Self {
        Self {
            state: SchedulerState {
                sequence_number: 0,
                block_start_time: start_time,
                chord_index: 0,
                precache_budget: 0.0,
            },
            config,
            progression: PROGRESSION,
        }
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    pub fn bar_seconds(&self) -> f64 {
        BAR_UNITS * self.config.time_unit_seconds
    }

    /// Index into [`STRUM_PATTERN`] the next step will play.
    pub fn current_step(&self) -> usize {
        (self.state.sequence_number % STRUM_PATTERN.len() as u64) as usize
    }

    /// Plays the current pattern step and works out how long to wait before
    /// the next one.
    pub fn step<O, S>(
        &mut self,
        guitar: &mut Guitar,
        output: &mut O,
        options: &S,
    ) -> Result<StepReport>
    where
        O: AudioOutput + ?Sized,
        S: OptionsSource + ?Sized,
    {
        let step = self.current_step();
        let pattern = STRUM_PATTERN[step];
        let chord = self.progression[self.state.chord_index];
        let unit = self.config.time_unit_seconds;
        let bar_start = self.state.block_start_time;

        let (event_time, notes) = match pattern.action {
            StepAction::Strum {
                downstroke,
                velocity,
            } => {
                let time = bar_start + unit * pattern.offset_units;
                let event = StrumEvent {
                    time,
                    downstroke,
                    velocity,
                    chord,
                };
                let plucks = guitar.strum_chord(output, event, StrumStyle::Normal, options)?;
                (time, plucks.len())
            }
            StepAction::Plucks(plucks) => {
                let mut last = bar_start + unit * pattern.offset_units;
                let mut notes = 0;
                for pluck in plucks {
                    let time = bar_start + unit * pluck.offset_units;
                    if let Some(fret) = chord.fret(pluck.string) {
                        guitar.pluck_string(
                            output,
                            pluck.string,
                            time,
                            pluck.velocity,
                            fret,
                            options,
                        )?;
                        notes += 1;
                    }
                    last = last.max(time);
                }
                self.state.chord_index = (self.state.chord_index + 1) % self.progression.len();
                self.state.block_start_time += self.bar_seconds();
                (last, notes)
            }
        };
        self.state.sequence_number += 1;

        let now = output.now();
        if event_time < now {
            warn!(event_time, now, "strum scheduled behind the playback clock");
        }
        if event_time - now < self.config.lookahead_window_seconds {
            self.state.precache_budget += self.config.precache_step_seconds;
        }
        let delay = next_fire_delay(event_time, now, self.state.precache_budget);
        let next_fire_delay = Duration::try_from_secs_f64(delay).map_err(|_| {
            GuitarError::msg(format!(
                "next strum is {delay} s away, too far ahead to wait for"
            ))
        })?;

        debug!(
            step,
            chord = chord.name,
            event_time,
            notes,
            delay,
            precache = self.state.precache_budget,
            "scheduler step"
        );

        Ok(StepReport {
            step,
            chord,
            event_time,
            notes,
            next_fire_delay,
        })
    }

    /// Runs steps until `stop` is raised, waiting out each step's delay on
    /// the stop signal so a stop request cuts the wait short.
    pub fn run<O, S>(
        &mut self,
        guitar: &mut Guitar,
        output: &mut O,
        options: &S,
        stop: &StopSignal,
    ) -> Result<()>
    where
        O: AudioOutput + ?Sized,
        S: OptionsSource + ?Sized,
    {
        info!(start = self.state.block_start_time, "strum scheduler running");
        while !stop.is_stopped()? {
            let report = self.step(guitar, output, options)?;
            if stop.wait(report.next_fire_delay)? {
                break;
            }
        }
        info!(steps = self.state.sequence_number, "strum scheduler stopped");
        Ok(())
    }
}

/// Cancellation flag with a timed wait that wakes as soon as the flag is set.
#[derive(Clone, Default)]
pub struct StopSignal {
    shared: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) -> Result<()> {
        let (flag, condvar) = &*self.shared;
        *Self::lock(flag)? = true;
        condvar.notify_all();
        Ok(())
    }

    pub fn is_stopped(&self) -> Result<bool> {
        Ok(*Self::lock(&self.shared.0)?)
    }

    /// Waits up to `timeout`; returns whether a stop was requested.
    pub fn wait(&self, timeout: Duration) -> Result<bool> {
        let (flag, condvar) = &*self.shared;
        let guard = Self::lock(flag)?;
        let (guard, _) = condvar
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .map_err(|_| GuitarError::msg("stop signal has been poisoned"))?;
        Ok(*guard)
    }

    fn lock(flag: &Mutex<bool>) -> Result<MutexGuard<'_, bool>> {
        flag.lock()
            .map_err(|_| GuitarError::msg("stop signal has been poisoned"))
    }
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal").finish()
    }
}
