use std::thread::{self, JoinHandle};

use tracing::info;

use crate::{
    AudioOutput, Guitar, GuitarError, Result, ScheduleConfig, SchedulerState, SharedOptions,
    StopSignal, StrumScheduler,
};

/// Everything handed back once playback has stopped.
#[derive(Debug)]
pub struct PlaybackSummary<O> {
    pub state: SchedulerState,
    pub output: O,
    pub guitar: Guitar,
}

/// Runs the strum scheduler on a background thread.
///
/// The player owns the guitar and the output while it runs. The control
/// surface keeps a [`SharedOptions`] handle and may change options at any
/// time; each pluck reads a fresh snapshot.
pub struct Player<O> {
    options: SharedOptions,
    stop: StopSignal,
    worker: Option<JoinHandle<Result<PlaybackSummary<O>>>>,
}

impl<O> Player<O>
where
    O: AudioOutput + Send + 'static,
{
    /// Starts strumming with the first bar beginning at the output's current time.
    pub fn start(
        mut guitar: Guitar,
        mut output: O,
        options: SharedOptions,
        schedule: ScheduleConfig,
    ) -> Result<Self> {
        schedule.validate()?;
        let stop = StopSignal::new();
        let worker_stop = stop.clone();
        let worker_options = options.clone();

        let worker = thread::Builder::new()
            .name("strum-scheduler".to_string())
            .spawn(move || -> Result<PlaybackSummary<O>> {
                let mut scheduler = StrumScheduler::new(output.now(), schedule);
                scheduler.run(&mut guitar, &mut output, &worker_options, &worker_stop)?;
                Ok(PlaybackSummary {
                    state: scheduler.state().clone(),
                    output,
                    guitar,
                })
            })?;

        info!("player started");
        Ok(Self {
            options,
            stop,
            worker: Some(worker),
        })
    }

    /// Control-surface handle over the live synthesis options.
    pub fn options(&self) -> &SharedOptions {
        &self.options
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .map(|worker| !worker.is_finished())
            .unwrap_or(false)
    }

    /// Stops re-arming the scheduler and waits for its thread. Notes already
    /// handed to the output stay scheduled.
    pub fn stop(mut self) -> Result<PlaybackSummary<O>> {
        self.stop.stop()?;
        let worker = self
            .worker
            .take()
            .ok_or_else(|| GuitarError::msg("player has already been stopped"))?;
        let summary = worker
            .join()
            .map_err(|_| GuitarError::msg("strum scheduler thread panicked"))??;
        info!(steps = summary.state.sequence_number, "player stopped");
        Ok(summary)
    }
}

impl<O> Drop for Player<O> {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.stop.stop();
        }
    }
}

impl<O> std::fmt::Debug for Player<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("running", &self.worker.is_some())
            .finish()
    }
}
