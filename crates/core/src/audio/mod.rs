use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::{GuitarError, PlaybackClock, Result};

/// Two-channel block of `f32` samples at a fixed sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoBuffer {
    sample_rate: u32,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl StereoBuffer {
    /// Allocates a silent buffer.
    pub fn new(sample_count: usize, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            left: vec![0.0; sample_count],
            right: vec![0.0; sample_count],
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.len() as f64 / self.sample_rate.max(1) as f64
    }

    pub fn left(&self) -> &[f32] {
        &self.left
    }

    pub fn right(&self) -> &[f32] {
        &self.right
    }

    /// Largest absolute sample across both channels.
    pub fn peak(&self) -> f32 {
        self.left
            .iter()
            .chain(&self.right)
            .fold(0.0f32, |peak, sample| peak.max(sample.abs()))
    }

    /// Overwrites both channels with `mono` scaled by a per-channel gain.
    pub fn write_mono(&mut self, mono: &[f64], gain_left: f64, gain_right: f64) -> Result<()> {
        if mono.len() != self.len() {
            return Err(GuitarError::BufferMismatch {
                expected: self.len(),
                actual: mono.len(),
            });
        }
        for ((left, right), sample) in self.left.iter_mut().zip(&mut self.right).zip(mono) {
            *left = (sample * gain_left) as f32;
            *right = (sample * gain_right) as f32;
        }
        Ok(())
    }
}

/// Playback sink the synthesiser hands finished notes to.
///
/// Implementations own the device (or whatever stands in for it) and its
/// clock; the core only ever schedules buffers and reads the time.
pub trait AudioOutput {
    fn sample_rate(&self) -> u32;

    /// Allocates a buffer the output is able to play.
    fn create_stereo_buffer(&self, sample_count: usize, sample_rate: u32) -> Result<StereoBuffer> {
        if sample_count == 0 {
            return Err(GuitarError::InvalidInput(
                "stereo buffers must hold at least one sample",
            ));
        }
        Ok(StereoBuffer::new(sample_count, sample_rate))
    }

    /// Takes ownership of `buffer` and plays it from `start_time` seconds on
    /// the output clock.
    fn schedule(&mut self, buffer: StereoBuffer, start_time: f64) -> Result<()>;

    /// Current position of the output clock in seconds.
    fn now(&self) -> f64;
}

impl<O: AudioOutput + ?Sized> AudioOutput for Box<O> {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn create_stereo_buffer(&self, sample_count: usize, sample_rate: u32) -> Result<StereoBuffer> {
        (**self).create_stereo_buffer(sample_count, sample_rate)
    }

    fn schedule(&mut self, buffer: StereoBuffer, start_time: f64) -> Result<()> {
        (**self).schedule(buffer, start_time)
    }

    fn now(&self) -> f64 {
        (**self).now()
    }
}

/// A buffer handed to an output together with its start time.
#[derive(Debug, Clone)]
pub struct ScheduledNote {
    pub start_time: f64,
    pub buffer: StereoBuffer,
}

impl ScheduledNote {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.buffer.duration_seconds()
    }
}

/// In-memory output that keeps scheduled notes until they have been played
/// out through [`MixerOutput::drain_until`], and can mix any window of the
/// retained timeline down to a stereo block.
#[derive(Debug)]
pub struct MixerOutput {
    sample_rate: u32,
    clock: PlaybackClock,
    notes: Vec<ScheduledNote>,
    drained_samples: u64,
    scheduled_total: u64,
}

impl MixerOutput {
    pub fn new(sample_rate: u32, clock: PlaybackClock) -> Self {
        Self {
            sample_rate,
            clock,
            notes: Vec::new(),
            drained_samples: 0,
            scheduled_total: 0,
        }
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut PlaybackClock {
        &mut self.clock
    }

    /// Retained notes in the order they were scheduled.
    pub fn scheduled(&self) -> &[ScheduledNote] {
        &self.notes
    }

    /// Number of notes ever scheduled, including retired ones.
    pub fn scheduled_total(&self) -> u64 {
        self.scheduled_total
    }

    /// Timeline position up to which audio has been drained.
    pub fn drained_until(&self) -> f64 {
        self.drained_samples as f64 / self.sample_rate.max(1) as f64
    }

    /// Mixes everything between the previous drain and `time`, then releases
    /// the notes that have finished by `time`.
    ///
    /// Returns an empty block when `time` is not past the previous drain.
    pub fn drain_until(&mut self, time: f64) -> StereoBuffer {
        let rate = self.sample_rate as f64;
        let end = (time.max(0.0) * rate).floor() as u64;
        if end <= self.drained_samples {
            return StereoBuffer::new(0, self.sample_rate);
        }

        let start = self.drained_samples;
        let block = self.mix(start as f64 / rate, (end - start) as usize);
        self.drained_samples = end;
        let retired = self.retire_before(end as f64 / rate);
        debug!(until = time, retired, retained = self.notes.len(), "drained mixer");
        block
    }

    /// Start of the first note to end of the last one, if anything was scheduled.
    pub fn span(&self) -> Option<(f64, f64)> {
        let start = self.notes.iter().map(|n| n.start_time).reduce(f64::min)?;
        let end = self.notes.iter().map(ScheduledNote::end_time).reduce(f64::max)?;
        Some((start, end))
    }

    /// Sums every note overlapping `[start_time, start_time + sample_count / rate)`.
    pub fn mix(&self, start_time: f64, sample_count: usize) -> StereoBuffer {
        let rate = self.sample_rate as f64;
        let mut block = StereoBuffer::new(sample_count, self.sample_rate);
        let block_start = (start_time * rate).round() as i64;
        let block_end = block_start + sample_count as i64;

        for note in &self.notes {
            let note_start = (note.start_time * rate).round() as i64;
            let note_end = note_start + note.buffer.len() as i64;
            let from = block_start.max(note_start);
            let to = block_end.min(note_end);
            if from >= to {
                continue;
            }

            let src = (from - note_start) as usize..(to - note_start) as usize;
            let dst = (from - block_start) as usize;
            let dst_left = &mut block.left[dst..dst + src.len()];
            for (out, sample) in dst_left.iter_mut().zip(&note.buffer.left[src.clone()]) {
                *out += sample;
            }
            let dst_right = &mut block.right[dst..dst + src.len()];
            for (out, sample) in dst_right.iter_mut().zip(&note.buffer.right[src]) {
                *out += sample;
            }
        }

        block
    }

    /// Drops notes that finished before `time`.
    pub fn retire_before(&mut self, time: f64) -> usize {
        let before = self.notes.len();
        self.notes.retain(|note| note.end_time() >= time);
        before - self.notes.len()
    }
}

impl AudioOutput for MixerOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn schedule(&mut self, buffer: StereoBuffer, start_time: f64) -> Result<()> {
        if buffer.sample_rate() != self.sample_rate {
            return Err(GuitarError::msg(format!(
                "buffer rendered at {} Hz cannot play on a {} Hz output",
                buffer.sample_rate(),
                self.sample_rate
            )));
        }
        debug!(start_time, samples = buffer.len(), "scheduled buffer");
        self.notes.push(ScheduledNote { start_time, buffer });
        self.scheduled_total += 1;
        Ok(())
    }

    fn now(&self) -> f64 {
        self.clock.elapsed_seconds()
    }
}

/// Shared, thread-safe handle over an output so one thread can schedule into
/// it while another inspects it.
pub struct SharedOutput<O> {
    shared: Arc<Mutex<O>>,
    sample_rate: u32,
}

impl<O: AudioOutput> SharedOutput<O> {
    pub fn new(output: O) -> Self {
        let sample_rate = output.sample_rate();
        Self {
            shared: Arc::new(Mutex::new(output)),
            sample_rate,
        }
    }

    /// Locks the output for inspection.
    pub fn lock(&self) -> Result<MutexGuard<'_, O>> {
        self.shared
            .lock()
            .map_err(|_| GuitarError::msg("audio output has been poisoned"))
    }
}

impl<O> Clone for SharedOutput<O> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            sample_rate: self.sample_rate,
        }
    }
}

impl<O: AudioOutput> AudioOutput for SharedOutput<O> {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn schedule(&mut self, buffer: StereoBuffer, start_time: f64) -> Result<()> {
        self.lock()?.schedule(buffer, start_time)
    }

    fn now(&self) -> f64 {
        match self.shared.lock() {
            Ok(output) => output.now(),
            Err(poisoned) => poisoned.into_inner().now(),
        }
    }
}

impl<O> std::fmt::Debug for SharedOutput<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedOutput")
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(value: f32, sample_count: usize, sample_rate: u32) -> StereoBuffer {
        let mut buffer = StereoBuffer::new(sample_count, sample_rate);
        buffer
            .write_mono(&vec![value as f64; sample_count], 1.0, 0.5)
            .unwrap();
        buffer
    }

    #[test]
    fn write_mono_rejects_length_mismatch() {
        let mut buffer = StereoBuffer::new(4, 100);
        let err = buffer.write_mono(&[0.0; 3], 1.0, 1.0).unwrap_err();
        assert!(matches!(
            err,
            GuitarError::BufferMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn mixes_overlapping_notes() {
        let mut output = MixerOutput::new(100, PlaybackClock::manual());
        output.schedule(constant(1.0, 100, 100), 0.0).unwrap();
        output.schedule(constant(0.5, 100, 100), 0.5).unwrap();

        let block = output.mix(0.0, 200);
        assert_eq!(block.left()[10], 1.0);
        assert_eq!(block.left()[60], 1.5);
        assert_eq!(block.right()[60], 0.75);
        assert_eq!(block.left()[120], 0.5);
        assert_eq!(block.left()[160], 0.0);
        assert_eq!(output.span(), Some((0.0, 1.5)));
    }

    #[test]
    fn rejects_foreign_sample_rates() {
        let mut output = MixerOutput::new(100, PlaybackClock::manual());
        assert!(output.schedule(constant(1.0, 10, 200), 0.0).is_err());
        assert!(output.scheduled().is_empty());
    }

    #[test]
    fn reads_time_from_its_clock() {
        let mut output = MixerOutput::new(100, PlaybackClock::manual());
        output.clock_mut().advance(2.5);
        assert_eq!(output.now(), 2.5);
    }

    #[test]
    fn retires_finished_notes() {
        let mut output = MixerOutput::new(100, PlaybackClock::manual());
        output.schedule(constant(1.0, 100, 100), 0.0).unwrap();
        output.schedule(constant(1.0, 100, 100), 3.0).unwrap();
        assert_eq!(output.retire_before(2.0), 1);
        assert_eq!(output.scheduled().len(), 1);
    }

    #[test]
    fn drain_mixes_each_window_once_and_releases_played_notes() {
        let mut output = MixerOutput::new(100, PlaybackClock::manual());
        output.schedule(constant(1.0, 100, 100), 0.0).unwrap();
        output.schedule(constant(0.5, 100, 100), 0.5).unwrap();

        let first = output.drain_until(0.75);
        assert_eq!(first.len(), 75);
        assert_eq!(first.left()[10], 1.0);
        assert_eq!(first.left()[60], 1.5);
        assert_eq!(output.scheduled().len(), 2);

        assert!(output.drain_until(0.5).is_empty());

        let second = output.drain_until(1.2);
        assert_eq!(second.len(), 45);
        assert_eq!(second.left()[0], 1.5);
        assert_eq!(second.left()[30], 0.5);
        assert_eq!(output.scheduled().len(), 1);
        assert_eq!(output.scheduled_total(), 2);
        assert!((output.drained_until() - 1.2).abs() < 1e-12);
    }

    #[test]
    fn shared_output_schedules_into_inner() {
        let shared = SharedOutput::new(MixerOutput::new(100, PlaybackClock::manual()));
        let mut writer = shared.clone();
        writer.schedule(constant(0.2, 50, 100), 1.0).unwrap();

        let inner = shared.lock().unwrap();
        assert_eq!(inner.scheduled().len(), 1);
        assert_eq!(inner.scheduled()[0].start_time, 1.0);
    }

    #[test]
    fn refuses_empty_buffers() {
        let output = MixerOutput::new(100, PlaybackClock::manual());
        assert!(output.create_stereo_buffer(0, 100).is_err());
        assert_eq!(output.create_stereo_buffer(10, 100).unwrap().len(), 10);
    }
}
