use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::{GuitarError, Result};

/// Optional body-resonance stage applied after the string loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyResonance {
    #[default]
    Off,
    /// Dual nonlinear resonator followed by a DC-removing high-pass.
    Resonate,
}

/// Inclusive range a control may take, as exposed by the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OptionRange {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
}

impl OptionRange {
    const fn new(name: &'static str, min: f64, max: f64) -> Self {
        Self { name, min, max }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }
}

/// Valid range of every numeric synthesis control.
pub const OPTION_RANGES: [OptionRange; 7] = [
    OptionRange::new("character_variation", 0.0, 1.0),
    OptionRange::new("string_damping", 0.1, 0.7),
    OptionRange::new("string_damping_variation", 0.0, 0.5),
    OptionRange::new("pluck_damping", 0.1, 0.9),
    OptionRange::new("pluck_damping_variation", 0.0, 0.5),
    OptionRange::new("string_tension", 0.0, 1.0),
    OptionRange::new("stereo_spread", 0.0, 1.0),
];

/// Live synthesis controls read by every pluck.
///
/// The engine trusts these values. Anything coming from outside the process
/// (config files, command line, UI) goes through [`SynthesisOptions::clamped`]
/// or [`SharedOptions`] first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisOptions {
    pub character_variation: f64,
    pub string_damping: f64,
    pub string_damping_variation: f64,
    pub pluck_damping: f64,
    pub pluck_damping_variation: f64,
    pub string_tension: f64,
    pub stereo_spread: f64,
    pub body: BodyResonance,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            character_variation: 0.5,
            string_damping: 0.5,
            string_damping_variation: 0.25,
            pluck_damping: 0.5,
            pluck_damping_variation: 0.25,
            string_tension: 0.0,
            stereo_spread: 0.2,
            body: BodyResonance::Off,
        }
    }
}

impl SynthesisOptions {
    /// Returns a copy with every numeric field forced into its documented range.
    pub fn clamped(mut self) -> Self {
        for range in OPTION_RANGES {
            if let Some(field) = self.field_mut(range.name) {
                *field = range.clamp(*field);
            }
        }
        self
    }

    /// Reads a control by its snake_case name.
    pub fn get(&self, name: &str) -> Result<f64> {
        self.field(name)
            .ok_or_else(|| GuitarError::msg(format!("unknown synthesis option `{name}`")))
    }

    /// Sets a control by name, clamping the value into its range.
    pub fn set(&mut self, name: &str, value: f64) -> Result<()> {
        let range = OPTION_RANGES
            .iter()
            .find(|range| range.name == name)
            .ok_or_else(|| GuitarError::msg(format!("unknown synthesis option `{name}`")))?;
        let clamped = range.clamp(value);
        if let Some(field) = self.field_mut(name) {
            *field = clamped;
        }
        Ok(())
    }

    fn field(&self, name: &str) -> Option<f64> {
        match name {
            "character_variation" => Some(self.character_variation),
            "string_damping" => Some(self.string_damping),
            "string_damping_variation" => Some(self.string_damping_variation),
            "pluck_damping" => Some(self.pluck_damping),
            "pluck_damping_variation" => Some(self.pluck_damping_variation),
            "string_tension" => Some(self.string_tension),
            "stereo_spread" => Some(self.stereo_spread),
            _ => None,
        }
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut f64> {
        match name {
            "character_variation" => Some(&mut self.character_variation),
            "string_damping" => Some(&mut self.string_damping),
            "string_damping_variation" => Some(&mut self.string_damping_variation),
            "pluck_damping" => Some(&mut self.pluck_damping),
            "pluck_damping_variation" => Some(&mut self.pluck_damping_variation),
            "string_tension" => Some(&mut self.string_tension),
            "stereo_spread" => Some(&mut self.stereo_spread),
            _ => None,
        }
    }
}

/// Anything a pluck can take a consistent snapshot of its options from.
pub trait OptionsSource {
    fn snapshot(&self) -> Result<SynthesisOptions>;
}

impl OptionsSource for SynthesisOptions {
    fn snapshot(&self) -> Result<SynthesisOptions> {
        Ok(*self)
    }
}

/// Thread-safe handle over the live options, shared between the control
/// surface (writer) and the player thread (reader).
#[derive(Clone, Default)]
pub struct SharedOptions {
    shared: Arc<Mutex<SynthesisOptions>>,
}

impl SharedOptions {
    pub fn new(options: SynthesisOptions) -> Self {
        Self {
            shared: Arc::new(Mutex::new(options.clamped())),
        }
    }

    /// Applies `change` and clamps the result before any pluck can observe it.
    pub fn update<F>(&self, change: F) -> Result<SynthesisOptions>
    where
        F: FnOnce(&mut SynthesisOptions),
    {
        let mut options = self.lock()?;
        change(&mut options);
        *options = options.clamped();
        Ok(*options)
    }

    /// Named setter used by the command line control surface.
    pub fn set(&self, name: &str, value: f64) -> Result<()> {
        let mut options = self.lock()?;
        options.set(name, value)
    }

    pub fn set_body(&self, body: BodyResonance) -> Result<()> {
        self.lock()?.body = body;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, SynthesisOptions>> {
        self.shared
            .lock()
            .map_err(|_| GuitarError::msg("synthesis options have been poisoned"))
    }
}

impl OptionsSource for SharedOptions {
    fn snapshot(&self) -> Result<SynthesisOptions> {
        Ok(*self.lock()?)
    }
}

impl std::fmt::Debug for SharedOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedOptions").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_within_ranges() {
        let options = SynthesisOptions::default();
        assert_eq!(options, options.clamped());
    }

    #[test]
    fn clamps_out_of_range_values() {
        let options = SynthesisOptions {
            string_damping: 0.95,
            pluck_damping: 0.0,
            string_tension: -3.0,
            stereo_spread: f64::NAN,
            ..Default::default()
        }
        .clamped();

        assert_eq!(options.string_damping, 0.7);
        assert_eq!(options.pluck_damping, 0.1);
        assert_eq!(options.string_tension, 0.0);
        assert_eq!(options.stereo_spread, 0.0);
    }

    #[test]
    fn shared_set_clamps_and_snapshots() {
        let shared = SharedOptions::default();
        shared.set("string_damping_variation", 2.0).unwrap();
        shared.set("stereo_spread", 0.6).unwrap();

        let snapshot = shared.snapshot().unwrap();
        assert_eq!(snapshot.string_damping_variation, 0.5);
        assert_eq!(snapshot.stereo_spread, 0.6);
        assert_eq!(snapshot.get("stereo_spread").unwrap(), 0.6);
    }

    #[test]
    fn snapshot_is_unaffected_by_later_updates() {
        let shared = SharedOptions::default();
        let before = shared.snapshot().unwrap();
        shared
            .update(|options| options.character_variation = 0.9)
            .unwrap();

        assert_eq!(before.character_variation, 0.5);
        assert_eq!(shared.snapshot().unwrap().character_variation, 0.9);
    }

    #[test]
    fn every_range_names_a_readable_field() {
        let options = SynthesisOptions {
            pluck_damping_variation: 0.4,
            ..Default::default()
        };
        for range in OPTION_RANGES {
            let value = options.get(range.name).unwrap();
            assert!((range.min..=range.max).contains(&value), "{}", range.name);
        }
        assert_eq!(options.get("pluck_damping_variation").unwrap(), 0.4);
        assert!(options.get("body").is_err());
    }

    #[test]
    fn rejects_unknown_option_names() {
        let shared = SharedOptions::default();
        let err = shared.set("volume", 1.0).unwrap_err();
        assert!(format!("{err}").contains("volume"));
    }
}
