//! Calibration run settings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which calibration the engine should fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMode {
    /// Reference positions are normalized viewport coordinates
    #[default]
    TwoD,
    /// Reference positions are camera-local positions in millimetres
    ThreeD,
}

impl CalibrationMode {
    /// Engine plugin that consumes reference data for this mode
    pub fn plugin_name(&self) -> &'static str {
        match self {
            CalibrationMode::TwoD => "HMD_Calibration",
            CalibrationMode::ThreeD => "HMD_Calibration_3D",
        }
    }

    /// Name of the position field in the engine's reference datum
    pub fn position_key(&self) -> &'static str {
        match self {
            CalibrationMode::TwoD => "norm_pos",
            CalibrationMode::ThreeD => "mm_pos",
        }
    }
}

/// Invalid combinations of [`CalibrationSettings`] fields.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingsError {
    #[error("{field} must be finite, got {value}")]
    NotFinite { field: &'static str, value: f64 },

    #[error("seconds_per_target must be positive, got {0}")]
    NonPositiveDuration(f64),

    #[error("ignore_initial_seconds must not be negative, got {0}")]
    NegativeIgnoreWindow(f64),

    #[error("ignore_initial_seconds ({ignore}) must be shorter than seconds_per_target ({per_target})")]
    IgnoreWindowTooLong { ignore: f64, per_target: f64 },

    #[error("samples_per_target must be at least 1")]
    NoSamples,

    #[error("sampling window is too short for a usable sample rate, got {0} Hz")]
    DegenerateSampleRate(f64),
}

/// Timing and sample counts for a calibration run.
///
/// Read-only for the duration of a run. Defaults match the engine's stock
/// HMD calibration: one second per target, the first 100 ms ignored, 40
/// samples per target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    pub mode: CalibrationMode,
    /// Maximum time spent on one target
    pub seconds_per_target: f64,
    /// Settle time after a target change during which no samples are taken
    pub ignore_initial_seconds: f64,
    /// Samples collected before moving to the next target
    pub samples_per_target: u32,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            mode: CalibrationMode::TwoD,
            seconds_per_target: 1.0,
            ignore_initial_seconds: 0.1,
            samples_per_target: 40,
        }
    }
}

impl CalibrationSettings {
    pub fn new(
        mode: CalibrationMode,
        seconds_per_target: f64,
        ignore_initial_seconds: f64,
        samples_per_target: u32,
    ) -> Self {
        Self {
            mode,
            seconds_per_target,
            ignore_initial_seconds,
            samples_per_target,
        }
    }

    /// Samples per second needed to collect all samples inside the
    /// sampling window that follows the settle time.
    pub fn sample_rate(&self) -> f64 {
        self.samples_per_target as f64 / (self.seconds_per_target - self.ignore_initial_seconds)
    }

    /// Nominal time between two samples
    pub fn sample_interval(&self) -> f64 {
        1.0 / self.sample_rate()
    }

    pub fn plugin_name(&self) -> &'static str {
        self.mode.plugin_name()
    }

    pub fn position_key(&self) -> &'static str {
        self.mode.position_key()
    }

    /// Check that the settings describe a runnable calibration.
    ///
    /// A valid configuration always has a finite, positive
    /// [`sample_rate`](Self::sample_rate).
    pub fn validate(&self) -> Result<(), SettingsError> {
        for (field, value) in [
            ("seconds_per_target", self.seconds_per_target),
            ("ignore_initial_seconds", self.ignore_initial_seconds),
        ] {
            if !value.is_finite() {
                return Err(SettingsError::NotFinite { field, value });
            }
        }
        if self.seconds_per_target <= 0.0 {
            return Err(SettingsError::NonPositiveDuration(self.seconds_per_target));
        }
        if self.ignore_initial_seconds < 0.0 {
            return Err(SettingsError::NegativeIgnoreWindow(
                self.ignore_initial_seconds,
            ));
        }
        if self.ignore_initial_seconds >= self.seconds_per_target {
            return Err(SettingsError::IgnoreWindowTooLong {
                ignore: self.ignore_initial_seconds,
                per_target: self.seconds_per_target,
            });
        }
        if self.samples_per_target == 0 {
            return Err(SettingsError::NoSamples);
        }
        let rate = self.sample_rate();
        if !(rate.is_finite() && rate > 0.0) {
            return Err(SettingsError::DegenerateSampleRate(rate));
        }
        Ok(())
    }
}
