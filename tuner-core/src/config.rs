//! Detector configuration and fixed audio constants.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::notes;

/// Sample rates probed on a device, highest first. The first rate the
/// device accepts is used.
pub const CANDIDATE_SAMPLE_RATES: [u32; 12] = [
    384000, 192000, 176400, 96000, 88200, 48000, 44100, 32000, 22050, 16000, 11025, 8000,
];

/// Tunable parameters of the pitch-detection pipeline.
///
/// Every field has a default, so a config file only needs to name the
/// values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Desired spacing between spectral bins in Hz.
    pub frequency_resolution: f32,
    /// Number of samples collected before a window is analysed.
    pub window_threshold: usize,
    /// Number of frames the spectral average spans.
    pub history_depth: u32,
    /// Scores at or below this value are treated as silence.
    pub noise_floor: f32,
    /// Extra bins averaged on either side of the table.
    pub bin_padding: usize,
    /// Bins taken on each side of the winning bin for drift estimation.
    pub drift_radius: usize,
    /// Relative standard deviation of the scoring taper.
    pub gaussian_sigma: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            frequency_resolution: 0.5,
            window_threshold: 10_000,
            history_depth: 10,
            noise_floor: 50.0,
            bin_padding: 5,
            drift_radius: 4,
            gaussian_sigma: 0.5,
        }
    }
}

impl DetectorConfig {
    /// Transform length for a sample rate at the configured resolution.
    pub fn window_size(&self, sample_rate: u32) -> usize {
        notes::window_size_for(sample_rate, self.frequency_resolution)
    }

    pub fn validate(&self) -> Result<()> {
        if self.frequency_resolution.is_nan() || self.frequency_resolution <= 0.0 {
            bail!(
                "frequency_resolution must be positive, got {}",
                self.frequency_resolution
            );
        }
        if self.window_threshold == 0 {
            bail!("window_threshold must be at least one sample");
        }
        if self.history_depth == 0 {
            bail!("history_depth must be at least one frame");
        }
        if self.drift_radius == 0 {
            bail!("drift_radius must be at least one bin");
        }
        if self.gaussian_sigma.is_nan() || self.gaussian_sigma <= 0.0 {
            bail!("gaussian_sigma must be positive, got {}", self.gaussian_sigma);
        }
        Ok(())
    }
}
