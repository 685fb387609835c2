//! # Spectral Averager Module
//!
//! Smooths the log-power spectrum over recent frames and tracks the range of
//! values seen, for scoring and for graph scaling.

use rustfft::num_complex::Complex;

use crate::bin_table::BinRange;
use crate::fft;

const INITIAL_MIN_DB: f32 = 999.0;
const INITIAL_MAX_DB: f32 = -999.0;

/// Margin the dB range is widened by on every update.
const DB_HEADROOM: f32 = 3.0;

/// Running average of log-power frames over a fixed bin range.
///
/// The average is a recurrence, not a window of stored frames: each frame is
/// blended in with weight `1 / (count + 1)`, and `count` stops growing one
/// short of the history depth.
#[derive(Debug, Clone)]
pub struct SpectralAverager {
    range: BinRange,
    raw: Vec<f32>,
    averaged: Vec<f32>,
    count: u32,
    history_depth: u32,
    min_db: f32,
    max_db: f32,
}

impl SpectralAverager {
    /// Creates an averager over `range` of a spectrum with `spectrum_len`
    /// bins. The range is clamped to the spectrum.
    pub fn new(spectrum_len: usize, range: BinRange, history_depth: u32) -> Self {
        let last = spectrum_len.saturating_sub(1);
        let range = BinRange {
            min: range.min.min(last),
            max: range.max.min(last),
        };
        Self {
            range,
            raw: vec![0.0; spectrum_len],
            averaged: vec![0.0; spectrum_len],
            count: 0,
            history_depth: history_depth.max(1),
            min_db: INITIAL_MIN_DB,
            max_db: INITIAL_MAX_DB,
        }
    }

    /// Blends a new spectrum into the average.
    ///
    /// For every bin in range: `avg = (avg * count + frame) / (count + 1)`.
    /// The dB range is first widened by the headroom margin, then stretched
    /// to cover every raw value of the frame.
    pub fn update(&mut self, spectrum: &[Complex<f32>]) {
        self.min_db -= DB_HEADROOM;
        self.max_db += DB_HEADROOM;

        let count = self.count as f32;
        let end = (self.range.max + 1).min(spectrum.len()).min(self.raw.len());
        for i in self.range.min..end {
            let value = fft::log_power(spectrum[i]);
            self.raw[i] = value;
            self.averaged[i] = (self.averaged[i] * count + value) / (count + 1.0);

            if value <= self.min_db {
                self.min_db = value;
            }
            if value >= self.max_db {
                self.max_db = value;
            }
        }

        self.count += 1;
        if self.count == self.history_depth {
            self.count -= 1;
        }
    }

    /// Clears the average and the dB range.
    pub fn reset(&mut self) {
        self.raw.fill(0.0);
        self.averaged.fill(0.0);
        self.count = 0;
        self.min_db = INITIAL_MIN_DB;
        self.max_db = INITIAL_MAX_DB;
    }

    /// Averaged log power, indexed by bin over the whole spectrum.
    pub fn averaged(&self) -> &[f32] {
        &self.averaged
    }

    /// Log power of the latest frame, indexed by bin over the whole spectrum.
    pub fn raw(&self) -> &[f32] {
        &self.raw
    }

    pub fn range(&self) -> BinRange {
        self.range
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn min_db(&self) -> f32 {
        self.min_db
    }

    pub fn max_db(&self) -> f32 {
        self.max_db
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_spectrum(len: usize, magnitude: f32) -> Vec<Complex<f32>> {
        vec![Complex::new(magnitude, 0.0); len]
    }

    #[test]
    fn first_frame_is_taken_as_is() {
        let mut avg = SpectralAverager::new(16, BinRange { min: 2, max: 5 }, 10);
        avg.update(&flat_spectrum(16, 10.0));
        let expected = 10.0 * 100.0f32.ln();
        for i in 2..=5 {
            assert!((avg.averaged()[i] - expected).abs() < 1e-4);
        }
        // Outside the range nothing is touched
        assert_eq!(avg.averaged()[1], 0.0);
        assert_eq!(avg.averaged()[6], 0.0);
    }

    #[test]
    fn blends_with_count_weight() {
        let mut avg = SpectralAverager::new(8, BinRange { min: 0, max: 7 }, 10);
        let a = fft::log_power(Complex::new(2.0, 0.0));
        let b = fft::log_power(Complex::new(8.0, 0.0));
        avg.update(&flat_spectrum(8, 2.0));
        avg.update(&flat_spectrum(8, 8.0));
        assert!((avg.averaged()[3] - (a + b) / 2.0).abs() < 1e-4);
        assert_eq!(avg.count(), 2);
    }

    #[test]
    fn count_holds_below_history_depth() {
        let mut avg = SpectralAverager::new(4, BinRange { min: 0, max: 3 }, 10);
        for _ in 0..25 {
            avg.update(&flat_spectrum(4, 1.0));
        }
        assert_eq!(avg.count(), 9);
    }

    #[test]
    fn db_range_is_widened_every_update() {
        let mut avg = SpectralAverager::new(4, BinRange { min: 0, max: 3 }, 10);
        let spectrum = vec![
            Complex::new(1.0, 0.0),
            Complex::new(10.0, 0.0),
            Complex::new(100.0, 0.0),
            Complex::new(1000.0, 0.0),
        ];
        avg.update(&spectrum);
        let low = fft::log_power(spectrum[0]);
        let high = fft::log_power(spectrum[3]);
        assert_eq!(avg.min_db(), low);
        assert_eq!(avg.max_db(), high);

        avg.update(&spectrum);
        assert!((avg.min_db() - (low - 3.0)).abs() < 1e-4);
        assert!((avg.max_db() - (high + 3.0)).abs() < 1e-4);
    }

    #[test]
    fn range_is_clamped_and_reset_clears() {
        let mut avg = SpectralAverager::new(8, BinRange { min: 2, max: 50 }, 10);
        assert_eq!(avg.range(), BinRange { min: 2, max: 7 });
        avg.update(&flat_spectrum(8, 4.0));
        avg.reset();
        assert_eq!(avg.count(), 0);
        assert!(avg.averaged().iter().all(|&v| v == 0.0));
        assert_eq!(avg.min_db(), 999.0);
    }
}
