//! # Fast Fourier Transform (FFT) Module
//!
//! This module provides the forward transform used by the detector. A real
//! window of samples is zero padded to the configured transform length and
//! turned into the non-negative half of its spectrum.
//!
//! ## Features
//! - High-performance FFT using RustFFT
//! - Plan and buffers created once per window size
//! - Fallible buffer allocation for large windows
//! - Natural-log power scale for scoring

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use rustfft::{Fft, FftPlanner, num_complex::Complex};

/// A planned forward transform with its working buffers.
pub struct SpectralTransform {
    window_size: usize,
    plan: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl std::fmt::Debug for SpectralTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralTransform")
            .field("window_size", &self.window_size)
            .finish_non_exhaustive()
    }
}

impl SpectralTransform {
    /// Plans a forward transform of `window_size` points.
    ///
    /// # Returns
    /// * `Ok(transform)` - Plan and buffers ready for use
    /// * `Err(e)` - Window size is zero or the buffers could not be allocated
    pub fn new(window_size: usize) -> Result<Self> {
        if window_size == 0 {
            bail!("Transform window size must be positive");
        }

        let mut planner = FftPlanner::new();
        let plan = planner.plan_fft_forward(window_size);

        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(window_size)
            .with_context(|| format!("Allocating {window_size}-point transform buffer"))?;
        buffer.resize(window_size, Complex::new(0.0, 0.0));

        let scratch_len = plan.get_inplace_scratch_len();
        let mut scratch = Vec::new();
        scratch
            .try_reserve_exact(scratch_len)
            .with_context(|| format!("Allocating {scratch_len}-point transform scratch"))?;
        scratch.resize(scratch_len, Complex::new(0.0, 0.0));

        Ok(Self {
            window_size,
            plan,
            buffer,
            scratch,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of bins returned by [`SpectralTransform::transform`].
    pub fn spectrum_len(&self) -> usize {
        self.window_size / 2 + 1
    }

    /// Transforms a window of real samples.
    ///
    /// Shorter windows are zero padded, longer ones truncated.
    ///
    /// # Returns
    /// * The `window_size / 2 + 1` bins from DC up to Nyquist
    pub fn transform(&mut self, window: &[f32]) -> &[Complex<f32>] {
        let used = window.len().min(self.window_size);
        for (slot, &sample) in self.buffer.iter_mut().zip(&window[..used]) {
            *slot = Complex::new(sample, 0.0);
        }
        for slot in &mut self.buffer[used..] {
            *slot = Complex::new(0.0, 0.0);
        }

        self.plan
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let len = self.spectrum_len();
        &self.buffer[..len]
    }
}

/// Log power of a bin: `10 * ln(|X|^2)`.
///
/// A bin of exactly zero is floored at the smallest positive `f32` so the
/// result stays finite.
pub fn log_power(bin: Complex<f32>) -> f32 {
    10.0 * bin.norm_sqr().max(f32::MIN_POSITIVE).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn rejects_empty_window() {
        assert!(SpectralTransform::new(0).is_err());
    }

    #[test]
    fn returns_half_spectrum() {
        let mut fft = SpectralTransform::new(64).unwrap();
        assert_eq!(fft.spectrum_len(), 33);
        assert_eq!(fft.transform(&[0.0; 64]).len(), 33);
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let n = 256;
        let mut fft = SpectralTransform::new(n).unwrap();
        let signal: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * 16.0 * i as f32 / n as f32).sin())
            .collect();
        let spectrum = fft.transform(&signal);
        let peak = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 16);
        assert!((spectrum[16].norm() - n as f32 / 2.0).abs() < 0.01);
    }

    #[test]
    fn short_window_is_zero_padded() {
        let mut fft = SpectralTransform::new(32).unwrap();
        fft.transform(&[1.0; 32]);
        // A fresh short window must not see the previous samples
        let spectrum = fft.transform(&[1.0; 4]);
        assert!((spectrum[0].re - 4.0).abs() < 1e-5);
    }

    #[test]
    fn log_power_uses_natural_log() {
        let value = log_power(Complex::new(3.0, 4.0));
        assert!((value - 10.0 * 25.0f32.ln()).abs() < 1e-4);
        assert!(log_power(Complex::new(0.0, 0.0)).is_finite());
    }
}
