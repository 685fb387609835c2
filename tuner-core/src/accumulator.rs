//! # Sample Accumulator Module
//!
//! Collects incoming 16-bit PCM blocks into one analysis window. Windows do
//! not overlap: once a window is handed out, collection starts again from an
//! empty buffer.

use log::trace;

/// Scale factor from signed 16-bit samples to `[-1, 1)`.
const I16_SCALE: f32 = 32768.0;

/// Buffers normalized mono samples until an analysis window is full.
#[derive(Debug)]
pub struct SampleAccumulator {
    buffer: Vec<f32>,
    threshold: usize,
    capacity: usize,
}

impl SampleAccumulator {
    /// Creates an accumulator that yields a window once `threshold` samples
    /// have arrived. No window ever holds more than `capacity` samples.
    pub fn new(threshold: usize, capacity: usize) -> Self {
        let threshold = threshold.clamp(1, capacity.max(1));
        Self {
            buffer: Vec::with_capacity(capacity),
            threshold,
            capacity,
        }
    }

    /// Appends a block of raw samples.
    ///
    /// The whole block is appended before the threshold is checked, so a
    /// ready window can be slightly longer than the threshold. Samples that
    /// would exceed the capacity are dropped.
    ///
    /// # Returns
    /// * `Some(window)` - The completed window; the accumulator is empty again
    /// * `None` - More samples are needed
    pub fn push(&mut self, block: &[i16]) -> Option<Vec<f32>> {
        let room = self.capacity - self.buffer.len();
        if block.len() > room {
            trace!("Dropping {} samples past window capacity", block.len() - room);
        }
        self.buffer.extend(
            block
                .iter()
                .take(room)
                .map(|&sample| sample as f32 / I16_SCALE),
        );

        if self.buffer.len() >= self.threshold {
            let window = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.capacity));
            Some(window)
        } else {
            None
        }
    }

    /// Discards any partially collected window.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_samples() {
        let mut acc = SampleAccumulator::new(4, 16);
        let window = acc.push(&[i16::MIN, -16384, 0, 16384]).unwrap();
        assert_eq!(window, vec![-1.0, -0.5, 0.0, 0.5]);
    }

    #[test]
    fn yields_only_when_threshold_is_reached() {
        let mut acc = SampleAccumulator::new(10, 100);
        assert!(acc.push(&[1; 4]).is_none());
        assert!(acc.push(&[1; 4]).is_none());
        assert_eq!(acc.len(), 8);

        let window = acc.push(&[1; 4]).unwrap();
        assert_eq!(window.len(), 12);
        assert!(acc.is_empty());
    }

    #[test]
    fn consecutive_windows_are_disjoint() {
        let mut acc = SampleAccumulator::new(3, 10);
        let first = acc.push(&[100, 200, 300]).unwrap();
        let second = acc.push(&[400, 500, 600]).unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 3);
        assert!((second[0] - 400.0 / 32768.0).abs() < 1e-9);
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut acc = SampleAccumulator::new(8, 8);
        let window = acc.push(&[7; 20]).unwrap();
        assert_eq!(window.len(), 8);
    }

    #[test]
    fn reset_discards_partial_window() {
        let mut acc = SampleAccumulator::new(10, 100);
        acc.push(&[1; 6]);
        acc.reset();
        assert!(acc.is_empty());
        assert!(acc.push(&[1; 6]).is_none());
    }
}
