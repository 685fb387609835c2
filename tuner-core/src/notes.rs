//! # Musical Notes Module
//!
//! This module defines the twelve pitch classes the tuner recognises and the
//! fixed reference chart of their frequencies across eight octaves. It also
//! provides the conversions between frequencies and spectral bin indices that
//! every other stage of the pipeline relies on.
//!
//! ## Features
//! - Ordered set of 12 pitch classes (C through B)
//! - Reference frequency chart, 8 octaves per note
//! - Frequency to bin and bin to frequency conversions
//! - Analysis window sizing from a desired frequency resolution

use std::fmt;

/// Number of octaves in the reference chart.
pub const OCTAVES: usize = 8;

/// One of the twelve pitch classes, in ascending order starting at C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Note {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

/// Reference frequencies in Hz, one row per note, one column per octave.
static REFERENCE_CHART: [[f32; OCTAVES]; 12] = [
    [32.70, 65.41, 130.81, 261.63, 523.25, 1046.50, 2093.00, 4186.01],
    [34.65, 69.30, 138.59, 277.18, 554.37, 1108.73, 2217.46, 4434.92],
    [36.71, 73.42, 146.83, 293.66, 587.33, 1174.66, 2349.32, 4698.63],
    [38.89, 77.78, 155.56, 311.13, 622.25, 1244.51, 2489.02, 4978.03],
    [41.20, 82.41, 164.81, 329.63, 659.25, 1318.51, 2637.02, 5274.04],
    [43.65, 87.31, 174.61, 349.23, 698.46, 1396.91, 2793.83, 5587.65],
    [46.25, 92.50, 185.00, 369.99, 739.99, 1479.98, 2959.96, 5919.91],
    [49.00, 98.00, 196.00, 392.00, 783.99, 1567.98, 3135.96, 6271.93],
    [51.91, 103.83, 207.65, 415.30, 830.61, 1661.22, 3322.44, 6644.88],
    [55.00, 110.00, 220.00, 440.00, 880.00, 1760.00, 3520.00, 7040.00],
    [58.27, 116.54, 233.08, 466.16, 932.33, 1864.66, 3729.31, 7458.62],
    [61.74, 123.47, 246.94, 493.88, 987.77, 1975.53, 3951.07, 7902.13],
];

impl Note {
    /// All notes in table order.
    pub const ALL: [Note; 12] = [
        Note::C,
        Note::CSharp,
        Note::D,
        Note::DSharp,
        Note::E,
        Note::F,
        Note::FSharp,
        Note::G,
        Note::GSharp,
        Note::A,
        Note::ASharp,
        Note::B,
    ];

    /// Display name of the pitch class, e.g. `"C#/Db"`.
    pub fn name(self) -> &'static str {
        match self {
            Note::C => "C",
            Note::CSharp => "C#/Db",
            Note::D => "D",
            Note::DSharp => "D#/Eb",
            Note::E => "E",
            Note::F => "F",
            Note::FSharp => "F#/Gb",
            Note::G => "G",
            Note::GSharp => "G#/Ab",
            Note::A => "A",
            Note::ASharp => "A#/Bb",
            Note::B => "B",
        }
    }

    /// Row of this note in the reference chart.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Note> {
        Self::ALL.get(index).copied()
    }

    /// The reference frequencies of this note, lowest octave first.
    pub fn reference_frequencies(self) -> &'static [f32; OCTAVES] {
        &REFERENCE_CHART[self.index()]
    }

    /// Label of a (note, octave) cell, e.g. `"A3"`.
    pub fn label(self, octave: usize) -> String {
        format!("{}{}", self.name(), octave)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Size of the analysis window needed to reach `resolution` Hz per bin.
///
/// # Arguments
/// * `sample_rate` - Sample rate in Hz
/// * `resolution` - Desired frequency resolution in Hz
///
/// # Returns
/// * `ceil(sample_rate / resolution)` samples
pub fn window_size_for(sample_rate: u32, resolution: f32) -> usize {
    (sample_rate as f64 / resolution as f64).ceil() as usize
}

/// Converts a frequency to the nearest spectral bin.
///
/// Halfway cases round to the even bin, so F#0 (46.25 Hz) lands on bin 92
/// at 0.5 Hz resolution.
///
/// # Arguments
/// * `window_size` - Transform length in samples
/// * `sample_rate` - Sample rate in Hz
/// * `frequency` - Frequency in Hz
pub fn freq_to_bin(window_size: usize, sample_rate: u32, frequency: f32) -> usize {
    let bin = frequency as f64 * window_size as f64 / sample_rate as f64;
    bin.round_ties_even().max(0.0) as usize
}

/// Converts a (possibly fractional) bin index back to a frequency in Hz.
pub fn bin_to_freq(window_size: usize, sample_rate: u32, bin: f32) -> f32 {
    (bin as f64 * sample_rate as f64 / window_size as f64) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notes_are_ordered_and_indexed() {
        for (i, note) in Note::ALL.iter().enumerate() {
            assert_eq!(note.index(), i);
            assert_eq!(Note::from_index(i), Some(*note));
        }
        assert_eq!(Note::from_index(12), None);
    }

    #[test]
    fn chart_rows_increase_by_octave() {
        for note in Note::ALL {
            let freqs = note.reference_frequencies();
            for pair in freqs.windows(2) {
                let ratio = pair[1] / pair[0];
                assert!((ratio - 2.0).abs() < 0.01, "{note}: {pair:?}");
            }
        }
    }

    #[test]
    fn labels_use_chart_column() {
        assert_eq!(Note::A.label(3), "A3");
        assert_eq!(Note::CSharp.label(0), "C#/Db0");
    }

    #[test]
    fn window_size_uses_half_hertz_resolution() {
        assert_eq!(window_size_for(44100, 0.5), 88200);
        assert_eq!(window_size_for(48000, 0.5), 96000);
        assert_eq!(window_size_for(11025, 0.5), 22050);
    }

    #[test]
    fn frequency_maps_to_nearest_bin() {
        assert_eq!(freq_to_bin(88200, 44100, 440.0), 880);
        assert_eq!(freq_to_bin(88200, 44100, 32.70), 65);
        // 46.25 Hz sits exactly on bin 92.5
        assert_eq!(freq_to_bin(88200, 44100, 46.25), 92);
    }

    #[test]
    fn bin_round_trip_stays_within_one_bin() {
        for &rate in &[8000u32, 22050, 44100, 48000, 96000] {
            let size = window_size_for(rate, 0.5);
            for note in Note::ALL {
                for &freq in note.reference_frequencies() {
                    let bin = freq_to_bin(size, rate, freq);
                    let back = bin_to_freq(size, rate, bin as f32);
                    let again = freq_to_bin(size, rate, back);
                    assert!(again.abs_diff(bin) <= 1, "{rate} Hz, {freq}: {bin} vs {again}");
                }
            }
        }
    }
}
