// tuner-core/src/lib.rs

//! The core logic for the instrument tuner.
//! This crate turns a stream of microphone samples into a detected note and
//! a tuning drift estimate. It is completely headless and contains no
//! display code; a front end reads published snapshots from a
//! [`PitchDetector`] and drives device selection through a [`Tuner`].

pub mod accumulator;
pub mod audio;
pub mod averager;
pub mod bin_table;
pub mod config;
pub mod detector;
pub mod fft;
pub mod notes;
pub mod scoring;
pub mod tuner;

pub use config::DetectorConfig;
pub use detector::{DetectionSnapshot, DetectorStatus, Diagnostic, PitchDetector, SpectrumSnapshot};
pub use notes::Note;
pub use tuner::Tuner;

/// The loudest (note, octave) cell of an analysis window.
#[derive(Debug, Clone, PartialEq)]
pub struct BestNote {
    /// Note name followed by the octave column, e.g. `"A3"`.
    pub label: String,
    pub note: Note,
    /// Column of the cell in the reference chart.
    pub octave: usize,
    /// Target bin of the cell.
    pub bin: usize,
    pub score: f32,
}

impl BestNote {
    /// Row of the cell in the reference chart.
    pub fn row(&self) -> usize {
        self.note.index()
    }
}

/// Score of one cell, for the diagnostic score table.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteScore {
    pub label: String,
    pub score: f32,
}

/// What the primary indicator shows.
#[derive(Debug, Clone, PartialEq)]
pub struct BestNoteReadout {
    pub label: String,
    /// Sub-bin offset from the note's target bin; positive is sharp.
    pub drift: f32,
    /// Label of the next lower cell, if any.
    pub flat_neighbor: Option<String>,
    /// Label of the next higher cell, if any.
    pub sharp_neighbor: Option<String>,
}
