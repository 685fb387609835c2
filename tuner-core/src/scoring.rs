//! # Note Scoring Module
//!
//! Scores every (note, octave) cell of the bin table against the averaged
//! spectrum, picks the loudest cell, and estimates how far the tone sits
//! from that cell's target bin.
//!
//! ## Features
//! - Gaussian-tapered average over each cell's exclusive bin range
//! - Noise floor gate on the winning score
//! - Centroid-based drift estimate around the winning bin

use log::debug;

use crate::bin_table::NoteBinTable;
use crate::notes::Note;
use crate::{BestNote, NoteScore};

/// Constant added to the centroid offset to form the drift value.
pub const DRIFT_BIAS: f32 = 1.0;

/// Score of one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellScore {
    pub note: Note,
    pub octave: usize,
    pub target_bin: usize,
    pub score: f32,
}

/// The outcome of an above-threshold window.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub best: BestNote,
    /// Every scored cell, note by note.
    pub scores: Vec<NoteScore>,
}

/// Generates a Gaussian taper of `width` points.
///
/// `sigma` is relative to half the width: point `i` gets
/// `exp(-0.5 * ((i - a) / (sigma * a))^2)` with `a = (width - 1) / 2`.
pub fn gaussian_window(width: usize, sigma: f64) -> Vec<f64> {
    if width == 1 {
        return vec![1.0];
    }
    let a = (width as f64 - 1.0) / 2.0;
    (0..width)
        .map(|i| {
            let exponent = (i as f64 - a) / (sigma * a);
            (-0.5 * exponent * exponent).exp()
        })
        .collect()
}

/// Averages `data` under a Gaussian taper with weights normalized to sum
/// to one.
///
/// # Returns
/// * `Some(average)` - The weighted average
/// * `None` - Empty input or a non-finite result
pub fn gaussian_weighted_average(data: &[f32], sigma: f64) -> Option<f32> {
    let weights = gaussian_window(data.len(), sigma);
    let weight_sum: f32 = weights.iter().map(|&w| w as f32).sum();
    if weight_sum == 0.0 || !weight_sum.is_finite() {
        return None;
    }

    let total: f32 = data
        .iter()
        .zip(&weights)
        .map(|(&value, &weight)| value * weight as f32)
        .sum();
    let average = total / weight_sum;
    average.is_finite().then_some(average)
}

/// Scores every cell whose range lies inside the averaged spectrum.
pub fn score_cells(averaged: &[f32], table: &NoteBinTable, sigma: f64) -> Vec<CellScore> {
    table
        .entries()
        .filter(|(_, _, entry)| table.is_analyzable(entry))
        .filter_map(|(note, octave, entry)| {
            let values = averaged.get(entry.range.min..=entry.range.max)?;
            let score = gaussian_weighted_average(values, sigma)?;
            Some(CellScore {
                note,
                octave,
                target_bin: entry.target_bin,
                score,
            })
        })
        .collect()
}

/// Picks the highest-scoring cell.
///
/// Ties go to the cell scored first. A winner at or below `noise_floor` is
/// treated as no signal.
///
/// # Returns
/// * `Some(selection)` - The winner and the full score table
/// * `None` - Nothing scored above the noise floor
pub fn select_best_note(
    averaged: &[f32],
    table: &NoteBinTable,
    sigma: f64,
    noise_floor: f32,
) -> Option<Selection> {
    let cells = score_cells(averaged, table, sigma);

    let mut winner: Option<&CellScore> = None;
    for cell in &cells {
        if winner.is_none_or(|best| cell.score > best.score) {
            winner = Some(cell);
        }
    }
    let winner = winner?;

    if winner.score <= noise_floor {
        debug!(
            "Best cell {} scored {:.2}, below noise floor {:.2}",
            winner.note.label(winner.octave),
            winner.score,
            noise_floor
        );
        return None;
    }

    let best = BestNote {
        label: winner.note.label(winner.octave),
        note: winner.note,
        octave: winner.octave,
        bin: winner.target_bin,
        score: winner.score,
    };
    let scores = cells
        .iter()
        .map(|cell| NoteScore {
            label: cell.note.label(cell.octave),
            score: cell.score,
        })
        .collect();

    Some(Selection { best, scores })
}

/// Weighted centroid offset of `values`.
///
/// Offsets are measured from index `len / 2 + 1`, one past the geometric
/// middle of an odd-length window; [`DRIFT_BIAS`] brings a centred peak
/// back to zero.
///
/// # Returns
/// * `None` - The values sum to zero or the result is not finite
pub fn gaussian_shift(values: &[f32]) -> Option<f32> {
    let sum: f32 = values.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return None;
    }

    let center = (values.len() / 2 + 1) as f32;
    let shift: f32 = values
        .iter()
        .enumerate()
        .map(|(i, &value)| (i as f32 - center) * (value / sum))
        .sum();
    shift.is_finite().then_some(shift)
}

/// Estimates the drift of the tone around `winning_bin`.
///
/// Uses the `2 * radius + 1` averaged bins centred on the winner.
///
/// # Returns
/// * `Some(drift)` - [`DRIFT_BIAS`] plus the centroid offset; positive is sharp
/// * `None` - The window leaves the spectrum or cannot be normalized
pub fn estimate_drift(averaged: &[f32], winning_bin: usize, radius: usize) -> Option<f32> {
    let start = winning_bin.checked_sub(radius)?;
    let values = averaged.get(start..=winning_bin + radius)?;
    gaussian_shift(values).map(|shift| DRIFT_BIAS + shift)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::OCTAVES;

    const TOLERANCE: f32 = 1e-3;

    #[test]
    fn gaussian_window_is_symmetric_and_peaks_in_the_middle() {
        let w = gaussian_window(9, 0.5);
        assert_eq!(w.len(), 9);
        assert!((w[4] - 1.0).abs() < 1e-12);
        for i in 0..4 {
            assert!((w[i] - w[8 - i]).abs() < 1e-12);
            assert!(w[i] < w[i + 1]);
        }
        // Edge point sits two standard deviations out
        assert!((w[0] - (-2.0f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn uniform_data_averages_to_its_value() {
        for &len in &[1usize, 2, 7, 51] {
            let data = vec![83.25f32; len];
            let avg = gaussian_weighted_average(&data, 0.5).unwrap();
            assert!((avg - 83.25).abs() < TOLERANCE, "len {len}: {avg}");
        }
    }

    #[test]
    fn weighted_average_favours_the_middle() {
        let data = [0.0, 0.0, 10.0, 0.0, 0.0];
        let avg = gaussian_weighted_average(&data, 0.5).unwrap();
        assert!(avg > 10.0 / 5.0);
        assert!(gaussian_weighted_average(&[], 0.5).is_none());
    }

    #[test]
    fn single_peak_at_geometric_middle_is_offset_by_one() {
        // The centroid reference is index 5, not 4
        let mut values = [0.0f32; 9];
        values[4] = 1.0;
        assert!((gaussian_shift(&values).unwrap() + 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn drift_is_zero_for_a_centred_peak() {
        let mut averaged = vec![0.0f32; 32];
        let values = [1.0, 2.0, 4.0, 8.0, 16.0, 8.0, 4.0, 2.0, 1.0];
        averaged[12..21].copy_from_slice(&values);
        let drift = estimate_drift(&averaged, 16, 4).unwrap();
        assert!(drift.abs() < TOLERANCE);
    }

    #[test]
    fn drift_matches_precomputed_half_bin_offset() {
        let mut averaged = vec![0.0f32; 32];
        averaged[16] = 1.0;
        averaged[17] = 1.0;
        let drift = estimate_drift(&averaged, 16, 4).unwrap();
        assert!((drift - 0.5).abs() < TOLERANCE);

        averaged[17] = 0.0;
        averaged[15] = 1.0;
        let drift = estimate_drift(&averaged, 16, 4).unwrap();
        assert!((drift + 0.5).abs() < TOLERANCE);
    }

    #[test]
    fn drift_needs_a_full_window_with_energy() {
        let averaged = vec![0.0f32; 32];
        assert!(estimate_drift(&averaged, 16, 4).is_none());
        assert!(estimate_drift(&[1.0; 32], 2, 4).is_none());
        assert!(estimate_drift(&[1.0; 32], 29, 4).is_none());
    }

    #[test]
    fn loudest_cell_wins() {
        let table = NoteBinTable::build(44100, 88200);
        let mut averaged = vec![10.0f32; table.spectrum_len()];
        let entry = table.entry(Note::E, 2).unwrap();
        for bin in entry.range.min..=entry.range.max {
            averaged[bin] = 90.0;
        }

        let selection = select_best_note(&averaged, &table, 0.5, 50.0).unwrap();
        assert_eq!(selection.best.note, Note::E);
        assert_eq!(selection.best.octave, 2);
        assert_eq!(selection.best.label, "E2");
        assert_eq!(selection.best.bin, entry.target_bin);
        assert!((selection.best.score - 90.0).abs() < TOLERANCE);
        assert_eq!(selection.scores.len(), Note::ALL.len() * OCTAVES);
    }

    #[test]
    fn quiet_spectrum_selects_nothing() {
        let table = NoteBinTable::build(44100, 88200);
        let averaged = vec![42.0f32; table.spectrum_len()];
        assert!(select_best_note(&averaged, &table, 0.5, 50.0).is_none());
    }

    #[test]
    fn cells_past_nyquist_are_not_scored() {
        let table = NoteBinTable::build(8000, 16000);
        let averaged = vec![60.0f32; table.spectrum_len()];
        let cells = score_cells(&averaged, &table, 0.5);
        assert!(cells.len() < Note::ALL.len() * OCTAVES);
        assert!(cells.iter().all(|c| c.target_bin < table.spectrum_len()));
    }
}
