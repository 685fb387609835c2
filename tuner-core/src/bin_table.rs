//! # Note-Bin Table Module
//!
//! Maps every (note, octave) cell of the reference chart to its target
//! spectral bin and to an exclusive range of bins that belongs to that cell
//! alone. Ranges end halfway between neighboring target bins, so the table
//! partitions the analysed part of the spectrum without overlap.
//!
//! The table is built once per (sample rate, window size) and is read-only
//! afterwards.

use crate::notes::{self, Note, OCTAVES};
use log::{debug, warn};

/// Offset of the synthetic neighbor used when a cell has no real neighbor.
const SYNTHETIC_NEIGHBOR_OFFSET: isize = 2;

/// An inclusive range of spectral bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinRange {
    pub min: usize,
    pub max: usize,
}

impl BinRange {
    pub fn len(&self) -> usize {
        if self.max < self.min {
            0
        } else {
            self.max - self.min + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, bin: usize) -> bool {
        self.min <= bin && bin <= self.max
    }
}

/// One (note, octave) cell of the table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OctaveEntry {
    /// Reference frequency in Hz.
    pub frequency: f32,
    /// Nearest spectral bin to `frequency`.
    pub target_bin: usize,
    /// Bins assigned exclusively to this cell.
    pub range: BinRange,
}

/// Which side of a cell a neighbor lookup was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborSide {
    /// The next higher note.
    Sharp,
    /// The next lower note.
    Flat,
}

/// A neighbor lookup that wrapped outside the chart and fell back to the
/// synthetic neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableAnomaly {
    pub note: Note,
    pub octave: usize,
    pub side: NeighborSide,
}

/// Lookup table from (note, octave) to target bin and exclusive bin range.
#[derive(Debug, Clone)]
pub struct NoteBinTable {
    sample_rate: u32,
    window_size: usize,
    rows: Vec<[OctaveEntry; OCTAVES]>,
    anomalies: Vec<TableAnomaly>,
}

impl NoteBinTable {
    /// Builds the table for a sample rate and transform window size.
    ///
    /// This function:
    /// 1. Computes the target bin of every reference frequency
    /// 2. Finds the sharp and flat neighbor of every cell, wrapping from B
    ///    of one octave to C of the next
    /// 3. Assigns each cell the bins between the midpoints to its neighbors
    ///
    /// Lookups that wrap past either end of the chart are recorded as
    /// anomalies and use a synthetic neighbor two bins away. The build
    /// always completes.
    pub fn build(sample_rate: u32, window_size: usize) -> Self {
        let bins: Vec<[usize; OCTAVES]> = Note::ALL
            .iter()
            .map(|note| {
                note.reference_frequencies()
                    .map(|freq| notes::freq_to_bin(window_size, sample_rate, freq))
            })
            .collect();

        let mut anomalies = Vec::new();
        let mut rows: Vec<[OctaveEntry; OCTAVES]> = Vec::with_capacity(Note::ALL.len());

        for (row, note) in Note::ALL.iter().enumerate() {
            let freqs = note.reference_frequencies();
            let mut entries = [OctaveEntry {
                frequency: 0.0,
                target_bin: 0,
                range: BinRange { min: 0, max: 0 },
            }; OCTAVES];

            for col in 0..OCTAVES {
                let base = bins[row][col] as isize;

                let sharp = match neighbor_cell(&bins, row, col, 1) {
                    Some((r, c)) => bins[r][c] as isize,
                    None => {
                        anomalies.push(TableAnomaly {
                            note: *note,
                            octave: col,
                            side: NeighborSide::Sharp,
                        });
                        base + SYNTHETIC_NEIGHBOR_OFFSET
                    }
                };
                let flat = match neighbor_cell(&bins, row, col, -1) {
                    Some((r, c)) => bins[r][c] as isize,
                    None => {
                        anomalies.push(TableAnomaly {
                            note: *note,
                            octave: col,
                            side: NeighborSide::Flat,
                        });
                        base - SYNTHETIC_NEIGHBOR_OFFSET
                    }
                };

                // Integer division truncates toward zero.
                let min = (base + flat) / 2 + 1;
                let max = (base + sharp) / 2;

                entries[col] = OctaveEntry {
                    frequency: freqs[col],
                    target_bin: base as usize,
                    range: BinRange {
                        min: min.max(0) as usize,
                        max: max.max(0) as usize,
                    },
                };
            }
            rows.push(entries);
        }

        for anomaly in &anomalies {
            warn!(
                "Neighbor lookup for {} wrapped outside the chart ({:?} side), using synthetic neighbor",
                anomaly.note.label(anomaly.octave),
                anomaly.side
            );
        }

        let table = Self {
            sample_rate,
            window_size,
            rows,
            anomalies,
        };
        debug!(
            "Built note-bin table for {} Hz / {} samples: bins {}..={}",
            sample_rate,
            window_size,
            table.min_bin(),
            table.max_bin()
        );
        table
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of bins the transform produces for this window size.
    pub fn spectrum_len(&self) -> usize {
        self.window_size / 2 + 1
    }

    pub fn entry(&self, note: Note, octave: usize) -> Option<&OctaveEntry> {
        self.rows.get(note.index())?.get(octave)
    }

    /// Iterates over all cells note by note, lowest octave first within a
    /// note.
    pub fn entries(&self) -> impl Iterator<Item = (Note, usize, &OctaveEntry)> + '_ {
        Note::ALL.into_iter().zip(&self.rows).flat_map(|(note, row)| {
            row.iter()
                .enumerate()
                .map(move |(octave, entry)| (note, octave, entry))
        })
    }

    /// Target bin of the first cell (lowest C).
    pub fn min_bin(&self) -> usize {
        self.rows[0][0].target_bin
    }

    /// Target bin of the last cell (highest B).
    pub fn max_bin(&self) -> usize {
        self.rows[self.rows.len() - 1][OCTAVES - 1].target_bin
    }

    /// `[min_bin - padding, max_bin + padding]`, clamped to the spectrum.
    pub fn padded_range(&self, padding: usize) -> BinRange {
        BinRange {
            min: self.min_bin().saturating_sub(padding),
            max: (self.max_bin() + padding).min(self.spectrum_len() - 1),
        }
    }

    /// Whether every bin of the cell lies below the Nyquist bin.
    pub fn is_analyzable(&self, entry: &OctaveEntry) -> bool {
        entry.range.max < self.spectrum_len()
    }

    /// The next higher cell, or `None` at the top of the chart.
    pub fn sharp_neighbor(&self, note: Note, octave: usize) -> Option<(Note, usize)> {
        let (row, col) = neighbor_index(note.index(), octave, 1)?;
        Some((Note::from_index(row)?, col))
    }

    /// The next lower cell, or `None` at the bottom of the chart.
    pub fn flat_neighbor(&self, note: Note, octave: usize) -> Option<(Note, usize)> {
        let (row, col) = neighbor_index(note.index(), octave, -1)?;
        Some((Note::from_index(row)?, col))
    }

    /// Neighbor lookups that fell back to the synthetic neighbor.
    pub fn anomalies(&self) -> &[TableAnomaly] {
        &self.anomalies
    }
}

/// Resolves the neighbor `step` rows away from `(row, col)`.
///
/// The row wraps around the note list; every full wrap shifts the column by
/// one. The column is reduced modulo the octave count, and a lookup whose
/// column had to be folded back into range is rejected, since it would land
/// in the wrong octave.
fn neighbor_index(row: usize, col: usize, step: isize) -> Option<(usize, usize)> {
    let rows = Note::ALL.len() as isize;
    let target = row as isize + step;
    let wraps = target.div_euclid(rows);
    let neighbor_row = target.rem_euclid(rows) as usize;

    let shifted = col as isize + wraps;
    let neighbor_col = shifted.rem_euclid(OCTAVES as isize);
    if neighbor_col != shifted {
        return None;
    }
    Some((neighbor_row, neighbor_col as usize))
}

fn neighbor_cell(
    bins: &[[usize; OCTAVES]],
    row: usize,
    col: usize,
    step: isize,
) -> Option<(usize, usize)> {
    let (r, c) = neighbor_index(row, col, step)?;
    bins.get(r)?.get(c)?;
    Some((r, c))
}

/// Splits a strictly increasing sequence of points into ranges around each
/// interior point.
///
/// Each interior point `y` with neighbors `x` and `z` gets
/// `((x + y) / 2, (y + z) / 2)`; when the start would touch the previous
/// range it is moved just past that range's end.
pub fn get_ranges(points: &[i64]) -> Vec<(i64, i64)> {
    let mut ranges: Vec<(i64, i64)> = Vec::with_capacity(points.len().saturating_sub(2));

    for window in points.windows(3) {
        let (x, y, z) = (window[0], window[1], window[2]);
        let mut w1 = (x + y) / 2;
        let w2 = (y + z) / 2;

        if let Some(&(_, prev_w2)) = ranges.last() {
            if w1 <= prev_w2 {
                w1 = prev_w2 + 1;
            }
        }
        ranges.push((w1, w2));
    }

    ranges
}
