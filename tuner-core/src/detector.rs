//! # Pitch Detector Module
//!
//! Owns the whole detection pipeline (accumulator, transform, bin table and
//! averager) and publishes its results as immutable snapshots.
//!
//! ## Architecture
//! - **Capture path**: `process_block` is called with every block of raw
//!   samples and runs the pipeline to completion once a window is full
//! - **Readers**: display code loads the latest [`DetectionSnapshot`]; a
//!   snapshot is replaced as a whole, never edited in place
//! - **Reconfiguration**: a new pipeline is built off to the side and swapped
//!   in under the pipeline lock, so no block is processed mid-rebuild

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, trace, warn};

use crate::accumulator::SampleAccumulator;
use crate::averager::SpectralAverager;
use crate::bin_table::{NoteBinTable, TableAnomaly};
use crate::config::DetectorConfig;
use crate::fft::SpectralTransform;
use crate::notes;
use crate::scoring;
use crate::{BestNote, BestNoteReadout, NoteScore};

/// Pending diagnostics beyond this are dropped.
const DIAGNOSTICS_CAPACITY: usize = 64;

/// Whether the detector currently has a usable configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorStatus {
    /// No pipeline is running, e.g. no usable audio device.
    Disabled { reason: String },
    Active { sample_rate: u32, window_size: usize },
}

impl DetectorStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, DetectorStatus::Active { .. })
    }
}

/// Events reported by the detector outside the normal result flow.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A bin table neighbor lookup fell back to the synthetic neighbor.
    TableAnomaly(TableAnomaly),
    Reconfigured { sample_rate: u32, window_size: usize },
    Disabled { reason: String },
}

/// The analysed part of the spectrum, for graphing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpectrumSnapshot {
    pub sample_rate: u32,
    pub window_size: usize,
    /// First bin of `raw` and `averaged`.
    pub min_bin: usize,
    /// Last bin of `raw` and `averaged`.
    pub max_bin: usize,
    pub min_db: f32,
    pub max_db: f32,
    /// Log power of the latest window, one value per bin from `min_bin`.
    pub raw: Vec<f32>,
    /// Averaged log power, one value per bin from `min_bin`.
    pub averaged: Vec<f32>,
}

impl SpectrumSnapshot {
    /// Frequency in Hz of a bin, for axis labels.
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        if self.window_size == 0 {
            return 0.0;
        }
        notes::bin_to_freq(self.window_size, self.sample_rate, bin as f32)
    }
}

/// Everything the display reads, published together after every window.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSnapshot {
    pub status: DetectorStatus,
    /// Latest detection above the noise floor; kept until the next one.
    pub best: Option<BestNote>,
    /// Drift belonging to `best`.
    pub drift: f32,
    pub readout: Option<BestNoteReadout>,
    /// Score table belonging to `best`.
    pub scores: Vec<NoteScore>,
    pub spectrum: SpectrumSnapshot,
    /// Windows analysed since the last reconfiguration.
    pub windows_analysed: u64,
}

impl DetectionSnapshot {
    fn disabled(reason: &str) -> Self {
        Self {
            status: DetectorStatus::Disabled {
                reason: reason.to_string(),
            },
            best: None,
            drift: 0.0,
            readout: None,
            scores: Vec::new(),
            spectrum: SpectrumSnapshot::default(),
            windows_analysed: 0,
        }
    }
}

/// Formats a detection the way it is traced: `A3|+0.25` or `A3|-0.1`.
pub fn format_detection(label: &str, drift: f32) -> String {
    if drift > 0.0 {
        format!("{label}|+{drift}")
    } else {
        format!("{label}|{drift}")
    }
}

/// Pipeline state for one (sample rate, window size) configuration.
struct Pipeline {
    sample_rate: u32,
    window_size: usize,
    accumulator: SampleAccumulator,
    transform: SpectralTransform,
    table: Arc<NoteBinTable>,
    averager: SpectralAverager,
    best: Option<BestNote>,
    drift: f32,
    readout: Option<BestNoteReadout>,
    scores: Vec<NoteScore>,
    windows_analysed: u64,
}

impl Pipeline {
    fn build(config: &DetectorConfig, sample_rate: u32) -> Result<Self> {
        let window_size = config.window_size(sample_rate);
        let transform = SpectralTransform::new(window_size)
            .with_context(|| format!("Planning transform for {sample_rate} Hz"))?;
        let table = NoteBinTable::build(sample_rate, window_size);
        let averager = SpectralAverager::new(
            transform.spectrum_len(),
            table.padded_range(config.bin_padding),
            config.history_depth,
        );

        Ok(Self {
            sample_rate,
            window_size,
            accumulator: SampleAccumulator::new(config.window_threshold, window_size),
            transform,
            table: Arc::new(table),
            averager,
            best: None,
            drift: 0.0,
            readout: None,
            scores: Vec::new(),
            windows_analysed: 0,
        })
    }

    /// Runs transform, averaging, scoring and drift estimation on a full
    /// window. The published detection only changes when a note scores
    /// above the noise floor and its drift is defined.
    fn analyse(&mut self, window: &[f32], config: &DetectorConfig) {
        let spectrum = self.transform.transform(window);
        self.averager.update(spectrum);
        self.windows_analysed += 1;

        let averaged = self.averager.averaged();
        let Some(selection) = scoring::select_best_note(
            averaged,
            &self.table,
            config.gaussian_sigma,
            config.noise_floor,
        ) else {
            return;
        };

        let Some(drift) = scoring::estimate_drift(averaged, selection.best.bin, config.drift_radius)
        else {
            debug!(
                "Drift undefined around bin {}, keeping previous detection",
                selection.best.bin
            );
            return;
        };

        debug!("{}", format_detection(&selection.best.label, drift));
        self.readout = Some(readout(&self.table, &selection.best, drift));
        self.best = Some(selection.best);
        self.drift = drift;
        self.scores = selection.scores;
    }

    fn snapshot(&self) -> DetectionSnapshot {
        let range = self.averager.range();
        DetectionSnapshot {
            status: DetectorStatus::Active {
                sample_rate: self.sample_rate,
                window_size: self.window_size,
            },
            best: self.best.clone(),
            drift: self.drift,
            readout: self.readout.clone(),
            scores: self.scores.clone(),
            spectrum: SpectrumSnapshot {
                sample_rate: self.sample_rate,
                window_size: self.window_size,
                min_bin: range.min,
                max_bin: range.max,
                min_db: self.averager.min_db(),
                max_db: self.averager.max_db(),
                raw: self.averager.raw()[range.min..=range.max].to_vec(),
                averaged: self.averager.averaged()[range.min..=range.max].to_vec(),
            },
            windows_analysed: self.windows_analysed,
        }
    }
}

fn readout(table: &NoteBinTable, best: &BestNote, drift: f32) -> BestNoteReadout {
    BestNoteReadout {
        label: best.label.clone(),
        drift,
        flat_neighbor: table
            .flat_neighbor(best.note, best.octave)
            .map(|(note, octave)| note.label(octave)),
        sharp_neighbor: table
            .sharp_neighbor(best.note, best.octave)
            .map(|(note, octave)| note.label(octave)),
    }
}

/// Streaming note and drift detector.
///
/// Shared between the capture callback, which feeds it samples, and the
/// display, which reads snapshots. All methods take `&self`.
pub struct PitchDetector {
    config: DetectorConfig,
    pipeline: Mutex<Option<Pipeline>>,
    snapshot: ArcSwap<DetectionSnapshot>,
    diagnostics_tx: Sender<Diagnostic>,
    diagnostics_rx: Receiver<Diagnostic>,
}

impl PitchDetector {
    /// Creates a detector in the disabled state. Call
    /// [`PitchDetector::configure`] once the sample rate is known.
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate().context("Invalid detector configuration")?;
        let (diagnostics_tx, diagnostics_rx) = crossbeam_channel::bounded(DIAGNOSTICS_CAPACITY);
        Ok(Self {
            config,
            pipeline: Mutex::new(None),
            snapshot: ArcSwap::from_pointee(DetectionSnapshot::disabled("Not configured")),
            diagnostics_tx,
            diagnostics_rx,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Rebuilds the pipeline for a new sample rate.
    ///
    /// The transform plan and bin table are built before the lock is taken;
    /// the old pipeline is released only after the new one is in place.
    /// Accumulated samples, the spectral average and the published
    /// detection all start from empty.
    ///
    /// # Returns
    /// * `Ok(())` - The detector is active at `sample_rate`
    /// * `Err(e)` - The pipeline could not be built; the detector is disabled
    pub fn configure(&self, sample_rate: u32) -> Result<()> {
        let pipeline = match Pipeline::build(&self.config, sample_rate) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                self.disable(&format!("Reconfiguration failed: {e:#}"));
                return Err(e);
            }
        };
        let window_size = pipeline.window_size;
        for anomaly in pipeline.table.anomalies() {
            self.emit(Diagnostic::TableAnomaly(*anomaly));
        }

        let previous = {
            let mut guard = self.lock();
            let snapshot = pipeline.snapshot();
            let previous = guard.replace(pipeline);
            self.snapshot.store(Arc::new(snapshot));
            previous
        };
        drop(previous);

        info!("Detector configured for {sample_rate} Hz, {window_size}-point transform");
        self.emit(Diagnostic::Reconfigured {
            sample_rate,
            window_size,
        });
        Ok(())
    }

    /// Tears down the pipeline and publishes a disabled snapshot.
    pub fn disable(&self, reason: &str) {
        let previous = {
            let mut guard = self.lock();
            let previous = guard.take();
            self.snapshot
                .store(Arc::new(DetectionSnapshot::disabled(reason)));
            previous
        };
        drop(previous);

        warn!("Detector disabled: {reason}");
        self.emit(Diagnostic::Disabled {
            reason: reason.to_string(),
        });
    }

    /// Feeds a block of raw 16-bit mono samples.
    ///
    /// Runs the full analysis when the block completes a window and then
    /// publishes a new snapshot. Blocks are ignored while disabled.
    pub fn process_block(&self, block: &[i16]) {
        let mut guard = self.lock();
        let Some(pipeline) = guard.as_mut() else {
            return;
        };
        let Some(window) = pipeline.accumulator.push(block) else {
            return;
        };

        trace!("Analysing {}-sample window", window.len());
        pipeline.analyse(&window, &self.config);
        self.snapshot.store(Arc::new(pipeline.snapshot()));
    }

    /// Drops any partially collected window, e.g. when capture stops.
    pub fn discard_partial_window(&self) {
        if let Some(pipeline) = self.lock().as_mut() {
            pipeline.accumulator.reset();
        }
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<DetectionSnapshot> {
        self.snapshot.load_full()
    }

    pub fn status(&self) -> DetectorStatus {
        self.snapshot.load().status.clone()
    }

    /// Label, drift and neighbor labels for the primary indicator.
    pub fn best_note(&self) -> Option<BestNoteReadout> {
        self.snapshot.load().readout.clone()
    }

    /// Score of every cell from the latest detection.
    pub fn all_scores(&self) -> Vec<NoteScore> {
        self.snapshot.load().scores.clone()
    }

    pub fn spectrum(&self) -> SpectrumSnapshot {
        self.snapshot.load().spectrum.clone()
    }

    /// The bin table of the current configuration, if active.
    pub fn table(&self) -> Option<Arc<NoteBinTable>> {
        self.lock().as_ref().map(|pipeline| pipeline.table.clone())
    }

    /// Receiver for diagnostics. Receivers share one queue, so each event is
    /// delivered to only one of them.
    pub fn diagnostics(&self) -> Receiver<Diagnostic> {
        self.diagnostics_rx.clone()
    }

    fn emit(&self, diagnostic: Diagnostic) {
        let _ = self.diagnostics_tx.try_send(diagnostic);
    }

    fn lock(&self) -> MutexGuard<'_, Option<Pipeline>> {
        self.pipeline.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
