//! # Tuner Module
//!
//! Ties an [`AudioSource`] to a [`PitchDetector`] and exposes what a display
//! needs: the microphone list, microphone selection, and read-only views of
//! the latest detection.

use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use log::{info, warn};

use crate::audio::{self, AudioSource, DeviceDescriptor};
use crate::config::{CANDIDATE_SAMPLE_RATES, DetectorConfig};
use crate::detector::{DetectorStatus, PitchDetector, SpectrumSnapshot};
use crate::{BestNoteReadout, NoteScore};

/// Status reason shown when no device rate could be negotiated.
pub const NO_USABLE_DEVICE: &str = "No usable audio device";

/// Microphone selection and detection front end.
pub struct Tuner<S: AudioSource> {
    source: S,
    detector: Arc<PitchDetector>,
    devices: Vec<DeviceDescriptor>,
    selected: Option<usize>,
    capturing: bool,
}

impl<S: AudioSource> Tuner<S> {
    /// Creates a tuner and enumerates the available microphones. Capture
    /// does not start until [`Tuner::select_microphone`] is called.
    pub fn new(source: S, config: DetectorConfig) -> Result<Self> {
        let detector = Arc::new(PitchDetector::new(config)?);
        let mut tuner = Self {
            source,
            detector,
            devices: Vec::new(),
            selected: None,
            capturing: false,
        };
        if let Err(e) = tuner.refresh_microphones() {
            warn!("Could not enumerate microphones: {e:#}");
        }
        Ok(tuner)
    }

    /// Re-reads the device list from the audio source.
    pub fn refresh_microphones(&mut self) -> Result<()> {
        self.devices = self.source.enumerate_devices()?;
        info!("Found {} input device(s)", self.devices.len());
        Ok(())
    }

    pub fn available_microphone_names(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.name.clone()).collect()
    }

    pub fn selected_microphone(&self) -> Option<usize> {
        self.selected
    }

    /// Switches capture to the microphone at `index`.
    ///
    /// This function:
    /// 1. Stops the running capture, discarding any partial window
    /// 2. Negotiates the highest supported sample rate
    /// 3. Rebuilds the detector for that rate
    /// 4. Starts capture into the detector
    ///
    /// # Returns
    /// * `Ok(rate)` - Capture is running at `rate`
    /// * `Err(e)` - The detector has been left disabled
    pub fn select_microphone(&mut self, index: usize) -> Result<u32> {
        self.stop();

        let Some(device) = self.devices.get(index).cloned() else {
            self.detector.disable(NO_USABLE_DEVICE);
            bail!("No microphone at index {index}");
        };
        self.selected = Some(index);
        info!("Selecting microphone {}: {}", index, device.name);

        let rate = audio::negotiate_sample_rate(&mut self.source, device.id, &CANDIDATE_SAMPLE_RATES)
            .ok_or_else(|| {
                self.detector.disable(NO_USABLE_DEVICE);
                anyhow!("No supported sample rate for {}", device.name)
            })?;

        self.detector.configure(rate)?;

        let detector = Arc::clone(&self.detector);
        let sink = Box::new(move |block: &[i16]| detector.process_block(block));
        if let Err(e) = self.source.start_capture(device.id, rate, sink) {
            self.detector.disable(&format!("Capture failed to start: {e:#}"));
            return Err(e);
        }
        self.capturing = true;
        Ok(rate)
    }

    /// Stops capture. Safe to call at any time.
    pub fn stop(&mut self) {
        if self.capturing {
            self.source.stop_capture();
            self.capturing = false;
        }
        self.detector.discard_partial_window();
    }

    pub fn detector(&self) -> &Arc<PitchDetector> {
        &self.detector
    }

    pub fn status(&self) -> DetectorStatus {
        self.detector.status()
    }

    pub fn best_note_snapshot(&self) -> Option<BestNoteReadout> {
        self.detector.best_note()
    }

    pub fn all_scores(&self) -> Vec<NoteScore> {
        self.detector.all_scores()
    }

    pub fn spectrum_snapshot(&self) -> SpectrumSnapshot {
        self.detector.spectrum()
    }
}

impl<S: AudioSource> Drop for Tuner<S> {
    fn drop(&mut self) {
        self.stop();
    }
}
