//! # Audio Capture Module
//!
//! This module handles microphone capture. The detector only sees the
//! [`AudioSource`] trait; [`CpalSource`] implements it on top of CPAL
//! (Cross-Platform Audio Library).
//!
//! ## Features
//! - Input device enumeration
//! - Sample-rate negotiation by probing a descending list of rates
//! - Mono 16-bit sample delivery regardless of the device's native format

use anyhow::{Result, anyhow, bail};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfigRange};
use log::{debug, error, info, warn};

/// Receives each block of captured mono samples.
pub type SampleSink = Box<dyn FnMut(&[i16]) + Send + 'static>;

/// An input device as presented to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Position of the device in the enumeration.
    pub id: usize,
    pub name: String,
}

/// A provider of microphone samples.
pub trait AudioSource {
    /// Lists the available input devices in a stable order.
    fn enumerate_devices(&mut self) -> Result<Vec<DeviceDescriptor>>;

    /// Checks that `device` can capture at `sample_rate` by starting and
    /// immediately stopping a stream.
    fn probe(&mut self, device: usize, sample_rate: u32) -> Result<()>;

    /// Starts delivering 16-bit mono blocks to `sink`.
    fn start_capture(&mut self, device: usize, sample_rate: u32, sink: SampleSink) -> Result<()>;

    /// Stops capture. Safe to call when nothing is running.
    fn stop_capture(&mut self);
}

/// Finds the first of `candidates` that `device` accepts.
///
/// # Returns
/// * `Some(rate)` - The highest supported rate, as candidates are descending
/// * `None` - No candidate could be started
pub fn negotiate_sample_rate<S: AudioSource + ?Sized>(
    source: &mut S,
    device: usize,
    candidates: &[u32],
) -> Option<u32> {
    for &rate in candidates {
        match source.probe(device, rate) {
            Ok(()) => {
                info!("Supported maximum sample rate: {rate} Hz");
                return Some(rate);
            }
            Err(e) => debug!("Device {device} rejected {rate} Hz: {e:#}"),
        }
    }
    warn!("No supported sample rate found for device {device}");
    None
}

/// [`AudioSource`] backed by the default CPAL host.
pub struct CpalSource {
    host: cpal::Host,
    stream: Option<cpal::Stream>,
}

impl Default for CpalSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalSource {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
            stream: None,
        }
    }

    fn device(&self, id: usize) -> Result<cpal::Device> {
        self.host
            .input_devices()?
            .nth(id)
            .ok_or_else(|| anyhow!("No input device at index {id}"))
    }
}

impl AudioSource for CpalSource {
    fn enumerate_devices(&mut self) -> Result<Vec<DeviceDescriptor>> {
        let devices = self
            .host
            .input_devices()?
            .enumerate()
            .map(|(id, device)| DeviceDescriptor {
                id,
                name: device.name().unwrap_or_else(|_| format!("Input device {id}")),
            })
            .collect();
        Ok(devices)
    }

    fn probe(&mut self, device: usize, sample_rate: u32) -> Result<()> {
        let device = self.device(device)?;
        let stream = build_stream(&device, sample_rate, Box::new(|_: &[i16]| {}))?;
        stream.play()?;
        stream.pause()?;
        Ok(())
    }

    fn start_capture(&mut self, device: usize, sample_rate: u32, sink: SampleSink) -> Result<()> {
        self.stop_capture();
        let device = self.device(device)?;

        info!("Using audio input device: {}", device.name()?);
        let stream = build_stream(&device, sample_rate, sink)?;
        stream.play()?;
        self.stream = Some(stream);
        Ok(())
    }

    fn stop_capture(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Error pausing stream: {e}");
            }
            drop(stream);
            debug!("Capture stopped");
        }
    }
}

/// Opens an input stream that hands mono `i16` blocks to `sink`.
///
/// Multi-channel input keeps only the first channel. `f32` input is scaled
/// to the 16-bit range.
fn build_stream(device: &cpal::Device, sample_rate: u32, mut sink: SampleSink) -> Result<cpal::Stream> {
    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported = find_supported_config(configs, sample_rate)
        .ok_or_else(|| anyhow!("No i16 or f32 input format at {sample_rate} Hz"))?;

    let format = supported.sample_format();
    let config: cpal::StreamConfig = supported
        .with_sample_rate(cpal::SampleRate(sample_rate))
        .into();
    let channels = config.channels.max(1) as usize;

    let err_fn = |err| error!("An error occurred on the audio stream: {}", err);

    // Reused between callbacks to avoid allocating on the audio thread.
    let mut mono: Vec<i16> = Vec::new();

    let stream = match format {
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                mono.clear();
                mono.extend(data.iter().step_by(channels).copied());
                sink(&mono);
            },
            err_fn,
            None,
        )?,
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                mono.clear();
                mono.extend(data.iter().step_by(channels).map(|&s| f32_to_i16(s)));
                sink(&mono);
            },
            err_fn,
            None,
        )?,
        other => bail!("Unsupported sample format {other:?}"),
    };

    Ok(stream)
}

/// Finds a configuration covering `target_rate`, preferring mono and then
/// native 16-bit samples.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| matches!(c.sample_format(), SampleFormat::I16 | SampleFormat::F32))
        .filter(|c| c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0)
        .min_by_key(|c| (c.channels(), c.sample_format() != SampleFormat::I16))
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Scripted [`AudioSource`] for tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    pub struct FakeSource {
        pub devices: Vec<String>,
        /// Rates every device accepts.
        pub supported_rates: Vec<u32>,
        pub probes: Vec<(usize, u32)>,
        pub started: Vec<(usize, u32)>,
        pub stops: usize,
        /// Sink of the running capture, shared so tests can push samples.
        pub sink: Arc<Mutex<Option<SampleSink>>>,
    }

    impl FakeSource {
        pub fn new(devices: &[&str], supported_rates: &[u32]) -> Self {
            Self {
                devices: devices.iter().map(|d| d.to_string()).collect(),
                supported_rates: supported_rates.to_vec(),
                ..Default::default()
            }
        }
    }

    impl AudioSource for FakeSource {
        fn enumerate_devices(&mut self) -> Result<Vec<DeviceDescriptor>> {
            Ok(self
                .devices
                .iter()
                .enumerate()
                .map(|(id, name)| DeviceDescriptor {
                    id,
                    name: name.clone(),
                })
                .collect())
        }

        fn probe(&mut self, device: usize, sample_rate: u32) -> Result<()> {
            self.probes.push((device, sample_rate));
            if self.supported_rates.contains(&sample_rate) {
                Ok(())
            } else {
                bail!("{sample_rate} Hz not supported")
            }
        }

        fn start_capture(&mut self, device: usize, sample_rate: u32, sink: SampleSink) -> Result<()> {
            self.started.push((device, sample_rate));
            *self.sink.lock().unwrap() = Some(sink);
            Ok(())
        }

        fn stop_capture(&mut self) {
            self.stops += 1;
            self.sink.lock().unwrap().take();
        }
    }
}
