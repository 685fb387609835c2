//! # Tuner Console
//!
//! Headless front end for the tuner. It lists the available microphones,
//! starts capture on one of them and prints every new detection as
//! `LABEL|drift` together with the neighboring notes.
//!
//! ## Configuration
//! - `TUNER_MIC`: index of the microphone to use (default 0)
//! - `TUNER_CONFIG`: path of a JSON detector config (default `tuner.json`,
//!   if present)
//! - `RUST_LOG`: log filter (default `info`)

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{select, tick};
use log::{debug, info, warn};
use tuner_core::audio::CpalSource;
use tuner_core::detector::format_detection;
use tuner_core::{BestNoteReadout, DetectorConfig, DetectorStatus, Diagnostic, Tuner};

const DEFAULT_CONFIG_PATH: &str = "tuner.json";
const REFRESH_INTERVAL: Duration = Duration::from_millis(50);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_config()?;
    let mut tuner = Tuner::new(CpalSource::new(), config)?;

    let names = tuner.available_microphone_names();
    if names.is_empty() {
        println!("No microphones found");
    }
    for (index, name) in names.iter().enumerate() {
        println!("[{index}] {name}");
    }

    let index = microphone_index()?;
    let diagnostics = tuner.detector().diagnostics();
    match tuner.select_microphone(index) {
        Ok(rate) => info!("Listening on microphone {index} at {rate} Hz"),
        Err(e) => {
            warn!("{e:#}");
            if let DetectorStatus::Disabled { reason } = tuner.status() {
                println!("{reason}");
            }
            return Ok(());
        }
    }

    let ticker = tick(REFRESH_INTERVAL);
    let mut last: Option<BestNoteReadout> = None;
    loop {
        select! {
            recv(ticker) -> _ => {
                let current = tuner.best_note_snapshot();
                if current != last {
                    if let Some(readout) = &current {
                        print_readout(readout);
                    }
                    last = current;
                }
            },
            recv(diagnostics) -> msg => match msg {
                Ok(diagnostic) => log_diagnostic(&diagnostic),
                Err(_) => {
                    warn!("Diagnostics channel closed");
                    break;
                }
            },
        }
    }

    tuner.stop();
    Ok(())
}

fn print_readout(readout: &BestNoteReadout) {
    println!(
        "{}    ({} <- -> {})",
        format_detection(&readout.label, readout.drift),
        readout.flat_neighbor.as_deref().unwrap_or("-"),
        readout.sharp_neighbor.as_deref().unwrap_or("-"),
    );
}

fn log_diagnostic(diagnostic: &Diagnostic) {
    match diagnostic {
        Diagnostic::TableAnomaly(anomaly) => debug!(
            "Table anomaly at {} ({:?} side)",
            anomaly.note.label(anomaly.octave),
            anomaly.side
        ),
        Diagnostic::Reconfigured {
            sample_rate,
            window_size,
        } => info!("Reconfigured: {sample_rate} Hz, {window_size}-point transform"),
        Diagnostic::Disabled { reason } => println!("{reason}"),
    }
}

/// Loads the detector configuration.
///
/// Reads `TUNER_CONFIG` if set, otherwise `tuner.json` when it exists, and
/// falls back to the built-in defaults.
fn load_config() -> Result<DetectorConfig> {
    let path = match std::env::var_os("TUNER_CONFIG") {
        Some(path) => PathBuf::from(path),
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if !path.exists() {
                return Ok(DetectorConfig::default());
            }
            path
        }
    };

    let mut file = File::open(&path)
        .with_context(|| format!("Opening config file {}", path.display()))?;
    let mut data = String::new();
    file.read_to_string(&mut data)?;
    let config: DetectorConfig = serde_json::from_str(&data)
        .with_context(|| format!("Parsing config file {}", path.display()))?;
    config.validate()?;

    info!("Loaded detector config from {}", path.display());
    Ok(config)
}

fn microphone_index() -> Result<usize> {
    match std::env::var("TUNER_MIC") {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("TUNER_MIC must be a device index, got {value:?}")),
        Err(_) => Ok(0),
    }
}
