//! Real-time capture simulation driven from a WAV file.
//!
//! Enables realtime mode (calibration window + SNR thresholds), then feeds
//! the file in small chunks paced with sleeps as if it arrived from a
//! microphone. Events print the moment they are detected; during the
//! calibration window a progress line is shown instead.
//!
//! Usage:
//!   realtime_sim <input.wav> [--speed X] [--fast]

use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use syllavox::{OnsetType, SyllableConfig, SyllableDetector, SyllableEvent};

/// Samples per chunk (~16 ms at 16 kHz).
const CHUNK_SIZE: usize = 256;
const MAX_EVENTS: usize = 16;

fn print_event(event: &SyllableEvent) {
    let onset = match event.onset_type {
        OnsetType::Voiced => "VOICED",
        OnsetType::Unvoiced => "UNVOICED",
        OnsetType::Mixed => "MIXED",
    };
    println!(
        "\n[{:6.2}s] score {:.2} | pr {:.4} sf {:.3} hf {:.3} | {}",
        event.time_seconds, event.prominence_score, event.peak_rate, event.spectral_flux,
        event.high_freq_energy, onset
    );

    if event.is_accented {
        println!("  -> accented, well stressed");
    } else if event.prominence_score > 0.7 {
        println!("  -> moderate prominence");
    }
}

fn print_progress(percent: f64, events: usize, calibrating: bool) {
    let width = 40;
    let filled = (width as f64 * percent / 100.0) as usize;
    let bar: String = (0..width).map(|i| if i < filled { '=' } else { ' ' }).collect();
    print!(
        "\r[{}] {:5.1}% | events: {}{}  ",
        bar,
        percent,
        events,
        if calibrating { " (calibrating)" } else { "" }
    );
    let _ = std::io::stdout().flush();
}

fn main() -> Result<()> {
    env_logger::init();

    let mut input: Option<PathBuf> = None;
    let mut speed = 1.0f64;
    let mut simulate = true;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--speed" => {
                speed = args
                    .next()
                    .context("--speed requires a value")?
                    .parse()
                    .context("bad --speed value")?;
            }
            "--fast" => simulate = false,
            "--help" | "-h" => {
                println!("Usage: realtime_sim <input.wav> [--speed X] [--fast]");
                return Ok(());
            }
            _ => input = Some(PathBuf::from(arg)),
        }
    }
    let input = input.context("usage: realtime_sim <input.wav> [--speed X] [--fast]")?;

    let reader = WavReader::open(&input)
        .with_context(|| format!("failed to open '{}'", input.display()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    anyhow::ensure!(
        spec.sample_format == SampleFormat::Int && spec.bits_per_sample == 16,
        "realtime_sim expects 16-bit PCM input"
    );

    let samples: Vec<f32> = reader
        .into_samples::<i16>()
        .step_by(channels)
        .map(|s| s.map(|v| v as f32 / 32768.0))
        .collect::<std::result::Result<_, _>>()?;

    let mut config = SyllableConfig::default_for(spec.sample_rate);
    config.realtime_mode = true;
    let mut detector = SyllableDetector::new(config)?;

    println!(
        "Simulating realtime capture: {} Hz, {:.1}s, chunk {} samples",
        spec.sample_rate,
        samples.len() as f64 / spec.sample_rate as f64,
        CHUNK_SIZE
    );
    println!(
        "Calibrating for {:.1}s, keep quiet...",
        config.calibration_duration_ms / 1000.0
    );

    let chunk_duration = Duration::from_secs_f64(CHUNK_SIZE as f64 / spec.sample_rate as f64);
    let mut events = [SyllableEvent::default(); MAX_EVENTS];
    let mut total_events = 0usize;
    let mut was_calibrating = true;

    for (i, chunk) in samples.chunks(CHUNK_SIZE).enumerate() {
        let n = detector.process(chunk, &mut events);

        if was_calibrating && !detector.is_calibrating() {
            println!("\ncalibration done, detection live");
            was_calibrating = false;
        }

        for event in &events[..n] {
            print_event(event);
        }
        total_events += n;

        if i % 8 == 0 {
            let percent = 100.0 * (i * CHUNK_SIZE) as f64 / samples.len() as f64;
            print_progress(percent, total_events, detector.is_calibrating());
        }

        if simulate {
            std::thread::sleep(chunk_duration.div_f64(speed));
        }
    }

    let n = detector.flush(&mut events);
    for event in &events[..n] {
        print_event(event);
    }
    total_events += n;

    println!("\ndone: {} events", total_events);
    Ok(())
}
