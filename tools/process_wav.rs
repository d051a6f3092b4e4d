//! WAV-file front end for the syllable detector.
//!
//! Reads a mono WAV (16-bit PCM or float), streams it through the detector
//! in blocks, and prints one line per event. With an output path, accented
//! events are marked in a copy of the audio by a short 1 kHz pulse centered
//! on the event timestamp.
//!
//! Usage:
//!   process_wav <input.wav> [output.wav] [--json] [--config cfg.json]
//!
//! Environment overrides (applied before detector creation):
//!   SYLLABLE_THRESHOLD, SYLLABLE_ADAPT_K, SYLLABLE_ADAPT_TAU_MS,
//!   SYLLABLE_VOICED_HOLD_MS

use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::PathBuf;
use syllavox::{SyllableConfig, SyllableDetector, SyllableEvent};

const BLOCK_SIZE: usize = 1024;
const MAX_EVENTS: usize = 64;

/// Accent marker pulse: 1 kHz, 50 ms, i16 amplitude 15000.
const PULSE_FREQ_HZ: f32 = 1000.0;
const PULSE_DURATION_S: f32 = 0.05;
const PULSE_AMPLITUDE: f32 = 15000.0;

fn env_override(config: &mut SyllableConfig) {
    let read = |name: &str| -> Option<f32> {
        std::env::var(name).ok().and_then(|v| v.parse().ok())
    };
    if let Some(v) = read("SYLLABLE_THRESHOLD") {
        config.threshold_peak_rate = v;
    }
    if let Some(v) = read("SYLLABLE_ADAPT_K") {
        config.adaptive_peak_rate_k = v;
    }
    if let Some(v) = read("SYLLABLE_ADAPT_TAU_MS") {
        config.adaptive_peak_rate_tau_ms = v;
    }
    if let Some(v) = read("SYLLABLE_VOICED_HOLD_MS") {
        config.voiced_hold_ms = v;
    }
}

/// Read the input WAV as mono f32. Interleaved files keep channel 0 only.
fn read_mono(path: &PathBuf) -> Result<(Vec<f32>, u32)> {
    let reader = WavReader::open(path)
        .with_context(|| format!("failed to open input WAV '{}'", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    if spec.channels != 1 {
        eprintln!(
            "warning: {} channels, processing channel 0 only",
            spec.channels
        );
    }

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .step_by(channels)
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .step_by(channels)
            .collect::<std::result::Result<_, _>>()?,
        (format, bits) => bail!("unsupported WAV format: {:?} {} bit", format, bits),
    };

    Ok((samples, spec.sample_rate))
}

fn print_event(event: &SyllableEvent, json: bool) {
    if json {
        // One JSON object per line, easy to pipe into jq
        println!("{}", serde_json::to_string(event).unwrap());
    } else {
        println!(
            "{:8.3}s  {:<8}  prominence {:5.2}{}  f0 {:6.1} Hz  dur {:5.0} ms  fusion {:.2}",
            event.time_seconds,
            format!("{:?}", event.onset_type).to_lowercase(),
            event.prominence_score,
            if event.is_accented { "*" } else { " " },
            event.f0,
            event.duration_s * 1000.0,
            event.fusion_score,
        );
    }
}

/// Mix the accent marker into the sample buffer, centered on the timestamp.
fn mix_pulse(samples: &mut [f32], center: usize, sample_rate: u32) {
    let half = (PULSE_DURATION_S * sample_rate as f32 * 0.5) as usize;
    let start = center.saturating_sub(half);
    let end = (center + half).min(samples.len());

    for (i, sample) in samples[start..end].iter_mut().enumerate() {
        let t = i as f32 / sample_rate as f32;
        let pulse = (PULSE_AMPLITUDE / 32768.0)
            * (2.0 * std::f32::consts::PI * PULSE_FREQ_HZ * t).sin();
        *sample = (*sample + pulse).clamp(-1.0, 1.0);
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let mut input: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;
    let mut json = false;
    let mut config_path: Option<PathBuf> = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--json" => json = true,
            "--config" => {
                config_path = Some(PathBuf::from(
                    args.next().context("--config requires a path")?,
                ));
            }
            "--help" | "-h" => {
                println!("Usage: process_wav <input.wav> [output.wav] [--json] [--config cfg.json]");
                return Ok(());
            }
            _ if input.is_none() => input = Some(PathBuf::from(arg)),
            _ if output.is_none() => output = Some(PathBuf::from(arg)),
            other => bail!("unexpected argument '{}'", other),
        }
    }
    let input = input.context("usage: process_wav <input.wav> [output.wav]")?;

    let (mut samples, sample_rate) = read_mono(&input)?;

    let mut config = match &config_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config '{}'", path.display()))?;
            let mut cfg: SyllableConfig = serde_json::from_str(&text)?;
            cfg.sample_rate = sample_rate;
            cfg
        }
        None => SyllableConfig::default_for(sample_rate),
    };
    env_override(&mut config);

    if !json {
        println!("Processing {}", input.display());
        println!("Sample rate: {} Hz, {} samples", sample_rate, samples.len());
        println!(
            "PeakRate floor: {:.6}, adaptive k: {:.2}, tau: {:.1} ms, voiced hold: {:.1} ms",
            config.threshold_peak_rate,
            config.adaptive_peak_rate_k,
            config.adaptive_peak_rate_tau_ms,
            config.voiced_hold_ms,
        );
    }

    let mut detector = SyllableDetector::new(config)?;
    let mut events = [SyllableEvent::default(); MAX_EVENTS];
    let mut accents: Vec<u64> = Vec::new();
    let mut total_events = 0usize;

    let handle = |event: &SyllableEvent, accents: &mut Vec<u64>| {
        print_event(event, json);
        if event.is_accented {
            accents.push(event.timestamp_samples);
        }
    };

    for block in samples.chunks(BLOCK_SIZE) {
        let n = detector.process(block, &mut events);
        for event in &events[..n] {
            handle(event, &mut accents);
        }
        total_events += n;
    }
    let n = detector.flush(&mut events);
    for event in &events[..n] {
        handle(event, &mut accents);
    }
    total_events += n;

    if !json {
        println!("{} events, {} accented", total_events, accents.len());
    }

    if let Some(out_path) = output {
        for &ts in &accents {
            mix_pulse(&mut samples, ts as usize, sample_rate);
        }

        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&out_path, spec)
            .with_context(|| format!("failed to create '{}'", out_path.display()))?;
        for &s in &samples {
            writer.write_sample((s.clamp(-1.0, 1.0) * 32767.0) as i16)?;
        }
        writer.finalize()?;

        if !json {
            println!("Wrote pulse-marked audio to {}", out_path.display());
        }
    }

    Ok(())
}
