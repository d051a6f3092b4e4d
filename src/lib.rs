//! # syllavox
//!
//! Streaming syllable and accent detection for mono speech audio.
//!
//! Feed samples in, get a lazy stream of [`SyllableEvent`]s out: onset time,
//! acoustic feature snapshot, a voiced/unvoiced/mixed classification, a
//! prominence score relative to neighboring syllables, and an accent flag.
//!
//! ```no_run
//! use syllavox::{SyllableConfig, SyllableDetector, SyllableEvent};
//!
//! let config = SyllableConfig::default_for(16_000);
//! let mut detector = SyllableDetector::new(config)?;
//!
//! let mut events = [SyllableEvent::default(); 32];
//! let samples: Vec<f32> = vec![0.0; 16_000];
//! let n = detector.process(&samples, &mut events);
//! for event in &events[..n] {
//!     println!("{:.3}s prominence {:.2}", event.time_seconds, event.prominence_score);
//! }
//! let n = detector.flush(&mut events);
//! # let _ = n;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! The detector runs entirely sample-driven: a cascade of per-sample DSP
//! primitives (zero-frequency resonator, formant-band PeakRate, spectral
//! flux, high-frequency energy, MFCC delta, a Morlet wavelet bank, TEO and
//! local-energy-ratio saliency) fused by running-statistics normalization
//! into one decision signal, which drives a four-state onset machine with
//! hysteresis and F0-rise gating. See the [`dsp`] module for the primitives
//! and [`SyllableDetector`] for the pipeline.
//!
//! Real-time capture is served by a calibration mode
//! ([`SyllableDetector::set_realtime_mode`]) that fits SNR-based thresholds
//! from a short initial quiet window instead of waiting for adaptive
//! statistics to settle.
//!
//! A detector instance is single-threaded; separate instances are fully
//! independent. The per-sample path allocates nothing after construction.

pub mod calibration;
pub mod config;
pub mod detector;
pub mod dsp;
pub mod event;
pub mod prominence;
pub mod stats;

pub use config::SyllableConfig;
pub use detector::SyllableDetector;
pub use event::{OnsetType, SyllableEvent};
