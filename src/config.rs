//! Detector configuration.
//!
//! Immutable after construction. `default_for(sample_rate)` fills every knob
//! with the tuned defaults; individual fields can then be overridden before
//! handing the config to [`crate::SyllableDetector::new`], which validates
//! it. Serde derives allow loading overrides from a JSON file (see
//! `tools/process_wav.rs`).

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Fallback rate used by `Default` (configs loaded from JSON normally have
/// the rate patched in from the audio source afterwards).
const DEFAULT_SAMPLE_RATE: u32 = 44_100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SyllableConfig {
    /// Audio sample rate in Hz. Required; everything else has defaults.
    pub sample_rate: u32,

    /// Window for removing the low-frequency trend from the ZFF output.
    pub zff_trend_window_ms: f32,

    /// Formant bandpass range for the PeakRate pipeline (Hz).
    pub peak_rate_band_min: f32,
    pub peak_rate_band_max: f32,

    /// Minimum distance between syllables; also the cooldown length.
    pub min_syllable_dist_ms: f32,
    /// Absolute floor for the PeakRate threshold.
    pub threshold_peak_rate: f32,
    /// Adaptive threshold = mean + k * std. 0 disables adaptation.
    pub adaptive_peak_rate_k: f32,
    /// Time constant for the adaptive statistics.
    pub adaptive_peak_rate_tau_ms: f32,
    /// How long voicing is held after the last glottal epoch.
    pub voiced_hold_ms: f32,

    /// Multipliers widening the on/off thresholds to prevent chattering.
    pub hysteresis_on_factor: f32,
    pub hysteresis_off_factor: f32,

    /// Number of neighbor events on each side used for prominence.
    pub context_size: usize,

    /// Feature module toggles.
    pub enable_spectral_flux: bool,
    pub enable_high_freq_energy: bool,
    pub enable_mfcc_delta: bool,
    pub enable_wavelet: bool,
    pub enable_agc: bool,

    /// Frame geometry for the framed analyzers.
    pub fft_size_ms: f32,
    pub hop_size_ms: f32,
    /// High-pass cutoff for the high-frequency energy tracker.
    pub high_freq_cutoff_hz: f32,

    /// Fusion weights (sum is normalized at use, so these are relative).
    pub weight_peak_rate: f32,
    pub weight_spectral_flux: f32,
    pub weight_high_freq: f32,
    pub weight_mfcc_delta: f32,
    pub weight_wavelet: f32,
    pub weight_voiced_bonus: f32,

    /// Fusion blend: `score = alpha * max + (1 - alpha) * weighted_avg`.
    pub fusion_blend_alpha: f32,

    /// Normalized-feature gate for the unvoiced onset path.
    pub unvoiced_onset_threshold: f32,
    pub allow_unvoiced_onsets: bool,

    /// Real-time mode: calibrated SNR thresholds instead of adaptive stats.
    pub realtime_mode: bool,
    /// Length of the initial quiet window used for calibration.
    pub calibration_duration_ms: f32,
    /// SNR threshold in dB; gamma = 10^(dB/10).
    pub snr_threshold_db: f32,
}

impl Default for SyllableConfig {
    fn default() -> Self {
        Self::default_for(DEFAULT_SAMPLE_RATE)
    }
}

impl SyllableConfig {
    /// Tuned defaults for the given sample rate.
    pub fn default_for(sample_rate: u32) -> Self {
        Self {
            sample_rate: if sample_rate > 0 {
                sample_rate
            } else {
                DEFAULT_SAMPLE_RATE
            },
            zff_trend_window_ms: 10.0,
            peak_rate_band_min: 500.0,
            peak_rate_band_max: 3200.0,
            min_syllable_dist_ms: 150.0,
            threshold_peak_rate: 0.0003,
            adaptive_peak_rate_k: 4.0,
            adaptive_peak_rate_tau_ms: 500.0,
            voiced_hold_ms: 30.0,
            hysteresis_on_factor: 1.2,
            hysteresis_off_factor: 0.8,
            context_size: 2,
            enable_spectral_flux: true,
            enable_high_freq_energy: true,
            enable_mfcc_delta: true,
            enable_wavelet: true,
            enable_agc: true,
            fft_size_ms: 32.0,
            hop_size_ms: 16.0,
            high_freq_cutoff_hz: 2000.0,
            // Feature weights (tuned for balanced detection)
            weight_peak_rate: 0.30,
            weight_spectral_flux: 0.25,
            weight_high_freq: 0.15,
            weight_mfcc_delta: 0.10,
            weight_wavelet: 0.20,
            weight_voiced_bonus: 0.10,
            fusion_blend_alpha: 0.6,
            unvoiced_onset_threshold: 0.5,
            allow_unvoiced_onsets: true,
            realtime_mode: false,
            calibration_duration_ms: 2000.0,
            snr_threshold_db: 6.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            bail!("sample_rate must be positive");
        }
        if self.peak_rate_band_min >= self.peak_rate_band_max {
            bail!(
                "peak_rate_band_min ({}) must be below peak_rate_band_max ({})",
                self.peak_rate_band_min,
                self.peak_rate_band_max
            );
        }
        Ok(())
    }

    /// Frame size in samples, rounded up to a power of two.
    pub fn fft_size(&self) -> usize {
        let raw = (self.fft_size_ms * 0.001 * self.sample_rate as f32) as usize;
        raw.max(1).next_power_of_two()
    }

    /// Hop size in samples.
    pub fn hop_size(&self) -> usize {
        ((self.hop_size_ms * 0.001 * self.sample_rate as f32) as usize).max(1)
    }

    /// Minimum inter-syllable distance in samples.
    pub fn min_dist_samples(&self) -> u64 {
        (self.min_syllable_dist_ms * 0.001 * self.sample_rate as f32) as u64
    }

    pub fn bandpass_center_hz(&self) -> f32 {
        (self.peak_rate_band_min + self.peak_rate_band_max) * 0.5
    }

    pub fn bandpass_q(&self) -> f32 {
        let bandwidth = (self.peak_rate_band_max - self.peak_rate_band_min).max(1.0);
        (self.bandpass_center_hz() / bandwidth).max(0.1)
    }
}
