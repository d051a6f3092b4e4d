//! Output event types.

use serde::Serialize;

/// How a syllable onset was excited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OnsetType {
    /// Glottal excitation present at onset.
    #[serde(rename = "voiced")]
    Voiced,
    /// No voicing; detected from flux / high-frequency energy.
    #[serde(rename = "unvoiced")]
    Unvoiced,
    /// Voiced with significant high-frequency energy (voiced fricative).
    #[serde(rename = "mixed")]
    Mixed,
}

impl Default for OnsetType {
    fn default() -> Self {
        OnsetType::Unvoiced
    }
}

/// One detected syllable, annotated with the feature snapshot at its peak
/// and its prominence relative to the surrounding context window.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SyllableEvent {
    /// Sample index of the onset, absolute from stream start.
    pub timestamp_samples: u64,
    /// Onset time in seconds: `timestamp_samples / sample_rate`.
    pub time_seconds: f64,

    /// Max formant-envelope rise rate during the onset.
    pub peak_rate: f32,
    /// PeakRate rise slope: `peak_rate / rise_time_s`.
    pub pr_slope: f32,
    /// Spectral flux at the syllable peak.
    pub spectral_flux: f32,
    /// High-frequency band energy at the syllable peak.
    pub high_freq_energy: f32,
    /// Mel-cepstral delta at the syllable peak.
    pub mfcc_delta: f32,
    /// Wavelet bank transient score at the syllable peak.
    pub wavelet_score: f32,
    /// Fused feature score at the syllable peak.
    pub fusion_score: f32,

    /// Fundamental frequency at nucleus end; 0 when not estimated,
    /// otherwise within 50-600 Hz.
    pub f0: f32,
    /// F0 difference from the context median (Hz).
    pub delta_f0: f32,

    /// Onset-to-nucleus-end duration in seconds.
    pub duration_s: f32,
    /// Formant envelope integrated over onset + nucleus.
    pub energy: f32,

    /// Excitation class at onset.
    pub onset_type: OnsetType,

    /// Relative emphasis against the context window (>= 0).
    pub prominence_score: f32,
    /// Whether the prominence cleared the accent threshold.
    pub is_accented: bool,
}
