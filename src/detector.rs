//! Streaming syllable detector.
//!
//! One instance owns the whole per-sample pipeline: AGC, ZFF voicing,
//! formant-band PeakRate, framed spectral flux and MFCC delta, the wavelet
//! bank, TEO/LER saliency and the adaptive energy floor, all fused into a
//! single decision signal that drives the onset state machine. Finished
//! syllables sit in a small ring until enough context has accumulated to
//! score their prominence, then stream out of [`SyllableDetector::process`].
//!
//! A detector is single-threaded by design: no internal locking, no
//! suspension points, allocation only in `new` and `reset`. Independent
//! instances are fully isolated and may live on different threads.

use anyhow::Result;
use log::{debug, info};

use crate::calibration::{
    RealtimeCalibration, FEAT_ENERGY, FEAT_HIGH_FREQ, FEAT_MFCC_DELTA, FEAT_PEAK_RATE,
    FEAT_SPECTRAL_FLUX, FEAT_WAVELET, NUM_FEATURES,
};
use crate::config::SyllableConfig;
use crate::dsp::{
    Agc, Biquad, EnergyFloor, EnvelopeFollower, HighFreqEnergy, LocalEnergyRatio, MfccDelta,
    SpectralFlux, TeagerEnergy, VoicingTracker, WaveletBank, ZeroFreqResonator,
};
use crate::event::{OnsetType, SyllableEvent};
use crate::prominence::{EventRing, FLUSH_ACCENT_THRESHOLD, STREAMING_ACCENT_THRESHOLD};
use crate::stats::FeatureStats;

// --- Pipeline constants ---

/// Formant envelope ballistics (ms).
const ENV_ATTACK_MS: f32 = 5.0;
const ENV_RELEASE_MS: f32 = 20.0;

/// High-frequency energy smoothing window (ms).
const HFE_WINDOW_MS: f32 = 10.0;

/// Wavelet bank coverage for high-frequency transients.
const WAVELET_MIN_HZ: f32 = 2000.0;
const WAVELET_MAX_HZ: f32 = 6000.0;
const WAVELET_SCALES: usize = 3;

/// AGC targets broadcast level with a bounded boost.
const AGC_TARGET_DB: f32 = -23.0;
const AGC_MAX_GAIN_DB: f32 = 30.0;

/// Hard time caps on the onset states.
const MAX_ONSET_RISING_S: f32 = 0.050;
const MAX_NUCLEUS_S: f32 = 0.100;

/// Fusion trigger bases, scaled by the hysteresis factors. 0.6 on the
/// sigmoid-normalized scale corresponds to roughly mean + 1.4 sigma.
const FUSION_ON_BASE: f32 = 0.6;
const FUSION_OFF_BASE: f32 = 0.4;

/// Strong-evidence bypass gates for the F0-rise condition.
const STRONG_FUSION: f32 = 0.85;
const STRONG_TEO_Z: f32 = 3.0;
const STRONG_LER: f32 = 2.0;
const STRONG_FLATNESS_WEBER: f32 = -0.3;

/// Fusion score history for the online mean/MAD baseline.
const FUSION_HISTORY_SIZE: usize = 64;

/// Real-time energy gate: required margin over the calibrated noise energy,
/// and an absolute floor (~-60 dB) so quiet rooms cannot trigger.
const RT_ENERGY_MARGIN: f32 = 3.0;
const RT_MIN_ABS_ENERGY: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetectorState {
    Idle,
    OnsetRising,
    Nucleus,
    Cooldown,
}

pub struct SyllableDetector {
    config: SyllableConfig,
    total_samples: u64,

    // DSP modules (all singly owned)
    agc: Option<Agc>,
    zfr: ZeroFreqResonator,
    voicing: VoicingTracker,
    bp_filter: Biquad,
    env_follower: EnvelopeFollower,
    spectral_flux: Option<SpectralFlux>,
    high_freq: Option<HighFreqEnergy>,
    mfcc: Option<MfccDelta>,
    wavelet: Option<WaveletBank>,
    teo: TeagerEnergy,
    ler: LocalEnergyRatio,
    energy_floor: EnergyFloor,

    // PeakRate and energy
    prev_env: f32,
    current_peak_rate: f32,
    current_energy: f32,

    // Adaptive PeakRate threshold
    adaptive_enabled: bool,
    adaptive_alpha: f32,
    adaptive_mean: f32,
    adaptive_var: f32,

    // Per-feature statistics for normalization
    stats_peak_rate: FeatureStats,
    stats_spectral_flux: FeatureStats,
    stats_high_freq: FeatureStats,
    stats_mfcc_delta: FeatureStats,
    stats_wavelet: FeatureStats,

    // Latest feature values (framed ones update per hop)
    current_spectral_flux: f32,
    current_high_freq_energy: f32,
    current_mfcc_delta: f32,
    current_wavelet_score: f32,
    current_fusion_score: f32,

    // Online fusion baseline (mean standing in for median, plus MAD)
    fusion_history: [f32; FUSION_HISTORY_SIZE],
    fusion_history_idx: usize,
    fusion_history_count: usize,
    fusion_mean: f32,
    fusion_mad: f32,

    // State machine
    state: DetectorState,
    state_timer: u64,
    max_onset_rising_samples: u64,
    max_nucleus_samples: u64,

    // Work-in-progress event
    wip_event: SyllableEvent,
    max_peak_rate: f32,
    max_fusion: f32,
    energy_accum: f32,
    onset_timestamp: u64,
    peak_sample_offset: u64,
    onset_type: OnsetType,
    last_event_samples: u64,

    ring: EventRing,
    rt_cal: RealtimeCalibration,
}

impl SyllableDetector {
    /// Validate the configuration, allocate every module, and arm real-time
    /// calibration if requested. All allocation happens here.
    pub fn new(config: SyllableConfig) -> Result<Self> {
        config.validate()?;

        let sr = config.sample_rate;
        let fft_size = config.fft_size();
        let hop_size = config.hop_size();

        let mut bp_filter = Biquad::new();
        bp_filter.update_bandpass(
            config.bandpass_center_hz(),
            config.bandpass_q(),
            sr as f32,
        );

        let adaptive_enabled =
            config.adaptive_peak_rate_k > 0.0 && config.adaptive_peak_rate_tau_ms > 0.0;
        let adaptive_alpha = if adaptive_enabled {
            (1.0 / (config.adaptive_peak_rate_tau_ms * 0.001 * sr as f32)).min(1.0)
        } else {
            0.0
        };

        let tau = config.adaptive_peak_rate_tau_ms;

        let mut detector = Self {
            config,
            total_samples: 0,
            agc: config
                .enable_agc
                .then(|| Agc::new(sr, AGC_TARGET_DB, AGC_MAX_GAIN_DB)),
            zfr: ZeroFreqResonator::new(sr, config.zff_trend_window_ms),
            voicing: VoicingTracker::new(sr, config.voiced_hold_ms),
            bp_filter,
            env_follower: EnvelopeFollower::new(sr as f32, ENV_ATTACK_MS, ENV_RELEASE_MS),
            spectral_flux: config
                .enable_spectral_flux
                .then(|| SpectralFlux::new(fft_size, hop_size)),
            high_freq: config
                .enable_high_freq_energy
                .then(|| HighFreqEnergy::new(sr, config.high_freq_cutoff_hz, HFE_WINDOW_MS)),
            mfcc: config
                .enable_mfcc_delta
                .then(|| MfccDelta::new(sr, fft_size, hop_size)),
            wavelet: config
                .enable_wavelet
                .then(|| WaveletBank::new(sr, WAVELET_MIN_HZ, WAVELET_MAX_HZ, WAVELET_SCALES)),
            teo: TeagerEnergy::new(),
            ler: LocalEnergyRatio::new(sr),
            energy_floor: EnergyFloor::new(),
            prev_env: 0.0,
            current_peak_rate: 0.0,
            current_energy: 0.0,
            adaptive_enabled,
            adaptive_alpha,
            adaptive_mean: 0.0,
            adaptive_var: 0.0,
            stats_peak_rate: FeatureStats::new(tau, sr),
            stats_spectral_flux: FeatureStats::new(tau, sr),
            stats_high_freq: FeatureStats::new(tau, sr),
            stats_mfcc_delta: FeatureStats::new(tau, sr),
            stats_wavelet: FeatureStats::new(tau, sr),
            current_spectral_flux: 0.0,
            current_high_freq_energy: 0.0,
            current_mfcc_delta: 0.0,
            current_wavelet_score: 0.0,
            current_fusion_score: 0.0,
            fusion_history: [0.0; FUSION_HISTORY_SIZE],
            fusion_history_idx: 0,
            fusion_history_count: 0,
            fusion_mean: 0.5,
            fusion_mad: 0.2,
            state: DetectorState::Idle,
            state_timer: 0,
            max_onset_rising_samples: (MAX_ONSET_RISING_S * sr as f32) as u64,
            max_nucleus_samples: (MAX_NUCLEUS_S * sr as f32) as u64,
            wip_event: SyllableEvent::default(),
            max_peak_rate: 0.0,
            max_fusion: 0.0,
            energy_accum: 0.0,
            onset_timestamp: 0,
            peak_sample_offset: 0,
            onset_type: OnsetType::Unvoiced,
            last_event_samples: 0,
            ring: EventRing::new(config.context_size),
            rt_cal: RealtimeCalibration::new(),
        };

        if detector.config.realtime_mode {
            detector.arm_calibration();
        }

        debug!(
            "detector created: sr={} fft={} hop={} realtime={}",
            sr, fft_size, hop_size, detector.config.realtime_mode
        );

        Ok(detector)
    }

    /// Zero all runtime state, keeping the configuration. DSP coefficients
    /// are rebuilt; real-time mode re-arms its calibration window.
    pub fn reset(&mut self) {
        self.total_samples = 0;
        self.prev_env = 0.0;
        self.current_peak_rate = 0.0;
        self.current_energy = 0.0;

        if let Some(agc) = &mut self.agc {
            agc.reset();
        }
        self.zfr.reset();
        self.voicing.reset();
        self.bp_filter.reset_state();
        self.bp_filter.update_bandpass(
            self.config.bandpass_center_hz(),
            self.config.bandpass_q(),
            self.config.sample_rate as f32,
        );
        self.env_follower.reset();
        if let Some(sf) = &mut self.spectral_flux {
            sf.reset();
        }
        if let Some(hfe) = &mut self.high_freq {
            hfe.reset();
        }
        if let Some(mfcc) = &mut self.mfcc {
            mfcc.reset();
        }
        if let Some(wavelet) = &mut self.wavelet {
            wavelet.reset();
        }
        self.teo.reset();
        self.ler.reset();
        self.energy_floor.reset();

        self.adaptive_mean = 0.0;
        self.adaptive_var = 0.0;

        let tau = self.config.adaptive_peak_rate_tau_ms;
        let sr = self.config.sample_rate;
        self.stats_peak_rate = FeatureStats::new(tau, sr);
        self.stats_spectral_flux = FeatureStats::new(tau, sr);
        self.stats_high_freq = FeatureStats::new(tau, sr);
        self.stats_mfcc_delta = FeatureStats::new(tau, sr);
        self.stats_wavelet = FeatureStats::new(tau, sr);

        self.current_spectral_flux = 0.0;
        self.current_high_freq_energy = 0.0;
        self.current_mfcc_delta = 0.0;
        self.current_wavelet_score = 0.0;
        self.current_fusion_score = 0.0;

        self.fusion_history = [0.0; FUSION_HISTORY_SIZE];
        self.fusion_history_idx = 0;
        self.fusion_history_count = 0;
        self.fusion_mean = 0.5;
        self.fusion_mad = 0.2;

        self.state = DetectorState::Idle;
        self.state_timer = 0;
        self.wip_event = SyllableEvent::default();
        self.max_peak_rate = 0.0;
        self.max_fusion = 0.0;
        self.energy_accum = 0.0;
        self.onset_timestamp = 0;
        self.peak_sample_offset = 0;
        self.onset_type = OnsetType::Unvoiced;
        self.last_event_samples = 0;

        self.ring.clear();

        self.rt_cal = RealtimeCalibration::new();
        if self.config.realtime_mode {
            self.arm_calibration();
        }
    }

    /// Consume a block of mono samples. Ready events (those with enough
    /// prominence context) are written to `events_out`; the return value is
    /// how many were written. Events that do not fit stay buffered for the
    /// next call, preserving timestamp order across calls.
    pub fn process(&mut self, input: &[f32], events_out: &mut [SyllableEvent]) -> usize {
        let mut written = 0;

        for &raw in input {
            let sample = match &mut self.agc {
                Some(agc) => agc.process(raw),
                None => raw,
            };

            self.total_samples += 1;

            // Voicing / F0
            let zff_out = self.zfr.process(sample);
            self.voicing.process(zff_out);

            // PeakRate pipeline + energy tracking
            let bp_out = self.bp_filter.process(sample);
            let env_out = self.env_follower.process(bp_out);
            let peak_rate = (env_out - self.prev_env).max(0.0);
            self.prev_env = env_out;
            self.current_peak_rate = peak_rate;
            self.current_energy = env_out;
            self.energy_floor.update(env_out);

            self.teo.process(sample);
            self.ler.process(sample);

            if self.voicing.is_voiced() || self.config.allow_unvoiced_onsets {
                self.stats_peak_rate.update(peak_rate);
            }

            // Multi-feature fan-out
            if let Some(sf) = &mut self.spectral_flux {
                if let Some(flux) = sf.process(sample) {
                    self.current_spectral_flux = flux;
                    self.stats_spectral_flux.update(flux);
                }
            }
            if let Some(hfe) = &mut self.high_freq {
                self.current_high_freq_energy = hfe.process(sample);
                self.stats_high_freq.update(self.current_high_freq_energy);
            }
            if let Some(mfcc) = &mut self.mfcc {
                if let Some(delta) = mfcc.process(sample) {
                    self.current_mfcc_delta = delta;
                    self.stats_mfcc_delta.update(delta);
                }
            }
            if let Some(wavelet) = &mut self.wavelet {
                self.current_wavelet_score = wavelet.process(sample);
                self.stats_wavelet.update(self.current_wavelet_score);
            }

            if self.config.realtime_mode && self.rt_cal.is_calibrating() {
                let values = self.calibration_snapshot();
                self.rt_cal.push(&values, self.config.snr_threshold_db);
            }

            self.current_fusion_score = self.compute_fusion();
            self.update_fusion_baseline();

            // Adaptive threshold statistics track voiced PeakRate only
            if self.adaptive_enabled && self.voicing.is_voiced() {
                let delta = peak_rate - self.adaptive_mean;
                self.adaptive_mean += self.adaptive_alpha * delta;
                self.adaptive_var = (1.0 - self.adaptive_alpha)
                    * (self.adaptive_var + self.adaptive_alpha * delta * delta);
            }

            // During calibration only the noise statistics matter; the state
            // machine stays frozen and nothing can be emitted
            if self.config.realtime_mode && self.rt_cal.is_calibrating() {
                continue;
            }

            self.step_state_machine(peak_rate, env_out);

            let context_needed = if self.config.realtime_mode {
                0
            } else {
                self.config.context_size
            };
            while self.ring.len() > context_needed && written < events_out.len() {
                if let Some(event) = self.ring.pop_scored(STREAMING_ACCENT_THRESHOLD) {
                    events_out[written] = event;
                    written += 1;
                }
            }
        }

        written
    }

    /// Drain the ring unconditionally, scoring each remaining event against
    /// whatever context still surrounds it. Timestamps stay monotonic with
    /// everything emitted before.
    pub fn flush(&mut self, events_out: &mut [SyllableEvent]) -> usize {
        let mut written = 0;
        while !self.ring.is_empty() && written < events_out.len() {
            if let Some(event) = self.ring.pop_scored(FLUSH_ACCENT_THRESHOLD) {
                events_out[written] = event;
                written += 1;
            }
        }
        written
    }

    // --- Real-time mode API ---

    pub fn set_realtime_mode(&mut self, enable: bool) {
        self.config.realtime_mode = enable;
        if enable {
            self.arm_calibration();
            info!("realtime mode enabled, calibrating");
        }
    }

    /// Restart calibration; enables real-time mode if it was off.
    pub fn recalibrate(&mut self) {
        self.config.realtime_mode = true;
        self.arm_calibration();
    }

    pub fn is_calibrating(&self) -> bool {
        self.rt_cal.is_calibrating()
    }

    /// Adjust the SNR threshold. Applies immediately when already calibrated.
    pub fn set_snr_threshold(&mut self, snr_db: f32) {
        self.config.snr_threshold_db = snr_db;
        if self.config.realtime_mode && !self.rt_cal.is_calibrating() {
            self.rt_cal.set_gamma_from_snr(snr_db);
        }
    }

    // --- Introspection ---

    pub fn config(&self) -> &SyllableConfig {
        &self.config
    }

    pub fn fusion_score(&self) -> f32 {
        self.current_fusion_score
    }

    pub fn is_voiced(&self) -> bool {
        self.voicing.is_voiced()
    }

    pub fn smoothed_f0(&self) -> f32 {
        self.voicing.smoothed_f0()
    }

    /// Current F0 distance from the slow baseline, in semitones.
    pub fn f0_semitone_diff(&self) -> f32 {
        self.voicing.semitone_diff()
    }

    /// Online fusion baseline: (mean, mean absolute deviation) over the
    /// recent score history.
    pub fn fusion_baseline(&self) -> (f32, f32) {
        (self.fusion_mean, self.fusion_mad)
    }

    // --- Internals ---

    fn arm_calibration(&mut self) {
        let target = (self.config.calibration_duration_ms * 0.001
            * self.config.sample_rate as f32) as usize;
        self.rt_cal.arm(target);
    }

    fn calibration_snapshot(&self) -> [f32; NUM_FEATURES] {
        let mut values = [0.0; NUM_FEATURES];
        values[FEAT_ENERGY] = self.current_energy;
        values[FEAT_PEAK_RATE] = self.current_peak_rate;
        values[FEAT_SPECTRAL_FLUX] = self.current_spectral_flux;
        values[FEAT_HIGH_FREQ] = self.current_high_freq_energy;
        values[FEAT_MFCC_DELTA] = self.current_mfcc_delta;
        values[FEAT_WAVELET] = self.current_wavelet_score;
        values
    }

    fn update_fusion_baseline(&mut self) {
        self.fusion_history[self.fusion_history_idx] = self.current_fusion_score;
        self.fusion_history_idx = (self.fusion_history_idx + 1) % FUSION_HISTORY_SIZE;
        if self.fusion_history_count < FUSION_HISTORY_SIZE {
            self.fusion_history_count += 1;
        }

        // Recompute every 16 samples; a running mean approximates the median
        // well enough for an online baseline
        if self.total_samples % 16 == 0 && self.fusion_history_count >= 8 {
            let n = self.fusion_history_count;
            let slice = &self.fusion_history[..n];
            let mean = slice.iter().sum::<f32>() / n as f32;
            let mad = slice.iter().map(|v| (v - mean).abs()).sum::<f32>() / n as f32;
            self.fusion_mean = mean;
            self.fusion_mad = mad;
        }
    }

    /// Offline fusion: energy-gated blend of max and weighted average over
    /// the sigmoid-normalized features, scaled down while statistics are
    /// still unstable.
    fn compute_fusion(&self) -> f32 {
        if self.config.realtime_mode {
            return self.compute_fusion_realtime();
        }

        // Energy gate: too close to the noise floor scores zero outright
        let floor = self.energy_floor.current();
        let energy_ratio = if floor > 1e-8 {
            self.current_energy / floor
        } else {
            1.0
        };
        if self.current_energy < 1e-6 || energy_ratio < 1.5 {
            return 0.0;
        }

        let cfg = &self.config;
        let (norm_pr, conf_pr) = self.stats_peak_rate.normalize_sigmoid(self.current_peak_rate);

        let mut weighted_avg = cfg.weight_peak_rate * norm_pr;
        let mut w_total = cfg.weight_peak_rate;
        let mut max_feature = norm_pr;
        let mut conf_sum = conf_pr;
        let mut conf_count = 1;

        if self.spectral_flux.is_some() {
            let (norm, conf) = self
                .stats_spectral_flux
                .normalize_sigmoid(self.current_spectral_flux);
            weighted_avg += cfg.weight_spectral_flux * norm;
            w_total += cfg.weight_spectral_flux;
            max_feature = max_feature.max(norm);
            conf_sum += conf;
            conf_count += 1;
        }
        if self.high_freq.is_some() {
            let (norm, conf) = self
                .stats_high_freq
                .normalize_sigmoid(self.current_high_freq_energy);
            weighted_avg += cfg.weight_high_freq * norm;
            w_total += cfg.weight_high_freq;
            max_feature = max_feature.max(norm);
            conf_sum += conf;
            conf_count += 1;
        }
        if self.mfcc.is_some() {
            let (norm, conf) = self
                .stats_mfcc_delta
                .normalize_sigmoid(self.current_mfcc_delta);
            weighted_avg += cfg.weight_mfcc_delta * norm;
            w_total += cfg.weight_mfcc_delta;
            max_feature = max_feature.max(norm);
            conf_sum += conf;
            conf_count += 1;
        }
        if self.wavelet.is_some() {
            // Wavelet contributes to the score, confidence is not tracked
            let (norm, _) = self
                .stats_wavelet
                .normalize_sigmoid(self.current_wavelet_score);
            weighted_avg += cfg.weight_wavelet * norm;
            w_total += cfg.weight_wavelet;
            max_feature = max_feature.max(norm);
        }

        let voiced_bonus = if self.voicing.is_voiced() { 1.0 } else { 0.0 };
        weighted_avg += cfg.weight_voiced_bonus * voiced_bonus;
        w_total += cfg.weight_voiced_bonus;

        if w_total > 0.0 {
            weighted_avg /= w_total;
        }

        let alpha = cfg.fusion_blend_alpha;
        let mut fusion = alpha * max_feature + (1.0 - alpha) * weighted_avg;

        let avg_confidence = conf_sum / conf_count as f32;
        if avg_confidence < 0.3 {
            fusion *= 0.5 + avg_confidence;
        }

        fusion
    }

    /// Real-time fusion: geometric mean of the feature/threshold ratios that
    /// exceed 1, squashed into [0, 1). Threshold-relative by construction, so
    /// it needs no adaptive statistics.
    fn compute_fusion_realtime(&self) -> f32 {
        if self.rt_cal.is_calibrating() {
            return 0.0;
        }

        let values = self.calibration_snapshot();
        let mut active = 0u32;
        let mut log_sum = 0.0f32;

        for (k, &v) in values.iter().enumerate() {
            let r = v / self.rt_cal.threshold(k);
            if r > 1.0 {
                active += 1;
                log_sum += r.ln();
            }
        }

        let voiced_conf = (self.voicing.voicing_counter() as f32 / 5.0).min(1.0);
        if voiced_conf > 0.5 {
            active += 1;
            log_sum += (1.0 + voiced_conf).ln();
        }

        if active == 0 {
            return 0.0;
        }

        // geo_mean = 1 -> 0.5, 2 -> ~0.73, 4 -> ~0.88
        let geo_mean = (log_sum / active as f32).exp();
        1.0 - 1.0 / (1.0 + 0.5 * geo_mean)
    }

    fn determine_onset_type(&self) -> OnsetType {
        if self.voicing.is_voiced() {
            let hf_norm = if self.high_freq.is_some() {
                self.stats_high_freq
                    .normalize_clamped(self.current_high_freq_energy)
            } else {
                0.0
            };
            if hf_norm > 0.5 {
                // Voiced fricative
                OnsetType::Mixed
            } else {
                OnsetType::Voiced
            }
        } else {
            OnsetType::Unvoiced
        }
    }

    fn step_state_machine(&mut self, peak_rate: f32, env_out: f32) {
        let cfg = &self.config;

        let mut threshold = cfg.threshold_peak_rate;
        if self.adaptive_enabled {
            let std = if self.adaptive_var > 0.0 {
                self.adaptive_var.sqrt()
            } else {
                0.0
            };
            let adaptive = self.adaptive_mean + cfg.adaptive_peak_rate_k * std;
            threshold = threshold.max(adaptive);
        }
        let threshold_on = threshold * cfg.hysteresis_on_factor;
        let fusion_on = FUSION_ON_BASE * cfg.hysteresis_on_factor;
        let fusion_off = FUSION_OFF_BASE * cfg.hysteresis_off_factor;

        let fusion = self.current_fusion_score;
        let voiced = self.voicing.is_voiced();

        match self.state {
            DetectorState::Idle => {
                let voiced_trigger = peak_rate > threshold_on && voiced;
                let fusion_trigger =
                    fusion > fusion_on && (cfg.allow_unvoiced_onsets || voiced);

                let unvoiced_trigger = if cfg.allow_unvoiced_onsets && !voiced {
                    let sf_norm = if self.spectral_flux.is_some() {
                        self.stats_spectral_flux
                            .normalize_clamped(self.current_spectral_flux)
                    } else {
                        0.0
                    };
                    let hf_norm = if self.high_freq.is_some() {
                        self.stats_high_freq
                            .normalize_clamped(self.current_high_freq_energy)
                    } else {
                        0.0
                    };
                    sf_norm > cfg.unvoiced_onset_threshold
                        || hf_norm > cfg.unvoiced_onset_threshold
                } else {
                    false
                };

                if !(voiced_trigger || fusion_trigger || unvoiced_trigger) {
                    return;
                }

                // The F0 gate suppresses echoes and continuations: a new
                // syllable should come with a pitch reset. It yields to
                // strong single-feature evidence or plain elapsed time.
                let flatness_weber = self
                    .spectral_flux
                    .as_ref()
                    .map_or(0.0, |sf| sf.flatness_weber());
                let strong_evidence = fusion > STRONG_FUSION
                    || self.teo.z_score() > STRONG_TEO_Z
                    || self.ler.current() > STRONG_LER
                    || flatness_weber < STRONG_FLATNESS_WEBER;

                let elapsed = self.total_samples - self.last_event_samples;
                let enough_time_passed = elapsed > cfg.min_dist_samples() * 2;

                let f0_allows_new_onset = cfg.realtime_mode
                    || self.voicing.f0_has_risen()
                    || strong_evidence
                    || enough_time_passed;

                // Real-time only: energy must clear the calibrated noise
                // level with margin
                let energy_gate_passed = if cfg.realtime_mode && !self.rt_cal.is_calibrating() {
                    self.current_energy > self.rt_cal.threshold(FEAT_ENERGY) * RT_ENERGY_MARGIN
                        && self.current_energy > RT_MIN_ABS_ENERGY
                } else {
                    true
                };

                if f0_allows_new_onset && energy_gate_passed {
                    self.enter_onset(peak_rate, env_out);
                }
            }

            DetectorState::OnsetRising => {
                self.state_timer += 1;
                self.energy_accum += env_out;

                if peak_rate > self.max_peak_rate {
                    self.max_peak_rate = peak_rate;
                    self.wip_event.peak_rate = peak_rate;
                    self.peak_sample_offset = self.state_timer;
                }
                if fusion > self.max_fusion {
                    self.max_fusion = fusion;
                    self.wip_event.fusion_score = fusion;
                }
                self.wip_event.spectral_flux =
                    self.wip_event.spectral_flux.max(self.current_spectral_flux);
                self.wip_event.high_freq_energy = self
                    .wip_event
                    .high_freq_energy
                    .max(self.current_high_freq_energy);
                self.wip_event.mfcc_delta =
                    self.wip_event.mfcc_delta.max(self.current_mfcc_delta);
                self.wip_event.wavelet_score =
                    self.wip_event.wavelet_score.max(self.current_wavelet_score);

                let pr_dropping = peak_rate < self.max_peak_rate * 0.5;
                let fusion_dropping = fusion < self.max_fusion * 0.6;
                let time_limit = self.state_timer > self.max_onset_rising_samples;

                if pr_dropping || fusion_dropping || time_limit {
                    self.state = DetectorState::Nucleus;
                    let rise_time_s =
                        (self.peak_sample_offset + 1) as f32 / cfg.sample_rate as f32;
                    self.wip_event.pr_slope = self.max_peak_rate / (rise_time_s + 1e-4);
                }

                // A voiced onset that loses voicing mid-rise was a false start
                if !voiced && self.onset_type == OnsetType::Voiced {
                    self.state = DetectorState::Cooldown;
                }
            }

            DetectorState::Nucleus => {
                self.state_timer += 1;
                self.energy_accum += env_out;

                let energy_low = if cfg.realtime_mode {
                    // PeakRate may be near zero here; compare against the
                    // onset energy snapshot instead
                    let peak_energy = if self.wip_event.energy > 0.0 {
                        self.wip_event.energy
                    } else {
                        self.max_fusion
                    };
                    self.current_energy < peak_energy * 0.2
                } else {
                    env_out < self.wip_event.peak_rate * 0.1
                };

                let voicing_lost = !voiced && self.onset_type == OnsetType::Voiced;
                let fusion_low = fusion < fusion_off;
                let nucleus_timeout = self.state_timer > self.max_nucleus_samples;

                if energy_low || voicing_lost || fusion_low || nucleus_timeout {
                    self.state = DetectorState::Cooldown;
                    self.finalize_event();
                }
            }

            DetectorState::Cooldown => {
                self.state_timer += 1;
                if self.state_timer > cfg.min_dist_samples() {
                    self.state = DetectorState::Idle;
                }
            }
        }
    }

    fn enter_onset(&mut self, peak_rate: f32, env_out: f32) {
        self.state = DetectorState::OnsetRising;
        self.state_timer = 0;
        self.onset_type = self.determine_onset_type();

        self.wip_event = SyllableEvent {
            timestamp_samples: self.total_samples,
            time_seconds: self.total_samples as f64 / self.config.sample_rate as f64,
            peak_rate,
            pr_slope: 0.0,
            energy: env_out,
            f0: self.voicing.current_f0(),
            delta_f0: 0.0,
            duration_s: 0.0,
            spectral_flux: self.current_spectral_flux,
            high_freq_energy: self.current_high_freq_energy,
            mfcc_delta: self.current_mfcc_delta,
            wavelet_score: self.current_wavelet_score,
            fusion_score: self.current_fusion_score,
            onset_type: self.onset_type,
            prominence_score: 0.0,
            is_accented: false,
        };

        self.max_peak_rate = peak_rate;
        self.max_fusion = self.current_fusion_score;
        self.energy_accum = env_out;
        self.onset_timestamp = self.total_samples;
        self.peak_sample_offset = 0;

        self.voicing.mark_event();
    }

    fn finalize_event(&mut self) {
        self.wip_event.duration_s =
            (self.total_samples - self.onset_timestamp) as f32 / self.config.sample_rate as f32;
        self.wip_event.energy = self.energy_accum;
        self.wip_event.f0 = self.voicing.current_f0();

        self.ring.push(self.wip_event);
        self.last_event_samples = self.total_samples;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const SR: u32 = 16000;

    fn detector() -> SyllableDetector {
        SyllableDetector::new(SyllableConfig::default_for(SR)).unwrap()
    }

    fn collect_events(det: &mut SyllableDetector, signal: &[f32]) -> Vec<SyllableEvent> {
        let mut out = [SyllableEvent::default(); 64];
        let mut events = Vec::new();
        for block in signal.chunks(1024) {
            let n = det.process(block, &mut out);
            events.extend_from_slice(&out[..n]);
        }
        let n = det.flush(&mut out);
        events.extend_from_slice(&out[..n]);
        events
    }

    fn silence(seconds: f32) -> Vec<f32> {
        vec![0.0; (seconds * SR as f32) as usize]
    }

    /// Tone bursts shaped by a Hann window over a faint dither floor (real
    /// recordings never sit at digital zero; the floor keeps the feature
    /// statistics honest).
    fn tone_burst(freq: f32, amp: f32, burst_s: f32, gap_s: f32, count: usize) -> Vec<f32> {
        let burst_len = (burst_s * SR as f32) as usize;
        let gap_len = (gap_s * SR as f32) as usize;
        let lead = (0.3 * SR as f32) as usize;

        let mut signal = vec![0.0f32; lead];
        for _ in 0..count {
            for i in 0..burst_len {
                let t = i as f32 / SR as f32;
                let window = 0.5 * (1.0 - (2.0 * PI * i as f32 / burst_len as f32).cos());
                signal.push(amp * window * (2.0 * PI * freq * t).sin());
            }
            signal.extend(std::iter::repeat(0.0).take(gap_len));
        }
        signal.extend(std::iter::repeat(0.0).take(lead));

        let dither = xorshift_noise(signal.len() as f32 / SR as f32, 0.001, 0x9e37_79b9);
        for (s, d) in signal.iter_mut().zip(dither) {
            *s += d;
        }
        signal
    }

    fn xorshift_noise(seconds: f32, amp: f32, seed: u32) -> Vec<f32> {
        let mut state = seed;
        (0..(seconds * SR as f32) as usize)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                amp * ((state as f32 / u32::MAX as f32) * 2.0 - 1.0)
            })
            .collect()
    }

    #[test]
    fn zeros_yield_no_events() {
        let mut det = detector();
        let events = collect_events(&mut det, &silence(2.0));
        assert!(events.is_empty());
    }

    #[test]
    fn steady_tone_yields_no_events() {
        // 440 Hz with a slow fade-in: flat envelope, no PeakRate peaks
        let mut det = detector();
        let n = 2 * SR as usize;
        let fade = (0.5 * SR as f32) as usize;
        let signal: Vec<f32> = (0..n)
            .map(|i| {
                let t = i as f32 / SR as f32;
                let ramp = (i as f32 / fade as f32).min(1.0);
                0.2 * ramp * (2.0 * PI * 440.0 * t).sin()
            })
            .collect();
        let events = collect_events(&mut det, &signal);
        assert!(events.is_empty(), "got {} events", events.len());
    }

    #[test]
    fn tone_bursts_are_detected_voiced_with_f0() {
        let mut det = detector();
        let signal = tone_burst(120.0, 0.5, 0.2, 0.1, 5);
        let events = collect_events(&mut det, &signal);

        assert!(
            (4..=6).contains(&events.len()),
            "expected ~5 events, got {}",
            events.len()
        );

        // The bursts are periodic at 120 Hz: onsets classify voiced (or
        // mixed) and the F0 track locks onto the tone. Allow one stray at
        // the stream edge where voicing has not latched yet.
        let voiced_like = events
            .iter()
            .filter(|e| e.onset_type != OnsetType::Unvoiced)
            .count();
        assert!(voiced_like + 1 >= events.len(), "{} voiced-like", voiced_like);

        let f0_locked = events
            .iter()
            .filter(|e| (100.0..=140.0).contains(&e.f0))
            .count();
        assert!(f0_locked + 1 >= events.len(), "{} events near 120 Hz", f0_locked);
    }

    #[test]
    fn events_are_ordered_and_spaced() {
        let mut det = detector();
        let signal = tone_burst(120.0, 0.5, 0.2, 0.1, 5);
        let events = collect_events(&mut det, &signal);
        let min_dist = det.config().min_dist_samples();

        for pair in events.windows(2) {
            assert!(pair[1].timestamp_samples > pair[0].timestamp_samples);
            assert!(pair[1].timestamp_samples - pair[0].timestamp_samples >= min_dist);
        }
        for event in &events {
            let expected = event.timestamp_samples as f64 / SR as f64;
            assert_eq!(event.time_seconds, expected);
        }
    }

    #[test]
    fn noise_burst_gives_unvoiced_event_near_onset() {
        let mut det = detector();
        let mut signal = silence(1.0);
        signal.extend(xorshift_noise(0.05, 0.6, 0x1234_5678));
        signal.extend(silence(0.5));

        let events = collect_events(&mut det, &signal);
        assert!(!events.is_empty(), "noise burst not detected");
        let first = &events[0];
        assert_eq!(first.onset_type, OnsetType::Unvoiced);
        assert!(
            (first.time_seconds - 1.0).abs() < 0.06,
            "onset at {}",
            first.time_seconds
        );
    }

    #[test]
    fn unvoiced_path_disabled_suppresses_noise_events() {
        let mut cfg = SyllableConfig::default_for(SR);
        cfg.allow_unvoiced_onsets = false;
        let mut det = SyllableDetector::new(cfg).unwrap();

        // Faded-in noise: purely unvoiced content with no sharp envelope edge
        let mut signal = silence(0.2);
        let fade = (0.1 * SR as f32) as usize;
        let noise = xorshift_noise(1.0, 0.2, 0xdead_beef);
        signal.extend(
            noise
                .iter()
                .enumerate()
                .map(|(i, &v)| v * (i as f32 / fade as f32).min(1.0)),
        );
        let events = collect_events(&mut det, &signal);
        assert!(events.is_empty(), "got {} events from noise", events.len());
    }

    #[test]
    fn f0_values_are_zero_or_in_voice_range() {
        let mut det = detector();
        let signal = tone_burst(120.0, 0.5, 0.2, 0.1, 5);
        for event in collect_events(&mut det, &signal) {
            assert!(
                event.f0 == 0.0 || (50.0..=600.0).contains(&event.f0),
                "f0 {} outside contract",
                event.f0
            );
        }
    }

    #[test]
    fn two_bursts_with_short_gap_give_two_events() {
        let mut det = detector();
        // Onsets 280 ms apart, comfortably past the 150 ms minimum distance
        let signal = tone_burst(120.0, 0.5, 0.2, 0.08, 2);
        let events = collect_events(&mut det, &signal);
        assert_eq!(events.len(), 2, "got {} events", events.len());
    }

    #[test]
    fn empty_input_returns_zero_and_keeps_state() {
        let mut det = detector();
        let mut out = [SyllableEvent::default(); 4];
        assert_eq!(det.process(&[], &mut out), 0);

        // Still detects normally afterwards
        let signal = tone_burst(120.0, 0.5, 0.2, 0.1, 3);
        let events = collect_events(&mut det, &signal);
        assert!(!events.is_empty());
    }

    #[test]
    fn zero_capacity_output_defers_events_to_flush() {
        let mut det = detector();
        let signal = tone_burst(120.0, 0.5, 0.2, 0.1, 5);
        for block in signal.chunks(1024) {
            assert_eq!(det.process(block, &mut []), 0);
        }
        let mut out = [SyllableEvent::default(); 64];
        let n = det.flush(&mut out);
        assert!(n >= 4, "only {} events after deferred flush", n);
    }

    #[test]
    fn reset_restores_deterministic_behavior() {
        let mut det = detector();
        let signal = tone_burst(120.0, 0.5, 0.2, 0.1, 3);

        let first: Vec<u64> = collect_events(&mut det, &signal)
            .iter()
            .map(|e| e.timestamp_samples)
            .collect();

        det.reset();
        // Reset twice: must be indistinguishable from a single reset
        det.reset();
        let second: Vec<u64> = collect_events(&mut det, &signal)
            .iter()
            .map(|e| e.timestamp_samples)
            .collect();

        assert_eq!(first, second);
    }

    #[test]
    fn zero_context_scores_neutral_and_unaccented() {
        let mut cfg = SyllableConfig::default_for(SR);
        cfg.context_size = 0;
        let mut det = SyllableDetector::new(cfg).unwrap();
        let events = collect_events(&mut det, &tone_burst(120.0, 0.5, 0.2, 0.1, 3));

        assert!(!events.is_empty());
        for event in &events {
            assert!((event.prominence_score - 0.5).abs() < 1e-6);
            assert!(!event.is_accented);
        }
    }

    #[test]
    fn flush_events_come_after_streamed_ones() {
        let mut det = detector();
        let signal = tone_burst(120.0, 0.5, 0.2, 0.1, 5);

        let mut out = [SyllableEvent::default(); 64];
        let mut streamed_last = 0u64;
        for block in signal.chunks(1024) {
            let n = det.process(block, &mut out);
            for e in &out[..n] {
                streamed_last = streamed_last.max(e.timestamp_samples);
            }
        }
        let n = det.flush(&mut out);
        assert!(n > 0, "context window should hold events back for flush");
        for e in &out[..n] {
            assert!(e.timestamp_samples > streamed_last);
        }
    }

    #[test]
    fn realtime_mode_stays_quiet_during_calibration() {
        let mut cfg = SyllableConfig::default_for(SR);
        cfg.realtime_mode = true;
        cfg.calibration_duration_ms = 1500.0;
        let mut det = SyllableDetector::new(cfg).unwrap();
        assert!(det.is_calibrating());

        // Quiet calibration window, then bursts
        let mut signal = xorshift_noise(1.5, 0.001, 0x42);
        signal.extend(tone_burst(120.0, 0.5, 0.2, 0.15, 3));

        let events = collect_events(&mut det, &signal);
        assert!(!det.is_calibrating());
        for event in &events {
            assert!(
                event.time_seconds >= 1.5,
                "event at {} during calibration",
                event.time_seconds
            );
        }
        assert!(!events.is_empty(), "bursts after calibration not detected");
    }

    #[test]
    fn recalibrate_rearms_the_window() {
        let mut cfg = SyllableConfig::default_for(SR);
        cfg.realtime_mode = true;
        cfg.calibration_duration_ms = 100.0;
        let mut det = SyllableDetector::new(cfg).unwrap();

        let mut out = [SyllableEvent::default(); 4];
        det.process(&silence(0.2), &mut out);
        assert!(!det.is_calibrating());

        det.recalibrate();
        assert!(det.is_calibrating());
    }

    #[test]
    fn set_realtime_mode_on_plain_detector_arms_calibration() {
        let mut det = detector();
        assert!(!det.is_calibrating());
        det.set_realtime_mode(true);
        assert!(det.is_calibrating());
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let mut cfg = SyllableConfig::default_for(SR);
        cfg.sample_rate = 0;
        assert!(SyllableDetector::new(cfg).is_err());

        let mut cfg = SyllableConfig::default_for(SR);
        cfg.peak_rate_band_min = 5000.0;
        cfg.peak_rate_band_max = 400.0;
        assert!(SyllableDetector::new(cfg).is_err());
    }

    #[test]
    fn disabled_features_still_detect_bursts() {
        let mut cfg = SyllableConfig::default_for(SR);
        cfg.enable_spectral_flux = false;
        cfg.enable_mfcc_delta = false;
        cfg.enable_wavelet = false;
        let mut det = SyllableDetector::new(cfg).unwrap();
        let events = collect_events(&mut det, &tone_burst(120.0, 0.5, 0.2, 0.1, 4));
        assert!(!events.is_empty());
    }
}
