//! Real-time calibration.
//!
//! In real-time mode the detector cannot wait for adaptive statistics to
//! settle, so it spends a short initial window (assumed quiet) collecting raw
//! feature values and fits an SNR-based threshold per feature:
//! `theta = mean + gamma * std`, `gamma = 10^(snr_db / 10)`. While the window
//! is open the state machine is frozen and no events are produced.

use log::info;

/// Calibrated features, in push order.
pub const NUM_FEATURES: usize = 6;
/// Circular capture buffer per feature.
const BUF_SIZE: usize = 100;
/// Minimum samples for a usable fit; below this a conservative default is used.
const MIN_FIT_SAMPLES: usize = 10;
/// Fallback threshold when too little data was collected.
const FALLBACK_THRESH: f32 = 1e-3;
/// Threshold floor, keeps the fusion ratios finite.
const MIN_THRESH: f32 = 1e-6;

/// Indices into the pushed feature array.
pub const FEAT_ENERGY: usize = 0;
pub const FEAT_PEAK_RATE: usize = 1;
pub const FEAT_SPECTRAL_FLUX: usize = 2;
pub const FEAT_HIGH_FREQ: usize = 3;
pub const FEAT_MFCC_DELTA: usize = 4;
pub const FEAT_WAVELET: usize = 5;

pub struct RealtimeCalibration {
    is_calibrating: bool,
    sample_count: usize,
    target_samples: usize,
    buf: [[f32; BUF_SIZE]; NUM_FEATURES],
    buf_idx: usize,
    gamma: f32,
    thresh: [f32; NUM_FEATURES],
}

impl RealtimeCalibration {
    /// Inactive instance; call [`arm`](Self::arm) to start collecting.
    pub fn new() -> Self {
        Self {
            is_calibrating: false,
            sample_count: 0,
            target_samples: 0,
            buf: [[0.0; BUF_SIZE]; NUM_FEATURES],
            buf_idx: 0,
            gamma: 1.0,
            thresh: [FALLBACK_THRESH; NUM_FEATURES],
        }
    }

    /// Restart collection for `target_samples` samples.
    pub fn arm(&mut self, target_samples: usize) {
        *self = Self::new();
        self.is_calibrating = true;
        self.target_samples = target_samples;
    }

    /// Record one sample's raw feature values. Returns true when this push
    /// completed the calibration window.
    pub fn push(&mut self, values: &[f32; NUM_FEATURES], snr_db: f32) -> bool {
        let idx = self.buf_idx % BUF_SIZE;
        for (k, &v) in values.iter().enumerate() {
            self.buf[k][idx] = v;
        }
        self.buf_idx += 1;
        self.sample_count += 1;

        if self.sample_count >= self.target_samples {
            self.finalize(snr_db);
            return true;
        }
        false
    }

    fn finalize(&mut self, snr_db: f32) {
        let n = self.buf_idx.min(BUF_SIZE);
        self.gamma = 10.0f32.powf(snr_db / 10.0);

        for k in 0..NUM_FEATURES {
            self.thresh[k] = if n < MIN_FIT_SAMPLES {
                FALLBACK_THRESH
            } else {
                let slice = &self.buf[k][..n];
                let mean = slice.iter().sum::<f32>() / n as f32;
                let var = slice.iter().map(|v| v * v).sum::<f32>() / n as f32 - mean * mean;
                let std = if var > 0.0 { var.sqrt() } else { 0.0 };
                (mean + self.gamma * std).max(MIN_THRESH)
            };
        }
        self.is_calibrating = false;

        info!(
            "calibration complete after {} samples: gamma={:.3} thresholds={:?}",
            self.sample_count, self.gamma, self.thresh
        );
    }

    #[inline]
    pub fn is_calibrating(&self) -> bool {
        self.is_calibrating
    }

    #[inline]
    pub fn gamma(&self) -> f32 {
        self.gamma
    }

    /// Update gamma after calibration (SNR threshold changed at runtime).
    pub fn set_gamma_from_snr(&mut self, snr_db: f32) {
        self.gamma = 10.0f32.powf(snr_db / 10.0);
    }

    #[inline]
    pub fn threshold(&self, feature: usize) -> f32 {
        self.thresh[feature]
    }
}

impl Default for RealtimeCalibration {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_mean_plus_gamma_std() {
        let mut cal = RealtimeCalibration::new();
        cal.arm(100);

        // Feature 0 alternates 0.1/0.3 -> mean 0.2, std 0.1
        let mut done = false;
        for i in 0..100 {
            let v = if i % 2 == 0 { 0.1 } else { 0.3 };
            done = cal.push(&[v, 0.0, 0.0, 0.0, 0.0, 0.0], 6.0);
        }
        assert!(done);
        assert!(!cal.is_calibrating());

        // gamma = 10^0.6 ~ 3.981; theta = 0.2 + 3.981 * 0.1
        let expected = 0.2 + 10.0f32.powf(0.6) * 0.1;
        assert!((cal.threshold(FEAT_ENERGY) - expected).abs() < 1e-3);

        // Constant-zero features fall to the floor
        assert!((cal.threshold(FEAT_WAVELET) - MIN_THRESH).abs() < 1e-9);
    }

    #[test]
    fn short_window_uses_fallback() {
        let mut cal = RealtimeCalibration::new();
        cal.arm(5);
        for _ in 0..5 {
            cal.push(&[0.5; NUM_FEATURES], 6.0);
        }
        assert!(!cal.is_calibrating());
        for k in 0..NUM_FEATURES {
            assert!((cal.threshold(k) - FALLBACK_THRESH).abs() < 1e-9);
        }
    }

    #[test]
    fn rearm_restarts_collection() {
        let mut cal = RealtimeCalibration::new();
        cal.arm(2);
        cal.push(&[1.0; NUM_FEATURES], 6.0);
        cal.push(&[1.0; NUM_FEATURES], 6.0);
        assert!(!cal.is_calibrating());

        cal.arm(10);
        assert!(cal.is_calibrating());
    }
}
