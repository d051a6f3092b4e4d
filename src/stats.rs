//! Per-feature running statistics and normalization.
//!
//! Every raw feature (PeakRate, spectral flux, high-frequency energy, MFCC
//! delta, wavelet score) runs through one of these before fusion. The EMA
//! variance uses the Welford-style update
//! `var <- (1-a) * (var + a * delta^2)` with `delta` taken against the mean
//! *before* its own update, which stays stable for arbitrarily long streams.

/// Offset applied to the z-score before the sigmoid. Pushes the mean (z = 0)
/// down to ~0.27 instead of 0.5, which suppresses false positives from
/// stationary background noise. Tuning knob; the default is load-bearing for
/// the fusion thresholds.
const SIGMOID_Z_OFFSET: f32 = 1.0;

/// Samples needed before the statistics are considered usable at all.
const MIN_SAMPLES: u32 = 100;
/// Samples at which confidence saturates to 1.0.
const FULL_CONFIDENCE_SAMPLES: f32 = 1000.0;
/// Counter cap so `sample_count` cannot wrap on long streams.
const SAMPLE_COUNT_CAP: u32 = 100_000;

/// Fast sigmoid approximation `x / (1 + |x|)`, range (-1, 1).
#[inline]
pub fn sigmoid_fast(x: f32) -> f32 {
    x / (1.0 + x.abs())
}

#[derive(Debug, Clone, Copy)]
pub struct FeatureStats {
    mean: f32,
    var: f32,
    max_val: f32,
    alpha: f32,
    sample_count: u32,
}

impl FeatureStats {
    pub fn new(tau_ms: f32, sample_rate: u32) -> Self {
        let tau_s = tau_ms * 0.001;
        let alpha = (1.0 / (tau_s * sample_rate as f32)).min(1.0);
        Self {
            mean: 0.0,
            var: 0.0,
            max_val: 0.0,
            alpha,
            sample_count: 0,
        }
    }

    #[inline]
    pub fn update(&mut self, value: f32) {
        let delta = value - self.mean;
        self.mean += self.alpha * delta;
        self.var = (1.0 - self.alpha) * (self.var + self.alpha * delta * delta);
        if value > self.max_val {
            self.max_val = value;
        }
        if self.sample_count < SAMPLE_COUNT_CAP {
            self.sample_count += 1;
        }
    }

    /// Sigmoid-normalized value in [0, 1] plus a confidence estimate.
    ///
    /// Unstable statistics (tiny variance or too few samples) return the
    /// neutral value 0.5 with confidence 0.1 rather than an error; the fusion
    /// stage downweights low-confidence features instead of failing.
    pub fn normalize_sigmoid(&self, value: f32) -> (f32, f32) {
        let std = self.var.sqrt();

        if std < 1e-6 || self.sample_count < MIN_SAMPLES {
            return (0.5, 0.1);
        }

        let confidence = (self.sample_count as f32 / FULL_CONFIDENCE_SAMPLES).min(1.0);
        let z = (value - self.mean) / std;
        let norm = (sigmoid_fast(z - SIGMOID_Z_OFFSET) + 1.0) * 0.5;
        (norm, confidence)
    }

    /// Clamped z-score normalization: `clamp(z, 0, 4) / 4`. Used by the
    /// unvoiced trigger and the onset-type split, where the sigmoid's neutral
    /// fallback would mask a genuinely silent feature.
    pub fn normalize_clamped(&self, value: f32) -> f32 {
        let std = self.var.sqrt().max(1e-6);
        let z = (value - self.mean) / std;
        z.clamp(0.0, 4.0) / 4.0
    }

    #[inline]
    pub fn mean(&self) -> f32 {
        self.mean
    }

    #[inline]
    pub fn var(&self) -> f32 {
        self.var
    }

    /// Largest value seen since construction.
    #[inline]
    pub fn max(&self) -> f32 {
        self.max_val
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unstable_stats_return_neutral() {
        let stats = FeatureStats::new(500.0, 16000);
        let (norm, conf) = stats.normalize_sigmoid(3.0);
        assert_eq!(norm, 0.5);
        assert!((conf - 0.1).abs() < 1e-6);
    }

    #[test]
    fn confidence_ramps_with_samples() {
        let mut stats = FeatureStats::new(500.0, 16000);
        // Alternate values so the variance stays finite
        for i in 0..500 {
            stats.update(if i % 2 == 0 { 1.0 } else { 2.0 });
        }
        let (_, conf) = stats.normalize_sigmoid(1.5);
        assert!((conf - 0.5).abs() < 0.01);

        for i in 0..1000 {
            stats.update(if i % 2 == 0 { 1.0 } else { 2.0 });
        }
        let (_, conf) = stats.normalize_sigmoid(1.5);
        assert_eq!(conf, 1.0);
    }

    #[test]
    fn sigmoid_norm_is_bounded_and_monotonic() {
        let mut stats = FeatureStats::new(500.0, 16000);
        for i in 0..2000 {
            stats.update(if i % 2 == 0 { 0.9 } else { 1.1 });
        }
        let (low, _) = stats.normalize_sigmoid(0.0);
        let (mid, _) = stats.normalize_sigmoid(1.0);
        let (high, _) = stats.normalize_sigmoid(5.0);
        assert!(low < mid && mid < high);
        assert!(low >= 0.0 && high <= 1.0);
    }

    #[test]
    fn mean_tracks_input_level() {
        let mut stats = FeatureStats::new(100.0, 16000);
        for _ in 0..20000 {
            stats.update(2.0);
        }
        assert!((stats.mean() - 2.0).abs() < 0.05);
    }
}
