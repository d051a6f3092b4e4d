//! Biquad Filter Implementation (IIR 2nd Order)
//!
//! Second-order recursive filter used for the formant-band isolation ahead of
//! the PeakRate envelope and for the high-frequency energy tracker's
//! pre-filter.
//!
//! # Design Notes
//! - Coefficients follow the RBJ cookbook formulations
//! - All operations are safe for the per-sample hot path (no allocations)

use std::f32::consts::PI;

/// Biquad filter implementation (IIR 2nd order)
#[derive(Debug, Clone, Copy)]
pub struct Biquad {
    a0: f32,
    a1: f32,
    a2: f32,
    b1: f32,
    b2: f32,
    z1: f32,
    z2: f32,
}

impl Biquad {
    pub fn new() -> Self {
        Self {
            a0: 1.0,
            a1: 0.0,
            a2: 0.0,
            b1: 0.0,
            b2: 0.0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Process a single sample
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let out = input * self.a0 + self.z1;

        // Anti-denormal: tiny DC offset
        self.z1 = input * self.a1 + self.z2 - self.b1 * out + 1e-25;
        self.z2 = input * self.a2 - self.b2 * out + 1e-25;

        out
    }

    /// Clear filter delay state without touching coefficients.
    #[inline]
    pub fn reset_state(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    // ---------------------------------------------------------------------
    // Filter design helpers (RBJ-style)
    // ---------------------------------------------------------------------

    /// Bandpass, constant skirt gain form. Center and Q are derived by the
    /// caller from the configured band edges.
    pub fn update_bandpass(&mut self, center: f32, q: f32, sr: f32) {
        let w0 = 2.0 * PI * center / sr;
        let alpha = w0.sin() / (2.0 * q.max(1e-6));
        let cw0 = w0.cos();

        let a0 = 1.0 + alpha;
        let inv_a0 = 1.0 / a0;

        self.a0 = alpha * inv_a0;
        self.a1 = 0.0;
        self.a2 = -alpha * inv_a0;
        self.b1 = (-2.0 * cw0) * inv_a0;
        self.b2 = (1.0 - alpha) * inv_a0;
    }

    /// High-pass. `q = 1/sqrt(2)` gives the maximally flat Butterworth
    /// response used by the high-frequency energy tracker.
    pub fn update_hpf(&mut self, cutoff: f32, q: f32, sr: f32) {
        let w0 = 2.0 * PI * cutoff / sr;
        let alpha = w0.sin() / (2.0 * q.max(1e-6));
        let cw0 = w0.cos();

        let a0 = 1.0 + alpha;
        let inv_a0 = 1.0 / a0;

        self.a0 = ((1.0 + cw0) * 0.5) * inv_a0;
        self.a1 = -(1.0 + cw0) * inv_a0;
        self.a2 = ((1.0 + cw0) * 0.5) * inv_a0;
        self.b1 = (-2.0 * cw0) * inv_a0;
        self.b2 = (1.0 - alpha) * inv_a0;
    }
}

impl Default for Biquad {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady_state_gain(filter: &mut Biquad, freq: f32, sr: f32) -> f32 {
        // Feed a sine and measure the output peak after settling
        let n = (sr * 0.5) as usize;
        let mut peak = 0.0f32;
        for i in 0..n {
            let x = (2.0 * PI * freq * i as f32 / sr).sin();
            let y = filter.process(x);
            if i > n / 2 {
                peak = peak.max(y.abs());
            }
        }
        peak
    }

    #[test]
    fn bandpass_passes_center_rejects_edges() {
        let sr = 16000.0;
        let center = 1850.0;
        let q = center / 2700.0;

        let mut f = Biquad::new();
        f.update_bandpass(center, q, sr);
        let g_center = steady_state_gain(&mut f, center, sr);

        f.reset_state();
        let g_low = steady_state_gain(&mut f, 100.0, sr);

        assert!(g_center > 0.5, "center gain {} too low", g_center);
        assert!(g_low < 0.2 * g_center, "stopband gain {} too high", g_low);
    }

    #[test]
    fn hpf_rejects_low_passes_high() {
        let sr = 16000.0;
        let mut f = Biquad::new();
        f.update_hpf(2000.0, 0.707, sr);
        let g_high = steady_state_gain(&mut f, 6000.0, sr);

        f.reset_state();
        let g_low = steady_state_gain(&mut f, 200.0, sr);

        assert!(g_high > 0.7);
        assert!(g_low < 0.1);
    }
}
