//! Continuous Morlet wavelet bank for transient scoring.
//!
//! A handful of log-spaced scales (2-6 kHz by default) are convolved against
//! the input sample-by-sample. Each scale reports |response|^2; the bank's
//! output is the mean half-wave-rectified Weber ratio of those energies, so
//! it reacts to *relative* energy jumps and stays quiet on steady content of
//! any level.

use rustfft::num_complex::Complex;

/// Morlet frequency parameter.
const MORLET_W0: f32 = 6.0;
/// Kernel support bounds in samples.
const KERNEL_MIN: usize = 5;
const KERNEL_MAX: usize = 128;
/// Weber denominator guard.
const WEBER_EPS: f32 = 1e-6;

struct WaveletScale {
    kernel: Vec<Complex<f32>>,
    history: Vec<f32>,
    history_idx: usize,
    current_energy: f32,
    prev_energy: f32,
}

impl WaveletScale {
    fn new(freq_hz: f32, sample_rate: u32) -> Self {
        let sr = sample_rate as f32;
        let dt = 1.0 / sr;

        // Scale from frequency: s = w0 / (2*pi*f); support ~6 sigma
        let scale = MORLET_W0 / (2.0 * std::f32::consts::PI * freq_hz);
        let mut kernel_size = (6.0 * scale * sr) as usize;
        if kernel_size % 2 == 0 {
            kernel_size += 1;
        }
        kernel_size = kernel_size.clamp(KERNEL_MIN, KERNEL_MAX);

        let center = (kernel_size / 2) as isize;
        let mut kernel: Vec<Complex<f32>> = (0..kernel_size)
            .map(|i| {
                let t = (i as isize - center) as f32 * dt;
                let t_scaled = t / scale;
                let envelope = (-0.5 * t_scaled * t_scaled).exp();
                let phase = 2.0 * std::f32::consts::PI * freq_hz * t;
                Complex::new(envelope * phase.cos(), envelope * phase.sin())
            })
            .collect();

        // Unit-energy normalization
        let energy: f32 = kernel.iter().map(|c| c.norm_sqr()).sum();
        let norm = energy.sqrt();
        for c in &mut kernel {
            *c /= norm;
        }

        Self {
            history: vec![0.0; kernel.len()],
            kernel,
            history_idx: 0,
            current_energy: 0.0,
            prev_energy: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, sample: f32) -> f32 {
        let k_size = self.kernel.len();

        self.history[self.history_idx] = sample;
        let newest = self.history_idx;
        self.history_idx = (self.history_idx + 1) % k_size;

        // Convolve newest-to-oldest against the kernel
        let mut acc = Complex::new(0.0f32, 0.0);
        for k in 0..k_size {
            let h_idx = (newest + k_size - k) % k_size;
            acc += self.history[h_idx] * self.kernel[k];
        }

        self.prev_energy = self.current_energy;
        self.current_energy = acc.norm_sqr();
        self.current_energy
    }

    fn reset(&mut self) {
        self.history.fill(0.0);
        self.history_idx = 0;
        self.current_energy = 0.0;
        self.prev_energy = 0.0;
    }
}

pub struct WaveletBank {
    scales: Vec<WaveletScale>,
}

impl WaveletBank {
    pub fn new(sample_rate: u32, min_freq: f32, max_freq: f32, num_scales: usize) -> Self {
        // Logarithmic frequency spacing
        let log_min = min_freq.ln();
        let log_max = max_freq.ln();
        let steps = if num_scales > 1 { num_scales - 1 } else { 1 };
        let log_step = (log_max - log_min) / steps as f32;

        let scales = (0..num_scales)
            .map(|i| WaveletScale::new((log_min + i as f32 * log_step).exp(), sample_rate))
            .collect();

        Self { scales }
    }

    /// Feed one sample and return the bank's transient score.
    #[inline]
    pub fn process(&mut self, sample: f32) -> f32 {
        let mut total = 0.0;
        for scale in &mut self.scales {
            let energy = scale.process(sample);
            let diff = energy - scale.prev_energy;
            if diff > 0.0 {
                total += diff / (scale.prev_energy + WEBER_EPS);
            }
        }
        total / self.scales.len() as f32
    }

    /// Current |response|^2 of one scale, for diagnostics.
    pub fn scale_energy(&self, idx: usize) -> f32 {
        self.scales.get(idx).map_or(0.0, |s| s.current_energy)
    }

    pub fn reset(&mut self) {
        for scale in &mut self.scales {
            scale.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn kernels_are_odd_bounded_unit_energy() {
        let bank = WaveletBank::new(16000, 2000.0, 6000.0, 3);
        for scale in &bank.scales {
            let n = scale.kernel.len();
            assert!(n % 2 == 1 || n == KERNEL_MAX);
            assert!((KERNEL_MIN..=KERNEL_MAX).contains(&n));
            let energy: f32 = scale.kernel.iter().map(|c| c.norm_sqr()).sum();
            assert!((energy - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn burst_scores_higher_than_steady_tone() {
        let sr = 16000;
        let mut bank = WaveletBank::new(sr, 2000.0, 6000.0, 3);

        // Steady in-band tone: Weber ratios settle near zero
        let mut steady = 0.0;
        for i in 0..4000 {
            let t = i as f32 / sr as f32;
            steady = bank.process(0.3 * (2.0 * PI * 3000.0 * t).sin());
        }

        // Silence, then a burst re-entering the band
        for _ in 0..2000 {
            bank.process(0.0);
        }
        let mut peak = 0.0f32;
        for i in 0..200 {
            let t = i as f32 / sr as f32;
            peak = peak.max(bank.process(0.8 * (2.0 * PI * 3000.0 * t).sin()));
        }

        assert!(peak > steady * 10.0 + 0.1, "peak {} steady {}", peak, steady);
    }
}
