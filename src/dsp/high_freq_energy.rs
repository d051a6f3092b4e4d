//! High-frequency energy tracker.
//!
//! Fricatives and plosive bursts put their energy above ~2 kHz where the
//! formant-band envelope barely reacts. A Butterworth high-pass isolates that
//! region; the squared output runs through a fast-attack smoother so a burst
//! registers within a millisecond.

use crate::dsp::biquad::Biquad;

/// Energy smoother attack (ms): fast, catches transients.
const ENERGY_ATTACK_MS: f32 = 1.0;
/// Peak tracker decay time constant (s).
const PEAK_DECAY_S: f32 = 0.05;

pub struct HighFreqEnergy {
    filter: Biquad,
    cutoff_hz: f32,
    sample_rate: f32,

    energy: f32,
    attack_coeff: f32,
    release_coeff: f32,

    peak_energy: f32,
    peak_decay: f32,
}

impl HighFreqEnergy {
    /// `window_ms` sets the release (smoothing) time of the energy envelope.
    pub fn new(sample_rate: u32, cutoff_hz: f32, window_ms: f32) -> Self {
        let sr = sample_rate as f32;
        let cutoff = if cutoff_hz > 0.0 { cutoff_hz } else { 2000.0 };
        let release_ms = if window_ms > 0.0 { window_ms } else { 10.0 };

        let mut filter = Biquad::new();
        filter.update_hpf(cutoff, std::f32::consts::FRAC_1_SQRT_2, sr);

        Self {
            filter,
            cutoff_hz: cutoff,
            sample_rate: sr,
            energy: 0.0,
            attack_coeff: 1.0 - (-1.0 / (sr * ENERGY_ATTACK_MS * 0.001)).exp(),
            release_coeff: 1.0 - (-1.0 / (sr * release_ms * 0.001)).exp(),
            peak_energy: 0.0,
            peak_decay: 1.0 - (-1.0 / (sr * PEAK_DECAY_S)).exp(),
        }
    }

    /// Process one sample, returning the smoothed high-band energy.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let filtered = self.filter.process(input);
        let inst_energy = filtered * filtered;

        if inst_energy > self.energy {
            self.energy += self.attack_coeff * (inst_energy - self.energy);
        } else {
            self.energy += self.release_coeff * (inst_energy - self.energy);
        }

        if self.energy > self.peak_energy {
            self.peak_energy = self.energy;
        } else {
            self.peak_energy -= self.peak_decay * self.peak_energy;
        }

        self.energy
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.energy
    }

    pub fn reset(&mut self) {
        self.filter.reset_state();
        self.filter
            .update_hpf(self.cutoff_hz, std::f32::consts::FRAC_1_SQRT_2, self.sample_rate);
        self.energy = 0.0;
        self.peak_energy = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn high_tone_registers_low_tone_does_not() {
        let sr = 16000;
        let mut hfe_hi = HighFreqEnergy::new(sr, 2000.0, 10.0);
        let mut hfe_lo = HighFreqEnergy::new(sr, 2000.0, 10.0);

        let mut e_hi = 0.0;
        let mut e_lo = 0.0;
        for i in 0..8000 {
            let t = i as f32 / sr as f32;
            e_hi = hfe_hi.process(0.5 * (2.0 * PI * 5000.0 * t).sin());
            e_lo = hfe_lo.process(0.5 * (2.0 * PI * 150.0 * t).sin());
        }

        assert!(e_hi > 20.0 * e_lo, "hi {} lo {}", e_hi, e_lo);
    }

    #[test]
    fn reset_clears_energy() {
        let mut hfe = HighFreqEnergy::new(16000, 2000.0, 10.0);
        for i in 0..1000 {
            hfe.process((i as f32 * 0.9).sin());
        }
        assert!(hfe.current() > 0.0);
        hfe.reset();
        assert_eq!(hfe.current(), 0.0);
    }
}
