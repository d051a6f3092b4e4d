//! Instantaneous-energy saliency trackers.
//!
//! Three small per-sample estimators the fusion stage and the
//! strong-evidence bypass read:
//!
//! - [`TeagerEnergy`] - nonlinear energy operator, sensitive to abrupt
//!   amplitude-frequency bursts ("forcefulness")
//! - [`LocalEnergyRatio`] - short-term over long-term smoothed energy
//! - [`EnergyFloor`] - adaptive noise floor under the formant envelope

/// EMA coefficient for TEO statistics (about 1000 samples).
const TEO_STATS_ALPHA: f32 = 1e-3;

/// Teager Energy Operator computed with a one-sample delay:
/// `psi[n-1] = x[n-1]^2 - x[n-2] * x[n]`, half-wave rectified.
#[derive(Debug, Clone, Copy, Default)]
pub struct TeagerEnergy {
    prev: f32,
    prev_prev: f32,
    current: f32,
    mean: f32,
    var: f32,
}

impl TeagerEnergy {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let raw = (self.prev * self.prev - self.prev_prev * input).max(0.0);
        self.current = raw;

        let delta = raw - self.mean;
        self.mean += TEO_STATS_ALPHA * delta;
        self.var = (1.0 - TEO_STATS_ALPHA) * (self.var + TEO_STATS_ALPHA * delta * delta);

        self.prev_prev = self.prev;
        self.prev = input;

        raw
    }

    /// Z-score of the current value against the running statistics.
    #[inline]
    pub fn z_score(&self) -> f32 {
        let std = if self.var > 0.0 { self.var.sqrt() } else { 1e-6 };
        (self.current - self.mean) / (std + 1e-6)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Short EMA window (s).
const LER_SHORT_S: f32 = 0.020;
/// Long EMA window (s).
const LER_LONG_S: f32 = 0.500;
/// Upper clamp on the ratio.
const LER_MAX: f32 = 10.0;

/// Ratio of short-term to long-term smoothed signal power.
#[derive(Debug, Clone, Copy)]
pub struct LocalEnergyRatio {
    alpha_short: f32,
    alpha_long: f32,
    short_energy: f32,
    long_energy: f32,
    current: f32,
}

impl LocalEnergyRatio {
    pub fn new(sample_rate: u32) -> Self {
        let sr = sample_rate as f32;
        Self {
            alpha_short: 1.0 - (-1.0 / (LER_SHORT_S * sr)).exp(),
            alpha_long: 1.0 - (-1.0 / (LER_LONG_S * sr)).exp(),
            short_energy: 0.0,
            // Small seed avoids a divide-by-zero before the long EMA settles
            long_energy: 1e-4,
            current: 1.0,
        }
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let e = input * input;
        self.short_energy = self.alpha_short * e + (1.0 - self.alpha_short) * self.short_energy;
        self.long_energy = self.alpha_long * e + (1.0 - self.alpha_long) * self.long_energy;

        self.current = if self.long_energy > 1e-10 {
            (self.short_energy / self.long_energy).min(LER_MAX)
        } else {
            1.0
        };
        self.current
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn reset(&mut self) {
        self.short_energy = 0.0;
        self.long_energy = 1e-4;
        self.current = 1.0;
    }
}

/// Adaptive noise floor: falls immediately, rises very slowly.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnergyFloor {
    floor: f32,
}

impl EnergyFloor {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn update(&mut self, envelope: f32) -> f32 {
        if envelope < self.floor || self.floor < 1e-8 {
            self.floor = envelope;
        } else {
            self.floor = 0.9999 * self.floor + 0.0001 * envelope;
        }
        self.floor
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.floor
    }

    pub fn reset(&mut self) {
        self.floor = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teo_spikes_on_burst() {
        let mut teo = TeagerEnergy::new();
        // Establish quiet statistics (constant input has zero Teager energy)
        for _ in 0..5000 {
            teo.process(0.001);
        }
        // The operator runs one sample delayed, so the burst registers on
        // the second loud sample
        teo.process(1.0);
        teo.process(1.0);
        let z = teo.z_score();
        assert!(z > 3.0, "z-score {} not a burst", z);
    }

    #[test]
    fn ler_rises_on_local_burst_then_settles() {
        let mut ler = LocalEnergyRatio::new(16000);
        for _ in 0..16000 {
            ler.process(0.01);
        }
        let settled = ler.current();
        assert!((settled - 1.0).abs() < 0.2);

        for _ in 0..200 {
            ler.process(0.5);
        }
        assert!(ler.current() > 2.0);
    }

    #[test]
    fn floor_falls_fast_rises_slow() {
        let mut floor = EnergyFloor::new();
        floor.update(0.5);
        assert!((floor.current() - 0.5).abs() < 1e-6);

        // Falling envelope is tracked immediately
        floor.update(0.01);
        assert!((floor.current() - 0.01).abs() < 1e-6);

        // Rising envelope barely moves the floor
        floor.update(0.5);
        assert!(floor.current() < 0.02);
    }
}
