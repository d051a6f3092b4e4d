//! Asymmetric attack/release envelope follower.
//!
//! Tracks the rectified amplitude of its input with separate rise and fall
//! time constants. The formant-band follower (5 ms / 20 ms) feeds the
//! PeakRate derivative; a second instance inside the high-frequency tracker
//! smooths squared energy.
//!
//! Coefficients use the standard exponential decay form
//! `coeff = exp(-1 / (tau_s * sample_rate))`.

/// One-pole attack/release follower on `|x|`.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeFollower {
    attack_coeff: f32,
    release_coeff: f32,
    output: f32,
}

impl EnvelopeFollower {
    pub fn new(sample_rate: f32, attack_ms: f32, release_ms: f32) -> Self {
        let mut env = Self {
            attack_coeff: 0.0,
            release_coeff: 0.0,
            output: 0.0,
        };
        env.prepare(sample_rate, attack_ms, release_ms);
        env
    }

    /// Recompute coefficients for new timing. State is preserved.
    pub fn prepare(&mut self, sample_rate: f32, attack_ms: f32, release_ms: f32) {
        let t_attack = (attack_ms * 0.001).max(1.0e-5);
        let t_release = (release_ms * 0.001).max(1.0e-5);

        self.attack_coeff = (-1.0 / (sample_rate * t_attack)).exp();
        self.release_coeff = (-1.0 / (sample_rate * t_release)).exp();
    }

    /// Process a single sample and return the current envelope.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let abs_in = input.abs();

        if abs_in > self.output {
            self.output = self.attack_coeff * self.output + (1.0 - self.attack_coeff) * abs_in;
        } else {
            self.output = self.release_coeff * self.output + (1.0 - self.release_coeff) * abs_in;
        }

        self.output
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.output
    }

    pub fn reset(&mut self) {
        self.output = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attack_faster_than_release() {
        let mut env = EnvelopeFollower::new(16000.0, 5.0, 20.0);

        // Rise over 5ms of full-scale input
        for _ in 0..80 {
            env.process(1.0);
        }
        let after_attack = env.current();
        assert!(after_attack > 0.5);

        // Fall over the same span of silence: release is 4x slower, so the
        // envelope must retain more than it lost
        for _ in 0..80 {
            env.process(0.0);
        }
        let after_release = env.current();
        assert!(after_release > after_attack * 0.3);
        assert!(after_release < after_attack);
    }

    #[test]
    fn converges_to_steady_input() {
        let mut env = EnvelopeFollower::new(16000.0, 5.0, 20.0);
        for _ in 0..4000 {
            env.process(0.5);
        }
        assert!((env.current() - 0.5).abs() < 0.01);
    }
}
