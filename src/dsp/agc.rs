//! Automatic Gain Control.
//!
//! Keeps the downstream feature extractors working at a predictable level
//! regardless of recording gain. Fast-attack envelope estimation, gain
//! clamped to a sane range, and an extra smoothing stage so gain changes do
//! not imprint zipper noise onto the signal the detectors see.

/// Envelope attack (fast, catches level rises).
const ENV_ATTACK_S: f32 = 0.005;
/// Envelope release (slow, rides out syllable gaps).
const ENV_RELEASE_S: f32 = 0.500;
/// Gain smoothing time constant.
const GAIN_SMOOTH_S: f32 = 0.100;
/// Lower gain clamp: never attenuate below this factor.
const MIN_GAIN: f32 = 0.1;

pub struct Agc {
    target_level: f32,
    max_gain: f32,
    current_gain: f32,

    envelope: f32,
    attack_coeff: f32,
    release_coeff: f32,
    gain_coeff: f32,
}

impl Agc {
    /// `target_db` is the desired RMS level, `max_gain_db` the boost ceiling.
    pub fn new(sample_rate: u32, target_db: f32, max_gain_db: f32) -> Self {
        let sr = sample_rate as f32;
        Self {
            target_level: 10.0f32.powf(target_db / 20.0),
            max_gain: 10.0f32.powf(max_gain_db / 20.0),
            current_gain: 1.0,
            envelope: 0.0,
            attack_coeff: 1.0 - (-1.0 / (ENV_ATTACK_S * sr)).exp(),
            release_coeff: 1.0 - (-1.0 / (ENV_RELEASE_S * sr)).exp(),
            gain_coeff: 1.0 - (-1.0 / (GAIN_SMOOTH_S * sr)).exp(),
        }
    }

    /// Process one sample and return it with the smoothed gain applied.
    #[inline]
    pub fn process(&mut self, sample: f32) -> f32 {
        let abs_sample = sample.abs();

        if abs_sample > self.envelope {
            self.envelope += self.attack_coeff * (abs_sample - self.envelope);
        } else {
            self.envelope += self.release_coeff * (abs_sample - self.envelope);
        }

        let env_safe = self.envelope.max(1e-6);
        let target_gain = (self.target_level / env_safe).clamp(MIN_GAIN, self.max_gain);

        self.current_gain += self.gain_coeff * (target_gain - self.current_gain);

        sample * self.current_gain
    }

    #[inline]
    pub fn gain(&self) -> f32 {
        self.current_gain
    }

    pub fn reset(&mut self) {
        self.current_gain = 1.0;
        self.envelope = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_signal_gets_boosted_within_limit() {
        let mut agc = Agc::new(16000, -23.0, 30.0);
        // Very quiet tone: gain should head for the ceiling but never pass it
        for i in 0..32000 {
            let x = 0.001 * (2.0 * std::f32::consts::PI * 200.0 * i as f32 / 16000.0).sin();
            agc.process(x);
        }
        let max_gain = 10.0f32.powf(30.0 / 20.0);
        assert!(agc.gain() > 2.0);
        assert!(agc.gain() <= max_gain + 1e-3);
    }

    #[test]
    fn loud_signal_is_attenuated_but_clamped() {
        let mut agc = Agc::new(16000, -23.0, 30.0);
        for i in 0..32000 {
            let x = 0.9 * (2.0 * std::f32::consts::PI * 200.0 * i as f32 / 16000.0).sin();
            agc.process(x);
        }
        assert!(agc.gain() < 1.0);
        assert!(agc.gain() >= MIN_GAIN - 1e-3);
    }
}
