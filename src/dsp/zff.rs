//! Zero-Frequency Resonator and voicing tracker.
//!
//! The resonator is a pair of leaky integrators followed by moving-average
//! trend removal. Its output is a slow bipolar signal whose positive-going
//! zero crossings line up with glottal closure instants; the samples between
//! crossings give an instantaneous pitch period.
//!
//! # Design Notes
//! - Pure integrators diverge; the 0.999 leak bounds state while keeping the
//!   resonance close enough to 0 Hz for epoch extraction
//! - Integrator state is kept in f64: the leaked accumulators still reach
//!   magnitudes where f32 would lose the epoch structure
//! - Trend removal (moving-average subtraction) is the high-pass that turns
//!   the drifting integrator output into a usable bipolar signal

/// Leaky double integrator with moving-average trend removal.
pub struct ZeroFreqResonator {
    int1: f64,
    int2: f64,
    trend_buffer: Vec<f32>,
    trend_write_pos: usize,
    trend_accum: f32,
}

/// Integrator leak. Close to 1.0 keeps the resonance near 0 Hz.
const INTEGRATOR_LEAK: f64 = 0.999;

impl ZeroFreqResonator {
    pub fn new(sample_rate: u32, trend_window_ms: f32) -> Self {
        let trend_len = ((sample_rate as f32 * trend_window_ms * 0.001) as usize).max(1);
        Self {
            int1: 0.0,
            int2: 0.0,
            trend_buffer: vec![0.0; trend_len],
            trend_write_pos: 0,
            trend_accum: 0.0,
        }
    }

    /// Process one sample and return the trend-removed resonator output.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        self.int1 = self.int1 * INTEGRATOR_LEAK + input as f64;
        self.int2 = self.int2 * INTEGRATOR_LEAK + self.int1;

        let val = self.int2 as f32;

        let old = self.trend_buffer[self.trend_write_pos];
        self.trend_buffer[self.trend_write_pos] = val;
        self.trend_accum += val - old;
        self.trend_write_pos += 1;
        if self.trend_write_pos >= self.trend_buffer.len() {
            self.trend_write_pos = 0;
        }

        let trend = self.trend_accum / self.trend_buffer.len() as f32;
        val - trend
    }

    pub fn reset(&mut self) {
        self.int1 = 0.0;
        self.int2 = 0.0;
        self.trend_buffer.fill(0.0);
        self.trend_write_pos = 0;
        self.trend_accum = 0.0;
    }
}

/// Valid F0 range for human voicing (Hz).
const F0_MIN_HZ: f32 = 50.0;
const F0_MAX_HZ: f32 = 600.0;

/// EMA weights for in-range F0 tracking.
const F0_SMOOTH_KEEP: f32 = 0.7;
const F0_SMOOTH_NEW: f32 = 0.3;

/// Relative deviation below which a candidate tracks the smoothed value.
const F0_DEVIATION_MAX: f32 = 0.2;

/// Consecutive out-of-range candidates needed to accept a pitch step.
const F0_JUMP_CONFIRM: u32 = 3;

/// Epoch refill value for the voicing counter.
const VOICING_REFILL: u32 = 5;

/// Fractional rise over the running minimum that counts as an F0 rise.
const F0_RISE_FACTOR: f32 = 1.05;

/// Epoch-driven F0 estimation and voicing decision.
///
/// Consumes the resonator output one sample at a time. Candidate F0 values
/// from epoch spacing are median-free smoothed with outlier confirmation, so
/// a single octave error does not drag the track.
pub struct VoicingTracker {
    sample_rate: f32,
    voiced_hold_samples: u32,
    baseline_alpha: f32,

    last_zff_val: f32,
    samples_since_epoch: u32,

    current_f0: f32,
    smoothed_f0: f32,
    prev_smoothed_f0: f32,
    f0_derivative: f32,
    min_f0_since_event: f32,
    f0_has_risen: bool,
    jump_counter: u32,

    // Slow reference for semitone distance (ca. 1 s EMA)
    f0_baseline: f32,
    f0_semitone_diff: f32,

    voicing_counter: u32,
    is_voiced: bool,
}

impl VoicingTracker {
    pub fn new(sample_rate: u32, voiced_hold_ms: f32) -> Self {
        let hold = ((voiced_hold_ms * 0.001 * sample_rate as f32) as u32).max(1);
        Self {
            sample_rate: sample_rate as f32,
            voiced_hold_samples: hold,
            baseline_alpha: 1.0 - (-1.0 / (1.0 * sample_rate as f32)).exp(),
            last_zff_val: 0.0,
            samples_since_epoch: 0,
            current_f0: 0.0,
            smoothed_f0: 0.0,
            prev_smoothed_f0: 0.0,
            f0_derivative: 0.0,
            min_f0_since_event: 0.0,
            // Allow the very first detection before any rise has been seen
            f0_has_risen: true,
            jump_counter: 0,
            f0_baseline: 0.0,
            f0_semitone_diff: 0.0,
            voicing_counter: 0,
            is_voiced: false,
        }
    }

    /// Advance the tracker by one resonator output sample.
    pub fn process(&mut self, zff_out: f32) {
        let is_epoch = self.last_zff_val < 0.0 && zff_out >= 0.0;

        if is_epoch {
            if self.samples_since_epoch > 0 {
                let raw_f0 = self.sample_rate / self.samples_since_epoch as f32;
                if raw_f0 > F0_MIN_HZ && raw_f0 < F0_MAX_HZ {
                    self.accept_candidate(raw_f0);
                    self.voicing_counter = VOICING_REFILL;
                }
            }
            self.samples_since_epoch = 0;
        } else {
            self.samples_since_epoch += 1;
        }

        self.last_zff_val = zff_out;

        // Voicing: epoch samples refresh it, otherwise the hold window decides
        self.is_voiced = self.voicing_counter > 0;
        if !is_epoch {
            self.is_voiced = self.samples_since_epoch <= self.voiced_hold_samples;
        }

        self.f0_derivative = self.smoothed_f0 - self.prev_smoothed_f0;
        self.prev_smoothed_f0 = self.smoothed_f0;

        if self.smoothed_f0 > F0_MIN_HZ {
            if self.min_f0_since_event < F0_MIN_HZ {
                self.min_f0_since_event = self.smoothed_f0;
            } else if self.smoothed_f0 < self.min_f0_since_event {
                self.min_f0_since_event = self.smoothed_f0;
            }

            if self.smoothed_f0 > self.min_f0_since_event * F0_RISE_FACTOR {
                self.f0_has_risen = true;
            }

            if self.f0_baseline < F0_MIN_HZ {
                self.f0_baseline = self.smoothed_f0;
            } else {
                self.f0_baseline = self.baseline_alpha * self.smoothed_f0
                    + (1.0 - self.baseline_alpha) * self.f0_baseline;
            }

            self.f0_semitone_diff = 12.0 * (self.smoothed_f0 / (self.f0_baseline + 0.1)).log2();
        } else {
            // No pitch track: unvoiced segments may still carry onsets
            if !self.is_voiced {
                self.f0_has_risen = true;
            }
            self.f0_semitone_diff = 0.0;
        }
    }

    fn accept_candidate(&mut self, raw_f0: f32) {
        if self.smoothed_f0 < F0_MIN_HZ {
            // First valid F0, initialize directly
            self.smoothed_f0 = raw_f0;
            self.current_f0 = raw_f0;
            self.jump_counter = 0;
            return;
        }

        let deviation = (raw_f0 - self.smoothed_f0).abs() / self.smoothed_f0;
        if deviation < F0_DEVIATION_MAX {
            self.smoothed_f0 = F0_SMOOTH_KEEP * self.smoothed_f0 + F0_SMOOTH_NEW * raw_f0;
            self.current_f0 = self.smoothed_f0;
            self.jump_counter = 0;
        } else {
            // Possible octave jump or noise, require confirmation
            self.jump_counter += 1;
            if self.jump_counter > F0_JUMP_CONFIRM {
                self.smoothed_f0 = raw_f0;
                self.current_f0 = raw_f0;
                self.jump_counter = 0;
            }
        }
    }

    /// Called on onset entry: restart rise detection from the current track.
    pub fn mark_event(&mut self) {
        self.min_f0_since_event = self.smoothed_f0;
        self.f0_has_risen = false;
    }

    #[inline]
    pub fn is_voiced(&self) -> bool {
        self.is_voiced
    }

    #[inline]
    pub fn current_f0(&self) -> f32 {
        self.current_f0
    }

    #[inline]
    pub fn smoothed_f0(&self) -> f32 {
        self.smoothed_f0
    }

    #[inline]
    pub fn f0_has_risen(&self) -> bool {
        self.f0_has_risen
    }

    #[inline]
    pub fn voicing_counter(&self) -> u32 {
        self.voicing_counter
    }

    #[inline]
    pub fn semitone_diff(&self) -> f32 {
        self.f0_semitone_diff
    }

    pub fn reset(&mut self) {
        self.last_zff_val = 0.0;
        self.samples_since_epoch = 0;
        self.current_f0 = 0.0;
        self.smoothed_f0 = 0.0;
        self.prev_smoothed_f0 = 0.0;
        self.f0_derivative = 0.0;
        self.min_f0_since_event = 0.0;
        self.f0_has_risen = true;
        self.jump_counter = 0;
        self.f0_baseline = 0.0;
        self.f0_semitone_diff = 0.0;
        self.voicing_counter = 0;
        self.is_voiced = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive the tracker with an artificial epoch train at `f0` Hz.
    fn feed_epoch_train(tracker: &mut VoicingTracker, f0: f32, sr: f32, seconds: f32) {
        let period = (sr / f0) as usize;
        let total = (sr * seconds) as usize;
        for i in 0..total {
            // Square-ish bipolar signal with a positive crossing every period
            let phase = i % period;
            let val = if phase < period / 2 { 1.0 } else { -1.0 };
            tracker.process(val);
        }
    }

    #[test]
    fn epoch_train_yields_f0_and_voicing() {
        let sr = 16000.0;
        let mut tracker = VoicingTracker::new(16000, 30.0);
        feed_epoch_train(&mut tracker, 120.0, sr, 0.5);

        assert!(tracker.is_voiced());
        let f0 = tracker.smoothed_f0();
        assert!(
            (100.0..=140.0).contains(&f0),
            "expected ~120 Hz, got {}",
            f0
        );
    }

    #[test]
    fn silence_drops_voicing_after_hold() {
        let sr = 16000.0;
        let mut tracker = VoicingTracker::new(16000, 30.0);
        feed_epoch_train(&mut tracker, 120.0, sr, 0.3);
        assert!(tracker.is_voiced());

        // A constant negative signal has no further positive crossings
        for _ in 0..(sr * 0.1) as usize {
            tracker.process(-1.0);
        }
        assert!(!tracker.is_voiced());
    }

    #[test]
    fn octave_jump_needs_confirmation() {
        let sr = 16000.0;
        let mut tracker = VoicingTracker::new(16000, 30.0);
        feed_epoch_train(&mut tracker, 100.0, sr, 0.5);
        let before = tracker.smoothed_f0();
        assert!((before - 100.0).abs() < 15.0);

        // Two outlier periods are not enough to move the track
        let period = (sr / 200.0) as usize;
        for i in 0..(2 * period) {
            let phase = i % period;
            tracker.process(if phase < period / 2 { 1.0 } else { -1.0 });
        }
        assert!((tracker.smoothed_f0() - before).abs() < 10.0);

        // A sustained step is eventually accepted
        feed_epoch_train(&mut tracker, 200.0, sr, 0.3);
        assert!(tracker.smoothed_f0() > 160.0);
    }

    #[test]
    fn resonator_output_is_bounded() {
        let mut zfr = ZeroFreqResonator::new(16000, 10.0);
        let mut max_abs = 0.0f32;
        for i in 0..32000 {
            let x = (2.0 * std::f32::consts::PI * 120.0 * i as f32 / 16000.0).sin() * 0.5;
            let y = zfr.process(x);
            max_abs = max_abs.max(y.abs());
        }
        assert!(max_abs.is_finite());
    }
}
