//! Event ring buffer and prominence scoring.
//!
//! Finished syllables are held in a fixed 16-slot ring so each one can be
//! scored against up to `context_size` neighbors on both sides before it is
//! released to the caller. Single producer (the state machine), single
//! consumer (the emission loop); on overflow the oldest unread event is
//! silently displaced together with the write.
//!
//! The prominence score is a weighted sum of ratios against the context
//! means: energy, PeakRate, duration, rise slope, fusion, plus the
//! Weber-Fechner "stress integral" (fusion x duration), an F0-change bonus
//! and an absolute F0-level bonus for high-pitched secondary accents.
//! Duration carries the largest weight; it dominates stress perception.

use crate::event::SyllableEvent;

/// Ring capacity (power of 2).
pub const RING_CAPACITY: usize = 16;

/// Accent threshold applied while streaming (full context available).
pub const STREAMING_ACCENT_THRESHOLD: f32 = 0.9;
/// Accent threshold applied at flush, where the trailing context is missing
/// and ratio scores run high.
pub const FLUSH_ACCENT_THRESHOLD: f32 = 1.2;

/// F0 values at or below this are treated as "no estimate" in context math.
const F0_VALID_HZ: f32 = 50.0;
/// Ratio denominators guard.
const RATIO_EPS: f32 = 1e-4;
/// Stress ratio clamp (phrase-final syllables otherwise blow it up).
const STRESS_RATIO_MAX: f32 = 3.0;
/// Neutral score for an event with no context at all.
const NO_CONTEXT_SCORE: f32 = 0.5;

#[derive(Clone, Copy, Default)]
struct Slot {
    event: SyllableEvent,
    is_ready: bool,
}

pub struct EventRing {
    slots: [Slot; RING_CAPACITY],
    write_idx: usize,
    read_idx: usize,
    count: usize,
    context_size: usize,
}

impl EventRing {
    pub fn new(context_size: usize) -> Self {
        Self {
            slots: [Slot::default(); RING_CAPACITY],
            write_idx: 0,
            read_idx: 0,
            count: 0,
            context_size,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append a finished event, displacing the oldest unread one when full.
    pub fn push(&mut self, event: SyllableEvent) {
        self.slots[self.write_idx] = Slot {
            event,
            is_ready: true,
        };
        self.write_idx = (self.write_idx + 1) % RING_CAPACITY;

        if self.count < RING_CAPACITY {
            self.count += 1;
        } else {
            // Overwrite-oldest: reader skips ahead with the writer
            self.read_idx = (self.read_idx + 1) % RING_CAPACITY;
        }
    }

    /// Score the head event against its current neighbors, mark accent
    /// against `accent_threshold`, and pop it.
    pub fn pop_scored(&mut self, accent_threshold: f32) -> Option<SyllableEvent> {
        if self.count == 0 {
            return None;
        }

        let idx = self.read_idx;
        let delta_f0 = self.context_delta_f0(idx);
        self.slots[idx].event.delta_f0 = delta_f0;

        let score = self.prominence(idx);
        let event = {
            let slot = &mut self.slots[idx];
            slot.event.prominence_score = score;
            slot.event.is_accented = score > accent_threshold;
            slot.is_ready = false;
            slot.event
        };

        self.read_idx = (self.read_idx + 1) % RING_CAPACITY;
        self.count -= 1;
        Some(event)
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.is_ready = false;
        }
        self.write_idx = 0;
        self.read_idx = 0;
        self.count = 0;
    }

    /// F0 difference of the target from the median of its context F0s.
    fn context_delta_f0(&self, target_idx: usize) -> f32 {
        let target = &self.slots[target_idx];
        if !target.is_ready || target.event.f0 < F0_VALID_HZ {
            return 0.0;
        }

        let mut f0s = [0.0f32; RING_CAPACITY];
        let mut n = 0;
        for i in 1..=self.context_size {
            let prev = (target_idx + RING_CAPACITY - i) % RING_CAPACITY;
            if self.slots[prev].is_ready && self.slots[prev].event.f0 > F0_VALID_HZ {
                f0s[n] = self.slots[prev].event.f0;
                n += 1;
            }
            let next = (target_idx + i) % RING_CAPACITY;
            if self.slots[next].is_ready && self.slots[next].event.f0 > F0_VALID_HZ {
                f0s[n] = self.slots[next].event.f0;
                n += 1;
            }
        }

        if n == 0 {
            return 0.0;
        }

        let ctx = &mut f0s[..n];
        ctx.sort_by(|a, b| a.total_cmp(b));
        target.event.f0 - ctx[n / 2]
    }

    fn prominence(&self, target_idx: usize) -> f32 {
        let target = &self.slots[target_idx].event;

        let mut avg_energy = 0.0f32;
        let mut avg_pr = 0.0f32;
        let mut avg_dur = 0.0f32;
        let mut avg_slope = 0.0f32;
        let mut avg_fusion = 0.0f32;
        let mut count = 0usize;

        for i in 1..=self.context_size {
            for idx in [
                (target_idx + RING_CAPACITY - i) % RING_CAPACITY,
                (target_idx + i) % RING_CAPACITY,
            ] {
                let slot = &self.slots[idx];
                if slot.is_ready {
                    avg_energy += slot.event.energy;
                    avg_pr += slot.event.peak_rate;
                    avg_dur += slot.event.duration_s;
                    avg_slope += slot.event.pr_slope;
                    avg_fusion += slot.event.fusion_score;
                    count += 1;
                }
            }
        }

        if count == 0 {
            return NO_CONTEXT_SCORE;
        }

        let n = count as f32;
        avg_energy /= n;
        avg_pr /= n;
        avg_dur /= n;
        avg_slope /= n;
        avg_fusion /= n;

        let ratio = |value: f32, avg: f32| {
            if value > 0.0 {
                value / (avg + RATIO_EPS)
            } else {
                0.0
            }
        };

        let e_score = ratio(target.energy, avg_energy);
        let pr_score = ratio(target.peak_rate, avg_pr);
        let d_score = ratio(target.duration_s, avg_dur);
        let slope_score = ratio(target.pr_slope, avg_slope);
        let fusion_score = ratio(target.fusion_score, avg_fusion);

        let f0_bonus = (target.delta_f0 / 50.0).clamp(0.0, 1.0);

        // Stress integral: fusion x duration, "how strong and how long"
        let stress = target.fusion_score * target.duration_s;
        let avg_stress = avg_fusion * avg_dur;
        let stress_ratio = if avg_stress > 0.001 {
            (stress / avg_stress).min(STRESS_RATIO_MAX)
        } else {
            1.0
        };

        // Absolute F0 level: secondary accents ride on pitch alone
        let mut f0_level_bonus = 0.0;
        if target.f0 > 60.0 {
            let f0_norm = target.f0 / 150.0;
            if f0_norm > 1.1 {
                f0_level_bonus = ((f0_norm - 1.0) * 0.5).min(0.15);
            }
        }

        0.10 * e_score
            + 0.10 * pr_score
            + 0.18 * d_score
            + 0.08 * slope_score
            + 0.18 * fusion_score
            + 0.13 * stress_ratio
            + 0.10 * (1.0 + f0_bonus)
            + 0.13 * (1.0 + f0_level_bonus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(ts: u64, f0: f32, energy: f32, duration_s: f32) -> SyllableEvent {
        SyllableEvent {
            timestamp_samples: ts,
            time_seconds: ts as f64 / 16000.0,
            peak_rate: 0.01,
            pr_slope: 1.0,
            fusion_score: 0.5,
            f0,
            energy,
            duration_s,
            ..Default::default()
        }
    }

    #[test]
    fn empty_context_scores_neutral() {
        let mut ring = EventRing::new(2);
        ring.push(event(1000, 120.0, 1.0, 0.1));
        let e = ring.pop_scored(STREAMING_ACCENT_THRESHOLD).unwrap();
        assert!((e.prominence_score - NO_CONTEXT_SCORE).abs() < 1e-6);
        assert!(!e.is_accented);
    }

    #[test]
    fn louder_longer_event_outscores_neighbors() {
        let mut ring = EventRing::new(2);
        ring.push(event(1000, 120.0, 1.0, 0.08));
        ring.push(event(4000, 180.0, 4.0, 0.20));
        ring.push(event(7000, 120.0, 1.0, 0.08));

        let first = ring.pop_scored(STREAMING_ACCENT_THRESHOLD).unwrap();
        let strong = ring.pop_scored(STREAMING_ACCENT_THRESHOLD).unwrap();
        assert!(strong.prominence_score > first.prominence_score);
        assert!(strong.prominence_score > 1.0);
    }

    #[test]
    fn overflow_displaces_oldest() {
        let mut ring = EventRing::new(2);
        for i in 0..RING_CAPACITY + 3 {
            ring.push(event(i as u64 * 1000, 0.0, 1.0, 0.1));
        }
        assert_eq!(ring.len(), RING_CAPACITY);
        // Head is now event 3, the first three were displaced
        let head = ring.pop_scored(STREAMING_ACCENT_THRESHOLD).unwrap();
        assert_eq!(head.timestamp_samples, 3000);
    }

    #[test]
    fn delta_f0_uses_context_median() {
        let mut ring = EventRing::new(2);
        ring.push(event(0, 100.0, 1.0, 0.1));
        ring.push(event(3000, 150.0, 1.0, 0.1));
        ring.push(event(6000, 110.0, 1.0, 0.1));

        // Head (100 Hz) sees context {150, 110}; median picks 150 per the
        // upper-middle convention, so delta is -50
        let head = ring.pop_scored(STREAMING_ACCENT_THRESHOLD).unwrap();
        assert!((head.delta_f0 + 50.0).abs() < 1e-3);
    }

    #[test]
    fn invalid_f0_yields_zero_delta() {
        let mut ring = EventRing::new(2);
        ring.push(event(0, 0.0, 1.0, 0.1));
        ring.push(event(3000, 120.0, 1.0, 0.1));
        let head = ring.pop_scored(STREAMING_ACCENT_THRESHOLD).unwrap();
        assert_eq!(head.delta_f0, 0.0);
    }
}
