//! Mel-cepstral frame analyzer for phoneme-boundary detection.
//!
//! Pipeline per hop: Hann window, FFT, power spectrum, triangular Mel
//! filterbank, log compression, orthonormal type-II DCT. The emitted value is
//! the L2 norm of the coefficient difference against the previous frame -
//! timbre changes (phoneme transitions, syllable onsets) show up as spikes,
//! steady vowels stay near zero.

use crate::dsp::kernels;
use crate::dsp::spectral_flux::make_hann_window;
use ringbuf::{Consumer, Producer, RingBuffer};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Number of triangular Mel filters.
const NUM_FILTERS: usize = 26;
/// Number of cepstral coefficients kept after the DCT.
const NUM_COEFFS: usize = 13;
/// Low edge of the filterbank (Hz).
const MEL_LOW_HZ: f32 = 80.0;
/// Log compression epsilon.
const LOG_EPS: f32 = 1e-10;

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
}

/// One triangular filter, stored dense over its support only.
struct MelFilter {
    start: usize,
    weights: Vec<f32>,
}

pub struct MfccDelta {
    fft_size: usize,
    hop_size: usize,
    n_bins: usize,

    fft: Arc<dyn Fft<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    spectrum: Vec<Complex<f32>>,

    input_producer: Producer<f32>,
    input_consumer: Consumer<f32>,
    samples_since_hop: usize,

    window: Vec<f32>,
    frame: Vec<f32>,
    power_spectrum: Vec<f32>,

    filters: Vec<MelFilter>,
    mel_energies: [f32; NUM_FILTERS],
    // Row-major [NUM_COEFFS][NUM_FILTERS]
    dct_matrix: Vec<f32>,

    coeffs: [f32; NUM_COEFFS],
    prev_coeffs: [f32; NUM_COEFFS],
    delta_magnitude: f32,
}

fn build_filterbank(sample_rate: u32, fft_size: usize, n_bins: usize) -> Vec<MelFilter> {
    let mel_low = hz_to_mel(MEL_LOW_HZ);
    let mel_high = hz_to_mel(sample_rate as f32 / 2.0);

    // Edge bins, equally spaced in Mel
    let bin_width = sample_rate as f32 / fft_size as f32;
    let edges: Vec<usize> = (0..NUM_FILTERS + 2)
        .map(|i| {
            let mel = mel_low + (mel_high - mel_low) * i as f32 / (NUM_FILTERS + 1) as f32;
            (((mel_to_hz(mel) / bin_width) + 0.5) as usize).min(n_bins - 1)
        })
        .collect();

    (0..NUM_FILTERS)
        .map(|f| {
            let start = edges[f];
            let center = edges[f + 1];
            let end = edges[f + 2];

            let weights = (start..=end)
                .map(|k| {
                    if k <= center {
                        (k - start) as f32 / (center - start + 1) as f32
                    } else {
                        (end - k) as f32 / (end - center + 1) as f32
                    }
                })
                .collect();

            MelFilter { start, weights }
        })
        .collect()
}

fn build_dct_matrix() -> Vec<f32> {
    // Type-II DCT, orthonormal scale
    let scale = (2.0 / NUM_FILTERS as f32).sqrt();
    let mut m = vec![0.0; NUM_COEFFS * NUM_FILTERS];
    for i in 0..NUM_COEFFS {
        for j in 0..NUM_FILTERS {
            m[i * NUM_FILTERS + j] =
                scale * (PI * i as f32 * (j as f32 + 0.5) / NUM_FILTERS as f32).cos();
        }
    }
    m
}

impl MfccDelta {
    pub fn new(sample_rate: u32, fft_size: usize, hop_size: usize) -> Self {
        let n_bins = fft_size / 2 + 1;

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let fft_scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];

        let (mut in_prod, in_cons) = RingBuffer::<f32>::new(fft_size * 4).split();
        for _ in 0..fft_size {
            let _ = in_prod.push(0.0);
        }

        Self {
            fft_size,
            hop_size,
            n_bins,
            fft,
            fft_scratch,
            spectrum: vec![Complex::default(); fft_size],
            input_producer: in_prod,
            input_consumer: in_cons,
            samples_since_hop: 0,
            window: make_hann_window(fft_size),
            frame: vec![0.0; fft_size],
            power_spectrum: vec![0.0; n_bins],
            filters: build_filterbank(sample_rate, fft_size, n_bins),
            mel_energies: [0.0; NUM_FILTERS],
            dct_matrix: build_dct_matrix(),
            coeffs: [0.0; NUM_COEFFS],
            prev_coeffs: [0.0; NUM_COEFFS],
            delta_magnitude: 0.0,
        }
    }

    /// Feed one sample. Returns the new delta magnitude on hop boundaries.
    #[inline]
    pub fn process(&mut self, input: f32) -> Option<f32> {
        let _ = self.input_producer.push(input);
        self.samples_since_hop += 1;

        if self.samples_since_hop < self.hop_size {
            return None;
        }
        self.samples_since_hop = 0;

        for _ in 0..self.hop_size {
            let _ = self.input_consumer.pop();
        }
        for (i, v) in self.input_consumer.iter().take(self.fft_size).enumerate() {
            self.frame[i] = *v;
        }

        self.analyze_frame();
        Some(self.delta_magnitude)
    }

    fn analyze_frame(&mut self) {
        kernels::apply_window(&mut self.frame, &self.window);
        for (i, &v) in self.frame.iter().enumerate() {
            self.spectrum[i] = Complex::new(v, 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.spectrum, &mut self.fft_scratch);

        for k in 0..self.n_bins {
            self.power_spectrum[k] = self.spectrum[k].norm_sqr();
        }

        for (f, filter) in self.filters.iter().enumerate() {
            let span = &self.power_spectrum[filter.start..filter.start + filter.weights.len()];
            let energy = kernels::dot(span, &filter.weights);
            self.mel_energies[f] = (energy + LOG_EPS).ln();
        }

        self.prev_coeffs = self.coeffs;
        for i in 0..NUM_COEFFS {
            let row = &self.dct_matrix[i * NUM_FILTERS..(i + 1) * NUM_FILTERS];
            self.coeffs[i] = kernels::dot(row, &self.mel_energies);
        }

        let mut delta_sum = 0.0;
        for i in 0..NUM_COEFFS {
            let d = self.coeffs[i] - self.prev_coeffs[i];
            delta_sum += d * d;
        }
        self.delta_magnitude = delta_sum.sqrt();
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.delta_magnitude
    }

    pub fn reset(&mut self) {
        while self.input_consumer.pop().is_some() {}
        for _ in 0..self.fft_size {
            let _ = self.input_producer.push(0.0);
        }
        self.samples_since_hop = 0;
        self.coeffs = [0.0; NUM_COEFFS];
        self.prev_coeffs = [0.0; NUM_COEFFS];
        self.delta_magnitude = 0.0;
    }
}
