//! DSP primitives for the detection pipeline.
//!
//! Each module is a self-contained streaming transducer: construct once with
//! the sample rate, call `process` per sample (or per hop for the framed
//! analyzers), `reset` to reuse. None of them allocate after construction.
//!
//! ## Per-sample
//! - [`agc`] - input normalization ahead of everything else
//! - [`zff`] - zero-frequency resonator + epoch/F0/voicing tracking
//! - [`biquad`] - RBJ filters (formant bandpass, high-pass)
//! - [`envelope`] - attack/release follower feeding PeakRate
//! - [`high_freq_energy`] - fricative/plosive band energy
//! - [`wavelet`] - Morlet bank transient score
//! - [`energy`] - TEO, local energy ratio, adaptive floor
//!
//! ## Framed (Hann + FFT, one value per hop)
//! - [`spectral_flux`] - onset flux + spectral flatness
//! - [`mfcc`] - Mel-cepstral delta
//!
//! ## Shared
//! - [`kernels`] - vectorization-friendly slice loops

pub mod agc;
pub mod biquad;
pub mod energy;
pub mod envelope;
pub mod high_freq_energy;
pub mod kernels;
pub mod mfcc;
pub mod spectral_flux;
pub mod wavelet;
pub mod zff;

pub use agc::Agc;
pub use biquad::Biquad;
pub use energy::{EnergyFloor, LocalEnergyRatio, TeagerEnergy};
pub use envelope::EnvelopeFollower;
pub use high_freq_energy::HighFreqEnergy;
pub use mfcc::MfccDelta;
pub use spectral_flux::SpectralFlux;
pub use wavelet::WaveletBank;
pub use zff::{VoicingTracker, ZeroFreqResonator};
