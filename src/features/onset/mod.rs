//! Onset analysis
//!
//! - Harmonic-percussive source separation (HPSS)
//! - Onset-strength envelope (log-mel spectral flux)

pub mod hpss;
pub mod strength;

pub use hpss::hpss_decompose;
pub use strength::onset_strength;
