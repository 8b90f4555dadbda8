//! Chroma extraction modules
//!
//! Pitch-class distribution (12 semitones) from a magnitude spectrogram:
//! - Constant-Q spectral kernel
//! - Folding to pitch classes and time averaging

pub mod cqt;
pub mod extractor;

pub use extractor::{extract_chroma, mean_chroma};
