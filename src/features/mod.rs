//! Feature extraction modules
//!
//! This module contains all feature extraction algorithms:
//! - STFT framing and windows, mel filterbanks
//! - Harmonic/percussive separation and onset strength
//! - Period estimation (BPM detection)
//! - Chroma extraction and profile-correlation key detection
//! - Harmonic pitch class profiles and EDMA key matching

pub mod chroma;
pub mod hpcp;
pub mod key;
pub mod mel;
pub mod onset;
pub mod period;
pub mod stft;
