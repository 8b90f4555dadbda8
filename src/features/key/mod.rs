//! Key detection modules
//!
//! Detect musical key using:
//! - Krumhansl-Schmuckler templates (24 keys)
//! - Cosine correlation against the averaged chroma

pub mod detector;
pub mod templates;

pub use detector::detect_key;
pub use templates::KeyTemplates;

use crate::analysis::result::Key;

/// Key detection result
#[derive(Debug, Clone)]
pub struct KeyDetectionResult {
    /// Detected key (best match)
    pub key: Key,

    /// Correlation of the best match (cosine, 0.0-1.0 for non-negative chroma)
    pub correlation: f32,

    /// All 24 key scores (ranked, highest first)
    pub all_scores: Vec<(Key, f32)>,
}
