//! Audio I/O
//!
//! Decoding with Symphonia, sample-rate conversion with Rubato and
//! header-only duration probing.

pub mod decoder;
pub mod duration;
pub mod resample;

use std::path::Path;

use crate::error::AnalysisError;

pub use decoder::{decode_audio, DecodedAudio};
pub use duration::probe_duration;

/// Decode at most `max_duration_secs` of a file and resample it to `target_rate`
///
/// # Errors
///
/// Returns `AnalysisError` if decoding or resampling fails
pub fn load_mono(
    path: &Path,
    target_rate: u32,
    max_duration_secs: f32,
) -> Result<Vec<f32>, AnalysisError> {
    let decoded = decode_audio(path, Some(max_duration_secs))?;
    resample::resample(&decoded.samples, decoded.sample_rate, target_rate)
}
