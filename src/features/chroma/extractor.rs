//! Chroma vector extraction
//!
//! Folds constant-Q magnitudes into 12 pitch classes. With three bins per
//! semitone starting on C, bin `b` belongs to semitone `round(b / 3)`, so the
//! bins a third of a semitone either side of a pitch fold onto that pitch.
//! Each frame is scaled by its maximum, then frames are averaged.

use rayon::prelude::*;

use super::cqt::{CqtKernel, C1_HZ};
use crate::error::AnalysisError;

/// Constant-Q bins per octave used for chroma
pub const CQT_BINS_PER_OCTAVE: usize = 36;

/// Octaves covered from C1
pub const CQT_OCTAVES: usize = 7;

const EPSILON: f32 = 1e-10;

/// Extract per-frame chroma from a magnitude spectrogram
///
/// # Arguments
///
/// * `magnitude_spec` - Frames of `n_fft / 2 + 1` magnitudes
/// * `sample_rate` - Sample rate in Hz
/// * `n_fft` - FFT size used for the spectrogram
///
/// # Returns
///
/// One 12-element chroma vector per frame, each scaled to a maximum of 1
/// (silent frames stay all zero)
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for an empty spectrogram or invalid CQT parameters
pub fn extract_chroma(
    magnitude_spec: &[Vec<f32>],
    sample_rate: u32,
    n_fft: usize,
) -> Result<Vec<[f32; 12]>, AnalysisError> {
    if magnitude_spec.is_empty() {
        return Err(AnalysisError::InvalidInput("Empty spectrogram".to_string()));
    }

    log::debug!(
        "Extracting CQT chroma: {} frames, sr={}, n_fft={}",
        magnitude_spec.len(),
        sample_rate,
        n_fft
    );

    let kernel = CqtKernel::new(sample_rate, n_fft, C1_HZ, CQT_OCTAVES, CQT_BINS_PER_OCTAVE)?;
    let per_semitone = kernel.bins_per_octave() / 12;

    let chroma = magnitude_spec
        .par_iter()
        .map(|frame| {
            let cqt = kernel.apply(frame);
            let mut chroma = [0.0f32; 12];
            for (bin, value) in cqt.iter().enumerate() {
                let semitone = ((bin + per_semitone / 2) / per_semitone) % 12;
                chroma[semitone] += value;
            }
            let peak = chroma.iter().copied().fold(0.0f32, f32::max);
            if peak > EPSILON {
                chroma.iter_mut().for_each(|c| *c /= peak);
            }
            chroma
        })
        .collect();

    Ok(chroma)
}

/// Average chroma over time
///
/// Returns all zeros for an empty input.
pub fn mean_chroma(chroma_frames: &[[f32; 12]]) -> [f32; 12] {
    let mut mean = [0.0f32; 12];
    if chroma_frames.is_empty() {
        return mean;
    }
    for frame in chroma_frames {
        for (m, c) in mean.iter_mut().zip(frame) {
            *m += c;
        }
    }
    let n = chroma_frames.len() as f32;
    mean.iter_mut().for_each(|m| *m /= n);
    mean
}
