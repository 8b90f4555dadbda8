//! Onset-strength envelope
//!
//! Log-power mel spectral flux: the spectrogram is projected to mel bands,
//! converted to decibels, differenced frame to frame, half-wave rectified and
//! averaged across bands.
//!
//! # Reference
//!
//! Böck, S., & Widmer, G. (2013). Maximum Filter Vibrato Suppression for Onset Detection.
//! *Proceedings of the 16th International Conference on Digital Audio Effects (DAFx)*.

use crate::error::AnalysisError;
use crate::features::mel::{apply_filterbank, mel_filterbank};

/// Dynamic range kept below the loudest mel cell
const TOP_DB: f32 = 80.0;

const AMIN: f32 = 1e-10;

/// Compute an onset-strength envelope from a magnitude spectrogram
///
/// # Arguments
///
/// * `magnitude_spec` - Magnitude spectrogram (n_frames × (n_fft/2+1))
/// * `sample_rate` - Sample rate in Hz
/// * `n_fft` - FFT size used to build the spectrogram
/// * `n_mels` - Number of mel bands
///
/// # Returns
///
/// One non-negative value per frame; the first frame is always 0
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` if the frame width does not match `n_fft`
pub fn onset_strength(
    magnitude_spec: &[Vec<f32>],
    sample_rate: u32,
    n_fft: usize,
    n_mels: usize,
) -> Result<Vec<f32>, AnalysisError> {
    if magnitude_spec.is_empty() {
        return Ok(Vec::new());
    }
    if sample_rate == 0 || n_mels == 0 {
        return Err(AnalysisError::InvalidInput(format!(
            "Invalid onset parameters: sample_rate={}, n_mels={}",
            sample_rate, n_mels
        )));
    }

    let n_bins = n_fft / 2 + 1;
    if magnitude_spec.iter().any(|frame| frame.len() != n_bins) {
        return Err(AnalysisError::InvalidInput(format!(
            "Spectrogram frames must have {} bins for n_fft={}",
            n_bins, n_fft
        )));
    }

    log::debug!(
        "Computing onset strength: {} frames, {} mel bands",
        magnitude_spec.len(),
        n_mels
    );

    let filterbank = mel_filterbank(sample_rate, n_fft, n_mels, 0.0, sample_rate as f32 / 2.0);

    let mut mel_db: Vec<Vec<f32>> = magnitude_spec
        .iter()
        .map(|frame| {
            let power: Vec<f32> = frame.iter().map(|m| m * m).collect();
            apply_filterbank(&filterbank, &power)
                .into_iter()
                .map(|p| 10.0 * p.max(AMIN).log10())
                .collect()
        })
        .collect();

    let peak_db = mel_db
        .iter()
        .flat_map(|frame| frame.iter().copied())
        .fold(f32::NEG_INFINITY, f32::max);
    let floor = peak_db - TOP_DB;
    for frame in mel_db.iter_mut() {
        for v in frame.iter_mut() {
            *v = v.max(floor);
        }
    }

    let mut envelope = Vec::with_capacity(mel_db.len());
    envelope.push(0.0);
    for t in 1..mel_db.len() {
        let flux: f32 = mel_db[t]
            .iter()
            .zip(&mel_db[t - 1])
            .map(|(cur, prev)| (cur - prev).max(0.0))
            .sum();
        envelope.push(flux / n_mels as f32);
    }

    Ok(envelope)
}
