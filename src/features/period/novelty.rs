//! Multi-feature novelty curves
//!
//! Three complementary detection functions computed from one magnitude
//! spectrogram and fused into a single conditioned novelty curve:
//! - Spectral flux: harmonic/timbral changes
//! - Energy flux: loudness changes
//! - High-frequency content (HFC): sharp percussive attacks
//!
//! # Reference
//!
//! Bello, J. P., Daudet, L., Abdallah, S., Duxbury, C., Davies, M., & Sandler, M. B. (2005).
//! A Tutorial on Onset Detection in Music Signals.
//! *IEEE Transactions on Speech and Audio Processing*, 13(5), 1035-1047.
//!
//! Zapata, J. R., Davies, M. E. P., & Gómez, E. (2014). Multi-Feature Beat Tracking.
//! *IEEE/ACM Transactions on Audio, Speech, and Language Processing*, 22(4), 816-825.

use crate::error::AnalysisError;

const EPSILON: f32 = 1e-10;

const WEIGHT_SPECTRAL: f32 = 0.5;
const WEIGHT_ENERGY: f32 = 0.3;
const WEIGHT_HFC: f32 = 0.2;

/// Frames used for the local-mean subtraction of the fused curve
const LOCAL_MEAN_WINDOW: usize = 16;

/// Frames used for the final moving-average smoothing
const SMOOTHING_WINDOW: usize = 5;

fn check_frames(magnitude_spec_frames: &[Vec<f32>]) -> Result<usize, AnalysisError> {
    let n_bins = magnitude_spec_frames.first().map(|f| f.len()).unwrap_or(0);
    if n_bins == 0 {
        return Err(AnalysisError::InvalidInput("Empty magnitude frames".to_string()));
    }
    if let Some((i, frame)) = magnitude_spec_frames
        .iter()
        .enumerate()
        .find(|(_, frame)| frame.len() != n_bins)
    {
        return Err(AnalysisError::InvalidInput(format!(
            "Inconsistent frame lengths: frame 0 has {} bins, frame {} has {} bins",
            n_bins,
            i,
            frame.len()
        )));
    }
    Ok(n_bins)
}

/// Half-wave rectified first difference of a per-frame feature, scaled to [0, 1]
fn rectified_flux(values: &[f32]) -> Vec<f32> {
    let mut flux: Vec<f32> = values.windows(2).map(|w| (w[1] - w[0]).max(0.0)).collect();
    normalize_in_place(&mut flux);
    flux
}

/// Spectral flux novelty
///
/// Each frame is scaled by its own maximum, then the L2 norm of the positive
/// bin-wise differences between consecutive frames is taken.
///
/// # Returns
///
/// `n_frames - 1` values in [0, 1]; empty for fewer than two frames
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for empty or ragged frames
pub fn spectral_flux_novelty(magnitude_spec_frames: &[Vec<f32>]) -> Result<Vec<f32>, AnalysisError> {
    if magnitude_spec_frames.len() < 2 {
        return Ok(Vec::new());
    }
    let n_bins = check_frames(magnitude_spec_frames)?;

    log::debug!(
        "Computing spectral flux novelty: {} frames, {} bins",
        magnitude_spec_frames.len(),
        n_bins
    );

    let scaled: Vec<Vec<f32>> = magnitude_spec_frames
        .iter()
        .map(|frame| {
            let max_mag = frame.iter().copied().fold(0.0f32, f32::max);
            if max_mag > EPSILON {
                frame.iter().map(|x| x / max_mag).collect()
            } else {
                vec![0.0; n_bins]
            }
        })
        .collect();

    let mut flux: Vec<f32> = scaled
        .windows(2)
        .map(|pair| {
            pair[1]
                .iter()
                .zip(&pair[0])
                .map(|(cur, prev)| (cur - prev).max(0.0).powi(2))
                .sum::<f32>()
                .sqrt()
        })
        .collect();
    normalize_in_place(&mut flux);
    Ok(flux)
}

/// Energy flux novelty (positive change of total spectral energy)
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for empty or ragged frames
pub fn energy_flux_novelty(magnitude_spec_frames: &[Vec<f32>]) -> Result<Vec<f32>, AnalysisError> {
    if magnitude_spec_frames.len() < 2 {
        return Ok(Vec::new());
    }
    check_frames(magnitude_spec_frames)?;

    let energies: Vec<f32> = magnitude_spec_frames
        .iter()
        .map(|frame| frame.iter().map(|x| x * x).sum())
        .collect();
    Ok(rectified_flux(&energies))
}

/// High-frequency content novelty (positive change of `Σ k·|X[k]|²`)
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for empty or ragged frames
pub fn hfc_novelty(magnitude_spec_frames: &[Vec<f32>]) -> Result<Vec<f32>, AnalysisError> {
    if magnitude_spec_frames.len() < 2 {
        return Ok(Vec::new());
    }
    check_frames(magnitude_spec_frames)?;

    let hfc: Vec<f32> = magnitude_spec_frames
        .iter()
        .map(|frame| {
            frame
                .iter()
                .enumerate()
                .map(|(k, mag)| k as f32 * mag * mag)
                .sum()
        })
        .collect();
    Ok(rectified_flux(&hfc))
}

/// Fuse the three novelty curves into one conditioned curve
///
/// Weighted average (spectral 0.5, energy 0.3, HFC 0.2), then local-mean
/// subtraction with half-wave rectification, moving-average smoothing and
/// rescaling to [0, 1]. The output length is that of the shortest input.
pub fn combined_novelty(spectral: &[f32], energy: &[f32], hfc: &[f32]) -> Vec<f32> {
    let len = spectral.len().min(energy.len()).min(hfc.len());
    if len == 0 {
        return Vec::new();
    }

    let weight_sum = WEIGHT_SPECTRAL + WEIGHT_ENERGY + WEIGHT_HFC;
    let mut combined: Vec<f32> = (0..len)
        .map(|i| {
            (spectral[i] * WEIGHT_SPECTRAL + energy[i] * WEIGHT_ENERGY + hfc[i] * WEIGHT_HFC)
                / weight_sum
        })
        .collect();

    normalize_in_place(&mut combined);
    combined = local_mean_subtract(&combined, LOCAL_MEAN_WINDOW);
    smooth_moving_average_in_place(&mut combined, SMOOTHING_WINDOW);
    normalize_in_place(&mut combined);

    log::debug!("Combined novelty: {} values", combined.len());
    combined
}

fn normalize_in_place(curve: &mut [f32]) {
    let max_val = curve.iter().copied().fold(0.0f32, f32::max);
    if max_val > EPSILON {
        for v in curve.iter_mut() {
            *v /= max_val;
        }
    }
}

/// `max(0, x[i] - mean(x[i - w/2 ..= i + w/2]))`
fn local_mean_subtract(x: &[f32], window: usize) -> Vec<f32> {
    let half = window / 2;
    (0..x.len())
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(x.len());
            let mean = x[start..end].iter().sum::<f32>() / (end - start) as f32;
            (x[i] - mean).max(0.0)
        })
        .collect()
}

fn smooth_moving_average_in_place(x: &mut [f32], window: usize) {
    if x.len() < 3 || window <= 1 {
        return;
    }
    let half = window / 2;
    let orig = x.to_vec();
    for (i, v) in x.iter_mut().enumerate() {
        let start = i.saturating_sub(half);
        let end = (i + half + 1).min(orig.len());
        *v = orig[start..end].iter().sum::<f32>() / (end - start) as f32;
    }
}
