//! Comb filterbank tempo estimation
//!
//! Every candidate tempo defines a beat grid anchored on the first onset.
//! The candidate is scored by how well that grid and the detected onsets
//! explain each other: the F-measure of beat precision (fraction of grid
//! beats with an onset nearby) and onset recall (fraction of onsets near a
//! grid beat). Half- and double-tempo grids each lose one of the two terms,
//! which keeps the filterbank from collapsing onto the slowest metrical level.
//!
//! The matching tolerance adapts to tempo: `0.1 * (120 / bpm)` of a beat,
//! clamped to [0.05, 0.15].
//!
//! # Reference
//!
//! Gkiokas, A., Katsouros, V., & Carayannis, G. (2012).
//! Dimensionality Reduction for BPM Estimation.
//! *IEEE Transactions on Audio, Speech, and Language Processing*, 20(3), 865-876.

use super::BpmCandidate;
use crate::error::AnalysisError;

const EPSILON: f32 = 1e-6;

const DEFAULT_TOLERANCE: f32 = 0.1;
const MIN_TOLERANCE: f32 = 0.05;
const MAX_TOLERANCE: f32 = 0.15;
const REFERENCE_BPM: f32 = 120.0;

/// Coarse grid step of [`coarse_to_fine_search`]
const COARSE_RESOLUTION: f32 = 2.0;

/// Fine grid step of [`coarse_to_fine_search`]
const FINE_RESOLUTION: f32 = 0.5;

/// Score every BPM on a regular grid
///
/// # Arguments
///
/// * `onsets` - Onset times in samples
/// * `sample_rate` - Sample rate in Hz
/// * `min_bpm` / `max_bpm` - Candidate range
/// * `bpm_resolution` - Grid step in BPM
///
/// # Returns
///
/// Candidates with confidence relative to the best score, highest first.
/// Candidates under 10% of the best are dropped. Empty for fewer than two onsets.
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for an empty onset list or invalid parameters
pub fn estimate_bpm_from_comb_filter(
    onsets: &[usize],
    sample_rate: u32,
    min_bpm: f32,
    max_bpm: f32,
    bpm_resolution: f32,
) -> Result<Vec<BpmCandidate>, AnalysisError> {
    if onsets.is_empty() {
        return Err(AnalysisError::InvalidInput("Empty onset list".to_string()));
    }
    if sample_rate == 0 {
        return Err(AnalysisError::InvalidInput("Invalid sample rate: 0".to_string()));
    }
    if min_bpm <= 0.0 || max_bpm <= 0.0 || min_bpm >= max_bpm {
        return Err(AnalysisError::InvalidInput(format!(
            "Invalid BPM range: [{:.1}, {:.1}]",
            min_bpm, max_bpm
        )));
    }
    if bpm_resolution <= 0.0 {
        return Err(AnalysisError::InvalidInput(format!(
            "Invalid BPM resolution: {:.2}",
            bpm_resolution
        )));
    }

    log::debug!(
        "Comb filterbank: {} onsets, range=[{:.1}, {:.1}] BPM, step={:.2}",
        onsets.len(),
        min_bpm,
        max_bpm,
        bpm_resolution
    );

    if onsets.len() < 2 {
        log::warn!("Too few onsets for comb filter: {}", onsets.len());
        return Ok(vec![]);
    }

    let mut sorted = onsets.to_vec();
    sorted.sort_unstable();

    let n_steps = ((max_bpm - min_bpm) / bpm_resolution + EPSILON).floor() as usize;
    let scored: Vec<(f32, f32)> = (0..=n_steps)
        .map(|step| {
            let bpm = min_bpm + step as f32 * bpm_resolution;
            let tolerance = (DEFAULT_TOLERANCE * (REFERENCE_BPM / bpm)).clamp(MIN_TOLERANCE, MAX_TOLERANCE);
            (bpm, score_bpm_candidate(&sorted, sample_rate, bpm, tolerance))
        })
        .collect();

    let max_score = scored.iter().map(|(_, s)| *s).fold(0.0f32, f32::max);
    if max_score < EPSILON {
        return Ok(vec![]);
    }

    let mut candidates: Vec<BpmCandidate> = scored
        .into_iter()
        .map(|(bpm, score)| BpmCandidate {
            bpm,
            confidence: score / max_score,
        })
        .filter(|c| c.confidence >= 0.1)
        .collect();
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    log::debug!(
        "Comb filterbank found {} candidates (best {:.2} BPM)",
        candidates.len(),
        candidates.first().map(|c| c.bpm).unwrap_or(0.0)
    );
    Ok(candidates)
}

/// Two-pass search: a coarse grid, then a fine grid around the coarse winner
///
/// # Errors
///
/// Same as [`estimate_bpm_from_comb_filter`]
pub fn coarse_to_fine_search(
    onsets: &[usize],
    sample_rate: u32,
    min_bpm: f32,
    max_bpm: f32,
    refinement_range: f32,
) -> Result<Vec<BpmCandidate>, AnalysisError> {
    let coarse = estimate_bpm_from_comb_filter(onsets, sample_rate, min_bpm, max_bpm, COARSE_RESOLUTION)?;
    let Some(best) = coarse.first() else {
        return Ok(coarse);
    };

    let fine_min = (best.bpm - refinement_range).max(min_bpm);
    let fine_max = (best.bpm + refinement_range).min(max_bpm);
    if fine_max - fine_min < FINE_RESOLUTION {
        return Ok(coarse);
    }

    let fine = estimate_bpm_from_comb_filter(onsets, sample_rate, fine_min, fine_max, FINE_RESOLUTION)?;
    if fine.is_empty() {
        return Ok(coarse);
    }

    // Keep the coarse alternatives outside the refined window so other
    // metrical levels stay visible to candidate merging.
    let mut result = fine;
    result.extend(
        coarse
            .into_iter()
            .filter(|c| c.bpm < fine_min || c.bpm > fine_max),
    );
    result.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    Ok(result)
}

/// F-measure of grid/onset agreement for one tempo
///
/// `onsets` must be sorted.
fn score_bpm_candidate(onsets: &[usize], sample_rate: u32, bpm: f32, tolerance: f32) -> f32 {
    let period = 60.0 * sample_rate as f32 / bpm;
    if period < 1.0 || onsets.is_empty() {
        return 0.0;
    }
    let tolerance_samples = period * tolerance;

    let first = onsets[0] as f32;
    let last = onsets[onsets.len() - 1] as f32;
    let n_beats = ((last - first) / period).floor() as usize + 1;

    let mut aligned_beats = 0usize;
    for beat in 0..n_beats {
        let expected = first + beat as f32 * period;
        if nearest_distance(onsets, expected) <= tolerance_samples {
            aligned_beats += 1;
        }
    }

    let explained_onsets = onsets
        .iter()
        .filter(|&&onset| {
            let phase = (onset as f32 - first) / period;
            (phase - phase.round()).abs() * period <= tolerance_samples
        })
        .count();

    let precision = aligned_beats as f32 / n_beats as f32;
    let recall = explained_onsets as f32 / onsets.len() as f32;
    if precision + recall < EPSILON {
        return 0.0;
    }
    2.0 * precision * recall / (precision + recall)
}

/// Distance from `target` to the closest onset (sorted input)
fn nearest_distance(onsets: &[usize], target: f32) -> f32 {
    let idx = onsets.partition_point(|&o| (o as f32) < target);
    let mut best = f32::MAX;
    if idx < onsets.len() {
        best = best.min((onsets[idx] as f32 - target).abs());
    }
    if idx > 0 {
        best = best.min((onsets[idx - 1] as f32 - target).abs());
    }
    best
}
