//! Key detection by profile correlation
//!
//! The time-averaged chroma vector is unit-normalized and correlated with the
//! 24 rotated Krumhansl-Schmuckler templates. The best correlation wins;
//! ties resolve to the first key in (tonic, major-before-minor) order, so the
//! result does not depend on the order rotations are evaluated in.
//!
//! # Reference
//!
//! Krumhansl, C. L. (1990). *Cognitive Foundations of Musical Pitch*.
//! Oxford University Press.

use super::templates::KeyTemplates;
use super::KeyDetectionResult;
use crate::analysis::result::Key;
use crate::error::AnalysisError;

/// Averaged chroma with a standard deviation below this carries no tonal information
const MIN_CHROMA_STD: f32 = 1e-6;

const EPSILON: f32 = 1e-8;

/// Correlate an averaged chroma vector with all 24 key templates
///
/// # Arguments
///
/// * `chroma` - Time-averaged 12-element chroma (C first)
/// * `templates` - Unit-normalized key templates
///
/// # Returns
///
/// `Ok(None)` if the chroma is flat (silence or white noise), otherwise the
/// best key with every score. The caller applies the acceptance threshold.
///
/// # Errors
///
/// Returns `AnalysisError::NumericalError` if the chroma contains NaN or infinity
///
/// # Example
///
/// ```
/// use cratedig::analysis::result::Key;
/// use cratedig::features::key::{detect_key, KeyTemplates};
///
/// // C major triad
/// let mut chroma = [0.1f32; 12];
/// chroma[0] = 1.0;
/// chroma[4] = 0.8;
/// chroma[7] = 0.9;
///
/// let result = detect_key(&chroma, &KeyTemplates::new())?.unwrap();
/// assert_eq!(result.key, Key::Major(0));
/// # Ok::<(), cratedig::AnalysisError>(())
/// ```
pub fn detect_key(
    chroma: &[f32; 12],
    templates: &KeyTemplates,
) -> Result<Option<KeyDetectionResult>, AnalysisError> {
    if chroma.iter().any(|c| !c.is_finite()) {
        return Err(AnalysisError::NumericalError(
            "Non-finite value in chroma vector".to_string(),
        ));
    }

    let mean = chroma.iter().sum::<f32>() / 12.0;
    let std = (chroma.iter().map(|c| (c - mean).powi(2)).sum::<f32>() / 12.0).sqrt();
    if std < MIN_CHROMA_STD {
        log::debug!("Flat chroma (std={:.2e}), no key", std);
        return Ok(None);
    }

    let norm = chroma.iter().map(|c| c * c).sum::<f32>().sqrt() + EPSILON;
    let unit: Vec<f32> = chroma.iter().map(|c| c / norm).collect();

    let dot = |template: &[f32; 12]| -> f32 { unit.iter().zip(template).map(|(a, b)| a * b).sum() };

    let mut all_scores: Vec<(Key, f32)> = (0..12u32)
        .flat_map(|tonic| {
            [
                (Key::Major(tonic), dot(templates.get_major_template(tonic))),
                (Key::Minor(tonic), dot(templates.get_minor_template(tonic))),
            ]
        })
        .collect();

    // Stable sort keeps enumeration order among equal scores
    all_scores.sort_by(|a, b| b.1.total_cmp(&a.1));

    let (key, correlation) = all_scores[0];
    log::debug!(
        "Key correlation: best {:?} ({:.3}), runner-up {:?} ({:.3})",
        key,
        correlation,
        all_scores[1].0,
        all_scores[1].1
    );

    Ok(Some(KeyDetectionResult {
        key,
        correlation,
        all_scores,
    }))
}
