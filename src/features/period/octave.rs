//! Octave correction
//!
//! Automatic tempo estimators often lock onto half or double the perceived
//! tempo. Slow estimates also try the doubled tempo, fast ones the halved
//! tempo; candidates outside the accepted band are dropped and the one closest
//! to the preferred tempo wins.
//!
//! # Example
//!
//! ```
//! use cratedig::config::TempoPolicy;
//! use cratedig::features::period::correct_octave;
//!
//! let policy = TempoPolicy::default();
//! assert_eq!(correct_octave(70.0, &policy), Some(140.0));
//! assert_eq!(correct_octave(170.0, &policy), Some(85.0));
//! assert_eq!(correct_octave(0.0, &policy), None);
//! ```

use crate::config::TempoPolicy;

/// Candidate tempos for a raw estimate, before range filtering
///
/// Always contains `base`; adds `base * 2` below the doubling threshold and
/// `base / 2` above the halving threshold.
pub fn octave_candidates(base: f32, policy: &TempoPolicy) -> Vec<f32> {
    let mut candidates = vec![base];
    if base < policy.double_below_bpm {
        candidates.push(base * 2.0);
    }
    if base > policy.halve_above_bpm {
        candidates.push(base / 2.0);
    }
    candidates
}

/// Apply the octave-correction heuristic to a raw tempo estimate
///
/// # Returns
///
/// The surviving candidate closest to the preferred tempo, rounded to one
/// decimal place, or `None` if `base` is non-positive/non-finite or no
/// candidate lies within `[min_bpm, max_bpm]`
pub fn correct_octave(base: f32, policy: &TempoPolicy) -> Option<f32> {
    if !base.is_finite() || base <= 0.0 {
        log::debug!("Rejecting raw tempo {}", base);
        return None;
    }

    let best = octave_candidates(base, policy)
        .into_iter()
        .filter(|bpm| *bpm >= policy.min_bpm && *bpm <= policy.max_bpm)
        .min_by(|a, b| {
            let da = (a - policy.sweet_spot_bpm).abs();
            let db = (b - policy.sweet_spot_bpm).abs();
            da.total_cmp(&db)
        })?;

    let rounded = (best * 10.0).round() / 10.0;
    log::debug!("Octave correction: {:.2} -> {:.1} BPM", base, rounded);
    Some(rounded)
}
