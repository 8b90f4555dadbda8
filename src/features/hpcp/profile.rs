//! Harmonic pitch class profile
//!
//! Each spectral peak adds `weight * magnitude²` to the profile bins within
//! half a window (in semitones) of its pitch class, with a squared-cosine
//! weight falling to zero at the window edge. Bin 0 is the reference
//! frequency (A4 = 440 Hz by default). Frames are normalized to a maximum of 1.
//!
//! # Reference
//!
//! Gómez, E. (2006). Tonal Description of Music Audio Signals.
//! PhD thesis, Universitat Pompeu Fabra.

use super::peaks::SpectralPeak;
use crate::config::HpcpConfig;
use crate::error::AnalysisError;

const EPSILON: f32 = 1e-12;

/// Compute one frame's HPCP from its spectral peaks
///
/// # Returns
///
/// `config.size` values scaled to a maximum of 1, or `None` when no peak
/// contributes energy
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` if `config.size` is not a positive
/// multiple of 12 or the reference frequency is not positive
pub fn hpcp(peaks: &[SpectralPeak], config: &HpcpConfig) -> Result<Option<Vec<f32>>, AnalysisError> {
    if config.size == 0 || config.size % 12 != 0 {
        return Err(AnalysisError::InvalidInput(format!(
            "HPCP size must be a positive multiple of 12, got {}",
            config.size
        )));
    }
    if config.reference_hz <= 0.0 || config.window_semitones <= 0.0 {
        return Err(AnalysisError::InvalidInput(format!(
            "Invalid HPCP reference {:.1} Hz or window {:.2} semitones",
            config.reference_hz, config.window_semitones
        )));
    }

    let mut profile = vec![0.0f32; config.size];
    let bins_per_semitone = config.size as f32 / 12.0;
    let half_window = config.window_semitones / 2.0;

    for peak in peaks {
        if peak.frequency <= 0.0 || peak.magnitude <= 0.0 {
            continue;
        }
        let pitch = (12.0 * (peak.frequency / config.reference_hz).log2()).rem_euclid(12.0);

        for (bin, value) in profile.iter_mut().enumerate() {
            let center = bin as f32 / bins_per_semitone;
            let mut distance = (pitch - center).abs();
            if distance > 6.0 {
                distance = 12.0 - distance;
            }
            if distance <= half_window {
                let weight = (std::f32::consts::PI * distance / config.window_semitones).cos().powi(2);
                *value += weight * peak.magnitude * peak.magnitude;
            }
        }
    }

    let max = profile.iter().copied().fold(0.0f32, f32::max);
    if max < EPSILON {
        return Ok(None);
    }
    profile.iter_mut().for_each(|v| *v /= max);
    Ok(Some(profile))
}
