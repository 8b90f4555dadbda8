//! Harmonic pitch class profile key estimation
//!
//! Frames the signal with a Blackman-Harris window, extracts spectral peaks per
//! frame, accumulates them into a high-resolution pitch class profile and
//! matches the time-averaged profile against EDMA key templates.

pub mod key_profile;
pub mod peaks;
pub mod profile;

pub use key_profile::{EdmaMatcher, KeyMatch};
pub use peaks::{spectral_peaks, SpectralPeak};
pub use profile::hpcp;

use crate::config::HpcpConfig;
use crate::error::AnalysisError;
use crate::features::stft::{magnitude_spectrogram, Framing, WindowType};

/// Pitch class of the default 440 Hz reference (A), counted from C
pub const A_PITCH_CLASS: u32 = 9;

/// Time-averaged HPCP of a signal
///
/// Frames without spectral peaks are skipped rather than averaged as zeros.
///
/// # Returns
///
/// `Ok(None)` if no frame had a peak (silence, or shorter than one frame)
///
/// # Errors
///
/// Returns `AnalysisError` for invalid frame or profile parameters
pub fn average_hpcp(
    samples: &[f32],
    sample_rate: u32,
    config: &HpcpConfig,
) -> Result<Option<Vec<f32>>, AnalysisError> {
    log::debug!(
        "Computing HPCP: {} samples at {} Hz, frame={}, hop={}, size={}",
        samples.len(),
        sample_rate,
        config.frame_size,
        config.hop_size,
        config.size
    );

    let spectrogram = magnitude_spectrogram(
        samples,
        config.frame_size,
        config.hop_size,
        WindowType::BlackmanHarris62,
        Framing::Valid,
    )?;

    let mut sum = vec![0.0f32; config.size];
    let mut frames = 0usize;
    for spectrum in &spectrogram {
        let peaks = spectral_peaks(spectrum, sample_rate, config.frame_size, config);
        if peaks.is_empty() {
            continue;
        }
        if let Some(profile) = hpcp(&peaks, config)? {
            sum.iter_mut().zip(&profile).for_each(|(s, p)| *s += p);
            frames += 1;
        }
    }

    log::debug!("HPCP averaged over {}/{} frames", frames, spectrogram.len());

    if frames == 0 {
        return Ok(None);
    }
    sum.iter_mut().for_each(|s| *s /= frames as f32);
    Ok(Some(sum))
}

/// Reference pitch class of profile bin 0 for a reference frequency
pub fn reference_pitch_class(reference_hz: f32) -> u32 {
    let semitones_from_a = (12.0 * (reference_hz / 440.0).log2()).round() as i32;
    (A_PITCH_CLASS as i32 + semitones_from_a).rem_euclid(12) as u32
}
