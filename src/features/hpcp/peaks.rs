//! Spectral peak extraction
//!
//! Local maxima of a magnitude spectrum, refined by parabolic interpolation
//! over the three bins around each maximum.

use crate::config::HpcpConfig;
use crate::features::stft::bin_frequency;

/// One interpolated spectral peak
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralPeak {
    /// Interpolated frequency in Hz
    pub frequency: f32,
    /// Interpolated magnitude
    pub magnitude: f32,
}

/// Extract spectral peaks from one magnitude spectrum
///
/// Keeps peaks inside `[config.min_hz, config.max_hz]` whose interpolated
/// magnitude reaches `config.magnitude_threshold`, at most
/// `config.max_peaks` of them, ordered by magnitude (highest first).
///
/// # Arguments
///
/// * `spectrum` - `frame_size / 2 + 1` magnitudes
/// * `sample_rate` - Sample rate in Hz
/// * `frame_size` - FFT size the spectrum came from
/// * `config` - Frequency range, threshold and peak budget
pub fn spectral_peaks(
    spectrum: &[f32],
    sample_rate: u32,
    frame_size: usize,
    config: &HpcpConfig,
) -> Vec<SpectralPeak> {
    if spectrum.len() < 3 || frame_size == 0 {
        return Vec::new();
    }

    let mut peaks: Vec<SpectralPeak> = (1..spectrum.len() - 1)
        .filter(|&k| spectrum[k] > spectrum[k - 1] && spectrum[k] >= spectrum[k + 1])
        .map(|k| {
            let (a, b, c) = (spectrum[k - 1], spectrum[k], spectrum[k + 1]);
            let denom = a - 2.0 * b + c;
            let p = if denom.abs() > f32::EPSILON {
                (0.5 * (a - c) / denom).clamp(-0.5, 0.5)
            } else {
                0.0
            };
            SpectralPeak {
                frequency: bin_frequency(k, sample_rate, frame_size)
                    + p * sample_rate as f32 / frame_size as f32,
                magnitude: b - 0.25 * (a - c) * p,
            }
        })
        .filter(|peak| {
            peak.frequency >= config.min_hz
                && peak.frequency <= config.max_hz
                && peak.magnitude >= config.magnitude_threshold
        })
        .collect();

    peaks.sort_by(|a, b| b.magnitude.total_cmp(&a.magnitude));
    peaks.truncate(config.max_peaks);
    peaks
}
