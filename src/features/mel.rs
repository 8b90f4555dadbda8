//! Triangular mel filterbank
//!
//! Used by the onset-strength envelope and by the embedding front end.

/// Hz to mel (HTK formula)
pub fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

/// Mel to Hz (HTK formula)
pub fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

/// Build `n_mels` triangular filters over the `n_fft / 2 + 1` FFT bins
///
/// Filters are spaced evenly on the mel scale between `fmin` and `fmax`
/// (clamped to Nyquist). Each filter peaks at 1.0.
pub fn mel_filterbank(
    sample_rate: u32,
    n_fft: usize,
    n_mels: usize,
    fmin: f32,
    fmax: f32,
) -> Vec<Vec<f32>> {
    let n_bins = n_fft / 2 + 1;
    let nyquist = sample_rate as f32 / 2.0;
    let fmax = fmax.min(nyquist);
    let fmin = fmin.clamp(0.0, fmax);

    let mel_min = hz_to_mel(fmin);
    let mel_max = hz_to_mel(fmax);
    let hz_points: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + i as f32 * (mel_max - mel_min) / (n_mels + 1) as f32))
        .collect();
    let bin_hz: Vec<f32> = (0..n_bins)
        .map(|k| k as f32 * sample_rate as f32 / n_fft as f32)
        .collect();

    (0..n_mels)
        .map(|m| {
            let (lower, center, upper) = (hz_points[m], hz_points[m + 1], hz_points[m + 2]);
            bin_hz
                .iter()
                .map(|&f| {
                    if f <= lower || f >= upper {
                        0.0
                    } else if f <= center {
                        (f - lower) / (center - lower).max(f32::EPSILON)
                    } else {
                        (upper - f) / (upper - center).max(f32::EPSILON)
                    }
                })
                .collect()
        })
        .collect()
}

/// Project one power (or magnitude) spectrum frame onto the filterbank
pub fn apply_filterbank(filterbank: &[Vec<f32>], spectrum: &[f32]) -> Vec<f32> {
    filterbank
        .iter()
        .map(|filter| filter.iter().zip(spectrum).map(|(w, s)| w * s).sum())
        .collect()
}
