//! Autocorrelation-based tempo estimation
//!
//! Two entry points share one FFT-accelerated autocorrelation:
//! - [`tempo_from_envelope`] scores every lag of a continuous onset-strength
//!   envelope, weighted by a log-normal prior around a preferred tempo
//! - [`estimate_bpm_from_autocorrelation`] works on a discrete onset list and
//!   returns ranked ACF peaks
//!
//! # Reference
//!
//! Ellis, D. P. W. (2007). Beat Tracking by Dynamic Programming.
//! *Journal of New Music Research*, 36(1), 51-60.
//!
//! # Example
//!
//! ```no_run
//! use cratedig::features::period::autocorrelation::tempo_from_envelope;
//!
//! let envelope = vec![0.0f32; 1300]; // onset strength at 22050 Hz, hop 512
//! let bpm = tempo_from_envelope(&envelope, 22050, 512, 30.0, 300.0, 120.0)?;
//! # Ok::<(), cratedig::AnalysisError>(())
//! ```

use super::BpmCandidate;
use crate::error::AnalysisError;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

const EPSILON: f32 = 1e-10;

/// Width of the log-normal tempo prior in octaves
const PRIOR_STD_OCTAVES: f32 = 1.0;

/// Estimate a single tempo from an onset-strength envelope
///
/// Each lag `l` within the BPM range is scored as
/// `ln(1 + 1e6 * acf[l] / acf[0]) - 0.5 * (log2(bpm / prior_bpm) / σ)²`
/// and the best-scoring lag is converted back to BPM.
///
/// # Arguments
///
/// * `envelope` - Onset-strength values, one per hop
/// * `sample_rate` - Sample rate in Hz
/// * `hop_size` - Samples per envelope frame
/// * `min_bpm` / `max_bpm` - Lag search range
/// * `prior_bpm` - Center of the tempo prior
///
/// # Returns
///
/// `Some(bpm)` or `None` when the envelope is too short or carries no energy
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for zero rates or an empty BPM range
pub fn tempo_from_envelope(
    envelope: &[f32],
    sample_rate: u32,
    hop_size: usize,
    min_bpm: f32,
    max_bpm: f32,
    prior_bpm: f32,
) -> Result<Option<f32>, AnalysisError> {
    validate(sample_rate, hop_size, min_bpm, max_bpm)?;
    if prior_bpm <= 0.0 {
        return Err(AnalysisError::InvalidInput(format!(
            "Invalid tempo prior: {:.1}",
            prior_bpm
        )));
    }

    log::debug!(
        "Estimating tempo from envelope: {} frames, hop={}, range=[{:.1}, {:.1}] BPM",
        envelope.len(),
        hop_size,
        min_bpm,
        max_bpm
    );

    if envelope.len() < 4 {
        log::warn!("Onset envelope too short for tempo: {} frames", envelope.len());
        return Ok(None);
    }

    let acf = compute_autocorrelation_fft(envelope);
    let energy = acf[0];
    if energy < EPSILON {
        log::debug!("Onset envelope is silent");
        return Ok(None);
    }

    let frames_per_minute = 60.0 * sample_rate as f32 / hop_size as f32;
    let lag_min = ((frames_per_minute / max_bpm).ceil() as usize).max(1);
    let lag_max = ((frames_per_minute / min_bpm).floor() as usize).min(acf.len() - 1);
    if lag_min > lag_max {
        log::warn!("No lags in range [{}, {}] for {} frames", lag_min, lag_max, acf.len());
        return Ok(None);
    }

    let log_prior_center = prior_bpm.log2();
    let best = (lag_min..=lag_max)
        .map(|lag| {
            let bpm = frames_per_minute / lag as f32;
            let strength = (1.0 + 1e6 * acf[lag] / energy).ln();
            let z = (bpm.log2() - log_prior_center) / PRIOR_STD_OCTAVES;
            (bpm, strength - 0.5 * z * z)
        })
        .max_by(|a, b| a.1.total_cmp(&b.1));

    let bpm = best.map(|(bpm, _)| bpm);
    log::debug!("Envelope autocorrelation tempo: {:?}", bpm);
    Ok(bpm)
}

/// Estimate BPM candidates from a list of onset times
///
/// Onsets are rasterized onto a frame grid and autocorrelated. Each lag is
/// summed with its neighbours, then the peaks within the BPM range are
/// returned with confidence relative to the strongest peak.
///
/// # Arguments
///
/// * `onsets` - Onset times in samples
/// * `sample_rate` - Sample rate in Hz
/// * `hop_size` - Grid resolution in samples
/// * `min_bpm` / `max_bpm` - BPM range to consider
///
/// # Returns
///
/// Candidates ranked by confidence (highest first); empty if fewer than two onsets
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for an empty onset list or invalid parameters
pub fn estimate_bpm_from_autocorrelation(
    onsets: &[usize],
    sample_rate: u32,
    hop_size: usize,
    min_bpm: f32,
    max_bpm: f32,
) -> Result<Vec<BpmCandidate>, AnalysisError> {
    if onsets.is_empty() {
        return Err(AnalysisError::InvalidInput("Empty onset list".to_string()));
    }
    validate(sample_rate, hop_size, min_bpm, max_bpm)?;

    log::debug!(
        "Estimating BPM from onset autocorrelation: {} onsets, {} Hz, hop={}",
        onsets.len(),
        sample_rate,
        hop_size
    );

    if onsets.len() < 2 {
        log::warn!("Too few onsets for autocorrelation: {}", onsets.len());
        return Ok(vec![]);
    }

    let last_frame = onsets.iter().max().copied().unwrap_or(0) / hop_size;
    let mut pulse = vec![0.0f32; last_frame + 1];
    for &onset in onsets {
        pulse[onset / hop_size] = 1.0;
    }

    let acf = spread_lags(&compute_autocorrelation_fft(&pulse));

    let frames_per_minute = 60.0 * sample_rate as f32 / hop_size as f32;
    let lag_min = ((frames_per_minute / max_bpm).ceil() as usize).max(1);
    let lag_max = (frames_per_minute / min_bpm).floor() as usize;
    if lag_max + 1 >= acf.len() || lag_min >= lag_max {
        log::debug!(
            "Onset span too short for lag range [{}, {}] (ACF length {})",
            lag_min,
            lag_max,
            acf.len()
        );
        return Ok(vec![]);
    }

    let max_acf = acf[lag_min..=lag_max].iter().copied().fold(0.0f32, f32::max);
    if max_acf < EPSILON {
        return Ok(vec![]);
    }

    let mut candidates: Vec<BpmCandidate> = find_peaks_in_acf(&acf, lag_min, lag_max)
        .into_iter()
        .map(|(lag, value)| BpmCandidate {
            bpm: frames_per_minute / lag as f32,
            confidence: (value / max_acf).min(1.0),
        })
        .collect();

    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    log::debug!("Onset autocorrelation found {} BPM candidates", candidates.len());
    Ok(candidates)
}

fn validate(sample_rate: u32, hop_size: usize, min_bpm: f32, max_bpm: f32) -> Result<(), AnalysisError> {
    if sample_rate == 0 {
        return Err(AnalysisError::InvalidInput("Invalid sample rate: 0".to_string()));
    }
    if hop_size == 0 {
        return Err(AnalysisError::InvalidInput("Invalid hop size: 0".to_string()));
    }
    if min_bpm <= 0.0 || max_bpm <= 0.0 || min_bpm >= max_bpm {
        return Err(AnalysisError::InvalidInput(format!(
            "Invalid BPM range: [{:.1}, {:.1}]",
            min_bpm, max_bpm
        )));
    }
    Ok(())
}

/// Linear autocorrelation via `IFFT(|FFT(x)|²)` with zero padding
///
/// Returns one non-negative value per lag, same length as the input.
pub(crate) fn compute_autocorrelation_fft(signal: &[f32]) -> Vec<f32> {
    let n = signal.len();
    if n == 0 {
        return Vec::new();
    }
    let fft_size = (2 * n).next_power_of_two();

    let mut buffer: Vec<Complex<f32>> = signal.iter().map(|&x| Complex::new(x, 0.0)).collect();
    buffer.resize(fft_size, Complex::new(0.0, 0.0));

    let mut planner = FftPlanner::new();
    planner.plan_fft_forward(fft_size).process(&mut buffer);
    for x in buffer.iter_mut() {
        *x = Complex::new(x.norm_sqr(), 0.0);
    }
    planner.plan_fft_inverse(fft_size).process(&mut buffer);

    let scale = 1.0 / fft_size as f32;
    buffer[..n].iter().map(|x| (x.re * scale).max(0.0)).collect()
}

/// Sum each lag with its two neighbours
///
/// A beat period that falls between two frame lags splits its energy across
/// both; without this an integer multiple of the period that happens to land
/// on the grid outscores the period itself.
fn spread_lags(acf: &[f32]) -> Vec<f32> {
    (0..acf.len())
        .map(|lag| {
            if lag == 0 {
                acf[0]
            } else {
                acf[lag - 1..(lag + 2).min(acf.len())].iter().sum()
            }
        })
        .collect()
}

/// Local maxima of `acf` inside `[lag_min, lag_max]`, as (lag, value)
fn find_peaks_in_acf(acf: &[f32], lag_min: usize, lag_max: usize) -> Vec<(usize, f32)> {
    let lo = lag_min.max(1);
    let hi = lag_max.min(acf.len().saturating_sub(2));
    (lo..=hi)
        .filter(|&lag| acf[lag] > EPSILON && acf[lag] >= acf[lag - 1] && acf[lag] > acf[lag + 1])
        .map(|lag| (lag, acf[lag]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulse_envelope(period_frames: usize, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| if i % period_frames == 0 { 1.0 } else { 0.05 })
            .collect()
    }

    #[test]
    fn test_envelope_tempo_near_120() {
        // 22 frames at 22050 Hz / 512 hop ≈ 117.45 BPM
        let env = pulse_envelope(22, 1300);
        let bpm = tempo_from_envelope(&env, 22050, 512, 30.0, 300.0, 120.0)
            .unwrap()
            .unwrap();
        assert!((bpm - 117.45).abs() < 1.0, "got {}", bpm);
    }

    #[test]
    fn test_envelope_slow_pulse_reported_raw() {
        // 37 frames ≈ 69.8 BPM: the estimator reports the raw period
        let env = pulse_envelope(37, 1300);
        let bpm = tempo_from_envelope(&env, 22050, 512, 30.0, 300.0, 120.0)
            .unwrap()
            .unwrap();
        assert!((bpm - 69.8).abs() < 1.0, "got {}", bpm);
    }

    #[test]
    fn test_envelope_silence_and_short() {
        let silent = vec![0.0f32; 500];
        assert_eq!(tempo_from_envelope(&silent, 22050, 512, 30.0, 300.0, 120.0).unwrap(), None);
        assert_eq!(tempo_from_envelope(&[1.0, 0.0], 22050, 512, 30.0, 300.0, 120.0).unwrap(), None);
    }

    #[test]
    fn test_envelope_invalid_params() {
        let env = vec![0.5f32; 100];
        assert!(tempo_from_envelope(&env, 0, 512, 30.0, 300.0, 120.0).is_err());
        assert!(tempo_from_envelope(&env, 22050, 512, 300.0, 30.0, 120.0).is_err());
        assert!(tempo_from_envelope(&env, 22050, 512, 30.0, 300.0, 0.0).is_err());
    }

    #[test]
    fn test_onset_autocorrelation_128bpm() {
        let sample_rate = 44100;
        let hop_size = 512;
        let period = (60.0 * sample_rate as f32 / 128.0 / hop_size as f32).round() as usize;
        let onsets: Vec<usize> = (0..16).map(|beat| beat * period * hop_size).collect();

        let candidates =
            estimate_bpm_from_autocorrelation(&onsets, sample_rate, hop_size, 60.0, 180.0).unwrap();
        assert!(!candidates.is_empty());
        assert!((candidates[0].bpm - 128.0).abs() < 5.0, "got {}", candidates[0].bpm);
        assert!(candidates[0].confidence > 0.0);
    }

    #[test]
    fn test_onset_autocorrelation_fractional_period() {
        // 100 BPM at 44100 Hz / 512 hop is 26.46 frames; rounded onsets land
        // on lags 26 and 27 alternately, while three periods fall near 79
        let sample_rate = 44100;
        let period = 60.0 * sample_rate as f32 / 100.0;
        let onsets: Vec<usize> = (0..13).map(|beat| (beat as f32 * period) as usize).collect();

        let candidates =
            estimate_bpm_from_autocorrelation(&onsets, sample_rate, 512, 30.0, 300.0).unwrap();
        assert!((candidates[0].bpm - 100.0).abs() < 3.0, "got {}", candidates[0].bpm);
    }

    #[test]
    fn test_spread_lags() {
        assert_eq!(spread_lags(&[4.0, 1.0, 2.0, 3.0]), vec![4.0, 7.0, 6.0, 5.0]);
    }

    #[test]
    fn test_onset_autocorrelation_edge_cases() {
        assert!(estimate_bpm_from_autocorrelation(&[], 44100, 512, 60.0, 180.0).is_err());
        assert!(estimate_bpm_from_autocorrelation(&[1000], 44100, 512, 60.0, 180.0)
            .unwrap()
            .is_empty());
        assert!(estimate_bpm_from_autocorrelation(&[0, 1000], 44100, 0, 60.0, 180.0).is_err());
    }

    #[test]
    fn test_compute_autocorrelation_fft() {
        let signal = vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        let acf = compute_autocorrelation_fft(&signal);
        assert_eq!(acf.len(), signal.len());
        assert!((acf[0] - 3.0).abs() < 1e-4);
        assert!((acf[2] - 2.0).abs() < 1e-4);
        assert!(acf[1].abs() < 1e-4);
    }
}
