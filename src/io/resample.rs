//! Sample-rate conversion using Rubato's windowed-sinc resampler

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::AnalysisError;

/// Resample mono audio from `from_rate` to `to_rate`
///
/// Equal rates and empty input are returned unchanged.
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for a zero rate and
/// `AnalysisError::ProcessingError` if the resampler fails
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, AnalysisError> {
    if from_rate == 0 || to_rate == 0 {
        return Err(AnalysisError::InvalidInput(format!(
            "Invalid resample rates: {} -> {}",
            from_rate, to_rate
        )));
    }

    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    log::debug!(
        "Resampling {} samples: {} Hz -> {} Hz",
        samples.len(),
        from_rate,
        to_rate
    );

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)
        .map_err(|e| AnalysisError::ProcessingError(format!("resampler setup: {}", e)))?;

    let waves_in = vec![samples.to_vec()];
    let mut waves_out = resampler
        .process(&waves_in, None)
        .map_err(|e| AnalysisError::ProcessingError(format!("resampling: {}", e)))?;

    let mut out = waves_out.pop().unwrap_or_default();

    // Rounding in the resampler can yield a frame more than the exact ratio.
    let expected = (samples.len() as f64 * ratio).round() as usize;
    out.truncate(expected);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_rate_is_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 44100, 44100).unwrap(), samples);
    }

    #[test]
    fn test_downsample_length() {
        let samples = vec![0.0f32; 44100];
        let out = resample(&samples, 44100, 22050).unwrap();
        assert!(out.len() <= 22050);
        assert!(out.len() > 20000);
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(resample(&[0.0], 0, 22050).is_err());
    }
}
