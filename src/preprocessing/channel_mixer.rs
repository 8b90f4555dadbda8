//! Channel mixing (interleaved multichannel to mono)

use crate::error::AnalysisError;

/// Average interleaved frames down to a single channel
///
/// # Arguments
///
/// * `interleaved` - Samples laid out `[c0, c1, .., cN, c0, c1, ..]`
/// * `channels` - Number of channels per frame
///
/// # Returns
///
/// One sample per frame, the mean of all channels
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` if `channels` is zero or the buffer
/// does not hold a whole number of frames
pub fn downmix_interleaved(interleaved: &[f32], channels: usize) -> Result<Vec<f32>, AnalysisError> {
    if channels == 0 {
        return Err(AnalysisError::InvalidInput(
            "Channel count must be > 0".to_string(),
        ));
    }

    if interleaved.len() % channels != 0 {
        return Err(AnalysisError::InvalidInput(format!(
            "Buffer of {} samples is not a multiple of {} channels",
            interleaved.len(),
            channels
        )));
    }

    if channels == 1 {
        return Ok(interleaved.to_vec());
    }

    let scale = 1.0 / channels as f32;
    Ok(interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect())
}
