//! Short-time Fourier transform
//!
//! Framing, analysis windows and magnitude spectrograms shared by every
//! spectral feature in the crate.
//!
//! Two framing modes are supported:
//! - **Centered**: the signal is zero-padded by half a frame on both sides so
//!   frame `t` is centered on sample `t * hop` (onset envelopes, HPSS)
//! - **Valid**: frames start at `0, hop, 2*hop, ..` while `start < len - frame_size`
//!   (HPCP framing)

use rayon::prelude::*;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::error::AnalysisError;

/// Analysis window shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowType {
    /// Periodic Hann window
    Hann,
    /// 3-term Blackman-Harris window (62 dB sidelobe level)
    BlackmanHarris62,
}

/// Frame placement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Zero-pad half a frame on each side
    Centered,
    /// Only frames that fit strictly inside the signal
    Valid,
}

/// Build an analysis window of `len` samples
///
/// Blackman-Harris windows are scaled so their coefficients sum to 2, which
/// makes peak magnitudes of a full-scale sinusoid close to 1.0.
pub fn window(kind: WindowType, len: usize) -> Vec<f32> {
    if len == 0 {
        return Vec::new();
    }
    let n = len as f32;
    match kind {
        WindowType::Hann => (0..len)
            .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / n).cos())
            .collect(),
        WindowType::BlackmanHarris62 => {
            const A0: f32 = 0.44959;
            const A1: f32 = 0.49364;
            const A2: f32 = 0.05677;
            let denom = (len.max(2) - 1) as f32;
            let w: Vec<f32> = (0..len)
                .map(|i| {
                    let x = 2.0 * std::f32::consts::PI * i as f32 / denom;
                    A0 - A1 * x.cos() + A2 * (2.0 * x).cos()
                })
                .collect();
            let sum: f32 = w.iter().sum();
            if sum > 0.0 {
                w.iter().map(|v| v * 2.0 / sum).collect()
            } else {
                w
            }
        }
    }
}

/// Frame start offsets for a signal of `len` samples
pub fn frame_starts(len: usize, frame_size: usize, hop_size: usize, framing: Framing) -> Vec<usize> {
    if hop_size == 0 || frame_size == 0 {
        return Vec::new();
    }
    match framing {
        Framing::Centered => {
            let n_frames = 1 + len / hop_size;
            (0..n_frames).map(|t| t * hop_size).collect()
        }
        Framing::Valid => {
            if len <= frame_size {
                return Vec::new();
            }
            (0..len - frame_size).step_by(hop_size).collect()
        }
    }
}

/// Compute a magnitude spectrogram
///
/// # Arguments
///
/// * `samples` - Mono audio samples
/// * `frame_size` - FFT size
/// * `hop_size` - Samples between frames
/// * `window_type` - Analysis window
/// * `framing` - Frame placement
///
/// # Returns
///
/// `n_frames` vectors of `frame_size / 2 + 1` magnitudes each
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` if sizes are zero or the hop exceeds the frame
pub fn magnitude_spectrogram(
    samples: &[f32],
    frame_size: usize,
    hop_size: usize,
    window_type: WindowType,
    framing: Framing,
) -> Result<Vec<Vec<f32>>, AnalysisError> {
    if frame_size == 0 || hop_size == 0 {
        return Err(AnalysisError::InvalidInput(format!(
            "Invalid STFT sizes: frame={}, hop={}",
            frame_size, hop_size
        )));
    }
    if hop_size > frame_size {
        return Err(AnalysisError::InvalidInput(format!(
            "Hop size {} exceeds frame size {}",
            hop_size, frame_size
        )));
    }

    log::debug!(
        "Computing STFT: {} samples, frame={}, hop={}, window={:?}, framing={:?}",
        samples.len(),
        frame_size,
        hop_size,
        window_type,
        framing
    );

    let win = window(window_type, frame_size);
    let starts = frame_starts(samples.len(), frame_size, hop_size, framing);
    let offset = match framing {
        Framing::Centered => (frame_size / 2) as isize,
        Framing::Valid => 0,
    };

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(frame_size);
    let n_bins = frame_size / 2 + 1;

    let spectrogram: Vec<Vec<f32>> = starts
        .par_iter()
        .map(|&start| {
            let mut buffer: Vec<Complex<f32>> = (0..frame_size)
                .map(|i| {
                    let idx = start as isize + i as isize - offset;
                    let sample = if idx >= 0 && (idx as usize) < samples.len() {
                        samples[idx as usize]
                    } else {
                        0.0
                    };
                    Complex::new(sample * win[i], 0.0)
                })
                .collect();
            fft.process(&mut buffer);
            buffer[..n_bins].iter().map(|c| c.norm()).collect()
        })
        .collect();

    log::debug!("STFT produced {} frames x {} bins", spectrogram.len(), n_bins);

    Ok(spectrogram)
}

/// Center frequency in Hz of FFT bin `bin`
pub fn bin_frequency(bin: usize, sample_rate: u32, frame_size: usize) -> f32 {
    bin as f32 * sample_rate as f32 / frame_size as f32
}
