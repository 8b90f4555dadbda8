//! Constant-Q transform from a magnitude spectrogram
//!
//! Each constant-Q bin is a Hann-shaped weighting of the FFT bins inside its
//! bandwidth `f_k / Q`, where `Q = 1 / (2^(1/bins_per_octave) - 1)`. Bins
//! narrower than the FFT resolution fall back to the nearest FFT bin, so the
//! kernel is always defined but loses resolution in the lowest octaves.
//!
//! # Reference
//!
//! Brown, J. C., & Puckette, M. S. (1992). An efficient algorithm for the calculation
//! of a constant Q transform. *The Journal of the Acoustical Society of America*, 92(5), 2698-2701.

use crate::error::AnalysisError;
use crate::features::stft::bin_frequency;

/// Frequency of C1 in Hz, the lowest constant-Q bin
pub const C1_HZ: f32 = 32.703_197;

/// Sparse spectral kernel mapping FFT bins to constant-Q bins
#[derive(Debug, Clone)]
pub struct CqtKernel {
    rows: Vec<Vec<(usize, f32)>>,
    bins_per_octave: usize,
}

impl CqtKernel {
    /// Build a kernel for one FFT size
    ///
    /// # Arguments
    ///
    /// * `sample_rate` - Sample rate in Hz
    /// * `n_fft` - FFT size of the spectrogram the kernel is applied to
    /// * `fmin` - Center frequency of constant-Q bin 0
    /// * `n_octaves` - Octaves to cover; bins at or above Nyquist are dropped
    /// * `bins_per_octave` - Frequency resolution
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::InvalidInput` for zero sizes or if `fmin` is not below Nyquist
    pub fn new(
        sample_rate: u32,
        n_fft: usize,
        fmin: f32,
        n_octaves: usize,
        bins_per_octave: usize,
    ) -> Result<Self, AnalysisError> {
        let nyquist = sample_rate as f32 / 2.0;
        if sample_rate == 0 || n_fft < 2 || bins_per_octave == 0 || n_octaves == 0 {
            return Err(AnalysisError::InvalidInput(format!(
                "Invalid CQT parameters: sr={}, n_fft={}, octaves={}, bins_per_octave={}",
                sample_rate, n_fft, n_octaves, bins_per_octave
            )));
        }
        if fmin <= 0.0 || fmin >= nyquist {
            return Err(AnalysisError::InvalidInput(format!(
                "CQT fmin {:.2} Hz outside (0, {:.1}) Hz",
                fmin, nyquist
            )));
        }

        let n_fft_bins = n_fft / 2 + 1;
        let resolution = sample_rate as f32 / n_fft as f32;
        let q = 1.0 / (2f32.powf(1.0 / bins_per_octave as f32) - 1.0);

        let rows: Vec<Vec<(usize, f32)>> = (0..n_octaves * bins_per_octave)
            .map(|k| fmin * 2f32.powf(k as f32 / bins_per_octave as f32))
            .take_while(|&freq| freq < nyquist)
            .map(|center| {
                let bandwidth = center / q;
                let lo = ((center - bandwidth) / resolution).ceil().max(0.0) as usize;
                let hi = (((center + bandwidth) / resolution).floor() as usize).min(n_fft_bins - 1);

                let mut row: Vec<(usize, f32)> = (lo..=hi)
                    .filter_map(|bin| {
                        let offset = (bin_frequency(bin, sample_rate, n_fft) - center) / bandwidth;
                        let weight = 0.5 + 0.5 * (std::f32::consts::PI * offset).cos();
                        (offset.abs() < 1.0 && weight > 0.0).then_some((bin, weight))
                    })
                    .collect();

                if row.is_empty() {
                    let nearest = ((center / resolution).round() as usize).min(n_fft_bins - 1);
                    row.push((nearest, 1.0));
                }

                let total: f32 = row.iter().map(|(_, w)| w).sum();
                row.iter_mut().for_each(|(_, w)| *w /= total);
                row
            })
            .collect();

        log::debug!(
            "CQT kernel: {} bins from {:.2} Hz, Q={:.1}, n_fft={}",
            rows.len(),
            fmin,
            q,
            n_fft
        );

        Ok(Self {
            rows,
            bins_per_octave,
        })
    }

    /// Number of constant-Q bins
    pub fn n_bins(&self) -> usize {
        self.rows.len()
    }

    /// Constant-Q bins per octave
    pub fn bins_per_octave(&self) -> usize {
        self.bins_per_octave
    }

    /// Map one magnitude spectrum to constant-Q magnitudes
    ///
    /// Kernel entries past the end of `spectrum` read as zero.
    pub fn apply(&self, spectrum: &[f32]) -> Vec<f32> {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|&(bin, w)| spectrum.get(bin).copied().unwrap_or(0.0) * w)
                    .sum()
            })
            .collect()
    }
}
