//! Log-mel front end of the audio encoder

use crate::config::EmbeddingConfig;
use crate::error::AnalysisError;
use crate::features::mel::{apply_filterbank, mel_filterbank};
use crate::features::stft::{magnitude_spectrogram, Framing, WindowType};

/// Floor added before the logarithm; also the value of padded frames
const LOG_FLOOR: f32 = 1e-10;

/// Fixed-size log-mel spectrogram extractor
#[derive(Debug, Clone)]
pub struct LogMelFrontend {
    filterbank: Vec<Vec<f32>>,
    n_fft: usize,
    hop_size: usize,
    n_frames: usize,
}

impl LogMelFrontend {
    /// Build the filterbank for an encoder configuration
    ///
    /// The output always has the frame count of `max_duration_secs` of audio
    /// at `sample_rate`.
    pub fn new(config: &EmbeddingConfig) -> Self {
        let max_samples = (config.max_duration_secs * config.sample_rate as f32) as usize;
        Self {
            filterbank: mel_filterbank(config.sample_rate, config.n_fft, config.n_mels, config.fmin, config.fmax),
            n_fft: config.n_fft,
            hop_size: config.hop_size,
            n_frames: 1 + max_samples / config.hop_size.max(1),
        }
    }

    /// Number of frames of every output
    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    /// Number of mel bands
    pub fn n_mels(&self) -> usize {
        self.filterbank.len()
    }

    /// Compute `n_frames × n_mels` natural-log mel power values
    ///
    /// Longer input is truncated; shorter input is padded with silent frames.
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::InvalidInput` for empty samples or invalid STFT sizes
    pub fn compute(&self, samples: &[f32]) -> Result<Vec<Vec<f32>>, AnalysisError> {
        if samples.is_empty() {
            return Err(AnalysisError::InvalidInput("Empty audio".to_string()));
        }

        let spectrogram =
            magnitude_spectrogram(samples, self.n_fft, self.hop_size, WindowType::Hann, Framing::Centered)?;

        let silent = vec![LOG_FLOOR.ln(); self.n_mels()];
        let mut frames: Vec<Vec<f32>> = spectrogram
            .iter()
            .take(self.n_frames)
            .map(|frame| {
                let power: Vec<f32> = frame.iter().map(|m| m * m).collect();
                apply_filterbank(&self.filterbank, &power)
                    .into_iter()
                    .map(|e| (e + LOG_FLOOR).ln())
                    .collect()
            })
            .collect();
        frames.resize(self.n_frames, silent);

        log::debug!(
            "Log-mel: {} samples -> {} frames x {} bands",
            samples.len(),
            frames.len(),
            self.n_mels()
        );
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> EmbeddingConfig {
        EmbeddingConfig {
            sample_rate: 16000,
            max_duration_secs: 1.0,
            n_mels: 32,
            n_fft: 512,
            hop_size: 160,
            fmin: 50.0,
            fmax: 8000.0,
            ..EmbeddingConfig::default()
        }
    }

    #[test]
    fn test_fixed_output_shape() {
        let frontend = LogMelFrontend::new(&small_config());
        assert_eq!(frontend.n_frames(), 101);

        let short = frontend.compute(&vec![0.1f32; 4000]).unwrap();
        let long = frontend.compute(&vec![0.1f32; 40000]).unwrap();
        for out in [&short, &long] {
            assert_eq!(out.len(), 101);
            assert!(out.iter().all(|f| f.len() == 32));
        }
        // Padding frames hold the log floor
        assert_eq!(short[100][0], LOG_FLOOR.ln());
    }

    #[test]
    fn test_tone_energy_in_matching_band() {
        let config = small_config();
        let frontend = LogMelFrontend::new(&config);
        let tone: Vec<f32> = (0..16000)
            .map(|i| (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / 16000.0).sin())
            .collect();
        let mel = frontend.compute(&tone).unwrap();
        let frame = &mel[50];
        let loudest = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        // Band centers are mel-spaced; 1 kHz sits in the lower half of 50-8000 Hz
        assert!(loudest > 5 && loudest < 20, "loudest band {}", loudest);
    }

    #[test]
    fn test_empty_rejected() {
        assert!(LogMelFrontend::new(&small_config()).compute(&[]).is_err());
    }
}
