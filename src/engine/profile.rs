//! Profile-correlation engine
//!
//! Pipeline at the engine rate (22050 Hz by default):
//! 1. Hann STFT (4096 / 512, centered) and median-filter HPSS
//! 2. Tempo: onset strength of the percussive part → envelope autocorrelation
//!    with a tempo prior → octave correction
//! 3. Key: CQT chroma of the harmonic part → time average →
//!    Krumhansl-Schmuckler correlation, accepted above the key threshold
//!
//! Labels use the capitalized style ("A Min").

use std::path::Path;

use super::{analyze_decoded, prepare_window, AnalysisEngine, PROFILE_ENGINE_TAG};
use crate::analysis::result::{AnalysisResult, KeyLabelStyle};
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::features::chroma::{extract_chroma, mean_chroma};
use crate::features::key::{detect_key, KeyTemplates};
use crate::features::onset::{hpss_decompose, onset_strength};
use crate::features::period::autocorrelation::tempo_from_envelope;
use crate::features::period::correct_octave;
use crate::features::stft::{magnitude_spectrogram, Framing, WindowType};

/// Soft-mask exponent for HPSS
const HPSS_MASK_POWER: f32 = 2.0;

type Spectrogram = Vec<Vec<f32>>;

/// HPSS + onset envelope + CQT chroma engine
#[derive(Debug, Clone)]
pub struct ProfileEngine {
    config: AnalysisConfig,
    templates: KeyTemplates,
}

impl ProfileEngine {
    /// Create an engine with the given analysis parameters
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            templates: KeyTemplates::new(),
        }
    }

    /// Analysis sample rate
    pub fn sample_rate(&self) -> u32 {
        self.config.profile_sample_rate
    }

    /// Harmonic and percussive magnitude spectrograms
    fn separate(&self, samples: &[f32]) -> Result<(Spectrogram, Spectrogram), AnalysisError> {
        let spectrogram = magnitude_spectrogram(
            samples,
            self.config.frame_size,
            self.config.hop_size,
            WindowType::Hann,
            Framing::Centered,
        )?;
        hpss_decompose(&spectrogram, self.config.hpss_kernel_size, HPSS_MASK_POWER)
    }

    fn tempo_from_percussive(&self, percussive: &[Vec<f32>]) -> Result<Option<f32>, AnalysisError> {
        let sr = self.sample_rate();
        let envelope = onset_strength(percussive, sr, self.config.frame_size, self.config.onset_mel_bands)?;
        let base = tempo_from_envelope(
            &envelope,
            sr,
            self.config.hop_size,
            self.config.search_min_bpm,
            self.config.search_max_bpm,
            self.config.tempo.sweet_spot_bpm,
        )?;
        Ok(base.and_then(|bpm| correct_octave(bpm, &self.config.tempo)))
    }

    fn key_from_harmonic(&self, harmonic: &[Vec<f32>]) -> Result<Option<String>, AnalysisError> {
        let chroma = extract_chroma(harmonic, self.sample_rate(), self.config.frame_size)?;
        let averaged = mean_chroma(&chroma);
        let Some(result) = detect_key(&averaged, &self.templates)? else {
            return Ok(None);
        };
        if result.correlation > self.config.key_threshold {
            Ok(Some(result.key.label(KeyLabelStyle::Capitalized)))
        } else {
            log::debug!(
                "Key correlation {:.3} below threshold {:.2}",
                result.correlation,
                self.config.key_threshold
            );
            Ok(None)
        }
    }
}

impl Default for ProfileEngine {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}

impl AnalysisEngine for ProfileEngine {
    fn tag(&self) -> &str {
        PROFILE_ENGINE_TAG
    }

    fn estimate_tempo(&self, samples: &[f32], sample_rate: u32) -> Option<f32> {
        let window = prepare_window(samples, sample_rate, self.sample_rate(), &self.config)?;
        self.separate(&window)
            .and_then(|(_, percussive)| self.tempo_from_percussive(&percussive))
            .unwrap_or_else(|e| {
                log::warn!("Profile tempo estimation failed: {}", e);
                None
            })
    }

    fn estimate_key(&self, samples: &[f32], sample_rate: u32) -> Option<String> {
        let window = prepare_window(samples, sample_rate, self.sample_rate(), &self.config)?;
        self.separate(&window)
            .and_then(|(harmonic, _)| self.key_from_harmonic(&harmonic))
            .unwrap_or_else(|e| {
                log::warn!("Profile key estimation failed: {}", e);
                None
            })
    }

    /// Shares one HPSS between tempo and key
    fn analyze_samples(&self, samples: &[f32], sample_rate: u32) -> AnalysisResult {
        let Some(window) = prepare_window(samples, sample_rate, self.sample_rate(), &self.config) else {
            return AnalysisResult::default();
        };
        let (harmonic, percussive) = match self.separate(&window) {
            Ok(parts) => parts,
            Err(e) => {
                log::warn!("Harmonic/percussive separation failed: {}", e);
                return AnalysisResult::default();
            }
        };

        let bpm = self.tempo_from_percussive(&percussive).unwrap_or_else(|e| {
            log::warn!("Profile tempo estimation failed: {}", e);
            None
        });
        let key = self.key_from_harmonic(&harmonic).unwrap_or_else(|e| {
            log::warn!("Profile key estimation failed: {}", e);
            None
        });
        AnalysisResult { bpm, key }
    }

    fn analyze_file(&self, path: &Path) -> AnalysisResult {
        analyze_decoded(self, path, self.sample_rate(), &self.config)
    }
}
