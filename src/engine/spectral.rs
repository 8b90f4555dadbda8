//! Spectral-peak engine
//!
//! Works on the full signal at 44100 Hz without source separation.
//!
//! Tempo: spectral flux, energy flux and HFC novelty are fused, peak-picked
//! into onsets, and two period estimators (onset autocorrelation and a
//! coarse-to-fine comb filterbank) vote; the merged winner goes through the
//! same octave correction as the profile engine.
//!
//! Key: Blackman-Harris framed spectral peaks → 36-bin HPCP → EDMA
//! template match, accepted above the key threshold. Labels use the
//! abbreviated style ("A min").

use std::path::Path;

use super::{analyze_decoded, prepare_window, AnalysisEngine, SPECTRAL_ENGINE_TAG};
use crate::analysis::result::{AnalysisResult, KeyLabelStyle};
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::features::hpcp::{average_hpcp, reference_pitch_class, EdmaMatcher};
use crate::features::period::autocorrelation::estimate_bpm_from_autocorrelation;
use crate::features::period::candidate_filter::merge_bpm_candidates;
use crate::features::period::comb_filter::coarse_to_fine_search;
use crate::features::period::correct_octave;
use crate::features::period::novelty::{
    combined_novelty, energy_flux_novelty, hfc_novelty, spectral_flux_novelty,
};
use crate::features::period::peak_picking::find_peaks;
use crate::features::stft::{magnitude_spectrogram, Framing, WindowType};

/// Peaks under this fraction of the strongest novelty peak are not onsets
const ONSET_THRESHOLD: f32 = 0.3;

/// Minimum spacing between onsets in seconds
const MIN_ONSET_SPACING_SECS: f32 = 0.1;

/// Half-width of the fine comb search around the coarse winner
const COMB_REFINEMENT_BPM: f32 = 5.0;

/// Estimates closer than this (in cents) count as the same tempo
const MERGE_TOLERANCE_CENTS: f32 = 50.0;

/// Multi-feature rhythm + HPCP engine
#[derive(Debug, Clone)]
pub struct SpectralEngine {
    config: AnalysisConfig,
    matcher: EdmaMatcher,
}

impl SpectralEngine {
    /// Create an engine with the given analysis parameters
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::InvalidInput` if the HPCP size is not a multiple of 12
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        let matcher = EdmaMatcher::new(config.hpcp.size, reference_pitch_class(config.hpcp.reference_hz))?;
        Ok(Self { config, matcher })
    }

    /// Analysis sample rate
    pub fn sample_rate(&self) -> u32 {
        self.config.spectral_sample_rate
    }

    /// Onset positions in samples from the fused novelty curve
    fn detect_onsets(&self, samples: &[f32]) -> Result<Vec<usize>, AnalysisError> {
        let hop = self.config.rhythm_hop_size;
        let spectrogram = magnitude_spectrogram(
            samples,
            self.config.rhythm_frame_size,
            hop,
            WindowType::Hann,
            Framing::Centered,
        )?;

        let novelty = combined_novelty(
            &spectral_flux_novelty(&spectrogram)?,
            &energy_flux_novelty(&spectrogram)?,
            &hfc_novelty(&spectrogram)?,
        );

        let min_distance =
            ((MIN_ONSET_SPACING_SECS * self.sample_rate() as f32 / hop as f32).round() as usize).max(1);
        // Novelty value i describes the change from frame i to frame i + 1
        let mut onsets: Vec<usize> = find_peaks(&novelty, ONSET_THRESHOLD, min_distance)
            .into_iter()
            .map(|(idx, _)| (idx + 1) * hop)
            .collect();
        onsets.sort_unstable();

        log::debug!("Detected {} onsets", onsets.len());
        Ok(onsets)
    }

    fn tempo(&self, samples: &[f32]) -> Result<Option<f32>, AnalysisError> {
        let onsets = self.detect_onsets(samples)?;
        if onsets.len() < 2 {
            log::debug!("Too few onsets for tempo: {}", onsets.len());
            return Ok(None);
        }

        let sr = self.sample_rate();
        let (min_bpm, max_bpm) = (self.config.search_min_bpm, self.config.search_max_bpm);
        let autocorr =
            estimate_bpm_from_autocorrelation(&onsets, sr, self.config.rhythm_hop_size, min_bpm, max_bpm)?;
        let comb = coarse_to_fine_search(&onsets, sr, min_bpm, max_bpm, COMB_REFINEMENT_BPM)?;

        let merged = merge_bpm_candidates(&autocorr, &comb, MERGE_TOLERANCE_CENTS);
        Ok(merged
            .first()
            .and_then(|best| correct_octave(best.bpm, &self.config.tempo)))
    }

    fn key(&self, samples: &[f32]) -> Result<Option<String>, AnalysisError> {
        let Some(profile) = average_hpcp(samples, self.sample_rate(), &self.config.hpcp)? else {
            return Ok(None);
        };
        let Some(found) = self.matcher.best_key(&profile)? else {
            return Ok(None);
        };
        if found.strength > self.config.key_threshold {
            Ok(Some(found.key.label(KeyLabelStyle::Abbreviated)))
        } else {
            log::debug!(
                "Key strength {:.3} below threshold {:.2}",
                found.strength,
                self.config.key_threshold
            );
            Ok(None)
        }
    }
}

impl AnalysisEngine for SpectralEngine {
    fn tag(&self) -> &str {
        SPECTRAL_ENGINE_TAG
    }

    fn estimate_tempo(&self, samples: &[f32], sample_rate: u32) -> Option<f32> {
        let window = prepare_window(samples, sample_rate, self.sample_rate(), &self.config)?;
        self.tempo(&window).unwrap_or_else(|e| {
            log::warn!("Spectral tempo estimation failed: {}", e);
            None
        })
    }

    fn estimate_key(&self, samples: &[f32], sample_rate: u32) -> Option<String> {
        let window = prepare_window(samples, sample_rate, self.sample_rate(), &self.config)?;
        self.key(&window).unwrap_or_else(|e| {
            log::debug!("Spectral key estimation failed: {}", e);
            None
        })
    }

    fn analyze_file(&self, path: &Path) -> AnalysisResult {
        analyze_decoded(self, path, self.sample_rate(), &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> SpectralEngine {
        SpectralEngine::new(AnalysisConfig::default()).unwrap()
    }

    fn click_track(period: usize, sr: u32, secs: f32) -> Vec<f32> {
        let n = (sr as f32 * secs) as usize;
        let click_len = sr as usize / 200;
        (0..n)
            .map(|i| {
                let pos = i % period;
                if pos < click_len {
                    (1.0 - pos as f32 / click_len as f32) * if (i * 7919) % 13 < 6 { 1.0 } else { -1.0 }
                } else {
                    0.0
                }
            })
            .collect()
    }

    fn triad(freqs: &[f32], sr: u32, secs: f32) -> Vec<f32> {
        let n = (sr as f32 * secs) as usize;
        (0..n)
            .map(|i| {
                let t = i as f32 / sr as f32;
                freqs
                    .iter()
                    .map(|f| 0.3 * (2.0 * std::f32::consts::PI * f * t).sin())
                    .sum()
            })
            .collect()
    }

    #[test]
    fn test_tempo_of_click_track() {
        // 43 hops of 512 samples at 44100 Hz ≈ 120.2 BPM
        let bpm = engine()
            .estimate_tempo(&click_track(43 * 512, 44100, 8.0), 44100)
            .unwrap();
        assert!((bpm - 120.2).abs() < 2.0, "got {}", bpm);
    }

    #[test]
    fn test_slow_click_track_is_doubled() {
        // 70 BPM is below the doubling threshold; 140 is closer to 120
        let period = (60.0 * 44100.0 / 70.0) as usize;
        let bpm = engine()
            .estimate_tempo(&click_track(period, 44100, 10.0), 44100)
            .unwrap();
        assert!((bpm - 140.0).abs() < 3.0, "got {}", bpm);
    }

    #[test]
    fn test_tempo_sweep_after_octave_correction() {
        // Fast tracks come back halved toward the 120 BPM sweet spot
        for (true_bpm, expected) in [(100.0f32, 100.0f32), (170.0, 85.0), (190.0, 95.0)] {
            let period = (60.0 * 44100.0 / true_bpm) as usize;
            let bpm = engine().estimate_tempo(&click_track(period, 44100, 8.0), 44100);
            assert!(
                bpm.is_some_and(|b| (b - expected).abs() < 2.0),
                "{} BPM track -> {:?}",
                true_bpm,
                bpm
            );
        }
    }

    #[test]
    fn test_onsets_found_on_every_click() {
        // 120.2 BPM over 8 s gives 16 clicks
        let onsets = engine().detect_onsets(&click_track(43 * 512, 44100, 8.0)).unwrap();
        assert!(onsets.len() >= 15, "only {} onsets", onsets.len());
        for pair in onsets.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap.abs_diff(43 * 512) <= 2 * 512, "gap {}", gap);
        }
    }

    #[test]
    fn test_weak_key_rejected_by_threshold() {
        let sr = 44100;
        let samples = triad(&[220.0, 261.63, 329.63], sr, 3.0);
        assert!(engine().estimate_key(&samples, sr).is_some());

        // No template reaches a strength above 1.0
        let mut config = AnalysisConfig::default();
        config.key_threshold = 1.0;
        let strict = SpectralEngine::new(config).unwrap();
        assert_eq!(strict.estimate_key(&samples, sr), None);
    }

    #[test]
    fn test_key_of_minor_triad() {
        // A3, C4, E4
        let key = engine()
            .estimate_key(&triad(&[220.0, 261.63, 329.63], 44100, 3.0), 44100)
            .unwrap();
        assert!(key == "A min" || key == "C maj", "got {}", key);
    }

    #[test]
    fn test_silence_yields_nothing() {
        let result = engine().analyze_samples(&vec![0.0; 44100 * 2], 44100);
        assert_eq!(result, AnalysisResult::default());
    }

    #[test]
    fn test_invalid_hpcp_size() {
        let mut config = AnalysisConfig::default();
        config.hpcp.size = 30;
        assert!(SpectralEngine::new(config).is_err());
    }
}
