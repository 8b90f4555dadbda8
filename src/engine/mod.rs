//! Tempo and key analysis engines
//!
//! An [`AnalysisEngine`] turns a waveform (or a file) into an
//! [`AnalysisResult`]. Three variants implement the same capability:
//! - [`ProfileEngine`]: HPSS, onset-envelope tempo, CQT chroma and
//!   Krumhansl-Schmuckler key correlation
//! - [`SpectralEngine`]: multi-feature rhythm extraction and HPCP with EDMA key profiles
//! - [`ExternalEngine`]: any program printing `{"bpm": .., "key": ..}` for a file
//!
//! Engines never fail: every DSP error degrades to a `None` field, and tempo
//! and key are estimated independently.

pub mod external;
pub mod profile;
pub mod spectral;

use std::borrow::Cow;
use std::path::Path;

pub use external::ExternalEngine;
pub use profile::ProfileEngine;
pub use spectral::SpectralEngine;

use crate::analysis::result::AnalysisResult;
use crate::config::AnalysisConfig;
use crate::io::{load_mono, resample::resample};

/// Engine tag stamped by [`ProfileEngine`]
pub const PROFILE_ENGINE_TAG: &str = "profile";

/// Engine tag stamped by [`SpectralEngine`]
pub const SPECTRAL_ENGINE_TAG: &str = "spectral";

/// Tempo and key estimation capability
pub trait AnalysisEngine: Send + Sync {
    /// Tag written to `analysis_engine` in sample metadata
    fn tag(&self) -> &str;

    /// Estimate tempo in BPM, or `None` if no plausible tempo was found
    fn estimate_tempo(&self, samples: &[f32], sample_rate: u32) -> Option<f32>;

    /// Estimate key as "<pitch class> <mode>", or `None` below the confidence threshold
    fn estimate_key(&self, samples: &[f32], sample_rate: u32) -> Option<String>;

    /// Estimate tempo and key of one waveform
    fn analyze_samples(&self, samples: &[f32], sample_rate: u32) -> AnalysisResult {
        AnalysisResult {
            bpm: self.estimate_tempo(samples, sample_rate),
            key: self.estimate_key(samples, sample_rate),
        }
    }

    /// Decode a file and estimate tempo and key
    ///
    /// A file that cannot be decoded yields an empty result.
    fn analyze_file(&self, path: &Path) -> AnalysisResult;
}

/// Decode the analysis window of a file at `sample_rate` and run `engine` on it
pub(crate) fn analyze_decoded(
    engine: &dyn AnalysisEngine,
    path: &Path,
    sample_rate: u32,
    config: &AnalysisConfig,
) -> AnalysisResult {
    match load_mono(path, sample_rate, config.max_analysis_secs) {
        Ok(samples) => engine.analyze_samples(&samples, sample_rate),
        Err(e) => {
            log::warn!("{}: cannot decode {} for analysis: {}", engine.tag(), path.display(), e);
            AnalysisResult::default()
        }
    }
}

/// Bring a waveform to the engine's rate and analysis window
///
/// Returns `None` for clips shorter than `config.min_clip_secs` or if
/// resampling fails.
pub(crate) fn prepare_window<'a>(
    samples: &'a [f32],
    sample_rate: u32,
    target_rate: u32,
    config: &AnalysisConfig,
) -> Option<Cow<'a, [f32]>> {
    let mut window: Cow<'a, [f32]> = if sample_rate == target_rate {
        Cow::Borrowed(samples)
    } else {
        match resample(samples, sample_rate, target_rate) {
            Ok(resampled) => Cow::Owned(resampled),
            Err(e) => {
                log::warn!("Resampling {} -> {} Hz failed: {}", sample_rate, target_rate, e);
                return None;
            }
        }
    };

    let max_len = (config.max_analysis_secs * target_rate as f32) as usize;
    if window.len() > max_len {
        window = match window {
            Cow::Borrowed(s) => Cow::Borrowed(&s[..max_len]),
            Cow::Owned(mut v) => {
                v.truncate(max_len);
                Cow::Owned(v)
            }
        };
    }

    let min_len = (config.min_clip_secs * target_rate as f32) as usize;
    if window.len() < min_len {
        log::debug!(
            "Clip too short for analysis: {} samples < {}",
            window.len(),
            min_len
        );
        return None;
    }
    Some(window)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_window_truncates_and_rejects_short() {
        let config = AnalysisConfig {
            max_analysis_secs: 1.0,
            min_clip_secs: 0.5,
            ..AnalysisConfig::default()
        };
        let long = vec![0.1f32; 3000];
        let window = prepare_window(&long, 1000, 1000, &config).unwrap();
        assert_eq!(window.len(), 1000);

        let short = vec![0.1f32; 400];
        assert!(prepare_window(&short, 1000, 1000, &config).is_none());
    }

    #[test]
    fn test_prepare_window_resamples() {
        let config = AnalysisConfig::default();
        let samples = vec![0.0f32; 44100];
        let window = prepare_window(&samples, 44100, 22050, &config).unwrap();
        assert!(window.len() > 20000 && window.len() <= 22050);
    }
}
