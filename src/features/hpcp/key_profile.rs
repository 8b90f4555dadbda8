//! Key template matching on high-resolution pitch class profiles
//!
//! Uses the EDMA profiles (averaged over electronic dance music), linearly
//! interpolated to the profile resolution. Every circular shift of the major
//! and minor templates is scored by Pearson correlation against the profile;
//! the best shift gives tonic and mode, its correlation is the strength.
//!
//! # Reference
//!
//! Faraldo, Á., Gómez, E., Jordà, S., & Herrera, P. (2016). Key Estimation in
//! Electronic Dance Music. *Advances in Information Retrieval (ECIR 2016)*, 335-347.

use crate::analysis::result::Key;
use crate::error::AnalysisError;

const EDMA_MAJOR: [f32; 12] = [
    0.165_195_5, 0.047_490_26, 0.082_930_76, 0.066_871_12, 0.099_946_45, 0.092_741_23,
    0.052_944_87, 0.131_594_76, 0.052_189_86, 0.074_436_53, 0.069_407_23, 0.064_251_5,
];

const EDMA_MINOR: [f32; 12] = [
    0.172_353_48, 0.04, 0.076_100_9, 0.120_857_55, 0.056_214_98, 0.085_278_53,
    0.049_791_5, 0.134_510_01, 0.074_589_16, 0.050_030_23, 0.099_825_85, 0.038_724_2,
];

const EPSILON: f32 = 1e-12;

/// Best key for one profile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyMatch {
    /// Key with the tonic as a C-based pitch class
    pub key: Key,
    /// Pearson correlation of the best template shift (-1.0 to 1.0)
    pub strength: f32,
}

/// Major/minor templates interpolated to one profile resolution
#[derive(Debug, Clone)]
pub struct EdmaMatcher {
    major: Vec<f32>,
    minor: Vec<f32>,
    /// Semitones from C up to the pitch class of profile bin 0
    reference_pitch_class: u32,
}

impl EdmaMatcher {
    /// Build templates for `size` bins per octave
    ///
    /// `reference_pitch_class` is the C-based pitch class of profile bin 0
    /// (9 for an A440 reference).
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::InvalidInput` if `size` is not a positive multiple of 12
    pub fn new(size: usize, reference_pitch_class: u32) -> Result<Self, AnalysisError> {
        if size == 0 || size % 12 != 0 {
            return Err(AnalysisError::InvalidInput(format!(
                "Profile size must be a positive multiple of 12, got {}",
                size
            )));
        }
        Ok(Self {
            major: interpolate(&EDMA_MAJOR, size),
            minor: interpolate(&EDMA_MINOR, size),
            reference_pitch_class: reference_pitch_class % 12,
        })
    }

    /// Find the best key for an averaged profile
    ///
    /// # Returns
    ///
    /// `Ok(None)` for a constant profile
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::InvalidInput` if the profile length differs from the template size
    pub fn best_key(&self, profile: &[f32]) -> Result<Option<KeyMatch>, AnalysisError> {
        let size = self.major.len();
        if profile.len() != size {
            return Err(AnalysisError::InvalidInput(format!(
                "Profile has {} bins, expected {}",
                profile.len(),
                size
            )));
        }

        let mean = profile.iter().sum::<f32>() / size as f32;
        let centered: Vec<f32> = profile.iter().map(|p| p - mean).collect();
        let norm = centered.iter().map(|c| c * c).sum::<f32>().sqrt();
        if norm < EPSILON {
            return Ok(None);
        }

        let per_semitone = size / 12;
        let mut best: Option<KeyMatch> = None;
        for shift in 0..size {
            for (template, is_major) in [(&self.major, true), (&self.minor, false)] {
                let r = shifted_correlation(&centered, norm, template, shift);
                if best.map_or(true, |b| r > b.strength) {
                    let from_reference = ((shift + per_semitone / 2) / per_semitone) % 12;
                    let tonic = (from_reference as u32 + self.reference_pitch_class) % 12;
                    let key = if is_major { Key::Major(tonic) } else { Key::Minor(tonic) };
                    best = Some(KeyMatch { key, strength: r });
                }
            }
        }

        if let Some(m) = best {
            log::debug!("EDMA key match: {:?} (strength {:.3})", m.key, m.strength);
        }
        Ok(best)
    }
}

/// Pearson correlation of a centered profile with `template` rotated by `shift` bins
fn shifted_correlation(centered: &[f32], norm: f32, template: &[f32], shift: usize) -> f32 {
    let size = template.len();
    let mean = template.iter().sum::<f32>() / size as f32;
    let mut dot = 0.0f32;
    let mut template_energy = 0.0f32;
    for (j, c) in centered.iter().enumerate() {
        let t = template[(j + size - shift) % size] - mean;
        dot += c * t;
        template_energy += t * t;
    }
    if template_energy < EPSILON {
        return 0.0;
    }
    dot / (norm * template_energy.sqrt())
}

/// Linear interpolation of a 12-bin profile to `size` bins, wrapping B to C
fn interpolate(profile: &[f32; 12], size: usize) -> Vec<f32> {
    let per_semitone = size / 12;
    (0..size)
        .map(|i| {
            let semitone = i / per_semitone;
            let frac = (i % per_semitone) as f32 / per_semitone as f32;
            let next = profile[(semitone + 1) % 12];
            profile[semitone] + (next - profile[semitone]) * frac
        })
        .collect()
}
