//! Period (tempo) estimation
//!
//! Two rhythm front ends feed one octave-correction policy:
//! - Onset-envelope autocorrelation with a log-normal tempo prior
//!   (profile-correlation engine)
//! - Multi-feature novelty → onset picking → autocorrelation + comb
//!   filterbank, merged by agreement (spectral-peak engine)
//! - Octave correction toward the preferred tempo band

pub mod autocorrelation;
pub mod candidate_filter;
pub mod comb_filter;
pub mod novelty;
pub mod octave;
pub mod peak_picking;

pub use octave::{correct_octave, octave_candidates};

/// BPM candidate with confidence
#[derive(Debug, Clone, PartialEq)]
pub struct BpmCandidate {
    /// BPM estimate
    pub bpm: f32,

    /// Confidence score (0.0-1.0)
    pub confidence: f32,
}

/// Final BPM estimate with method agreement
#[derive(Debug, Clone, PartialEq)]
pub struct BpmEstimate {
    /// BPM estimate
    pub bpm: f32,

    /// Confidence score
    pub confidence: f32,

    /// Number of methods that agree
    pub method_agreement: u32,
}
