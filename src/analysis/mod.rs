//! Analysis result types
//!
//! - [`AnalysisResult`]: tempo and key of one engine run
//! - [`Key`]: pitch class and mode, with the label vocabularies stored in metadata

pub mod result;

pub use result::{AnalysisResult, Key, KeyLabelStyle, KEY_NAMES, PITCH_CLASSES, SPECTRAL_KEY_NAMES};
