//! Analysis result types

use serde::{Deserialize, Serialize};

/// Pitch-class names, index 0 = C
pub const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Key labels written by the profile engine, grouped by tonic ("C Maj", "C Min", "C# Maj", ...)
pub const KEY_NAMES: [&str; 24] = [
    "C Maj", "C Min", "C# Maj", "C# Min", "D Maj", "D Min", "D# Maj", "D# Min",
    "E Maj", "E Min", "F Maj", "F Min", "F# Maj", "F# Min", "G Maj", "G Min",
    "G# Maj", "G# Min", "A Maj", "A Min", "A# Maj", "A# Min", "B Maj", "B Min",
];

/// Key labels written by the spectral engine ("C maj", "C min", ...)
pub const SPECTRAL_KEY_NAMES: [&str; 24] = [
    "C maj", "C min", "C# maj", "C# min", "D maj", "D min", "D# maj", "D# min",
    "E maj", "E min", "F maj", "F min", "F# maj", "F# min", "G maj", "G min",
    "G# maj", "G# min", "A maj", "A min", "A# maj", "A# min", "B maj", "B min",
];

/// Spelling of the mode suffix in a key label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyLabelStyle {
    /// "A Maj" / "A Min"
    Capitalized,
    /// "A maj" / "A min"
    Abbreviated,
}

/// Musical key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    /// Major key (0 = C, 1 = C#, ..., 11 = B)
    Major(u32),
    /// Minor key (0 = C, 1 = C#, ..., 11 = B)
    Minor(u32),
}

impl Key {
    /// Tonic pitch class (0 = C)
    pub fn tonic(&self) -> u32 {
        match self {
            Key::Major(i) | Key::Minor(i) => *i % 12,
        }
    }

    /// Whether this is a major key
    pub fn is_major(&self) -> bool {
        matches!(self, Key::Major(_))
    }

    /// Key label as stored in sample metadata
    ///
    /// # Example
    ///
    /// ```
    /// use cratedig::analysis::result::{Key, KeyLabelStyle};
    ///
    /// assert_eq!(Key::Major(1).label(KeyLabelStyle::Capitalized), "C# Maj");
    /// assert_eq!(Key::Minor(9).label(KeyLabelStyle::Abbreviated), "A min");
    /// ```
    pub fn label(&self, style: KeyLabelStyle) -> String {
        let mode = match (self, style) {
            (Key::Major(_), KeyLabelStyle::Capitalized) => "Maj",
            (Key::Minor(_), KeyLabelStyle::Capitalized) => "Min",
            (Key::Major(_), KeyLabelStyle::Abbreviated) => "maj",
            (Key::Minor(_), KeyLabelStyle::Abbreviated) => "min",
        };
        format!("{} {}", PITCH_CLASSES[self.tonic() as usize], mode)
    }

    /// Parse a label in either style
    ///
    /// Returns `None` for anything that is not "<pitch class> <maj|min>".
    pub fn from_label(label: &str) -> Option<Self> {
        let (tonic, mode) = label.trim().split_once(' ')?;
        let index = PITCH_CLASSES.iter().position(|p| *p == tonic)? as u32;
        match mode.to_ascii_lowercase().as_str() {
            "maj" => Some(Key::Major(index)),
            "min" => Some(Key::Minor(index)),
            _ => None,
        }
    }
}

/// Output of one analysis engine run over one file
///
/// Either field may be missing independently; tempo and key failures never
/// affect each other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Tempo in BPM, inside the configured octave-correction range
    pub bpm: Option<f32>,

    /// Key label such as "A Min" or "A min", depending on the engine
    pub key: Option<String>,
}

impl AnalysisResult {
    /// True when neither tempo nor key was detected
    pub fn is_empty(&self) -> bool {
        self.bpm.is_none() && self.key.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names_match_labels() {
        for tonic in 0..12u32 {
            let idx = tonic as usize * 2;
            assert_eq!(KEY_NAMES[idx], Key::Major(tonic).label(KeyLabelStyle::Capitalized));
            assert_eq!(KEY_NAMES[idx + 1], Key::Minor(tonic).label(KeyLabelStyle::Capitalized));
            assert_eq!(SPECTRAL_KEY_NAMES[idx], Key::Major(tonic).label(KeyLabelStyle::Abbreviated));
            assert_eq!(SPECTRAL_KEY_NAMES[idx + 1], Key::Minor(tonic).label(KeyLabelStyle::Abbreviated));
        }
    }

    #[test]
    fn test_from_label() {
        assert_eq!(Key::from_label("F# Min"), Some(Key::Minor(6)));
        assert_eq!(Key::from_label("A maj"), Some(Key::Major(9)));
        assert_eq!(Key::from_label("H maj"), None);
        assert_eq!(Key::from_label("C dorian"), None);
        assert_eq!(Key::from_label(""), None);
    }

    #[test]
    fn test_result_empty() {
        assert!(AnalysisResult::default().is_empty());
        let result = AnalysisResult { bpm: Some(120.0), key: None };
        assert!(!result.is_empty());
    }
}
