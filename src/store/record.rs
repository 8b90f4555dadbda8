//! Sample records as persisted in the store

use serde::{Deserialize, Serialize};

use crate::analysis::result::AnalysisResult;

/// Per-sample metadata
///
/// Unknown values use the sentinels of the persisted format: `bpm == 0.0`
/// and an empty `key`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleMetadata {
    /// File name without directories
    pub filename: String,

    /// Tempo in BPM, 0 if not detected
    pub bpm: f32,

    /// Key label, empty if not detected
    pub key: String,

    /// Tag of the engine that produced `bpm` and `key`
    pub analysis_engine: String,

    /// Duration probed at indexing time
    pub duration_secs: Option<f32>,
}

impl SampleMetadata {
    /// Metadata for a freshly analyzed file
    pub fn from_analysis(filename: impl Into<String>, result: &AnalysisResult, engine: &str) -> Self {
        Self {
            filename: filename.into(),
            bpm: result.bpm.unwrap_or(0.0),
            key: result.key.clone().unwrap_or_default(),
            analysis_engine: engine.to_string(),
            duration_secs: None,
        }
    }

    /// Detected tempo, if any
    pub fn bpm(&self) -> Option<f32> {
        (self.bpm > 0.0).then_some(self.bpm)
    }

    /// Detected key, if any
    pub fn key(&self) -> Option<&str> {
        (!self.key.is_empty()).then_some(self.key.as_str())
    }

    /// Overwrite fields with the detected values of a re-analysis
    ///
    /// `None` fields leave the prior value untouched. The engine tag is
    /// always stamped. Returns whether the result carried any value.
    pub fn merge(&mut self, result: &AnalysisResult, engine: &str) -> bool {
        let mut merged = false;
        if let Some(bpm) = result.bpm.filter(|b| *b > 0.0) {
            self.bpm = bpm;
            merged = true;
        }
        if let Some(key) = result.key.as_deref().filter(|k| !k.is_empty()) {
            self.key = key.to_string();
            merged = true;
        }
        self.analysis_engine = engine.to_string();
        merged
    }
}

/// One indexed sample
///
/// `id` is the normalized absolute path of the file and `document` always
/// equals it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    /// Normalized absolute path
    pub id: String,

    /// Unit-length embedding
    pub embedding: Vec<f32>,

    /// Stored document, identical to `id`
    pub document: String,

    /// Attributes
    pub metadata: SampleMetadata,
}

impl SampleRecord {
    /// Build a record keyed by `path`
    pub fn new(path: impl Into<String>, embedding: Vec<f32>, metadata: SampleMetadata) -> Self {
        let id = path.into();
        Self {
            document: id.clone(),
            id,
            embedding,
            metadata,
        }
    }
}

/// One nearest-neighbor match
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    /// Record id (path)
    pub id: String,

    /// Stored document
    pub document: String,

    /// Record metadata
    pub metadata: SampleMetadata,

    /// Cosine distance to the query, in [0, 2]
    pub distance: f32,
}

/// Cosine distance `1 - cos(a, b)`
///
/// Vectors of different length or zero norm are at distance 1.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 1.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = (norm_a * norm_b).sqrt();
    if denom <= f32::EPSILON {
        return 1.0;
    }
    (1.0 - dot / denom).clamp(0.0, 2.0)
}

/// Little-endian `f32` blob
pub(crate) fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn embedding_from_bytes(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_distance() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_distance(&[1.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn test_merge_keeps_prior_on_none() {
        let mut meta = SampleMetadata {
            filename: "kick.wav".into(),
            bpm: 128.0,
            key: String::new(),
            analysis_engine: "profile".into(),
            duration_secs: Some(1.0),
        };

        let merged = meta.merge(&AnalysisResult { bpm: None, key: Some("A min".into()) }, "spectral");
        assert!(merged);
        assert_eq!(meta.bpm, 128.0);
        assert_eq!(meta.key, "A min");
        assert_eq!(meta.analysis_engine, "spectral");

        assert!(!meta.merge(&AnalysisResult::default(), "profile"));
        assert_eq!(meta.analysis_engine, "profile");
        assert_eq!(meta.key, "A min");
    }

    #[test]
    fn test_sentinels() {
        let meta = SampleMetadata::from_analysis("a.wav", &AnalysisResult::default(), "profile");
        assert_eq!(meta.bpm(), None);
        assert_eq!(meta.key(), None);
        assert_eq!(meta.bpm, 0.0);
        assert!(meta.key.is_empty());
    }

    #[test]
    fn test_record_document_is_id() {
        let record = SampleRecord::new("/lib/a.wav", vec![1.0], SampleMetadata::default());
        assert_eq!(record.id, record.document);
    }

    #[test]
    fn test_embedding_blob() {
        let v = vec![0.5f32, -1.25, 3.0];
        assert_eq!(embedding_from_bytes(&embedding_to_bytes(&v)), Some(v));
        assert_eq!(embedding_from_bytes(&[0, 1, 2]), None);
    }
}
