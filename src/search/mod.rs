//! Text search over the sample store
//!
//! 1. Embed the query text
//! 2. Fetch `min(100, 3 × top_k)` nearest records so filtering has headroom
//! 3. Map cosine distance to a similarity percentage
//! 4. Apply the [`SearchFilter`] keeping the nearest-first order
//! 5. Keep the first `top_k`
//!
//! The similarity mapping assumes distances in [0, 2], which holds for the
//! cosine distance every [`SampleStore`] in this crate uses. Another metric
//! would be clamped into [0, 100] without error.

pub mod filter;

use std::fmt;
use std::sync::Arc;

pub use filter::{CompiledFilter, SearchFilter};

use crate::embedding::AudioTextEncoder;
use crate::error::SearchError;
use crate::store::{SampleMetadata, SampleStore};

/// Over-fetch factor applied to `top_k`
const OVERFETCH_FACTOR: usize = 3;

/// Cap on the number of candidates fetched
const MAX_FETCH: usize = 100;

/// Similarity percentage for a cosine distance, clamped to [0, 100]
pub fn similarity_percent(distance: f32) -> f32 {
    ((1.0 - distance / 2.0) * 100.0).clamp(0.0, 100.0)
}

/// Coarse label for a similarity percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SimilarityBand {
    /// Below 25%
    Unrelated,
    /// 25% and above
    Poor,
    /// 40% and above
    Weak,
    /// 55% and above
    Fair,
    /// 70% and above
    Good,
    /// 85% and above
    Excellent,
}

impl SimilarityBand {
    /// Band of `percent`
    pub fn from_percent(percent: f32) -> Self {
        match percent {
            p if p >= 85.0 => SimilarityBand::Excellent,
            p if p >= 70.0 => SimilarityBand::Good,
            p if p >= 55.0 => SimilarityBand::Fair,
            p if p >= 40.0 => SimilarityBand::Weak,
            p if p >= 25.0 => SimilarityBand::Poor,
            _ => SimilarityBand::Unrelated,
        }
    }
}

impl fmt::Display for SimilarityBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SimilarityBand::Excellent => "excellent",
            SimilarityBand::Good => "good",
            SimilarityBand::Fair => "fair",
            SimilarityBand::Weak => "weak",
            SimilarityBand::Poor => "poor",
            SimilarityBand::Unrelated => "unrelated",
        };
        f.pad(label)
    }
}

/// One ranked search result
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Full path (the record id)
    pub path: String,
    /// Record metadata (filename, bpm, key, engine tag)
    pub metadata: SampleMetadata,
    /// Similarity percentage, 0 to 100
    pub similarity: f32,
    /// Raw cosine distance
    pub distance: f32,
}

impl SearchResult {
    /// Similarity band
    pub fn band(&self) -> SimilarityBand {
        SimilarityBand::from_percent(self.similarity)
    }
}

/// Embeds queries and ranks store records against them
#[derive(Clone)]
pub struct SearchEngine {
    store: Arc<dyn SampleStore>,
    encoder: Arc<dyn AudioTextEncoder>,
}

impl SearchEngine {
    /// Search `store` with query vectors from `encoder`
    pub fn new(store: Arc<dyn SampleStore>, encoder: Arc<dyn AudioTextEncoder>) -> Self {
        Self { store, encoder }
    }

    /// At most `top_k` filtered results, most similar first
    ///
    /// A blank query returns no results without touching the store.
    ///
    /// # Errors
    ///
    /// `SearchError::Embedding` if the query cannot be embedded,
    /// `SearchError::Store` if the store query fails
    pub fn search(&self, query: &str, top_k: usize, filter: &SearchFilter) -> Result<Vec<SearchResult>, SearchError> {
        let query = query.trim();
        if query.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let fetch_k = (top_k * OVERFETCH_FACTOR).min(MAX_FETCH);
        let vector = self.encoder.embed_text(query)?;
        let hits = self.store.query(&vector, fetch_k)?;
        let fetched = hits.len();

        let compiled = filter.compile();
        let results: Vec<SearchResult> = hits
            .into_iter()
            .map(|hit| SearchResult {
                similarity: similarity_percent(hit.distance),
                distance: hit.distance,
                path: hit.id,
                metadata: hit.metadata,
            })
            .filter(|r| compiled.accepts(&r.path, &r.metadata, r.similarity))
            .take(top_k)
            .collect();

        log::debug!(
            "Query '{}': fetched {}, returning {} after filtering",
            query,
            fetched,
            results.len()
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmbeddingError;
    use crate::store::{MemoryStore, SampleRecord};

    /// Maps text to a fixed direction: "kick" → x axis, anything else → y axis
    struct AxisEncoder;

    impl AudioTextEncoder for AxisEncoder {
        fn model_name(&self) -> &str {
            "axis"
        }
        fn dimension(&self) -> usize {
            2
        }
        fn sample_rate(&self) -> u32 {
            8000
        }
        fn max_duration_secs(&self) -> f32 {
            10.0
        }
        fn embed_audio(&self, _samples: &[f32]) -> Result<Vec<f32>, EmbeddingError> {
            Err(EmbeddingError::EmptyInput)
        }
        fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(if text.contains("kick") { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
        }
    }

    fn engine_with(records: Vec<(&str, [f32; 2], f32)>) -> SearchEngine {
        let store = MemoryStore::new();
        let records: Vec<SampleRecord> = records
            .into_iter()
            .map(|(name, v, bpm)| {
                let metadata = SampleMetadata {
                    filename: name.to_string(),
                    bpm,
                    ..SampleMetadata::default()
                };
                SampleRecord::new(format!("/lib/{}", name), v.to_vec(), metadata)
            })
            .collect();
        store.add(&records).unwrap();
        SearchEngine::new(Arc::new(store), Arc::new(AxisEncoder))
    }

    fn angle(deg: f32) -> [f32; 2] {
        let r = deg.to_radians();
        [r.cos(), r.sin()]
    }

    #[test]
    fn test_similarity_percent() {
        assert_eq!(similarity_percent(0.0), 100.0);
        assert_eq!(similarity_percent(1.0), 50.0);
        assert_eq!(similarity_percent(2.0), 0.0);
        assert_eq!(similarity_percent(3.0), 0.0);
        assert_eq!(similarity_percent(-0.5), 100.0);
    }

    #[test]
    fn test_bands() {
        assert_eq!(SimilarityBand::from_percent(90.0), SimilarityBand::Excellent);
        assert_eq!(SimilarityBand::from_percent(70.0), SimilarityBand::Good);
        assert_eq!(SimilarityBand::from_percent(55.0), SimilarityBand::Fair);
        assert_eq!(SimilarityBand::from_percent(41.0), SimilarityBand::Weak);
        assert_eq!(SimilarityBand::from_percent(25.0), SimilarityBand::Poor);
        assert_eq!(SimilarityBand::from_percent(3.0), SimilarityBand::Unrelated);
    }

    #[test]
    fn test_top_k_and_order() {
        let records: Vec<(String, [f32; 2])> = (0..20)
            .map(|i| (format!("s{:02}.wav", i), angle(i as f32 * 9.0)))
            .collect();
        let engine = engine_with(records.iter().map(|(n, v)| (n.as_str(), *v, 0.0)).collect());

        let results = engine.search("kick", 5, &SearchFilter::default()).unwrap();
        assert_eq!(results.len(), 5);
        assert_eq!(results[0].metadata.filename, "s00.wav");
        assert!(results.windows(2).all(|w| w[0].similarity >= w[1].similarity));
        assert!((results[0].similarity - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_filter_applies_before_truncation() {
        let engine = engine_with(vec![
            ("a.wav", angle(0.0), 90.0),
            ("b.wav", angle(10.0), 0.0),
            ("c.wav", angle(20.0), 125.0),
            ("d.wav", angle(30.0), 90.0),
        ]);
        let filter = SearchFilter {
            min_bpm: 120.0,
            max_bpm: 130.0,
            ..SearchFilter::default()
        };
        let results = engine.search("kick", 2, &filter).unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.metadata.filename.as_str()).collect();
        assert_eq!(names, vec!["b.wav", "c.wav"]);
    }

    #[test]
    fn test_blank_query() {
        let engine = engine_with(vec![("a.wav", angle(0.0), 0.0)]);
        assert!(engine.search("   ", 5, &SearchFilter::default()).unwrap().is_empty());
        assert!(engine.search("kick", 0, &SearchFilter::default()).unwrap().is_empty());
    }
}
