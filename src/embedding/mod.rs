//! Joint audio-text embeddings
//!
//! An [`AudioTextEncoder`] maps audio and text into one vector space so a text
//! query can be compared with indexed samples. [`ClapEncoder`] runs a
//! contrastive language-audio (CLAP) model exported to ONNX; tests and tools
//! can supply any other implementation.

pub mod clap;
pub mod mel;

use std::path::Path;

pub use clap::ClapEncoder;
pub use mel::LogMelFrontend;

use crate::error::EmbeddingError;
use crate::io::load_mono;

const EPSILON: f32 = 1e-12;

/// Audio and text encoder sharing one embedding space
pub trait AudioTextEncoder: Send + Sync {
    /// Identifier of the model, for logs
    fn model_name(&self) -> &str;

    /// Length of every embedding vector
    fn dimension(&self) -> usize;

    /// Sample rate `embed_audio` expects
    fn sample_rate(&self) -> u32;

    /// Audio beyond this duration is ignored
    fn max_duration_secs(&self) -> f32;

    /// Embed mono audio at [`sample_rate`](Self::sample_rate)
    fn embed_audio(&self, samples: &[f32]) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a text query
    fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Decode a file and embed it
///
/// Decoding and inference failures are logged and return `None`, so a caller
/// can skip the file.
pub fn embed_file(encoder: &dyn AudioTextEncoder, path: &Path) -> Option<Vec<f32>> {
    let samples = match load_mono(path, encoder.sample_rate(), encoder.max_duration_secs()) {
        Ok(samples) => samples,
        Err(e) => {
            log::warn!("Cannot decode {} for embedding: {}", path.display(), e);
            return None;
        }
    };

    match encoder.embed_audio(&samples) {
        Ok(embedding) if embedding.len() == encoder.dimension() => Some(embedding),
        Ok(embedding) => {
            log::warn!(
                "{} returned {} values for {}, expected {}",
                encoder.model_name(),
                embedding.len(),
                path.display(),
                encoder.dimension()
            );
            None
        }
        Err(e) => {
            log::warn!("Embedding failed for {}: {}", path.display(), e);
            None
        }
    }
}

/// Scale a vector to unit length in place (zero vectors are left unchanged)
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}
