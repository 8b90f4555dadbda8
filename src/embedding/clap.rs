//! CLAP encoder on ONNX Runtime
//!
//! Expects a model directory holding separately exported audio and text
//! towers plus the tokenizer of the text tower:
//!
//! ```text
//! model_dir/
//!   audio_model.onnx   input [1, 1, frames, n_mels] log-mel, output [1, dim]
//!   text_model.onnx    inputs input_ids / attention_mask [1, tokens], output [1, dim]
//!   tokenizer.json
//! ```
//!
//! File names, tensor names and the front-end parameters come from
//! [`EmbeddingConfig`]. Both towers are L2-normalized so cosine distance
//! between an audio and a text vector is meaningful.

use std::path::Path;
use std::sync::Mutex;

use ndarray::{Array2, Array4};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::{l2_normalize, AudioTextEncoder, LogMelFrontend};
use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;

const INPUT_IDS: &str = "input_ids";
const ATTENTION_MASK: &str = "attention_mask";

/// Contrastive language-audio encoder
pub struct ClapEncoder {
    name: String,
    config: EmbeddingConfig,
    frontend: LogMelFrontend,
    // `Session::run` takes `&mut self`
    audio: Mutex<Session>,
    text: Mutex<Session>,
    tokenizer: Tokenizer,
}

fn load_session(path: &Path, intra_threads: usize) -> Result<Session, EmbeddingError> {
    if !path.is_file() {
        return Err(EmbeddingError::ModelLoad(format!("{} not found", path.display())));
    }
    Session::builder()
        .and_then(|b| b.with_intra_threads(intra_threads))
        .and_then(|b| b.commit_from_file(path))
        .map_err(|e| EmbeddingError::ModelLoad(format!("{}: {}", path.display(), e)))
}

impl ClapEncoder {
    /// Load both towers and the tokenizer from `model_dir`
    ///
    /// # Errors
    ///
    /// Returns `EmbeddingError::ModelLoad` if a file is missing or ONNX Runtime
    /// rejects it
    pub fn load(model_dir: &Path, config: EmbeddingConfig) -> Result<Self, EmbeddingError> {
        log::info!("Loading CLAP model from {}", model_dir.display());

        let audio = load_session(&model_dir.join(&config.audio_model_file), config.intra_threads)?;
        let text = load_session(&model_dir.join(&config.text_model_file), config.intra_threads)?;
        let tokenizer_path = model_dir.join(&config.tokenizer_file);
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbeddingError::ModelLoad(format!("{}: {}", tokenizer_path.display(), e)))?;

        let name = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "clap".to_string());

        Ok(Self {
            name,
            frontend: LogMelFrontend::new(&config),
            config,
            audio: Mutex::new(audio),
            text: Mutex::new(text),
            tokenizer,
        })
    }

    /// First `dimension` values of the first output, unit length
    fn finish(&self, mut values: Vec<f32>) -> Result<Vec<f32>, EmbeddingError> {
        if values.len() < self.config.dimension {
            return Err(EmbeddingError::Inference(format!(
                "model output has {} values, expected {}",
                values.len(),
                self.config.dimension
            )));
        }
        values.truncate(self.config.dimension);
        l2_normalize(&mut values);
        Ok(values)
    }
}

impl AudioTextEncoder for ClapEncoder {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn max_duration_secs(&self) -> f32 {
        self.config.max_duration_secs
    }

    fn embed_audio(&self, samples: &[f32]) -> Result<Vec<f32>, EmbeddingError> {
        if samples.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let mel = self.frontend.compute(samples)?;
        let (frames, n_mels) = (self.frontend.n_frames(), self.frontend.n_mels());
        let mut input = Array4::<f32>::zeros((1, 1, frames, n_mels));
        for (t, frame) in mel.iter().enumerate() {
            for (m, &value) in frame.iter().enumerate() {
                input[[0, 0, t, m]] = value;
            }
        }

        let tensor = Tensor::from_array(input)
            .map_err(|e| EmbeddingError::Inference(format!("audio tensor: {}", e)))?;

        let values = {
            let mut session = self
                .audio
                .lock()
                .map_err(|_| EmbeddingError::Inference("audio session poisoned".to_string()))?;
            let outputs = session
                .run(ort::inputs![self.config.audio_input_name.as_str() => tensor])
                .map_err(|e| EmbeddingError::Inference(format!("audio tower: {}", e)))?;
            let (_, value) = outputs
                .iter()
                .next()
                .ok_or_else(|| EmbeddingError::Inference("audio tower produced no output".to_string()))?;
            let (_shape, data) = value
                .try_extract_tensor::<f32>()
                .map_err(|e| EmbeddingError::Inference(format!("audio output: {}", e)))?;
            data.to_vec()
        };

        self.finish(values)
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;
        let len = encoding.get_ids().len().min(self.config.max_text_tokens);
        if len == 0 {
            return Err(EmbeddingError::EmptyInput);
        }

        let ids: Vec<i64> = encoding.get_ids()[..len].iter().map(|&id| id as i64).collect();
        let mask: Vec<i64> = encoding.get_attention_mask()[..len]
            .iter()
            .map(|&m| m as i64)
            .collect();

        let shape_err = |e: ndarray::ShapeError| EmbeddingError::Inference(format!("text input shape: {}", e));
        let ids = Array2::from_shape_vec((1, len), ids).map_err(shape_err)?;
        let mask = Array2::from_shape_vec((1, len), mask).map_err(shape_err)?;

        let ids = Tensor::from_array(ids)
            .map_err(|e| EmbeddingError::Inference(format!("text tensor: {}", e)))?;
        let mask = Tensor::from_array(mask)
            .map_err(|e| EmbeddingError::Inference(format!("text tensor: {}", e)))?;

        let values = {
            let mut session = self
                .text
                .lock()
                .map_err(|_| EmbeddingError::Inference("text session poisoned".to_string()))?;
            let outputs = session
                .run(ort::inputs![INPUT_IDS => ids, ATTENTION_MASK => mask])
                .map_err(|e| EmbeddingError::Inference(format!("text tower: {}", e)))?;
            let (_, value) = outputs
                .iter()
                .next()
                .ok_or_else(|| EmbeddingError::Inference("text tower produced no output".to_string()))?;
            let (_shape, data) = value
                .try_extract_tensor::<f32>()
                .map_err(|e| EmbeddingError::Inference(format!("text output: {}", e)))?;
            data.to_vec()
        };

        log::debug!("Embedded query of {} tokens", len);
        self.finish(values)
    }
}
