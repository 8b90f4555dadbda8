//! # cratedig
//!
//! Search a personal library of short audio samples by text description and
//! by musical attributes.
//!
//! ## Features
//!
//! - **Tempo**: onset-envelope autocorrelation on the percussive part, or
//!   multi-feature novelty with autocorrelation and comb filterbank voting,
//!   both with octave correction toward 120 BPM
//! - **Key**: CQT chroma with Krumhansl-Schmuckler profiles, or 36-bin HPCP
//!   with EDMA profiles
//! - **Embeddings**: CLAP audio and text towers on ONNX Runtime
//! - **Indexing**: incremental, deduplicated by path, batched writes to SQLite
//! - **Search**: nearest neighbors of the query embedding plus a compound
//!   filter on similarity, filename, format, BPM, key and duration
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use cratedig::{
//!     ClapEncoder, Indexer, LibraryConfig, NoProgress, ProfileEngine, SearchEngine,
//!     SearchFilter, SqliteStore,
//! };
//!
//! let config = LibraryConfig::default();
//! let store = Arc::new(SqliteStore::create(&config.store_path, &config.collection)?);
//! let encoder = Arc::new(ClapEncoder::load(&config.model_dir, config.embedding.clone())?);
//! let engine = Arc::new(ProfileEngine::new(config.analysis.clone()));
//!
//! let indexer = Indexer::new(store.clone(), encoder.clone(), engine, config);
//! let summary = indexer.index("samples/".as_ref(), &NoProgress)?;
//! println!("Indexed {} new samples", summary.indexed);
//!
//! let search = SearchEngine::new(store, encoder);
//! for hit in search.search("dusty vinyl kick", 10, &SearchFilter::default())? {
//!     println!("{:5.1}%  {}", hit.similarity, hit.metadata.filename);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Indexer → (Duration Prober, Embedding Extractor, Analysis Engine) → Sample Store
//! Query → Embedding Extractor → Sample Store nearest neighbors → Filter → Ranked results
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod features;
pub mod indexer;
pub mod io;
pub mod job;
pub mod preprocessing;
pub mod search;
pub mod store;

// Re-export main types
pub use analysis::{AnalysisResult, Key, KEY_NAMES, SPECTRAL_KEY_NAMES};
pub use config::{AnalysisConfig, EmbeddingConfig, LibraryConfig, SUPPORTED_FORMATS};
pub use embedding::{AudioTextEncoder, ClapEncoder};
pub use engine::{AnalysisEngine, ExternalEngine, ProfileEngine, SpectralEngine};
pub use error::{AnalysisError, EmbeddingError, IndexError, JobError, SearchError, StoreError};
pub use indexer::{IndexSummary, Indexer, ReanalysisMode, Reanalyzer};
pub use io::probe_duration;
pub use job::{JobRunner, NoProgress, ProgressObserver};
pub use search::{SearchEngine, SearchFilter, SearchResult, SimilarityBand};
pub use store::{MemoryStore, SampleMetadata, SampleRecord, SampleStore, SqliteStore};
