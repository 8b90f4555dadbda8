//! Error types for analysis, embedding, storage, indexing and job control
//!
//! DSP errors (`AnalysisError`) never leave an estimator: the engines turn them
//! into a `None` field. Store errors are the only ones that abort a whole
//! indexing or search operation.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the signal-processing stages
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    /// Invalid input parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Audio decoding error
    #[error("Decoding error: {0}")]
    DecodingError(String),

    /// Processing error during analysis
    #[error("Processing error: {0}")]
    ProcessingError(String),

    /// Numerical error (NaN, empty spectrum, etc.)
    #[error("Numerical error: {0}")]
    NumericalError(String),
}

/// Errors raised by the persistent sample store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store does not exist at the given location
    #[error("sample store not found at {0}")]
    NotFound(PathBuf),

    /// The store exists but could not be opened
    #[error("failed to open sample store at {path}: {source}")]
    Open {
        /// Location of the store
        path: PathBuf,
        /// Underlying SQLite error
        #[source]
        source: rusqlite::Error,
    },

    /// Query or write failure
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Embedding dimension differs from the one already stored
    #[error("embedding dimension mismatch: store holds {expected}, got {found}")]
    DimensionMismatch {
        /// Dimension already fixed by the collection
        expected: usize,
        /// Dimension of the offending vector
        found: usize,
    },

    /// Stored data could not be decoded
    #[error("corrupt store data: {0}")]
    Corrupt(String),

    /// The store directory could not be created
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A thread panicked while holding the store lock
    #[error("sample store lock poisoned")]
    Poisoned,
}

/// Errors raised by the embedding model
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Model or tokenizer files could not be loaded
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Text could not be tokenized
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// Inference failed or produced an unusable tensor
    #[error("inference error: {0}")]
    Inference(String),

    /// Audio could not be decoded or resampled
    #[error(transparent)]
    Audio(#[from] AnalysisError),

    /// Nothing to encode
    #[error("empty input")]
    EmptyInput,
}

/// Errors that abort an indexing or re-analysis job
#[derive(Debug, Error)]
pub enum IndexError {
    /// Store failure (fatal for the whole job)
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Directory walk failed at the root
    #[error("directory walk failed: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a search request
#[derive(Debug, Error)]
pub enum SearchError {
    /// Store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The query text could not be embedded
    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
}

/// Errors raised by the background job runner
#[derive(Debug, Error)]
pub enum JobError {
    /// Another job is still running
    #[error("a job is already running: {0}")]
    Busy(String),

    /// The worker thread panicked
    #[error("job worker panicked: {0}")]
    WorkerPanicked(String),

    /// The job itself failed
    #[error(transparent)]
    Index(#[from] IndexError),
}
