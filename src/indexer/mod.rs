//! Incremental indexer
//!
//! Builds the sample store from a directory tree:
//!
//! 1. Load the ids already in the store
//! 2. Walk the tree for supported extensions and normalize each path
//! 3. Skip ids already present (exact normalized path match)
//! 4. Skip files whose probed duration is above the ceiling or not positive;
//!    files of unknown duration are kept
//! 5. Embed each candidate; a failed embedding skips the file
//! 6. Analyze tempo and key with the configured engine
//! 7. Buffer records and write them every `write_batch_size` records, plus
//!    once for the remainder
//!
//! Per-file failures are logged and counted, never returned. Store failures
//! abort the job. Re-running over an indexed tree writes nothing.
//!
//! [`Reanalyzer`] updates tempo and key of existing records in place.

pub mod batch;
pub mod reanalyze;
pub mod walk;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use batch::PendingBatch;
pub use reanalyze::{ReanalysisMode, Reanalyzer};
pub use walk::{discover_audio_files, normalize_path};

use crate::config::LibraryConfig;
use crate::embedding::{embed_file, AudioTextEncoder};
use crate::engine::AnalysisEngine;
use crate::error::IndexError;
use crate::io::probe_duration;
use crate::job::{percent_of, ProgressObserver};
use crate::store::{SampleMetadata, SampleRecord, SampleStore};

/// Per-file outcome counts of one indexing run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSummary {
    /// Supported files found by the walk
    pub discovered: usize,
    /// New records written
    pub indexed: usize,
    /// Already in the store
    pub skipped_duplicate: usize,
    /// Probed duration above the ceiling or not positive
    pub skipped_duration: usize,
    /// Embedding failed
    pub failed: usize,
}

struct Candidate {
    path: PathBuf,
    id: String,
    duration_secs: Option<f32>,
}

/// Adds new files to a sample store
#[derive(Clone)]
pub struct Indexer {
    store: Arc<dyn SampleStore>,
    encoder: Arc<dyn AudioTextEncoder>,
    engine: Arc<dyn AnalysisEngine>,
    config: LibraryConfig,
}

impl Indexer {
    /// Indexer writing to `store`, tagging records with `engine`
    pub fn new(
        store: Arc<dyn SampleStore>,
        encoder: Arc<dyn AudioTextEncoder>,
        engine: Arc<dyn AnalysisEngine>,
        config: LibraryConfig,
    ) -> Self {
        Self {
            store,
            encoder,
            engine,
            config,
        }
    }

    /// Index every new supported file under `dir`
    ///
    /// # Returns
    ///
    /// Outcome counts; `indexed` is the number of records written
    ///
    /// # Errors
    ///
    /// `IndexError::Store` on any store failure, `IndexError::WalkDir` if
    /// `dir` cannot be read
    pub fn index(&self, dir: &Path, progress: &dyn ProgressObserver) -> Result<IndexSummary, IndexError> {
        log::info!("Scanning {}", dir.display());
        progress.status(&format!("Scanning {}...", dir.display()));

        let existing = self.store.get_all_ids()?;
        let files = discover_audio_files(dir, &self.config)?;
        let mut summary = IndexSummary {
            discovered: files.len(),
            ..IndexSummary::default()
        };

        let candidates = self.select_candidates(files, existing, &mut summary);
        let total = candidates.len();
        log::info!(
            "Found {} new files ({} already indexed, {} outside duration limit)",
            total,
            summary.skipped_duplicate,
            summary.skipped_duration
        );
        progress.status(&format!("Found {} files. Indexing...", total));

        let mut pending = PendingBatch::new(self.config.write_batch_size);
        for (i, candidate) in candidates.into_iter().enumerate() {
            if let Some(record) = self.build_record(candidate) {
                if let Some(batch) = pending.push(record) {
                    self.flush(&batch)?;
                }
                summary.indexed += 1;
            } else {
                summary.failed += 1;
            }
            progress.progress(percent_of(i + 1, total));
        }
        if let Some(batch) = pending.finish() {
            self.flush(&batch)?;
        }
        if total == 0 {
            progress.progress(100);
        }

        log::info!(
            "Indexing complete: {} indexed, {} failed",
            summary.indexed,
            summary.failed
        );
        progress.status(&format!("Indexed {} new samples", summary.indexed));
        Ok(summary)
    }

    fn select_candidates(
        &self,
        files: Vec<PathBuf>,
        mut existing: HashSet<String>,
        summary: &mut IndexSummary,
    ) -> Vec<Candidate> {
        let ceiling = self.config.max_sample_duration_secs;
        let mut candidates = Vec::new();

        for path in files {
            let id = normalize_path(&path);
            // Inserting also catches the same file reached twice through links
            if !existing.insert(id.clone()) {
                summary.skipped_duplicate += 1;
                continue;
            }

            let duration_secs = probe_duration(&path);
            match duration_secs {
                Some(d) if d > ceiling || d <= 0.0 => {
                    log::debug!("Skipping {} ({:.2}s)", path.display(), d);
                    summary.skipped_duration += 1;
                    continue;
                }
                None => log::debug!("Unknown duration for {}, keeping it", path.display()),
                Some(_) => {}
            }

            candidates.push(Candidate {
                path,
                id,
                duration_secs,
            });
        }
        candidates
    }

    fn build_record(&self, candidate: Candidate) -> Option<SampleRecord> {
        let embedding = embed_file(self.encoder.as_ref(), &candidate.path)?;
        let analysis = self.engine.analyze_file(&candidate.path);

        let filename = candidate
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut metadata = SampleMetadata::from_analysis(filename, &analysis, self.engine.tag());
        metadata.duration_secs = candidate.duration_secs;

        Some(SampleRecord::new(candidate.id, embedding, metadata))
    }

    fn flush(&self, batch: &[SampleRecord]) -> Result<(), IndexError> {
        log::info!("Writing batch of {} samples", batch.len());
        self.store.add(batch)?;
        Ok(())
    }
}
