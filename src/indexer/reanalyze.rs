//! In-place re-analysis of indexed samples

use std::path::Path;
use std::sync::Arc;

use super::PendingBatch;
use crate::engine::AnalysisEngine;
use crate::error::IndexError;
use crate::job::{percent_of, ProgressObserver};
use crate::store::{SampleMetadata, SampleStore};

/// Which records a re-analysis touches (when not forced)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReanalysisMode {
    /// Records missing tempo or key
    Refresh,
    /// Records missing tempo or key, or tagged with the engine being replaced
    Upgrade {
        /// Tag of the lower-accuracy engine
        replaces: String,
    },
}

impl ReanalysisMode {
    /// Whether `metadata` needs re-analysis
    pub fn selects(&self, metadata: &SampleMetadata, force: bool) -> bool {
        if force || metadata.bpm().is_none() || metadata.key().is_none() {
            return true;
        }
        match self {
            ReanalysisMode::Refresh => false,
            ReanalysisMode::Upgrade { replaces } => metadata.analysis_engine == *replaces,
        }
    }
}

/// Recomputes tempo and key of existing records
#[derive(Clone)]
pub struct Reanalyzer {
    store: Arc<dyn SampleStore>,
    engine: Arc<dyn AnalysisEngine>,
    batch_size: usize,
}

impl Reanalyzer {
    /// Re-analyzer writing `engine` results back in batches of `batch_size`
    pub fn new(store: Arc<dyn SampleStore>, engine: Arc<dyn AnalysisEngine>, batch_size: usize) -> Self {
        Self {
            store,
            engine,
            batch_size,
        }
    }

    /// Re-analyze the selected records
    ///
    /// Detected values overwrite the stored ones; undetected values leave
    /// them untouched. Every analyzed record is stamped with the engine tag,
    /// but only records where something was detected (or all, when forced)
    /// are written back.
    ///
    /// # Returns
    ///
    /// Number of records written back
    ///
    /// # Errors
    ///
    /// `IndexError::Store` on any store failure
    pub fn run(
        &self,
        mode: &ReanalysisMode,
        force: bool,
        progress: &dyn ProgressObserver,
    ) -> Result<usize, IndexError> {
        let selected: Vec<(String, SampleMetadata)> = self
            .store
            .get_all()?
            .into_iter()
            .filter(|(_, meta)| mode.selects(meta, force))
            .collect();

        let total = selected.len();
        log::info!(
            "Re-analyzing {} samples with the {} engine{}",
            total,
            self.engine.tag(),
            if force { " (forced)" } else { "" }
        );
        progress.status(&format!("Analyzing {} samples with {}...", total, self.engine.tag()));
        if total == 0 {
            progress.progress(100);
            return Ok(0);
        }

        let mut updated = 0;
        let mut pending = PendingBatch::new(self.batch_size);
        for (i, (id, mut metadata)) in selected.into_iter().enumerate() {
            let result = self.engine.analyze_file(Path::new(&id));
            if metadata.merge(&result, self.engine.tag()) || force {
                updated += 1;
                if let Some(batch) = pending.push((id, metadata)) {
                    self.store.update(&batch)?;
                }
            } else {
                log::debug!("Nothing detected for {}", id);
            }
            progress.progress(percent_of(i + 1, total));
        }
        if let Some(batch) = pending.finish() {
            self.store.update(&batch)?;
        }

        log::info!("Re-analysis complete: {} samples updated", updated);
        progress.status(&format!("Analysis complete! Updated {} samples.", updated));
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(bpm: f32, key: &str, engine: &str) -> SampleMetadata {
        SampleMetadata {
            filename: "a.wav".into(),
            bpm,
            key: key.into(),
            analysis_engine: engine.into(),
            duration_secs: None,
        }
    }

    #[test]
    fn test_refresh_selects_missing_fields() {
        let mode = ReanalysisMode::Refresh;
        assert!(mode.selects(&meta(0.0, "A min", "profile"), false));
        assert!(mode.selects(&meta(120.0, "", "profile"), false));
        assert!(!mode.selects(&meta(120.0, "A min", "profile"), false));
        assert!(mode.selects(&meta(120.0, "A min", "profile"), true));
    }

    #[test]
    fn test_upgrade_selects_replaced_engine() {
        let mode = ReanalysisMode::Upgrade {
            replaces: "profile".into(),
        };
        assert!(mode.selects(&meta(120.0, "A Min", "profile"), false));
        assert!(!mode.selects(&meta(120.0, "A min", "spectral"), false));
        assert!(mode.selects(&meta(0.0, "A min", "spectral"), false));
    }
}
