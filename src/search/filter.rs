//! Compound post-filter for search hits
//!
//! Every criterion is optional and skipped at its no-op default. Criteria
//! are applied in this order: similarity range, include pattern, exclude
//! pattern, format, BPM range, key, duration range.

use std::path::Path;

use regex::{Regex, RegexBuilder};

use crate::io::probe_duration;
use crate::store::SampleMetadata;

/// Upper BPM bound that disables the BPM filter
pub const BPM_FILTER_MAX: f32 = 300.0;

/// Upper duration bound (seconds) that disables the duration filter
pub const DURATION_FILTER_MAX: f32 = 999.0;

/// User-facing filter settings
#[derive(Debug, Clone, PartialEq)]
pub struct SearchFilter {
    /// Minimum similarity percentage
    pub min_similarity: f32,
    /// Maximum similarity percentage
    pub max_similarity: f32,
    /// Case-insensitive regex the filename must match
    pub include: Option<String>,
    /// Case-insensitive regex the filename must not match
    pub exclude: Option<String>,
    /// File extension, without the dot
    pub format: Option<String>,
    /// Minimum BPM (records without tempo always pass)
    pub min_bpm: f32,
    /// Maximum BPM
    pub max_bpm: f32,
    /// Exact key label
    pub key: Option<String>,
    /// Minimum duration in seconds (unknown durations always pass)
    pub min_duration_secs: f32,
    /// Maximum duration in seconds
    pub max_duration_secs: f32,
}

impl Default for SearchFilter {
    fn default() -> Self {
        Self {
            min_similarity: 0.0,
            max_similarity: 100.0,
            include: None,
            exclude: None,
            format: None,
            min_bpm: 0.0,
            max_bpm: BPM_FILTER_MAX,
            key: None,
            min_duration_secs: 0.0,
            max_duration_secs: DURATION_FILTER_MAX,
        }
    }
}

impl SearchFilter {
    /// Whether the BPM range restricts anything
    pub fn bpm_active(&self) -> bool {
        self.min_bpm > 0.0 || self.max_bpm < BPM_FILTER_MAX
    }

    /// Whether the duration range restricts anything
    pub fn duration_active(&self) -> bool {
        self.min_duration_secs > 0.0 || self.max_duration_secs < DURATION_FILTER_MAX
    }

    /// Compile the patterns; an invalid pattern disables its criterion
    pub fn compile(&self) -> CompiledFilter<'_> {
        CompiledFilter {
            settings: self,
            include: compile_pattern(self.include.as_deref()),
            exclude: compile_pattern(self.exclude.as_deref()),
            format: self
                .format
                .as_deref()
                .map(|f| f.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|f| !f.is_empty()),
        }
    }
}

fn compile_pattern(pattern: Option<&str>) -> Option<Regex> {
    let pattern = pattern.map(str::trim).filter(|p| !p.is_empty())?;
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(regex) => Some(regex),
        Err(e) => {
            log::warn!("Ignoring invalid filename pattern '{}': {}", pattern, e);
            None
        }
    }
}

/// Filter with patterns compiled, ready to test hits
#[derive(Debug)]
pub struct CompiledFilter<'a> {
    settings: &'a SearchFilter,
    include: Option<Regex>,
    exclude: Option<Regex>,
    format: Option<String>,
}

impl CompiledFilter<'_> {
    /// Whether a hit passes every active criterion
    ///
    /// `path` is used to probe the duration when the record has none stored.
    pub fn accepts(&self, path: &str, metadata: &SampleMetadata, similarity: f32) -> bool {
        let s = self.settings;
        let filename = metadata.filename.as_str();

        if similarity < s.min_similarity || similarity > s.max_similarity {
            return false;
        }
        if self.include.as_ref().is_some_and(|re| !re.is_match(filename)) {
            return false;
        }
        if self.exclude.as_ref().is_some_and(|re| re.is_match(filename)) {
            return false;
        }
        if let Some(format) = &self.format {
            let ext = Path::new(filename)
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_default();
            if ext != *format {
                return false;
            }
        }
        if s.bpm_active() {
            if let Some(bpm) = metadata.bpm() {
                if bpm < s.min_bpm || bpm > s.max_bpm {
                    return false;
                }
            }
        }
        if let Some(key) = s.key.as_deref() {
            if metadata.key != key {
                return false;
            }
        }
        if s.duration_active() {
            let duration = metadata.duration_secs.or_else(|| probe_duration(Path::new(path)));
            if let Some(d) = duration {
                if d < s.min_duration_secs || d > s.max_duration_secs {
                    return false;
                }
            }
        }
        true
    }
}
