//! Integration tests for indexing, re-analysis and search
//!
//! Fixtures are synthetic WAV files written into a temp directory. A stub
//! encoder replaces the CLAP model and the in-memory store replaces SQLite
//! unless a test is about SQLite itself.

use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use cratedig::error::EmbeddingError;
use cratedig::store::QueryHit;
use cratedig::{
    AnalysisEngine, AnalysisResult, AudioTextEncoder, IndexSummary, Indexer, JobError, JobRunner,
    LibraryConfig, MemoryStore, NoProgress, ProfileEngine, ProgressObserver, ReanalysisMode,
    Reanalyzer, SampleMetadata, SampleRecord, SampleStore, SearchEngine, SearchFilter, SqliteStore,
    StoreError,
};
use tempfile::TempDir;

const STUB_RATE: u32 = 8000;

/// Write a mono 16-bit WAV
fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &s in samples {
        writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

fn tone(freqs: &[f32], secs: f32, sample_rate: u32) -> Vec<f32> {
    let n = (secs * sample_rate as f32) as usize;
    (0..n)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            freqs.iter().map(|f| 0.3 * (2.0 * PI * f * t).sin()).sum()
        })
        .collect()
}

/// Embeds audio by zero-crossing rate: low tones point along x, high tones along y.
/// Silent audio fails. Text containing "bright" maps to y, anything else to x.
struct ZeroCrossingEncoder;

impl AudioTextEncoder for ZeroCrossingEncoder {
    fn model_name(&self) -> &str {
        "zero-crossing"
    }
    fn dimension(&self) -> usize {
        4
    }
    fn sample_rate(&self) -> u32 {
        STUB_RATE
    }
    fn max_duration_secs(&self) -> f32 {
        10.0
    }
    fn embed_audio(&self, samples: &[f32]) -> Result<Vec<f32>, EmbeddingError> {
        if samples.iter().all(|s| s.abs() < 1e-6) {
            return Err(EmbeddingError::EmptyInput);
        }
        let crossings = samples
            .windows(2)
            .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
            .count();
        let rate = (crossings as f32 / samples.len() as f32 * 2.0).min(1.0);
        let mut v = vec![1.0 - rate, rate, 0.0, 0.0];
        cratedig::embedding::l2_normalize(&mut v);
        Ok(v)
    }
    fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(if text.contains("bright") {
            vec![0.0, 1.0, 0.0, 0.0]
        } else {
            vec![1.0, 0.0, 0.0, 0.0]
        })
    }
}

/// Engine returning a fixed result without decoding
struct FixedEngine {
    tag: &'static str,
    result: AnalysisResult,
}

impl AnalysisEngine for FixedEngine {
    fn tag(&self) -> &str {
        self.tag
    }
    fn estimate_tempo(&self, _samples: &[f32], _sample_rate: u32) -> Option<f32> {
        self.result.bpm
    }
    fn estimate_key(&self, _samples: &[f32], _sample_rate: u32) -> Option<String> {
        self.result.key.clone()
    }
    fn analyze_file(&self, _path: &Path) -> AnalysisResult {
        self.result.clone()
    }
}

fn fixed(tag: &'static str, bpm: Option<f32>, key: Option<&str>) -> Arc<FixedEngine> {
    Arc::new(FixedEngine {
        tag,
        result: AnalysisResult {
            bpm,
            key: key.map(str::to_string),
        },
    })
}

/// Memory store that records the size of every write
#[derive(Default)]
struct RecordingStore {
    inner: MemoryStore,
    adds: Mutex<Vec<usize>>,
    updates: Mutex<Vec<usize>>,
}

impl SampleStore for RecordingStore {
    fn get_all_ids(&self) -> Result<std::collections::HashSet<String>, StoreError> {
        self.inner.get_all_ids()
    }
    fn add(&self, records: &[SampleRecord]) -> Result<(), StoreError> {
        self.adds.lock().unwrap().push(records.len());
        self.inner.add(records)
    }
    fn update(&self, updates: &[(String, SampleMetadata)]) -> Result<(), StoreError> {
        self.updates.lock().unwrap().push(updates.len());
        self.inner.update(updates)
    }
    fn get_all(&self) -> Result<Vec<(String, SampleMetadata)>, StoreError> {
        self.inner.get_all()
    }
    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<QueryHit>, StoreError> {
        self.inner.query(embedding, k)
    }
    fn count(&self) -> Result<usize, StoreError> {
        self.inner.count()
    }
}

#[derive(Default)]
struct ProgressLog {
    percents: Mutex<Vec<u8>>,
}

impl ProgressObserver for ProgressLog {
    fn progress(&self, percent: u8) {
        self.percents.lock().unwrap().push(percent);
    }
    fn status(&self, _message: &str) {}
}

fn indexer(store: Arc<dyn SampleStore>, engine: Arc<dyn AnalysisEngine>) -> Indexer {
    Indexer::new(store, Arc::new(ZeroCrossingEncoder), engine, LibraryConfig::default())
}

fn write_library(dir: &Path, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let path = dir.join(format!("pack{}", i % 3)).join(format!("hit_{:03}.wav", i));
            write_wav(&path, &tone(&[200.0 + i as f32 * 10.0], 0.1, STUB_RATE), STUB_RATE);
            path
        })
        .collect()
}

#[test]
fn test_index_flushes_in_batches_of_50() {
    let dir = TempDir::new().unwrap();
    write_library(dir.path(), 127);

    let store = Arc::new(RecordingStore::default());
    let progress = ProgressLog::default();
    let summary = indexer(store.clone(), fixed("profile", Some(120.0), Some("A Min")))
        .index(dir.path(), &progress)
        .unwrap();

    assert_eq!(summary.discovered, 127);
    assert_eq!(summary.indexed, 127);
    assert_eq!(*store.adds.lock().unwrap(), vec![50, 50, 27]);
    assert_eq!(store.count().unwrap(), 127);

    let percents = progress.percents.lock().unwrap();
    assert_eq!(percents.len(), 127);
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(percents.last(), Some(&100));
}

#[test]
fn test_records_are_keyed_by_normalized_path() {
    let dir = TempDir::new().unwrap();
    let paths = write_library(dir.path(), 1);

    let store = Arc::new(MemoryStore::new());
    indexer(store.clone(), fixed("profile", None, Some("C Maj")))
        .index(&dir.path().join("pack0").join(".."), &NoProgress)
        .unwrap();

    let id = cratedig::indexer::normalize_path(&paths[0]);
    let record = store.get(&id).unwrap().expect("record keyed by normalized path");
    assert_eq!(record.document, id);
    assert!(!record.id.contains(".."));
    assert_eq!(record.metadata.filename, "hit_000.wav");
    assert_eq!(record.metadata.bpm, 0.0);
    assert_eq!(record.metadata.key, "C Maj");
    assert_eq!(record.metadata.analysis_engine, "profile");
    assert!(record.metadata.duration_secs.is_some());
    assert_eq!(record.embedding.len(), 4);
}

#[test]
fn test_reindex_is_idempotent() {
    let dir = TempDir::new().unwrap();
    write_library(dir.path(), 12);

    let store = Arc::new(RecordingStore::default());
    let idx = indexer(store.clone(), fixed("profile", Some(98.0), None));
    assert_eq!(idx.index(dir.path(), &NoProgress).unwrap().indexed, 12);
    let before: Vec<_> = store
        .get_all_ids()
        .unwrap()
        .into_iter()
        .map(|id| store.inner.get(&id).unwrap())
        .collect();

    let progress = ProgressLog::default();
    let second = idx.index(dir.path(), &progress).unwrap();
    // Nothing to do still reports a finished job
    assert_eq!(*progress.percents.lock().unwrap(), vec![100]);
    assert_eq!(
        second,
        IndexSummary {
            discovered: 12,
            skipped_duplicate: 12,
            ..IndexSummary::default()
        }
    );
    assert_eq!(store.adds.lock().unwrap().len(), 1);
    for record in before {
        let record = record.unwrap();
        assert_eq!(store.inner.get(&record.id).unwrap(), Some(record));
    }
}

#[test]
fn test_new_files_only_on_second_run() {
    let dir = TempDir::new().unwrap();
    write_library(dir.path(), 3);
    let store = Arc::new(MemoryStore::new());
    let idx = indexer(store.clone(), fixed("profile", None, None));
    idx.index(dir.path(), &NoProgress).unwrap();

    write_wav(&dir.path().join("late.wav"), &tone(&[440.0], 0.2, STUB_RATE), STUB_RATE);
    let summary = idx.index(dir.path(), &NoProgress).unwrap();
    assert_eq!(summary.indexed, 1);
    assert_eq!(summary.skipped_duplicate, 3);
    assert_eq!(store.count().unwrap(), 4);
}

#[test]
fn test_skips_files_over_duration_ceiling() {
    let dir = TempDir::new().unwrap();
    write_wav(&dir.path().join("long.wav"), &tone(&[300.0], 11.0, STUB_RATE), STUB_RATE);
    write_wav(&dir.path().join("short.wav"), &tone(&[300.0], 2.0, STUB_RATE), STUB_RATE);
    write_wav(&dir.path().join("empty.wav"), &[], STUB_RATE);

    let store = Arc::new(MemoryStore::new());
    let summary = indexer(store.clone(), fixed("profile", None, None))
        .index(dir.path(), &NoProgress)
        .unwrap();

    assert_eq!(summary.discovered, 3);
    assert_eq!(summary.skipped_duration, 2);
    assert_eq!(summary.indexed, 1);
    let ids = store.get_all_ids().unwrap();
    assert!(ids.iter().all(|id| id.ends_with("short.wav")));
}

#[test]
fn test_unknown_duration_is_not_filtered_and_failures_are_skipped() {
    let dir = TempDir::new().unwrap();
    // Not decodable: duration unknown, then embedding fails
    std::fs::write(dir.path().join("broken.mp3"), b"definitely not audio").unwrap();
    // Decodable but silent: the encoder rejects it
    write_wav(&dir.path().join("silence.wav"), &vec![0.0; 4000], STUB_RATE);
    write_wav(&dir.path().join("tone.wav"), &tone(&[500.0], 0.5, STUB_RATE), STUB_RATE);

    let store = Arc::new(MemoryStore::new());
    let progress = ProgressLog::default();
    let summary = indexer(store.clone(), fixed("profile", None, None))
        .index(dir.path(), &progress)
        .unwrap();

    assert_eq!(summary.skipped_duration, 0);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.indexed, 1);
    assert_eq!(store.count().unwrap(), 1);
    // Progress is reported for failed files too
    assert_eq!(*progress.percents.lock().unwrap(), vec![33, 67, 100]);
}

#[test]
fn test_missing_directory_is_an_error() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let result = indexer(store, fixed("profile", None, None)).index(&dir.path().join("nope"), &NoProgress);
    assert!(result.is_err());
}

#[test]
fn test_upgrade_reanalysis_merges_and_stamps() {
    let dir = TempDir::new().unwrap();
    write_library(dir.path(), 60);

    let store = Arc::new(RecordingStore::default());
    indexer(store.clone(), fixed("profile", None, Some("C Maj")))
        .index(dir.path(), &NoProgress)
        .unwrap();

    let mode = ReanalysisMode::Upgrade {
        replaces: "profile".into(),
    };
    let reanalyzer = Reanalyzer::new(store.clone(), fixed("spectral", Some(128.0), None), 50);
    assert_eq!(reanalyzer.run(&mode, false, &NoProgress).unwrap(), 60);
    assert_eq!(*store.updates.lock().unwrap(), vec![50, 10]);

    for (_, meta) in store.get_all().unwrap() {
        assert_eq!(meta.bpm, 128.0);
        assert_eq!(meta.key, "C Maj");
        assert_eq!(meta.analysis_engine, "spectral");
    }

    // Everything is complete and upgraded now
    assert_eq!(reanalyzer.run(&mode, false, &NoProgress).unwrap(), 0);
    assert_eq!(reanalyzer.run(&mode, true, &NoProgress).unwrap(), 60);
}

#[test]
fn test_refresh_leaves_fields_when_nothing_detected() {
    let dir = TempDir::new().unwrap();
    write_library(dir.path(), 4);
    let store = Arc::new(MemoryStore::new());
    indexer(store.clone(), fixed("profile", Some(100.0), None))
        .index(dir.path(), &NoProgress)
        .unwrap();

    let reanalyzer = Reanalyzer::new(store.clone(), fixed("profile", None, None), 50);
    assert_eq!(reanalyzer.run(&ReanalysisMode::Refresh, false, &NoProgress).unwrap(), 0);
    assert!(store.get_all().unwrap().iter().all(|(_, m)| m.bpm == 100.0 && m.key.is_empty()));
}

#[test]
fn test_search_ranks_and_filters() {
    let dir = TempDir::new().unwrap();
    write_wav(&dir.path().join("deep_kick.wav"), &tone(&[60.0], 0.5, STUB_RATE), STUB_RATE);
    write_wav(&dir.path().join("bright_hat.wav"), &tone(&[1900.0], 0.5, STUB_RATE), STUB_RATE);
    write_wav(&dir.path().join("mid_snare.wav"), &tone(&[900.0], 0.5, STUB_RATE), STUB_RATE);

    let store = Arc::new(MemoryStore::new());
    indexer(store.clone(), fixed("profile", Some(90.0), Some("A Min")))
        .index(dir.path(), &NoProgress)
        .unwrap();

    let search = SearchEngine::new(store.clone(), Arc::new(ZeroCrossingEncoder));
    let results = search.search("bright shimmer", 5, &SearchFilter::default()).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].metadata.filename, "bright_hat.wav");
    assert_eq!(results[2].metadata.filename, "deep_kick.wav");
    assert!(results.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    assert!(results.iter().all(|r| (0.0..=100.0).contains(&r.similarity)));

    let top1 = search.search("bright shimmer", 1, &SearchFilter::default()).unwrap();
    assert_eq!(top1.len(), 1);

    // Tempo 90 is outside 120-130
    let filter = SearchFilter {
        min_bpm: 120.0,
        max_bpm: 130.0,
        ..SearchFilter::default()
    };
    assert!(search.search("bright shimmer", 5, &filter).unwrap().is_empty());

    let filter = SearchFilter {
        exclude: Some("HAT".into()),
        key: Some("A Min".into()),
        max_duration_secs: 1.0,
        ..SearchFilter::default()
    };
    let names: Vec<String> = search
        .search("bright shimmer", 5, &filter)
        .unwrap()
        .into_iter()
        .map(|r| r.metadata.filename)
        .collect();
    assert_eq!(names, vec!["mid_snare.wav", "deep_kick.wav"]);
}

#[test]
fn test_sqlite_store_end_to_end() {
    let dir = TempDir::new().unwrap();
    let library = dir.path().join("library");
    write_library(&library, 5);
    let db = dir.path().join("db").join("samples.db");

    assert!(matches!(SqliteStore::open(&db, "samples"), Err(StoreError::NotFound(_))));

    {
        let store = Arc::new(SqliteStore::create(&db, "samples").unwrap());
        let summary = indexer(store, fixed("profile", Some(120.0), Some("D Min")))
            .index(&library, &NoProgress)
            .unwrap();
        assert_eq!(summary.indexed, 5);
    }

    let store = Arc::new(SqliteStore::open(&db, "samples").unwrap());
    assert_eq!(store.count().unwrap(), 5);
    let again = indexer(store.clone(), fixed("profile", None, None))
        .index(&library, &NoProgress)
        .unwrap();
    assert_eq!(again.indexed, 0);

    let search = SearchEngine::new(store, Arc::new(ZeroCrossingEncoder));
    let results = search.search("low thump", 3, &SearchFilter::default()).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].metadata.key, "D Min");
}

#[test]
fn test_profile_engine_on_wav_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("c_major_pad.wav");
    // C4 E4 G4 at 44.1 kHz, resampled by the engine
    write_wav(&path, &tone(&[261.63, 329.63, 392.0], 3.0, 44100), 44100);

    let result = ProfileEngine::default().analyze_file(&path);
    assert_eq!(result.key.as_deref(), Some("C Maj"));
    if let Some(bpm) = result.bpm {
        assert!((40.0..=200.0).contains(&bpm));
    }

    let missing = ProfileEngine::default().analyze_file(&dir.path().join("missing.wav"));
    assert_eq!(missing, AnalysisResult::default());
}

#[test]
fn test_indexing_runs_as_single_job() {
    let dir = TempDir::new().unwrap();
    write_library(dir.path(), 6);

    let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
    let store = Arc::new(MemoryStore::new());
    let idx = indexer(store.clone(), fixed("profile", None, None));
    let root = dir.path().to_path_buf();

    let runner = JobRunner::new();
    let handle = runner
        .spawn("index", Arc::new(NoProgress), move |progress| {
            gate_rx.recv().ok();
            idx.index(&root, progress)
        })
        .unwrap();

    let reanalyzer = Reanalyzer::new(store.clone(), fixed("spectral", None, None), 50);
    let rejected = runner.spawn("reanalyze", Arc::new(NoProgress), move |progress| {
        reanalyzer.run(&ReanalysisMode::Refresh, false, progress)
    });
    assert!(matches!(rejected, Err(JobError::Busy(ref name)) if name == "index"));

    gate_tx.send(()).unwrap();
    assert_eq!(handle.join().unwrap().indexed, 6);
    assert_eq!(store.count().unwrap(), 6);
}
