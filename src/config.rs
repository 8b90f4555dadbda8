//! Configuration parameters for the library, the analysis engines and the embedding model
//!
//! Every component receives its configuration explicitly at construction time.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Audio file extensions accepted by the indexer (lower case, no dot)
pub const SUPPORTED_FORMATS: [&str; 9] = [
    "wav", "mp3", "aif", "aiff", "flac", "ogg", "opus", "m4a", "aac",
];

/// Top-level library configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// SQLite database file holding the sample records (default: ./sample_db/samples.db)
    pub store_path: PathBuf,

    /// Collection name inside the store (default: "samples_library")
    pub collection: String,

    /// Directory holding the ONNX models and tokenizer (default: ./models)
    pub model_dir: PathBuf,

    /// Files longer than this are not indexed (default: 10.0 seconds)
    pub max_sample_duration_secs: f32,

    /// Pending writes are flushed to the store every this many records (default: 50)
    pub write_batch_size: usize,

    /// Extensions considered audio files (default: [`SUPPORTED_FORMATS`])
    pub supported_extensions: Vec<String>,

    /// Tempo/key analysis parameters
    pub analysis: AnalysisConfig,

    /// Embedding model parameters
    pub embedding: EmbeddingConfig,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("sample_db").join("samples.db"),
            collection: "samples_library".to_string(),
            model_dir: PathBuf::from("models"),
            max_sample_duration_secs: 10.0,
            write_batch_size: 50,
            supported_extensions: SUPPORTED_FORMATS.iter().map(|s| s.to_string()).collect(),
            analysis: AnalysisConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl LibraryConfig {
    /// Whether `ext` (any case, without the dot) is an accepted audio extension
    pub fn is_supported_extension(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        self.supported_extensions.iter().any(|e| *e == ext)
    }
}

/// Tempo and key analysis parameters shared by both engines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Only the first this many seconds are analyzed (default: 30.0)
    pub max_analysis_secs: f32,

    /// Clips shorter than this get no tempo or key (default: 0.5 seconds)
    pub min_clip_secs: f32,

    /// Decode rate of the profile-correlation engine (default: 22050 Hz)
    pub profile_sample_rate: u32,

    /// Decode rate of the spectral-peak engine (default: 44100 Hz)
    pub spectral_sample_rate: u32,

    // Profile engine STFT
    /// Frame size for the HPSS spectrogram (default: 4096)
    pub frame_size: usize,

    /// Hop size for the HPSS spectrogram and onset envelope (default: 512)
    pub hop_size: usize,

    /// Median filter length for harmonic/percussive separation (default: 31)
    pub hpss_kernel_size: usize,

    /// Number of mel bands for the onset-strength envelope (default: 128)
    pub onset_mel_bands: usize,

    // Spectral engine rhythm
    /// Frame size for the multi-feature novelty curves (default: 2048)
    pub rhythm_frame_size: usize,

    /// Hop size for the multi-feature novelty curves (default: 512)
    pub rhythm_hop_size: usize,

    /// Lowest tempo the raw estimators may report (default: 30.0)
    pub search_min_bpm: f32,

    /// Highest tempo the raw estimators may report (default: 300.0)
    pub search_max_bpm: f32,

    /// Octave correction and acceptance bounds
    pub tempo: TempoPolicy,

    /// Minimum template correlation for a key to be reported (default: 0.5)
    pub key_threshold: f32,

    /// HPCP parameters of the spectral-peak engine
    pub hpcp: HpcpConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_analysis_secs: 30.0,
            min_clip_secs: 0.5,
            profile_sample_rate: 22050,
            spectral_sample_rate: 44100,
            frame_size: 4096,
            hop_size: 512,
            hpss_kernel_size: 31,
            onset_mel_bands: 128,
            rhythm_frame_size: 2048,
            rhythm_hop_size: 512,
            search_min_bpm: 30.0,
            search_max_bpm: 300.0,
            tempo: TempoPolicy::default(),
            key_threshold: 0.5,
            hpcp: HpcpConfig::default(),
        }
    }
}

/// Octave-correction heuristic applied to every raw tempo estimate
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoPolicy {
    /// Lowest accepted tempo (default: 40.0)
    pub min_bpm: f32,

    /// Highest accepted tempo (default: 200.0)
    pub max_bpm: f32,

    /// Preferred tempo used to pick among octave candidates (default: 120.0)
    pub sweet_spot_bpm: f32,

    /// Estimates below this also try the doubled tempo (default: 80.0)
    pub double_below_bpm: f32,

    /// Estimates above this also try the halved tempo (default: 160.0)
    pub halve_above_bpm: f32,
}

impl Default for TempoPolicy {
    fn default() -> Self {
        Self {
            min_bpm: 40.0,
            max_bpm: 200.0,
            sweet_spot_bpm: 120.0,
            double_below_bpm: 80.0,
            halve_above_bpm: 160.0,
        }
    }
}

/// Harmonic pitch class profile parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HpcpConfig {
    /// Analysis frame size (default: 4096)
    pub frame_size: usize,

    /// Hop between frames (default: 2048)
    pub hop_size: usize,

    /// Profile bins per octave (default: 36)
    pub size: usize,

    /// Frequency mapped to bin 0 (default: 440.0 Hz)
    pub reference_hz: f32,

    /// Lowest peak frequency (default: 20.0 Hz)
    pub min_hz: f32,

    /// Highest peak frequency (default: 3500.0 Hz)
    pub max_hz: f32,

    /// Maximum spectral peaks kept per frame (default: 60)
    pub max_peaks: usize,

    /// Peak magnitude floor (default: 1e-5)
    pub magnitude_threshold: f32,

    /// Width of the cosine weighting window in semitones (default: 1.0)
    pub window_semitones: f32,
}

impl Default for HpcpConfig {
    fn default() -> Self {
        Self {
            frame_size: 4096,
            hop_size: 2048,
            size: 36,
            reference_hz: 440.0,
            min_hz: 20.0,
            max_hz: 3500.0,
            max_peaks: 60,
            magnitude_threshold: 1e-5,
            window_semitones: 1.0,
        }
    }
}

/// Joint audio-text encoder parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Rate the audio encoder expects (default: 48000 Hz)
    pub sample_rate: u32,

    /// Audio longer than this is truncated before encoding (default: 10.0 seconds)
    pub max_duration_secs: f32,

    /// Mel bands of the audio front end (default: 64)
    pub n_mels: usize,

    /// FFT size of the audio front end (default: 1024)
    pub n_fft: usize,

    /// Hop size of the audio front end (default: 480)
    pub hop_size: usize,

    /// Lowest mel filter edge (default: 50.0 Hz)
    pub fmin: f32,

    /// Highest mel filter edge (default: 14000.0 Hz)
    pub fmax: f32,

    /// Output dimension of both encoders (default: 512)
    pub dimension: usize,

    /// Maximum number of text tokens (default: 77)
    pub max_text_tokens: usize,

    /// Audio encoder file inside the model directory (default: audio_model.onnx)
    pub audio_model_file: String,

    /// Text encoder file inside the model directory (default: text_model.onnx)
    pub text_model_file: String,

    /// Tokenizer file inside the model directory (default: tokenizer.json)
    pub tokenizer_file: String,

    /// Name of the audio encoder input (default: "input_features")
    pub audio_input_name: String,

    /// Intra-op threads per ONNX session (default: 1)
    pub intra_threads: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            max_duration_secs: 10.0,
            n_mels: 64,
            n_fft: 1024,
            hop_size: 480,
            fmin: 50.0,
            fmax: 14_000.0,
            dimension: 512,
            max_text_tokens: 77,
            audio_model_file: "audio_model.onnx".to_string(),
            text_model_file: "text_model.onnx".to_string(),
            tokenizer_file: "tokenizer.json".to_string(),
            audio_input_name: "input_features".to_string(),
            intra_threads: 1,
        }
    }
}
