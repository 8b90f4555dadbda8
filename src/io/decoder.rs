//! Audio decoding using Symphonia
//!
//! Decodes any container/codec Symphonia supports into mono `f32` samples at
//! the file's native rate, optionally stopping after a maximum duration.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::AnalysisError;
use crate::preprocessing::channel_mixer::downmix_interleaved;

/// Decoded mono audio
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Mono samples in [-1.0, 1.0]
    pub samples: Vec<f32>,

    /// Native sample rate in Hz
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Length in seconds
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Decode an audio file to mono PCM samples
///
/// # Arguments
///
/// * `path` - Path to the audio file (the extension is used as a format hint)
/// * `max_duration_secs` - Stop decoding after this many seconds, if set
///
/// # Returns
///
/// `DecodedAudio` holding mono samples at the file's native sample rate
///
/// # Errors
///
/// Returns `AnalysisError::DecodingError` if the file cannot be opened, has no
/// decodable audio track, or yields no samples
pub fn decode_audio(path: &Path, max_duration_secs: Option<f32>) -> Result<DecodedAudio, AnalysisError> {
    log::debug!("Decoding audio file: {}", path.display());

    let src = File::open(path)
        .map_err(|e| AnalysisError::DecodingError(format!("{}: {}", path.display(), e)))?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AnalysisError::DecodingError(format!("unsupported format: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AnalysisError::DecodingError("no supported audio tracks".to_string()))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AnalysisError::DecodingError(format!("unsupported codec: {}", e)))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut limit: Option<usize> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(AnalysisError::DecodingError(format!("read error: {}", e)));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping corrupt packet in {}: {}", path.display(), e);
                continue;
            }
            Err(e) => {
                return Err(AnalysisError::DecodingError(format!("decode error: {}", e)));
            }
        };

        let spec = *decoded.spec();
        if sample_rate == 0 {
            sample_rate = spec.rate;
        }
        if limit.is_none() {
            limit = max_duration_secs.map(|secs| (secs.max(0.0) * sample_rate as f32) as usize);
        }

        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        samples.extend(downmix_interleaved(buf.samples(), spec.channels.count())?);

        if let Some(limit) = limit {
            if samples.len() >= limit {
                samples.truncate(limit);
                break;
            }
        }
    }

    if samples.is_empty() || sample_rate == 0 {
        return Err(AnalysisError::DecodingError(format!(
            "no audio decoded from {}",
            path.display()
        )));
    }

    log::debug!(
        "Decoded {} samples at {} Hz ({:.2}s)",
        samples.len(),
        sample_rate,
        samples.len() as f32 / sample_rate as f32
    );

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, channels: u16, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            for ch in 0..channels {
                let v = if ch == 0 { (i % 100) as i16 * 100 } else { 0 };
                writer.write_sample(v).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_decode_stereo_wav_to_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, 2, 8000);

        let audio = decode_audio(&path, None).unwrap();
        assert_eq!(audio.sample_rate, 8000);
        assert_eq!(audio.samples.len(), 8000);
        assert!((audio.duration_secs() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_respects_max_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        write_wav(&path, 1, 8000 * 3);

        let audio = decode_audio(&path, Some(1.5)).unwrap();
        assert_eq!(audio.samples.len(), 12000);
    }

    #[test]
    fn test_decode_missing_file_fails() {
        let result = decode_audio(Path::new("/definitely/not/here.wav"), None);
        assert!(matches!(result, Err(AnalysisError::DecodingError(_))));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.wav");
        std::fs::write(&path, b"not really audio").unwrap();
        assert!(decode_audio(&path, None).is_err());
    }
}
