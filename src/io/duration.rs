//! Duration probing from container headers
//!
//! WAV durations come straight from the RIFF header via `hound`. Every other
//! format is probed with Symphonia, which reads the container metadata
//! (frame count and time base) without decoding any packets.
//!
//! A probe never fails: anything unreadable is reported as unknown (`None`).

use std::fs::File;
use std::path::Path;

use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Playable duration of an audio file in seconds, or `None` if unknown
pub fn probe_duration(path: &Path) -> Option<f32> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let duration = match ext.as_deref() {
        Some("wav") => probe_wav(path),
        _ => probe_container(path),
    };

    if duration.is_none() {
        log::debug!("Duration unknown for {}", path.display());
    }
    duration
}

fn probe_wav(path: &Path) -> Option<f32> {
    let reader = hound::WavReader::open(path).ok()?;
    let sample_rate = reader.spec().sample_rate;
    if sample_rate == 0 {
        return None;
    }
    Some(reader.duration() as f32 / sample_rate as f32)
}

fn probe_container(path: &Path) -> Option<f32> {
    let src = File::open(path).ok()?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .ok()?;

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)?;
    let params = &track.codec_params;
    let n_frames = params.n_frames?;

    if let Some(time_base) = params.time_base {
        let time = time_base.calc_time(n_frames);
        return Some(time.seconds as f32 + time.frac as f32);
    }

    let sample_rate = params.sample_rate?;
    if sample_rate == 0 {
        return None;
    }
    Some(n_frames as f32 / sample_rate as f32)
}
