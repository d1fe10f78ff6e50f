//! Tag extraction for tracks, performed before they reach the engine.

use std::{fs::File, path::Path};

use symphonia::core::{
    codecs::CODEC_TYPE_NULL,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::{MetadataOptions, MetadataRevision, StandardTagKey},
    probe::Hint,
};

use crate::Track;

/// File extensions the player scans for when given a directory.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "aac", "ogg", "m4a"];

#[derive(Debug, Default)]
struct Tags {
    title: Option<String>,
    artist: Option<String>,
    album: Option<String>,
}

impl Tags {
    fn absorb(&mut self, revision: &MetadataRevision) {
        for tag in revision.tags() {
            let slot = match tag.std_key {
                Some(StandardTagKey::TrackTitle) => &mut self.title,
                Some(StandardTagKey::Artist) => &mut self.artist,
                Some(StandardTagKey::Album) => &mut self.album,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(tag.value.to_string());
            }
        }
    }
}

/// Reads title, artist, album and duration from `path`.
///
/// Never fails: unreadable files produce a track titled after the file stem
/// with a zero duration.
pub fn extract(path: impl AsRef<Path>) -> Track {
    let path = path.as_ref();
    let mut tags = Tags::default();
    let mut duration = 0.0;

    match read_tags(path, &mut tags) {
        Ok(seconds) => duration = seconds,
        Err(err) => tracing::debug!(path = %path.display(), %err, "no readable tags"),
    }

    let mut track = Track::with_tags(
        path,
        tags.title.unwrap_or_default(),
        tags.artist.unwrap_or_default(),
        tags.album.unwrap_or_default(),
    );
    track.duration = duration;
    track
}

fn read_tags(path: &Path, tags: &mut Tags) -> Result<f64, symphonia::core::errors::Error> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let mut detected = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    // Container-level tags (ID3v2 ahead of the stream) take precedence over
    // format-level ones.
    if let Some(revision) = detected.metadata.get().as_ref().and_then(|m| m.current()) {
        tags.absorb(revision);
    }
    if let Some(revision) = detected.format.metadata().current() {
        tags.absorb(revision);
    }

    let duration = detected
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .and_then(|t| Some((t.codec_params.n_frames?, t.codec_params.sample_rate?)))
        .map(|(frames, rate)| frames as f64 / f64::from(rate.max(1)))
        .unwrap_or(0.0);

    Ok(duration)
}

/// Formats seconds as `M:SS`, or `H:MM:SS` past the hour.
pub fn format_duration(seconds: f64) -> String {
    if seconds.is_nan() || seconds < 0.0 {
        return "0:00".to_string();
    }

    let total = seconds as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

/// Returns true if the path carries one of [`AUDIO_EXTENSIONS`].
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| AUDIO_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, sample_rate: u32, frames: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..frames {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(0.0), "0:00");
        assert_eq!(format_duration(65.9), "1:05");
        assert_eq!(format_duration(3725.0), "1:02:05");
        assert_eq!(format_duration(-3.0), "0:00");
        assert_eq!(format_duration(f64::NAN), "0:00");
    }

    #[test]
    fn extracts_duration_and_falls_back_to_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quiet tone.wav");
        write_wav(&path, 8_000, 16_000);

        let track = extract(&path);
        assert_eq!(track.title, "quiet tone");
        assert!((track.duration - 2.0).abs() < 1e-6);
    }

    #[test]
    fn unreadable_files_still_yield_a_track() {
        let track = extract("/definitely/not/here.mp3");
        assert_eq!(track.title, "here");
        assert_eq!(track.duration, 0.0);
    }

    #[test]
    fn recognises_audio_extensions() {
        assert!(is_audio_file(Path::new("a/b/song.FLAC")));
        assert!(is_audio_file(Path::new("x.m4a")));
        assert!(!is_audio_file(Path::new("cover.jpg")));
        assert!(!is_audio_file(Path::new("README")));
    }
}
