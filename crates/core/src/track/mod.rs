use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One playable item.
///
/// `sample_rate`, `channels` and `duration` are provisional until the engine
/// loads the track and fills them in from the decoded source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub path: PathBuf,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Length in seconds.
    pub duration: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Track {
    /// Creates a track whose title is the file stem.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_tags(path, "", "", "")
    }

    /// Creates a track from tag values. An empty title falls back to the
    /// file stem.
    pub fn with_tags(
        path: impl Into<PathBuf>,
        title: impl Into<String>,
        artist: impl Into<String>,
        album: impl Into<String>,
    ) -> Self {
        let path = path.into();
        let mut title = title.into();
        if title.trim().is_empty() {
            title = file_stem(&path);
        }

        Self {
            path,
            title,
            artist: artist.into(),
            album: album.into(),
            duration: 0.0,
            sample_rate: 44_100,
            channels: 2,
        }
    }

    /// Records the stream properties reported by the decoder.
    pub(crate) fn apply_stream_info(&mut self, sample_rate: u32, channels: u16, frames: u64) {
        self.sample_rate = sample_rate;
        self.channels = channels.clamp(1, 2);
        self.duration = if sample_rate == 0 {
            0.0
        } else {
            frames as f64 / f64::from(sample_rate)
        };
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_title_defaults_to_stem() {
        let track = Track::with_tags("/music/01 - Intro.flac", "  ", "Artist", "Album");
        assert_eq!(track.title, "01 - Intro");
        assert_eq!(track.artist, "Artist");
    }

    #[test]
    fn stream_info_derives_duration() {
        let mut track = Track::new("a.wav");
        track.apply_stream_info(48_000, 1, 96_000);

        assert_eq!(track.sample_rate, 48_000);
        assert_eq!(track.channels, 1);
        assert!((track.duration - 2.0).abs() < 1e-9);
    }

    #[test]
    fn stream_info_keeps_channel_invariant() {
        let mut track = Track::new("surround.flac");
        track.apply_stream_info(44_100, 6, 0);
        assert_eq!(track.channels, 2);
        assert_eq!(track.duration, 0.0);
    }
}
