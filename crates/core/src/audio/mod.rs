//! File-to-speaker playback pipeline.
//!
//! ```text
//! source ──read──► decode thread ──push──► FrameBuffer ──pop──► OutputCallback ──► device
//!                        │                                         │
//!                        └──► position / end-of-track              └──► audio-data subscribers
//! ```

mod backend;
mod buffer;
mod callbacks;
mod decode;
mod engine;
mod output;
mod source;
mod state;

pub use backend::{AudioBackend, CpalBackend, HeadlessBackend, OutputStream, StreamRequest};
pub use buffer::{BufferFull, FrameBuffer};
pub use callbacks::{CallbackId, EngineEvent};
pub use engine::AudioEngine;
pub use output::OutputCallback;
pub use source::{AudioSource, MemorySource, SourceOpener, SymphoniaOpener, SymphoniaSource};
pub use state::PlaybackState;

/// A batch of interleaved PCM frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioChunk {
    samples: Vec<f32>,
    channels: u16,
}

impl AudioChunk {
    /// Wraps interleaved samples. A trailing partial frame is discarded.
    pub fn new(mut samples: Vec<f32>, channels: u16) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % usize::from(channels);
        samples.truncate(whole);
        Self { samples, channels }
    }

    pub fn silence(frames: usize, channels: u16) -> Self {
        let channels = channels.max(1);
        Self {
            samples: vec![0.0; frames * usize::from(channels)],
            channels,
        }
    }

    /// Builds a stereo chunk from two equally long channel slices.
    pub fn from_stereo(left: &[f32], right: &[f32]) -> Self {
        let samples = left
            .iter()
            .zip(right)
            .flat_map(|(l, r)| [*l, *r])
            .collect();
        Self {
            samples,
            channels: 2,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channels(&self) -> u16 {
        self.channels.max(1)
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels())
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Samples of a single channel. Out-of-range indices yield the last channel.
    pub fn channel(&self, index: usize) -> impl Iterator<Item = f32> + '_ {
        let channels = usize::from(self.channels());
        let index = index.min(channels - 1);
        self.samples.iter().skip(index).step_by(channels).copied()
    }

    /// Average of all channels per frame.
    pub fn mono(&self) -> Vec<f32> {
        let channels = usize::from(self.channels());
        if channels == 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }

    /// Left and right channels. Mono chunks return the same samples twice.
    pub fn stereo(&self) -> (Vec<f32>, Vec<f32>) {
        (self.channel(0).collect(), self.channel(1).collect())
    }

    /// Pads with silence or truncates to exactly `frames` frames.
    pub(crate) fn fit_frames(&mut self, frames: usize) {
        self.samples.resize(frames * usize::from(self.channels()), 0.0);
    }

    pub(crate) fn scale(&mut self, gain: f32) {
        for sample in &mut self.samples {
            *sample *= gain;
        }
    }
}

/// Copies interleaved frames between channel layouts. Mono sources are
/// duplicated across the destination, wider sources are averaged onto a mono
/// destination, and destination channels past the source are silent.
pub(crate) fn remap_frames(src: &[f32], src_channels: usize, dst: &mut [f32], dst_channels: usize) {
    let src_channels = src_channels.max(1);
    let dst_channels = dst_channels.max(1);

    if src_channels == dst_channels {
        let len = src.len().min(dst.len());
        dst[..len].copy_from_slice(&src[..len]);
        dst[len..].fill(0.0);
        return;
    }

    let mut frames_in = src.chunks_exact(src_channels);
    for out in dst.chunks_mut(dst_channels) {
        let Some(frame) = frames_in.next() else {
            out.fill(0.0);
            continue;
        };
        if src_channels == 1 {
            out.fill(frame[0]);
        } else if dst_channels == 1 {
            out[0] = frame.iter().sum::<f32>() / src_channels as f32;
        } else {
            for (ch, sample) in out.iter_mut().enumerate() {
                *sample = frame.get(ch).copied().unwrap_or(0.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_drops_partial_frames() {
        let chunk = AudioChunk::new(vec![0.1, 0.2, 0.3], 2);
        assert_eq!(chunk.frames(), 1);
        assert_eq!(chunk.samples(), &[0.1, 0.2]);
    }

    #[test]
    fn mono_downmix_averages_channels() {
        let chunk = AudioChunk::from_stereo(&[1.0, 0.0], &[0.0, -1.0]);
        assert_eq!(chunk.mono(), vec![0.5, -0.5]);

        let (left, right) = chunk.stereo();
        assert_eq!(left, vec![1.0, 0.0]);
        assert_eq!(right, vec![0.0, -1.0]);
    }

    #[test]
    fn mono_chunks_split_into_identical_channels() {
        let chunk = AudioChunk::new(vec![0.25, 0.5], 1);
        let (left, right) = chunk.stereo();
        assert_eq!(left, right);
    }

    #[test]
    fn fit_frames_pads_and_truncates() {
        let mut chunk = AudioChunk::new(vec![1.0; 6], 2);
        chunk.fit_frames(5);
        assert_eq!(chunk.frames(), 5);
        assert_eq!(&chunk.samples()[6..], &[0.0; 4]);

        chunk.fit_frames(1);
        assert_eq!(chunk.samples(), &[1.0, 1.0]);
    }

    #[test]
    fn remaps_between_layouts() {
        let mut stereo = [9.0; 6];
        remap_frames(&[0.5, -0.5], 1, &mut stereo, 2);
        assert_eq!(stereo, [0.5, 0.5, -0.5, -0.5, 0.0, 0.0]);

        let mut mono = [9.0; 2];
        remap_frames(&[1.0, 0.0, 0.2, 0.4], 2, &mut mono, 1);
        assert!((mono[0] - 0.5).abs() < 1e-6);
        assert!((mono[1] - 0.3).abs() < 1e-6);

        let mut quad = [9.0; 4];
        remap_frames(&[0.1, 0.2], 2, &mut quad, 4);
        assert_eq!(quad, [0.1, 0.2, 0.0, 0.0]);
    }
}
