use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use super::{buffer::FrameBuffer, callbacks::Observers, remap_frames, state::SharedState};

/// Largest device period preallocated up front.
const PREALLOCATED_FRAMES: usize = 8192;

/// The pull side of the pipeline, driven by the backend's real-time thread.
///
/// `render` never blocks on a lock held by another thread and never panics;
/// every failure path yields silence.
pub struct OutputCallback {
    shared: Arc<SharedState>,
    buffer: FrameBuffer,
    observers: Arc<Observers>,
    channels: usize,
    scratch: Vec<f32>,
}

impl OutputCallback {
    pub(crate) fn new(
        shared: Arc<SharedState>,
        buffer: FrameBuffer,
        observers: Arc<Observers>,
    ) -> Self {
        let channels = usize::from(shared.channels().max(1));
        Self {
            shared,
            buffer,
            observers,
            channels,
            scratch: Vec::with_capacity(PREALLOCATED_FRAMES * channels),
        }
    }

    /// Channel layout of the samples returned by [`render`](Self::render).
    pub fn channels(&self) -> u16 {
        self.channels as u16
    }

    /// Produces exactly `frame_count` interleaved frames in the track layout.
    pub fn render(&mut self, frame_count: usize) -> &[f32] {
        let channels = self.channels;
        let len = frame_count * channels;
        if self.scratch.len() != len {
            self.scratch.resize(len, 0.0);
        }

        let filled = catch_unwind(AssertUnwindSafe(|| self.fill(frame_count))).unwrap_or(false);
        if !filled {
            self.scratch.fill(0.0);
        }
        &self.scratch
    }

    /// Renders into a device buffer whose layout may differ from the track's.
    pub fn fill_device(&mut self, out: &mut [f32], device_channels: usize) {
        let device_channels = device_channels.max(1);
        let frames = out.len() / device_channels;
        let track_channels = self.channels;
        let samples = self.render(frames);
        remap_frames(samples, track_channels, out, device_channels);
    }

    fn fill(&mut self, frame_count: usize) -> bool {
        if !self.shared.is_playing() {
            return false;
        }
        let Some(mut chunk) = self.buffer.pop() else {
            return false;
        };

        chunk.fit_frames(frame_count);
        chunk.scale(self.shared.effective_volume());
        self.observers
            .audio
            .try_dispatch("audio", |handler| handler(&chunk));

        remap_frames(
            chunk.samples(),
            usize::from(chunk.channels()),
            &mut self.scratch,
            self.channels,
        );
        true
    }
}

impl std::fmt::Debug for OutputCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputCallback")
            .field("channels", &self.channels)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::audio::{state::PlaybackState, AudioChunk};

    fn callback(channels: u16) -> (OutputCallback, Arc<SharedState>, FrameBuffer, Arc<Observers>) {
        let shared = Arc::new(SharedState::new(0.5));
        shared.set_stream(1.0, channels);
        let buffer = FrameBuffer::new(4);
        let observers = Arc::new(Observers::new());
        let output = OutputCallback::new(Arc::clone(&shared), buffer.clone(), Arc::clone(&observers));
        (output, shared, buffer, observers)
    }

    #[test]
    fn underrun_yields_silence_of_the_right_shape() {
        let (mut output, shared, _, _) = callback(2);
        shared.set_state(PlaybackState::Playing);

        let samples = output.render(64);
        assert_eq!(samples.len(), 128);
        assert!(samples.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn applies_volume_and_pads_short_chunks() {
        let (mut output, shared, buffer, observers) = callback(1);
        shared.set_state(PlaybackState::Playing);
        buffer.try_push(AudioChunk::new(vec![1.0; 3], 1)).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        observers.audio.register(Arc::new(move |chunk: &AudioChunk| {
            sink.lock().extend_from_slice(chunk.samples());
        }));

        assert_eq!(output.render(5), &[0.5, 0.5, 0.5, 0.0, 0.0]);
        assert_eq!(*seen.lock(), vec![0.5, 0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn muted_chunks_are_consumed_as_silence() {
        let (mut output, shared, buffer, _) = callback(1);
        shared.set_state(PlaybackState::Playing);
        shared.toggle_mute();
        buffer.try_push(AudioChunk::new(vec![1.0; 4], 1)).unwrap();

        assert!(output.render(4).iter().all(|s| *s == 0.0));
        assert!(buffer.is_empty());
    }

    #[test]
    fn paused_output_leaves_the_buffer_alone() {
        let (mut output, shared, buffer, _) = callback(2);
        shared.set_state(PlaybackState::Paused);
        buffer.try_push(AudioChunk::silence(8, 2)).unwrap();

        assert_eq!(output.render(8).len(), 16);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn panicking_subscriber_still_produces_audio() {
        let (mut output, shared, buffer, observers) = callback(1);
        shared.set_state(PlaybackState::Playing);
        observers
            .audio
            .register(Arc::new(|_: &AudioChunk| panic!("visualizer bug")));
        buffer.try_push(AudioChunk::new(vec![0.4; 2], 1)).unwrap();

        assert_eq!(output.render(2), &[0.2, 0.2]);
    }

    #[test]
    fn maps_mono_tracks_onto_stereo_devices() {
        let (mut output, shared, buffer, _) = callback(1);
        shared.set_state(PlaybackState::Playing);
        buffer.try_push(AudioChunk::new(vec![1.0, -1.0], 1)).unwrap();

        let mut device = [9.0; 4];
        output.fill_device(&mut device, 2);
        assert_eq!(device, [0.5, 0.5, -0.5, -0.5]);
    }
}
