use std::{fmt, sync::Arc};

use crossbeam_channel::Receiver;

use super::{
    backend::{AudioBackend, CpalBackend, HeadlessBackend, OutputStream, StreamRequest},
    buffer::FrameBuffer,
    callbacks::{CallbackId, EngineEvent, Observers},
    decode::{DecodeThread, DecodeTiming},
    output::OutputCallback,
    source::{AudioSource, SourceOpener, SymphoniaOpener},
    state::{PlaybackState, SharedState},
    AudioChunk,
};
use crate::{
    config::AudioConfig,
    error::{EngineError, EngineResult},
    track::Track,
};

/// Playback engine: owns the decode thread, the frame buffer and the output
/// stream, and exposes the control surface used by the UI.
pub struct AudioEngine {
    config: AudioConfig,
    shared: Arc<SharedState>,
    observers: Arc<Observers>,
    buffer: FrameBuffer,
    backend: Box<dyn AudioBackend>,
    opener: Arc<dyn SourceOpener>,
    initialized: bool,
    track: Option<Track>,
    /// Present whenever a track is loaded and no decode thread holds it.
    source: Option<Box<dyn AudioSource>>,
    decoder: Option<DecodeThread>,
    stream: Option<Box<dyn OutputStream>>,
}

impl AudioEngine {
    /// Engine that decodes files with symphonia and plays on the default device.
    pub fn new(config: AudioConfig) -> Self {
        Self::with_backend(config, Box::new(CpalBackend::new()), Arc::new(SymphoniaOpener))
    }

    /// Engine that decodes files but discards output at real-time rate.
    pub fn headless(config: AudioConfig) -> Self {
        Self::with_backend(config, Box::new(HeadlessBackend::new()), Arc::new(SymphoniaOpener))
    }

    pub fn with_backend(
        config: AudioConfig,
        backend: Box<dyn AudioBackend>,
        opener: Arc<dyn SourceOpener>,
    ) -> Self {
        let shared = Arc::new(SharedState::new(config.default_volume));
        let buffer = FrameBuffer::new(config.buffer_capacity);
        Self {
            config,
            shared,
            observers: Arc::new(Observers::new()),
            buffer,
            backend,
            opener,
            initialized: false,
            track: None,
            source: None,
            decoder: None,
            stream: None,
        }
    }

    /// Acquires the output device. Safe to call repeatedly.
    pub fn initialize(&mut self) -> EngineResult<()> {
        if self.initialized {
            return Ok(());
        }
        self.backend.initialize()?;
        self.initialized = true;
        Ok(())
    }

    /// Loads `track`, replacing whatever was loaded. Returns false (and logs)
    /// when the file cannot be opened.
    pub fn load(&mut self, track: Track) -> bool {
        match self.try_load(track) {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(error = %err, "track load failed");
                false
            }
        }
    }

    /// Like [`load`](Self::load) but reports the failure. On success the
    /// returned track carries the decoded sample rate, channels and duration.
    pub fn try_load(&mut self, mut track: Track) -> EngineResult<&Track> {
        self.stop();
        self.track = None;
        self.source = None;
        self.shared.set_stream(0.0, 2);
        self.shared.set_position(0.0);

        let source = self
            .opener
            .open(&track.path)
            .map_err(|source| EngineError::Load {
                path: track.path.clone(),
                source,
            })?;

        track.apply_stream_info(source.sample_rate(), source.channels(), source.len_frames());
        self.shared.set_stream(track.duration, track.channels);
        self.shared.set_position(0.0);
        tracing::info!(
            path = %track.path.display(),
            sample_rate = track.sample_rate,
            channels = track.channels,
            duration = track.duration,
            "track loaded"
        );

        self.source = Some(source);
        Ok(self.track.insert(track))
    }

    /// Starts or resumes playback. Returns false when nothing could be played.
    pub fn play(&mut self) -> bool {
        match self.state() {
            PlaybackState::Playing => return true,
            PlaybackState::Paused => {
                self.shared.set_state(PlaybackState::Playing);
                tracing::debug!("playback resumed");
                return true;
            }
            PlaybackState::Idle | PlaybackState::Stopped => {}
        }

        if self.track.is_none() {
            tracing::debug!("play requested with no track loaded");
            return false;
        }
        if let Err(err) = self.initialize() {
            tracing::error!(error = %err, "audio output unavailable");
            return false;
        }

        match self.start_playback() {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(error = %err, "failed to start playback");
                self.stop();
                false
            }
        }
    }

    fn start_playback(&mut self) -> EngineResult<()> {
        let source = match self.source.take() {
            Some(source) => source,
            None => self.reopen()?,
        };
        let request = StreamRequest {
            sample_rate: source.sample_rate(),
            channels: source.channels(),
            frames_per_buffer: u32::try_from(self.config.chunk_frames).unwrap_or(u32::MAX),
        };

        self.buffer.clear();
        self.shared.set_state(PlaybackState::Playing);
        let decoder = DecodeThread::spawn(
            source,
            self.buffer.clone(),
            Arc::clone(&self.shared),
            Arc::clone(&self.observers),
            DecodeTiming {
                chunk_frames: self.config.chunk_frames.max(1),
                push_timeout: self.config.push_timeout(),
                idle_wait: self.config.idle_wait(),
            },
        )
        .map_err(EngineError::Spawn)?;
        self.decoder = Some(decoder);

        let callback = OutputCallback::new(
            Arc::clone(&self.shared),
            self.buffer.clone(),
            Arc::clone(&self.observers),
        );
        self.stream = Some(self.backend.open_stream(request, callback)?);
        tracing::debug!(position = self.position(), "playback started");
        Ok(())
    }

    /// Pauses playback. Only takes effect while playing.
    pub fn pause(&mut self) -> bool {
        if self.state() != PlaybackState::Playing {
            return false;
        }
        self.shared.set_state(PlaybackState::Paused);
        tracing::debug!(position = self.position(), "playback paused");
        true
    }

    /// Stops playback and rewinds to the start. Safe to call in any state.
    pub fn stop(&mut self) {
        self.shared.set_state(PlaybackState::Stopped);

        if let Some(stream) = self.stream.take() {
            stream.close();
        }
        if let Some(decoder) = self.decoder.take() {
            if let Some(source) = decoder.stop(self.config.join_timeout()) {
                self.source = Some(source);
            }
        }

        let drained = self.buffer.clear();
        self.shared.set_position(0.0);
        self.rewind();
        tracing::debug!(drained, "playback stopped");
    }

    fn rewind(&mut self) {
        if self.track.is_none() {
            return;
        }
        if let Some(source) = self.source.as_mut() {
            if let Err(err) = source.seek(0) {
                tracing::warn!(error = %err, "rewind failed; reopening source");
                self.source = None;
            }
        }
        if self.source.is_none() {
            match self.reopen() {
                Ok(source) => self.source = Some(source),
                Err(err) => tracing::warn!(error = %err, "could not reopen track"),
            }
        }
    }

    fn reopen(&self) -> EngineResult<Box<dyn AudioSource>> {
        let track = self.track.as_ref().ok_or(EngineError::NoTrack)?;
        self.opener
            .open(&track.path)
            .map_err(|source| EngineError::Load {
                path: track.path.clone(),
                source,
            })
    }

    /// Moves the playhead and returns the clamped position in seconds.
    pub fn seek(&mut self, seconds: f64) -> f64 {
        let Some(track) = self.track.as_ref() else {
            return 0.0;
        };
        let position = self.shared.clamp_position(seconds);
        let frame = (position * f64::from(track.sample_rate)).round() as u64;

        // The decoder learns of the seek before the new position is stored.
        match (self.decoder.as_ref(), self.source.as_mut()) {
            (Some(decoder), _) => {
                if !decoder.seek(frame) {
                    tracing::warn!(frame, "decode thread gone; seek ignored");
                }
            }
            (None, Some(source)) => {
                if let Err(err) = source.seek(frame) {
                    tracing::warn!(error = %err, frame, "seek failed");
                }
            }
            (None, None) => {}
        }
        self.shared.set_position(position);
        tracing::debug!(position, "seek");
        position
    }

    pub fn volume(&self) -> f32 {
        self.shared.volume()
    }

    /// Stores `volume` clamped to `0.0..=1.0`.
    pub fn set_volume(&self, volume: f32) {
        self.shared.set_volume(volume);
    }

    /// Flips the mute flag and returns the new value.
    pub fn toggle_mute(&self) -> bool {
        self.shared.toggle_mute()
    }

    pub fn is_muted(&self) -> bool {
        self.shared.is_muted()
    }

    pub fn effective_volume(&self) -> f32 {
        self.shared.effective_volume()
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.state()
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.track.as_ref()
    }

    /// Seconds decoded so far.
    pub fn position(&self) -> f64 {
        self.shared.position()
    }

    pub fn duration(&self) -> f64 {
        self.shared.duration()
    }

    pub fn buffered_chunks(&self) -> usize {
        self.buffer.len()
    }

    /// Subscribes to post-volume audio as it reaches the output. Runs on the
    /// output thread, so handlers must be quick.
    pub fn register_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&AudioChunk) + Send + Sync + 'static,
    {
        self.observers.audio.register(Arc::new(callback))
    }

    pub fn unregister_callback(&self, id: CallbackId) -> bool {
        self.observers.audio.unregister(id)
    }

    /// Subscribes to `(position, duration)` updates from the decode thread.
    pub fn register_position_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(f64, f64) + Send + Sync + 'static,
    {
        self.observers.position.register(Arc::new(callback))
    }

    pub fn unregister_position_callback(&self, id: CallbackId) -> bool {
        self.observers.position.unregister(id)
    }

    pub fn register_end_of_track_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.observers.end_of_track.register(Arc::new(callback))
    }

    pub fn unregister_end_of_track_callback(&self, id: CallbackId) -> bool {
        self.observers.end_of_track.unregister(id)
    }

    /// Returns a channel carrying every [`EngineEvent`] from now on.
    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        self.observers.events.subscribe()
    }

    /// Stops playback and releases the output device.
    pub fn shutdown(&mut self) {
        self.stop();
        if self.initialized {
            self.backend.release();
            self.initialized = false;
            tracing::info!("audio engine shut down");
        }
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioEngine")
            .field("state", &self.state())
            .field("track", &self.track.as_ref().map(|t| &t.path))
            .field("position", &self.position())
            .field("volume", &self.volume())
            .field("muted", &self.is_muted())
            .field("buffered", &self.buffer.len())
            .field("observers", &self.observers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::{audio::source::MemorySource, error::SourceResult};

    fn memory_engine(seconds: f64) -> AudioEngine {
        let opener = move |path: &Path| -> SourceResult<Box<dyn AudioSource>> {
            if path.starts_with("missing") {
                return Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into());
            }
            Ok(Box::new(MemorySource::silence(seconds, 1, 1000)))
        };
        AudioEngine::with_backend(
            AudioConfig::default(),
            Box::new(HeadlessBackend::new()),
            Arc::new(opener),
        )
    }

    #[test]
    fn load_fills_in_stream_info() {
        let mut engine = memory_engine(10.0);
        let track = engine.try_load(Track::new("song.wav")).unwrap();
        assert_eq!(track.sample_rate, 1000);
        assert_eq!(track.channels, 1);
        assert!((track.duration - 10.0).abs() < 1e-9);
        assert_eq!(engine.duration(), 10.0);
    }

    #[test]
    fn failed_load_leaves_nothing_loaded() {
        let mut engine = memory_engine(1.0);
        assert!(engine.load(Track::new("song.wav")));
        assert!(!engine.load(Track::new("missing/song.wav")));
        assert!(engine.current_track().is_none());
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert!(!engine.play());
    }

    #[test]
    fn seek_clamps_while_stopped() {
        let mut engine = memory_engine(10.0);
        assert_eq!(engine.seek(3.0), 0.0);
        engine.load(Track::new("song.wav"));

        assert_eq!(engine.seek(-5.0), 0.0);
        assert_eq!(engine.seek(20.0), 10.0);
        assert_eq!(engine.seek(4.5), 4.5);
        assert_eq!(engine.position(), 4.5);
    }

    #[test]
    fn unknown_duration_does_not_pin_seeks() {
        let mut engine = memory_engine(0.0);
        engine.load(Track::new("stream.mp3"));
        assert_eq!(engine.duration(), 0.0);

        assert_eq!(engine.seek(12.0), 12.0);
        assert_eq!(engine.position(), 12.0);
        assert_eq!(engine.seek(-1.0), 0.0);
    }

    #[test]
    fn pause_only_applies_while_playing() {
        let mut engine = memory_engine(5.0);
        engine.load(Track::new("song.wav"));
        assert!(!engine.pause());
        assert!(engine.play());
        assert!(engine.pause());
        assert_eq!(engine.state(), PlaybackState::Paused);
        assert!(engine.play());
        assert_eq!(engine.state(), PlaybackState::Playing);
        engine.stop();
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert_eq!(engine.position(), 0.0);
    }

    #[test]
    fn callbacks_can_be_removed_by_id() {
        let engine = memory_engine(1.0);
        let id = engine.register_callback(|_| {});
        let position = engine.register_position_callback(|_, _| {});
        assert!(engine.unregister_callback(id));
        assert!(!engine.unregister_callback(id));
        assert!(engine.unregister_position_callback(position));
    }
}
