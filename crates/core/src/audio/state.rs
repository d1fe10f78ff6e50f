use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, AtomicU8, Ordering};

/// Playback state machine owned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PlaybackState {
    /// Nothing has been started yet.
    Idle = 0,
    Playing = 1,
    Paused = 2,
    /// Playback was stopped; the position is back at zero.
    Stopped = 3,
}

impl PlaybackState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Playing,
            2 => Self::Paused,
            3 => Self::Stopped,
            _ => Self::Idle,
        }
    }
}

#[derive(Debug)]
pub(crate) struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub(crate) fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    pub(crate) fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub(crate) fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub(crate) struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub(crate) fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub(crate) fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub(crate) fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Scalar engine state read by the decode thread, the output callback and
/// the UI. Every field is a single atomic word; relaxed ordering suffices
/// since readers only need eventual visibility.
#[derive(Debug)]
pub(crate) struct SharedState {
    state: AtomicU8,
    volume: AtomicF32,
    muted: AtomicBool,
    /// Seconds.
    position: AtomicF64,
    /// Seconds.
    duration: AtomicF64,
    channels: AtomicU16,
    /// Seeks queued for the decode thread but not yet applied.
    pending_seeks: AtomicU32,
}

impl SharedState {
    pub(crate) fn new(volume: f32) -> Self {
        Self {
            state: AtomicU8::new(PlaybackState::Idle as u8),
            volume: AtomicF32::new(clamp_volume(volume)),
            muted: AtomicBool::new(false),
            position: AtomicF64::new(0.0),
            duration: AtomicF64::new(0.0),
            channels: AtomicU16::new(2),
            pending_seeks: AtomicU32::new(0),
        }
    }

    pub(crate) fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub(crate) fn set_state(&self, state: PlaybackState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    pub(crate) fn volume(&self) -> f32 {
        self.volume.load()
    }

    /// Stores the volume clamped to `0.0..=1.0`; NaN stores silence.
    pub(crate) fn set_volume(&self, volume: f32) {
        self.volume.store(clamp_volume(volume));
    }

    pub(crate) fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Flips the mute flag and returns the new value.
    pub(crate) fn toggle_mute(&self) -> bool {
        !self.muted.fetch_xor(true, Ordering::Relaxed)
    }

    pub(crate) fn effective_volume(&self) -> f32 {
        if self.is_muted() {
            0.0
        } else {
            self.volume()
        }
    }

    pub(crate) fn position(&self) -> f64 {
        self.position.load()
    }

    /// Stores the position clamped to `0..=duration`.
    pub(crate) fn set_position(&self, seconds: f64) {
        self.position.store(self.clamp_position(seconds));
    }

    /// Clamps `seconds` to the track. An unknown (zero) duration leaves the
    /// upper end open.
    pub(crate) fn clamp_position(&self, seconds: f64) -> f64 {
        let duration = self.duration();
        if seconds.is_nan() || seconds <= 0.0 {
            0.0
        } else if duration > 0.0 {
            seconds.min(duration)
        } else {
            seconds
        }
    }

    pub(crate) fn begin_seek(&self) {
        self.pending_seeks.fetch_add(1, Ordering::AcqRel);
    }

    /// Marks one queued seek as applied.
    pub(crate) fn finish_seek(&self) {
        let _ = self
            .pending_seeks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub(crate) fn seek_pending(&self) -> bool {
        self.pending_seeks.load(Ordering::Acquire) > 0
    }

    /// Forgets seeks that will never be applied.
    pub(crate) fn reset_seeks(&self) {
        self.pending_seeks.store(0, Ordering::Release);
    }

    pub(crate) fn duration(&self) -> f64 {
        self.duration.load()
    }

    pub(crate) fn set_stream(&self, duration: f64, channels: u16) {
        self.duration.store(duration.max(0.0));
        self.channels.store(channels.max(1), Ordering::Relaxed);
    }

    /// Track channel count, or 2 when nothing is loaded.
    pub(crate) fn channels(&self) -> u16 {
        self.channels.load(Ordering::Relaxed)
    }
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}
