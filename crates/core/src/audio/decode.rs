use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

use super::{
    buffer::{BufferFull, FrameBuffer},
    callbacks::Observers,
    source::AudioSource,
    state::SharedState,
    AudioChunk,
};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DecodeCommand {
    /// Reposition to the given frame offset.
    Seek(u64),
    Stop,
}

/// Timing knobs for the decode loop.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DecodeTiming {
    pub(crate) chunk_frames: usize,
    pub(crate) push_timeout: Duration,
    pub(crate) idle_wait: Duration,
}

/// State owned by the decode thread for one playback run.
struct DecodeLoop {
    source: Box<dyn AudioSource>,
    buffer: FrameBuffer,
    shared: Arc<SharedState>,
    observers: Arc<Observers>,
    commands: Receiver<DecodeCommand>,
    timing: DecodeTiming,
    /// Chunk that could not be queued because playback paused mid-push.
    held: Option<AudioChunk>,
    end_reported: bool,
}

enum Step {
    Continue,
    Exit,
}

impl DecodeLoop {
    fn run(mut self) -> Box<dyn AudioSource> {
        tracing::debug!(chunk_frames = self.timing.chunk_frames, "decode loop started");
        loop {
            if let Step::Exit = self.drain_commands() {
                break;
            }

            if !self.shared.is_playing() || self.end_reported {
                if let Step::Exit = self.idle() {
                    break;
                }
                continue;
            }

            let chunk = match self.held.take() {
                Some(chunk) => chunk,
                None => match self.source.read(self.timing.chunk_frames) {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        let err = EngineError::Decode(err);
                        tracing::error!(error = %err, "stopping decode loop");
                        self.observers.notify_decode_failed(err.to_string());
                        break;
                    }
                },
            };

            if chunk.is_empty() {
                self.end_reported = true;
                tracing::debug!("end of track reached");
                self.observers.notify_end_of_track();
                continue;
            }

            if let Err(BufferFull(chunk)) = self.buffer.push(chunk, self.timing.push_timeout) {
                if self.shared.is_playing() {
                    tracing::trace!(frames = chunk.frames(), "frame buffer full; dropping chunk");
                } else {
                    self.held = Some(chunk);
                    continue;
                }
            }

            self.publish_position();
        }
        tracing::debug!("decode loop exited");
        self.source
    }

    fn drain_commands(&mut self) -> Step {
        loop {
            match self.commands.try_recv() {
                Ok(command) => {
                    if let Step::Exit = self.execute(command) {
                        return Step::Exit;
                    }
                }
                Err(TryRecvError::Empty) => return Step::Continue,
                Err(TryRecvError::Disconnected) => return Step::Exit,
            }
        }
    }

    fn idle(&mut self) -> Step {
        match self.commands.recv_timeout(self.timing.idle_wait) {
            Ok(command) => self.execute(command),
            Err(RecvTimeoutError::Timeout) => Step::Continue,
            Err(RecvTimeoutError::Disconnected) => Step::Exit,
        }
    }

    fn execute(&mut self, command: DecodeCommand) -> Step {
        match command {
            DecodeCommand::Stop => Step::Exit,
            DecodeCommand::Seek(frame) => {
                if let Err(err) = self.source.seek(frame) {
                    tracing::warn!(error = %err, frame, "seek failed");
                }
                let flushed = self.buffer.clear();
                self.held = None;
                self.end_reported = false;
                self.shared.finish_seek();
                tracing::debug!(frame, flushed, "seek applied");
                self.publish_position();
                Step::Continue
            }
        }
    }

    /// Skipped while a seek is queued, so a stale read offset never
    /// overwrites the requested position.
    fn publish_position(&self) {
        if self.shared.seek_pending() {
            return;
        }
        let rate = self.source.sample_rate().max(1);
        self.shared
            .set_position(self.source.tell() as f64 / f64::from(rate));
        self.observers
            .notify_position(self.shared.position(), self.shared.duration());
    }
}

/// Handle to a running decode thread.
pub(crate) struct DecodeThread {
    handle: Option<JoinHandle<()>>,
    commands: Sender<DecodeCommand>,
    finished: Receiver<Box<dyn AudioSource>>,
    shared: Arc<SharedState>,
}

impl DecodeThread {
    /// Moves `source` onto a new thread. It comes back through [`stop`](Self::stop).
    pub(crate) fn spawn(
        source: Box<dyn AudioSource>,
        buffer: FrameBuffer,
        shared: Arc<SharedState>,
        observers: Arc<Observers>,
        timing: DecodeTiming,
    ) -> io::Result<Self> {
        let (commands, command_rx) = unbounded();
        let (finished_tx, finished) = bounded(1);
        shared.reset_seeks();
        let decode = DecodeLoop {
            source,
            buffer,
            shared: Arc::clone(&shared),
            observers,
            commands: command_rx,
            timing,
            held: None,
            end_reported: false,
        };

        let handle = thread::Builder::new()
            .name("audio-decoder".into())
            .spawn(move || {
                let source = decode.run();
                let _ = finished_tx.send(source);
            })?;

        Ok(Self {
            handle: Some(handle),
            commands,
            finished,
            shared,
        })
    }

    /// Queues a seek. Returns false when the thread has already exited.
    pub(crate) fn seek(&self, frame: u64) -> bool {
        self.shared.begin_seek();
        let sent = self.commands.send(DecodeCommand::Seek(frame)).is_ok();
        if !sent {
            self.shared.finish_seek();
        }
        sent
    }

    /// Signals the thread and waits up to `timeout` for it to hand the source
    /// back. On timeout the thread is left to finish on its own.
    pub(crate) fn stop(mut self, timeout: Duration) -> Option<Box<dyn AudioSource>> {
        let _ = self.commands.send(DecodeCommand::Stop);
        let returned = self.finished.recv_timeout(timeout);
        self.shared.reset_seeks();
        match returned {
            Ok(source) => {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                Some(source)
            }
            Err(RecvTimeoutError::Timeout) => {
                let err = EngineError::ThreadJoinTimeout(timeout.as_millis() as u64);
                tracing::warn!(error = %err, "abandoning decode thread");
                None
            }
            Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        tracing::warn!("decode thread panicked");
                    }
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        audio::{source::MemorySource, state::PlaybackState, EngineEvent},
        error::{SourceError, SourceResult},
    };

    struct Unreadable;

    impl AudioSource for Unreadable {
        fn sample_rate(&self) -> u32 {
            1000
        }

        fn channels(&self) -> u16 {
            1
        }

        fn len_frames(&self) -> u64 {
            1000
        }

        fn tell(&self) -> u64 {
            0
        }

        fn read(&mut self, _frames: usize) -> SourceResult<AudioChunk> {
            Err(SourceError::Decode("bad frame header".into()))
        }

        fn seek(&mut self, _frame: u64) -> SourceResult<()> {
            Ok(())
        }
    }

    fn timing() -> DecodeTiming {
        DecodeTiming {
            chunk_frames: 100,
            push_timeout: Duration::from_millis(5),
            idle_wait: Duration::from_millis(2),
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..500 {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn fills_buffer_and_reports_end_once() {
        let source = MemorySource::silence(0.25, 1, 1000);
        let buffer = FrameBuffer::new(8);
        let shared = Arc::new(SharedState::new(1.0));
        shared.set_stream(0.25, 1);
        shared.set_state(PlaybackState::Playing);
        let observers = Arc::new(Observers::new());
        let ends = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ends);
        observers.end_of_track.register(Arc::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        }));

        let thread = DecodeThread::spawn(
            Box::new(source),
            buffer.clone(),
            Arc::clone(&shared),
            observers,
            timing(),
        )
        .unwrap();

        assert!(wait_until(|| ends.load(Ordering::Relaxed) == 1));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(ends.load(Ordering::Relaxed), 1);
        assert_eq!(buffer.len(), 3);
        assert!((shared.position() - 0.25).abs() < 1e-9);

        let source = thread.stop(Duration::from_secs(1)).unwrap();
        assert_eq!(source.tell(), 250);
    }

    #[test]
    fn paused_loop_decodes_nothing() {
        let buffer = FrameBuffer::new(8);
        let shared = Arc::new(SharedState::new(1.0));
        shared.set_state(PlaybackState::Paused);

        let thread = DecodeThread::spawn(
            Box::new(MemorySource::silence(1.0, 2, 1000)),
            buffer.clone(),
            Arc::clone(&shared),
            Arc::new(Observers::new()),
            timing(),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(20));
        assert!(buffer.is_empty());
        let source = thread.stop(Duration::from_secs(1)).unwrap();
        assert_eq!(source.tell(), 0);
    }

    #[test]
    fn seek_flushes_and_rearms_end_of_track() {
        let buffer = FrameBuffer::new(16);
        let shared = Arc::new(SharedState::new(1.0));
        shared.set_stream(0.3, 1);
        shared.set_state(PlaybackState::Playing);
        let observers = Arc::new(Observers::new());
        let events = observers.events.subscribe();

        let thread = DecodeThread::spawn(
            Box::new(MemorySource::silence(0.3, 1, 1000)),
            buffer.clone(),
            Arc::clone(&shared),
            observers,
            timing(),
        )
        .unwrap();

        let ended = |rx: &Receiver<_>| {
            rx.recv_timeout(Duration::from_secs(1))
                .into_iter()
                .chain(rx.try_iter())
                .any(|event| event == EngineEvent::EndOfTrack)
        };
        assert!(wait_until(|| ended(&events)));
        assert!(thread.seek(100));
        assert!(wait_until(|| ended(&events)));

        thread.stop(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn queued_seek_holds_the_requested_position() {
        let buffer = FrameBuffer::new(2);
        let shared = Arc::new(SharedState::new(1.0));
        shared.set_stream(10.0, 1);
        shared.set_state(PlaybackState::Playing);

        let thread = DecodeThread::spawn(
            Box::new(MemorySource::silence(10.0, 1, 1000)),
            buffer,
            Arc::clone(&shared),
            Arc::new(Observers::new()),
            timing(),
        )
        .unwrap();
        assert!(wait_until(|| shared.position() > 0.0));

        shared.begin_seek();
        shared.set_position(7.0);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(shared.position(), 7.0);

        shared.finish_seek();
        assert!(wait_until(|| shared.position() < 7.0));
        thread.stop(Duration::from_secs(1)).unwrap();
        assert!(!shared.seek_pending());
    }

    #[test]
    fn read_errors_surface_as_engine_decode_errors() {
        let shared = Arc::new(SharedState::new(1.0));
        shared.set_state(PlaybackState::Playing);
        let observers = Arc::new(Observers::new());
        let events = observers.events.subscribe();

        let thread = DecodeThread::spawn(
            Box::new(Unreadable),
            FrameBuffer::new(4),
            shared,
            observers,
            timing(),
        )
        .unwrap();

        let event = events.recv_timeout(Duration::from_secs(1)).unwrap();
        let expected = EngineError::Decode(SourceError::Decode("bad frame header".into()));
        assert_eq!(event, EngineEvent::DecodeFailed(expected.to_string()));
        assert!(thread.stop(Duration::from_secs(1)).is_some());
    }
}
