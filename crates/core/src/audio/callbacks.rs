use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};

use super::AudioChunk;

/// Handle returned by the engine's `register_*` methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// Notifications raised on the decode thread, delivered over channels so the
/// UI can handle them on its own thread.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Position and duration in seconds, once per decoded chunk.
    Position { position: f64, duration: f64 },
    /// The source has been read to the end. Sent once per completed track.
    EndOfTrack,
    /// The decode loop stopped on a read error.
    DecodeFailed(String),
}

pub(crate) type AudioCallback = dyn Fn(&AudioChunk) + Send + Sync;
pub(crate) type PositionCallback = dyn Fn(f64, f64) + Send + Sync;
pub(crate) type EndOfTrackCallback = dyn Fn() + Send + Sync;

/// Id-keyed handler list. Handlers run in registration order and a panic in
/// one of them is contained.
pub(crate) struct CallbackList<F: ?Sized> {
    next_id: AtomicU64,
    entries: RwLock<Vec<(CallbackId, Arc<F>)>>,
}

impl<F: ?Sized> CallbackList<F> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn register(&self, handler: Arc<F>) -> CallbackId {
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push((id, handler));
        id
    }

    pub(crate) fn unregister(&self, id: CallbackId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Runs every handler against a snapshot of the list, so handlers may
    /// register or unregister others.
    pub(crate) fn dispatch(&self, label: &'static str, mut call: impl FnMut(&F)) {
        let snapshot: Vec<Arc<F>> = self
            .entries
            .read()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in &snapshot {
            isolate(label, || call(handler));
        }
    }

    /// Runs every handler without allocating or waiting on the lock. Returns
    /// false, skipping the dispatch, when a writer holds the list.
    pub(crate) fn try_dispatch(&self, label: &'static str, mut call: impl FnMut(&F)) -> bool {
        let Some(entries) = self.entries.try_read() else {
            return false;
        };
        for (_, handler) in entries.iter() {
            isolate(label, || call(handler));
        }
        true
    }
}

fn isolate(label: &'static str, call: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(call)).is_err() {
        tracing::warn!(callback = label, "callback panicked; continuing");
    }
}

/// Queued events per subscriber.
pub(crate) const EVENT_CAPACITY: usize = 256;

/// Position updates stop queueing past this depth, leaving the rest of the
/// channel for end-of-track and failure events.
pub(crate) const POSITION_BACKLOG: usize = EVENT_CAPACITY / 2;

/// Fan-out of [`EngineEvent`]s to any number of channel subscribers.
#[derive(Default)]
pub(crate) struct EventHub {
    subscribers: Mutex<Vec<Sender<EngineEvent>>>,
}

impl EventHub {
    pub(crate) fn subscribe(&self) -> Receiver<EngineEvent> {
        let (tx, rx) = bounded(EVENT_CAPACITY);
        self.subscribers.lock().push(tx);
        rx
    }

    /// Sends to every subscriber without blocking. Subscribers whose
    /// receiver is gone are dropped; a full subscriber misses the event.
    pub(crate) fn publish(&self, event: EngineEvent) {
        let is_position = matches!(event, EngineEvent::Position { .. });
        self.subscribers.lock().retain(|tx| {
            if is_position && tx.len() >= POSITION_BACKLOG {
                return true;
            }
            match tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(?event, "event subscriber is not draining; event dropped");
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
    }
}

/// Every subscription point the engine exposes.
pub(crate) struct Observers {
    pub(crate) audio: CallbackList<AudioCallback>,
    pub(crate) position: CallbackList<PositionCallback>,
    pub(crate) end_of_track: CallbackList<EndOfTrackCallback>,
    pub(crate) events: EventHub,
}

impl Observers {
    pub(crate) fn new() -> Self {
        Self {
            audio: CallbackList::new(),
            position: CallbackList::new(),
            end_of_track: CallbackList::new(),
            events: EventHub::default(),
        }
    }

    pub(crate) fn notify_position(&self, position: f64, duration: f64) {
        self.position
            .dispatch("position", |handler| handler(position, duration));
        self.events.publish(EngineEvent::Position { position, duration });
    }

    pub(crate) fn notify_end_of_track(&self) {
        self.end_of_track.dispatch("end_of_track", |handler| handler());
        self.events.publish(EngineEvent::EndOfTrack);
    }

    pub(crate) fn notify_decode_failed(&self, message: String) {
        self.events.publish(EngineEvent::DecodeFailed(message));
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("audio", &self.audio.len())
            .field("position", &self.position.len())
            .field("end_of_track", &self.end_of_track.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn unregister_removes_only_the_given_handler() {
        let list: CallbackList<dyn Fn() + Send + Sync> = CallbackList::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        let first = list.register(Arc::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        }));
        let counter = Arc::clone(&hits);
        list.register(Arc::new(move || {
            counter.fetch_add(10, Ordering::Relaxed);
        }));

        assert!(list.unregister(first));
        assert!(!list.unregister(first));
        list.dispatch("test", |handler| handler());
        assert_eq!(hits.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn panicking_handlers_do_not_stop_the_rest() {
        let list: CallbackList<dyn Fn() + Send + Sync> = CallbackList::new();
        let hits = Arc::new(AtomicUsize::new(0));

        list.register(Arc::new(|| panic!("bad observer")));
        let counter = Arc::clone(&hits);
        list.register(Arc::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        }));

        list.dispatch("test", |handler| handler());
        assert!(list.try_dispatch("test", |handler| handler()));
        assert_eq!(hits.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn try_dispatch_skips_while_a_writer_holds_the_list() {
        let list: CallbackList<dyn Fn() + Send + Sync> = CallbackList::new();
        list.register(Arc::new(|| {}));

        let guard = list.entries.write();
        assert!(!list.try_dispatch("test", |handler| handler()));
        drop(guard);
        assert!(list.try_dispatch("test", |handler| handler()));
    }

    #[test]
    fn hub_prunes_dropped_subscribers() {
        let hub = EventHub::default();
        let kept = hub.subscribe();
        drop(hub.subscribe());

        hub.publish(EngineEvent::EndOfTrack);
        assert_eq!(kept.try_recv().unwrap(), EngineEvent::EndOfTrack);
        assert_eq!(hub.subscribers.lock().len(), 1);
    }

    #[test]
    fn idle_subscribers_stay_bounded_and_still_hear_the_end() {
        let hub = EventHub::default();
        let rx = hub.subscribe();
        for n in 0..10_000 {
            hub.publish(EngineEvent::Position {
                position: f64::from(n),
                duration: 1e6,
            });
        }
        assert_eq!(rx.len(), POSITION_BACKLOG);

        hub.publish(EngineEvent::EndOfTrack);
        assert_eq!(rx.try_iter().last(), Some(EngineEvent::EndOfTrack));
        assert_eq!(hub.subscribers.lock().len(), 1);
    }
}
