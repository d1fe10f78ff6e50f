use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender, TrySendError};

use super::AudioChunk;

/// Returned when a chunk could not be enqueued; carries the rejected chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferFull(pub AudioChunk);

/// Fixed-capacity FIFO of decoded chunks shared by the decode thread
/// (producer) and the output callback (consumer).
///
/// Cloning yields another handle onto the same queue.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    tx: Sender<AudioChunk>,
    rx: Receiver<AudioChunk>,
    capacity: usize,
}

impl FrameBuffer {
    /// Creates a buffer holding at most `capacity` chunks (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self { tx, rx, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Enqueues a chunk, waiting at most `timeout` for room.
    pub fn push(&self, chunk: AudioChunk, timeout: Duration) -> Result<(), BufferFull> {
        match self.tx.send_timeout(chunk, timeout) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(chunk) | SendTimeoutError::Disconnected(chunk)) => {
                Err(BufferFull(chunk))
            }
        }
    }

    /// Enqueues a chunk only if there is room right now.
    pub fn try_push(&self, chunk: AudioChunk) -> Result<(), BufferFull> {
        match self.tx.try_send(chunk) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(chunk) | TrySendError::Disconnected(chunk)) => {
                Err(BufferFull(chunk))
            }
        }
    }

    /// Dequeues the oldest chunk without blocking.
    pub fn pop(&self) -> Option<AudioChunk> {
        self.rx.try_recv().ok()
    }

    /// Drops every queued chunk and returns how many were discarded.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(tag: f32) -> AudioChunk {
        AudioChunk::new(vec![tag; 4], 2)
    }

    #[test]
    fn preserves_fifo_order() {
        let buffer = FrameBuffer::new(4);
        for tag in [1.0, 2.0, 3.0] {
            buffer.try_push(chunk(tag)).unwrap();
        }

        let order: Vec<f32> = std::iter::from_fn(|| buffer.pop())
            .map(|c| c.samples()[0])
            .collect();
        assert_eq!(order, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn rejects_pushes_beyond_capacity() {
        let buffer = FrameBuffer::new(2);
        buffer.try_push(chunk(1.0)).unwrap();
        buffer.push(chunk(2.0), Duration::from_millis(5)).unwrap();

        let rejected = buffer.push(chunk(3.0), Duration::from_millis(5)).unwrap_err();
        assert_eq!(rejected.0.samples()[0], 3.0);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn clear_drains_everything() {
        let buffer = FrameBuffer::new(4);
        buffer.try_push(chunk(1.0)).unwrap();
        buffer.try_push(chunk(2.0)).unwrap();

        assert_eq!(buffer.clear(), 2);
        assert!(buffer.is_empty());
        assert!(buffer.pop().is_none());
    }

    #[test]
    fn zero_capacity_is_promoted_to_one() {
        let buffer = FrameBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        buffer.try_push(chunk(1.0)).unwrap();
        assert!(buffer.try_push(chunk(2.0)).is_err());
    }

    #[test]
    fn clones_share_the_queue() {
        let producer = FrameBuffer::new(2);
        let consumer = producer.clone();
        producer.try_push(chunk(5.0)).unwrap();
        assert_eq!(consumer.pop().map(|c| c.samples()[0]), Some(5.0));
    }
}
