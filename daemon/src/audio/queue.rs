//! Hand-off queue between the audio callback and the recognition thread
//!
//! Unbounded: the producer never blocks and never sees backpressure, so a
//! stalled consumer lets the queue grow without limit.

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use super::AudioChunk;

/// Messages carried by the queue
#[derive(Debug)]
enum Message {
    Chunk(AudioChunk),
    Close,
}

/// Returned once the queue has been closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("audio chunk queue is closed")]
pub struct QueueClosed;

/// Create a new audio chunk queue
pub fn audio_chunk_queue() -> (ChunkProducer, ChunkConsumer) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (
        ChunkProducer { tx },
        ChunkConsumer { rx, closed: false },
    )
}

/// Producer side, handed to the capture callback
#[derive(Debug, Clone)]
pub struct ChunkProducer {
    tx: Sender<Message>,
}

impl ChunkProducer {
    /// Append a chunk. Never blocks; chunks pushed after the consumer is gone
    /// are dropped.
    pub fn push(&self, chunk: AudioChunk) {
        let _ = self.tx.send(Message::Chunk(chunk));
    }

    /// Close the queue behind any chunks already pushed
    pub fn close(&self) {
        let _ = self.tx.send(Message::Close);
    }
}

/// Consumer side, owned by the single recognition thread
#[derive(Debug)]
pub struct ChunkConsumer {
    rx: Receiver<Message>,
    closed: bool,
}

impl ChunkConsumer {
    /// Block until a chunk is available or the queue is closed
    pub fn pop_blocking(&mut self) -> Result<AudioChunk, QueueClosed> {
        if self.closed {
            return Err(QueueClosed);
        }
        match self.rx.recv() {
            Ok(Message::Chunk(chunk)) => Ok(chunk),
            // Close marker, or every producer has been dropped
            Ok(Message::Close) | Err(_) => self.mark_closed(),
        }
    }

    /// Take a chunk if one is ready, without blocking
    pub fn try_pop(&mut self) -> Result<Option<AudioChunk>, QueueClosed> {
        if self.closed {
            return Err(QueueClosed);
        }
        match self.rx.try_recv() {
            Ok(Message::Chunk(chunk)) => Ok(Some(chunk)),
            Err(TryRecvError::Empty) => Ok(None),
            Ok(Message::Close) | Err(TryRecvError::Disconnected) => self.mark_closed(),
        }
    }

    /// Whether the close marker has been observed
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn mark_closed<T>(&mut self) -> Result<T, QueueClosed> {
        self.closed = true;
        Err(QueueClosed)
    }
}
