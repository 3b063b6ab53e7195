//! Greedy chunk aggregation
//!
//! Each cycle blocks for one chunk, then drains whatever else is already
//! queued and hands the recognizer a single merged waveform.

use tracing::{debug, trace};

use super::{AggregatedWaveform, ChunkConsumer};

/// Iterator of aggregated waveforms; ends when the queue closes
#[derive(Debug)]
pub struct ChunkAggregator {
    consumer: ChunkConsumer,
}

impl ChunkAggregator {
    pub fn new(consumer: ChunkConsumer) -> Self {
        Self { consumer }
    }

    /// Whether the underlying queue has been closed
    pub fn is_closed(&self) -> bool {
        self.consumer.is_closed()
    }

    /// Throw away every chunk queued so far, returning how many were dropped
    pub fn discard_pending(&mut self) -> usize {
        let mut dropped = 0;
        while let Ok(Some(_)) = self.consumer.try_pop() {
            dropped += 1;
        }
        dropped
    }
}

impl Iterator for ChunkAggregator {
    type Item = AggregatedWaveform;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.consumer.pop_blocking().ok()?;
        let mut bytes = first.as_bytes().to_vec();
        let mut chunks = 1;

        loop {
            match self.consumer.try_pop() {
                Ok(Some(chunk)) => {
                    bytes.extend_from_slice(chunk.as_bytes());
                    chunks += 1;
                }
                Ok(None) => break,
                Err(_) => {
                    debug!(chunks, "queue closed mid-cycle, discarding partial waveform");
                    return None;
                }
            }
        }

        trace!(chunks, bytes = bytes.len(), "aggregated waveform");
        Some(AggregatedWaveform { bytes, chunks })
    }
}

impl std::iter::FusedIterator for ChunkAggregator {}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::audio::{audio_chunk_queue, AudioChunk};

    #[test]
    fn test_drains_all_pending_chunks_into_one_waveform() {
        let (tx, rx) = audio_chunk_queue();
        for i in 0..5u8 {
            tx.push(AudioChunk::from(vec![i, i + 10]));
        }

        let mut aggregator = ChunkAggregator::new(rx);
        let waveform = aggregator.next().unwrap();

        assert_eq!(waveform.as_bytes(), &[0, 10, 1, 11, 2, 12, 3, 13, 4, 14]);
        assert_eq!(waveform.chunk_count(), 5);
    }

    #[test]
    fn test_single_chunk_cycle() {
        let (tx, rx) = audio_chunk_queue();
        tx.push(AudioChunk::from(vec![9, 9]));

        let mut aggregator = ChunkAggregator::new(rx);
        let waveform = aggregator.next().unwrap();
        assert_eq!(waveform.chunk_count(), 1);
        assert_eq!(waveform.as_bytes(), &[9, 9]);
    }

    #[test]
    fn test_successive_cycles_preserve_order() {
        let (tx, rx) = audio_chunk_queue();
        let mut aggregator = ChunkAggregator::new(rx);

        tx.push(AudioChunk::from(vec![1]));
        tx.push(AudioChunk::from(vec![2]));
        assert_eq!(aggregator.next().unwrap().as_bytes(), &[1, 2]);

        tx.push(AudioChunk::from(vec![3]));
        assert_eq!(aggregator.next().unwrap().as_bytes(), &[3]);
    }

    #[test]
    fn test_close_while_waiting_ends_sequence() {
        let (tx, rx) = audio_chunk_queue();
        let closer = tx.clone();

        let handle = thread::spawn(move || {
            let mut aggregator = ChunkAggregator::new(rx);
            let first = aggregator.next();
            (first, aggregator.next(), aggregator.is_closed())
        });

        thread::sleep(Duration::from_millis(20));
        closer.close();

        let (first, second, closed) = handle.join().unwrap();
        assert!(first.is_none());
        assert!(second.is_none());
        assert!(closed);
        drop(tx);
    }

    #[test]
    fn test_discard_pending_empties_queue() {
        let (tx, rx) = audio_chunk_queue();
        let mut aggregator = ChunkAggregator::new(rx);

        tx.push(AudioChunk::from(vec![1]));
        tx.push(AudioChunk::from(vec![2]));
        assert_eq!(aggregator.discard_pending(), 2);
        assert_eq!(aggregator.discard_pending(), 0);

        tx.push(AudioChunk::from(vec![3]));
        assert_eq!(aggregator.next().unwrap().as_bytes(), &[3]);
    }

    #[test]
    fn test_close_mid_drain_discards_partial_cycle() {
        let (tx, rx) = audio_chunk_queue();
        tx.push(AudioChunk::from(vec![1]));
        tx.push(AudioChunk::from(vec![2]));
        tx.close();

        let mut aggregator = ChunkAggregator::new(rx);
        assert!(aggregator.next().is_none());
        assert!(aggregator.is_closed());
    }
}
