//! Audio module: microphone capture and chunk aggregation
//!
//! The capture callback pushes one `AudioChunk` per hardware block into the
//! chunk queue; the recognition thread drains it through `ChunkAggregator`.
//! Samples are 16-bit little-endian mono PCM throughout.

mod aggregator;
mod capture;
mod queue;

pub use aggregator::ChunkAggregator;
pub use capture::{resolve_sample_rate, AudioCaptureSource, CaptureError, CaptureStream};
pub use queue::{audio_chunk_queue, ChunkConsumer, ChunkProducer, QueueClosed};

/// One hardware-delivered block of PCM bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk(Box<[u8]>);

impl AudioChunk {
    /// Copy a block of samples into a new chunk
    pub fn from_samples(samples: &[i16]) -> Self {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self(bytes.into_boxed_slice())
    }

    /// Raw bytes of the chunk
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for AudioChunk {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into_boxed_slice())
    }
}

/// Every chunk drained in one aggregation cycle, concatenated in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedWaveform {
    bytes: Vec<u8>,
    chunks: usize,
}

impl AggregatedWaveform {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of chunks merged into this waveform
    pub fn chunk_count(&self) -> usize {
        self.chunks
    }
}

/// Decode little-endian 16-bit PCM bytes. A trailing odd byte is ignored.
pub fn pcm_samples(bytes: &[u8]) -> impl Iterator<Item = i16> + '_ {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
}
