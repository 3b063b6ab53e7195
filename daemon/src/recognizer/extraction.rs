//! Drives aggregated audio through the recognizer, one utterance per call

use tracing::{debug, trace};

use super::{normalize_text, StreamingRecognizer};
use crate::audio::ChunkAggregator;

/// Pulls waveforms from the aggregator until the recognizer finalizes an
/// utterance
pub struct ResultExtractor<R> {
    aggregator: ChunkAggregator,
    recognizer: R,
}

impl<R: StreamingRecognizer> ResultExtractor<R> {
    pub fn new(aggregator: ChunkAggregator, recognizer: R) -> Self {
        Self {
            aggregator,
            recognizer,
        }
    }

    /// Return the next finalized, normalized utterance.
    ///
    /// `None` means the queue closed before any final result arrived.
    pub fn next_utterance(&mut self) -> Option<String> {
        for waveform in self.aggregator.by_ref() {
            trace!(
                chunks = waveform.chunk_count(),
                bytes = waveform.as_bytes().len(),
                "feeding recognizer"
            );
            match self.recognizer.accept_waveform(waveform.as_bytes()) {
                Some(result) if result.is_final => {
                    let text = normalize_text(&result.text);
                    debug!(%text, "utterance recognized");
                    return Some(text);
                }
                _ => {}
            }
        }

        debug!("audio queue closed, no result");
        None
    }

    /// Drop queued audio and the recognizer's partial utterance, so sound
    /// played by a notifier is never recognized
    pub fn discard_pending(&mut self) {
        let dropped = self.aggregator.discard_pending();
        self.recognizer.reset();
        debug!(chunks = dropped, "discarded queued audio");
    }

    /// Whether the audio queue has closed
    pub fn is_closed(&self) -> bool {
        self.aggregator.is_closed()
    }
}
