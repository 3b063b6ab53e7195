//! Speech recognition seam
//!
//! The daemon only needs a streaming recognizer that accepts successive
//! waveforms and now and then reports a finished utterance. Any backend can
//! sit behind `StreamingRecognizer`; the bundled one endpoints on energy and
//! hands each utterance to a batch `Transcriber`.

mod extraction;
mod segmenting;
#[cfg(feature = "whisper")]
mod whisper;

pub use extraction::ResultExtractor;
pub use segmenting::{EndpointConfig, SegmentingRecognizer, Transcriber};
#[cfg(feature = "whisper")]
pub use whisper::{WhisperTranscriber, WHISPER_SAMPLE_RATE};

/// Output of one recognizer call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionResult {
    /// An utterance boundary was reached and `text` is its transcript
    pub is_final: bool,
    /// Decoded text, possibly empty for silence or noise
    pub text: String,
}

impl RecognitionResult {
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            is_final: true,
            text: text.into(),
        }
    }

    #[cfg(test)]
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            is_final: false,
            text: text.into(),
        }
    }
}

/// A recognizer fed sequentially from the recognition thread
pub trait StreamingRecognizer: Send {
    /// Feed the next waveform (16-bit LE mono PCM). `None` means no utterance
    /// boundary yet.
    fn accept_waveform(&mut self, waveform: &[u8]) -> Option<RecognitionResult>;

    /// Drop any partially accumulated utterance
    fn reset(&mut self) {}
}

impl<R: StreamingRecognizer + ?Sized> StreamingRecognizer for Box<R> {
    fn accept_waveform(&mut self, waveform: &[u8]) -> Option<RecognitionResult> {
        (**self).accept_waveform(waveform)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Errors from recognizer backends
#[derive(Debug, thiserror::Error)]
pub enum RecognizerError {
    #[error("model not found at {0}")]
    ModelNotFound(String),

    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("unsupported sample rate {actual} Hz (backend requires {expected} Hz)")]
    SampleRate { expected: u32, actual: u32 },

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("no transcription backend compiled in (rebuild with `--features whisper`)")]
    NoBackend,
}

/// Build the configured recognizer backend for audio at `sample_rate`
#[cfg(feature = "whisper")]
pub fn build_recognizer(
    config: &crate::config::Config,
    sample_rate: u32,
) -> Result<Box<dyn StreamingRecognizer>, RecognizerError> {
    if sample_rate != WHISPER_SAMPLE_RATE {
        return Err(RecognizerError::SampleRate {
            expected: WHISPER_SAMPLE_RATE,
            actual: sample_rate,
        });
    }
    let transcriber = WhisperTranscriber::new(&config.model_path, &config.language)?;
    Ok(Box::new(SegmentingRecognizer::new(
        transcriber,
        EndpointConfig::for_sample_rate(sample_rate),
    )))
}

/// Build the configured recognizer backend for audio at `sample_rate`
#[cfg(not(feature = "whisper"))]
pub fn build_recognizer(
    _config: &crate::config::Config,
    _sample_rate: u32,
) -> Result<Box<dyn StreamingRecognizer>, RecognizerError> {
    Err(RecognizerError::NoBackend)
}

/// Canonical form used for every text comparison: all whitespace removed,
/// lowercased.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<String>().to_lowercase()
}
