//! Energy-based endpointing in front of a batch transcriber
//!
//! Audio is scored in short frames by RMS level. Speech opens an utterance;
//! enough trailing silence (or the length cap) closes it and the collected
//! samples are transcribed in one go.

use tracing::{debug, trace, warn};

use super::{RecognitionResult, RecognizerError, StreamingRecognizer};
use crate::audio::pcm_samples;

/// Batch speech-to-text over one complete utterance
pub trait Transcriber: Send {
    /// Transcribe 16-bit mono samples recorded at `sample_rate`
    fn transcribe(&mut self, samples: &[i16], sample_rate: u32) -> Result<String, RecognizerError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Endpointing thresholds
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub sample_rate: u32,
    /// Analysis frame length
    pub frame_ms: u32,
    /// RMS level (0.0..=1.0) above which a frame counts as speech
    pub speech_threshold: f32,
    /// Utterances with less speech than this are dropped as noise
    pub min_speech_ms: u32,
    /// Silence that ends an utterance
    pub trailing_silence_ms: u32,
    /// Hard cap on utterance length
    pub max_utterance_ms: u32,
}

impl EndpointConfig {
    pub fn for_sample_rate(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    fn samples(&self, ms: u32) -> usize {
        (self.sample_rate as u64 * ms as u64 / 1000) as usize
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_ms: 30,
            speech_threshold: 0.02,
            min_speech_ms: 300,
            trailing_silence_ms: 500,
            max_utterance_ms: 30_000,
        }
    }
}

/// Streaming recognizer built from an endpointer and a `Transcriber`
pub struct SegmentingRecognizer<T> {
    transcriber: T,
    config: EndpointConfig,
    frame_len: usize,
    /// Samples not yet forming a whole frame
    pending: Vec<i16>,
    utterance: Vec<i16>,
    in_speech: bool,
    speech_samples: usize,
    silence_samples: usize,
}

impl<T: Transcriber> SegmentingRecognizer<T> {
    pub fn new(transcriber: T, config: EndpointConfig) -> Self {
        let frame_len = config.samples(config.frame_ms).max(1);
        debug!(
            backend = transcriber.name(),
            sample_rate = config.sample_rate,
            frame_len,
            "segmenting recognizer ready"
        );
        Self {
            transcriber,
            config,
            frame_len,
            pending: Vec::new(),
            utterance: Vec::new(),
            in_speech: false,
            speech_samples: 0,
            silence_samples: 0,
        }
    }

    fn process_frame(&mut self, start: usize) -> Option<RecognitionResult> {
        let frame = &self.pending[start..start + self.frame_len];
        let is_speech = frame_rms(frame) > self.config.speech_threshold;

        if !self.in_speech {
            if is_speech {
                trace!("speech started");
                self.in_speech = true;
                self.utterance.clear();
                self.utterance.extend_from_slice(frame);
                self.speech_samples = frame.len();
                self.silence_samples = 0;
            }
            return None;
        }

        self.utterance.extend_from_slice(frame);
        if is_speech {
            self.speech_samples += frame.len();
            self.silence_samples = 0;
        } else {
            self.silence_samples += frame.len();
        }

        if self.utterance.len() >= self.config.samples(self.config.max_utterance_ms) {
            debug!(samples = self.utterance.len(), "utterance hit length cap");
            return Some(self.finalize());
        }

        if self.silence_samples >= self.config.samples(self.config.trailing_silence_ms) {
            if self.speech_samples >= self.config.samples(self.config.min_speech_ms) {
                return Some(self.finalize());
            }
            trace!(speech_samples = self.speech_samples, "discarding short noise burst");
            self.clear_utterance();
        }

        None
    }

    fn finalize(&mut self) -> RecognitionResult {
        let samples = std::mem::take(&mut self.utterance);
        self.clear_utterance();

        debug!(samples = samples.len(), "utterance complete, transcribing");
        let text = match self.transcriber.transcribe(&samples, self.config.sample_rate) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, backend = self.transcriber.name(), "transcription failed");
                String::new()
            }
        };
        RecognitionResult::final_text(text)
    }

    fn clear_utterance(&mut self) {
        self.in_speech = false;
        self.utterance.clear();
        self.speech_samples = 0;
        self.silence_samples = 0;
    }
}

impl<T: Transcriber> StreamingRecognizer for SegmentingRecognizer<T> {
    fn accept_waveform(&mut self, waveform: &[u8]) -> Option<RecognitionResult> {
        self.pending.extend(pcm_samples(waveform));

        let mut consumed = 0;
        let mut result = None;
        while self.pending.len() - consumed >= self.frame_len {
            result = self.process_frame(consumed);
            consumed += self.frame_len;
            if result.is_some() {
                // Leftover audio belongs to the next utterance
                break;
            }
        }
        self.pending.drain(..consumed);

        result
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.clear_utterance();
    }
}

/// Root-mean-square level of a frame, normalized to 0.0..=1.0
fn frame_rms(frame: &[i16]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f64 = frame
        .iter()
        .map(|&s| {
            let v = s as f64 / 32768.0;
            v * v
        })
        .sum();
    (sum / frame.len() as f64).sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioChunk;

    struct MockTranscriber {
        response: Result<String, ()>,
        calls: Vec<usize>,
    }

    impl MockTranscriber {
        fn replying(text: &str) -> Self {
            Self {
                response: Ok(text.to_string()),
                calls: Vec::new(),
            }
        }

        fn failing() -> Self {
            Self {
                response: Err(()),
                calls: Vec::new(),
            }
        }
    }

    impl Transcriber for MockTranscriber {
        fn transcribe(&mut self, samples: &[i16], _sample_rate: u32) -> Result<String, RecognizerError> {
            self.calls.push(samples.len());
            self.response
                .clone()
                .map_err(|_| RecognizerError::Inference("mock failure".into()))
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    /// `ms` of 16 kHz audio as PCM bytes
    fn tone(ms: usize) -> Vec<u8> {
        let samples: Vec<i16> = (0..ms * 16)
            .map(|i| if i % 2 == 0 { 16_000 } else { -16_000 })
            .collect();
        AudioChunk::from_samples(&samples).as_bytes().to_vec()
    }

    fn silence(ms: usize) -> Vec<u8> {
        vec![0u8; ms * 16 * 2]
    }

    #[test]
    fn test_frame_rms() {
        assert_eq!(frame_rms(&[]), 0.0);
        assert_eq!(frame_rms(&[0, 0, 0]), 0.0);
        let level = frame_rms(&[16_384, -16_384]);
        assert!((level - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_speech_then_silence_finalizes() {
        let mut rec = SegmentingRecognizer::new(
            MockTranscriber::replying("今何時ですか"),
            EndpointConfig::default(),
        );

        assert_eq!(rec.accept_waveform(&tone(500)), None);
        let result = rec.accept_waveform(&silence(600));

        assert_eq!(result, Some(RecognitionResult::final_text("今何時ですか")));
        assert_eq!(rec.transcriber.calls.len(), 1);
        assert!(rec.transcriber.calls[0] >= 8_000);
    }

    #[test]
    fn test_silence_alone_never_finalizes() {
        let mut rec =
            SegmentingRecognizer::new(MockTranscriber::replying("x"), EndpointConfig::default());

        for _ in 0..10 {
            assert_eq!(rec.accept_waveform(&silence(500)), None);
        }
        assert!(rec.transcriber.calls.is_empty());
    }

    #[test]
    fn test_short_blip_is_discarded() {
        let mut rec =
            SegmentingRecognizer::new(MockTranscriber::replying("x"), EndpointConfig::default());

        assert_eq!(rec.accept_waveform(&tone(100)), None);
        assert_eq!(rec.accept_waveform(&silence(600)), None);
        assert!(rec.transcriber.calls.is_empty());
        assert!(!rec.in_speech);
    }

    #[test]
    fn test_length_cap_forces_final() {
        let config = EndpointConfig {
            max_utterance_ms: 1_000,
            ..EndpointConfig::default()
        };
        let mut rec = SegmentingRecognizer::new(MockTranscriber::replying("long"), config);

        let result = rec.accept_waveform(&tone(1_200));
        assert_eq!(result, Some(RecognitionResult::final_text("long")));
        assert!(rec.transcriber.calls[0] < 19_200);
    }

    #[test]
    fn test_transcriber_error_yields_empty_final() {
        let mut rec =
            SegmentingRecognizer::new(MockTranscriber::failing(), EndpointConfig::default());

        rec.accept_waveform(&tone(500));
        let result = rec.accept_waveform(&silence(600));
        assert_eq!(result, Some(RecognitionResult::final_text("")));
    }

    #[test]
    fn test_waveforms_split_mid_frame() {
        let mut rec =
            SegmentingRecognizer::new(MockTranscriber::replying("ok"), EndpointConfig::default());

        // Odd-sized pieces that never line up with the 480-sample frame
        let mut audio = tone(500);
        audio.extend(silence(600));
        let mut finals = 0;
        for piece in audio.chunks(1_234) {
            if rec.accept_waveform(piece).is_some() {
                finals += 1;
            }
        }
        assert_eq!(finals, 1);
    }

    #[test]
    fn test_reset_drops_partial_utterance() {
        let mut rec =
            SegmentingRecognizer::new(MockTranscriber::replying("x"), EndpointConfig::default());

        rec.accept_waveform(&tone(500));
        assert!(rec.in_speech);
        rec.reset();
        assert!(!rec.in_speech);
        assert!(rec.pending.is_empty());

        // Silence after a reset has nothing to finalize
        assert_eq!(rec.accept_waveform(&silence(600)), None);
        assert!(rec.transcriber.calls.is_empty());
    }

    #[test]
    fn test_for_sample_rate_scales_frames() {
        let rec = SegmentingRecognizer::new(
            MockTranscriber::replying(""),
            EndpointConfig::for_sample_rate(48_000),
        );
        assert_eq!(rec.frame_len, 1_440);
    }
}
