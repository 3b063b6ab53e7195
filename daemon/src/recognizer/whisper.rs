//! whisper.cpp transcription backend

use std::path::Path;
use std::sync::Once;

use tracing::info;
use whisper_rs::{
    install_logging_hooks, FullParams, SamplingStrategy, WhisperContext,
    WhisperContextParameters,
};

use super::{RecognizerError, Transcriber};

/// whisper.cpp only accepts 16 kHz input
pub const WHISPER_SAMPLE_RATE: u32 = 16_000;

static LOGGING_HOOKS: Once = Once::new();

/// Transcribes utterances with a local ggml Whisper model
pub struct WhisperTranscriber {
    context: WhisperContext,
    language: String,
    model_name: String,
}

impl WhisperTranscriber {
    /// Load a model from disk
    pub fn new(model_path: &Path, language: &str) -> Result<Self, RecognizerError> {
        // Route whisper.cpp's own output away from stderr
        LOGGING_HOOKS.call_once(install_logging_hooks);

        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let path = model_path
            .to_str()
            .ok_or_else(|| RecognizerError::ModelLoad("model path is not valid UTF-8".into()))?;
        let context = WhisperContext::new_with_params(path, WhisperContextParameters::default())
            .map_err(|e| RecognizerError::ModelLoad(e.to_string()))?;

        let model_name = model_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("whisper")
            .to_string();

        info!(model = %model_name, language, "whisper model loaded");

        Ok(Self {
            context,
            language: language.to_string(),
            model_name,
        })
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(&mut self, samples: &[i16], sample_rate: u32) -> Result<String, RecognizerError> {
        if sample_rate != WHISPER_SAMPLE_RATE {
            return Err(RecognizerError::SampleRate {
                expected: WHISPER_SAMPLE_RATE,
                actual: sample_rate,
            });
        }

        let audio: Vec<f32> = samples.iter().map(|&s| s as f32 / 32768.0).collect();

        let mut state = self
            .context
            .create_state()
            .map_err(|e| RecognizerError::Inference(e.to_string()))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(self.language.as_str()));
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, &audio)
            .map_err(|e| RecognizerError::Inference(e.to_string()))?;

        let mut text = String::new();
        for segment in state.as_iter() {
            text.push_str(&segment.to_string());
        }
        Ok(text.trim().to_string())
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}
