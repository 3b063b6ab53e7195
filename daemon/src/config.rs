//! Configuration loading and management
//!
//! Settings come from `WAKEGATE_*` environment variables with defaults.
//! The wake/exit vocabulary is a JSON file read once at startup. Any error
//! here is fatal: the daemon never starts capturing without a valid
//! vocabulary.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::recognizer::normalize_text;

const DEFAULT_VOCABULARY_PATH: &str = "data/command_data.json";
const DEFAULT_MODEL_PATH: &str = "models/ggml-base.bin";
const DEFAULT_LANGUAGE: &str = "ja";
const DEFAULT_SAMPLE_RATE: u32 = 16_000;
const DEFAULT_BLOCK_SIZE: u32 = 8_000;
const DEFAULT_SETTLE_MS: u64 = 500;

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read vocabulary file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed vocabulary: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("vocabulary must contain at least one wake word")]
    NoWakeWords,

    #[error("blank entry in `{list}` word list")]
    BlankEntry { list: &'static str },

    #[error("`{word}` appears in both wake and exit lists")]
    Overlap { word: String },

    #[error("invalid value for {key}: `{value}` ({message})")]
    InvalidValue {
        key: &'static str,
        value: String,
        message: String,
    },
}

/// Audio device parameters, fixed for the process lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSettings {
    /// Capture rate in Hz; `None` uses the default input device's rate
    pub sample_rate: Option<u32>,
    /// Samples per hardware block
    pub block_size: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: Some(DEFAULT_SAMPLE_RATE),
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the wake/exit vocabulary JSON
    pub vocabulary_path: PathBuf,

    pub audio: AudioSettings,

    /// Transcription model file
    pub model_path: PathBuf,

    /// Recognition language code
    pub language: String,

    /// External program run on every transition
    pub notify_command: Option<String>,

    /// Pause after a notification before listening again
    pub settle: Duration,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let sample_rate = match lookup("WAKEGATE_SAMPLE_RATE") {
            Some(v) if v.trim().eq_ignore_ascii_case("device") => None,
            Some(v) => Some(parse_positive("WAKEGATE_SAMPLE_RATE", &v)?),
            None => Some(DEFAULT_SAMPLE_RATE),
        };
        let block_size = match lookup("WAKEGATE_BLOCK_SIZE") {
            Some(v) => parse_positive("WAKEGATE_BLOCK_SIZE", &v)?,
            None => DEFAULT_BLOCK_SIZE,
        };
        let settle_ms = match lookup("WAKEGATE_SETTLE_MS") {
            Some(v) => v.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                key: "WAKEGATE_SETTLE_MS",
                value: v.clone(),
                message: e.to_string(),
            })?,
            None => DEFAULT_SETTLE_MS,
        };

        Ok(Self {
            vocabulary_path: lookup("WAKEGATE_VOCABULARY")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_VOCABULARY_PATH)),
            audio: AudioSettings {
                sample_rate,
                block_size,
            },
            model_path: lookup("WAKEGATE_MODEL")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            language: lookup("WAKEGATE_LANGUAGE").unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            notify_command: lookup("WAKEGATE_NOTIFY_COMMAND").filter(|c| !c.trim().is_empty()),
            settle: Duration::from_millis(settle_ms),
        })
    }
}

fn parse_positive(key: &'static str, value: &str) -> Result<u32, ConfigError> {
    match value.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        Ok(_) => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            message: "must be greater than zero".into(),
        }),
        Err(e) => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            message: e.to_string(),
        }),
    }
}

/// On-disk vocabulary layout
#[derive(Debug, Deserialize)]
struct VocabularyFile {
    wake: Vec<String>,
    exit: Vec<String>,
}

/// Wake and exit trigger words, normalized, immutable after load
#[derive(Debug, Clone)]
pub struct Vocabulary {
    wake: HashSet<String>,
    exit: HashSet<String>,
}

impl Vocabulary {
    /// Build from word lists. Entries are normalized the same way recognized
    /// text is.
    pub fn new<W, E>(wake: W, exit: E) -> Result<Self, ConfigError>
    where
        W: IntoIterator,
        W::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        let wake = normalize_list(wake, "wake")?;
        let exit = normalize_list(exit, "exit")?;

        if wake.is_empty() {
            return Err(ConfigError::NoWakeWords);
        }
        if let Some(word) = wake.intersection(&exit).next() {
            return Err(ConfigError::Overlap { word: word.clone() });
        }

        Ok(Self { wake, exit })
    }

    /// Parse `{"wake": [...], "exit": [...]}`
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let file: VocabularyFile = serde_json::from_str(json)?;
        Self::new(file.wake, file.exit)
    }

    /// Read and parse a vocabulary file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn is_wake(&self, text: &str) -> bool {
        self.wake.contains(text)
    }

    pub fn is_exit(&self, text: &str) -> bool {
        self.exit.contains(text)
    }

    pub fn wake_count(&self) -> usize {
        self.wake.len()
    }

    pub fn exit_count(&self) -> usize {
        self.exit.len()
    }
}

fn normalize_list<I>(words: I, list: &'static str) -> Result<HashSet<String>, ConfigError>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    words
        .into_iter()
        .map(|w| {
            let normalized = normalize_text(w.as_ref());
            if normalized.is_empty() {
                Err(ConfigError::BlankEntry { list })
            } else {
                Ok(normalized)
            }
        })
        .collect()
}
