//! Events module for session transitions
//!
//! One event is produced per state change of the wake state machine and
//! handed to the notification sink.

use serde::{Deserialize, Serialize};

/// Events emitted by the wake state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionEvent {
    /// A wake word was heard; command capture begins
    WakeAcknowledged,

    /// A command was captured; the session returns to waiting for a wake word
    CommandCaptured {
        /// Normalized command text
        command: String,
        /// Time spent capturing, in milliseconds
        duration_ms: u64,
    },

    /// An exit word ended the session without a command
    SessionEnded {
        /// Time spent capturing, in milliseconds
        duration_ms: u64,
    },
}

impl TransitionEvent {
    /// Short machine-friendly name, also passed to external notifiers
    pub fn name(&self) -> &'static str {
        match self {
            TransitionEvent::WakeAcknowledged => "wake_acknowledged",
            TransitionEvent::CommandCaptured { .. } => "command_captured",
            TransitionEvent::SessionEnded { .. } => "session_ended",
        }
    }
}

impl std::fmt::Display for TransitionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionEvent::WakeAcknowledged => write!(f, "WAKE_ACKNOWLEDGED"),
            TransitionEvent::CommandCaptured { command, duration_ms } => {
                write!(f, "COMMAND_CAPTURED \"{}\" ({}ms)", command, duration_ms)
            }
            TransitionEvent::SessionEnded { duration_ms } => {
                write!(f, "SESSION_ENDED ({}ms)", duration_ms)
            }
        }
    }
}
