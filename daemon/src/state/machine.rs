//! Core state machine implementation
//!
//! Handles transitions between AwaitingWake and CapturingCommand based on
//! normalized recognized text.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::Vocabulary;
use crate::events::TransitionEvent;
use crate::notify::NotificationSink;

/// The two session states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Dormant, listening only for a wake word
    #[default]
    AwaitingWake,
    /// Woken, the next utterance is the command
    CapturingCommand,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::AwaitingWake => write!(f, "AwaitingWake"),
            SessionState::CapturingCommand => write!(f, "CapturingCommand"),
        }
    }
}

/// The state machine that gates recognized text on wake and exit words
pub struct WakeStateMachine {
    /// Current state
    state: SessionState,
    vocabulary: Vocabulary,
    /// Time when CapturingCommand was entered
    capture_started_at: Option<Instant>,
    sink: Box<dyn NotificationSink>,
}

impl WakeStateMachine {
    /// Create a new state machine in AwaitingWake
    pub fn new(vocabulary: Vocabulary, sink: Box<dyn NotificationSink>) -> Self {
        Self {
            state: SessionState::AwaitingWake,
            vocabulary,
            capture_started_at: None,
            sink,
        }
    }

    /// Get the current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Feed one normalized utterance.
    ///
    /// Returns the transition it caused, if any. Empty text never changes
    /// state.
    pub fn feed(&mut self, text: &str) -> Option<TransitionEvent> {
        if text.is_empty() {
            return None;
        }

        let event = match self.state {
            SessionState::AwaitingWake => self.compute_from_awaiting_wake(text),
            SessionState::CapturingCommand => self.compute_from_capturing(text),
        }?;

        self.transition(&event);
        Some(event)
    }

    fn compute_from_awaiting_wake(&self, text: &str) -> Option<TransitionEvent> {
        if self.vocabulary.is_wake(text) {
            Some(TransitionEvent::WakeAcknowledged)
        } else {
            debug!(%text, "ignoring speech while awaiting wake word");
            None
        }
    }

    fn compute_from_capturing(&self, text: &str) -> Option<TransitionEvent> {
        let duration_ms = self
            .capture_started_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);

        // Capture is single-shot: anything but an exit word is the command
        if self.vocabulary.is_exit(text) {
            Some(TransitionEvent::SessionEnded { duration_ms })
        } else {
            Some(TransitionEvent::CommandCaptured {
                command: text.to_string(),
                duration_ms,
            })
        }
    }

    /// Perform the state change for an event and notify the sink
    fn transition(&mut self, event: &TransitionEvent) {
        let old_state = self.state;
        let new_state = match event {
            TransitionEvent::WakeAcknowledged => SessionState::CapturingCommand,
            TransitionEvent::CommandCaptured { .. } | TransitionEvent::SessionEnded { .. } => {
                SessionState::AwaitingWake
            }
        };

        info!(from = %old_state, to = %new_state, %event, "state transition");

        self.state = new_state;
        self.capture_started_at = match new_state {
            SessionState::CapturingCommand => Some(Instant::now()),
            SessionState::AwaitingWake => None,
        };

        if let Err(e) = self.sink.notify(event) {
            warn!(error = %e, "notification failed");
        }
    }
}
