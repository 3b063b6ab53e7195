//! State machine module for the wake/command session
//!
//! Provides an explicit state machine with two states:
//! - AwaitingWake: Default state, recognized text is ignored unless it is a wake word
//! - CapturingCommand: Single-shot, the next utterance is the command (or an exit word)

mod machine;
mod session;

pub use machine::{SessionState, WakeStateMachine};
pub use session::{CycleOutcome, WakeSession};
