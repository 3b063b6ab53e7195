//! Notification sinks fired on every session transition
//!
//! Sinks are fire-and-forget. A failing sink is logged by the caller and
//! never interrupts capture.

use std::process::{Command, Stdio};
use std::thread;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::events::TransitionEvent;

/// Errors a sink may report
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("failed to spawn notifier `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Receives session transition events
pub trait NotificationSink: Send {
    fn notify(&self, event: &TransitionEvent) -> Result<(), NotifyError>;
}

/// Publishes events on a broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<TransitionEvent>,
}

impl BroadcastSink {
    pub fn new(tx: broadcast::Sender<TransitionEvent>) -> Self {
        Self { tx }
    }
}

impl NotificationSink for BroadcastSink {
    fn notify(&self, event: &TransitionEvent) -> Result<(), NotifyError> {
        // No subscribers is fine
        if self.tx.send(event.clone()).is_err() {
            debug!(%event, "no event subscribers");
        }
        Ok(())
    }
}

/// Runs an external program (a chime player, a TTS script, an LED helper)
/// with the event name as its last argument. The child is reaped on a
/// background thread; `notify` never waits for it.
#[derive(Debug, Clone)]
pub struct CommandSink {
    program: String,
    args: Vec<String>,
}

impl CommandSink {
    /// Build from a whitespace-separated command line
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl NotificationSink for CommandSink {
    fn notify(&self, event: &TransitionEvent) -> Result<(), NotifyError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(event.name())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|source| NotifyError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        let pid = child.id();
        debug!(program = %self.program, pid, "notifier spawned");

        let program = self.program.clone();
        thread::Builder::new()
            .name("notifier-reaper".to_string())
            .spawn(move || match child.wait() {
                Ok(status) if status.success() => {}
                Ok(status) => warn!(%program, pid, %status, "notifier exited unsuccessfully"),
                Err(e) => warn!(%program, pid, error = %e, "failed to wait for notifier"),
            })
            .map_err(|source| NotifyError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        Ok(())
    }
}

/// Delivers each event to several sinks, continuing past failures and
/// reporting the first one
#[derive(Default)]
pub struct SinkSet {
    sinks: Vec<Box<dyn NotificationSink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl NotificationSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }
}

impl NotificationSink for SinkSet {
    fn notify(&self, event: &TransitionEvent) -> Result<(), NotifyError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.notify(event) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
