//! wakegate-daemon: wake-word gated voice command capture
//!
//! This daemon listens to the default microphone and provides:
//! - Continuous capture into a lock-free hand-off queue
//! - Streaming recognition, one utterance at a time
//! - An explicit two-state session (awaiting wake word, capturing command)
//! - Notifications on every transition
//!
//! Each captured command is printed to stdout, one per line. Logs go to
//! stderr.

mod audio;
mod config;
mod events;
mod lifecycle;
mod notify;
mod recognizer;
mod state;

use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::audio::{
    audio_chunk_queue, resolve_sample_rate, AudioCaptureSource, CaptureError, ChunkAggregator,
    ChunkConsumer, ChunkProducer,
};
use crate::config::{Config, Vocabulary};
use crate::events::TransitionEvent;
use crate::lifecycle::ShutdownSignal;
use crate::notify::{BroadcastSink, CommandSink, SinkSet};
use crate::recognizer::{build_recognizer, ResultExtractor, StreamingRecognizer};
use crate::state::{CycleOutcome, WakeSession, WakeStateMachine};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .with_writer(std::io::stderr)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "wakegate-daemon starting"
    );

    // Load configuration; any failure here is fatal
    let config = Config::load().context("failed to load configuration")?;
    let vocabulary = Vocabulary::load(&config.vocabulary_path)
        .with_context(|| format!("failed to load vocabulary from {}", config.vocabulary_path.display()))?;
    info!(
        path = %config.vocabulary_path.display(),
        wake_words = vocabulary.wake_count(),
        exit_words = vocabulary.exit_count(),
        "vocabulary loaded"
    );

    let sample_rate = resolve_sample_rate(&config.audio).context("failed to select sample rate")?;
    let recognizer = build_recognizer(&config, sample_rate).context("failed to start recognizer")?;

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    // State machine -> main loop (transition events)
    let (event_tx, mut event_rx) = broadcast::channel::<TransitionEvent>(64);
    // Recognition thread -> main loop (captured commands)
    let (command_tx, mut command_rx) = mpsc::channel::<String>(32);

    let mut sinks = SinkSet::new().with(BroadcastSink::new(event_tx.clone()));
    if let Some(sink) = config.notify_command.as_deref().and_then(CommandSink::from_command_line) {
        sinks = sinks.with(sink);
    }
    debug!(sinks = sinks.len(), "notification sinks configured");

    let machine = WakeStateMachine::new(vocabulary, Box::new(sinks));
    let (producer, consumer) = audio_chunk_queue();
    let closer = producer.clone();

    let recognition = Recognition {
        producer,
        consumer,
        recognizer,
        machine,
        sample_rate,
        block_size: config.audio.block_size,
        settle: config.settle,
        command_tx,
    };
    let recognition_thread = thread::Builder::new()
        .name("recognition".to_string())
        .spawn(move || recognition.run())
        .context("failed to spawn recognition thread")?;

    info!("daemon initialized, entering main loop");

    let shutdown_wait = shutdown.wait();
    tokio::pin!(shutdown_wait);

    // Main event loop
    loop {
        tokio::select! {
            // Deliver captured commands to the caller
            command = command_rx.recv() => match command {
                Some(command) => println!("{command}"),
                None => {
                    info!("recognition thread exited");
                    break;
                }
            },

            event = event_rx.recv() => match event {
                Ok(event) => debug!(%event, "session event"),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "session event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {}
            },

            // Wait for shutdown signal
            signal = &mut shutdown_wait => {
                match signal {
                    Ok(name) => info!(signal = name, "shutdown signal received"),
                    Err(e) => error!(error = %e, "failed to listen for shutdown signals"),
                }
                break;
            }
        }
    }

    // Cleanup
    info!("shutting down...");
    closer.close();

    let joined = tokio::task::spawn_blocking(move || recognition_thread.join())
        .await
        .context("failed to join recognition thread")?;
    match joined {
        Ok(result) => result.context("audio capture failed")?,
        Err(_) => return Err(anyhow!("recognition thread panicked")),
    }

    info!("wakegate-daemon stopped");

    Ok(())
}

/// Everything the recognition thread owns
struct Recognition {
    producer: ChunkProducer,
    consumer: ChunkConsumer,
    recognizer: Box<dyn StreamingRecognizer>,
    machine: WakeStateMachine,
    sample_rate: u32,
    block_size: u32,
    settle: Duration,
    command_tx: mpsc::Sender<String>,
}

impl Recognition {
    /// Open the microphone and run session cycles until the queue closes.
    ///
    /// The capture stream lives on this thread and is stopped when it
    /// returns, on every path.
    fn run(self) -> Result<(), CaptureError> {
        let source = AudioCaptureSource::new(self.producer, self.sample_rate, self.block_size);
        let stream = source.open()?;

        let extractor = ResultExtractor::new(ChunkAggregator::new(self.consumer), self.recognizer);
        let mut session = WakeSession::new(extractor, self.machine, self.settle);

        loop {
            match session.run_one_cycle() {
                CycleOutcome::Command(command) => {
                    info!(%command, "command captured");
                    if self.command_tx.blocking_send(command).is_err() {
                        warn!("command receiver closed");
                        break;
                    }
                }
                CycleOutcome::SessionEnded => {
                    info!("session ended without a command");
                }
                CycleOutcome::Closed => break,
            }
        }

        info!(
            state = %session.state(),
            device_errors = stream.device_errors(),
            "recognition loop finished"
        );
        stream.close();
        Ok(())
    }
}
