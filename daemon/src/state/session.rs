//! Drives recognition into the state machine, one cycle per captured command

use std::time::Duration;

use tracing::info;

use super::{SessionState, WakeStateMachine};
use crate::events::TransitionEvent;
use crate::recognizer::{ResultExtractor, StreamingRecognizer};

/// Result of one `run_one_cycle` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A command was captured after a wake word
    Command(String),
    /// An exit word ended the session with no command
    SessionEnded,
    /// The audio queue closed; no further cycles will produce anything
    Closed,
}

/// A wake-gated session over a recognizer
pub struct WakeSession<R> {
    extractor: ResultExtractor<R>,
    machine: WakeStateMachine,
    /// Pause after each notification so the chime is not heard as speech
    settle: Duration,
}

impl<R: StreamingRecognizer> WakeSession<R> {
    pub fn new(extractor: ResultExtractor<R>, machine: WakeStateMachine, settle: Duration) -> Self {
        Self {
            extractor,
            machine,
            settle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    /// Block until a command is captured or an exit word ends the session.
    ///
    /// Waits indefinitely for a wake word. Returns `Closed` once the audio
    /// queue has closed.
    pub fn run_one_cycle(&mut self) -> CycleOutcome {
        announce(self.machine.state());

        loop {
            // A closed queue counts as silence
            let text = self.extractor.next_utterance().unwrap_or_default();

            if let Some(event) = self.machine.feed(&text) {
                self.settle();
                match event {
                    TransitionEvent::WakeAcknowledged => {
                        announce(self.machine.state());
                    }
                    TransitionEvent::CommandCaptured { command, .. } => {
                        return CycleOutcome::Command(command);
                    }
                    TransitionEvent::SessionEnded { .. } => {
                        return CycleOutcome::SessionEnded;
                    }
                }
            }

            if self.extractor.is_closed() {
                return CycleOutcome::Closed;
            }
        }
    }

    /// Wait out the notification, then drop whatever the microphone picked
    /// up meanwhile
    fn settle(&mut self) {
        if !self.settle.is_zero() {
            std::thread::sleep(self.settle);
            self.extractor.discard_pending();
        }
    }
}

fn announce(state: SessionState) {
    match state {
        SessionState::AwaitingWake => info!("waiting for wake word"),
        SessionState::CapturingCommand => info!("listening for a command"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::audio::{audio_chunk_queue, AudioChunk, ChunkAggregator, ChunkProducer};
    use crate::config::Vocabulary;
    use crate::notify::{NotificationSink, NotifyError};
    use crate::recognizer::RecognitionResult;

    /// Finalizes one scripted utterance per waveform. Each call queues the
    /// next chunk, or closes the queue when the script runs out, so every
    /// waveform holds exactly one chunk.
    struct ScriptedRecognizer {
        script: VecDeque<&'static str>,
        producer: ChunkProducer,
    }

    impl StreamingRecognizer for ScriptedRecognizer {
        fn accept_waveform(&mut self, _: &[u8]) -> Option<RecognitionResult> {
            let text = self.script.pop_front()?;
            if self.script.is_empty() {
                self.producer.close();
            } else {
                self.producer.push(AudioChunk::from(vec![0, 0]));
            }
            Some(RecognitionResult::final_text(text))
        }
    }

    #[derive(Clone, Default)]
    struct CountingSink(Arc<Mutex<Vec<TransitionEvent>>>);

    impl NotificationSink for CountingSink {
        fn notify(&self, event: &TransitionEvent) -> Result<(), NotifyError> {
            self.0.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn session(script: &[&'static str]) -> (WakeSession<ScriptedRecognizer>, CountingSink) {
        let (tx, rx) = audio_chunk_queue();
        tx.push(AudioChunk::from(vec![0, 0]));

        let recognizer = ScriptedRecognizer {
            script: script.iter().copied().collect(),
            producer: tx,
        };
        let vocabulary = Vocabulary::new(["おはよう"], ["終了"]).unwrap();
        let sink = CountingSink::default();
        let machine = WakeStateMachine::new(vocabulary, Box::new(sink.clone()));
        let extractor = ResultExtractor::new(ChunkAggregator::new(rx), recognizer);

        (WakeSession::new(extractor, machine, Duration::ZERO), sink)
    }

    #[test]
    fn test_cycle_returns_captured_command() {
        let (mut session, sink) = session(&["hello", "お は よ う", "", "今何時 ですか", "extra"]);

        assert_eq!(
            session.run_one_cycle(),
            CycleOutcome::Command("今何時ですか".into())
        );
        assert_eq!(session.state(), SessionState::AwaitingWake);
        assert_eq!(sink.0.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_cycle_returns_on_exit_word() {
        let (mut session, sink) = session(&["おはよう", "終了", "extra"]);

        assert_eq!(session.run_one_cycle(), CycleOutcome::SessionEnded);
        assert_eq!(session.state(), SessionState::AwaitingWake);

        let events = sink.0.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], TransitionEvent::SessionEnded { .. }));
    }

    #[test]
    fn test_repeated_cycles_service_a_perpetual_session() {
        let (mut session, _) = session(&["おはよう", "天気", "雑音", "おはよう", "終了", "おはよう", "時間"]);

        assert_eq!(session.run_one_cycle(), CycleOutcome::Command("天気".into()));
        assert_eq!(session.run_one_cycle(), CycleOutcome::SessionEnded);
        assert_eq!(session.run_one_cycle(), CycleOutcome::Command("時間".into()));
        assert_eq!(session.run_one_cycle(), CycleOutcome::Closed);
        assert_eq!(session.run_one_cycle(), CycleOutcome::Closed);
    }

    /// Recognizes fixed byte markers, recording every waveform it is fed
    struct MarkerRecognizer {
        fed: Arc<Mutex<Vec<Vec<u8>>>>,
        resets: Arc<Mutex<usize>>,
    }

    impl StreamingRecognizer for MarkerRecognizer {
        fn accept_waveform(&mut self, waveform: &[u8]) -> Option<RecognitionResult> {
            self.fed.lock().unwrap().push(waveform.to_vec());
            let text = match waveform.first() {
                Some(1) => "おはよう",
                Some(2) => "今何時ですか",
                _ => "ピンポン",
            };
            Some(RecognitionResult::final_text(text))
        }

        fn reset(&mut self) {
            *self.resets.lock().unwrap() += 1;
        }
    }

    /// Plays a "chime" into the microphone on every notification
    struct ChimeSink(ChunkProducer);

    impl NotificationSink for ChimeSink {
        fn notify(&self, _: &TransitionEvent) -> Result<(), NotifyError> {
            self.0.push(AudioChunk::from(vec![0xCC]));
            Ok(())
        }
    }

    #[test]
    fn test_settle_discards_audio_heard_during_notification() {
        let (tx, rx) = audio_chunk_queue();
        let fed = Arc::new(Mutex::new(Vec::new()));
        let resets = Arc::new(Mutex::new(0));
        let recognizer = MarkerRecognizer {
            fed: Arc::clone(&fed),
            resets: Arc::clone(&resets),
        };

        let vocabulary = Vocabulary::new(["おはよう"], ["終了"]).unwrap();
        let machine = WakeStateMachine::new(vocabulary, Box::new(ChimeSink(tx.clone())));
        let extractor = ResultExtractor::new(ChunkAggregator::new(rx), recognizer);
        let mut session = WakeSession::new(extractor, machine, Duration::from_millis(50));

        tx.push(AudioChunk::from(vec![1]));
        let speaker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            tx.push(AudioChunk::from(vec![2]));
            tx
        });

        assert_eq!(
            session.run_one_cycle(),
            CycleOutcome::Command("今何時ですか".into())
        );
        let _tx = speaker.join().unwrap();

        assert_eq!(*fed.lock().unwrap(), vec![vec![1], vec![2]]);
        // Once after the wake chime, once after the command chime
        assert_eq!(*resets.lock().unwrap(), 2);
    }

    #[test]
    fn test_closed_queue_while_awaiting_wake() {
        let (mut session, sink) = session(&["hello"]);

        assert_eq!(session.run_one_cycle(), CycleOutcome::Closed);
        assert_eq!(session.state(), SessionState::AwaitingWake);
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_closed_queue_while_capturing_keeps_state() {
        let (mut session, _) = session(&["おはよう"]);

        assert_eq!(session.run_one_cycle(), CycleOutcome::Closed);
        assert_eq!(session.state(), SessionState::CapturingCommand);
    }
}
