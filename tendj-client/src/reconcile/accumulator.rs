//! Stream Accumulator: folds streamed fragments into one provisional reply.

use shared::models::{Message, MessageId, MessageRole, StreamFragment, StreamId};
use tracing::debug;

use super::{SignalSink, ViewSignal};

/// Accumulator states. At most one stream is accumulated at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AccumulatorState {
    /// No reply is streaming.
    #[default]
    Idle,
    /// Fragments of `stream_id` are being concatenated into `buffer`.
    Accumulating {
        /// Stream being accumulated.
        stream_id: StreamId,
        /// Concatenated content so far.
        buffer: String,
    },
}

/// The in-progress assistant reply, shown with a typing caret and never
/// written into the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionalMessage {
    /// Stream the reply belongs to.
    pub stream_id: StreamId,
    /// Text received so far.
    pub content: String,
}

impl ProvisionalMessage {
    /// Renders the reply as an assistant message keyed by the stream id.
    #[must_use]
    pub fn to_message(&self) -> Message {
        Message::new(
            MessageId::new(self.stream_id.as_str()),
            MessageRole::Assistant,
            self.content.clone(),
        )
    }
}

/// What a fragment did to the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentOutcome {
    /// First fragment while idle.
    Started,
    /// Same stream; content appended.
    Appended,
    /// A different stream replaced the one in progress.
    Restarted,
    /// The stream was abandoned by a conversation switch or a finalize.
    Ignored,
}

/// What a stream-complete event did to the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteOutcome {
    /// The active stream ended; the accumulator is idle.
    Completed,
    /// Not the active stream, or nothing in progress.
    Ignored,
}

/// Concatenates fragments of the current stream into a provisional reply.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    state: AccumulatorState,
    signals: SignalSink,
}

impl StreamAccumulator {
    /// An idle accumulator reporting to `signals`.
    #[must_use]
    pub fn new(signals: SignalSink) -> Self {
        Self {
            state: AccumulatorState::Idle,
            signals,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &AccumulatorState {
        &self.state
    }

    /// Whether no reply is streaming.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self.state, AccumulatorState::Idle)
    }

    /// Snapshot of the reply in progress.
    #[must_use]
    pub fn provisional(&self) -> Option<ProvisionalMessage> {
        match &self.state {
            AccumulatorState::Idle => None,
            AccumulatorState::Accumulating { stream_id, buffer } => Some(ProvisionalMessage {
                stream_id: stream_id.clone(),
                content: buffer.clone(),
            }),
        }
    }

    /// Applies one fragment. A fragment from another stream discards the
    /// current buffer entirely; interleaved streams are never merged.
    pub fn push(&mut self, fragment: StreamFragment) -> FragmentOutcome {
        let StreamFragment {
            stream_id,
            content_delta,
        } = fragment;

        let outcome = match &mut self.state {
            AccumulatorState::Accumulating {
                stream_id: active,
                buffer,
            } if *active == stream_id => {
                buffer.push_str(&content_delta);
                FragmentOutcome::Appended
            }
            state => {
                let outcome = if let AccumulatorState::Accumulating {
                    stream_id: previous,
                    ..
                } = state
                {
                    debug!(%previous, next = %stream_id, "new stream replaces the one in progress");
                    FragmentOutcome::Restarted
                } else {
                    FragmentOutcome::Started
                };
                *state = AccumulatorState::Accumulating {
                    stream_id,
                    buffer: content_delta,
                };
                outcome
            }
        };

        self.signals.emit(ViewSignal::Provisional(self.provisional()));
        outcome
    }

    /// Handles a stream-complete signal; only the active stream goes idle.
    pub fn complete(&mut self, stream_id: &StreamId) -> CompleteOutcome {
        match &self.state {
            AccumulatorState::Accumulating { stream_id: active, .. } if active == stream_id => {
                self.state = AccumulatorState::Idle;
                self.signals.emit(ViewSignal::Provisional(None));
                CompleteOutcome::Completed
            }
            _ => {
                debug!(%stream_id, "ignoring completion for inactive stream");
                CompleteOutcome::Ignored
            }
        }
    }

    /// Forces `Idle`, returning the id of the discarded stream if any.
    pub fn reset(&mut self) -> Option<StreamId> {
        match std::mem::take(&mut self.state) {
            AccumulatorState::Idle => None,
            AccumulatorState::Accumulating { stream_id, .. } => {
                self.signals.emit(ViewSignal::Provisional(None));
                Some(stream_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(accumulator: &StreamAccumulator) -> Option<String> {
        accumulator.provisional().map(|p| p.content)
    }

    #[test]
    fn fragments_of_one_stream_concatenate_in_order() {
        let mut accumulator = StreamAccumulator::default();
        let parts = ["The ", "quick ", "", "brown ", "fox"];

        for (index, part) in parts.iter().enumerate() {
            let outcome = accumulator.push(StreamFragment::new("s1", *part));
            let expected = if index == 0 {
                FragmentOutcome::Started
            } else {
                FragmentOutcome::Appended
            };
            assert_eq!(outcome, expected);
        }

        assert_eq!(buffer(&accumulator).as_deref(), Some("The quick brown fox"));
    }

    #[test]
    fn new_stream_discards_previous_buffer() {
        let mut accumulator = StreamAccumulator::default();
        accumulator.push(StreamFragment::new("s1", "stale "));
        accumulator.push(StreamFragment::new("s1", "tokens"));

        let outcome = accumulator.push(StreamFragment::new("s2", "fresh"));

        assert_eq!(outcome, FragmentOutcome::Restarted);
        assert_eq!(
            accumulator.state(),
            &AccumulatorState::Accumulating {
                stream_id: StreamId::new("s2"),
                buffer: "fresh".to_string(),
            }
        );
    }

    #[test]
    fn completion_only_applies_to_active_stream() {
        let mut accumulator = StreamAccumulator::default();
        assert_eq!(
            accumulator.complete(&StreamId::new("s1")),
            CompleteOutcome::Ignored
        );

        accumulator.push(StreamFragment::new("s1", "Hel"));
        assert_eq!(
            accumulator.complete(&StreamId::new("other")),
            CompleteOutcome::Ignored
        );
        assert!(!accumulator.is_idle());

        assert_eq!(
            accumulator.complete(&StreamId::new("s1")),
            CompleteOutcome::Completed
        );
        assert!(accumulator.is_idle());
        assert_eq!(buffer(&accumulator), None);
    }

    #[test]
    fn reset_reports_discarded_stream() {
        let (sink, mut rx) = SignalSink::channel();
        let mut accumulator = StreamAccumulator::new(sink);
        assert_eq!(accumulator.reset(), None);

        accumulator.push(StreamFragment::new("s7", "partial"));
        assert_eq!(accumulator.reset(), Some(StreamId::new("s7")));
        assert!(accumulator.is_idle());

        let signals: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(signals.last(), Some(&ViewSignal::Provisional(None)));
    }

    #[test]
    fn provisional_renders_as_assistant_message() {
        let mut accumulator = StreamAccumulator::default();
        accumulator.push(StreamFragment::new("s1", "Hi"));

        let message = accumulator.provisional().unwrap().to_message();
        assert_eq!(message.role, MessageRole::Assistant);
        assert_eq!(message.id.as_str(), "s1");
        assert_eq!(message.content, "Hi");
    }
}
