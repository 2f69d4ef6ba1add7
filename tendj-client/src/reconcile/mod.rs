//! Reconciliation of optimistic echoes, streamed fragments and authoritative
//! transcripts into the single list the view renders.

pub mod accumulator;
pub mod finalizer;
pub mod selector;
pub mod transcript;

use shared::models::{ConversationId, Message, MessageId, StreamFragment, StreamId};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace};

pub use accumulator::{
    AccumulatorState, CompleteOutcome, FragmentOutcome, ProvisionalMessage, StreamAccumulator,
};
pub use finalizer::{FinalizeOutcome, finalize};
pub use selector::{ConversationSelector, SelectionTicket};
pub use transcript::{TranscriptEntry, TranscriptStore};

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewSignal {
    /// Keep the newest entry in view.
    ScrollToLatest,
    /// The transcript was swapped wholesale.
    TranscriptReplaced,
    /// An unconfirmed echo with this id was appended.
    OptimisticAppended(MessageId),
    /// The in-progress reply changed; `None` hides it.
    Provisional(Option<ProvisionalMessage>),
    /// The typing indicator turned on or off.
    Typing(bool),
    /// Another conversation became active; `None` is a new chat.
    ConversationChanged(Option<ConversationId>),
}

/// Cloneable sending half for [`ViewSignal`]s. A detached sink drops
/// everything.
#[derive(Debug, Clone, Default)]
pub struct SignalSink {
    sender: Option<UnboundedSender<ViewSignal>>,
}

impl SignalSink {
    /// A sink paired with the receiver the view drains.
    #[must_use]
    pub fn channel() -> (Self, UnboundedReceiver<ViewSignal>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// A sink with no receiver, for headless use.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    /// Sends `signal`; a closed receiver is not an error.
    pub fn emit(&self, signal: ViewSignal) {
        if let Some(sender) = &self.sender
            && sender.send(signal).is_err()
        {
            trace!("view signal dropped; receiver closed");
        }
    }
}

/// The "assistant is typing" flag. Only transitions are signalled.
#[derive(Debug, Default)]
pub struct TypingIndicator {
    on: bool,
    signals: SignalSink,
}

impl TypingIndicator {
    /// Starts off.
    #[must_use]
    pub fn new(signals: SignalSink) -> Self {
        Self { on: false, signals }
    }

    /// Whether the assistant is shown as typing.
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Turns the flag on or off, signalling only on change.
    pub fn set(&mut self, on: bool) {
        if self.on != on {
            self.on = on;
            self.signals.emit(ViewSignal::Typing(on));
        }
    }
}

/// Owns the transcript, the stream accumulator and the typing flag.
///
/// Streams discarded by a conversation switch or a finalize are remembered,
/// and their late fragments are ignored instead of reviving the
/// provisional reply.
#[derive(Debug, Default)]
pub struct Reconciler {
    transcript: TranscriptStore,
    accumulator: StreamAccumulator,
    typing: TypingIndicator,
    abandoned: Option<StreamId>,
}

impl Reconciler {
    /// An empty reconciler whose parts all report to `signals`.
    #[must_use]
    pub fn new(signals: SignalSink) -> Self {
        Self {
            transcript: TranscriptStore::new(signals.clone()),
            accumulator: StreamAccumulator::new(signals.clone()),
            typing: TypingIndicator::new(signals),
            abandoned: None,
        }
    }

    /// The confirmed and optimistic rows.
    #[must_use]
    pub fn transcript(&self) -> &TranscriptStore {
        &self.transcript
    }

    /// The stream accumulator.
    #[must_use]
    pub fn accumulator(&self) -> &StreamAccumulator {
        &self.accumulator
    }

    /// The reply being streamed, if any.
    #[must_use]
    pub fn provisional(&self) -> Option<ProvisionalMessage> {
        self.accumulator.provisional()
    }

    /// Whether the typing indicator is on.
    #[must_use]
    pub fn is_typing(&self) -> bool {
        self.typing.is_on()
    }

    /// Optimistic echo: appends the user's message before any network call.
    ///
    /// A new send also forgets the abandoned stream, so a backend that reuses
    /// stream ids across replies is heard again.
    pub fn echo(&mut self, content: impl Into<String>) -> Message {
        let message = Message::local_user(content);
        debug!(id = %message.id, "optimistic echo");
        self.abandoned = None;
        self.transcript.append_optimistic(message.clone());
        message
    }

    /// Sets the typing indicator.
    pub fn set_typing(&mut self, on: bool) {
        self.typing.set(on);
    }

    /// Feeds one streamed fragment to the accumulator. Fragments of the
    /// abandoned stream are ignored; any other stream forgets it.
    pub fn apply_fragment(&mut self, fragment: StreamFragment) -> FragmentOutcome {
        if let Some(abandoned) = &self.abandoned {
            if *abandoned == fragment.stream_id {
                debug!(stream_id = %fragment.stream_id, "ignoring fragment of abandoned stream");
                return FragmentOutcome::Ignored;
            }
            self.abandoned = None;
        }
        self.accumulator.push(fragment)
    }

    /// Ends the active stream when `stream_id` matches it.
    pub fn complete_stream(&mut self, stream_id: &StreamId) -> CompleteOutcome {
        self.accumulator.complete(stream_id)
    }

    /// Finalizer entry point.
    pub fn on_authoritative(&mut self, messages: Vec<Message>) -> FinalizeOutcome {
        let streaming = self.accumulator.provisional().map(|p| p.stream_id);
        let outcome = finalize(
            &mut self.transcript,
            &mut self.accumulator,
            &mut self.typing,
            messages,
        );
        if let Some(stream_id) = streaming {
            self.abandoned = Some(stream_id);
        }
        outcome
    }

    /// Swaps in a re-read transcript without finalizing: the reply being
    /// streamed, the typing flag and the abandoned stream are left alone.
    pub fn refresh(&mut self, messages: Vec<Message>) -> FinalizeOutcome {
        if self.transcript.matches(&messages) {
            return FinalizeOutcome::Unchanged;
        }
        self.transcript.replace(messages);
        FinalizeOutcome::Replaced
    }

    /// Drops the in-progress stream and the typing flag, keeping the
    /// transcript. Used when the active conversation changes.
    pub fn discard_pending(&mut self) {
        if let Some(stream_id) = self.accumulator.reset() {
            debug!(%stream_id, "abandoning in-progress stream");
            self.abandoned = Some(stream_id);
        }
        self.typing.set(false);
    }

    /// Empties everything, as for a fresh conversation.
    pub fn clear(&mut self) {
        self.discard_pending();
        self.transcript.replace(Vec::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::MessageRole;

    fn assistant(id: &str, content: &str) -> Message {
        Message::new(MessageId::new(id), MessageRole::Assistant, content)
    }

    fn user(id: &str, content: &str) -> Message {
        Message::new(MessageId::new(id), MessageRole::User, content)
    }

    #[test]
    fn streamed_reply_then_authoritative_list() {
        let mut reconciler = Reconciler::default();

        reconciler.apply_fragment(StreamFragment::new("s1", "Hel"));
        assert_eq!(reconciler.provisional().unwrap().content, "Hel");

        reconciler.apply_fragment(StreamFragment::new("s1", "lo"));
        assert_eq!(reconciler.provisional().unwrap().content, "Hello");

        assert_eq!(
            reconciler.complete_stream(&StreamId::new("s1")),
            CompleteOutcome::Completed
        );
        assert!(reconciler.accumulator().is_idle());

        let list = vec![user("1", "hi"), assistant("2", "Hello")];
        reconciler.on_authoritative(list.clone());
        assert!(reconciler.transcript().matches(&list));
        assert_eq!(reconciler.transcript().messages()[1].content, "Hello");
    }

    #[test]
    fn authoritative_list_supersedes_optimistic_echo() {
        let mut reconciler = Reconciler::default();
        reconciler.echo("hi");
        assert_eq!(reconciler.transcript().pending_optimistic(), 1);

        let list = vec![assistant("9", "welcome back")];
        reconciler.on_authoritative(list.clone());

        assert_eq!(reconciler.transcript().messages(), list);
        assert_eq!(reconciler.transcript().pending_optimistic(), 0);
    }

    #[test]
    fn authoritative_event_wins_over_open_stream() {
        let mut reconciler = Reconciler::default();
        reconciler.set_typing(true);
        reconciler.apply_fragment(StreamFragment::new("s1", "partial"));

        let outcome = reconciler.on_authoritative(vec![assistant("1", "complete")]);

        assert_eq!(outcome, FinalizeOutcome::Replaced);
        assert!(reconciler.accumulator().is_idle());
        assert!(!reconciler.is_typing());
        assert_eq!(
            reconciler.apply_fragment(StreamFragment::new("s1", " late")),
            FragmentOutcome::Ignored
        );
        assert!(reconciler.provisional().is_none());
    }

    #[test]
    fn applying_same_payload_twice_is_idempotent() {
        let (sink, mut rx) = SignalSink::channel();
        let mut reconciler = Reconciler::new(sink);
        let list = vec![user("1", "hi"), assistant("2", "hey")];

        assert_eq!(
            reconciler.on_authoritative(list.clone()),
            FinalizeOutcome::Replaced
        );
        while rx.try_recv().is_ok() {}

        assert_eq!(reconciler.on_authoritative(list), FinalizeOutcome::Unchanged);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn discard_pending_abandons_stream_but_keeps_transcript() {
        let mut reconciler = Reconciler::default();
        reconciler.on_authoritative(vec![user("1", "hi")]);
        reconciler.apply_fragment(StreamFragment::new("s1", "Hel"));
        reconciler.set_typing(true);

        reconciler.discard_pending();

        assert!(reconciler.provisional().is_none());
        assert!(!reconciler.is_typing());
        assert_eq!(reconciler.transcript().len(), 1);
        assert_eq!(
            reconciler.apply_fragment(StreamFragment::new("s1", "lo")),
            FragmentOutcome::Ignored
        );
        assert_eq!(
            reconciler.apply_fragment(StreamFragment::new("s2", "fresh")),
            FragmentOutcome::Started
        );
    }

    #[test]
    fn refresh_replaces_transcript_but_keeps_live_reply() {
        let mut reconciler = Reconciler::default();
        reconciler.echo("hello");
        reconciler.set_typing(true);
        reconciler.apply_fragment(StreamFragment::new("s1", "Hel"));

        let list = vec![user("1", "hello")];
        assert_eq!(reconciler.refresh(list.clone()), FinalizeOutcome::Replaced);
        assert_eq!(reconciler.refresh(list.clone()), FinalizeOutcome::Unchanged);

        assert!(reconciler.transcript().matches(&list));
        assert!(reconciler.is_typing());
        assert_eq!(
            reconciler.apply_fragment(StreamFragment::new("s1", "lo")),
            FragmentOutcome::Appended
        );
        assert_eq!(reconciler.provisional().unwrap().content, "Hello");
    }

    #[test]
    fn reused_stream_id_is_heard_again_after_a_new_send() {
        let mut reconciler = Reconciler::default();
        reconciler.apply_fragment(StreamFragment::new("c1", "first"));
        reconciler.on_authoritative(vec![assistant("1", "first reply")]);
        assert_eq!(
            reconciler.apply_fragment(StreamFragment::new("c1", " late")),
            FragmentOutcome::Ignored
        );

        reconciler.echo("again");
        assert_eq!(
            reconciler.apply_fragment(StreamFragment::new("c1", "second")),
            FragmentOutcome::Started
        );
    }

    #[test]
    fn a_different_stream_forgets_the_abandoned_one() {
        let mut reconciler = Reconciler::default();
        reconciler.apply_fragment(StreamFragment::new("s1", "a"));
        reconciler.discard_pending();

        assert_eq!(
            reconciler.apply_fragment(StreamFragment::new("s2", "b")),
            FragmentOutcome::Started
        );
        reconciler.on_authoritative(Vec::new());
        reconciler.discard_pending();
        assert_eq!(
            reconciler.apply_fragment(StreamFragment::new("s1", "c")),
            FragmentOutcome::Started
        );
    }

    #[test]
    fn typing_indicator_signals_transitions_only() {
        let (sink, mut rx) = SignalSink::channel();
        let mut typing = TypingIndicator::new(sink);
        typing.set(false);
        typing.set(true);
        typing.set(true);
        typing.set(false);

        let signals: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            signals,
            vec![ViewSignal::Typing(true), ViewSignal::Typing(false)]
        );
    }

    #[test]
    fn detached_sink_swallows_signals() {
        let sink = SignalSink::detached();
        sink.emit(ViewSignal::ScrollToLatest);

        let (sink, rx) = SignalSink::channel();
        drop(rx);
        sink.emit(ViewSignal::TranscriptReplaced);
    }
}
