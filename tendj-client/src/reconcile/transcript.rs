//! Transcript Store.

use shared::models::Message;

use super::{SignalSink, ViewSignal};

/// A transcript row. `provisional` marks optimistic echoes the server has not
/// confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    /// The message as displayed.
    pub message: Message,
    /// Set for unconfirmed optimistic echoes.
    pub provisional: bool,
}

/// Ordered messages of the open conversation.
///
/// Entries are never edited in place: the store only grows by optimistic
/// appends and is otherwise swapped wholesale by [`TranscriptStore::replace`].
/// Every mutation asks the view to scroll to the latest entry.
#[derive(Debug, Default)]
pub struct TranscriptStore {
    entries: Vec<TranscriptEntry>,
    signals: SignalSink,
}

impl TranscriptStore {
    /// An empty store reporting to `signals`.
    #[must_use]
    pub fn new(signals: SignalSink) -> Self {
        Self {
            entries: Vec::new(),
            signals,
        }
    }

    /// Atomically swaps the visible transcript for `messages`.
    pub fn replace(&mut self, messages: Vec<Message>) {
        self.entries = messages
            .into_iter()
            .map(|message| TranscriptEntry {
                message,
                provisional: false,
            })
            .collect();
        self.signals.emit(ViewSignal::TranscriptReplaced);
        self.signals.emit(ViewSignal::ScrollToLatest);
    }

    /// Appends `message` as provisional without waiting for the network.
    pub fn append_optimistic(&mut self, message: Message) {
        let id = message.id.clone();
        self.entries.push(TranscriptEntry {
            message,
            provisional: true,
        });
        self.signals.emit(ViewSignal::OptimisticAppended(id));
        self.signals.emit(ViewSignal::ScrollToLatest);
    }

    /// Rows in display order.
    #[must_use]
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Snapshot of the messages in display order.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.entries
            .iter()
            .map(|entry| entry.message.clone())
            .collect()
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is shown.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of optimistic entries still awaiting confirmation.
    #[must_use]
    pub fn pending_optimistic(&self) -> usize {
        self.entries.iter().filter(|entry| entry.provisional).count()
    }

    /// True when the store holds exactly `messages`, all confirmed.
    #[must_use]
    pub fn matches(&self, messages: &[Message]) -> bool {
        self.entries.len() == messages.len()
            && self
                .entries
                .iter()
                .zip(messages)
                .all(|(entry, message)| !entry.provisional && entry.message == *message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{MessageId, MessageRole};

    fn message(id: &str, role: MessageRole, content: &str) -> Message {
        Message::new(MessageId::new(id), role, content)
    }

    #[test]
    fn replace_swaps_everything_and_requests_scroll() {
        let (sink, mut rx) = SignalSink::channel();
        let mut store = TranscriptStore::new(sink);
        store.append_optimistic(Message::local_user("draft"));

        store.replace(vec![
            message("1", MessageRole::User, "hi"),
            message("2", MessageRole::Assistant, "hello"),
        ]);

        assert_eq!(store.len(), 2);
        assert_eq!(store.pending_optimistic(), 0);
        assert_eq!(store.messages()[1].content, "hello");

        let signals: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(matches!(signals[0], ViewSignal::OptimisticAppended(_)));
        assert_eq!(
            &signals[1..],
            &[
                ViewSignal::ScrollToLatest,
                ViewSignal::TranscriptReplaced,
                ViewSignal::ScrollToLatest
            ]
        );
    }

    #[test]
    fn optimistic_entries_are_marked_provisional() {
        let mut store = TranscriptStore::default();
        store.replace(vec![message("1", MessageRole::Assistant, "welcome")]);
        store.append_optimistic(Message::local_user("hi"));

        assert_eq!(store.len(), 2);
        assert_eq!(store.pending_optimistic(), 1);
        assert!(!store.entries()[0].provisional);
        assert!(store.entries()[1].provisional);
    }

    #[test]
    fn matches_requires_same_confirmed_sequence() {
        let confirmed = vec![message("1", MessageRole::User, "hi")];
        let mut store = TranscriptStore::default();
        assert!(store.matches(&[]));

        store.replace(confirmed.clone());
        assert!(store.matches(&confirmed));
        assert!(!store.matches(&[]));

        let optimistic = Message::local_user("again");
        store.append_optimistic(optimistic.clone());
        let mut with_echo = confirmed;
        with_echo.push(optimistic);
        assert!(!store.matches(&with_echo));
    }
}
