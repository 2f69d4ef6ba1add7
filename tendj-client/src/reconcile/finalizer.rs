//! Finalizer: commits an authoritative transcript.

use shared::models::Message;
use tracing::debug;

use super::{StreamAccumulator, TranscriptStore, TypingIndicator};

/// Result of committing an authoritative transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The transcript was swapped.
    Replaced,
    /// The payload was already applied; nothing changed.
    Unchanged,
}

/// Commits an authoritative transcript.
///
/// The accumulator is forced idle before the swap so the streamed text and
/// the final message are never visible together. Re-applying a payload that
/// is already in place emits nothing.
pub fn finalize(
    transcript: &mut TranscriptStore,
    accumulator: &mut StreamAccumulator,
    typing: &mut TypingIndicator,
    messages: Vec<Message>,
) -> FinalizeOutcome {
    if accumulator.is_idle() && !typing.is_on() && transcript.matches(&messages) {
        debug!(count = messages.len(), "authoritative transcript already applied");
        return FinalizeOutcome::Unchanged;
    }

    if let Some(stream_id) = accumulator.reset() {
        debug!(%stream_id, "finalize discarded in-progress stream");
    }
    typing.set(false);
    transcript.replace(messages);
    FinalizeOutcome::Replaced
}
