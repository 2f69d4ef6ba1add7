//! Async glue between the backend, the selector and the reconciler.

use shared::models::{
    ConversationId, ConversationRef, ConversationSummary, Message, MessageId, PushEvent,
    SendMessageRequest, SendMessageResponse, TaskId,
};
use tracing::{debug, error, info, warn};

use crate::{
    backend::{BackendError, ChatBackend},
    reconcile::{
        CompleteOutcome, ConversationSelector, FinalizeOutcome, FragmentOutcome, Reconciler,
        SelectionTicket, SignalSink, ViewSignal,
    },
    storage::KeyValueStore,
};

/// Result of loading or refreshing a transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The transcript was applied.
    Loaded {
        /// Number of messages received.
        count: usize,
    },
    /// No conversation is active; the transcript was emptied.
    Cleared,
    /// The selection changed while loading; the result was dropped.
    Stale,
    /// The fetch failed and an empty transcript is shown.
    Failed,
}

/// Result of sending a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The backend accepted the message.
    Sent {
        /// Conversation the message landed in, once known.
        conversation_id: Option<ConversationId>,
    },
    /// Blank input; nothing was sent.
    Ignored,
    /// The selection changed while sending; the response was dropped.
    Stale,
    /// The request failed; the optimistic echo stays unconfirmed.
    Failed,
}

/// What a push event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// A stream fragment reached the accumulator.
    Accumulated(FragmentOutcome),
    /// A stream-complete event reached the accumulator.
    Completed(CompleteOutcome),
    /// An authoritative transcript went through the finalizer.
    Finalized(FinalizeOutcome),
    /// Authoritative event tagged with a conversation that is not active.
    Discarded,
}

/// A send started by [`ChatController::begin_submit`].
#[derive(Debug, Clone)]
pub struct PendingSend {
    /// Selection the send was issued under.
    pub ticket: SelectionTicket,
    /// Request to hand to [`ChatBackend::send_user_message`].
    pub request: SendMessageRequest,
    /// Id of the optimistic echo.
    pub optimistic_id: MessageId,
}

/// Single owner of the chat state: every user action, backend response and
/// push event is applied here, in arrival order.
#[derive(Debug)]
pub struct ChatController<B, S> {
    backend: B,
    selector: ConversationSelector<S>,
    reconciler: Reconciler,
    signals: SignalSink,
    refetch_after_send: bool,
    conversations: Vec<ConversationSummary>,
    awaiting_conversation: Option<SelectionTicket>,
}

impl<B, S> ChatController<B, S>
where
    B: ChatBackend,
    S: KeyValueStore,
{
    /// A controller with an empty transcript; call [`Self::reload`] to show
    /// the restored conversation.
    pub fn new(backend: B, selector: ConversationSelector<S>, signals: SignalSink) -> Self {
        Self {
            backend,
            selector,
            reconciler: Reconciler::new(signals.clone()),
            signals,
            refetch_after_send: true,
            conversations: Vec::new(),
            awaiting_conversation: None,
        }
    }

    /// Whether a successful send reloads the transcript.
    #[must_use]
    pub fn with_refetch_after_send(mut self, enabled: bool) -> Self {
        self.refetch_after_send = enabled;
        self
    }

    /// The backend, e.g. to run a send on another task.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The conversation selector.
    pub fn selector(&self) -> &ConversationSelector<S> {
        &self.selector
    }

    /// Mutable selector access, for session writes outside a chat flow.
    pub fn selector_mut(&mut self) -> &mut ConversationSelector<S> {
        &mut self.selector
    }

    /// The transcript, provisional reply and typing state.
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// The active conversation.
    pub fn active(&self) -> &ConversationRef {
        self.selector.active()
    }

    /// Conversation list from the last [`Self::refresh_conversations`].
    pub fn conversations(&self) -> &[ConversationSummary] {
        &self.conversations
    }

    /// Fetches the sidebar list.
    ///
    /// # Errors
    /// Propagates the backend failure; the cached list is left as it was.
    pub async fn refresh_conversations(&mut self) -> Result<&[ConversationSummary], BackendError> {
        self.conversations = self.backend.fetch_conversation_list().await?;
        Ok(&self.conversations)
    }

    /// Switches conversations without touching the network. The stream in
    /// progress is abandoned before anything is loaded.
    pub fn begin_select(
        &mut self,
        conversation_id: ConversationId,
        task_id: Option<TaskId>,
    ) -> SelectionTicket {
        let task_id = task_id.or_else(|| self.known_task(&conversation_id));
        self.reconciler.discard_pending();
        let ticket = self.selector.select(conversation_id, task_id);
        self.signals
            .emit(ViewSignal::ConversationChanged(ticket.conversation_id.clone()));
        ticket
    }

    fn known_task(&self, conversation_id: &ConversationId) -> Option<TaskId> {
        self.conversations
            .iter()
            .find(|summary| summary.id == *conversation_id)
            .and_then(|summary| summary.task_id.clone())
    }

    /// Selects a conversation and loads its transcript.
    pub async fn select(
        &mut self,
        conversation_id: ConversationId,
        task_id: Option<TaskId>,
    ) -> LoadOutcome {
        let ticket = self.begin_select(conversation_id, task_id);
        self.load(ticket).await
    }

    /// Reloads the active conversation, e.g. on start-up.
    pub async fn reload(&mut self) -> LoadOutcome {
        let ticket = self.selector.ticket();
        self.load(ticket).await
    }

    async fn load(&mut self, ticket: SelectionTicket) -> LoadOutcome {
        let Some(conversation_id) = ticket.conversation_id.clone() else {
            return self.complete_load(&ticket, Ok(Vec::new()));
        };
        let result = self
            .backend
            .fetch_conversation_transcript(&conversation_id)
            .await;
        self.complete_load(&ticket, result)
    }

    /// Applies a transcript fetched under `ticket`.
    pub fn complete_load(
        &mut self,
        ticket: &SelectionTicket,
        result: Result<Vec<Message>, BackendError>,
    ) -> LoadOutcome {
        if !self.selector.is_current(ticket) {
            debug!(epoch = ticket.epoch, "dropping stale transcript load");
            return LoadOutcome::Stale;
        }
        match result {
            Ok(messages) if ticket.conversation_id.is_none() => {
                self.reconciler.on_authoritative(messages);
                LoadOutcome::Cleared
            }
            Ok(messages) => {
                let count = messages.len();
                self.reconciler.on_authoritative(messages);
                LoadOutcome::Loaded { count }
            }
            Err(err) => {
                error!(
                    conversation_id = ?ticket.conversation_id,
                    error = %err,
                    "failed to load transcript"
                );
                self.reconciler.on_authoritative(Vec::new());
                LoadOutcome::Failed
            }
        }
    }

    /// "New Chat": forgets the active conversation and empties the view.
    pub fn new_chat(&mut self) -> SelectionTicket {
        let ticket = self.selector.new_chat();
        self.reconciler.clear();
        self.signals.emit(ViewSignal::ConversationChanged(None));
        ticket
    }

    /// Echoes `content` and prepares the request. Blank input yields `None`.
    pub fn begin_submit(&mut self, content: &str) -> Option<PendingSend> {
        if content.trim().is_empty() {
            return None;
        }
        let active = self.selector.active().clone();
        let prior = self.reconciler.transcript().messages();
        let request =
            SendMessageRequest::new(active.conversation_id, active.task_id, &prior, content);
        let optimistic = self.reconciler.echo(content);
        self.reconciler.set_typing(true);
        let ticket = self.selector.ticket();
        if ticket.conversation_id.is_none() {
            self.awaiting_conversation = Some(ticket.clone());
        }
        Some(PendingSend {
            ticket,
            request,
            optimistic_id: optimistic.id,
        })
    }

    /// Applies the backend's answer to a send.
    pub fn complete_submit(
        &mut self,
        pending: &PendingSend,
        result: Result<SendMessageResponse, BackendError>,
    ) -> SubmitOutcome {
        if self.awaiting_conversation.as_ref() == Some(&pending.ticket) {
            self.awaiting_conversation = None;
        }
        if !self.selector.is_current(&pending.ticket) {
            debug!(epoch = pending.ticket.epoch, "dropping stale send completion");
            return SubmitOutcome::Stale;
        }
        match result {
            Ok(response) => {
                let was_new = self.selector.active().conversation_id.is_none();
                self.selector
                    .adopt(&pending.ticket, response.chat_id, response.task_id);
                let conversation_id = self.selector.active().conversation_id.clone();
                if was_new && conversation_id.is_some() {
                    self.signals
                        .emit(ViewSignal::ConversationChanged(conversation_id.clone()));
                }
                info!(conversation_id = ?conversation_id, "message sent");
                SubmitOutcome::Sent { conversation_id }
            }
            Err(err) => {
                warn!(
                    optimistic_id = %pending.optimistic_id,
                    error = %err,
                    "failed to send message"
                );
                self.reconciler.set_typing(false);
                SubmitOutcome::Failed
            }
        }
    }

    /// Full send flow: echo, post, adopt ids, then reload when enabled.
    pub async fn submit(&mut self, content: &str) -> SubmitOutcome {
        let Some(pending) = self.begin_submit(content) else {
            return SubmitOutcome::Ignored;
        };
        let result = self.backend.send_user_message(&pending.request).await;
        let outcome = self.complete_submit(&pending, result);
        if self.refetch_after_send && matches!(outcome, SubmitOutcome::Sent { .. }) {
            self.refresh_transcript().await;
        }
        outcome
    }

    /// Re-reads the active transcript, e.g. after a send. The reply still
    /// streaming over the push channel and the typing flag are kept; only
    /// the pushed `message` event finalizes. A failure keeps the transcript
    /// (and any unconfirmed echo) as it is. Returns `None` when no
    /// conversation is active yet.
    pub async fn refresh_transcript(&mut self) -> Option<LoadOutcome> {
        let ticket = self.selector.ticket();
        let conversation_id = ticket.conversation_id.clone()?;
        match self
            .backend
            .fetch_conversation_transcript(&conversation_id)
            .await
        {
            Ok(_) if !self.selector.is_current(&ticket) => Some(LoadOutcome::Stale),
            Ok(messages) => {
                let count = messages.len();
                self.reconciler.refresh(messages);
                Some(LoadOutcome::Loaded { count })
            }
            Err(err) => {
                warn!(
                    conversation_id = %conversation_id,
                    error = %err,
                    "failed to refresh transcript"
                );
                Some(LoadOutcome::Failed)
            }
        }
    }

    /// A first send in a new chat may be answered over the push channel
    /// before its response names the conversation. The tag is adopted then.
    fn claim_new_conversation(&mut self, tag: &ConversationId) -> bool {
        if self.selector.active().conversation_id.is_some() {
            return false;
        }
        let Some(ticket) = self.awaiting_conversation.take() else {
            return false;
        };
        if !self.selector.adopt(&ticket, Some(tag.clone()), None) {
            return false;
        }
        info!(conversation_id = %tag, "adopted conversation from push event");
        self.signals
            .emit(ViewSignal::ConversationChanged(Some(tag.clone())));
        true
    }

    /// Routes one push event into the reconciler.
    pub fn handle_push(&mut self, event: PushEvent) -> PushOutcome {
        match event {
            PushEvent::Message(payload) => {
                if let Some(tag) = &payload.chat_id
                    && self.selector.active().conversation_id.as_ref() != Some(tag)
                    && !self.claim_new_conversation(tag)
                {
                    debug!(chat_id = %tag, "discarding transcript for inactive conversation");
                    return PushOutcome::Discarded;
                }
                PushOutcome::Finalized(self.reconciler.on_authoritative(payload.messages))
            }
            PushEvent::StreamChunk(fragment) => {
                PushOutcome::Accumulated(self.reconciler.apply_fragment(fragment))
            }
            PushEvent::StreamComplete(done) => {
                PushOutcome::Completed(self.reconciler.complete_stream(&done.id))
            }
        }
    }
}
