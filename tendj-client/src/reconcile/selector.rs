//! Conversation Selector.

use shared::models::{ConversationId, ConversationRef, TaskId};
use tracing::{info, warn};

use crate::storage::{KeyValueStore, SessionStore};

/// Identifies the selection a request was issued under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionTicket {
    /// Conversation active when the ticket was issued.
    pub conversation_id: Option<ConversationId>,
    /// Selection counter at issue time.
    pub epoch: u64,
}

/// Tracks the active conversation and persists it through the session store.
///
/// Each selection bumps the epoch, so completions carrying a ticket from an
/// earlier selection can be recognised and dropped.
#[derive(Debug)]
pub struct ConversationSelector<S> {
    session: SessionStore<S>,
    active: ConversationRef,
    epoch: u64,
}

impl<S: KeyValueStore> ConversationSelector<S> {
    /// Starts at `initial` without touching storage.
    pub fn new(session: SessionStore<S>, initial: ConversationRef) -> Self {
        Self {
            session,
            active: initial,
            epoch: 0,
        }
    }

    /// Starts from whatever the session store remembers.
    pub fn restore(session: SessionStore<S>) -> Self {
        let initial = session.conversation().unwrap_or_else(|err| {
            warn!(error = %err, "failed to read stored conversation; starting fresh");
            ConversationRef::default()
        });
        Self::new(session, initial)
    }

    /// The active conversation.
    #[must_use]
    pub fn active(&self) -> &ConversationRef {
        &self.active
    }

    /// Backing session store.
    #[must_use]
    pub fn session(&self) -> &SessionStore<S> {
        &self.session
    }

    /// Mutable access to the session store, e.g. for the auth token.
    pub fn session_mut(&mut self) -> &mut SessionStore<S> {
        &mut self.session
    }

    /// Ticket for work issued under the current selection.
    #[must_use]
    pub fn ticket(&self) -> SelectionTicket {
        SelectionTicket {
            conversation_id: self.active.conversation_id.clone(),
            epoch: self.epoch,
        }
    }

    /// Whether no selection happened since `ticket` was issued.
    #[must_use]
    pub fn is_current(&self, ticket: &SelectionTicket) -> bool {
        ticket.epoch == self.epoch
    }

    /// Makes `conversation_id` active and persists it. Storage failures are
    /// logged; the in-memory selection still changes.
    pub fn select(
        &mut self,
        conversation_id: ConversationId,
        task_id: Option<TaskId>,
    ) -> SelectionTicket {
        info!(conversation_id = %conversation_id, "selecting conversation");
        self.active = ConversationRef::new(Some(conversation_id), task_id);
        self.epoch += 1;
        if let Err(err) = self.session.save_conversation(&self.active) {
            warn!(error = %err, "failed to persist selected conversation");
        }
        self.ticket()
    }

    /// Forgets the active conversation ("New Chat").
    pub fn new_chat(&mut self) -> SelectionTicket {
        info!("starting a new conversation");
        self.active = ConversationRef::default();
        self.epoch += 1;
        if let Err(err) = self.session.clear_conversation() {
            warn!(error = %err, "failed to clear stored conversation");
        }
        self.ticket()
    }

    /// Records ids the backend assigned during a send. Returns `false` when
    /// the ticket is stale and nothing was recorded.
    pub fn adopt(
        &mut self,
        ticket: &SelectionTicket,
        conversation_id: Option<ConversationId>,
        task_id: Option<TaskId>,
    ) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        if conversation_id.is_none() && task_id.is_none() {
            return true;
        }
        if let Some(id) = conversation_id {
            self.active.conversation_id = Some(id);
        }
        if let Some(id) = task_id {
            self.active.task_id = Some(id);
        }
        if let Err(err) = self.session.save_conversation(&self.active) {
            warn!(error = %err, "failed to persist adopted conversation");
        }
        true
    }
}
