use serde::{Deserialize, Serialize};

use super::{
    ids::{ConversationId, TaskId},
    message::Message,
};

/// Title shown for conversations the backend has not named yet.
pub const UNTITLED_CONVERSATION: &str = "Untitled Chat";

/// Sidebar entry returned by the conversation listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSummary {
    /// Conversation id.
    pub id: ConversationId,
    /// Backend task the conversation belongs to.
    #[serde(default, alias = "taskId", skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    /// Title, when the backend has named it.
    #[serde(
        default,
        rename = "taskTitle",
        alias = "title",
        skip_serializing_if = "Option::is_none"
    )]
    pub title: Option<String>,
}

impl ConversationSummary {
    /// The title, or the untitled placeholder.
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|title| !title.trim().is_empty())
            .unwrap_or(UNTITLED_CONVERSATION)
    }
}

/// Which conversation (and backend task) requests are scoped to. Both halves
/// are absent for a fresh chat that has not been sent yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationRef {
    /// Active conversation.
    pub conversation_id: Option<ConversationId>,
    /// Its backend task.
    pub task_id: Option<TaskId>,
}

impl ConversationRef {
    /// Pairs a conversation with its task.
    #[must_use]
    pub fn new(conversation_id: Option<ConversationId>, task_id: Option<TaskId>) -> Self {
        Self {
            conversation_id,
            task_id,
        }
    }

    /// True when no conversation has been created yet.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.conversation_id.is_none()
    }
}

/// Body of the "fetch transcript by id" endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TranscriptResponse {
    /// Messages in display order.
    #[serde(default)]
    pub messages: Vec<Message>,
}
