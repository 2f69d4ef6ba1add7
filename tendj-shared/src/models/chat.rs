use serde::{Deserialize, Serialize};

use super::{
    ids::{ConversationId, TaskId},
    message::{Message, MessageRole},
};

/// Role/content pair forwarded to the backend as prior context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriorMessage {
    /// Author.
    pub role: MessageRole,
    /// Text.
    pub content: String,
}

impl From<&Message> for PriorMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Request body for submitting a user message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendMessageRequest {
    /// Transcript before this message.
    #[serde(rename = "globalMessage")]
    pub prior: Vec<PriorMessage>,
    /// The new message.
    #[serde(rename = "currentMessageContent")]
    pub content: String,
    /// Task of the active conversation, if known.
    #[serde(rename = "taskId")]
    pub task_id: Option<TaskId>,
    /// Active conversation; `None` starts a new one.
    #[serde(rename = "chatId")]
    pub chat_id: Option<ConversationId>,
}

impl SendMessageRequest {
    /// Builds a request from the transcript as it was before the echo.
    #[must_use]
    pub fn new(
        conversation_id: Option<ConversationId>,
        task_id: Option<TaskId>,
        prior_transcript: &[Message],
        content: impl Into<String>,
    ) -> Self {
        Self {
            prior: prior_transcript.iter().map(PriorMessage::from).collect(),
            content: content.into(),
            task_id,
            chat_id: conversation_id,
        }
    }
}

/// Acknowledgement of a submitted message. The reply itself arrives over the
/// push channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendMessageResponse {
    #[serde(
        default,
        rename = "chatId",
        alias = "chat_id",
        skip_serializing_if = "Option::is_none"
    )]
    /// Conversation id, set when the send created one.
    pub chat_id: Option<ConversationId>,
    #[serde(
        default,
        rename = "taskId",
        alias = "task_id",
        skip_serializing_if = "Option::is_none"
    )]
    /// Task id assigned by the backend.
    pub task_id: Option<TaskId>,
}
