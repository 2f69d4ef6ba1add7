//! The chat backend contract and its HTTP binding.

pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use shared::models::{
    ConversationId, ConversationSummary, Message, SendMessageRequest, SendMessageResponse,
};
use thiserror::Error;
use url::Url;

/// Failures talking to the chat backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The request never produced a response.
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        /// Endpoint that was called.
        endpoint: Url,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// The backend answered with a non-success status.
    #[error("{endpoint} responded with {status}: {message}")]
    Rejected {
        /// Endpoint that was called.
        endpoint: Url,
        /// Response status.
        status: StatusCode,
        /// Decoded error message, or the raw body.
        message: String,
    },
    /// A configured path does not form a valid URL.
    #[error("invalid endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The chats endpoint cannot have an id appended.
    #[error("endpoint {0} cannot take path segments")]
    NotABase(Url),
    /// The response body was not the expected JSON.
    #[error("failed to decode response from {endpoint}: {source}")]
    Decode {
        /// Endpoint that was called.
        endpoint: Url,
        /// Underlying decode error.
        #[source]
        source: reqwest::Error,
    },
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl BackendError {
    /// HTTP status for rejected requests.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Remote operations the controller depends on.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Sidebar list of conversations.
    async fn fetch_conversation_list(&self) -> Result<Vec<ConversationSummary>, BackendError>;

    /// Authoritative transcript of one conversation.
    async fn fetch_conversation_transcript(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, BackendError>;

    /// Fire-and-continue: the reply itself arrives over the push channel or a
    /// later reload.
    async fn send_user_message(
        &self,
        request: &SendMessageRequest,
    ) -> Result<SendMessageResponse, BackendError>;
}

#[async_trait]
impl<T: ChatBackend + ?Sized> ChatBackend for Arc<T> {
    async fn fetch_conversation_list(&self) -> Result<Vec<ConversationSummary>, BackendError> {
        (**self).fetch_conversation_list().await
    }

    async fn fetch_conversation_transcript(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, BackendError> {
        (**self).fetch_conversation_transcript(conversation_id).await
    }

    async fn send_user_message(
        &self,
        request: &SendMessageRequest,
    ) -> Result<SendMessageResponse, BackendError> {
        (**self).send_user_message(request).await
    }
}
