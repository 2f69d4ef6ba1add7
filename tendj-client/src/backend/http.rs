//! JSON-over-HTTP binding of [`super::ChatBackend`].

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    config::client::ApiConfig,
    models::{
        ConversationId, ConversationSummary, ErrorResponse, Message, SendMessageRequest,
        SendMessageResponse, TranscriptResponse,
    },
};
use tracing::{debug, instrument};
use url::Url;

use super::{BackendError, ChatBackend};

const USER_AGENT: &str = concat!("tendj/", env!("CARGO_PKG_VERSION"));

/// [`ChatBackend`] over the backend's JSON REST API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    api: ApiConfig,
    auth_token: Option<String>,
}

impl HttpBackend {
    /// Builds a client with the tendj user agent.
    ///
    /// # Errors
    /// Fails when the underlying HTTP client cannot be constructed.
    pub fn new(api: ApiConfig, auth_token: Option<String>) -> Result<Self, BackendError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(BackendError::Client)?;
        Ok(Self::with_client(client, api, auth_token))
    }

    /// Uses a caller-provided client, e.g. one shared with the push channel.
    #[must_use]
    pub fn with_client(client: Client, api: ApiConfig, auth_token: Option<String>) -> Self {
        Self {
            client,
            api,
            auth_token,
        }
    }

    /// Endpoint configuration.
    #[must_use]
    pub fn api(&self) -> &ApiConfig {
        &self.api
    }

    /// Underlying HTTP client.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Bearer token sent with each request, if any.
    #[must_use]
    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn transcript_url(&self, conversation_id: &ConversationId) -> Result<Url, BackendError> {
        let mut url = self.api.endpoint(&self.api.chats_path)?;
        url.path_segments_mut()
            .map_err(|()| BackendError::NotABase(self.api.base_url.clone()))?
            .pop_if_empty()
            .push(conversation_id.as_str());
        Ok(url)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        endpoint: Url,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|source| BackendError::Transport {
                endpoint: endpoint.clone(),
                source,
            })?;
        let response = check_status(&endpoint, response).await?;
        response
            .json()
            .await
            .map_err(|source| BackendError::Decode { endpoint, source })
    }
}

async fn check_status(endpoint: &Url, response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|error| error.to_string())
        .unwrap_or(body);
    Err(BackendError::Rejected {
        endpoint: endpoint.clone(),
        status,
        message,
    })
}

#[async_trait]
impl ChatBackend for HttpBackend {
    #[instrument(skip(self))]
    async fn fetch_conversation_list(&self) -> Result<Vec<ConversationSummary>, BackendError> {
        let url = self.api.endpoint(&self.api.chats_path)?;
        let chats: Vec<ConversationSummary> =
            self.execute(url.clone(), self.client.get(url)).await?;
        debug!(count = chats.len(), "fetched conversation list");
        Ok(chats)
    }

    #[instrument(skip(self), fields(conversation_id = %conversation_id))]
    async fn fetch_conversation_transcript(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, BackendError> {
        let url = self.transcript_url(conversation_id)?;
        let transcript: TranscriptResponse =
            self.execute(url.clone(), self.client.get(url)).await?;
        debug!(count = transcript.messages.len(), "fetched transcript");
        Ok(transcript.messages)
    }

    #[instrument(skip(self, request), fields(chat_id = ?request.chat_id, prior = request.prior.len()))]
    async fn send_user_message(
        &self,
        request: &SendMessageRequest,
    ) -> Result<SendMessageResponse, BackendError> {
        let url = self.api.endpoint(&self.api.send_path)?;
        self.execute(url.clone(), self.client.post(url).json(request))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base: &str) -> HttpBackend {
        let api = ApiConfig {
            base_url: Url::parse(base).unwrap(),
            ..ApiConfig::default()
        };
        HttpBackend::new(api, None).unwrap()
    }

    #[test]
    fn transcript_url_appends_encoded_id() {
        let backend = backend("http://localhost:8005/app");
        let url = backend
            .transcript_url(&ConversationId::new("abc 1"))
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:8005/app/api/v1/chats/abc%201");
    }

    #[test]
    fn transcript_url_tolerates_trailing_slash() {
        let mut backend = backend("http://localhost:8005/");
        backend.api.chats_path = "api/v1/chats/".to_string();
        let url = backend.transcript_url(&ConversationId::new("7")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8005/api/v1/chats/7");
    }

    #[test]
    fn token_is_optional() {
        assert_eq!(backend("http://localhost:8005").auth_token(), None);
    }
}
