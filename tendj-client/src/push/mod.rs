//! Server-Sent Events push channel.

pub mod sse;

use std::time::Duration;

use async_stream::stream;
use futures_util::{Stream, StreamExt};
use reqwest::{Client, Response, StatusCode, header};
use shared::{config::client::ApiConfig, models::PushEvent};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use crate::backend::http::HttpBackend;
pub use sse::{SseDecoder, SseFrame};

const LAST_EVENT_ID: &str = "Last-Event-ID";
const DONE_SENTINEL: &str = "[DONE]";

/// Failures on the push channel.
#[derive(Debug, Error)]
pub enum PushError {
    /// The connection could not be opened.
    #[error("failed to connect to {endpoint}: {source}")]
    Transport {
        /// Stream endpoint.
        endpoint: Url,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// The server answered with a non-success status.
    #[error("{endpoint} refused the event stream with {status}")]
    Rejected {
        /// Stream endpoint.
        endpoint: Url,
        /// Response status.
        status: StatusCode,
    },
    /// The stream path does not form a valid URL.
    #[error("invalid stream endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The open stream failed mid-body.
    #[error("event stream interrupted: {0}")]
    Stream(#[source] reqwest::Error),
}

/// Connects to the backend's event stream and reconnects after drops.
#[derive(Debug, Clone)]
pub struct PushChannel {
    client: Client,
    endpoint: Url,
    auth_token: Option<String>,
    reconnect_delay: Duration,
}

impl PushChannel {
    /// A channel for `api.stream_path`.
    ///
    /// # Errors
    /// Fails when the stream path does not resolve against the base URL.
    pub fn new(
        client: Client,
        api: &ApiConfig,
        auth_token: Option<String>,
    ) -> Result<Self, PushError> {
        Ok(Self {
            client,
            endpoint: api.endpoint(&api.stream_path)?,
            auth_token,
            reconnect_delay: Duration::from_millis(api.reconnect_delay_ms),
        })
    }

    /// Shares the backend's HTTP client, endpoints and token.
    ///
    /// # Errors
    /// See [`PushChannel::new`].
    pub fn from_backend(backend: &HttpBackend) -> Result<Self, PushError> {
        Self::new(
            backend.client().clone(),
            backend.api(),
            backend.auth_token().map(ToString::to_string),
        )
    }

    /// URL of the event stream.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Opens a single connection.
    ///
    /// # Errors
    /// Returns transport failures and non-success statuses.
    pub async fn connect(&self, last_event_id: Option<&str>) -> Result<PushConnection, PushError> {
        let mut request = self
            .client
            .get(self.endpoint.clone())
            .header(header::ACCEPT, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache");
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        if let Some(id) = last_event_id {
            request = request.header(LAST_EVENT_ID, id);
        }

        let response = request
            .send()
            .await
            .map_err(|source| PushError::Transport {
                endpoint: self.endpoint.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(PushError::Rejected {
                endpoint: self.endpoint.clone(),
                status,
            });
        }

        info!(endpoint = %self.endpoint, "push channel connected");
        Ok(PushConnection {
            response,
            decoder: SseDecoder::resuming(last_event_id.map(ToString::to_string)),
        })
    }

    /// Endless stream of push events. Dropped or refused connections are
    /// retried after the configured delay, resuming from the last event id.
    pub fn subscribe(&self) -> impl Stream<Item = PushEvent> + Send + 'static {
        let channel = self.clone();
        stream! {
            let mut last_event_id: Option<String> = None;
            loop {
                match channel.connect(last_event_id.as_deref()).await {
                    Ok(connection) => {
                        let frames = connection.frames();
                        futures_util::pin_mut!(frames);
                        while let Some(frame) = frames.next().await {
                            match frame {
                                Ok(frame) => {
                                    if frame.id.is_some() {
                                        last_event_id.clone_from(&frame.id);
                                    }
                                    if let Some(event) = decode_frame(&frame) {
                                        yield event;
                                    }
                                }
                                Err(err) => {
                                    warn!(error = %err, "push channel dropped");
                                    break;
                                }
                            }
                        }
                        debug!("push stream ended");
                    }
                    Err(err) => warn!(error = %err, "push channel connection failed"),
                }
                sleep(channel.reconnect_delay).await;
            }
        }
    }
}

/// An open `text/event-stream` response.
#[derive(Debug)]
pub struct PushConnection {
    response: Response,
    decoder: SseDecoder,
}

impl PushConnection {
    /// Raw SSE frames until the server closes the stream.
    pub fn frames(self) -> impl Stream<Item = Result<SseFrame, PushError>> + Send {
        let Self {
            response,
            mut decoder,
        } = self;
        stream! {
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => {
                        for frame in decoder.push(&bytes) {
                            yield Ok(frame);
                        }
                    }
                    Err(err) => {
                        yield Err(PushError::Stream(err));
                        return;
                    }
                }
            }
        }
    }

    /// Typed events; undecodable and unknown frames are skipped.
    pub fn events(self) -> impl Stream<Item = Result<PushEvent, PushError>> + Send {
        self.frames().filter_map(|frame| async move {
            match frame {
                Ok(frame) => decode_frame(&frame).map(Ok),
                Err(err) => Some(Err(err)),
            }
        })
    }
}

/// Maps a frame to a push event, logging anything that cannot be used.
#[must_use]
pub fn decode_frame(frame: &SseFrame) -> Option<PushEvent> {
    if frame.data.trim() == DONE_SENTINEL {
        return None;
    }
    match PushEvent::decode(&frame.event, &frame.data) {
        Ok(Some(event)) => Some(event),
        Ok(None) => {
            debug!(event = %frame.event, "skipping unknown push event");
            None
        }
        Err(err) => {
            warn!(event = %frame.event, error = %err, "skipping malformed push event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{StreamFragment, StreamId};

    fn frame(event: &str, data: &str) -> SseFrame {
        SseFrame {
            event: event.to_string(),
            data: data.to_string(),
            id: None,
        }
    }

    #[test]
    fn decode_frame_maps_known_events() {
        assert_eq!(
            decode_frame(&frame("stream-chunk", r#"{"id":"s1","content":"a"}"#)),
            Some(PushEvent::StreamChunk(StreamFragment::new("s1", "a")))
        );
        let Some(PushEvent::StreamComplete(done)) =
            decode_frame(&frame("stream-complete", r#"{"id":"s1"}"#))
        else {
            panic!("expected completion");
        };
        assert_eq!(done.id, StreamId::new("s1"));
    }

    #[test]
    fn decode_frame_skips_noise() {
        assert_eq!(decode_frame(&frame("message", "[DONE]")), None);
        assert_eq!(decode_frame(&frame("ping", "{}")), None);
        assert_eq!(decode_frame(&frame("stream-chunk", "{oops")), None);
    }

    #[test]
    fn channel_resolves_stream_endpoint() {
        let api = ApiConfig {
            base_url: Url::parse("http://localhost:9000/base").unwrap(),
            ..ApiConfig::default()
        };
        let channel = PushChannel::new(Client::new(), &api, None).unwrap();
        assert_eq!(
            channel.endpoint().as_str(),
            "http://localhost:9000/base/api/v1/stream"
        );
    }
}
