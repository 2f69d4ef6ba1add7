use serde::{Deserialize, Serialize};

use super::{
    ids::{ConversationId, StreamId},
    message::Message,
};

/// SSE event name carrying the authoritative transcript.
pub const EVENT_MESSAGE: &str = "message";
/// SSE event name carrying one streamed content fragment.
pub const EVENT_STREAM_CHUNK: &str = "stream-chunk";
/// SSE event name closing a streamed reply.
pub const EVENT_STREAM_COMPLETE: &str = "stream-complete";

/// One incremental chunk of an assistant reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamFragment {
    #[serde(rename = "id")]
    pub stream_id: StreamId,
    #[serde(rename = "content", default)]
    pub content_delta: String,
}

impl StreamFragment {
    #[must_use]
    pub fn new(stream_id: impl Into<StreamId>, content_delta: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            content_delta: content_delta.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamCompleteEvent {
    pub id: StreamId,
}

/// The server's full transcript snapshot. `chat_id`, when present, names the
/// conversation the snapshot belongs to.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthoritativeEvent {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(
        default,
        rename = "chatId",
        alias = "chat_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub chat_id: Option<ConversationId>,
}

/// Events delivered over the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    Message(AuthoritativeEvent),
    StreamChunk(StreamFragment),
    StreamComplete(StreamCompleteEvent),
}

impl PushEvent {
    /// Decodes an SSE frame. Unknown event names yield `Ok(None)`.
    ///
    /// # Errors
    /// Returns the JSON error when the payload does not match the event.
    pub fn decode(event_name: &str, data: &str) -> Result<Option<Self>, serde_json::Error> {
        let event = match event_name {
            EVENT_MESSAGE => Self::Message(serde_json::from_str(data)?),
            EVENT_STREAM_CHUNK => Self::StreamChunk(serde_json::from_str(data)?),
            EVENT_STREAM_COMPLETE => Self::StreamComplete(serde_json::from_str(data)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Message(_) => EVENT_MESSAGE,
            Self::StreamChunk(_) => EVENT_STREAM_CHUNK,
            Self::StreamComplete(_) => EVENT_STREAM_COMPLETE,
        }
    }

    /// JSON payload for the `data:` field of an SSE frame.
    ///
    /// # Errors
    /// Propagates serialization failures.
    pub fn to_data(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Message(payload) => serde_json::to_string(payload),
            Self::StreamChunk(payload) => serde_json::to_string(payload),
            Self::StreamComplete(payload) => serde_json::to_string(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::MessageRole;

    #[test]
    fn decodes_each_event_kind() {
        let chunk = PushEvent::decode(EVENT_STREAM_CHUNK, r#"{"id":"s1","content":"Hel"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk, PushEvent::StreamChunk(StreamFragment::new("s1", "Hel")));

        let done = PushEvent::decode(EVENT_STREAM_COMPLETE, r#"{"id":"s1"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            done,
            PushEvent::StreamComplete(StreamCompleteEvent {
                id: StreamId::new("s1")
            })
        );

        let message = PushEvent::decode(
            EVENT_MESSAGE,
            r#"{"messages":[{"id":1,"role":"assistant","content":"Hello"}],"chatId":"c1"}"#,
        )
        .unwrap()
        .unwrap();
        let PushEvent::Message(payload) = message else {
            panic!("expected authoritative event");
        };
        assert_eq!(payload.chat_id, Some(ConversationId::new("c1")));
        assert_eq!(payload.messages[0].role, MessageRole::Assistant);
        assert_eq!(payload.messages[0].id.as_str(), "1");
    }

    #[test]
    fn unknown_event_is_skipped() {
        assert_eq!(PushEvent::decode("heartbeat", "{}").unwrap(), None);
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(PushEvent::decode(EVENT_STREAM_CHUNK, "not json").is_err());
        assert!(PushEvent::decode(EVENT_STREAM_COMPLETE, "{}").is_err());
    }

    #[test]
    fn chunk_without_content_is_an_empty_delta() {
        let event = PushEvent::decode(EVENT_STREAM_CHUNK, r#"{"id":"s2"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(event, PushEvent::StreamChunk(StreamFragment::new("s2", "")));
    }

    #[test]
    fn data_round_trips_through_decode() {
        let event = PushEvent::StreamChunk(StreamFragment::new("s9", "lo"));
        let data = event.to_data().unwrap();
        assert_eq!(
            PushEvent::decode(event.event_name(), &data).unwrap(),
            Some(event)
        );
    }
}
