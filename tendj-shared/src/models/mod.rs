pub mod chat;
pub mod conversation;
pub mod errors;
pub mod ids;
pub mod message;
pub mod streaming;

pub use chat::{PriorMessage, SendMessageRequest, SendMessageResponse};
pub use conversation::{
    ConversationRef, ConversationSummary, TranscriptResponse, UNTITLED_CONVERSATION,
};
pub use errors::ErrorResponse;
pub use ids::{ConversationId, MessageId, StreamId, TaskId, meaningful_value};
pub use message::{AttachmentRef, Message, MessageRole};
pub use streaming::{
    AuthoritativeEvent, EVENT_MESSAGE, EVENT_STREAM_CHUNK, EVENT_STREAM_COMPLETE, PushEvent,
    StreamCompleteEvent, StreamFragment,
};
