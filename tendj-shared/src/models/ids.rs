use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

/// Prefix carried by message ids fabricated on the client.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Identifiers arrive as strings from some endpoints and as integers from
/// others; both normalise to their textual form.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            Self::Text(value) => value,
            Self::Signed(value) => value.to_string(),
            Self::Unsigned(value) => value.to_string(),
        }
    }
}

/// Returns `None` for values that only stand in for "nothing" in persisted
/// state (`""`, `"null"`, `"undefined"`), otherwise the trimmed value.
#[must_use]
pub fn meaningful_value(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    match trimmed {
        "" | "null" | "undefined" => None,
        other => Some(other),
    }
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an identifier value as-is.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Parses an identifier read from a route or from persisted
            /// state, treating placeholder values as absent.
            #[must_use]
            pub fn parse_stored(value: &str) -> Option<Self> {
                meaningful_value(value).map(Self::new)
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                RawId::deserialize(deserializer).map(|raw| Self(raw.into_string()))
            }
        }
    };
}

opaque_id! {
    /// Identifier of a message; server-issued or fabricated locally.
    MessageId
}

opaque_id! {
    /// Identifier of a conversation (a "chat" on the backend).
    ConversationId
}

opaque_id! {
    /// Backend task identifier paired with a conversation.
    TaskId
}

opaque_id! {
    /// Identifier shared by the fragments of one streamed reply.
    StreamId
}

impl MessageId {
    /// Fabricates a fresh client-side id for an optimistic message.
    #[must_use]
    pub fn local() -> Self {
        Self(format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4()))
    }

    /// Whether this id was fabricated on the client.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }
}
