//! Relaybot: a Discord relay that answers mentions with an LLM and keeps a
//! bounded memory per channel and user.

pub mod agent;
pub mod api;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod messaging;
pub mod prompts;

pub use error::{Error, Result};

use serde::{Deserialize, Serialize};

/// Platform-assigned event identifier.
pub type EventId = u64;

/// Identifies one isolated conversation memory: a participant within a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    pub channel_id: u64,
    pub user_id: u64,
}

impl ConversationKey {
    pub fn new(channel_id: u64, user_id: u64) -> Self {
        Self {
            channel_id,
            user_id,
        }
    }

    /// Key under which the record is persisted.
    pub fn storage_key(&self) -> String {
        format!("{}_{}", self.channel_id, self.user_id)
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.channel_id, self.user_id)
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One role-tagged message unit in a conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Inbound message from the messaging platform, already mapped out of the
/// platform's own types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: EventId,
    pub channel_id: u64,
    pub author_id: u64,
    pub author_name: String,
    pub author_is_bot: bool,
    /// Raw text, mention tokens included.
    pub content: String,
    /// Users explicitly mentioned in the message.
    pub mentions: Vec<u64>,
    /// Roles mentioned in the message.
    pub role_mentions: Vec<u64>,
    pub attachments: Vec<Attachment>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl InboundMessage {
    pub fn conversation_key(&self) -> ConversationKey {
        ConversationKey::new(self.channel_id, self.author_id)
    }
}

/// File attachment metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub url: String,
    /// Declared MIME type, if the platform reported one.
    pub content_type: Option<String>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|content_type| content_type.starts_with("image/"))
    }
}

/// An image to be fetched and passed to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub content_type: String,
}

/// The bot's own identity on the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BotIdentity {
    pub user_id: u64,
    /// Roles the bot holds in the guild the event came from.
    pub role_ids: Vec<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_key_joins_channel_and_user() {
        let key = ConversationKey::new(123, 456);
        assert_eq!(key.storage_key(), "123_456");
        assert_eq!(key.to_string(), "123_456");
    }

    #[test]
    fn turns_serialize_with_lowercase_roles() {
        let json = serde_json::to_value(Turn::assistant("hi")).expect("serialize");
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "hi"}));
    }

    #[test]
    fn image_detection_uses_declared_content_type() {
        let image = Attachment {
            filename: "cat.png".into(),
            url: "https://cdn.example/cat.png".into(),
            content_type: Some("image/png".into()),
        };
        let text = Attachment {
            content_type: Some("text/plain".into()),
            ..image.clone()
        };
        let unknown = Attachment {
            content_type: None,
            ..image.clone()
        };

        assert!(image.is_image());
        assert!(!text.is_image());
        assert!(!unknown.is_image());
    }
}
