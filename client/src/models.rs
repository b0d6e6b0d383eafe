use serde::{Deserialize, Serialize};

/// Author of a transcript entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
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

/// One entry of a chat transcript. Matches the backend `Message` model.
///
/// `content` of an assistant message grows while its turn is streaming and is
/// replaced by the server's final text when the turn ends. User messages are
/// never touched after they are appended.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConversationMessage {
    pub id: String,
    pub chat_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: String,
}

impl ConversationMessage {
    pub fn user(chat_id: &str, content: impl Into<String>) -> Self {
        Self {
            id: format!("local-{}", uuid::Uuid::new_v4()),
            chat_id: chat_id.to_string(),
            role: Role::User,
            content: content.into(),
            timestamp: now_iso(),
        }
    }
}

/// Authoritative assistant message carried by `assistant_end`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct FinalMessage {
    pub id: String,
    pub content: String,
    pub timestamp: String,
}

/// Frame received from the chat socket, internally tagged by `type`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Server echo of the message we just sent. The payload is informational.
    UserMessage {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<ConversationMessage>,
    },
    AssistantStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    AssistantChunk { content: String },
    AssistantEnd { message: FinalMessage },
}

impl Envelope {
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::UserMessage { .. } => "user_message",
            Envelope::AssistantStart { .. } => "assistant_start",
            Envelope::AssistantChunk { .. } => "assistant_chunk",
            Envelope::AssistantEnd { .. } => "assistant_end",
        }
    }
}

/// Frame sent by the client over the chat socket.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub content: String,
}

/// Matches the backend `Project` model.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

/// Matches the backend `Chat` model.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Chat {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub created_at: String,
}

/// Request body for `POST /api/projects`.
#[derive(Clone, Debug, Serialize)]
pub struct NewProject {
    pub name: String,
}

/// Request body for `POST /api/chats`.
#[derive(Clone, Debug, Serialize)]
pub struct NewChat {
    pub project_id: String,
    pub name: String,
}

pub(crate) fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}
