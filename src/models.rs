use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: String) -> Self {
        Self { id: new_id("proj"), name, created_at: Utc::now() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn new(project_id: String, name: String) -> Self {
        Self { id: new_id("chat"), project_id, name, created_at: Utc::now() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(chat_id: String, role: MessageRole, content: String) -> Self {
        Self::with_id(new_id("msg"), chat_id, role, content)
    }

    pub fn with_id(id: String, chat_id: String, role: MessageRole, content: String) -> Self {
        Self { id, chat_id, role, content, timestamp: Utc::now() }
    }
}

#[derive(Debug, Deserialize)]
pub struct NewProject {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct NewChat {
    pub project_id: String,
    pub name: String,
}

/// Query of `POST /api/chats/{chat_id}/messages`; the role defaults to `user`.
#[derive(Debug, Deserialize)]
pub struct NewMessage {
    pub content: String,
    #[serde(default)]
    pub role: Option<MessageRole>,
}

#[derive(Debug, Deserialize)]
pub struct ChatFilter {
    pub project_id: Option<String>,
}

/// Frame the client sends over `/ws/chat/{chat_id}`.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    pub content: String,
}

/// Frames the server streams back, internally tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    UserMessage { message: Message },
    AssistantStart { message_id: String },
    AssistantChunk { content: String },
    AssistantEnd { message: Message },
}
