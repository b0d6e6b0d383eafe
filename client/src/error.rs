use thiserror::Error;

/// Everything the chat client can report to its caller.
///
/// Variants carry rendered messages rather than source errors so a single
/// connection outcome can be handed to every caller that awaited it.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClientError {
    // ── Transport ────────────────────────────────────────────────────────────
    #[error("Failed to connect to chat '{chat_id}': {message}")]
    Connect { chat_id: String, message: String },

    #[error("Not connected to chat '{chat_id}'")]
    NotConnected { chat_id: String },

    #[error("Connection to chat '{chat_id}' was closed")]
    Disconnected { chat_id: String },

    // ── Codec ────────────────────────────────────────────────────────────────
    #[error(transparent)]
    Decode(#[from] DecodeError),

    // ── Collaborators ────────────────────────────────────────────────────────
    #[error("Failed to provision a chat: {message}")]
    Provision { message: String },

    #[error("HTTP request to {url} failed: {message}")]
    Http { url: String, message: String },

    // ── Configuration ────────────────────────────────────────────────────────
    #[error("Invalid server URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },
}

impl ClientError {
    pub fn connect(chat_id: &str, message: impl std::fmt::Display) -> Self {
        ClientError::Connect { chat_id: chat_id.to_string(), message: message.to_string() }
    }

    pub fn http(url: &str, message: impl std::fmt::Display) -> Self {
        ClientError::Http { url: url.to_string(), message: message.to_string() }
    }
}

/// A frame from the server that is not one of the known envelopes.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("Malformed envelope ({reason}): {payload}")]
pub struct DecodeError {
    pub reason: String,
    pub payload: String,
}
