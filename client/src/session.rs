use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::lock;
use crate::models::{now_iso, ConversationMessage, Envelope, Role};

/// A single observable change to a transcript.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TranscriptEvent {
    /// A message was pushed to the end of the transcript.
    Appended(ConversationMessage),
    /// A fragment was appended to the in-progress assistant message.
    Chunk { id: String, fragment: String, content: String },
    /// The in-progress assistant message received its authoritative text.
    Finalized(ConversationMessage),
}

/// Reduces the envelopes of one chat into its transcript.
///
/// The only state besides the transcript is the id of the assistant message
/// currently being streamed. Chunks and ends that arrive while no turn is
/// open are dropped.
#[derive(Debug, Default)]
pub struct StreamingSession {
    chat_id: String,
    transcript: Vec<ConversationMessage>,
    in_progress: Option<String>,
}

impl StreamingSession {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self { chat_id: chat_id.into(), transcript: Vec::new(), in_progress: None }
    }

    /// Starts from messages already stored on the server.
    pub fn with_history(chat_id: impl Into<String>, history: Vec<ConversationMessage>) -> Self {
        Self { chat_id: chat_id.into(), transcript: history, in_progress: None }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn transcript(&self) -> &[ConversationMessage] {
        &self.transcript
    }

    /// Id of the assistant message whose turn has not ended yet.
    pub fn in_progress(&self) -> Option<&str> {
        self.in_progress.as_deref()
    }

    /// Optimistically records a message the user just typed.
    pub fn append_user(&mut self, text: &str) -> TranscriptEvent {
        let message = ConversationMessage::user(&self.chat_id, text);
        self.transcript.push(message.clone());
        TranscriptEvent::Appended(message)
    }

    /// Applies one envelope, returning the mutation it caused, if any.
    pub fn apply(&mut self, envelope: Envelope) -> Option<TranscriptEvent> {
        match envelope {
            // Already appended locally when it was sent.
            Envelope::UserMessage { .. } => None,

            Envelope::AssistantStart { message_id } => {
                if let Some(abandoned) = self.in_progress.take() {
                    debug!(chat_id = %self.chat_id, %abandoned, "new turn started before the previous one ended");
                }
                let id = message_id.unwrap_or_else(|| format!("assistant-{}", uuid::Uuid::new_v4()));
                let message = ConversationMessage {
                    id: id.clone(),
                    chat_id: self.chat_id.clone(),
                    role: Role::Assistant,
                    content: String::new(),
                    timestamp: now_iso(),
                };
                self.transcript.push(message.clone());
                self.in_progress = Some(id);
                Some(TranscriptEvent::Appended(message))
            }

            Envelope::AssistantChunk { content } => {
                let Some(id) = self.in_progress.clone() else {
                    debug!(chat_id = %self.chat_id, "dropping chunk outside of a turn");
                    return None;
                };
                let message = self.find_mut(&id)?;
                message.content.push_str(&content);
                Some(TranscriptEvent::Chunk {
                    id,
                    fragment: content,
                    content: message.content.clone(),
                })
            }

            Envelope::AssistantEnd { message: last } => {
                let Some(id) = self.in_progress.take() else {
                    debug!(chat_id = %self.chat_id, "dropping end outside of a turn");
                    return None;
                };
                let message = self.find_mut(&id)?;
                message.content = last.content;
                message.timestamp = last.timestamp;
                Some(TranscriptEvent::Finalized(message.clone()))
            }
        }
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut ConversationMessage> {
        self.transcript
            .iter_mut()
            .rev()
            .find(|m| m.role == Role::Assistant && m.id == id)
    }
}

pub type TranscriptHandler = Arc<dyn Fn(&TranscriptEvent) + Send + Sync>;

/// Observers of transcript changes, called in registration order.
#[derive(Clone, Default)]
pub struct Subscribers {
    handlers: Arc<Mutex<Vec<TranscriptHandler>>>,
}

impl Subscribers {
    pub fn add(&self, handler: impl Fn(&TranscriptEvent) + Send + Sync + 'static) {
        lock(&self.handlers).push(Arc::new(handler));
    }

    /// Handlers run without the registry lock held, so they may subscribe.
    pub fn notify(&self, event: &TranscriptEvent) {
        let handlers = lock(&self.handlers).clone();
        for handler in handlers {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.handlers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers").field("len", &self.len()).finish()
    }
}
