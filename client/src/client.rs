use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use crate::api::ChatDirectory;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::lock;
use crate::models::ConversationMessage;
use crate::session::{StreamingSession, Subscribers, TranscriptEvent};
use crate::transport::{Connector, Transport};

/// What the UI talks to: one active chat, its transcript and its channel.
///
/// Each chat activation, and each explicit disconnect, installs a fresh
/// [`Transport`]; the previous one is disconnected. The transcript is
/// mutated only by the user-message append in [`ChatClient::send_message`]
/// and by the envelopes of the active chat.
pub struct ChatClient {
    config: ClientConfig,
    directory: Arc<dyn ChatDirectory>,
    connector: Arc<dyn Connector>,
    session: Arc<Mutex<StreamingSession>>,
    subscribers: Subscribers,
    transport: Mutex<Option<Arc<Transport>>>,
}

impl ChatClient {
    pub fn new(config: ClientConfig, directory: Arc<dyn ChatDirectory>, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            directory,
            connector,
            // No chat yet: messages typed before one exists land here.
            session: Arc::new(Mutex::new(StreamingSession::new(""))),
            subscribers: Subscribers::default(),
            transport: Mutex::new(None),
        }
    }

    /// Registers a callback for every transcript change.
    pub fn subscribe(&self, handler: impl Fn(&TranscriptEvent) + Send + Sync + 'static) {
        self.subscribers.add(handler);
    }

    pub fn active_chat(&self) -> Option<String> {
        lock(&self.transport).as_ref().map(|t| t.chat_id().to_string())
    }

    /// Snapshot of the active chat's transcript.
    pub fn transcript(&self) -> Vec<ConversationMessage> {
        lock(&self.session).transcript().to_vec()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.transport).as_ref().is_some_and(|t| t.is_connected())
    }

    /// Makes `chat_id` the active chat, loading its history, and connects.
    pub async fn switch_chat(&self, chat_id: &str) -> Result<(), ClientError> {
        let transport = match self.current_transport(chat_id) {
            Some(transport) => transport,
            None => self.open_chat(chat_id).await,
        };
        transport.connect().await.inspect_err(|e| error!("{e}"))
    }

    /// Appends `text` to the transcript and sends it to the chat's channel.
    ///
    /// Without a chat id the active chat is used, and if there is none the
    /// directory provisions one first. The appended message stays in the
    /// transcript whatever happens afterwards.
    pub async fn send_message(&self, chat_id: Option<&str>, text: &str) -> Result<(), ClientError> {
        let transport = match chat_id.map(str::to_string).or_else(|| self.active_chat()) {
            Some(id) => match self.current_transport(&id) {
                Some(transport) => transport,
                None => self.open_chat(&id).await,
            },
            None => match self.directory.ensure_chat(text).await {
                Ok(id) => self.activate(&id, Vec::new()),
                Err(e) => {
                    error!("{e}");
                    self.append_user(text);
                    return Err(e);
                }
            },
        };

        self.append_user(text);

        if let Err(e) = transport.connect().await {
            error!("message not delivered: {e}");
            return Err(e);
        }
        transport.send(text)
    }

    /// Closes the active chat's channel. The transcript is left as it is.
    ///
    /// The chat stays active: the next send or switch to it opens a new
    /// channel whose envelopes reach the same transcript.
    pub fn disconnect(&self) {
        let active = self.active_chat();
        if let Some(chat_id) = active {
            // A disconnected transport has dropped its handlers, so it is
            // replaced rather than reused.
            self.attach(&chat_id);
            info!(%chat_id, "chat disconnected");
        }
    }

    fn append_user(&self, text: &str) {
        let event = lock(&self.session).append_user(text);
        self.subscribers.notify(&event);
    }

    fn current_transport(&self, chat_id: &str) -> Option<Arc<Transport>> {
        lock(&self.transport)
            .as_ref()
            .filter(|t| t.chat_id() == chat_id)
            .cloned()
    }

    async fn open_chat(&self, chat_id: &str) -> Arc<Transport> {
        let history = match self.directory.fetch_messages(chat_id).await {
            Ok(history) => history,
            Err(e) => {
                warn!(%chat_id, "could not load history: {e}");
                Vec::new()
            }
        };
        self.activate(chat_id, history)
    }

    fn activate(&self, chat_id: &str, history: Vec<ConversationMessage>) -> Arc<Transport> {
        *lock(&self.session) = StreamingSession::with_history(chat_id, history);
        let transport = self.attach(chat_id);
        info!(%chat_id, "chat activated");
        transport
    }

    /// Installs an unopened transport for `chat_id` that feeds the current
    /// session, tearing down the previous one.
    fn attach(&self, chat_id: &str) -> Arc<Transport> {
        let transport = Arc::new(Transport::new(chat_id, Arc::clone(&self.connector), self.config.reconnect));
        let session = Arc::clone(&self.session);
        let subscribers = self.subscribers.clone();
        let owner = chat_id.to_string();
        transport.on_envelope(move |envelope| {
            let event = {
                let mut session = lock(&session);
                if session.chat_id() != owner {
                    return;
                }
                session.apply(envelope.clone())
            };
            if let Some(event) = event {
                subscribers.notify(&event);
            }
        });

        let previous = lock(&self.transport).replace(Arc::clone(&transport));
        if let Some(previous) = previous {
            previous.disconnect();
        }
        transport
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("active_chat", &self.active_chat())
            .field("subscribers", &self.subscribers)
            .finish()
    }
}
