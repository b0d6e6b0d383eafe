#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assistant_client::api::ChatDirectory;
use assistant_client::transport::{Channel, Connector};
use assistant_client::{ClientError, ConversationMessage, TranscriptEvent};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

/// The server's side of one in-memory channel.
pub struct ServerEnd {
    pub chat_id: String,
    received: mpsc::UnboundedReceiver<String>,
    push: mpsc::UnboundedSender<Result<String, ClientError>>,
}

impl ServerEnd {
    pub fn send(&self, raw: &str) {
        let _ = self.push.send(Ok(raw.to_string()));
    }

    pub async fn next_frame(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(5), self.received.recv())
            .await
            .ok()
            .flatten()
    }
}

#[derive(Default)]
struct ConnectorState {
    opens: Vec<(String, Instant)>,
    refuse: bool,
    gate: Option<Arc<Notify>>,
    servers: VecDeque<ServerEnd>,
}

/// Connector handing out in-memory channels and recording every attempt.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl MemoryConnector {
    /// Makes every following attempt fail (or succeed again).
    pub fn refuse(&self, refuse: bool) {
        self.state.lock().unwrap().refuse = refuse;
    }

    /// Blocks every following attempt until the returned notify fires.
    pub fn hold_opens(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.lock().unwrap().gate = Some(gate.clone());
        gate
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().opens.len()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.state.lock().unwrap().opens.iter().map(|(_, at)| *at).collect()
    }

    pub fn opened_chats(&self) -> Vec<String> {
        self.state.lock().unwrap().opens.iter().map(|(chat, _)| chat.clone()).collect()
    }

    /// Oldest accepted channel not yet taken by the test.
    pub fn take_server(&self) -> ServerEnd {
        self.state
            .lock()
            .unwrap()
            .servers
            .pop_front()
            .expect("no accepted channel")
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, chat_id: &str) -> Result<Channel, ClientError> {
        let gate = {
            let mut state = self.state.lock().unwrap();
            state.opens.push((chat_id.to_string(), Instant::now()));
            state.gate.clone()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.state.lock().unwrap().refuse {
            return Err(ClientError::connect(chat_id, "connection refused"));
        }

        let (to_server, received) = mpsc::unbounded_channel::<String>();
        let (push, from_server) = mpsc::unbounded_channel::<Result<String, ClientError>>();

        let sink_chat = chat_id.to_string();
        let outgoing = futures_util::sink::unfold(to_server, move |tx, frame: String| {
            let chat_id = sink_chat.clone();
            async move {
                tx.send(frame).map_err(|_| ClientError::Disconnected { chat_id })?;
                Ok::<_, ClientError>(tx)
            }
        });
        let incoming = futures_util::stream::unfold(from_server, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        self.state.lock().unwrap().servers.push_back(ServerEnd {
            chat_id: chat_id.to_string(),
            received,
            push,
        });
        Ok(Channel { outgoing: Box::pin(outgoing), incoming: incoming.boxed() })
    }
}

/// Directory that hands out `chat-N` ids and serves canned history.
#[derive(Default)]
pub struct MemoryDirectory {
    pub fail_provision: AtomicBool,
    created: AtomicUsize,
    history: Mutex<HashMap<String, Vec<ConversationMessage>>>,
}

impl MemoryDirectory {
    pub fn with_history(self, chat_id: &str, messages: Vec<ConversationMessage>) -> Self {
        self.history.lock().unwrap().insert(chat_id.to_string(), messages);
        self
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatDirectory for MemoryDirectory {
    async fn ensure_chat(&self, _first_message: &str) -> Result<String, ClientError> {
        if self.fail_provision.load(Ordering::SeqCst) {
            return Err(ClientError::Provision { message: "projects endpoint unavailable".into() });
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("chat-{n}"))
    }

    async fn fetch_messages(&self, chat_id: &str) -> Result<Vec<ConversationMessage>, ClientError> {
        Ok(self.history.lock().unwrap().get(chat_id).cloned().unwrap_or_default())
    }
}

/// Subscriber that forwards transcript events to the test.
pub fn event_channel() -> (
    impl Fn(&TranscriptEvent) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<TranscriptEvent>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (move |event: &TranscriptEvent| {
        let _ = tx.send(event.clone());
    }, rx)
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<TranscriptEvent>) -> TranscriptEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a transcript event")
        .expect("subscriber dropped")
}

pub fn message(id: &str, chat_id: &str, role: assistant_client::Role, content: &str) -> ConversationMessage {
    ConversationMessage {
        id: id.to_string(),
        chat_id: chat_id.to_string(),
        role,
        content: content.to_string(),
        timestamp: "2025-11-01T10:31:00Z".to_string(),
    }
}
