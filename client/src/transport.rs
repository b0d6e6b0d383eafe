//! One reconnecting channel to a chat's streaming endpoint.
//!
//! A [`Transport`] owns at most one open [`Channel`] at a time. Frames read
//! from it are decoded and handed to the registered envelope handlers in
//! order. When the channel drops without [`Transport::disconnect`] having been
//! called, a reconnect is scheduled with linear backoff until the attempt cap
//! of the [`ReconnectPolicy`] is passed.

use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use futures_util::stream::BoxStream;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::config::{ClientConfig, ReconnectPolicy};
use crate::error::ClientError;
use crate::lock;
use crate::models::Envelope;

/// Write half of an open channel; accepts encoded text frames.
pub type OutgoingSink = Pin<Box<dyn Sink<String, Error = ClientError> + Send>>;

/// Read half of an open channel; yields text frames until the peer goes away.
pub type IncomingStream = BoxStream<'static, Result<String, ClientError>>;

/// An established bidirectional text channel.
pub struct Channel {
    pub outgoing: OutgoingSink,
    pub incoming: IncomingStream,
}

/// Opens channels for a chat id.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, chat_id: &str) -> Result<Channel, ClientError>;
}

/// Connector backed by `tokio-tungstenite`, addressing `/ws/chat/{chat_id}`.
#[derive(Clone, Debug)]
pub struct WsConnector {
    config: ClientConfig,
}

impl WsConnector {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, chat_id: &str) -> Result<Channel, ClientError> {
        let url = self.config.chat_socket_url(chat_id);
        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::connect(chat_id, e))?;
        debug!(%url, "websocket handshake complete");

        let (sink, stream) = socket.split();

        let sink_chat = chat_id.to_string();
        let outgoing = sink
            .with(|text: String| {
                futures_util::future::ready(Ok::<_, tokio_tungstenite::tungstenite::Error>(Message::Text(
                    text.into(),
                )))
            })
            .sink_map_err(move |e: tokio_tungstenite::tungstenite::Error| {
                warn!(chat_id = %sink_chat, "websocket write error: {e}");
                ClientError::Disconnected { chat_id: sink_chat }
            });

        let stream_chat = chat_id.to_string();
        let incoming = stream.filter_map(move |frame| {
            let item = match frame {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                // Control and binary frames carry nothing for the session.
                Ok(_) => None,
                Err(e) => {
                    warn!(chat_id = %stream_chat, "websocket read error: {e}");
                    Some(Err(ClientError::Disconnected { chat_id: stream_chat.clone() }))
                }
            };
            futures_util::future::ready(item)
        });

        Ok(Channel { outgoing: Box::pin(outgoing), incoming: incoming.boxed() })
    }
}

pub type EnvelopeHandler = Arc<dyn Fn(&Envelope) + Send + Sync>;

type Attempt = Shared<BoxFuture<'static, Result<(), ClientError>>>;

enum Phase {
    Closed,
    Connecting(Attempt),
    Open(Link),
}

/// Tasks servicing one open channel.
struct Link {
    outbound: mpsc::UnboundedSender<String>,
    reader: JoinHandle<()>,
}

impl Link {
    /// Dropping the sender lets the writer flush and send a close frame.
    fn close(self) {
        drop(self.outbound);
        self.reader.abort();
    }
}

struct LinkState {
    phase: Phase,
    /// Consecutive failed or dropped connections since the last open.
    attempts: u32,
    /// Set by `disconnect`; no reconnect is scheduled while it holds.
    stopped: bool,
    /// Bumped per attempt and per disconnect so stale tasks can tell.
    generation: u64,
    reconnect_timer: Option<JoinHandle<()>>,
}

struct Inner {
    chat_id: String,
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    state: Mutex<LinkState>,
    handlers: Mutex<Vec<EnvelopeHandler>>,
}

/// Reconnecting channel for one chat. Dropping it disconnects.
pub struct Transport {
    inner: Arc<Inner>,
}

impl Transport {
    pub fn new(chat_id: impl Into<String>, connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                chat_id: chat_id.into(),
                connector,
                policy,
                state: Mutex::new(LinkState {
                    phase: Phase::Closed,
                    attempts: 0,
                    stopped: false,
                    generation: 0,
                    reconnect_timer: None,
                }),
                handlers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.inner.chat_id
    }

    /// Opens the channel, or joins the attempt already in flight.
    ///
    /// Resolves immediately when already open. A failed attempt is reported
    /// here and also schedules a background reconnect.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let attempt = {
            let mut state = lock(&self.inner.state);
            state.stopped = false;
            let pending = match &state.phase {
                Phase::Open(_) => return Ok(()),
                Phase::Connecting(attempt) => Some(attempt.clone()),
                Phase::Closed => None,
            };
            match pending {
                Some(attempt) => attempt,
                None => {
                    // A manual attempt replaces any scheduled one and restarts the backoff.
                    state.attempts = 0;
                    if let Some(timer) = state.reconnect_timer.take() {
                        timer.abort();
                    }
                    Inner::begin_attempt(&self.inner, &mut state)
                }
            }
        };
        attempt.await
    }

    /// Queues `text` on the open channel without waiting for the server.
    pub fn send(&self, text: &str) -> Result<(), ClientError> {
        let state = lock(&self.inner.state);
        let sent = match &state.phase {
            Phase::Open(link) => link.outbound.send(codec::encode(text)).is_ok(),
            _ => false,
        };
        if sent {
            Ok(())
        } else {
            let err = ClientError::NotConnected { chat_id: self.inner.chat_id.clone() };
            warn!("{err}");
            Err(err)
        }
    }

    /// Closes the channel, forgets every handler and stops reconnecting.
    pub fn disconnect(&self) {
        let (phase, timer) = {
            let mut state = lock(&self.inner.state);
            state.stopped = true;
            state.generation += 1;
            (std::mem::replace(&mut state.phase, Phase::Closed), state.reconnect_timer.take())
        };
        lock(&self.inner.handlers).clear();
        if let Some(timer) = timer {
            timer.abort();
        }
        if let Phase::Open(link) = phase {
            link.close();
            info!(chat_id = %self.inner.chat_id, "disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(lock(&self.inner.state).phase, Phase::Open(_))
    }

    /// Failed or dropped connections since the channel was last open.
    pub fn reconnect_attempts(&self) -> u32 {
        lock(&self.inner.state).attempts
    }

    /// Registers a handler for every decoded envelope, in registration order.
    pub fn on_envelope(&self, handler: impl Fn(&Envelope) + Send + Sync + 'static) {
        lock(&self.inner.handlers).push(Arc::new(handler));
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("chat_id", &self.inner.chat_id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Inner {
    /// Spawns an attempt and records it as the current phase.
    fn begin_attempt(inner: &Arc<Inner>, state: &mut LinkState) -> Attempt {
        state.generation += 1;
        let generation = state.generation;

        let task = tokio::spawn(Inner::establish(Arc::clone(inner), generation));
        let chat_id = inner.chat_id.clone();
        let attempt = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(ClientError::connect(&chat_id, e)),
            }
        }
        .boxed()
        .shared();

        state.phase = Phase::Connecting(attempt.clone());
        attempt
    }

    async fn establish(inner: Arc<Inner>, generation: u64) -> Result<(), ClientError> {
        debug!(chat_id = %inner.chat_id, "opening channel");
        let opened = inner.connector.open(&inner.chat_id).await;

        let mut state = lock(&inner.state);
        if state.generation != generation {
            // Disconnected while the attempt was in flight.
            return Err(ClientError::Disconnected { chat_id: inner.chat_id.clone() });
        }

        match opened {
            Ok(channel) => {
                state.attempts = 0;
                state.phase = Phase::Open(Inner::spawn_link(&inner, channel, generation));
                info!(chat_id = %inner.chat_id, "connected");
                Ok(())
            }
            Err(e) => {
                state.phase = Phase::Closed;
                error!(chat_id = %inner.chat_id, "connection attempt failed: {e}");
                Inner::schedule_reconnect(&inner, &mut state);
                Err(e)
            }
        }
    }

    fn spawn_link(inner: &Arc<Inner>, channel: Channel, generation: u64) -> Link {
        let (outbound, queued) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(channel.outgoing, queued, inner.chat_id.clone()));
        let reader = tokio::spawn(read_loop(Arc::downgrade(inner), channel.incoming, generation));
        Link { outbound, reader }
    }

    fn dispatch(&self, envelope: &Envelope) {
        let handlers = lock(&self.handlers).clone();
        for handler in handlers {
            handler(envelope);
        }
    }

    /// Called by the reader when its channel ends.
    fn link_closed(inner: &Arc<Inner>, generation: u64) {
        let mut state = lock(&inner.state);
        if state.generation != generation {
            return;
        }
        if let Phase::Open(link) = std::mem::replace(&mut state.phase, Phase::Closed) {
            drop(link.outbound);
        }
        warn!(chat_id = %inner.chat_id, "connection closed unexpectedly");
        Inner::schedule_reconnect(inner, &mut state);
    }

    fn schedule_reconnect(inner: &Arc<Inner>, state: &mut LinkState) {
        if state.stopped {
            return;
        }
        state.attempts += 1;
        let attempt = state.attempts;
        let Some(delay) = inner.policy.delay_for(attempt) else {
            warn!(
                chat_id = %inner.chat_id,
                "giving up after {} reconnect attempts",
                inner.policy.max_attempts
            );
            return;
        };
        info!(chat_id = %inner.chat_id, attempt, ?delay, "scheduling reconnect");

        let weak = Arc::downgrade(inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                Inner::reconnect(&inner);
            }
        });
        if let Some(previous) = state.reconnect_timer.replace(timer) {
            previous.abort();
        }
    }

    /// Starts a background attempt unless one is running or the link is up.
    fn reconnect(inner: &Arc<Inner>) {
        let mut state = lock(&inner.state);
        if state.stopped || !matches!(state.phase, Phase::Closed) {
            return;
        }
        debug!(chat_id = %inner.chat_id, attempt = state.attempts, "reconnecting");
        // The attempt runs as its own task; nobody needs its outcome here.
        let _ = Inner::begin_attempt(inner, &mut state);
    }
}

async fn write_loop(mut outgoing: OutgoingSink, mut queued: mpsc::UnboundedReceiver<String>, chat_id: String) {
    while let Some(frame) = queued.recv().await {
        if let Err(e) = outgoing.send(frame).await {
            error!(%chat_id, "send failed: {e}");
            return;
        }
    }
    if let Err(e) = outgoing.close().await {
        debug!(%chat_id, "closing channel: {e}");
    }
}

async fn read_loop(inner: Weak<Inner>, mut incoming: IncomingStream, generation: u64) {
    while let Some(frame) = incoming.next().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        match frame {
            Ok(text) => match codec::decode(&text) {
                Ok(envelope) => {
                    debug!(chat_id = %inner.chat_id, kind = envelope.kind(), "envelope received");
                    inner.dispatch(&envelope);
                }
                Err(e) => warn!(chat_id = %inner.chat_id, "discarding frame: {e}"),
            },
            Err(e) => {
                debug!(chat_id = %inner.chat_id, "read failed: {e}");
                break;
            }
        }
    }
    if let Some(inner) = inner.upgrade() {
        Inner::link_closed(&inner, generation);
    }
}
