use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::models::{new_id, ClientFrame, Message as ChatMessage, MessageRole, WsEvent};
use crate::service::chat_service::ChatService;

/// GET `/ws/chat/{chat_id}`: upgrades to a WebSocket bound to one chat.
pub async fn ws_chat_handler(
    ws: WebSocketUpgrade,
    Path(chat_id): Path<String>,
    State(svc): State<ChatService>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, chat_id, svc))
}

/// Handles a single WebSocket connection.
///
/// Protocol:
/// - Client sends JSON `{ "content": "..." }`
/// - Server answers every accepted frame with:
///   1. `{ "type": "user_message", "message": {...} }`
///   2. `{ "type": "assistant_start", "message_id": "..." }`
///   3. `{ "type": "assistant_chunk", "content": "..." }` (repeated)
///   4. `{ "type": "assistant_end", "message": {...} }`
///
/// A frame whose content fails validation is not stored and gets a turn of
/// steps 2 to 4 carrying the reason. Frames that are not `{ "content" }`
/// JSON are logged and dropped.
async fn handle_socket(mut socket: WebSocket, chat_id: String, svc: ChatService) {
    info!("WebSocket client connected to chat {chat_id}");

    while let Some(msg) = socket.recv().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                warn!("WebSocket receive error on chat {chat_id}: {e}");
                break;
            }
        };

        let text = match &msg {
            Message::Text(t) => t.to_string(),
            Message::Close(_) => break,
            _ => continue,
        };

        let frame: ClientFrame = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(e) => {
                warn!("Ignoring malformed frame on chat {chat_id}: {e}");
                continue;
            }
        };

        let turn = match svc.prepare_turn(&chat_id, &frame.content).await {
            Ok(turn) => turn,
            Err(e) => {
                warn!("Rejected message on chat {chat_id}: {e}");
                if !send_rejection(&mut socket, &chat_id, &e.to_string()).await {
                    break;
                }
                continue;
            }
        };

        let message_id = new_id("msg");
        let opened = send_event(&mut socket, &WsEvent::UserMessage { message: turn.user_message }).await
            && send_event(&mut socket, &WsEvent::AssistantStart { message_id: message_id.clone() }).await;
        if !opened {
            break;
        }

        // ── Stream the reply through a channel ───────────────────────────
        let (tx, mut rx) = mpsc::channel::<String>(64);
        let agent = svc.agent().clone();
        let history = turn.history;
        let agent_chat_id = chat_id.clone();
        let stream_handle =
            tokio::spawn(async move { agent.stream_chat(&agent_chat_id, &history, tx).await });

        // Keep draining after the client leaves so the reply is still stored.
        let mut full_content = String::new();
        let mut connected = true;
        while let Some(chunk) = rx.recv().await {
            full_content.push_str(&chunk);
            if connected {
                connected = send_event(&mut socket, &WsEvent::AssistantChunk { content: chunk }).await;
            }
        }

        let failure = match stream_handle.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(e) => Some(format!("internal error during streaming: {e}")),
        };
        if let Some(reason) = failure {
            error!("Assistant streaming failed on chat {chat_id}: {reason}");
            full_content = format!("Failed to generate a reply: {reason}");
            if connected {
                connected = send_event(
                    &mut socket,
                    &WsEvent::AssistantChunk { content: full_content.clone() },
                )
                .await;
            }
        }

        let message = svc.save_assistant_message(&message_id, &chat_id, &full_content).await;
        if !connected || !send_event(&mut socket, &WsEvent::AssistantEnd { message }).await {
            break;
        }
    }

    info!("WebSocket client disconnected from chat {chat_id}");
}

/// Answers a rejected frame with an unsaved assistant turn holding `reason`.
async fn send_rejection(socket: &mut WebSocket, chat_id: &str, reason: &str) -> bool {
    let message = ChatMessage::new(
        chat_id.to_string(),
        MessageRole::Assistant,
        format!("Message rejected: {reason}"),
    );
    send_event(socket, &WsEvent::AssistantStart { message_id: message.id.clone() }).await
        && send_event(socket, &WsEvent::AssistantChunk { content: message.content.clone() }).await
        && send_event(socket, &WsEvent::AssistantEnd { message }).await
}

/// Serializes a `WsEvent` and sends it. Returns `false` once the socket is gone.
async fn send_event(socket: &mut WebSocket, event: &WsEvent) -> bool {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize event: {e}");
            return true;
        }
    };
    match socket.send(Message::Text(json.into())).await {
        Ok(()) => true,
        Err(e) => {
            debug!("WebSocket send failed: {e}");
            false
        }
    }
}
