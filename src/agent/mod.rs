use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::config::{LlmConfig, LlmSettings};
use crate::errors::AppError;
use crate::models::{Message, MessageRole};

pub const PREAMBLE: &str = "You are a helpful assistant for students. \
                            You help with studying, answer questions and give advice.";
const TEMPERATURE: f32 = 0.7;

/// Something that can answer a chat, one text fragment at a time.
#[async_trait]
pub trait Assistant: Send + Sync + 'static {
    /// Streams the reply to `history` (oldest first, ending with the user's
    /// latest message) into `tx`. Returns once the reply is complete or the
    /// receiver is gone.
    async fn stream_chat(
        &self,
        chat_id: &str,
        history: &[Message],
        tx: mpsc::Sender<String>,
    ) -> Result<(), AppError>;
}

#[derive(Serialize)]
struct CompletionMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<CompletionMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Prepends the system preamble to the stored history.
fn to_completion_messages(history: &[Message]) -> Vec<CompletionMessage<'_>> {
    std::iter::once(CompletionMessage { role: MessageRole::System.as_str(), content: PREAMBLE })
        .chain(
            history
                .iter()
                .filter(|m| m.role != MessageRole::System)
                .map(|m| CompletionMessage { role: m.role.as_str(), content: &m.content }),
        )
        .collect()
}

/// One `data:` payload of a server-sent event stream.
#[derive(Debug, PartialEq, Eq)]
enum SseEvent {
    Content(String),
    Done,
    Skip,
}

fn parse_event(data: &str) -> SseEvent {
    if data == "[DONE]" {
        return SseEvent::Done;
    }
    match serde_json::from_str::<StreamResponse>(data) {
        Ok(resp) => {
            let text: String = resp
                .choices
                .into_iter()
                .filter_map(|c| c.delta.content)
                .collect();
            if text.is_empty() {
                SseEvent::Skip
            } else {
                SseEvent::Content(text)
            }
        }
        Err(e) => {
            debug!("skipping unparseable stream event: {e}");
            SseEvent::Skip
        }
    }
}

/// Reassembles SSE lines that arrive split across network chunks.
#[derive(Default)]
struct SseBuffer {
    pending: Vec<u8>,
}

impl SseBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(data) = line.trim().strip_prefix("data:") {
                payloads.push(data.trim_start().to_string());
            }
        }
        payloads
    }
}

/// Streams replies from an OpenAI-compatible `/chat/completions` endpoint
/// (OpenAI, OpenRouter, Ollama's `/v1`). Each request reads the current
/// [`LlmSettings`], so a model switch applies from the next turn on.
#[derive(Clone)]
pub struct OpenAiAssistant {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl OpenAiAssistant {
    pub fn new(settings: LlmSettings) -> Self {
        Self { http: reqwest::Client::new(), settings }
    }
}

fn classify(config: &LlmConfig, chat_id: &str, e: reqwest::Error) -> AppError {
    error!("Completion request failed for chat {chat_id}: {e}");
    if e.is_connect() || e.is_timeout() {
        AppError::AssistantUnavailable { host: config.base_url.clone() }
    } else {
        AppError::InferenceError { message: e.to_string() }
    }
}

#[async_trait]
impl Assistant for OpenAiAssistant {
    async fn stream_chat(
        &self,
        chat_id: &str,
        history: &[Message],
        tx: mpsc::Sender<String>,
    ) -> Result<(), AppError> {
        let config = self.settings.current().await;
        let url = format!("{}/chat/completions", config.base_url);
        let body = CompletionRequest {
            model: &config.model,
            messages: to_completion_messages(history),
            temperature: TEMPERATURE,
            stream: true,
        };

        let mut request = self.http.post(&url).json(&body);
        if !config.api_key.is_empty() {
            request = request.header(AUTHORIZATION, format!("Bearer {}", config.api_key));
        }
        let resp = request.send().await.map_err(|e| classify(&config, chat_id, e))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(AppError::ModelNotFound { model_name: config.model.clone() });
        }
        let resp = resp.error_for_status().map_err(|e| classify(&config, chat_id, e))?;

        let mut bytes = resp.bytes_stream();
        let mut buffer = SseBuffer::default();
        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| classify(&config, chat_id, e))?;
            for data in buffer.push(&chunk) {
                match parse_event(&data) {
                    SseEvent::Done => return Ok(()),
                    SseEvent::Content(text) => {
                        if tx.send(text).await.is_err() {
                            debug!("Reply receiver for chat {chat_id} dropped");
                            return Ok(());
                        }
                    }
                    SseEvent::Skip => {}
                }
            }
        }
        Ok(())
    }
}
