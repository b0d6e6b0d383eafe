use std::sync::Arc;

use tracing::info;

use student_assistant::agent::OpenAiAssistant;
use student_assistant::app;
use student_assistant::config::{LlmSettings, ServerConfig};
use student_assistant::service::chat_service::ChatService;
use student_assistant::store::chat_repository::ChatRepository;
use student_assistant::store::message_repository::MessageRepository;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "student_assistant=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env();

    // ── Dependency wiring ─────────────────────────────────────────────────────
    let llm = LlmSettings::new(config.llm.clone());
    info!("Using model {} at {}", config.llm.model, config.llm.base_url);
    let chat_service = ChatService::new(
        ChatRepository::new(),
        MessageRepository::new(),
        Arc::new(OpenAiAssistant::new(llm.clone())),
        llm,
    );

    // ── Listen ────────────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}/");

    axum::serve(listener, app(chat_service, &config.cors_origins)).await?;
    Ok(())
}
