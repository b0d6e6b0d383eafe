//! Study-assistant backend: projects, chats, message history and a WebSocket
//! endpoint that streams assistant replies fragment by fragment.

pub mod agent;
pub mod config;
pub mod errors;
pub mod models;
pub mod routes;
pub mod service;
pub mod store;

use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::routes::api_routes::{
    create_chat_handler, create_message_handler, create_project_handler, get_llm_config_handler,
    health_handler, list_chats_handler, list_messages_handler, list_projects_handler,
    update_llm_config_handler,
};
use crate::routes::ws_routes::ws_chat_handler;
use crate::service::chat_service::ChatService;

/// Builds the full router. Unparseable CORS origins are logged and skipped.
pub fn app(chat_service: ChatService, cors_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Skipping invalid CORS origin {origin}: {e}");
                None
            }
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/projects", get(list_projects_handler).post(create_project_handler))
        .route("/api/chats", get(list_chats_handler).post(create_chat_handler))
        .route(
            "/api/chats/{chat_id}/messages",
            get(list_messages_handler).post(create_message_handler),
        )
        .route(
            "/api/config/llm",
            get(get_llm_config_handler).patch(update_llm_config_handler),
        )
        .route("/ws/chat/{chat_id}", get(ws_chat_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(chat_service)
}
