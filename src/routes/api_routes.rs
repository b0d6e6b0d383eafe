use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;

use crate::config::LlmConfigUpdate;
use crate::errors::AppError;
use crate::models::{ChatFilter, NewChat, NewMessage, NewProject};
use crate::service::chat_service::ChatService;

/// GET `/health`
pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok", "timestamp": chrono::Utc::now() }))
}

/// GET `/api/projects`
pub async fn list_projects_handler(State(svc): State<ChatService>) -> impl IntoResponse {
    Json(svc.projects().await)
}

/// POST `/api/projects`
pub async fn create_project_handler(
    State(svc): State<ChatService>,
    Json(request): Json<NewProject>,
) -> Response {
    match svc.create_project(request).await {
        Ok(project) => (StatusCode::CREATED, Json(project)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET `/api/chats?project_id=...`
pub async fn list_chats_handler(
    State(svc): State<ChatService>,
    Query(filter): Query<ChatFilter>,
) -> impl IntoResponse {
    Json(svc.chats(filter.project_id.as_deref()).await)
}

/// POST `/api/chats`
pub async fn create_chat_handler(
    State(svc): State<ChatService>,
    Json(request): Json<NewChat>,
) -> Response {
    match svc.create_chat(request).await {
        Ok(chat) => (StatusCode::CREATED, Json(chat)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET `/api/chats/{chat_id}/messages`
pub async fn list_messages_handler(
    Path(chat_id): Path<String>,
    State(svc): State<ChatService>,
) -> impl IntoResponse {
    Json(svc.messages(&chat_id).await)
}

/// POST `/api/chats/{chat_id}/messages?content=...&role=...`
pub async fn create_message_handler(
    Path(chat_id): Path<String>,
    State(svc): State<ChatService>,
    Query(request): Query<NewMessage>,
) -> Response {
    match svc.add_message(&chat_id, request).await {
        Ok(message) => Json(message).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET `/api/config/llm`: the active model settings, API key masked.
pub async fn get_llm_config_handler(State(svc): State<ChatService>) -> impl IntoResponse {
    let config = svc.llm_config().await;
    Json(json!({
        "base_url": config.base_url,
        "model": config.model,
        "api_key": config.masked_api_key(),
    }))
}

/// PATCH `/api/config/llm`: switches endpoint, key or model for later turns.
pub async fn update_llm_config_handler(
    State(svc): State<ChatService>,
    Json(update): Json<LlmConfigUpdate>,
) -> Response {
    match svc.update_llm_config(update).await {
        Ok(config) => Json(json!({
            "success": true,
            "message": "LLM configuration updated",
            "config": { "base_url": config.base_url, "model": config.model },
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

fn error_response(err: &AppError) -> Response {
    let status = if err.is_validation() {
        StatusCode::BAD_REQUEST
    } else if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else if err.is_agent_unavailable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    warn!("Request failed with {status}: {err}");
    (status, Json(json!({ "detail": err.to_string() }))).into_response()
}
