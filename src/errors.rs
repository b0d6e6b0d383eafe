use thiserror::Error;

/// Top-level server error. Every variant renders a message fit for the
/// response body and the log.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Lookup errors ────────────────────────────────────────────────────────
    #[error("Record not found: {entity_type} with id '{id}'")]
    RecordNotFound { entity_type: String, id: String },

    // ── Assistant errors ─────────────────────────────────────────────────────
    #[error("Language model service unavailable at {host}")]
    AssistantUnavailable { host: String },

    #[error("Model '{model_name}' not found")]
    ModelNotFound { model_name: String },

    #[error("Inference error: {message}")]
    InferenceError { message: String },

    // ── Validation errors ────────────────────────────────────────────────────
    #[error("Field '{field_name}' cannot be empty")]
    EmptyField { field_name: String },

    #[error("Field '{field_name}' exceeds max length of {max_length} (actual: {actual_length})")]
    FieldTooLong { field_name: String, max_length: usize, actual_length: usize },

    #[error("Field '{field_name}' is invalid: {reason}")]
    InvalidField { field_name: String, reason: String },
}

impl AppError {
    pub fn not_found(entity_type: &str, id: &str) -> Self {
        AppError::RecordNotFound { entity_type: entity_type.to_string(), id: id.to_string() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::RecordNotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::EmptyField { .. } | AppError::FieldTooLong { .. } | AppError::InvalidField { .. }
        )
    }

    pub fn is_agent_unavailable(&self) -> bool {
        matches!(self, AppError::AssistantUnavailable { .. })
    }
}
