use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::RwLock;

use crate::errors::AppError;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_LLM_BASE_URL: &str = "http://localhost:11434/v1";
const DEFAULT_MODEL: &str = "llama3.2";
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,http://localhost:3000";
const VISIBLE_KEY_CHARS: usize = 20;

/// OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl LlmConfig {
    /// The first characters of the key followed by `...`, or `None` without a key.
    pub fn masked_api_key(&self) -> Option<String> {
        if self.api_key.is_empty() {
            return None;
        }
        let visible: String = self.api_key.chars().take(VISIBLE_KEY_CHARS).collect();
        Some(format!("{visible}..."))
    }

    fn apply(&mut self, update: LlmConfigUpdate) -> Result<(), AppError> {
        if let Some(base_url) = update.base_url {
            self.base_url = parse_base_url(&base_url)?;
        }
        if let Some(model) = update.model_name {
            let model = model.trim();
            if model.is_empty() {
                return Err(AppError::EmptyField { field_name: "model_name".to_string() });
            }
            self.model = model.to_string();
        }
        if let Some(api_key) = update.api_key {
            self.api_key = api_key.trim().to_string();
        }
        Ok(())
    }
}

fn parse_base_url(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AppError::EmptyField { field_name: "base_url".to_string() });
    }
    let invalid = |reason: String| AppError::InvalidField { field_name: "base_url".to_string(), reason };
    let url = reqwest::Url::parse(trimmed).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    Ok(trimmed.to_string())
}

/// Body of `PATCH /api/config/llm`. Absent fields keep their current value.
#[derive(Debug, Default, Deserialize)]
pub struct LlmConfigUpdate {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model_name: Option<String>,
}

/// The live model settings, shared by the assistant and the config endpoints.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    inner: Arc<RwLock<LlmConfig>>,
}

impl LlmSettings {
    pub fn new(config: LlmConfig) -> Self {
        Self { inner: Arc::new(RwLock::new(config)) }
    }

    pub async fn current(&self) -> LlmConfig {
        self.inner.read().await.clone()
    }

    /// Applies `update` as a whole or not at all.
    pub async fn update(&self, update: LlmConfigUpdate) -> Result<LlmConfig, AppError> {
        let mut config = self.inner.write().await;
        let mut next = config.clone();
        next.apply(update)?;
        *config = next;
        Ok(config.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub llm: LlmConfig,
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    /// Reads the process environment. Call after `dotenvy::dotenv()`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let port = var("PORT").and_then(|p| p.parse().ok()).unwrap_or(DEFAULT_PORT);
        let llm = LlmConfig {
            base_url: var("LLM_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: var("LLM_API_KEY").unwrap_or_default(),
            model: var("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        };
        let cors_origins = var("CORS_ORIGINS")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();
        Self { port, llm, cors_origins }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_when_unset() {
        let config = ServerConfig::from_lookup(|_| None);
        assert_eq!(config.port, 8000);
        assert_eq!(config.llm.model, "llama3.2");
        assert_eq!(config.cors_origins.len(), 2);
    }

    #[test]
    fn reads_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("PORT", "9001"),
            ("LLM_BASE_URL", "https://openrouter.ai/api/v1/"),
            ("LLM_MODEL", "qwen/qwen3-32b"),
            ("CORS_ORIGINS", "https://app.example.com, "),
        ]);
        let config = ServerConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(config.port, 9001);
        assert_eq!(config.llm.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.llm.model, "qwen/qwen3-32b");
        assert_eq!(config.cors_origins, vec!["https://app.example.com".to_string()]);
    }

    fn local() -> LlmConfig {
        ServerConfig::from_lookup(|_| None).llm
    }

    #[test]
    fn masks_all_but_the_start_of_the_key() {
        let mut config = local();
        assert_eq!(config.masked_api_key(), None);
        config.api_key = "sk-or-v1-0123456789abcdefSECRET".into();
        assert_eq!(config.masked_api_key().as_deref(), Some("sk-or-v1-0123456789a..."));
    }

    #[tokio::test]
    async fn update_changes_only_the_given_fields() {
        let settings = LlmSettings::new(local());
        let updated = settings
            .update(LlmConfigUpdate { model_name: Some("qwen2.5".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(updated.model, "qwen2.5");
        assert_eq!(updated.base_url, "http://localhost:11434/v1");
        assert_eq!(settings.current().await, updated);
    }

    #[tokio::test]
    async fn rejected_update_leaves_settings_untouched() {
        let settings = LlmSettings::new(local());
        let err = settings
            .update(LlmConfigUpdate {
                base_url: Some("ftp://models.example.com".into()),
                model_name: Some("other".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.is_validation());
        let blank = settings
            .update(LlmConfigUpdate { model_name: Some("  ".into()), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(blank, AppError::EmptyField { .. }));
        assert_eq!(settings.current().await, local());
    }
}
