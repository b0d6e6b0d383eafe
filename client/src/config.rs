use std::time::Duration;

use url::Url;

use crate::error::ClientError;

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_WS_URL: &str = "ws://localhost:8000";
const DEFAULT_RECONNECT_BASE_MS: u64 = 1000;
const DEFAULT_RECONNECT_MAX_ATTEMPTS: u32 = 5;

/// Linear reconnect backoff: attempt `n` waits `n × base_delay`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Delay before the given 1-based attempt, or `None` once the cap is passed.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        Some(self.base_delay * attempt)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(DEFAULT_RECONNECT_BASE_MS),
            max_attempts: DEFAULT_RECONNECT_MAX_ATTEMPTS,
        }
    }
}

/// Where the assistant backend lives and how hard to try reaching it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the REST API, e.g. `http://localhost:8000`.
    pub api_url: String,
    /// Base URL of the WebSocket endpoints, e.g. `ws://localhost:8000`.
    pub ws_url: String,
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    /// Derives the WebSocket base from `api_url`, which must be HTTP(S).
    pub fn new(api_url: impl Into<String>) -> Result<Self, ClientError> {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let ws_url = http_to_ws_scheme(&api_url)?;
        Ok(Self { api_url, ws_url, reconnect: ReconnectPolicy::default() })
    }

    /// Reads `ASSISTANT_*` variables, loading `.env` first if present.
    pub fn from_env() -> Result<Self, ClientError> {
        dotenvy::dotenv().ok();

        let api_url = std::env::var("ASSISTANT_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let mut config = Self::new(api_url)?;

        if let Ok(ws_url) = std::env::var("ASSISTANT_WS_URL") {
            config.ws_url = http_to_ws_scheme(ws_url.trim())?;
        }
        if let Some(ms) = env_parse::<u64>("ASSISTANT_RECONNECT_BASE_MS") {
            config.reconnect.base_delay = Duration::from_millis(ms);
        }
        if let Some(attempts) = env_parse::<u32>("ASSISTANT_RECONNECT_MAX_ATTEMPTS") {
            config.reconnect.max_attempts = attempts;
        }
        Ok(config)
    }

    /// WebSocket address of one chat's stream.
    pub fn chat_socket_url(&self, chat_id: &str) -> String {
        format!("{}/ws/chat/{chat_id}", self.ws_url)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Converts an HTTP(S) base URL to the matching WS(S) one. WS(S) URLs pass
/// through; anything else is rejected.
pub fn http_to_ws_scheme(raw: &str) -> Result<String, ClientError> {
    let invalid = |message: String| ClientError::InvalidUrl { url: raw.to_string(), message };
    let mut url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        "ws" | "wss" => "",
        other => return Err(invalid(format!("unsupported scheme '{other}'"))),
    };
    if !scheme.is_empty() {
        url.set_scheme(scheme)
            .map_err(|()| invalid(format!("cannot switch to {scheme}")))?;
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_linearly_and_stop_after_cap() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<_> = (1..=6).map(|n| policy.delay_for(n)).collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_secs(1)),
                Some(Duration::from_secs(2)),
                Some(Duration::from_secs(3)),
                Some(Duration::from_secs(4)),
                Some(Duration::from_secs(5)),
                None,
            ]
        );
        assert_eq!(policy.delay_for(0), None);
    }

    #[test]
    fn derives_socket_url_from_api_url() {
        let config = ClientConfig::new("https://assistant.example.com/").unwrap();
        assert_eq!(config.api_url, "https://assistant.example.com");
        assert_eq!(config.chat_socket_url("chat-1"), "wss://assistant.example.com/ws/chat/chat-1");
        assert_eq!(http_to_ws_scheme("ws://already:9000").unwrap(), "ws://already:9000");
        assert_eq!(
            http_to_ws_scheme("http://localhost:8000/api/").unwrap(),
            "ws://localhost:8000/api"
        );
    }

    #[test]
    fn default_matches_the_derived_local_urls() {
        assert_eq!(ClientConfig::default(), ClientConfig::new(DEFAULT_API_URL).unwrap());
    }

    #[test]
    fn rejects_urls_that_cannot_carry_a_socket() {
        assert!(matches!(
            ClientConfig::new("localhost:8000"),
            Err(ClientError::InvalidUrl { .. })
        ));
        assert!(matches!(
            http_to_ws_scheme("ftp://files.example.com"),
            Err(ClientError::InvalidUrl { message, .. }) if message.contains("ftp")
        ));
        assert!(http_to_ws_scheme("not a url").is_err());
    }
}
