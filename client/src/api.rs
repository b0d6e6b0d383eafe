use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::models::{Chat, ConversationMessage, NewChat, NewProject, Project};

/// Name given to the project created when the user has none yet.
const DEFAULT_PROJECT_NAME: &str = "My studies";
const MAX_CHAT_NAME_CHARS: usize = 60;

/// REST collaborator that knows which chats exist.
#[async_trait]
pub trait ChatDirectory: Send + Sync + 'static {
    /// Creates a chat for a conversation that starts with `first_message`.
    async fn ensure_chat(&self, first_message: &str) -> Result<String, ClientError>;

    /// Messages already stored for `chat_id`, oldest first.
    async fn fetch_messages(&self, chat_id: &str) -> Result<Vec<ConversationMessage>, ClientError>;
}

/// [`ChatDirectory`] backed by the assistant's REST API.
#[derive(Clone, Debug)]
pub struct HttpDirectory {
    http: reqwest::Client,
    base_url: String,
}

impl HttpDirectory {
    pub fn new(config: &ClientConfig) -> Self {
        Self { http: reqwest::Client::new(), base_url: config.api_url.clone() }
    }

    pub async fn fetch_projects(&self) -> Result<Vec<Project>, ClientError> {
        self.get_json("/api/projects").await
    }

    pub async fn create_project(&self, name: &str) -> Result<Project, ClientError> {
        self.post_json("/api/projects", &NewProject { name: name.to_string() }).await
    }

    pub async fn create_chat(&self, project_id: &str, name: &str) -> Result<Chat, ClientError> {
        let body = NewChat { project_id: project_id.to_string(), name: name.to_string() };
        self.post_json("/api/chats", &body).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self.http.get(&url).send().await.map_err(|e| ClientError::http(&url, e))?;
        Self::read_json(&url, resp).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ClientError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::http(&url, e))?;
        Self::read_json(&url, resp).await
    }

    async fn read_json<T: DeserializeOwned>(url: &str, resp: reqwest::Response) -> Result<T, ClientError> {
        if !resp.status().is_success() {
            return Err(ClientError::http(url, format!("server returned {}", resp.status())));
        }
        resp.json::<T>().await.map_err(|e| ClientError::http(url, format!("parse error: {e}")))
    }
}

#[async_trait]
impl ChatDirectory for HttpDirectory {
    async fn ensure_chat(&self, first_message: &str) -> Result<String, ClientError> {
        let provision = |e: ClientError| ClientError::Provision { message: e.to_string() };

        let project = match self.fetch_projects().await.map_err(provision)?.into_iter().next() {
            Some(project) => project,
            None => {
                debug!("no project yet, creating one");
                self.create_project(DEFAULT_PROJECT_NAME).await.map_err(provision)?
            }
        };

        let chat = self
            .create_chat(&project.id, &chat_name(first_message))
            .await
            .map_err(provision)?;
        info!(chat_id = %chat.id, project_id = %project.id, "created chat");
        Ok(chat.id)
    }

    async fn fetch_messages(&self, chat_id: &str) -> Result<Vec<ConversationMessage>, ClientError> {
        self.get_json(&format!("/api/chats/{chat_id}/messages")).await
    }
}

/// Chat title derived from the message that opened it.
pub fn chat_name(first_message: &str) -> String {
    let text = first_message.trim();
    if text.is_empty() {
        "New chat".to_string()
    } else if text.chars().count() > MAX_CHAT_NAME_CHARS {
        format!("{}…", text.chars().take(MAX_CHAT_NAME_CHARS).collect::<String>())
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_name_trims_and_truncates() {
        assert_eq!(chat_name("  hello  "), "hello");
        assert_eq!(chat_name("   "), "New chat");
        let long = "д".repeat(80);
        let name = chat_name(&long);
        assert_eq!(name.chars().count(), MAX_CHAT_NAME_CHARS + 1);
        assert!(name.ends_with('…'));
    }
}
