use std::sync::Arc;

use tracing::info;

use crate::agent::Assistant;
use crate::config::{LlmConfig, LlmConfigUpdate, LlmSettings};
use crate::errors::AppError;
use crate::models::{Chat, Message, MessageRole, NewChat, NewMessage, NewProject, Project};
use crate::store::chat_repository::ChatRepository;
use crate::store::message_repository::MessageRepository;

const MAX_MESSAGE_LENGTH: usize = 8000;
const MAX_NAME_LENGTH: usize = 200;
/// Messages of context handed to the assistant, the new user message included.
pub const HISTORY_WINDOW: usize = 10;

/// A validated and stored user message plus the context to answer it with.
#[derive(Debug)]
pub struct TurnContext {
    pub user_message: Message,
    pub history: Vec<Message>,
}

#[derive(Clone)]
pub struct ChatService {
    chat_repo: ChatRepository,
    message_repo: MessageRepository,
    agent: Arc<dyn Assistant>,
    llm: LlmSettings,
}

impl ChatService {
    pub fn new(
        chat_repo: ChatRepository,
        message_repo: MessageRepository,
        agent: Arc<dyn Assistant>,
        llm: LlmSettings,
    ) -> Self {
        Self { chat_repo, message_repo, agent, llm }
    }

    pub fn agent(&self) -> &Arc<dyn Assistant> {
        &self.agent
    }

    pub async fn projects(&self) -> Vec<Project> {
        self.chat_repo.find_all_projects().await
    }

    pub async fn create_project(&self, request: NewProject) -> Result<Project, AppError> {
        let name = validate("name", &request.name, MAX_NAME_LENGTH)?;
        let project = self.chat_repo.save_project(&Project::new(name)).await;
        info!("Created project {} ({})", project.id, project.name);
        Ok(project)
    }

    pub async fn chats(&self, project_id: Option<&str>) -> Vec<Chat> {
        self.chat_repo.find_chats(project_id).await
    }

    pub async fn create_chat(&self, request: NewChat) -> Result<Chat, AppError> {
        let name = validate("name", &request.name, MAX_NAME_LENGTH)?;
        self.chat_repo
            .find_project(&request.project_id)
            .await
            .ok_or_else(|| AppError::not_found("project", &request.project_id))?;
        let chat = self.chat_repo.save_chat(&Chat::new(request.project_id, name)).await;
        info!("Created chat {} in project {}", chat.id, chat.project_id);
        Ok(chat)
    }

    /// Stored messages of a chat, oldest first. Unknown chats have none.
    pub async fn messages(&self, chat_id: &str) -> Vec<Message> {
        self.message_repo.find_by_chat_id(chat_id).await
    }

    /// Stores a message outside of a streamed turn.
    pub async fn add_message(&self, chat_id: &str, request: NewMessage) -> Result<Message, AppError> {
        let content = validate("content", &request.content, MAX_MESSAGE_LENGTH)?;
        let role = request.role.unwrap_or(MessageRole::User);
        Ok(self
            .message_repo
            .save(&Message::new(chat_id.to_string(), role, content))
            .await)
    }

    pub async fn llm_config(&self) -> LlmConfig {
        self.llm.current().await
    }

    pub async fn update_llm_config(&self, update: LlmConfigUpdate) -> Result<LlmConfig, AppError> {
        let config = self.llm.update(update).await?;
        info!("LLM configuration updated: model {} at {}", config.model, config.base_url);
        Ok(config)
    }

    /// Validates `content`, stores it as the user's message and returns the
    /// recent history the assistant should see.
    pub async fn prepare_turn(&self, chat_id: &str, content: &str) -> Result<TurnContext, AppError> {
        validate("content", content, MAX_MESSAGE_LENGTH)?;
        let user_message = self
            .message_repo
            .save(&Message::new(chat_id.to_string(), MessageRole::User, content.to_string()))
            .await;
        let history = self.message_repo.find_recent(chat_id, HISTORY_WINDOW).await;
        Ok(TurnContext { user_message, history })
    }

    pub async fn save_assistant_message(&self, id: &str, chat_id: &str, content: &str) -> Message {
        self.message_repo
            .save(&Message::with_id(
                id.to_string(),
                chat_id.to_string(),
                MessageRole::Assistant,
                content.to_string(),
            ))
            .await
    }
}

/// Rejects blank values and values over `max_length` characters.
fn validate(field_name: &str, value: &str, max_length: usize) -> Result<String, AppError> {
    if value.trim().is_empty() {
        return Err(AppError::EmptyField { field_name: field_name.to_string() });
    }
    let actual_length = value.chars().count();
    if actual_length > max_length {
        return Err(AppError::FieldTooLong {
            field_name: field_name.to_string(),
            max_length,
            actual_length,
        });
    }
    Ok(value.trim().to_string())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;

    struct Silent;

    #[async_trait]
    impl Assistant for Silent {
        async fn stream_chat(&self, _: &str, _: &[Message], _: mpsc::Sender<String>) -> Result<(), AppError> {
            Ok(())
        }
    }

    fn service() -> ChatService {
        let llm = LlmSettings::new(LlmConfig {
            base_url: "http://localhost:11434/v1".into(),
            api_key: String::new(),
            model: "llama3.2".into(),
        });
        ChatService::new(ChatRepository::new(), MessageRepository::new(), Arc::new(Silent), llm)
    }

    #[tokio::test]
    async fn rejects_blank_and_oversized_content() {
        let svc = service();
        assert!(svc.prepare_turn("c1", "   ").await.unwrap_err().is_validation());
        let long = "x".repeat(MAX_MESSAGE_LENGTH + 1);
        let err = svc.prepare_turn("c1", &long).await.unwrap_err();
        assert!(matches!(err, AppError::FieldTooLong { actual_length: 8001, .. }));
        assert!(svc.messages("c1").await.is_empty());
    }

    #[tokio::test]
    async fn history_is_capped_and_ends_with_the_new_message() {
        let svc = service();
        for i in 0..12 {
            svc.prepare_turn("c1", &format!("q{i}")).await.unwrap();
        }
        let turn = svc.prepare_turn("c1", "last").await.unwrap();
        assert_eq!(turn.history.len(), HISTORY_WINDOW);
        assert_eq!(turn.history.last().map(|m| m.id.as_str()), Some(turn.user_message.id.as_str()));
        assert_eq!(svc.messages("c1").await.len(), 13);
    }

    #[tokio::test]
    async fn chat_needs_an_existing_project() {
        let svc = service();
        let err = svc
            .create_chat(NewChat { project_id: "proj-x".into(), name: "Algebra".into() })
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let project = svc.create_project(NewProject { name: " Maths ".into() }).await.unwrap();
        assert_eq!(project.name, "Maths");
        let chat = svc
            .create_chat(NewChat { project_id: project.id.clone(), name: "Algebra".into() })
            .await
            .unwrap();
        assert_eq!(svc.chats(Some(&project.id)).await[0].id, chat.id);
    }

    #[tokio::test]
    async fn added_messages_default_to_the_user_role() {
        let svc = service();
        let note = svc
            .add_message("c1", NewMessage { content: "Remember chapter 3".into(), role: None })
            .await
            .unwrap();
        let reply = svc
            .add_message(
                "c1",
                NewMessage { content: "Noted.".into(), role: Some(MessageRole::Assistant) },
            )
            .await
            .unwrap();
        assert_eq!(note.role, MessageRole::User);
        assert_eq!(reply.role, MessageRole::Assistant);
        let stored: Vec<_> = svc.messages("c1").await.into_iter().map(|m| m.id).collect();
        assert_eq!(stored, vec![note.id, reply.id]);
        assert!(svc
            .add_message("c1", NewMessage { content: "".into(), role: None })
            .await
            .unwrap_err()
            .is_validation());
    }
}
