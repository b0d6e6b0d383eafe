use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::models::Message;

/// Messages per chat id, in the order they were saved.
#[derive(Clone, Default)]
pub struct MessageRepository {
    messages: Arc<RwLock<HashMap<String, Vec<Message>>>>,
}

impl MessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn find_by_chat_id(&self, chat_id: &str) -> Vec<Message> {
        self.messages.read().await.get(chat_id).cloned().unwrap_or_default()
    }

    /// The last `limit` messages of a chat, oldest first.
    pub async fn find_recent(&self, chat_id: &str, limit: usize) -> Vec<Message> {
        let messages = self.messages.read().await;
        let all = messages.get(chat_id).map(Vec::as_slice).unwrap_or_default();
        all[all.len().saturating_sub(limit)..].to_vec()
    }

    pub async fn save(&self, message: &Message) -> Message {
        self.messages
            .write()
            .await
            .entry(message.chat_id.clone())
            .or_default()
            .push(message.clone());
        message.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageRole;

    #[tokio::test]
    async fn recent_keeps_the_tail_in_order() {
        let repo = MessageRepository::new();
        for n in 0..12 {
            repo.save(&Message::new("c1".into(), MessageRole::User, format!("m{n}"))).await;
        }
        repo.save(&Message::new("c2".into(), MessageRole::User, "other".into())).await;

        let recent: Vec<_> = repo.find_recent("c1", 10).await.into_iter().map(|m| m.content).collect();
        assert_eq!(recent.first().map(String::as_str), Some("m2"));
        assert_eq!(recent.last().map(String::as_str), Some("m11"));
        assert_eq!(recent.len(), 10);
        assert_eq!(repo.find_recent("c2", 10).await.len(), 1);
        assert!(repo.find_by_chat_id("missing").await.is_empty());
    }
}
