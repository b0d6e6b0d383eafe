use std::sync::Arc;

use tokio::sync::RwLock;

use crate::models::{Chat, Project};

/// Projects and the chats filed under them.
#[derive(Clone, Default)]
pub struct ChatRepository {
    projects: Arc<RwLock<Vec<Project>>>,
    chats: Arc<RwLock<Vec<Chat>>>,
}

impl ChatRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn find_all_projects(&self) -> Vec<Project> {
        self.projects.read().await.clone()
    }

    pub async fn find_project(&self, id: &str) -> Option<Project> {
        self.projects.read().await.iter().find(|p| p.id == id).cloned()
    }

    pub async fn save_project(&self, project: &Project) -> Project {
        self.projects.write().await.push(project.clone());
        project.clone()
    }

    /// All chats, or only those of `project_id`, oldest first.
    pub async fn find_chats(&self, project_id: Option<&str>) -> Vec<Chat> {
        self.chats
            .read()
            .await
            .iter()
            .filter(|c| project_id.map_or(true, |p| c.project_id == p))
            .cloned()
            .collect()
    }

    pub async fn find_chat(&self, id: &str) -> Option<Chat> {
        self.chats.read().await.iter().find(|c| c.id == id).cloned()
    }

    pub async fn save_chat(&self, chat: &Chat) -> Chat {
        self.chats.write().await.push(chat.clone());
        chat.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn filters_chats_by_project() {
        let repo = ChatRepository::new();
        let maths = repo.save_project(&Project::new("Maths".into())).await;
        let web = repo.save_project(&Project::new("Web".into())).await;
        repo.save_chat(&Chat::new(maths.id.clone(), "Integrals".into())).await;
        repo.save_chat(&Chat::new(maths.id.clone(), "Series".into())).await;
        repo.save_chat(&Chat::new(web.id.clone(), "Frontend".into())).await;

        assert_eq!(repo.find_chats(None).await.len(), 3);
        let names: Vec<_> = repo.find_chats(Some(&maths.id)).await.into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Integrals", "Series"]);
        assert!(repo.find_chats(Some("proj-missing")).await.is_empty());
        assert!(repo.find_project(&web.id).await.is_some());
    }
}
