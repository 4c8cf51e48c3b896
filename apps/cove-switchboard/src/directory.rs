use async_trait::async_trait;
use cove_call_core::{ConversationId, UserId, UserProfile};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Conversation shape as resolved by the chat backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationInfo {
    pub id: ConversationId,
    pub is_group: bool,
    pub participants: Vec<UserId>,
}

/// Read-only view onto the chat backend's users and conversations. The
/// switchboard never owns this data; it only resolves ids handed to it.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn user_profile(&self, user_id: UserId) -> Option<UserProfile>;
    async fn conversation(&self, conversation_id: ConversationId) -> Option<ConversationInfo>;
    async fn conversations_for(&self, user_id: UserId) -> Vec<ConversationInfo>;
}

/// Directory backed by the chat backend's internal HTTP endpoints.
pub struct HttpDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDirectory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, path: &str) -> Option<T> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => match response.json().await {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(%url, error = %err, "directory response decode failed");
                    None
                }
            },
            Ok(response) => {
                if response.status() != reqwest::StatusCode::NOT_FOUND {
                    warn!(%url, status = %response.status(), "directory lookup failed");
                }
                None
            }
            Err(err) => {
                warn!(%url, error = %err, "directory unreachable");
                None
            }
        }
    }
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn user_profile(&self, user_id: UserId) -> Option<UserProfile> {
        self.fetch(&format!("/internal/users/{user_id}")).await
    }

    async fn conversation(&self, conversation_id: ConversationId) -> Option<ConversationInfo> {
        self.fetch(&format!("/internal/conversations/{conversation_id}"))
            .await
    }

    async fn conversations_for(&self, user_id: UserId) -> Vec<ConversationInfo> {
        self.fetch(&format!("/internal/users/{user_id}/conversations"))
            .await
            .unwrap_or_default()
    }
}

/// In-memory directory for tests and single-node local runs.
#[derive(Default)]
pub struct InMemoryDirectory {
    users: DashMap<UserId, UserProfile>,
    conversations: DashMap<ConversationId, ConversationInfo>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, profile: UserProfile) {
        self.users.insert(profile.id, profile);
    }

    pub fn add_conversation(&self, conversation: ConversationInfo) {
        self.conversations.insert(conversation.id, conversation);
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn user_profile(&self, user_id: UserId) -> Option<UserProfile> {
        self.users.get(&user_id).map(|profile| profile.clone())
    }

    async fn conversation(&self, conversation_id: ConversationId) -> Option<ConversationInfo> {
        self.conversations
            .get(&conversation_id)
            .map(|conversation| conversation.clone())
    }

    async fn conversations_for(&self, user_id: UserId) -> Vec<ConversationInfo> {
        self.conversations
            .iter()
            .filter(|entry| entry.participants.contains(&user_id))
            .map(|entry| entry.clone())
            .collect()
    }
}
