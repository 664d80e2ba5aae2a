//! Per-user conversation sessions.

use crate::{
    assistant::AssistantApi,
    error::SessionError,
    types::{ConversationHandle, UserId},
};
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::info;

/// Maps each user to the remote conversation their turns are appended to.
///
/// At most one handle is live per user. Entries are kept for the lifetime of
/// the process; there is no eviction.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the user's conversation, creating one on first contact.
    async fn get_or_create(&self, user: UserId) -> Result<ConversationHandle, SessionError>;

    /// Starts a fresh conversation for the user, replacing any existing one.
    async fn reset(&self, user: UserId) -> Result<ConversationHandle, SessionError>;
}

/// A process-local `SessionStore` that creates conversations through an
/// `AssistantApi`.
pub struct InMemorySessionStore {
    api: Arc<dyn AssistantApi>,
    sessions: RwLock<HashMap<UserId, ConversationHandle>>,
}

impl InMemorySessionStore {
    pub fn new(api: Arc<dyn AssistantApi>) -> Self {
        Self {
            api,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// The user's current handle, if any, without creating one.
    pub async fn handle_for(&self, user: UserId) -> Option<ConversationHandle> {
        self.sessions.read().await.get(&user).cloned()
    }

    /// Number of users with a live conversation.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_or_create(&self, user: UserId) -> Result<ConversationHandle, SessionError> {
        if let Some(handle) = self.sessions.read().await.get(&user) {
            return Ok(handle.clone());
        }

        // The lock is not held across the remote call. If another turn for the
        // same user got here first, its handle wins and ours is abandoned.
        let created = self.api.create_conversation().await?;
        let mut sessions = self.sessions.write().await;
        let handle = sessions.entry(user).or_insert(created).clone();
        info!(%user, conversation = %handle, "Conversation ready for new user");
        Ok(handle)
    }

    async fn reset(&self, user: UserId) -> Result<ConversationHandle, SessionError> {
        let handle = self.api.create_conversation().await?;
        let previous = self.sessions.write().await.insert(user, handle.clone());
        info!(
            %user,
            conversation = %handle,
            replaced = previous.is_some(),
            "Conversation reset"
        );
        Ok(handle)
    }
}
