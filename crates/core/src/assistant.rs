//! Remote Assistant Client
//!
//! The assistant service keeps conversation state on its side: a thread per
//! user, messages appended to it, and asynchronous runs that produce the
//! assistant's reply. This module defines the narrow contract the relay needs
//! from that service and an implementation backed by the OpenAI Assistants API.

use crate::{
    error::{RemoteServiceError, SessionError},
    types::{ConversationHandle, MessageRole, RunJob, RunStatus, ThreadMessage},
};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        CreateMessageRequestArgs, CreateRunRequestArgs, CreateThreadRequestArgs, MessageContent,
        MessageObject, MessageRole as OAIMessageRole, RunObject, RunStatus as OAIRunStatus,
    },
};
use async_trait::async_trait;
use tracing::debug;

/// Number of messages fetched when looking for the latest assistant reply.
const MESSAGE_PAGE_SIZE: &str = "20";

/// Operations the relay performs against a stateful assistant service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssistantApi: Send + Sync {
    /// Creates an empty remote conversation and returns its handle.
    async fn create_conversation(&self) -> Result<ConversationHandle, SessionError>;

    /// Appends a message to the conversation.
    async fn create_message(
        &self,
        handle: &ConversationHandle,
        role: MessageRole,
        content: &str,
    ) -> Result<(), RemoteServiceError>;

    /// Starts a run of the configured assistant on the conversation.
    async fn create_run(&self, handle: &ConversationHandle) -> Result<RunJob, RemoteServiceError>;

    /// Fetches the current state of a run.
    async fn retrieve_run(
        &self,
        handle: &ConversationHandle,
        run_id: &str,
    ) -> Result<RunJob, RemoteServiceError>;

    /// Lists the conversation's messages, most recent first.
    ///
    /// Messages without any text part are kept, with empty text, so the most
    /// recent message is never confused with an older one.
    async fn list_messages(
        &self,
        handle: &ConversationHandle,
    ) -> Result<Vec<ThreadMessage>, RemoteServiceError>;
}

/// An implementation of `AssistantApi` for the OpenAI Assistants API.
pub struct OpenAIAssistantClient {
    client: Client<OpenAIConfig>,
    assistant_id: String,
}

impl OpenAIAssistantClient {
    /// Creates a new client bound to one assistant.
    ///
    /// # Arguments
    ///
    /// * `config` - OpenAI API configuration (API key, organization, base URL).
    /// * `assistant_id` - The assistant that every run is started with.
    pub fn new(config: OpenAIConfig, assistant_id: String) -> Self {
        Self {
            client: Client::with_config(config),
            assistant_id,
        }
    }
}

fn to_run_status(status: &OAIRunStatus) -> RunStatus {
    let other = |name: &str| RunStatus::Other(name.to_string());
    match status {
        OAIRunStatus::Queued => RunStatus::Queued,
        OAIRunStatus::InProgress => RunStatus::InProgress,
        OAIRunStatus::Completed => RunStatus::Completed,
        OAIRunStatus::RequiresAction => other("requires_action"),
        OAIRunStatus::Cancelling => other("cancelling"),
        OAIRunStatus::Cancelled => other("cancelled"),
        OAIRunStatus::Failed => other("failed"),
        OAIRunStatus::Incomplete => other("incomplete"),
        OAIRunStatus::Expired => other("expired"),
    }
}

fn to_run_job(run: RunObject) -> RunJob {
    let status = to_run_status(&run.status);
    RunJob { id: run.id, status }
}

/// Flattens a listed message. Text and refusal parts are relayed, image
/// parts are skipped.
fn to_thread_message(message: MessageObject) -> ThreadMessage {
    let role = match message.role {
        OAIMessageRole::User => MessageRole::User,
        OAIMessageRole::Assistant => MessageRole::Assistant,
    };
    let text = message
        .content
        .into_iter()
        .filter_map(|content| match content {
            MessageContent::Text(text) => Some(text.text.value),
            MessageContent::Refusal(refusal) => Some(refusal.refusal),
            MessageContent::ImageFile(_) | MessageContent::ImageUrl(_) => None,
        })
        .collect::<Vec<_>>()
        .join("\n");
    ThreadMessage {
        role,
        text,
        run_id: message.run_id,
    }
}

fn request_error(err: impl std::fmt::Display) -> RemoteServiceError {
    RemoteServiceError::Request(err.to_string())
}

#[async_trait]
impl AssistantApi for OpenAIAssistantClient {
    async fn create_conversation(&self) -> Result<ConversationHandle, SessionError> {
        let request = CreateThreadRequestArgs::default()
            .build()
            .map_err(|e| SessionError::Create(e.to_string()))?;
        let thread = self
            .client
            .threads()
            .create(request)
            .await
            .map_err(|e| SessionError::Create(e.to_string()))?;
        debug!(thread_id = %thread.id, "Created assistant thread");
        Ok(ConversationHandle(thread.id))
    }

    async fn create_message(
        &self,
        handle: &ConversationHandle,
        role: MessageRole,
        content: &str,
    ) -> Result<(), RemoteServiceError> {
        let role = match role {
            MessageRole::User => OAIMessageRole::User,
            MessageRole::Assistant => OAIMessageRole::Assistant,
        };
        let request = CreateMessageRequestArgs::default()
            .role(role)
            .content(content.to_string())
            .build()
            .map_err(request_error)?;
        self.client
            .threads()
            .messages(handle.as_str())
            .create(request)
            .await
            .map_err(request_error)?;
        Ok(())
    }

    async fn create_run(&self, handle: &ConversationHandle) -> Result<RunJob, RemoteServiceError> {
        let request = CreateRunRequestArgs::default()
            .assistant_id(&self.assistant_id)
            .build()
            .map_err(request_error)?;
        let run = self
            .client
            .threads()
            .runs(handle.as_str())
            .create(request)
            .await
            .map_err(request_error)?;
        Ok(to_run_job(run))
    }

    async fn retrieve_run(
        &self,
        handle: &ConversationHandle,
        run_id: &str,
    ) -> Result<RunJob, RemoteServiceError> {
        let run = self
            .client
            .threads()
            .runs(handle.as_str())
            .retrieve(run_id)
            .await
            .map_err(request_error)?;
        Ok(to_run_job(run))
    }

    async fn list_messages(
        &self,
        handle: &ConversationHandle,
    ) -> Result<Vec<ThreadMessage>, RemoteServiceError> {
        let response = self
            .client
            .threads()
            .messages(handle.as_str())
            .list(&[("limit", MESSAGE_PAGE_SIZE), ("order", "desc")])
            .await
            .map_err(request_error)?;

        Ok(response.data.into_iter().map(to_thread_message).collect())
    }
}
