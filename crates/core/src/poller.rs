//! Remote Run Poller
//!
//! The assistant service has no synchronous completion call: a turn is a
//! message appended to the thread followed by a run that is polled until it
//! leaves the `queued`/`in_progress` states.

use crate::{
    assistant::AssistantApi,
    error::RemoteServiceError,
    types::{ConversationHandle, MessageRole, RunStatus},
};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tracing::{debug, instrument, warn};

/// Suspends the current task between status checks.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the Tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Polling parameters for a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Fixed wait before every status check.
    pub interval: Duration,
    /// Status checks allowed before the turn is abandoned.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 300,
        }
    }
}

/// Executes conversational turns against the assistant service.
pub struct RunPoller {
    api: Arc<dyn AssistantApi>,
    sleeper: Arc<dyn Sleeper>,
    config: PollConfig,
}

impl RunPoller {
    pub fn new(api: Arc<dyn AssistantApi>, sleeper: Arc<dyn Sleeper>, config: PollConfig) -> Self {
        Self {
            api,
            sleeper,
            config,
        }
    }

    /// Submits `utterance` to the conversation and waits for the assistant's reply.
    ///
    /// Returns the text of the most recent assistant message once the run
    /// completes. Messages written by another run are skipped, and a latest
    /// reply with no text is `RemoteServiceError::EmptyReply`, never an older
    /// answer. A run ending in any other status yields
    /// `RemoteServiceError::RunFailed` carrying that status.
    #[instrument(skip(self, utterance), fields(conversation = %handle))]
    pub async fn run_turn(
        &self,
        handle: &ConversationHandle,
        utterance: &str,
    ) -> Result<String, RemoteServiceError> {
        self.api
            .create_message(handle, MessageRole::User, utterance)
            .await?;
        let mut run = self.api.create_run(handle).await?;
        debug!(run_id = %run.id, status = %run.status, "Run created");

        let mut attempts = 0;
        while run.status.is_pending() {
            if attempts == self.config.max_attempts {
                warn!(run_id = %run.id, attempts, "Run still pending, giving up");
                return Err(RemoteServiceError::Timeout { attempts });
            }
            self.sleeper.sleep(self.config.interval).await;
            run = self.api.retrieve_run(handle, &run.id).await?;
            attempts += 1;
            debug!(run_id = %run.id, status = %run.status, attempts, "Polled run");
        }

        match run.status {
            RunStatus::Completed => {
                let reply = self
                    .api
                    .list_messages(handle)
                    .await?
                    .into_iter()
                    .find(|message| {
                        message.role == MessageRole::Assistant
                            && message.run_id.as_deref().is_none_or(|id| id == run.id)
                    })
                    .map(|message| message.text)
                    .filter(|text| !text.trim().is_empty());
                reply.ok_or(RemoteServiceError::EmptyReply)
            }
            status => {
                warn!(run_id = %run.id, %status, "Run ended without completing");
                Err(RemoteServiceError::RunFailed {
                    status: status.as_str().to_string(),
                })
            }
        }
    }
}
