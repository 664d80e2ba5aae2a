//! Shared Application State
//!
//! This module defines the `AppState` struct, which owns the long-lived
//! service clients and the router for the lifetime of the process.

use crate::{config::Config, telegram::TelegramClient};
use anyhow::Context;
use async_openai::config::OpenAIConfig;
use runa_core::{
    MessageRouter,
    assistant::{AssistantApi, OpenAIAssistantClient},
    audio::{AudioPipeline, FfmpegTranscoder},
    poller::{PollConfig, RunPoller, TokioSleeper},
    session::InMemorySessionStore,
    speech::{OpenAISpeechClient, voice_from_name},
};
use std::sync::Arc;

/// The shared application state, created once at startup.
#[derive(Clone)]
pub struct AppState {
    pub telegram: Arc<TelegramClient>,
    pub sessions: Arc<InMemorySessionStore>,
    pub router: Arc<MessageRouter>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Builds the service clients and the router from configuration.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let mut openai_config = OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base("https://api.openai.com/v1");
        if let Some(org_id) = &config.openai_organization_id {
            openai_config = openai_config.with_org_id(org_id);
        }

        let assistant: Arc<dyn AssistantApi> = Arc::new(OpenAIAssistantClient::new(
            openai_config.clone(),
            config.assistant_id.clone(),
        ));
        let voice = voice_from_name(&config.tts_voice)
            .with_context(|| format!("unsupported voice '{}'", config.tts_voice))?;
        let speech = Arc::new(OpenAISpeechClient::new(openai_config, voice));

        let sessions = Arc::new(InMemorySessionStore::new(assistant.clone()));
        let poller = RunPoller::new(
            assistant,
            Arc::new(TokioSleeper),
            PollConfig {
                interval: config.poll_interval,
                max_attempts: config.poll_max_attempts,
            },
        );
        let audio = AudioPipeline::new(
            Arc::new(FfmpegTranscoder::new(config.ffmpeg_path.clone())),
            speech,
            config.transcription_language.clone(),
        );
        let telegram = Arc::new(
            TelegramClient::new(
                config.telegram_api_base.clone(),
                config.telegram_token.clone(),
            )
            .context("failed to build Telegram HTTP client")?,
        );
        let router = Arc::new(MessageRouter::new(
            sessions.clone(),
            poller,
            audio,
            telegram.clone(),
        ));

        Ok(Self {
            telegram,
            sessions,
            router,
            config: Arc::new(config),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{path::PathBuf, time::Duration};
    use tracing::Level;

    fn config(voice: &str) -> Config {
        Config {
            telegram_token: "123:abc".to_string(),
            telegram_api_base: "https://api.telegram.org".to_string(),
            openai_api_key: "test-openai-key".to_string(),
            openai_organization_id: Some("org-123".to_string()),
            assistant_id: "asst_test".to_string(),
            transcription_language: "lv".to_string(),
            tts_voice: voice.to_string(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            poll_interval: Duration::from_millis(10),
            poll_max_attempts: 5,
            log_level: Level::INFO,
        }
    }

    #[tokio::test]
    async fn test_from_config_starts_with_no_sessions() {
        let state = AppState::from_config(config("alloy")).expect("state builds");

        assert!(state.sessions.is_empty().await);
        assert_eq!(state.config.assistant_id, "asst_test");
    }

    #[test]
    fn test_from_config_rejects_unknown_voice() {
        let err = AppState::from_config(config("robot")).err().expect("voice is rejected");

        assert!(err.to_string().contains("robot"));
    }
}
