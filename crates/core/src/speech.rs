//! Speech-to-text and text-to-speech services.

use crate::error::{SynthesisError, TranscriptionError};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        AudioResponseFormat, CreateSpeechRequestArgs, CreateTranscriptionRequestArgs, SpeechModel,
        SpeechResponseFormat, Voice,
    },
};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

pub const TRANSCRIPTION_MODEL: &str = "whisper-1";

/// A transcription job for an audio file already on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionRequest {
    pub file: PathBuf,
    /// ISO-639-1 language of the speech, e.g. `lv`.
    pub language: String,
    pub temperature: f32,
}

/// The speech services used by the voice pipeline.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechApi: Send + Sync {
    /// Transcribes an audio file to plain text.
    async fn transcribe(&self, request: TranscriptionRequest) -> Result<String, TranscriptionError>;

    /// Synthesizes speech for `text`, returning encoded audio bytes.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError>;
}

/// Maps a configured voice name to an OpenAI voice.
pub fn voice_from_name(name: &str) -> Option<Voice> {
    match name.to_lowercase().as_str() {
        "alloy" => Some(Voice::Alloy),
        "echo" => Some(Voice::Echo),
        "fable" => Some(Voice::Fable),
        "onyx" => Some(Voice::Onyx),
        "nova" => Some(Voice::Nova),
        "shimmer" => Some(Voice::Shimmer),
        _ => None,
    }
}

/// An implementation of `SpeechApi` using OpenAI's audio endpoints
/// (`whisper-1` for transcription, `tts-1` for synthesis).
pub struct OpenAISpeechClient {
    client: Client<OpenAIConfig>,
    voice: Voice,
}

impl OpenAISpeechClient {
    pub fn new(config: OpenAIConfig, voice: Voice) -> Self {
        Self {
            client: Client::with_config(config),
            voice,
        }
    }
}

#[async_trait]
impl SpeechApi for OpenAISpeechClient {
    async fn transcribe(&self, request: TranscriptionRequest) -> Result<String, TranscriptionError> {
        let request = CreateTranscriptionRequestArgs::default()
            .file(request.file)
            .model(TRANSCRIPTION_MODEL)
            .language(request.language)
            .temperature(request.temperature)
            .response_format(AudioResponseFormat::Text)
            .build()
            .map_err(|e| TranscriptionError::Request(e.to_string()))?;

        // The plain-text format is not JSON, so the raw body is the transcript.
        let body = self
            .client
            .audio()
            .transcribe_raw(request)
            .await
            .map_err(|e| TranscriptionError::Request(e.to_string()))?;
        let transcript = String::from_utf8_lossy(&body).trim().to_string();
        debug!(chars = transcript.len(), "Transcription received");
        Ok(transcript)
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        let request = CreateSpeechRequestArgs::default()
            .input(text)
            .model(SpeechModel::Tts1)
            .voice(self.voice.clone())
            .response_format(SpeechResponseFormat::Mp3)
            .build()
            .map_err(|e| SynthesisError::Request(e.to_string()))?;
        let response = self
            .client
            .audio()
            .speech(request)
            .await
            .map_err(|e| SynthesisError::Request(e.to_string()))?;
        Ok(response.bytes.to_vec())
    }
}
