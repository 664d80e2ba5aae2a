//! Voice Round Trip
//!
//! Inbound voice notes arrive as OGG/Opus. The transcription service is fed a
//! mono 16 kHz WAV produced by `ffmpeg`, so both the original clip and the
//! converted file are written to scoped temporary files that are removed
//! however the call ends. Outbound replies are synthesized to MP3.

use crate::{
    error::{SynthesisError, TranscriptionError},
    speech::{SpeechApi, TranscriptionRequest},
    types::AudioAttachment,
};
use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
};
use tokio::process::Command;
use tracing::{debug, instrument};

/// Sample rate of the audio handed to the transcription service.
pub const TRANSCRIPTION_SAMPLE_RATE: u32 = 16_000;

/// Transcription decoding temperature; zero keeps results deterministic.
pub const TRANSCRIPTION_TEMPERATURE: f32 = 0.0;

/// File name used for synthesized replies.
pub const REPLY_AUDIO_FILENAME: &str = "reply.mp3";

/// Converts a compressed voice clip into a transcription-ready WAV file.
#[async_trait]
pub trait AudioTranscoder: Send + Sync {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), TranscriptionError>;
}

/// Transcodes by running an `ffmpeg` child process.
pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl AudioTranscoder for FfmpegTranscoder {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), TranscriptionError> {
        let result = Command::new(&self.program)
            .arg("-hide_banner")
            .args(["-loglevel", "error"])
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-ac", "1"])
            .arg("-ar")
            .arg(TRANSCRIPTION_SAMPLE_RATE.to_string())
            .args(["-f", "wav"])
            .arg(output)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                TranscriptionError::Transcode(format!(
                    "failed to run {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(TranscriptionError::Transcode(format!(
                "{} exited with {}: {}",
                self.program.display(),
                result.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Turns voice notes into text and reply text into audio.
pub struct AudioPipeline {
    transcoder: Arc<dyn AudioTranscoder>,
    speech: Arc<dyn SpeechApi>,
    language: String,
}

impl AudioPipeline {
    /// # Arguments
    ///
    /// * `transcoder` - Decodes the inbound clip and re-encodes it for transcription.
    /// * `speech` - Transcription and synthesis service.
    /// * `language` - Fixed language of inbound speech (e.g. `lv`).
    pub fn new(
        transcoder: Arc<dyn AudioTranscoder>,
        speech: Arc<dyn SpeechApi>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            transcoder,
            speech,
            language: language.into(),
        }
    }

    /// Transcribes a compressed voice clip.
    #[instrument(skip_all, fields(bytes = audio.len()))]
    pub async fn transcribe(&self, audio: &[u8]) -> Result<String, TranscriptionError> {
        if audio.is_empty() {
            return Err(TranscriptionError::EmptyAudio);
        }

        // Both files are deleted when the handles drop, on every return path.
        let clip = tempfile::Builder::new()
            .prefix("voice-")
            .suffix(".ogg")
            .tempfile()?;
        let wav = tempfile::Builder::new()
            .prefix("voice-")
            .suffix(".wav")
            .tempfile()?;

        tokio::fs::write(clip.path(), audio).await?;
        self.transcoder.transcode(clip.path(), wav.path()).await?;
        debug!(path = %wav.path().display(), "Voice clip converted");

        let transcript = self
            .speech
            .transcribe(TranscriptionRequest {
                file: wav.path().to_path_buf(),
                language: self.language.clone(),
                temperature: TRANSCRIPTION_TEMPERATURE,
            })
            .await?;
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Err(TranscriptionError::EmptyTranscript);
        }
        Ok(transcript.to_string())
    }

    /// Synthesizes `text` and packages it for the transport.
    #[instrument(skip_all, fields(chars = text.len()))]
    pub async fn synthesize(&self, text: &str) -> Result<AudioAttachment, SynthesisError> {
        let bytes = self.speech.synthesize(text).await?;
        if bytes.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }
        Ok(AudioAttachment {
            bytes,
            filename: REPLY_AUDIO_FILENAME.to_string(),
        })
    }
}
