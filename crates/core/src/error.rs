//! Error Taxonomy
//!
//! Each seam of the relay has its own error type so failures keep their
//! structure until the router turns them into a user-facing message.

/// Creating a remote conversation (thread) failed.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("could not create conversation: {0}")]
    Create(String),
}

/// A turn against the remote assistant did not produce a reply.
#[derive(Debug, thiserror::Error)]
pub enum RemoteServiceError {
    /// The run reached a terminal status other than `completed`.
    #[error("Assistant run status: {status}")]
    RunFailed { status: String },
    /// The run was still pending after the configured number of status checks.
    #[error("Assistant run did not finish after {attempts} status checks")]
    Timeout { attempts: u32 },
    #[error("assistant service request failed: {0}")]
    Request(String),
    /// The run completed but the thread holds no assistant message.
    #[error("assistant returned no reply")]
    EmptyReply,
}

#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error("voice message contained no audio")]
    EmptyAudio,
    #[error("no speech recognized in voice message")]
    EmptyTranscript,
    #[error("could not convert voice message: {0}")]
    Transcode(String),
    #[error("audio scratch file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transcription request failed: {0}")]
    Request(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("speech synthesis request failed: {0}")]
    Request(String),
    #[error("speech synthesis returned no audio")]
    EmptyAudio,
}

/// Failures talking to the chat transport itself.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport request failed: {0}")]
    Request(String),
    #[error("transport rejected the call: {description}")]
    Api { description: String },
    #[error("file {0} has no download path")]
    MissingFile(String),
}

/// Everything that can go wrong while handling one inbound event.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Remote(#[from] RemoteServiceError),
    #[error(transparent)]
    Transcription(#[from] TranscriptionError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl TurnError {
    /// The text shown to the end user when a turn fails.
    pub fn user_message(&self) -> String {
        format!("Something went wrong. Please try again. {}", self)
    }
}
