//! Shared identifiers and value types passed between the relay components.

use std::fmt;

/// Identity of an end user as supplied by the chat transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Destination chat for outbound replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to a remote conversation (an assistant thread).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationHandle(pub String);

impl ConversationHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a remote run as reported by the assistant service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    /// Any other status, kept verbatim (`failed`, `cancelled`, `expired`, ...).
    Other(String),
}

impl RunStatus {
    /// Parses the wire representation used by the assistant service.
    pub fn from_wire(status: &str) -> Self {
        match status {
            "queued" => Self::Queued,
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Other(status) => status,
        }
    }

    /// Whether the run is still waiting to be picked up or executing.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Queued | Self::InProgress)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One asynchronous invocation of the assistant against a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunJob {
    pub id: String,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

/// A message as listed from a remote conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadMessage {
    pub role: MessageRole,
    /// Text parts joined by newlines; empty when the message has none.
    pub text: String,
    /// The run that wrote the message, if any.
    pub run_id: Option<String>,
}

/// Synthesized audio ready to hand to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioAttachment {
    pub bytes: Vec<u8>,
    pub filename: String,
}

/// A user named in a reply's text. Transports that support it link the name
/// to the user's profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub user: UserId,
    pub name: String,
}

/// A reply for the transport: text, audio, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundReply {
    pub text: Option<String>,
    pub audio: Option<AudioAttachment>,
    pub mention: Option<Mention>,
    /// Asks the client to open a reply prompt for the mentioned user.
    pub force_reply: bool,
}

impl OutboundReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_audio(text: impl Into<String>, audio: AudioAttachment) -> Self {
        Self {
            text: Some(text.into()),
            audio: Some(audio),
            ..Default::default()
        }
    }

    /// A text reply that mentions a user and asks them to answer.
    pub fn prompt(text: impl Into<String>, mention: Option<Mention>) -> Self {
        Self {
            text: Some(text.into()),
            mention,
            force_reply: true,
            ..Default::default()
        }
    }
}
