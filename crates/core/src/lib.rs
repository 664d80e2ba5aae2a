//! Runa Core
//!
//! The conversational relay behind the bot: per-user sessions on a stateful
//! assistant service, the run polling state machine, the voice round trip,
//! and the router that ties them to a chat transport.

pub mod assistant;
pub mod audio;
pub mod error;
pub mod poller;
pub mod router;
pub mod session;
pub mod speech;
pub mod types;

pub use error::{
    RemoteServiceError, SessionError, SynthesisError, TranscriptionError, TransportError,
    TurnError,
};
pub use router::{ChatTransport, EventKind, InboundEvent, MessageRouter};
pub use types::{AudioAttachment, ChatId, ConversationHandle, Mention, OutboundReply, UserId};
