//! Message Router
//!
//! Dispatches inbound transport events to the session store, the run poller
//! and the audio pipeline, and hands the results back to the transport.
//! Failures of a turn never escape this module: they are logged and turned
//! into a text reply for the user.

use crate::{
    audio::AudioPipeline,
    error::{TransportError, TurnError},
    poller::RunPoller,
    session::SessionStore,
    types::{ChatId, Mention, OutboundReply, UserId},
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

pub const HELP_TEXT: &str = "Send me a text or a voice message and I will pass it to the assistant.\n\
Voice messages are answered with text and audio.\n\
/start - begin a new conversation\n\
/help - show this message";

/// What the user sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// `/start`: discard the current conversation and greet the user.
    Start,
    Help,
    Text(String),
    /// A voice note, referenced by the transport's file id.
    Voice { file_ref: String },
}

/// One inbound event from the chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub user: UserId,
    pub chat: ChatId,
    pub display_name: Option<String>,
    pub kind: EventKind,
}

/// The slice of the chat transport the router depends on.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Downloads the raw bytes of a voice note.
    async fn fetch_voice(&self, file_ref: &str) -> Result<Vec<u8>, TransportError>;

    /// Delivers a reply to a chat.
    async fn send(&self, chat: ChatId, reply: OutboundReply) -> Result<(), TransportError>;
}

pub struct MessageRouter {
    sessions: Arc<dyn SessionStore>,
    poller: RunPoller,
    audio: AudioPipeline,
    transport: Arc<dyn ChatTransport>,
}

impl MessageRouter {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        poller: RunPoller,
        audio: AudioPipeline,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        Self {
            sessions,
            poller,
            audio,
            transport,
        }
    }

    /// Handles one inbound event end to end, sending every resulting reply.
    #[instrument(name = "event", skip_all, fields(user = %event.user, chat = %event.chat))]
    pub async fn dispatch(&self, event: InboundEvent) {
        let chat = event.chat;
        for reply in self.replies_for(event).await {
            if let Err(e) = self.transport.send(chat, reply).await {
                error!(error = %e, "Failed to deliver reply");
            }
        }
    }

    /// Computes the replies for an event, converting failures to text.
    async fn replies_for(&self, event: InboundEvent) -> Vec<OutboundReply> {
        match event.kind {
            EventKind::Start => match self.sessions.reset(event.user).await {
                Ok(_) => vec![start_reply(event.user, event.display_name.as_deref())],
                Err(e) => vec![failure_reply(e.into())],
            },
            EventKind::Help => vec![OutboundReply::text(HELP_TEXT)],
            EventKind::Text(text) => match self.text_turn(event.user, &text).await {
                Ok(reply) => vec![OutboundReply::text(reply)],
                Err(e) => vec![failure_reply(e)],
            },
            EventKind::Voice { file_ref } => self.voice_turn(event.user, &file_ref).await,
        }
    }

    async fn text_turn(&self, user: UserId, text: &str) -> Result<String, TurnError> {
        let handle = self.sessions.get_or_create(user).await?;
        Ok(self.poller.run_turn(&handle, text).await?)
    }

    async fn voice_turn(&self, user: UserId, file_ref: &str) -> Vec<OutboundReply> {
        let reply = match self.transcribe_and_answer(user, file_ref).await {
            Ok(reply) => reply,
            Err(e) => return vec![failure_reply(e)],
        };
        match self.audio.synthesize(&reply).await {
            Ok(audio) => vec![OutboundReply::with_audio(reply, audio)],
            // The answer itself is still worth delivering without audio.
            Err(e) => vec![OutboundReply::text(reply), failure_reply(e.into())],
        }
    }

    async fn transcribe_and_answer(&self, user: UserId, file_ref: &str) -> Result<String, TurnError> {
        let clip = self.transport.fetch_voice(file_ref).await?;
        let transcript = self.audio.transcribe(&clip).await?;
        info!(chars = transcript.len(), "Voice message transcribed");
        self.text_turn(user, &transcript).await
    }
}

fn greeting(display_name: Option<&str>) -> String {
    match display_name {
        Some(name) if !name.trim().is_empty() => format!("Sveiki, {}!", name.trim()),
        _ => "Sveiki!".to_string(),
    }
}

/// Greets the user by name and prompts them for their first message.
fn start_reply(user: UserId, display_name: Option<&str>) -> OutboundReply {
    let mention = display_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| Mention {
            user,
            name: name.to_string(),
        });
    OutboundReply::prompt(greeting(display_name), mention)
}

fn failure_reply(err: TurnError) -> OutboundReply {
    warn!(error = %err, "Turn failed");
    OutboundReply::text(err.user_message())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assistant::MockAssistantApi,
        audio::AudioTranscoder,
        error::{RemoteServiceError, SynthesisError, TranscriptionError},
        poller::{PollConfig, Sleeper},
        session::InMemorySessionStore,
        speech::MockSpeechApi,
        types::{ConversationHandle, MessageRole, RunJob, RunStatus, ThreadMessage},
    };
    use mockall::predicate::eq;
    use std::{
        path::Path,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    struct NoSleep;

    #[async_trait]
    impl Sleeper for NoSleep {
        async fn sleep(&self, _duration: Duration) {}
    }

    struct CopyTranscoder;

    #[async_trait]
    impl AudioTranscoder for CopyTranscoder {
        async fn transcode(&self, input: &Path, output: &Path) -> Result<(), TranscriptionError> {
            tokio::fs::copy(input, output).await?;
            Ok(())
        }
    }

    /// Records every reply and serves voice clips from a fixed payload.
    #[derive(Default)]
    struct RecordingTransport {
        clip: Vec<u8>,
        sent: Mutex<Vec<(ChatId, OutboundReply)>>,
    }

    impl RecordingTransport {
        fn with_clip(clip: &[u8]) -> Self {
            Self {
                clip: clip.to_vec(),
                ..Default::default()
            }
        }

        fn sent(&self) -> Vec<(ChatId, OutboundReply)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn fetch_voice(&self, file_ref: &str) -> Result<Vec<u8>, TransportError> {
            if file_ref == "missing" {
                return Err(TransportError::MissingFile(file_ref.to_string()));
            }
            Ok(self.clip.clone())
        }

        async fn send(&self, chat: ChatId, reply: OutboundReply) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push((chat, reply));
            Ok(())
        }
    }

    /// An assistant that answers every utterance with "Atbilde: <utterance>".
    fn answering_api(turns: usize) -> MockAssistantApi {
        let conversations = AtomicUsize::new(0);
        let last_utterance = Arc::new(Mutex::new(String::new()));
        let mut api = MockAssistantApi::new();
        api.expect_create_conversation().returning(move || {
            let n = conversations.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ConversationHandle(format!("thread_{}", n)))
        });
        let recorded = last_utterance.clone();
        api.expect_create_message()
            .times(turns)
            .returning(move |_, _, content| {
                *recorded.lock().unwrap() = content.to_string();
                Ok(())
            });
        api.expect_create_run().times(turns).returning(|_| {
            Ok(RunJob {
                id: "run_1".to_string(),
                status: RunStatus::Queued,
            })
        });
        api.expect_retrieve_run().returning(|_, _| {
            Ok(RunJob {
                id: "run_1".to_string(),
                status: RunStatus::Completed,
            })
        });
        api.expect_list_messages().returning(move |_| {
            Ok(vec![ThreadMessage {
                role: MessageRole::Assistant,
                text: format!("Atbilde: {}", last_utterance.lock().unwrap()),
                run_id: None,
            }])
        });
        api
    }

    fn echo_speech() -> MockSpeechApi {
        let mut speech = MockSpeechApi::new();
        speech.expect_transcribe().returning(|request| {
            let bytes = std::fs::read(&request.file).expect("converted file exists");
            Ok(String::from_utf8_lossy(&bytes).to_string())
        });
        speech
            .expect_synthesize()
            .returning(|text| Ok(text.as_bytes().to_vec()));
        speech
    }

    struct Fixture {
        router: MessageRouter,
        sessions: Arc<InMemorySessionStore>,
        transport: Arc<RecordingTransport>,
    }

    fn fixture(api: MockAssistantApi, speech: MockSpeechApi, transport: RecordingTransport) -> Fixture {
        let api: Arc<MockAssistantApi> = Arc::new(api);
        let sessions = Arc::new(InMemorySessionStore::new(api.clone()));
        let transport = Arc::new(transport);
        let poller = RunPoller::new(api, Arc::new(NoSleep), PollConfig::default());
        let audio = AudioPipeline::new(Arc::new(CopyTranscoder), Arc::new(speech), "lv");
        Fixture {
            router: MessageRouter::new(sessions.clone(), poller, audio, transport.clone()),
            sessions,
            transport,
        }
    }

    fn event(kind: EventKind) -> InboundEvent {
        InboundEvent {
            user: UserId(100),
            chat: ChatId(500),
            display_name: Some("Anna".to_string()),
            kind,
        }
    }

    #[tokio::test]
    async fn test_start_then_text_uses_single_conversation() {
        let f = fixture(answering_api(1), echo_speech(), RecordingTransport::default());

        f.router.dispatch(event(EventKind::Start)).await;
        f.router.dispatch(event(EventKind::Text("Hello".to_string()))).await;

        assert_eq!(f.sessions.len().await, 1);
        assert_eq!(
            f.sessions.handle_for(UserId(100)).await,
            Some(ConversationHandle("thread_1".to_string()))
        );
        let sent = f.transport.sent();
        assert_eq!(
            sent,
            vec![
                (
                    ChatId(500),
                    OutboundReply::prompt(
                        "Sveiki, Anna!",
                        Some(Mention {
                            user: UserId(100),
                            name: "Anna".to_string(),
                        })
                    )
                ),
                (ChatId(500), OutboundReply::text("Atbilde: Hello")),
            ]
        );
    }

    #[tokio::test]
    async fn test_help_does_not_touch_the_assistant() {
        let mut api = MockAssistantApi::new();
        api.expect_create_conversation().never();
        api.expect_create_message().never();
        let f = fixture(api, MockSpeechApi::new(), RecordingTransport::default());

        f.router.dispatch(event(EventKind::Help)).await;

        assert_eq!(f.transport.sent(), vec![(ChatId(500), OutboundReply::text(HELP_TEXT))]);
        assert!(f.sessions.is_empty().await);
    }

    #[tokio::test]
    async fn test_voice_message_replies_with_text_and_audio() {
        let f = fixture(
            answering_api(1),
            echo_speech(),
            RecordingTransport::with_clip("Labrīt".as_bytes()),
        );

        f.router
            .dispatch(event(EventKind::Voice {
                file_ref: "voice_1".to_string(),
            }))
            .await;

        let sent = f.transport.sent();
        assert_eq!(sent.len(), 1);
        let reply = &sent[0].1;
        assert_eq!(reply.text.as_deref(), Some("Atbilde: Labrīt"));
        let audio = reply.audio.as_ref().expect("audio attached");
        assert!(!audio.bytes.is_empty());
        assert_eq!(audio.filename, "reply.mp3");
    }

    #[tokio::test]
    async fn test_voice_transcript_is_the_submitted_utterance() {
        let mut api = MockAssistantApi::new();
        api.expect_create_conversation()
            .times(1)
            .returning(|| Ok(ConversationHandle("thread_1".to_string())));
        api.expect_create_message()
            .with(
                eq(ConversationHandle("thread_1".to_string())),
                eq(MessageRole::User),
                eq("Labrīt"),
            )
            .times(1)
            .returning(|_, _, _| Ok(()));
        api.expect_create_run().times(1).returning(|_| {
            Ok(RunJob {
                id: "run_1".to_string(),
                status: RunStatus::Completed,
            })
        });
        api.expect_list_messages().times(1).returning(|_| {
            Ok(vec![ThreadMessage {
                role: MessageRole::Assistant,
                text: "Labrīt!".to_string(),
                run_id: None,
            }])
        });
        let f = fixture(
            api,
            echo_speech(),
            RecordingTransport::with_clip("Labrīt".as_bytes()),
        );

        f.router
            .dispatch(event(EventKind::Voice {
                file_ref: "voice_1".to_string(),
            }))
            .await;

        assert_eq!(f.transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_submission_network_error_yields_one_text_reply() {
        let mut api = MockAssistantApi::new();
        api.expect_create_conversation()
            .returning(|| Ok(ConversationHandle("thread_1".to_string())));
        api.expect_create_message()
            .times(1)
            .returning(|_, _, _| Err(RemoteServiceError::Request("connection reset".to_string())));
        api.expect_create_run().never();
        let f = fixture(api, echo_speech(), RecordingTransport::default());

        f.router.dispatch(event(EventKind::Text("Hello".to_string()))).await;

        let sent = f.transport.sent();
        assert_eq!(sent.len(), 1);
        let reply = &sent[0].1;
        assert!(reply.audio.is_none());
        let text = reply.text.as_deref().unwrap();
        assert!(text.starts_with("Something went wrong"));
        assert!(text.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_failed_run_status_reaches_the_user() {
        let mut api = MockAssistantApi::new();
        api.expect_create_conversation()
            .returning(|| Ok(ConversationHandle("thread_1".to_string())));
        api.expect_create_message().returning(|_, _, _| Ok(()));
        api.expect_create_run().returning(|_| {
            Ok(RunJob {
                id: "run_1".to_string(),
                status: RunStatus::from_wire("failed"),
            })
        });
        let f = fixture(api, echo_speech(), RecordingTransport::default());

        f.router.dispatch(event(EventKind::Text("Hello".to_string()))).await;

        let sent = f.transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.text.as_deref().unwrap().contains("failed"));
    }

    #[tokio::test]
    async fn test_voice_download_failure_skips_the_turn() {
        let mut api = MockAssistantApi::new();
        api.expect_create_conversation().never();
        api.expect_create_message().never();
        let f = fixture(api, echo_speech(), RecordingTransport::default());

        f.router
            .dispatch(event(EventKind::Voice {
                file_ref: "missing".to_string(),
            }))
            .await;

        let sent = f.transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.audio.is_none());
        assert!(sent[0].1.text.as_deref().unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn test_synthesis_failure_still_delivers_text() {
        let mut speech = MockSpeechApi::new();
        speech.expect_transcribe().returning(|_| Ok("Labrīt".to_string()));
        speech
            .expect_synthesize()
            .returning(|_| Err(SynthesisError::Request("quota exceeded".to_string())));
        let f = fixture(
            answering_api(1),
            speech,
            RecordingTransport::with_clip(b"clip"),
        );

        f.router
            .dispatch(event(EventKind::Voice {
                file_ref: "voice_1".to_string(),
            }))
            .await;

        let sent = f.transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].1, OutboundReply::text("Atbilde: Labrīt"));
        assert!(sent[1].1.audio.is_none());
        assert!(sent[1].1.text.as_deref().unwrap().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_silent_voice_message_is_not_submitted() {
        let mut api = MockAssistantApi::new();
        api.expect_create_conversation().never();
        api.expect_create_message().never();
        let f = fixture(api, echo_speech(), RecordingTransport::with_clip(b"  \n "));

        f.router
            .dispatch(event(EventKind::Voice {
                file_ref: "voice_1".to_string(),
            }))
            .await;

        let sent = f.transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.audio.is_none());
        assert!(sent[0].1.text.as_deref().unwrap().contains("no speech recognized"));
    }

    #[test]
    fn test_start_reply_prompts_the_named_user() {
        let reply = start_reply(UserId(7), Some(" Jānis "));

        assert_eq!(reply.text.as_deref(), Some("Sveiki, Jānis!"));
        assert!(reply.force_reply);
        assert_eq!(
            reply.mention,
            Some(Mention {
                user: UserId(7),
                name: "Jānis".to_string(),
            })
        );

        let anonymous = start_reply(UserId(7), None);
        assert_eq!(anonymous.text.as_deref(), Some("Sveiki!"));
        assert!(anonymous.force_reply);
        assert!(anonymous.mention.is_none());
    }

    #[test]
    fn test_greeting_without_name() {
        assert_eq!(greeting(None), "Sveiki!");
        assert_eq!(greeting(Some("  ")), "Sveiki!");
        assert_eq!(greeting(Some("Jānis")), "Sveiki, Jānis!");
    }
}
