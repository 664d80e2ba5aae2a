//! Telegram Bot API Transport
//!
//! A small client for the handful of Bot API methods the relay needs:
//! long-polling for updates, downloading voice notes, and sending text and
//! audio replies. Updates are translated into transport-neutral
//! `InboundEvent`s for the router.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use runa_core::{
    ChatId, ChatTransport, EventKind, InboundEvent, Mention, OutboundReply, TransportError,
    UserId,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::debug;

/// Telegram rejects text messages longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Upper bound on any single Bot API request without its own timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Envelope around every Bot API response.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
    pub voice: Option<Voice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Voice {
    pub file_id: String,
    pub duration: Option<u32>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct File {
    pub file_id: String,
    pub file_path: Option<String>,
}

#[derive(Serialize)]
struct GetUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

#[derive(Serialize)]
struct GetFile<'a> {
    file_id: &'a str,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    entities: Vec<MessageEntity<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<ForceReply>,
}

/// A `text_mention` entity linking part of the text to a user.
#[derive(Serialize)]
struct MessageEntity<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    /// Offset and length are in UTF-16 code units.
    offset: usize,
    length: usize,
    user: EntityUser<'a>,
}

#[derive(Serialize)]
struct EntityUser<'a> {
    id: i64,
    is_bot: bool,
    first_name: &'a str,
}

#[derive(Serialize)]
struct ForceReply {
    force_reply: bool,
    selective: bool,
}

/// Builds the `sendMessage` body for one chunk of a reply.
fn send_message_body<'a>(
    chat: ChatId,
    chunk: &'a str,
    mention: Option<&'a Mention>,
    force_reply: bool,
) -> SendMessage<'a> {
    let entities = mention
        .and_then(|mention| {
            let start = chunk.find(mention.name.as_str())?;
            Some(MessageEntity {
                kind: "text_mention",
                offset: chunk[..start].encode_utf16().count(),
                length: mention.name.encode_utf16().count(),
                user: EntityUser {
                    id: mention.user.0,
                    is_bot: false,
                    first_name: &mention.name,
                },
            })
        })
        .into_iter()
        .collect();
    SendMessage {
        chat_id: chat.0,
        text: chunk,
        entities,
        reply_markup: force_reply.then_some(ForceReply {
            force_reply: true,
            selective: true,
        }),
    }
}

/// A client bound to one bot token.
pub struct TelegramClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

fn request_error(err: reqwest::Error) -> TransportError {
    // Bot API URLs embed the token, so it must not reach the logs.
    TransportError::Request(err.without_url().to_string())
}

impl TelegramClient {
    /// # Arguments
    ///
    /// * `api_base` - Bot API root without trailing slash, e.g. `https://api.telegram.org`.
    /// * `token` - The bot token issued by BotFather.
    pub fn new(
        api_base: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, TransportError> {
        Self::with_timeout(api_base, token, REQUEST_TIMEOUT)
    }

    /// Like `new`, with a custom per-request timeout. `getUpdates` sets its
    /// own timeout to cover the long poll.
    pub fn with_timeout(
        api_base: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(request_error)?;
        Ok(Self {
            http,
            api_base: api_base.into(),
            token: token.into(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.token, file_path)
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, TransportError> {
        let body: ApiResponse<T> = response.json().await.map_err(request_error)?;
        match (body.ok, body.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(TransportError::Api {
                description: body
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            }),
        }
    }

    async fn call<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> Result<T, TransportError> {
        let mut request = self.http.post(self.method_url(method)).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await.map_err(request_error)?;
        Self::parse(response).await
    }

    /// Long-polls for message updates after `offset`.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TransportError> {
        let body = GetUpdates {
            offset,
            timeout: timeout_secs,
            allowed_updates: ["message"],
        };
        // The HTTP timeout has to outlast the server-side long poll.
        self.call(
            "getUpdates",
            &body,
            Some(Duration::from_secs(timeout_secs + 10)),
        )
        .await
    }

    pub async fn get_file(&self, file_id: &str) -> Result<File, TransportError> {
        self.call("getFile", &GetFile { file_id }, None).await
    }

    pub async fn download_file(&self, file_path: &str) -> Result<Vec<u8>, TransportError> {
        let response = self
            .http
            .get(self.file_url(file_path))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(request_error)?;
        let bytes = response.bytes().await.map_err(request_error)?;
        Ok(bytes.to_vec())
    }

    /// Sends `text`, split into several messages if it exceeds Telegram's limit.
    ///
    /// The mention and the reply prompt are attached to the first message only.
    pub async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        mention: Option<&Mention>,
        force_reply: bool,
    ) -> Result<(), TransportError> {
        for (i, chunk) in split_message(text, MAX_MESSAGE_CHARS).into_iter().enumerate() {
            let first = i == 0;
            let body = send_message_body(
                chat,
                chunk,
                mention.filter(|_| first),
                force_reply && first,
            );
            let _: Message = self.call("sendMessage", &body, None).await?;
        }
        Ok(())
    }

    pub async fn send_audio(
        &self,
        chat: ChatId,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<(), TransportError> {
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("audio/mpeg")
            .map_err(request_error)?;
        let form = Form::new()
            .text("chat_id", chat.0.to_string())
            .part("audio", part);
        let response = self
            .http
            .post(self.method_url("sendAudio"))
            .multipart(form)
            .send()
            .await
            .map_err(request_error)?;
        let _: Message = Self::parse(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn fetch_voice(&self, file_ref: &str) -> Result<Vec<u8>, TransportError> {
        let file = self.get_file(file_ref).await?;
        let path = file
            .file_path
            .ok_or_else(|| TransportError::MissingFile(file.file_id.clone()))?;
        let bytes = self.download_file(&path).await?;
        debug!(file_id = %file.file_id, bytes = bytes.len(), "Voice note downloaded");
        Ok(bytes)
    }

    async fn send(&self, chat: ChatId, reply: OutboundReply) -> Result<(), TransportError> {
        if let Some(text) = reply.text.as_deref() {
            self.send_message(chat, text, reply.mention.as_ref(), reply.force_reply)
                .await?;
        }
        if let Some(audio) = reply.audio {
            self.send_audio(chat, audio.bytes, &audio.filename).await?;
        }
        Ok(())
    }
}

/// Splits `text` into pieces of at most `limit` characters, preferring to
/// break after a newline.
pub fn split_message(text: &str, limit: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while rest.chars().count() > limit {
        let hard_end = rest
            .char_indices()
            .nth(limit)
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());
        let end = rest[..hard_end]
            .rfind('\n')
            .map(|idx| idx + 1)
            .unwrap_or(hard_end);
        chunks.push(&rest[..end]);
        rest = &rest[end..];
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest);
    }
    chunks
}

/// Offset for the next `getUpdates` call, acknowledging everything received.
pub fn next_offset(current: Option<i64>, updates: &[Update]) -> Option<i64> {
    updates
        .iter()
        .map(|update| update.update_id + 1)
        .max()
        .max(current)
}

/// Translates a Telegram update into a router event.
///
/// Returns `None` for updates the relay ignores: non-message updates,
/// messages without a sender, unknown commands, and other media.
pub fn to_event(update: &Update) -> Option<InboundEvent> {
    let message = update.message.as_ref()?;
    let from = message.from.as_ref()?;

    let kind = if let Some(voice) = &message.voice {
        EventKind::Voice {
            file_ref: voice.file_id.clone(),
        }
    } else {
        let text = message.text.as_deref()?.trim();
        if text.is_empty() {
            return None;
        }
        match text.strip_prefix('/') {
            Some(command) => {
                let name = command.split_whitespace().next().unwrap_or_default();
                let name = name.split('@').next().unwrap_or_default();
                match name {
                    "start" => EventKind::Start,
                    "help" => EventKind::Help,
                    _ => return None,
                }
            }
            None => EventKind::Text(text.to_string()),
        }
    };

    Some(InboundEvent {
        user: UserId(from.id),
        chat: ChatId(message.chat.id),
        display_name: Some(from.first_name.clone()),
        kind,
    })
}
