//! Client for the Telegram Bot API `sendDocument` method and the decoding of
//! its reply.
//!
//! Telegram files an upload under a different key depending on the media kind
//! it detects (`document`, `video`, `audio` or a `photo` size list). The reply is
//! decoded once into an [`Attachment`] so callers never probe optional fields.

use crate::credentials::Credentials;
use crate::errors::RelayError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde::Deserialize;

/// Any of Telegram's file objects; only the identifier matters here.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct FileRef {
    #[serde(default)]
    pub file_id: Option<String>,
}


/// The uploaded object as Telegram classified it.
#[derive(Clone, Debug, PartialEq)]
pub enum Attachment {
    Document(FileRef),
    Video(FileRef),
    Audio(FileRef),
    /// Photos come back as a list of resized variants, the first being the smallest.
    PhotoVariants(Vec<FileRef>),
}

impl Attachment {
    pub fn file_id(&self) -> Option<&str> {
        let file = match self {
            Attachment::Document(file) | Attachment::Video(file) | Attachment::Audio(file) => {
                Some(file)
            }
            Attachment::PhotoVariants(sizes) => sizes.first(),
        };
        file.and_then(|f| f.file_id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

// Every field is optional: an incomplete reply must normalize to a missing
// file id, not to a decode error.
#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    message_id: Option<i64>,
    #[serde(default)]
    document: Option<FileRef>,
    #[serde(default)]
    video: Option<FileRef>,
    #[serde(default)]
    audio: Option<FileRef>,
    #[serde(default)]
    photo: Option<Vec<FileRef>>,
}

/// The message Telegram created for the upload.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(from = "RawMessage")]
pub struct SentMessage {
    pub message_id: Option<i64>,
    /// The highest priority attachment that carries a file id, if any.
    pub attachment: Option<Attachment>,
}

impl From<RawMessage> for SentMessage {
    fn from(raw: RawMessage) -> Self {
        // Priority order: document, video, audio, photo
        let candidates = [
            raw.document.map(Attachment::Document),
            raw.video.map(Attachment::Video),
            raw.audio.map(Attachment::Audio),
            raw.photo.map(Attachment::PhotoVariants),
        ];

        SentMessage {
            message_id: raw.message_id,
            attachment: candidates
                .into_iter()
                .flatten()
                .find(|attachment| attachment.file_id().is_some()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SendDocumentResponse {
    pub ok: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub result: Option<SentMessage>,
}

/// A payload ready to be posted into a channel.
#[derive(Clone, Debug)]
pub struct OutgoingDocument {
    pub file_name: String,
    pub content_type: Option<String>,
    pub caption: String,
    pub data: Bytes,
}

#[async_trait]
pub trait DocumentSender: Send + Sync {
    /// Posts the document into the credentials' channel and returns Telegram's
    /// decoded reply, whether or not Telegram accepted the upload.
    async fn send_document(
        &self,
        credentials: &Credentials,
        document: OutgoingDocument,
    ) -> Result<SendDocumentResponse, RelayError>;
}

pub struct TelegramClient {
    client: reqwest::Client,
    api_base_url: String,
}

impl TelegramClient {
    pub fn new(api_base_url: &str) -> Self {
        // No request timeout: a 2 GiB upload can legitimately take a long time,
        // callers bound the whole request instead.
        TelegramClient {
            client: reqwest::Client::new(),
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn method_url(&self, bot_token: &str, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.api_base_url,
            bot_token,
            method
        )
    }
}

#[async_trait]
impl DocumentSender for TelegramClient {
    async fn send_document(
        &self,
        credentials: &Credentials,
        document: OutgoingDocument,
    ) -> Result<SendDocumentResponse, RelayError> {
        let OutgoingDocument {
            file_name,
            content_type,
            caption,
            data,
        } = document;

        let length = data.len() as u64;
        let make_part = || {
            Part::stream_with_length(Body::from(data.clone()), length).file_name(file_name.clone())
        };
        let part = match content_type.as_deref() {
            Some(mime) => make_part().mime_str(mime).unwrap_or_else(|_| make_part()),
            None => make_part(),
        };

        let form = Form::new()
            .text("chat_id", credentials.destination_channel_id.clone())
            .part("document", part)
            .text("caption", caption);

        // The bot token is part of the URL, strip it from any error we surface
        let response = self
            .client
            .post(self.method_url(&credentials.bot_token, "sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| RelayError::Transport(e.without_url().to_string()))?;

        serde_json::from_slice(&body)
            .map_err(|e| RelayError::InvalidUpstreamResponse(format!("HTTP {status}: {e}")))
    }
}
