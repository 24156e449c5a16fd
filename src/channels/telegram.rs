//! Telegram Bot API client and webhook update types.
//!
//! Updates arrive by webhook; this module only talks back to the Bot API:
//! `sendMessage` for replies, `getFile` plus the file endpoint for media, and
//! `getMe` for the startup token check.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::channels::MessagingPlatform;
use crate::error::ChannelError;

/// Maximum message length, in characters, for Telegram's sendMessage API.
pub const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

const CHANNEL_NAME: &str = "telegram";

// ── Webhook update types ────────────────────────────────────────────

/// An inbound webhook update. Only `message` is handled.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramUpdate {
    #[serde(default)]
    pub update_id: Option<i64>,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramMessage {
    #[serde(default)]
    pub message_id: Option<i64>,
    pub chat: TelegramChat,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    #[serde(default)]
    pub text: Option<String>,
    /// Text sent along with a document or photo.
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub document: Option<TelegramDocument>,
    /// Size variants, smallest first.
    #[serde(default)]
    pub photo: Option<Vec<TelegramPhotoSize>>,
}

impl TelegramMessage {
    pub fn username(&self) -> Option<&str> {
        self.from.as_ref().and_then(|f| f.username.as_deref())
    }

    /// Largest photo variant, if the message carries a non-empty photo array.
    pub fn largest_photo(&self) -> Option<&TelegramPhotoSize> {
        self.photo.as_deref().and_then(<[TelegramPhotoSize]>::last)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramUser {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramDocument {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramPhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

/// Bot API response envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    description: Option<String>,
}

// ── Client ──────────────────────────────────────────────────────────

/// Telegram Bot API client. Cheap to share behind an `Arc`.
pub struct TelegramClient {
    bot_token: SecretString,
    api_base: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl TelegramClient {
    pub fn new(
        bot_token: SecretString,
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChannelError::Http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            bot_token,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.api_base,
            self.bot_token.expose_secret()
        )
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "{}/file/bot{}/{}",
            self.api_base,
            self.bot_token.expose_secret(),
            file_path.trim_start_matches('/')
        )
    }

    /// Convert a transport error, dropping the URL so the token never lands
    /// in a log line.
    fn transport_error(&self, method: &str, e: reqwest::Error) -> ChannelError {
        if e.is_timeout() {
            return ChannelError::Timeout {
                name: CHANNEL_NAME.into(),
                timeout: self.timeout,
            };
        }
        ChannelError::SendFailed {
            name: CHANNEL_NAME.into(),
            reason: format!("{method}: {}", e.without_url()),
        }
    }

    fn status_error(method: &str, status: reqwest::StatusCode) -> ChannelError {
        ChannelError::Status {
            name: CHANNEL_NAME.into(),
            method: method.into(),
            status: status.as_u16(),
        }
    }

    async fn read_envelope(
        method: &str,
        resp: reqwest::Response,
    ) -> Result<ApiResponse, ChannelError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(Self::status_error(method, status));
        }
        let envelope: ApiResponse =
            resp.json()
                .await
                .map_err(|e| ChannelError::InvalidResponse {
                    name: CHANNEL_NAME.into(),
                    reason: format!("{method}: {}", e.without_url()),
                })?;
        if !envelope.ok {
            return Err(ChannelError::InvalidResponse {
                name: CHANNEL_NAME.into(),
                reason: format!(
                    "{method}: {}",
                    envelope.description.as_deref().unwrap_or("ok=false")
                ),
            });
        }
        Ok(envelope)
    }
}

#[async_trait]
impl MessagingPlatform for TelegramClient {
    /// Sends one plain-text message. Text over Telegram's limit is cut on a
    /// char boundary rather than split, so a reply is always a single message.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), ChannelError> {
        let fitted = truncate_chars(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        if fitted.len() < text.len() {
            warn!(chat_id, chars = text.chars().count(), "Reply truncated to Telegram limit");
        }
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": fitted,
        });

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error("sendMessage", e))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            warn!(%status, detail = %detail, "Telegram sendMessage rejected");
            return Err(Self::status_error("sendMessage", status));
        }
        debug!(chat_id, "Telegram message sent");
        Ok(())
    }

    async fn resolve_file(&self, file_id: &str) -> Result<Option<String>, ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getFile"))
            .query(&[("file_id", file_id)])
            .send()
            .await
            .map_err(|e| self.transport_error("getFile", e))?;

        let envelope = Self::read_envelope("getFile", resp).await?;
        let file_path = envelope
            .result
            .as_ref()
            .and_then(|r| r.get("file_path"))
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .map(String::from);

        debug!(file_id, resolved = file_path.is_some(), "Telegram getFile");
        Ok(file_path)
    }

    async fn download(&self, file_path: &str) -> Result<Vec<u8>, ChannelError> {
        let resp = self
            .client
            .get(self.file_url(file_path))
            .send()
            .await
            .map_err(|e| self.transport_error("download", e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Self::status_error("download", status));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| self.transport_error("download", e))?;
        debug!(file_path, size = bytes.len(), "Downloaded file from Telegram");
        Ok(bytes.to_vec())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| self.transport_error("getMe", e))?;

        let envelope = Self::read_envelope("getMe", resp).await?;
        let username = envelope
            .result
            .as_ref()
            .and_then(|r| r.get("username"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        tracing::info!(bot = username, "Telegram token verified");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// The longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((at, _)) => &text[..at],
        None => text,
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const TOKEN: &str = "123456:TEST-token_abc";

    fn client(server: &MockServer) -> TelegramClient {
        TelegramClient::new(
            SecretString::from(TOKEN),
            server.uri(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    // ── Update parsing ──────────────────────────────────────────────

    #[test]
    fn update_parses_text_message() {
        let update: TelegramUpdate = serde_json::from_value(json!({
            "update_id": 10,
            "message": {
                "message_id": 1,
                "chat": {"id": 555, "type": "private"},
                "from": {"id": 9, "username": "ana"},
                "text": "hello"
            }
        }))
        .unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.chat.id, 555);
        assert_eq!(message.username(), Some("ana"));
        assert_eq!(message.text.as_deref(), Some("hello"));
    }

    #[test]
    fn largest_photo_is_last_variant() {
        let message: TelegramMessage = serde_json::from_value(json!({
            "chat": {"id": 1},
            "photo": [
                {"file_id": "small", "width": 90, "height": 90},
                {"file_id": "large", "width": 1280, "height": 1280}
            ]
        }))
        .unwrap();
        assert_eq!(message.largest_photo().unwrap().file_id, "large");

        let empty: TelegramMessage =
            serde_json::from_value(json!({"chat": {"id": 1}, "photo": []})).unwrap();
        assert!(empty.largest_photo().is_none());
    }

    #[test]
    fn message_without_chat_id_fails_to_parse() {
        let result = serde_json::from_value::<TelegramMessage>(json!({"chat": {}, "text": "x"}));
        assert!(result.is_err());
    }

    // ── API calls ───────────────────────────────────────────────────

    #[tokio::test]
    async fn send_text_posts_plain_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/sendMessage")))
            .and(body_json(json!({"chat_id": 42, "text": "Message received: hi"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .send_text(42, "Message received: hi")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn send_text_surfaces_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
            .mount(&server)
            .await;

        let err = client(&server).send_text(42, "hi").await.unwrap_err();
        assert!(
            matches!(err, ChannelError::Status { status: 403, ref method, .. } if method == "sendMessage"),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn resolve_file_returns_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/bot{TOKEN}/getFile")))
            .and(query_param("file_id", "doc-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"file_id": "doc-1", "file_path": "documents/file_7.pdf"}
            })))
            .mount(&server)
            .await;

        let resolved = client(&server).resolve_file("doc-1").await.unwrap();
        assert_eq!(resolved.as_deref(), Some("documents/file_7.pdf"));
    }

    #[tokio::test]
    async fn resolve_file_without_path_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/bot{TOKEN}/getFile")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": true, "result": {"file_id": "x"}})),
            )
            .mount(&server)
            .await;

        assert!(client(&server).resolve_file("x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resolve_file_rejected_by_api() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "description": "Bad Request: invalid file_id"
            })))
            .mount(&server)
            .await;

        let err = client(&server).resolve_file("bad").await.unwrap_err();
        assert!(matches!(err, ChannelError::Status { status: 400, .. }), "{err:?}");
    }

    #[tokio::test]
    async fn download_fetches_bytes_from_file_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/file/bot{TOKEN}/photos/file_1.jpg")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF]))
            .mount(&server)
            .await;

        let bytes = client(&server).download("photos/file_1.jpg").await.unwrap();
        assert_eq!(bytes, vec![0xFF, 0xD8, 0xFF]);
    }

    #[tokio::test]
    async fn download_non_success_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server).download("gone.pdf").await.unwrap_err();
        assert!(
            matches!(err, ChannelError::Status { status: 404, ref method, .. } if method == "download"),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn health_check_requires_ok_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/bot{TOKEN}/getMe")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"id": 123456, "is_bot": true, "username": "arems_bot"}
            })))
            .mount(&server)
            .await;
        client(&server).health_check().await.unwrap();

        let rejected = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "ok": false,
                "description": "Unauthorized"
            })))
            .mount(&rejected)
            .await;
        assert!(client(&rejected).health_check().await.is_err());
    }

    #[tokio::test]
    async fn timeout_is_reported_as_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": true}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let slow = TelegramClient::new(
            SecretString::from(TOKEN),
            server.uri(),
            Duration::from_millis(50),
        )
        .unwrap();
        let err = slow.send_text(1, "hi").await.unwrap_err();
        assert!(matches!(err, ChannelError::Timeout { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn transport_errors_do_not_leak_token() {
        let unreachable = TelegramClient::new(
            SecretString::from(TOKEN),
            "http://127.0.0.1:9",
            Duration::from_secs(2),
        )
        .unwrap();
        let err = unreachable.send_text(1, "hi").await.unwrap_err();
        assert!(!err.to_string().contains(TOKEN), "{err}");
    }

    #[tokio::test]
    async fn oversized_text_is_sent_as_one_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/sendMessage")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .send_text(7, &"a".repeat(5000))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["text"].as_str().unwrap().len(), TELEGRAM_MAX_MESSAGE_LENGTH);
    }

    // ── Truncation ──────────────────────────────────────────────────

    #[test]
    fn truncate_chars_short_text_unchanged() {
        assert_eq!(truncate_chars("Hello", 4096), "Hello");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn truncate_chars_counts_characters_not_bytes() {
        // 🚨 is four bytes but one character.
        let msg = format!("a{}", "🚨".repeat(5000));
        let cut = truncate_chars(&msg, 4096);
        assert_eq!(cut.chars().count(), 4096);
        assert!(msg.starts_with(cut));
    }
}
