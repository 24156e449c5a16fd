//! Telegram webhook: records the message, then answers with exactly one
//! outbound message (media receipt, escalation notice or echo).

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use tracing::info;

use crate::channels::media::{MediaIngestor, MediaItem};
use crate::channels::telegram::{
    TELEGRAM_MAX_MESSAGE_LENGTH, TelegramMessage, TelegramUpdate, truncate_chars,
};
use crate::error::Error;
use crate::pipeline::gate;
use crate::pipeline::types::InboundRequest;
use crate::store::traits::{MessageRecord, ProfileUpdate, UNKNOWN_USERNAME};
use crate::webhook::routes::AppState;

/// Sent to the user when their message could not be handled.
pub const APOLOGY: &str = "Sorry, something went wrong. Please try again.";

static ESCALATION_KEYWORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)emergency|urgent|help|disaster").expect("static pattern"));

/// JSON body returned to the messaging platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusBody {
    pub status: &'static str,
    pub message: String,
}

impl StatusBody {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
        }
    }
}

/// What happened to an update that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagingOutcome {
    /// Not a `message` update; nothing stored or sent.
    Ignored,
    /// Message stored and answered.
    Processed { chat_id: i64 },
}

impl MessagingOutcome {
    pub fn body(&self) -> StatusBody {
        match self {
            Self::Ignored => StatusBody::success("Update processed"),
            Self::Processed { .. } => StatusBody::success("Telegram message processed"),
        }
    }
}

/// A failed update, with the chat to apologise to when it is known.
#[derive(Debug)]
pub struct MessagingFailure {
    pub chat_id: Option<i64>,
    pub error: Error,
}

impl MessagingFailure {
    fn before_chat(error: Error) -> Self {
        Self {
            chat_id: None,
            error,
        }
    }
}

const ESCALATION_PREFIX: &str = "🚨 Emergency detected! For immediate assistance, please use our \
     Dialogflow CX emergency system or call emergency services. You said: ";
const ECHO_PREFIX: &str = "Message received: ";

/// Reply to a plain text message. The echoed text is cut so the reply always
/// fits in a single platform message.
pub fn text_reply(text: &str) -> String {
    let prefix = if ESCALATION_KEYWORDS.is_match(text) {
        ESCALATION_PREFIX
    } else {
        ECHO_PREFIX
    };
    let budget = TELEGRAM_MAX_MESSAGE_LENGTH - prefix.chars().count();
    format!("{prefix}{}", truncate_chars(text, budget))
}

/// Handle one Telegram webhook call.
pub async fn handle(
    state: &AppState,
    request: &InboundRequest,
) -> Result<MessagingOutcome, MessagingFailure> {
    let body = request
        .json()
        .filter(|v| gate::is_present(Some(v)))
        .ok_or_else(|| MessagingFailure::before_chat(Error::MalformedPayload("No data".into())))?;

    if body.get("message").is_none_or(|m| m.is_null()) {
        info!("Non-message Telegram update received");
        return Ok(MessagingOutcome::Ignored);
    }

    let update: TelegramUpdate = serde_json::from_value(body.clone()).map_err(|e| {
        MessagingFailure::before_chat(Error::MalformedPayload(format!("Malformed update: {e}")))
    })?;
    let Some(message) = update.message else {
        return Ok(MessagingOutcome::Ignored);
    };

    let chat_id = message.chat.id;
    process_message(state, &message)
        .await
        .map(|()| MessagingOutcome::Processed { chat_id })
        .map_err(|error| MessagingFailure {
            chat_id: Some(chat_id),
            error,
        })
}

async fn process_message(state: &AppState, message: &TelegramMessage) -> Result<(), Error> {
    let chat_id = message.chat.id;
    let conversation_id = chat_id.to_string();
    let username = message.username().unwrap_or(UNKNOWN_USERNAME);
    let text = message
        .text
        .as_deref()
        .or(message.caption.as_deref())
        .unwrap_or_default();
    let now = Utc::now();

    info!(chat_id, username, "Telegram message received");

    let update = ProfileUpdate::contact(username).merge(ProfileUpdate::message(text));
    state
        .store
        .upsert_profile(&conversation_id, &update, now)
        .await?;
    state
        .store
        .append_message(&MessageRecord {
            conversation_id: conversation_id.clone(),
            text: text.to_string(),
            sent_at: now,
            sender_username: username.to_string(),
        })
        .await?;

    let reply = match MediaItem::from_message(message) {
        Some(item) => {
            let ingestor = MediaIngestor::new(state.platform.clone(), state.blobs.clone());
            let outcome = ingestor.ingest(&conversation_id, username, &item, now).await;
            outcome.reply_text(&item)
        }
        None => text_reply(message.text.as_deref().unwrap_or_default()),
    };

    state.platform.send_text(chat_id, &reply).await?;
    Ok(())
}
