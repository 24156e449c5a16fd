//! Media ingestion: pulls documents and photos off the messaging platform
//! and files them in the blob store.
//!
//! Every outcome maps to exactly one user-facing reply; no error escapes
//! [`MediaIngestor::ingest`].

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{error, info, warn};

use crate::channels::MessagingPlatform;
use crate::channels::telegram::TelegramMessage;
use crate::error::ChannelError;
use crate::store::BlobStore;
use crate::store::paths;

/// Name used when a document arrives without one.
pub const UNNAMED_FILE: &str = "unnamed_file";

/// Synthesized name for photos, which carry no file name.
pub const PHOTO_FILE_NAME: &str = "photo.jpg";

static UNSAFE_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]").expect("static pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Document,
    Photo,
}

impl MediaKind {
    pub fn noun(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Photo => "photo",
        }
    }

    fn folder(&self) -> &'static str {
        match self {
            Self::Document => "documents",
            Self::Photo => "photos",
        }
    }
}

/// One media attachment selected from an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub kind: MediaKind,
    pub file_id: String,
    /// Display name as sent by the user (unsanitised).
    pub file_name: String,
    pub content_type: String,
}

impl MediaItem {
    /// The attachment a message carries, document before photo.
    pub fn from_message(message: &TelegramMessage) -> Option<Self> {
        if let Some(doc) = &message.document {
            return Some(Self {
                kind: MediaKind::Document,
                file_id: doc.file_id.clone(),
                file_name: doc
                    .file_name
                    .clone()
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| UNNAMED_FILE.to_string()),
                content_type: doc
                    .mime_type
                    .clone()
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
            });
        }
        // A present but empty `photo` list is still a photo message; its
        // empty file id fails at ingestion.
        message.photo.as_ref().map(|_| Self {
            kind: MediaKind::Photo,
            file_id: message
                .largest_photo()
                .map(|photo| photo.file_id.clone())
                .unwrap_or_default(),
            file_name: PHOTO_FILE_NAME.to_string(),
            content_type: "image/jpeg".to_string(),
        })
    }
}

/// Result of one ingestion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored { path: String },
    /// The platform gave no downloadable path for the file.
    Unresolvable,
    /// The download answered with a non-success status.
    DownloadFailed { status: u16 },
    /// Transport or upload failure.
    Failed(String),
}

impl IngestOutcome {
    /// The single reply sent to the user for this outcome.
    pub fn reply_text(&self, item: &MediaItem) -> String {
        let noun = item.kind.noun();
        match (self, item.kind) {
            (Self::Stored { .. }, MediaKind::Document) => format!(
                "📄 Document '{}' received and stored successfully!",
                item.file_name
            ),
            (Self::Stored { .. }, MediaKind::Photo) => {
                "📸 Photo received and stored successfully!".to_string()
            }
            (Self::Unresolvable, _) => {
                format!("Sorry, couldn't access your {noun}. Please try again.")
            }
            (Self::DownloadFailed { .. }, _) => {
                format!("Sorry, couldn't process your {noun}. Please try again.")
            }
            (Self::Failed(_), _) => format!("Sorry, there was an error processing your {noun}."),
        }
    }
}

/// Replace anything outside `[A-Za-z0-9._-]` so a segment can never add path
/// components.
pub fn sanitize_segment(segment: &str) -> String {
    let cleaned = UNSAFE_NAME_CHARS.replace_all(segment, "_");
    if cleaned.trim_matches('.').is_empty() {
        UNNAMED_FILE.to_string()
    } else {
        cleaned.into_owned()
    }
}

/// `users/{cid}_{username}/{Month_DD_YYYY}/{documents|photos}/{YYYYMMDD_HHMMSS}_{name}`
pub fn blob_path(
    conversation_id: &str,
    username: &str,
    kind: MediaKind,
    file_name: &str,
    at: DateTime<Utc>,
) -> String {
    format!(
        "users/{}/{}/{}/{}_{}",
        paths::conversation_key(&sanitize_segment(conversation_id), &sanitize_segment(username)),
        paths::calendar_date(at),
        kind.folder(),
        at.format("%Y%m%d_%H%M%S"),
        sanitize_segment(file_name)
    )
}

/// Two-step fetch from the platform, then upload to the blob store.
pub struct MediaIngestor {
    platform: Arc<dyn MessagingPlatform>,
    blobs: Arc<dyn BlobStore>,
}

impl MediaIngestor {
    pub fn new(platform: Arc<dyn MessagingPlatform>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { platform, blobs }
    }

    pub async fn ingest(
        &self,
        conversation_id: &str,
        username: &str,
        item: &MediaItem,
        at: DateTime<Utc>,
    ) -> IngestOutcome {
        let kind = item.kind.noun();
        if item.file_id.is_empty() {
            warn!(kind, "Media message carries no file id");
            return IngestOutcome::Failed(format!("{kind} without a file id"));
        }

        let file_path = match self.platform.resolve_file(&item.file_id).await {
            Ok(Some(path)) => path,
            Ok(None) => {
                warn!(kind, file_id = %item.file_id, "Platform returned no file path");
                return IngestOutcome::Unresolvable;
            }
            Err(e) => {
                warn!(kind, file_id = %item.file_id, error = %e, "File lookup failed");
                return IngestOutcome::Unresolvable;
            }
        };

        let bytes = match self.platform.download(&file_path).await {
            Ok(bytes) => bytes,
            Err(ChannelError::Status { status, .. }) => {
                warn!(kind, status, "Media download rejected");
                return IngestOutcome::DownloadFailed { status };
            }
            Err(e) => {
                error!(kind, error = %e, "Media download failed");
                return IngestOutcome::Failed(e.to_string());
            }
        };

        let path = blob_path(conversation_id, username, item.kind, &item.file_name, at);
        if let Err(e) = self.blobs.put(&path, &bytes, &item.content_type).await {
            error!(kind, path = %path, error = %e, "Media upload failed");
            return IngestOutcome::Failed(e.to_string());
        }

        info!(kind, path = %path, size = bytes.len(), "Media stored");
        IngestOutcome::Stored { path }
    }
}
