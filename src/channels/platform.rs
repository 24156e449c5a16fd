//! Messaging platform abstraction.

use async_trait::async_trait;

use crate::error::ChannelError;

/// Outbound capability of a chat platform.
///
/// Inbound updates arrive through the webhook, so unlike a polling channel
/// this trait only covers replies and media retrieval.
#[async_trait]
pub trait MessagingPlatform: Send + Sync {
    /// Send a plain-text message to a chat.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), ChannelError>;

    /// Resolve a file id to a downloadable path. `Ok(None)` when the platform
    /// answers but has no path for the file.
    async fn resolve_file(&self, file_id: &str) -> Result<Option<String>, ChannelError>;

    /// Download a resolved file. Non-2xx answers are `ChannelError::Status`.
    async fn download(&self, file_path: &str) -> Result<Vec<u8>, ChannelError>;

    /// Confirm the credentials are accepted.
    async fn health_check(&self) -> Result<(), ChannelError>;
}
