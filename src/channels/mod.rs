//! Messaging platform I/O: the Telegram Bot API client and media ingestion.

pub mod media;
pub mod platform;
pub mod telegram;

pub use media::{IngestOutcome, MediaIngestor, MediaItem, MediaKind};
pub use platform::MessagingPlatform;
pub use telegram::{TelegramClient, TelegramMessage, TelegramUpdate};
