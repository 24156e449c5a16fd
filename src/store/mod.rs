//! Persistence layer: libSQL document store for profiles, messages and form
//! records, plus a bucket-style blob store for uploaded media.

pub mod blob;
pub mod libsql_backend;
pub mod migrations;
pub mod paths;
pub mod traits;

pub use blob::{BlobStore, FsBlobStore};
pub use libsql_backend::LibSqlBackend;
pub use traits::{
    ConversationProfile, DailyMessageSummary, DocumentStore, MessageRecord, ProfileUpdate,
};
