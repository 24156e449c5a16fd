//! `DocumentStore` trait: the persistence seam for profiles, messages and
//! form records.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;
use crate::pipeline::types::{IncidentRecord, RiskAssessmentRecord};

/// Username recorded when the platform does not send one.
pub const UNKNOWN_USERNAME: &str = "unknown";

/// Per-conversation profile. Only the store mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationProfile {
    pub conversation_id: String,
    pub username: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub total_messages: u64,
    pub last_message_text: String,
}

/// Typed partial update for a profile. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub last_message_text: Option<String>,
    /// Added atomically to `total_messages`.
    pub message_increment: u32,
}

impl ProfileUpdate {
    /// The sender was seen (refreshes username and activity only).
    pub fn contact(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Self::default()
        }
    }

    /// One inbound message with the given text.
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            last_message_text: Some(text.into()),
            message_increment: 1,
            ..Self::default()
        }
    }

    /// Combine with a later update: later fields win, increments add up.
    pub fn merge(self, later: ProfileUpdate) -> ProfileUpdate {
        ProfileUpdate {
            username: later.username.or(self.username),
            last_message_text: later.last_message_text.or(self.last_message_text),
            message_increment: self.message_increment.saturating_add(later.message_increment),
        }
    }
}

/// One inbound chat message. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub conversation_id: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub sender_username: String,
}

/// Per-conversation, per-day message summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMessageSummary {
    pub conversation_id: String,
    pub username: String,
    pub day: NaiveDate,
    pub message_count: u64,
    pub last_message_at: DateTime<Utc>,
}

/// Backend-agnostic document store.
///
/// Counters must be incremented with the backend's atomic primitive, never
/// read-then-write, so concurrent messages from one conversation are all
/// counted.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    // ── Profiles ────────────────────────────────────────────────────

    /// Create the profile on first contact, otherwise apply `update` and
    /// refresh `last_active_at`. Returns the profile after the write.
    async fn upsert_profile(
        &self,
        conversation_id: &str,
        update: &ProfileUpdate,
        at: DateTime<Utc>,
    ) -> Result<ConversationProfile, DatabaseError>;

    async fn get_profile(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationProfile>, DatabaseError>;

    // ── Messages ────────────────────────────────────────────────────

    /// Append a message and bump its daily summary. Returns the document path.
    async fn append_message(&self, record: &MessageRecord) -> Result<String, DatabaseError>;

    /// Messages of one conversation on one day, oldest first.
    async fn list_messages(
        &self,
        conversation_id: &str,
        day: NaiveDate,
    ) -> Result<Vec<MessageRecord>, DatabaseError>;

    async fn get_daily_summary(
        &self,
        conversation_id: &str,
        day: NaiveDate,
    ) -> Result<Option<DailyMessageSummary>, DatabaseError>;

    // ── Form records ────────────────────────────────────────────────

    /// Persist a committed incident. Returns the document path.
    async fn insert_incident(&self, record: &IncidentRecord) -> Result<String, DatabaseError>;

    async fn get_incident(&self, incident_id: &str)
    -> Result<Option<IncidentRecord>, DatabaseError>;

    /// Most recent incidents first.
    async fn list_incidents(&self, limit: usize) -> Result<Vec<IncidentRecord>, DatabaseError>;

    /// Persist a committed risk assessment. Returns the document path.
    async fn insert_assessment(
        &self,
        record: &RiskAssessmentRecord,
    ) -> Result<String, DatabaseError>;

    async fn get_assessment(
        &self,
        assessment_id: &str,
    ) -> Result<Option<RiskAssessmentRecord>, DatabaseError>;

    /// Most recent assessments first.
    async fn list_assessments(
        &self,
        limit: usize,
    ) -> Result<Vec<RiskAssessmentRecord>, DatabaseError>;
}
