//! libSQL-backed `DocumentStore` implementation.
//!
//! Supports local file and in-memory databases. Every counter is bumped with
//! a single `INSERT … ON CONFLICT DO UPDATE` statement so concurrent webhook
//! calls never lose an increment.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::pipeline::scoring::RiskLevel;
use crate::pipeline::types::{IncidentRecord, RiskAssessmentRecord};
use crate::store::migrations;
use crate::store::paths;
use crate::store::traits::{
    ConversationProfile, DailyMessageSummary, DocumentStore, MessageRecord, ProfileUpdate,
    UNKNOWN_USERNAME,
};

/// libSQL document store.
///
/// Holds a single connection reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Document store opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Storage format of the `day` column. Sorts lexically.
const DAY_FORMAT: &str = "%Y-%m-%d";

fn day_key(at: DateTime<Utc>) -> String {
    at.date_naive().format(DAY_FORMAT).to_string()
}

fn parse_day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, DAY_FORMAT).unwrap_or(NaiveDate::MIN)
}

/// Map a failed INSERT to `Constraint` when a primary key collided.
fn insert_error(op: &str, id: &str, e: libsql::Error) -> DatabaseError {
    let message = e.to_string();
    if message.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint(format!("{op}: duplicate id {id}"))
    } else {
        DatabaseError::Query(format!("{op}: {message}"))
    }
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Column order matches PROFILE_COLUMNS.
fn row_to_profile(row: &libsql::Row) -> Result<ConversationProfile, libsql::Error> {
    let first_seen: String = row.get(2)?;
    let last_active: String = row.get(3)?;
    let total: i64 = row.get(4)?;
    Ok(ConversationProfile {
        conversation_id: row.get(0)?,
        username: row.get(1)?,
        first_seen_at: parse_datetime(&first_seen),
        last_active_at: parse_datetime(&last_active),
        total_messages: total.max(0) as u64,
        last_message_text: row.get(5)?,
    })
}

/// Column order matches MESSAGE_COLUMNS.
fn row_to_message(row: &libsql::Row) -> Result<MessageRecord, libsql::Error> {
    let sent_at: String = row.get(3)?;
    Ok(MessageRecord {
        conversation_id: row.get(0)?,
        text: row.get(1)?,
        sender_username: row.get(2)?,
        sent_at: parse_datetime(&sent_at),
    })
}

/// Column order matches SUMMARY_COLUMNS.
fn row_to_summary(row: &libsql::Row) -> Result<DailyMessageSummary, libsql::Error> {
    let day: String = row.get(2)?;
    let count: i64 = row.get(3)?;
    let last: String = row.get(4)?;
    Ok(DailyMessageSummary {
        conversation_id: row.get(0)?,
        username: row.get(1)?,
        day: parse_day(&day),
        message_count: count.max(0) as u64,
        last_message_at: parse_datetime(&last),
    })
}

/// Column order matches INCIDENT_COLUMNS.
fn row_to_incident(row: &libsql::Row) -> Result<IncidentRecord, libsql::Error> {
    let created: String = row.get(6)?;
    Ok(IncidentRecord {
        incident_id: row.get(0)?,
        incident_type: row.get(1)?,
        location: row.get(2)?,
        severity_level: row.get(3)?,
        contact_info: row.get(4)?,
        source: row.get(5)?,
        created_at: parse_datetime(&created),
    })
}

/// Column order matches ASSESSMENT_COLUMNS.
fn row_to_assessment(row: &libsql::Row) -> Result<RiskAssessmentRecord, libsql::Error> {
    let score: i64 = row.get(4)?;
    let level: String = row.get(5)?;
    let created: String = row.get(7)?;
    let risk_score = score.clamp(0, i64::from(u8::MAX)) as u8;
    Ok(RiskAssessmentRecord {
        assessment_id: row.get(0)?,
        hazard_type: row.get(1)?,
        affected_area: row.get(2)?,
        population_at_risk: row.get(3)?,
        risk_score,
        risk_level: level
            .parse()
            .unwrap_or_else(|_| RiskLevel::from_score(risk_score)),
        source: row.get(6)?,
        created_at: parse_datetime(&created),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const PROFILE_COLUMNS: &str =
    "conversation_id, username, first_seen_at, last_active_at, total_messages, last_message_text";

const MESSAGE_COLUMNS: &str = "conversation_id, text, sender_username, sent_at";

const SUMMARY_COLUMNS: &str = "conversation_id, username, day, message_count, last_message_at";

const INCIDENT_COLUMNS: &str =
    "incident_id, incident_type, location, severity_level, contact_info, source, created_at";

const ASSESSMENT_COLUMNS: &str = "assessment_id, hazard_type, affected_area, population_at_risk, risk_score, risk_level, source, created_at";

#[async_trait]
impl DocumentStore for LibSqlBackend {
    // ── Profiles ────────────────────────────────────────────────────

    async fn upsert_profile(
        &self,
        conversation_id: &str,
        update: &ProfileUpdate,
        at: DateTime<Utc>,
    ) -> Result<ConversationProfile, DatabaseError> {
        let conn = self.conn();
        let now = at.to_rfc3339();
        conn.execute(
            "INSERT INTO profiles (conversation_id, path, username, first_seen_at, last_active_at, total_messages, last_message_text)
             VALUES (?1, ?2, COALESCE(?3, ?4), ?5, ?5, ?6, COALESCE(?7, ''))
             ON CONFLICT (conversation_id) DO UPDATE SET
                username = COALESCE(?3, profiles.username),
                last_active_at = excluded.last_active_at,
                total_messages = profiles.total_messages + excluded.total_messages,
                last_message_text = COALESCE(?7, profiles.last_message_text)",
            params![
                conversation_id,
                paths::profile_path(conversation_id),
                opt_text(update.username.as_deref()),
                UNKNOWN_USERNAME,
                now,
                i64::from(update.message_increment),
                opt_text(update.last_message_text.as_deref()),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("upsert_profile: {e}")))?;

        debug!(
            conversation_id,
            increment = update.message_increment,
            "Profile upserted"
        );

        self.get_profile(conversation_id).await?.ok_or_else(|| {
            DatabaseError::Query(format!(
                "upsert_profile: profile {conversation_id} missing after write"
            ))
        })
    }

    async fn get_profile(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationProfile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE conversation_id = ?1"),
                params![conversation_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_profile: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_profile(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("get_profile row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_profile: {e}"))),
        }
    }

    // ── Messages ────────────────────────────────────────────────────

    async fn append_message(&self, record: &MessageRecord) -> Result<String, DatabaseError> {
        let conn = self.conn();
        let path = paths::message_path(
            &record.conversation_id,
            &record.sender_username,
            record.sent_at,
        );
        let summary_path = paths::daily_summary_path(
            &record.conversation_id,
            &record.sender_username,
            record.sent_at,
        );
        let day = day_key(record.sent_at);
        let sent_at = record.sent_at.to_rfc3339();

        conn.execute(
            "INSERT INTO messages (id, path, conversation_id, sender_username, text, day, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                Uuid::new_v4().to_string(),
                path.clone(),
                record.conversation_id.clone(),
                record.sender_username.clone(),
                record.text.clone(),
                day.clone(),
                sent_at.clone(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("append_message: {e}")))?;

        conn.execute(
            "INSERT INTO daily_message_summaries (path, conversation_id, username, day, message_count, last_message_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5)
             ON CONFLICT (path) DO UPDATE SET
                message_count = daily_message_summaries.message_count + 1,
                last_message_at = MAX(daily_message_summaries.last_message_at, excluded.last_message_at)",
            params![
                summary_path,
                record.conversation_id.clone(),
                record.sender_username.clone(),
                day,
                sent_at,
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("append_message summary: {e}")))?;

        debug!(path = %path, "Message appended");
        Ok(path)
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        day: NaiveDate,
    ) -> Result<Vec<MessageRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE conversation_id = ?1 AND day = ?2
                     ORDER BY sent_at ASC, rowid ASC"
                ),
                params![conversation_id, day.format(DAY_FORMAT).to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_messages: {e}")))?;

        let mut messages = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_messages: {e}")))?
        {
            messages.push(
                row_to_message(&row)
                    .map_err(|e| DatabaseError::Query(format!("list_messages row parse: {e}")))?,
            );
        }
        Ok(messages)
    }

    async fn get_daily_summary(
        &self,
        conversation_id: &str,
        day: NaiveDate,
    ) -> Result<Option<DailyMessageSummary>, DatabaseError> {
        // A renamed sender opens a second summary for the same day; report
        // the one touched last.
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SUMMARY_COLUMNS} FROM daily_message_summaries
                     WHERE conversation_id = ?1 AND day = ?2
                     ORDER BY last_message_at DESC LIMIT 1"
                ),
                params![conversation_id, day.format(DAY_FORMAT).to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_daily_summary: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_summary(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("get_daily_summary row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_daily_summary: {e}"))),
        }
    }

    // ── Form records ────────────────────────────────────────────────

    async fn insert_incident(&self, record: &IncidentRecord) -> Result<String, DatabaseError> {
        let path = paths::incident_path(&record.incident_id);
        self.conn()
            .execute(
                "INSERT INTO incidents (incident_id, path, incident_type, location, severity_level, contact_info, source, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.incident_id.clone(),
                    path.clone(),
                    record.incident_type.clone(),
                    record.location.clone(),
                    record.severity_level.clone(),
                    record.contact_info.clone(),
                    record.source.clone(),
                    record.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| insert_error("insert_incident", &record.incident_id, e))?;

        info!(incident_id = %record.incident_id, "Incident stored");
        Ok(path)
    }

    async fn get_incident(
        &self,
        incident_id: &str,
    ) -> Result<Option<IncidentRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE incident_id = ?1"),
                params![incident_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_incident: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_incident(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("get_incident row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_incident: {e}"))),
        }
    }

    async fn list_incidents(&self, limit: usize) -> Result<Vec<IncidentRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {INCIDENT_COLUMNS} FROM incidents
                     ORDER BY created_at DESC, rowid DESC LIMIT ?1"
                ),
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_incidents: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_incidents: {e}")))?
        {
            records.push(
                row_to_incident(&row)
                    .map_err(|e| DatabaseError::Query(format!("list_incidents row parse: {e}")))?,
            );
        }
        Ok(records)
    }

    async fn insert_assessment(
        &self,
        record: &RiskAssessmentRecord,
    ) -> Result<String, DatabaseError> {
        let path = paths::assessment_path(&record.assessment_id);
        self.conn()
            .execute(
                "INSERT INTO risk_assessments (assessment_id, path, hazard_type, affected_area, population_at_risk, risk_score, risk_level, source, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.assessment_id.clone(),
                    path.clone(),
                    record.hazard_type.clone(),
                    record.affected_area.clone(),
                    record.population_at_risk.clone(),
                    i64::from(record.risk_score),
                    record.risk_level.as_str(),
                    record.source.clone(),
                    record.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| insert_error("insert_assessment", &record.assessment_id, e))?;

        info!(
            assessment_id = %record.assessment_id,
            risk_level = %record.risk_level,
            risk_score = record.risk_score,
            "Risk assessment stored"
        );
        Ok(path)
    }

    async fn get_assessment(
        &self,
        assessment_id: &str,
    ) -> Result<Option<RiskAssessmentRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ASSESSMENT_COLUMNS} FROM risk_assessments WHERE assessment_id = ?1"
                ),
                params![assessment_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_assessment: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_assessment(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("get_assessment row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_assessment: {e}"))),
        }
    }

    async fn list_assessments(
        &self,
        limit: usize,
    ) -> Result<Vec<RiskAssessmentRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ASSESSMENT_COLUMNS} FROM risk_assessments
                     ORDER BY created_at DESC, rowid DESC LIMIT ?1"
                ),
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_assessments: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_assessments: {e}")))?
        {
            records.push(row_to_assessment(&row).map_err(|e| {
                DatabaseError::Query(format!("list_assessments row parse: {e}"))
            })?);
        }
        Ok(records)
    }
}
