//! Document paths: the persisted layout every record is filed under.
//!
//! - `profiles/{conversationId}`
//! - `messages/{conversationId}_{username}/{date}` (daily summary)
//! - `messages/{conversationId}_{username}/{date}/dailyMessages/{time}_message`
//! - `emergency-reports/incidents/{incidentId}`
//! - `risk-assessments/assessments/{assessmentId}`

use chrono::{DateTime, Utc};

/// Grouping key shared by message documents and blob objects.
pub fn conversation_key(conversation_id: &str, username: &str) -> String {
    format!("{conversation_id}_{username}")
}

/// Calendar date segment, e.g. `October_19_2026`.
pub fn calendar_date(at: DateTime<Utc>) -> String {
    at.format("%B_%d_%Y").to_string()
}

pub fn profile_path(conversation_id: &str) -> String {
    format!("profiles/{conversation_id}")
}

pub fn daily_summary_path(conversation_id: &str, username: &str, at: DateTime<Utc>) -> String {
    format!(
        "messages/{}/{}",
        conversation_key(conversation_id, username),
        calendar_date(at)
    )
}

pub fn message_path(conversation_id: &str, username: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}/dailyMessages/{}_message",
        daily_summary_path(conversation_id, username, at),
        at.format("%H:%M:%S%.3f")
    )
}

pub fn incident_path(incident_id: &str) -> String {
    format!("emergency-reports/incidents/{incident_id}")
}

pub fn assessment_path(assessment_id: &str) -> String {
    format!("risk-assessments/assessments/{assessment_id}")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 7, 14, 5, 9).unwrap()
    }

    #[test]
    fn calendar_date_is_month_name_day_year() {
        assert_eq!(calendar_date(at()), "March_07_2026");
    }

    #[test]
    fn message_layout() {
        assert_eq!(profile_path("42"), "profiles/42");
        assert_eq!(daily_summary_path("42", "ana", at()), "messages/42_ana/March_07_2026");
        assert_eq!(
            message_path("42", "ana", at()),
            "messages/42_ana/March_07_2026/dailyMessages/14:05:09.000_message"
        );
    }

    #[test]
    fn form_record_layout() {
        assert_eq!(
            incident_path("INC-20260307-140509-00ff"),
            "emergency-reports/incidents/INC-20260307-140509-00ff"
        );
        assert_eq!(
            assessment_path("RISK-20260307-140509-abcd"),
            "risk-assessments/assessments/RISK-20260307-140509-abcd"
        );
    }
}
