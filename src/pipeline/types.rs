//! Shared types for webhook classification and form records.

use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::pipeline::gate::FormKind;
use crate::pipeline::scoring::{self, RiskLevel};

/// Value of the `source` field on every form-derived record.
pub const FORM_SOURCE: &str = "form_webhook";

// ── Inbound request ─────────────────────────────────────────────────

/// Parse state of the request body.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundBody {
    /// No body, or only whitespace.
    Empty,
    /// Valid JSON.
    Json(Value),
    /// Bytes were sent but they are not JSON.
    Unparseable,
}

impl InboundBody {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Self::Empty;
        }
        match serde_json::from_slice(bytes) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Unparseable,
        }
    }
}

/// An inbound webhook call. Immutable for the duration of handling.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    headers: HeaderMap,
    body: InboundBody,
}

impl InboundRequest {
    pub fn new(headers: HeaderMap, body: InboundBody) -> Self {
        Self { headers, body }
    }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.headers.get(USER_AGENT).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &InboundBody {
        &self.body
    }

    /// The parsed JSON body, if there is one.
    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            InboundBody::Json(value) => Some(value),
            _ => None,
        }
    }
}

// ── Classification ──────────────────────────────────────────────────

/// Which external platform sent a request. Derived once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifiedSource {
    Messaging,
    FormWebhook,
    Unknown,
}

impl std::fmt::Display for ClassifiedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Messaging => "messaging",
            Self::FormWebhook => "form_webhook",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

// ── Form webhook envelope ───────────────────────────────────────────

/// Webhook tag declared by the form platform for the current page/turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormTag {
    EmergencySubmission,
    RiskAssessment,
    /// A tag this service does not own (including the empty tag).
    Unhandled(String),
}

impl FormTag {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "emergency-submission" => Self::EmergencySubmission,
            "risk-assessment" => Self::RiskAssessment,
            other => Self::Unhandled(other.to_string()),
        }
    }

    /// The form this tag commits, if any.
    pub fn form_kind(&self) -> Option<FormKind> {
        match self {
            Self::EmergencySubmission => Some(FormKind::Emergency),
            Self::RiskAssessment => Some(FormKind::RiskAssessment),
            Self::Unhandled(_) => None,
        }
    }
}

/// One turn of a form-platform conversation, as delivered to the webhook.
#[derive(Debug, Clone)]
pub struct FormWebhookEnvelope {
    /// Parameters collected so far. Partial until the form is complete.
    pub session_parameters: Map<String, Value>,
    pub page_display_name: String,
    /// `pageInfo.formInfo`, kept for diagnostics only.
    pub form_info: Value,
    pub webhook_tag: FormTag,
    pub raw_body: Value,
}

impl FormWebhookEnvelope {
    /// Build an envelope from a parsed request body.
    ///
    /// Missing sections default to empty; sections of the wrong JSON type are
    /// rejected as malformed.
    pub fn from_body(body: &Value) -> Result<Self, Error> {
        let root = body
            .as_object()
            .ok_or_else(|| Error::MalformedPayload("form webhook body is not an object".into()))?;

        let session_parameters = match root.get("sessionInfo").and_then(|s| s.get("parameters")) {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(params)) => params.clone(),
            Some(_) => {
                return Err(Error::MalformedPayload(
                    "sessionInfo.parameters is not an object".into(),
                ));
            }
        };

        let tag = match root.get("fulfillmentInfo").and_then(|f| f.get("tag")) {
            None | Some(Value::Null) => "",
            Some(Value::String(tag)) => tag.as_str(),
            Some(_) => {
                return Err(Error::MalformedPayload(
                    "fulfillmentInfo.tag is not a string".into(),
                ));
            }
        };

        let page = root.get("pageInfo");
        let page_display_name = page
            .and_then(|p| p.get("displayName"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let form_info = page
            .and_then(|p| p.get("formInfo"))
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));

        Ok(Self {
            session_parameters,
            page_display_name,
            form_info,
            webhook_tag: FormTag::parse(tag),
            raw_body: body.clone(),
        })
    }

    /// A parameter rendered as text: strings verbatim, anything else as JSON.
    pub fn parameter_text(&self, key: &str) -> String {
        match self.session_parameters.get(key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

// ── Records ─────────────────────────────────────────────────────────

/// Generate a record id of the form `PREFIX-YYYYMMDD-HHMMSS-xxxx`.
///
/// The trailing four hex digits keep two submissions completed within the
/// same second from sharing an id.
pub fn generate_record_id(prefix: &str, at: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().r#gen();
    format!("{prefix}-{}-{suffix:04x}", at.format("%Y%m%d-%H%M%S"))
}

/// A committed emergency report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub incident_id: String,
    pub incident_type: String,
    pub location: String,
    pub severity_level: String,
    pub contact_info: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl IncidentRecord {
    pub const ID_PREFIX: &'static str = "INC";

    /// Build from a complete emergency form. Callers gate first.
    pub fn from_envelope(envelope: &FormWebhookEnvelope, now: DateTime<Utc>) -> Self {
        Self {
            incident_id: generate_record_id(Self::ID_PREFIX, now),
            incident_type: envelope.parameter_text("incident_type"),
            location: envelope.parameter_text("location"),
            severity_level: envelope.parameter_text("severity_level"),
            contact_info: envelope.parameter_text("contact_info"),
            source: FORM_SOURCE.to_string(),
            created_at: now,
        }
    }
}

/// A committed risk assessment with its computed score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessmentRecord {
    pub assessment_id: String,
    pub hazard_type: String,
    pub affected_area: String,
    pub population_at_risk: String,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl RiskAssessmentRecord {
    pub const ID_PREFIX: &'static str = "RISK";

    /// Build from a complete risk form, scoring it on the way.
    pub fn from_envelope(envelope: &FormWebhookEnvelope, now: DateTime<Utc>) -> Self {
        let hazard_type = envelope.parameter_text("hazard_type");
        let population_at_risk = envelope.parameter_text("population_at_risk");
        let risk_score = scoring::score(&hazard_type, &population_at_risk);

        Self {
            assessment_id: generate_record_id(Self::ID_PREFIX, now),
            hazard_type,
            affected_area: envelope.parameter_text("affected_area"),
            population_at_risk,
            risk_score,
            risk_level: RiskLevel::from_score(risk_score),
            source: FORM_SOURCE.to_string(),
            created_at: now,
        }
    }
}
