//! Form-platform webhook: gates multi-turn forms and commits the finished
//! ones as incidents or risk assessments.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::Error;
use crate::pipeline::gate::{self, FormKind};
use crate::pipeline::types::{FormTag, FormWebhookEnvelope, IncidentRecord, RiskAssessmentRecord};
use crate::webhook::routes::AppState;

/// Reply for tags this service does not own and for unreadable requests.
pub const GENERIC_SUCCESS: &str = "Request processed successfully.";

/// A complete form that could not be committed.
#[derive(Debug)]
pub struct CommitFailure {
    pub kind: FormKind,
    pub error: Error,
}

// ── Response shape ──────────────────────────────────────────────────

/// `{fulfillmentResponse:{messages:[{text:{text:[..]}}]}, sessionInfo?:{parameters}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentResponse {
    pub fulfillment_response: FulfillmentMessages,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_info: Option<SessionInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentMessages {
    pub messages: Vec<ResponseMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub text: ResponseText,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseText {
    pub text: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub parameters: Map<String, Value>,
}

impl FulfillmentResponse {
    /// A response carrying one text message and no parameter changes.
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            fulfillment_response: FulfillmentMessages {
                messages: vec![ResponseMessage {
                    text: ResponseText {
                        text: vec![message.into()],
                    },
                }],
            },
            session_info: None,
        }
    }

    /// Attach session parameters for the form platform to merge.
    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.session_info = Some(SessionInfo { parameters });
        self
    }

    /// The first reply text, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.fulfillment_response
            .messages
            .first()
            .and_then(|m| m.text.text.first())
            .map(String::as_str)
    }
}

// ── Handler ─────────────────────────────────────────────────────────

/// Process one form turn. Store failures propagate to the caller, tagged
/// with the form they belong to.
pub async fn handle(
    state: &AppState,
    envelope: &FormWebhookEnvelope,
) -> Result<FulfillmentResponse, CommitFailure> {
    let Some(kind) = envelope.webhook_tag.form_kind() else {
        let tag = match &envelope.webhook_tag {
            FormTag::Unhandled(tag) => tag.as_str(),
            _ => "",
        };
        warn!(tag, page = %envelope.page_display_name, "Unhandled webhook tag");
        return Ok(FulfillmentResponse::text(GENERIC_SUCCESS));
    };

    let missing = gate::missing_fields(kind, &envelope.session_parameters);
    if !missing.is_empty() {
        info!(
            form = %kind,
            missing = ?missing,
            form_info = %envelope.form_info,
            "Form incomplete"
        );
        return Ok(FulfillmentResponse::text(kind.continuation_prompt()));
    }

    let committed = match kind {
        FormKind::Emergency => commit_incident(state, envelope).await,
        FormKind::RiskAssessment => commit_assessment(state, envelope).await,
    };
    committed.map_err(|error| CommitFailure { kind, error })
}

async fn commit_incident(
    state: &AppState,
    envelope: &FormWebhookEnvelope,
) -> Result<FulfillmentResponse, Error> {
    let record = IncidentRecord::from_envelope(envelope, Utc::now());
    let path = state.store.insert_incident(&record).await?;
    info!(
        incident_id = %record.incident_id,
        incident_type = %record.incident_type,
        path = %path,
        "Emergency report committed"
    );

    let mut parameters = Map::new();
    parameters.insert("incident_id".into(), Value::String(record.incident_id.clone()));
    Ok(FulfillmentResponse::text(format!(
        "Emergency report saved with ID: {}",
        record.incident_id
    ))
    .with_parameters(parameters))
}

async fn commit_assessment(
    state: &AppState,
    envelope: &FormWebhookEnvelope,
) -> Result<FulfillmentResponse, Error> {
    let record = RiskAssessmentRecord::from_envelope(envelope, Utc::now());
    let path = state.store.insert_assessment(&record).await?;
    info!(
        assessment_id = %record.assessment_id,
        risk_level = %record.risk_level,
        risk_score = record.risk_score,
        path = %path,
        "Risk assessment committed"
    );

    let mut parameters = Map::new();
    parameters.insert(
        "assessment_id".into(),
        Value::String(record.assessment_id.clone()),
    );
    parameters.insert(
        "risk_level".into(),
        Value::String(record.risk_level.as_str().to_string()),
    );
    parameters.insert("risk_score".into(), Value::from(record.risk_score));
    Ok(FulfillmentResponse::text(format!(
        "Risk assessment completed. ID: {}",
        record.assessment_id
    ))
    .with_parameters(parameters))
}
