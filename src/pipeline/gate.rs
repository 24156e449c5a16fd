//! Form completion gate.
//!
//! The form platform re-sends every collected parameter on each turn, so
//! completeness is judged from the current request alone. A form that is not
//! complete must never produce a persistent write.

use serde_json::{Map, Value};

/// The two forms this service commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    Emergency,
    RiskAssessment,
}

impl FormKind {
    /// Parameter keys that must all be present before the form commits.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::Emergency => &["incident_type", "location", "severity_level", "contact_info"],
            Self::RiskAssessment => &["hazard_type", "affected_area", "population_at_risk"],
        }
    }

    /// Reply sent while the form is still being filled.
    pub fn continuation_prompt(self) -> &'static str {
        match self {
            Self::Emergency => "Please continue filling out the form.",
            Self::RiskAssessment => "Please continue with the risk assessment.",
        }
    }

    /// Reply sent when a complete form could not be saved.
    pub fn failure_message(self) -> &'static str {
        match self {
            Self::Emergency => "Error processing emergency report. Please try again.",
            Self::RiskAssessment => "Error processing risk assessment. Please try again.",
        }
    }
}

impl std::fmt::Display for FormKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Emergency => write!(f, "emergency"),
            Self::RiskAssessment => write!(f, "risk_assessment"),
        }
    }
}

/// A value counts as supplied unless it is null, false, zero, or empty.
pub fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(fields)) => !fields.is_empty(),
    }
}

/// Required fields not yet supplied, in declaration order.
pub fn missing_fields(kind: FormKind, parameters: &Map<String, Value>) -> Vec<&'static str> {
    kind.required_fields()
        .iter()
        .copied()
        .filter(|field| !is_present(parameters.get(*field)))
        .collect()
}

/// Whether every required field is supplied.
pub fn is_complete(kind: FormKind, parameters: &Map<String, Value>) -> bool {
    missing_fields(kind, parameters).is_empty()
}
