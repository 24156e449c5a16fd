//! Request classification and form processing.
//!
//! Every inbound webhook flows through:
//! 1. `Classifier::classify()`: which platform sent the request
//! 2. `gate::is_complete()`: is the multi-turn form ready to commit (forms only)
//! 3. `scoring::score()`: categorical risk scoring (risk assessments only)
//!
//! Nothing in here performs I/O; persistence and replies live in `webhook`.

pub mod classify;
pub mod gate;
pub mod scoring;
pub mod types;

pub use classify::Classifier;
pub use gate::FormKind;
pub use scoring::RiskLevel;
pub use types::{
    ClassifiedSource, FormTag, FormWebhookEnvelope, InboundBody, InboundRequest, IncidentRecord,
    RiskAssessmentRecord,
};
