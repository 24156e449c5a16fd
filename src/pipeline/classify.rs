//! Request classifier: decides which platform sent an inbound webhook.

use tracing::debug;

use crate::config::DEFAULT_FORM_UA_MARKER;
use crate::pipeline::types::{ClassifiedSource, InboundBody, InboundRequest};

/// Top-level body keys that only the form platform sends.
pub const FORM_MARKER_KEYS: [&str; 4] = ["fulfillmentInfo", "sessionInfo", "pageInfo", "intentInfo"];

/// Pure classifier over headers and body. Holds only the User-Agent marker.
#[derive(Debug, Clone)]
pub struct Classifier {
    ua_marker: String,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_FORM_UA_MARKER)
    }
}

impl Classifier {
    pub fn new(ua_marker: impl Into<String>) -> Self {
        Self {
            ua_marker: ua_marker.into(),
        }
    }

    /// Classify a request. First match wins:
    /// 1. body object with any form marker key → `FormWebhook`
    /// 2. User-Agent contains the form-platform marker → `FormWebhook`
    /// 3. body sent but not JSON → `Unknown`
    /// 4. otherwise → `Messaging`
    pub fn classify(&self, request: &InboundRequest) -> ClassifiedSource {
        if let Some(object) = request.json().and_then(|v| v.as_object()) {
            let found: Vec<&str> = FORM_MARKER_KEYS
                .iter()
                .copied()
                .filter(|key| object.contains_key(*key))
                .collect();
            if !found.is_empty() {
                debug!(markers = ?found, "Form platform markers in body");
                return ClassifiedSource::FormWebhook;
            }
        }

        if !self.ua_marker.is_empty()
            && request
                .user_agent()
                .is_some_and(|ua| ua.contains(&self.ua_marker))
        {
            debug!("Form platform detected by User-Agent");
            return ClassifiedSource::FormWebhook;
        }

        if matches!(request.body(), InboundBody::Unparseable) {
            return ClassifiedSource::Unknown;
        }

        ClassifiedSource::Messaging
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue};
    use serde_json::json;

    use super::*;

    fn request(ua: Option<&'static str>, body: InboundBody) -> InboundRequest {
        let mut headers = HeaderMap::new();
        if let Some(ua) = ua {
            headers.insert("user-agent", HeaderValue::from_static(ua));
        }
        InboundRequest::new(headers, body)
    }

    #[test]
    fn session_info_wins_regardless_of_other_fields() {
        let req = request(
            Some("TelegramBot (like TwitterBot)"),
            InboundBody::Json(json!({"message": {"chat": {"id": 1}}, "sessionInfo": {}})),
        );
        assert_eq!(Classifier::default().classify(&req), ClassifiedSource::FormWebhook);
    }

    #[test]
    fn each_marker_key_is_enough() {
        for key in FORM_MARKER_KEYS {
            let mut body = serde_json::Map::new();
            body.insert(key.to_string(), json!({}));
            let req = request(None, InboundBody::Json(body.into()));
            assert_eq!(
                Classifier::default().classify(&req),
                ClassifiedSource::FormWebhook,
                "{key}"
            );
        }
    }

    #[test]
    fn user_agent_marker_is_fallback() {
        let req = request(
            Some("Google-Dialogflow/3.0"),
            InboundBody::Json(json!({"message": {}})),
        );
        assert_eq!(Classifier::default().classify(&req), ClassifiedSource::FormWebhook);

        let no_body = request(Some("Google-Dialogflow"), InboundBody::Empty);
        assert_eq!(
            Classifier::default().classify(&no_body),
            ClassifiedSource::FormWebhook
        );
    }

    #[test]
    fn plain_update_is_messaging() {
        let req = request(
            None,
            InboundBody::Json(json!({"update_id": 1, "message": {"chat": {"id": 5}}})),
        );
        assert_eq!(Classifier::default().classify(&req), ClassifiedSource::Messaging);
    }

    #[test]
    fn no_body_no_marker_is_messaging() {
        let req = request(Some("curl/8.0"), InboundBody::Empty);
        assert_eq!(Classifier::default().classify(&req), ClassifiedSource::Messaging);
    }

    #[test]
    fn non_object_json_is_messaging() {
        let req = request(None, InboundBody::Json(json!(["sessionInfo"])));
        assert_eq!(Classifier::default().classify(&req), ClassifiedSource::Messaging);
    }

    #[test]
    fn garbage_body_is_unknown_unless_user_agent_matches() {
        let req = request(None, InboundBody::Unparseable);
        assert_eq!(Classifier::default().classify(&req), ClassifiedSource::Unknown);

        let df = request(Some("Google-Dialogflow"), InboundBody::Unparseable);
        assert_eq!(Classifier::default().classify(&df), ClassifiedSource::FormWebhook);
    }

    #[test]
    fn custom_marker() {
        let classifier = Classifier::new("FormBot");
        let req = request(Some("FormBot/1.2"), InboundBody::Empty);
        assert_eq!(classifier.classify(&req), ClassifiedSource::FormWebhook);

        let dialogflow = request(Some("Google-Dialogflow"), InboundBody::Empty);
        assert_eq!(classifier.classify(&dialogflow), ClassifiedSource::Messaging);
    }

    #[test]
    fn marker_keys_are_case_sensitive() {
        let req = request(None, InboundBody::Json(json!({"sessioninfo": {}})));
        assert_eq!(Classifier::default().classify(&req), ClassifiedSource::Messaging);
    }
}
