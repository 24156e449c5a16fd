//! Integration tests for the webhook dispatcher.
//!
//! Each test spins up the Axum router on a random port with an in-memory
//! document store, a temporary bucket, and a wiremock stand-in for the
//! Telegram Bot API, then drives it over real HTTP with reqwest.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use secrecy::SecretString;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::time::timeout;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use arems_webhook::channels::TelegramClient;
use arems_webhook::pipeline::Classifier;
use arems_webhook::store::{DocumentStore, FsBlobStore, LibSqlBackend};
use arems_webhook::webhook::{AppState, webhook_routes};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

const TOKEN: &str = "123456:integration-token";

struct Harness {
    base: String,
    store: Arc<LibSqlBackend>,
    telegram: MockServer,
    bucket: TempDir,
    http: reqwest::Client,
}

impl Harness {
    async fn post(&self, body: Value) -> (u16, Value) {
        let resp = self
            .http
            .post(format!("{}/", self.base))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    /// Texts sent through `sendMessage`, in order.
    async fn sent_texts(&self) -> Vec<String> {
        self.telegram
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path().ends_with("/sendMessage"))
            .filter_map(|r| serde_json::from_slice::<Value>(&r.body).ok())
            .filter_map(|v| v["text"].as_str().map(String::from))
            .collect()
    }
}

/// Start the dispatcher on a random port.
async fn start_server() -> Harness {
    let telegram = MockServer::start().await;
    let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let bucket = tempfile::tempdir().unwrap();
    let platform = TelegramClient::new(
        SecretString::from(TOKEN),
        telegram.uri(),
        Duration::from_secs(5),
    )
    .unwrap();

    let state = AppState {
        store: store.clone(),
        blobs: Arc::new(FsBlobStore::new(bucket.path())),
        platform: Arc::new(platform),
        classifier: Arc::new(Classifier::default()),
    };
    let app = webhook_routes(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Harness {
        base: format!("http://127.0.0.1:{port}"),
        store,
        telegram,
        bucket,
        http: reqwest::Client::new(),
    }
}

async fn accept_send_message(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(server)
        .await;
}

fn reply_text(body: &Value) -> &str {
    body["fulfillmentResponse"]["messages"][0]["text"]["text"][0]
        .as_str()
        .unwrap_or_default()
}

fn emergency_body(parameters: Value) -> Value {
    json!({
        "fulfillmentInfo": {"tag": "emergency-submission"},
        "sessionInfo": {"session": "projects/p/sessions/s1", "parameters": parameters},
        "pageInfo": {"displayName": "Emergency Report", "formInfo": {}}
    })
}

// ── Form webhook ─────────────────────────────────────────────────────

#[tokio::test]
async fn emergency_form_end_to_end() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server().await;
        let (status, body) = h
            .post(emergency_body(json!({
                "incident_type": "flood",
                "location": "Riverside",
                "severity_level": "high",
                "contact_info": "555-0100"
            })))
            .await;

        assert_eq!(status, 200);
        let id = body["sessionInfo"]["parameters"]["incident_id"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(Regex::new(r"^INC-\d{8}-\d{6}-[0-9a-f]{4}$").unwrap().is_match(&id));
        assert_eq!(reply_text(&body), format!("Emergency report saved with ID: {id}"));

        let stored = h.store.get_incident(&id).await.unwrap().unwrap();
        assert_eq!(stored.incident_type, "flood");
        assert_eq!(stored.source, "form_webhook");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn partial_form_is_not_persisted() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server().await;
        let (status, body) = h
            .post(emergency_body(json!({"incident_type": "flood", "location": ""})))
            .await;

        assert_eq!(status, 200);
        assert_eq!(reply_text(&body), "Please continue filling out the form.");
        assert!(body.get("sessionInfo").is_none());
        assert!(h.store.list_incidents(10).await.unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn risk_assessment_scored_high() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server().await;
        let (status, body) = h
            .post(json!({
                "fulfillmentInfo": {"tag": "risk-assessment"},
                "sessionInfo": {"parameters": {
                    "hazard_type": "natural_disaster",
                    "affected_area": "Delta",
                    "population_at_risk": "vulnerable_groups"
                }}
            }))
            .await;

        assert_eq!(status, 200);
        let params = &body["sessionInfo"]["parameters"];
        assert_eq!(params["risk_level"], "HIGH");
        assert_eq!(params["risk_score"], 60);
        let stored = h.store.list_assessments(10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].assessment_id, params["assessment_id"].as_str().unwrap());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unknown_tag_is_acknowledged() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server().await;
        let (status, body) = h
            .post(json!({"fulfillmentInfo": {"tag": "shelter-lookup"}, "sessionInfo": {}}))
            .await;
        assert_eq!(status, 200);
        assert_eq!(reply_text(&body), "Request processed successfully.");
        assert!(h.sent_texts().await.is_empty());
    })
    .await
    .expect("test timed out");
}

// ── Messaging webhook ────────────────────────────────────────────────

#[tokio::test]
async fn urgent_text_escalates() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server().await;
        accept_send_message(&h.telegram).await;

        let (status, body) = h
            .post(json!({
                "update_id": 1,
                "message": {"chat": {"id": 77}, "from": {"username": "ana"}, "text": "URGENT help"}
            }))
            .await;

        assert_eq!(status, 200);
        assert_eq!(body, json!({"status": "success", "message": "Telegram message processed"}));
        let sent = h.sent_texts().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("🚨 Emergency detected!"));
        assert!(sent[0].ends_with("You said: URGENT help"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn long_escalation_is_answered_with_one_message() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server().await;
        accept_send_message(&h.telegram).await;

        let text = format!("help {}", "x".repeat(4000));
        let (status, _) = h
            .post(json!({"message": {"chat": {"id": 5}, "text": text}}))
            .await;

        assert_eq!(status, 200);
        let sent = h.sent_texts().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("🚨 Emergency detected!"));
        assert!(sent[0].chars().count() <= 4096);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn empty_photo_list_gets_photo_error_reply() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server().await;
        accept_send_message(&h.telegram).await;

        let (status, _) = h
            .post(json!({"message": {"chat": {"id": 6}, "photo": []}}))
            .await;

        assert_eq!(status, 200);
        assert_eq!(
            h.sent_texts().await,
            vec!["Sorry, there was an error processing your photo."]
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn hello_is_echoed_and_counted() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server().await;
        accept_send_message(&h.telegram).await;

        for _ in 0..2 {
            let (status, _) = h
                .post(json!({"message": {"chat": {"id": 5}, "from": {"username": "bo"}, "text": "hello"}}))
                .await;
            assert_eq!(status, 200);
        }

        assert_eq!(h.sent_texts().await, vec!["Message received: hello"; 2]);
        let profile = h.store.get_profile("5").await.unwrap().unwrap();
        assert_eq!(profile.total_messages, 2);
        assert_eq!(profile.username, "bo");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn missing_body_is_rejected() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server().await;
        let resp = h.http.post(format!("{}/", h.base)).send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({"status": "error", "message": "No data"}));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn document_is_stored_in_bucket() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server().await;
        accept_send_message(&h.telegram).await;
        Mock::given(method("GET"))
            .and(path(format!("/bot{TOKEN}/getFile")))
            .and(query_param("file_id", "doc-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"file_id": "doc-9", "file_path": "documents/file_9.pdf"}
            })))
            .mount(&h.telegram)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/file/bot{TOKEN}/documents/file_9.pdf")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7".to_vec()))
            .mount(&h.telegram)
            .await;

        let (status, _) = h
            .post(json!({"message": {
                "chat": {"id": 31},
                "from": {"username": "cy"},
                "document": {"file_id": "doc-9", "file_name": "evac plan.pdf"}
            }}))
            .await;

        assert_eq!(status, 200);
        assert_eq!(
            h.sent_texts().await,
            vec!["📄 Document 'evac plan.pdf' received and stored successfully!"]
        );

        let docs_dir = std::fs::read_dir(h.bucket.path().join("users/31_cy"))
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path()
            .join("documents");
        let stored: Vec<_> = std::fs::read_dir(docs_dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].to_string_lossy().ends_with("_evac_plan.pdf"));
        assert_eq!(std::fs::read(&stored[0]).unwrap(), b"%PDF-1.7");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn failed_reply_triggers_apology() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/sendMessage")))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&h.telegram)
            .await;
        accept_send_message(&h.telegram).await;

        let (status, body) = h
            .post(json!({"message": {"chat": {"id": 9}, "text": "hello"}}))
            .await;

        assert_eq!(status, 200);
        assert_eq!(body["status"], "error");
        assert_eq!(
            h.sent_texts().await,
            vec![
                "Message received: hello".to_string(),
                "Sorry, something went wrong. Please try again.".to_string(),
            ]
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn health_check() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server().await;
        let body: Value = h
            .http
            .get(format!("{}/health", h.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body, json!({"status": "ok", "service": "arems-webhook"}));
    })
    .await
    .expect("test timed out");
}
