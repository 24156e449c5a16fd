//! HTTP entrypoint: classifies each webhook call once, dispatches it to the
//! matching protocol handler, and converts handler errors into responses.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::channels::MessagingPlatform;
use crate::error::Error;
use crate::pipeline::{ClassifiedSource, Classifier, FormWebhookEnvelope, InboundBody, InboundRequest};
use crate::store::{BlobStore, DocumentStore};
use crate::webhook::form::{self, CommitFailure, FulfillmentResponse, GENERIC_SUCCESS};
use crate::webhook::messaging::{self, APOLOGY, MessagingFailure, StatusBody};

/// Service objects shared by every request. Built once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub platform: Arc<dyn MessagingPlatform>,
    pub classifier: Arc<Classifier>,
}

/// Build the webhook router.
pub fn webhook_routes(state: AppState) -> Router {
    Router::new()
        .route("/", post(webhook))
        .route("/webhook", post(webhook))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "arems-webhook"
    }))
}

// ── Webhook ─────────────────────────────────────────────────────────────

async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let request = InboundRequest::new(headers, InboundBody::from_bytes(&body));
    let source = state.classifier.classify(&request);
    info!(%source, size = body.len(), "Webhook received");

    match source {
        ClassifiedSource::FormWebhook => form_webhook(&state, &request).await,
        ClassifiedSource::Messaging => messaging_webhook(&state, &request).await,
        ClassifiedSource::Unknown => {
            warn!("Unrecognised webhook body; answering as the messaging platform");
            messaging_webhook(&state, &request).await
        }
    }
}

async fn form_webhook(state: &AppState, request: &InboundRequest) -> Response {
    let envelope = match request.json() {
        Some(body) => FormWebhookEnvelope::from_body(body),
        None => Err(Error::MalformedPayload(
            "form webhook without a JSON body".into(),
        )),
    };
    let envelope = match envelope {
        Ok(envelope) => envelope,
        Err(err) => return malformed_form(&err),
    };

    match form::handle(state, &envelope).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(failure) => commit_failed(failure),
    }
}

/// An unreadable form request is acknowledged with the generic reply.
fn malformed_form(err: &Error) -> Response {
    warn!(error = %err, "Malformed form webhook");
    (StatusCode::OK, Json(FulfillmentResponse::text(GENERIC_SUCCESS))).into_response()
}

/// A commit failure answers 200 with the form's retry prompt.
fn commit_failed(failure: CommitFailure) -> Response {
    error!(error = %failure.error, form = %failure.kind, "Form commit failed");
    (
        StatusCode::OK,
        Json(FulfillmentResponse::text(failure.kind.failure_message())),
    )
        .into_response()
}

async fn messaging_webhook(state: &AppState, request: &InboundRequest) -> Response {
    match messaging::handle(state, request).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome.body())).into_response(),
        Err(failure) => messaging_error(state, failure).await,
    }
}

/// Messaging errors: malformed → 400; upstream → apologise to the chat and
/// answer 200, or 500 when there is no chat or the apology fails too.
async fn messaging_error(state: &AppState, failure: MessagingFailure) -> Response {
    let MessagingFailure { chat_id, error: err } = failure;

    if let Error::MalformedPayload(reason) = &err {
        warn!(reason = %reason, "Malformed messaging webhook");
        return (StatusCode::BAD_REQUEST, Json(StatusBody::error(reason.clone()))).into_response();
    }

    error!(error = %err, chat_id = ?chat_id, "Messaging webhook failed");
    if let Some(chat_id) = chat_id {
        match state.platform.send_text(chat_id, APOLOGY).await {
            Ok(()) => {
                return (
                    StatusCode::OK,
                    Json(StatusBody::error("Message could not be processed")),
                )
                    .into_response();
            }
            Err(e) => warn!(chat_id, error = %e, "Apology could not be delivered"),
        }
    }

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(StatusBody::error("Internal error")),
    )
        .into_response()
}

// ── Test support ────────────────────────────────────────────────────────
