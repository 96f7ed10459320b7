// SPDX-License-Identifier: MIT

//! Event trigger routes.
//!
//! Eventarc delivers Firestore document-created events here as HTTP
//! pushes. These endpoints are not meant for direct callers; in
//! production Eventarc's invoker service account is the only principal
//! with run.invoker on this service.

use crate::AppState;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::post,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

/// CloudEvent type for Firestore document creation.
const FEED_CREATED_EVENT_TYPE: &str = "google.cloud.firestore.document.v1.created";

/// Trigger routes (called by Eventarc).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/events/feed-created", post(feed_created))
}

/// Flattened trigger payload for a feed creation occurrence.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedCreatedPayload {
    /// Unique id of this delivery occurrence (idempotency key).
    pub event_id: String,
    /// Document id of the created feed event.
    pub feed_id: String,
}

/// Handle a feed-created push.
///
/// Always returns 200 once the payload is accepted: dispatch errors are
/// contained and recorded by the orchestrator, and a non-2xx here would
/// only provoke redeliveries the idempotency gate has to absorb.
async fn feed_created(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Json(payload): Json<FeedCreatedPayload>,
) -> StatusCode {
    // Origin check: Eventarc pushes carry the CloudEvent type header.
    let event_type = headers.get("ce-type").and_then(|h| h.to_str().ok());
    if event_type != Some(FEED_CREATED_EVENT_TYPE) {
        tracing::warn!(
            feed_id = %payload.feed_id,
            header = ?event_type,
            "Blocked feed-created push with unexpected event type"
        );
        return StatusCode::FORBIDDEN;
    }

    if payload.event_id.trim().is_empty() || payload.feed_id.trim().is_empty() {
        tracing::warn!("Rejected feed-created push with blank ids");
        return StatusCode::BAD_REQUEST;
    }

    tracing::info!(
        feed_id = %payload.feed_id,
        event_id = %payload.event_id,
        "Processing feed-created event"
    );

    state
        .fanout_service
        .handle_feed_created(&payload.event_id, &payload.feed_id)
        .await;

    StatusCode::OK
}
