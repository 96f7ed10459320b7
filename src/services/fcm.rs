// SPDX-License-Identifier: MIT

//! FCM delivery client.
//!
//! Presents the multicast interface the dispatcher needs: one call per
//! batch of at most [`FCM_MULTICAST_LIMIT`] tokens, returning a per-token
//! result list in input order. Under the hood the HTTP variant issues
//! individual FCM HTTP v1 `messages:send` requests with bounded
//! concurrency, the same shape the Admin SDK's `sendEachForMulticast`
//! uses.
//!
//! The mock variant replays scripted batch responses and records every
//! batch it receives, so the dispatcher and orchestrator are testable
//! offline.

use crate::error::AppError;
use crate::services::message::PushMessage;
use futures_util::{stream, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Hard per-request token limit of the FCM multicast API.
pub const FCM_MULTICAST_LIMIT: usize = 500;

/// Concurrent in-flight sends within one batch.
const MAX_CONCURRENT_SENDS: usize = 50;

/// Outcome of one token's delivery attempt.
#[derive(Debug, Clone)]
pub struct SendResult {
    pub success: bool,
    /// Normalized kebab-case error code, e.g. `registration-token-not-registered`.
    pub error_code: Option<String>,
}

impl SendResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error_code: None,
        }
    }

    pub fn err(code: &str) -> Self {
        Self {
            success: false,
            error_code: Some(code.to_string()),
        }
    }
}

/// Aggregate response for one multicast batch.
#[derive(Debug, Clone, Default)]
pub struct BatchResponse {
    pub success_count: u32,
    pub failure_count: u32,
    /// Per-token results, in the same order as the submitted tokens.
    pub responses: Vec<SendResult>,
}

impl BatchResponse {
    pub fn from_results(responses: Vec<SendResult>) -> Self {
        let success_count = responses.iter().filter(|r| r.success).count() as u32;
        let failure_count = responses.len() as u32 - success_count;
        Self {
            success_count,
            failure_count,
            responses,
        }
    }
}

/// FCM client (HTTP v1 or scripted mock).
#[derive(Clone)]
pub struct FcmClient {
    inner: FcmInner,
}

#[derive(Clone)]
enum FcmInner {
    Http(HttpClient),
    Mock(MockState),
}

#[derive(Clone)]
struct HttpClient {
    http: reqwest::Client,
    endpoint: String,
    project_id: String,
    /// Absent when pointed at a local emulator endpoint (no auth needed).
    auth: Option<Arc<gcloud_sdk::GoogleAuthTokenGenerator>>,
}

#[derive(Clone, Default)]
struct MockState {
    /// Scripted batch outcomes; `Err` simulates a batch transport failure.
    script: Arc<Mutex<VecDeque<Result<BatchResponse, String>>>>,
    /// Token batches received, in submission order.
    calls: Arc<Mutex<Vec<Vec<String>>>>,
}

impl FcmClient {
    /// Create an FCM client against the real (or overridden) endpoint.
    ///
    /// Application default credentials are used unless the endpoint points
    /// at localhost, which keeps local runs against an emulator untokened.
    pub async fn new(project_id: &str, endpoint: &str) -> Result<Self, AppError> {
        let auth = if endpoint.contains("localhost") || endpoint.contains("127.0.0.1") {
            None
        } else {
            let generator = gcloud_sdk::GoogleAuthTokenGenerator::new(
                gcloud_sdk::TokenSourceType::Default,
                gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            )
            .await
            .map_err(|e| AppError::Push(format!("Failed to init FCM credentials: {}", e)))?;
            Some(Arc::new(generator))
        };

        tracing::info!(project = project_id, endpoint, "FCM client initialized");

        Ok(Self {
            inner: FcmInner::Http(HttpClient {
                http: reqwest::Client::new(),
                endpoint: endpoint.trim_end_matches('/').to_string(),
                project_id: project_id.to_string(),
                auth,
            }),
        })
    }

    /// Create a mock FCM client for testing (offline mode).
    ///
    /// Without scripting, every token in every batch succeeds.
    pub fn new_mock() -> Self {
        Self {
            inner: FcmInner::Mock(MockState::default()),
        }
    }

    /// Queue the outcome for the next batch (mock only).
    pub fn mock_push_batch(&self, result: Result<BatchResponse, String>) {
        if let FcmInner::Mock(state) = &self.inner {
            state.script.lock().unwrap().push_back(result);
        }
    }

    /// Token batches received so far (mock only).
    pub fn recorded_batches(&self) -> Vec<Vec<String>> {
        match &self.inner {
            FcmInner::Mock(state) => state.calls.lock().unwrap().clone(),
            FcmInner::Http(_) => Vec::new(),
        }
    }

    /// Send one multicast batch.
    ///
    /// Per-token outcomes come back as data; an `Err` means the batch as a
    /// whole could not be submitted (the caller attributes every token of
    /// the batch to the failure).
    pub async fn send_multicast(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<BatchResponse, AppError> {
        if tokens.len() > FCM_MULTICAST_LIMIT {
            return Err(AppError::Push(format!(
                "Batch of {} tokens exceeds the FCM multicast limit",
                tokens.len()
            )));
        }

        match &self.inner {
            FcmInner::Mock(state) => {
                state.calls.lock().unwrap().push(tokens.to_vec());
                let scripted = state.script.lock().unwrap().pop_front();
                match scripted {
                    Some(Ok(resp)) => Ok(resp),
                    Some(Err(msg)) => Err(AppError::Push(msg)),
                    None => Ok(BatchResponse::from_results(
                        tokens.iter().map(|_| SendResult::ok()).collect(),
                    )),
                }
            }
            FcmInner::Http(client) => client.send_batch(tokens, message).await,
        }
    }
}

impl HttpClient {
    async fn send_batch(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<BatchResponse, AppError> {
        // A credential failure affects every token equally, so it is a
        // batch-level error rather than per-token results.
        let bearer = match &self.auth {
            Some(generator) => Some(
                generator
                    .create_token()
                    .await
                    .map_err(|e| AppError::Push(format!("FCM auth token error: {}", e)))?
                    .header_value(),
            ),
            None => None,
        };

        let url = format!(
            "{}/v1/projects/{}/messages:send",
            self.endpoint, self.project_id
        );

        let results: Vec<SendResult> = stream::iter(tokens.iter().cloned())
            .map(|token| {
                let bearer = bearer.clone();
                let url = url.clone();
                async move { self.send_one(&url, bearer.as_deref(), &token, message).await }
            })
            .buffered(MAX_CONCURRENT_SENDS)
            .collect()
            .await;

        Ok(BatchResponse::from_results(results))
    }

    /// Send a single message; delivery failures become per-token results,
    /// never errors.
    async fn send_one(
        &self,
        url: &str,
        bearer: Option<&str>,
        token: &str,
        message: &PushMessage,
    ) -> SendResult {
        let mut notification = serde_json::json!({
            "title": message.title,
            "body": message.body,
        });
        if let Some(image) = &message.image_url {
            notification["image"] = serde_json::json!(image);
        }

        let body = serde_json::json!({
            "message": {
                "token": token,
                "notification": notification,
                "data": message.data,
            }
        });

        let mut request = self.http.post(url).json(&body);
        if let Some(bearer) = bearer {
            request = request.header(reqwest::header::AUTHORIZATION, bearer);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "FCM send transport error");
                return SendResult::err("internal-error");
            }
        };

        if response.status().is_success() {
            return SendResult::ok();
        }

        let status = response.status();
        let payload: serde_json::Value = response.json().await.unwrap_or_default();
        let code = extract_error_code(&payload)
            .unwrap_or_else(|| format!("http-{}", status.as_u16()));
        SendResult::err(&code)
    }
}

/// Pull the FCM error code out of a v1 error response and normalize it to
/// the kebab-case form the classifier matches on.
fn extract_error_code(payload: &serde_json::Value) -> Option<String> {
    let error = payload.get("error")?;

    // Prefer the FCM-specific errorCode from the details array; fall back
    // to the generic RPC status.
    let detail_code = error
        .get("details")
        .and_then(|d| d.as_array())
        .and_then(|details| {
            details
                .iter()
                .find_map(|d| d.get("errorCode").and_then(|c| c.as_str()))
        });

    let raw = detail_code.or_else(|| error.get("status").and_then(|s| s.as_str()))?;
    Some(normalize_error_code(raw))
}

fn normalize_error_code(raw: &str) -> String {
    match raw {
        "UNREGISTERED" | "NOT_FOUND" => "registration-token-not-registered".to_string(),
        "INVALID_ARGUMENT" => "invalid-registration-token".to_string(),
        "THIRD_PARTY_AUTH_ERROR" => "third-party-auth-error".to_string(),
        "SENDER_ID_MISMATCH" => "mismatched-credential".to_string(),
        "QUOTA_EXCEEDED" => "message-rate-exceeded".to_string(),
        "UNAVAILABLE" => "server-unavailable".to_string(),
        "INTERNAL" => "internal-error".to_string(),
        other => other.to_lowercase().replace('_', "-"),
    }
}
