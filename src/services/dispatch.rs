// SPDX-License-Identifier: MIT

//! Chunked multicast dispatch and per-token failure classification.
//!
//! Splits the deduplicated audience into provider-sized batches, sends
//! them in order, and folds every per-token result into one aggregate
//! outcome. A batch that fails wholesale (transport error) marks all of
//! its tokens failed and does not stop the remaining batches.

use crate::services::audience::TokenRegistry;
use crate::services::fcm::{FcmClient, FCM_MULTICAST_LIMIT};
use crate::services::message::PushMessage;
use std::collections::{HashMap, HashSet};

/// Aggregated result of one dispatch run.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub success_count: u32,
    pub failure_count: u32,
    /// Failure-code histogram across all batches.
    pub failure_reasons: HashMap<String, u32>,
    /// First failure reason observed, persisted as `pushError`.
    pub first_error: Option<String>,
    /// Tokens FCM declared permanently invalid; scheduled for pruning.
    pub invalid_tokens: HashSet<String>,
    /// Owners of identity-broken tokens; scheduled for re-auth flagging.
    pub refresh_owners: HashSet<String>,
}

impl DispatchOutcome {
    fn record_failure(&mut self, reason: &str) {
        *self.failure_reasons.entry(reason.to_string()).or_insert(0) += 1;
        if self.first_error.is_none() {
            self.first_error = Some(reason.to_string());
        }
    }
}

/// Dispatch the audience in batches of at most 500 tokens.
pub async fn dispatch(
    fcm: &FcmClient,
    tokens: &[String],
    message: &PushMessage,
    registry: &TokenRegistry,
) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();

    for chunk in tokens.chunks(FCM_MULTICAST_LIMIT) {
        match fcm.send_multicast(chunk, message).await {
            Ok(resp) => {
                outcome.success_count += resp.success_count;
                outcome.failure_count += resp.failure_count;

                for (token, result) in chunk.iter().zip(resp.responses.iter()) {
                    if result.success {
                        continue;
                    }
                    let code = result.error_code.as_deref().unwrap_or("unknown");
                    outcome.record_failure(code);
                    classify_failure(&mut outcome, token, code, registry);
                }
            }
            Err(e) => {
                // The whole batch failed to submit; every token in it
                // counts as failed, the error is recorded once.
                tracing::warn!(
                    batch_size = chunk.len(),
                    error = %e,
                    "FCM batch send failed"
                );
                outcome.failure_count += chunk.len() as u32;
                outcome.record_failure(&e.to_string());
            }
        }
    }

    outcome
}

/// Codes FCM uses for tokens that will never deliver again.
const INVALID_TOKEN_CODES: [&str; 2] = [
    "registration-token-not-registered",
    "invalid-registration-token",
];

/// Code for a token whose owner's auth linkage is broken; the token is
/// pruned and the owner flagged for re-authentication.
const AUTH_BROKEN_CODE: &str = "third-party-auth-error";

fn classify_failure(
    outcome: &mut DispatchOutcome,
    token: &str,
    code: &str,
    registry: &TokenRegistry,
) {
    if INVALID_TOKEN_CODES.iter().any(|c| code.contains(c)) {
        outcome.invalid_tokens.insert(token.to_string());
        return;
    }

    if code.contains(AUTH_BROKEN_CODE) {
        outcome.invalid_tokens.insert(token.to_string());
        for owner in registry.owners_of(token) {
            outcome.refresh_owners.insert(owner.to_string());
        }
    }
}
