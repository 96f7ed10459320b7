// SPDX-License-Identifier: MIT

//! Fanout orchestrator.
//!
//! Handles one feed-created occurrence end to end:
//! 1. Idempotency gate (`pushSentAt` already set → no-op)
//! 2. Identity gate (no author, no explicit tokens → skipped)
//! 3. Directory scan and audience resolution
//! 4. Message composition and chunked dispatch
//! 5. Best-effort token pruning / refresh flagging
//! 6. Terminal outcome write
//!
//! The platform delivers creation events at least once, so every branch
//! must converge under redelivery, and no error may escape to the
//! platform (an uncaught failure would cause a redelivery storm).

use crate::db::FirestoreDb;
use crate::error::Result;
use crate::models::{PushOutcome, PushStatus, UserRecord};
use crate::services::audience::{self, TokenRegistry};
use crate::services::dispatch::{self, DispatchOutcome};
use crate::services::fcm::FcmClient;
use crate::services::message;
use futures_util::{stream, StreamExt};
use std::collections::HashMap;

/// Concurrent cleanup updates per task group.
const MAX_CONCURRENT_CLEANUP: usize = 50;

/// Orchestrates notification fanout for feed events.
#[derive(Clone)]
pub struct FanoutService {
    db: FirestoreDb,
    fcm: FcmClient,
}

impl FanoutService {
    pub fn new(db: FirestoreDb, fcm: FcmClient) -> Self {
        Self { db, fcm }
    }

    /// Handle one feed-created occurrence.
    ///
    /// Never returns an error: anything escaping the pipeline is logged
    /// and recorded as a best-effort `failed` status on the feed document.
    pub async fn handle_feed_created(&self, event_id: &str, feed_id: &str) {
        if let Err(e) = self.process(event_id, feed_id).await {
            tracing::error!(
                feed_id,
                event_id,
                error = %e,
                "Fanout failed unexpectedly"
            );

            if let Err(write_err) = self
                .db
                .write_terminal_status(feed_id, PushStatus::Failed, event_id, &e.to_string())
                .await
            {
                tracing::error!(
                    feed_id,
                    event_id,
                    error = %write_err,
                    "Failed to record fanout failure"
                );
            }
        }
    }

    async fn process(&self, event_id: &str, feed_id: &str) -> Result<()> {
        let Some(feed) = self.db.get_feed_event(feed_id).await? else {
            // Creation trigger raced a delete; nothing to notify about.
            tracing::warn!(feed_id, event_id, "Feed event not found, skipping fanout");
            return Ok(());
        };

        // Idempotency gate: a prior attempt already recorded its outcome.
        if feed.push_sent_at.is_some() {
            tracing::info!(
                feed_id,
                event_id,
                prior_event_id = feed.push_event_id.as_deref().unwrap_or(""),
                "Push already dispatched, skipping redelivery"
            );
            return Ok(());
        }

        let explicit_tokens = feed.explicit_tokens();

        if feed.user_id.is_none() && explicit_tokens.is_empty() {
            tracing::info!(feed_id, event_id, "No author and no explicit tokens");
            self.db
                .write_terminal_status(
                    feed_id,
                    PushStatus::Skipped,
                    event_id,
                    "missing userId and tokens",
                )
                .await?;
            return Ok(());
        }

        let users = self.db.list_users().await?;
        let audience =
            audience::build_audience(&users, feed.user_id.as_deref(), &explicit_tokens);

        if audience.tokens.is_empty() {
            tracing::info!(feed_id, event_id, "Resolved audience is empty");
            self.db
                .write_terminal_status(
                    feed_id,
                    PushStatus::Skipped,
                    event_id,
                    "no audience tokens",
                )
                .await?;
            return Ok(());
        }

        let message = message::compose(&feed, event_id);
        tracing::info!(
            feed_id,
            event_id,
            audience = audience.tokens.len(),
            title = %message.title,
            "Dispatching notification"
        );

        let outcome =
            dispatch::dispatch(&self.fcm, &audience.tokens, &message, &audience.registry).await;

        // Cleanup settles (or is abandoned with logging) before the
        // outcome write, which is the single serialization point.
        self.run_cleanup(&outcome, &audience.registry, &users).await;

        let status = if outcome.success_count > 0 {
            PushStatus::Sent
        } else {
            PushStatus::Failed
        };

        let push_outcome = PushOutcome {
            push_status: status,
            push_sent_at: chrono::Utc::now().to_rfc3339(),
            push_event_id: event_id.to_string(),
            push_success_count: outcome.success_count,
            push_failure_count: outcome.failure_count,
            push_audience_tokens: audience.tokens.len() as u32,
            push_failure_reasons: (!outcome.failure_reasons.is_empty())
                .then(|| outcome.failure_reasons.clone()),
            push_error: outcome.first_error.clone(),
        };
        self.db.write_dispatch_outcome(feed_id, &push_outcome).await?;

        tracing::info!(
            feed_id,
            event_id,
            status = status.as_str(),
            success = outcome.success_count,
            failure = outcome.failure_count,
            pruned = outcome.invalid_tokens.len(),
            "Fanout complete"
        );

        Ok(())
    }

    /// Prune invalid tokens and flag owners needing re-auth.
    ///
    /// Two independent task groups, each internally parallel; individual
    /// failures are logged and swallowed so cleanup can never block or
    /// fail the outcome write.
    async fn run_cleanup(
        &self,
        outcome: &DispatchOutcome,
        registry: &TokenRegistry,
        users: &[UserRecord],
    ) {
        let mut by_owner: HashMap<String, Vec<String>> = HashMap::new();
        for token in &outcome.invalid_tokens {
            for owner in registry.owners_of(token) {
                by_owner
                    .entry(owner.to_string())
                    .or_default()
                    .push(token.clone());
            }
        }

        // Legacy scalar fcmToken values, so invalid ones can be cleared in
        // the same pass as the array pruning.
        let scalar_tokens: HashMap<&str, &str> = users
            .iter()
            .filter_map(|u| u.fcm_token.as_deref().map(|t| (u.id.as_str(), t)))
            .collect();

        let prune = stream::iter(by_owner.into_iter())
            .map(|(owner, tokens)| {
                let db = self.db.clone();
                let clear_scalar = scalar_tokens
                    .get(owner.as_str())
                    .is_some_and(|scalar| tokens.iter().any(|t| t == scalar));
                async move {
                    if let Err(e) = db.prune_user_tokens(&owner, &tokens).await {
                        tracing::warn!(
                            user_id = %owner,
                            count = tokens.len(),
                            error = %e,
                            "Failed to prune invalid tokens"
                        );
                    }
                    if clear_scalar {
                        if let Err(e) = db.clear_legacy_token(&owner).await {
                            tracing::warn!(
                                user_id = %owner,
                                error = %e,
                                "Failed to clear legacy token field"
                            );
                        }
                    }
                }
            })
            .buffer_unordered(MAX_CONCURRENT_CLEANUP)
            .collect::<Vec<()>>();

        let refresh = stream::iter(outcome.refresh_owners.iter().cloned())
            .map(|owner| {
                let db = self.db.clone();
                async move {
                    if let Err(e) = db.mark_token_refresh(&owner).await {
                        tracing::warn!(
                            user_id = %owner,
                            error = %e,
                            "Failed to flag user for token refresh"
                        );
                    }
                }
            })
            .buffer_unordered(MAX_CONCURRENT_CLEANUP)
            .collect::<Vec<()>>();

        let _ = tokio::join!(prune, refresh);
    }
}
