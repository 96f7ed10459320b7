// SPDX-License-Identifier: MIT

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Feed events (idempotency read, outcome writes)
//! - Users (directory scan, token pruning, refresh flagging)
//!
//! All writes are field-level updates with explicit update masks or array
//! transforms; the service never overwrites a whole document it does not
//! own, so concurrent writers to the same records are not clobbered.

use crate::db::collections;
use crate::error::AppError;
use crate::models::{
    FeedEvent, PushOutcome, PushStatus, PushTerminalStatus, TokenRefreshFlag, UserRecord,
};

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        // Use ExternalJwtFunctionSource to provide a dummy token without needing
        // a custom TokenSource implementation struct.
        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── Feed Event Operations ───────────────────────────────────

    /// Get a feed event by its document id.
    pub async fn get_feed_event(&self, feed_id: &str) -> Result<Option<FeedEvent>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::FEED)
            .obj()
            .one(feed_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Write the full dispatch outcome onto a feed event.
    ///
    /// Uses an explicit update mask so only the push fields are touched.
    /// `None` reason fields write nulls, clearing values left behind by a
    /// previous failed attempt.
    pub async fn write_dispatch_outcome(
        &self,
        feed_id: &str,
        outcome: &PushOutcome,
    ) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(firestore::paths_camel_case!(PushOutcome::{
                push_status,
                push_sent_at,
                push_event_id,
                push_success_count,
                push_failure_count,
                push_audience_tokens,
                push_failure_reasons,
                push_error
            }))
            .in_col(collections::FEED)
            .document_id(feed_id)
            .object(outcome)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Write a minimal terminal status (skip or best-effort failure record).
    ///
    /// Does not set `pushSentAt`, so a redelivered event re-evaluates the
    /// gates and converges to the same state.
    pub async fn write_terminal_status(
        &self,
        feed_id: &str,
        status: PushStatus,
        event_id: &str,
        error: &str,
    ) -> Result<(), AppError> {
        let record = PushTerminalStatus {
            push_status: status,
            push_event_id: event_id.to_string(),
            push_error: error.to_string(),
        };

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(firestore::paths_camel_case!(PushTerminalStatus::{
                push_status,
                push_event_id,
                push_error
            }))
            .in_col(collections::FEED)
            .document_id(feed_id)
            .object(&record)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Create or update a feed event.
    ///
    /// The app backend owns feed creation; this exists for seeding test
    /// fixtures and backfills.
    pub async fn upsert_feed_event(&self, feed: &FeedEvent) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::FEED)
            .document_id(&feed.feed_id)
            .object(feed)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user by id.
    pub async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a user.
    pub async fn upsert_user(&self, user: &UserRecord) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(&user.id)
            .object(user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Read the full user directory.
    ///
    /// A full scan per dispatch run is acceptable at current directory
    /// sizes; the scan happens at most once per feed event.
    pub async fn list_users(&self) -> Result<Vec<UserRecord>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Remove specific token values from a user's token arrays.
    ///
    /// Uses `removeAllFromArray` transforms against both legacy array
    /// fields in one atomic update, so concurrent token registrations on
    /// the same record are not lost.
    pub async fn prune_user_tokens(
        &self,
        user_id: &str,
        tokens: &[String],
    ) -> Result<(), AppError> {
        let removed = tokens.to_vec();
        let removed_legacy = tokens.to_vec();

        // Transform-only updates can only be committed through a batch or
        // transaction in this firestore version; a single-write batch keeps
        // the write atomic on the one document.
        let client = self.get_client()?;
        let batch_writer = client
            .create_simple_batch_writer()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        let mut batch = batch_writer.new_batch();

        client
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(user_id)
            .transforms(|t| {
                t.fields([
                    t.field(firestore::path_camel_case!(UserRecord::fcm_tokens))
                        .remove_all_from_array(removed.clone()),
                    t.field(firestore::path_camel_case!(UserRecord::tokens))
                        .remove_all_from_array(removed_legacy.clone()),
                ])
            })
            .only_transform()
            .add_to_batch(&mut batch)
            .map_err(|e| AppError::Database(e.to_string()))?;

        batch
            .write()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Clear a user's legacy scalar token field.
    ///
    /// Issued when the scalar `fcmToken` holds a token FCM reported as
    /// permanently invalid; arrays are handled by [`Self::prune_user_tokens`].
    pub async fn clear_legacy_token(&self, user_id: &str) -> Result<(), AppError> {
        #[derive(serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ClearToken {
            fcm_token: Option<String>,
        }

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(firestore::paths_camel_case!(ClearToken::{fcm_token}))
            .in_col(collections::USERS)
            .document_id(user_id)
            .object(&ClearToken { fcm_token: None })
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Flag a user for re-authentication after an identity-broken token.
    pub async fn mark_token_refresh(&self, user_id: &str) -> Result<(), AppError> {
        let flag = TokenRefreshFlag {
            needs_token_refresh: true,
            needs_token_refresh_at: chrono::Utc::now().to_rfc3339(),
        };

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(firestore::paths_camel_case!(TokenRefreshFlag::{
                needs_token_refresh,
                needs_token_refresh_at
            }))
            .in_col(collections::USERS)
            .document_id(user_id)
            .object(&flag)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}
