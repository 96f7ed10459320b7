//! User model for storage and token normalization.

use serde::{Deserialize, Serialize};

/// User profile stored in Firestore.
///
/// Device tokens have accumulated in three shapes over the life of the
/// product: `fcmTokens` (current array), `fcmToken` (legacy scalar) and
/// `tokens` (oldest array). All three are read and merged; only
/// [`UserRecord::all_tokens`] knows about the legacy layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Document ID (user id), populated by the Firestore client.
    #[serde(alias = "_firestore_id", default)]
    pub id: String,
    /// Current device token array
    #[serde(default)]
    pub fcm_tokens: Vec<String>,
    /// Legacy single device token
    pub fcm_token: Option<String>,
    /// Oldest legacy device token array
    #[serde(default)]
    pub tokens: Vec<String>,
    /// Set when FCM reports this user's auth linkage broken
    pub needs_token_refresh: Option<bool>,
    /// When the refresh flag was last set (RFC 3339)
    pub needs_token_refresh_at: Option<String>,
}

impl UserRecord {
    /// Merge the three legacy token shapes into one canonical ordered
    /// sequence: `fcmTokens`, then `fcmToken`, then `tokens`, with empty
    /// strings and intra-record duplicates dropped.
    pub fn all_tokens(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut merged = Vec::new();

        let candidates = self
            .fcm_tokens
            .iter()
            .chain(self.fcm_token.iter())
            .chain(self.tokens.iter());

        for token in candidates {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            if seen.insert(token.to_string()) {
                merged.push(token.to_string());
            }
        }

        merged
    }
}

/// Refresh-flag update written when FCM reports an identity-broken token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRefreshFlag {
    pub needs_token_refresh: bool,
    pub needs_token_refresh_at: String,
}
