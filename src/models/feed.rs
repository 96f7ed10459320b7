// SPDX-License-Identifier: MIT

//! Feed event model and persisted push outcome.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Feed document whose creation triggers a notification fanout.
///
/// Written by the app backend; this service only ever touches the
/// `push*` outcome fields, and only via field-level updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEvent {
    /// Document ID (feed id), populated by the Firestore client.
    #[serde(alias = "_firestore_id", default)]
    pub feed_id: String,
    /// Author of the event; excluded from the audience.
    pub user_id: Option<String>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub body: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub is_personal: bool,
    #[serde(rename = "type")]
    pub feed_type: Option<String>,
    pub activity_id: Option<String>,
    pub date: Option<String>,
    #[serde(rename = "userAvatarURL")]
    pub user_avatar_url: Option<String>,
    pub related_user_name: Option<String>,
    pub activity_data: Option<ActivityData>,
    /// Legacy top-level XP, used when `activityData.xpEarned` is absent.
    pub xp_earned: Option<i64>,
    /// Explicit delivery targets, bypassing the directory lookup.
    #[serde(default)]
    pub tokens: Vec<String>,
    /// Legacy single explicit delivery target.
    pub token: Option<String>,

    // ── Delivery outcome, written by this service ────────────────
    pub push_status: Option<PushStatus>,
    /// Presence of this field is the idempotency guard.
    pub push_sent_at: Option<String>,
    pub push_event_id: Option<String>,
    pub push_success_count: Option<u32>,
    pub push_failure_count: Option<u32>,
    pub push_audience_tokens: Option<u32>,
    pub push_failure_reasons: Option<HashMap<String, u32>>,
    pub push_error: Option<String>,
}

impl FeedEvent {
    /// Explicit tokens carried on the event itself (both shapes), with
    /// empty entries dropped. These bypass audience resolution entirely.
    pub fn explicit_tokens(&self) -> Vec<String> {
        self.tokens
            .iter()
            .chain(self.token.iter())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Earned XP, preferring the nested activity data over the legacy
    /// top-level field.
    pub fn xp(&self) -> Option<i64> {
        self.activity_data
            .as_ref()
            .and_then(|d| d.xp_earned)
            .or(self.xp_earned)
    }
}

/// Derived activity fields nested on a feed event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityData {
    pub activity_type: Option<String>,
    pub xp_earned: Option<i64>,
    pub distance_meters: Option<f64>,
}

/// Terminal delivery status persisted on the feed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushStatus {
    Sent,
    Failed,
    Skipped,
}

impl PushStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushStatus::Sent => "sent",
            PushStatus::Failed => "failed",
            PushStatus::Skipped => "skipped",
        }
    }
}

/// Full outcome field set written after a dispatch run.
///
/// Reason fields deliberately serialize as explicit nulls when `None` so a
/// clean run clears leftovers from an earlier failed attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOutcome {
    pub push_status: PushStatus,
    pub push_sent_at: String,
    pub push_event_id: String,
    pub push_success_count: u32,
    pub push_failure_count: u32,
    pub push_audience_tokens: u32,
    pub push_failure_reasons: Option<HashMap<String, u32>>,
    pub push_error: Option<String>,
}

/// Minimal terminal write used for skips and best-effort failure records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushTerminalStatus {
    pub push_status: PushStatus,
    pub push_event_id: String,
    pub push_error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_tokens_merges_both_shapes() {
        let feed = FeedEvent {
            tokens: vec!["a".to_string(), "".to_string()],
            token: Some("b".to_string()),
            ..Default::default()
        };
        assert_eq!(feed.explicit_tokens(), vec!["a", "b"]);
    }

    #[test]
    fn test_xp_prefers_activity_data() {
        let feed = FeedEvent {
            activity_data: Some(ActivityData {
                xp_earned: Some(120),
                ..Default::default()
            }),
            xp_earned: Some(50),
            ..Default::default()
        };
        assert_eq!(feed.xp(), Some(120));
    }

    #[test]
    fn test_xp_falls_back_to_legacy_field() {
        let feed = FeedEvent {
            xp_earned: Some(50),
            ..Default::default()
        };
        assert_eq!(feed.xp(), Some(50));
    }

    #[test]
    fn test_avatar_field_uses_legacy_capitalization() {
        let feed: FeedEvent = serde_json::from_value(serde_json::json!({
            "userAvatarURL": "https://img.example/u1.png",
            "type": "activity"
        }))
        .unwrap();
        assert_eq!(
            feed.user_avatar_url.as_deref(),
            Some("https://img.example/u1.png")
        );
        assert_eq!(feed.feed_type.as_deref(), Some("activity"));
    }
}
