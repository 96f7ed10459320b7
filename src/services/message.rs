// SPDX-License-Identifier: MIT

//! Notification message composer.
//!
//! Pure function from feed event fields to the notification payload. The
//! user-facing copy is Spanish, matching the shipped app strings. FCM data
//! payloads only accept string values, so every field is coerced here.

use crate::models::FeedEvent;
use std::collections::HashMap;

/// Fallback author name when the event carries none.
const DEFAULT_AUTHOR_NAME: &str = "Alguien";

/// Title for personal events without an explicit title.
const PERSONAL_DEFAULT_TITLE: &str = "Nueva actividad";

/// Composed notification, ready for the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    /// Omitted entirely when the author has no avatar (never sent as "").
    pub image_url: Option<String>,
    pub data: HashMap<String, String>,
}

/// Compose the notification for a feed event.
pub fn compose(feed: &FeedEvent, event_id: &str) -> PushMessage {
    let author_name = non_empty(feed.related_user_name.as_deref())
        .unwrap_or(DEFAULT_AUTHOR_NAME)
        .to_string();

    let title = match non_empty(feed.title.as_deref()) {
        Some(t) => t.to_string(),
        None if feed.is_personal => PERSONAL_DEFAULT_TITLE.to_string(),
        None => format!("{} completó una actividad", author_name),
    };

    // First non-empty explicit field wins; otherwise derive from the
    // activity data.
    let body = non_empty(feed.subtitle.as_deref())
        .or_else(|| non_empty(feed.body.as_deref()))
        .or_else(|| non_empty(feed.message.as_deref()))
        .map(|s| s.to_string())
        .unwrap_or_else(|| derived_body(feed, &author_name));

    let image_url = non_empty(feed.user_avatar_url.as_deref()).map(|s| s.to_string());

    let mut data = HashMap::new();
    data.insert("feedId".to_string(), feed.feed_id.clone());
    data.insert(
        "userId".to_string(),
        feed.user_id.clone().unwrap_or_default(),
    );
    data.insert(
        "activityId".to_string(),
        feed.activity_id.clone().unwrap_or_default(),
    );
    data.insert(
        "type".to_string(),
        feed.feed_type.clone().unwrap_or_default(),
    );
    data.insert("date".to_string(), feed.date.clone().unwrap_or_default());
    data.insert("isPersonal".to_string(), feed.is_personal.to_string());
    data.insert("authorName".to_string(), author_name);
    data.insert("eventId".to_string(), event_id.to_string());

    PushMessage {
        title,
        body,
        image_url,
        data,
    }
}

/// Derived body when no explicit text field is present.
///
/// Personal events mention earned XP or nothing; social events prefer a
/// distance phrase over an XP phrase over a generic completion phrase.
fn derived_body(feed: &FeedEvent, author_name: &str) -> String {
    if feed.is_personal {
        return match feed.xp() {
            Some(xp) => format!("Ganaste {} XP", xp),
            None => String::new(),
        };
    }

    let distance = feed
        .activity_data
        .as_ref()
        .and_then(|d| d.distance_meters)
        .filter(|m| *m > 0.0);

    if let Some(meters) = distance {
        let km = format!("{:.1}", meters / 1000.0);
        let activity_type = feed
            .activity_data
            .as_ref()
            .and_then(|d| non_empty(d.activity_type.as_deref()));
        return match activity_type {
            Some(t) => format!("{} completó {} km ({})", author_name, km, t),
            None => format!("{} completó {} km", author_name, km),
        };
    }

    match feed.xp() {
        Some(xp) => format!("{} ganó {} XP", author_name, xp),
        None => format!("{} completó una actividad", author_name),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
