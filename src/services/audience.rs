// SPDX-License-Identifier: MIT

//! Audience resolution: directory scan to candidate tokens plus a
//! token-to-owners registry.
//!
//! The registry only lives for one dispatch run; it routes pruning and
//! refresh actions back to the records that registered a token. Explicit
//! tokens carried on the event itself have no owner and therefore no
//! cleanup side effects.

use crate::models::UserRecord;
use std::collections::{HashMap, HashSet};

/// Mapping from device token to the user ids that registered it.
///
/// The same token can legitimately appear on multiple records (device
/// handed between accounts, stale registrations), so owners are a set.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    owners: HashMap<String, HashSet<String>>,
}

impl TokenRegistry {
    pub fn register(&mut self, token: &str, user_id: &str) {
        self.owners
            .entry(token.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    /// Owners of a token; empty for explicit (event-supplied) tokens.
    pub fn owners_of(&self, token: &str) -> impl Iterator<Item = &str> {
        self.owners
            .get(token)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

/// Resolved audience for one dispatch run.
#[derive(Debug)]
pub struct Audience {
    /// Deduplicated candidate tokens, first-seen order.
    pub tokens: Vec<String>,
    pub registry: TokenRegistry,
}

/// Build the audience from the user directory plus any explicit tokens.
///
/// The author's record is skipped; explicit tokens bypass that exclusion
/// (self-notification through an explicit token is intentional). Dedup is
/// global across all sources and happens before chunking.
pub fn build_audience(
    users: &[UserRecord],
    exclude_user_id: Option<&str>,
    explicit_tokens: &[String],
) -> Audience {
    let mut registry = TokenRegistry::default();
    let mut seen = HashSet::new();
    let mut tokens = Vec::new();

    for user in users {
        if exclude_user_id.is_some_and(|author| author == user.id) {
            continue;
        }

        for token in user.all_tokens() {
            registry.register(&token, &user.id);
            if seen.insert(token.clone()) {
                tokens.push(token);
            }
        }
    }

    for token in explicit_tokens {
        if seen.insert(token.clone()) {
            tokens.push(token.clone());
        }
    }

    Audience { tokens, registry }
}
