// SPDX-License-Identifier: MIT

//! End-to-end fanout tests against the Firestore emulator.
//!
//! These tests require the Firestore emulator to be running with a clean
//! state (set FIRESTORE_EMULATOR_HOST). Delivery goes through the mock
//! FCM client, so no real pushes leave the machine.

use feed_fanout::models::{ActivityData, FeedEvent, UserRecord};
use feed_fanout::services::{BatchResponse, FanoutService, FcmClient, SendResult};

mod common;
use common::test_db;

/// Unique suffix per test run for document isolation.
fn unique_run_id() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64
}

fn user(id: &str, tokens: &[&str]) -> UserRecord {
    UserRecord {
        id: id.to_string(),
        fcm_tokens: tokens.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_missing_identity_writes_single_skip() {
    require_emulator!();

    let db = test_db().await;
    let fcm = FcmClient::new_mock();
    let service = FanoutService::new(db.clone(), fcm.clone());
    let run = unique_run_id();
    let feed_id = format!("feed-noid-{}", run);

    db.upsert_feed_event(&FeedEvent {
        feed_id: feed_id.clone(),
        title: Some("Sin autor".to_string()),
        ..Default::default()
    })
    .await
    .unwrap();

    service
        .handle_feed_created(&format!("evt-{}", run), &feed_id)
        .await;

    let feed = db.get_feed_event(&feed_id).await.unwrap().unwrap();
    assert_eq!(feed.push_status.map(|s| s.as_str()), Some("skipped"));
    assert_eq!(feed.push_error.as_deref(), Some("missing userId and tokens"));
    assert_eq!(feed.push_event_id.as_deref(), Some(format!("evt-{}", run).as_str()));
    // No delivery attempted, no audience resolved.
    assert!(fcm.recorded_batches().is_empty());
    assert!(feed.push_sent_at.is_none());
}

#[tokio::test]
async fn test_idempotency_gate_no_ops_on_redelivery() {
    require_emulator!();

    let db = test_db().await;
    let fcm = FcmClient::new_mock();
    let service = FanoutService::new(db.clone(), fcm.clone());
    let run = unique_run_id();
    let feed_id = format!("feed-idem-{}", run);

    db.upsert_feed_event(&FeedEvent {
        feed_id: feed_id.clone(),
        user_id: Some("author".to_string()),
        push_sent_at: Some("2026-08-29T12:00:00+00:00".to_string()),
        push_event_id: Some("evt-original".to_string()),
        ..Default::default()
    })
    .await
    .unwrap();

    service.handle_feed_created("evt-retry", &feed_id).await;

    let feed = db.get_feed_event(&feed_id).await.unwrap().unwrap();
    // Redelivery produced no delivery calls and no writes.
    assert!(fcm.recorded_batches().is_empty());
    assert_eq!(feed.push_event_id.as_deref(), Some("evt-original"));
    assert_eq!(
        feed.push_sent_at.as_deref(),
        Some("2026-08-29T12:00:00+00:00")
    );
}

#[tokio::test]
async fn test_fanout_pipeline_against_emulator() {
    require_emulator!();

    let db = test_db().await;
    let fcm = FcmClient::new_mock();
    let service = FanoutService::new(db.clone(), fcm.clone());
    let run = unique_run_id();

    // ─── Scenario 1: only the author exists → empty audience ─────
    let author_id = format!("u{}a", run);
    db.upsert_user(&user(&author_id, &["tok-author"])).await.unwrap();

    let feed_id = format!("feed-empty-{}", run);
    db.upsert_feed_event(&FeedEvent {
        feed_id: feed_id.clone(),
        user_id: Some(author_id.clone()),
        ..Default::default()
    })
    .await
    .unwrap();

    service.handle_feed_created("evt-empty", &feed_id).await;

    let feed = db.get_feed_event(&feed_id).await.unwrap().unwrap();
    assert_eq!(feed.push_status.map(|s| s.as_str()), Some("skipped"));
    assert_eq!(feed.push_error.as_deref(), Some("no audience tokens"));
    assert!(fcm.recorded_batches().is_empty());

    // ─── Scenario 2: Ana's run, one valid and one dead token ─────
    let good_id = format!("u{}b", run);
    let bad_id = format!("u{}c", run);
    let good_token = format!("tok-good-{}", run);
    let bad_token = format!("tok-bad-{}", run);
    db.upsert_user(&user(&good_id, &[&good_token])).await.unwrap();
    db.upsert_user(&user(&bad_id, &[&bad_token])).await.unwrap();

    let feed_id = format!("feed-ana-{}", run);
    db.upsert_feed_event(&FeedEvent {
        feed_id: feed_id.clone(),
        user_id: Some(author_id.clone()),
        related_user_name: Some("Ana".to_string()),
        activity_data: Some(ActivityData {
            activity_type: Some("run".to_string()),
            distance_meters: Some(5200.0),
            xp_earned: None,
        }),
        ..Default::default()
    })
    .await
    .unwrap();

    fcm.mock_push_batch(Ok(BatchResponse::from_results(vec![
        SendResult::ok(),
        SendResult::err("registration-token-not-registered"),
    ])));

    service.handle_feed_created("evt-ana", &feed_id).await;

    // One delivery call: the author's token is excluded.
    let batches = fcm.recorded_batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0], vec![good_token.clone(), bad_token.clone()]);

    let feed = db.get_feed_event(&feed_id).await.unwrap().unwrap();
    assert_eq!(feed.push_status.map(|s| s.as_str()), Some("sent"));
    assert!(feed.push_sent_at.is_some());
    assert_eq!(feed.push_success_count, Some(1));
    assert_eq!(feed.push_failure_count, Some(1));
    assert_eq!(feed.push_audience_tokens, Some(2));
    let reasons = feed.push_failure_reasons.unwrap();
    assert_eq!(reasons["registration-token-not-registered"], 1);
    assert_eq!(
        feed.push_error.as_deref(),
        Some("registration-token-not-registered")
    );

    // The dead token was pruned from its owner.
    let pruned = db.get_user(&bad_id).await.unwrap().unwrap();
    assert!(pruned.fcm_tokens.is_empty());
    assert_ne!(pruned.needs_token_refresh, Some(true));

    // ─── Scenario 3: identity-broken token flags its owner ───────
    let broken_id = format!("u{}d", run);
    let broken_token = format!("tok-broken-{}", run);
    db.upsert_user(&user(&broken_id, &[&broken_token])).await.unwrap();

    let feed_id = format!("feed-auth-{}", run);
    db.upsert_feed_event(&FeedEvent {
        feed_id: feed_id.clone(),
        user_id: Some(author_id.clone()),
        related_user_name: Some("Ana".to_string()),
        ..Default::default()
    })
    .await
    .unwrap();

    // Audience is [good, broken] in directory order.
    fcm.mock_push_batch(Ok(BatchResponse::from_results(vec![
        SendResult::ok(),
        SendResult::err("third-party-auth-error"),
    ])));

    service.handle_feed_created("evt-auth", &feed_id).await;

    let flagged = db.get_user(&broken_id).await.unwrap().unwrap();
    assert!(flagged.fcm_tokens.is_empty(), "broken token should be pruned");
    assert_eq!(flagged.needs_token_refresh, Some(true));
    assert!(flagged.needs_token_refresh_at.is_some());

    let feed = db.get_feed_event(&feed_id).await.unwrap().unwrap();
    assert_eq!(feed.push_status.map(|s| s.as_str()), Some("sent"));
    assert_eq!(
        feed.push_success_count.unwrap() + feed.push_failure_count.unwrap(),
        feed.push_audience_tokens.unwrap()
    );
}

#[tokio::test]
async fn test_explicit_tokens_bypass_directory() {
    require_emulator!();

    let db = test_db().await;
    let fcm = FcmClient::new_mock();
    let service = FanoutService::new(db.clone(), fcm.clone());
    let run = unique_run_id();
    let feed_id = format!("feed-explicit-{}", run);
    let explicit = format!("tok-explicit-{}", run);

    // No author at all; the explicit token is the whole audience.
    db.upsert_feed_event(&FeedEvent {
        feed_id: feed_id.clone(),
        title: Some("Aviso".to_string()),
        tokens: vec![explicit.clone()],
        ..Default::default()
    })
    .await
    .unwrap();

    service.handle_feed_created("evt-explicit", &feed_id).await;

    let batches = fcm.recorded_batches();
    assert_eq!(batches.len(), 1);
    assert!(batches[0].contains(&explicit));

    let feed = db.get_feed_event(&feed_id).await.unwrap().unwrap();
    assert_eq!(feed.push_status.map(|s| s.as_str()), Some("sent"));
    // A clean run clears the reason fields.
    assert!(feed.push_failure_reasons.is_none());
    assert!(feed.push_error.is_none());
}
