// SPDX-License-Identifier: MIT

use feed_fanout::config::Config;
use feed_fanout::db::FirestoreDb;
use feed_fanout::routes::create_router;
use feed_fanout::services::{FanoutService, FcmClient};
use feed_fanout::AppState;
use std::sync::Arc;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a mock database connection (offline).
#[allow(dead_code)]
pub fn test_db_offline() -> FirestoreDb {
    FirestoreDb::new_mock()
}

/// Create a test app with offline mock dependencies.
/// Returns the router, the shared state and a handle to the mock FCM
/// client for call assertions.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>, FcmClient) {
    let config = Config::test_default();
    let db = test_db_offline();
    let fcm = FcmClient::new_mock();
    let fanout_service = FanoutService::new(db.clone(), fcm.clone());

    let state = Arc::new(AppState {
        config,
        db,
        fcm: fcm.clone(),
        fanout_service,
    });

    (create_router(state.clone()), state, fcm)
}
