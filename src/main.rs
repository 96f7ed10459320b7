// SPDX-License-Identifier: MIT

//! Feed-Fanout service
//!
//! Listens for Firestore feed-created events delivered by Eventarc and
//! fans each one out to the notification audience via FCM.

use feed_fanout::{
    config::Config,
    db::FirestoreDb,
    services::{FanoutService, FcmClient},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Feed-Fanout service");

    // Initialize Firestore database
    let db = FirestoreDb::new(&config.gcp_project_id)
        .await
        .expect("Failed to connect to Firestore");

    // Initialize FCM client
    let fcm = FcmClient::new(&config.gcp_project_id, &config.fcm_endpoint)
        .await
        .expect("Failed to initialize FCM client");

    let fanout_service = FanoutService::new(db.clone(), fcm.clone());

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        fcm,
        fanout_service,
    });

    // Build router
    let app = feed_fanout::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("feed_fanout=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
