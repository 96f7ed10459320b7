// SPDX-License-Identifier: MIT

//! Feed-Fanout: push notification fanout for feed events.
//!
//! This crate provides the backend service that reacts to feed document
//! creation, resolves the notification audience, delivers FCM multicast
//! batches and records the delivery outcome on the originating document.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::FirestoreDb;
use services::{FanoutService, FcmClient};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub fcm: FcmClient,
    pub fanout_service: FanoutService,
}
