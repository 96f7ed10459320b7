// SPDX-License-Identifier: MIT

//! Data models for the application.

pub mod feed;
pub mod user;

pub use feed::{ActivityData, FeedEvent, PushOutcome, PushStatus, PushTerminalStatus};
pub use user::{TokenRefreshFlag, UserRecord};
