// SPDX-License-Identifier: MIT

//! Services module - business logic layer.

pub mod audience;
pub mod dispatch;
pub mod fanout;
pub mod fcm;
pub mod message;

pub use audience::{build_audience, Audience, TokenRegistry};
pub use dispatch::DispatchOutcome;
pub use fanout::FanoutService;
pub use fcm::{BatchResponse, FcmClient, SendResult, FCM_MULTICAST_LIMIT};
pub use message::{compose, PushMessage};
