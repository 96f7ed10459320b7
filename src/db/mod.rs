//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

/// Collection names as constants.
pub mod collections {
    /// Feed events (keyed by feed id)
    pub const FEED: &str = "feed";
    /// User records holding device tokens (keyed by user id)
    pub const USERS: &str = "users";
}
