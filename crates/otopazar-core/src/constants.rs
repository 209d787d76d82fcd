//! Application-wide constants
//!
//! Centralized location for table names, column names and defaults
//! that are used across multiple modules.

/// Default backend REST endpoint (overridden by config or environment)
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:54321";

/// Fallback name shown for a counterpart without a profile
pub const DEFAULT_DISPLAY_NAME: &str = "Unknown user";

/// Interval between change-feed polls against the REST backend
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Upper bound on rows returned by a single poll of the change feed
pub const FEED_BATCH_LIMIT: usize = 200;

// Table names used by the marketplace backend
pub mod tables {
    /// Messages between users
    pub const MESSAGES: &str = "mesajlar";
    /// User profiles
    pub const PROFILES: &str = "profiller";
    /// Car listings
    pub const LISTINGS: &str = "arabalar";
}

// Column names of the messages table
pub mod message_columns {
    pub const ID: &str = "id";
    pub const SENDER_ID: &str = "gonderen_id";
    pub const RECIPIENT_ID: &str = "alici_id";
    pub const LISTING_ID: &str = "arac_id";
    pub const IS_READ: &str = "okundu";
    pub const CREATED_AT: &str = "created_at";
}

// Column names of the profiles table
pub mod profile_columns {
    pub const ID: &str = "id";
}

// Column names of the listings table
pub mod listing_columns {
    pub const ID: &str = "id";
    pub const TITLE: &str = "baslik";
}
