pub mod conversation;
pub mod listing;
pub mod message;
pub mod profile;

pub use conversation::{Conversation, InboxSummary};
pub use listing::{Listing, ListingRef};
pub use message::{Message, NewMessage};
pub use profile::Profile;
