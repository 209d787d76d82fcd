pub mod inbox_store;

pub use inbox_store::InboxStore;
