pub mod backend;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod format;
pub mod inbox;
pub mod models;
pub mod runtime;
pub mod session;
pub mod store;
pub mod tracing_setup;

pub use backend::{DataService, MemoryDataService, RestDataService};
pub use config::CoreConfig;
pub use error::{BackendError, InboxError};
pub use events::CoreEvent;
pub use runtime::{InboxCommand, InboxHandle, InboxRuntime};
pub use session::InboxSession;
