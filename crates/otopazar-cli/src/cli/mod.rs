pub mod commands;
pub mod config;
pub mod protocol;

pub use commands::CommandRunner;
pub use config::CliConfig;
pub use protocol::{CliCommand, Response};

use anyhow::Result;
use serde::Serialize;

/// Print one JSON document to stdout
pub fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    if pretty {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", serde_json::to_string(value)?);
    }
    Ok(())
}
