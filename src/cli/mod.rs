pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{CliArgs, Commands, ListToolsArgs, ScanArgs};
pub use output::{OutputFormat, OutputFormatter};
