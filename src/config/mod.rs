pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
mod args;

#[cfg(feature = "cli")]
pub use args::{parse_filter, CliConfig, Command, ExportArgs, RollArgs, SelectionArgs};
