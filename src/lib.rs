pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use app::explorer::RollExplorer;
pub use config::{cli::LocalStorage, toml_config::TomlConfig};
pub use core::catalog::{HttpCatalogSource, TerritoryDirectory};
pub use core::fetch::HttpDocumentSource;
pub use core::session::{CodeSelection, ExplorerSession};
pub use utils::error::{ExplorerError, Result};
