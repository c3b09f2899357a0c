use crate::core::catalog::TerritoryFilter;
use crate::core::export::ExportFormat;
use crate::core::session::CodeSelection;
use crate::utils::error::{ExplorerError, Result};
use crate::utils::validation::{self, Validate};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "roll-explorer")]
#[command(about = "Summarize Québec property assessment rolls by land-use code")]
pub struct CliConfig {
    /// Path to a TOML settings file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List territories from the open-data catalog
    Territories {
        /// Keep only rows where COLUMN equals VALUE, e.g. "région=Estrie"
        #[arg(long)]
        filter: Option<String>,
    },
    /// List the classification codes present in a roll
    Codes {
        #[command(flatten)]
        roll: RollArgs,
    },
    /// Summarize units, dwellings and mean values per classification code
    Summarize {
        #[command(flatten)]
        roll: RollArgs,
        #[command(flatten)]
        selection: SelectionArgs,
        #[command(flatten)]
        export: ExportArgs,
    },
    /// Show the raw units matching the selected codes
    Units {
        #[command(flatten)]
        roll: RollArgs,
        #[command(flatten)]
        selection: SelectionArgs,
        #[command(flatten)]
        export: ExportArgs,
        /// Maximum rows to print (exports are never truncated)
        #[arg(long, default_value = "50")]
        limit: usize,
    },
}

#[derive(Debug, Clone, Args)]
pub struct RollArgs {
    /// Territory name as listed by `territories`
    #[arg(long, required_unless_present = "file", conflicts_with = "file")]
    pub territory: Option<String>,

    /// Read the roll from a local XML or ZIP file instead of downloading it
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Catalog filter used to resolve --territory
    #[arg(long)]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct SelectionArgs {
    /// Classification codes to include, comma separated
    #[arg(long, value_delimiter = ',')]
    pub codes: Vec<String>,

    /// Include every code present in the roll
    #[arg(long, conflicts_with = "codes")]
    pub all_codes: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ExportArgs {
    /// Directory to export the table(s) into
    #[arg(long)]
    pub export: Option<String>,

    /// csv or tsv (overrides the settings file)
    #[arg(long)]
    pub format: Option<String>,

    /// Write a single ZIP archive instead of separate files
    #[arg(long)]
    pub bundle: bool,
}

impl SelectionArgs {
    pub fn selection(&self) -> CodeSelection {
        if self.all_codes {
            CodeSelection::All
        } else {
            CodeSelection::Codes(
                self.codes
                    .iter()
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect(),
            )
        }
    }
}

impl ExportArgs {
    pub fn format_or(&self, fallback: ExportFormat) -> Result<ExportFormat> {
        match &self.format {
            Some(format) => format.parse(),
            None => Ok(fallback),
        }
    }
}

pub fn parse_filter(filter: Option<&str>) -> Result<Option<TerritoryFilter>> {
    filter.map(str::parse).transpose()
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        if let Some(config) = &self.config {
            validation::validate_path("config", config)?;
        }

        let (roll, export) = match &self.command {
            Command::Territories { filter } => {
                parse_filter(filter.as_deref())?;
                return Ok(());
            }
            Command::Codes { roll } => (roll, None),
            Command::Summarize { roll, export, .. } | Command::Units { roll, export, .. } => {
                (roll, Some(export))
            }
        };

        parse_filter(roll.filter.as_deref())?;
        if let Some(territory) = &roll.territory {
            validation::validate_non_empty_string("territory", territory)?;
        }
        if let Some(export) = export {
            if let Some(dir) = &export.export {
                validation::validate_path("export", dir)?;
            }
            export.format_or(ExportFormat::default())?;
        }
        if roll.territory.is_none() && roll.file.is_none() {
            return Err(ExplorerError::ConfigError {
                message: "either --territory or --file is required".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_summarize_command() {
        let config = CliConfig::try_parse_from([
            "roll-explorer",
            "summarize",
            "--territory",
            "Laval",
            "--codes",
            "1000, 5812",
            "--export",
            "./out",
            "--format",
            "tsv",
        ])
        .unwrap();

        assert!(config.validate().is_ok());
        match config.command {
            Command::Summarize {
                roll,
                selection,
                export,
            } => {
                assert_eq!(roll.territory.as_deref(), Some("Laval"));
                assert_eq!(
                    selection.selection(),
                    CodeSelection::Codes(["1000".to_string(), "5812".to_string()].into())
                );
                assert_eq!(export.format_or(ExportFormat::Csv).unwrap(), ExportFormat::Tsv);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_territory_or_file_is_required() {
        assert!(CliConfig::try_parse_from(["roll-explorer", "codes"]).is_err());
        assert!(CliConfig::try_parse_from([
            "roll-explorer",
            "codes",
            "--territory",
            "Laval",
            "--file",
            "role.xml"
        ])
        .is_err());
    }

    #[test]
    fn test_all_codes_conflicts_with_codes() {
        assert!(CliConfig::try_parse_from([
            "roll-explorer",
            "units",
            "--file",
            "role.xml",
            "--all-codes",
            "--codes",
            "1000"
        ])
        .is_err());

        let config =
            CliConfig::try_parse_from(["roll-explorer", "units", "--file", "role.xml", "--all-codes"])
                .unwrap();
        match config.command {
            Command::Units { selection, limit, .. } => {
                assert_eq!(selection.selection(), CodeSelection::All);
                assert_eq!(limit, 50);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_invalid_filter_fails_validation() {
        let config =
            CliConfig::try_parse_from(["roll-explorer", "territories", "--filter", "nope"]).unwrap();
        assert!(config.validate().is_err());
    }
}
