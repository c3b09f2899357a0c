use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExplorerError {
    #[error("Source unavailable: {message}")]
    SourceUnavailable { message: String },

    #[error("Schema mismatch: expected columns {expected:?}, available columns {available:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        available: Vec<String>,
    },

    #[error("Malformed document: {message}")]
    MalformedDocument { message: String },

    #[error("No classification code selected")]
    EmptySelection,

    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for '{field}': '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Schema,
    Document,
    Selection,
    Io,
    Configuration,
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ExplorerError {
    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedDocument {
            message: message.into(),
        }
    }

    pub fn processing(message: impl Into<String>) -> Self {
        Self::ProcessingError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SourceUnavailable { .. } => ErrorCategory::Network,
            Self::SchemaMismatch { .. } => ErrorCategory::Schema,
            Self::MalformedDocument { .. } | Self::ZipError(_) => ErrorCategory::Document,
            Self::EmptySelection => ErrorCategory::Selection,
            Self::IoError(_) | Self::CsvError(_) => ErrorCategory::Io,
            Self::ConfigError { .. } | Self::InvalidConfigValueError { .. } => {
                ErrorCategory::Configuration
            }
            Self::ProcessingError { .. } => ErrorCategory::Processing,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Selection => ErrorSeverity::Low,
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Schema | ErrorCategory::Document | ErrorCategory::Processing => {
                ErrorSeverity::High
            }
            ErrorCategory::Io | ErrorCategory::Configuration => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            Self::SourceUnavailable { .. } => {
                "Check your network connection and run the command again".to_string()
            }
            Self::SchemaMismatch { available, .. } => format!(
                "Point catalog.name_column / catalog.url_column at one of: {}",
                available.join(", ")
            ),
            Self::MalformedDocument { .. } | Self::ZipError(_) => {
                "The downloaded roll is not valid XML; try another territory or a local copy with --file".to_string()
            }
            Self::EmptySelection => {
                "Pass --codes with at least one classification code, or --all-codes".to_string()
            }
            Self::ConfigError { .. } | Self::InvalidConfigValueError { .. } => {
                "Fix the configuration file or command-line arguments".to_string()
            }
            Self::IoError(_) | Self::CsvError(_) => {
                "Check that the output directory exists and is writable".to_string()
            }
            Self::ProcessingError { .. } => "Run again with --verbose for details".to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::SourceUnavailable { message } => {
                format!("Could not reach the data source: {}", message)
            }
            Self::SchemaMismatch { expected, available } => format!(
                "The catalog does not have the expected columns ({}). Available columns: {}",
                expected.join(", "),
                available.join(", ")
            ),
            Self::MalformedDocument { message } => {
                format!("The assessment roll could not be read: {}", message)
            }
            Self::EmptySelection => "Please select at least one classification code".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExplorerError>;
