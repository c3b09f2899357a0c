use crate::core::Storage;
use crate::domain::model::{AggregationReport, AssessmentUnitRecord};
use crate::utils::error::{ExplorerError, Result};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Write};
use std::str::FromStr;
use zip::write::{SimpleFileOptions, ZipWriter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Tsv,
}

impl ExportFormat {
    pub fn delimiter(self) -> u8 {
        match self {
            ExportFormat::Csv => b',',
            ExportFormat::Tsv => b'\t',
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExplorerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "tsv" => Ok(ExportFormat::Tsv),
            other => Err(ExplorerError::InvalidConfigValueError {
                field: "export.format".to_string(),
                value: other.to_string(),
                reason: "Unsupported format. Valid formats: csv, tsv".to_string(),
            }),
        }
    }
}

/// A table serialized to delimited text, ready to be written.
#[derive(Debug, Clone)]
pub struct RenderedTable {
    pub name: &'static str,
    pub bytes: Vec<u8>,
}

pub fn render_summary(report: &AggregationReport, format: ExportFormat) -> Result<RenderedTable> {
    let bytes = render_rows(report.groups.iter(), format)?;
    Ok(RenderedTable {
        name: "summary",
        bytes,
    })
}

pub fn render_units(units: &[&AssessmentUnitRecord], format: ExportFormat) -> Result<RenderedTable> {
    let bytes = render_rows(units.iter(), format)?;
    Ok(RenderedTable {
        name: "units",
        bytes,
    })
}

fn render_rows<T: Serialize>(rows: impl Iterator<Item = T>, format: ExportFormat) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(format.delimiter())
        .from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| ExplorerError::IoError(e.into_error()))
}

/// File-name stem for a territory: lowercase, runs of non-alphanumerics become `_`.
pub fn file_stem(territory: &str) -> String {
    let mut stem = String::with_capacity(territory.len());
    for c in territory.trim().chars() {
        if c.is_alphanumeric() {
            stem.extend(c.to_lowercase());
        } else if !stem.ends_with('_') {
            stem.push('_');
        }
    }
    let stem = stem.trim_matches('_');
    if stem.is_empty() {
        "roll".to_string()
    } else {
        stem.to_string()
    }
}

pub struct Exporter<S: Storage> {
    storage: S,
    format: ExportFormat,
    bundle: bool,
}

impl<S: Storage> Exporter<S> {
    pub fn new(storage: S, format: ExportFormat, bundle: bool) -> Self {
        Self {
            storage,
            format,
            bundle,
        }
    }

    pub fn format(&self) -> ExportFormat {
        self.format
    }

    /// Writes `tables` as `<stem>_<name>.<ext>` files, or as one `<stem>.zip`
    /// when bundling. Returns the written paths relative to the storage root.
    pub async fn write(&self, stem: &str, tables: &[RenderedTable]) -> Result<Vec<String>> {
        let entry_name = |table: &RenderedTable| {
            format!("{}_{}.{}", stem, table.name, self.format.extension())
        };

        if !self.bundle {
            let mut written = Vec::with_capacity(tables.len());
            for table in tables {
                let path = entry_name(table);
                tracing::debug!("Writing {} ({} bytes)", path, table.bytes.len());
                self.storage.write_file(&path, &table.bytes).await?;
                written.push(path);
            }
            return Ok(written);
        }

        // 打包成單一 ZIP
        let zip_data = {
            let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
            for table in tables {
                zip.start_file(entry_name(table), SimpleFileOptions::default())?;
                zip.write_all(&table.bytes)?;
            }
            zip.finish()?.into_inner()
        };

        let path = format!("{}.zip", stem);
        tracing::debug!("Writing ZIP file {} ({} bytes)", path, zip_data.len());
        self.storage.write_file(&path, &zip_data).await?;
        Ok(vec![path])
    }
}
