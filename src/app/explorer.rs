use crate::core::catalog::{find_territory, TerritoryDirectory, TerritoryFilter};
use crate::core::export::{file_stem, render_summary, render_units, Exporter};
use crate::core::extractor::RollExtractor;
use crate::core::fetch::read_document_file;
use crate::core::session::{CodeSelection, ExplorerSession};
use crate::core::{CatalogSource, DocumentSource, LoadedRoll, Storage, TerritoryRef};
use crate::utils::error::{ExplorerError, Result};
use std::path::Path;

/// Ties the directory, the document source and the session together. Each
/// method is one user action and runs to completion before returning.
pub struct RollExplorer<C: CatalogSource, D: DocumentSource> {
    directory: TerritoryDirectory<C>,
    documents: D,
    extractor: RollExtractor,
    session: ExplorerSession,
}

impl<C: CatalogSource, D: DocumentSource> RollExplorer<C, D> {
    pub fn new(directory: TerritoryDirectory<C>, documents: D, extractor: RollExtractor) -> Self {
        Self {
            directory,
            documents,
            extractor,
            session: ExplorerSession::new(),
        }
    }

    pub async fn territories(&self, filter: Option<&TerritoryFilter>) -> Result<Vec<TerritoryRef>> {
        self.directory.load(filter).await
    }

    /// Downloads and parses the roll of the territory called `name`.
    pub async fn open_territory(
        &mut self,
        name: &str,
        filter: Option<&TerritoryFilter>,
    ) -> Result<&LoadedRoll> {
        let territories = self.directory.load(filter).await?;
        let territory = find_territory(&territories, name).cloned().ok_or_else(|| {
            ExplorerError::processing(format!(
                "unknown territory '{}' ({} territories in catalog)",
                name,
                territories.len()
            ))
        })?;

        let xml = self.documents.fetch_document(&territory.document_url).await?;
        self.session.load(territory, &xml, &self.extractor)
    }

    /// Parses a roll from disk; the file stem stands in for the territory name.
    pub async fn open_file(&mut self, path: &Path) -> Result<&LoadedRoll> {
        let xml = read_document_file(path).await?;
        let territory = TerritoryRef {
            name: path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            document_url: path.display().to_string(),
        };
        self.session.load(territory, &xml, &self.extractor)
    }

    pub fn session(&self) -> &ExplorerSession {
        &self.session
    }

    /// Exports the summary together with the filtered units behind it, so a
    /// bundle holds both tables.
    pub async fn export_summary<S: Storage>(
        &self,
        exporter: &Exporter<S>,
        selection: &CodeSelection,
    ) -> Result<Vec<String>> {
        let report = self.session.summarize_selection(selection)?;
        let units = self.session.units_selection(selection)?;
        let tables = [
            render_summary(&report, exporter.format())?,
            render_units(&units, exporter.format())?,
        ];
        exporter.write(&self.export_stem()?, &tables).await
    }

    pub async fn export_units<S: Storage>(
        &self,
        exporter: &Exporter<S>,
        selection: &CodeSelection,
    ) -> Result<Vec<String>> {
        let units = self.session.units_selection(selection)?;
        let table = render_units(&units, exporter.format())?;
        exporter.write(&self.export_stem()?, &[table]).await
    }

    fn export_stem(&self) -> Result<String> {
        self.session
            .roll()
            .map(|roll| file_stem(&roll.territory.name))
            .ok_or_else(|| ExplorerError::processing("no assessment roll loaded"))
    }
}
