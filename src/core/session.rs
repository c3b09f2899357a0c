use crate::core::aggregate;
use crate::core::extractor::RollExtractor;
use crate::domain::model::{AggregationReport, AssessmentUnitRecord, LoadedRoll, TerritoryRef};
use crate::utils::error::{ExplorerError, Result};
use chrono::Utc;
use std::collections::BTreeSet;

/// Codes picked by the user; `All` is the "select all" choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeSelection {
    All,
    Codes(BTreeSet<String>),
}

/// Per-user exploration state. Each load replaces the previous roll.
#[derive(Debug, Default)]
pub struct ExplorerSession {
    roll: Option<LoadedRoll>,
}

impl ExplorerSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `xml` and makes it the session's roll. On failure the previous
    /// roll is kept.
    pub fn load(
        &mut self,
        territory: TerritoryRef,
        xml: &[u8],
        extractor: &RollExtractor,
    ) -> Result<&LoadedRoll> {
        let records = extractor.extract(xml)?;
        tracing::info!(
            "🏘️ {}: {} assessment units loaded",
            territory.name,
            records.len()
        );

        Ok(&*self.roll.insert(LoadedRoll {
            territory,
            records,
            loaded_at: Utc::now(),
        }))
    }

    pub fn roll(&self) -> Option<&LoadedRoll> {
        self.roll.as_ref()
    }

    pub fn available_codes(&self) -> Result<BTreeSet<String>> {
        Ok(aggregate::available_codes(&self.loaded()?.records))
    }

    /// Expands `All` to the codes present in the loaded roll.
    pub fn resolve(&self, selection: &CodeSelection) -> Result<BTreeSet<String>> {
        match selection {
            CodeSelection::All => self.available_codes(),
            CodeSelection::Codes(codes) => Ok(codes.clone()),
        }
    }

    pub fn summarize(&self, selection: &BTreeSet<String>) -> Result<AggregationReport> {
        aggregate::aggregate(&self.loaded()?.records, selection)
    }

    /// The raw filtered table. Shares the empty-selection guard with
    /// [`ExplorerSession::summarize`].
    pub fn units(&self, selection: &BTreeSet<String>) -> Result<Vec<&AssessmentUnitRecord>> {
        let roll = self.loaded()?;
        if selection.is_empty() {
            return Err(ExplorerError::EmptySelection);
        }
        Ok(aggregate::filter_records(&roll.records, selection))
    }

    /// Like [`ExplorerSession::summarize`], but `All` on a roll without units
    /// yields an empty report instead of asking for a selection.
    pub fn summarize_selection(&self, selection: &CodeSelection) -> Result<AggregationReport> {
        if self.selects_from_empty_roll(selection)? {
            return Ok(AggregationReport {
                total_units: 0,
                total_dwellings: 0,
                groups: Vec::new(),
            });
        }
        self.summarize(&self.resolve(selection)?)
    }

    pub fn units_selection(&self, selection: &CodeSelection) -> Result<Vec<&AssessmentUnitRecord>> {
        if self.selects_from_empty_roll(selection)? {
            return Ok(Vec::new());
        }
        self.units(&self.resolve(selection)?)
    }

    fn selects_from_empty_roll(&self, selection: &CodeSelection) -> Result<bool> {
        let roll = self.loaded()?;
        Ok(*selection == CodeSelection::All && roll.records.is_empty())
    }

    fn loaded(&self) -> Result<&LoadedRoll> {
        self.roll
            .as_ref()
            .ok_or_else(|| ExplorerError::processing("no assessment roll loaded"))
    }
}
