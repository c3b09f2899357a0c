//! Plain-text tables for the terminal.

use crate::domain::model::{AggregationReport, AssessmentUnitRecord, LoadedRoll, TerritoryRef};
use crate::utils::error::{ExplorerError, Result};

pub fn territories_table(territories: &[TerritoryRef]) -> String {
    let width = territories
        .iter()
        .map(|t| t.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("Territory".len());

    let mut out = format!("{:<width$}  Document\n", "Territory", width = width);
    for territory in territories {
        out.push_str(&format!(
            "{:<width$}  {}\n",
            territory.name,
            territory.document_url,
            width = width
        ));
    }
    out
}

/// Renders a directory load. A failed load still renders an empty table; the
/// error is handed back for reporting.
pub fn territories_listing(loaded: Result<Vec<TerritoryRef>>) -> (String, Option<ExplorerError>) {
    let (territories, failure) = match loaded {
        Ok(territories) => (territories, None),
        Err(e) => (Vec::new(), Some(e)),
    };
    let mut out = territories_table(&territories);
    out.push_str(&format!("{} territories\n", territories.len()));
    (out, failure)
}

pub fn roll_header(roll: &LoadedRoll) -> String {
    let years: std::collections::BTreeSet<&str> = roll
        .records
        .iter()
        .map(|r| r.roll_year.as_str())
        .filter(|y| !y.is_empty())
        .collect();
    let years: Vec<&str> = years.into_iter().collect();

    format!(
        "{} | roll year {} | {} units | loaded {}",
        roll.territory.name,
        if years.is_empty() {
            "n/a".to_string()
        } else {
            years.join(", ")
        },
        roll.records.len(),
        roll.loaded_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

pub fn summary_table(report: &AggregationReport) -> String {
    let mut out = format!(
        "{:<10} {:>8} {:>10} {:>16} {:>16}\n",
        "Code", "Units", "Dwellings", "Mean land", "Mean building"
    );
    for group in &report.groups {
        out.push_str(&format!(
            "{:<10} {:>8} {:>10} {:>16.2} {:>16.2}\n",
            group.code,
            group.unit_count,
            group.total_dwellings,
            group.mean_land_value,
            group.mean_building_value
        ));
    }
    out.push_str(&format!(
        "{:<10} {:>8} {:>10}\n",
        "TOTAL", report.total_units, report.total_dwellings
    ));
    out
}

pub fn units_table(units: &[&AssessmentUnitRecord], limit: usize) -> String {
    let mut out = format!(
        "{:<10} {:>10} {:>16} {:>16} {:>6}\n",
        "Code", "Dwellings", "Land", "Building", "Year"
    );
    for unit in units.iter().take(limit) {
        out.push_str(&format!(
            "{:<10} {:>10} {:>16.2} {:>16.2} {:>6}\n",
            unit.classification_code,
            unit.dwelling_count,
            unit.land_value,
            unit.building_value,
            unit.roll_year
        ));
    }
    if units.len() > limit {
        out.push_str(&format!("... {} more rows\n", units.len() - limit));
    }
    out
}
