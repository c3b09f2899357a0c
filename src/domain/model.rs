use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of the territory directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerritoryRef {
    pub name: String,
    pub document_url: String,
}

/// One assessable property unit read from a roll document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentUnitRecord {
    pub classification_code: String,
    pub dwelling_count: u64,
    pub land_value: f64,
    pub building_value: f64,
    pub roll_year: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationSummary {
    pub code: String,
    pub unit_count: u64,
    pub total_dwellings: u64,
    pub mean_land_value: f64,
    pub mean_building_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationReport {
    pub total_units: u64,
    pub total_dwellings: u64,
    /// Ordered by code.
    pub groups: Vec<ClassificationSummary>,
}

/// The roll currently loaded in a session.
#[derive(Debug, Clone)]
pub struct LoadedRoll {
    pub territory: TerritoryRef,
    pub records: Vec<AssessmentUnitRecord>,
    pub loaded_at: DateTime<Utc>,
}
