pub mod aggregate;
pub mod catalog;
pub mod export;
pub mod extractor;
pub mod fetch;
pub mod session;

pub use crate::domain::model::{
    AggregationReport, AssessmentUnitRecord, ClassificationSummary, LoadedRoll, TerritoryRef,
};
pub use crate::domain::ports::{CatalogPage, CatalogSource, DocumentSource, Storage};
pub use crate::utils::error::Result;
