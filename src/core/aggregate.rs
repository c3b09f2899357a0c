use crate::domain::model::{AggregationReport, AssessmentUnitRecord, ClassificationSummary};
use crate::utils::error::{ExplorerError, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Distinct classification codes, sorted. This is the "select all" set.
pub fn available_codes(records: &[AssessmentUnitRecord]) -> BTreeSet<String> {
    records
        .iter()
        .map(|r| r.classification_code.clone())
        .collect()
}

/// Records whose code is in `selection`, in document order.
pub fn filter_records<'a>(
    records: &'a [AssessmentUnitRecord],
    selection: &BTreeSet<String>,
) -> Vec<&'a AssessmentUnitRecord> {
    records
        .iter()
        .filter(|r| selection.contains(&r.classification_code))
        .collect()
}

/// Mean over strictly positive observations only.
#[derive(Debug, Default)]
struct PositiveMean {
    sum: f64,
    count: u64,
}

impl PositiveMean {
    fn push(&mut self, value: f64) {
        if value > 0.0 {
            self.sum += value;
            self.count += 1;
        }
    }

    fn value(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

#[derive(Debug, Default)]
struct Bucket {
    units: u64,
    dwellings: u64,
    land: PositiveMean,
    building: PositiveMean,
}

/// Groups the selected records by classification code.
///
/// An empty selection yields [`ExplorerError::EmptySelection`] so the caller
/// can prompt for codes instead of showing an all-zero table.
pub fn aggregate(
    records: &[AssessmentUnitRecord],
    selection: &BTreeSet<String>,
) -> Result<AggregationReport> {
    if selection.is_empty() {
        return Err(ExplorerError::EmptySelection);
    }

    let mut buckets: BTreeMap<&str, Bucket> = BTreeMap::new();
    for record in filter_records(records, selection) {
        let bucket = buckets.entry(record.classification_code.as_str()).or_default();
        bucket.units += 1;
        bucket.dwellings += record.dwelling_count;
        bucket.land.push(record.land_value);
        bucket.building.push(record.building_value);
    }

    let groups: Vec<ClassificationSummary> = buckets
        .into_iter()
        .map(|(code, bucket)| ClassificationSummary {
            code: code.to_string(),
            unit_count: bucket.units,
            total_dwellings: bucket.dwellings,
            mean_land_value: bucket.land.value(),
            mean_building_value: bucket.building.value(),
        })
        .collect();

    let report = AggregationReport {
        total_units: groups.iter().map(|g| g.unit_count).sum(),
        total_dwellings: groups.iter().map(|g| g.total_dwellings).sum(),
        groups,
    };

    tracing::debug!(
        "Aggregated {} units into {} groups",
        report.total_units,
        report.groups.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: &str, dwellings: u64, land: f64, building: f64) -> AssessmentUnitRecord {
        AssessmentUnitRecord {
            classification_code: code.to_string(),
            dwelling_count: dwellings,
            land_value: land,
            building_value: building,
            roll_year: "2024".to_string(),
        }
    }

    fn select(codes: &[&str]) -> BTreeSet<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_groups_count_units_and_dwellings() {
        let records = vec![record("1000", 2, 0.0, 0.0), record("1000", 3, 0.0, 0.0)];

        let report = aggregate(&records, &select(&["1000"])).unwrap();

        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].code, "1000");
        assert_eq!(report.groups[0].unit_count, 2);
        assert_eq!(report.groups[0].total_dwellings, 5);
        assert_eq!(report.total_units, 2);
        assert_eq!(report.total_dwellings, 5);
    }

    #[test]
    fn test_mean_excludes_zero_values() {
        let records = vec![
            record("1000", 1, 0.0, 50.0),
            record("1000", 1, 100.0, 0.0),
            record("1000", 1, 200.0, 0.0),
        ];

        let report = aggregate(&records, &select(&["1000"])).unwrap();

        assert_eq!(report.groups[0].mean_land_value, 150.0);
        assert_eq!(report.groups[0].mean_building_value, 50.0);
    }

    #[test]
    fn test_group_without_positive_values_reports_zero_mean() {
        let records = vec![record("4500", 0, 0.0, 0.0)];
        let report = aggregate(&records, &select(&["4500"])).unwrap();
        assert_eq!(report.groups[0].mean_land_value, 0.0);
    }

    #[test]
    fn test_empty_selection_asks_for_codes() {
        let records = vec![record("1000", 2, 10.0, 10.0)];
        let err = aggregate(&records, &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, ExplorerError::EmptySelection));
    }

    #[test]
    fn test_selection_filters_and_orders_groups() {
        let records = vec![
            record("5000", 0, 10.0, 10.0),
            record("1000", 1, 10.0, 10.0),
            record("2000", 4, 10.0, 10.0),
            record("1000", 1, 30.0, 10.0),
        ];

        let report = aggregate(&records, &select(&["5000", "1000", "9999"])).unwrap();

        let codes: Vec<&str> = report.groups.iter().map(|g| g.code.as_str()).collect();
        assert_eq!(codes, vec!["1000", "5000"]);
        assert_eq!(report.total_units, 3);
        assert_eq!(report.total_dwellings, 2);
        assert_eq!(report.groups[0].mean_land_value, 20.0);
    }

    #[test]
    fn test_every_selected_record_lands_in_one_bucket() {
        let records: Vec<_> = (0..50)
            .map(|i| record(&format!("{}", 1000 + (i % 7) * 100), i % 3, i as f64, 0.0))
            .collect();
        let selection = available_codes(&records);

        let report = aggregate(&records, &selection).unwrap();

        assert_eq!(report.total_units, records.len() as u64);
        assert_eq!(report.groups.len(), selection.len());
        assert_eq!(
            report.total_dwellings,
            records.iter().map(|r| r.dwelling_count).sum::<u64>()
        );
    }

    #[test]
    fn test_filter_records_keeps_document_order() {
        let records = vec![
            record("2000", 1, 1.0, 1.0),
            record("1000", 2, 1.0, 1.0),
            record("2000", 3, 1.0, 1.0),
        ];

        let filtered = filter_records(&records, &select(&["2000"]));

        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].dwelling_count, 1);
        assert_eq!(filtered[1].dwelling_count, 3);
    }
}
