//! Overview aggregation
//!
//! Central tendency, dispersion and target-range classification over the
//! full row table.

use crate::normalizer::values;
use crate::numeric::{mean, sample_std, Finite};
use crate::schema::TargetRange;
use crate::types::{NormalizedRow, Overview, SectionStatus};

/// Aggregator for the overview section
pub struct OverviewAggregator;

impl OverviewAggregator {
    pub fn aggregate(rows: &[NormalizedRow], target: &TargetRange) -> Overview {
        let values = values(rows);
        let Some(avg) = mean(&values) else {
            return Overview::empty(SectionStatus::InsufficientData);
        };

        let std = sample_std(&values);
        let cv = if avg > 0.0 { std / avg * 100.0 } else { 0.0 };
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let total = values.len();
        let in_range = values.iter().filter(|v| target.contains(**v)).count();
        let below = values.iter().filter(|v| **v < target.min).count();
        let above = total - in_range - below;

        Overview {
            status: SectionStatus::Available,
            total_readings: total,
            average_glucose: Finite::rounded(avg, 1),
            min_glucose: Finite::rounded(min, 1),
            max_glucose: Finite::rounded(max, 1),
            glucose_variability: Finite::rounded(std, 1),
            coefficient_variation: Finite::rounded(cv, 1),
            time_in_range: percentage(in_range, total),
            time_below_range: percentage(below, total),
            time_above_range: percentage(above, total),
            readings_in_range: in_range,
            readings_below_range: below,
            readings_above_range: above,
        }
    }
}

/// `count / total` as a percentage rounded to one decimal
pub fn percentage(count: usize, total: usize) -> Finite {
    if total == 0 {
        return Finite::ZERO;
    }
    Finite::rounded(count as f64 / total as f64 * 100.0, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::Normalizer;
    use crate::schema::Reading;
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn rows(values: &[f64]) -> Vec<NormalizedRow> {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 6, 0, 0).unwrap();
        let readings: Vec<Reading> = values
            .iter()
            .enumerate()
            .map(|(i, v)| Reading::new(*v, start + Duration::hours(i as i64)))
            .collect();
        Normalizer::normalize(&readings)
    }

    #[test]
    fn test_basic_overview() {
        let overview = OverviewAggregator::aggregate(
            &rows(&[90.0, 95.0, 100.0, 105.0]),
            &TargetRange::default(),
        );

        assert_eq!(overview.status, SectionStatus::Available);
        assert_eq!(overview.total_readings, 4);
        assert_eq!(overview.average_glucose.get(), 97.5);
        assert_eq!(overview.min_glucose.get(), 90.0);
        assert_eq!(overview.max_glucose.get(), 105.0);
        assert_eq!(overview.glucose_variability.get(), 6.5);
        assert_eq!(overview.time_in_range.get(), 100.0);
        assert_eq!(overview.readings_in_range, 4);
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let overview = OverviewAggregator::aggregate(
            &rows(&[80.0, 180.0, 79.0, 181.0, 120.0, 60.0]),
            &TargetRange::new(80.0, 180.0),
        );

        let target = TargetRange::new(80.0, 180.0);
        assert!(target.contains(80.0) && target.contains(180.0));
        assert!(!target.contains(79.0) && !target.contains(181.0));
        assert_eq!(overview.readings_in_range, 3);
        assert_eq!(overview.readings_below_range, 2);
        assert_eq!(overview.readings_above_range, 1);
        assert_eq!(overview.time_in_range.get(), 50.0);
        assert_eq!(overview.time_below_range.get(), 33.3);
        assert_eq!(overview.time_above_range.get(), 16.7);
    }

    #[test]
    fn test_counts_and_percentages_sum() {
        let overview = OverviewAggregator::aggregate(
            &rows(&[55.0, 70.0, 99.0, 150.0, 210.0, 260.0, 320.0]),
            &TargetRange::new(70.0, 180.0),
        );

        assert_eq!(
            overview.readings_in_range + overview.readings_below_range + overview.readings_above_range,
            overview.total_readings
        );
        let sum = overview.time_in_range.get()
            + overview.time_below_range.get()
            + overview.time_above_range.get();
        assert!((sum - 100.0).abs() <= 0.15);
    }

    #[test]
    fn test_constant_series_has_zero_variability() {
        let overview =
            OverviewAggregator::aggregate(&rows(&[110.0; 5]), &TargetRange::default());

        assert_eq!(overview.glucose_variability, Finite::ZERO);
        assert_eq!(overview.coefficient_variation, Finite::ZERO);
    }

    #[test]
    fn test_empty_rows() {
        let overview = OverviewAggregator::aggregate(&[], &TargetRange::default());
        assert_eq!(overview, Overview::empty(SectionStatus::InsufficientData));
    }
}
