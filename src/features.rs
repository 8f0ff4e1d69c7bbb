//! Feature derivation
//!
//! This module builds numeric feature matrices from normalized rows for the
//! clustering and multivariate anomaly stages:
//! - Behavioral features (glucose, time, carbs, exercise, stress, sleep)
//! - Contextual features (glucose, time, reading context, carbs, exercise, stress)
//! - Per-call z-score standardization
//!
//! Scaling parameters are computed from the current batch only and never
//! outlive the call.

use crate::numeric::{mean, population_std};
use crate::types::NormalizedRow;

/// Which feature vector to build per row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureSet {
    /// Clustering features
    Behavioral,
    /// Isolation-forest features
    Contextual,
}

impl FeatureSet {
    pub fn names(&self) -> &'static [&'static str] {
        match self {
            FeatureSet::Behavioral => &[
                "glucose",
                "hour",
                "day_of_week",
                "carbs",
                "exercise",
                "stress",
                "sleep",
            ],
            FeatureSet::Contextual => &[
                "glucose",
                "hour",
                "day_of_week",
                "context",
                "carbs",
                "exercise",
                "stress",
            ],
        }
    }

    fn vector(&self, row: &NormalizedRow) -> Vec<f64> {
        let hour = f64::from(row.hour);
        let day = f64::from(row.day_of_week);
        match self {
            FeatureSet::Behavioral => vec![
                row.value,
                hour,
                day,
                row.carbs(),
                row.exercise(),
                row.stress(),
                row.sleep(),
            ],
            FeatureSet::Contextual => vec![
                row.value,
                hour,
                day,
                row.context_code(),
                row.carbs(),
                row.exercise(),
                row.stress(),
            ],
        }
    }
}

/// Row-major feature matrix
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub rows: Vec<Vec<f64>>,
    pub n_features: usize,
}

/// Feature deriver for building standardized matrices
pub struct FeatureDeriver;

impl FeatureDeriver {
    /// Raw feature matrix for `rows`
    pub fn derive(rows: &[NormalizedRow], set: FeatureSet) -> FeatureMatrix {
        FeatureMatrix {
            rows: rows.iter().map(|row| set.vector(row)).collect(),
            n_features: set.names().len(),
        }
    }

    /// Standardized feature matrix for `rows`
    pub fn derive_standardized(rows: &[NormalizedRow], set: FeatureSet) -> FeatureMatrix {
        let mut matrix = Self::derive(rows, set);
        standardize(&mut matrix);
        matrix
    }
}

/// Z-score each column in place. Zero-variance columns become all zeros.
pub fn standardize(matrix: &mut FeatureMatrix) {
    for col in 0..matrix.n_features {
        let column: Vec<f64> = matrix.rows.iter().map(|r| r[col]).collect();
        let Some(m) = mean(&column) else {
            return;
        };
        let std = population_std(&column);

        for row in matrix.rows.iter_mut() {
            row[col] = if std > 0.0 { (row[col] - m) / std } else { 0.0 };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::Normalizer;
    use crate::schema::{Reading, ReadingContext};
    use chrono::{Duration, TimeZone, Utc};

    fn make_rows() -> Vec<NormalizedRow> {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 6, 0, 0).unwrap();
        let readings: Vec<Reading> = [100.0, 120.0, 140.0, 160.0]
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut r = Reading::new(*v, start + Duration::hours(2 * i as i64))
                    .with_context(ReadingContext::AfterMeal);
                r.carbs_grams = Some(30);
                r
            })
            .collect();
        Normalizer::normalize(&readings)
    }

    #[test]
    fn test_absent_optionals_are_zero() {
        let rows = make_rows();
        let matrix = FeatureDeriver::derive(&rows, FeatureSet::Behavioral);

        assert_eq!(matrix.n_features, 7);
        assert_eq!(matrix.rows[0], vec![100.0, 6.0, 0.0, 30.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_contextual_includes_context_code() {
        let rows = make_rows();
        let matrix = FeatureDeriver::derive(&rows, FeatureSet::Contextual);
        assert_eq!(matrix.rows[1][3], 2.0);
    }

    #[test]
    fn test_standardize() {
        let rows = make_rows();
        let matrix = FeatureDeriver::derive_standardized(&rows, FeatureSet::Behavioral);

        // glucose column has zero mean and unit population variance
        let glucose: Vec<f64> = matrix.rows.iter().map(|r| r[0]).collect();
        let m: f64 = glucose.iter().sum::<f64>() / 4.0;
        let var: f64 = glucose.iter().map(|v| (v - m).powi(2)).sum::<f64>() / 4.0;
        assert!(m.abs() < 1e-9);
        assert!((var - 1.0).abs() < 1e-9);

        // constant carbs column maps to zero
        assert!(matrix.rows.iter().all(|r| r[3] == 0.0));
        assert!(matrix.rows.iter().flatten().all(|v| v.is_finite()));
    }
}
