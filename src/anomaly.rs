//! Anomaly detection
//!
//! Statistical (±z·σ plus absolute severe bounds) and multivariate
//! (isolation forest) layers, reported side by side.

use crate::config::{AnomalyConfig, SampleConfig};
use crate::error::ComputeError;
use crate::features::{FeatureDeriver, FeatureSet};
use crate::isolation::IsolationForest;
use crate::normalizer::values;
use crate::numeric::{mean, sample_std, Finite};
use crate::overview::percentage;
use crate::types::{AnomalyDetection, MultivariateAnomalies, NormalizedRow, Section};
use tracing::{debug, warn};

pub const ISOLATION_FOREST_METHOD: &str = "isolation_forest";

/// Detector for the anomaly section
pub struct AnomalyDetector<'a> {
    config: &'a AnomalyConfig,
    sample: &'a SampleConfig,
}

impl<'a> AnomalyDetector<'a> {
    pub fn new(config: &'a AnomalyConfig, sample: &'a SampleConfig) -> Self {
        Self { config, sample }
    }

    pub fn detect(&self, rows: &[NormalizedRow]) -> Section<AnomalyDetection> {
        let values = values(rows);
        if values.len() < self.sample.min_readings {
            return Section::InsufficientData;
        }
        let Some(avg) = mean(&values) else {
            return Section::InsufficientData;
        };
        let std = sample_std(&values);
        let high = avg + self.config.z_threshold * std;
        let low = avg - self.config.z_threshold * std;

        // exactly at the threshold is not an anomaly
        let anomalous: Vec<f64> = values
            .iter()
            .copied()
            .filter(|v| *v > high || *v < low)
            .collect();
        let severe_highs = values.iter().filter(|v| **v > self.config.severe_high).count();
        let severe_lows = values.iter().filter(|v| **v < self.config.severe_low).count();

        debug!(
            anomalies = anomalous.len(),
            severe_highs, severe_lows, "statistical anomaly scan"
        );

        Section::Available(AnomalyDetection {
            anomaly_count: anomalous.len(),
            anomaly_percentage: percentage(anomalous.len(), values.len()),
            severe_highs,
            severe_lows,
            anomaly_threshold_high: Finite::rounded(high, 1),
            anomaly_threshold_low: Finite::rounded(low, 1),
            anomalous_values: anomalous.iter().map(|v| Finite::rounded(*v, 1)).collect(),
            ml_anomaly_detection: self.multivariate_section(rows),
        })
    }

    fn multivariate_section(&self, rows: &[NormalizedRow]) -> Section<MultivariateAnomalies> {
        if rows.len() < self.sample.min_cluster_readings {
            return Section::InsufficientData;
        }
        match self.multivariate(rows) {
            Ok(result) => Section::Available(result),
            Err(e) => {
                warn!(error = %e, "multivariate anomaly detection unavailable");
                Section::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Isolation-forest pass over standardized contextual features
    pub fn multivariate(
        &self,
        rows: &[NormalizedRow],
    ) -> Result<MultivariateAnomalies, ComputeError> {
        let matrix = FeatureDeriver::derive_standardized(rows, FeatureSet::Contextual);
        let result = IsolationForest {
            n_trees: self.config.n_trees,
            max_samples: self.config.max_samples,
            contamination: self.config.contamination,
            seed: self.config.seed,
        }
        .fit_predict(&matrix.rows)?;

        let flagged: Vec<Finite> = result
            .flagged()
            .map(|i| Finite::rounded(rows[i].value, 1))
            .collect();

        Ok(MultivariateAnomalies {
            ml_anomaly_count: flagged.len(),
            ml_anomaly_percentage: percentage(flagged.len(), rows.len()),
            anomalous_glucose_values: flagged,
            anomaly_detection_method: ISOLATION_FOREST_METHOD.to_string(),
            score_threshold: Finite::rounded(result.threshold, 3),
        })
    }
}
