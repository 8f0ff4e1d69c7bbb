//! Analysis configuration
//!
//! Every threshold the engine uses is a heuristic, not a clinical standard, so
//! all of them live here. Defaults are expressed in mg/dL; [`AnalysisConfig::for_unit`]
//! rescales the glucose-valued thresholds for mmol/L callers.

use crate::schema::GlucoseUnit;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// mg/dL per mmol/L
pub const MGDL_PER_MMOL: f64 = 18.0;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Sample-size gates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleConfig {
    /// Minimum readings for any statistical section
    pub min_readings: usize,
    /// Minimum readings for a regression fit
    pub min_trend_readings: usize,
    /// Minimum readings for clustering and multivariate outlier detection
    pub min_cluster_readings: usize,
    /// Ingestion cap; older readings beyond it are dropped by the adapter
    pub max_readings: usize,
}

/// Trend classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendConfig {
    /// |slope| below this (per reading index) is stable
    pub stable_slope: f64,
    pub strong_r_squared: f64,
    pub moderate_r_squared: f64,
    /// Number of most recent readings compared against the rest
    pub recent_window: usize,
    pub forecast_steps: usize,
}

/// K-means behavioral clustering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    pub max_clusters: usize,
    /// k = min(max_clusters, n / readings_per_cluster)
    pub readings_per_cluster: usize,
    pub max_iterations: usize,
    /// Independent k-means++ restarts; lowest inertia wins
    pub n_init: usize,
    pub seed: u64,
    /// Cluster mean above this is described as elevated
    pub elevated_glucose: f64,
    /// Cluster mean above this (and not elevated) is described as optimal
    pub optimal_glucose: f64,
}

/// Statistical and multivariate anomaly detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyConfig {
    /// Standard deviations from the mean beyond which a reading is flagged
    pub z_threshold: f64,
    pub severe_high: f64,
    pub severe_low: f64,
    /// Expected outlier fraction for the isolation forest
    pub contamination: f64,
    pub n_trees: usize,
    pub max_samples: usize,
    pub seed: u64,
}

/// Episode axis: count readings past `threshold`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeAxisConfig {
    pub threshold: f64,
    /// Share of readings (%) past the threshold that makes the axis high
    pub high_percentage: f64,
}

/// Risk scoring weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub cv_high: f64,
    pub cv_moderate: f64,
    pub hypoglycemia: EpisodeAxisConfig,
    pub hyperglycemia: EpisodeAxisConfig,
    pub high_weight: u32,
    pub moderate_weight: u32,
    /// Time-in-range (%) below which `tir_critical_points` are added
    pub tir_critical: f64,
    pub tir_critical_points: u32,
    /// Time-in-range (%) below which `tir_low_points` are added
    pub tir_low: f64,
    pub tir_low_points: u32,
    pub high_score: u32,
    pub moderate_score: u32,
}

/// Recommendation rule thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    pub high_average: f64,
    pub low_average: f64,
    pub variability_cv: f64,
    pub low_time_in_range: f64,
    pub anomaly_percentage: f64,
}

/// Contextual impact analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    pub dawn_start_hour: u32,
    pub dawn_end_hour: u32,
    pub night_start_hour: u32,
    pub night_end_hour: u32,
    /// Morning mean must exceed night mean by more than this
    pub dawn_rise: f64,
    /// Minimum readings in the exposed group for exercise/medication impact
    pub min_impact_readings: usize,
}

/// Main analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub unit: GlucoseUnit,
    pub sample: SampleConfig,
    pub trend: TrendConfig,
    pub clustering: ClusteringConfig,
    pub anomaly: AnomalyConfig,
    pub risk: RiskConfig,
    pub recommendations: RecommendationConfig,
    pub context: ContextConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            unit: GlucoseUnit::MgDl,
            sample: SampleConfig {
                min_readings: 4,
                min_trend_readings: 3,
                min_cluster_readings: 10,
                max_readings: 1000,
            },
            trend: TrendConfig {
                stable_slope: 0.5,
                strong_r_squared: 0.7,
                moderate_r_squared: 0.4,
                recent_window: 7,
                forecast_steps: 3,
            },
            clustering: ClusteringConfig {
                max_clusters: 3,
                readings_per_cluster: 4,
                max_iterations: 300,
                n_init: 10,
                seed: 42,
                elevated_glucose: 150.0,
                optimal_glucose: 80.0,
            },
            anomaly: AnomalyConfig {
                z_threshold: 2.0,
                severe_high: 300.0,
                severe_low: 50.0,
                contamination: 0.1,
                n_trees: 100,
                max_samples: 256,
                seed: 42,
            },
            risk: RiskConfig {
                cv_high: 36.0,
                cv_moderate: 24.0,
                hypoglycemia: EpisodeAxisConfig {
                    threshold: 70.0,
                    high_percentage: 4.0,
                },
                hyperglycemia: EpisodeAxisConfig {
                    threshold: 250.0,
                    high_percentage: 10.0,
                },
                high_weight: 3,
                moderate_weight: 1,
                tir_critical: 50.0,
                tir_critical_points: 2,
                tir_low: 70.0,
                tir_low_points: 1,
                high_score: 6,
                moderate_score: 3,
            },
            recommendations: RecommendationConfig {
                high_average: 180.0,
                low_average: 70.0,
                variability_cv: 30.0,
                low_time_in_range: 70.0,
                anomaly_percentage: 10.0,
            },
            context: ContextConfig {
                dawn_start_hour: 6,
                dawn_end_hour: 9,
                night_start_hour: 22,
                night_end_hour: 23,
                dawn_rise: 20.0,
                min_impact_readings: 3,
            },
        }
    }
}

impl AnalysisConfig {
    /// Defaults with glucose-valued thresholds expressed in `unit`
    pub fn for_unit(unit: GlucoseUnit) -> Self {
        let mut config = Self::default();
        if unit == GlucoseUnit::MmolL {
            config.scale_glucose_thresholds(1.0 / MGDL_PER_MMOL);
        }
        config.unit = unit;
        config
    }

    fn scale_glucose_thresholds(&mut self, factor: f64) {
        self.clustering.elevated_glucose *= factor;
        self.clustering.optimal_glucose *= factor;
        self.anomaly.severe_high *= factor;
        self.anomaly.severe_low *= factor;
        self.risk.hypoglycemia.threshold *= factor;
        self.risk.hyperglycemia.threshold *= factor;
        self.recommendations.high_average *= factor;
        self.recommendations.low_average *= factor;
        self.context.dawn_rise *= factor;
    }

    /// Load configuration from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Apply `GLUCO_*` environment overrides on top of `self`
    pub fn with_environment_overrides(mut self) -> Result<Self, ConfigError> {
        override_from_env("GLUCO_MIN_READINGS", &mut self.sample.min_readings)?;
        override_from_env("GLUCO_MAX_READINGS", &mut self.sample.max_readings)?;
        override_from_env("GLUCO_STABLE_SLOPE", &mut self.trend.stable_slope)?;
        override_from_env("GLUCO_CLUSTER_SEED", &mut self.clustering.seed)?;
        override_from_env("GLUCO_Z_THRESHOLD", &mut self.anomaly.z_threshold)?;
        override_from_env("GLUCO_SEVERE_HIGH", &mut self.anomaly.severe_high)?;
        override_from_env("GLUCO_SEVERE_LOW", &mut self.anomaly.severe_low)?;
        override_from_env("GLUCO_CONTAMINATION", &mut self.anomaly.contamination)?;
        override_from_env("GLUCO_FOREST_SEED", &mut self.anomaly.seed)?;
        override_from_env(
            "GLUCO_HYPO_THRESHOLD",
            &mut self.risk.hypoglycemia.threshold,
        )?;
        override_from_env(
            "GLUCO_HYPER_THRESHOLD",
            &mut self.risk.hyperglycemia.threshold,
        )?;

        self.validate()?;
        Ok(self)
    }

    /// Load configuration from environment variables with fallback to defaults
    pub fn from_environment() -> Result<Self, ConfigError> {
        Self::default().with_environment_overrides()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample.min_readings == 0 {
            return Err(ConfigError::ValidationFailed(
                "min_readings must be > 0".into(),
            ));
        }
        if self.sample.min_trend_readings < 2 {
            return Err(ConfigError::ValidationFailed(
                "min_trend_readings must be >= 2".into(),
            ));
        }
        if self.sample.min_cluster_readings < self.sample.min_readings {
            return Err(ConfigError::ValidationFailed(
                "min_cluster_readings must be >= min_readings".into(),
            ));
        }
        if self.sample.max_readings < self.sample.min_readings {
            return Err(ConfigError::ValidationFailed(
                "max_readings must be >= min_readings".into(),
            ));
        }

        if self.trend.stable_slope < 0.0 {
            return Err(ConfigError::ValidationFailed(
                "stable_slope must be >= 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.trend.strong_r_squared)
            || !(0.0..=1.0).contains(&self.trend.moderate_r_squared)
        {
            return Err(ConfigError::ValidationFailed(
                "r_squared thresholds must be between 0 and 1".into(),
            ));
        }
        if self.trend.moderate_r_squared > self.trend.strong_r_squared {
            return Err(ConfigError::ValidationFailed(
                "moderate_r_squared must be <= strong_r_squared".into(),
            ));
        }

        if self.clustering.max_clusters == 0 || self.clustering.readings_per_cluster == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_clusters and readings_per_cluster must be > 0".into(),
            ));
        }
        if self.clustering.max_iterations == 0 || self.clustering.n_init == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_iterations and n_init must be > 0".into(),
            ));
        }

        if self.anomaly.z_threshold <= 0.0 {
            return Err(ConfigError::ValidationFailed(
                "z_threshold must be > 0".into(),
            ));
        }
        if self.anomaly.severe_low >= self.anomaly.severe_high {
            return Err(ConfigError::ValidationFailed(
                "severe_low must be < severe_high".into(),
            ));
        }
        if !(self.anomaly.contamination > 0.0 && self.anomaly.contamination <= 0.5) {
            return Err(ConfigError::ValidationFailed(
                "contamination must be in (0, 0.5]".into(),
            ));
        }
        if self.anomaly.n_trees == 0 || self.anomaly.max_samples < 2 {
            return Err(ConfigError::ValidationFailed(
                "n_trees must be > 0 and max_samples >= 2".into(),
            ));
        }

        if self.risk.cv_moderate > self.risk.cv_high {
            return Err(ConfigError::ValidationFailed(
                "cv_moderate must be <= cv_high".into(),
            ));
        }
        if self.risk.tir_critical > self.risk.tir_low {
            return Err(ConfigError::ValidationFailed(
                "tir_critical must be <= tir_low".into(),
            ));
        }
        if self.risk.moderate_weight > self.risk.high_weight
            || self.risk.tir_low_points > self.risk.tir_critical_points
        {
            return Err(ConfigError::ValidationFailed(
                "risk weights must not decrease with severity".into(),
            ));
        }
        if self.risk.moderate_score > self.risk.high_score {
            return Err(ConfigError::ValidationFailed(
                "moderate_score must be <= high_score".into(),
            ));
        }

        if self.recommendations.low_average >= self.recommendations.high_average {
            return Err(ConfigError::ValidationFailed(
                "low_average must be < high_average".into(),
            ));
        }

        if self.context.dawn_start_hour > self.context.dawn_end_hour
            || self.context.night_start_hour > self.context.night_end_hour
            || self.context.night_end_hour > 23
        {
            return Err(ConfigError::ValidationFailed(
                "context hour windows must be ordered and within 0-23".into(),
            ));
        }

        Ok(())
    }
}

fn override_from_env<T: std::str::FromStr>(key: &str, target: &mut T) -> Result<(), ConfigError> {
    if let Ok(val) = std::env::var(key) {
        *target = val
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string()))?;
    }
    Ok(())
}
