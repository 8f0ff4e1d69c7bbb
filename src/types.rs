//! Core types for the Gluco Flux pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: normalized rows, per-section analysis results, and the complete
//! analysis result tree.

use crate::numeric::Finite;
use crate::schema::{MealContext, ReadingContext};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One reading plus derived time features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub reading_context: ReadingContext,
    pub meal_context: Option<MealContext>,
    pub carbs_grams: Option<u32>,
    pub exercise_minutes: Option<u32>,
    pub medication_taken: Option<bool>,
    pub stress_level: Option<u8>,
    pub sleep_hours: Option<f64>,
    /// Hour of day (0-23)
    pub hour: u32,
    /// Day of week, Monday = 0 through Sunday = 6
    pub day_of_week: u32,
    pub is_weekend: bool,
}

impl NormalizedRow {
    pub fn context_code(&self) -> f64 {
        f64::from(self.reading_context.code())
    }

    pub fn carbs(&self) -> f64 {
        self.carbs_grams.map(f64::from).unwrap_or(0.0)
    }

    pub fn exercise(&self) -> f64 {
        self.exercise_minutes.map(f64::from).unwrap_or(0.0)
    }

    pub fn stress(&self) -> f64 {
        self.stress_level.map(f64::from).unwrap_or(0.0)
    }

    pub fn sleep(&self) -> f64 {
        self.sleep_hours.unwrap_or(0.0)
    }
}

/// Optional section: populated, or an explicit reason it is not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Section<T> {
    Available(T),
    InsufficientData,
    Unavailable { reason: String },
}

impl<T> Section<T> {
    pub fn available(&self) -> Option<&T> {
        match self {
            Section::Available(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Section::Available(_))
    }
}

/// Overall outcome of an analysis call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Complete,
    InsufficientData,
    Error,
}

/// Status carried by always-present sections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Available,
    InsufficientData,
    Error,
}

/// Central tendency, dispersion and range classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    pub status: SectionStatus,
    pub total_readings: usize,
    pub average_glucose: Finite,
    pub min_glucose: Finite,
    pub max_glucose: Finite,
    /// Sample standard deviation
    pub glucose_variability: Finite,
    /// Coefficient of variation (%)
    pub coefficient_variation: Finite,
    /// Percentage of readings within the target range
    pub time_in_range: Finite,
    pub time_below_range: Finite,
    pub time_above_range: Finite,
    pub readings_in_range: usize,
    pub readings_below_range: usize,
    pub readings_above_range: usize,
}

impl Overview {
    /// Zeroed overview carrying `status`
    pub fn empty(status: SectionStatus) -> Self {
        Self {
            status,
            total_readings: 0,
            average_glucose: Finite::ZERO,
            min_glucose: Finite::ZERO,
            max_glucose: Finite::ZERO,
            glucose_variability: Finite::ZERO,
            coefficient_variation: Finite::ZERO,
            time_in_range: Finite::ZERO,
            time_below_range: Finite::ZERO,
            time_above_range: Finite::ZERO,
            readings_in_range: 0,
            readings_below_range: 0,
            readings_above_range: 0,
        }
    }
}

/// Trend classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendLabel {
    Stable,
    Increasing,
    Decreasing,
    InsufficientData,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Upward,
    Downward,
    Stable,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendStrength {
    Strong,
    Moderate,
    Weak,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reliability {
    High,
    Moderate,
    Low,
}

/// Short-horizon extrapolation of the fitted line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub next_reading_prediction: Finite,
    pub short_term_predictions: Vec<Finite>,
    /// R² of the fit the forecast extrapolates
    pub confidence_score: Finite,
    pub prediction_reliability: Reliability,
}

/// Least-squares trend over reading index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub trend: TrendLabel,
    pub direction: TrendDirection,
    /// Glucose change per reading
    pub slope: Finite,
    pub intercept: Finite,
    pub r_squared: Finite,
    /// Mean of the recent window minus mean of everything before it
    pub recent_change: Finite,
    pub trend_strength: TrendStrength,
    pub predictions: Section<Forecast>,
}

impl TrendAnalysis {
    /// Placeholder trend with zero slope
    pub fn placeholder(trend: TrendLabel) -> Self {
        Self {
            trend,
            direction: TrendDirection::Unknown,
            slope: Finite::ZERO,
            intercept: Finite::ZERO,
            r_squared: Finite::ZERO,
            recent_change: Finite::ZERO,
            trend_strength: TrendStrength::Unknown,
            predictions: Section::InsufficientData,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekendComparison {
    pub weekend_avg: Option<Finite>,
    pub weekday_avg: Option<Finite>,
    /// weekend minus weekday, when both exist
    pub difference: Option<Finite>,
}

/// One behavioral cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterPattern {
    pub avg_glucose: Finite,
    /// Most frequent hour of day
    pub common_time: u32,
    pub common_context: ReadingContext,
    pub avg_carbs: Finite,
    pub avg_exercise: Finite,
    /// Member count
    pub pattern_frequency: usize,
    pub description: String,
}

/// K-means behavioral clustering output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAnalysis {
    pub n_clusters: usize,
    /// Keyed `pattern_0` .. `pattern_{k-1}`
    pub clusters: BTreeMap<String, ClusterPattern>,
    pub dominant_pattern: String,
    /// Cluster index per reading, in chronological order
    pub assignments: Vec<usize>,
    pub inertia: Finite,
    pub iterations: usize,
}

/// Time-of-day / day-of-week aggregation plus clustering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternAnalysis {
    pub status: SectionStatus,
    pub hourly_averages: BTreeMap<u32, Finite>,
    pub peak_hour: Option<u32>,
    pub lowest_hour: Option<u32>,
    pub daily_averages: BTreeMap<u32, Finite>,
    pub weekend_vs_weekday: WeekendComparison,
    pub ml_clusters: Section<ClusterAnalysis>,
}

impl PatternAnalysis {
    pub fn empty(status: SectionStatus) -> Self {
        Self {
            status,
            hourly_averages: BTreeMap::new(),
            peak_hour: None,
            lowest_hour: None,
            daily_averages: BTreeMap::new(),
            weekend_vs_weekday: WeekendComparison {
                weekend_avg: None,
                weekday_avg: None,
                difference: None,
            },
            ml_clusters: Section::InsufficientData,
        }
    }
}

/// Isolation-forest outliers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultivariateAnomalies {
    pub ml_anomaly_count: usize,
    pub ml_anomaly_percentage: Finite,
    pub anomalous_glucose_values: Vec<Finite>,
    pub anomaly_detection_method: String,
    /// Scores strictly above this are flagged
    pub score_threshold: Finite,
}

/// Statistical and multivariate anomaly flags, side by side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyDetection {
    pub anomaly_count: usize,
    pub anomaly_percentage: Finite,
    pub severe_highs: usize,
    pub severe_lows: usize,
    pub anomaly_threshold_high: Finite,
    pub anomaly_threshold_low: Finite,
    pub anomalous_values: Vec<Finite>,
    pub ml_anomaly_detection: Section<MultivariateAnomalies>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariabilityRisk {
    pub level: RiskLevel,
    pub coefficient_variation: Finite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRisk {
    pub level: RiskLevel,
    pub episodes: usize,
    pub percentage: Finite,
    pub threshold: Finite,
}

/// Auditable weighted risk score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub score: u32,
    pub variability: VariabilityRisk,
    pub hypoglycemia: EpisodeRisk,
    pub hyperglycemia: EpisodeRisk,
    pub time_in_range: Finite,
    pub factors: Vec<String>,
    pub message: String,
}

/// Early-morning vs late-night comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeAnalysis {
    pub dawn_phenomenon_detected: bool,
    pub morning_average: Option<Finite>,
    pub evening_average: Option<Finite>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealCorrelation {
    pub meal_averages: BTreeMap<String, Finite>,
    pub highest_meal_impact: Option<MealContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseImpact {
    pub exercise_readings: usize,
    pub exercise_average: Finite,
    pub no_exercise_average: Option<Finite>,
    /// no-exercise mean minus exercise mean
    pub exercise_benefit: Option<Finite>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationImpact {
    pub medicated_readings: usize,
    pub with_medication_average: Finite,
    pub without_medication_average: Option<Finite>,
    /// unmedicated mean minus medicated mean
    pub medication_effectiveness: Option<Finite>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    GlucoseControl,
    Safety,
    Lifestyle,
    DataCollection,
}

/// Ordering is sort order: High first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Normal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationType,
    pub priority: Priority,
    pub title: String,
    pub message: String,
    pub action: String,
}

/// Complete analysis output. Every section is always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub status: AnalysisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub overview: Overview,
    pub trends: TrendAnalysis,
    pub patterns: PatternAnalysis,
    pub anomaly_detection: Section<AnomalyDetection>,
    pub risk_assessment: Section<RiskAssessment>,
    pub time_analysis: Section<TimeAnalysis>,
    pub meal_correlation: Section<MealCorrelation>,
    pub exercise_impact: Section<ExerciseImpact>,
    pub medication_effectiveness: Section<MedicationImpact>,
    pub recommendations: Vec<Recommendation>,
}

/// Producer metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Time span covered by the analyzed readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportWindow {
    pub first_reading_utc: Option<String>,
    pub last_reading_utc: Option<String>,
}

/// Analysis result plus provenance, as emitted on the JSON surfaces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub report_version: String,
    pub producer: ReportProducer,
    pub computed_at_utc: String,
    pub reading_count: usize,
    pub window: ReportWindow,
    pub analysis: AnalysisResult,
}
