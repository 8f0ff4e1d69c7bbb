//! Pipeline orchestration
//!
//! This module provides the public API for Gluco Flux.
//! It orchestrates the full pipeline from readings to an analysis result.

use crate::anomaly::AnomalyDetector;
use crate::config::AnalysisConfig;
use crate::context::ContextAnalyzer;
use crate::encoder::ReportEncoder;
use crate::error::ComputeError;
use crate::normalizer::Normalizer;
use crate::overview::OverviewAggregator;
use crate::patterns::PatternIdentifier;
use crate::recommendations::{RecommendationGenerator, Signals};
use crate::risk::RiskAssessor;
use crate::schema::{AnalysisRequest, Reading, ReadingAdapter, TargetRange};
use crate::trend::TrendEstimator;
use crate::types::{
    AnalysisReport, AnalysisResult, AnalysisStatus, Overview, PatternAnalysis, Section,
    SectionStatus, TrendAnalysis, TrendLabel,
};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, info};

const ERROR_MESSAGE: &str = "Unable to complete analysis at this time. Please try again later.";

/// Analyze a `glucose.reading.v1` request document and return the report JSON.
///
/// Thresholds follow the defaults for the request's unit.
///
/// # Example
/// ```ignore
/// let report_json = analyze_request(r#"{"readings": [...]}"#)?;
/// ```
pub fn analyze_request(json: &str) -> Result<String, ComputeError> {
    let request = ReadingAdapter::parse_request(json)?;
    let analyzer = GlucoseAnalyzer::new(AnalysisConfig::for_unit(request.unit));
    let report = analyzer.analyze_request(request)?;
    serde_json::to_string_pretty(&report).map_err(ComputeError::JsonError)
}

/// Stateless analysis engine.
///
/// Holds only its configuration; every call builds its own row table and
/// random number generators, so one analyzer can serve concurrent callers.
#[derive(Debug, Clone, Default)]
pub struct GlucoseAnalyzer {
    config: AnalysisConfig,
}

impl GlucoseAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyze a batch of readings against `target`.
    ///
    /// Never fails: too few readings produce the insufficient-data result and
    /// an unexpected failure produces the error result.
    pub fn analyze(&self, readings: &[Reading], target: &TargetRange) -> AnalysisResult {
        match panic::catch_unwind(AssertUnwindSafe(|| self.run(readings, target))) {
            Ok(result) => result,
            Err(_) => {
                error!(readings = readings.len(), "analysis failed unexpectedly");
                AnalysisResult::error()
            }
        }
    }

    /// Validate, cap and analyze a request, wrapping the result in a report
    pub fn analyze_request(&self, request: AnalysisRequest) -> Result<AnalysisReport, ComputeError> {
        if request.unit != self.config.unit {
            return Err(ComputeError::MixedUnits {
                expected: self.config.unit.as_str().to_string(),
                found: request.unit.as_str().to_string(),
            });
        }
        let (readings, target) = ReadingAdapter::prepare(request, self.config.sample.max_readings)?;
        let analysis = self.analyze(&readings, &target);
        Ok(ReportEncoder::new().encode(&readings, analysis))
    }

    /// Single forward pass over the stages.
    ///
    /// Pipeline stages:
    /// 1. Normalizer - sort and derive time features
    /// 2. OverviewAggregator - statistics and range classification
    /// 3. TrendEstimator - least-squares trend and forecast
    /// 4. PatternIdentifier - time buckets and behavioral clusters
    /// 5. AnomalyDetector - statistical and isolation-forest flags
    /// 6. ContextAnalyzer - dawn, meal, exercise and medication comparisons
    /// 7. RiskAssessor - weighted risk score
    /// 8. RecommendationGenerator - rule table
    fn run(&self, readings: &[Reading], target: &TargetRange) -> AnalysisResult {
        let config = &self.config;
        if readings.len() < config.sample.min_readings {
            debug!(
                readings = readings.len(),
                required = config.sample.min_readings,
                "insufficient readings"
            );
            return AnalysisResult::insufficient_data(config.sample.min_readings);
        }

        // Stage 1: Normalize readings
        let rows = Normalizer::normalize(readings);

        // Stage 2-5: Statistical sections
        let overview = OverviewAggregator::aggregate(&rows, target);
        let trends = TrendEstimator::new(&config.trend, &config.sample).estimate(&rows);
        let patterns = PatternIdentifier::new(&config.clustering, &config.sample).identify(&rows);
        let anomaly_detection = AnomalyDetector::new(&config.anomaly, &config.sample).detect(&rows);

        // Stage 6: Contextual comparisons
        let context = ContextAnalyzer::new(&config.context);
        let time_analysis = context.time_analysis(&rows);
        let meal_correlation = context.meal_correlation(&rows);
        let exercise_impact = context.exercise_impact(&rows);
        let medication_effectiveness = context.medication_effectiveness(&rows);

        // Stage 7: Risk
        let risk_assessment = RiskAssessor::new(&config.risk).assess(&rows, &overview);

        // Stage 8: Recommendations
        let recommendations = RecommendationGenerator::generate(&Signals {
            overview: &overview,
            anomalies: anomaly_detection.available(),
            risk: risk_assessment.available(),
            time: time_analysis.available(),
            config: &config.recommendations,
            unit: config.unit,
        });

        info!(
            readings = rows.len(),
            risk_level = risk_assessment.available().map(|r| r.level.as_str()),
            recommendations = recommendations.len(),
            "analysis complete"
        );

        AnalysisResult {
            status: AnalysisStatus::Complete,
            message: None,
            overview,
            trends,
            patterns,
            anomaly_detection,
            risk_assessment,
            time_analysis,
            meal_correlation,
            exercise_impact,
            medication_effectiveness,
            recommendations,
        }
    }
}

fn unavailable<T>() -> Section<T> {
    Section::Unavailable {
        reason: "analysis failed".to_string(),
    }
}

impl AnalysisResult {
    /// Canonical result for fewer than `min_readings` readings
    pub fn insufficient_data(min_readings: usize) -> Self {
        Self {
            status: AnalysisStatus::InsufficientData,
            message: Some(format!(
                "Not enough glucose readings for comprehensive analysis. Please log at least {min_readings} readings."
            )),
            overview: Overview::empty(SectionStatus::InsufficientData),
            trends: TrendAnalysis::placeholder(TrendLabel::InsufficientData),
            patterns: PatternAnalysis::empty(SectionStatus::InsufficientData),
            anomaly_detection: Section::InsufficientData,
            risk_assessment: Section::InsufficientData,
            time_analysis: Section::InsufficientData,
            meal_correlation: Section::InsufficientData,
            exercise_impact: Section::InsufficientData,
            medication_effectiveness: Section::InsufficientData,
            recommendations: vec![RecommendationGenerator::more_data_needed()],
        }
    }

    /// Canonical result for an unexpected failure
    pub fn error() -> Self {
        let mut patterns = PatternAnalysis::empty(SectionStatus::Error);
        patterns.ml_clusters = unavailable();

        Self {
            status: AnalysisStatus::Error,
            message: Some(ERROR_MESSAGE.to_string()),
            overview: Overview::empty(SectionStatus::Error),
            trends: TrendAnalysis::placeholder(TrendLabel::Error),
            patterns,
            anomaly_detection: unavailable(),
            risk_assessment: unavailable(),
            time_analysis: unavailable(),
            meal_correlation: unavailable(),
            exercise_impact: unavailable(),
            medication_effectiveness: unavailable(),
            recommendations: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::Finite;
    use crate::schema::{GlucoseUnit, MealContext, ReadingContext};
    use crate::types::{Priority, RecommendationType, RiskLevel, TrendStrength};
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn readings(values: &[f64]) -> Vec<Reading> {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 6, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Reading::new(*v, start + Duration::hours(5 * i as i64)))
            .collect()
    }

    fn analyze(values: &[f64]) -> AnalysisResult {
        GlucoseAnalyzer::default().analyze(&readings(values), &TargetRange::new(80.0, 180.0))
    }

    /// Every number in the serialized result is finite
    fn assert_all_finite(value: &serde_json::Value) {
        match value {
            serde_json::Value::Number(n) => {
                assert!(n.as_f64().is_some_and(f64::is_finite), "non-finite {n}")
            }
            serde_json::Value::Array(items) => items.iter().for_each(assert_all_finite),
            serde_json::Value::Object(map) => map.values().for_each(assert_all_finite),
            _ => {}
        }
    }

    #[test]
    fn test_four_evenly_spaced_readings() {
        let result = analyze(&[90.0, 95.0, 100.0, 105.0]);

        assert_eq!(result.status, AnalysisStatus::Complete);
        assert_eq!(result.overview.average_glucose, Finite::new(97.5));
        assert_eq!(result.overview.min_glucose, Finite::new(90.0));
        assert_eq!(result.overview.max_glucose, Finite::new(105.0));
        assert_eq!(result.overview.time_in_range, Finite::new(100.0));
        // slope 5 per reading is past the stable band
        assert_eq!(result.trends.trend, TrendLabel::Increasing);
        assert_eq!(result.trends.slope, Finite::new(5.0));
    }

    #[test]
    fn test_four_flat_readings_are_stable() {
        let result = analyze(&[97.0, 97.5, 97.5, 98.0]);
        assert_eq!(result.trends.trend, TrendLabel::Stable);
    }

    #[test]
    fn test_linear_rise_is_strong_increase() {
        let values: Vec<f64> = (0..10).map(|i| 100.0 + 200.0 * i as f64 / 9.0).collect();
        let result = analyze(&values);

        assert_eq!(result.trends.trend, TrendLabel::Increasing);
        assert_eq!(result.trends.trend_strength, TrendStrength::Strong);
        assert!((result.trends.r_squared.get() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_three_readings_is_insufficient() {
        let result = analyze(&[100.0, 110.0, 120.0]);

        assert_eq!(result, AnalysisResult::insufficient_data(4));
        assert_eq!(result.status, AnalysisStatus::InsufficientData);
        assert_eq!(result.overview.status, SectionStatus::InsufficientData);
        assert_eq!(result.overview.total_readings, 0);
        assert_eq!(result.trends.trend, TrendLabel::InsufficientData);
        assert_eq!(result.patterns.status, SectionStatus::InsufficientData);
        assert!(result.patterns.hourly_averages.is_empty());

        assert_eq!(result.recommendations.len(), 1);
        let rec = &result.recommendations[0];
        assert_eq!(rec.kind, RecommendationType::DataCollection);
        assert_eq!(rec.priority, Priority::High);
        assert_eq!(rec.title, "More Data Needed");
        assert_eq!(rec.action, "log_more_readings");
    }

    #[test]
    fn test_empty_input_is_insufficient() {
        let result = GlucoseAnalyzer::default().analyze(&[], &TargetRange::default());
        assert_eq!(result.status, AnalysisStatus::InsufficientData);
    }

    #[test]
    fn test_injected_spike() {
        let result = analyze(&[
            95.0, 102.0, 110.0, 88.0, 120.0, 99.0, 105.0, 91.0, 115.0, 100.0, 400.0, 97.0,
        ]);

        let anomalies = result.anomaly_detection.available().unwrap();
        assert!(anomalies.anomalous_values.contains(&Finite::new(400.0)));
        assert!(anomalies.severe_highs >= 1);

        let risk = result.risk_assessment.available().unwrap();
        assert!(risk.hyperglycemia.level >= RiskLevel::Moderate);
        assert!(result
            .recommendations
            .iter()
            .any(|r| r.title == "Unusual Readings Detected"));
    }

    #[test]
    fn test_single_repeated_value_does_not_crash() {
        let result = analyze(&[140.0; 15]);

        assert_eq!(result.status, AnalysisStatus::Complete);
        assert_eq!(result.overview.glucose_variability, Finite::ZERO);
        assert_eq!(result.trends.trend, TrendLabel::Stable);
        assert!(result.patterns.ml_clusters.is_available());

        let json = serde_json::to_value(&result).unwrap();
        assert_all_finite(&json);
    }

    #[test]
    fn test_every_section_is_present() {
        let json = serde_json::to_value(analyze(&[120.0, 130.0, 125.0, 140.0, 135.0])).unwrap();
        for key in [
            "status",
            "overview",
            "trends",
            "patterns",
            "anomaly_detection",
            "risk_assessment",
            "time_analysis",
            "meal_correlation",
            "exercise_impact",
            "medication_effectiveness",
            "recommendations",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["meal_correlation"]["status"], "insufficient_data");
        assert_eq!(json["patterns"]["ml_clusters"]["status"], "insufficient_data");
        assert_eq!(json["anomaly_detection"]["status"], "available");
    }

    #[test]
    fn test_range_counts_sum_to_total() {
        let result = analyze(&[45.0, 300.0, 60.0, 280.0, 120.0, 55.0, 320.0, 150.0, 40.0, 260.0]);
        let o = &result.overview;

        assert_eq!(
            o.readings_in_range + o.readings_below_range + o.readings_above_range,
            o.total_readings
        );
        let pct = o.time_in_range.get() + o.time_below_range.get() + o.time_above_range.get();
        assert!((pct - 100.0).abs() <= 0.15);
        assert_eq!(
            result.risk_assessment.available().map(|r| r.level),
            Some(RiskLevel::High)
        );
    }

    #[test]
    fn test_repeated_calls_are_identical() {
        let mut batch = Vec::new();
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 6, 0, 0).unwrap();
        for i in 0..30 {
            let mut r = Reading::new(
                90.0 + ((i * 37) % 120) as f64,
                start + Duration::hours(7 * i as i64),
            )
            .with_context(if i % 3 == 0 {
                ReadingContext::AfterMeal
            } else {
                ReadingContext::Fasting
            });
            r.carbs_grams = Some((i * 13 % 90) as u32);
            r.exercise_minutes = Some((i % 4 * 15) as u32);
            r.meal_context = (i % 3 == 0).then_some(MealContext::Lunch);
            batch.push(r);
        }

        let analyzer = GlucoseAnalyzer::default();
        let first = analyzer.analyze(&batch, &TargetRange::default());
        let second = analyzer.analyze(&batch, &TargetRange::default());

        assert_eq!(first, second);
        assert!(first.patterns.ml_clusters.is_available());
        assert!(first
            .anomaly_detection
            .available()
            .unwrap()
            .ml_anomaly_detection
            .is_available());
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let mut batch = readings(&[100.0, 150.0, 130.0, 170.0, 90.0]);
        let forward = GlucoseAnalyzer::default().analyze(&batch, &TargetRange::default());
        batch.reverse();
        let reversed = GlucoseAnalyzer::default().analyze(&batch, &TargetRange::default());
        assert_eq!(forward, reversed);
    }

    #[test]
    fn test_error_result_shape() {
        let result = AnalysisResult::error();
        assert_eq!(result.status, AnalysisStatus::Error);
        assert_eq!(result.trends.trend, TrendLabel::Error);
        assert!(result.recommendations.is_empty());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["trends"]["trend"], "error");
        assert_eq!(json["risk_assessment"]["status"], "unavailable");
    }

    #[test]
    fn test_analyze_request_json() {
        let json = r#"{
            "schema_version": "glucose.reading.v1",
            "target_range": {"min": 70.0, "max": 160.0},
            "readings": [
                {"value": 110.0, "timestamp": "2024-03-04T07:00:00Z"},
                {"value": 150.0, "timestamp": "2024-03-04T12:00:00Z"},
                {"value": 170.0, "timestamp": "2024-03-04T18:00:00Z"},
                {"value": 120.0, "timestamp": "2024-03-04T22:00:00Z"}
            ]
        }"#;
        let report: serde_json::Value =
            serde_json::from_str(&analyze_request(json).unwrap()).unwrap();

        assert_eq!(report["reading_count"], 4);
        assert_eq!(report["analysis"]["status"], "complete");
        assert_eq!(report["analysis"]["overview"]["readings_above_range"], 1);
    }

    #[test]
    fn test_analyze_request_rejects_invalid_reading() {
        let json = r#"{"readings": [{"value": -1.0, "timestamp": "2024-03-04T07:00:00Z"}]}"#;
        assert!(matches!(
            analyze_request(json),
            Err(ComputeError::InvalidReading(_))
        ));
    }

    #[test]
    fn test_analyzer_rejects_other_unit() {
        let mut request = AnalysisRequest::new(TargetRange::new(4.4, 10.0), readings(&[5.5; 4]));
        request.unit = GlucoseUnit::MmolL;
        for r in request.readings.iter_mut() {
            r.unit = GlucoseUnit::MmolL;
        }

        let mgdl = GlucoseAnalyzer::default();
        assert!(matches!(
            mgdl.analyze_request(request.clone()),
            Err(ComputeError::MixedUnits { .. })
        ));

        let mmol = GlucoseAnalyzer::new(AnalysisConfig::for_unit(GlucoseUnit::MmolL));
        let report = mmol.analyze_request(request).unwrap();
        assert_eq!(report.analysis.overview.time_in_range, Finite::new(100.0));
    }

    #[test]
    fn test_analyzer_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GlucoseAnalyzer>();

        let analyzer = std::sync::Arc::new(GlucoseAnalyzer::default());
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let analyzer = analyzer.clone();
                std::thread::spawn(move || {
                    let result = analyzer.analyze(
                        &readings(&[100.0, 140.0, 120.0, 160.0, 110.0]),
                        &TargetRange::default(),
                    );
                    serde_json::to_string(&result).unwrap()
                })
            })
            .collect();
        let outputs: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(outputs[0], outputs[1]);
    }
}
