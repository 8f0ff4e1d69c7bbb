//! Recommendation generation
//!
//! A static rule table over the computed signals. Every rule whose predicate
//! holds contributes one record; the result is stably sorted by priority.
//! Adding a rule means adding an entry to [`RULES`].

use crate::config::RecommendationConfig;
use crate::schema::GlucoseUnit;
use crate::types::{
    AnomalyDetection, Overview, Priority, Recommendation, RecommendationType, RiskAssessment,
    RiskLevel, TimeAnalysis,
};

/// Inputs visible to the rule table
pub struct Signals<'a> {
    pub overview: &'a Overview,
    pub anomalies: Option<&'a AnomalyDetection>,
    pub risk: Option<&'a RiskAssessment>,
    pub time: Option<&'a TimeAnalysis>,
    pub config: &'a RecommendationConfig,
    pub unit: GlucoseUnit,
}

impl Signals<'_> {
    fn average(&self) -> f64 {
        self.overview.average_glucose.get()
    }
}

/// One row of the rule table
pub struct RecommendationRule {
    pub name: &'static str,
    pub applies: fn(&Signals) -> bool,
    pub build: fn(&Signals) -> Recommendation,
}

pub static RULES: &[RecommendationRule] = &[
    RecommendationRule {
        name: "high_variability",
        applies: |s| s.overview.coefficient_variation.get() > s.config.variability_cv,
        build: |s| Recommendation {
            kind: RecommendationType::GlucoseControl,
            priority: Priority::High,
            title: "High Glucose Variability".into(),
            message: format!(
                "Your glucose variability is {:.1}%. Consider more consistent meal timing and medication schedules.",
                s.overview.coefficient_variation.get()
            ),
            action: "improve_consistency".into(),
        },
    },
    RecommendationRule {
        name: "elevated_average",
        applies: |s| s.average() > s.config.high_average,
        build: |s| Recommendation {
            kind: RecommendationType::GlucoseControl,
            priority: Priority::High,
            title: "Elevated Average Glucose".into(),
            message: format!(
                "Your average glucose is {:.1} {}. Consult your healthcare provider about adjusting your treatment plan.",
                s.average(),
                s.unit.as_str()
            ),
            action: "consult_doctor".into(),
        },
    },
    RecommendationRule {
        name: "low_average",
        applies: |s| s.average() < s.config.low_average,
        build: |s| Recommendation {
            kind: RecommendationType::GlucoseControl,
            priority: Priority::High,
            title: "Low Average Glucose".into(),
            message: format!(
                "Your average glucose is {:.1} {}. Monitor for hypoglycemia symptoms and discuss with your healthcare provider.",
                s.average(),
                s.unit.as_str()
            ),
            action: "monitor_closely".into(),
        },
    },
    RecommendationRule {
        name: "good_control",
        applies: |s| {
            s.average() >= s.config.low_average && s.average() <= s.config.high_average
        },
        build: |s| Recommendation {
            kind: RecommendationType::GlucoseControl,
            priority: Priority::Normal,
            title: "Good Glucose Control".into(),
            message: format!(
                "Your average glucose is {:.1} {}, which is within a good range. Keep up the excellent work!",
                s.average(),
                s.unit.as_str()
            ),
            action: "continue_monitoring".into(),
        },
    },
    RecommendationRule {
        name: "low_time_in_range",
        applies: |s| s.overview.time_in_range.get() < s.config.low_time_in_range,
        build: |s| Recommendation {
            kind: RecommendationType::GlucoseControl,
            priority: Priority::Medium,
            title: "Low Time in Range".into(),
            message: format!(
                "Only {:.1}% of your readings are within your target range. Review meals and dosing around out-of-range readings.",
                s.overview.time_in_range.get()
            ),
            action: "review_out_of_range".into(),
        },
    },
    RecommendationRule {
        name: "unusual_readings",
        applies: |s| {
            s.anomalies.is_some_and(|a| {
                a.severe_highs + a.severe_lows > 0
                    || a.anomaly_percentage.get() > s.config.anomaly_percentage
            })
        },
        build: |s| {
            let (count, severe) = s
                .anomalies
                .map(|a| (a.anomaly_count, a.severe_highs + a.severe_lows))
                .unwrap_or((0, 0));
            Recommendation {
                kind: RecommendationType::Safety,
                priority: Priority::High,
                title: "Unusual Readings Detected".into(),
                message: format!(
                    "{count} reading(s) fell outside your usual range and {severe} were at severe levels. Review them with your healthcare provider."
                ),
                action: "review_anomalies".into(),
            }
        },
    },
    RecommendationRule {
        name: "high_risk",
        applies: |s| s.risk.is_some_and(|r| r.level == RiskLevel::High),
        build: |s| Recommendation {
            kind: RecommendationType::Safety,
            priority: Priority::High,
            title: "High Glycemic Risk".into(),
            message: format!(
                "Your combined risk score is {}. Share these results with your healthcare provider.",
                s.risk.map(|r| r.score).unwrap_or(0)
            ),
            action: "consult_doctor".into(),
        },
    },
    RecommendationRule {
        name: "dawn_phenomenon",
        applies: |s| s.time.is_some_and(|t| t.dawn_phenomenon_detected),
        build: |s| {
            let (morning, night) = s
                .time
                .map(|t| {
                    (
                        t.morning_average.map(|v| v.get()).unwrap_or(0.0),
                        t.evening_average.map(|v| v.get()).unwrap_or(0.0),
                    )
                })
                .unwrap_or((0.0, 0.0));
            Recommendation {
                kind: RecommendationType::Lifestyle,
                priority: Priority::Medium,
                title: "Early Morning Rise".into(),
                message: format!(
                    "Your early-morning readings average {morning:.1} {unit}, above your late-night average of {night:.1} {unit}. Discuss a possible dawn phenomenon with your healthcare provider.",
                    unit = s.unit.as_str()
                ),
                action: "discuss_dawn_phenomenon".into(),
            }
        },
    },
];

/// Generator for the recommendations list
pub struct RecommendationGenerator;

impl RecommendationGenerator {
    pub fn generate(signals: &Signals) -> Vec<Recommendation> {
        let mut recommendations: Vec<Recommendation> = RULES
            .iter()
            .filter(|rule| (rule.applies)(signals))
            .map(|rule| (rule.build)(signals))
            .collect();
        recommendations.sort_by_key(|r| r.priority);
        recommendations
    }

    /// The single record of the insufficient-data result
    pub fn more_data_needed() -> Recommendation {
        Recommendation {
            kind: RecommendationType::DataCollection,
            priority: Priority::High,
            title: "More Data Needed".into(),
            message: "Log more glucose readings to get personalized insights and recommendations."
                .into(),
            action: "log_more_readings".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::numeric::Finite;
    use crate::types::SectionStatus;
    use pretty_assertions::assert_eq;

    fn overview(avg: f64, cv: f64, tir: f64) -> Overview {
        let mut overview = Overview::empty(SectionStatus::Available);
        overview.total_readings = 10;
        overview.average_glucose = Finite::new(avg);
        overview.coefficient_variation = Finite::new(cv);
        overview.time_in_range = Finite::new(tir);
        overview
    }

    fn titles(overview: &Overview, time: Option<&TimeAnalysis>) -> Vec<String> {
        let config = AnalysisConfig::default();
        let signals = Signals {
            overview,
            anomalies: None,
            risk: None,
            time,
            config: &config.recommendations,
            unit: GlucoseUnit::MgDl,
        };
        RecommendationGenerator::generate(&signals)
            .into_iter()
            .map(|r| r.title)
            .collect()
    }

    #[test]
    fn test_good_control_only() {
        let overview = overview(120.0, 15.0, 95.0);
        assert_eq!(titles(&overview, None), vec!["Good Glucose Control"]);
    }

    #[test]
    fn test_multiple_rules_sorted_by_priority() {
        let overview = overview(210.0, 42.0, 40.0);
        assert_eq!(
            titles(&overview, None),
            vec![
                "High Glucose Variability",
                "Elevated Average Glucose",
                "Low Time in Range",
            ]
        );
    }

    #[test]
    fn test_dawn_phenomenon_adds_medium_item() {
        let overview = overview(120.0, 15.0, 95.0);
        let time = TimeAnalysis {
            dawn_phenomenon_detected: true,
            morning_average: Some(Finite::new(160.0)),
            evening_average: Some(Finite::new(115.0)),
        };
        assert_eq!(
            titles(&overview, Some(&time)),
            vec!["Early Morning Rise", "Good Glucose Control"]
        );
    }

    #[test]
    fn test_message_uses_unit() {
        let overview = overview(3.2, 10.0, 20.0);
        let config = AnalysisConfig::for_unit(GlucoseUnit::MmolL);
        let signals = Signals {
            overview: &overview,
            anomalies: None,
            risk: None,
            time: None,
            config: &config.recommendations,
            unit: GlucoseUnit::MmolL,
        };
        let recommendations = RecommendationGenerator::generate(&signals);

        assert_eq!(recommendations[0].title, "Low Average Glucose");
        assert!(recommendations[0].message.contains("3.2 mmol/L"));
    }

    #[test]
    fn test_rule_names_are_unique() {
        let mut names: Vec<&str> = RULES.iter().map(|r| r.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), RULES.len());
    }

    #[test]
    fn test_every_recommendation_type_is_produced() {
        use crate::types::AnomalyDetection;
        use std::collections::HashSet;

        let overview = overview(210.0, 42.0, 40.0);
        let anomalies = AnomalyDetection {
            anomaly_count: 1,
            anomaly_percentage: Finite::new(10.0),
            severe_highs: 1,
            severe_lows: 0,
            anomaly_threshold_high: Finite::new(300.0),
            anomaly_threshold_low: Finite::new(80.0),
            anomalous_values: vec![Finite::new(400.0)],
            ml_anomaly_detection: crate::types::Section::InsufficientData,
        };
        let time = TimeAnalysis {
            dawn_phenomenon_detected: true,
            morning_average: Some(Finite::new(230.0)),
            evening_average: Some(Finite::new(180.0)),
        };
        let config = AnalysisConfig::default();
        let signals = Signals {
            overview: &overview,
            anomalies: Some(&anomalies),
            risk: None,
            time: Some(&time),
            config: &config.recommendations,
            unit: GlucoseUnit::MgDl,
        };

        let mut kinds: HashSet<RecommendationType> = RecommendationGenerator::generate(&signals)
            .into_iter()
            .map(|r| r.kind)
            .collect();
        kinds.insert(RecommendationGenerator::more_data_needed().kind);

        let all = [
            RecommendationType::GlucoseControl,
            RecommendationType::Safety,
            RecommendationType::Lifestyle,
            RecommendationType::DataCollection,
        ];
        assert_eq!(kinds, all.into_iter().collect::<HashSet<_>>());
    }
}
