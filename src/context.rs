//! Contextual impact analysis
//!
//! This module compares glucose across situational groups recorded with each
//! reading: time of day (dawn phenomenon), meals, exercise and medication.
//! Each comparison is an independent section and degrades to
//! `InsufficientData` on its own.

use crate::config::ContextConfig;
use crate::numeric::{mean, Finite};
use crate::schema::MealContext;
use crate::types::{
    ExerciseImpact, MealCorrelation, MedicationImpact, NormalizedRow, Section, TimeAnalysis,
};
use std::collections::BTreeMap;

/// Analyzer for the contextual sections
pub struct ContextAnalyzer<'a> {
    config: &'a ContextConfig,
}

impl<'a> ContextAnalyzer<'a> {
    pub fn new(config: &'a ContextConfig) -> Self {
        Self { config }
    }

    /// Early-morning vs late-night comparison
    pub fn time_analysis(&self, rows: &[NormalizedRow]) -> Section<TimeAnalysis> {
        if rows.is_empty() {
            return Section::InsufficientData;
        }
        let dawn = self.config.dawn_start_hour..=self.config.dawn_end_hour;
        let night = self.config.night_start_hour..=self.config.night_end_hour;

        let morning = mean_where(rows, |r| dawn.contains(&r.hour));
        let evening = mean_where(rows, |r| night.contains(&r.hour));
        let detected = matches!(
            (morning, evening),
            (Some(m), Some(e)) if m > e + self.config.dawn_rise
        );

        Section::Available(TimeAnalysis {
            dawn_phenomenon_detected: detected,
            morning_average: morning.map(|v| Finite::rounded(v, 1)),
            evening_average: evening.map(|v| Finite::rounded(v, 1)),
        })
    }

    /// Mean glucose per meal
    pub fn meal_correlation(&self, rows: &[NormalizedRow]) -> Section<MealCorrelation> {
        let mut by_meal: BTreeMap<MealContext, Vec<f64>> = BTreeMap::new();
        for row in rows {
            if let Some(meal) = row.meal_context {
                by_meal.entry(meal).or_default().push(row.value);
            }
        }
        if by_meal.is_empty() {
            return Section::InsufficientData;
        }

        let mut highest: Option<(MealContext, f64)> = None;
        let mut meal_averages = BTreeMap::new();
        for (meal, values) in &by_meal {
            let Some(m) = mean(values) else { continue };
            if highest.map_or(true, |(_, h)| m > h) {
                highest = Some((*meal, m));
            }
            meal_averages.insert(meal.as_str().to_string(), Finite::rounded(m, 1));
        }

        Section::Available(MealCorrelation {
            meal_averages,
            highest_meal_impact: highest.map(|(meal, _)| meal),
        })
    }

    /// Glucose with vs without exercise
    pub fn exercise_impact(&self, rows: &[NormalizedRow]) -> Section<ExerciseImpact> {
        let (with, without): (Vec<&NormalizedRow>, Vec<&NormalizedRow>) = rows
            .iter()
            .partition(|r| r.exercise_minutes.is_some_and(|m| m > 0));
        if with.len() < self.config.min_impact_readings {
            return Section::InsufficientData;
        }

        let exercise = mean_of(&with).unwrap_or(0.0);
        let rest = mean_of(&without);

        Section::Available(ExerciseImpact {
            exercise_readings: with.len(),
            exercise_average: Finite::rounded(exercise, 1),
            no_exercise_average: rest.map(|v| Finite::rounded(v, 1)),
            exercise_benefit: rest.map(|v| Finite::rounded(v - exercise, 1)),
        })
    }

    /// Glucose with vs without medication
    pub fn medication_effectiveness(&self, rows: &[NormalizedRow]) -> Section<MedicationImpact> {
        let with: Vec<&NormalizedRow> = rows
            .iter()
            .filter(|r| r.medication_taken == Some(true))
            .collect();
        let without: Vec<&NormalizedRow> = rows
            .iter()
            .filter(|r| r.medication_taken == Some(false))
            .collect();
        if with.len() < self.config.min_impact_readings {
            return Section::InsufficientData;
        }

        let medicated = mean_of(&with).unwrap_or(0.0);
        let unmedicated = mean_of(&without);

        Section::Available(MedicationImpact {
            medicated_readings: with.len(),
            with_medication_average: Finite::rounded(medicated, 1),
            without_medication_average: unmedicated.map(|v| Finite::rounded(v, 1)),
            medication_effectiveness: unmedicated.map(|v| Finite::rounded(v - medicated, 1)),
        })
    }
}

fn mean_where<F>(rows: &[NormalizedRow], predicate: F) -> Option<f64>
where
    F: Fn(&NormalizedRow) -> bool,
{
    let values: Vec<f64> = rows.iter().filter(|r| predicate(r)).map(|r| r.value).collect();
    mean(&values)
}

fn mean_of(rows: &[&NormalizedRow]) -> Option<f64> {
    let values: Vec<f64> = rows.iter().map(|r| r.value).collect();
    mean(&values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::normalizer::Normalizer;
    use crate::schema::Reading;
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn analyzer_config() -> ContextConfig {
        AnalysisConfig::default().context
    }

    #[test]
    fn test_dawn_phenomenon_detected() {
        let readings = vec![
            Reading::new(150.0, at(4, 7)),
            Reading::new(160.0, at(5, 8)),
            Reading::new(110.0, at(4, 22)),
            Reading::new(120.0, at(5, 23)),
            Reading::new(130.0, at(5, 14)),
        ];
        let config = analyzer_config();
        let section = ContextAnalyzer::new(&config).time_analysis(&Normalizer::normalize(&readings));

        assert_eq!(
            section,
            Section::Available(TimeAnalysis {
                dawn_phenomenon_detected: true,
                morning_average: Some(Finite::new(155.0)),
                evening_average: Some(Finite::new(115.0)),
            })
        );
    }

    #[test]
    fn test_no_dawn_without_night_readings() {
        let readings: Vec<Reading> = (6..10).map(|h| Reading::new(200.0, at(4, h))).collect();
        let config = analyzer_config();
        let section = ContextAnalyzer::new(&config).time_analysis(&Normalizer::normalize(&readings));

        let analysis = section.available().unwrap();
        assert!(!analysis.dawn_phenomenon_detected);
        assert_eq!(analysis.evening_average, None);
    }

    #[test]
    fn test_meal_correlation() {
        let mut readings = Vec::new();
        for (hour, meal, value) in [
            (8, MealContext::Breakfast, 150.0),
            (9, MealContext::Breakfast, 170.0),
            (13, MealContext::Lunch, 140.0),
            (19, MealContext::Dinner, 180.0),
        ] {
            let mut r = Reading::new(value, at(4, hour));
            r.meal_context = Some(meal);
            readings.push(r);
        }
        readings.push(Reading::new(300.0, at(4, 23)));

        let config = analyzer_config();
        let section =
            ContextAnalyzer::new(&config).meal_correlation(&Normalizer::normalize(&readings));
        let correlation = section.available().unwrap();

        assert_eq!(correlation.meal_averages.len(), 3);
        assert_eq!(correlation.meal_averages["breakfast"], Finite::new(160.0));
        assert_eq!(correlation.highest_meal_impact, Some(MealContext::Dinner));
    }

    #[test]
    fn test_meal_correlation_without_meals() {
        let readings: Vec<Reading> = (0..5).map(|h| Reading::new(100.0, at(4, h))).collect();
        let config = analyzer_config();
        let section =
            ContextAnalyzer::new(&config).meal_correlation(&Normalizer::normalize(&readings));
        assert_eq!(section, Section::InsufficientData);
    }

    #[test]
    fn test_exercise_impact() {
        let mut readings = Vec::new();
        for (hour, minutes, value) in [
            (7, Some(30), 110.0),
            (9, Some(45), 100.0),
            (11, Some(20), 120.0),
            (13, Some(0), 150.0),
            (15, None, 170.0),
        ] {
            let mut r = Reading::new(value, at(4, hour));
            r.exercise_minutes = minutes;
            readings.push(r);
        }

        let config = analyzer_config();
        let section =
            ContextAnalyzer::new(&config).exercise_impact(&Normalizer::normalize(&readings));
        let impact = section.available().unwrap();

        assert_eq!(impact.exercise_readings, 3);
        assert_eq!(impact.exercise_average, Finite::new(110.0));
        assert_eq!(impact.no_exercise_average, Some(Finite::new(160.0)));
        assert_eq!(impact.exercise_benefit, Some(Finite::new(50.0)));
    }

    #[test]
    fn test_medication_needs_three_readings() {
        let mut readings = Vec::new();
        for (hour, taken) in [(7, Some(true)), (9, Some(true)), (11, Some(false)), (13, None)] {
            let mut r = Reading::new(120.0, at(4, hour));
            r.medication_taken = taken;
            readings.push(r);
        }
        let config = analyzer_config();
        let section = ContextAnalyzer::new(&config)
            .medication_effectiveness(&Normalizer::normalize(&readings));
        assert_eq!(section, Section::InsufficientData);
    }

    #[test]
    fn test_medication_effectiveness() {
        let mut readings = Vec::new();
        for (hour, taken, value) in [
            (7, true, 130.0),
            (9, true, 120.0),
            (11, true, 110.0),
            (13, false, 180.0),
        ] {
            let mut r = Reading::new(value, at(4, hour));
            r.medication_taken = Some(taken);
            readings.push(r);
        }
        let config = analyzer_config();
        let section = ContextAnalyzer::new(&config)
            .medication_effectiveness(&Normalizer::normalize(&readings));
        let impact = section.available().unwrap();

        assert_eq!(impact.with_medication_average, Finite::new(120.0));
        assert_eq!(impact.medication_effectiveness, Some(Finite::new(60.0)));
    }
}
