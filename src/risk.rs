//! Risk assessment
//!
//! Three independent axes (variability, hypoglycemia, hyperglycemia) mapped
//! to levels, then combined into an additive score:
//!
//! ```text
//! score = Σ high_weight per high axis
//!       + Σ moderate_weight per moderate axis
//!       + tir_critical_points if TIR < tir_critical
//!         else tir_low_points if TIR < tir_low
//! ```

use crate::config::{EpisodeAxisConfig, RiskConfig};
use crate::normalizer::values;
use crate::numeric::Finite;
use crate::overview::percentage;
use crate::types::{
    EpisodeRisk, NormalizedRow, Overview, RiskAssessment, RiskLevel, Section, SectionStatus,
    VariabilityRisk,
};

/// Assessor for the risk section
pub struct RiskAssessor<'a> {
    config: &'a RiskConfig,
}

impl<'a> RiskAssessor<'a> {
    pub fn new(config: &'a RiskConfig) -> Self {
        Self { config }
    }

    pub fn assess(&self, rows: &[NormalizedRow], overview: &Overview) -> Section<RiskAssessment> {
        if overview.status != SectionStatus::Available || rows.is_empty() {
            return Section::InsufficientData;
        }
        let values = values(rows);

        let cv = overview.coefficient_variation.get();
        let variability = VariabilityRisk {
            level: self.variability_level(cv),
            coefficient_variation: overview.coefficient_variation,
        };
        let hypoglycemia = episode_axis(
            &self.config.hypoglycemia,
            values.iter().filter(|v| **v < self.config.hypoglycemia.threshold).count(),
            values.len(),
        );
        let hyperglycemia = episode_axis(
            &self.config.hyperglycemia,
            values.iter().filter(|v| **v > self.config.hyperglycemia.threshold).count(),
            values.len(),
        );

        let tir = overview.time_in_range.get();
        let score = self.score(
            [variability.level, hypoglycemia.level, hyperglycemia.level],
            tir,
        );
        let level = self.level(score);

        let mut factors = Vec::new();
        if variability.level != RiskLevel::Low {
            factors.push(format!(
                "{} glycemic variability (CV {:.1}%)",
                variability.level.as_str(),
                cv
            ));
        }
        if hypoglycemia.episodes > 0 {
            factors.push(format!(
                "{} reading(s) below {}",
                hypoglycemia.episodes, hypoglycemia.threshold
            ));
        }
        if hyperglycemia.episodes > 0 {
            factors.push(format!(
                "{} reading(s) above {}",
                hyperglycemia.episodes, hyperglycemia.threshold
            ));
        }
        if tir < self.config.tir_low {
            factors.push(format!("time in range {tir:.1}%"));
        }

        Section::Available(RiskAssessment {
            level,
            score,
            variability,
            hypoglycemia,
            hyperglycemia,
            time_in_range: overview.time_in_range,
            factors,
            message: format!("Overall glycemic risk is {}", level.as_str()),
        })
    }

    fn variability_level(&self, cv: f64) -> RiskLevel {
        if cv > self.config.cv_high {
            RiskLevel::High
        } else if cv > self.config.cv_moderate {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        }
    }

    /// Weighted sum of axis levels plus the time-in-range penalty
    pub fn score(&self, axes: [RiskLevel; 3], time_in_range: f64) -> u32 {
        let axis_points: u32 = axes
            .iter()
            .map(|level| match level {
                RiskLevel::High => self.config.high_weight,
                RiskLevel::Moderate => self.config.moderate_weight,
                RiskLevel::Low => 0,
            })
            .sum();

        let tir_points = if time_in_range < self.config.tir_critical {
            self.config.tir_critical_points
        } else if time_in_range < self.config.tir_low {
            self.config.tir_low_points
        } else {
            0
        };

        axis_points + tir_points
    }

    pub fn level(&self, score: u32) -> RiskLevel {
        if score >= self.config.high_score {
            RiskLevel::High
        } else if score >= self.config.moderate_score {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        }
    }
}

fn episode_axis(config: &EpisodeAxisConfig, episodes: usize, total: usize) -> EpisodeRisk {
    let pct = percentage(episodes, total);
    let level = if episodes > 0 && pct.get() >= config.high_percentage {
        RiskLevel::High
    } else if episodes > 0 {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    };

    EpisodeRisk {
        level,
        episodes,
        percentage: pct,
        threshold: Finite::new(config.threshold),
    }
}
