//! Pattern identification
//!
//! Two layers over the row table:
//! - Deterministic time-of-day and day-of-week aggregation
//! - Behavioral k-means clustering on standardized features
//!
//! A clustering failure only marks `ml_clusters` unavailable.

use crate::cluster::{KMeans, KMeansFit};
use crate::config::{ClusteringConfig, SampleConfig};
use crate::error::ComputeError;
use crate::features::{FeatureDeriver, FeatureSet};
use crate::numeric::{mean, mode, Finite};
use crate::types::{
    ClusterAnalysis, ClusterPattern, NormalizedRow, PatternAnalysis, Section, SectionStatus,
    WeekendComparison,
};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Identifier for the patterns section
pub struct PatternIdentifier<'a> {
    config: &'a ClusteringConfig,
    sample: &'a SampleConfig,
}

impl<'a> PatternIdentifier<'a> {
    pub fn new(config: &'a ClusteringConfig, sample: &'a SampleConfig) -> Self {
        Self { config, sample }
    }

    pub fn identify(&self, rows: &[NormalizedRow]) -> PatternAnalysis {
        if rows.is_empty() {
            return PatternAnalysis::empty(SectionStatus::InsufficientData);
        }

        let hourly = bucket_means(rows, |row| row.hour);
        let daily = bucket_means(rows, |row| row.day_of_week);
        let (peak_hour, lowest_hour) = extremes(&hourly);

        PatternAnalysis {
            status: SectionStatus::Available,
            hourly_averages: rounded(&hourly),
            peak_hour,
            lowest_hour,
            daily_averages: rounded(&daily),
            weekend_vs_weekday: weekend_comparison(rows),
            ml_clusters: self.cluster_section(rows),
        }
    }

    fn cluster_section(&self, rows: &[NormalizedRow]) -> Section<ClusterAnalysis> {
        if rows.len() < self.sample.min_cluster_readings {
            return Section::InsufficientData;
        }
        match self.cluster(rows) {
            Ok(analysis) => Section::Available(analysis),
            Err(e) => {
                warn!(error = %e, "behavioral clustering unavailable");
                Section::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Cluster rows into behavioral patterns
    pub fn cluster(&self, rows: &[NormalizedRow]) -> Result<ClusterAnalysis, ComputeError> {
        let k = self
            .config
            .max_clusters
            .min(rows.len() / self.config.readings_per_cluster.max(1));
        if k == 0 {
            return Err(ComputeError::ClusteringFailed(
                "not enough readings for a single cluster".into(),
            ));
        }

        let matrix = FeatureDeriver::derive_standardized(rows, FeatureSet::Behavioral);
        let fit = KMeans {
            k,
            max_iterations: self.config.max_iterations,
            n_init: self.config.n_init,
            seed: self.config.seed,
        }
        .fit(&matrix.rows)?;

        debug!(
            clusters = k,
            iterations = fit.iterations,
            inertia = fit.inertia,
            "k-means converged"
        );

        Ok(self.describe(rows, fit))
    }

    fn describe(&self, rows: &[NormalizedRow], fit: KMeansFit) -> ClusterAnalysis {
        let sizes = fit.sizes();
        let mut clusters = BTreeMap::new();

        for (cluster, &size) in sizes.iter().enumerate() {
            let members: Vec<&NormalizedRow> = rows
                .iter()
                .zip(&fit.assignments)
                .filter(|(_, &a)| a == cluster)
                .map(|(row, _)| row)
                .collect();
            clusters.insert(pattern_key(cluster), self.pattern(&members, size));
        }

        // largest cluster, lowest index on ties
        let dominant = sizes
            .iter()
            .enumerate()
            .fold((0, 0), |best, (i, &s)| if s > best.1 { (i, s) } else { best })
            .0;

        ClusterAnalysis {
            n_clusters: sizes.len(),
            clusters,
            dominant_pattern: pattern_key(dominant),
            assignments: fit.assignments,
            inertia: Finite::rounded(fit.inertia, 3),
            iterations: fit.iterations,
        }
    }

    fn pattern(&self, members: &[&NormalizedRow], size: usize) -> ClusterPattern {
        let glucose: Vec<f64> = members.iter().map(|r| r.value).collect();
        let carbs: Vec<f64> = members.iter().map(|r| r.carbs()).collect();
        let exercise: Vec<f64> = members.iter().map(|r| r.exercise()).collect();

        let avg_glucose = mean(&glucose).unwrap_or(0.0);
        let avg_carbs = mean(&carbs).unwrap_or(0.0);
        let common_time = mode(members.iter().map(|r| r.hour)).unwrap_or(0);
        let common_context = mode(members.iter().map(|r| r.reading_context)).unwrap_or_default();

        let level = if avg_glucose > self.config.elevated_glucose {
            "elevated"
        } else if avg_glucose > self.config.optimal_glucose {
            "optimal"
        } else {
            "low"
        };
        let time = match common_time {
            0..=11 => "morning",
            12..=17 => "afternoon",
            _ => "evening",
        };
        let intake = if avg_carbs > 50.0 {
            "higher"
        } else if avg_carbs > 20.0 {
            "moderate"
        } else {
            "lower"
        };

        ClusterPattern {
            avg_glucose: Finite::rounded(avg_glucose, 1),
            common_time,
            common_context,
            avg_carbs: Finite::rounded(avg_carbs, 1),
            avg_exercise: Finite::rounded(mean(&exercise).unwrap_or(0.0), 1),
            pattern_frequency: size,
            description: format!(
                "{level} glucose levels during {time} with {intake} carbohydrate intake (mostly {} readings)",
                common_context.as_str()
            ),
        }
    }
}

fn pattern_key(index: usize) -> String {
    format!("pattern_{index}")
}

fn bucket_means<F>(rows: &[NormalizedRow], key: F) -> BTreeMap<u32, f64>
where
    F: Fn(&NormalizedRow) -> u32,
{
    let mut buckets: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for row in rows {
        buckets.entry(key(row)).or_default().push(row.value);
    }
    buckets
        .into_iter()
        .filter_map(|(k, values)| mean(&values).map(|m| (k, m)))
        .collect()
}

fn rounded(means: &BTreeMap<u32, f64>) -> BTreeMap<u32, Finite> {
    means
        .iter()
        .map(|(k, v)| (*k, Finite::rounded(*v, 1)))
        .collect()
}

/// (peak, lowest) bucket; ties resolve to the earliest hour
fn extremes(means: &BTreeMap<u32, f64>) -> (Option<u32>, Option<u32>) {
    let mut peak: Option<(u32, f64)> = None;
    let mut lowest: Option<(u32, f64)> = None;
    for (&hour, &m) in means {
        if peak.map_or(true, |(_, p)| m > p) {
            peak = Some((hour, m));
        }
        if lowest.map_or(true, |(_, l)| m < l) {
            lowest = Some((hour, m));
        }
    }
    (peak.map(|p| p.0), lowest.map(|l| l.0))
}

fn weekend_comparison(rows: &[NormalizedRow]) -> WeekendComparison {
    let (weekend, weekday): (Vec<&NormalizedRow>, Vec<&NormalizedRow>) =
        rows.iter().partition(|r| r.is_weekend);
    let weekend_avg = mean(&weekend.iter().map(|r| r.value).collect::<Vec<_>>());
    let weekday_avg = mean(&weekday.iter().map(|r| r.value).collect::<Vec<_>>());

    WeekendComparison {
        weekend_avg: weekend_avg.map(|v| Finite::rounded(v, 1)),
        weekday_avg: weekday_avg.map(|v| Finite::rounded(v, 1)),
        difference: match (weekend_avg, weekday_avg) {
            (Some(we), Some(wd)) => Some(Finite::rounded(we - wd, 1)),
            _ => None,
        },
    }
}
