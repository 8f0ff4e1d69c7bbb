//! Trend estimation
//!
//! Closed-form ordinary least squares over (chronological index, glucose).
//! The fit drives the trend label, a qualitative strength, the recent-change
//! signal and a short extrapolated forecast.

use crate::config::{SampleConfig, TrendConfig};
use crate::normalizer::values;
use crate::numeric::{mean, Finite};
use crate::types::{
    Forecast, NormalizedRow, Reliability, Section, TrendAnalysis, TrendDirection, TrendLabel,
    TrendStrength,
};
use tracing::debug;

/// Fitted line `y = intercept + slope * x`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Least-squares fit of `values` against their index.
///
/// Returns `None` for fewer than two points. A constant series fits with
/// slope 0 and R² 0.
pub fn fit_line(values: &[f64]) -> Option<LinearFit> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let nf = n as f64;

    let (mut sx, mut sy, mut sxy, mut sxx) = (0.0, 0.0, 0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let x = i as f64;
        sx += x;
        sy += y;
        sxy += x * y;
        sxx += x * x;
    }

    let denom = nf * sxx - sx * sx;
    if denom == 0.0 {
        return None;
    }
    let slope = (nf * sxy - sx * sy) / denom;
    let intercept = (sy - slope * sx) / nf;

    let y_mean = sy / nf;
    let (mut ss_res, mut ss_tot) = (0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let predicted = intercept + slope * i as f64;
        ss_res += (y - predicted).powi(2);
        ss_tot += (y - y_mean).powi(2);
    }
    let r_squared = if ss_tot > 0.0 {
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    } else {
        0.0
    };

    Some(LinearFit {
        slope,
        intercept,
        r_squared,
    })
}

/// Estimator for the trend section
pub struct TrendEstimator<'a> {
    config: &'a TrendConfig,
    sample: &'a SampleConfig,
}

impl<'a> TrendEstimator<'a> {
    pub fn new(config: &'a TrendConfig, sample: &'a SampleConfig) -> Self {
        Self { config, sample }
    }

    pub fn estimate(&self, rows: &[NormalizedRow]) -> TrendAnalysis {
        let values = values(rows);
        if values.len() < self.sample.min_trend_readings {
            return TrendAnalysis::placeholder(TrendLabel::InsufficientData);
        }
        let Some(fit) = fit_line(&values) else {
            return TrendAnalysis::placeholder(TrendLabel::InsufficientData);
        };

        let (trend, direction) = if fit.slope.abs() < self.config.stable_slope {
            (TrendLabel::Stable, TrendDirection::Stable)
        } else if fit.slope > 0.0 {
            (TrendLabel::Increasing, TrendDirection::Upward)
        } else {
            (TrendLabel::Decreasing, TrendDirection::Downward)
        };

        debug!(
            readings = values.len(),
            slope = fit.slope,
            r_squared = fit.r_squared,
            "trend fitted"
        );

        TrendAnalysis {
            trend,
            direction,
            slope: Finite::rounded(fit.slope, 3),
            intercept: Finite::rounded(fit.intercept, 1),
            r_squared: Finite::rounded(fit.r_squared, 3),
            recent_change: Finite::rounded(self.recent_change(&values), 1),
            trend_strength: self.strength(fit.r_squared),
            predictions: Section::Available(self.forecast(&fit, values.len())),
        }
    }

    fn strength(&self, r_squared: f64) -> TrendStrength {
        if r_squared > self.config.strong_r_squared {
            TrendStrength::Strong
        } else if r_squared > self.config.moderate_r_squared {
            TrendStrength::Moderate
        } else {
            TrendStrength::Weak
        }
    }

    /// Mean of the recent window minus mean of everything before it
    fn recent_change(&self, values: &[f64]) -> f64 {
        let window = self.config.recent_window;
        if window == 0 || values.len() <= window {
            return 0.0;
        }
        let (earlier, recent) = values.split_at(values.len() - window);
        match (mean(recent), mean(earlier)) {
            (Some(r), Some(e)) => r - e,
            _ => 0.0,
        }
    }

    fn forecast(&self, fit: &LinearFit, n: usize) -> Forecast {
        let predictions: Vec<Finite> = (0..self.config.forecast_steps)
            .map(|step| Finite::rounded(fit.predict((n + step) as f64), 1))
            .collect();

        let reliability = if fit.r_squared > self.config.strong_r_squared {
            Reliability::High
        } else if fit.r_squared > self.config.moderate_r_squared {
            Reliability::Moderate
        } else {
            Reliability::Low
        };

        Forecast {
            next_reading_prediction: predictions.first().copied().unwrap_or(Finite::ZERO),
            short_term_predictions: predictions,
            confidence_score: Finite::rounded(fit.r_squared, 3),
            prediction_reliability: reliability,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::normalizer::Normalizer;
    use crate::schema::Reading;
    use chrono::{Duration, TimeZone, Utc};

    fn rows(values: &[f64]) -> Vec<NormalizedRow> {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 6, 0, 0).unwrap();
        let readings: Vec<Reading> = values
            .iter()
            .enumerate()
            .map(|(i, v)| Reading::new(*v, start + Duration::hours(4 * i as i64)))
            .collect();
        Normalizer::normalize(&readings)
    }

    fn estimate(values: &[f64]) -> TrendAnalysis {
        let config = AnalysisConfig::default();
        TrendEstimator::new(&config.trend, &config.sample).estimate(&rows(values))
    }

    #[test]
    fn test_fit_line_exact() {
        let fit = fit_line(&[1.0, 3.0, 5.0, 7.0]).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!((fit.intercept - 1.0).abs() < 1e-12);
        assert!((fit.r_squared - 1.0).abs() < 1e-12);
        assert!(fit_line(&[4.0]).is_none());
    }

    #[test]
    fn test_linear_increase_is_strong() {
        let values: Vec<f64> = (0..10).map(|i| 100.0 + 200.0 * i as f64 / 9.0).collect();
        let trend = estimate(&values);

        assert_eq!(trend.trend, TrendLabel::Increasing);
        assert_eq!(trend.direction, TrendDirection::Upward);
        assert_eq!(trend.trend_strength, TrendStrength::Strong);
        assert!((trend.r_squared.get() - 1.0).abs() < 1e-9);
        assert!((trend.slope.get() - 22.222).abs() < 1e-9);

        let forecast = trend.predictions.available().unwrap();
        assert_eq!(forecast.short_term_predictions.len(), 3);
        assert!((forecast.next_reading_prediction.get() - 322.2).abs() < 1e-9);
        assert_eq!(forecast.prediction_reliability, Reliability::High);
    }

    #[test]
    fn test_decreasing_trend() {
        let trend = estimate(&[220.0, 200.0, 185.0, 160.0, 150.0]);
        assert_eq!(trend.trend, TrendLabel::Decreasing);
        assert!(trend.slope.get() < 0.0);
    }

    #[test]
    fn test_constant_series_is_stable_and_weak() {
        let trend = estimate(&[120.0; 6]);

        assert_eq!(trend.trend, TrendLabel::Stable);
        assert_eq!(trend.direction, TrendDirection::Stable);
        assert_eq!(trend.slope, Finite::ZERO);
        assert_eq!(trend.r_squared, Finite::ZERO);
        assert_eq!(trend.trend_strength, TrendStrength::Weak);
    }

    #[test]
    fn test_small_slope_is_stable() {
        let trend = estimate(&[90.0, 95.0, 100.0, 105.0].map(|v| v / 20.0 + 100.0));
        assert_eq!(trend.trend, TrendLabel::Stable);
    }

    #[test]
    fn test_recent_change() {
        // 3 earlier readings at 100, 7 recent at 150
        let mut values = vec![100.0; 3];
        values.extend(vec![150.0; 7]);
        assert_eq!(estimate(&values).recent_change.get(), 50.0);

        // exactly the window size: no earlier readings
        assert_eq!(estimate(&[150.0; 7]).recent_change, Finite::ZERO);
    }

    #[test]
    fn test_too_few_readings() {
        let trend = estimate(&[100.0, 110.0]);
        assert_eq!(trend.trend, TrendLabel::InsufficientData);
        assert_eq!(trend.slope, Finite::ZERO);
        assert_eq!(trend.predictions, Section::InsufficientData);
    }
}
