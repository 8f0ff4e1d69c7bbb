//! Serialization-safe numerics
//!
//! Every floating point value that leaves the engine passes through [`Finite`],
//! which replaces NaN and infinities with 0.0. The statistics helpers here are
//! shared by all analysis stages so degenerate inputs are handled in one place.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// A finite `f64`. Non-finite inputs collapse to 0.0.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Finite(f64);

impl Finite {
    pub const ZERO: Finite = Finite(0.0);

    pub fn new(value: f64) -> Self {
        if value.is_finite() {
            Finite(value)
        } else {
            Finite(0.0)
        }
    }

    /// Sanitize then round to `decimals` places
    pub fn rounded(value: f64, decimals: i32) -> Self {
        Self::new(round_to(Self::new(value).0, decimals))
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl From<f64> for Finite {
    fn from(value: f64) -> Self {
        Finite::new(value)
    }
}

impl From<Finite> for f64 {
    fn from(value: Finite) -> Self {
        value.0
    }
}

impl fmt::Display for Finite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (ddof = 1). Zero when fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let Some(m) = mean(values) else {
        return 0.0;
    };
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    let std = (ss / (values.len() - 1) as f64).sqrt();
    if std.is_finite() {
        std
    } else {
        0.0
    }
}

/// Population standard deviation (ddof = 0), used for feature scaling
pub fn population_std(values: &[f64]) -> f64 {
    let Some(m) = mean(values) else {
        return 0.0;
    };
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    let std = (ss / values.len() as f64).sqrt();
    if std.is_finite() {
        std
    } else {
        0.0
    }
}

/// Most frequent value; ties resolve to the smallest value.
pub fn mode<T, I>(values: I) -> Option<T>
where
    T: Copy + Ord + Hash,
    I: IntoIterator<Item = T>,
{
    let mut counts: HashMap<T, usize> = HashMap::new();
    for v in values {
        *counts.entry(v).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|(va, ca), (vb, cb)| ca.cmp(cb).then_with(|| vb.cmp(va)))
        .map(|(v, _)| v)
}

/// Linear-interpolated quantile of an already sorted slice (`q` in 0..=1)
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}
