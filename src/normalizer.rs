//! Reading normalization
//!
//! This module turns readings into the chronologically ordered row table the
//! analysis stages work on.
//! - Rows sorted ascending by timestamp (stable, so ties keep input order)
//! - Hour of day, day of week and weekend flag derived from the timestamp
//! - No reading is dropped or deduplicated

use crate::schema::Reading;
use crate::types::NormalizedRow;
use chrono::{Datelike, Timelike};

/// Normalizer for converting readings to normalized rows
pub struct Normalizer;

impl Normalizer {
    /// Normalize a batch of readings
    pub fn normalize(readings: &[Reading]) -> Vec<NormalizedRow> {
        let mut rows: Vec<NormalizedRow> = readings.iter().map(normalize_reading).collect();
        rows.sort_by_key(|row| row.timestamp);
        rows
    }
}

fn normalize_reading(reading: &Reading) -> NormalizedRow {
    let day_of_week = reading.timestamp.weekday().num_days_from_monday();

    NormalizedRow {
        value: reading.value,
        timestamp: reading.timestamp,
        reading_context: reading.reading_context,
        meal_context: reading.meal_context,
        carbs_grams: reading.carbs_grams,
        exercise_minutes: reading.exercise_minutes,
        medication_taken: reading.medication_taken,
        stress_level: reading.stress_level,
        sleep_hours: reading.sleep_hours,
        hour: reading.timestamp.hour(),
        day_of_week,
        is_weekend: day_of_week >= 5,
    }
}

/// Glucose values of `rows`, in row order
pub fn values(rows: &[NormalizedRow]) -> Vec<f64> {
    rows.iter().map(|row| row.value).collect()
}
