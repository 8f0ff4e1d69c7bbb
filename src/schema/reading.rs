//! glucose.reading.v1 schema definitions
//!
//! The wire format for readings and analysis requests. Field names follow the
//! snake_case convention used throughout the output payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current input schema version
pub const SCHEMA_VERSION: &str = "glucose.reading.v1";

/// Default target range lower bound (mg/dL)
pub const DEFAULT_TARGET_MIN: f64 = 80.0;

/// Default target range upper bound (mg/dL)
pub const DEFAULT_TARGET_MAX: f64 = 180.0;

/// Glucose measurement unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GlucoseUnit {
    #[default]
    #[serde(rename = "mg/dL")]
    MgDl,
    #[serde(rename = "mmol/L")]
    MmolL,
}

impl GlucoseUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlucoseUnit::MgDl => "mg/dL",
            GlucoseUnit::MmolL => "mmol/L",
        }
    }
}

/// Situation in which a reading was taken
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingContext {
    Fasting,
    BeforeMeal,
    AfterMeal,
    Bedtime,
    #[default]
    Random,
    Exercise,
    Sick,
    Stress,
    Other,
}

impl ReadingContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingContext::Fasting => "fasting",
            ReadingContext::BeforeMeal => "before_meal",
            ReadingContext::AfterMeal => "after_meal",
            ReadingContext::Bedtime => "bedtime",
            ReadingContext::Random => "random",
            ReadingContext::Exercise => "exercise",
            ReadingContext::Sick => "sick",
            ReadingContext::Stress => "stress",
            ReadingContext::Other => "other",
        }
    }

    /// Stable ordinal used as a numeric feature
    pub fn code(&self) -> u8 {
        match self {
            ReadingContext::Fasting => 0,
            ReadingContext::BeforeMeal => 1,
            ReadingContext::AfterMeal => 2,
            ReadingContext::Bedtime => 3,
            ReadingContext::Random => 4,
            ReadingContext::Exercise => 5,
            ReadingContext::Sick => 6,
            ReadingContext::Stress => 7,
            ReadingContext::Other => 8,
        }
    }
}

/// Meal associated with a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealContext {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
    Other,
}

impl MealContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            MealContext::Breakfast => "breakfast",
            MealContext::Lunch => "lunch",
            MealContext::Dinner => "dinner",
            MealContext::Snack => "snack",
            MealContext::Other => "other",
        }
    }
}

/// A single blood-glucose reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Glucose value in `unit`
    pub value: f64,
    #[serde(default)]
    pub unit: GlucoseUnit,
    /// When the reading was taken (UTC)
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub reading_context: ReadingContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_context: Option<MealContext>,
    /// Carbohydrates consumed (grams)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbs_grams: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exercise_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medication_taken: Option<bool>,
    /// Accepted and validated for wire compatibility; no stage reads it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insulin_units: Option<f64>,
    /// Self-reported stress (1-10)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stress_level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_hours: Option<f64>,
    /// Accepted for wire compatibility; no stage reads it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub illness: Option<bool>,
}

impl Reading {
    /// Create a reading with only the required fields set
    pub fn new(value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            value,
            unit: GlucoseUnit::MgDl,
            timestamp,
            reading_context: ReadingContext::Random,
            meal_context: None,
            carbs_grams: None,
            exercise_minutes: None,
            medication_taken: None,
            insulin_units: None,
            stress_level: None,
            sleep_hours: None,
            illness: None,
        }
    }

    pub fn with_context(mut self, context: ReadingContext) -> Self {
        self.reading_context = context;
        self
    }

    /// Check the reading invariants: finite positive value, bounded optionals
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.value.is_finite() || self.value <= 0.0 {
            return Err(ValidationError::NonPositiveValue(self.value));
        }
        if let Some(stress) = self.stress_level {
            if !(1..=10).contains(&stress) {
                return Err(ValidationError::StressOutOfRange(stress));
            }
        }
        if let Some(sleep) = self.sleep_hours {
            if !sleep.is_finite() || !(0.0..=24.0).contains(&sleep) {
                return Err(ValidationError::SleepOutOfRange(sleep));
            }
        }
        if let Some(units) = self.insulin_units {
            if !units.is_finite() || units < 0.0 {
                return Err(ValidationError::NegativeInsulin(units));
            }
        }
        Ok(())
    }
}

/// Per-subject target band, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetRange {
    pub min: f64,
    pub max: f64,
}

impl Default for TargetRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_TARGET_MIN,
            max: DEFAULT_TARGET_MAX,
        }
    }
}

impl TargetRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min >= self.max {
            return Err(ValidationError::InvalidRange {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// A complete analysis request document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub target_range: TargetRange,
    /// Unit the caller analyzes in; every reading must match it
    #[serde(default)]
    pub unit: GlucoseUnit,
    pub readings: Vec<Reading>,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

impl AnalysisRequest {
    pub fn new(target_range: TargetRange, readings: Vec<Reading>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            target_range,
            unit: GlucoseUnit::MgDl,
            readings,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ValidationError::InvalidSchemaVersion {
                expected: SCHEMA_VERSION.to_string(),
                actual: self.schema_version.clone(),
            });
        }
        self.target_range.validate()
    }
}

/// Validation errors for readings and requests
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Glucose value must be finite and positive, got {0}")]
    NonPositiveValue(f64),

    #[error("Stress level must be between 1 and 10, got {0}")]
    StressOutOfRange(u8),

    #[error("Sleep hours must be between 0 and 24, got {0}")]
    SleepOutOfRange(f64),

    #[error("Insulin units must be non-negative, got {0}")]
    NegativeInsulin(f64),

    #[error("Target range requires min < max, got {min}..{max}")]
    InvalidRange { min: f64, max: f64 },
}
