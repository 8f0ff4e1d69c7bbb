//! Adapter for ingesting glucose.reading.v1 documents
//!
//! Parses readings from a JSON array, NDJSON, or a full request document,
//! enforces the unit invariant, and applies the ingestion cap.

use crate::error::ComputeError;
use crate::schema::reading::*;
use tracing::warn;

/// Adapter for turning caller payloads into validated readings
pub struct ReadingAdapter;

impl ReadingAdapter {
    /// Parse a JSON string containing an array of Readings
    pub fn parse_array(json: &str) -> Result<Vec<Reading>, ComputeError> {
        let readings: Vec<Reading> = serde_json::from_str(json)?;
        Ok(readings)
    }

    /// Parse NDJSON (newline-delimited JSON) containing Readings
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<Reading>, ComputeError> {
        let mut readings = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Reading>(trimmed) {
                Ok(reading) => readings.push(reading),
                Err(e) => {
                    return Err(ComputeError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(readings)
    }

    /// Parse a full analysis request document
    pub fn parse_request(json: &str) -> Result<AnalysisRequest, ComputeError> {
        let request: AnalysisRequest = serde_json::from_str(json)?;
        Ok(request)
    }

    /// Validate a request and prepare its readings for analysis.
    ///
    /// Every reading must satisfy its invariants and share the request unit.
    /// When more than `max_readings` are supplied, only the most recent are kept.
    pub fn prepare(
        request: AnalysisRequest,
        max_readings: usize,
    ) -> Result<(Vec<Reading>, TargetRange), ComputeError> {
        request
            .validate()
            .map_err(|e| match e {
                ValidationError::InvalidRange { .. } => {
                    ComputeError::InvalidTargetRange(e.to_string())
                }
                other => ComputeError::ParseError(other.to_string()),
            })?;

        for (idx, reading) in request.readings.iter().enumerate() {
            reading
                .validate()
                .map_err(|e| ComputeError::InvalidReading(format!("reading {idx}: {e}")))?;

            if reading.unit != request.unit {
                return Err(ComputeError::MixedUnits {
                    expected: request.unit.as_str().to_string(),
                    found: reading.unit.as_str().to_string(),
                });
            }
        }

        let readings = Self::cap_most_recent(request.readings, max_readings);
        Ok((readings, request.target_range))
    }

    /// Keep at most `max_readings`, preferring the most recent
    pub fn cap_most_recent(mut readings: Vec<Reading>, max_readings: usize) -> Vec<Reading> {
        if readings.len() <= max_readings {
            return readings;
        }

        warn!(
            supplied = readings.len(),
            kept = max_readings,
            "reading batch exceeds cap, dropping oldest readings"
        );
        readings.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        readings.split_off(readings.len() - max_readings)
    }

    /// Validate a batch of readings
    pub fn validate_readings(readings: &[Reading]) -> Vec<ValidationResult> {
        readings
            .iter()
            .enumerate()
            .map(|(idx, reading)| ValidationResult {
                index: idx,
                timestamp: reading.timestamp.to_rfc3339(),
                result: reading.validate().err(),
            })
            .filter(|r| r.result.is_some())
            .collect()
    }
}

/// Result of reading validation
#[derive(Debug)]
pub struct ValidationResult {
    pub index: usize,
    pub timestamp: String,
    pub result: Option<ValidationError>,
}
