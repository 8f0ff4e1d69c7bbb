//! Report encoding
//!
//! This module wraps an analysis result with producer metadata and the time
//! window of the analyzed readings, and serializes it to JSON.

use crate::error::ComputeError;
use crate::schema::Reading;
use crate::types::{AnalysisReport, AnalysisResult, ReportProducer, ReportWindow};
use crate::{GLUCO_VERSION, PRODUCER_NAME};
use chrono::Utc;
use uuid::Uuid;

/// Current report envelope version
pub const REPORT_VERSION: &str = "1.0.0";

/// Encoder for producing analysis reports
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    /// Wrap `analysis` of `readings` in a report envelope
    pub fn encode(&self, readings: &[Reading], analysis: AnalysisResult) -> AnalysisReport {
        let first = readings.iter().map(|r| r.timestamp).min();
        let last = readings.iter().map(|r| r.timestamp).max();

        AnalysisReport {
            report_version: REPORT_VERSION.to_string(),
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: GLUCO_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: Utc::now().to_rfc3339(),
            reading_count: readings.len(),
            window: ReportWindow {
                first_reading_utc: first.map(|t| t.to_rfc3339()),
                last_reading_utc: last.map(|t| t.to_rfc3339()),
            },
            analysis,
        }
    }

    /// Encode to a pretty JSON string
    pub fn encode_to_json(
        &self,
        readings: &[Reading],
        analysis: AnalysisResult,
    ) -> Result<String, ComputeError> {
        let report = self.encode(readings, analysis);
        serde_json::to_string_pretty(&report).map_err(ComputeError::JsonError)
    }
}
