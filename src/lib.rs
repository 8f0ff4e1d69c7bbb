//! Gluco Flux - deterministic analytics engine for blood-glucose readings
//!
//! Gluco Flux turns a batch of glucose readings into a structured analysis
//! through a single forward pass: normalization → overview → trend → patterns
//! → anomalies → contextual impact → risk → recommendations.
//!
//! ## Modules
//!
//! - **Schema**: `glucose.reading.v1` readings, target ranges and request documents
//! - **Pipeline**: [`GlucoseAnalyzer`] and the JSON entry point [`analyze_request`]
//! - **Stages**: one module per analysis section, each usable on its own

pub mod anomaly;
pub mod cluster;
pub mod config;
pub mod context;
pub mod encoder;
pub mod error;
pub mod features;
pub mod isolation;
pub mod normalizer;
pub mod numeric;
pub mod overview;
pub mod patterns;
pub mod pipeline;
pub mod recommendations;
pub mod risk;
pub mod schema;
pub mod trend;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::{AnalysisConfig, ConfigError};
pub use encoder::ReportEncoder;
pub use error::ComputeError;
pub use numeric::Finite;
pub use pipeline::{analyze_request, GlucoseAnalyzer};
pub use types::{AnalysisReport, AnalysisResult, AnalysisStatus, Section};

// Schema exports
pub use schema::{
    AnalysisRequest, GlucoseUnit, Reading, ReadingAdapter, ReadingContext, TargetRange,
    SCHEMA_VERSION,
};

/// Library version embedded in all reports
pub const GLUCO_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "gluco-flux";
