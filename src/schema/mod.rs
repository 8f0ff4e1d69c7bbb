//! glucose.reading.v1 input schema
//!
//! Readings, target ranges, and request documents as they arrive from the
//! surrounding system, plus the adapter that parses and validates them.

mod adapter;
mod reading;

pub use adapter::*;
pub use reading::*;
