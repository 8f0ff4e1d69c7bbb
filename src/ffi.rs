//! FFI bindings for Gluco Flux
//!
//! This module provides C-compatible functions for calling Gluco Flux from other languages.
//! All functions use C strings (null-terminated) and return allocated memory that
//! must be freed by the caller using `gluco_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::AnalysisConfig;
use crate::pipeline::{analyze_request, GlucoseAnalyzer};
use crate::schema::ReadingAdapter;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Analyze a glucose.reading.v1 request document and return the report JSON.
///
/// # Safety
/// - `request_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `gluco_free_string`.
/// - Returns NULL on error; call `gluco_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn gluco_analyze_json(request_json: *const c_char) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(request_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    match analyze_request(&json_str) {
        Ok(report) => string_to_cstr(&report),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Configured Analyzer API
// ============================================================================

/// Opaque handle to a GlucoseAnalyzer
pub struct GlucoAnalyzerHandle {
    analyzer: GlucoseAnalyzer,
}

/// Create an analyzer from a JSON configuration.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string, or NULL for defaults.
/// - Must be freed with `gluco_analyzer_free`.
/// - Returns NULL on an invalid configuration.
#[no_mangle]
pub unsafe extern "C" fn gluco_analyzer_new(config_json: *const c_char) -> *mut GlucoAnalyzerHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        AnalysisConfig::default()
    } else {
        let Some(json) = cstr_to_string(config_json) else {
            set_last_error("Invalid config string pointer");
            return ptr::null_mut();
        };
        match AnalysisConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    let handle = Box::new(GlucoAnalyzerHandle {
        analyzer: GlucoseAnalyzer::new(config),
    });
    Box::into_raw(handle)
}

/// Free an analyzer.
///
/// # Safety
/// - `analyzer` must be a valid pointer returned by `gluco_analyzer_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn gluco_analyzer_free(analyzer: *mut GlucoAnalyzerHandle) {
    if !analyzer.is_null() {
        drop(Box::from_raw(analyzer));
    }
}

/// Analyze a request document with a configured analyzer.
///
/// # Safety
/// - `analyzer` must be a valid pointer returned by `gluco_analyzer_new`.
/// - `request_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `gluco_free_string`.
/// - Returns NULL on error; call `gluco_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn gluco_analyzer_analyze(
    analyzer: *const GlucoAnalyzerHandle,
    request_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if analyzer.is_null() {
        set_last_error("Null analyzer pointer");
        return ptr::null_mut();
    }
    let handle = &*analyzer;

    let json_str = match cstr_to_string(request_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    let report = ReadingAdapter::parse_request(&json_str)
        .and_then(|request| handle.analyzer.analyze_request(request))
        .and_then(|report| {
            serde_json::to_string_pretty(&report).map_err(crate::error::ComputeError::JsonError)
        });

    match report {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Gluco Flux functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Gluco Flux function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn gluco_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Gluco Flux function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn gluco_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn gluco_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn sample_request_json() -> CString {
        CString::new(
            r#"{
            "schema_version": "glucose.reading.v1",
            "target_range": {"min": 80.0, "max": 180.0},
            "readings": [
                {"value": 98.0, "timestamp": "2024-03-04T07:00:00Z", "reading_context": "fasting"},
                {"value": 165.0, "timestamp": "2024-03-04T13:00:00Z", "reading_context": "after_meal"},
                {"value": 140.0, "timestamp": "2024-03-04T19:00:00Z"},
                {"value": 118.0, "timestamp": "2024-03-04T22:30:00Z", "reading_context": "bedtime"}
            ]
        }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_ffi_analyze_json() {
        let json = sample_request_json();

        unsafe {
            let result = gluco_analyze_json(json.as_ptr());
            assert!(!result.is_null());

            let result_str = CStr::from_ptr(result).to_str().unwrap();
            assert!(result_str.contains("report_version"));
            assert!(result_str.contains("\"status\": \"complete\""));

            gluco_free_string(result);
        }
    }

    #[test]
    fn test_ffi_analyzer_lifecycle() {
        unsafe {
            let analyzer = gluco_analyzer_new(ptr::null());
            assert!(!analyzer.is_null());

            let json = sample_request_json();
            let result = gluco_analyzer_analyze(analyzer, json.as_ptr());
            assert!(!result.is_null());
            gluco_free_string(result);

            gluco_analyzer_free(analyzer);
        }
    }

    #[test]
    fn test_ffi_rejects_bad_config() {
        unsafe {
            let config = CString::new(r#"{"unit": "furlongs"}"#).unwrap();
            let analyzer = gluco_analyzer_new(config.as_ptr());
            assert!(analyzer.is_null());
            assert!(!gluco_last_error().is_null());
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let invalid_json = CString::new("not json").unwrap();
            let result = gluco_analyze_json(invalid_json.as_ptr());

            assert!(result.is_null());

            let error = gluco_last_error();
            assert!(!error.is_null());

            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(!error_str.is_empty());
        }
    }

    #[test]
    fn test_ffi_null_pointer() {
        unsafe {
            assert!(gluco_analyze_json(ptr::null()).is_null());
            let error_str = CStr::from_ptr(gluco_last_error()).to_str().unwrap();
            assert_eq!(error_str, "Invalid JSON string pointer");
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = gluco_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
