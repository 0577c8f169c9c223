//! FFI bindings for Rapport Flux
//!
//! C-compatible functions for driving a scoring session from other languages.
//! All inputs and outputs are null-terminated JSON strings; returned strings
//! are owned by the caller and must be freed with `rapport_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use chrono::{DateTime, TimeZone, Utc};

use crate::canonical::Canonicalizer;
use crate::config::PipelineConfig;
use crate::encoder::SnapshotEncoder;
use crate::error::ComputeError;
use crate::pipeline::SessionPipeline;
use crate::schema::SessionEvent;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

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

/// Hand a JSON result to the caller, or record the error and return NULL
fn json_or_null(result: Result<String, ComputeError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Canonicalize one upstream analysis result.
///
/// # Safety
/// - `result_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `rapport_free_string`.
/// - Returns NULL on error; call `rapport_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn rapport_canonicalize(result_json: *const c_char) -> *mut c_char {
    clear_last_error();

    let json = match cstr_to_string(result_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    json_or_null(
        Canonicalizer::default()
            .canonicalize_json(&json)
            .and_then(|v| serde_json::to_string(&v).map_err(ComputeError::JsonError)),
    )
}

// ============================================================================
// Session API
// ============================================================================

/// Opaque handle to a scoring session
pub struct RapportSessionHandle {
    pipeline: SessionPipeline,
    encoder: SnapshotEncoder,
    last_event_at: Option<DateTime<Utc>>,
}

impl RapportSessionHandle {
    fn new(pipeline: SessionPipeline) -> Self {
        Self {
            pipeline,
            encoder: SnapshotEncoder::new(),
            last_event_at: None,
        }
    }
}

/// Create a session with default configuration.
///
/// # Safety
/// - Returns a pointer to a newly allocated session.
/// - Must be freed with `rapport_session_free`.
#[no_mangle]
pub unsafe extern "C" fn rapport_session_new() -> *mut RapportSessionHandle {
    clear_last_error();
    Box::into_raw(Box::new(RapportSessionHandle::new(SessionPipeline::new())))
}

/// Create a session from a JSON configuration.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string.
/// - Must be freed with `rapport_session_free`.
/// - Returns NULL on an invalid configuration; call `rapport_last_error`.
#[no_mangle]
pub unsafe extern "C" fn rapport_session_new_with_config(
    config_json: *const c_char,
) -> *mut RapportSessionHandle {
    clear_last_error();

    let json = match cstr_to_string(config_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid config string pointer");
            return ptr::null_mut();
        }
    };

    match PipelineConfig::from_json(&json).and_then(SessionPipeline::with_config) {
        Ok(pipeline) => Box::into_raw(Box::new(RapportSessionHandle::new(pipeline))),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a session.
///
/// # Safety
/// - `session` must be a valid pointer returned by `rapport_session_new*`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn rapport_session_free(session: *mut RapportSessionHandle) {
    if !session.is_null() {
        drop(Box::from_raw(session));
    }
}

/// Apply one session.event.v1 event and return its outcome as JSON.
///
/// # Safety
/// - `session` must be a valid pointer returned by `rapport_session_new*`.
/// - `event_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `rapport_free_string`.
/// - Returns NULL on error; call `rapport_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn rapport_session_apply_event(
    session: *mut RapportSessionHandle,
    event_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }
    let handle = &mut *session;

    let json = match cstr_to_string(event_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid event string pointer");
            return ptr::null_mut();
        }
    };

    let result = serde_json::from_str::<SessionEvent>(&json)
        .map_err(ComputeError::JsonError)
        .and_then(|event| {
            let outcome = handle.pipeline.apply(&event)?;
            handle.last_event_at = Some(event.timestamp);
            serde_json::to_string(&outcome).map_err(ComputeError::JsonError)
        });
    json_or_null(result)
}

/// Encode the session state as a score payload.
///
/// `timestamp_ms` is milliseconds since the Unix epoch; zero or negative uses
/// the timestamp of the last applied event (or the current time if none).
///
/// # Safety
/// - `session` must be a valid pointer returned by `rapport_session_new*`.
/// - Returns a newly allocated string that must be freed with `rapport_free_string`.
/// - Returns NULL on error; call `rapport_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn rapport_session_snapshot(
    session: *mut RapportSessionHandle,
    timestamp_ms: i64,
) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }
    let handle = &*session;

    let at = if timestamp_ms > 0 {
        match Utc.timestamp_millis_opt(timestamp_ms).single() {
            Some(at) => at,
            None => {
                set_last_error("Timestamp out of range");
                return ptr::null_mut();
            }
        }
    } else {
        handle.last_event_at.unwrap_or_else(Utc::now)
    };

    json_or_null(handle.encoder.encode_to_json(&handle.pipeline.snapshot(at)))
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Rapport functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Rapport function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn rapport_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next Rapport function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn rapport_last_error() -> *const c_char {
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
pub unsafe extern "C" fn rapport_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    unsafe fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = CStr::from_ptr(ptr).to_str().unwrap().to_string();
        rapport_free_string(ptr);
        s
    }

    #[test]
    fn test_ffi_canonicalize() {
        let json = CString::new(r#"{"scores": {"A": 73}, "posture_status": "good"}"#).unwrap();
        unsafe {
            let out = take_string(rapport_canonicalize(json.as_ptr()));
            let value: serde_json::Value = serde_json::from_str(&out).unwrap();
            assert_eq!(value["attention"], 73);
            assert_eq!(value["posture"], 85);
        }
    }

    #[test]
    fn test_ffi_canonicalize_rejects_non_object() {
        let json = CString::new("[1, 2]").unwrap();
        unsafe {
            assert!(rapport_canonicalize(json.as_ptr()).is_null());
            assert!(!rapport_last_error().is_null());
            assert!(rapport_canonicalize(ptr::null()).is_null());
        }
    }

    #[test]
    fn test_ffi_session_lifecycle() {
        let event = CString::new(
            r#"{"schema_version":"session.event.v1","timestamp":"2024-01-15T08:00:00Z","payload":{"type":"turn","role":"user","text":"안녕하세요?"}}"#,
        )
        .unwrap();

        unsafe {
            let session = rapport_session_new();
            assert!(!session.is_null());

            let outcome = take_string(rapport_session_apply_event(session, event.as_ptr()));
            assert!(outcome.contains(r#""kind":"turn""#));
            assert!(rapport_last_error().is_null());

            let payload = take_string(rapport_session_snapshot(session, 0));
            assert!(payload.contains("rapport.score.v1"));
            assert!(payload.contains("2024-01-15T08:00:00"));

            rapport_session_free(session);
        }
    }

    #[test]
    fn test_ffi_invalid_event() {
        let event = CString::new(
            r#"{"schema_version":"session.event.v1","timestamp":"2024-01-15T08:00:00Z","payload":{"type":"transport_error","status":9}}"#,
        )
        .unwrap();
        unsafe {
            let session = rapport_session_new();
            assert!(rapport_session_apply_event(session, event.as_ptr()).is_null());
            let err = CStr::from_ptr(rapport_last_error()).to_str().unwrap();
            assert!(err.contains("Invalid session event"));
            assert!(rapport_session_apply_event(ptr::null_mut(), event.as_ptr()).is_null());
            rapport_session_free(session);
        }
    }

    #[test]
    fn test_ffi_session_with_config() {
        let good = CString::new(r#"{"stabilizer": {"hold_duration_ms": 1000}}"#).unwrap();
        let bad = CString::new(r#"{"stabilizer": {"zero_warning_threshold": 0}}"#).unwrap();
        unsafe {
            let session = rapport_session_new_with_config(good.as_ptr());
            assert!(!session.is_null());
            rapport_session_free(session);

            assert!(rapport_session_new_with_config(bad.as_ptr()).is_null());
            assert!(!rapport_last_error().is_null());
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = CStr::from_ptr(rapport_version()).to_str().unwrap();
            assert_eq!(version, env!("CARGO_PKG_VERSION"));
        }
    }
}
