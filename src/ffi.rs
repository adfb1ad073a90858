//! FFI interface for C/C++ hosts
//!
//! Markup is passed as a pointer and length, everything else as
//! null-terminated JSON or plain strings. Results come back as JSON.

use std::ffi::{c_char, CStr, CString};
use std::ptr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::analyzer::AutoExtractor;
use crate::links::origin;
use crate::pipeline::{SearchPipeline, SearchStageSpec};
use crate::scanner::ParseMode;

/// Result struct returned to the host.
/// Both pointers are owned by Rust and must be freed via `fx_free_result`
#[repr(C)]
pub struct FfiResult {
    /// JSON-serialized result (null-terminated)
    pub json_ptr: *mut c_char,
    /// Error message if extraction failed (null-terminated), or null on success
    pub error_ptr: *mut c_char,
}

/// Request accepted by `fx_extract`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractRequest {
    /// URL the markup was fetched from; links resolve against its host
    pub page_url: String,
    #[serde(default)]
    pub stages: Vec<SearchStageSpec>,
    #[serde(default)]
    pub mode: ParseMode,
}

/// Run search stages over a page.
///
/// # Arguments
/// * `html_ptr` - Pointer to markup (UTF-8, not necessarily null-terminated)
/// * `html_len` - Length of the markup in bytes
/// * `request_json` - JSON-serialized `ExtractRequest` (null-terminated)
///
/// # Returns
/// `FfiResult` with json_ptr set to `{"nodes": [...], "records": [...]}` on
/// success, or error_ptr set on failure
///
/// # Safety
/// - `html_ptr` must point to valid memory of at least `html_len` bytes
/// - `request_json` must be a valid null-terminated C string
/// - Caller must free the result via `fx_free_result`
#[no_mangle]
pub unsafe extern "C" fn fx_extract(
    html_ptr: *const c_char,
    html_len: usize,
    request_json: *const c_char,
) -> FfiResult {
    let html = match read_html(html_ptr, html_len) {
        Ok(html) => html,
        Err(msg) => return make_error_result(msg),
    };

    let request_str = match read_c_str(request_json, "request JSON") {
        Ok(s) => s,
        Err(msg) => return make_error_result(&msg),
    };

    let request: ExtractRequest = match serde_json::from_str(request_str) {
        Ok(r) => r,
        Err(e) => {
            return make_error_result(&format!("Failed to parse request JSON: {}", e));
        }
    };

    let page_url = match Url::parse(&request.page_url) {
        Ok(u) => u,
        Err(e) => {
            return make_error_result(&format!("Invalid page url {}: {}", request.page_url, e));
        }
    };

    let tree = request.mode.parse(html);
    let output = SearchPipeline::new(&request.stages).run(&tree, &page_url);
    make_json_result(&output)
}

/// Run the schema-less heuristics over a page.
///
/// # Safety
/// - `html_ptr` must point to valid memory of at least `html_len` bytes
/// - `page_url` must be a valid null-terminated C string
/// - Caller must free the result via `fx_free_result`
#[no_mangle]
pub unsafe extern "C" fn fx_auto_extract(
    html_ptr: *const c_char,
    html_len: usize,
    page_url: *const c_char,
) -> FfiResult {
    let html = match read_html(html_ptr, html_len) {
        Ok(html) => html,
        Err(msg) => return make_error_result(msg),
    };

    let url_str = match read_c_str(page_url, "page url") {
        Ok(s) => s,
        Err(msg) => return make_error_result(&msg),
    };

    let base = match Url::parse(url_str) {
        Ok(u) => origin(&u),
        Err(e) => return make_error_result(&format!("Invalid page url {}: {}", url_str, e)),
    };

    let tree = ParseMode::Markup.parse(html);
    let summary = AutoExtractor::new(base).summarize(&tree);
    make_json_result(&summary)
}

/// Free a result returned by any `fx_*` function
///
/// # Safety
/// - `result` must have been returned by this library
/// - Must only be called once per result
#[no_mangle]
pub unsafe extern "C" fn fx_free_result(result: FfiResult) {
    if !result.json_ptr.is_null() {
        drop(CString::from_raw(result.json_ptr));
    }
    if !result.error_ptr.is_null() {
        drop(CString::from_raw(result.error_ptr));
    }
}

/// Install a stderr log subscriber filtered by `RUST_LOG`.
/// Returns false when a subscriber was already installed.
#[no_mangle]
pub extern "C" fn fx_init_logging() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

unsafe fn read_html<'a>(html_ptr: *const c_char, html_len: usize) -> Result<&'a str, &'static str> {
    if html_ptr.is_null() || html_len == 0 {
        return Ok("");
    }
    let slice = std::slice::from_raw_parts(html_ptr as *const u8, html_len);
    std::str::from_utf8(slice).map_err(|_| "Invalid UTF-8 in HTML content")
}

unsafe fn read_c_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str, String> {
    if ptr.is_null() {
        return Err(format!("{} is null", what));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| format!("Invalid UTF-8 in {}", what))
}

fn make_json_result<T: Serialize>(value: &T) -> FfiResult {
    match serde_json::to_string(value) {
        Ok(json) => match CString::new(json) {
            Ok(cstr) => FfiResult {
                json_ptr: cstr.into_raw(),
                error_ptr: ptr::null_mut(),
            },
            Err(_) => make_error_result("Result JSON contains null bytes"),
        },
        Err(e) => make_error_result(&format!("Failed to serialize result: {}", e)),
    }
}

// Helper to create error result
fn make_error_result(msg: &str) -> FfiResult {
    let error_cstr = CString::new(msg)
        .unwrap_or_else(|_| CString::from(c"Unknown error"));
    FfiResult {
        json_ptr: ptr::null_mut(),
        error_ptr: error_cstr.into_raw(),
    }
}
