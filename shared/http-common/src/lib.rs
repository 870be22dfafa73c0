//! Shared HTTP utilities for the control tower workspace.
//!
//! Provides the JSON error envelope and the date formatting used by the
//! api-server's response DTOs. Framework-agnostic on purpose.

use chrono::{NaiveDate, NaiveDateTime, Timelike};

// ============================================================================
// JSON Response Helpers (framework-agnostic)
// ============================================================================

/// Create a structured error JSON with a default message based on the code.
///
/// Returns: `{"error": {"code": "<code>", "message": "<default message>"}}`
pub fn json_err(code: &str) -> serde_json::Value {
    let message = match code {
        "not_found" => "Resource not found",
        "bad_request" => "Bad request",
        "db_unavailable" => "Database unavailable",
        "error" | "internal" => "Internal server error",
        _ => code, // Fallback to code as message for unknown codes
    };
    serde_json::json!({"error": {"code": code, "message": message}})
}

/// Create a structured error JSON with a custom message.
///
/// Returns: `{"error": {"code": "<code>", "message": "<message>"}}`
pub fn json_error_with_message(code: &str, message: &str) -> serde_json::Value {
    serde_json::json!({"error": {"code": code, "message": message}})
}

// ============================================================================
// Date Formatting
// ============================================================================

/// Format a calendar date as ISO 8601 (`YYYY-MM-DD`).
pub fn date_to_iso(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// Format a timestamp without zone as ISO 8601.
///
/// Seconds are always present. Sub-second precision is whole microseconds,
/// six digits, and only when non-zero: `2024-05-01T08:30:00` or
/// `2024-05-01T08:30:00.250000`.
pub fn datetime_to_iso(t: NaiveDateTime) -> String {
    if t.nanosecond() / 1_000 == 0 {
        t.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        t.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}
