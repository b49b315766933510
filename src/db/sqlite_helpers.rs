//! SQLite helper utilities for type conversion
//!
//! SQLite has no UUID, boolean or timestamp types. Identifiers are stored as
//! TEXT, booleans as 0/1 INTEGER and timestamps as fixed-precision RFC 3339
//! TEXT in UTC so that string comparison orders them chronologically.

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use super::error::{DbError, DbResult};

// ============================================================================
// UUID Helpers
// ============================================================================

#[inline]
pub fn uuid_to_str(id: Uuid) -> String {
    id.to_string()
}

/// Parse a SQLite string back to a UUID
#[inline]
pub fn str_to_uuid(s: &str) -> DbResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DbError::Decode(format!("invalid UUID '{}': {}", s, e)))
}

#[inline]
pub fn str_to_uuid_opt(s: Option<&str>) -> DbResult<Option<Uuid>> {
    s.map(str_to_uuid).transpose()
}

// ============================================================================
// Timestamp Helpers
// ============================================================================

/// Convert a chrono DateTime to its stored form
#[inline]
pub fn datetime_to_str(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
pub fn str_to_datetime(s: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite's datetime() format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| DbError::Decode(format!("invalid datetime '{}': {}", s, e)))
}

// ============================================================================
// Boolean Helpers (SQLite uses 0/1 integers)
// ============================================================================

#[inline]
pub fn bool_to_int(b: bool) -> i64 {
    if b { 1 } else { 0 }
}

#[inline]
pub fn int_to_bool(i: i64) -> bool {
    i != 0
}

// ============================================================================
// Query Building Helpers
// ============================================================================

/// Numbered placeholder list for an `IN (...)` clause, starting at `?{start}`
pub fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}
