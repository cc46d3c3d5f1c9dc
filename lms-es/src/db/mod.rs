//! Database access layer for lms-es

use chrono::{DateTime, Utc};
use lms_common::{Error, Result};
use uuid::Uuid;

pub mod courses;
pub mod enrollments;

/// Total wait budget for lock-retry on write operations
pub(crate) const MAX_LOCK_WAIT_MS: u64 = 5000;

pub(crate) fn parse_uuid(value: &str, field: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", field, e)))
}

pub(crate) fn parse_timestamp(value: &str, field: &str) -> Result<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", field, e)))
        .map(|dt| dt.with_timezone(&Utc))
}
