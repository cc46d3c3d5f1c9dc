//! Domain models shared by the LMS services
//!
//! Enrollments embed their per-item progress entries as a single JSON
//! document column, so a progress array is always read and written as one
//! unit with its parent enrollment row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Enrollment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Paused,
    Cancelled,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Completed => "completed",
            EnrollmentStatus::Paused => "paused",
            EnrollmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(EnrollmentStatus::Active),
            "completed" => Ok(EnrollmentStatus::Completed),
            "paused" => Ok(EnrollmentStatus::Paused),
            "cancelled" => Ok(EnrollmentStatus::Cancelled),
            other => Err(Error::InvalidInput(format!(
                "Unknown enrollment status: {}",
                other
            ))),
        }
    }
}

/// Payment snapshot recorded at enroll time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
    Free,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Free => "free",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            "free" => Ok(PaymentStatus::Free),
            other => Err(Error::InvalidInput(format!(
                "Unknown payment status: {}",
                other
            ))),
        }
    }
}

/// Per-content-item progress record, embedded in the enrollment's
/// progress JSON column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    /// Content item this entry tracks; not validated against the course
    /// structure on write
    pub item_id: Uuid,
    pub is_completed: bool,
    /// Cumulative minutes, additive across updates
    pub time_spent: i64,
    /// Set the first time the item is completed; never cleared afterwards,
    /// even if the item is later marked incomplete again
    pub completed_at: Option<DateTime<Utc>>,
    pub last_accessed_at: DateTime<Utc>,
}

/// Learner rating of a course, settable once enrolled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub score: i64,
    pub review: String,
    pub rated_at: DateTime<Utc>,
}

/// One learner's relationship to one course
///
/// Exactly one enrollment row exists per (learner_id, course_id) pair,
/// enforced by a unique compound index. Cancellation is a soft status
/// change; re-enrolling reactivates the same row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub guid: Uuid,
    pub learner_id: Uuid,
    pub course_id: Uuid,
    pub status: EnrollmentStatus,
    pub progress: Vec<ProgressEntry>,
    /// Derived from progress against the course's total item count;
    /// never set directly by callers
    pub completion_percentage: i64,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_accessed_at: DateTime<Utc>,
    pub payment_status: PaymentStatus,
    pub payment_amount: f64,
    pub rating: Option<Rating>,
    /// Optimistic concurrency counter, bumped on every save
    pub version: i64,
}

impl Enrollment {
    /// Create a new active enrollment with empty progress
    pub fn new(learner_id: Uuid, course_id: Uuid, course_price: f64) -> Self {
        let now = Utc::now();
        let payment_status = if course_price > 0.0 {
            PaymentStatus::Pending
        } else {
            PaymentStatus::Free
        };

        Self {
            guid: Uuid::new_v4(),
            learner_id,
            course_id,
            status: EnrollmentStatus::Active,
            progress: Vec::new(),
            completion_percentage: 0,
            enrolled_at: now,
            completed_at: None,
            last_accessed_at: now,
            payment_status,
            payment_amount: course_price,
            rating: None,
            version: 0,
        }
    }

    /// Number of progress entries marked completed
    pub fn completed_items_count(&self) -> usize {
        self.progress.iter().filter(|p| p.is_completed).count()
    }

    /// Total minutes spent across all tracked items
    pub fn total_time_spent(&self) -> i64 {
        self.progress.iter().map(|p| p.time_spent).sum()
    }

    /// Find the progress entry for an item, if the learner has touched it
    pub fn progress_entry(&self, item_id: Uuid) -> Option<&ProgressEntry> {
        self.progress.iter().find(|p| p.item_id == item_id)
    }

    pub fn progress_entry_mut(&mut self, item_id: Uuid) -> Option<&mut ProgressEntry> {
        self.progress.iter_mut().find(|p| p.item_id == item_id)
    }
}

/// Content item within a course module
///
/// Catalog CRUD owns these; the enrollment engine only reads them for
/// completion totals and display enrichment. Unknown catalog fields in the
/// stored JSON are ignored on deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseItem {
    pub item_id: Uuid,
    #[serde(rename = "type")]
    pub item_type: String,
    pub title: String,
    #[serde(default)]
    pub duration: i64,
}

/// Module within a course, holding an ordered list of items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseModule {
    pub module_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub items: Vec<CourseItem>,
}

/// Course record as the enrollment engine sees it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub guid: Uuid,
    pub title: String,
    pub description: String,
    pub thumbnail_url: String,
    pub category: Option<String>,
    pub difficulty: String,
    pub price: f64,
    pub is_published: bool,
    pub enrollment_count: i64,
    pub rating_average: f64,
    pub rating_count: i64,
    pub modules: Vec<CourseModule>,
}

impl Course {
    /// Total content items across all modules; the denominator for
    /// completion percentage
    pub fn total_items(&self) -> usize {
        self.modules.iter().map(|m| m.items.len()).sum()
    }

    /// Locate an item and its parent module by item id
    pub fn find_item(&self, item_id: Uuid) -> Option<(&CourseModule, &CourseItem)> {
        for module in &self.modules {
            if let Some(item) = module.items.iter().find(|i| i.item_id == item_id) {
                return Some((module, item));
            }
        }
        None
    }
}
