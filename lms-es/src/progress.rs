//! Progress tracking
//!
//! Mutates one item's progress within an enrollment and recomputes the
//! derived completion percentage. All functions operate on an in-memory
//! enrollment; the caller persists the result through the store.

use chrono::Utc;
use lms_common::models::{Course, Enrollment, EnrollmentStatus, ProgressEntry};
use uuid::Uuid;

use crate::error::ApiError;

/// Upsert progress for a single content item.
///
/// Existing entries are updated in place: completion flag overwritten, time
/// delta added to the running total. The per-item `completed_at` records the
/// first completion and survives later un-completion. The item id is not
/// checked against the course structure; entries for unknown items simply
/// never count toward completion.
pub fn update_item_progress(
    enrollment: &mut Enrollment,
    item_id: Uuid,
    is_completed: bool,
    time_spent_delta: i64,
) -> Result<(), ApiError> {
    if time_spent_delta < 0 {
        return Err(ApiError::InvalidInput(
            "time_spent must be a non-negative number of minutes".to_string(),
        ));
    }

    let now = Utc::now();

    if let Some(entry) = enrollment.progress_entry_mut(item_id) {
        entry.is_completed = is_completed;
        entry.time_spent += time_spent_delta;
        entry.last_accessed_at = now;
        if is_completed && entry.completed_at.is_none() {
            entry.completed_at = Some(now);
        }
    } else {
        enrollment.progress.push(ProgressEntry {
            item_id,
            is_completed,
            time_spent: time_spent_delta,
            completed_at: if is_completed { Some(now) } else { None },
            last_accessed_at: now,
        });
    }

    enrollment.last_accessed_at = now;
    Ok(())
}

/// Recompute the completion percentage from progress against the course's
/// total item count, and apply the one-way active→completed transition.
///
/// Only completed entries for items the course actually enumerates count
/// toward the numerator, so stale entries for removed items can never push
/// the percentage past 100. A course with zero items always yields 0 and
/// never changes status. Reaching 100% while active marks the enrollment
/// completed and stamps `completed_at` once; a percentage that later drops
/// below 100 never reverts the status.
pub fn calculate_completion(enrollment: &mut Enrollment, course: &Course) -> i64 {
    let total_items = course.total_items();
    if total_items == 0 {
        enrollment.completion_percentage = 0;
        return 0;
    }

    let completed_items = enrollment
        .progress
        .iter()
        .filter(|p| p.is_completed && course.find_item(p.item_id).is_some())
        .count();
    let percentage = ((completed_items as f64 / total_items as f64) * 100.0).round() as i64;

    enrollment.completion_percentage = percentage;

    if percentage == 100 && enrollment.status == EnrollmentStatus::Active {
        enrollment.status = EnrollmentStatus::Completed;
        if enrollment.completed_at.is_none() {
            enrollment.completed_at = Some(Utc::now());
        }
    }

    percentage
}
