//! Enrollment service operations
//!
//! Orchestrates enroll / progress update / cancel / rate on top of the
//! enrollment store and progress tracker. Authorization and input
//! validation run before any mutation. Per-enrollment writes go through the
//! store's optimistic version guard; on a conflict the operation reloads
//! the row and replays, so concurrent writers to the same enrollment cannot
//! lose each other's updates.
//!
//! Course-side effects (enrollment counter, aggregate rating) happen after
//! the enrollment write and are deliberately best-effort: a failure is
//! logged and the already-persisted enrollment change stands.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use lms_common::models::{Enrollment, EnrollmentStatus, Rating};

use crate::db::{courses, enrollments};
use crate::error::ApiError;
use crate::principal::Principal;
use crate::progress;

/// Attempts per operation before an optimistic conflict is surfaced.
/// Every failed attempt means another writer committed, so a writer racing
/// N concurrent peers needs at most N attempts.
const MAX_WRITE_ATTEMPTS: u32 = 10;

/// Outcome of an enroll call: a fresh row or a reactivated cancelled one
#[derive(Debug)]
pub enum EnrollOutcome {
    Created(Enrollment),
    Reactivated(Enrollment),
}

/// Result of a progress update, echoed back to the caller
#[derive(Debug)]
pub struct ProgressUpdate {
    pub enrollment_id: Uuid,
    pub completion_percentage: i64,
    pub status: EnrollmentStatus,
}

/// Enrollment operations over a shared connection pool
#[derive(Clone)]
pub struct EnrollmentService {
    db: SqlitePool,
}

impl EnrollmentService {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Enroll the calling user in a published course.
    ///
    /// A cancelled enrollment for the pair is reactivated in place, keeping
    /// its progress history; any other existing enrollment fails with
    /// `AlreadyEnrolled`. Concurrent first-time enrolls are resolved by the
    /// store's unique index: exactly one caller creates the row, the rest
    /// see `AlreadyEnrolled`.
    pub async fn enroll(
        &self,
        principal: &Principal,
        course_id: Uuid,
    ) -> Result<EnrollOutcome, ApiError> {
        let learner_id = principal.user_id;

        let course = courses::get_course(&self.db, course_id)
            .await?
            .ok_or(ApiError::CourseNotFound)?;
        if !course.is_published {
            return Err(ApiError::CourseUnavailable);
        }

        if let Some(existing) =
            enrollments::find_by_learner_and_course(&self.db, learner_id, course_id).await?
        {
            return self.reactivate(existing).await;
        }

        let enrollment = Enrollment::new(learner_id, course_id, course.price);
        enrollments::insert(&self.db, &enrollment).await?;

        info!(
            learner_id = %learner_id,
            course_id = %course_id,
            "Enrollment created"
        );

        // Counter update is eventually consistent with the enrollment row;
        // never roll back the enrollment if it fails
        if let Err(err) = courses::adjust_enrollment_count(&self.db, course_id, 1).await {
            warn!(course_id = %course_id, error = %err, "Failed to increment enrollment count");
        }

        Ok(EnrollOutcome::Created(enrollment))
    }

    async fn reactivate(&self, mut enrollment: Enrollment) -> Result<EnrollOutcome, ApiError> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            if enrollment.status != EnrollmentStatus::Cancelled {
                return Err(ApiError::AlreadyEnrolled);
            }

            // Progress history is retained; only status and the enrollment
            // timestamp reset
            enrollment.status = EnrollmentStatus::Active;
            enrollment.enrolled_at = Utc::now();

            match enrollments::save(&self.db, &mut enrollment).await {
                Ok(()) => {
                    info!(
                        learner_id = %enrollment.learner_id,
                        course_id = %enrollment.course_id,
                        "Enrollment reactivated"
                    );
                    return Ok(EnrollOutcome::Reactivated(enrollment));
                }
                Err(lms_common::Error::Conflict(_)) if attempt < MAX_WRITE_ATTEMPTS => {
                    debug!(attempt, "Reactivation hit a concurrent write, reloading");
                    enrollment = self.reload(enrollment.learner_id, enrollment.course_id).await?;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ApiError::Conflict(
            "Enrollment kept changing concurrently during reactivation".to_string(),
        ))
    }

    /// Record progress for one content item and recompute completion.
    ///
    /// Requires an active enrollment. The course lookup for the completion
    /// denominator is fail-soft: a missing course degrades the reported
    /// percentage to 0 without touching the stored percentage or status, so
    /// a deleted course never breaks an existing learner's enrollment.
    pub async fn update_progress(
        &self,
        principal: &Principal,
        learner_id: Uuid,
        course_id: Uuid,
        item_id: Uuid,
        is_completed: bool,
        time_spent: i64,
    ) -> Result<ProgressUpdate, ApiError> {
        if !principal.can_act_for(learner_id) {
            return Err(ApiError::Forbidden(
                "You can only update your own progress".to_string(),
            ));
        }
        if time_spent < 0 {
            return Err(ApiError::InvalidInput(
                "time_spent must be a non-negative number of minutes".to_string(),
            ));
        }

        let course = courses::get_course(&self.db, course_id).await?;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut enrollment =
                enrollments::find_by_learner_and_course(&self.db, learner_id, course_id)
                    .await?
                    .ok_or(ApiError::EnrollmentNotFound)?;

            if enrollment.status != EnrollmentStatus::Active {
                return Err(ApiError::EnrollmentNotActive);
            }

            progress::update_item_progress(&mut enrollment, item_id, is_completed, time_spent)?;

            let completion_percentage = match &course {
                Some(course) => progress::calculate_completion(&mut enrollment, course),
                None => {
                    debug!(course_id = %course_id, "Course missing during completion calculation");
                    0
                }
            };

            match enrollments::save(&self.db, &mut enrollment).await {
                Ok(()) => {
                    return Ok(ProgressUpdate {
                        enrollment_id: enrollment.guid,
                        completion_percentage,
                        status: enrollment.status,
                    });
                }
                Err(lms_common::Error::Conflict(_)) if attempt < MAX_WRITE_ATTEMPTS => {
                    debug!(
                        attempt,
                        learner_id = %learner_id,
                        course_id = %course_id,
                        "Progress update hit a concurrent write, reloading"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ApiError::Conflict(
            "Enrollment kept changing concurrently during progress update".to_string(),
        ))
    }

    /// Cancel an enrollment (soft status change; the row is never deleted)
    pub async fn cancel(
        &self,
        principal: &Principal,
        learner_id: Uuid,
        course_id: Uuid,
    ) -> Result<Enrollment, ApiError> {
        if !principal.can_act_for(learner_id) {
            return Err(ApiError::Forbidden(
                "You can only cancel your own enrollments".to_string(),
            ));
        }

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut enrollment =
                enrollments::find_by_learner_and_course(&self.db, learner_id, course_id)
                    .await?
                    .ok_or(ApiError::EnrollmentNotFound)?;

            if enrollment.status == EnrollmentStatus::Cancelled {
                return Err(ApiError::AlreadyCancelled);
            }

            enrollment.status = EnrollmentStatus::Cancelled;

            match enrollments::save(&self.db, &mut enrollment).await {
                Ok(()) => {
                    info!(
                        learner_id = %learner_id,
                        course_id = %course_id,
                        "Enrollment cancelled"
                    );

                    if let Err(err) =
                        courses::adjust_enrollment_count(&self.db, course_id, -1).await
                    {
                        warn!(course_id = %course_id, error = %err, "Failed to decrement enrollment count");
                    }

                    return Ok(enrollment);
                }
                Err(lms_common::Error::Conflict(_)) if attempt < MAX_WRITE_ATTEMPTS => {
                    debug!(attempt, "Cancel hit a concurrent write, reloading");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ApiError::Conflict(
            "Enrollment kept changing concurrently during cancellation".to_string(),
        ))
    }

    /// Rate a course through one's own enrollment.
    ///
    /// Owner only; admins cannot rate on a learner's behalf. Allowed while
    /// the enrollment is active or completed.
    pub async fn rate(
        &self,
        principal: &Principal,
        learner_id: Uuid,
        course_id: Uuid,
        score: i64,
        review: Option<String>,
    ) -> Result<Rating, ApiError> {
        if principal.user_id != learner_id {
            return Err(ApiError::Forbidden(
                "You can only rate your own enrollments".to_string(),
            ));
        }
        if !(1..=5).contains(&score) {
            return Err(ApiError::InvalidRating);
        }
        let review = review.unwrap_or_default();
        if review.chars().count() > 500 {
            return Err(ApiError::InvalidInput(
                "Review cannot be more than 500 characters".to_string(),
            ));
        }

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut enrollment =
                enrollments::find_by_learner_and_course(&self.db, learner_id, course_id)
                    .await?
                    .ok_or(ApiError::EnrollmentNotFound)?;

            if enrollment.status != EnrollmentStatus::Active
                && enrollment.status != EnrollmentStatus::Completed
            {
                return Err(ApiError::RatingNotAllowed);
            }

            let rating = Rating {
                score,
                review: review.clone(),
                rated_at: Utc::now(),
            };
            enrollment.rating = Some(rating.clone());

            match enrollments::save(&self.db, &mut enrollment).await {
                Ok(()) => {
                    // Aggregate rating on the course row is a best-effort
                    // side effect outside the enrollment's own write
                    if let Err(err) = courses::refresh_course_rating(&self.db, course_id).await {
                        warn!(course_id = %course_id, error = %err, "Failed to refresh course rating");
                    }

                    return Ok(rating);
                }
                Err(lms_common::Error::Conflict(_)) if attempt < MAX_WRITE_ATTEMPTS => {
                    debug!(attempt, "Rating hit a concurrent write, reloading");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ApiError::Conflict(
            "Enrollment kept changing concurrently during rating".to_string(),
        ))
    }

    async fn reload(&self, learner_id: Uuid, course_id: Uuid) -> Result<Enrollment, ApiError> {
        enrollments::find_by_learner_and_course(&self.db, learner_id, course_id)
            .await?
            .ok_or(ApiError::EnrollmentNotFound)
    }
}
