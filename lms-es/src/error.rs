//! Error types for lms-es
//!
//! One taxonomy covers service operations and their HTTP mapping; every
//! variant has a fixed status code so handlers can return errors with `?`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Service error taxonomy for enrollment operations
#[derive(Error, Debug)]
pub enum ApiError {
    /// Referenced course does not exist
    #[error("Course not found")]
    CourseNotFound,

    /// Course exists but is not published for enrollment
    #[error("Course is not available for enrollment")]
    CourseUnavailable,

    /// An active (or completed/paused) enrollment already exists for the pair
    #[error("You are already enrolled in this course")]
    AlreadyEnrolled,

    /// Cancel requested on an already-cancelled enrollment
    #[error("Enrollment is already cancelled")]
    AlreadyCancelled,

    /// No enrollment exists for the (learner, course) pair
    #[error("Enrollment not found")]
    EnrollmentNotFound,

    /// Progress may only be recorded against an active enrollment
    #[error("Cannot update progress for inactive enrollment")]
    EnrollmentNotActive,

    /// Caller is neither an admin nor the owning learner
    #[error("Access denied. {0}")]
    Forbidden(String),

    /// No authenticated principal on the request
    #[error("Authentication required")]
    Unauthorized,

    /// Rating score outside 1..=5
    #[error("Rating score must be between 1 and 5")]
    InvalidRating,

    /// Rating requested while status is not active or completed
    #[error("You can only rate active or completed courses")]
    RatingNotAllowed,

    /// Malformed or out-of-range request input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Optimistic write conflict that survived all retries
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// Underlying storage failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::CourseNotFound | ApiError::EnrollmentNotFound => StatusCode::NOT_FOUND,
            ApiError::CourseUnavailable
            | ApiError::AlreadyEnrolled
            | ApiError::AlreadyCancelled
            | ApiError::EnrollmentNotActive
            | ApiError::InvalidRating
            | ApiError::RatingNotAllowed
            | ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

impl From<lms_common::Error> for ApiError {
    fn from(err: lms_common::Error) -> Self {
        match err {
            // Store-level uniqueness race on (learner_id, course_id); the
            // loser of a concurrent enroll sees this, not an infrastructure
            // error
            lms_common::Error::DuplicateKey(_) => ApiError::AlreadyEnrolled,
            lms_common::Error::Conflict(msg) => ApiError::Conflict(msg),
            lms_common::Error::InvalidInput(msg) => ApiError::InvalidInput(msg),
            other => ApiError::Storage(other.to_string()),
        }
    }
}
