//! Enrollment API handlers
//!
//! Route contracts:
//! - POST /api/enrollments                            enroll the caller
//! - GET  /api/enrollments/stats                      admin aggregates
//! - GET  /api/enrollments/:user_id                   paginated listing
//! - PUT  /api/enrollments/:user_id/update            record item progress
//! - GET  /api/enrollments/:user_id/:course_id        enrollment detail
//! - PUT  /api/enrollments/:user_id/:course_id/cancel soft cancel
//! - PUT  /api/enrollments/:user_id/:course_id/rate   rate the course

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lms_common::models::{EnrollmentStatus, Rating};

use crate::db::courses;
use crate::error::ApiError;
use crate::principal::Principal;
use crate::queries::{
    EnrollmentDetail, EnrollmentPage, EnrollmentQueries, EnrollmentView, StatsResponse, Timeframe,
};
use crate::service::{EnrollOutcome, EnrollmentService};
use crate::AppState;

fn parse_id(value: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(value).map_err(|_| ApiError::InvalidInput(format!("Invalid {}", what)))
}

// ============================================================================
// Enroll
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub course_id: String,
}

#[derive(Debug, Serialize)]
pub struct EnrollResponse {
    pub message: String,
    pub enrollment: EnrollmentView,
}

/// POST /api/enrollments
///
/// 201 on first enrollment, 200 when a cancelled enrollment is reactivated.
pub async fn enroll(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<EnrollRequest>,
) -> Result<(StatusCode, Json<EnrollResponse>), ApiError> {
    let course_id = parse_id(&request.course_id, "course ID")?;

    let service = EnrollmentService::new(state.db.clone());
    let outcome = service.enroll(&principal, course_id).await?;

    let course = courses::get_course(&state.db, course_id).await?;
    let (status, message, enrollment) = match outcome {
        EnrollOutcome::Created(enrollment) => (
            StatusCode::CREATED,
            "Successfully enrolled in course",
            enrollment,
        ),
        EnrollOutcome::Reactivated(enrollment) => (
            StatusCode::OK,
            "Enrollment reactivated successfully",
            enrollment,
        ),
    };

    Ok((
        status,
        Json(EnrollResponse {
            message: message.to_string(),
            enrollment: EnrollmentView::new(enrollment, course.as_ref()),
        }),
    ))
}

// ============================================================================
// Listing
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// GET /api/enrollments/:user_id
pub async fn list_enrollments(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(user_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<EnrollmentPage>, ApiError> {
    let learner_id = parse_id(&user_id, "user ID")?;
    let status = query
        .status
        .as_deref()
        .map(EnrollmentStatus::parse)
        .transpose()
        .map_err(|_| ApiError::InvalidInput("Invalid status filter".to_string()))?;

    let queries = EnrollmentQueries::new(state.db.clone());
    let page = queries
        .list_by_learner(&principal, learner_id, status, query.page, query.limit)
        .await?;

    Ok(Json(page))
}

// ============================================================================
// Progress update
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UpdateProgressRequest {
    pub course_id: String,
    pub item_id: String,
    pub is_completed: bool,
    #[serde(default)]
    pub time_spent: i64,
}

#[derive(Debug, Serialize)]
pub struct UpdatedItem {
    pub item_id: Uuid,
    pub is_completed: bool,
    pub time_spent: i64,
}

#[derive(Debug, Serialize)]
pub struct UpdateProgressResponse {
    pub enrollment_id: Uuid,
    pub completion_percentage: i64,
    pub status: EnrollmentStatus,
    pub updated_item: UpdatedItem,
}

/// PUT /api/enrollments/:user_id/update
pub async fn update_progress(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(user_id): Path<String>,
    Json(request): Json<UpdateProgressRequest>,
) -> Result<Json<UpdateProgressResponse>, ApiError> {
    let learner_id = parse_id(&user_id, "user ID")?;
    let course_id = parse_id(&request.course_id, "course ID")?;
    let item_id = parse_id(&request.item_id, "item ID")?;

    let service = EnrollmentService::new(state.db.clone());
    let update = service
        .update_progress(
            &principal,
            learner_id,
            course_id,
            item_id,
            request.is_completed,
            request.time_spent,
        )
        .await?;

    Ok(Json(UpdateProgressResponse {
        enrollment_id: update.enrollment_id,
        completion_percentage: update.completion_percentage,
        status: update.status,
        updated_item: UpdatedItem {
            item_id,
            is_completed: request.is_completed,
            time_spent: request.time_spent,
        },
    }))
}

// ============================================================================
// Detail
// ============================================================================

/// GET /api/enrollments/:user_id/:course_id
pub async fn enrollment_detail(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((user_id, course_id)): Path<(String, String)>,
) -> Result<Json<EnrollmentDetail>, ApiError> {
    let learner_id = parse_id(&user_id, "user ID")?;
    let course_id = parse_id(&course_id, "course ID")?;

    let queries = EnrollmentQueries::new(state.db.clone());
    let detail = queries.detail(&principal, learner_id, course_id).await?;

    Ok(Json(detail))
}

// ============================================================================
// Cancel
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub message: String,
    pub enrollment: EnrollmentView,
}

/// PUT /api/enrollments/:user_id/:course_id/cancel
pub async fn cancel_enrollment(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((user_id, course_id)): Path<(String, String)>,
) -> Result<Json<CancelResponse>, ApiError> {
    let learner_id = parse_id(&user_id, "user ID")?;
    let course_id = parse_id(&course_id, "course ID")?;

    let service = EnrollmentService::new(state.db.clone());
    let enrollment = service.cancel(&principal, learner_id, course_id).await?;

    Ok(Json(CancelResponse {
        message: "Enrollment cancelled successfully".to_string(),
        enrollment: EnrollmentView::new(enrollment, None),
    }))
}

// ============================================================================
// Rating
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub score: i64,
    pub review: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RateResponse {
    pub message: String,
    pub rating: Rating,
}

/// PUT /api/enrollments/:user_id/:course_id/rate
pub async fn rate_course(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((user_id, course_id)): Path<(String, String)>,
    Json(request): Json<RateRequest>,
) -> Result<Json<RateResponse>, ApiError> {
    let learner_id = parse_id(&user_id, "user ID")?;
    let course_id = parse_id(&course_id, "course ID")?;

    let service = EnrollmentService::new(state.db.clone());
    let rating = service
        .rate(&principal, learner_id, course_id, request.score, request.review)
        .await?;

    Ok(Json(RateResponse {
        message: "Course rated successfully".to_string(),
        rating,
    }))
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub course_id: Option<String>,
    pub timeframe: Option<String>,
}

/// GET /api/enrollments/stats
///
/// Admin only.
pub async fn stats(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResponse>, ApiError> {
    let course_id = query
        .course_id
        .as_deref()
        .map(|id| parse_id(id, "course ID"))
        .transpose()?;
    let timeframe = Timeframe::parse(query.timeframe.as_deref());

    let queries = EnrollmentQueries::new(state.db.clone());
    let stats = queries.stats(&principal, course_id, timeframe).await?;

    Ok(Json(stats))
}
