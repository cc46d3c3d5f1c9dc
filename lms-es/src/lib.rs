//! lms-es library - Enrollment Service
//!
//! Tracks learner enrollment in courses: per-item progress, derived
//! completion percentage, status transitions, and course ratings, exposed
//! over an HTTP API. Course catalog content, file storage, and
//! authentication are owned by other services.

use axum::Router;
use sqlx::SqlitePool;

pub mod api;
pub mod db;
pub mod error;
pub mod pagination;
pub mod principal;
pub mod progress;
pub mod queries;
pub mod service;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

/// Build application router
///
/// All enrollment routes require an authenticated principal; the health
/// endpoint stays public for monitoring.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post, put};
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    // Protected routes (require gateway identity headers)
    let protected = Router::new()
        .route("/api/enrollments", post(api::enrollments::enroll))
        .route("/api/enrollments/stats", get(api::enrollments::stats))
        .route("/api/enrollments/:user_id", get(api::enrollments::list_enrollments))
        .route("/api/enrollments/:user_id/update", put(api::enrollments::update_progress))
        .route("/api/enrollments/:user_id/:course_id", get(api::enrollments::enrollment_detail))
        .route("/api/enrollments/:user_id/:course_id/cancel", put(api::enrollments::cancel_enrollment))
        .route("/api/enrollments/:user_id/:course_id/rate", put(api::enrollments::rate_course))
        .layer(middleware::from_fn(api::auth::principal_middleware));

    // Public routes (no authentication)
    let public = api::health_routes();

    // Combine routers
    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
