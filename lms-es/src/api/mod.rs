//! HTTP API handlers for lms-es

pub mod auth;
pub mod enrollments;
pub mod health;

pub use auth::principal_middleware;
pub use health::health_routes;
