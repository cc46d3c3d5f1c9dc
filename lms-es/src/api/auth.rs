//! Principal extraction middleware
//!
//! Authentication happens upstream: the gateway verifies the session token
//! and forwards the caller's identity as trusted headers. This middleware
//! turns those headers into a `Principal` request extension; requests
//! without a complete identity are rejected with 401 before any handler
//! runs.

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::principal::{Principal, Role};

/// Header carrying the authenticated user id (UUID)
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the authenticated user role
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Extract the principal from gateway identity headers and attach it to the
/// request. Applied to all protected routes; `/health` stays public.
pub async fn principal_middleware(
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let principal = principal_from_headers(request.headers())?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

fn principal_from_headers(headers: &HeaderMap) -> Result<Principal, AuthError> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .ok_or(AuthError::MissingIdentity)?
        .to_str()
        .map_err(|_| AuthError::InvalidIdentity("User id header is not valid UTF-8".to_string()))?;
    let user_id = Uuid::parse_str(user_id)
        .map_err(|_| AuthError::InvalidIdentity(format!("Invalid user id: {}", user_id)))?;

    let role = headers
        .get(USER_ROLE_HEADER)
        .ok_or(AuthError::MissingIdentity)?
        .to_str()
        .map_err(|_| AuthError::InvalidIdentity("Role header is not valid UTF-8".to_string()))?;
    let role = Role::parse(role)
        .ok_or_else(|| AuthError::InvalidIdentity(format!("Unknown role: {}", role)))?;

    Ok(Principal { user_id, role })
}

/// Authentication error types for HTTP responses
#[derive(Debug)]
pub enum AuthError {
    MissingIdentity,
    InvalidIdentity(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            AuthError::MissingIdentity => "Authentication required".to_string(),
            AuthError::InvalidIdentity(msg) => msg,
        };

        let body = Json(json!({
            "error": message,
        }));

        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}
