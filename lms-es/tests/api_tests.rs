//! Integration tests for the lms-es API endpoints
//!
//! Covers the full route surface against a throwaway SQLite database:
//! enrollment lifecycle (enroll, reactivate, cancel), progress updates and
//! completion transitions, authorization on every protected route, rating
//! rules and the course aggregate side effect, listing pagination, and
//! admin statistics.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower::util::ServiceExt; // for `oneshot` method
use uuid::Uuid;

use lms_es::{build_router, AppState};

/// Test helper: fresh database in a temp directory
async fn setup_test_db() -> (SqlitePool, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("Should create temp dir");
    let db_path = dir.path().join("lms.db");
    let pool = lms_common::db::init_database(&db_path)
        .await
        .expect("Should initialize test database");
    (pool, dir)
}

fn setup_app(db: SqlitePool) -> axum::Router {
    build_router(AppState::new(db))
}

/// Test helper: seed a course with one module holding `item_count` items.
/// Returns the course id and the item ids.
async fn seed_course(
    pool: &SqlitePool,
    item_count: usize,
    price: f64,
    published: bool,
) -> (Uuid, Vec<Uuid>) {
    let course_id = Uuid::new_v4();
    let items: Vec<Uuid> = (0..item_count).map(|_| Uuid::new_v4()).collect();

    let module_items: Vec<Value> = items
        .iter()
        .enumerate()
        .map(|(i, id)| {
            json!({
                "item_id": id,
                "type": if i % 2 == 0 { "video" } else { "document" },
                "title": format!("Item {}", i + 1),
                "duration": 10
            })
        })
        .collect();
    let modules = json!([{
        "module_id": Uuid::new_v4(),
        "title": "Module 1",
        "items": module_items
    }]);

    sqlx::query(
        r#"
        INSERT INTO courses (guid, title, description, price, is_published, modules)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(course_id.to_string())
    .bind("Test Course")
    .bind("A course for testing")
    .bind(price)
    .bind(published as i64)
    .bind(modules.to_string())
    .execute(pool)
    .await
    .expect("Should seed course");

    (course_id, items)
}

/// Test helper: request with gateway identity headers and optional JSON body
fn test_request(
    method: &str,
    uri: &str,
    identity: Option<(Uuid, &str)>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((user_id, role)) = identity {
        builder = builder
            .header("x-user-id", user_id.to_string())
            .header("x-user-role", role);
    }
    match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Test helper: extract JSON body from response
async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

/// Test helper: enroll a learner through the API, asserting success
async fn enroll(app: &axum::Router, learner: Uuid, course_id: Uuid) {
    let request = test_request(
        "POST",
        "/api/enrollments",
        Some((learner, "learner")),
        Some(json!({ "course_id": course_id.to_string() })),
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

/// Test helper: mark one item's progress through the API
async fn update_item(
    app: &axum::Router,
    actor: (Uuid, &str),
    learner: Uuid,
    course_id: Uuid,
    item_id: Uuid,
    is_completed: bool,
    time_spent: i64,
) -> (StatusCode, Value) {
    let request = test_request(
        "PUT",
        &format!("/api/enrollments/{}/update", learner),
        Some(actor),
        Some(json!({
            "course_id": course_id.to_string(),
            "item_id": item_id.to_string(),
            "is_completed": is_completed,
            "time_spent": time_spent
        })),
    );
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = extract_json(response.into_body()).await;
    (status, body)
}

// =============================================================================
// Health and authentication
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_no_auth_required() {
    let (db, _dir) = setup_test_db().await;
    let app = setup_app(db);

    let request = test_request("GET", "/health", None, None);
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "lms-es");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_protected_route_requires_identity() {
    let (db, _dir) = setup_test_db().await;
    let app = setup_app(db);

    let learner = Uuid::new_v4();
    let request = test_request("GET", &format!("/api/enrollments/{}", learner), None, None);
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_role_rejected() {
    let (db, _dir) = setup_test_db().await;
    let app = setup_app(db);

    let learner = Uuid::new_v4();
    let request = test_request(
        "GET",
        &format!("/api/enrollments/{}", learner),
        Some((learner, "instructor")),
        None,
    );
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Enrollment creation
// =============================================================================

#[tokio::test]
async fn test_enroll_in_published_course() {
    let (db, _dir) = setup_test_db().await;
    let (course_id, _) = seed_course(&db, 4, 0.0, true).await;
    let app = setup_app(db.clone());

    let learner = Uuid::new_v4();
    let request = test_request(
        "POST",
        "/api/enrollments",
        Some((learner, "learner")),
        Some(json!({ "course_id": course_id.to_string() })),
    );
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["enrollment"]["status"], "active");
    assert_eq!(body["enrollment"]["completion_percentage"], 0);
    assert_eq!(body["enrollment"]["payment_status"], "free");
    assert_eq!(body["enrollment"]["course"]["title"], "Test Course");

    // Course counter incremented
    let count: i64 = sqlx::query_scalar("SELECT enrollment_count FROM courses WHERE guid = ?")
        .bind(course_id.to_string())
        .fetch_one(&db)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_enroll_paid_course_snapshots_price() {
    let (db, _dir) = setup_test_db().await;
    let (course_id, _) = seed_course(&db, 2, 49.99, true).await;
    let app = setup_app(db);

    let learner = Uuid::new_v4();
    let request = test_request(
        "POST",
        "/api/enrollments",
        Some((learner, "learner")),
        Some(json!({ "course_id": course_id.to_string() })),
    );
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["enrollment"]["payment_status"], "pending");
    assert_eq!(body["enrollment"]["payment_amount"], 49.99);
}

#[tokio::test]
async fn test_enroll_twice_rejected() {
    let (db, _dir) = setup_test_db().await;
    let (course_id, _) = seed_course(&db, 4, 0.0, true).await;
    let app = setup_app(db);

    let learner = Uuid::new_v4();
    enroll(&app, learner, course_id).await;

    // Second enroll for the same course must fail
    let request = test_request(
        "POST",
        "/api/enrollments",
        Some((learner, "learner")),
        Some(json!({ "course_id": course_id.to_string() })),
    );
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert!(body["error"].as_str().unwrap().contains("already enrolled"));
}

#[tokio::test]
async fn test_enroll_unpublished_course_rejected() {
    let (db, _dir) = setup_test_db().await;
    let (course_id, _) = seed_course(&db, 4, 0.0, false).await;
    let app = setup_app(db);

    let request = test_request(
        "POST",
        "/api/enrollments",
        Some((Uuid::new_v4(), "learner")),
        Some(json!({ "course_id": course_id.to_string() })),
    );
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_enroll_missing_course_not_found() {
    let (db, _dir) = setup_test_db().await;
    let app = setup_app(db);

    let request = test_request(
        "POST",
        "/api/enrollments",
        Some((Uuid::new_v4(), "learner")),
        Some(json!({ "course_id": Uuid::new_v4().to_string() })),
    );
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_enroll_invalid_course_id() {
    let (db, _dir) = setup_test_db().await;
    let app = setup_app(db);

    let request = test_request(
        "POST",
        "/api/enrollments",
        Some((Uuid::new_v4(), "learner")),
        Some(json!({ "course_id": "not-a-uuid" })),
    );
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Progress updates and completion transitions
// =============================================================================

#[tokio::test]
async fn test_progress_half_then_full_completion() {
    let (db, _dir) = setup_test_db().await;
    let (course_id, items) = seed_course(&db, 4, 0.0, true).await;
    let app = setup_app(db.clone());

    let learner = Uuid::new_v4();
    enroll(&app, learner, course_id).await;

    // Complete items 1 and 2: 50%, still active
    for item in &items[..2] {
        let (status, _) = update_item(
            &app,
            (learner, "learner"),
            learner,
            course_id,
            *item,
            true,
            10,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, body) = update_item(
        &app,
        (learner, "learner"),
        learner,
        course_id,
        items[1],
        true,
        0,
    )
    .await;
    assert_eq!(body["completion_percentage"], 50);
    assert_eq!(body["status"], "active");

    // Complete items 3 and 4: 100%, transitions to completed
    for item in &items[2..] {
        update_item(
            &app,
            (learner, "learner"),
            learner,
            course_id,
            *item,
            true,
            10,
        )
        .await;
    }

    let completed_at: Option<String> =
        sqlx::query_scalar("SELECT completed_at FROM enrollments WHERE learner_id = ?")
            .bind(learner.to_string())
            .fetch_one(&db)
            .await
            .unwrap();
    assert!(completed_at.is_some(), "completed_at must be stamped at 100%");

    let status: String = sqlx::query_scalar("SELECT status FROM enrollments WHERE learner_id = ?")
        .bind(learner.to_string())
        .fetch_one(&db)
        .await
        .unwrap();
    assert_eq!(status, "completed");
}

#[tokio::test]
async fn test_progress_update_for_other_learner_forbidden() {
    let (db, _dir) = setup_test_db().await;
    let (course_id, items) = seed_course(&db, 4, 0.0, true).await;
    let app = setup_app(db.clone());

    let learner = Uuid::new_v4();
    enroll(&app, learner, course_id).await;

    let intruder = Uuid::new_v4();
    let (status, _) = update_item(
        &app,
        (intruder, "learner"),
        learner,
        course_id,
        items[0],
        true,
        10,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // No mutation happened
    let progress: String = sqlx::query_scalar("SELECT progress FROM enrollments WHERE learner_id = ?")
        .bind(learner.to_string())
        .fetch_one(&db)
        .await
        .unwrap();
    assert_eq!(progress, "[]");
}

#[tokio::test]
async fn test_admin_can_update_learner_progress() {
    let (db, _dir) = setup_test_db().await;
    let (course_id, items) = seed_course(&db, 4, 0.0, true).await;
    let app = setup_app(db);

    let learner = Uuid::new_v4();
    enroll(&app, learner, course_id).await;

    let admin = Uuid::new_v4();
    let (status, body) = update_item(
        &app,
        (admin, "admin"),
        learner,
        course_id,
        items[0],
        true,
        5,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["completion_percentage"], 25);
}

#[tokio::test]
async fn test_progress_update_without_enrollment_not_found() {
    let (db, _dir) = setup_test_db().await;
    let (course_id, items) = seed_course(&db, 4, 0.0, true).await;
    let app = setup_app(db);

    let learner = Uuid::new_v4();
    let (status, _) = update_item(
        &app,
        (learner, "learner"),
        learner,
        course_id,
        items[0],
        true,
        10,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_progress_update_on_cancelled_enrollment_rejected() {
    let (db, _dir) = setup_test_db().await;
    let (course_id, items) = seed_course(&db, 4, 0.0, true).await;
    let app = setup_app(db.clone());

    let learner = Uuid::new_v4();
    enroll(&app, learner, course_id).await;

    let request = test_request(
        "PUT",
        &format!("/api/enrollments/{}/{}/cancel", learner, course_id),
        Some((learner, "learner")),
        None,
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, _) = update_item(
        &app,
        (learner, "learner"),
        learner,
        course_id,
        items[0],
        true,
        10,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // No progress was recorded on the cancelled enrollment
    let progress: String = sqlx::query_scalar("SELECT progress FROM enrollments WHERE learner_id = ?")
        .bind(learner.to_string())
        .fetch_one(&db)
        .await
        .unwrap();
    assert_eq!(progress, "[]");
}

#[tokio::test]
async fn test_negative_time_spent_rejected() {
    let (db, _dir) = setup_test_db().await;
    let (course_id, items) = seed_course(&db, 4, 0.0, true).await;
    let app = setup_app(db);

    let learner = Uuid::new_v4();
    enroll(&app, learner, course_id).await;

    let (status, _) = update_item(
        &app,
        (learner, "learner"),
        learner,
        course_id,
        items[0],
        true,
        -10,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Cancellation and reactivation
// =============================================================================

#[tokio::test]
async fn test_cancel_then_reenroll_reactivates_same_record() {
    let (db, _dir) = setup_test_db().await;
    let (course_id, items) = seed_course(&db, 4, 0.0, true).await;
    let app = setup_app(db.clone());

    let learner = Uuid::new_v4();
    enroll(&app, learner, course_id).await;

    // Record some progress before cancelling
    update_item(
        &app,
        (learner, "learner"),
        learner,
        course_id,
        items[0],
        true,
        10,
    )
    .await;

    let original_guid: String =
        sqlx::query_scalar("SELECT guid FROM enrollments WHERE learner_id = ?")
            .bind(learner.to_string())
            .fetch_one(&db)
            .await
            .unwrap();

    // Cancel
    let request = test_request(
        "PUT",
        &format!("/api/enrollments/{}/{}/cancel", learner, course_id),
        Some((learner, "learner")),
        None,
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Re-enroll: 200 (reactivated), not 201 (created)
    let request = test_request(
        "POST",
        "/api/enrollments",
        Some((learner, "learner")),
        Some(json!({ "course_id": course_id.to_string() })),
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["enrollment"]["status"], "active");
    assert_eq!(
        body["enrollment"]["guid"].as_str().unwrap(),
        original_guid,
        "reactivation must reuse the same record"
    );
    assert_eq!(
        body["enrollment"]["progress"].as_array().unwrap().len(),
        1,
        "prior progress entries are retained"
    );

    // Still exactly one row for the pair
    let rows: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM enrollments WHERE learner_id = ? AND course_id = ?")
            .bind(learner.to_string())
            .bind(course_id.to_string())
            .fetch_one(&db)
            .await
            .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn test_cancel_twice_rejected() {
    let (db, _dir) = setup_test_db().await;
    let (course_id, _) = seed_course(&db, 4, 0.0, true).await;
    let app = setup_app(db);

    let learner = Uuid::new_v4();
    enroll(&app, learner, course_id).await;

    let uri = format!("/api/enrollments/{}/{}/cancel", learner, course_id);
    let response = app
        .clone()
        .oneshot(test_request("PUT", &uri, Some((learner, "learner")), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(test_request("PUT", &uri, Some((learner, "learner")), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = extract_json(response.into_body()).await;
    assert!(body["error"].as_str().unwrap().contains("already cancelled"));
}

#[tokio::test]
async fn test_cancel_forbidden_for_other_learner() {
    let (db, _dir) = setup_test_db().await;
    let (course_id, _) = seed_course(&db, 4, 0.0, true).await;
    let app = setup_app(db);

    let learner = Uuid::new_v4();
    enroll(&app, learner, course_id).await;

    let request = test_request(
        "PUT",
        &format!("/api/enrollments/{}/{}/cancel", learner, course_id),
        Some((Uuid::new_v4(), "learner")),
        None,
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// =============================================================================
// Rating
// =============================================================================

#[tokio::test]
async fn test_admin_cannot_rate_for_learner() {
    let (db, _dir) = setup_test_db().await;
    let (course_id, _) = seed_course(&db, 4, 0.0, true).await;
    let app = setup_app(db);

    let learner = Uuid::new_v4();
    enroll(&app, learner, course_id).await;

    let request = test_request(
        "PUT",
        &format!("/api/enrollments/{}/{}/rate", learner, course_id),
        Some((Uuid::new_v4(), "admin")),
        Some(json!({ "score": 5 })),
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_rate_score_out_of_range_rejected() {
    let (db, _dir) = setup_test_db().await;
    let (course_id, _) = seed_course(&db, 4, 0.0, true).await;
    let app = setup_app(db);

    let learner = Uuid::new_v4();
    enroll(&app, learner, course_id).await;

    let uri = format!("/api/enrollments/{}/{}/rate", learner, course_id);
    for score in [0, 6] {
        let request = test_request(
            "PUT",
            &uri,
            Some((learner, "learner")),
            Some(json!({ "score": score })),
        );
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_rate_updates_course_aggregate() {
    let (db, _dir) = setup_test_db().await;
    let (course_id, _) = seed_course(&db, 4, 0.0, true).await;
    let app = setup_app(db.clone());

    let learner_a = Uuid::new_v4();
    let learner_b = Uuid::new_v4();
    enroll(&app, learner_a, course_id).await;
    enroll(&app, learner_b, course_id).await;

    let request = test_request(
        "PUT",
        &format!("/api/enrollments/{}/{}/rate", learner_a, course_id),
        Some((learner_a, "learner")),
        Some(json!({ "score": 4, "review": "Solid introduction" })),
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["rating"]["score"], 4);
    assert_eq!(body["rating"]["review"], "Solid introduction");

    let request = test_request(
        "PUT",
        &format!("/api/enrollments/{}/{}/rate", learner_b, course_id),
        Some((learner_b, "learner")),
        Some(json!({ "score": 5 })),
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Aggregate: (4 + 5) / 2 = 4.5, count 2
    let (average, count): (f64, i64) =
        sqlx::query_as("SELECT rating_average, rating_count FROM courses WHERE guid = ?")
            .bind(course_id.to_string())
            .fetch_one(&db)
            .await
            .unwrap();
    assert_eq!(average, 4.5);
    assert_eq!(count, 2);
}

#[tokio::test]
async fn test_rate_cancelled_enrollment_rejected() {
    let (db, _dir) = setup_test_db().await;
    let (course_id, _) = seed_course(&db, 4, 0.0, true).await;
    let app = setup_app(db);

    let learner = Uuid::new_v4();
    enroll(&app, learner, course_id).await;

    let request = test_request(
        "PUT",
        &format!("/api/enrollments/{}/{}/cancel", learner, course_id),
        Some((learner, "learner")),
        None,
    );
    app.clone().oneshot(request).await.unwrap();

    let request = test_request(
        "PUT",
        &format!("/api/enrollments/{}/{}/rate", learner, course_id),
        Some((learner, "learner")),
        Some(json!({ "score": 3 })),
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Listing and detail
// =============================================================================

#[tokio::test]
async fn test_list_enrollments_owner_and_admin_only() {
    let (db, _dir) = setup_test_db().await;
    let (course_id, _) = seed_course(&db, 4, 0.0, true).await;
    let app = setup_app(db);

    let learner = Uuid::new_v4();
    enroll(&app, learner, course_id).await;

    let uri = format!("/api/enrollments/{}", learner);

    // Owner sees their enrollments
    let response = app
        .clone()
        .oneshot(test_request("GET", &uri, Some((learner, "learner")), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["enrollments"].as_array().unwrap().len(), 1);
    assert_eq!(body["pagination"]["total_enrollments"], 1);

    // Admin sees them too
    let response = app
        .clone()
        .oneshot(test_request("GET", &uri, Some((Uuid::new_v4(), "admin")), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Another learner does not
    let response = app
        .clone()
        .oneshot(test_request("GET", &uri, Some((Uuid::new_v4(), "learner")), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_list_enrollments_status_filter_and_pagination() {
    let (db, _dir) = setup_test_db().await;
    let app = setup_app(db.clone());

    let learner = Uuid::new_v4();
    let mut course_ids = Vec::new();
    for _ in 0..3 {
        let (course_id, _) = seed_course(&db, 2, 0.0, true).await;
        enroll(&app, learner, course_id).await;
        course_ids.push(course_id);
    }

    // Cancel one of them
    let request = test_request(
        "PUT",
        &format!("/api/enrollments/{}/{}/cancel", learner, course_ids[0]),
        Some((learner, "learner")),
        None,
    );
    app.clone().oneshot(request).await.unwrap();

    // Filter on active
    let uri = format!("/api/enrollments/{}?status=active", learner);
    let response = app
        .clone()
        .oneshot(test_request("GET", &uri, Some((learner, "learner")), None))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["enrollments"].as_array().unwrap().len(), 2);

    // Page size 2: second page holds the remaining row
    let uri = format!("/api/enrollments/{}?page=2&limit=2", learner);
    let response = app
        .clone()
        .oneshot(test_request("GET", &uri, Some((learner, "learner")), None))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["pagination"]["current"], 2);
    assert_eq!(body["pagination"]["total_pages"], 2);
    assert_eq!(body["enrollments"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_enrollment_detail_enriches_progress() {
    let (db, _dir) = setup_test_db().await;
    let (course_id, items) = seed_course(&db, 4, 0.0, true).await;
    let app = setup_app(db);

    let learner = Uuid::new_v4();
    enroll(&app, learner, course_id).await;
    update_item(
        &app,
        (learner, "learner"),
        learner,
        course_id,
        items[0],
        true,
        25,
    )
    .await;

    let uri = format!("/api/enrollments/{}/{}", learner, course_id);
    let response = app
        .clone()
        .oneshot(test_request("GET", &uri, Some((learner, "learner")), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["completion_percentage"], 25);
    assert_eq!(body["completed_items_count"], 1);
    assert_eq!(body["total_time_spent"], 25);

    let progress = body["progress"].as_array().unwrap();
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0]["module"]["title"], "Module 1");
    assert_eq!(progress[0]["item"]["title"], "Item 1");
    assert_eq!(progress[0]["item"]["type"], "video");
}

#[tokio::test]
async fn test_enrollment_detail_not_found() {
    let (db, _dir) = setup_test_db().await;
    let (course_id, _) = seed_course(&db, 4, 0.0, true).await;
    let app = setup_app(db);

    let learner = Uuid::new_v4();
    let uri = format!("/api/enrollments/{}/{}", learner, course_id);
    let response = app
        .oneshot(test_request("GET", &uri, Some((learner, "learner")), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Statistics
// =============================================================================

#[tokio::test]
async fn test_stats_admin_only() {
    let (db, _dir) = setup_test_db().await;
    let app = setup_app(db);

    let response = app
        .clone()
        .oneshot(test_request(
            "GET",
            "/api/enrollments/stats",
            Some((Uuid::new_v4(), "learner")),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_stats_breakdown() {
    let (db, _dir) = setup_test_db().await;
    let (course_id, items) = seed_course(&db, 2, 0.0, true).await;
    let app = setup_app(db.clone());

    // Two learners enroll; one completes the course
    let finisher = Uuid::new_v4();
    let starter = Uuid::new_v4();
    enroll(&app, finisher, course_id).await;
    enroll(&app, starter, course_id).await;
    for item in &items {
        update_item(
            &app,
            (finisher, "learner"),
            finisher,
            course_id,
            *item,
            true,
            10,
        )
        .await;
    }

    let admin = Uuid::new_v4();
    let response = app
        .clone()
        .oneshot(test_request(
            "GET",
            "/api/enrollments/stats?timeframe=7d",
            Some((admin, "admin")),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["summary"]["total"], 2);
    assert_eq!(body["summary"]["completed"], 1);
    assert_eq!(body["summary"]["completion_rate"], 50);
    assert_eq!(body["timeframe"], "7d");

    let breakdown = body["status_breakdown"].as_array().unwrap();
    assert_eq!(breakdown.len(), 2);

    let trend = body["enrollment_trend"].as_array().unwrap();
    assert_eq!(trend.len(), 1, "both enrollments land on today");
    assert_eq!(trend[0]["count"], 2);
}

#[tokio::test]
async fn test_stats_filtered_by_course() {
    let (db, _dir) = setup_test_db().await;
    let (course_a, _) = seed_course(&db, 2, 0.0, true).await;
    let (course_b, _) = seed_course(&db, 2, 0.0, true).await;
    let app = setup_app(db);

    let learner = Uuid::new_v4();
    enroll(&app, learner, course_a).await;
    enroll(&app, learner, course_b).await;

    let uri = format!("/api/enrollments/stats?course_id={}", course_a);
    let response = app
        .clone()
        .oneshot(test_request("GET", &uri, Some((Uuid::new_v4(), "admin")), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["summary"]["total"], 1);
}

// =============================================================================
// Completion edge cases through the API
// =============================================================================

#[tokio::test]
async fn test_empty_course_completion_stays_zero() {
    let (db, _dir) = setup_test_db().await;
    let (course_id, _) = seed_course(&db, 0, 0.0, true).await;
    let app = setup_app(db);

    let learner = Uuid::new_v4();
    enroll(&app, learner, course_id).await;

    // Progress against an item the course does not list
    let (status, body) = update_item(
        &app,
        (learner, "learner"),
        learner,
        course_id,
        Uuid::new_v4(),
        true,
        10,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["completion_percentage"], 0);
    assert_eq!(body["status"], "active");
}

#[tokio::test]
async fn test_deleted_course_fail_soft() {
    let (db, _dir) = setup_test_db().await;
    let (course_id, items) = seed_course(&db, 2, 0.0, true).await;
    let app = setup_app(db.clone());

    let learner = Uuid::new_v4();
    enroll(&app, learner, course_id).await;

    // Course disappears out from under the enrollment
    sqlx::query("DELETE FROM courses WHERE guid = ?")
        .bind(course_id.to_string())
        .execute(&db)
        .await
        .unwrap();

    // Progress update still succeeds, reporting completion 0
    let (status, body) = update_item(
        &app,
        (learner, "learner"),
        learner,
        course_id,
        items[0],
        true,
        10,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["completion_percentage"], 0);
    assert_eq!(body["status"], "active");

    // The listing still serves the enrollment
    let uri = format!("/api/enrollments/{}", learner);
    let response = app
        .oneshot(test_request("GET", &uri, Some((learner, "learner")), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["enrollments"].as_array().unwrap().len(), 1);
}
