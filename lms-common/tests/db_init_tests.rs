//! Integration tests for database initialization and schema constraints

use lms_common::db::init::init_database;
use std::path::PathBuf;

fn temp_db_path(tag: &str) -> PathBuf {
    PathBuf::from(format!("/tmp/lms-test-db-{}-{}.db", tag, std::process::id()))
}

async fn insert_enrollment(
    pool: &sqlx::SqlitePool,
    guid: &str,
    learner_id: &str,
    course_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO enrollments (guid, learner_id, course_id, status, progress, enrolled_at, last_accessed_at)
        VALUES (?, ?, ?, 'active', '[]', '2026-01-01T00:00:00+00:00', '2026-01-01T00:00:00+00:00')
        "#,
    )
    .bind(guid)
    .bind(learner_id)
    .bind(course_id)
    .execute(pool)
    .await
    .map(|_| ())
}

#[tokio::test]
async fn test_database_creation_when_missing() {
    let db_path = temp_db_path("create");
    let _ = std::fs::remove_file(&db_path);

    let result = init_database(&db_path).await;
    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");

    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_database_opens_existing() {
    let db_path = temp_db_path("existing");
    let _ = std::fs::remove_file(&db_path);

    let pool1 = init_database(&db_path).await;
    assert!(pool1.is_ok());

    // Second init must be a no-op open, not a failure
    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());

    drop(pool1);
    drop(pool2);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_unique_learner_course_index() {
    let db_path = temp_db_path("unique");
    let _ = std::fs::remove_file(&db_path);

    let pool = init_database(&db_path).await.unwrap();

    insert_enrollment(&pool, "e1", "learner-1", "course-1")
        .await
        .expect("first enrollment should insert");

    // Same learner, same course: unique compound index must reject
    let duplicate = insert_enrollment(&pool, "e2", "learner-1", "course-1").await;
    match duplicate {
        Err(sqlx::Error::Database(db_err)) => assert!(db_err.is_unique_violation()),
        other => panic!("Expected unique violation, got {:?}", other),
    }

    // Same learner, different course is fine
    insert_enrollment(&pool, "e3", "learner-1", "course-2")
        .await
        .expect("enrollment in another course should insert");

    drop(pool);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_status_check_constraint() {
    let db_path = temp_db_path("status");
    let _ = std::fs::remove_file(&db_path);

    let pool = init_database(&db_path).await.unwrap();

    let result = sqlx::query(
        r#"
        INSERT INTO enrollments (guid, learner_id, course_id, status, progress, enrolled_at, last_accessed_at)
        VALUES ('e1', 'l1', 'c1', 'archived', '[]', '2026-01-01T00:00:00+00:00', '2026-01-01T00:00:00+00:00')
        "#,
    )
    .execute(&pool)
    .await;

    assert!(result.is_err(), "Unknown status value must be rejected by CHECK");

    drop(pool);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_completion_percentage_bounds_constraint() {
    let db_path = temp_db_path("pct");
    let _ = std::fs::remove_file(&db_path);

    let pool = init_database(&db_path).await.unwrap();

    let result = sqlx::query(
        r#"
        INSERT INTO enrollments (guid, learner_id, course_id, status, progress, completion_percentage, enrolled_at, last_accessed_at)
        VALUES ('e1', 'l1', 'c1', 'active', '[]', 101, '2026-01-01T00:00:00+00:00', '2026-01-01T00:00:00+00:00')
        "#,
    )
    .execute(&pool)
    .await;

    assert!(result.is_err(), "completion_percentage over 100 must be rejected");

    drop(pool);
    let _ = std::fs::remove_file(&db_path);
}
