//! Course reads and best-effort course side effects
//!
//! The catalog service owns course content; this module only reads the
//! structure (for completion totals and display enrichment) and maintains
//! two denormalized columns on the course row: the enrollment counter and
//! the aggregate rating. Both are updated outside the enrollment's own
//! write, so they are eventually consistent with the enrollments table.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use lms_common::db::retry_on_lock;
use lms_common::models::{Course, CourseModule};
use lms_common::{Error, Result};

use super::{parse_uuid, MAX_LOCK_WAIT_MS};

/// Load a course with its embedded module/item structure
pub async fn get_course(pool: &SqlitePool, course_id: Uuid) -> Result<Option<Course>> {
    let row = sqlx::query(
        r#"
        SELECT guid, title, description, thumbnail_url, category, difficulty,
               price, is_published, enrollment_count, rating_average, rating_count, modules
        FROM courses
        WHERE guid = ?
        "#,
    )
    .bind(course_id.to_string())
    .fetch_optional(pool)
    .await?;

    let row = match row {
        Some(row) => row,
        None => return Ok(None),
    };

    let guid: String = row.get("guid");
    let modules: String = row.get("modules");
    let modules: Vec<CourseModule> = serde_json::from_str(&modules)
        .map_err(|e| Error::Internal(format!("Failed to deserialize course modules: {}", e)))?;

    Ok(Some(Course {
        guid: parse_uuid(&guid, "guid")?,
        title: row.get("title"),
        description: row.get("description"),
        thumbnail_url: row.get("thumbnail_url"),
        category: row.get("category"),
        difficulty: row.get("difficulty"),
        price: row.get("price"),
        is_published: row.get::<i64, _>("is_published") != 0,
        enrollment_count: row.get("enrollment_count"),
        rating_average: row.get("rating_average"),
        rating_count: row.get("rating_count"),
        modules,
    }))
}

/// Adjust the denormalized enrollment counter on the course row
///
/// The counter never goes below zero even if cancel/reactivate cycles
/// leave it behind the true count.
pub async fn adjust_enrollment_count(pool: &SqlitePool, course_id: Uuid, delta: i64) -> Result<()> {
    let guid = course_id.to_string();

    retry_on_lock("adjust enrollment count", MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            UPDATE courses
            SET enrollment_count = MAX(0, enrollment_count + ?),
                updated_at = CURRENT_TIMESTAMP
            WHERE guid = ?
            "#,
        )
        .bind(delta)
        .bind(&guid)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    })
    .await
}

/// Recompute the course's aggregate rating from its enrollments
///
/// Average is rounded to one decimal place. A course with no ratings is
/// left untouched.
pub async fn refresh_course_rating(pool: &SqlitePool, course_id: Uuid) -> Result<()> {
    let guid = course_id.to_string();

    let (average, count): (Option<f64>, i64) = sqlx::query_as(
        r#"
        SELECT AVG(rating_score), COUNT(*)
        FROM enrollments
        WHERE course_id = ? AND rating_score IS NOT NULL
        "#,
    )
    .bind(&guid)
    .fetch_one(pool)
    .await?;

    let average = match average {
        Some(avg) => (avg * 10.0).round() / 10.0,
        None => return Ok(()),
    };

    retry_on_lock("refresh course rating", MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            UPDATE courses
            SET rating_average = ?,
                rating_count = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE guid = ?
            "#,
        )
        .bind(average)
        .bind(count)
        .bind(&guid)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    })
    .await
}
