//! Enrollment store
//!
//! One row per (learner_id, course_id), with the progress array embedded as
//! a JSON column so each save is a single atomic statement. Saves carry an
//! optimistic version guard: the UPDATE only matches when the row still has
//! the version the caller read, and a missed guard surfaces as
//! `Error::Conflict` for the caller to reload and replay.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use lms_common::db::retry_on_lock;
use lms_common::models::{Enrollment, EnrollmentStatus, PaymentStatus, ProgressEntry, Rating};
use lms_common::{Error, Result};

use super::{parse_timestamp, parse_uuid, MAX_LOCK_WAIT_MS};

const ENROLLMENT_COLUMNS: &str = "guid, learner_id, course_id, status, progress, \
     completion_percentage, enrolled_at, completed_at, last_accessed_at, \
     payment_status, payment_amount, rating_score, rating_review, rating_rated_at, version";

fn row_to_enrollment(row: &sqlx::sqlite::SqliteRow) -> Result<Enrollment> {
    let guid: String = row.get("guid");
    let learner_id: String = row.get("learner_id");
    let course_id: String = row.get("course_id");

    let status: String = row.get("status");
    let status = EnrollmentStatus::parse(&status)?;

    let progress: String = row.get("progress");
    let progress: Vec<ProgressEntry> = serde_json::from_str(&progress)
        .map_err(|e| Error::Internal(format!("Failed to deserialize progress: {}", e)))?;

    let enrolled_at: String = row.get("enrolled_at");
    let enrolled_at = parse_timestamp(&enrolled_at, "enrolled_at")?;

    let completed_at: Option<String> = row.get("completed_at");
    let completed_at = completed_at
        .map(|s| parse_timestamp(&s, "completed_at"))
        .transpose()?;

    let last_accessed_at: String = row.get("last_accessed_at");
    let last_accessed_at = parse_timestamp(&last_accessed_at, "last_accessed_at")?;

    let payment_status: String = row.get("payment_status");
    let payment_status = PaymentStatus::parse(&payment_status)?;

    let rating_score: Option<i64> = row.get("rating_score");
    let rating = match rating_score {
        Some(score) => {
            let rated_at: Option<String> = row.get("rating_rated_at");
            let rated_at = rated_at
                .map(|s| parse_timestamp(&s, "rating_rated_at"))
                .transpose()?
                .unwrap_or_else(Utc::now);
            Some(Rating {
                score,
                review: row.get::<Option<String>, _>("rating_review").unwrap_or_default(),
                rated_at,
            })
        }
        None => None,
    };

    Ok(Enrollment {
        guid: parse_uuid(&guid, "guid")?,
        learner_id: parse_uuid(&learner_id, "learner_id")?,
        course_id: parse_uuid(&course_id, "course_id")?,
        status,
        progress,
        completion_percentage: row.get("completion_percentage"),
        enrolled_at,
        completed_at,
        last_accessed_at,
        payment_status,
        payment_amount: row.get("payment_amount"),
        rating,
        version: row.get("version"),
    })
}

/// Look up the enrollment for a (learner, course) pair
pub async fn find_by_learner_and_course(
    pool: &SqlitePool,
    learner_id: Uuid,
    course_id: Uuid,
) -> Result<Option<Enrollment>> {
    let sql = format!(
        "SELECT {} FROM enrollments WHERE learner_id = ? AND course_id = ?",
        ENROLLMENT_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(learner_id.to_string())
        .bind(course_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_enrollment).transpose()
}

/// Insert a new enrollment row
///
/// The unique compound index on (learner_id, course_id) resolves creation
/// races; the loser gets `Error::DuplicateKey`.
pub async fn insert(pool: &SqlitePool, enrollment: &Enrollment) -> Result<()> {
    // Prepare all data before acquiring a database connection
    let guid = enrollment.guid.to_string();
    let learner_id = enrollment.learner_id.to_string();
    let course_id = enrollment.course_id.to_string();
    let progress = serde_json::to_string(&enrollment.progress)
        .map_err(|e| Error::Internal(format!("Failed to serialize progress: {}", e)))?;
    let enrolled_at = enrollment.enrolled_at.to_rfc3339();
    let completed_at = enrollment.completed_at.map(|dt| dt.to_rfc3339());
    let last_accessed_at = enrollment.last_accessed_at.to_rfc3339();

    retry_on_lock("insert enrollment", MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO enrollments (
                guid, learner_id, course_id, status, progress,
                completion_percentage, enrolled_at, completed_at, last_accessed_at,
                payment_status, payment_amount, version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&guid)
        .bind(&learner_id)
        .bind(&course_id)
        .bind(enrollment.status.as_str())
        .bind(&progress)
        .bind(enrollment.completion_percentage)
        .bind(&enrolled_at)
        .bind(&completed_at)
        .bind(&last_accessed_at)
        .bind(enrollment.payment_status.as_str())
        .bind(enrollment.payment_amount)
        .bind(enrollment.version)
        .execute(pool)
        .await
        .map_err(|e| {
            if Error::is_unique_violation(&e) {
                Error::DuplicateKey(format!(
                    "Enrollment already exists for learner {} and course {}",
                    learner_id, course_id
                ))
            } else {
                Error::Database(e)
            }
        })?;

        Ok(())
    })
    .await
}

/// Persist a mutated enrollment with the optimistic version guard
///
/// On success the in-memory version is advanced to match the row. Zero rows
/// matched means a concurrent writer saved first: the record is returned
/// untouched and the caller must reload before retrying.
pub async fn save(pool: &SqlitePool, enrollment: &mut Enrollment) -> Result<()> {
    let guid = enrollment.guid.to_string();
    let progress = serde_json::to_string(&enrollment.progress)
        .map_err(|e| Error::Internal(format!("Failed to serialize progress: {}", e)))?;
    let enrolled_at = enrollment.enrolled_at.to_rfc3339();
    let completed_at = enrollment.completed_at.map(|dt| dt.to_rfc3339());
    let last_accessed_at = enrollment.last_accessed_at.to_rfc3339();
    let rating_score = enrollment.rating.as_ref().map(|r| r.score);
    let rating_review = enrollment.rating.as_ref().map(|r| r.review.clone());
    let rating_rated_at = enrollment.rating.as_ref().map(|r| r.rated_at.to_rfc3339());
    let expected_version = enrollment.version;

    let result = retry_on_lock("save enrollment", MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            UPDATE enrollments SET
                status = ?,
                progress = ?,
                completion_percentage = ?,
                enrolled_at = ?,
                completed_at = ?,
                last_accessed_at = ?,
                rating_score = ?,
                rating_review = ?,
                rating_rated_at = ?,
                version = version + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE guid = ? AND version = ?
            "#,
        )
        .bind(enrollment.status.as_str())
        .bind(&progress)
        .bind(enrollment.completion_percentage)
        .bind(&enrolled_at)
        .bind(&completed_at)
        .bind(&last_accessed_at)
        .bind(rating_score)
        .bind(&rating_review)
        .bind(&rating_rated_at)
        .bind(&guid)
        .bind(expected_version)
        .execute(pool)
        .await
        .map_err(Error::Database)
    })
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::Conflict(format!(
            "Enrollment {} was modified concurrently (expected version {})",
            guid, expected_version
        )));
    }

    enrollment.version = expected_version + 1;
    Ok(())
}

/// List a learner's enrollments, newest first
pub async fn list_by_learner(
    pool: &SqlitePool,
    learner_id: Uuid,
    status: Option<EnrollmentStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Enrollment>> {
    let mut sql = format!(
        "SELECT {} FROM enrollments WHERE learner_id = ?",
        ENROLLMENT_COLUMNS
    );
    if status.is_some() {
        sql.push_str(" AND status = ?");
    }
    sql.push_str(" ORDER BY enrolled_at DESC LIMIT ? OFFSET ?");

    let mut query = sqlx::query(&sql).bind(learner_id.to_string());
    if let Some(status) = status {
        query = query.bind(status.as_str());
    }
    query = query.bind(limit).bind(offset);

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(row_to_enrollment).collect()
}

/// Count a learner's enrollments under the same filter as `list_by_learner`
pub async fn count_by_learner(
    pool: &SqlitePool,
    learner_id: Uuid,
    status: Option<EnrollmentStatus>,
) -> Result<i64> {
    let mut sql = String::from("SELECT COUNT(*) FROM enrollments WHERE learner_id = ?");
    if status.is_some() {
        sql.push_str(" AND status = ?");
    }

    let mut query = sqlx::query_scalar(&sql).bind(learner_id.to_string());
    if let Some(status) = status {
        query = query.bind(status.as_str());
    }

    Ok(query.fetch_one(pool).await?)
}

/// Per-status aggregate used by the stats projection
#[derive(Debug, Clone)]
pub struct StatusAggregate {
    pub status: String,
    pub count: i64,
    pub avg_completion: f64,
}

fn stats_filter(course_id: Option<Uuid>, since: Option<DateTime<Utc>>) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut binds = Vec::new();
    if let Some(course_id) = course_id {
        clauses.push("course_id = ?");
        binds.push(course_id.to_string());
    }
    if let Some(since) = since {
        clauses.push("enrolled_at >= ?");
        binds.push(since.to_rfc3339());
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (where_sql, binds)
}

/// Enrollment counts and average completion grouped by status
pub async fn aggregate_by_status(
    pool: &SqlitePool,
    course_id: Option<Uuid>,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<StatusAggregate>> {
    let (where_sql, binds) = stats_filter(course_id, since);
    let sql = format!(
        "SELECT status, COUNT(*) AS count, AVG(completion_percentage) AS avg_completion \
         FROM enrollments{} GROUP BY status",
        where_sql
    );

    let mut query = sqlx::query(&sql);
    for bind in &binds {
        query = query.bind(bind);
    }

    let rows = query.fetch_all(pool).await?;
    Ok(rows
        .iter()
        .map(|row| StatusAggregate {
            status: row.get("status"),
            count: row.get("count"),
            avg_completion: row.get::<Option<f64>, _>("avg_completion").unwrap_or(0.0),
        })
        .collect())
}

/// Count enrollments matching the stats filter, optionally by status
pub async fn count_by_filter(
    pool: &SqlitePool,
    course_id: Option<Uuid>,
    since: Option<DateTime<Utc>>,
    status: Option<EnrollmentStatus>,
) -> Result<i64> {
    let (mut where_sql, mut binds) = stats_filter(course_id, since);
    if let Some(status) = status {
        if where_sql.is_empty() {
            where_sql = " WHERE status = ?".to_string();
        } else {
            where_sql.push_str(" AND status = ?");
        }
        binds.push(status.as_str().to_string());
    }

    let sql = format!("SELECT COUNT(*) FROM enrollments{}", where_sql);
    let mut query = sqlx::query_scalar(&sql);
    for bind in &binds {
        query = query.bind(bind);
    }

    Ok(query.fetch_one(pool).await?)
}

/// Average days between enrollment and completion, for completed rows
pub async fn average_completion_days(
    pool: &SqlitePool,
    course_id: Option<Uuid>,
    since: Option<DateTime<Utc>>,
) -> Result<Option<f64>> {
    let (mut where_sql, binds) = stats_filter(course_id, since);
    if where_sql.is_empty() {
        where_sql = " WHERE completed_at IS NOT NULL".to_string();
    } else {
        where_sql.push_str(" AND completed_at IS NOT NULL");
    }

    let sql = format!(
        "SELECT AVG(julianday(completed_at) - julianday(enrolled_at)) FROM enrollments{}",
        where_sql
    );
    let mut query = sqlx::query_scalar(&sql);
    for bind in &binds {
        query = query.bind(bind);
    }

    Ok(query.fetch_one(pool).await?)
}

/// Daily enrollment counts for the trend series, oldest day first
pub async fn enrollment_trend(
    pool: &SqlitePool,
    course_id: Option<Uuid>,
    since: Option<DateTime<Utc>>,
    limit: i64,
) -> Result<Vec<(String, i64)>> {
    let (where_sql, binds) = stats_filter(course_id, since);
    let sql = format!(
        "SELECT date(enrolled_at) AS day, COUNT(*) AS count FROM enrollments{} \
         GROUP BY day ORDER BY day ASC LIMIT ?",
        where_sql
    );

    let mut query = sqlx::query(&sql);
    for bind in &binds {
        query = query.bind(bind);
    }
    query = query.bind(limit);

    let rows = query.fetch_all(pool).await?;
    Ok(rows
        .iter()
        .map(|row| (row.get("day"), row.get("count")))
        .collect())
}
