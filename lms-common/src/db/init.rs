//! Database initialization
//!
//! Creates the database file on first run and brings the schema up
//! idempotently. Safe to call from every service on startup.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers with one writer; progress updates and
    // list reads routinely overlap
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    // Migrations are idempotent; safe to call multiple times
    create_courses_table(&pool).await?;
    create_enrollments_table(&pool).await?;

    Ok(pool)
}

/// Create the courses table
///
/// Catalog CRUD owns course content; the enrollment engine reads the
/// embedded modules JSON for completion totals and writes only the
/// enrollment counter and aggregate rating columns.
pub async fn create_courses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS courses (
            guid TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            thumbnail_url TEXT NOT NULL DEFAULT '',
            category TEXT,
            difficulty TEXT NOT NULL DEFAULT 'beginner' CHECK (difficulty IN ('beginner', 'intermediate', 'advanced')),
            price REAL NOT NULL DEFAULT 0,
            is_published INTEGER NOT NULL DEFAULT 0,
            enrollment_count INTEGER NOT NULL DEFAULT 0,
            rating_average REAL NOT NULL DEFAULT 0,
            rating_count INTEGER NOT NULL DEFAULT 0,
            modules TEXT NOT NULL DEFAULT '[]',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (price >= 0),
            CHECK (rating_average >= 0 AND rating_average <= 5),
            CHECK (rating_count >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_courses_published ON courses(is_published)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_courses_category ON courses(category)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the enrollments table
///
/// One row per (learner_id, course_id), enforced by the unique compound
/// index. Progress entries live in the `progress` JSON column so the whole
/// record is saved atomically; `version` carries the optimistic
/// concurrency counter checked on every save.
pub async fn create_enrollments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS enrollments (
            guid TEXT PRIMARY KEY,
            learner_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'completed', 'paused', 'cancelled')),
            progress TEXT NOT NULL DEFAULT '[]',
            completion_percentage INTEGER NOT NULL DEFAULT 0,
            enrolled_at TEXT NOT NULL,
            completed_at TEXT,
            last_accessed_at TEXT NOT NULL,
            payment_status TEXT NOT NULL DEFAULT 'free' CHECK (payment_status IN ('pending', 'paid', 'failed', 'refunded', 'free')),
            payment_amount REAL NOT NULL DEFAULT 0,
            rating_score INTEGER,
            rating_review TEXT,
            rating_rated_at TEXT,
            version INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (completion_percentage >= 0 AND completion_percentage <= 100),
            CHECK (rating_score IS NULL OR (rating_score >= 1 AND rating_score <= 5)),
            CHECK (payment_amount >= 0),
            CHECK (version >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One enrollment per learner per course
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_enrollments_learner_course ON enrollments(learner_id, course_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_enrollments_learner ON enrollments(learner_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_enrollments_course ON enrollments(course_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_enrollments_status ON enrollments(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_enrollments_enrolled_at ON enrollments(enrolled_at)")
        .execute(pool)
        .await?;

    Ok(())
}
