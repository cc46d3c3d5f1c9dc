//! Read-side projections over enrollments
//!
//! Completion shown in listings is recomputed lazily at read time against
//! the current course structure, tolerating staleness in the stored
//! percentage; the recomputed values are display-only and never written
//! back. The detail projection additionally joins progress entries against
//! module/item titles from the course structure.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use lms_common::models::{Course, Enrollment, EnrollmentStatus, PaymentStatus, ProgressEntry, Rating};

use crate::db::{courses, enrollments};
use crate::error::ApiError;
use crate::pagination::{calculate_pagination, DEFAULT_PAGE_SIZE};
use crate::principal::Principal;
use crate::progress;

/// Course fields attached to each listed enrollment
#[derive(Debug, Serialize)]
pub struct CourseSummary {
    pub guid: Uuid,
    pub title: String,
    pub description: String,
    pub thumbnail_url: String,
    pub difficulty: String,
    pub category: Option<String>,
    pub price: f64,
}

impl CourseSummary {
    fn from_course(course: &Course) -> Self {
        Self {
            guid: course.guid,
            title: course.title.clone(),
            description: course.description.clone(),
            thumbnail_url: course.thumbnail_url.clone(),
            difficulty: course.difficulty.clone(),
            category: course.category.clone(),
            price: course.price,
        }
    }
}

/// Enrollment as served to the presentation layer
#[derive(Debug, Serialize)]
pub struct EnrollmentView {
    pub guid: Uuid,
    pub learner_id: Uuid,
    pub course_id: Uuid,
    pub status: EnrollmentStatus,
    pub completion_percentage: i64,
    pub progress: Vec<ProgressEntry>,
    pub completed_items_count: usize,
    pub total_time_spent: i64,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_accessed_at: DateTime<Utc>,
    pub payment_status: PaymentStatus,
    pub payment_amount: f64,
    pub rating: Option<Rating>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<CourseSummary>,
}

impl EnrollmentView {
    pub fn new(enrollment: Enrollment, course: Option<&Course>) -> Self {
        Self {
            guid: enrollment.guid,
            learner_id: enrollment.learner_id,
            course_id: enrollment.course_id,
            status: enrollment.status,
            completion_percentage: enrollment.completion_percentage,
            completed_items_count: enrollment.completed_items_count(),
            total_time_spent: enrollment.total_time_spent(),
            enrolled_at: enrollment.enrolled_at,
            completed_at: enrollment.completed_at,
            last_accessed_at: enrollment.last_accessed_at,
            payment_status: enrollment.payment_status,
            payment_amount: enrollment.payment_amount,
            rating: enrollment.rating,
            progress: enrollment.progress,
            course: course.map(CourseSummary::from_course),
        }
    }
}

/// Pagination block echoed with every listing
#[derive(Debug, Serialize)]
pub struct PageInfo {
    pub current: i64,
    pub total_pages: i64,
    pub count: usize,
    pub total_enrollments: i64,
}

#[derive(Debug, Serialize)]
pub struct EnrollmentPage {
    pub enrollments: Vec<EnrollmentView>,
    pub pagination: PageInfo,
}

/// Module reference resolved for a progress entry
#[derive(Debug, Serialize)]
pub struct ModuleRef {
    pub id: Uuid,
    pub title: String,
}

/// Item reference resolved for a progress entry
#[derive(Debug, Serialize)]
pub struct ItemRef {
    pub id: Uuid,
    pub title: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub duration: i64,
}

/// Progress entry enriched with its module/item titles for display.
/// Entries whose item no longer exists in the course carry no references.
#[derive(Debug, Serialize)]
pub struct ProgressDetail {
    #[serde(flatten)]
    pub entry: ProgressEntry,
    pub module: Option<ModuleRef>,
    pub item: Option<ItemRef>,
}

#[derive(Debug, Serialize)]
pub struct EnrollmentDetail {
    pub guid: Uuid,
    pub learner_id: Uuid,
    pub course_id: Uuid,
    pub status: EnrollmentStatus,
    pub completion_percentage: i64,
    pub progress: Vec<ProgressDetail>,
    pub completed_items_count: usize,
    pub total_time_spent: i64,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_accessed_at: DateTime<Utc>,
    pub payment_status: PaymentStatus,
    pub payment_amount: f64,
    pub rating: Option<Rating>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<CourseSummary>,
}

/// Stats timeframe filter; unknown values fall back to all time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    Days7,
    Days30,
    Days90,
    All,
}

impl Timeframe {
    /// Absent defaults to the last 30 days, unrecognized to all time
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            None => Timeframe::Days30,
            Some("7d") => Timeframe::Days7,
            Some("30d") => Timeframe::Days30,
            Some("90d") => Timeframe::Days90,
            Some(_) => Timeframe::All,
        }
    }

    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Timeframe::Days7 => Some(now - Duration::days(7)),
            Timeframe::Days30 => Some(now - Duration::days(30)),
            Timeframe::Days90 => Some(now - Duration::days(90)),
            Timeframe::All => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Days7 => "7d",
            Timeframe::Days30 => "30d",
            Timeframe::Days90 => "90d",
            Timeframe::All => "all",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsSummary {
    pub total: i64,
    pub completed: i64,
    pub completion_rate: i64,
    pub avg_completion_days: f64,
}

#[derive(Debug, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
    pub avg_completion: f64,
}

#[derive(Debug, Serialize)]
pub struct TrendPoint {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub summary: StatsSummary,
    pub status_breakdown: Vec<StatusCount>,
    pub enrollment_trend: Vec<TrendPoint>,
    pub timeframe: String,
}

/// Maximum points in the enrollment trend series
const TREND_LIMIT: i64 = 30;

/// Read-side query operations
#[derive(Clone)]
pub struct EnrollmentQueries {
    db: SqlitePool,
}

impl EnrollmentQueries {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Paginated listing of a learner's enrollments, newest first
    pub async fn list_by_learner(
        &self,
        principal: &Principal,
        learner_id: Uuid,
        status: Option<EnrollmentStatus>,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> Result<EnrollmentPage, ApiError> {
        if !principal.can_act_for(learner_id) {
            return Err(ApiError::Forbidden(
                "You can only view your own enrollments".to_string(),
            ));
        }

        let total = enrollments::count_by_learner(&self.db, learner_id, status).await?;
        let pagination = calculate_pagination(
            total,
            page.unwrap_or(1),
            limit.unwrap_or(DEFAULT_PAGE_SIZE),
        );

        let rows = enrollments::list_by_learner(
            &self.db,
            learner_id,
            status,
            pagination.page_size,
            pagination.offset,
        )
        .await?;

        // Several enrollments may share a course; fetch each course once
        let mut course_cache: HashMap<Uuid, Option<Course>> = HashMap::new();
        let mut views = Vec::with_capacity(rows.len());
        for mut enrollment in rows {
            if !course_cache.contains_key(&enrollment.course_id) {
                let fetched = courses::get_course(&self.db, enrollment.course_id).await?;
                course_cache.insert(enrollment.course_id, fetched);
            }
            let course = course_cache
                .get(&enrollment.course_id)
                .and_then(|c| c.as_ref());

            // Lazy recompute for display; a missing course leaves the
            // stored values as they are
            if let Some(course) = course {
                progress::calculate_completion(&mut enrollment, course);
            }

            views.push(EnrollmentView::new(enrollment, course));
        }

        let count = views.len();
        Ok(EnrollmentPage {
            enrollments: views,
            pagination: PageInfo {
                current: pagination.page,
                total_pages: pagination.total_pages,
                count,
                total_enrollments: total,
            },
        })
    }

    /// Enrollment detail with progress enriched against the course structure
    pub async fn detail(
        &self,
        principal: &Principal,
        learner_id: Uuid,
        course_id: Uuid,
    ) -> Result<EnrollmentDetail, ApiError> {
        if !principal.can_act_for(learner_id) {
            return Err(ApiError::Forbidden(
                "You can only view your own enrollments".to_string(),
            ));
        }

        let mut enrollment =
            enrollments::find_by_learner_and_course(&self.db, learner_id, course_id)
                .await?
                .ok_or(ApiError::EnrollmentNotFound)?;

        let course = courses::get_course(&self.db, course_id).await?;
        if let Some(course) = &course {
            progress::calculate_completion(&mut enrollment, course);
        }

        let completed_items_count = enrollment.completed_items_count();
        let total_time_spent = enrollment.total_time_spent();

        let progress_details = enrollment
            .progress
            .iter()
            .map(|entry| {
                let resolved = course
                    .as_ref()
                    .and_then(|course| course.find_item(entry.item_id));
                ProgressDetail {
                    entry: entry.clone(),
                    module: resolved.map(|(module, _)| ModuleRef {
                        id: module.module_id,
                        title: module.title.clone(),
                    }),
                    item: resolved.map(|(_, item)| ItemRef {
                        id: item.item_id,
                        title: item.title.clone(),
                        item_type: item.item_type.clone(),
                        duration: item.duration,
                    }),
                }
            })
            .collect();

        Ok(EnrollmentDetail {
            guid: enrollment.guid,
            learner_id: enrollment.learner_id,
            course_id: enrollment.course_id,
            status: enrollment.status,
            completion_percentage: enrollment.completion_percentage,
            progress: progress_details,
            completed_items_count,
            total_time_spent,
            enrolled_at: enrollment.enrolled_at,
            completed_at: enrollment.completed_at,
            last_accessed_at: enrollment.last_accessed_at,
            payment_status: enrollment.payment_status,
            payment_amount: enrollment.payment_amount,
            rating: enrollment.rating,
            course: course.as_ref().map(CourseSummary::from_course),
        })
    }

    /// Aggregate enrollment statistics, admin only
    pub async fn stats(
        &self,
        principal: &Principal,
        course_id: Option<Uuid>,
        timeframe: Timeframe,
    ) -> Result<StatsResponse, ApiError> {
        if !principal.is_admin() {
            return Err(ApiError::Forbidden("Admin access required".to_string()));
        }

        let since = timeframe.since(Utc::now());

        let total = enrollments::count_by_filter(&self.db, course_id, since, None).await?;
        let completed = enrollments::count_by_filter(
            &self.db,
            course_id,
            since,
            Some(EnrollmentStatus::Completed),
        )
        .await?;

        let completion_rate = if total > 0 {
            ((completed as f64 / total as f64) * 100.0).round() as i64
        } else {
            0
        };

        let avg_days = enrollments::average_completion_days(&self.db, course_id, since)
            .await?
            .unwrap_or(0.0);
        let avg_completion_days = (avg_days * 100.0).round() / 100.0;

        let status_breakdown = enrollments::aggregate_by_status(&self.db, course_id, since)
            .await?
            .into_iter()
            .map(|agg| StatusCount {
                status: agg.status,
                count: agg.count,
                avg_completion: agg.avg_completion,
            })
            .collect();

        let enrollment_trend =
            enrollments::enrollment_trend(&self.db, course_id, since, TREND_LIMIT)
                .await?
                .into_iter()
                .map(|(date, count)| TrendPoint { date, count })
                .collect();

        Ok(StatsResponse {
            summary: StatsSummary {
                total,
                completed,
                completion_rate,
                avg_completion_days,
            },
            status_breakdown,
            enrollment_trend,
            timeframe: timeframe.as_str().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_parse() {
        assert_eq!(Timeframe::parse(None), Timeframe::Days30);
        assert_eq!(Timeframe::parse(Some("7d")), Timeframe::Days7);
        assert_eq!(Timeframe::parse(Some("90d")), Timeframe::Days90);
        assert_eq!(Timeframe::parse(Some("1y")), Timeframe::All);
    }

    #[test]
    fn test_timeframe_since() {
        let now = Utc::now();
        assert!(Timeframe::All.since(now).is_none());
        let since = Timeframe::Days7.since(now).unwrap();
        assert_eq!((now - since).num_days(), 7);
    }
}
