//! Pagination utilities for enrollment listings

/// Default page size when the caller does not supply a limit
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Upper bound on caller-supplied page sizes
pub const MAX_PAGE_SIZE: i64 = 100;

/// Pagination metadata calculated from total results
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: i64,
    /// Sanitized page size
    pub page_size: i64,
    /// Total number of pages
    pub total_pages: i64,
    /// Offset for SQL LIMIT/OFFSET query
    pub offset: i64,
}

/// Calculate pagination metadata from total results and requested page.
///
/// Page size is clamped to [1, MAX_PAGE_SIZE] and the page number to
/// [1, total_pages] so out-of-bounds requests return the nearest valid page
/// instead of an error.
pub fn calculate_pagination(total_results: i64, requested_page: i64, requested_size: i64) -> Pagination {
    let page_size = requested_size.max(1).min(MAX_PAGE_SIZE);
    let total_pages = (total_results + page_size - 1) / page_size;
    let page = requested_page.max(1).min(total_pages.max(1));
    let offset = (page - 1) * page_size;

    Pagination {
        page,
        page_size,
        total_pages,
        offset,
    }
}
