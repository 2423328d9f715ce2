//! Domain services shared by the workers.
//!
//! Services wrap the repository traits with validation, defaults, and the
//! bookkeeping that several workers depend on (next crawl times, topic
//! content counts, insight embeddings).

pub mod datasource;
pub mod insight;

pub use datasource::DataSourceService;
pub use insight::InsightService;

use pulse_core::defaults::{PAGE_LIMIT, PAGE_LIMIT_MAX, SEARCH_LIMIT, SEARCH_LIMIT_MAX};

/// Normalize list pagination: page is at least 1, an out-of-range limit
/// falls back to the default.
pub(crate) fn clamp_page(page: i64, limit: i64) -> (i64, i64) {
    let page = page.max(1);
    let limit = if (1..=PAGE_LIMIT_MAX).contains(&limit) {
        limit
    } else {
        PAGE_LIMIT
    };
    (page, limit)
}

/// Normalize a semantic search result count.
pub(crate) fn clamp_search_limit(limit: i64) -> i64 {
    if (1..=SEARCH_LIMIT_MAX).contains(&limit) {
        limit
    } else {
        SEARCH_LIMIT
    }
}
