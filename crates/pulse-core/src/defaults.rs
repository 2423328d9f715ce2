//! Centralized default constants for pulse.
//!
//! Every crate references these constants instead of defining its own
//! magic numbers. Organized by domain area.

// =============================================================================
// WORKER MANAGER
// =============================================================================

/// Seconds `WorkerManager::stop` waits for the cron engine and in-flight runs.
pub const WORKER_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Capacity of each status subscriber queue. Updates beyond this are dropped.
pub const STATUS_SUBSCRIBER_CAPACITY: usize = 100;

/// Default cron schedule for the crawl worker (every 15 minutes).
pub const CRAWL_SCHEDULE: &str = "0 */15 * * * *";

/// Default cron schedule for the discovery worker (every 6 hours).
pub const DISCOVERY_SCHEDULE: &str = "0 0 */6 * * *";

/// Default cron schedule for the insight worker (hourly).
pub const INSIGHT_SCHEDULE: &str = "0 0 * * * *";

// =============================================================================
// CRAWLING
// =============================================================================

/// Number of due sources pulled per crawl run.
pub const CRAWL_BATCH_SIZE: i64 = 10;

/// Minimum cosine similarity for a content item to match a topic.
pub const TOPIC_MATCH_THRESHOLD: f64 = 0.6;

/// Maximum topics considered per content item when matching.
pub const TOPIC_MATCH_LIMIT: i64 = 10;

/// Maximum article pages crawled from one source per run.
pub const CRAWL_MAX_ARTICLES: usize = 20;

/// Results requested from the search-first crawl strategy.
pub const CRAWL_SEARCH_RESULTS: usize = 20;

/// Characters of content sent to the embedding provider.
pub const EMBED_INPUT_MAX_CHARS: usize = 8000;

/// Ceiling on extracted main-content length (an ellipsis is appended).
pub const CONTENT_MAX_CHARS: usize = 10_000;

/// Text fragments at or below this length are treated as noise.
pub const CONTENT_MIN_FRAGMENT_CHARS: usize = 10;

/// Longest line accepted as a PDF title.
pub const PDF_TITLE_MAX_CHARS: usize = 200;

/// Title used when a PDF has no usable first line.
pub const PDF_DEFAULT_TITLE: &str = "PDF Document";

/// Timeout for a single page fetch.
pub const CRAWL_FETCH_TIMEOUT_SECS: u64 = 30;

/// Timeout for one `pdftotext` invocation.
pub const EXTRACTION_CMD_TIMEOUT_SECS: u64 = 120;

/// User agent sent on crawl requests.
pub const CRAWL_USER_AGENT: &str = "Mozilla/5.0 (compatible; PulseBot/1.0)";

// =============================================================================
// DISCOVERY
// =============================================================================

/// Maximum new sources accepted per originating source.
pub const DISCOVERY_MAX_PER_SOURCE: usize = 5;

/// Maximum originating sources processed per discovery run.
pub const DISCOVERY_MAX_SOURCES: usize = 5;

/// Extra results requested to absorb filtering losses.
pub const DISCOVERY_RESULT_MARGIN: usize = 5;

/// Page size used when listing candidate sources for discovery.
pub const DISCOVERY_LIST_LIMIT: i64 = 100;

// =============================================================================
// INSIGHTS
// =============================================================================

/// Primary matches a topic needs before an insight is generated.
pub const INSIGHT_MIN_CONTENT: i64 = 3;

/// Content items fed into one generation.
pub const INSIGHT_MAX_CONTENT: i64 = 10;

/// Minimum hours between two insights for the same topic.
pub const INSIGHT_COOLDOWN_HOURS: i64 = 24;

/// Characters of each article body placed in the prompt.
pub const INSIGHT_ARTICLE_MAX_CHARS: usize = 1500;

/// Trailing window used as the insight period when no dates are known.
pub const INSIGHT_DEFAULT_PERIOD_DAYS: i64 = 7;

/// Title used when the model omits one.
pub const INSIGHT_DEFAULT_TITLE: &str = "Insight Summary";

/// Token ceiling for insight generation.
pub const INSIGHT_MAX_TOKENS: u32 = 2000;

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for list operations.
pub const PAGE_LIMIT: i64 = 20;

/// Largest accepted page size for list operations.
pub const PAGE_LIMIT_MAX: i64 = 100;

/// Default result count for semantic search.
pub const SEARCH_LIMIT: i64 = 10;

/// Largest accepted result count for semantic search.
pub const SEARCH_LIMIT_MAX: i64 = 50;

// =============================================================================
// DATA SOURCES
// =============================================================================

/// Source type assigned when none is given.
pub const DEFAULT_SOURCE_TYPE: &str = "blog";

/// Crawl frequency assigned when none is given.
pub const DEFAULT_CRAWL_FREQUENCY: &str = "daily";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_request_size() {
        assert_eq!(DISCOVERY_MAX_PER_SOURCE + DISCOVERY_RESULT_MARGIN, 10);
    }

    #[test]
    fn test_embed_input_fits_in_content_ceiling() {
        assert!(EMBED_INPUT_MAX_CHARS < CONTENT_MAX_CHARS);
    }

    #[test]
    fn test_schedules_have_six_fields() {
        for expr in [CRAWL_SCHEDULE, DISCOVERY_SCHEDULE, INSIGHT_SCHEDULE] {
            assert_eq!(expr.split_whitespace().count(), 6, "{expr}");
        }
    }
}
