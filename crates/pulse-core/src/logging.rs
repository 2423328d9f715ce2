//! Structured logging field name constants.
//!
//! All crates use these names for `tracing` fields so log aggregation can
//! query every subsystem the same way.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | A whole source, topic, or run failed |
//! | WARN  | Recoverable issue, fallback applied, item skipped |
//! | INFO  | Lifecycle events, run and source completions |
//! | DEBUG | Decision points, skipped work, chosen strategy |
//! | TRACE | Per-item iteration |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "jobs", "db", "inference", "worker"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "manager", "status", "crawl", "discovery", "insight", "exa"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "run", "crawl_source", "embed_texts", "find_similar"
pub const OPERATION: &str = "op";

/// Registered worker name.
pub const WORKER: &str = "worker";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Data source UUID.
pub const SOURCE_ID: &str = "source_id";

/// Crawled content UUID.
pub const CONTENT_ID: &str = "content_id";

/// Insight topic UUID.
pub const TOPIC_ID: &str = "topic_id";

/// URL being fetched or stored.
pub const URL: &str = "url";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a query or provider call.
pub const RESULT_COUNT: &str = "result_count";

/// Number of input texts sent to an embedding model.
pub const INPUT_COUNT: &str = "input_count";

/// Byte length of a prompt.
pub const PROMPT_LEN: &str = "prompt_len";

/// Byte length of a model response.
pub const RESPONSE_LEN: &str = "response_len";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for inference.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
