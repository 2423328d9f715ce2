//! Exa web similarity-search provider.
//!
//! Implements [`pulse_core::SimilaritySearch`] over the Exa HTTP API
//! (`POST /search`, `POST /findSimilar`, `x-api-key` authentication).

mod client;
mod types;

pub use client::{ExaClient, ExaConfig, DEFAULT_EXA_TIMEOUT_SECS, DEFAULT_EXA_URL};
pub use types::*;
