//! # pulse-core
//!
//! Core types, traits, and abstractions for the pulse crawl and insight
//! pipeline.
//!
//! This crate provides the domain models, the shared error type, and the
//! storage/provider traits that the other pulse crates implement or consume.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;

/// Generate a time-ordered UUIDv7 for new rows.
pub fn new_v7() -> uuid::Uuid {
    uuid::Uuid::now_v7()
}
