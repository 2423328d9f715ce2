//! OpenAI-compatible inference backend.
//!
//! Works with any OpenAI-compatible endpoint (OpenAI, Azure OpenAI, Ollama
//! in compatibility mode, vLLM, LM Studio).
//!
//! # Example
//!
//! ```rust,no_run
//! use pulse_inference::openai::{OpenAIBackend, OpenAIConfig};
//! use pulse_core::EmbeddingBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = OpenAIConfig {
//!         base_url: "http://localhost:11434/v1".to_string(),
//!         embed_model: "nomic-embed-text".to_string(),
//!         embed_dimension: 768,
//!         ..Default::default()
//!     };
//!     let backend = OpenAIBackend::new(config).unwrap();
//!     let vectors = backend.embed_texts(&["Hello".to_string()]).await.unwrap();
//!     assert_eq!(vectors.len(), 1);
//! }
//! ```

mod backend;
mod error;
mod types;

pub use backend::{
    OpenAIBackend, OpenAIConfig, DEFAULT_DIMENSION, DEFAULT_EMBED_MODEL, DEFAULT_GEN_MODEL,
    DEFAULT_OPENAI_URL, DEFAULT_TIMEOUT_SECS,
};
pub use error::{to_pulse_error, OpenAIErrorCode};
pub use types::*;
