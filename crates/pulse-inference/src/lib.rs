//! # pulse-inference
//!
//! Provider implementations for pulse:
//!
//! - [`openai::OpenAIBackend`]: embeddings and chat generation against any
//!   OpenAI-compatible endpoint.
//! - [`exa::ExaClient`]: web search and find-similar against the Exa API.
//! - `mock::MockInferenceBackend` (feature `mock`): deterministic test double.

pub mod exa;
pub mod openai;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use exa::{ExaClient, ExaConfig};
pub use openai::{OpenAIBackend, OpenAIConfig};

#[cfg(any(test, feature = "mock"))]
pub use mock::MockInferenceBackend;
