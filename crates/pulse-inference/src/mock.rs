//! Mock inference backend for deterministic testing.
//!
//! Generates embeddings from character codes (same text, same vector) and
//! returns configured responses for generation, so worker tests can run
//! without a live model.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pulse_inference::mock::MockInferenceBackend;
//!
//! let backend = MockInferenceBackend::new()
//!     .with_dimension(8)
//!     .with_fixed_response("TITLE: Weekly\nSUMMARY: Things happened.");
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use pulse_core::{EmbeddingBackend, Error, GenerationBackend, Result, Vector};

/// Mock inference backend for testing.
#[derive(Clone)]
pub struct MockInferenceBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    dimension: usize,
    /// Generation responses keyed by a substring of the prompt.
    mapped_responses: HashMap<String, String>,
    default_response: String,
    fixed_embeddings: HashMap<String, Vec<f32>>,
    fail_embeddings: bool,
    fail_generation: bool,
}

/// One recorded call against the mock.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
    pub system: Option<String>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            dimension: 16,
            mapped_responses: HashMap::new(),
            default_response: "Mock response".to_string(),
            fixed_embeddings: HashMap::new(),
            fail_embeddings: false,
            fail_generation: false,
        }
    }
}

impl MockInferenceBackend {
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        Arc::make_mut(&mut self.config).dimension = dimension;
        self
    }

    /// Response returned for every generation without a mapping.
    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).default_response = response.into();
        self
    }

    /// Respond with `output` whenever the prompt contains `needle`.
    pub fn with_response_mapping(
        mut self,
        needle: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.config)
            .mapped_responses
            .insert(needle.into(), output.into());
        self
    }

    /// Return `vector` when embedding exactly `text`.
    pub fn with_embedding(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        Arc::make_mut(&mut self.config)
            .fixed_embeddings
            .insert(text.into(), vector);
        self
    }

    /// Make every embedding call fail.
    pub fn with_embedding_failure(mut self) -> Self {
        Arc::make_mut(&mut self.config).fail_embeddings = true;
        self
    }

    /// Make every generation call fail.
    pub fn with_generation_failure(mut self) -> Self {
        Arc::make_mut(&mut self.config).fail_generation = true;
        self
    }

    fn log(&self) -> MutexGuard<'_, Vec<MockCall>> {
        self.call_log.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get_calls(&self) -> Vec<MockCall> {
        self.log().clone()
    }

    pub fn embed_call_count(&self) -> usize {
        self.log().iter().filter(|c| c.operation == "embed").count()
    }

    pub fn generate_call_count(&self) -> usize {
        self.log()
            .iter()
            .filter(|c| c.operation == "generate")
            .count()
    }

    fn record(&self, operation: &str, input: &str, system: Option<&str>) {
        self.log().push(MockCall {
            operation: operation.to_string(),
            input: input.to_string(),
            system: system.map(str::to_string),
        });
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        if let Some(v) = self.config.fixed_embeddings.get(text) {
            return v.clone();
        }
        MockEmbeddingGenerator::generate(text, self.config.dimension)
    }
}

impl Default for MockInferenceBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingBackend for MockInferenceBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        for text in texts {
            self.record("embed", text, None);
        }
        if self.config.fail_embeddings {
            return Err(Error::Embedding("Simulated failure for testing".to_string()));
        }
        Ok(texts
            .iter()
            .map(|t| Vector::from(self.embed_one(t)))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

#[async_trait]
impl GenerationBackend for MockInferenceBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.record("generate", prompt, Some(system).filter(|s| !s.is_empty()));
        if self.config.fail_generation {
            return Err(Error::Inference("Simulated failure for testing".to_string()));
        }
        let mapped = self
            .config
            .mapped_responses
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, out)| out.clone());
        Ok(mapped.unwrap_or_else(|| self.config.default_response.clone()))
    }

    fn model_name(&self) -> &str {
        "mock-gen"
    }
}

/// Deterministic embedding generator.
pub struct MockEmbeddingGenerator;

impl MockEmbeddingGenerator {
    /// Same text always yields the same unit vector.
    pub fn generate(text: &str, dimension: usize) -> Vec<f32> {
        let dimension = dimension.max(1);
        let mut vec = vec![0.0; dimension];
        for (i, c) in text.chars().enumerate() {
            let idx = (c as usize + i) % dimension;
            vec[idx] += 0.1;
        }
        Self::normalize(&mut vec);
        vec
    }

    fn normalize(vec: &mut [f32]) {
        let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vec.iter_mut().for_each(|x| *x /= magnitude);
        }
    }

    /// Cosine similarity of two equal-length vectors (0.0 when either is zero).
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if mag_a > 0.0 && mag_b > 0.0 {
            dot / (mag_a * mag_b)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embed_deterministic() {
        let backend = MockInferenceBackend::new().with_dimension(32);
        let texts = vec!["quantum computing".to_string()];
        let a = backend.embed_texts(&texts).await.unwrap();
        let b = backend.embed_texts(&texts).await.unwrap();
        assert_eq!(a[0].as_slice(), b[0].as_slice());
        assert_eq!(a[0].as_slice().len(), 32);
        assert_eq!(backend.embed_call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_fixed_embedding() {
        let backend = MockInferenceBackend::new().with_embedding("x", vec![1.0, 0.0]);
        let v = backend.embed_texts(&["x".to_string()]).await.unwrap();
        assert_eq!(v[0].as_slice(), &[1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_mock_response_mapping() {
        let backend = MockInferenceBackend::new()
            .with_fixed_response("default")
            .with_response_mapping("Topic: Rust", "rusty");
        assert_eq!(
            backend.generate("Topic: Rust\nmore").await.unwrap(),
            "rusty"
        );
        assert_eq!(backend.generate("other").await.unwrap(), "default");
        assert_eq!(backend.generate_call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_failures() {
        let backend = MockInferenceBackend::new()
            .with_embedding_failure()
            .with_generation_failure();
        assert!(backend.embed_texts(&["a".to_string()]).await.is_err());
        assert!(matches!(
            backend.generate("p").await.unwrap_err(),
            Error::Inference(_)
        ));
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let v = MockEmbeddingGenerator::generate("hello", 16);
        let sim = MockEmbeddingGenerator::cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-5);
    }
}
