//! Pluggable capabilities consumed by the engine.
//!
//! - [`TokenEstimator`]: text → approximate model tokens
//! - [`TemplateRenderer`]: named template + data map → prompt text
//! - [`Summarizer`]: optional summary of history that no longer fits
//! - [`VectorSimilarity`]: optional embedding similarity for vector entries

use crate::error::{EmbeddingError, EstimateError, SummaryError, TemplateError};
use crate::message::Message;
use async_trait::async_trait;

/// Maps text to an approximate token count for a model.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str, model: &str) -> Result<usize, EstimateError>;
}

/// Renders a named template against a JSON data map.
///
/// Must be deterministic for identical inputs.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, data: &serde_json::Value) -> Result<String, TemplateError>;
}

/// Produces a short summary of messages dropped from the history window.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[Message]) -> Result<String, SummaryError>;
}

/// Embedding similarity for vector-type entries.
#[async_trait]
pub trait VectorSimilarity: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Cosine similarity clamped to `[0, 1]`.
    ///
    /// Returns 0.0 for mismatched, empty or zero-length vectors.
    fn cosine_similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let mut dot = 0.0f64;
        let mut norm_a = 0.0f64;
        let mut norm_b = 0.0f64;

        for (x, y) in a.iter().zip(b.iter()) {
            let x = f64::from(*x);
            let y = f64::from(*y);
            dot += x * y;
            norm_a += x * x;
            norm_b += y * y;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom < 1e-10 {
            return 0.0;
        }

        ((dot / denom) as f32).clamp(0.0, 1.0)
    }
}
