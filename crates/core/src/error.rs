//! Error types for the Lorekeeper domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each external capability has its own error type.

use thiserror::Error;

/// The top-level error type for all Lorekeeper operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Storage errors (fatal to a build) ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Template errors ---
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Capability errors ---

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Error)]
pub enum TemplateError {
    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    #[error("Template parse error at byte {offset}: {reason}")]
    Parse { offset: usize, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum EstimateError {
    #[error("Tokenizer unavailable for model {0}")]
    UnsupportedModel(String),

    #[error("Token estimation failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, Error)]
pub enum SummaryError {
    #[error("Summary request failed: {0}")]
    Failed(String),

    #[error("Summary timed out after {0}s")]
    Timeout(u64),
}

#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    #[error("Embedding generation failed: {0}")]
    Failed(String),
}
