//! Error types for citescout
//!
//! Provides:
//! - A single crate-wide error enum with a `Result` alias
//! - Failure-class helpers driving the retry policy
//! - A hard split between unrecoverable-for-run errors (seed search
//!   exhaustion, broken embedding backend) and degradable ones, which the
//!   fetch layer absorbs and never surfaces to the engine

use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Unrecoverable for the run
    #[error("Seed search failed after {attempts} attempts: {message}")]
    SeedSearchFailed { attempts: u32, message: String },

    #[error("Embedding backend returned an empty vector for a non-empty query")]
    EmptyQueryEmbedding,

    #[error("Validation failed: {message}")]
    Validation { message: String },

    // Upstream graph API
    #[error("Rate limited by upstream (HTTP 429)")]
    RateLimited,

    #[error("Upstream API error {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Cache store
    #[error("Cache error: {0}")]
    Cache(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Ports
    #[error("Embedding service error: {message}")]
    Embedding { message: String },

    #[error("Synthesis error: {message}")]
    Synthesis { message: String },

    // Internal
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Whether this is the upstream's distinguished rate-limit signal.
    /// Not an error class of its own until the retry budget is exhausted.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AppError::RateLimited)
    }

    /// Whether a retry may succeed. Rate limiting counts as transient but
    /// gets its own escalating backoff schedule.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::RateLimited
                | AppError::Upstream { .. }
                | AppError::HttpClient(_)
                | AppError::Embedding { .. }
        )
    }
}
