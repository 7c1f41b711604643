//! Configuration management
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Optional configuration files (config/default, config/local)
//! - Default values

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::retry::RetryPolicy;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    /// Upstream paper-graph API
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Lookaside cache store
    #[serde(default)]
    pub cache: CacheConfig,

    /// Embedding backend
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Synthesis (LLM) backend
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Per-run exploration budgets
    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the graph API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Fixed pre-request delay keeping aggregate traffic under the
    /// upstream rate limit. Zero disables pacing.
    #[serde(default = "default_pacing_interval")]
    pub pacing_interval_ms: u64,

    /// Retry attempts per operation
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff after a 429, multiplied by the attempt number
    #[serde(default = "default_rate_limit_backoff")]
    pub rate_limit_backoff_secs: u64,

    /// Fixed backoff after other transient failures
    #[serde(default = "default_transient_backoff")]
    pub transient_backoff_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// SQLite URL of the cache database
    #[serde(default = "default_cache_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// Embeddings endpoint (OpenAI-compatible)
    #[serde(default = "default_embedding_api_url")]
    pub api_url: String,

    /// API key; "mock" selects the deterministic mock backend
    #[serde(default)]
    pub api_key: String,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisConfig {
    /// Chat-completions endpoint
    #[serde(default = "default_synthesis_endpoint")]
    pub endpoint: String,

    /// API key; empty disables synthesis (sentinel summaries)
    #[serde(default)]
    pub api_key: String,

    /// Model to use
    #[serde(default = "default_synthesis_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_synthesis_timeout")]
    pub timeout_secs: u64,

    /// Most-relevant papers handed to the summarizer
    #[serde(default = "default_max_context_papers")]
    pub max_context_papers: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Hop budget from the seed papers
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Wall-clock budget in seconds
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u64,

    /// Seed search result limit
    #[serde(default = "default_search_result_limit")]
    pub search_result_limit: usize,
}

// Default value functions
fn default_base_url() -> String {
    "https://api.semanticscholar.org/graph/v1".to_string()
}
fn default_request_timeout() -> u64 {
    20
}
fn default_pacing_interval() -> u64 {
    1000
}
fn default_max_retries() -> u32 {
    3
}
fn default_rate_limit_backoff() -> u64 {
    10
}
fn default_transient_backoff() -> u64 {
    3
}
fn default_cache_url() -> String {
    "sqlite://data/research_cache.db".to_string()
}
fn default_embedding_api_url() -> String {
    "http://localhost:8081/v1/embeddings".to_string()
}
fn default_embedding_model() -> String {
    "BAAI/bge-small-en-v1.5".to_string()
}
fn default_embedding_dimension() -> usize {
    384
}
fn default_embedding_timeout() -> u64 {
    30
}
fn default_synthesis_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_synthesis_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_synthesis_timeout() -> u64 {
    30
}
fn default_max_context_papers() -> usize {
    10
}
fn default_max_depth() -> u32 {
    2
}
fn default_max_duration() -> u64 {
    60
}
fn default_search_result_limit() -> usize {
    10
}

impl AppConfig {
    /// Load configuration from files and APP__-prefixed environment
    /// variables, e.g. `APP__RUN__MAX_DEPTH=3`.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl UpstreamConfig {
    /// Pre-request pacing delay as a Duration
    pub fn pacing_interval(&self) -> Duration {
        Duration::from_millis(self.pacing_interval_ms)
    }

    /// Retry schedule shared by all upstream operations
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            rate_limit_backoff: Duration::from_secs(self.rate_limit_backoff_secs),
            transient_backoff: Duration::from_secs(self.transient_backoff_secs),
        }
    }
}

impl RunConfig {
    /// Wall-clock budget as a Duration
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            pacing_interval_ms: default_pacing_interval(),
            max_retries: default_max_retries(),
            rate_limit_backoff_secs: default_rate_limit_backoff(),
            transient_backoff_secs: default_transient_backoff(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: default_cache_url(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_url: default_embedding_api_url(),
            api_key: String::new(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            endpoint: default_synthesis_endpoint(),
            api_key: String::new(),
            model: default_synthesis_model(),
            timeout_secs: default_synthesis_timeout(),
            max_context_papers: default_max_context_papers(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_duration_secs: default_max_duration(),
            search_result_limit: default_search_result_limit(),
        }
    }
}
