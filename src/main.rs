use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use citescout::config::AppConfig;
use citescout::embeddings::{Embedder, HttpEmbedder, MockEmbedder};
use citescout::engine::{ExpansionEngine, RunLimits};
use citescout::fetcher::{GraphApiClient, PaperApi, ResilientFetcher};
use citescout::synthesis::{LlmSynthesizer, Synthesizer};
use citescout::PaperCache;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration
    dotenvy::dotenv().ok();
    let config = AppConfig::load().context("Failed to load configuration")?;

    // 2. Setup logging with JSON format
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,citescout=debug")),
        )
        .json()
        .init();

    tracing::info!(version = citescout::VERSION, "Starting citescout...");

    let query: String = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if query.trim().is_empty() {
        anyhow::bail!("usage: citescout <query or abstract text>");
    }

    // 3. Initialize the lookaside cache
    let cache = PaperCache::connect(&config.cache.url)
        .await
        .context("Failed to open cache store")?;
    tracing::info!(url = %config.cache.url, "Cache store ready");

    // 4. Initialize the fetch layer
    let api: Arc<dyn PaperApi> = Arc::new(GraphApiClient::new(&config.upstream)?);
    let fetcher = ResilientFetcher::new(
        api,
        cache,
        config.upstream.retry_policy(),
        config.upstream.pacing_interval(),
    );

    // 5. Initialize the ports
    let embedder: Arc<dyn Embedder> = if config.embedding.api_key == "mock" {
        tracing::warn!("Using mock embedder - not for production use");
        Arc::new(MockEmbedder::new(config.embedding.dimension))
    } else {
        Arc::new(HttpEmbedder::new(config.embedding.clone())?)
    };
    let synthesizer: Arc<dyn Synthesizer> = Arc::new(LlmSynthesizer::new(config.synthesis.clone())?);

    // 6. Run one exploration
    let engine = ExpansionEngine::new(fetcher, embedder, synthesizer, RunLimits::from(&config.run));
    let report = engine.run(&query).await?;

    tracing::info!(
        papers = report.papers.len(),
        depth = report.depth,
        reason = ?report.stop_reason,
        elapsed_ms = report.elapsed_ms,
        "Exploration complete"
    );

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
