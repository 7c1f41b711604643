//! Synthesis port: ranked papers + query → natural-language summary.
//!
//! The production implementation talks to a chat-completions endpoint.
//! It degrades rather than fails: an empty paper list or a missing API
//! key yields a sentinel string, and callers treat any remaining error
//! as best-effort (the engine substitutes a placeholder).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::SynthesisConfig;
use crate::errors::{AppError, Result};
use crate::models::Paper;

/// Sentinel returned when there is nothing to summarize.
pub const NO_PAPERS_SUMMARY: &str = "No papers found to summarize.";

/// Sentinel returned when the synthesis backend is disabled.
pub const DISABLED_SUMMARY: &str = "Synthesis disabled: no API key configured.";

/// Placeholder the engine stores when the port errors out mid-run.
pub const FAILED_SUMMARY: &str = "Failed to generate summary.";

/// Trait for summary generation.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Summarize `papers` (ranked, best first) with respect to `query`.
    /// Implementations return sentinel text, not an error, when given no
    /// papers or when the backend is unavailable by configuration.
    async fn summarize(&self, papers: &[Paper], query: &str) -> Result<String>;
}

/// Chat-completions backed synthesizer.
pub struct LlmSynthesizer {
    config: SynthesisConfig,
    client: reqwest::Client,
}

impl LlmSynthesizer {
    pub fn new(config: SynthesisConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Build the synthesis prompt from numbered context blocks, capped at
    /// the configured context size.
    fn build_prompt(&self, papers: &[Paper], query: &str) -> String {
        let mut prompt = format!(
            "You are a research assistant. The user is investigating: \"{}\".\n\n\
            Here are the most relevant papers found:\n",
            query
        );

        for (i, paper) in papers.iter().take(self.config.max_context_papers).enumerate() {
            let year = paper
                .year
                .map(|y| y.to_string())
                .unwrap_or_else(|| "unknown year".to_string());
            prompt.push_str(&format!(
                "\n[{}] {} ({})\n{}\n",
                i + 1,
                paper.title,
                year,
                paper.abstract_text
            ));
        }

        prompt.push_str(
            "\nSynthesize these findings into a concise one-paragraph summary. \
            Highlight the key themes and how they relate to the user's query, \
            citing papers inline as [1], [2], etc.",
        );
        prompt
    }

    /// 1-based indices of `[n]` citation markers appearing in `text`,
    /// bounded by the number of context papers.
    fn cited_indices(text: &str, context_len: usize) -> Vec<usize> {
        let pattern = regex_lite::Regex::new(r"\[(\d+)\]").unwrap();
        let mut indices: Vec<usize> = pattern
            .captures_iter(text)
            .filter_map(|cap| cap.get(1)?.as_str().parse::<usize>().ok())
            .filter(|idx| (1..=context_len).contains(idx))
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    async fn call_llm(&self, prompt: &str) -> Result<String> {
        #[derive(Serialize)]
        struct ChatMessage<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<ChatMessage<'a>>,
        }

        #[derive(Deserialize)]
        struct ChatMessageResponse {
            content: String,
        }

        #[derive(Deserialize)]
        struct ChatChoice {
            message: ChatMessageResponse,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<ChatChoice>,
        }

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are a helpful research assistant.",
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Synthesis {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Synthesis {
                message: format!("API error {}: {}", status, body),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| AppError::Synthesis {
            message: format!("Failed to parse response: {}", e),
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::Synthesis {
                message: "Empty response from LLM".to_string(),
            })
    }
}

#[async_trait]
impl Synthesizer for LlmSynthesizer {
    async fn summarize(&self, papers: &[Paper], query: &str) -> Result<String> {
        if papers.is_empty() {
            return Ok(NO_PAPERS_SUMMARY.to_string());
        }
        if self.config.api_key.is_empty() {
            tracing::warn!("No synthesis API key configured, returning sentinel summary");
            return Ok(DISABLED_SUMMARY.to_string());
        }

        let context_len = papers.len().min(self.config.max_context_papers);
        let prompt = self.build_prompt(papers, query);
        let text = self.call_llm(&prompt).await?;

        let cited = Self::cited_indices(&text, context_len);
        tracing::debug!(
            cited = cited.len(),
            context = context_len,
            "Generated summary"
        );

        Ok(text)
    }
}
