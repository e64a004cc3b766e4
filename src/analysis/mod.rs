//! AI vision analysis contract and provider implementations.
//!
//! The pipeline only ever talks to the `VisionAnalyzer` trait, so tests
//! substitute scripted implementations and the shipped Anthropic client
//! stays swappable.

mod anthropic;

pub use anthropic::{parse_content_analysis, AnthropicAnalyzer, MAX_SUMMARY_CHARS};

use crate::codec::DecodedImage;
use crate::types::{ContentAnalysis, IngestSource};
use thiserror::Error;

/// Typed failures from a vision provider
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("provider rejected credentials")]
    Auth,

    #[error("provider rate limited the request")]
    RateLimited,

    #[error("payload too large for provider")]
    PayloadTooLarge,

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider request timed out")]
    Timeout,
}

impl AnalysisError {
    /// Only transient failures are worth a second attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalysisError::Unavailable(_) | AnalysisError::Timeout)
    }
}

/// Ingestion context forwarded with each analysis request
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    pub source: IngestSource,
    pub filename: Option<String>,
}

#[async_trait::async_trait]
pub trait VisionAnalyzer: Send + Sync {
    /// Produce a short textual summary of the image
    async fn summarize(
        &self,
        image: &DecodedImage,
        context: &AnalysisContext,
    ) -> Result<String, AnalysisError>;

    /// Classify what the image shows. Secondary best-effort pass;
    /// callers treat any failure as "no classification".
    async fn classify(&self, image: &DecodedImage) -> Result<ContentAnalysis, AnalysisError>;
}
