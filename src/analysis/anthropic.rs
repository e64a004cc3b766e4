use super::{AnalysisContext, AnalysisError, VisionAnalyzer};
use crate::codec::DecodedImage;
use crate::error::SnapflowError;
use crate::types::{ContentAnalysis, IngestSource};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
pub const ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

const MESSAGES_PATH: &str = "/v1/messages";

/// Per-request deadline for provider calls
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Summaries are clamped so notifications and history stay bounded
pub const MAX_SUMMARY_CHARS: usize = 2000;

const CLASSIFY_PROMPT: &str = r#"Analyze this screenshot and determine:

1. Content type (webpage, app, document, social media, etc.)
2. If webpage: extract any visible URLs or domains
3. If research-related: identify key topics
4. User context: what might they want to do with this?

Respond with:
CONTENT_TYPE: [webpage/app/document/social/game/other]
WEBPAGE_URL: [URL if visible, or "none"]
RESEARCH_TOPICS: [comma-separated topics if research-related]
USER_INTENT: [likely user intent]
FOLLOW_UP: [suggested follow-up actions]"#;

/// Vision analysis backed by the Anthropic Messages API
pub struct AnthropicAnalyzer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicAnalyzer {
    pub fn new(api_key: String) -> Result<Self, SnapflowError> {
        Self::with_base_url(api_key, ANTHROPIC_API_URL.to_string())
    }

    /// Point the client at a different host (used by HTTP-stub tests)
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, SnapflowError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url,
        })
    }

    async fn send_messages_request(
        &self,
        prompt: &str,
        max_tokens: u32,
        image: &DecodedImage,
    ) -> Result<String, AnalysisError> {
        let request_body = serde_json::json!({
            "model": ANTHROPIC_MODEL,
            "max_tokens": max_tokens,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "text",
                        "text": prompt
                    },
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": image.mime_type,
                            "data": BASE64.encode(image.bytes.as_slice())
                        }
                    }
                ]
            }]
        });

        let response = self
            .client
            .post(format!("{}{}", self.base_url, MESSAGES_PATH))
            .header("x-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request_body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let response_json: serde_json::Value = response.json().await.map_err(|e| {
            AnalysisError::Unavailable(format!("unreadable provider response: {}", e))
        })?;

        response_json["content"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                AnalysisError::Unavailable("invalid provider response format".to_string())
            })
    }
}

#[async_trait::async_trait]
impl VisionAnalyzer for AnthropicAnalyzer {
    async fn summarize(
        &self,
        image: &DecodedImage,
        context: &AnalysisContext,
    ) -> Result<String, AnalysisError> {
        debug!(
            source = context.source.as_str(),
            filename = context.filename.as_deref().unwrap_or(""),
            "Requesting image summary"
        );
        let text = self
            .send_messages_request(summary_prompt(context.source), 200, image)
            .await?;
        Ok(clamp_summary(text))
    }

    async fn classify(&self, image: &DecodedImage) -> Result<ContentAnalysis, AnalysisError> {
        let text = self
            .send_messages_request(CLASSIFY_PROMPT, 300, image)
            .await?;
        Ok(parse_content_analysis(&text))
    }
}

fn summary_prompt(source: IngestSource) -> &'static str {
    match source {
        IngestSource::DesktopAuto => {
            "Analyze this desktop screenshot briefly. What is shown and what might be the user's intent?"
        }
        _ => "Analyze this iPhone screenshot briefly. What is shown and what might be the user's intent?",
    }
}

fn clamp_summary(summary: String) -> String {
    if summary.chars().count() <= MAX_SUMMARY_CHARS {
        summary
    } else {
        summary.chars().take(MAX_SUMMARY_CHARS).collect()
    }
}

fn classify_status(status: StatusCode) -> AnalysisError {
    match status.as_u16() {
        401 | 403 => AnalysisError::Auth,
        429 => AnalysisError::RateLimited,
        413 => AnalysisError::PayloadTooLarge,
        s if s >= 500 => AnalysisError::Unavailable(format!("provider returned status {}", s)),
        s => AnalysisError::Unavailable(format!("unexpected provider status {}", s)),
    }
}

fn classify_transport_error(err: reqwest::Error) -> AnalysisError {
    if err.is_timeout() {
        AnalysisError::Timeout
    } else {
        AnalysisError::Unavailable(format!("request failed: {}", err))
    }
}

/// Parse the provider's line-prefixed classification reply.
/// Values are split on the first colon only, so URLs survive intact.
pub fn parse_content_analysis(analysis_text: &str) -> ContentAnalysis {
    let mut result = ContentAnalysis::default();

    for line in analysis_text.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("CONTENT_TYPE:") {
            result.content_type = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("WEBPAGE_URL:") {
            let url = value.trim();
            if !url.is_empty() && url != "none" && url != "unknown" {
                result.webpage_url = Some(url.to_string());
            }
        } else if let Some(value) = line.strip_prefix("RESEARCH_TOPICS:") {
            result.research_topics = value
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        } else if let Some(value) = line.strip_prefix("USER_INTENT:") {
            result.user_intent = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("FOLLOW_UP:") {
            result.follow_up = value.trim().to_string();
        }
    }

    result
}
