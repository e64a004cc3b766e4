//! Shared data model for the snapflow agent.
//!
//! Defines the processed-item record, ingestion metadata, and the status
//! shapes returned to HTTP callers and the application shell.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where an image entered the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestSource {
    IosPush,
    DesktopAuto,
    ManualUpload,
}

impl IngestSource {
    /// Wire tag used in responses and events
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestSource::IosPush => "ios_push",
            IngestSource::DesktopAuto => "desktop_auto",
            IngestSource::ManualUpload => "manual_upload",
        }
    }

    /// Parse an inbound metadata tag. Callers that never label themselves
    /// are the mobile push path, so unrecognized tags map there.
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag {
            Some(t) if t.starts_with("desktop") => IngestSource::DesktopAuto,
            Some("manual_upload") | Some("manual") => IngestSource::ManualUpload,
            _ => IngestSource::IosPush,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            IngestSource::IosPush => "📱",
            IngestSource::DesktopAuto => "🖥️",
            IngestSource::ManualUpload => "📤",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            IngestSource::IosPush => "iPhone Screenshot",
            IngestSource::DesktopAuto => "Desktop Screenshot",
            IngestSource::ManualUpload => "Manual Upload",
        }
    }
}

/// Lifecycle of a single processed item.
/// Processing is entered exactly once and left exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Processing,
    Completed,
    Error,
}

/// Optional metadata accompanying a pushed or uploaded image
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub source: Option<String>,
    pub app: Option<String>,
    pub filename: Option<String>,
    pub location: Option<String>,
    pub auto_detected: Option<bool>,
}

/// Secondary classification of what a screenshot shows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentAnalysis {
    pub content_type: String,
    pub webpage_url: Option<String>,
    pub research_topics: Vec<String>,
    pub user_intent: String,
    pub follow_up: String,
}

/// One ingested image and everything the agent knows about it.
///
/// The raw bytes are kept for the process lifetime so follow-up actions
/// can reuse them, but they are never serialized into events or listings.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedItem {
    pub id: String,
    pub source: IngestSource,
    pub name: String,
    pub byte_size: usize,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub timestamp: DateTime<Utc>,
    pub status: ItemStatus,
    pub analysis_summary: Option<String>,
    pub error_detail: Option<String>,
    pub content: Option<ContentAnalysis>,
    #[serde(skip)]
    pub image_bytes: Arc<Vec<u8>>,
}

impl ProcessedItem {
    pub fn is_terminal(&self) -> bool {
        self.status != ItemStatus::Processing
    }
}

/// Response body for `POST /screenshot` and `process_image_direct`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResponse {
    pub success: bool,
    pub summary: Option<String>,
    pub analysis_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub follow_up_available: Option<bool>,
    pub source: Option<String>,
    pub error: Option<String>,
}

impl ProcessingResponse {
    pub fn from_item(item: &ProcessedItem, follow_up_available: bool) -> Self {
        match item.status {
            ItemStatus::Completed => ProcessingResponse {
                success: true,
                summary: item.analysis_summary.clone(),
                analysis_id: Some(item.id.clone()),
                timestamp: item.timestamp,
                follow_up_available: Some(follow_up_available),
                source: Some(item.source.as_str().to_string()),
                error: None,
            },
            _ => ProcessingResponse {
                success: false,
                summary: None,
                analysis_id: Some(item.id.clone()),
                timestamp: item.timestamp,
                follow_up_available: None,
                source: Some(item.source.as_str().to_string()),
                error: item.error_detail.clone(),
            },
        }
    }

    /// Failure that never produced an item (nothing decodable arrived)
    pub fn rejected(error: impl Into<String>) -> Self {
        ProcessingResponse {
            success: false,
            summary: None,
            analysis_id: None,
            timestamp: Utc::now(),
            follow_up_available: None,
            source: None,
            error: Some(error.into()),
        }
    }
}

/// Lifecycle states of the agent's server session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Shell-facing snapshot of a running session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub status: String,
    pub local_ip: String,
    pub port: u16,
    pub endpoint_url: String,
    pub desktop_detection: bool,
    pub telegram_configured: bool,
}
