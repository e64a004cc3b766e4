//! Image processing pipeline.
//!
//! Every ingested image goes through the same path regardless of where
//! it came from: decode and validate, record a Processing entry, run
//! the vision analysis (with bounded retry for transient failures),
//! finalize the entry exactly once, then dispatch the notification and
//! emit an event. Notification delivery is best-effort and never
//! changes an item's status.

mod history;
mod retry;

pub use history::History;
pub use retry::RetryPolicy;

use crate::analysis::{AnalysisContext, AnalysisError, VisionAnalyzer};
use crate::codec::{self, DecodedImage};
use crate::error::SnapflowError;
use crate::events::{AgentEventPayload, EventBus};
use crate::notifier::Notifier;
use crate::types::{ImageMetadata, IngestSource, ItemStatus, ProcessedItem};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct Pipeline {
    analyzer: Arc<dyn VisionAnalyzer>,
    notifier: Option<Arc<dyn Notifier>>,
    history: History,
    events: EventBus,
    retry: RetryPolicy,
    max_image_bytes: usize,
    request_count: AtomicU64,
    last_request: RwLock<Option<DateTime<Utc>>>,
}

impl Pipeline {
    pub fn new(
        analyzer: Arc<dyn VisionAnalyzer>,
        notifier: Option<Arc<dyn Notifier>>,
        events: EventBus,
        history_limit: usize,
        max_image_bytes: usize,
    ) -> Self {
        Self {
            analyzer,
            notifier,
            history: History::new(history_limit),
            events,
            retry: RetryPolicy::default(),
            max_image_bytes,
            request_count: AtomicU64::new(0),
            last_request: RwLock::new(None),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Process one image end to end and return its terminal record.
    ///
    /// The returned item is always terminal (Completed or Error) and is
    /// already recorded in history, unless eviction raced it out.
    pub async fn submit(
        &self,
        bytes: Vec<u8>,
        source: IngestSource,
        metadata: ImageMetadata,
    ) -> ProcessedItem {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        *self.last_request.write().unwrap() = Some(Utc::now());

        let id = Uuid::new_v4().to_string();
        let byte_size = bytes.len();
        let sniffed_mime = codec::sniff_mime_type(&bytes);

        info!(
            "📥 Ingesting {} image ({} bytes)",
            source.as_str(),
            byte_size
        );

        let decoded = match codec::decode_image(bytes, self.max_image_bytes) {
            Ok(decoded) => decoded,
            Err(e) => {
                return self.handle_rejected(id, source, &metadata, byte_size, sniffed_mime, e)
            }
        };

        let name = resolve_name(&metadata, &id, decoded.mime_type);
        let item = ProcessedItem {
            id: id.clone(),
            source,
            name,
            byte_size,
            mime_type: decoded.mime_type.to_string(),
            width: decoded.width,
            height: decoded.height,
            timestamp: Utc::now(),
            status: ItemStatus::Processing,
            analysis_summary: None,
            error_detail: None,
            content: None,
            image_bytes: decoded.bytes.clone(),
        };
        self.history.append(item.clone());

        let context = AnalysisContext {
            source,
            filename: metadata.filename.clone(),
        };
        let summary = self
            .retry
            .run(|| self.analyzer.summarize(&decoded, &context))
            .await;

        let item = match summary {
            Ok(summary) => self.handle_analyzed(item, summary, &decoded).await,
            Err(e) => self.handle_failed(item, e),
        };

        self.history.finalize(&item);
        self.dispatch_notification(&item).await;
        self.events.publish(AgentEventPayload::ItemProcessed {
            item: item.clone(),
        });

        item
    }

    /// The image never made it past decoding. There is nothing to
    /// analyze or deliver, so the record goes straight to Error.
    fn handle_rejected(
        &self,
        id: String,
        source: IngestSource,
        metadata: &ImageMetadata,
        byte_size: usize,
        mime_type: &str,
        e: SnapflowError,
    ) -> ProcessedItem {
        error!("✗ Image rejected: {}", e);

        let name = resolve_name(metadata, &id, mime_type);
        let item = ProcessedItem {
            id,
            source,
            name,
            byte_size,
            mime_type: mime_type.to_string(),
            width: 0,
            height: 0,
            timestamp: Utc::now(),
            status: ItemStatus::Error,
            analysis_summary: None,
            error_detail: Some(e.to_string()),
            content: None,
            image_bytes: Arc::new(Vec::new()),
        };
        self.history.append(item.clone());
        self.events.publish(AgentEventPayload::ItemProcessed {
            item: item.clone(),
        });
        item
    }

    async fn handle_analyzed(
        &self,
        mut item: ProcessedItem,
        summary: String,
        decoded: &DecodedImage,
    ) -> ProcessedItem {
        info!("✓ Analysis complete for {}", item.id);

        // Secondary pass. Failures here just mean no follow-up actions.
        let content = match self.analyzer.classify(decoded).await {
            Ok(content) => Some(content),
            Err(e) => {
                debug!("Content classification unavailable for {}: {}", item.id, e);
                None
            }
        };

        item.status = ItemStatus::Completed;
        item.analysis_summary = Some(summary);
        item.content = content;
        item
    }

    fn handle_failed(&self, mut item: ProcessedItem, e: AnalysisError) -> ProcessedItem {
        error!("✗ Analysis failed for {}: {}", item.id, e);

        item.status = ItemStatus::Error;
        item.error_detail = Some(SnapflowError::Analysis(e).to_string());
        item
    }

    async fn dispatch_notification(&self, item: &ProcessedItem) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        // Rejected uploads carry no image to deliver
        if item.image_bytes.is_empty() {
            return;
        }

        if let Err(e) = notifier.notify(item).await {
            warn!("⚠ Notification delivery failed for {}: {}", item.id, e);
        }
    }

    /// Newest-first snapshot of the processing history
    pub fn recent_items(&self) -> Vec<ProcessedItem> {
        self.history.recent()
    }

    pub fn get_item(&self, id: &str) -> Option<ProcessedItem> {
        self.history.get(id)
    }

    pub fn active_count(&self) -> usize {
        self.history.active_count()
    }

    pub fn total_requests(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<DateTime<Utc>> {
        *self.last_request.read().unwrap()
    }
}

fn resolve_name(metadata: &ImageMetadata, id: &str, mime_type: &str) -> String {
    match &metadata.filename {
        Some(name) if !name.trim().is_empty() => name.clone(),
        _ => codec::synthesize_name(id, mime_type),
    }
}
