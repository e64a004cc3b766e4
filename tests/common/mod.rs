#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use snapflow::analysis::{AnalysisContext, AnalysisError, VisionAnalyzer};
use snapflow::codec::DecodedImage;
use snapflow::error::SnapflowError;
use snapflow::notifier::Notifier;
use snapflow::types::{ContentAnalysis, ProcessedItem};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Deterministic PNG with enough entropy to clear the minimum size check
pub fn sample_png() -> Vec<u8> {
    let img = image::ImageBuffer::from_fn(128, 128, |x, y| {
        image::Rgb([
            ((x * 31 + y * 17) ^ (x * y)) as u8,
            (x * 2) as u8,
            (y * 2) as u8,
        ])
    });
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
    bytes
}

pub fn sample_png_base64() -> String {
    BASE64.encode(sample_png())
}

/// Vision analyzer with a scripted response sequence. Once the script
/// runs out, the fallback summary (when set) answers every call.
pub struct StubAnalyzer {
    script: Mutex<VecDeque<Result<String, AnalysisError>>>,
    fallback: Option<String>,
    classification: Option<ContentAnalysis>,
    calls: AtomicU32,
}

impl StubAnalyzer {
    pub fn always(summary: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(summary.to_string()),
            classification: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn scripted(script: Vec<Result<String, AnalysisError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            classification: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_classification(mut self, classification: ContentAnalysis) -> Self {
        self.classification = Some(classification);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl VisionAnalyzer for StubAnalyzer {
    async fn summarize(
        &self,
        _image: &DecodedImage,
        _context: &AnalysisContext,
    ) -> Result<String, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(step) = self.script.lock().unwrap().pop_front() {
            return step;
        }
        match &self.fallback {
            Some(summary) => Ok(summary.clone()),
            None => Err(AnalysisError::Unavailable("script exhausted".to_string())),
        }
    }

    async fn classify(&self, _image: &DecodedImage) -> Result<ContentAnalysis, AnalysisError> {
        self.classification
            .clone()
            .ok_or_else(|| AnalysisError::Unavailable("no classification".to_string()))
    }
}

/// Notifier that records delivered item ids, optionally failing every call
pub struct CountingNotifier {
    delivered: Mutex<Vec<String>>,
    fail: bool,
}

impl CountingNotifier {
    pub fn new() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn delivered_ids(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Notifier for CountingNotifier {
    async fn notify(&self, item: &ProcessedItem) -> Result<(), SnapflowError> {
        self.delivered.lock().unwrap().push(item.id.clone());
        if self.fail {
            Err(SnapflowError::Notification(
                "stubbed delivery failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}
