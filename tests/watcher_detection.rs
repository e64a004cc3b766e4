/// Desktop auto-detection end to end: a screenshot written into the
/// watched directory (including a re-save burst) reaches the pipeline
/// exactly once, and non-matching files never reach it at all.
mod common;

use common::{sample_png, StubAnalyzer};
use snapflow::codec;
use snapflow::events::EventBus;
use snapflow::pipeline::Pipeline;
use snapflow::types::{IngestSource, ItemStatus, ProcessedItem};
use snapflow::watcher::ScreenshotWatcher;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn stub_pipeline() -> Arc<Pipeline> {
    Arc::new(Pipeline::new(
        Arc::new(StubAnalyzer::always("a desktop window")),
        None,
        EventBus::new(16),
        10,
        codec::MAX_IMAGE_BYTES,
    ))
}

/// Poll until the history holds `count` items or the deadline passes
async fn wait_for_items(pipeline: &Pipeline, count: usize) -> Vec<ProcessedItem> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let items = pipeline.recent_items();
        if items.len() >= count {
            return items;
        }
        if tokio::time::Instant::now() >= deadline {
            return items;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_screenshot_burst_yields_single_item() {
    let dir = tempdir().unwrap();
    let pipeline = stub_pipeline();
    let watcher = ScreenshotWatcher::start(
        pipeline.clone(),
        dir.path().to_path_buf(),
        Duration::from_millis(400),
        codec::MAX_IMAGE_BYTES,
    )
    .unwrap();

    // Screenshot tools write in several flushes; model that as an
    // initial write followed by quick re-saves of the same path
    let path = dir.path().join("Screenshot 2026-08-29 at 10.00.00.png");
    let png = sample_png();
    std::fs::write(&path, &png[..png.len() / 2]).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    std::fs::write(&path, &png).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    std::fs::write(&path, &png).unwrap();

    let items = wait_for_items(&pipeline, 1).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].status, ItemStatus::Completed);
    assert_eq!(items[0].source, IngestSource::DesktopAuto);
    assert_eq!(
        items[0].name,
        "Screenshot 2026-08-29 at 10.00.00.png"
    );
    assert_eq!(items[0].byte_size, png.len());

    // The burst must not produce a second submission for the same path
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(pipeline.recent_items().len(), 1);

    watcher.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_non_matching_files_are_ignored() {
    let dir = tempdir().unwrap();
    let pipeline = stub_pipeline();
    let watcher = ScreenshotWatcher::start(
        pipeline.clone(),
        dir.path().to_path_buf(),
        Duration::from_millis(400),
        codec::MAX_IMAGE_BYTES,
    )
    .unwrap();

    std::fs::write(dir.path().join("holiday-photo.png"), sample_png()).unwrap();
    std::fs::write(dir.path().join("screenshot-notes.txt"), b"not an image").unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(pipeline.recent_items().is_empty());

    watcher.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_distinct_paths_each_get_an_item() {
    let dir = tempdir().unwrap();
    let pipeline = stub_pipeline();
    let watcher = ScreenshotWatcher::start(
        pipeline.clone(),
        dir.path().to_path_buf(),
        Duration::from_millis(400),
        codec::MAX_IMAGE_BYTES,
    )
    .unwrap();

    let png = sample_png();
    std::fs::write(dir.path().join("Screenshot one.png"), &png).unwrap();
    std::fs::write(dir.path().join("Screenshot two.png"), &png).unwrap();

    let items = wait_for_items(&pipeline, 2).await;
    assert_eq!(items.len(), 2);
    assert_ne!(items[0].id, items[1].id);
    assert!(items.iter().all(|i| i.status == ItemStatus::Completed));

    watcher.stop().await;
}
