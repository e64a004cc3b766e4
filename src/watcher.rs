//! Desktop screenshot auto-detection.
//!
//! Filesystem events from the watched directory go through a per-path
//! debounce map so a burst of create/modify events for one file turns
//! into a single submission. The map is swept on a fixed tick; paths
//! quiet for the debounce window are size-probed for stability, read,
//! and forwarded to the pipeline. A shared in-flight set guarantees at
//! most one concurrent submission per path.

use crate::error::SnapflowError;
use crate::pipeline::Pipeline;
use crate::types::{ImageMetadata, IngestSource, ItemStatus};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const SCREENSHOT_PATTERNS: [&str; 4] = ["screenshot", "screen shot", "capture", "cleanshot"];
const SCREENSHOT_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Accepted range for the per-path debounce window
const DEBOUNCE_MIN: Duration = Duration::from_millis(400);
const DEBOUNCE_MAX: Duration = Duration::from_millis(800);

/// How often the debounce map is checked for quiet paths
const SWEEP_INTERVAL: Duration = Duration::from_millis(200);

/// Gap between the two size reads of the stability probe
const PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// Transient read failures tolerated before a path is given up on
const MAX_READ_RETRIES: u32 = 3;

pub struct ScreenshotWatcher {
    watcher: Option<RecommendedWatcher>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
    forward_handle: Option<tokio::task::JoinHandle<()>>,
    running: Arc<AtomicBool>,
    watch_dir: PathBuf,
}

impl ScreenshotWatcher {
    pub fn start(
        pipeline: Arc<Pipeline>,
        watch_dir: PathBuf,
        debounce: Duration,
        max_image_bytes: usize,
    ) -> Result<Self, SnapflowError> {
        let debounce = clamp_debounce(debounce);
        let running = Arc::new(AtomicBool::new(true));
        let in_flight: Arc<Mutex<HashSet<PathBuf>>> = Arc::new(Mutex::new(HashSet::new()));

        let (event_tx, event_rx) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(
            event_tx,
            Config::default().with_poll_interval(Duration::from_secs(1)),
        )?;
        watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

        let (file_tx, mut file_rx) = tokio::sync::mpsc::unbounded_channel::<(PathBuf, Vec<u8>)>();

        // Async side: hand stable files to the pipeline, then release the path
        let forward_in_flight = in_flight.clone();
        let forward_handle = tokio::spawn(async move {
            while let Some((path, bytes)) = file_rx.recv().await {
                let filename = path.file_name().map(|n| n.to_string_lossy().to_string());
                let metadata = ImageMetadata {
                    source: Some("desktop_auto".to_string()),
                    app: Some("Desktop Screenshot".to_string()),
                    filename,
                    auto_detected: Some(true),
                    ..Default::default()
                };

                let item = pipeline
                    .submit(bytes, IngestSource::DesktopAuto, metadata)
                    .await;
                if item.status == ItemStatus::Completed {
                    info!("✅ Desktop screenshot processed (ID: {})", item.id);
                }

                forward_in_flight.lock().unwrap().remove(&path);
            }
        });

        // Sync side: collect events into the debounce map, sweep on a tick
        let thread_running = running.clone();
        let thread_in_flight = in_flight.clone();
        let thread_handle = std::thread::spawn(move || {
            let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

            loop {
                match event_rx.recv_timeout(SWEEP_INTERVAL) {
                    Ok(Ok(event)) => {
                        if is_relevant_event(&event) {
                            for path in event.paths {
                                if is_screenshot_file(&path) {
                                    pending.insert(path, Instant::now());
                                }
                            }
                        }
                    }
                    Ok(Err(e)) => warn!("Watch error: {}", e),
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }

                if !thread_running.load(Ordering::SeqCst) {
                    break;
                }
                sweep(&mut pending, debounce, max_image_bytes, &thread_in_flight, &file_tx);
            }
            // file_tx drops here, letting the forwarder drain and exit
        });

        info!("🔍 Desktop screenshot auto-detection started");
        info!("📁 Monitoring: {}", watch_dir.display());

        Ok(Self {
            watcher: Some(watcher),
            thread_handle: Some(thread_handle),
            forward_handle: Some(forward_handle),
            running,
            watch_dir,
        })
    }

    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    /// Stop watching and drain any submission already handed to the
    /// pipeline, so no item is left stuck in Processing.
    pub async fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        drop(self.watcher.take());

        if let Some(handle) = self.thread_handle.take() {
            let _ = tokio::task::spawn_blocking(move || handle.join()).await;
        }
        if let Some(handle) = self.forward_handle.take() {
            let _ = handle.await;
        }
        info!("Desktop screenshot auto-detection stopped");
    }
}

impl Drop for ScreenshotWatcher {
    fn drop(&mut self) {
        // Backstop for watchers dropped without an explicit stop
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = &self.forward_handle {
            handle.abort();
        }
    }
}

fn clamp_debounce(debounce: Duration) -> Duration {
    debounce.clamp(DEBOUNCE_MIN, DEBOUNCE_MAX)
}

fn is_relevant_event(event: &Event) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn is_screenshot_file(path: &Path) -> bool {
    let Some(name) = path.file_name() else {
        return false;
    };
    let name = name.to_string_lossy().to_lowercase();
    if name.starts_with('.') {
        return false;
    }

    let Some(ext) = path.extension() else {
        return false;
    };
    let ext = ext.to_string_lossy().to_lowercase();
    if !SCREENSHOT_EXTENSIONS.contains(&ext.as_str()) {
        return false;
    }

    SCREENSHOT_PATTERNS
        .iter()
        .any(|pattern| name.contains(pattern))
}

/// Promote every path that has been quiet for the debounce window
fn sweep(
    pending: &mut HashMap<PathBuf, Instant>,
    debounce: Duration,
    max_image_bytes: usize,
    in_flight: &Mutex<HashSet<PathBuf>>,
    forward: &tokio::sync::mpsc::UnboundedSender<(PathBuf, Vec<u8>)>,
) {
    let now = Instant::now();
    let ready: Vec<PathBuf> = pending
        .iter()
        .filter(|(_, last_seen)| now.duration_since(**last_seen) >= debounce)
        .map(|(path, _)| path.clone())
        .collect();

    for path in ready {
        pending.remove(&path);

        if !in_flight.lock().unwrap().insert(path.clone()) {
            debug!("Skipping {}, submission already in flight", path.display());
            continue;
        }

        match probe_and_read(&path, max_image_bytes) {
            ProbeOutcome::Ready(bytes) => {
                info!("📸 Screenshot detected: {}", path.display());
                if forward.send((path.clone(), bytes)).is_err() {
                    in_flight.lock().unwrap().remove(&path);
                }
            }
            ProbeOutcome::Unstable => {
                // Still being written, back into the map for another round
                in_flight.lock().unwrap().remove(&path);
                pending.insert(path, Instant::now());
            }
            ProbeOutcome::Skip(reason) => {
                warn!("Skipping {}: {}", path.display(), reason);
                in_flight.lock().unwrap().remove(&path);
            }
        }
    }
}

#[derive(Debug, PartialEq)]
enum ProbeOutcome {
    Ready(Vec<u8>),
    Unstable,
    Skip(String),
}

/// Two size reads must agree before the file counts as fully written.
/// Screenshot tools create the file first and stream pixels in after.
fn probe_and_read(path: &Path, max_image_bytes: usize) -> ProbeOutcome {
    let Some(first) = file_size(path) else {
        return ProbeOutcome::Skip("file disappeared".to_string());
    };
    if first == 0 {
        return ProbeOutcome::Unstable;
    }

    std::thread::sleep(PROBE_INTERVAL);

    let Some(second) = file_size(path) else {
        return ProbeOutcome::Skip("file disappeared".to_string());
    };
    if first != second {
        return ProbeOutcome::Unstable;
    }
    if second as usize > max_image_bytes {
        return ProbeOutcome::Skip(format!(
            "too large ({:.1}MB)",
            second as f64 / 1024.0 / 1024.0
        ));
    }

    let mut attempt = 0;
    loop {
        match std::fs::read(path) {
            Ok(bytes) => return ProbeOutcome::Ready(bytes),
            Err(e) if attempt < MAX_READ_RETRIES => {
                debug!("Transient read failure for {}: {}", path.display(), e);
                attempt += 1;
                std::thread::sleep(PROBE_INTERVAL);
            }
            Err(e) => return ProbeOutcome::Skip(format!("read failed: {}", e)),
        }
    }
}

fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}
