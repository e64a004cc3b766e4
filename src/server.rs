//! HTTP ingestion endpoint.
//!
//! Three routes: POST /screenshot submits an image and blocks until the
//! pipeline finishes with it, GET /health answers liveness, GET /status
//! reports the running session. The endpoint binds on all interfaces so
//! phones on the local network can reach it.

use crate::codec;
use crate::error::SnapflowError;
use crate::pipeline::Pipeline;
use crate::types::{ImageMetadata, IngestSource, ItemStatus, ProcessingResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use warp::http::StatusCode;
use warp::{Filter, Rejection};

const SERVER_NAME: &str = "Snapflow Screenshot Server";

/// Body for `POST /screenshot`
#[derive(Debug, Deserialize)]
pub struct ScreenshotRequest {
    pub image: String,
    pub metadata: Option<ImageMetadata>,
}

/// Body for `GET /status`
#[derive(Debug, Serialize)]
struct ServerStatus {
    server: String,
    status: String,
    local_ip: String,
    port: u16,
    endpoint_url: String,
    total_requests: u64,
    last_request: Option<DateTime<Utc>>,
    active_items: usize,
    desktop_detection: bool,
    telegram_configured: bool,
}

/// Everything the route handlers need, snapshotted at session start.
/// The desktop detection flag is shared with the lifecycle manager so
/// toggling it is visible to `/status` without a restart.
#[derive(Clone)]
pub struct ServerContext {
    pub pipeline: Arc<Pipeline>,
    pub port: u16,
    pub desktop_detection: Arc<AtomicBool>,
    pub telegram_configured: bool,
    pub max_image_bytes: usize,
}

pub struct IngestServer {
    server_handle: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    addr: SocketAddr,
}

impl IngestServer {
    /// Bind the listener and start serving. Fails fast when the port is
    /// taken so a half-started session never lingers.
    pub async fn start(ctx: ServerContext) -> Result<IngestServer, SnapflowError> {
        let port = ctx.port;
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (bound_addr, server) = warp::serve(routes(ctx))
            .try_bind_with_graceful_shutdown(addr, async {
                shutdown_rx.await.ok();
            })
            .map_err(|e| {
                error!("Failed to bind {}: {}", addr, e);
                SnapflowError::PortInUse(port)
            })?;

        let server_handle = tokio::spawn(server);
        info!("🌐 Ingestion endpoint listening on {}", bound_addr);

        Ok(IngestServer {
            server_handle: Some(server_handle),
            shutdown_tx: Some(shutdown_tx),
            addr: bound_addr,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(server_handle) = self.server_handle.take() {
            let _ = server_handle.await;
        }
        info!("Ingestion endpoint stopped");
    }
}

impl Drop for IngestServer {
    fn drop(&mut self) {
        // Backstop for sessions dropped without an explicit shutdown
        if let Some(handle) = &self.server_handle {
            handle.abort();
        }
    }
}

/// Best local address for building URLs a phone can reach
pub fn detect_local_ip() -> String {
    local_ip_address::local_ip()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|_| "127.0.0.1".to_string())
}

pub fn endpoint_url(local_ip: &str, port: u16) -> String {
    format!("http://{}:{}/screenshot", local_ip, port)
}

fn routes(
    ctx: ServerContext,
) -> impl Filter<Extract = impl warp::Reply, Error = Rejection> + Clone {
    // Base64 inflates the raw image by 4/3, plus headroom for the JSON wrapper
    let body_limit = (ctx.max_image_bytes as u64) * 4 / 3 + 16 * 1024;
    let ctx_filter = warp::any().map(move || ctx.clone());

    let screenshot = warp::path("screenshot")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(body_limit))
        .and(warp::body::json())
        .and(ctx_filter.clone())
        .and_then(handle_screenshot);

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(handle_health);

    let status = warp::path("status")
        .and(warp::path::end())
        .and(warp::get())
        .and(ctx_filter)
        .and_then(handle_status);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type"])
        .allow_methods(vec!["GET", "POST", "OPTIONS"]);

    screenshot
        .or(health)
        .or(status)
        .recover(handle_rejection)
        .with(cors)
}

async fn handle_screenshot(
    request: ScreenshotRequest,
    ctx: ServerContext,
) -> Result<impl warp::Reply, Infallible> {
    let bytes = match codec::decode_base64(&request.image) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Rejected submission: {}", e);
            let response = ProcessingResponse::rejected(e.to_string());
            return Ok(warp::reply::with_status(
                warp::reply::json(&response),
                StatusCode::BAD_REQUEST,
            ));
        }
    };

    let metadata = request.metadata.unwrap_or_default();
    let source = IngestSource::from_tag(metadata.source.as_deref());
    let item = ctx.pipeline.submit(bytes, source, metadata).await;

    // Undecodable uploads (recorded as Error with no image) are the
    // caller's fault; analysis failures are ours and still answer 200.
    let code = if item.status == ItemStatus::Error && item.image_bytes.is_empty() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };

    let response = ProcessingResponse::from_item(&item, item.content.is_some());
    Ok(warp::reply::with_status(warp::reply::json(&response), code))
}

async fn handle_health() -> Result<impl warp::Reply, Infallible> {
    Ok(warp::reply::json(&serde_json::json!({
        "status": "healthy",
        "server": SERVER_NAME,
        "timestamp": Utc::now(),
    })))
}

async fn handle_status(ctx: ServerContext) -> Result<impl warp::Reply, Infallible> {
    let local_ip = detect_local_ip();
    let status = ServerStatus {
        server: SERVER_NAME.to_string(),
        status: "running".to_string(),
        endpoint_url: endpoint_url(&local_ip, ctx.port),
        local_ip,
        port: ctx.port,
        total_requests: ctx.pipeline.total_requests(),
        last_request: ctx.pipeline.last_request(),
        active_items: ctx.pipeline.active_count(),
        desktop_detection: ctx.desktop_detection.load(Ordering::SeqCst),
        telegram_configured: ctx.telegram_configured,
    };
    Ok(warp::reply::json(&status))
}

async fn handle_rejection(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            "Image payload exceeds the size limit".to_string(),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed".to_string(),
        )
    } else {
        error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
    };

    let response = ProcessingResponse::rejected(message);
    Ok(warp::reply::with_status(warp::reply::json(&response), code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisContext, AnalysisError, VisionAnalyzer};
    use crate::codec::DecodedImage;
    use crate::events::EventBus;
    use crate::types::ContentAnalysis;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;

    struct FixedAnalyzer;

    #[async_trait::async_trait]
    impl VisionAnalyzer for FixedAnalyzer {
        async fn summarize(
            &self,
            _image: &DecodedImage,
            _context: &AnalysisContext,
        ) -> Result<String, AnalysisError> {
            Ok("stub summary".to_string())
        }

        async fn classify(&self, _image: &DecodedImage) -> Result<ContentAnalysis, AnalysisError> {
            Err(AnalysisError::Unavailable("stub".to_string()))
        }
    }

    fn test_ctx(port: u16) -> ServerContext {
        let pipeline = Pipeline::new(
            Arc::new(FixedAnalyzer),
            None,
            EventBus::new(16),
            10,
            codec::MAX_IMAGE_BYTES,
        );
        ServerContext {
            pipeline: Arc::new(pipeline),
            port,
            desktop_detection: Arc::new(AtomicBool::new(false)),
            telegram_configured: false,
            max_image_bytes: codec::MAX_IMAGE_BYTES,
        }
    }

    fn sample_png_base64() -> String {
        let img = image::ImageBuffer::from_fn(64, 64, |x, y| {
            image::Rgb([
                ((x * 37 + y * 11) ^ (x + y)) as u8,
                (x * 3) as u8,
                (y * 3) as u8,
            ])
        });
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .unwrap();
        // Keep it above the minimum accepted size
        while bytes.len() < 1024 {
            bytes.extend_from_slice(&[0u8; 64]);
        }
        BASE64.encode(&bytes)
    }

    #[tokio::test]
    async fn test_health_route() {
        let routes = routes(test_ctx(5001));
        let resp = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&routes)
            .await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_screenshot_rejects_malformed_base64_without_recording() {
        let ctx = test_ctx(5001);
        let pipeline = ctx.pipeline.clone();
        let routes = routes(ctx);

        let resp = warp::test::request()
            .method("POST")
            .path("/screenshot")
            .json(&serde_json::json!({ "image": "!!not-base64!!" }))
            .reply(&routes)
            .await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ProcessingResponse = serde_json::from_slice(resp.body()).unwrap();
        assert!(!body.success);
        assert!(body.error.is_some());
        assert!(body.analysis_id.is_none());
        assert!(pipeline.recent_items().is_empty());
    }

    #[tokio::test]
    async fn test_screenshot_round_trip() {
        let ctx = test_ctx(5001);
        let pipeline = ctx.pipeline.clone();
        let routes = routes(ctx);

        let resp = warp::test::request()
            .method("POST")
            .path("/screenshot")
            .json(&serde_json::json!({
                "image": sample_png_base64(),
                "metadata": { "source": "ios_screenshot", "app": "Safari" }
            }))
            .reply(&routes)
            .await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: ProcessingResponse = serde_json::from_slice(resp.body()).unwrap();
        assert!(body.success);
        assert_eq!(body.summary.as_deref(), Some("stub summary"));
        assert_eq!(body.source.as_deref(), Some("ios_push"));

        let items = pipeline.recent_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, ItemStatus::Completed);
    }

    #[tokio::test]
    async fn test_undecodable_image_answers_400_with_error_item() {
        let ctx = test_ctx(5001);
        let pipeline = ctx.pipeline.clone();
        let routes = routes(ctx);

        let resp = warp::test::request()
            .method("POST")
            .path("/screenshot")
            .json(&serde_json::json!({ "image": BASE64.encode(vec![0x42u8; 4096]) }))
            .reply(&routes)
            .await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ProcessingResponse = serde_json::from_slice(resp.body()).unwrap();
        assert!(!body.success);
        assert!(body.analysis_id.is_some());

        let items = pipeline.recent_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, ItemStatus::Error);
    }

    #[tokio::test]
    async fn test_status_route_reports_counters() {
        let ctx = test_ctx(4242);
        let routes = routes(ctx);

        let resp = warp::test::request()
            .method("GET")
            .path("/status")
            .reply(&routes)
            .await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["status"], "running");
        assert_eq!(body["port"], 4242);
        assert_eq!(body["total_requests"], 0);
        assert_eq!(body["active_items"], 0);
        assert!(body["endpoint_url"]
            .as_str()
            .unwrap()
            .ends_with(":4242/screenshot"));
    }

    #[tokio::test]
    async fn test_start_fails_when_port_is_taken() {
        let blocker = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let port = blocker.local_addr().unwrap().port();

        let result = IngestServer::start(test_ctx(port)).await;
        match result {
            Err(SnapflowError::PortInUse(p)) => assert_eq!(p, port),
            other => panic!("expected PortInUse, got {:?}", other.map(|s| s.addr())),
        }
    }

    #[tokio::test]
    async fn test_lifecycle_bind_and_shutdown() {
        let server = IngestServer::start(test_ctx(0)).await.unwrap();
        let port = server.addr().port();
        assert_ne!(port, 0);

        server.shutdown().await;

        // Port is free again once shutdown returns
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(std::net::TcpListener::bind(("0.0.0.0", port)).is_ok());
    }
}
