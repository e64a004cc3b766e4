//! Server session lifecycle.
//!
//! The manager owns at most one running session: the pipeline, the
//! HTTP ingestion endpoint, and (optionally) the desktop watcher, built
//! together from one config snapshot and torn down together. Start is
//! atomic: the HTTP listener binds first, and a watcher failure tears
//! it back down rather than leaving a half-started session.

use crate::analysis::AnthropicAnalyzer;
use crate::codec;
use crate::config::{self, AgentConfig};
use crate::error::SnapflowError;
use crate::events::{AgentEventPayload, EventBus};
use crate::notifier::{Notifier, TelegramNotifier};
use crate::pipeline::Pipeline;
use crate::server::{self, IngestServer, ServerContext};
use crate::types::{
    ImageMetadata, IngestSource, ProcessedItem, ProcessingResponse, ServerInfo, ServerState,
};
use crate::watcher::ScreenshotWatcher;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info};

struct ServerSession {
    config: AgentConfig,
    pipeline: Arc<Pipeline>,
    server: Option<IngestServer>,
    watcher: Option<ScreenshotWatcher>,
    desktop_detection: Arc<AtomicBool>,
    port: u16,
}

pub struct ServerManager {
    session: RwLock<Option<ServerSession>>,
    state: Mutex<ServerState>,
    events: EventBus,
}

impl ServerManager {
    pub fn new(events: EventBus) -> Self {
        Self {
            session: RwLock::new(None),
            state: Mutex::new(ServerState::Stopped),
            events,
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    pub fn state(&self) -> ServerState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: ServerState) {
        *self.state.lock().unwrap() = state;
    }

    /// Load the effective configuration for the shell. A missing AI
    /// credential publishes `setup-requested` so the shell prompts on
    /// first run instead of waiting for a failed start.
    pub fn load_config(&self) -> Result<AgentConfig, SnapflowError> {
        let config = config::load_config()?;
        self.publish_setup_if_needed(&config);
        Ok(config)
    }

    /// Persist configuration edits from the shell
    pub fn save_config(&self, config: &AgentConfig) -> Result<(), SnapflowError> {
        config::save_config(config)
    }

    fn publish_setup_if_needed(&self, config: &AgentConfig) {
        if let Err(e) = config.validate_for_start() {
            self.events.publish(AgentEventPayload::SetupRequested {
                reason: e.to_string(),
            });
        }
    }

    /// Bring up a full session from `config`.
    ///
    /// A missing API key publishes `setup-requested` so the shell can
    /// prompt, and start fails without touching any resource.
    pub async fn start(&self, config: AgentConfig) -> Result<ServerInfo, SnapflowError> {
        let mut session = self.session.write().await;
        if session.is_some() {
            return Err(SnapflowError::AlreadyRunning);
        }
        self.set_state(ServerState::Starting);

        if let Err(e) = config.validate_for_start() {
            self.publish_setup_if_needed(&config);
            self.set_state(ServerState::Stopped);
            return Err(e);
        }

        match self.bring_up(&config).await {
            Ok(new_session) => {
                let info = Self::server_info(&new_session);
                info!("🚀 Server session started on port {}", new_session.port);
                *session = Some(new_session);
                self.set_state(ServerState::Running);
                self.events
                    .publish(AgentEventPayload::ServerStatus { running: true });
                Ok(info)
            }
            Err(e) => {
                self.set_state(ServerState::Stopped);
                Err(e)
            }
        }
    }

    async fn bring_up(&self, config: &AgentConfig) -> Result<ServerSession, SnapflowError> {
        // validate_for_start ran, so the key is present
        let api_key = config.anthropic_api_key.clone().unwrap_or_default();
        let analyzer = Arc::new(AnthropicAnalyzer::new(api_key)?);

        let notifier: Option<Arc<dyn Notifier>> = match (
            config.telegram_bot_token.clone(),
            config.telegram_chat_id.clone(),
        ) {
            (Some(token), Some(chat_id)) => Some(Arc::new(TelegramNotifier::new(token, chat_id)?)),
            _ => None,
        };

        let pipeline = Arc::new(Pipeline::new(
            analyzer,
            notifier,
            self.events.clone(),
            config.history_limit,
            config.max_image_bytes,
        ));

        let desktop_detection = Arc::new(AtomicBool::new(false));

        let http_server = IngestServer::start(ServerContext {
            pipeline: pipeline.clone(),
            port: config.server_port,
            desktop_detection: desktop_detection.clone(),
            telegram_configured: config.telegram_configured(),
            max_image_bytes: config.max_image_bytes,
        })
        .await?;
        let port = http_server.addr().port();

        let watcher = if config.enable_desktop_detection {
            match ScreenshotWatcher::start(
                pipeline.clone(),
                config.resolved_watch_dir(),
                Duration::from_millis(config.debounce_ms),
                config.max_image_bytes,
            ) {
                Ok(watcher) => {
                    desktop_detection.store(true, Ordering::SeqCst);
                    Some(watcher)
                }
                Err(e) => {
                    error!("Failed to start desktop watcher: {}", e);
                    http_server.shutdown().await;
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(ServerSession {
            config: config.clone(),
            pipeline,
            server: Some(http_server),
            watcher,
            desktop_detection,
            port,
        })
    }

    /// Tear the session down. Stopping twice answers NotRunning and
    /// leaves nothing changed.
    pub async fn stop(&self) -> Result<(), SnapflowError> {
        let mut session_guard = self.session.write().await;
        let Some(mut session) = session_guard.take() else {
            return Err(SnapflowError::NotRunning);
        };
        self.set_state(ServerState::Stopping);

        if let Some(watcher) = session.watcher.take() {
            watcher.stop().await;
        }
        if let Some(server) = session.server.take() {
            server.shutdown().await;
        }

        self.set_state(ServerState::Stopped);
        self.events
            .publish(AgentEventPayload::ServerStatus { running: false });
        info!("🛑 Server session stopped");
        Ok(())
    }

    pub async fn get_status(&self) -> Option<ServerInfo> {
        let session = self.session.read().await;
        session.as_ref().map(Self::server_info)
    }

    fn server_info(session: &ServerSession) -> ServerInfo {
        let local_ip = server::detect_local_ip();
        ServerInfo {
            status: "running".to_string(),
            endpoint_url: server::endpoint_url(&local_ip, session.port),
            local_ip,
            port: session.port,
            desktop_detection: session.desktop_detection.load(Ordering::SeqCst),
            telegram_configured: session.config.telegram_configured(),
        }
    }

    /// Start or stop the desktop watcher inside the running session
    pub async fn toggle_desktop_detection(&self, enable: bool) -> Result<String, SnapflowError> {
        let mut session_guard = self.session.write().await;
        let Some(session) = session_guard.as_mut() else {
            return Err(SnapflowError::NotRunning);
        };

        if enable && session.watcher.is_none() {
            let watcher = ScreenshotWatcher::start(
                session.pipeline.clone(),
                session.config.resolved_watch_dir(),
                Duration::from_millis(session.config.debounce_ms),
                session.config.max_image_bytes,
            )?;
            session.watcher = Some(watcher);
            session.desktop_detection.store(true, Ordering::SeqCst);
            Ok("Desktop detection enabled".to_string())
        } else if !enable && session.watcher.is_some() {
            if let Some(watcher) = session.watcher.take() {
                watcher.stop().await;
            }
            session.desktop_detection.store(false, Ordering::SeqCst);
            Ok("Desktop detection disabled".to_string())
        } else {
            Ok(format!(
                "Desktop detection already {}",
                if enable { "enabled" } else { "disabled" }
            ))
        }
    }

    /// Submit an image from the shell, bypassing HTTP
    pub async fn process_image_direct(
        &self,
        image_base64: &str,
        metadata: Option<ImageMetadata>,
    ) -> Result<ProcessingResponse, SnapflowError> {
        let pipeline = {
            let session = self.session.read().await;
            let Some(session) = session.as_ref() else {
                return Err(SnapflowError::NotRunning);
            };
            session.pipeline.clone()
        };

        let bytes = codec::decode_base64(image_base64)?;
        let metadata = metadata.unwrap_or_default();
        // Unlabeled direct submissions are manual uploads
        let source = match metadata.source.as_deref() {
            Some(tag) => IngestSource::from_tag(Some(tag)),
            None => IngestSource::ManualUpload,
        };

        let item = pipeline.submit(bytes, source, metadata).await;
        Ok(ProcessingResponse::from_item(&item, item.content.is_some()))
    }

    pub async fn list_recent_items(&self) -> Vec<ProcessedItem> {
        let session = self.session.read().await;
        session
            .as_ref()
            .map(|s| s.pipeline.recent_items())
            .unwrap_or_default()
    }
}
