use crate::error::SnapflowError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Agent configuration, merged from the config file and environment.
///
/// File values win over environment values. The file lives at
/// `~/.snapflow/config.json` and is only written by an explicit save.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    #[serde(rename = "anthropicApiKey")]
    pub anthropic_api_key: Option<String>,
    #[serde(rename = "telegramBotToken")]
    pub telegram_bot_token: Option<String>,
    #[serde(rename = "telegramChatId")]
    pub telegram_chat_id: Option<String>,
    #[serde(rename = "enableDesktopDetection")]
    pub enable_desktop_detection: bool,
    #[serde(rename = "serverPort")]
    pub server_port: u16,
    #[serde(rename = "watchDir")]
    pub watch_dir: Option<String>,
    #[serde(rename = "maxImageBytes")]
    pub max_image_bytes: usize,
    #[serde(rename = "historyLimit")]
    pub history_limit: usize,
    #[serde(rename = "debounceMs")]
    pub debounce_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            telegram_bot_token: None,
            telegram_chat_id: None,
            enable_desktop_detection: false,
            server_port: 5001,
            watch_dir: None,
            max_image_bytes: crate::codec::MAX_IMAGE_BYTES,
            history_limit: 50,
            debounce_ms: 600,
        }
    }
}

impl AgentConfig {
    /// Read configuration from environment variables only
    pub fn from_env() -> Self {
        Self {
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok(),
            telegram_chat_id: std::env::var("TELEGRAM_CHAT_ID").ok(),
            enable_desktop_detection: std::env::var("ENABLE_DESKTOP_DETECTION")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            server_port: std::env::var("SERVER_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5001),
            ..Self::default()
        }
    }

    pub fn telegram_configured(&self) -> bool {
        self.telegram_bot_token.is_some() && self.telegram_chat_id.is_some()
    }

    /// Directory the desktop watcher observes.
    /// Defaults to the user's Desktop when nothing is configured.
    pub fn resolved_watch_dir(&self) -> PathBuf {
        if let Some(dir) = &self.watch_dir {
            return PathBuf::from(shellexpand::tilde(dir).into_owned());
        }
        dirs::desktop_dir().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("Desktop")
        })
    }

    /// Presence check for credentials required to start a session
    pub fn validate_for_start(&self) -> Result<(), SnapflowError> {
        match self.anthropic_api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(()),
            _ => Err(SnapflowError::Config(
                "Anthropic API key is required".to_string(),
            )),
        }
    }
}

pub fn get_config_dir() -> Result<PathBuf, SnapflowError> {
    if let Some(home_dir) = dirs::home_dir() {
        Ok(home_dir.join(".snapflow"))
    } else {
        Err(SnapflowError::Config(
            "Could not find home directory".to_string(),
        ))
    }
}

pub fn get_config_file_path() -> Result<PathBuf, SnapflowError> {
    Ok(get_config_dir()?.join("config.json"))
}

pub fn get_logs_dir() -> Result<PathBuf, SnapflowError> {
    Ok(get_config_dir()?.join("logs"))
}

pub fn ensure_config_dir() -> Result<(), SnapflowError> {
    let config_dir = get_config_dir()?;
    ensure_private_dir(&config_dir)
}

pub fn ensure_logs_dir() -> Result<(), SnapflowError> {
    let logs_dir = get_logs_dir()?;
    ensure_private_dir(&logs_dir)
}

fn ensure_private_dir(dir: &PathBuf) -> Result<(), SnapflowError> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;

        // Set permissions to 700 (read/write/execute for owner only) on Unix systems
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = fs::metadata(dir)?;
            let mut permissions = metadata.permissions();
            permissions.set_mode(0o700);
            fs::set_permissions(dir, permissions)?;
        }
    }
    Ok(())
}

/// Keys actually present in the config file. Everything is optional so
/// a sparse file only overrides what it names.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigOverlay {
    #[serde(rename = "anthropicApiKey")]
    anthropic_api_key: Option<String>,
    #[serde(rename = "telegramBotToken")]
    telegram_bot_token: Option<String>,
    #[serde(rename = "telegramChatId")]
    telegram_chat_id: Option<String>,
    #[serde(rename = "enableDesktopDetection")]
    enable_desktop_detection: Option<bool>,
    #[serde(rename = "serverPort")]
    server_port: Option<u16>,
    #[serde(rename = "watchDir")]
    watch_dir: Option<String>,
    #[serde(rename = "maxImageBytes")]
    max_image_bytes: Option<usize>,
    #[serde(rename = "historyLimit")]
    history_limit: Option<usize>,
    #[serde(rename = "debounceMs")]
    debounce_ms: Option<u64>,
}

/// Load the effective configuration: environment defaults with any
/// values from the config file layered on top
pub fn load_config() -> Result<AgentConfig, SnapflowError> {
    ensure_config_dir()?;

    let config_file = get_config_file_path()?;

    if config_file.exists() {
        let content = fs::read_to_string(config_file)?;
        let overlay: ConfigOverlay = serde_json::from_str(&content)?;
        Ok(merge(AgentConfig::from_env(), overlay))
    } else {
        Ok(AgentConfig::from_env())
    }
}

pub fn save_config(config: &AgentConfig) -> Result<(), SnapflowError> {
    ensure_config_dir()?;

    let config_file = get_config_file_path()?;
    let content = serde_json::to_string_pretty(config)?;

    fs::write(&config_file, content)?;

    // Set permissions to 600 (read/write for owner only) on Unix systems
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = fs::metadata(&config_file)?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(0o600);
        fs::set_permissions(&config_file, permissions)?;
    }

    Ok(())
}

/// Keys the file names win; everything else keeps its environment
/// (or default) value
fn merge(env: AgentConfig, file: ConfigOverlay) -> AgentConfig {
    AgentConfig {
        anthropic_api_key: file.anthropic_api_key.or(env.anthropic_api_key),
        telegram_bot_token: file.telegram_bot_token.or(env.telegram_bot_token),
        telegram_chat_id: file.telegram_chat_id.or(env.telegram_chat_id),
        enable_desktop_detection: file
            .enable_desktop_detection
            .unwrap_or(env.enable_desktop_detection),
        server_port: file.server_port.unwrap_or(env.server_port),
        watch_dir: file.watch_dir.or(env.watch_dir),
        max_image_bytes: file.max_image_bytes.unwrap_or(env.max_image_bytes),
        history_limit: file.history_limit.unwrap_or(env.history_limit),
        debounce_ms: file.debounce_ms.unwrap_or(env.debounce_ms),
    }
}
