use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::modules::error::{LockInError, Result};

const APP_DIR: &str = "lockin";
const CONFIG_FILE: &str = "config.json";
const DATABASE_FILE: &str = "lockin.db";

const MAX_CAPTURE_INTERVAL_SECS: u64 = 24 * 60 * 60;
const MAX_RECENT_WINDOW_MINUTES: u64 = 24 * 60;
const MAX_ANALYSIS_TIMEOUT_SECS: u64 = 10 * 60;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LockInConfig {
    #[serde(default = "default_analysis_endpoint")]
    pub analysis_endpoint: String,
    #[serde(default = "default_capture_interval_secs")]
    pub capture_interval_secs: u64,
    #[serde(default = "default_recent_window_minutes")]
    pub recent_window_minutes: u64,
    #[serde(default = "default_recent_window_limit")]
    pub recent_window_limit: u32,
    #[serde(default = "default_capture_retry_attempts")]
    pub capture_retry_attempts: u32,
    #[serde(default = "default_capture_retry_backoff_ms")]
    pub capture_retry_backoff_ms: u64,
    #[serde(default = "default_analysis_timeout_secs")]
    pub analysis_timeout_secs: u64,
    #[serde(default = "default_accomplish_delay_ms")]
    pub accomplish_delay_ms: u64,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    #[serde(default = "default_true")]
    pub clear_records_on_exit: bool,
}

fn default_analysis_endpoint() -> String {
    "http://localhost:8000/analyze-screenshot".to_string()
}

fn default_capture_interval_secs() -> u64 {
    180
}

fn default_recent_window_minutes() -> u64 {
    15
}

fn default_recent_window_limit() -> u32 {
    5
}

fn default_capture_retry_attempts() -> u32 {
    3
}

fn default_capture_retry_backoff_ms() -> u64 {
    1000
}

fn default_analysis_timeout_secs() -> u64 {
    30
}

fn default_accomplish_delay_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

impl Default for LockInConfig {
    fn default() -> Self {
        Self {
            analysis_endpoint: default_analysis_endpoint(),
            capture_interval_secs: default_capture_interval_secs(),
            recent_window_minutes: default_recent_window_minutes(),
            recent_window_limit: default_recent_window_limit(),
            capture_retry_attempts: default_capture_retry_attempts(),
            capture_retry_backoff_ms: default_capture_retry_backoff_ms(),
            analysis_timeout_secs: default_analysis_timeout_secs(),
            accomplish_delay_ms: default_accomplish_delay_ms(),
            notifications_enabled: true,
            clear_records_on_exit: true,
        }
    }
}

impl LockInConfig {
    pub fn validate(&self) -> Result<()> {
        check_range("capture_interval_secs", self.capture_interval_secs, 1, MAX_CAPTURE_INTERVAL_SECS)?;
        check_range("recent_window_minutes", self.recent_window_minutes, 0, MAX_RECENT_WINDOW_MINUTES)?;
        check_range("analysis_timeout_secs", self.analysis_timeout_secs, 1, MAX_ANALYSIS_TIMEOUT_SECS)?;
        let endpoint = url::Url::parse(&self.analysis_endpoint)
            .map_err(|e| LockInError::Config(format!("invalid analysis_endpoint '{}': {}", self.analysis_endpoint, e)))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(LockInError::Config(format!(
                "analysis_endpoint must be http or https, got '{}'",
                endpoint.scheme()
            )));
        }
        Ok(())
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_secs(self.capture_interval_secs)
    }

    pub fn accomplish_delay(&self) -> Duration {
        Duration::from_millis(self.accomplish_delay_ms)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }
}

fn check_range(field: &str, value: u64, min: u64, max: u64) -> Result<()> {
    if value < min || value > max {
        return Err(LockInError::Config(format!(
            "{} must be between {} and {}, got {}",
            field, min, max, value
        )));
    }
    Ok(())
}

/// `<config dir>/lockin`, created on demand.
pub fn app_data_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| LockInError::Config("Could not find config directory".to_string()))?
        .join(APP_DIR);
    std::fs::create_dir_all(&dir).map_err(|e| LockInError::Config(e.to_string()))?;
    Ok(dir)
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(app_data_dir()?.join(CONFIG_FILE))
}

pub fn default_database_path() -> Result<PathBuf> {
    Ok(app_data_dir()?.join(DATABASE_FILE))
}

/// Missing file means defaults.
pub fn load_config_from(path: &Path) -> Result<LockInConfig> {
    if !path.exists() {
        return Ok(LockInConfig::default());
    }

    let config_str = std::fs::read_to_string(path)
        .map_err(|e| LockInError::Config(format!("Failed to read config file: {}", e)))?;

    let config: LockInConfig = serde_json::from_str(&config_str)
        .map_err(|e| LockInError::Config(format!("Failed to parse config: {}", e)))?;

    config.validate()?;
    log::debug!(
        "Loaded config: endpoint={}, interval={}s",
        config.analysis_endpoint,
        config.capture_interval_secs
    );
    Ok(config)
}

pub fn save_config_to(config: &LockInConfig, path: &Path) -> Result<()> {
    config.validate()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| LockInError::Config(e.to_string()))?;
    }
    let config_str = serde_json::to_string_pretty(config)
        .map_err(|e| LockInError::Config(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(path, config_str)
        .map_err(|e| LockInError::Config(format!("Failed to write config file: {}", e)))?;
    Ok(())
}

/// Loads the user's config, falling back to defaults when it is unusable.
pub fn load_config_or_default() -> LockInConfig {
    match default_config_path().and_then(|path| load_config_from(&path)) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Using default config: {}", e);
            LockInConfig::default()
        }
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(feature = "desktop")]
pub use desktop::*;

#[cfg(feature = "desktop")]
mod desktop {
    use chrono::Local;
    use serde::{Deserialize, Serialize};
    use tauri::{AppHandle, Emitter};
    use tauri_plugin_notification::NotificationExt;

    #[derive(Serialize, Deserialize)]
    pub struct LogMessage {
        pub level: String,
        pub message: String,
        pub timestamp: String,
    }

    pub fn send_log(app: &AppHandle, level: &str, message: &str) {
        let log_message = LogMessage {
            level: level.to_string(),
            message: message.to_string(),
            timestamp: Local::now().format("%H:%M:%S").to_string(),
        };

        if let Err(e) = app.emit("log_message", &log_message) {
            log::warn!("Failed to emit log message: {}", e);
        }

        match level {
            "error" => log::error!("{}", message),
            "warn" => log::warn!("{}", message),
            "debug" => log::debug!("{}", message),
            _ => log::info!("{}", message),
        }
    }

    pub fn send_notification(app: &AppHandle, title: &str, body: &str) {
        if let Err(e) = app.notification().builder().title(title).body(body).show() {
            send_log(app, "warn", &format!("Failed to show notification: {}", e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: LockInConfig =
            serde_json::from_str(r#"{ "capture_interval_secs": 60 }"#).unwrap();
        assert_eq!(config.capture_interval_secs, 60);
        assert_eq!(config.recent_window_minutes, 15);
        assert_eq!(config.recent_window_limit, 5);
        assert!(config.notifications_enabled);
        assert_eq!(config.analysis_endpoint, default_analysis_endpoint());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = LockInConfig::default();
        assert!(config.validate().is_ok());

        config.capture_interval_secs = 0;
        assert!(matches!(config.validate(), Err(LockInError::Config(_))));

        config.capture_interval_secs = 10;
        config.analysis_endpoint = "not a url".to_string();
        assert!(config.validate().is_err());

        config.analysis_endpoint = "ftp://example.com/analyze".to_string();
        assert!(config.validate().is_err());

        let mut config = LockInConfig::default();
        config.recent_window_minutes = u64::MAX / 2;
        assert!(matches!(config.validate(), Err(LockInError::Config(_))));
        config.recent_window_minutes = 0;
        assert!(config.validate().is_ok());

        config.analysis_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(LockInError::Config(_))));
        config.analysis_timeout_secs = 30;

        config.capture_interval_secs = u64::MAX;
        assert!(matches!(config.validate(), Err(LockInError::Config(_))));
    }

    #[test]
    fn oversized_window_never_overflows_settings() {
        let config = LockInConfig {
            recent_window_minutes: u64::MAX / 2,
            ..LockInConfig::default()
        };
        let settings = crate::modules::session_controller::SessionSettings::from(&config);
        assert_eq!(settings.recent_max_age, Duration::from_secs(u64::MAX));
    }

    #[test]
    fn save_then_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        assert_eq!(load_config_from(&path).unwrap(), LockInConfig::default());

        let config = LockInConfig {
            capture_interval_secs: 90,
            notifications_enabled: false,
            ..LockInConfig::default()
        };
        save_config_to(&config, &path).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), config);
    }

    #[test]
    fn unparsable_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config_from(&path), Err(LockInError::Config(_))));
    }
}
