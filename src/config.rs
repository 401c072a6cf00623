//! Application configuration
//!
//! Loaded once at startup and passed by value to the services that need it.
//! Request-handling code never reads the environment.

use crate::paths::ensure_parent_dir;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_API_KEY: &str = "AIKADIN_API_KEY";
pub const ENV_BASE_URL: &str = "AIKADIN_BASE_URL";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub tryon: TryOnConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GatewayConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_light_model")]
    pub light_model: String,
    #[serde(default = "default_heavy_model")]
    pub heavy_model: String,
    #[serde(default = "default_chat_timeout_secs")]
    pub chat_timeout_secs: u64,
    #[serde(default = "default_image_timeout_secs")]
    pub image_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_penalty")]
    pub presence_penalty: f32,
    #[serde(default = "default_penalty")]
    pub frequency_penalty: f32,
    #[serde(default = "default_stop_sequences")]
    pub stop_sequences: Vec<String>,
    #[serde(default = "default_complexity_keywords")]
    pub complexity_keywords: Vec<String>,
    /// Delay before a simulated reply is returned when no key is configured
    #[serde(default = "default_simulated_delay_ms")]
    pub simulated_delay_ms: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TryOnConfig {
    #[serde(default = "default_remote_timeout_secs")]
    pub remote_timeout_secs: u64,
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    #[serde(default = "default_progress_step")]
    pub progress_step: u8,
    #[serde(default = "default_progress_cap")]
    pub progress_cap: u8,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_light_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_heavy_model() -> String {
    "gpt-4o".to_string()
}

fn default_chat_timeout_secs() -> u64 {
    30
}

fn default_image_timeout_secs() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_max_tokens() -> u32 {
    800
}

fn default_temperature() -> f32 {
    0.7
}

fn default_penalty() -> f32 {
    0.3
}

fn default_stop_sequences() -> Vec<String> {
    vec!["NOT FASHION ADVICE:".to_string(), "END OF ADVICE".to_string()]
}

fn default_complexity_keywords() -> Vec<String> {
    [
        "kombin önerisi",
        "stil analizi",
        "vücut tipime göre",
        "özel etkinlik",
        "düğün",
        "mezuniyet",
        "renk uyumu",
        "sezon trendi",
        "nasıl kombinlerim",
        "hangi renk yakışır",
        "gardırop düzenleme",
        "kapsül gardırop",
        "outfit suggestion",
        "style analysis",
        "body type",
        "special event",
        "wedding",
        "graduation",
        "color matching",
        "capsule wardrobe",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_simulated_delay_ms() -> u64 {
    1000
}

fn default_remote_timeout_secs() -> u64 {
    180
}

fn default_progress_interval_ms() -> u64 {
    2000
}

fn default_progress_step() -> u8 {
    12
}

fn default_progress_cap() -> u8 {
    90
}

fn default_batch_delay_ms() -> u64 {
    500
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            tryon: TryOnConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            light_model: default_light_model(),
            heavy_model: default_heavy_model(),
            chat_timeout_secs: default_chat_timeout_secs(),
            image_timeout_secs: default_image_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            presence_penalty: default_penalty(),
            frequency_penalty: default_penalty(),
            stop_sequences: default_stop_sequences(),
            complexity_keywords: default_complexity_keywords(),
            simulated_delay_ms: default_simulated_delay_ms(),
        }
    }
}

impl Default for TryOnConfig {
    fn default() -> Self {
        Self {
            remote_timeout_secs: default_remote_timeout_secs(),
            progress_interval_ms: default_progress_interval_ms(),
            progress_step: default_progress_step(),
            progress_cap: default_progress_cap(),
            batch_delay_ms: default_batch_delay_ms(),
        }
    }
}

impl GatewayConfig {
    pub fn chat_timeout(&self) -> Duration {
        Duration::from_secs(self.chat_timeout_secs)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// The key, treating an empty string as not configured
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}

impl TryOnConfig {
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

impl AppConfig {
    /// Applies the startup environment overrides on top of the file values
    pub fn with_env_overrides(
        mut self,
        api_key: Option<String>,
        base_url: Option<String>,
    ) -> Self {
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.gateway.api_key = Some(key);
        }
        if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
            self.gateway.base_url = url;
        }
        self
    }
}

/// Loads the config at `path`, falling back to defaults if the file is absent
pub fn load_config_from(path: &Path) -> Result<AppConfig, String> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config: {}", e))?;
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))
    } else {
        Ok(AppConfig::default())
    }
}

pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), String> {
    ensure_parent_dir(path)?;
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    std::fs::write(path, content).map_err(|e| format!("Failed to save config: {}", e))?;
    info!("[save_config] Config written to {:?}", path);
    Ok(())
}
