use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{PipelineError, Result};
use crate::ids::{DOWNLOAD_ID_LENGTH, UPLOAD_ID_LENGTH};
use crate::submit::MediaKind;

pub const DEFAULT_API_BASE_URL: &str = "https://api.chromastudio.ai";
pub const DEFAULT_CONTENT_BASE_URL: &str = "https://contents.maxstudio.ai";
pub const DEFAULT_USER_ID: &str = "DObRu1vyStbUynoQmTcHBlhs55z2";

/// Pass-through settings for one pipeline controller. Nothing here is computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    pub api_base_url: String,
    pub content_base_url: String,
    pub user_id: String,
    pub effect_id: String,
    pub model: String,
    pub media_kind: MediaKind,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    pub remove_watermark: bool,
    pub is_private: bool,
    pub request_timeout_ms: u64,
    pub upload_id_length: usize,
    pub download_id_length: usize,
    pub download_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            content_base_url: DEFAULT_CONTENT_BASE_URL.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            effect_id: "halloween".to_string(),
            model: "video-effects".to_string(),
            media_kind: MediaKind::Video,
            poll_interval_ms: 2000,
            max_poll_attempts: 60,
            remove_watermark: true,
            is_private: true,
            request_timeout_ms: 30_000,
            upload_id_length: UPLOAD_ID_LENGTH,
            download_id_length: DOWNLOAD_ID_LENGTH,
            download_prefix: "halloween_effect".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("apiBaseUrl", &self.api_base_url),
            ("contentBaseUrl", &self.content_base_url),
            ("userId", &self.user_id),
            ("effectId", &self.effect_id),
            ("model", &self.model),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(PipelineError::Config(format!("{} must not be empty", key)));
            }
        }
        if self.max_poll_attempts == 0 {
            return Err(PipelineError::Config("maxPollAttempts must be at least 1".into()));
        }
        if self.upload_id_length == 0 || self.download_id_length == 0 {
            return Err(PipelineError::Config("id lengths must be at least 1".into()));
        }
        Ok(())
    }
}

/// Missing file means defaults; a present but malformed file is an error.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        return Ok(PipelineConfig::default());
    }
    let data = std::fs::read_to_string(path)?;
    let cfg: PipelineConfig = serde_json::from_str(&data)
        .map_err(|e| PipelineError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn save_config_atomic(path: &Path, cfg: &PipelineConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(cfg)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
