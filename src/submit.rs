use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::client::ApiClient;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

/// Which generation backend a job goes to. Chosen by configuration, never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    #[default]
    Video,
}

impl MediaKind {
    /// Path segment shared by the submit and status endpoints.
    pub fn endpoint(self) -> &'static str {
        match self {
            MediaKind::Image => "image-gen",
            MediaKind::Video => "video-gen",
        }
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            other => Err(format!("unknown media kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationOptions {
    pub remove_watermark: bool,
    pub is_private: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub source_media_url: String,
    pub effect_id: String,
    pub user_id: String,
    pub kind: MediaKind,
    pub model: String,
    pub options: GenerationOptions,
}

impl GenerationRequest {
    pub fn from_config(cfg: &PipelineConfig, source_media_url: &str) -> Self {
        Self {
            source_media_url: source_media_url.to_string(),
            effect_id: cfg.effect_id.clone(),
            user_id: cfg.user_id.clone(),
            kind: cfg.media_kind,
            model: cfg.model.clone(),
            options: GenerationOptions {
                remove_watermark: cfg.remove_watermark,
                is_private: cfg.is_private,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub job_id: String,
}

// ---------------------------------------------------------------------------
// Request body
// ---------------------------------------------------------------------------

/// The video endpoint takes `imageUrl` as a one-element array, the image endpoint as a string.
pub(crate) fn build_submit_body(req: &GenerationRequest) -> Value {
    match req.kind {
        MediaKind::Video => json!({
            "imageUrl": [req.source_media_url],
            "effectId": req.effect_id,
            "userId": req.user_id,
            "removeWatermark": req.options.remove_watermark,
            "model": req.model,
            "isPrivate": req.options.is_private,
        }),
        MediaKind::Image => json!({
            "model": req.model,
            "toolType": req.model,
            "effectId": req.effect_id,
            "imageUrl": req.source_media_url,
            "userId": req.user_id,
            "removeWatermark": req.options.remove_watermark,
            "isPrivate": req.options.is_private,
        }),
    }
}

fn parse_job_id(resp: &Value) -> Option<String> {
    match resp.get("jobId")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

pub async fn submit(client: &ApiClient, req: &GenerationRequest) -> Result<JobHandle> {
    let body = build_submit_body(req);

    let resp = client
        .post_json(req.kind.endpoint(), &body)
        .await
        .map_err(PipelineError::SubmissionError)?;

    let job_id = parse_job_id(&resp).ok_or_else(|| {
        PipelineError::SubmissionError(format!("response has no jobId: {}", resp))
    })?;

    log::info!(
        "Submitted {} job {} (effect={})",
        req.kind.endpoint(),
        job_id,
        req.effect_id
    );
    Ok(JobHandle { job_id })
}
