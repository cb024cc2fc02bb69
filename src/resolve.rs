use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

use crate::error::{PipelineError, Result};

static RE_VIDEO_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(mp4|webm)(\?.*)?$").unwrap());

/// Completed-job payload as returned by the status endpoint.
///
/// `result` is kept raw: only the item the resolver picks is decoded, so junk
/// after the first list element cannot hide a usable URL.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultPayload {
    #[serde(default)]
    pub result: Option<Value>,
}

/// Raw result item. Which field is set depends on the kind of job.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultItem {
    #[serde(rename = "mediaUrl", default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A normalised result reference, tagged by the field it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaRef {
    Generic(String),
    Video(String),
    Image(String),
}

impl MediaRef {
    pub fn url(&self) -> &str {
        match self {
            MediaRef::Generic(u) | MediaRef::Video(u) | MediaRef::Image(u) => u,
        }
    }

    pub fn into_url(self) -> String {
        match self {
            MediaRef::Generic(u) | MediaRef::Video(u) | MediaRef::Image(u) => u,
        }
    }
}

fn present(field: &Option<String>) -> Option<String> {
    field.as_deref().filter(|s| !s.is_empty()).map(str::to_string)
}

impl ResultItem {
    /// First non-empty field in preference order `mediaUrl`, `video`, `image`.
    pub fn normalize(&self) -> Option<MediaRef> {
        present(&self.media_url)
            .map(MediaRef::Generic)
            .or_else(|| present(&self.video).map(MediaRef::Video))
            .or_else(|| present(&self.image).map(MediaRef::Image))
    }
}

impl ResultPayload {
    /// The item the resolver looks at: the first of a list, or the single object.
    /// Anything that is not a JSON object there yields `None`.
    pub fn primary_item(&self) -> Option<ResultItem> {
        let raw = match self.result.as_ref()? {
            Value::Array(items) => items.first()?,
            other => other,
        };
        if !raw.is_object() {
            return None;
        }
        serde_json::from_value(raw.clone()).ok()
    }

    pub fn media_ref(&self) -> Option<MediaRef> {
        self.primary_item()?.normalize()
    }
}

pub fn resolve(payload: &ResultPayload) -> Result<String> {
    payload
        .media_ref()
        .map(MediaRef::into_url)
        .ok_or(PipelineError::MissingMediaUrl)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayKind {
    Image,
    Video,
}

/// Resolved URL together with how a viewer should present it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub url: String,
    pub kind: DisplayKind,
}

impl ResolvedMedia {
    pub fn classify(url: &str) -> Self {
        let kind = if RE_VIDEO_URL.is_match(url) {
            DisplayKind::Video
        } else {
            DisplayKind::Image
        };
        Self {
            url: url.to_string(),
            kind,
        }
    }
}
