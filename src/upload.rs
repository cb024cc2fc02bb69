use std::path::Path;

use reqwest::header::CONTENT_TYPE;

use crate::client::{read_success_text, ApiClient};
use crate::error::{PipelineError, Result};
use crate::ids;
use crate::redact::redact;

const UPLOAD_URL_PATH: &str = "/get-emd-upload-url";
const DEFAULT_EXTENSION: &str = "jpg";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// A user-selected file held in memory.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl MediaFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| PipelineError::NotReady(format!("{} has no file name", path.display())))?;
        let content_type = guess_content_type(&name).to_string();
        Ok(Self {
            name,
            content_type,
            bytes,
        })
    }
}

/// Signed, write-once destination for a single upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub file_name: String,
    pub write_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    pub retrieval_url: String,
}

/// Suffix after the last dot, or `jpg` when there is none.
pub fn file_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext,
        _ => DEFAULT_EXTENSION,
    }
}

pub fn derive_file_name(name: &str, id_length: usize) -> String {
    format!("{}.{}", ids::generate(id_length), file_extension(name))
}

pub fn guess_content_type(name: &str) -> &'static str {
    match file_extension(name).to_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        _ => FALLBACK_CONTENT_TYPE,
    }
}

pub fn retrieval_url(content_base_url: &str, file_name: &str) -> String {
    format!("{}/{}", content_base_url.trim_end_matches('/'), file_name)
}

pub struct MediaUploader<'a> {
    client: &'a ApiClient,
    content_base_url: &'a str,
    id_length: usize,
}

impl<'a> MediaUploader<'a> {
    pub fn new(client: &'a ApiClient, content_base_url: &'a str, id_length: usize) -> Self {
        Self {
            client,
            content_base_url,
            id_length,
        }
    }

    pub async fn upload(&self, file: &MediaFile) -> Result<UploadedMedia> {
        let file_name = derive_file_name(&file.name, self.id_length);

        let target = self.request_target(&file_name).await?;
        log::debug!("Obtained write target for {}", target.file_name);

        self.transfer(&target, file).await?;

        let retrieval_url = retrieval_url(self.content_base_url, &target.file_name);
        log::info!(
            "Uploaded {} ({} bytes) as {}",
            file.name,
            file.bytes.len(),
            retrieval_url
        );
        Ok(UploadedMedia { retrieval_url })
    }

    pub async fn request_target(&self, file_name: &str) -> Result<UploadTarget> {
        let text = self
            .client
            .get_text(UPLOAD_URL_PATH, &[("fileName", file_name)])
            .await
            .map_err(PipelineError::SignedUrlFailure)?;

        let write_url = text.trim().to_string();
        if write_url.is_empty() {
            return Err(PipelineError::SignedUrlFailure(
                "upload endpoint returned an empty URL".into(),
            ));
        }

        Ok(UploadTarget {
            file_name: file_name.to_string(),
            write_url,
        })
    }

    pub async fn transfer(&self, target: &UploadTarget, file: &MediaFile) -> Result<()> {
        let content_type = if file.content_type.is_empty() {
            FALLBACK_CONTENT_TYPE
        } else {
            file.content_type.as_str()
        };

        let resp = self
            .client
            .http()
            .put(&target.write_url)
            .header(CONTENT_TYPE, content_type)
            .body(file.bytes.clone())
            .send()
            .await
            .map_err(|e| PipelineError::TransferFailure(redact(&e.to_string())))?;

        read_success_text(resp)
            .await
            .map(|_| ())
            .map_err(PipelineError::TransferFailure)
    }
}
