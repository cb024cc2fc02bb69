use thiserror::Error;

use crate::download::StrategyAttempt;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Every failure a pipeline run can end with. All variants are terminal for the current run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The upload-coordination endpoint did not hand out a signed destination.
    #[error("Failed to get signed URL: {0}")]
    SignedUrlFailure(String),

    /// The bytes could not be written to the signed destination.
    #[error("Failed to upload file: {0}")]
    TransferFailure(String),

    #[error("Failed to submit job: {0}")]
    SubmissionError(String),

    /// The status endpoint itself failed; the job state is unknown.
    #[error("Failed to check status: {0}")]
    StatusCheckFailure(String),

    #[error("Job timed out after {attempts} polls")]
    PollTimeout { attempts: u32 },

    #[error("{0}")]
    JobFailed(String),

    #[error("No media URL in response")]
    MissingMediaUrl,

    #[error("Download failed. Please right-click the video/image and select \"Save As\".")]
    DownloadFailure { attempts: Vec<StrategyAttempt> },

    #[error("Pipeline run was cancelled")]
    Cancelled,

    /// A stage was requested before the stage it depends on produced its output.
    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Stable machine-readable code, suitable for UI branching and event payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SignedUrlFailure(_) => "signed_url_failure",
            Self::TransferFailure(_) => "transfer_failure",
            Self::SubmissionError(_) => "submission_error",
            Self::StatusCheckFailure(_) => "status_check_failure",
            Self::PollTimeout { .. } => "poll_timeout",
            Self::JobFailed(_) => "job_failed",
            Self::MissingMediaUrl => "missing_media_url",
            Self::DownloadFailure { .. } => "download_failure",
            Self::Cancelled => "cancelled",
            Self::NotReady(_) => "not_ready",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Http(_) => "http_error",
            Self::Serialization(_) => "serialization_error",
        }
    }

    pub fn is_upload_error(&self) -> bool {
        matches!(self, Self::SignedUrlFailure(_) | Self::TransferFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_timeout_message_names_attempts() {
        let err = PipelineError::PollTimeout { attempts: 60 };
        assert_eq!(err.to_string(), "Job timed out after 60 polls");
        assert_eq!(err.code(), "poll_timeout");
    }

    #[test]
    fn job_failed_surfaces_reason_verbatim() {
        let err = PipelineError::JobFailed("face not detected".into());
        assert_eq!(err.to_string(), "face not detected");
    }

    #[test]
    fn download_failure_tells_user_to_save_manually() {
        let err = PipelineError::DownloadFailure { attempts: vec![] };
        assert!(err.to_string().contains("Save As"));
    }

    #[test]
    fn upload_errors_are_grouped() {
        assert!(PipelineError::SignedUrlFailure("x".into()).is_upload_error());
        assert!(PipelineError::TransferFailure("x".into()).is_upload_error());
        assert!(!PipelineError::MissingMediaUrl.is_upload_error());
    }
}
