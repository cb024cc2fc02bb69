use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::client::ApiClient;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::observer::PipelineObserver;
use crate::resolve::ResultPayload;
use crate::submit::{JobHandle, MediaKind};

const GENERIC_FAILURE: &str = "Job processing failed";

// ---------------------------------------------------------------------------
// Status model
// ---------------------------------------------------------------------------

/// Wire shape of `GET /{kind}-gen/{user}/{job}/status`.
/// A body without `status` counts as still processing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl StatusResponse {
    pub fn into_status(self, attempt: u32) -> JobStatus {
        match self.status.as_deref() {
            Some("completed") => JobStatus::Completed(ResultPayload {
                result: self.result,
            }),
            Some("failed" | "error") => JobStatus::Failed {
                reason: failure_reason(self.error.as_ref()),
            },
            Some("queued") => JobStatus::Queued,
            _ => JobStatus::Processing { attempt },
        }
    }
}

/// `error` may be a string, an object with a `message`, or anything else.
fn failure_reason(error: Option<&Value>) -> String {
    match error {
        None | Some(Value::Null) => GENERIC_FAILURE.to_string(),
        Some(Value::String(s)) if s.is_empty() => GENERIC_FAILURE.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(map)) => match map.get("message") {
            Some(Value::String(m)) if !m.is_empty() => m.clone(),
            _ => Value::Object(map.clone()).to_string(),
        },
        Some(other) => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Queued,
    Processing { attempt: u32 },
    Completed(ResultPayload),
    Failed { reason: String },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed(_) | JobStatus::Failed { .. })
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Processing { .. } => 1,
            JobStatus::Completed(_) | JobStatus::Failed { .. } => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            max_attempts: 60,
        }
    }
}

impl From<&PipelineConfig> for PollSettings {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            interval: cfg.poll_interval(),
            max_attempts: cfg.max_poll_attempts,
        }
    }
}

// ---------------------------------------------------------------------------
// Status sources
// ---------------------------------------------------------------------------

#[async_trait]
pub trait JobStatusSource: Send + Sync {
    async fn fetch_status(&self, handle: &JobHandle) -> Result<StatusResponse>;
}

pub struct HttpStatusSource<'a> {
    client: &'a ApiClient,
    kind: MediaKind,
    user_id: &'a str,
}

impl<'a> HttpStatusSource<'a> {
    pub fn new(client: &'a ApiClient, kind: MediaKind, user_id: &'a str) -> Self {
        Self {
            client,
            kind,
            user_id,
        }
    }

    pub fn status_path(&self, handle: &JobHandle) -> String {
        format!("{}/{}/{}/status", self.kind.endpoint(), self.user_id, handle.job_id)
    }
}

#[async_trait]
impl JobStatusSource for HttpStatusSource<'_> {
    async fn fetch_status(&self, handle: &JobHandle) -> Result<StatusResponse> {
        let value = self
            .client
            .get_json(&self.status_path(handle))
            .await
            .map_err(PipelineError::StatusCheckFailure)?;
        serde_json::from_value(value)
            .map_err(|e| PipelineError::StatusCheckFailure(format!("unexpected status body: {}", e)))
    }
}

// ---------------------------------------------------------------------------
// Poll loop
// ---------------------------------------------------------------------------

/// Query `source` until the job completes, fails, the budget runs out or `cancel` fires.
/// Only the status check is repeated; a failed status request ends the loop.
pub async fn poll(
    source: &dyn JobStatusSource,
    handle: &JobHandle,
    settings: &PollSettings,
    observer: &dyn PipelineObserver,
    cancel: &CancellationToken,
) -> Result<ResultPayload> {
    let mut furthest = 0u8;

    for attempt in 1..=settings.max_attempts {
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            resp = source.fetch_status(handle) => resp?,
        };

        let status = resp.into_status(attempt);
        match status {
            JobStatus::Completed(payload) => {
                log::info!("Job {} completed after {} poll(s)", handle.job_id, attempt);
                return Ok(payload);
            }
            JobStatus::Failed { reason } => {
                log::warn!("Job {} failed: {}", handle.job_id, reason);
                return Err(PipelineError::JobFailed(reason));
            }
            pending => {
                let rank = pending.rank();
                if rank < furthest {
                    log::warn!(
                        "Job {} reported {:?} after a later state; treating as still processing",
                        handle.job_id,
                        pending
                    );
                } else {
                    furthest = rank;
                }
                log::debug!(
                    "Job {} not finished (attempt {}/{})",
                    handle.job_id,
                    attempt,
                    settings.max_attempts
                );
                observer.on_progress(attempt);

                if attempt < settings.max_attempts {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                        _ = tokio::time::sleep(settings.interval) => {}
                    }
                }
            }
        }
    }

    Err(PipelineError::PollTimeout {
        attempts: settings.max_attempts,
    })
}
