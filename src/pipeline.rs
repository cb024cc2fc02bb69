use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::client::ApiClient;
use crate::config::PipelineConfig;
use crate::download::{DownloadFetcher, DownloadReport};
use crate::error::{PipelineError, Result};
use crate::observer::PipelineObserver;
use crate::poll::{poll, HttpStatusSource, PollSettings};
use crate::redact::redact;
use crate::resolve::resolve;
use crate::state::{Phase, PipelineState};
use crate::submit::{submit, GenerationRequest};
use crate::upload::{MediaFile, MediaUploader};

/// Drives upload → submit → poll → resolve for one controller.
///
/// Every stage-driving method takes `&mut self`, so a controller can only have
/// one run in flight. Use [`Pipeline::cancel_handle`] to abandon a run from
/// another task.
pub struct Pipeline {
    config: PipelineConfig,
    client: ApiClient,
    observer: Arc<dyn PipelineObserver>,
    fetcher: DownloadFetcher,
    state: PipelineState,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, observer: Arc<dyn PipelineObserver>) -> Result<Self> {
        config.validate()?;
        let client = ApiClient::new(&config.api_base_url, config.request_timeout())?;
        let fetcher = DownloadFetcher::new(&config.download_prefix, config.download_id_length);

        Ok(Self {
            config,
            client,
            observer,
            fetcher,
            state: PipelineState::new(),
            cancel: CancellationToken::new(),
        })
    }

    /// Swap the download chain, e.g. to drop the proxy hop.
    pub fn with_fetcher(mut self, fetcher: DownloadFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Token for the current or next run. Cancelling it stops the in-flight stage at its next
    /// suspension point. After `reset`, `clear` or a cancelled run a new handle is needed.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    /// Upload `file` and remember its retrieval URL. Any earlier upload and result are discarded.
    pub async fn upload(&mut self, file: &MediaFile) -> Result<String> {
        let cancel = self.run_token();
        self.state.begin_upload();
        self.notify_phase(Phase::Uploading);

        let uploader = MediaUploader::new(
            &self.client,
            &self.config.content_base_url,
            self.config.upload_id_length,
        );
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            res = uploader.upload(file) => res,
        };

        match outcome {
            Ok(media) => {
                self.state.uploaded_url = Some(media.retrieval_url.clone());
                self.enter(Phase::Ready);
                Ok(media.retrieval_url)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Submit a job for the uploaded media and poll it to a resolved result URL.
    pub async fn generate(&mut self) -> Result<String> {
        let Some(source_url) = self.state.uploaded_url.clone() else {
            let err = PipelineError::NotReady("upload a file before generating".into());
            self.observer.on_error(&err.to_string());
            return Err(err);
        };

        let cancel = self.run_token();
        self.state.result_url = None;
        self.state.job_id = None;
        self.enter(Phase::Submitting);

        let request = GenerationRequest::from_config(&self.config, &source_url);
        let submitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            res = submit(&self.client, &request) => res,
        };
        let handle = match submitted {
            Ok(h) => h,
            Err(e) => return Err(self.fail(e)),
        };

        self.state.job_id = Some(handle.job_id.clone());
        self.state
            .append_event("info", &format!("Job {} queued", handle.job_id));
        self.enter(Phase::Polling);

        let source = HttpStatusSource::new(&self.client, self.config.media_kind, &self.config.user_id);
        let settings = PollSettings::from(&self.config);
        let outcome = poll(&source, &handle, &settings, self.observer.as_ref(), &cancel)
            .await
            .and_then(|payload| resolve(&payload));

        match outcome {
            Ok(url) => {
                self.state.result_url = Some(url.clone());
                self.enter(Phase::Complete);
                self.observer.on_result(&url);
                Ok(url)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Upload then generate.
    pub async fn run(&mut self, file: &MediaFile) -> Result<String> {
        self.upload(file).await?;
        self.generate().await
    }

    /// Download the last resolved result into `dir`.
    pub async fn download(&mut self, dir: &Path) -> Result<DownloadReport> {
        let Some(url) = self.state.result_url.clone() else {
            let err = PipelineError::NotReady("no result to download yet".into());
            self.observer.on_error(&err.to_string());
            return Err(err);
        };
        self.download_url(&url, dir).await
    }

    /// Run the fetch chain for `url`. A failed download is reported but leaves the phase alone.
    pub async fn download_url(&mut self, url: &str, dir: &Path) -> Result<DownloadReport> {
        match self.fetcher.download(&self.client, url, dir).await {
            Ok(report) => {
                self.state.append_event(
                    "info",
                    &format!("Downloaded {} via {}", report.file_name, report.strategy),
                );
                Ok(report)
            }
            Err(e) => {
                let msg = e.to_string();
                self.state.append_event("error", &msg);
                self.observer.on_error(&msg);
                Err(e)
            }
        }
    }

    /// Abandon the current run and start over with a fresh state.
    pub fn reset(&mut self) {
        self.rearm();
        self.state.reset();
        self.notify_phase(Phase::Idle);
    }

    /// Drop the uploaded media and any result, keeping the event log.
    pub fn clear(&mut self) {
        self.rearm();
        self.state.uploaded_url = None;
        self.state.result_url = None;
        self.state.job_id = None;
        self.state.set_phase(Phase::Idle);
        self.notify_phase(Phase::Idle);
    }

    // -----------------------------------------------------------------------
    // State helpers
    // -----------------------------------------------------------------------

    fn run_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel whatever is in flight and arm a new token for the next stage.
    fn rearm(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
    }

    fn notify_phase(&self, phase: Phase) {
        self.observer.on_phase_change(phase, Some(phase.status_text()));
    }

    fn enter(&mut self, phase: Phase) {
        self.state.set_phase(phase);
        self.notify_phase(phase);
    }

    fn fail(&mut self, err: PipelineError) -> PipelineError {
        let msg = redact(&err.to_string());
        log::error!("Pipeline run {} failed [{}]: {}", self.state.run_id, err.code(), msg);
        if err.is_upload_error() {
            self.state.uploaded_url = None;
        }
        if matches!(err, PipelineError::Cancelled) {
            self.rearm();
        }
        self.state.set_phase(Phase::Error);
        self.state.append_event("error", &msg);
        self.observer.on_phase_change(Phase::Error, Some(&msg));
        self.observer.on_error(&msg);
        err
    }
}
