use serde::Serialize;
use tokio::sync::mpsc;

use crate::state::Phase;

/// Outward surface to whatever renders the pipeline. All methods default to no-ops.
pub trait PipelineObserver: Send + Sync {
    fn on_phase_change(&self, _phase: Phase, _detail: Option<&str>) {}

    /// Called once per non-terminal poll, with the 1-based attempt number.
    fn on_progress(&self, _attempt: u32) {}

    fn on_error(&self, _message: &str) {}

    fn on_result(&self, _url: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Writes every notification through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl PipelineObserver for LogObserver {
    fn on_phase_change(&self, phase: Phase, detail: Option<&str>) {
        match detail {
            Some(d) => log::info!("[{}] {}", phase, d),
            None => log::info!("[{}]", phase),
        }
    }

    fn on_progress(&self, attempt: u32) {
        log::info!("PROCESSING... ({})", attempt);
    }

    fn on_error(&self, message: &str) {
        log::error!("Error: {}", message);
    }

    fn on_result(&self, url: &str) {
        log::info!("Result ready: {}", url);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum PipelineEvent {
    PhaseChanged { phase: Phase, detail: Option<String> },
    Progress { attempt: u32 },
    Error { message: String },
    Result { url: String },
}

/// Forwards notifications as `PipelineEvent`s over a tokio channel.
/// Send failures mean the receiver is gone and are ignored.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PipelineObserver for ChannelObserver {
    fn on_phase_change(&self, phase: Phase, detail: Option<&str>) {
        let _ = self.tx.send(PipelineEvent::PhaseChanged {
            phase,
            detail: detail.map(str::to_string),
        });
    }

    fn on_progress(&self, attempt: u32) {
        let _ = self.tx.send(PipelineEvent::Progress { attempt });
    }

    fn on_error(&self, message: &str) {
        let _ = self.tx.send(PipelineEvent::Error {
            message: message.to_string(),
        });
    }

    fn on_result(&self, url: &str) {
        let _ = self.tx.send(PipelineEvent::Result {
            url: url.to_string(),
        });
    }
}
