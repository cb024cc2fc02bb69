use serde::{Deserialize, Serialize};

/// Oldest entries are dropped past this many.
pub const EVENT_LOG_LIMIT: usize = 256;

/// Where the controller is in the upload → generate sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Uploading,
    Ready,
    Submitting,
    Polling,
    Complete,
    Error,
}

impl Phase {
    /// Status line shown for each phase.
    pub fn status_text(self) -> &'static str {
        match self {
            Phase::Idle => "IDLE",
            Phase::Uploading => "UPLOADING...",
            Phase::Ready => "READY",
            Phase::Submitting => "SUBMITTING JOB...",
            Phase::Polling => "JOB QUEUED...",
            Phase::Complete => "COMPLETE",
            Phase::Error => "ERROR",
        }
    }

    /// True while a stage is suspended on network I/O.
    pub fn is_busy(self) -> bool {
        matches!(self, Phase::Uploading | Phase::Submitting | Phase::Polling)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.status_text())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub t: String,
    pub level: String,
    pub msg: String,
}

/// Single pipeline state, owned by the controller and written only on stage completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    pub run_id: String,
    pub phase: Phase,
    pub uploaded_url: Option<String>,
    pub result_url: Option<String>,
    pub job_id: Option<String>,
    pub updated_at: String,
    pub events: Vec<RunEvent>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            run_id: new_run_id(),
            phase: Phase::Idle,
            uploaded_url: None,
            result_url: None,
            job_id: None,
            updated_at: chrono::Utc::now().to_rfc3339(),
            events: Vec::new(),
        }
    }

    pub fn append_event(&mut self, level: &str, msg: &str) {
        let now = chrono::Utc::now().to_rfc3339();
        self.events.push(RunEvent {
            t: now.clone(),
            level: level.to_string(),
            msg: msg.to_string(),
        });
        if self.events.len() > EVENT_LOG_LIMIT {
            let excess = self.events.len() - EVENT_LOG_LIMIT;
            self.events.drain(..excess);
        }
        self.updated_at = now;
    }

    pub fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            self.append_event("info", &format!("{} -> {}", self.phase, phase));
        }
        self.phase = phase;
    }

    /// A new upload supersedes everything the previous one produced, including its log.
    pub fn begin_upload(&mut self) {
        self.run_id = new_run_id();
        self.events.clear();
        self.uploaded_url = None;
        self.result_url = None;
        self.job_id = None;
        self.set_phase(Phase::Uploading);
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

fn new_run_id() -> String {
    format!("run_{}", &uuid::Uuid::new_v4().to_string().replace('-', "")[..8])
}
