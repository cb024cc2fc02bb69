//! Upload a media file, run a generation effect on it, poll the job and fetch the result.

pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod fingerprint;
pub mod ids;
pub mod observer;
pub mod pipeline;
pub mod poll;
pub mod redact;
pub mod resolve;
pub mod state;
pub mod submit;
pub mod upload;

pub use config::{load_config, save_config_atomic, PipelineConfig};
pub use download::{DownloadFetcher, DownloadReport, StrategyAttempt};
pub use error::{PipelineError, Result};
pub use observer::{ChannelObserver, LogObserver, NoopObserver, PipelineEvent, PipelineObserver};
pub use pipeline::Pipeline;
pub use state::{Phase, PipelineState};
pub use submit::MediaKind;
pub use upload::MediaFile;
