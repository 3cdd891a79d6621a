//! Error taxonomy for the automation engine.
//!
//! Everything the worker loop can die of is folded into [`RunFault`]; the
//! controller surfaces it once and tears the run down.

use std::path::PathBuf;
use thiserror::Error;

use crate::vision::capture::CaptureStrategy;

/// Malformed or missing configuration. A run never starts with one of these.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no config for process '{0}'")]
    ProcessNotFound(String),

    #[error("process '{process}': {reason}")]
    Invalid { process: String, reason: String },
}

/// An icon file could not be loaded or decoded.
#[derive(Debug, Error)]
#[error("failed to load template {path}: {reason}")]
pub struct TemplateLoadError {
    pub path: PathBuf,
    pub reason: String,
}

/// The template cannot be compared against the frame at all.
#[derive(Debug, Error)]
pub enum InvalidTemplate {
    #[error("template {0} is empty")]
    Empty(PathBuf),

    #[error("template {0} belongs to a different run")]
    ForeignRun(PathBuf),
}

/// A single capture strategy failed.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("window {0} not found")]
    WindowNotFound(u32),

    #[error("window is minimized")]
    Minimized,

    #[error("window is off-screen")]
    OffScreen,

    #[error("not supported by this backend")]
    Unsupported,

    #[error("interrupted")]
    Interrupted,

    #[error("{0}")]
    Backend(String),
}

/// Every capture strategy failed for one call.
#[derive(Debug, Error)]
#[error("capture unavailable for window {handle}: {}", describe_attempts(.attempts))]
pub struct CaptureUnavailable {
    pub handle: u32,
    pub attempts: Vec<(CaptureStrategy, CaptureError)>,
}

fn describe_attempts(attempts: &[(CaptureStrategy, CaptureError)]) -> String {
    attempts
        .iter()
        .map(|(strategy, err)| format!("{strategy}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// The input provider failed while executing an action.
#[derive(Debug, Error)]
#[error("input provider failed during {action}: {reason}")]
pub struct InputProviderError {
    pub action: &'static str,
    pub reason: String,
}

/// A condition that ends the current run.
#[derive(Debug, Error)]
pub enum RunFault {
    #[error(transparent)]
    TemplateLoad(#[from] TemplateLoadError),

    #[error(transparent)]
    Capture(#[from] CaptureUnavailable),

    #[error(transparent)]
    InvalidTemplate(#[from] InvalidTemplate),

    #[error(transparent)]
    Input(#[from] InputProviderError),
}

/// Reasons [`crate::executor::RunController::start`] refuses to start.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("automation is already running")]
    AlreadyRunning,

    #[error("previous run is still stopping")]
    Stopping,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}
