//! Session error taxonomy and status severities.
//!
//! Internal plumbing propagates `anyhow::Error`. At the worker and presenter
//! boundary every failure is folded into a `SessionError`, which always renders
//! as a short status line with a severity color. None of these errors crash
//! the presentation thread.

use thiserror::Error;

/// Errors surfaced to the user during a detection session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Camera or file could not be opened. The session aborts before the worker runs.
    #[error("cannot open source {descriptor}: {reason}")]
    SourceUnavailable { descriptor: String, reason: String },

    /// The configured model identifier does not resolve to an artifact.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The artifact exists but the engine refused to load it.
    #[error("failed to load model {model}: {reason}")]
    ModelLoad { model: String, reason: String },

    /// Mid-session frame read error.
    #[error("frame read failed: {0}")]
    ReadFailure(String),

    /// Inference failed for the current frame. Terminates the loop.
    #[error("inference failed: {0}")]
    InferenceError(String),

    /// Saving an annotated frame failed. Logged, the frame is skipped.
    #[error("failed to save detection result: {0}")]
    PersistError(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The worker thread could not be started or crashed.
    #[error("detection worker failed: {0}")]
    Worker(String),
}

impl SessionError {
    pub fn source_unavailable(descriptor: impl ToString, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            descriptor: descriptor.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn model_load(model: impl ToString, reason: impl ToString) -> Self {
        Self::ModelLoad {
            model: model.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Severity used when this error is shown in the status bar.
    pub fn severity(&self) -> Severity {
        match self {
            SessionError::PersistError(_) => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Short machine-friendly name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::SourceUnavailable { .. } => "source_unavailable",
            SessionError::ModelNotFound(_) => "model_not_found",
            SessionError::ModelLoad { .. } => "model_load",
            SessionError::ReadFailure(_) => "read_failure",
            SessionError::InferenceError(_) => "inference_error",
            SessionError::PersistError(_) => "persist_error",
            SessionError::Config(_) => "config",
            SessionError::Worker(_) => "worker",
        }
    }
}

/// Severity of a status line. Each severity carries a color hint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    Idle,
    Info,
    Warning,
    Ok,
    Error,
}

impl Severity {
    /// Hex color hint for status bar rendering.
    pub fn color(self) -> &'static str {
        match self {
            Severity::Idle => "#CCCCCC",
            Severity::Info => "#4285F4",
            Severity::Warning => "#FFA500",
            Severity::Ok => "#4CAF50",
            Severity::Error => "#EA4335",
        }
    }
}
