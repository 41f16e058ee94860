//! Unified Error Model
//!
//! Two layers: [`StageError`] is what a single stage invocation reports,
//! [`PipelineError`] is what a request reports. The API crate is the only
//! place these get turned into status codes and client-facing text.
use crate::stage::StageKind;
use std::time::Duration;
use thiserror::Error;

/// Failure of one stage invocation.
#[derive(Error, Debug)]
pub enum StageError {
    /// Executable missing, not runnable, or the working directory is bad.
    #[error("SPAWN/{program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// stdin closed or broke before the whole payload was written.
    #[error("WRITE/stdin: {source}")]
    WriteFailed {
        #[source]
        source: std::io::Error,
    },

    #[error("READ/stdout: {source}")]
    ReadFailed {
        #[source]
        source: std::io::Error,
    },

    /// `code` is `None` when the process was terminated by a signal.
    #[error("EXIT/{}", .code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("TIMEOUT/{}ms", .after.as_millis())]
    Timeout { after: Duration },

    #[error("OUTPUT/exceeded {limit} bytes")]
    OutputTooLarge { limit: usize },
}

/// Failure of a whole request pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("INPUT/{0}")]
    ClientInputInvalid(String),

    #[error("STAGE/{stage}: {source}")]
    Stage {
        stage: StageKind,
        #[source]
        source: StageError,
    },

    /// The stage exited cleanly but wrote nothing usable.
    #[error("EMPTY/{stage}")]
    EmptyStageOutput { stage: StageKind },

    /// No stage process slot became free within the admission window.
    #[error("RATE/admission wait exceeded {}ms", .waited.as_millis())]
    Overloaded { waited: Duration },

    #[error("ENCODING/{0}")]
    Encoding(String),
}

/// Flat error taxonomy, used for status mapping and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ClientInputInvalid,
    SpawnFailed,
    WriteFailed,
    ReadFailed,
    NonZeroExit,
    Timeout,
    OutputTooLarge,
    EmptyStageOutput,
    Overloaded,
    Encoding,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientInputInvalid => "client_input_invalid",
            Self::SpawnFailed => "spawn_failed",
            Self::WriteFailed => "write_failed",
            Self::ReadFailed => "read_failed",
            Self::NonZeroExit => "non_zero_exit",
            Self::Timeout => "timeout",
            Self::OutputTooLarge => "output_too_large",
            Self::EmptyStageOutput => "empty_stage_output",
            Self::Overloaded => "overloaded",
            Self::Encoding => "encoding",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SpawnFailed { .. } => ErrorKind::SpawnFailed,
            Self::WriteFailed { .. } => ErrorKind::WriteFailed,
            Self::ReadFailed { .. } => ErrorKind::ReadFailed,
            Self::NonZeroExit { .. } => ErrorKind::NonZeroExit,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::OutputTooLarge { .. } => ErrorKind::OutputTooLarge,
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ClientInputInvalid(_) => ErrorKind::ClientInputInvalid,
            Self::Stage { source, .. } => source.kind(),
            Self::EmptyStageOutput { .. } => ErrorKind::EmptyStageOutput,
            Self::Overloaded { .. } => ErrorKind::Overloaded,
            Self::Encoding(_) => ErrorKind::Encoding,
        }
    }

    /// Stage the failure is attributed to, if any.
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            Self::Stage { stage, .. } | Self::EmptyStageOutput { stage } => Some(*stage),
            _ => None,
        }
    }

    pub fn stage_failed(stage: StageKind, source: StageError) -> Self {
        Self::Stage { stage, source }
    }
}
