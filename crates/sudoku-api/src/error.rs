//! Translation of pipeline failures into client-facing responses.
//!
//! Nothing from stage stderr, process paths or the upload itself reaches the
//! body; those stay in the server log.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sudoku_core::{ErrorKind, PipelineError, StageKind};

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: &'static str,
    pub trace_id: Option<String>,
}

impl ApiError {
    pub fn bad_request(message: &'static str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: ErrorKind::ClientInputInvalid.as_str(),
            message,
            trace_id: None,
        }
    }

    pub fn payload_too_large() -> Self {
        Self {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            code: ErrorKind::ClientInputInvalid.as_str(),
            message: "uploaded file is too large",
            trace_id: None,
        }
    }

    pub fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: "internal error",
            trace_id: None,
        }
    }

    pub fn from_pipeline(err: &PipelineError) -> Self {
        let kind = err.kind();
        let stage = err.stage();
        Self {
            status: status_for(kind),
            code: kind.as_str(),
            message: message_for(kind, stage),
            trace_id: None,
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

/// Status code for each error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ClientInputInvalid => StatusCode::BAD_REQUEST,
        ErrorKind::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::SpawnFailed | ErrorKind::Encoding => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::WriteFailed | ErrorKind::ReadFailed | ErrorKind::OutputTooLarge => StatusCode::BAD_GATEWAY,
        ErrorKind::NonZeroExit | ErrorKind::EmptyStageOutput => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn message_for(kind: ErrorKind, stage: Option<StageKind>) -> &'static str {
    match (kind, stage) {
        (ErrorKind::ClientInputInvalid, _) => "a non-empty image file is required in field 'file'",
        (ErrorKind::Overloaded, _) => "server is busy, try again shortly",
        (ErrorKind::Timeout, _) => "solving took too long",
        (ErrorKind::NonZeroExit | ErrorKind::EmptyStageOutput, Some(StageKind::Extractor)) => {
            "could not read a sudoku grid from the image"
        }
        (ErrorKind::NonZeroExit | ErrorKind::EmptyStageOutput, _) => "the puzzle could not be solved",
        (ErrorKind::SpawnFailed, _) => "solver service is unavailable",
        _ => "solver service failed",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.code,
            "message": self.message,
            "trace_id": self.trace_id,
        });
        (self.status, Json(body)).into_response()
    }
}
