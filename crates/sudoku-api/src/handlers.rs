//! API Handlers
use crate::error::ApiError;
use crate::AppState;
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use sudoku_core::{ExecutionContext, PipelineError, StageError, UploadPayload, SUDOKU_VERSION};
use tracing::{error, info, warn};

/// Form field carrying the image.
pub const FILE_FIELD: &str = "file";

/// Response header echoing the request trace id.
pub const TRACE_HEADER: &str = "x-trace-id";

/// `POST /upload`: multipart image in, solved grid text out.
pub async fn upload(State(state): State<AppState>, multipart: Result<Multipart, MultipartRejection>) -> Response {
    let payload = match multipart {
        Ok(multipart) => read_file_field(multipart, state.max_upload_bytes).await,
        Err(rejection) => {
            warn!(error = %rejection, "upload rejected before reading");
            Err(ApiError::bad_request("expected a multipart/form-data body"))
        }
    };
    let payload = match payload {
        Ok(payload) => payload,
        Err(err) => {
            state.metrics.record_request(err.code);
            return err.into_response();
        }
    };

    let ctx = ExecutionContext::new().with_filename(payload.filename.clone());
    let trace_id = ctx.trace_id.clone();
    info!(
        trace_id = %trace_id,
        bytes = payload.len(),
        filename = payload.filename.as_deref().unwrap_or("-"),
        content_type = payload.content_type.as_deref().unwrap_or("-"),
        "upload received"
    );

    // The pipeline runs on its own task so a stuck stage only holds this
    // request; the stage timeout bounds how long that can be.
    let runner = state.runner.clone();
    let task_ctx = ctx.clone();
    let joined = tokio::spawn(async move { runner.execute(&payload, &task_ctx).await }).await;

    let response = match joined {
        Ok(Ok(output)) => {
            state.metrics.record_stages(&output.stages);
            state.metrics.record_request("ok");
            info!(trace_id = %trace_id, elapsed_ms = ctx.elapsed_ms(), "solved");
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                output.solved.into_bytes(),
            )
                .into_response()
        }
        Ok(Err(err)) => {
            warn!(trace_id = %trace_id, error = %err, stage = ?err.stage(), "pipeline failed");
            if let PipelineError::Stage {
                source: StageError::NonZeroExit { stderr, .. },
                ..
            } = &err
            {
                warn!(trace_id = %trace_id, stderr = %stderr.trim_end(), "stage stderr");
            }
            state.metrics.record_request(err.kind().as_str());
            ApiError::from_pipeline(&err).with_trace_id(trace_id.clone()).into_response()
        }
        Err(join_err) => {
            error!(trace_id = %trace_id, error = %join_err, "pipeline task aborted");
            state.metrics.record_request("internal");
            ApiError::internal().with_trace_id(trace_id.clone()).into_response()
        }
    };

    with_trace_header(response, &trace_id)
}

/// First field named `file`; other fields are skipped.
async fn read_file_field(mut multipart: Multipart, max_bytes: usize) -> Result<UploadPayload, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        if bytes.is_empty() {
            return Err(ApiError::bad_request("uploaded file is empty"));
        }
        if bytes.len() > max_bytes {
            return Err(ApiError::payload_too_large());
        }

        let mut payload = UploadPayload::new(bytes.to_vec());
        if let Some(filename) = filename {
            payload = payload.with_filename(filename);
        }
        if let Some(content_type) = content_type {
            payload = payload.with_content_type(content_type);
        }
        return Ok(payload);
    }
    Err(ApiError::bad_request("missing form field 'file'"))
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large()
    } else {
        warn!(error = %err.body_text(), "malformed multipart body");
        ApiError::bad_request("malformed multipart body")
    }
}

fn with_trace_header(mut response: Response, trace_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(trace_id) {
        response.headers_mut().insert(HeaderName::from_static(TRACE_HEADER), value);
    }
    response
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": SUDOKU_VERSION,
            "pipeline": state.runner.pipeline_id(),
            "free_stage_slots": state.runner.available_permits(),
        })),
    )
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.encode() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "metrics encoding failed");
            ApiError::internal().into_response()
        }
    }
}
