//! Data Model: UploadPayload, TransportEncoding, GridRepresentation, SolvedResult
use serde::{Deserialize, Serialize};

/// Raw bytes of one uploaded image. Lives for a single request.
#[derive(Debug, Clone)]
pub struct UploadPayload {
    pub bytes: Vec<u8>,
    /// Client-supplied file name, for logs only
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

impl UploadPayload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: None,
            content_type: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Base64 text of an upload, consumed once by the extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEncoding(pub String);

impl TransportEncoding {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encoded text plus the line terminator the extractor reads up to.
    pub fn into_stage_input(self) -> Vec<u8> {
        let mut bytes = self.0.into_bytes();
        bytes.push(b'\n');
        bytes
    }
}

/// Extractor output. Opaque to the pipeline: the grid grammar belongs to the
/// two stage programs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridRepresentation(pub Vec<u8>);

impl GridRepresentation {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// True when there is nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        is_blank(&self.0)
    }

    /// Forwarded verbatim; a `\n` is added only if the grid lacks one.
    pub fn into_stage_input(self) -> Vec<u8> {
        let mut bytes = self.0;
        if bytes.last() != Some(&b'\n') {
            bytes.push(b'\n');
        }
        bytes
    }
}

/// Solver output, returned to the caller as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolvedResult(pub Vec<u8>);

impl SolvedResult {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn is_blank(&self) -> bool {
        is_blank(&self.0)
    }
}

/// One stage invocation, as recorded by the runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub id: String,
    pub in_hash: String,
    pub out_hash: String,
    pub bytes_in: usize,
    pub bytes_out: usize,
    pub latency_ms: u64,
}

/// Successful pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub pipeline_id: String,
    pub solved: SolvedResult,
    pub stages: Vec<StageReport>,
}

pub(crate) fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}
