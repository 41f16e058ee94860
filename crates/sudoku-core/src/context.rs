//! Execution Context: per-request identity carried through the pipeline
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub trace_id: String,
    pub received_at: DateTime<Utc>,
    pub filename: Option<String>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            trace_id: uuid::Uuid::new_v4().to_string(),
            received_at: Utc::now(),
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: Option<String>) -> Self {
        self.filename = filename;
        self
    }

    /// Milliseconds since the request was received.
    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.received_at).num_milliseconds()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
