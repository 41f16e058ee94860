//! Sudoku Core: Stage trait, process runner, and the extract → solve pipeline
//!
//! Both stages are external programs spoken to over stdin/stdout. This crate
//! owns their lifecycle; it never looks inside the image or the grid.
//!
//! ```text
//! upload bytes → base64 + \n → [extractor] → grid + \n → [solver] → solved text
//! ```

pub mod context;
pub mod data_model;
pub mod encoding;
pub mod error;
pub mod runner;
pub mod stage;

pub use context::ExecutionContext;
pub use data_model::{GridRepresentation, PipelineOutput, SolvedResult, StageReport, TransportEncoding, UploadPayload};
pub use encoding::{decode_transport, encode_transport};
pub use error::{ErrorKind, PipelineError, StageError};
pub use runner::{AdmissionLimits, PipelineRunner};
pub use stage::{ProcessStage, Stage, StageKind};

/// Engine version reported by the API
pub const SUDOKU_VERSION: &str = "1.0.0";
