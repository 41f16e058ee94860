//! Pipeline Runner: chains extractor → solver with admission control and
//! per-stage reports
use crate::context::ExecutionContext;
use crate::data_model::{GridRepresentation, PipelineOutput, SolvedResult, StageReport, UploadPayload};
use crate::encoding::encode_transport;
use crate::error::PipelineError;
use crate::stage::{Stage, StageKind};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn, Instrument};

/// Bounds on how many stage processes run at once across all requests.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionLimits {
    pub max_stage_processes: usize,
    pub admission_timeout: Duration,
}

impl Default for AdmissionLimits {
    fn default() -> Self {
        Self {
            max_stage_processes: 8,
            admission_timeout: Duration::from_secs(10),
        }
    }
}

/// Stateless across requests apart from the shared admission semaphore, so
/// one runner can be cloned into every handler.
#[derive(Clone)]
pub struct PipelineRunner {
    extractor: Arc<dyn Stage>,
    solver: Arc<dyn Stage>,
    permits: Arc<Semaphore>,
    admission_timeout: Duration,
    pipeline_id: String,
}

impl PipelineRunner {
    pub fn new(extractor: Arc<dyn Stage>, solver: Arc<dyn Stage>, limits: AdmissionLimits) -> Self {
        let pipeline_id = [extractor.kind().id(), solver.kind().id()].join("→");

        Self {
            extractor,
            solver,
            permits: Arc::new(Semaphore::new(limits.max_stage_processes.max(1))),
            admission_timeout: limits.admission_timeout,
            pipeline_id,
        }
    }

    /// Encode, extract, solve. The solver never sees a failed or blank
    /// extraction.
    pub async fn execute(
        &self,
        payload: &UploadPayload,
        ctx: &ExecutionContext,
    ) -> Result<PipelineOutput, PipelineError> {
        let span = tracing::info_span!(
            "pipeline",
            trace_id = %ctx.trace_id,
            pipeline = %self.pipeline_id,
            filename = ctx.filename.as_deref().unwrap_or("-"),
        );
        self.execute_inner(payload).instrument(span).await
    }

    async fn execute_inner(&self, payload: &UploadPayload) -> Result<PipelineOutput, PipelineError> {
        if payload.is_empty() {
            return Err(PipelineError::ClientInputInvalid("empty upload".to_string()));
        }

        let mut reports = Vec::with_capacity(2);

        let transport = encode_transport(&payload.bytes).into_stage_input();
        let (extracted, report) = self.run_stage(self.extractor.as_ref(), &transport).await?;
        reports.push(report);

        let grid = GridRepresentation(extracted);
        if grid.is_blank() {
            warn!(stage = %StageKind::Extractor, "extractor produced no grid, solver skipped");
            return Err(PipelineError::EmptyStageOutput { stage: self.extractor.kind() });
        }

        let (solved, report) = self.run_stage(self.solver.as_ref(), &grid.into_stage_input()).await?;
        reports.push(report);

        let solved = SolvedResult(solved);
        if solved.is_blank() {
            warn!(stage = %StageKind::Solver, "solver produced no output");
            return Err(PipelineError::EmptyStageOutput { stage: self.solver.kind() });
        }

        info!(
            bytes_in = payload.len(),
            bytes_out = solved.as_bytes().len(),
            "pipeline complete"
        );

        Ok(PipelineOutput {
            pipeline_id: self.pipeline_id.clone(),
            solved,
            stages: reports,
        })
    }

    async fn run_stage(&self, stage: &dyn Stage, input: &[u8]) -> Result<(Vec<u8>, StageReport), PipelineError> {
        let kind = stage.kind();
        let _permit = match tokio::time::timeout(self.admission_timeout, self.permits.acquire()).await {
            Ok(Ok(permit)) => permit,
            // the semaphore is never closed; treat it like a saturated one
            Ok(Err(_)) | Err(_) => {
                warn!(stage = %kind, "no stage slot available");
                return Err(PipelineError::Overloaded { waited: self.admission_timeout });
            }
        };

        let start = Instant::now();
        let in_hash = self.hash_bytes(input);

        let output = stage.run(input).await.map_err(|source| {
            warn!(stage = %kind, error = %source, "stage failed");
            PipelineError::stage_failed(kind, source)
        })?;

        let report = StageReport {
            id: kind.id().to_string(),
            in_hash,
            out_hash: self.hash_bytes(&output),
            bytes_in: input.len(),
            bytes_out: output.len(),
            latency_ms: start.elapsed().as_millis() as u64,
        };
        debug!(
            stage = %kind,
            latency_ms = report.latency_ms,
            bytes_out = report.bytes_out,
            in_hash = %report.in_hash,
            out_hash = %report.out_hash,
            "stage finished"
        );

        Ok((output, report))
    }

    fn hash_bytes(&self, data: &[u8]) -> String {
        format!("blake3:{}", blake3::hash(data))
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    /// Stage slots currently free.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}
