//! Stage Trait: single contract for both pipeline stages
//!
//! A stage takes a byte payload on stdin and answers on stdout. The runner
//! that backs production stages is [`ProcessStage`]; tests substitute their
//! own implementations of [`Stage`].
use crate::error::StageError;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// How much stderr is kept for server-side diagnostics.
const STDERR_CAPTURE_LIMIT: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Extractor,
    Solver,
}

impl StageKind {
    pub fn id(&self) -> &'static str {
        match self {
            Self::Extractor => "extract",
            Self::Solver => "solve",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Contract shared by every pipeline stage.
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    /// Feed `input` to the stage and return everything it wrote.
    fn run<'a>(&'a self, input: &'a [u8]) -> BoxFuture<'a, Result<Vec<u8>, StageError>>;
}

/// A stage backed by one external process per invocation.
#[derive(Debug, Clone)]
pub struct ProcessStage {
    kind: StageKind,
    program: PathBuf,
    args: Vec<String>,
    working_dir: PathBuf,
    timeout: Duration,
    max_output_bytes: usize,
}

impl ProcessStage {
    pub fn new(kind: StageKind, program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            timeout: Duration::from_secs(30),
            max_output_bytes: 1024 * 1024,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_output_bytes(mut self, limit: usize) -> Self {
        self.max_output_bytes = limit;
        self
    }

    /// Working directory and program path the child is started with.
    ///
    /// A relative working directory is made absolute first, so a relative
    /// program path and the child's cwd both point at the same place.
    /// Absolute programs are kept and bare names go through `PATH`.
    pub fn resolved(&self) -> std::io::Result<(PathBuf, PathBuf)> {
        let working_dir = std::path::absolute(&self.working_dir)?;
        let program = if self.program.is_absolute() || self.program.components().count() <= 1 {
            self.program.clone()
        } else {
            working_dir.join(&self.program)
        };
        Ok((working_dir, program))
    }

    /// Spawn, exchange, reap. The child is always awaited before returning,
    /// including on timeout and oversized output.
    pub async fn invoke(&self, input: &[u8]) -> Result<Vec<u8>, StageError> {
        let (working_dir, program) = self.resolved().map_err(|source| StageError::SpawnFailed {
            program: self.program.display().to_string(),
            source,
        })?;
        let mut child = Command::new(&program)
            .args(&self.args)
            .current_dir(&working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| StageError::SpawnFailed {
                program: program.display().to_string(),
                source,
            })?;

        debug!(stage = %self.kind, pid = ?child.id(), bytes_in = input.len(), "stage spawned");

        let outcome = tokio::time::timeout(self.timeout, exchange(&mut child, input, self.max_output_bytes)).await;

        match outcome {
            Ok(Ok(exchanged)) => exchanged.into_result(),
            Ok(Err(err)) => {
                reap(&mut child, self.kind).await;
                Err(err)
            }
            Err(_) => {
                warn!(stage = %self.kind, timeout_ms = self.timeout.as_millis() as u64, "stage timed out, killing");
                reap(&mut child, self.kind).await;
                Err(StageError::Timeout { after: self.timeout })
            }
        }
    }
}

impl Stage for ProcessStage {
    fn kind(&self) -> StageKind {
        self.kind
    }

    fn run<'a>(&'a self, input: &'a [u8]) -> BoxFuture<'a, Result<Vec<u8>, StageError>> {
        Box::pin(self.invoke(input))
    }
}

/// Everything observed from a process that ran to exit.
struct Exchanged {
    status: ExitStatus,
    write: std::io::Result<()>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl Exchanged {
    fn into_result(self) -> Result<Vec<u8>, StageError> {
        if !self.status.success() {
            return Err(StageError::NonZeroExit {
                code: self.status.code(),
                stderr: String::from_utf8_lossy(&self.stderr).into_owned(),
            });
        }
        self.write.map_err(|source| StageError::WriteFailed { source })?;
        Ok(self.stdout)
    }
}

/// Write stdin, drain stdout and stderr on concurrent paths, then wait.
async fn exchange(child: &mut Child, input: &[u8], max_output_bytes: usize) -> Result<Exchanged, StageError> {
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let write = async move {
        if let Some(mut stdin) = stdin {
            stdin.write_all(input).await?;
            stdin.flush().await?;
            // dropping the handle closes the pipe so the stage sees EOF
        }
        Ok::<(), std::io::Error>(())
    };
    let read_out = read_bounded(stdout, max_output_bytes);
    let read_err = read_capped(stderr, STDERR_CAPTURE_LIMIT);

    let (write, stdout, stderr) = tokio::join!(write, read_out, read_err);

    let (stdout, overflowed) = stdout.map_err(|source| StageError::ReadFailed { source })?;
    if overflowed {
        return Err(StageError::OutputTooLarge { limit: max_output_bytes });
    }
    let stderr = stderr.unwrap_or_default();

    let status = child.wait().await.map_err(|source| StageError::ReadFailed { source })?;

    Ok(Exchanged { status, write, stdout, stderr })
}

/// Read up to `limit` bytes. The flag is set when the stream had more; the
/// remainder is left unread.
async fn read_bounded<R>(stream: Option<R>, limit: usize) -> std::io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let Some(stream) = stream else {
        return Ok((buf, false));
    };
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    stream.take(cap).read_to_end(&mut buf).await?;
    if buf.len() > limit {
        buf.truncate(limit);
        return Ok((buf, true));
    }
    Ok((buf, false))
}

/// Keep the first `limit` bytes and discard the rest, so a chatty stage
/// never blocks on a full stderr pipe.
async fn read_capped<R>(stream: Option<R>, limit: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let Some(mut stream) = stream else {
        return Ok(buf);
    };
    (&mut stream).take(limit as u64).read_to_end(&mut buf).await?;
    tokio::io::copy(&mut stream, &mut tokio::io::sink()).await?;
    Ok(buf)
}

async fn reap(child: &mut Child, kind: StageKind) {
    if let Err(e) = child.start_kill() {
        debug!(stage = %kind, error = %e, "kill after exit or failure");
    }
    if let Err(e) = child.wait().await {
        warn!(stage = %kind, error = %e, "failed to reap stage process");
    }
}
