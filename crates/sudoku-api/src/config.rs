//! Server configuration, read from `SUDOKU_*` environment variables.
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sudoku_core::{AdmissionLimits, PipelineRunner, ProcessStage, StageKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("CONFIG/{var}: expected a positive integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },
}

/// One external stage: what to run and where.
#[derive(Debug, Clone)]
pub struct StageCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub public_dir: PathBuf,
    pub extractor: StageCommand,
    pub solver: StageCommand,
    pub stage_timeout: Duration,
    pub max_upload_bytes: usize,
    pub max_stage_output_bytes: usize,
    pub max_stage_processes: usize,
    pub admission_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8000".to_string(),
            public_dir: PathBuf::from("public"),
            extractor: StageCommand {
                program: PathBuf::from("./bin/python3"),
                args: vec!["image_extractor.py".to_string()],
                working_dir: PathBuf::from("../python/"),
            },
            solver: StageCommand {
                program: PathBuf::from("./main"),
                args: Vec::new(),
                working_dir: PathBuf::from("../cpp/dlx/drivers/"),
            },
            stage_timeout: Duration::from_secs(30),
            max_upload_bytes: 10 * 1024 * 1024,
            max_stage_output_bytes: 1024 * 1024,
            max_stage_processes: 8,
            admission_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("SUDOKU_ADDR") {
            config.addr = addr;
        }
        if let Some(dir) = lookup("SUDOKU_PUBLIC_DIR") {
            config.public_dir = dir.into();
        }

        apply_stage(&lookup, "EXTRACTOR", &mut config.extractor);
        apply_stage(&lookup, "SOLVER", &mut config.solver);

        if let Some(secs) = positive(&lookup, "SUDOKU_STAGE_TIMEOUT_SECS")? {
            config.stage_timeout = Duration::from_secs(secs as u64);
        }
        if let Some(n) = positive(&lookup, "SUDOKU_MAX_UPLOAD_BYTES")? {
            config.max_upload_bytes = n;
        }
        if let Some(n) = positive(&lookup, "SUDOKU_MAX_STAGE_OUTPUT_BYTES")? {
            config.max_stage_output_bytes = n;
        }
        if let Some(n) = positive(&lookup, "SUDOKU_MAX_STAGE_PROCESSES")? {
            config.max_stage_processes = n;
        }
        if let Some(secs) = positive(&lookup, "SUDOKU_ADMISSION_TIMEOUT_SECS")? {
            config.admission_timeout = Duration::from_secs(secs as u64);
        }

        Ok(config)
    }

    fn stage(&self, kind: StageKind, command: &StageCommand) -> ProcessStage {
        ProcessStage::new(kind, command.program.clone(), command.working_dir.clone())
            .with_args(command.args.iter().cloned())
            .with_timeout(self.stage_timeout)
            .with_max_output_bytes(self.max_stage_output_bytes)
    }

    /// Wire the configured stage commands into a runner.
    pub fn build_runner(&self) -> PipelineRunner {
        PipelineRunner::new(
            Arc::new(self.stage(StageKind::Extractor, &self.extractor)),
            Arc::new(self.stage(StageKind::Solver, &self.solver)),
            AdmissionLimits {
                max_stage_processes: self.max_stage_processes,
                admission_timeout: self.admission_timeout,
            },
        )
    }
}

fn apply_stage<F>(lookup: &F, name: &str, stage: &mut StageCommand)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(cmd) = lookup(&format!("SUDOKU_{name}_CMD")) {
        stage.program = cmd.into();
    }
    if let Some(args) = lookup(&format!("SUDOKU_{name}_ARGS")) {
        stage.args = args.split_whitespace().map(str::to_string).collect();
    }
    if let Some(dir) = lookup(&format!("SUDOKU_{name}_DIR")) {
        stage.working_dir = dir.into();
    }
}

fn positive<F>(lookup: &F, var: &'static str) -> Result<Option<usize>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(ConfigError::InvalidNumber { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_original_layout() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.addr, "0.0.0.0:8000");
        assert_eq!(config.extractor.program, PathBuf::from("./bin/python3"));
        assert_eq!(config.extractor.args, vec!["image_extractor.py"]);
        assert_eq!(config.solver.working_dir, PathBuf::from("../cpp/dlx/drivers/"));
        assert!(config.solver.args.is_empty());
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("SUDOKU_ADDR", "127.0.0.1:9000"),
            ("SUDOKU_SOLVER_CMD", "/usr/local/bin/dlx"),
            ("SUDOKU_EXTRACTOR_ARGS", "-u extract.py"),
            ("SUDOKU_STAGE_TIMEOUT_SECS", "5"),
            ("SUDOKU_MAX_STAGE_PROCESSES", "2"),
        ]))
        .unwrap();
        assert_eq!(config.addr, "127.0.0.1:9000");
        assert_eq!(config.solver.program, PathBuf::from("/usr/local/bin/dlx"));
        assert_eq!(config.extractor.args, vec!["-u", "extract.py"]);
        assert_eq!(config.stage_timeout, Duration::from_secs(5));
        assert_eq!(config.max_stage_processes, 2);
    }

    #[test]
    fn test_rejects_zero_and_garbage() {
        let err = ServerConfig::from_lookup(lookup(&[("SUDOKU_MAX_UPLOAD_BYTES", "0")])).unwrap_err();
        assert!(err.to_string().contains("SUDOKU_MAX_UPLOAD_BYTES"));

        let err = ServerConfig::from_lookup(lookup(&[("SUDOKU_STAGE_TIMEOUT_SECS", "soon")])).unwrap_err();
        assert!(err.to_string().contains("soon"));
    }

    #[test]
    fn test_build_runner_names_pipeline() {
        let runner = ServerConfig::default().build_runner();
        assert_eq!(runner.pipeline_id(), "extract→solve");
        assert_eq!(runner.available_permits(), 8);
    }
}
