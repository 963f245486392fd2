//! External simulator execution.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use plume_core::{obs, SimulatorConfig};
use tokio::process::Command;

/// Placeholder replaced by the input description path.
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// Errors raised while launching or waiting for the simulator.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("simulator command is empty")]
    EmptyCommand,

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {0} seconds")]
    Timeout(u64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One simulator invocation for one subtest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationRequest {
    pub subtest_id: String,
    pub input: PathBuf,
    pub run_dir: PathBuf,
    pub extra_args: Vec<String>,
}

/// Result of a finished simulator process.
#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub subtest_id: String,

    /// Exit code (0 = success, -1 when killed by a signal).
    pub exit_code: i32,

    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl SimulationOutcome {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-empty stderr line, for failure messages.
    pub fn stderr_tail(&self) -> Option<&str> {
        self.stderr.lines().rev().map(str::trim).find(|l| !l.is_empty())
    }
}

/// Something that can produce simulator output for a request.
#[async_trait]
pub trait Simulator: Send + Sync {
    async fn run(&self, request: &SimulationRequest) -> Result<SimulationOutcome, RunnerError>;
}

/// Runs the configured command as a child process in the request's run
/// directory, killing it when the timeout expires.
#[derive(Debug, Clone)]
pub struct ProcessSimulator {
    config: SimulatorConfig,
}

impl ProcessSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        Self { config }
    }

    /// Full argument vector for `request`, program first.
    pub fn command_line(&self, request: &SimulationRequest) -> Vec<String> {
        let input = request.input.to_string_lossy();
        let mut substituted = false;
        let mut argv: Vec<String> = self
            .config
            .command
            .iter()
            .map(|arg| {
                if arg.contains(INPUT_PLACEHOLDER) {
                    substituted = true;
                    arg.replace(INPUT_PLACEHOLDER, &input)
                } else {
                    arg.clone()
                }
            })
            .collect();
        if !substituted && !argv.is_empty() {
            argv.push(input.into_owned());
        }
        argv.extend(request.extra_args.iter().cloned());
        argv
    }
}

#[async_trait]
impl Simulator for ProcessSimulator {
    async fn run(&self, request: &SimulationRequest) -> Result<SimulationOutcome, RunnerError> {
        let argv = self.command_line(request);
        let (program, args) = argv.split_first().ok_or(RunnerError::EmptyCommand)?;

        tokio::fs::create_dir_all(&request.run_dir).await?;
        obs::emit_simulation_started(&request.subtest_id, &argv.join(" "));
        let start = Instant::now();

        let child = Command::new(program)
            .args(args)
            .current_dir(&request.run_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: program.clone(),
                source,
            })?;

        let output = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| RunnerError::Timeout(self.config.timeout_secs))??;

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);
        obs::emit_simulation_finished(&request.subtest_id, exit_code, duration_ms);

        Ok(SimulationOutcome {
            subtest_id: request.subtest_id.clone(),
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
        })
    }
}
