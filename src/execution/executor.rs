//! Step execution seam
//!
//! The processing executable is an external collaborator. [`StepExecutor`] is
//! the boundary: the chain runner hands it one fully-derived invocation at a
//! time and gets back an outcome or a classified failure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::ExecutorConfig;
use crate::constants::files;
use crate::error::{SplitterError, SplitterResult};
use crate::models::Tweak;

/// Everything needed to run one step, or one copy of a step, of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepInvocation {
    pub job_index: u64,
    pub step: u32,
    pub step_name: String,
    pub copy_index: Option<u32>,
    /// Base configuration artifact, when one was shipped
    pub base_config: Option<PathBuf>,
    /// Directory the step runs in; created if missing
    pub work_dir: PathBuf,
    pub tweak: Tweak,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub job_index: u64,
    pub step: u32,
    pub copy_index: Option<u32>,
    pub exit_code: i32,
    pub duration_ms: u64,
}

#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, invocation: StepInvocation) -> SplitterResult<StepOutcome>;
}

/// Runs the configured external program for each invocation.
///
/// The program is started in the invocation's work directory as
/// `<program> <args...> [<base_config>] tweak.json`, with the tweak serialized
/// into `tweak.json` beside it. The child is killed if the task is aborted.
#[derive(Debug, Clone)]
pub struct CommandStepExecutor {
    config: ExecutorConfig,
}

impl CommandStepExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    fn failure(invocation: &StepInvocation, exit_code: Option<i32>, reason: impl Into<String>) -> SplitterError {
        SplitterError::StepExecution {
            job_index: invocation.job_index,
            step: invocation.step,
            exit_code,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl StepExecutor for CommandStepExecutor {
    async fn execute(&self, invocation: StepInvocation) -> SplitterResult<StepOutcome> {
        tokio::fs::create_dir_all(&invocation.work_dir)
            .await
            .map_err(|e| SplitterError::io(invocation.work_dir.display(), e))?;

        let tweak_path = invocation.work_dir.join(files::TWEAK_FILE);
        let body = serde_json::to_vec_pretty(&invocation.tweak)?;
        tokio::fs::write(&tweak_path, body)
            .await
            .map_err(|e| SplitterError::io(tweak_path.display(), e))?;

        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .current_dir(&invocation.work_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(base_config) = &invocation.base_config {
            command.arg(base_config);
        }
        command.arg(files::TWEAK_FILE);

        debug!(
            job_index = invocation.job_index,
            step = invocation.step,
            copy_index = invocation.copy_index,
            program = %self.config.program,
            work_dir = %invocation.work_dir.display(),
            "Starting step process"
        );

        let started = Instant::now();
        let mut child = command.spawn().map_err(|e| {
            SplitterError::EnvironmentBootstrap(format!(
                "failed to start '{}': {e}",
                self.config.program
            ))
        })?;

        let status = match self.config.timeout_seconds {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!(
                        job_index = invocation.job_index,
                        step = invocation.step,
                        copy_index = invocation.copy_index,
                        timeout_seconds = secs,
                        "Step process timed out; killing"
                    );
                    let _ = child.kill().await;
                    return Err(Self::failure(
                        &invocation,
                        None,
                        format!("timed out after {secs}s"),
                    ));
                }
            },
            None => child.wait().await,
        }
        .map_err(|e| Self::failure(&invocation, None, format!("failed to wait for process: {e}")))?;

        if !status.success() {
            return Err(Self::failure(
                &invocation,
                status.code(),
                format!("'{}' exited with {status}", self.config.program),
            ));
        }

        Ok(StepOutcome {
            job_index: invocation.job_index,
            step: invocation.step,
            copy_index: invocation.copy_index,
            exit_code: status.code().unwrap_or(0),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}
