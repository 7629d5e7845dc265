//! Error types for the StepChain splitter.
//!
//! Every failure maps onto the fixed exit-code taxonomy understood by the batch
//! scheduler (see [`ExitCode`]), so retry policy can tell a malformed request
//! apart from a transient execution failure.

use crate::constants::ExitCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Final status of one parallel copy of a fanned-out step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum CopyStatus {
    Succeeded,
    Failed {
        exit_code: Option<i32>,
        reason: String,
    },
    Cancelled,
}

impl CopyStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, CopyStatus::Succeeded)
    }
}

/// Diagnostic record for a single copy, preserved inside [`SplitterError::CopyTaskFailure`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyOutcome {
    pub copy_index: u32,
    pub status: CopyStatus,
}

impl fmt::Display for CopyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            CopyStatus::Succeeded => write!(f, "copy{}: succeeded", self.copy_index),
            CopyStatus::Failed {
                exit_code: Some(code),
                reason,
            } => write!(f, "copy{}: failed (exit {code}): {reason}", self.copy_index),
            CopyStatus::Failed {
                exit_code: None,
                reason,
            } => write!(f, "copy{}: failed: {reason}", self.copy_index),
            CopyStatus::Cancelled => write!(f, "copy{}: cancelled", self.copy_index),
        }
    }
}

fn summarize(outcomes: &[CopyOutcome]) -> String {
    outcomes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum SplitterError {
    /// Malformed or non-positive quota inputs.
    #[error("Invalid partition spec: {0}")]
    InvalidPartitionSpec(String),

    /// Chain topology references an artifact no earlier step produces.
    #[error("Step {step} ({step_name}) reads output module '{module}' which no earlier step produces")]
    MissingUpstreamArtifact {
        step: u32,
        step_name: String,
        module: String,
    },

    /// Job file and request disagree on the chain at execution time.
    #[error("Job {job_index} has no precomputed tweak for step {step}")]
    MissingPrecomputedTweak { job_index: u64, step: u32 },

    /// One or more parallel copies of a fanned-out step failed.
    #[error("Job {job_index} step {step}: {failed} of {total} copies failed, {cancelled} cancelled [{}]", summarize(.outcomes))]
    CopyTaskFailure {
        job_index: u64,
        step: u32,
        failed: usize,
        cancelled: usize,
        total: usize,
        outcomes: Vec<CopyOutcome>,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Job {job_index} step {step} failed{}: {reason}", .exit_code.map(|c| format!(" with exit code {c}")).unwrap_or_default())]
    StepExecution {
        job_index: u64,
        step: u32,
        exit_code: Option<i32>,
        reason: String,
    },

    #[error("Environment bootstrap failed: {0}")]
    EnvironmentBootstrap(String),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error in {context}: {reason}")]
    Serialization { context: String, reason: String },
}

impl SplitterError {
    pub fn invalid_partition(message: impl Into<String>) -> Self {
        Self::InvalidPartitionSpec(message.into())
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn io(path: impl fmt::Display, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_string(),
            source,
        }
    }

    pub fn serialization(context: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Serialization {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a composite copy failure from every copy's outcome.
    pub fn copy_task_failure(job_index: u64, step: u32, outcomes: Vec<CopyOutcome>) -> Self {
        let failed = outcomes
            .iter()
            .filter(|o| matches!(o.status, CopyStatus::Failed { .. }))
            .count();
        let cancelled = outcomes
            .iter()
            .filter(|o| o.status == CopyStatus::Cancelled)
            .count();
        Self::CopyTaskFailure {
            job_index,
            step,
            failed,
            cancelled,
            total: outcomes.len(),
            outcomes,
        }
    }

    /// Exit code reported to the scheduler for this failure.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            SplitterError::InvalidPartitionSpec(_)
            | SplitterError::InvalidRequest(_)
            | SplitterError::MissingUpstreamArtifact { .. }
            | SplitterError::Configuration(_) => ExitCode::BadArguments,
            SplitterError::Io { .. } => ExitCode::MissingInput,
            SplitterError::MissingPrecomputedTweak { .. }
            | SplitterError::Serialization { .. } => ExitCode::ConfigGeneration,
            SplitterError::EnvironmentBootstrap(_) => ExitCode::EnvironmentBootstrap,
            SplitterError::StepExecution { .. } | SplitterError::CopyTaskFailure { .. } => {
                ExitCode::StepExecution
            }
        }
    }

    /// Whether an external retry of the job could succeed.
    pub fn is_retryable(&self) -> bool {
        self.exit_code().is_retryable()
    }
}

impl From<serde_json::Error> for SplitterError {
    fn from(error: serde_json::Error) -> Self {
        SplitterError::serialization("JSON", error)
    }
}

impl From<config::ConfigError> for SplitterError {
    fn from(error: config::ConfigError) -> Self {
        SplitterError::Configuration(error.to_string())
    }
}

pub type SplitterResult<T> = std::result::Result<T, SplitterError>;
