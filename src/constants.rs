//! # System Constants
//!
//! Exit-code taxonomy, file-name conventions, and the literal vocabulary of the
//! external PSet tweak tool. The literal strings here are a wire contract with
//! the step-execution tool and must be preserved byte for byte.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exit codes reported by the worker at the job-execution boundary.
///
/// `BadArguments` doubles as the scheduler's "do not retry" code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCode {
    Success,
    BadArguments,
    MissingInput,
    ConfigGeneration,
    EnvironmentBootstrap,
    StepExecution,
    StageOut,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::BadArguments => 1,
            ExitCode::MissingInput => 2,
            ExitCode::ConfigGeneration => 3,
            ExitCode::EnvironmentBootstrap => 4,
            ExitCode::StepExecution => 5,
            ExitCode::StageOut => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExitCode::Success => "success",
            ExitCode::BadArguments => "bad_arguments",
            ExitCode::MissingInput => "missing_input",
            ExitCode::ConfigGeneration => "config_generation",
            ExitCode::EnvironmentBootstrap => "environment_bootstrap",
            ExitCode::StepExecution => "step_execution",
            ExitCode::StageOut => "stage_out",
        }
    }

    /// Bad arguments and config desyncs reproduce identically on every host.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ExitCode::MissingInput
                | ExitCode::EnvironmentBootstrap
                | ExitCode::StepExecution
                | ExitCode::StageOut
        )
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        // Taxonomy values all fit in a u8.
        std::process::ExitCode::from(code.code() as u8)
    }
}

/// Request and splitting defaults
pub mod defaults {
    /// Output module read by a step that does not name one.
    pub const OUTPUT_MODULE: &str = "RAWSIMoutput";
    pub const RUN_NUMBER: u64 = 1;
    pub const NUM_COPIES: u32 = 1;
    pub const PRODUCTION_TASK_TYPE: &str = "Production";
    pub const EVENT_BASED_ALGO: &str = "EventBased";
    pub const COPY_DIR_PREFIX: &str = "copy";
}

/// File and directory naming conventions shared with the worker wrapper
pub mod files {
    pub const JOB_FILE_PREFIX: &str = "job";
    pub const JOB_FILE_SUFFIX: &str = ".json";
    pub const REQUEST_ARCHIVE: &str = "request_psets.tar.gz";
    pub const ARCHIVED_REQUEST: &str = "request.json";
    pub const ARCHIVED_SPLITTING: &str = "splitting.json";
    pub const ARCHIVED_PSETS_DIR: &str = "PSets";
    pub const STEP_DIR_PREFIX: &str = "step";
    pub const TWEAK_FILE: &str = "tweak.json";
    pub const ROOT_EXTENSION: &str = ".root";
    pub const LOCAL_FILE_SCHEME: &str = "file:";
}

/// PSet tweak keys and value wrappers understood by the external tweak tool
pub mod pset {
    pub const FIRST_LUMI_KEY: &str = "process.source.firstLuminosityBlock";
    pub const MAX_EVENTS_KEY: &str = "process.maxEvents";
    pub const FIRST_EVENT_KEY: &str = "process.source.firstEvent";
    pub const FIRST_RUN_KEY: &str = "process.source.firstRun";
    pub const FILE_NAMES_KEY: &str = "process.source.fileNames";
    pub const OUTPUT_KEY_PREFIX: &str = "process.";
    pub const OUTPUT_KEY_SUFFIX: &str = ".fileName";

    pub const UINT32_OPEN: &str = "customTypeCms.untracked.uint32(";
    pub const MAX_EVENTS_OPEN: &str = "customTypeCms.untracked.PSet(input=cms.untracked.int32(";
    pub const MAX_EVENTS_CLOSE: &str = "))";
    pub const VSTRING_OPEN: &str = "customTypeCms.untracked.vstring(";
    pub const STRING_OPEN: &str = "customTypeCms.untracked.string(";
    pub const CLOSE: &str = ")";

    /// Max-events value meaning "consume the whole upstream artifact".
    pub const ALL_EVENTS: i64 = -1;
}
