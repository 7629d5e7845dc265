//! # Configuration
//!
//! Layered runtime configuration: built-in defaults, then an optional TOML
//! file, then `STEPCHAIN__`-prefixed environment variables
//! (e.g. `STEPCHAIN__EXECUTOR__PROGRAM=cmsRun`).

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::constants::defaults;
use crate::error::{SplitterError, SplitterResult};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config/stepchain.toml";

/// Environment prefix for overrides.
pub const ENV_PREFIX: &str = "STEPCHAIN";

/// How a step that reads a fanned-out step's output finds its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyInputPolicy {
    /// Read every copy's artifact
    AllCopies,
    /// Read only copy 0's artifact
    FirstCopy,
}

/// Where step-1 copy tweaks are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyDerivation {
    /// Job file carries the job-level tweak; the worker derives copies
    Worker,
    /// Job file carries the list of copy tweaks
    Submit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// External program run for each step
    pub program: String,
    /// Extra arguments placed before the base config and tweak file
    pub args: Vec<String>,
    /// Per-invocation timeout; `None` waits indefinitely
    pub timeout_seconds: Option<u64>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            program: "cmsRun".to_string(),
            args: Vec::new(),
            timeout_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitterConfig {
    pub default_output_module: String,
    pub copy_input_policy: CopyInputPolicy,
    pub copy_derivation: CopyDerivation,
    pub copy_dir_prefix: String,
    pub abort_siblings_on_failure: bool,
    pub executor: ExecutorConfig,
    pub logging: LoggingConfig,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            default_output_module: defaults::OUTPUT_MODULE.to_string(),
            copy_input_policy: CopyInputPolicy::AllCopies,
            copy_derivation: CopyDerivation::Worker,
            copy_dir_prefix: defaults::COPY_DIR_PREFIX.to_string(),
            abort_siblings_on_failure: true,
            executor: ExecutorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl SplitterConfig {
    /// Load from [`DEFAULT_CONFIG_FILE`] (if present) and the environment.
    pub fn load() -> SplitterResult<Self> {
        Self::load_from(None)
    }

    /// Load with an explicit file. An explicit file must exist.
    pub fn load_from(path: Option<&Path>) -> SplitterResult<Self> {
        let defaults = serde_json::to_string(&Self::default())?;

        let mut builder =
            Config::builder().add_source(File::from_str(&defaults, FileFormat::Json));

        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        let config: SplitterConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        debug!(?config, "Configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> SplitterResult<()> {
        if self.default_output_module.trim().is_empty() {
            return Err(SplitterError::Configuration(
                "default_output_module must not be empty".to_string(),
            ));
        }
        if self.copy_dir_prefix.trim().is_empty() || self.copy_dir_prefix.contains('/') {
            return Err(SplitterError::Configuration(format!(
                "copy_dir_prefix must be a non-empty directory name, got '{}'",
                self.copy_dir_prefix
            )));
        }
        if self.executor.program.trim().is_empty() {
            return Err(SplitterError::Configuration(
                "executor.program must not be empty".to_string(),
            ));
        }
        if self.executor.timeout_seconds == Some(0) {
            return Err(SplitterError::Configuration(
                "executor.timeout_seconds must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}
