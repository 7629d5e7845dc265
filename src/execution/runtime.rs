//! # Chain Runner
//!
//! Worker-side execution of one job: steps run strictly in order, each in its
//! own `step<K>` directory under the job's working directory. Step 1 fans out
//! into `step1/copy<c>` directories through the [`CopyTaskGroup`] when the
//! request asks for copies; the next step starts only after every copy
//! finished. The first failed step stops the chain.
//!
//! Every step's tweak is resolved from the job file before step 1 starts, so
//! a job file out of sync with the request fails without running anything.
//!
//! ## Usage
//!
//! ```rust
//! use async_trait::async_trait;
//! use std::sync::Arc;
//! use stepchain_splitter::execution::{ChainRunner, StepExecutor, StepInvocation, StepOutcome};
//! use stepchain_splitter::models::{Request, StepSpec};
//! use stepchain_splitter::orchestration::JobSetBuilder;
//! use stepchain_splitter::{SplitterConfig, SplitterResult};
//!
//! struct DryRun;
//!
//! #[async_trait]
//! impl StepExecutor for DryRun {
//!     async fn execute(&self, invocation: StepInvocation) -> SplitterResult<StepOutcome> {
//!         Ok(StepOutcome {
//!             job_index: invocation.job_index,
//!             step: invocation.step,
//!             copy_index: invocation.copy_index,
//!             exit_code: 0,
//!             duration_ms: 0,
//!         })
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let request = Request::new("MonteCarlo_2024", 100, 50).with_steps(vec![
//!     StepSpec::new("GEN-SIM").with_copies(2),
//!     StepSpec::new("DIGI"),
//! ]);
//! let jobs = JobSetBuilder::new(&request).build().unwrap();
//!
//! let runner = ChainRunner::new(request, &SplitterConfig::default(), Arc::new(DryRun), "/tmp/job1").unwrap();
//! let report = runner.run(&jobs[0]).await.unwrap();
//! assert_eq!(report.steps[0].outcomes.len(), 2);
//! assert_eq!(report.steps[1].outcomes.len(), 1);
//! # });
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::artifacts::locate_base_config;
use crate::config::SplitterConfig;
use crate::constants::files;
use crate::error::{SplitterError, SplitterResult};
use crate::logging;
use crate::models::{CopyTweak, JobTweaks, Request, StepTweaks, Tweak};
use crate::orchestration::{ConfiguratorOptions, StepConfigurator};

use super::copy_group::CopyTaskGroup;
use super::executor::{StepExecutor, StepInvocation, StepOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: u32,
    pub step_name: String,
    /// One outcome per copy, or a single outcome for an unfanned step
    pub outcomes: Vec<StepOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub job_index: u64,
    pub steps: Vec<StepReport>,
    pub duration_ms: u64,
}

/// Resolved work for one step.
#[derive(Debug)]
enum StepPlan {
    Single(Tweak),
    Copies(Vec<CopyTweak>),
}

pub struct ChainRunner {
    request: Request,
    configurator: StepConfigurator,
    executor: Arc<dyn StepExecutor>,
    copy_group: CopyTaskGroup,
    work_dir: PathBuf,
    psets_dir: Option<PathBuf>,
}

impl std::fmt::Debug for ChainRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainRunner")
            .field("request_name", &self.request.request_name)
            .field("work_dir", &self.work_dir)
            .field("psets_dir", &self.psets_dir)
            .finish_non_exhaustive()
    }
}

impl ChainRunner {
    pub fn new(
        request: Request,
        config: &SplitterConfig,
        executor: Arc<dyn StepExecutor>,
        work_dir: impl Into<PathBuf>,
    ) -> SplitterResult<Self> {
        let configurator = StepConfigurator::new(&request, ConfiguratorOptions::from(config))?;
        let copy_group = CopyTaskGroup::new(Arc::clone(&executor))
            .with_abort_siblings_on_failure(config.abort_siblings_on_failure);
        Ok(Self {
            request,
            configurator,
            executor,
            copy_group,
            work_dir: work_dir.into(),
            psets_dir: None,
        })
    }

    /// Directory holding the unpacked base configurations (`PSets/`).
    pub fn with_psets_dir(mut self, psets_dir: impl Into<PathBuf>) -> Self {
        self.psets_dir = Some(psets_dir.into());
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Run every step of `job` in order.
    #[instrument(skip(self, job), fields(job_index = job.job_index, request_name = %self.request.request_name))]
    pub async fn run(&self, job: &JobTweaks) -> SplitterResult<ChainReport> {
        let started = Instant::now();
        logging::log_job_operation(
            "run_chain",
            Some(&self.request.request_name),
            Some(job.job_index),
            "started",
            None,
        );

        let plan = match self.plan(job) {
            Ok(plan) => plan,
            Err(err) => {
                logging::log_job_operation(
                    "run_chain",
                    Some(&self.request.request_name),
                    Some(job.job_index),
                    "failed",
                    Some(&err.to_string()),
                );
                return Err(err);
            }
        };

        let mut steps = Vec::with_capacity(plan.len());
        for ((spec, step), work) in self.request.steps.iter().zip(1u32..).zip(plan) {
            let result = match work {
                StepPlan::Copies(copies) => self.run_copies(job.job_index, copies).await,
                StepPlan::Single(tweak) => self
                    .run_single(job.job_index, step, tweak)
                    .await
                    .map(|outcome| vec![outcome]),
            };

            match result {
                Ok(outcomes) => {
                    logging::log_step_operation("run_step", job.job_index, step, None, "succeeded", None);
                    steps.push(StepReport {
                        step,
                        step_name: spec.step_name.clone(),
                        outcomes,
                    });
                }
                Err(err) => {
                    logging::log_step_operation(
                        "run_step",
                        job.job_index,
                        step,
                        None,
                        "failed",
                        Some(&err.to_string()),
                    );
                    let skipped = self.request.steps.len() as u32 - step;
                    if skipped > 0 {
                        warn!(job_index = job.job_index, step, skipped, "Chain stopped; later steps not run");
                    }
                    return Err(err);
                }
            }
        }

        let report = ChainReport {
            job_index: job.job_index,
            steps,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            job_index = report.job_index,
            steps = report.steps.len(),
            duration_ms = report.duration_ms,
            "Chain completed"
        );
        Ok(report)
    }

    /// Resolve the tweak of every step in the chain from `job`.
    fn plan(&self, job: &JobTweaks) -> SplitterResult<Vec<StepPlan>> {
        (1..=self.request.chain_length())
            .map(|step| {
                if step == 1 && self.configurator.fans_out() {
                    return self.configurator.step1_copy_tweaks(job).map(StepPlan::Copies);
                }
                match job.step(step)? {
                    StepTweaks::Single(tweak) => Ok(StepPlan::Single(tweak.clone())),
                    StepTweaks::Copies(copies) => Err(SplitterError::serialization(
                        "job file",
                        format!(
                            "job {} carries {} copy tweaks for step {step}, which does not fan out",
                            job.job_index,
                            copies.len()
                        ),
                    )),
                }
            })
            .collect()
    }

    async fn run_single(&self, job_index: u64, step: u32, tweak: Tweak) -> SplitterResult<StepOutcome> {
        let invocation = StepInvocation {
            job_index,
            step,
            step_name: self.step_name(step),
            copy_index: None,
            base_config: self.base_config(step),
            work_dir: self.work_dir.join(format!("{}{step}", files::STEP_DIR_PREFIX)),
            tweak,
        };
        self.executor.execute(invocation).await
    }

    async fn run_copies(&self, job_index: u64, copies: Vec<CopyTweak>) -> SplitterResult<Vec<StepOutcome>> {
        let base_config = self.base_config(1);
        let step_name = self.step_name(1);

        let invocations = copies
            .into_iter()
            .map(|copy| StepInvocation {
                job_index,
                step: 1,
                step_name: step_name.clone(),
                copy_index: Some(copy.copy_index),
                base_config: base_config.clone(),
                work_dir: self.work_dir.join(&copy.scope),
                tweak: copy.tweak,
            })
            .collect();

        self.copy_group.run(job_index, 1, invocations).await
    }

    fn step_name(&self, step: u32) -> String {
        self.request
            .step(step)
            .map(|s| s.step_name.clone())
            .unwrap_or_default()
    }

    fn base_config(&self, step: u32) -> Option<PathBuf> {
        let psets_dir = self.psets_dir.as_deref()?;
        let base_name = self.request.step(step)?.base_config_name(step);
        let found = locate_base_config(psets_dir, &base_name);
        if found.is_none() {
            warn!(step, base_config = %base_name, "No base configuration found; running with tweak only");
        }
        found
    }
}
