//! Copy task group
//!
//! Runs every copy of a fanned-out step as its own tokio task and waits for
//! all of them. A single failed copy fails the step; every copy's final status
//! is kept for diagnostics. With `abort_siblings_on_failure`, copies still
//! running when the first failure arrives are aborted (their processes are
//! killed on drop) and reported as cancelled.

use futures::FutureExt;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::{CopyOutcome, CopyStatus, SplitterError, SplitterResult};
use crate::logging;

use super::executor::{StepExecutor, StepInvocation, StepOutcome};

#[derive(Clone)]
pub struct CopyTaskGroup {
    executor: Arc<dyn StepExecutor>,
    abort_siblings_on_failure: bool,
}

impl CopyTaskGroup {
    pub fn new(executor: Arc<dyn StepExecutor>) -> Self {
        Self {
            executor,
            abort_siblings_on_failure: true,
        }
    }

    pub fn with_abort_siblings_on_failure(mut self, abort: bool) -> Self {
        self.abort_siblings_on_failure = abort;
        self
    }

    /// Run all copies of `step` for `job_index`; returns outcomes in copy order.
    pub async fn run(
        &self,
        job_index: u64,
        step: u32,
        invocations: Vec<StepInvocation>,
    ) -> SplitterResult<Vec<StepOutcome>> {
        let total = invocations.len();
        let indices: Vec<u32> = invocations
            .iter()
            .zip(0u32..)
            .map(|(inv, i)| inv.copy_index.unwrap_or(i))
            .collect();

        let mut set = JoinSet::new();
        for (invocation, copy_index) in invocations.into_iter().zip(indices.iter().copied()) {
            let executor = Arc::clone(&self.executor);
            set.spawn(async move {
                let result = AssertUnwindSafe(executor.execute(invocation))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(SplitterError::StepExecution {
                            job_index,
                            step,
                            exit_code: None,
                            reason: "copy task panicked".to_string(),
                        })
                    });
                (copy_index, result)
            });
        }
        info!(job_index, step, copies = total, "Copy tasks started");

        let mut statuses: BTreeMap<u32, CopyStatus> = BTreeMap::new();
        let mut outcomes: Vec<StepOutcome> = Vec::with_capacity(total);
        let mut aborted = false;

        while let Some(joined) = set.join_next().await {
            let (copy_index, result) = match joined {
                Ok(pair) => pair,
                // Only aborted tasks land here; they are marked cancelled below.
                Err(_) => continue,
            };

            match result {
                Ok(outcome) => {
                    logging::log_step_operation("copy", job_index, step, Some(copy_index), "succeeded", None);
                    statuses.insert(copy_index, CopyStatus::Succeeded);
                    outcomes.push(outcome);
                }
                Err(err) => {
                    // Only a process exit code goes in `exit_code`; other failures keep their class in `reason`.
                    let (exit_code, reason) = match &err {
                        SplitterError::StepExecution { exit_code, .. } => (*exit_code, err.to_string()),
                        other => (None, format!("[{}] {other}", other.exit_code().as_str())),
                    };
                    error!(job_index, step, copy_index, error = %err, "Copy task failed");
                    statuses.insert(copy_index, CopyStatus::Failed { exit_code, reason });
                    if self.abort_siblings_on_failure && !aborted && !set.is_empty() {
                        warn!(job_index, step, remaining = set.len(), "Aborting sibling copies");
                        set.abort_all();
                        aborted = true;
                    }
                }
            }
        }

        let all: Vec<CopyOutcome> = indices
            .iter()
            .map(|&copy_index| CopyOutcome {
                copy_index,
                status: statuses
                    .remove(&copy_index)
                    .unwrap_or(CopyStatus::Cancelled),
            })
            .collect();

        if all.iter().all(|o| o.status.is_success()) {
            outcomes.sort_by_key(|o| o.copy_index);
            info!(job_index, step, copies = total, "All copies succeeded");
            return Ok(outcomes);
        }

        Err(SplitterError::copy_task_failure(job_index, step, all))
    }
}
