#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use stepchain_splitter::execution::{StepExecutor, StepInvocation, StepOutcome};
use stepchain_splitter::{SplitterError, SplitterResult};

/// Records every invocation; fails or stalls the (step, copy) pairs it is told to.
#[derive(Default)]
pub struct MockExecutor {
    pub invocations: Mutex<Vec<StepInvocation>>,
    fail: Vec<(u32, Option<u32>)>,
    stall: Vec<(u32, Option<u32>)>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, step: u32, copy_index: Option<u32>) -> Self {
        self.fail.push((step, copy_index));
        self
    }

    pub fn stalling(mut self, step: u32, copy_index: Option<u32>) -> Self {
        self.stall.push((step, copy_index));
        self
    }

    pub fn steps_run(&self) -> Vec<(u32, Option<u32>)> {
        let mut seen: Vec<(u32, Option<u32>)> = self
            .invocations
            .lock()
            .unwrap()
            .iter()
            .map(|i| (i.step, i.copy_index))
            .collect();
        seen.sort();
        seen
    }
}

#[async_trait]
impl StepExecutor for MockExecutor {
    async fn execute(&self, invocation: StepInvocation) -> SplitterResult<StepOutcome> {
        let key = (invocation.step, invocation.copy_index);
        if self.stall.contains(&key) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.invocations.lock().unwrap().push(invocation.clone());
        if self.fail.contains(&key) {
            return Err(SplitterError::StepExecution {
                job_index: invocation.job_index,
                step: invocation.step,
                exit_code: Some(8001),
                reason: "cmsRun exception".to_string(),
            });
        }
        Ok(StepOutcome {
            job_index: invocation.job_index,
            step: invocation.step,
            copy_index: invocation.copy_index,
            exit_code: 0,
            duration_ms: 0,
        })
    }
}
