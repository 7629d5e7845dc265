//! Parallel job-set generation
//!
//! Partitions a request and derives every job's tweaks. Jobs share nothing
//! mutable, so derivation fans out across the rayon pool; results come back in
//! job-index order and any error aborts the whole request.

use rayon::prelude::*;
use tracing::info;

use crate::error::SplitterResult;
use crate::models::{JobTweaks, Request};
use crate::validation;

use super::partitioner::Partitioner;
use super::step_configurator::{ConfiguratorOptions, StepConfigurator};

#[derive(Debug, Clone)]
pub struct JobSetBuilder<'a> {
    request: &'a Request,
    options: ConfiguratorOptions,
}

impl<'a> JobSetBuilder<'a> {
    pub fn new(request: &'a Request) -> Self {
        Self {
            request,
            options: ConfiguratorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ConfiguratorOptions) -> Self {
        self.options = options;
        self
    }

    /// Validate, partition, and derive tweaks for every job.
    pub fn build(self) -> SplitterResult<Vec<JobTweaks>> {
        validation::validate_request(self.request)?;
        let partitioner = Partitioner::for_request(self.request)?;
        let configurator = StepConfigurator::new(self.request, self.options)?;

        let jobs = partitioner.partition();
        let tweaks = jobs
            .par_iter()
            .map(|job| configurator.configure(job))
            .collect::<SplitterResult<Vec<_>>>()?;

        info!(
            request_name = %self.request.request_name,
            job_count = tweaks.len(),
            chain_length = self.request.chain_length(),
            step1_copies = configurator.step1_copies(),
            "Job set generated"
        );
        Ok(tweaks)
    }
}
